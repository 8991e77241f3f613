use polars::{
    frame::DataFrame,
    prelude::{IntoLazy, JoinArgs, JoinType, UnionArgs, UniqueKeepStrategy, col, concat, lit},
};

use crate::{
    data::{behavior::BehaviorCol, customers::CustomerCol},
    error::ChurnframeResult,
    polars_ext::polars_to_churnframe_error,
};

/// Appends one synthetic zero-volume event, dated at the became-customer
/// date, for every cohort customer with no behavior events at all.
///
/// This guarantees every retained customer owns at least one period, so
/// customers who never triggered the behavioral feature still flow through
/// the rest of the pipeline instead of silently vanishing.
pub(crate) fn augment(events: DataFrame, cohort: &DataFrame) -> ChurnframeResult<DataFrame> {
    let marker = "__has_events";

    let seen = events
        .clone()
        .lazy()
        .select([col(BehaviorCol::CustomerId)])
        .unique(None, UniqueKeepStrategy::Any)
        .with_column(lit(true).alias(marker));

    let synthetic = cohort
        .clone()
        .lazy()
        .join(
            seen,
            [col(CustomerCol::CustomerId)],
            [col(BehaviorCol::CustomerId)],
            JoinArgs {
                how: JoinType::Left,
                ..Default::default()
            },
        )
        .filter(col(marker).is_null())
        .select([
            col(CustomerCol::CustomerId).alias(BehaviorCol::CustomerId),
            col(CustomerCol::BecameDate).alias(BehaviorCol::EventDate),
            lit(0.0).alias(BehaviorCol::Volume),
        ]);

    concat(
        [events.lazy(), synthetic],
        UnionArgs {
            parallel: true,
            rechunk: true,
            ..Default::default()
        },
    )
    .map_err(|e| polars_to_churnframe_error("zero-fill augmentation", e))?
    .collect()
    .map_err(|e| polars_to_churnframe_error("zero-fill augmentation", e))
}

#[cfg(test)]
mod tests {
    use polars::prelude::{StrptimeOptions, TimeUnit, TimeZone, df};

    use super::*;

    fn to_datetime_frame(df: DataFrame, cols: &[&str]) -> DataFrame {
        let casts = cols
            .iter()
            .map(|c| {
                col(*c).str().to_datetime(
                    Some(TimeUnit::Microseconds),
                    Some(TimeZone::UTC),
                    StrptimeOptions::default(),
                    lit("raise"),
                )
            })
            .collect::<Vec<_>>();
        df.lazy()
            .with_columns(casts)
            .collect()
            .expect("Failed to cast dates")
    }

    #[test]
    fn test_customer_without_events_gets_one_zero_row() {
        let cohort = to_datetime_frame(
            df![
                "customer_id" => &["a", "b"],
                "became_date" => &["2016-01-10", "2016-02-01"],
                "churn_date" => &[None::<&str>, None],
            ]
            .expect("Failed to create cohort"),
            &["became_date", "churn_date"],
        );
        let events = to_datetime_frame(
            df![
                "customer_id" => &["a"],
                "event_date" => &["2016-01-15"],
                "volume" => &[3.0],
            ]
            .expect("Failed to create events"),
            &["event_date"],
        );

        let augmented = augment(events, &cohort).expect("Augmentation failed");
        assert_eq!(augmented.height(), 2);

        let synthetic = augmented
            .clone()
            .lazy()
            .filter(col("customer_id").eq(lit("b")))
            .collect()
            .expect("Filter failed");
        assert_eq!(synthetic.height(), 1, "Exactly one synthetic row for 'b'");
        let volume = synthetic.column("volume").unwrap().f64().unwrap().get(0);
        assert_eq!(volume, Some(0.0));
    }

    #[test]
    fn test_customers_with_events_are_untouched() {
        let cohort = to_datetime_frame(
            df![
                "customer_id" => &["a"],
                "became_date" => &["2016-01-10"],
                "churn_date" => &[None::<&str>],
            ]
            .expect("Failed to create cohort"),
            &["became_date", "churn_date"],
        );
        let events = to_datetime_frame(
            df![
                "customer_id" => &["a", "a"],
                "event_date" => &["2016-01-15", "2016-03-02"],
                "volume" => &[3.0, 1.0],
            ]
            .expect("Failed to create events"),
            &["event_date"],
        );

        let augmented = augment(events, &cohort).expect("Augmentation failed");
        assert_eq!(augmented.height(), 2, "No synthetic rows when events exist");
    }
}
