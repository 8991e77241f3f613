use polars::{
    frame::DataFrame,
    prelude::{DataType, IntoLazy, PlSmallStr, col},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    data::datetime_us,
    error::{ChurnframeResult, DataError},
    polars_ext::polars_to_churnframe_error,
};

/// Canonical behavior-event columns.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum BehaviorCol {
    /// Customer the event belongs to.
    CustomerId,
    /// When the behavioral volume was recorded.
    EventDate,
    /// Quantity of observed behavior (e.g. support issues opened).
    Volume,
}

impl From<BehaviorCol> for PlSmallStr {
    fn from(value: BehaviorCol) -> Self {
        value.as_str().into()
    }
}

impl BehaviorCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Source column names for the behavior table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorColumns {
    pub customer_id: String,
    pub event_date: String,
    pub volume: String,
}

impl Default for BehaviorColumns {
    fn default() -> Self {
        Self {
            customer_id: BehaviorCol::CustomerId.as_str().to_string(),
            event_date: BehaviorCol::EventDate.as_str().to_string(),
            volume: BehaviorCol::Volume.as_str().to_string(),
        }
    }
}

/// The raw per-event behavior log.
///
/// Events are the source of truth for activity and are only ever aggregated,
/// never interpreted row by row, so construction is limited to schema
/// normalization: canonical names, `String` ids, UTC microsecond event
/// dates, `f64` volumes. Row order is irrelevant; the periodizer re-sorts
/// after bucketing. Any additional columns are dropped.
#[derive(Debug, Clone)]
pub struct BehaviorEvents {
    df: DataFrame,
}

impl BehaviorEvents {
    pub fn new(df: DataFrame, columns: &BehaviorColumns) -> ChurnframeResult<Self> {
        let schema = df.schema().clone();
        for source in [&columns.customer_id, &columns.event_date, &columns.volume] {
            if schema.get(source.as_str()).is_none() {
                return Err(DataError::MissingColumn {
                    column: source.clone(),
                    msg: "expected in the behavior table".to_string(),
                }
                .into());
            }
        }

        let normalized = df
            .lazy()
            .select([
                col(columns.customer_id.as_str())
                    .cast(DataType::String)
                    .alias(BehaviorCol::CustomerId),
                col(columns.event_date.as_str())
                    .cast(datetime_us())
                    .alias(BehaviorCol::EventDate),
                col(columns.volume.as_str())
                    .cast(DataType::Float64)
                    .alias(BehaviorCol::Volume),
            ])
            .collect()
            .map_err(|e| polars_to_churnframe_error("behavior normalization", e))?;

        Ok(Self { df: normalized })
    }

    pub fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::{StrptimeOptions, TimeUnit, TimeZone, df, lit};

    use super::*;

    #[test]
    fn test_normalization_renames_and_casts() {
        let df = df![
            "bridge_company_id" => &["a", "a", "b"],
            "days" => &["2016-01-03", "2016-01-20", "2016-02-11"],
            "total_issues" => &[1i64, 4, 2],
        ]
        .expect("Failed to create mock behavior frame")
        .lazy()
        .with_column(col("days").str().to_datetime(
            Some(TimeUnit::Microseconds),
            Some(TimeZone::UTC),
            StrptimeOptions::default(),
            lit("raise"),
        ))
        .collect()
        .expect("Failed to cast event dates");

        let columns = BehaviorColumns {
            customer_id: "bridge_company_id".to_string(),
            event_date: "days".to_string(),
            volume: "total_issues".to_string(),
        };
        let events = BehaviorEvents::new(df, &columns).expect("Construction failed");

        let volumes = events
            .as_df()
            .column(BehaviorCol::Volume.as_str())
            .unwrap();
        assert_eq!(volumes.dtype(), &DataType::Float64);
        assert_eq!(events.as_df().height(), 3);
    }

    #[test]
    fn test_missing_volume_column_fails() {
        let df = df![
            "customer_id" => &["a"],
            "event_date" => &["2016-01-03"],
        ]
        .expect("Failed to create frame");

        let result = BehaviorEvents::new(df, &BehaviorColumns::default());
        assert!(
            matches!(
                result,
                Err(crate::error::ChurnframeError::Data(
                    DataError::MissingColumn { .. }
                ))
            ),
            "Missing volume column must be reported"
        );
    }
}
