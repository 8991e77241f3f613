use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use polars::{
    frame::DataFrame,
    prelude::{ChunkAgg, IntoLazy, SortMultipleOptions, col, lit},
};

use crate::{
    config::PeriodUnit,
    data::behavior::BehaviorCol,
    error::{ChurnframeResult, DataError, SystemError},
    polars_ext::polars_to_churnframe_error,
};

/// Name of the bucketed-date column carried between the periodizer and the
/// per-customer stages.
pub(crate) const PERIOD_START: &str = "period_start";

/// One reindexed slot of a customer's regular period series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PeriodSample {
    /// Period start, microseconds since epoch (UTC).
    pub ts: i64,
    pub volume: f64,
}

/// Buckets every event into its calendar period and sums volume per
/// (customer, period). Events with a null date carry no calendar position
/// and are dropped. The result is sorted by (customer, period) so that
/// downstream partitions are chronologically ordered.
pub(crate) fn bucket(events: DataFrame, unit: PeriodUnit) -> ChurnframeResult<DataFrame> {
    events
        .lazy()
        .filter(col(BehaviorCol::EventDate).is_not_null())
        .with_column(
            col(BehaviorCol::EventDate)
                .dt()
                .truncate(lit(unit.truncate_interval()))
                .alias(PERIOD_START),
        )
        .group_by([col(BehaviorCol::CustomerId), col(PERIOD_START)])
        .agg([col(BehaviorCol::Volume).sum()])
        .sort(
            [BehaviorCol::CustomerId.as_str(), PERIOD_START],
            SortMultipleOptions::default(),
        )
        .collect()
        .map_err(|e| polars_to_churnframe_error("periodization", e))
}

/// The shared, regular period grid every customer is reindexed onto.
///
/// Spans the global min..max bucketed date across ALL customers, one slot
/// per calendar month. Sharing one grid keeps customers calendar-aligned
/// (required for the month-of-term column); the leading/trailing zero slots
/// it introduces outside a customer's true activity window are removed by
/// the active-window stage. Computed once per run and passed around as an
/// immutable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodGrid {
    periods: Vec<i64>,
}

impl PeriodGrid {
    pub(crate) fn spanning(bucketed: &DataFrame) -> ChurnframeResult<Self> {
        let ca = bucketed
            .column(PERIOD_START)
            .and_then(|c| c.datetime().cloned())
            .map_err(|e| polars_to_churnframe_error("period grid", e))?;

        let (Some(min), Some(max)) = (ca.physical().min(), ca.physical().max()) else {
            return Ok(Self {
                periods: Vec::new(),
            });
        };

        let mut periods = Vec::new();
        let mut current = min;
        while current <= max {
            periods.push(current);
            current = next_month_us(current)?;
        }
        Ok(Self { periods })
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn periods(&self) -> &[i64] {
        &self.periods
    }
}

/// Reindexes one customer's bucketed partition onto the shared grid,
/// filling periods without events with volume `0`.
///
/// The partition must be sorted by period (the bucketing stage guarantees
/// it) and every bucket must lie on the grid.
pub(crate) fn reindex(
    partition: &DataFrame,
    grid: &PeriodGrid,
) -> ChurnframeResult<Vec<PeriodSample>> {
    let ts = partition
        .column(PERIOD_START)
        .and_then(|c| c.datetime().cloned())
        .map_err(|e| polars_to_churnframe_error("period reindexing", e))?;
    let volumes = partition
        .column(BehaviorCol::Volume.as_str())
        .and_then(|c| c.f64().cloned())
        .map_err(|e| polars_to_churnframe_error("period reindexing", e))?;

    let bucket_count = partition.height();
    let mut series = Vec::with_capacity(grid.len());
    let mut next_bucket = 0;
    for &month in grid.periods() {
        let volume = if next_bucket < bucket_count
            && ts.physical().get(next_bucket) == Some(month)
        {
            let v = volumes.get(next_bucket).unwrap_or(0.0);
            next_bucket += 1;
            v
        } else {
            0.0
        };
        series.push(PeriodSample { ts: month, volume });
    }

    if next_bucket != bucket_count {
        return Err(SystemError::InvariantViolation(format!(
            "{} bucketed period(s) fell outside the shared grid",
            bucket_count - next_bucket
        ))
        .into());
    }
    Ok(series)
}

pub(crate) fn datetime_from_us(ts_us: i64) -> ChurnframeResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(ts_us).ok_or_else(|| {
        DataError::TimestampConversion(format!("timestamp {ts_us}us is out of range")).into()
    })
}

/// Floors a timestamp to the first instant of its calendar month.
pub(crate) fn month_floor_us(ts_us: i64) -> ChurnframeResult<i64> {
    let dt = datetime_from_us(ts_us)?;
    Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0)
        .single()
        .map(|floored| floored.timestamp_micros())
        .ok_or_else(|| {
            DataError::TimestampConversion(format!("cannot floor timestamp {ts_us}us to its month"))
                .into()
        })
}

pub(crate) fn next_month_us(month_start_us: i64) -> ChurnframeResult<i64> {
    datetime_from_us(month_start_us)?
        .checked_add_months(Months::new(1))
        .map(|next| next.timestamp_micros())
        .ok_or_else(|| {
            DataError::TimestampConversion(format!(
                "cannot advance timestamp {month_start_us}us by one month"
            ))
            .into()
        })
}

/// Calendar month (`1..=12`) of a timestamp.
pub(crate) fn calendar_month_us(ts_us: i64) -> ChurnframeResult<u32> {
    Ok(datetime_from_us(ts_us)?.month())
}

#[cfg(test)]
mod tests {
    use polars::prelude::{StrptimeOptions, TimeUnit, TimeZone as PlTimeZone, df};

    use super::*;

    fn us(date: &str) -> i64 {
        format!("{date}T00:00:00Z")
            .parse::<DateTime<Utc>>()
            .expect("Invalid test date")
            .timestamp_micros()
    }

    fn events_frame(rows: Vec<(&str, &str, f64)>) -> DataFrame {
        let (ids, dates, volumes): (Vec<_>, Vec<_>, Vec<_>) = itertools::multiunzip(rows);
        df![
            "customer_id" => ids,
            "event_date" => dates,
            "volume" => volumes,
        ]
        .expect("Failed to create events frame")
        .lazy()
        .with_column(col("event_date").str().to_datetime(
            Some(TimeUnit::Microseconds),
            Some(PlTimeZone::UTC),
            StrptimeOptions::default(),
            lit("raise"),
        ))
        .collect()
        .expect("Failed to cast dates")
    }

    #[test]
    fn test_bucket_sums_volume_per_customer_month() {
        let events = events_frame(vec![
            ("a", "2016-01-03", 2.0),
            ("a", "2016-01-28", 3.0),
            ("a", "2016-03-05", 1.0),
            ("b", "2016-01-10", 7.0),
        ]);

        let bucketed = bucket(events, PeriodUnit::Month).expect("Bucketing failed");
        assert_eq!(bucketed.height(), 3);

        let volumes = bucketed.column("volume").unwrap().f64().unwrap();
        let periods = bucketed.column(PERIOD_START).unwrap().datetime().unwrap();
        // Sorted by (customer, period): a/Jan, a/Mar, b/Jan.
        assert_eq!(volumes.get(0), Some(5.0));
        assert_eq!(periods.physical().get(0), Some(us("2016-01-01")));
        assert_eq!(volumes.get(1), Some(1.0));
        assert_eq!(periods.physical().get(1), Some(us("2016-03-01")));
        assert_eq!(volumes.get(2), Some(7.0));
    }

    #[test]
    fn test_grid_spans_global_min_to_max() {
        let events = events_frame(vec![
            ("a", "2016-01-03", 2.0),
            ("b", "2016-04-10", 7.0),
        ]);
        let bucketed = bucket(events, PeriodUnit::Month).expect("Bucketing failed");

        let grid = PeriodGrid::spanning(&bucketed).expect("Grid construction failed");
        assert_eq!(
            grid.periods(),
            &[
                us("2016-01-01"),
                us("2016-02-01"),
                us("2016-03-01"),
                us("2016-04-01"),
            ]
        );
    }

    #[test]
    fn test_grid_of_empty_frame_is_empty() {
        let events = events_frame(vec![("a", "2016-01-03", 2.0)]);
        let bucketed = bucket(events, PeriodUnit::Month).expect("Bucketing failed");
        let empty = bucketed
            .clear();
        let grid = PeriodGrid::spanning(&empty).expect("Grid construction failed");
        assert!(grid.is_empty());
    }

    #[test]
    fn test_reindex_zero_fills_missing_periods() {
        let events = events_frame(vec![
            ("a", "2016-01-03", 2.0),
            ("a", "2016-03-05", 1.0),
            ("b", "2016-04-10", 7.0),
        ]);
        let bucketed = bucket(events, PeriodUnit::Month).expect("Bucketing failed");
        let grid = PeriodGrid::spanning(&bucketed).expect("Grid construction failed");

        let partitions = bucketed
            .partition_by_stable(["customer_id"], true)
            .expect("Partitioning failed");
        let series_a = reindex(&partitions[0], &grid).expect("Reindex failed");

        assert_eq!(
            series_a,
            vec![
                PeriodSample { ts: us("2016-01-01"), volume: 2.0 },
                PeriodSample { ts: us("2016-02-01"), volume: 0.0 },
                PeriodSample { ts: us("2016-03-01"), volume: 1.0 },
                PeriodSample { ts: us("2016-04-01"), volume: 0.0 },
            ]
        );
    }

    #[test]
    fn test_month_helpers() {
        assert_eq!(month_floor_us(us("2016-02-29")).unwrap(), us("2016-02-01"));
        assert_eq!(next_month_us(us("2016-12-01")).unwrap(), us("2017-01-01"));
        assert_eq!(calendar_month_us(us("2016-07-15")).unwrap(), 7);
    }
}
