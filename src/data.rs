pub mod behavior;
pub mod customers;

use polars::prelude::{DataType, TimeUnit, TimeZone};

/// Canonical dtype for every date column inside the pipeline.
pub(crate) fn datetime_us() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, Some(TimeZone::UTC))
}
