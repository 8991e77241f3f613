use std::collections::HashMap;

use polars::frame::DataFrame;

use crate::{
    data::customers::CustomerCol,
    error::{ChurnframeResult, DataError},
    pipeline::periodize::{PeriodSample, month_floor_us},
    polars_ext::polars_to_churnframe_error,
};

/// A customer's active membership window, normalized to period granularity.
///
/// Half-open: active from the became period (inclusive) up to the churn
/// period (exclusive). `churn = None` means active indefinitely. The churn
/// period itself is already inactive, so behavior recorded in it never
/// reaches the feature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MembershipWindow {
    /// Became-customer period start, microseconds since epoch.
    pub became: i64,
    /// Churn period start, microseconds since epoch.
    pub churn: Option<i64>,
}

/// Extracts every cohort customer's membership window from the lifecycle
/// frame, flooring both dates to their period start.
pub(crate) fn membership_windows(
    cohort: &DataFrame,
) -> ChurnframeResult<HashMap<String, MembershipWindow>> {
    let ids = cohort
        .column(CustomerCol::CustomerId.as_str())
        .and_then(|c| c.str().cloned())
        .map_err(|e| polars_to_churnframe_error("membership windows", e))?;
    let became = cohort
        .column(CustomerCol::BecameDate.as_str())
        .and_then(|c| c.datetime().cloned())
        .map_err(|e| polars_to_churnframe_error("membership windows", e))?;
    let churn = cohort
        .column(CustomerCol::ChurnDate.as_str())
        .and_then(|c| c.datetime().cloned())
        .map_err(|e| polars_to_churnframe_error("membership windows", e))?;

    let mut windows = HashMap::with_capacity(cohort.height());
    for row in 0..cohort.height() {
        let id = ids.get(row).ok_or_else(|| DataError::DataFrame(
            "null customer id in the lifecycle table".to_string(),
        ))?;
        let became_ts = became.physical().get(row).ok_or_else(|| {
            DataError::DataFrame(format!(
                "null became-customer date for customer '{id}'"
            ))
        })?;
        let churn_ts = churn.physical().get(row);

        windows.insert(
            id.to_string(),
            MembershipWindow {
                became: month_floor_us(became_ts)?,
                churn: churn_ts.map(month_floor_us).transpose()?,
            },
        );
    }
    Ok(windows)
}

/// Keeps only the periods inside the membership window, preserving order.
pub(crate) fn retain_active(
    series: Vec<PeriodSample>,
    window: &MembershipWindow,
) -> Vec<PeriodSample> {
    series
        .into_iter()
        .filter(|sample| {
            sample.ts >= window.became && window.churn.is_none_or(|churn| sample.ts < churn)
        })
        .collect()
}
