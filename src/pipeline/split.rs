use std::sync::Arc;

use chrono::{DateTime, Utc};
use polars::{
    frame::DataFrame,
    prelude::{IntoLazy, PlSmallStr, Selector, col, lit},
};

use crate::{
    data::datetime_us,
    error::ChurnframeResult,
    pipeline::features::{TERM_START, TermFeatureCol},
    polars_ext::polars_to_churnframe_error,
};

/// Labels each term row as train/test by comparing the term's start period
/// to the cutoff: `is_train = term_start < cutoff`. The term start is the
/// first period of the term, not the renewal decision date at its end, so a
/// term straddling the cutoff still trains.
///
/// With no cutoff configured this only strips the internal term-start
/// column.
pub(crate) fn with_train_flag(
    df: DataFrame,
    cutoff: Option<DateTime<Utc>>,
) -> ChurnframeResult<DataFrame> {
    let mut lf = df.lazy();

    if let Some(cutoff) = cutoff {
        let cutoff_expr = lit(cutoff.timestamp_micros()).cast(datetime_us());
        lf = lf.with_column(
            col(TERM_START)
                .lt(cutoff_expr)
                .alias(TermFeatureCol::IsTrain),
        );
    }

    lf.drop(Selector::ByName {
        names: Arc::from([PlSmallStr::from(TERM_START)]),
        strict: false,
    })
    .collect()
    .map_err(|e| polars_to_churnframe_error("train/test split", e))
}
