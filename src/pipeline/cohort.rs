use std::collections::BTreeMap;

use polars::{
    frame::DataFrame,
    prelude::{DataType, IntoLazy, JoinArgs, JoinType, col, lit},
};

use crate::{
    data::{
        behavior::{BehaviorCol, BehaviorEvents},
        customers::{CustomerCol, CustomerRecords},
    },
    error::{ChurnframeResult, ConfigError},
    polars_ext::polars_to_churnframe_error,
};

/// Restricts the lifecycle table to customers matching every configured
/// attribute filter, then projects it down to the canonical lifecycle
/// columns (the filter attributes are dropped from the retained schema).
///
/// Attribute columns are compared as strings, so numeric cohort attributes
/// match their textual representation.
pub(crate) fn restrict(
    customers: &CustomerRecords,
    filter: Option<&BTreeMap<String, String>>,
) -> ChurnframeResult<DataFrame> {
    let mut lf = customers.as_df().clone().lazy();

    if let Some(filter) = filter {
        let schema = customers.as_df().schema();
        for (column, required) in filter {
            if schema.get(column.as_str()).is_none() {
                return Err(ConfigError::UnknownFilterColumn(column.clone()).into());
            }
            lf = lf.filter(
                col(column.as_str())
                    .cast(DataType::String)
                    .eq(lit(required.as_str())),
            );
        }
    }

    lf.select([
        col(CustomerCol::CustomerId),
        col(CustomerCol::BecameDate),
        col(CustomerCol::ChurnDate),
    ])
    .collect()
    .map_err(|e| polars_to_churnframe_error("cohort restriction", e))
}

/// Drops behavior events whose customer fell outside the retained cohort.
pub(crate) fn restrict_events(
    events: &BehaviorEvents,
    cohort: &DataFrame,
) -> ChurnframeResult<DataFrame> {
    let members = cohort.clone().lazy().select([col(CustomerCol::CustomerId)]);

    events
        .as_df()
        .clone()
        .lazy()
        .join(
            members,
            [col(BehaviorCol::CustomerId)],
            [col(CustomerCol::CustomerId)],
            JoinArgs {
                how: JoinType::Inner,
                ..Default::default()
            },
        )
        .collect()
        .map_err(|e| polars_to_churnframe_error("behavior cohort restriction", e))
}
