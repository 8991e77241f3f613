use itertools::Itertools;
use polars::{
    frame::DataFrame,
    prelude::{DataType, IntoLazy, PlSmallStr, SortMultipleOptions, col, len, lit},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    data::datetime_us,
    error::{ChurnframeResult, DataError},
    polars_ext::polars_to_churnframe_error,
};

/// Canonical lifecycle columns. Whatever names the caller's table uses, the
/// wrapper renames them to these on construction.
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
pub enum CustomerCol {
    /// Unique customer identifier.
    CustomerId,
    /// Date the customer subscribed.
    BecameDate,
    /// Date the customer cancelled. Null means still active.
    ChurnDate,
}

impl From<CustomerCol> for PlSmallStr {
    fn from(value: CustomerCol) -> Self {
        value.as_str().into()
    }
}

impl CustomerCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Source column names for the lifecycle table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerColumns {
    pub customer_id: String,
    pub became_date: String,
    pub churn_date: String,
}

impl Default for CustomerColumns {
    fn default() -> Self {
        Self {
            customer_id: CustomerCol::CustomerId.as_str().to_string(),
            became_date: CustomerCol::BecameDate.as_str().to_string(),
            churn_date: CustomerCol::ChurnDate.as_str().to_string(),
        }
    }
}

/// The validated per-customer demographic/lifecycle table.
///
/// Construction normalizes the frame (canonical column names, `String` ids,
/// UTC microsecond datetimes, sorted by customer id) and enforces the
/// lifecycle invariants before any transformation can run:
///
/// - a non-null churn date is never earlier than the became-customer date;
/// - customer ids are unique.
///
/// Cohort attribute columns (anything beyond the three lifecycle columns)
/// pass through untouched so the cohort filter can match on them.
#[derive(Debug, Clone)]
pub struct CustomerRecords {
    df: DataFrame,
}

impl CustomerRecords {
    pub fn new(df: DataFrame, columns: &CustomerColumns) -> ChurnframeResult<Self> {
        let schema = df.schema().clone();
        for source in [
            &columns.customer_id,
            &columns.became_date,
            &columns.churn_date,
        ] {
            if schema.get(source.as_str()).is_none() {
                return Err(DataError::MissingColumn {
                    column: source.clone(),
                    msg: "expected in the lifecycle table".to_string(),
                }
                .into());
            }
        }

        let mut selection = vec![
            col(columns.customer_id.as_str())
                .cast(DataType::String)
                .alias(CustomerCol::CustomerId),
            col(columns.became_date.as_str())
                .cast(datetime_us())
                .alias(CustomerCol::BecameDate),
            col(columns.churn_date.as_str())
                .cast(datetime_us())
                .alias(CustomerCol::ChurnDate),
        ];
        for (name, _) in schema.iter() {
            let is_lifecycle_source = name.as_str() == columns.customer_id
                || name.as_str() == columns.became_date
                || name.as_str() == columns.churn_date;
            if !is_lifecycle_source {
                selection.push(col(name.as_str()));
            }
        }

        let normalized = df
            .lazy()
            .select(selection)
            .collect()
            .map_err(|e| polars_to_churnframe_error("lifecycle normalization", e))?
            .sort(
                [CustomerCol::CustomerId.as_str()],
                SortMultipleOptions::default(),
            )
            .map_err(|e| polars_to_churnframe_error("lifecycle sort", e))?;

        Self::check_lifecycle_order(&normalized)?;
        Self::check_unique_ids(&normalized)?;

        Ok(Self { df: normalized })
    }

    pub fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn check_lifecycle_order(df: &DataFrame) -> ChurnframeResult<()> {
        let violations = df
            .clone()
            .lazy()
            .filter(
                col(CustomerCol::ChurnDate)
                    .is_not_null()
                    .and(col(CustomerCol::ChurnDate).lt(col(CustomerCol::BecameDate))),
            )
            .select([col(CustomerCol::CustomerId)])
            .collect()
            .map_err(|e| polars_to_churnframe_error("lifecycle validation", e))?;

        if violations.height() > 0 {
            let example = violations
                .column(CustomerCol::CustomerId.as_str())
                .and_then(|c| c.str().map(|ca| ca.get(0).unwrap_or("?").to_string()))
                .map_err(|e| polars_to_churnframe_error("lifecycle validation", e))?;
            return Err(DataError::ChurnBeforeBecame {
                count: violations.height(),
                example,
            }
            .into());
        }
        Ok(())
    }

    fn check_unique_ids(df: &DataFrame) -> ChurnframeResult<()> {
        let duplicated = df
            .clone()
            .lazy()
            .group_by([col(CustomerCol::CustomerId)])
            .agg([len().alias("__count")])
            .filter(col("__count").gt(lit(1u32)))
            .select([col(CustomerCol::CustomerId)])
            .collect()
            .map_err(|e| polars_to_churnframe_error("duplicate-id validation", e))?;

        if duplicated.height() > 0 {
            let ids = duplicated
                .column(CustomerCol::CustomerId.as_str())
                .and_then(|c| c.str().cloned())
                .map_err(|e| polars_to_churnframe_error("duplicate-id validation", e))?;
            let listed = ids.into_iter().flatten().take(5).join(", ");
            return Err(DataError::DuplicateCustomerIds(listed).into());
        }
        Ok(())
    }
}
