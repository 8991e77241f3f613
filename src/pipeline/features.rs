use std::sync::Arc;

use polars::{
    frame::DataFrame,
    prelude::{
        DataType, Field, Int64Chunked, IntoColumn, IntoSeries, NamedFrom, PlSmallStr, Schema,
        SchemaRef, Series, TimeUnit, TimeZone,
    },
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    config::PipelineConfig,
    error::{ChurnframeResult, DataError, SystemError},
    io::{Report, ReportName},
    pipeline::{periodize::calendar_month_us, segment::TermBlock},
};

/// Internal column holding each term's first period, used by the train/test
/// splitter and dropped before the table is handed back. The `__` prefix
/// marks it as a virtual column that callers never see.
pub(crate) const TERM_START: &str = "__term_start";

/// Fixed output columns of the feature table. The positional
/// `volume_i`/`rolling_i` columns are generated by [`volume_col`] and
/// [`rolling_col`].
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
pub enum TermFeatureCol {
    /// Customer the term belongs to.
    CustomerId,
    /// Zero-based term index (number of past renewals).
    Term,
    /// Churn label: 1 on the final term of a churned customer, else 0.
    Churned,
    /// Month of the term's first period (calendar or shifted-modulo mode).
    Month,
    /// Train/test split flag.
    IsTrain,
}

impl From<TermFeatureCol> for PlSmallStr {
    fn from(value: TermFeatureCol) -> Self {
        value.as_str().into()
    }
}

impl TermFeatureCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Name of the raw volume column at the given position within a term.
pub fn volume_col(position: usize) -> String {
    format!("volume_{position}")
}

/// Name of the rolling feature column at the given position within a term.
pub fn rolling_col(position: usize) -> String {
    format!("rolling_{position}")
}

/// One customer's segmented terms, in chronological order.
pub(crate) struct CustomerTerms {
    pub customer_id: String,
    pub blocks: Vec<TermBlock>,
}

/// The assembled churn training table: one row per (customer, completed
/// term), wide per-period feature columns, one binary label.
#[derive(Debug, Clone)]
pub struct TermFeatures {
    df: DataFrame,
}

impl Report for TermFeatures {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ReportName for TermFeatures {
    fn base_name(&self) -> String {
        "term_features".to_string()
    }
}

impl TermFeatures {
    pub(crate) fn from_df(df: DataFrame) -> Self {
        Self { df }
    }

    /// An empty table carrying the exact schema a run with this config
    /// would produce. "No qualifying customers" is a valid result.
    pub(crate) fn empty(config: &PipelineConfig) -> ChurnframeResult<Self> {
        let schema = Self::schema_for(config)?;
        Ok(Self {
            df: DataFrame::empty_with_schema(&schema),
        })
    }

    /// The output schema implied by a configuration, in column order.
    pub fn schema_for(config: &PipelineConfig) -> ChurnframeResult<SchemaRef> {
        let term_len = config.resolved_term_len()?;

        let mut fields = vec![Field::new(
            TermFeatureCol::CustomerId.into(),
            DataType::String,
        )];
        if config.include_term {
            fields.push(Field::new(TermFeatureCol::Term.into(), DataType::UInt32));
        }
        for position in 0..term_len {
            fields.push(Field::new(volume_col(position).into(), DataType::Float64));
        }
        if config.rolling.is_some() {
            for position in 0..term_len {
                fields.push(Field::new(rolling_col(position).into(), DataType::Float64));
            }
        }
        fields.push(Field::new(TermFeatureCol::Churned.into(), DataType::Int32));
        if config.month_column.is_some() {
            fields.push(Field::new(TermFeatureCol::Month.into(), DataType::Int32));
        }
        if config.train_cutoff.is_some() {
            fields.push(Field::new(TermFeatureCol::IsTrain.into(), DataType::Boolean));
        }

        Ok(Arc::new(Schema::from_iter(fields)))
    }
}

/// Pivots the segmented per-customer term blocks into the wide feature
/// frame. Within each row the positional columns hold the term's periods in
/// strict chronological order; any reordering here would corrupt the
/// feature semantics, so values are laid out purely by position.
pub(crate) fn assemble(
    customers: Vec<CustomerTerms>,
    config: &PipelineConfig,
    term_len: usize,
) -> ChurnframeResult<DataFrame> {
    let row_count: usize = customers.iter().map(|c| c.blocks.len()).sum();

    let mut ids: Vec<String> = Vec::with_capacity(row_count);
    let mut terms: Vec<u32> = Vec::with_capacity(row_count);
    let mut churned: Vec<i32> = Vec::with_capacity(row_count);
    let mut months: Vec<i32> = Vec::with_capacity(row_count);
    let mut starts: Vec<i64> = Vec::with_capacity(row_count);
    let mut volumes: Vec<Vec<f64>> = vec![Vec::with_capacity(row_count); term_len];
    let mut rollings: Vec<Vec<f64>> = if config.rolling.is_some() {
        vec![Vec::with_capacity(row_count); term_len]
    } else {
        Vec::new()
    };

    for customer in &customers {
        for block in &customer.blocks {
            if block.volumes.len() != term_len {
                return Err(SystemError::InvariantViolation(format!(
                    "term block of customer '{}' holds {} period(s), expected {term_len}",
                    customer.customer_id,
                    block.volumes.len()
                ))
                .into());
            }

            ids.push(customer.customer_id.clone());
            terms.push(block.index);
            churned.push(i32::from(block.churned));
            starts.push(block.start_ts);

            if let Some(month_column) = &config.month_column {
                let calendar = calendar_month_us(block.start_ts)?;
                months.push(month_column.apply(calendar) as i32);
            }

            for (position, &volume) in block.volumes.iter().enumerate() {
                volumes[position].push(volume);
            }
            if config.rolling.is_some() {
                let rolling = block.rolling.as_ref().ok_or_else(|| {
                    SystemError::MissingField(format!(
                        "rolling values absent for customer '{}' despite enabled rolling feature",
                        customer.customer_id
                    ))
                })?;
                for (position, &value) in rolling.iter().enumerate() {
                    rollings[position].push(value);
                }
            }
        }
    }

    let mut columns = vec![Series::new(TermFeatureCol::CustomerId.name(), ids).into_column()];
    if config.include_term {
        columns.push(Series::new(TermFeatureCol::Term.name(), terms).into_column());
    }
    for (position, values) in volumes.into_iter().enumerate() {
        columns.push(Series::new(volume_col(position).into(), values).into_column());
    }
    for (position, values) in rollings.into_iter().enumerate() {
        columns.push(Series::new(rolling_col(position).into(), values).into_column());
    }
    columns.push(Series::new(TermFeatureCol::Churned.name(), churned).into_column());
    if config.month_column.is_some() {
        columns.push(Series::new(TermFeatureCol::Month.name(), months).into_column());
    }
    columns.push(
        Int64Chunked::from_vec(TERM_START.into(), starts)
            .into_datetime(TimeUnit::Microseconds, Some(TimeZone::UTC))
            .into_series()
            .into_column(),
    );

    DataFrame::new(columns).map_err(|e| DataError::DataFrame(e.to_string()).into())
}
