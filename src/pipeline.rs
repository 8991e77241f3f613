mod activity;
mod cohort;
mod features;
mod periodize;
mod rolling;
mod segment;
mod split;
mod zero_fill;

use std::collections::HashMap;

use polars::frame::DataFrame;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info};

pub use features::{TermFeatureCol, TermFeatures, rolling_col, volume_col};
pub use periodize::PeriodGrid;

use crate::{
    config::PipelineConfig,
    data::{
        behavior::{BehaviorCol, BehaviorEvents},
        customers::CustomerRecords,
    },
    error::{ChurnframeResult, SystemError},
    pipeline::{
        activity::MembershipWindow,
        features::CustomerTerms,
    },
    polars_ext::polars_to_churnframe_error,
};

/// The batch transform from raw lifecycle + behavior tables to the per-term
/// churn feature table.
///
/// Stages run in a fixed order: cohort restriction, zero-fill augmentation,
/// calendar bucketing onto one shared period grid, active-window filtering,
/// optional trailing rolling statistics, term segmentation, wide-row
/// assembly, optional train/test labeling. Per-customer sequence work is
/// independent across customers and runs as a parallel map; within one
/// customer, chronological order is preserved throughout.
///
/// # Caveat
/// Behavioral volume recorded at cancellation time is still counted in the
/// churned customer's final retained term. Callers training on the output
/// should be aware that such events can correlate directly with the label.
pub struct ChurnPipeline {
    config: PipelineConfig,
}

impl ChurnPipeline {
    pub fn new(config: PipelineConfig) -> ChurnframeResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the full transform. Either completes deterministically or fails
    /// fast; no partial output is ever produced.
    #[tracing::instrument(skip_all)]
    pub fn run(
        &self,
        customers: &CustomerRecords,
        events: &BehaviorEvents,
    ) -> ChurnframeResult<TermFeatures> {
        let term_len = self.config.resolved_term_len()?;

        let cohort = cohort::restrict(customers, self.config.cohort_filter.as_ref())?;
        debug!(cohort_size = cohort.height(), "Cohort selected");
        if cohort.height() == 0 {
            info!("No qualifying customers; returning an empty feature table");
            return TermFeatures::empty(&self.config);
        }

        let events_df = cohort::restrict_events(events, &cohort)?;
        let events_df = zero_fill::augment(events_df, &cohort)?;

        let bucketed = periodize::bucket(events_df, self.config.period_unit)?;
        let grid = PeriodGrid::spanning(&bucketed)?;
        debug!(periods = grid.len(), "Shared period grid built");

        let windows = activity::membership_windows(&cohort)?;

        let partitions = bucketed
            .partition_by_stable([BehaviorCol::CustomerId], true)
            .map_err(|e| polars_to_churnframe_error("customer partitioning", e))?;
        if partitions.len() != cohort.height() {
            return Err(SystemError::InvariantViolation(format!(
                "expected one period partition per cohort customer ({}), found {}",
                cohort.height(),
                partitions.len()
            ))
            .into());
        }

        let per_customer = partitions
            .into_par_iter()
            .map(|partition| self.customer_terms(partition, &grid, &windows, term_len))
            .collect::<ChurnframeResult<Vec<_>>>()?;

        let df = features::assemble(per_customer, &self.config, term_len)?;
        let df = split::with_train_flag(df, self.config.train_cutoff)?;
        info!(rows = df.height(), "Feature table assembled");

        Ok(TermFeatures::from_df(df))
    }

    /// The per-customer slice of the pipeline: reindex onto the shared grid,
    /// keep the active membership window, compute rolling statistics on the
    /// untrimmed series, segment into complete terms.
    fn customer_terms(
        &self,
        partition: DataFrame,
        grid: &PeriodGrid,
        windows: &HashMap<String, MembershipWindow>,
        term_len: usize,
    ) -> ChurnframeResult<CustomerTerms> {
        let customer_id = partition
            .column(BehaviorCol::CustomerId.as_str())
            .and_then(|c| c.str().map(|ca| ca.get(0)))
            .map_err(|e| polars_to_churnframe_error("customer partitioning", e))?
            .ok_or_else(|| {
                SystemError::InvariantViolation("empty customer partition".to_string())
            })?
            .to_string();

        let window = windows.get(&customer_id).ok_or_else(|| {
            SystemError::InvariantViolation(format!(
                "no lifecycle record for partitioned customer '{customer_id}'"
            ))
        })?;

        let series = periodize::reindex(&partition, grid)?;
        let active = activity::retain_active(series, window);

        let rolling = self.config.rolling.as_ref().map(|feature| {
            let volumes: Vec<f64> = active.iter().map(|s| s.volume).collect();
            rolling::compute(&volumes, feature)
        });

        let blocks = segment::into_terms(&active, rolling.as_deref(), window.churn.is_some(), term_len);

        Ok(CustomerTerms {
            customer_id,
            blocks,
        })
    }
}
