use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{TimestampMicroSeconds, serde_as};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{ChurnframeResult, ConfigError};

/// Width of one behavioral aggregation bucket.
///
/// Only calendar months are implemented. Weekly buckets are part of the
/// vocabulary but rejected at validation: a week grid anchored on the
/// trailing boundary would misalign events and lifecycle dates, and the
/// correct leading-anchor fix is not implemented.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum PeriodUnit {
    #[default]
    Month,
    Week,
}

impl PeriodUnit {
    /// Polars truncation interval for this bucket width.
    pub(crate) fn truncate_interval(&self) -> &'static str {
        match self {
            Self::Month => "1mo",
            Self::Week => "1w",
        }
    }
}

/// Subscription recurrence plans and the number of periods one term spans.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum RecurrencePlan {
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl RecurrencePlan {
    pub fn periods_per_term(&self) -> usize {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Semiannual => 6,
            Self::Annual => 12,
        }
    }
}

/// How many periods make up one subscription term.
///
/// `PerPlan` resolves the length from the cohort filter: the named filter
/// column must be present in [`PipelineConfig::cohort_filter`] and its
/// required value must parse as a [`RecurrencePlan`]. Restricting the cohort
/// to a single plan is what makes one shared term length valid for every
/// processed customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermLength {
    Fixed(usize),
    PerPlan { column: String },
}

/// Trailing rolling statistic over the per-period volume series.
///
/// The window never includes the current period: the value at period `k` is
/// computed from up to `window` periods strictly before `k` (minimum one),
/// and the first period of a series is always `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollingFeature {
    /// The trailing mean itself.
    TrailingMean { window: usize },
    /// `current_volume - trailing_mean`, a deviation-from-trend feature.
    DeviationFromTrend { window: usize },
}

impl RollingFeature {
    /// Signed-integer shorthand: positive selects the trailing mean,
    /// negative the deviation, zero disables the feature.
    pub fn from_signed(window: i64) -> Option<Self> {
        match window {
            0 => None,
            w if w > 0 => Some(Self::TrailingMean { window: w as usize }),
            w => Some(Self::DeviationFromTrend {
                window: w.unsigned_abs() as usize,
            }),
        }
    }

    pub fn window(&self) -> usize {
        match self {
            Self::TrailingMean { window } | Self::DeviationFromTrend { window } => *window,
        }
    }
}

/// Month-of-term output column mode.
///
/// `Calendar` emits the calendar month of the term's first period
/// (`1..=12`). `Shifted(offset)` emits `(month + offset) % 12`, which maps
/// into `0..=11`; the two ranges intentionally differ, matching the
/// historical behavior of the bool-vs-integer toggle this replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonthColumn {
    Calendar,
    Shifted(u32),
}

impl MonthColumn {
    pub fn apply(&self, calendar_month: u32) -> u32 {
        match self {
            Self::Calendar => calendar_month,
            Self::Shifted(offset) => (calendar_month + offset) % 12,
        }
    }
}

/// Configuration for one pipeline run.
///
/// `Option` fields follow the convention that `None` disables the feature.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Equality restrictions on lifecycle attribute columns
    /// (e.g. `{"recurrence_plan": "quarterly"}`). `None`: keep everyone.
    pub cohort_filter: Option<BTreeMap<String, String>>,

    /// Bucket width for behavioral aggregation.
    pub period_unit: PeriodUnit,

    /// Periods per subscription term.
    pub term_len: TermLength,

    /// Optional trailing rolling feature, computed alongside raw volumes.
    pub rolling: Option<RollingFeature>,

    /// Emit the term index as an explicit output column.
    pub include_term: bool,

    /// Optional month-of-term output column.
    pub month_column: Option<MonthColumn>,

    /// Optional train/test cutoff. Rows whose term starts strictly before
    /// this date are labeled `is_train = true`. The comparison uses the
    /// term's first period, not the renewal decision date.
    #[serde_as(as = "Option<TimestampMicroSeconds<i64>>")]
    pub train_cutoff: Option<DateTime<Utc>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cohort_filter: None,
            period_unit: PeriodUnit::default(),
            term_len: TermLength::Fixed(3),
            rolling: None,
            include_term: true,
            month_column: Some(MonthColumn::Calendar),
            train_cutoff: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a config with the given term length and everything else at
    /// defaults, validating it.
    pub fn new(term_len: TermLength) -> ChurnframeResult<Self> {
        let config = Self {
            term_len,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_cohort_filter(self, filter: BTreeMap<String, String>) -> Self {
        Self {
            cohort_filter: Some(filter),
            ..self
        }
    }

    pub fn with_rolling(self, rolling: RollingFeature) -> Self {
        Self {
            rolling: Some(rolling),
            ..self
        }
    }

    pub fn with_month_column(self, month_column: Option<MonthColumn>) -> Self {
        Self {
            month_column,
            ..self
        }
    }

    pub fn with_train_cutoff(self, cutoff: DateTime<Utc>) -> Self {
        Self {
            train_cutoff: Some(cutoff),
            ..self
        }
    }

    /// Checks every enumerated option for internal consistency.
    pub fn validate(&self) -> ChurnframeResult<()> {
        if let PeriodUnit::Week = self.period_unit {
            return Err(ConfigError::UnsupportedPeriodUnit {
                unit: self.period_unit.to_string(),
                msg: "only calendar-month buckets are implemented".to_string(),
            }
            .into());
        }

        self.resolved_term_len()?;

        if let Some(rolling) = &self.rolling
            && rolling.window() == 0
        {
            return Err(ConfigError::InvalidRollingWindow(
                "window must span at least one period".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Resolves the effective term length in periods.
    pub fn resolved_term_len(&self) -> ChurnframeResult<usize> {
        match &self.term_len {
            TermLength::Fixed(0) => Err(ConfigError::ZeroTermLength.into()),
            TermLength::Fixed(n) => Ok(*n),
            TermLength::PerPlan { column } => {
                let filter = self.cohort_filter.as_ref().ok_or_else(|| {
                    ConfigError::UnresolvableTermLength(format!(
                        "term length is per-plan but no cohort filter restricts column '{column}'"
                    ))
                })?;
                let value = filter.get(column).ok_or_else(|| {
                    ConfigError::UnresolvableTermLength(format!(
                        "cohort filter has no entry for recurrence column '{column}'"
                    ))
                })?;
                let plan = RecurrencePlan::from_str(value).map_err(|_| {
                    ConfigError::UnresolvableTermLength(format!(
                        "unknown recurrence plan '{value}' in column '{column}'"
                    ))
                })?;
                Ok(plan.periods_per_term())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolved_term_len().unwrap(), 3);
    }

    #[test]
    fn test_zero_term_length_rejected() {
        let result = PipelineConfig::new(TermLength::Fixed(0));
        assert!(result.is_err(), "Zero-length terms must fail validation");
    }

    #[test]
    fn test_week_buckets_rejected() {
        let config = PipelineConfig {
            period_unit: PeriodUnit::Week,
            ..Default::default()
        };
        assert!(
            config.validate().is_err(),
            "Weekly buckets are a documented unsupported unit"
        );
    }

    #[test]
    fn test_per_plan_term_length_resolves_from_cohort_filter() {
        let config = PipelineConfig {
            term_len: TermLength::PerPlan {
                column: "recurrence_plan".to_string(),
            },
            ..Default::default()
        }
        .with_cohort_filter(BTreeMap::from([(
            "recurrence_plan".to_string(),
            "quarterly".to_string(),
        )]));

        assert_eq!(config.resolved_term_len().unwrap(), 3);
    }

    #[test]
    fn test_per_plan_term_length_unknown_plan_fails() {
        let config = PipelineConfig {
            term_len: TermLength::PerPlan {
                column: "recurrence_plan".to_string(),
            },
            ..Default::default()
        }
        .with_cohort_filter(BTreeMap::from([(
            "recurrence_plan".to_string(),
            "biweekly".to_string(),
        )]));

        assert!(config.resolved_term_len().is_err());
    }

    #[test]
    fn test_per_plan_without_filter_fails() {
        let config = PipelineConfig {
            term_len: TermLength::PerPlan {
                column: "recurrence_plan".to_string(),
            },
            ..Default::default()
        };
        assert!(config.resolved_term_len().is_err());
    }

    #[test]
    fn test_rolling_from_signed() {
        assert_eq!(RollingFeature::from_signed(0), None);
        assert_eq!(
            RollingFeature::from_signed(3),
            Some(RollingFeature::TrailingMean { window: 3 })
        );
        assert_eq!(
            RollingFeature::from_signed(-3),
            Some(RollingFeature::DeviationFromTrend { window: 3 })
        );
    }

    #[test]
    fn test_month_column_modes() {
        assert_eq!(MonthColumn::Calendar.apply(12), 12);
        assert_eq!(MonthColumn::Shifted(0).apply(12), 0);
        assert_eq!(MonthColumn::Shifted(3).apply(11), 2);
    }
}
