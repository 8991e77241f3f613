mod pipeline;
mod polars_ext;

pub mod config;
pub mod data;
pub mod error;
pub mod io;

pub use config::{
    MonthColumn, PeriodUnit, PipelineConfig, RecurrencePlan, RollingFeature, TermLength,
};
pub use data::{
    behavior::{BehaviorCol, BehaviorColumns, BehaviorEvents},
    customers::{CustomerCol, CustomerColumns, CustomerRecords},
};
pub use error::{ChurnframeError, ChurnframeResult};
pub use pipeline::{
    ChurnPipeline, PeriodGrid, TermFeatureCol, TermFeatures, rolling_col, volume_col,
};
