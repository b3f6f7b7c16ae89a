pub mod adjust;
pub mod area_flag;
pub mod combination;
pub mod config;
pub mod error;
pub mod file_set;
pub mod frame;
pub mod grouping;
pub mod loader;
pub mod pipeline;
pub mod purpose;
pub mod schema;
pub mod summary;

#[cfg(feature = "python")]
mod python;

pub use adjust::{adjust_splitting_factor, factor_total_deviations};
pub use area_flag::{area_flag_report, extract_internal_demand, join_area_flag, AreaFlagTable};
pub use combination::{Combination, DimensionSet};
pub use config::{PipelineConfig, DEFAULT_MAX_CAP, DEFAULT_MIN_CAP, INTERNAL_AREA_FLAG};
pub use error::SplitError;
pub use file_set::FileSetResolver;
pub use grouping::group_demand_by_purpose;
pub use pipeline::{run_pipeline, PipelineDriver, PipelineRun, ReferenceTables};
pub use purpose::{map_to_uc, PurposeUcLookup};
pub use summary::AdjustmentSummary;

/// Install `env_logger`, filtered by `RUST_LOG` (default `info`).
/// Does nothing if a logger is already set.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
