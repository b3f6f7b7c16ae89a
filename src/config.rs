use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::combination::{Combination, DimensionSet};
use crate::error::SplitError;
use crate::schema::area_flag;

/// Area-flag value marking an internal-internal zone pair.
pub const INTERNAL_AREA_FLAG: i64 = 1;
/// Lower bound of the adjustment factor.
pub const DEFAULT_MIN_CAP: f64 = 0.5;
/// Upper bound of the adjustment factor.
pub const DEFAULT_MAX_CAP: f64 = 2.0;

const ENV_PREFIX: &str = "SPLIT_ADJUST";

/// Filename token prefixes, e.g. `yr2018`, `ca1`, `m3`, `p1`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FilenameTokens {
    pub year: String,
    pub car_availability: String,
    pub mode: String,
    pub purpose: String,
}

impl Default for FilenameTokens {
    fn default() -> Self {
        Self {
            year: "yr".to_string(),
            car_availability: "ca".to_string(),
            mode: "m".to_string(),
            purpose: "p".to_string(),
        }
    }
}

/// Input and output locations. Relative paths resolve against `base_dir`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PipelinePaths {
    pub base_dir: PathBuf,
    pub demand_dir: PathBuf,
    pub area_flags: PathBuf,
    pub splitting_factors: PathBuf,
    pub purpose_lookup: PathBuf,
    pub output: PathBuf,
}

impl PipelinePaths {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(flatten)]
    pub dimensions: DimensionSet,
    pub internal_flag: i64,
    pub min_cap: f64,
    pub max_cap: f64,
    /// Name of the flag column in the area-flag source table.
    pub area_flag_column: String,
    /// Acceptable distance from 1 for a baseline factor group total.
    pub factor_total_tolerance: f64,
    pub filename_tokens: FilenameTokens,
    pub paths: PipelinePaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dimensions: DimensionSet::default(),
            internal_flag: INTERNAL_AREA_FLAG,
            min_cap: DEFAULT_MIN_CAP,
            max_cap: DEFAULT_MAX_CAP,
            area_flag_column: area_flag::AREA_FLAG.to_string(),
            factor_total_tolerance: 1e-6,
            filename_tokens: FilenameTokens::default(),
            paths: PipelinePaths::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a config file (format chosen by extension), overlaid by
    /// `SPLIT_ADJUST_*` environment variables, then validate it.
    pub fn from_file(path: &Path) -> Result<Self, SplitError> {
        let mut config: PipelineConfig = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        if config.paths.base_dir.as_os_str().is_empty() {
            if let Some(parent) = path.parent() {
                config.paths.base_dir = parent.to_path_buf();
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SplitError> {
        if self.dimensions.is_empty() {
            return Err(SplitError::Validation(format!(
                "every dimension needs at least one value: {}",
                self.dimensions
            )));
        }
        check_caps(self.min_cap, self.max_cap)
    }

    pub fn combinations(&self) -> Vec<Combination> {
        self.dimensions.combinations()
    }
}

pub fn check_caps(min_cap: f64, max_cap: f64) -> Result<(), SplitError> {
    if min_cap.is_nan() || max_cap.is_nan() || min_cap > max_cap {
        return Err(SplitError::InvalidCaps { min_cap, max_cap });
    }
    Ok(())
}
