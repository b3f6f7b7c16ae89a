use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("{combination}: expected {expected} demand files, found {actual}")]
    FileCountMismatch {
        combination: String,
        expected: usize,
        actual: usize,
    },

    #[error("Purpose ids missing from the uc_id lookup: {0:?}")]
    UnmappedPurpose(Vec<i64>),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Duplicate key in {table}: {count} repeated {key}")]
    DuplicateKey {
        table: &'static str,
        key: String,
        count: usize,
    },

    #[error("Invalid adjustment caps: min_cap {min_cap} is greater than max_cap {max_cap}")]
    InvalidCaps { min_cap: f64, max_cap: f64 },

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),
}

impl SplitError {
    pub fn file_count_mismatch(combination: &impl Display, expected: usize, actual: usize) -> Self {
        SplitError::FileCountMismatch {
            combination: combination.to_string(),
            expected,
            actual,
        }
    }
}

#[cfg(feature = "python")]
impl From<SplitError> for pyo3::PyErr {
    fn from(err: SplitError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}
