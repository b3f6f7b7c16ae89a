use std::path::{Path, PathBuf};

use log::debug;

use crate::combination::DimensionSet;
use crate::config::FilenameTokens;
use crate::error::SplitError;

/// Picks the demand files belonging to a set of dimensions out of a
/// directory listing.
#[derive(Debug, Clone, Default)]
pub struct FileSetResolver {
    tokens: FilenameTokens,
}

impl FileSetResolver {
    pub fn new(tokens: FilenameTokens) -> Self {
        Self { tokens }
    }

    /// Filter `files` to those whose name carries one year, CA, mode and
    /// purpose token from `dims`, in a single pass, and check the count
    /// equals the product of the dimension sizes. Each combination of `dims`
    /// must then match exactly one of those files.
    pub fn resolve<P: AsRef<Path>>(
        &self,
        files: &[P],
        dims: &DimensionSet,
    ) -> Result<Vec<PathBuf>, SplitError> {
        let years: Vec<String> = dims
            .years
            .iter()
            .map(|y| format!("{}{}", self.tokens.year, y))
            .collect();
        let cas = prefixed(&self.tokens.car_availability, &dims.car_availability_classes);
        let modes = prefixed(&self.tokens.mode, &dims.modes);
        let purposes = prefixed(&self.tokens.purpose, &dims.purposes);

        let current: Vec<PathBuf> = files
            .iter()
            .map(|p| p.as_ref())
            .filter(|path| {
                let tokens = filename_tokens(path);
                let has = |wanted: &[String]| wanted.iter().any(|w| tokens.contains(&w.as_str()));
                has(&years) && has(&cas) && has(&modes) && has(&purposes)
            })
            .map(Path::to_path_buf)
            .collect();

        let expected = dims.expected_file_count();
        if current.len() != expected {
            return Err(SplitError::file_count_mismatch(dims, expected, current.len()));
        }
        for combination in dims.combinations() {
            let wanted = [
                format!("{}{}", self.tokens.year, combination.year),
                format!("{}{}", self.tokens.car_availability, combination.car_availability),
                format!("{}{}", self.tokens.mode, combination.mode),
                format!("{}{}", self.tokens.purpose, combination.purpose),
            ];
            let matched = current
                .iter()
                .filter(|path| {
                    let tokens = filename_tokens(path);
                    wanted.iter().all(|w| tokens.contains(&w.as_str()))
                })
                .count();
            if matched != 1 {
                return Err(SplitError::file_count_mismatch(&combination, 1, matched));
            }
        }
        debug!("resolved {} demand files for {}", current.len(), dims);
        Ok(current)
    }
}

fn prefixed(prefix: &str, values: &[i64]) -> Vec<String> {
    values.iter().map(|v| format!("{prefix}{v}")).collect()
}

/// Filename tokens, split on `_`, `-` and `.`.
fn filename_tokens(path: &Path) -> Vec<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| {
            name.split(['_', '-', '.'])
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// List the files (not directories) directly inside `dir`, sorted by name.
pub fn list_demand_files(dir: &Path) -> Result<Vec<PathBuf>, SplitError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
