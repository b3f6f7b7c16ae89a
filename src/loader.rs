use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::info;
use polars::prelude::*;

use crate::area_flag::AreaFlagTable;
use crate::error::SplitError;
use crate::frame::conform;
use crate::purpose::PurposeUcLookup;
use crate::schema::{DEMAND_FILE, SPLITTING_FACTORS};

/// Where demand tables come from, keyed by the resolved file path.
pub trait DemandSource {
    fn load_demand(&self, path: &Path) -> Result<DataFrame, SplitError>;
}

/// Demand files on disk, in CSV.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDemandSource;

impl DemandSource for CsvDemandSource {
    fn load_demand(&self, path: &Path) -> Result<DataFrame, SplitError> {
        load_demand_file(path)
    }
}

/// Demand tables already in memory.
impl DemandSource for HashMap<PathBuf, DataFrame> {
    fn load_demand(&self, path: &Path) -> Result<DataFrame, SplitError> {
        let df = self.get(path).ok_or_else(|| {
            SplitError::InvalidData(format!("no demand table for {}", path.display()))
        })?;
        conform(df.clone(), &DEMAND_FILE)
    }
}

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names.
pub fn read_csv_as_strings(path: &Path) -> Result<DataFrame, SplitError> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;

    Ok(df)
}

pub fn load_demand_file(path: &Path) -> Result<DataFrame, SplitError> {
    conform(read_csv_as_strings(path)?, &DEMAND_FILE)
}

pub fn load_splitting_factors(path: &Path) -> Result<DataFrame, SplitError> {
    let df = conform(read_csv_as_strings(path)?, &SPLITTING_FACTORS)?;
    info!("loaded {} baseline splitting factors from {}", df.height(), path.display());
    Ok(df)
}

pub fn load_area_flags(path: &Path, flag_column: &str) -> Result<AreaFlagTable, SplitError> {
    let table = AreaFlagTable::from_frame(read_csv_as_strings(path)?, flag_column)?;
    info!("loaded {} area flags from {}", table.height(), path.display());
    Ok(table)
}

pub fn load_purpose_lookup(path: &Path) -> Result<PurposeUcLookup, SplitError> {
    PurposeUcLookup::from_frame(read_csv_as_strings(path)?)
}

/// Write `df` to `path`: Parquet when the extension is `.parquet`, CSV
/// otherwise. Parent directories are created.
pub fn write_table(df: &mut DataFrame, path: &Path) -> Result<(), SplitError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;

    let is_parquet = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("parquet"));
    if is_parquet {
        ParquetWriter::new(file).finish(df)?;
    } else {
        CsvWriter::new(file).include_header(true).finish(df)?;
    }
    info!("wrote {} rows to {}", df.height(), path.display());
    Ok(())
}
