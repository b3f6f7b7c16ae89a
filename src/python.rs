use std::collections::HashMap;
use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::adjust;
use crate::area_flag::{self, AreaFlagTable};
use crate::config::{PipelineConfig, DEFAULT_MAX_CAP, DEFAULT_MIN_CAP, INTERNAL_AREA_FLAG};
use crate::error::SplitError;
use crate::grouping;
use crate::loader;
use crate::pipeline;
use crate::purpose::{self, PurposeUcLookup};
use crate::schema::area_flag::AREA_FLAG;
use crate::schema::*;

#[pyclass]
pub struct SplitAdjustModel {
    base_path: PathBuf,
    area_flags: Option<AreaFlagTable>,
    purpose_lookup: Option<PurposeUcLookup>,
}

#[pymethods]
impl SplitAdjustModel {
    #[new]
    fn new(base_path: String) -> Self {
        Self {
            base_path: PathBuf::from(base_path),
            area_flags: None,
            purpose_lookup: None,
        }
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load an area-flag CSV. Required columns: Origin, Destination and
    /// `flag_column`, which is renamed to area_flag.
    #[pyo3(signature = (filename, flag_column=AREA_FLAG))]
    fn load_area_flags(&mut self, filename: &str, flag_column: &str) -> PyResult<PyDataFrame> {
        let table = loader::load_area_flags(&self.base_path.join(filename), flag_column)?;
        let df = table.frame().clone();
        self.area_flags = Some(table);
        Ok(PyDataFrame(df))
    }

    /// Load the purpose → uc_id lookup CSV. Required columns: Purpose, uc_id.
    fn load_purpose_lookup(&mut self, filename: &str) -> PyResult<PyDataFrame> {
        let lookup = loader::load_purpose_lookup(&self.base_path.join(filename))?;
        let df = lookup.frame().clone();
        self.purpose_lookup = Some(lookup);
        Ok(PyDataFrame(df))
    }

    /// Load a demand CSV with its declared column types.
    fn load_demand(&self, filename: &str) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(loader::load_demand_file(&self.base_path.join(filename))?))
    }

    /// Load the baseline splitting-factor CSV with its declared column types.
    fn load_splitting_factors(&self, filename: &str) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(loader::load_splitting_factors(
            &self.base_path.join(filename),
        )?))
    }

    // ── Pipeline stages ─────────────────────────────────────────────────────

    fn join_area_flag(&self, df: PyDataFrame) -> PyResult<PyDataFrame> {
        let result = area_flag::join_area_flag(&df.0, self.area_flags()?)?;
        Ok(PyDataFrame(result))
    }

    #[pyo3(signature = (df, internal_flag=INTERNAL_AREA_FLAG))]
    fn extract_internal_demand(&self, df: PyDataFrame, internal_flag: i64) -> PyResult<PyDataFrame> {
        let result = area_flag::extract_internal_demand(&df.0, self.area_flags()?, internal_flag)?;
        Ok(PyDataFrame(result))
    }

    fn area_flag_report(&self, df: PyDataFrame) -> PyResult<PyDataFrame> {
        let result = area_flag::area_flag_report(&df.0, self.area_flags()?)?;
        Ok(PyDataFrame(result))
    }

    fn map_to_uc(&self, df: PyDataFrame) -> PyResult<PyDataFrame> {
        let lookup = self
            .purpose_lookup
            .as_ref()
            .ok_or_else(|| SplitError::InvalidData("purpose lookup not loaded".into()))?;
        Ok(PyDataFrame(purpose::map_to_uc(&df.0, lookup)?))
    }

    #[staticmethod]
    fn group_demand_by_purpose(df: PyDataFrame) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(grouping::group_demand_by_purpose(&df.0)?))
    }

    #[staticmethod]
    #[pyo3(signature = (splitting_factors, grouped_demand, min_cap=DEFAULT_MIN_CAP, max_cap=DEFAULT_MAX_CAP))]
    fn adjust_splitting_factor(
        splitting_factors: PyDataFrame,
        grouped_demand: PyDataFrame,
        min_cap: f64,
        max_cap: f64,
    ) -> PyResult<PyDataFrame> {
        let result =
            adjust::adjust_splitting_factor(&splitting_factors.0, &grouped_demand.0, min_cap, max_cap)?;
        Ok(PyDataFrame(result))
    }

    #[staticmethod]
    #[pyo3(signature = (splitting_factors, tolerance=1e-6))]
    fn factor_total_deviations(splitting_factors: PyDataFrame, tolerance: f64) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(adjust::factor_total_deviations(
            &splitting_factors.0,
            tolerance,
        )?))
    }

    // ── Full run ────────────────────────────────────────────────────────────

    /// Run every combination from a config file and write the output table.
    ///
    /// Returns the adjusted table and a map of failed combination → error.
    #[staticmethod]
    fn run_config(config_path: &str) -> PyResult<(PyDataFrame, HashMap<String, String>)> {
        let config = PipelineConfig::from_file(&PathBuf::from(config_path))?;
        let run = pipeline::run_pipeline(config)?;
        let failures = run
            .failures
            .iter()
            .map(|f| (f.combination.to_string(), f.error.to_string()))
            .collect();
        Ok((PyDataFrame(run.adjusted), failures))
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn area_flags_df(&self) -> PyResult<Option<PyDataFrame>> {
        Ok(self.area_flags.as_ref().map(|t| PyDataFrame(t.frame().clone())))
    }

    #[getter]
    fn purpose_lookup_df(&self) -> PyResult<Option<PyDataFrame>> {
        Ok(self
            .purpose_lookup
            .as_ref()
            .map(|l| PyDataFrame(l.frame().clone())))
    }
}

impl SplitAdjustModel {
    fn area_flags(&self) -> Result<&AreaFlagTable, SplitError> {
        self.area_flags
            .as_ref()
            .ok_or_else(|| SplitError::InvalidData("area flags not loaded".into()))
    }
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // OD keys
    let od_mod = PyModule::new(m.py(), "od")?;
    od_mod.add("ORIGIN", od::ORIGIN)?;
    od_mod.add("DESTINATION", od::DESTINATION)?;
    m.add_submodule(&od_mod)?;

    // Demand
    let demand_mod = PyModule::new(m.py(), "demand")?;
    demand_mod.add("PURPOSE", demand::PURPOSE)?;
    demand_mod.add("CAR_AVAILABILITY", demand::CAR_AVAILABILITY)?;
    demand_mod.add("FH_PERIOD", demand::FH_PERIOD)?;
    demand_mod.add("TH_PERIOD", demand::TH_PERIOD)?;
    demand_mod.add("DEMAND", demand::DEMAND)?;
    demand_mod.add("MODE_ID", demand::MODE_ID)?;
    m.add_submodule(&demand_mod)?;

    // Lookups
    let lookup_mod = PyModule::new(m.py(), "purpose_lookup")?;
    lookup_mod.add("PURPOSE", purpose_lookup::PURPOSE)?;
    lookup_mod.add("UC_ID", purpose_lookup::UC_ID)?;
    m.add_submodule(&lookup_mod)?;

    // Output
    let output_mod = PyModule::new(m.py(), "output")?;
    output_mod.add("AREA_FLAG", AREA_FLAG)?;
    output_mod.add("FACTOR", splitting::FACTOR)?;
    output_mod.add(
        "ORIGINAL_SPLITTING_FACTOR",
        output::ORIGINAL_SPLITTING_FACTOR,
    )?;
    output_mod.add("DEMAND_SPLITTING_FACTOR", output::DEMAND_SPLITTING_FACTOR)?;
    output_mod.add("ADJUSTMENT_FACTOR", output::ADJUSTMENT_FACTOR)?;
    output_mod.add("COLUMNS", OUTPUT_COLUMNS.to_vec())?;
    m.add_submodule(&output_mod)?;

    // Defaults
    m.add("INTERNAL_AREA_FLAG", INTERNAL_AREA_FLAG)?;
    m.add("DEFAULT_MIN_CAP", DEFAULT_MIN_CAP)?;
    m.add("DEFAULT_MAX_CAP", DEFAULT_MAX_CAP)?;

    Ok(())
}

#[pymodule]
fn split_adjust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    crate::init_logging();
    m.add_class::<SplitAdjustModel>()?;
    add_schema_exports(m)?;
    Ok(())
}
