use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use polars::prelude::*;

use crate::adjust::{adjust_splitting_factor, factor_total_deviations};
use crate::area_flag::{area_flag_report, extract_internal_demand, AreaFlagTable};
use crate::combination::{Combination, DimensionSet};
use crate::config::PipelineConfig;
use crate::error::SplitError;
use crate::file_set::{list_demand_files, FileSetResolver};
use crate::frame::conform;
use crate::grouping::group_demand_by_purpose;
use crate::loader::{self, CsvDemandSource, DemandSource};
use crate::purpose::{map_to_uc, PurposeUcLookup};
use crate::schema::{demand, splitting, OUTPUT_COLUMNS, OUTPUT_DTYPES, SPLITTING_FACTORS};
use crate::summary::AdjustmentSummary;

/// Read-only tables shared by every combination of a run.
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    pub area_flags: AreaFlagTable,
    pub splitting_factors: DataFrame,
    pub purpose_lookup: PurposeUcLookup,
}

impl ReferenceTables {
    pub fn new(
        area_flags: AreaFlagTable,
        splitting_factors: DataFrame,
        purpose_lookup: PurposeUcLookup,
    ) -> Result<Self, SplitError> {
        let splitting_factors = conform(splitting_factors, &SPLITTING_FACTORS)?;
        Ok(Self {
            area_flags,
            splitting_factors,
            purpose_lookup,
        })
    }

    pub fn load(config: &PipelineConfig) -> Result<Self, SplitError> {
        let paths = &config.paths;
        Self::new(
            loader::load_area_flags(&paths.resolve(&paths.area_flags), &config.area_flag_column)?,
            loader::load_splitting_factors(&paths.resolve(&paths.splitting_factors))?,
            loader::load_purpose_lookup(&paths.resolve(&paths.purpose_lookup))?,
        )
    }
}

/// A combination that could not be processed, and why.
#[derive(Debug)]
pub struct CombinationFailure {
    pub combination: Combination,
    pub error: SplitError,
}

/// Result of a full run: every adjusted row from the combinations that
/// succeeded, plus the ones that did not.
#[derive(Debug)]
pub struct PipelineRun {
    pub adjusted: DataFrame,
    pub summary: AdjustmentSummary,
    pub failures: Vec<CombinationFailure>,
}

impl PipelineRun {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct PipelineDriver {
    config: PipelineConfig,
    resolver: FileSetResolver,
    references: ReferenceTables,
}

impl PipelineDriver {
    /// Fails with `Validation` when two configured purposes map to the same
    /// uc_id, since their adjusted rows would share output keys.
    pub fn new(config: PipelineConfig, references: ReferenceTables) -> Result<Self, SplitError> {
        config.validate()?;
        check_distinct_uc_ids(&config.dimensions.purposes, &references.purpose_lookup)?;
        Ok(Self {
            resolver: FileSetResolver::new(config.filename_tokens.clone()),
            config,
            references,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every combination of the configured dimensions against
    /// `files`. A failing combination is logged and recorded; the others
    /// still run.
    pub fn run<P: AsRef<Path>, S: DemandSource>(
        &self,
        files: &[P],
        source: &S,
    ) -> Result<PipelineRun, SplitError> {
        let mut adjusted = empty_output()?;
        let mut summary = AdjustmentSummary::default();
        let mut failures = Vec::new();

        let combinations = self.config.combinations();
        info!("adjusting splitting factors for {} combinations", combinations.len());

        for combination in combinations {
            match self.process_combination(files, source, combination) {
                Ok(frame) => {
                    let combo_summary = AdjustmentSummary::from_output(
                        &frame,
                        self.config.min_cap,
                        self.config.max_cap,
                    )?;
                    info!("{combination}: {combo_summary}");
                    summary += combo_summary;
                    adjusted.vstack_mut(&frame)?;
                }
                Err(err) => {
                    error!("{combination}: skipped: {err}");
                    failures.push(CombinationFailure {
                        combination,
                        error: err,
                    });
                }
            }
        }

        info!("run total: {summary}; {} combinations failed", failures.len());
        Ok(PipelineRun {
            adjusted,
            summary,
            failures,
        })
    }

    /// Resolve, filter, group and adjust a single combination.
    pub fn process_combination<P: AsRef<Path>, S: DemandSource>(
        &self,
        files: &[P],
        source: &S,
        combination: Combination,
    ) -> Result<DataFrame, SplitError> {
        let dims = DimensionSet::from(combination);
        let current = self.resolver.resolve(files, &dims)?;

        let mut raw = source.load_demand(&current[0])?;
        for path in &current[1..] {
            raw.vstack_mut(&source.load_demand(path)?)?;
        }
        let raw = raw
            .lazy()
            .with_column(mode_column(combination))
            .collect()?;

        let area_flags = &self.references.area_flags;
        if log::log_enabled!(log::Level::Debug) {
            debug!("{combination}: demand by area flag\n{}", area_flag_report(&raw, area_flags)?);
        }

        let internal = extract_internal_demand(&raw, area_flags, self.config.internal_flag)?;
        debug!(
            "{combination}: {} of {} demand rows are internal",
            internal.height(),
            raw.height()
        );
        drop(raw);

        let lookup = &self.references.purpose_lookup;
        let grouped = group_demand_by_purpose(&map_to_uc(&internal, lookup)?)?;

        let baseline = self.baseline_for(combination)?;
        let adjusted = adjust_splitting_factor(
            &map_to_uc(&baseline, lookup)?,
            &grouped,
            self.config.min_cap,
            self.config.max_cap,
        )?;

        Ok(adjusted)
    }

    /// Baseline factors for one purpose and car-availability class, tagged
    /// with the combination's mode.
    fn baseline_for(&self, combination: Combination) -> Result<DataFrame, SplitError> {
        let baseline = self
            .references
            .splitting_factors
            .clone()
            .lazy()
            .filter(
                col(demand::PURPOSE)
                    .eq(lit(combination.purpose))
                    .and(col(demand::CAR_AVAILABILITY).eq(lit(combination.car_availability))),
            )
            .with_column(mode_column(combination))
            .collect()?;

        if baseline.height() == 0 {
            warn!("{combination}: no baseline {} rows", splitting::FACTOR);
        }
        let deviations = factor_total_deviations(&baseline, self.config.factor_total_tolerance)?;
        if deviations.height() > 0 {
            warn!(
                "{combination}: {} baseline factor groups do not sum to 1",
                deviations.height()
            );
        }
        Ok(baseline)
    }
}

/// Purposes absent from the lookup are left for `map_to_uc` to report per
/// combination.
fn check_distinct_uc_ids(purposes: &[i64], lookup: &PurposeUcLookup) -> Result<(), SplitError> {
    let mut by_uc: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for &purpose in purposes {
        if let Ok(uc_id) = lookup.uc_id(purpose) {
            let shared = by_uc.entry(uc_id).or_default();
            if !shared.contains(&purpose) {
                shared.push(purpose);
            }
        }
    }
    match by_uc.iter().find(|(_, shared)| shared.len() > 1) {
        Some((uc_id, shared)) => Err(SplitError::Validation(format!(
            "purposes {shared:?} share uc_id {uc_id}; configure one of them per run"
        ))),
        None => Ok(()),
    }
}

fn mode_column(combination: Combination) -> Expr {
    lit(combination.mode)
        .cast(DataType::Int64)
        .alias(demand::MODE_ID)
}

/// Zero-row table with the adjusted output schema.
pub fn empty_output() -> Result<DataFrame, SplitError> {
    let columns: Vec<Column> = OUTPUT_COLUMNS
        .iter()
        .zip(OUTPUT_DTYPES.iter())
        .map(|(name, dtype)| Column::new_empty((*name).into(), dtype))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Run the whole pipeline from a config: load reference tables, list the
/// demand directory, adjust every combination and write the output table.
pub fn run_pipeline(config: PipelineConfig) -> Result<PipelineRun, SplitError> {
    let references = ReferenceTables::load(&config)?;
    let paths = config.paths.clone();
    let driver = PipelineDriver::new(config, references)?;

    let files: Vec<PathBuf> = list_demand_files(&paths.resolve(&paths.demand_dir))?;
    info!("found {} candidate demand files", files.len());

    let mut run = driver.run(&files, &CsvDemandSource)?;
    if paths.output.as_os_str().is_empty() {
        warn!("no output path configured; adjusted table not written");
    } else {
        loader::write_table(&mut run.adjusted, &paths.resolve(&paths.output))?;
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::config::PipelineConfig;
    use crate::schema::output;

    fn demand_table(purpose: i64, ca: i64, demand: [f64; 4]) -> DataFrame {
        df!(
            "Origin" => [1i64, 1, 2, 5],
            "Destination" => [2i64, 2, 1, 5],
            "Purpose" => [purpose; 4],
            "Car Availability" => [ca; 4],
            "FHPeriod" => ["AM", "PM", "AM", "AM"],
            "THPeriod" => ["PM", "AM", "PM", "PM"],
            "Demand" => demand
        )
        .unwrap()
    }

    fn references() -> ReferenceTables {
        let flags = df!(
            "Origin" => [1i64, 2, 5],
            "Destination" => [2i64, 1, 5],
            "area_flag" => [1i64, 1, 2]
        )
        .unwrap();
        let factors = df!(
            "Origin" => [1i64, 1, 2, 2, 1, 1],
            "Destination" => [2i64, 2, 1, 1, 2, 2],
            "Purpose" => [1i64, 1, 1, 1, 2, 2],
            "Car Availability" => [1i64, 1, 1, 1, 1, 1],
            "FHPeriod" => ["AM", "PM", "AM", "PM", "AM", "PM"],
            "THPeriod" => ["PM", "AM", "PM", "AM", "PM", "AM"],
            "Factor" => [0.6, 0.4, 0.5, 0.5, 0.7, 0.3]
        )
        .unwrap();
        let lookup = df!("Purpose" => [1i64, 2], "uc_id" => [1i64, 2]).unwrap();
        ReferenceTables::new(
            AreaFlagTable::from_frame(flags, "area_flag").unwrap(),
            factors,
            PurposeUcLookup::from_frame(lookup).unwrap(),
        )
        .unwrap()
    }

    fn config(purposes: Vec<i64>) -> PipelineConfig {
        PipelineConfig {
            dimensions: DimensionSet {
                years: vec![2018],
                car_availability_classes: vec![1],
                modes: vec![3],
                purposes,
            },
            ..Default::default()
        }
    }

    fn source() -> HashMap<PathBuf, DataFrame> {
        HashMap::from([
            (
                PathBuf::from("hb_od_yr2018_ca1_m3_p1.csv"),
                demand_table(1, 1, [30.0, 90.0, 10.0, 1000.0]),
            ),
            (
                PathBuf::from("hb_od_yr2018_ca1_m3_p2.csv"),
                demand_table(2, 1, [50.0, 50.0, 10.0, 1000.0]),
            ),
        ])
    }

    fn files(source: &HashMap<PathBuf, DataFrame>) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = source.keys().cloned().collect();
        files.sort();
        files
    }

    #[test]
    fn test_single_combination() {
        let driver = PipelineDriver::new(config(vec![1]), references()).unwrap();
        let source = source();
        let out = driver
            .process_combination(&files(&source), &source, driver.config().combinations()[0])
            .unwrap();

        assert_eq!(out.height(), 4);
        let mode = out.column("mode_id").unwrap().i64().unwrap();
        assert!(mode.into_no_null_iter().all(|m| m == 3));

        let dsf: Vec<Option<f64>> = out
            .column(output::DEMAND_SPLITTING_FACTOR)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(dsf[0], Some(0.25));
        assert_eq!(dsf[1], Some(0.75));
        // 2->1 has AM demand only
        assert_eq!(dsf[2], Some(1.0));
        assert_eq!(dsf[3], None);

        let adj: Vec<Option<f64>> = out
            .column(output::ADJUSTMENT_FACTOR)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(adj[0], Some(0.5));
        assert_eq!(adj[2], Some(2.0));
        assert_eq!(adj[3], None);
    }

    #[test]
    fn test_run_accumulates_combinations() {
        let driver = PipelineDriver::new(config(vec![1, 2]), references()).unwrap();
        let source = source();
        let run = driver.run(&files(&source), &source).unwrap();
        assert!(run.is_complete());
        assert_eq!(run.adjusted.height(), 6);
        assert_eq!(run.adjusted.get_column_names_str(), OUTPUT_COLUMNS.to_vec());
        assert_eq!(run.summary.rows, 6);
        let uc = run.adjusted.column("uc_id").unwrap().i64().unwrap();
        assert_eq!(uc.get(5), Some(2));
    }

    #[test]
    fn test_missing_file_fails_only_its_combination() {
        let driver = PipelineDriver::new(config(vec![1, 2]), references()).unwrap();
        let mut source = source();
        source.remove(&PathBuf::from("hb_od_yr2018_ca1_m3_p1.csv"));
        let run = driver.run(&files(&source), &source).unwrap();

        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].combination.purpose, 1);
        assert!(matches!(
            run.failures[0].error,
            SplitError::FileCountMismatch {
                expected: 1,
                actual: 0,
                ..
            }
        ));
        assert_eq!(run.adjusted.height(), 2);
    }

    #[test]
    fn test_unmapped_purpose_fails_combination() {
        let refs = references();
        let lookup = df!("Purpose" => [2i64], "uc_id" => [2i64]).unwrap();
        let refs = ReferenceTables::new(
            refs.area_flags,
            refs.splitting_factors,
            PurposeUcLookup::from_frame(lookup).unwrap(),
        )
        .unwrap();
        let driver = PipelineDriver::new(config(vec![1, 2]), refs).unwrap();
        let source = source();
        let run = driver.run(&files(&source), &source).unwrap();

        assert_eq!(run.failures.len(), 1);
        assert!(matches!(
            &run.failures[0].error,
            SplitError::UnmappedPurpose(ids) if ids == &vec![1]
        ));
        assert_eq!(run.adjusted.height(), 2);
    }

    #[test]
    fn test_purposes_sharing_uc_id_rejected() {
        let refs = references();
        let lookup = df!("Purpose" => [2i64, 3], "uc_id" => [1i64, 1]).unwrap();
        let shared = ReferenceTables::new(
            refs.area_flags.clone(),
            refs.splitting_factors.clone(),
            PurposeUcLookup::from_frame(lookup).unwrap(),
        )
        .unwrap();
        match PipelineDriver::new(config(vec![2, 3]), shared.clone()) {
            Err(SplitError::Validation(msg)) => assert!(msg.contains("[2, 3] share uc_id 1")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("purposes sharing a uc_id were accepted"),
        }
        // either purpose alone still runs
        assert!(PipelineDriver::new(config(vec![2]), shared.clone()).is_ok());
        assert!(PipelineDriver::new(config(vec![3]), shared).is_ok());
    }

    #[test]
    fn test_empty_output_schema() {
        let empty = empty_output().unwrap();
        assert_eq!(empty.height(), 0);
        assert_eq!(empty.get_column_names_str(), OUTPUT_COLUMNS.to_vec());
    }
}
