/// Column-name constants for every table the pipeline reads or writes.
/// Single source of truth - exported to Python via PyO3.

// ── Zone-pair key columns ───────────────────────────────────────────────────
pub mod od {
    pub const ORIGIN: &str = "Origin";
    pub const DESTINATION: &str = "Destination";

    pub const KEYS: [&str; 2] = [ORIGIN, DESTINATION];
}

// ── Demand file columns ─────────────────────────────────────────────────────
pub mod demand {
    pub const PURPOSE: &str = "Purpose";
    pub const CAR_AVAILABILITY: &str = "Car Availability";
    pub const FH_PERIOD: &str = "FHPeriod";
    pub const TH_PERIOD: &str = "THPeriod";
    pub const DEMAND: &str = "Demand";
    /// Added by the driver from the file's mode token.
    pub const MODE_ID: &str = "mode_id";
}

// ── Area-flag columns ───────────────────────────────────────────────────────
pub mod area_flag {
    pub const AREA_FLAG: &str = "area_flag";
}

// ── Baseline splitting-factor columns ───────────────────────────────────────
pub mod splitting {
    pub const FACTOR: &str = "Factor";
}

// ── Purpose lookup columns ──────────────────────────────────────────────────
pub mod purpose_lookup {
    pub const PURPOSE: &str = "Purpose";
    pub const UC_ID: &str = "uc_id";
}

// ── Adjusted output columns ─────────────────────────────────────────────────
pub mod output {
    pub const ORIGINAL_SPLITTING_FACTOR: &str = "original_splitting_factor";
    pub const DEMAND_SPLITTING_FACTOR: &str = "demand_splitting_factor";
    pub const ADJUSTMENT_FACTOR: &str = "adjustment_factor";
}

use polars::prelude::DataType;

/// Key of a grouped-demand row and of an adjusted-factor row.
pub const GROUPED_KEYS: [&str; 7] = [
    od::ORIGIN,
    od::DESTINATION,
    purpose_lookup::UC_ID,
    demand::CAR_AVAILABILITY,
    demand::MODE_ID,
    demand::FH_PERIOD,
    demand::TH_PERIOD,
];

/// Key shared by all period rows of one demand-splitting group.
pub const PERIOD_GROUP_KEYS: [&str; 5] = [
    od::ORIGIN,
    od::DESTINATION,
    purpose_lookup::UC_ID,
    demand::CAR_AVAILABILITY,
    demand::MODE_ID,
];

/// Key of a baseline factor group whose periods sum to 1.
pub const FACTOR_GROUP_KEYS: [&str; 4] = [
    od::ORIGIN,
    od::DESTINATION,
    demand::PURPOSE,
    demand::CAR_AVAILABILITY,
];

/// Declared dtypes of a raw demand file.
pub const DEMAND_FILE: [(&str, DataType); 7] = [
    (od::ORIGIN, DataType::Int64),
    (od::DESTINATION, DataType::Int64),
    (demand::PURPOSE, DataType::Int64),
    (demand::CAR_AVAILABILITY, DataType::Int64),
    (demand::FH_PERIOD, DataType::String),
    (demand::TH_PERIOD, DataType::String),
    (demand::DEMAND, DataType::Float64),
];

/// Declared dtypes of the baseline splitting-factor table.
pub const SPLITTING_FACTORS: [(&str, DataType); 7] = [
    (od::ORIGIN, DataType::Int64),
    (od::DESTINATION, DataType::Int64),
    (demand::PURPOSE, DataType::Int64),
    (demand::CAR_AVAILABILITY, DataType::Int64),
    (demand::FH_PERIOD, DataType::String),
    (demand::TH_PERIOD, DataType::String),
    (splitting::FACTOR, DataType::Float64),
];

/// Declared dtypes of the purpose lookup.
pub const PURPOSE_LOOKUP: [(&str, DataType); 2] = [
    (purpose_lookup::PURPOSE, DataType::Int64),
    (purpose_lookup::UC_ID, DataType::Int64),
];

/// Output column order. Anything else produced along the way is dropped.
pub const OUTPUT_COLUMNS: [&str; 10] = [
    od::ORIGIN,
    od::DESTINATION,
    purpose_lookup::UC_ID,
    demand::CAR_AVAILABILITY,
    demand::MODE_ID,
    demand::FH_PERIOD,
    demand::TH_PERIOD,
    output::ORIGINAL_SPLITTING_FACTOR,
    output::DEMAND_SPLITTING_FACTOR,
    output::ADJUSTMENT_FACTOR,
];

/// Output dtypes, in `OUTPUT_COLUMNS` order.
pub const OUTPUT_DTYPES: [DataType; 10] = [
    DataType::Int64,
    DataType::Int64,
    DataType::Int64,
    DataType::Int64,
    DataType::Int64,
    DataType::String,
    DataType::String,
    DataType::Float64,
    DataType::Float64,
    DataType::Float64,
];
