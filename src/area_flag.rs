use polars::prelude::*;

use crate::error::SplitError;
use crate::frame::{conform, left_join_ordered, require_columns, require_unique};
use crate::schema::{area_flag::AREA_FLAG, demand, od};

/// Zone-pair classification, one row per (Origin, Destination).
///
/// The flag column is renamed to `area_flag` on the way in so nothing
/// downstream depends on the source table's naming.
#[derive(Debug, Clone)]
pub struct AreaFlagTable {
    df: DataFrame,
}

impl AreaFlagTable {
    /// Build from a raw table holding Origin, Destination and `flag_column`.
    pub fn from_frame(raw: DataFrame, flag_column: &str) -> Result<Self, SplitError> {
        require_columns(&raw, &[od::ORIGIN, od::DESTINATION, flag_column])?;

        let renamed = raw
            .lazy()
            .select([
                col(od::ORIGIN),
                col(od::DESTINATION),
                col(flag_column).alias(AREA_FLAG),
            ])
            .collect()?;
        let df = conform(
            renamed,
            &[
                (od::ORIGIN, DataType::Int64),
                (od::DESTINATION, DataType::Int64),
                (AREA_FLAG, DataType::Int64),
            ],
        )?;
        require_unique(&df, &od::KEYS, "area flags")?;

        Ok(Self { df })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }
}

/// Left-join `area_flag` onto an OD-indexed table. Every input row and
/// column survives; pairs missing from the flag table get a null flag.
pub fn join_area_flag(df: &DataFrame, area_flags: &AreaFlagTable) -> Result<DataFrame, SplitError> {
    require_columns(df, &od::KEYS)?;

    left_join_ordered(df, area_flags.frame().clone().lazy(), &od::KEYS)
}

/// Keep only the rows whose zone pair is flagged `internal_flag`.
///
/// Null flags and flags outside the expected range go through the same
/// equality test, so they never match. An empty result is not an error.
/// Applying this to its own output returns the same rows.
pub fn extract_internal_demand(
    df: &DataFrame,
    area_flags: &AreaFlagTable,
    internal_flag: i64,
) -> Result<DataFrame, SplitError> {
    let flagged = if df.column(AREA_FLAG).is_ok() {
        df.drop(AREA_FLAG)?
    } else {
        df.clone()
    };

    let internal = join_area_flag(&flagged, area_flags)?
        .lazy()
        .filter(col(AREA_FLAG).eq(lit(internal_flag)))
        .collect()?;

    Ok(internal)
}

/// Total demand per area flag, with unmatched pairs under a null flag.
/// Sorted by flag, nulls last.
pub fn area_flag_report(df: &DataFrame, area_flags: &AreaFlagTable) -> Result<DataFrame, SplitError> {
    require_columns(df, &[demand::DEMAND])?;

    let report = join_area_flag(df, area_flags)?
        .lazy()
        .group_by([col(AREA_FLAG)])
        .agg([
            col(demand::DEMAND).sum().alias(demand::DEMAND),
            col(demand::DEMAND).count().alias("rows"),
        ])
        .sort(
            [AREA_FLAG],
            SortMultipleOptions::default().with_nulls_last(true),
        )
        .collect()?;

    Ok(report)
}
