use polars::prelude::*;

use crate::error::SplitError;
use crate::frame::require_columns;
use crate::schema::{demand, GROUPED_KEYS};

/// Sum `Demand` per (Origin, Destination, uc_id, Car Availability, mode_id,
/// FHPeriod, THPeriod).
///
/// Keys come out in order of first appearance. Keys whose demand totals zero
/// are kept. Any column outside the key and `Demand` is dropped.
pub fn group_demand_by_purpose(df: &DataFrame) -> Result<DataFrame, SplitError> {
    require_columns(df, &GROUPED_KEYS)?;
    require_columns(df, &[demand::DEMAND])?;

    let grouped = df
        .clone()
        .lazy()
        .group_by_stable(GROUPED_KEYS.iter().map(|k| col(*k)).collect::<Vec<_>>())
        .agg([col(demand::DEMAND).sum().alias(demand::DEMAND)])
        .collect()?;

    Ok(grouped)
}
