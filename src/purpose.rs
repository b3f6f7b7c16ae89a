use std::collections::BTreeSet;

use polars::prelude::*;

use crate::error::SplitError;
use crate::frame::{conform, left_join_ordered, require_columns, require_unique};
use crate::schema::{purpose_lookup, PURPOSE_LOOKUP};

/// Purpose id → uc_id, maintained outside this pipeline.
#[derive(Debug, Clone)]
pub struct PurposeUcLookup {
    df: DataFrame,
}

impl PurposeUcLookup {
    pub fn from_frame(raw: DataFrame) -> Result<Self, SplitError> {
        let df = conform(raw, &PURPOSE_LOOKUP)?
            .select([purpose_lookup::PURPOSE, purpose_lookup::UC_ID])?;
        require_unique(&df, &[purpose_lookup::PURPOSE], "purpose lookup")?;
        Ok(Self { df })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    /// uc_id for a single purpose id.
    pub fn uc_id(&self, purpose: i64) -> Result<i64, SplitError> {
        let purposes = self.df.column(purpose_lookup::PURPOSE)?.i64()?;
        let uc_ids = self.df.column(purpose_lookup::UC_ID)?.i64()?;
        purposes
            .into_iter()
            .zip(uc_ids)
            .find_map(|(p, uc)| if p == Some(purpose) { uc } else { None })
            .ok_or_else(|| SplitError::UnmappedPurpose(vec![purpose]))
    }
}

/// Replace the `Purpose` column of `df` by its `uc_id`.
///
/// A purpose id with no lookup row fails the whole table with
/// `UnmappedPurpose` rather than producing null uc_ids. Rows with a null
/// Purpose fail with `InvalidData`.
pub fn map_to_uc(df: &DataFrame, lookup: &PurposeUcLookup) -> Result<DataFrame, SplitError> {
    require_columns(df, &[purpose_lookup::PURPOSE])?;

    let null_purposes = df.column(purpose_lookup::PURPOSE)?.null_count();
    if null_purposes > 0 {
        return Err(SplitError::InvalidData(format!(
            "{null_purposes} rows with null {}",
            purpose_lookup::PURPOSE
        )));
    }

    let joined = left_join_ordered(
        df,
        lookup.frame().clone().lazy(),
        &[purpose_lookup::PURPOSE],
    )?;

    let unmapped = joined
        .clone()
        .lazy()
        .filter(col(purpose_lookup::UC_ID).is_null())
        .select([col(purpose_lookup::PURPOSE)])
        .collect()?;
    if unmapped.height() > 0 {
        let missing: BTreeSet<i64> = unmapped
            .column(purpose_lookup::PURPOSE)?
            .i64()?
            .into_iter()
            .flatten()
            .collect();
        return Err(SplitError::UnmappedPurpose(missing.into_iter().collect()));
    }

    // uc_id takes Purpose's place in the column order
    let order: Vec<Expr> = df
        .get_column_names_str()
        .iter()
        .map(|c| {
            if *c == purpose_lookup::PURPOSE {
                col(purpose_lookup::UC_ID)
            } else {
                col(*c)
            }
        })
        .collect();

    Ok(joined.lazy().select(order).collect()?)
}
