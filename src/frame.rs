use polars::prelude::*;

use crate::error::SplitError;

pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), SplitError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(SplitError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

/// Float column `name` with NaN read as missing.
pub fn nan_as_null(name: &str) -> Expr {
    let value = col(name).cast(DataType::Float64);
    when(value.clone().is_nan())
        .then(lit(NULL).cast(DataType::Float64))
        .otherwise(value)
        .alias(name)
}

/// Check `df` carries every declared column and cast each to its declared
/// dtype. String columns are trimmed before numeric casts; values that do not
/// parse become null, and so does NaN in a float column. Undeclared columns
/// pass through untouched.
pub fn conform(df: DataFrame, declared: &[(&str, DataType)]) -> Result<DataFrame, SplitError> {
    let names: Vec<&str> = declared.iter().map(|(name, _)| *name).collect();
    require_columns(&df, &names)?;

    let schema = df.schema();
    let casts: Vec<Expr> = declared
        .iter()
        .map(|(name, dtype)| {
            let is_string = matches!(schema.get(name), Some(DataType::String));
            if is_string && matches!(dtype, DataType::Int64 | DataType::Float64) {
                col(*name)
                    .str()
                    .strip_chars(lit(" \t\r\n"))
                    .cast(dtype.clone())
            } else {
                col(*name).cast(dtype.clone())
            }
        })
        .collect();
    let floats: Vec<Expr> = declared
        .iter()
        .filter(|(_, dtype)| matches!(dtype, DataType::Float64))
        .map(|(name, _)| nan_as_null(name))
        .collect();

    Ok(df.lazy().with_columns(casts).with_columns(floats).collect()?)
}

const ROW_INDEX: &str = "_row_index";

/// Left join `right` onto `left` on `keys`, returning rows in `left`'s order.
pub fn left_join_ordered(
    left: &DataFrame,
    right: LazyFrame,
    keys: &[&str],
) -> Result<DataFrame, SplitError> {
    let on: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let joined = left
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(right, on.clone(), on, JoinArgs::new(JoinType::Left))
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?;
    Ok(joined.drop(ROW_INDEX)?)
}

/// Reject a table holding more than one row per `keys` tuple.
pub fn require_unique(df: &DataFrame, keys: &[&str], table: &'static str) -> Result<(), SplitError> {
    let repeated = df
        .clone()
        .lazy()
        .group_by(keys.iter().map(|k| col(*k)).collect::<Vec<_>>())
        .agg([col(keys[0]).count().alias("_row_count")])
        .filter(col("_row_count").gt(lit(1)))
        .collect()?;

    if repeated.height() > 0 {
        return Err(SplitError::DuplicateKey {
            table,
            key: keys.join(", "),
            count: repeated.height(),
        });
    }
    Ok(())
}
