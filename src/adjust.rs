use polars::prelude::*;

use crate::config::check_caps;
use crate::error::SplitError;
use crate::frame::{left_join_ordered, nan_as_null, require_columns, require_unique};
use crate::schema::{
    demand, output, splitting, FACTOR_GROUP_KEYS, GROUPED_KEYS, OUTPUT_COLUMNS, PERIOD_GROUP_KEYS,
};

/// Update baseline splitting factors from grouped internal demand.
///
/// `splitting_factors` needs the grouped-demand key (with `uc_id` and
/// `mode_id` already attached) plus `Factor`; `grouped_demand` needs the
/// same key plus `Demand`, at most one row per key.
///
/// Every baseline row is kept. Rows without demand support come out with a
/// null `demand_splitting_factor` and `adjustment_factor`. Within an
/// (Origin, Destination, uc_id, Car Availability, mode_id) group, periods
/// with null demand are left out of the group total. A group whose demand
/// totals zero gets no demand factor at all. NaN in `Factor` or `Demand` counts
/// as missing. `adjustment_factor` is null when the baseline factor is
/// missing or zero, and otherwise clamped to `[min_cap, max_cap]`.
pub fn adjust_splitting_factor(
    splitting_factors: &DataFrame,
    grouped_demand: &DataFrame,
    min_cap: f64,
    max_cap: f64,
) -> Result<DataFrame, SplitError> {
    check_caps(min_cap, max_cap)?;
    require_columns(splitting_factors, &GROUPED_KEYS)?;
    require_columns(splitting_factors, &[splitting::FACTOR])?;
    require_columns(grouped_demand, &GROUPED_KEYS)?;
    require_columns(grouped_demand, &[demand::DEMAND])?;
    require_unique(grouped_demand, &GROUPED_KEYS, "grouped demand")?;

    let mut baseline_cols: Vec<&str> = GROUPED_KEYS.to_vec();
    baseline_cols.push(splitting::FACTOR);
    let baseline = splitting_factors
        .select(baseline_cols)?
        .lazy()
        .with_column(nan_as_null(splitting::FACTOR))
        .collect()?;

    let mut demand_cols: Vec<&str> = GROUPED_KEYS.to_vec();
    demand_cols.push(demand::DEMAND);
    let observed = grouped_demand
        .select(demand_cols)?
        .lazy()
        .with_column(nan_as_null(demand::DEMAND));

    let merged = left_join_ordered(&baseline, observed, &GROUPED_KEYS)?;

    let period_group: Vec<Expr> = PERIOD_GROUP_KEYS.iter().map(|k| col(*k)).collect();
    let group_total = col(demand::DEMAND).sum().over(period_group);
    let null_factor = || lit(NULL).cast(DataType::Float64);

    let demand_factor = when(
        col(demand::DEMAND)
            .is_not_null()
            .and(group_total.clone().gt(lit(0.0))),
    )
    .then(col(demand::DEMAND) / group_total)
    .otherwise(null_factor())
    .alias(output::DEMAND_SPLITTING_FACTOR);

    let raw_adjustment = when(
        col(output::DEMAND_SPLITTING_FACTOR)
            .is_not_null()
            .and(col(splitting::FACTOR).is_not_null())
            .and(col(splitting::FACTOR).neq(lit(0.0))),
    )
    .then(col(output::DEMAND_SPLITTING_FACTOR) / col(splitting::FACTOR))
    .otherwise(null_factor());

    let adjustment = when(raw_adjustment.clone().lt(lit(min_cap)))
        .then(lit(min_cap))
        .when(raw_adjustment.clone().gt(lit(max_cap)))
        .then(lit(max_cap))
        .otherwise(raw_adjustment)
        .alias(output::ADJUSTMENT_FACTOR);

    let selection: Vec<Expr> = OUTPUT_COLUMNS
        .iter()
        .map(|name| match *name {
            output::ORIGINAL_SPLITTING_FACTOR => {
                col(splitting::FACTOR).alias(output::ORIGINAL_SPLITTING_FACTOR)
            }
            other => col(other),
        })
        .collect();

    let adjusted = merged
        .lazy()
        .with_column(demand_factor)
        .with_column(adjustment)
        .select(selection)
        .collect()?;

    Ok(adjusted)
}

/// Baseline factor groups (Origin, Destination, Purpose, Car Availability)
/// whose factors do not total 1 within `tolerance`, with their totals.
pub fn factor_total_deviations(
    splitting_factors: &DataFrame,
    tolerance: f64,
) -> Result<DataFrame, SplitError> {
    require_columns(splitting_factors, &FACTOR_GROUP_KEYS)?;
    require_columns(splitting_factors, &[splitting::FACTOR])?;

    let deviations = splitting_factors
        .clone()
        .lazy()
        .group_by_stable(FACTOR_GROUP_KEYS.iter().map(|k| col(*k)).collect::<Vec<_>>())
        .agg([col(splitting::FACTOR).sum().alias("factor_total")])
        .filter(
            col("factor_total")
                .gt(lit(1.0 + tolerance))
                .or(col("factor_total").lt(lit(1.0 - tolerance))),
        )
        .collect()?;

    Ok(deviations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_MAX_CAP, DEFAULT_MIN_CAP};
    use crate::schema::output::*;

    const TOL: f64 = 1e-9;

    fn baseline() -> DataFrame {
        df!(
            "Origin" => [1i64, 1, 1, 1, 2, 2],
            "Destination" => [2i64, 2, 2, 2, 1, 1],
            "uc_id" => [1i64, 1, 1, 1, 1, 1],
            "Car Availability" => [1i64, 1, 1, 1, 1, 1],
            "mode_id" => [3i64, 3, 3, 3, 3, 3],
            "FHPeriod" => ["AM", "PM", "IP", "OP", "AM", "PM"],
            "THPeriod" => ["PM", "AM", "IP", "OP", "PM", "AM"],
            "Factor" => [0.3, 0.2, 0.5, 0.0, 0.6, 0.4]
        )
        .unwrap()
    }

    fn grouped() -> DataFrame {
        df!(
            "Origin" => [1i64, 1, 1, 1],
            "Destination" => [2i64, 2, 2, 2],
            "uc_id" => [1i64, 1, 1, 1],
            "Car Availability" => [1i64, 1, 1, 1],
            "mode_id" => [3i64, 3, 3, 3],
            "FHPeriod" => ["AM", "PM", "IP", "OP"],
            "THPeriod" => ["PM", "AM", "IP", "OP"],
            "Demand" => [62.0, 3.0, 30.0, 5.0]
        )
        .unwrap()
    }

    fn f64_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name).unwrap().f64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_worked_example() {
        let factors = df!(
            "Origin" => [1i64, 1],
            "Destination" => [1i64, 1],
            "uc_id" => [1i64, 1],
            "Car Availability" => [1i64, 1],
            "mode_id" => [3i64, 3],
            "FHPeriod" => ["AM", "PM"],
            "THPeriod" => ["PM", "AM"],
            "Factor" => [0.6, 0.4]
        )
        .unwrap();
        let demand = df!(
            "Origin" => [1i64, 1],
            "Destination" => [1i64, 1],
            "uc_id" => [1i64, 1],
            "Car Availability" => [1i64, 1],
            "mode_id" => [3i64, 3],
            "FHPeriod" => ["AM", "PM"],
            "THPeriod" => ["PM", "AM"],
            "Demand" => [30.0, 90.0]
        )
        .unwrap();

        let out =
            adjust_splitting_factor(&factors, &demand, DEFAULT_MIN_CAP, DEFAULT_MAX_CAP).unwrap();
        let dsf = f64_values(&out, DEMAND_SPLITTING_FACTOR);
        assert!((dsf[0].unwrap() - 0.25).abs() < TOL);
        assert!((dsf[1].unwrap() - 0.75).abs() < TOL);
        let adj = f64_values(&out, ADJUSTMENT_FACTOR);
        assert_eq!(adj[0], Some(0.5));
        assert!((adj[1].unwrap() - 1.875).abs() < TOL);
    }

    #[test]
    fn test_output_schema() {
        let out = adjust_splitting_factor(&baseline(), &grouped(), 0.5, 2.0).unwrap();
        assert_eq!(out.get_column_names_str(), OUTPUT_COLUMNS.to_vec());
        assert_eq!(out.height(), baseline().height());
        assert_eq!(
            f64_values(&out, ORIGINAL_SPLITTING_FACTOR),
            f64_values(&baseline(), "Factor")
        );
    }

    #[test]
    fn test_demand_factors_sum_to_one_per_group() {
        let out = adjust_splitting_factor(&baseline(), &grouped(), 0.5, 2.0).unwrap();
        let total: f64 = f64_values(&out, DEMAND_SPLITTING_FACTOR)[..4]
            .iter()
            .flatten()
            .sum();
        assert!((total - 1.0).abs() < TOL);
    }

    #[test]
    fn test_unsupported_rows_kept_with_nulls() {
        let out = adjust_splitting_factor(&baseline(), &grouped(), 0.5, 2.0).unwrap();
        let dsf = f64_values(&out, DEMAND_SPLITTING_FACTOR);
        let adj = f64_values(&out, ADJUSTMENT_FACTOR);
        assert_eq!((dsf[4], dsf[5]), (None, None));
        assert_eq!((adj[4], adj[5]), (None, None));
    }

    #[test]
    fn test_zero_baseline_gives_null_adjustment() {
        let out = adjust_splitting_factor(&baseline(), &grouped(), 0.5, 2.0).unwrap();
        let dsf = f64_values(&out, DEMAND_SPLITTING_FACTOR);
        let adj = f64_values(&out, ADJUSTMENT_FACTOR);
        assert!((dsf[3].unwrap() - 0.05).abs() < TOL);
        assert_eq!(adj[3], None);
    }

    #[test]
    fn test_adjustment_within_caps() {
        for (min_cap, max_cap) in [(0.5, 2.0), (0.9, 1.1), (1.0, 1.0)] {
            let out = adjust_splitting_factor(&baseline(), &grouped(), min_cap, max_cap).unwrap();
            for value in f64_values(&out, ADJUSTMENT_FACTOR).into_iter().flatten() {
                assert!(value >= min_cap && value <= max_cap, "{value} outside caps");
            }
        }
        // raw ratios 0.62/0.3, 0.03/0.2, 0.3/0.5
        let out = adjust_splitting_factor(&baseline(), &grouped(), 0.5, 2.0).unwrap();
        let adj = f64_values(&out, ADJUSTMENT_FACTOR);
        assert_eq!(adj[0], Some(2.0));
        assert_eq!(adj[1], Some(0.5));
        assert!((adj[2].unwrap() - 0.6).abs() < TOL);
    }

    #[test]
    fn test_partial_null_periods_excluded_from_total() {
        let demand = grouped()
            .lazy()
            .filter(col("FHPeriod").neq(lit("OP")))
            .collect()
            .unwrap();
        let out = adjust_splitting_factor(&baseline(), &demand, 0.5, 2.0).unwrap();
        let dsf = f64_values(&out, DEMAND_SPLITTING_FACTOR);
        assert_eq!(dsf[3], None);
        let total: f64 = dsf[..3].iter().flatten().sum();
        assert!((total - 1.0).abs() < TOL);
        assert!((dsf[0].unwrap() - 62.0 / 95.0).abs() < TOL);
    }

    #[test]
    fn test_zero_demand_group_has_no_factor() {
        let demand = grouped()
            .lazy()
            .with_column(lit(0.0).alias("Demand"))
            .collect()
            .unwrap();
        let out = adjust_splitting_factor(&baseline(), &demand, 0.5, 2.0).unwrap();
        assert!(f64_values(&out, DEMAND_SPLITTING_FACTOR)
            .iter()
            .all(|v| v.is_none()));
    }

    #[test]
    fn test_nan_baseline_factor_gives_null_adjustment() {
        let factors = df!(
            "Origin" => [1i64, 1],
            "Destination" => [2i64, 2],
            "uc_id" => [1i64, 1],
            "Car Availability" => [1i64, 1],
            "mode_id" => [3i64, 3],
            "FHPeriod" => ["AM", "PM"],
            "THPeriod" => ["PM", "AM"],
            "Factor" => [f64::NAN, 0.5]
        )
        .unwrap();
        let demand = df!(
            "Origin" => [1i64, 1],
            "Destination" => [2i64, 2],
            "uc_id" => [1i64, 1],
            "Car Availability" => [1i64, 1],
            "mode_id" => [3i64, 3],
            "FHPeriod" => ["AM", "PM"],
            "THPeriod" => ["PM", "AM"],
            "Demand" => [1.0, 1.0]
        )
        .unwrap();
        let out = adjust_splitting_factor(&factors, &demand, 0.5, 2.0).unwrap();
        assert_eq!(f64_values(&out, ADJUSTMENT_FACTOR), vec![None, Some(1.0)]);
        assert_eq!(f64_values(&out, ORIGINAL_SPLITTING_FACTOR)[0], None);
    }

    #[test]
    fn test_nan_demand_treated_as_missing() {
        let demand = grouped()
            .lazy()
            .with_column(
                when(col("FHPeriod").eq(lit("OP")))
                    .then(lit(f64::NAN))
                    .otherwise(col("Demand"))
                    .alias("Demand"),
            )
            .collect()
            .unwrap();
        let out = adjust_splitting_factor(&baseline(), &demand, 0.5, 2.0).unwrap();
        let dsf = f64_values(&out, DEMAND_SPLITTING_FACTOR);
        assert_eq!(dsf[3], None);
        assert!((dsf[0].unwrap() - 62.0 / 95.0).abs() < TOL);
    }

    #[test]
    fn test_inverted_caps_rejected() {
        assert!(matches!(
            adjust_splitting_factor(&baseline(), &grouped(), 2.0, 0.5),
            Err(SplitError::InvalidCaps { .. })
        ));
    }

    #[test]
    fn test_repeated_demand_key_rejected() {
        let mut demand = grouped();
        demand.vstack_mut(&grouped().head(Some(1))).unwrap();
        assert!(matches!(
            adjust_splitting_factor(&baseline(), &demand, 0.5, 2.0),
            Err(SplitError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_factor_total_deviations() {
        let factors = df!(
            "Origin" => [1i64, 1, 2, 2],
            "Destination" => [1i64, 1, 2, 2],
            "Purpose" => [1i64, 1, 1, 1],
            "Car Availability" => [1i64, 1, 1, 1],
            "Factor" => [0.6, 0.4, 0.6, 0.6]
        )
        .unwrap();
        let deviations = factor_total_deviations(&factors, 1e-6).unwrap();
        assert_eq!(deviations.height(), 1);
        let o = deviations.column("Origin").unwrap().i64().unwrap();
        assert_eq!(o.get(0), Some(2));
    }
}
