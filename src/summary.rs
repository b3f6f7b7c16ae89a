use std::fmt;
use std::ops::AddAssign;

use polars::prelude::*;

use crate::error::SplitError;
use crate::frame::require_columns;
use crate::schema::output;

/// Row counts describing how an adjusted factor table came out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentSummary {
    pub rows: usize,
    /// Baseline rows with no demand behind them.
    pub without_demand: usize,
    pub null_adjustment: usize,
    pub clamped_low: usize,
    pub clamped_high: usize,
}

impl AdjustmentSummary {
    pub fn from_output(df: &DataFrame, min_cap: f64, max_cap: f64) -> Result<Self, SplitError> {
        require_columns(
            df,
            &[output::DEMAND_SPLITTING_FACTOR, output::ADJUSTMENT_FACTOR],
        )?;
        let demand_factor = df.column(output::DEMAND_SPLITTING_FACTOR)?.f64()?;
        let adjustment = df.column(output::ADJUSTMENT_FACTOR)?.f64()?;

        let mut summary = Self {
            rows: df.height(),
            without_demand: demand_factor.null_count(),
            null_adjustment: adjustment.null_count(),
            ..Default::default()
        };
        for value in adjustment.into_iter().flatten() {
            if value <= min_cap {
                summary.clamped_low += 1;
            } else if value >= max_cap {
                summary.clamped_high += 1;
            }
        }
        Ok(summary)
    }
}

impl AddAssign for AdjustmentSummary {
    fn add_assign(&mut self, other: Self) {
        self.rows += other.rows;
        self.without_demand += other.without_demand;
        self.null_adjustment += other.null_adjustment;
        self.clamped_low += other.clamped_low;
        self.clamped_high += other.clamped_high;
    }
}

impl fmt::Display for AdjustmentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows, {} without demand, {} null adjustment, {} at min cap, {} at max cap",
            self.rows,
            self.without_demand,
            self.null_adjustment,
            self.clamped_low,
            self.clamped_high
        )
    }
}
