use std::fmt;

use itertools::iproduct;
use serde::{Deserialize, Serialize};

/// The four dimensions a demand file set is resolved over.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct DimensionSet {
    pub years: Vec<u32>,
    pub car_availability_classes: Vec<i64>,
    pub modes: Vec<i64>,
    pub purposes: Vec<i64>,
}

impl DimensionSet {
    /// Number of demand files a resolved set over these dimensions must hold.
    pub fn expected_file_count(&self) -> usize {
        self.years.len()
            * self.car_availability_classes.len()
            * self.modes.len()
            * self.purposes.len()
    }

    /// Cartesian product of all four dimensions, year outermost.
    pub fn combinations(&self) -> Vec<Combination> {
        iproduct!(
            self.years.iter(),
            self.car_availability_classes.iter(),
            self.modes.iter(),
            self.purposes.iter()
        )
        .map(|(&year, &car_availability, &mode, &purpose)| Combination {
            year,
            car_availability,
            mode,
            purpose,
        })
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.expected_file_count() == 0
    }
}

impl fmt::Display for DimensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "years={:?} ca={:?} modes={:?} purposes={:?}",
            self.years, self.car_availability_classes, self.modes, self.purposes
        )
    }
}

/// One (year, car availability, mode, purpose) unit of work.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Combination {
    pub year: u32,
    pub car_availability: i64,
    pub mode: i64,
    pub purpose: i64,
}

impl From<Combination> for DimensionSet {
    fn from(c: Combination) -> Self {
        DimensionSet {
            years: vec![c.year],
            car_availability_classes: vec![c.car_availability],
            modes: vec![c.mode],
            purposes: vec![c.purpose],
        }
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "yr{}_ca{}_m{}_p{}",
            self.year, self.car_availability, self.mode, self.purpose
        )
    }
}
