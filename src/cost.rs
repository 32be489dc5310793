//! The cost model (C4): IO + CPU cost with an infinity sentinel, plus the
//! fixed cost-table constants and the two lower-bound helpers the search
//! space uses for branch-and-bound pruning.

use serde::{Deserialize, Serialize};

use crate::properties::LogicalProperties;

/// CPU cost of reading and copying one tuple.
pub const CPU_READ: f64 = 3e-5;
/// Cost of moving a qualifying tuple through a plan once (the group lower
/// bound's per-tuple rate).
pub const TOUCH_COPY: f64 = 1e-5;
pub const PREDICATE: f64 = 1e-5;
pub const APPLY: f64 = 2e-5;
pub const COMPARE_MOVE: f64 = 3e-5;
pub const HASH_COST: f64 = 2e-5;
pub const HASH_PROBE: f64 = 1e-5;
pub const INDEX_PROBE: f64 = 1e-5;
pub const BLOCK_FACTOR_TABLE: f64 = 100.0;
pub const BLOCK_FACTOR_INDEX: f64 = 1000.0;
pub const BLOCK_FACTOR_BITMAP: f64 = 10000.0;
pub const RANDOM_IO: f64 = 0.03;
pub const SEQUENTIAL_IO: f64 = 0.0075;

/// Either an unreachable plan's cost, or a finite `(io, cpu)` pair.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Cost {
    Infinite,
    Finite { io: f64, cpu: f64 },
}

impl Cost {
    pub fn zero() -> Self {
        Cost::Finite { io: 0.0, cpu: 0.0 }
    }

    pub fn finite(io: f64, cpu: f64) -> Self {
        Cost::Finite { io, cpu }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Cost::Infinite)
    }

    /// `total = io + cpu`. Panics on `Infinite` — callers that need a
    /// numeric upper bound for comparisons should check `is_infinite`
    /// first, matching the "cost comparison between two infinities is a
    /// programming error" invariant (§3.7).
    pub fn total(&self) -> f64 {
        match self {
            Cost::Infinite => f64::INFINITY,
            Cost::Finite { io, cpu } => io + cpu,
        }
    }

    pub fn io(&self) -> f64 {
        match self {
            Cost::Infinite => f64::INFINITY,
            Cost::Finite { io, .. } => *io,
        }
    }

    pub fn cpu(&self) -> f64 {
        match self {
            Cost::Infinite => f64::INFINITY,
            Cost::Finite { cpu, .. } => *cpu,
        }
    }
}

impl std::ops::Add for Cost {
    type Output = Cost;
    fn add(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Cost::Infinite, _) | (_, Cost::Infinite) => Cost::Infinite,
            (Cost::Finite { io: a_io, cpu: a_cpu }, Cost::Finite { io: b_io, cpu: b_cpu }) => {
                Cost::Finite {
                    io: a_io + b_io,
                    cpu: a_cpu + b_cpu,
                }
            }
        }
    }
}

impl std::ops::Sub for Cost {
    type Output = Cost;
    /// Clamped at zero: a negative component is never meaningful for this
    /// cost model.
    fn sub(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Cost::Infinite, Cost::Infinite) => {
                panic!("cost invariant violated: comparing/combining two infinite costs")
            }
            (Cost::Infinite, _) => Cost::Infinite,
            (_, Cost::Infinite) => Cost::zero(),
            (Cost::Finite { io: a_io, cpu: a_cpu }, Cost::Finite { io: b_io, cpu: b_cpu }) => {
                Cost::Finite {
                    io: (a_io - b_io).max(0.0),
                    cpu: (a_cpu - b_cpu).max(0.0),
                }
            }
        }
    }
}

impl std::ops::Mul<f64> for Cost {
    type Output = Cost;
    fn mul(self, rhs: f64) -> Cost {
        match self {
            Cost::Infinite => Cost::Infinite,
            Cost::Finite { io, cpu } => Cost::Finite {
                io: io * rhs,
                cpu: cpu * rhs,
            },
        }
    }
}

impl std::ops::Div<f64> for Cost {
    type Output = Cost;
    fn div(self, rhs: f64) -> Cost {
        match self {
            Cost::Infinite => Cost::Infinite,
            Cost::Finite { io, cpu } => Cost::Finite {
                io: io / rhs,
                cpu: cpu / rhs,
            },
        }
    }
}

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cost::Infinite, Cost::Infinite) => {
                panic!("cost invariant violated: comparing two infinite costs")
            }
            (Cost::Infinite, _) | (_, Cost::Infinite) => false,
            _ => self.total() == other.total(),
        }
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Cost::Infinite, Cost::Infinite) => {
                panic!("cost invariant violated: comparing two infinite costs")
            }
            (Cost::Infinite, _) => Some(std::cmp::Ordering::Greater),
            (_, Cost::Infinite) => Some(std::cmp::Ordering::Less),
            _ => self.total().partial_cmp(&other.total()),
        }
    }
}

/// A loose lower bound on any plan for the given logical properties: the
/// cost of touching and copying every qualifying tuple once. Used as
/// `Group::lower_bound`.
pub fn touch_copy_cost(
    props: &LogicalProperties,
    max_column_unique_cardinality_per_table: &[f64],
) -> Cost {
    let (_, cardinality, unique_cardinality, _, is_base_table) = match props.as_collection() {
        Some(v) => v,
        None => return Cost::zero(),
    };
    if is_base_table {
        return Cost::zero();
    }
    let sum_max_uc: f64 = max_column_unique_cardinality_per_table.iter().sum();
    let min = unique_cardinality.min(cardinality);
    let max = unique_cardinality.max(cardinality);
    // sum_over_base_tables(max-col-UC(t)) + cardinality - min - max
    let estimate = sum_max_uc + cardinality - min - max;
    Cost::finite(0.0, estimate.max(0.0) * TOUCH_COPY)
}

/// Expected IO to read the base-table blocks implied by the max column
/// unique cardinality, added to the lower bound under column-UC pruning.
pub fn fetching_cost(base_table_uc_and_width: &[(f64, u64)]) -> Cost {
    let mut io = 0.0;
    let mut cpu = 0.0;
    for &(max_uc, width) in base_table_uc_and_width {
        let blocks = (max_uc * width as f64).ceil();
        io += blocks * RANDOM_IO;
        cpu += CPU_READ;
    }
    Cost::finite(io, cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinity_propagates_through_arithmetic() {
        let a = Cost::Infinite;
        let b = Cost::finite(1.0, 1.0);
        assert!((a + b).is_infinite());
        assert!((b + a).is_infinite());
        assert!((a * 2.0).is_infinite());
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn comparing_two_infinities_panics() {
        let a = Cost::Infinite;
        let b = Cost::Infinite;
        let _ = a < b;
    }

    #[test]
    fn total_is_io_plus_cpu() {
        let c = Cost::finite(0.03, 0.001);
        assert!((c.total() - 0.031).abs() < 1e-9);
    }

    #[test]
    fn subtraction_clamps_at_zero() {
        let a = Cost::finite(1.0, 1.0);
        let b = Cost::finite(2.0, 2.0);
        let diff = a - b;
        assert_eq!(diff.total(), 0.0);
    }

    #[test]
    fn ordering_by_total() {
        let cheap = Cost::finite(0.01, 0.0);
        let pricey = Cost::finite(0.02, 0.0);
        assert!(cheap < pricey);
    }
}
