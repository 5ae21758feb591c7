//! arb-engine: the scan-and-decide core.
//!
//! Pure evaluation over cycle-local data: constant-product math, the
//! precomputed sizing grid, the candidate filter pipeline, and ABI calldata
//! assembly for the atomic execution transaction.

pub mod amm;
pub mod calldata;
pub mod evaluator;
pub mod sizing;

pub use evaluator::{CycleStats, Evaluator, Opportunity, Thresholds};
pub use sizing::SizingGrid;
