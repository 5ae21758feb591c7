//! arb-exec: the execution stage.
//!
//! Takes opportunities the evaluator emitted, re-verifies them against
//! fresh on-chain state, proves viability with an `eth_call` pre-flight,
//! and only then signs and submits the atomic transaction.

pub mod executor;
pub mod revert;

pub use executor::{Executor, ExecutorConfig, Outcome};
