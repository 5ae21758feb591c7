//! arb-rpc crate
//!
//! Chain I/O layer: JSON-RPC client with endpoint rotation, batched
//! `eth_call` fan-out, and the persistent caches the scanner reads from.

pub mod batch;
pub mod client;
pub mod decimals;
pub mod error;
pub mod reserves;
pub mod resolver;
pub mod types;

pub use client::RpcClient;
pub use error::RpcError;
pub use types::{Candidate, CandidateLeg, DexDescriptor, DexKind, PairReserves};
