//! Yield Vault Library
//!
//! Simulated yield-bearing vault with timer-driven auto-compounding,
//! durable JSON snapshots and an on-chain wallet balance lookup.

pub mod cli;
pub mod config;
pub mod error;
pub mod rpc;
pub mod storage;
pub mod vault;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use vault::{Vault, VaultState, VaultSummary};
