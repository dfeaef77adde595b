//! Vault state and compounding engine
//!
//! ```text
//! Vault (manager) ─┬─ VaultState      balance rules
//!                  ├─ OperationLedger operation identifiers
//!                  ├─ CompoundingEngine + SchedulerState
//!                  └─ PersistenceStore
//! ```

pub mod compounding;
pub mod ledger;
pub mod manager;
pub mod state;

pub use compounding::{CompoundingEngine, SchedulerState, TickOutcome};
pub use ledger::{OperationId, OperationKind, OperationLedger};
pub use manager::{Vault, VaultSummary};
pub use state::{format_amount, format_apy, VaultState, BASE_APY};
