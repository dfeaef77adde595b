//! Operation identifiers for deposits and withdrawals
//!
//! Identifiers are display/audit labels, not transaction keys: unique with
//! overwhelming probability (millisecond timestamp plus random suffix), never
//! guaranteed.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of the random disambiguator
const SUFFIX_LEN: usize = 9;

const DELIMITER: char = '-';

/// Kind of state-mutating operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit,
    Withdraw,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Deposit => write!(f, "deposit"),
            OperationKind::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// Generated identifier, e.g. `DEPOSIT-1700000000000-K3J9QZ0AB`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(String);

impl OperationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces identifiers and remembers the most recent one
#[derive(Debug, Default)]
pub struct OperationLedger {
    last: Option<OperationId>,
}

impl OperationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate an identifier for `kind` and retain it as the latest
    pub fn record(&mut self, kind: OperationKind) -> OperationId {
        let id = generate(kind);
        self.last = Some(id.clone());
        id
    }

    pub fn last(&self) -> Option<&OperationId> {
        self.last.as_ref()
    }
}

/// Build `KIND-<millis>-<SUFFIX>` from the current time
pub fn generate(kind: OperationKind) -> OperationId {
    generate_at(kind, Utc::now().timestamp_millis())
}

/// Build an identifier for an explicit timestamp
pub fn generate_at(kind: OperationKind, timestamp_ms: i64) -> OperationId {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();

    let raw = format!("{kind}{DELIMITER}{timestamp_ms}{DELIMITER}{suffix}");
    OperationId(raw.to_uppercase())
}
