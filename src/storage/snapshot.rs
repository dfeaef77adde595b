//! Vault snapshot persistence under a fixed key

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::KeyValueStore;
use crate::error::{Error, Result};
use crate::vault::state::VaultState;

/// Fields recovered from a stored snapshot
///
/// Each field is `None` when absent or of the wrong shape, so the caller's
/// default survives for that field only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialVaultState {
    pub balance: Option<f64>,
    pub earnings: Option<f64>,
    pub apy: Option<f64>,
    pub auto_compound: Option<bool>,
}

impl PartialVaultState {
    /// Pick valid fields out of a JSON object, ignoring unknown keys
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            balance: non_negative(object.get("balance")),
            earnings: non_negative(object.get("earnings")),
            apy: object
                .get("apy")
                .and_then(Value::as_f64)
                .filter(|apy| apy.is_finite()),
            auto_compound: object.get("autoCompound").and_then(Value::as_bool),
        }
    }

    /// Overlay present fields onto `state`
    pub fn apply_to(&self, state: &mut VaultState) {
        if let Some(balance) = self.balance {
            state.balance = balance;
        }
        if let Some(earnings) = self.earnings {
            state.earnings = earnings;
        }
        if let Some(apy) = self.apy {
            state.apy = apy;
        }
        if let Some(auto_compound) = self.auto_compound {
            state.auto_compound = auto_compound;
        }
    }

    /// Defaults with present fields overlaid
    pub fn overlay(&self, defaults: VaultState) -> VaultState {
        let mut state = defaults;
        self.apply_to(&mut state);
        state
    }
}

fn non_negative(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Loads and saves the vault snapshot under one fixed key
#[derive(Clone)]
pub struct PersistenceStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl PersistenceStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the stored snapshot
    ///
    /// `Ok(None)` when nothing is stored. Unparseable content or a non-object
    /// value is a `PersistenceRead` error; the caller keeps its defaults.
    pub fn load(&self) -> Result<Option<PartialVaultState>> {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(Error::PersistenceRead(msg)) => return Err(Error::PersistenceRead(msg)),
            Err(e) => return Err(Error::PersistenceRead(e.to_string())),
        };

        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::PersistenceRead(format!("corrupt snapshot: {}", e)))?;

        match value {
            Value::Object(object) => Ok(Some(PartialVaultState::from_object(&object))),
            other => Err(Error::PersistenceRead(format!(
                "snapshot is not an object: {}",
                other
            ))),
        }
    }

    /// Serialize the full state and overwrite the stored snapshot
    pub fn save(&self, state: &VaultState) -> Result<()> {
        let data = serde_json::to_string(state)
            .map_err(|e| Error::PersistenceWrite(e.to_string()))?;

        match self.backend.set(&self.key, &data) {
            Ok(()) => {
                debug!("Saved vault snapshot under {}", self.key);
                Ok(())
            }
            Err(Error::PersistenceWrite(msg)) => Err(Error::PersistenceWrite(msg)),
            Err(e) => Err(Error::PersistenceWrite(e.to_string())),
        }
    }
}

impl std::fmt::Debug for PersistenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
