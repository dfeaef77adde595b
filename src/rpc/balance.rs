//! Wallet balance lookup over JSON-RPC
//!
//! `RpcBalanceClient` sends a single `get_addresses` call and reads the
//! candidate balance of the first result. `BalanceQuery` wraps any
//! `BalanceSource` with the busy indicator and the last-known value shown to
//! the user. Failures surface as `WalletBalance::Unavailable`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// Source of raw on-chain balances (smallest unit)
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Candidate balance of `address`, `None` when the node returned no entry
    async fn candidate_balance(&self, address: &str) -> Result<Option<f64>>;
}

/// JSON-RPC client for a single node endpoint
pub struct RpcBalanceClient {
    client: Client,
    endpoint: String,
}

impl RpcBalanceClient {
    /// Create a client. `timeout = None` leaves timing to the transport.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self> {
        Self::new(config.endpoint.clone(), config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request envelope for one address
pub fn request_body(address: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "get_addresses",
        "params": [[address]],
        "id": 1
    })
}

#[async_trait]
impl BalanceSource for RpcBalanceClient {
    async fn candidate_balance(&self, address: &str) -> Result<Option<f64>> {
        debug!("Querying balance of {} at {}", address, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request_body(address))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteQuery(format!("RPC error {}: {}", status, body)));
        }

        let rpc: RpcResponse = response.json().await?;

        rpc.candidate_balance()
    }
}

/// JSON-RPC response shape
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

/// Nodes report errors either as an object or a bare string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RpcErrorBody {
    Object { message: String },
    Text(String),
}

impl RpcErrorBody {
    pub fn message(&self) -> &str {
        match self {
            RpcErrorBody::Object { message } => message,
            RpcErrorBody::Text(message) => message,
        }
    }
}

impl RpcResponse {
    /// Candidate balance of the first result entry
    pub fn candidate_balance(&self) -> Result<Option<f64>> {
        if let Some(error) = &self.error {
            return Err(Error::RemoteQuery(error.message().to_string()));
        }

        let first = match self.result.as_deref().and_then(|r| r.first()) {
            Some(first) => first,
            None => return Ok(None),
        };

        let raw = first
            .get("candidate_balance")
            .or_else(|| first.get("candidateBalance"))
            .ok_or_else(|| Error::RemoteQuery("Result has no candidate balance".to_string()))?;

        let amount = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        amount
            .filter(|a| a.is_finite())
            .map(Some)
            .ok_or_else(|| Error::RemoteQuery(format!("Malformed candidate balance: {}", raw)))
    }
}

/// Last fetched wallet balance as shown to the user
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalletBalance {
    /// Balance in whole units
    Available(f64),
    /// Query failed or returned nothing
    Unavailable,
}

impl std::fmt::Display for WalletBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletBalance::Available(amount) => write!(f, "{:.4}", amount),
            WalletBalance::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Clears the busy flag when dropped, whatever the outcome
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Balance lookups with a busy indicator and the last result
pub struct BalanceQuery<S: BalanceSource> {
    source: S,
    scale: f64,
    busy: AtomicBool,
    last: Mutex<Option<WalletBalance>>,
}

impl<S: BalanceSource> BalanceQuery<S> {
    /// `decimals` is the number of decimal places in the smallest unit
    pub fn new(source: S, decimals: u32) -> Self {
        Self {
            source,
            scale: 10f64.powi(decimals as i32),
            busy: AtomicBool::new(false),
            last: Mutex::new(None),
        }
    }

    /// Whether a lookup is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Result of the most recent completed lookup
    pub fn last_balance(&self) -> Option<WalletBalance> {
        self.last.lock().ok().and_then(|last| *last)
    }

    fn set_last(&self, balance: WalletBalance) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(balance);
        }
    }

    /// Fetch the balance of `address`
    ///
    /// Rejects blank addresses and overlapping calls. On a remote failure the
    /// last balance becomes `Unavailable` and the error is returned.
    pub async fn fetch(&self, address: &str) -> Result<WalletBalance> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::InvalidAddress);
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::QueryInFlight);
        }
        let _guard = BusyGuard(&self.busy);

        match self.source.candidate_balance(address).await {
            Ok(Some(raw)) => {
                let balance = WalletBalance::Available(raw / self.scale);
                info!("Wallet balance for {}: {}", address, balance);
                self.set_last(balance);
                Ok(balance)
            }
            Ok(None) => {
                info!("No balance entry for {}", address);
                self.set_last(WalletBalance::Unavailable);
                Ok(WalletBalance::Unavailable)
            }
            Err(e) => {
                warn!("Balance query for {} failed: {}", address, e);
                self.set_last(WalletBalance::Unavailable);
                Err(match e {
                    Error::RemoteQuery(msg) => Error::RemoteQuery(msg),
                    other => Error::RemoteQuery(other.to_string()),
                })
            }
        }
    }
}
