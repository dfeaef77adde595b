//! Vault manager
//!
//! Owns the vault state, the operation ledger and the compounding scheduler
//! behind a single mutex, and writes a snapshot after every mutation.
//! Persistence failures are logged and never fail the mutation that caused
//! them; the in-memory state stays authoritative for the session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::{KeyValueStore, PersistenceStore};
use crate::vault::compounding::{ActiveTimer, CompoundingEngine, SchedulerState, TickOutcome};
use crate::vault::ledger::{OperationId, OperationKind, OperationLedger};
use crate::vault::state::{format_amount, format_apy, VaultState};

/// Everything guarded by the vault mutex
#[derive(Debug, Default)]
struct Inner {
    state: VaultState,
    scheduler: SchedulerState,
    ledger: OperationLedger,
    next_generation: u64,
    last_persistence_error: Option<String>,
}

impl Inner {
    fn persist(&mut self, store: &PersistenceStore) {
        match store.save(&self.state) {
            Ok(()) => self.last_persistence_error = None,
            Err(e) => {
                warn!("Failed to persist vault state: {}", e);
                self.last_persistence_error = Some(e.to_string());
            }
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether the timer task keeps running after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickControl {
    Continue,
    Stop,
}

/// Plain-value view of the vault for display
#[derive(Debug, Clone, PartialEq)]
pub struct VaultSummary {
    pub balance: f64,
    pub earnings: f64,
    pub apy: f64,
    pub auto_compound: bool,
    pub last_operation: Option<OperationId>,
}

impl VaultSummary {
    pub fn balance_display(&self) -> String {
        format_amount(self.balance)
    }

    pub fn earnings_display(&self) -> String {
        format_amount(self.earnings)
    }

    pub fn apy_display(&self) -> String {
        format_apy(self.apy)
    }
}

/// The simulated vault
pub struct Vault {
    inner: Arc<Mutex<Inner>>,
    store: PersistenceStore,
    engine: CompoundingEngine,
    /// Idle vaults record the auto-compound flag but never run a timer
    schedule: bool,
}

impl Vault {
    /// Open a vault from configuration over the given storage backend
    pub fn from_config(config: &Config, backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let store = PersistenceStore::new(backend, config.storage.state_key.clone());
        Self::open(
            store,
            CompoundingEngine::from_config(&config.vault),
            config.vault.base_apy,
        )
    }

    /// Open a vault from configuration without a compounding timer
    pub fn idle_from_config(config: &Config, backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let store = PersistenceStore::new(backend, config.storage.state_key.clone());
        Self::open_idle(
            store,
            CompoundingEngine::from_config(&config.vault),
            config.vault.base_apy,
        )
    }

    /// Load the persisted snapshot over fresh defaults
    ///
    /// A snapshot that had auto-compound on resumes the scheduler when the
    /// balance allows it; with no balance the flag is cleared and persisted.
    /// Outside a tokio runtime the flag is cleared in memory only and the
    /// saved snapshot keeps it.
    pub fn open(store: PersistenceStore, engine: CompoundingEngine, base_apy: f64) -> Result<Self> {
        let state = load_state(&store, base_apy);
        let resume = state.auto_compound;

        let vault = Self::assemble(
            VaultState {
                auto_compound: false,
                ..state
            },
            store,
            engine,
            true,
        );

        if resume {
            match vault.set_auto_compound(true) {
                Ok(()) => info!("Resumed auto-compound from saved state"),
                Err(Error::AutoCompoundRequiresFunds) => {
                    warn!("Saved state had auto-compound on with no balance; cleared it")
                }
                Err(e) => warn!("Auto-compound not resumed: {}", e),
            }
        }

        Ok(vault)
    }

    /// Load the persisted snapshot for a single operation
    ///
    /// The saved auto-compound flag is kept as loaded and written back
    /// unchanged by later mutations. No timer is ever started, so balances
    /// only change through explicit operations.
    pub fn open_idle(
        store: PersistenceStore,
        engine: CompoundingEngine,
        base_apy: f64,
    ) -> Result<Self> {
        let state = load_state(&store, base_apy);
        Ok(Self::assemble(state, store, engine, false))
    }

    fn assemble(
        state: VaultState,
        store: PersistenceStore,
        engine: CompoundingEngine,
        schedule: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                ..Inner::default()
            })),
            store,
            engine,
            schedule,
        }
    }

    /// Deposit `amount` into the vault
    pub fn deposit(&self, amount: f64) -> Result<OperationId> {
        let mut inner = lock(&self.inner);
        inner.state.deposit(amount)?;

        let id = inner.ledger.record(OperationKind::Deposit);
        info!(
            "Deposited {} (balance {}) [{}]",
            format_amount(amount),
            format_amount(inner.state.balance),
            id
        );

        inner.persist(&self.store);
        Ok(id)
    }

    /// Withdraw `amount` from the vault; tracked earnings reset to zero
    pub fn withdraw(&self, amount: f64) -> Result<OperationId> {
        let mut inner = lock(&self.inner);
        inner.state.withdraw(amount)?;

        let id = inner.ledger.record(OperationKind::Withdraw);
        info!(
            "Withdrew {} (balance {}) [{}]",
            format_amount(amount),
            format_amount(inner.state.balance),
            id
        );

        inner.persist(&self.store);
        Ok(id)
    }

    /// Switch auto-compounding on or off
    ///
    /// Enabling requires a positive balance and is a no-op while already
    /// active. Disabling cancels the timer before returning, so no tick
    /// applies afterwards. The flag is persisted in every case. An idle vault
    /// only records the flag.
    pub fn set_auto_compound(&self, enabled: bool) -> Result<()> {
        let mut inner = lock(&self.inner);

        if !enabled {
            if inner.scheduler.stop() {
                info!("Auto-compound stopped");
            }
            inner.state.auto_compound = false;
            inner.persist(&self.store);
            return Ok(());
        }

        if !inner.state.has_funds() {
            inner.state.auto_compound = false;
            inner.persist(&self.store);
            return Err(Error::AutoCompoundRequiresFunds);
        }

        if self.schedule && !inner.scheduler.is_active() {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| Error::Runtime(e.to_string()))?;

            let generation = inner.next_generation;
            inner.next_generation += 1;
            let timer = self.spawn_timer(&runtime, generation);
            inner.scheduler = SchedulerState::Active(timer);

            info!(
                "Auto-compound started (every {}ms)",
                self.engine.interval().as_millis()
            );
        }

        inner.state.auto_compound = true;
        inner.persist(&self.store);
        Ok(())
    }

    fn spawn_timer(&self, runtime: &tokio::runtime::Handle, generation: u64) -> ActiveTimer {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = Arc::clone(&self.inner);
        let store = self.store.clone();
        let engine = self.engine;

        // interval_at panics on a zero period
        let period = engine.interval().max(Duration::from_millis(1));
        let start = Instant::now() + period;

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if run_tick(&inner, &store, &engine, generation) == TickControl::Stop {
                            break;
                        }
                    }
                }
            }

            debug!("Compounding timer {} exited", generation);
        });

        ActiveTimer {
            generation,
            cancel,
            handle,
        }
    }

    /// Current state by value
    pub fn state(&self) -> VaultState {
        lock(&self.inner).state
    }

    pub fn balance(&self) -> f64 {
        lock(&self.inner).state.balance
    }

    pub fn earnings(&self) -> f64 {
        lock(&self.inner).state.earnings
    }

    pub fn apy(&self) -> f64 {
        lock(&self.inner).state.apy
    }

    pub fn auto_compound(&self) -> bool {
        lock(&self.inner).state.auto_compound
    }

    /// Whether this vault may run a compounding timer at all
    pub fn is_scheduling(&self) -> bool {
        self.schedule
    }

    /// Whether a timer task is live
    pub fn is_compounding(&self) -> bool {
        lock(&self.inner).scheduler.is_active()
    }

    pub fn last_operation(&self) -> Option<OperationId> {
        lock(&self.inner).ledger.last().cloned()
    }

    /// Most recent persistence failure, cleared by the next successful write
    pub fn last_persistence_error(&self) -> Option<String> {
        lock(&self.inner).last_persistence_error.clone()
    }

    pub fn engine(&self) -> &CompoundingEngine {
        &self.engine
    }

    pub fn summary(&self) -> VaultSummary {
        let inner = lock(&self.inner);
        VaultSummary {
            balance: inner.state.balance,
            earnings: inner.state.earnings,
            apy: inner.state.apy,
            auto_compound: inner.state.auto_compound,
            last_operation: inner.ledger.last().cloned(),
        }
    }

    /// Cancel the timer without touching the persisted flag
    ///
    /// Used on process exit so the next session resumes compounding.
    pub fn shutdown(&self) {
        if lock(&self.inner).scheduler.stop() {
            debug!("Compounding timer released on shutdown");
        }
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("store", &self.store)
            .field("engine", &self.engine)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

/// Saved snapshot over fresh defaults; unreadable snapshots are ignored
fn load_state(store: &PersistenceStore, base_apy: f64) -> VaultState {
    let mut state = VaultState::new(base_apy);

    match store.load() {
        Ok(Some(partial)) => {
            partial.apply_to(&mut state);
            info!(
                "Loaded vault state: balance={}, earnings={}, apy={}",
                format_amount(state.balance),
                format_amount(state.earnings),
                format_apy(state.apy)
            );
        }
        Ok(None) => info!("No saved vault state under {}, starting fresh", store.key()),
        Err(e) => warn!("Ignoring saved vault state: {}", e),
    }

    state
}

/// Body of one scheduled tick, run under the vault mutex
fn run_tick(
    inner: &Mutex<Inner>,
    store: &PersistenceStore,
    engine: &CompoundingEngine,
    generation: u64,
) -> TickControl {
    let mut inner = lock(inner);

    // A stop (or restart) already replaced this activation
    if inner.scheduler.generation() != Some(generation) {
        return TickControl::Stop;
    }

    match engine.tick(&mut inner.state) {
        TickOutcome::Accrued(amount) => {
            debug!(
                "Compounded {:.10} (balance {}, earnings {})",
                amount,
                format_amount(inner.state.balance),
                format_amount(inner.state.earnings)
            );
            inner.persist(store);
            TickControl::Continue
        }
        TickOutcome::Halted => {
            // Detach rather than abort: this task is the timer
            if let SchedulerState::Active(timer) = std::mem::take(&mut inner.scheduler) {
                timer.cancel.cancel();
            }
            warn!("Balance is empty, auto-compound disabled");
            inner.persist(store);
            TickControl::Stop
        }
        TickOutcome::Saturated => {
            warn!("Balance is at its ceiling, tick skipped");
            TickControl::Continue
        }
    }
}
