//! Accrual formula and scheduler state
//!
//! Each tick credits a linear slice of the nominal annual yield:
//!
//! ```text
//! annual   = balance * (apy / 100)
//! increment = annual * compound_rate * (interval_ms / MILLISECONDS_PER_YEAR)
//! ```
//!
//! This is a toy approximation, not continuous compounding. Keep the formula
//! as is; persisted vaults and displayed projections depend on it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::VaultConfig;
use crate::vault::state::VaultState;

pub const MILLISECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0 * 1000.0;

/// Per-tick compounding discount factor
pub const DEFAULT_COMPOUND_RATE: f64 = 0.001;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10_000);

/// Result of applying one tick to the state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Balance and earnings both grew by this amount
    Accrued(f64),
    /// Balance was not positive; auto-compound was switched off
    Halted,
    /// The increment would overflow the balance; nothing changed
    Saturated,
}

/// Compounding parameters and the pure tick step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompoundingEngine {
    interval: Duration,
    compound_rate: f64,
}

impl CompoundingEngine {
    pub fn new(interval: Duration, compound_rate: f64) -> Self {
        Self {
            interval,
            compound_rate,
        }
    }

    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(config.compound_interval(), config.compound_rate)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn compound_rate(&self) -> f64 {
        self.compound_rate
    }

    /// Increment credited by a single tick
    pub fn compound_amount(&self, balance: f64, apy: f64) -> f64 {
        let annual_yield = balance * (apy / 100.0);
        let interval_ms = self.interval.as_millis() as f64;
        annual_yield * self.compound_rate * (interval_ms / MILLISECONDS_PER_YEAR)
    }

    /// Growth from a year of ticks at a constant balance
    pub fn projected_annual_increment(&self, balance: f64, apy: f64) -> f64 {
        let ticks_per_year = MILLISECONDS_PER_YEAR / self.interval.as_millis().max(1) as f64;
        self.compound_amount(balance, apy) * ticks_per_year
    }

    /// Apply one tick to `state`
    pub fn tick(&self, state: &mut VaultState) -> TickOutcome {
        if !state.has_funds() {
            state.auto_compound = false;
            return TickOutcome::Halted;
        }

        let amount = self.compound_amount(state.balance, state.apy);
        if !amount.is_finite() || !state.accrue(amount) {
            return TickOutcome::Saturated;
        }
        TickOutcome::Accrued(amount)
    }
}

impl Default for CompoundingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL, DEFAULT_COMPOUND_RATE)
    }
}

/// Live timer task owned by an active scheduler
#[derive(Debug)]
pub struct ActiveTimer {
    /// Distinguishes this activation from earlier, cancelled ones
    pub generation: u64,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl ActiveTimer {
    /// Cancel the timer task. Ticks already queued see the cancelled token
    /// or a stale generation and do nothing.
    pub fn shutdown(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Scheduler state machine
#[derive(Debug, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Active(ActiveTimer),
}

impl SchedulerState {
    pub fn is_active(&self) -> bool {
        matches!(self, SchedulerState::Active(_))
    }

    /// Generation of the live timer, if any
    pub fn generation(&self) -> Option<u64> {
        match self {
            SchedulerState::Idle => None,
            SchedulerState::Active(timer) => Some(timer.generation),
        }
    }

    /// Move to Idle and cancel any live timer. Returns whether one was live.
    pub fn stop(&mut self) -> bool {
        match std::mem::take(self) {
            SchedulerState::Idle => false,
            SchedulerState::Active(timer) => {
                timer.shutdown();
                true
            }
        }
    }
}
