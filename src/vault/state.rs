//! Vault state record and its balance rules

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// APY applied when nothing else is configured or persisted
pub const BASE_APY: f64 = 12.5;

/// The vault's durable state
///
/// Serializes to the persisted layout
/// `{ "balance", "earnings", "apy", "autoCompound" }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultState {
    /// Principal plus accrued yield, never negative
    pub balance: f64,
    /// Yield accrued since the last withdrawal
    pub earnings: f64,
    /// Nominal annual yield in percent
    pub apy: f64,
    /// Mirrors whether the compounding scheduler is live
    pub auto_compound: bool,
}

impl VaultState {
    /// Fresh vault with zero balance and the given APY
    pub fn new(apy: f64) -> Self {
        Self {
            balance: 0.0,
            earnings: 0.0,
            apy,
            auto_compound: false,
        }
    }

    /// Whether there is anything to compound
    pub fn has_funds(&self) -> bool {
        self.balance > 0.0
    }

    /// Add `amount` to the balance. Earnings are untouched.
    ///
    /// A deposit whose sum would not be finite is rejected as invalid.
    pub fn deposit(&mut self, amount: f64) -> Result<()> {
        let amount = validate_amount(amount)?;
        let balance = self.balance + amount;
        if !balance.is_finite() {
            return Err(Error::InvalidAmount(amount));
        }

        self.balance = balance;
        Ok(())
    }

    /// Remove `amount` from the balance and forfeit all tracked earnings.
    ///
    /// Earnings reset on every withdrawal regardless of its size.
    pub fn withdraw(&mut self, amount: f64) -> Result<()> {
        let amount = validate_amount(amount)?;
        if amount > self.balance {
            return Err(Error::InsufficientBalance {
                available: self.balance,
                requested: amount,
            });
        }

        self.balance -= amount;
        self.earnings = 0.0;
        Ok(())
    }

    /// Credit one accrual step to both balance and earnings
    ///
    /// Returns false and leaves the state untouched when either total would
    /// stop being finite.
    pub fn accrue(&mut self, amount: f64) -> bool {
        let balance = self.balance + amount;
        let earnings = self.earnings + amount;
        if !balance.is_finite() || !earnings.is_finite() {
            return false;
        }

        self.balance = balance;
        self.earnings = earnings;
        true
    }
}

impl Default for VaultState {
    fn default() -> Self {
        Self::new(BASE_APY)
    }
}

/// Reject NaN, infinities, zero and negatives
pub fn validate_amount(amount: f64) -> Result<f64> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(Error::InvalidAmount(amount))
    }
}

/// Render an amount the way the vault displays it
pub fn format_amount(amount: f64) -> String {
    format!("{:.4}", amount)
}

/// Render an APY percentage
pub fn format_apy(apy: f64) -> String {
    format!("{:.2}%", apy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(balance: f64, earnings: f64) -> VaultState {
        VaultState {
            balance,
            earnings,
            ..VaultState::default()
        }
    }

    #[test]
    fn test_defaults() {
        let state = VaultState::default();
        assert_eq!(state.balance, 0.0);
        assert_eq!(state.earnings, 0.0);
        assert_eq!(state.apy, 12.5);
        assert!(!state.auto_compound);
        assert!(!state.has_funds());
    }

    #[test]
    fn test_deposit_adds_exactly() {
        for amount in [0.0001, 1.0, 50.0, 1234.5678] {
            let mut state = funded(10.0, 3.0);
            state.deposit(amount).unwrap();
            assert_eq!(state.balance, 10.0 + amount);
            assert_eq!(state.earnings, 3.0);
        }
    }

    #[test]
    fn test_deposit_rejects_invalid() {
        for amount in [0.0, -1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut state = funded(10.0, 3.0);
            let err = state.deposit(amount).unwrap_err();
            assert!(matches!(err, Error::InvalidAmount(_)));
            assert_eq!(state, funded(10.0, 3.0));
        }
    }

    #[test]
    fn test_withdraw_resets_earnings() {
        let mut state = funded(100.0, 7.5);
        state.withdraw(1.0).unwrap();
        assert_eq!(state.balance, 99.0);
        assert_eq!(state.earnings, 0.0);
    }

    #[test]
    fn test_withdraw_full_balance() {
        let mut state = funded(50.0, 0.0);
        state.withdraw(50.0).unwrap();
        assert_eq!(state.balance, 0.0);
        assert!(!state.has_funds());
    }

    #[test]
    fn test_withdraw_insufficient_leaves_state() {
        let mut state = funded(10.0, 2.0);
        let err = state.withdraw(10.5).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance { available, requested }
                if available == 10.0 && requested == 10.5
        ));
        assert_eq!(state, funded(10.0, 2.0));
    }

    #[test]
    fn test_withdraw_rejects_invalid() {
        let mut state = funded(10.0, 2.0);
        assert!(matches!(
            state.withdraw(f64::NAN),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(state.withdraw(-5.0), Err(Error::InvalidAmount(_))));
        assert_eq!(state, funded(10.0, 2.0));
    }

    #[test]
    fn test_deposit_overflow_rejected() {
        let mut state = funded(f64::MAX, 0.0);
        let err = state.deposit(f64::MAX).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(a) if a == f64::MAX));
        assert_eq!(state, funded(f64::MAX, 0.0));
    }

    #[test]
    fn test_repeated_max_deposit_stays_finite() {
        let mut state = VaultState::default();
        state.deposit(f64::MAX).unwrap();
        assert!(state.deposit(f64::MAX).is_err());
        assert_eq!(state.balance, f64::MAX);
    }

    #[test]
    fn test_accrue() {
        let mut state = funded(100.0, 1.0);
        assert!(state.accrue(0.25));
        assert_eq!(state.balance, 100.25);
        assert_eq!(state.earnings, 1.25);
    }

    #[test]
    fn test_accrue_overflow_leaves_state() {
        let mut state = funded(f64::MAX, 1.0);
        assert!(!state.accrue(f64::MAX));
        assert_eq!(state, funded(f64::MAX, 1.0));
    }

    #[test]
    fn test_serialized_layout() {
        let state = VaultState {
            balance: 1.5,
            earnings: 0.5,
            apy: 12.5,
            auto_compound: true,
        };
        let value = serde_json::to_value(state).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "balance": 1.5,
                "earnings": 0.5,
                "apy": 12.5,
                "autoCompound": true
            })
        );
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_amount(50.0), "50.0000");
        assert_eq!(format_amount(0.123456), "0.1235");
        assert_eq!(format_apy(12.5), "12.50%");
    }
}
