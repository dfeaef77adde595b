//! Remote node access

pub mod balance;

pub use balance::{BalanceQuery, BalanceSource, RpcBalanceClient, WalletBalance};
