//! CLI command implementations

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use dialoguer::Confirm;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::rpc::{BalanceQuery, BalanceSource, RpcBalanceClient, WalletBalance};
use crate::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use crate::vault::{format_amount, Vault};

/// Open the vault over the configured data directory, or in memory
///
/// With `resume` a saved auto-compound flag restarts the timer. Without it
/// the vault stays idle and the flag is only carried through.
pub fn open_vault(config: &Config, ephemeral: bool, resume: bool) -> Result<Vault> {
    let backend: Arc<dyn KeyValueStore> = if ephemeral {
        warn!("Ephemeral session - vault state will not be saved");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(JsonFileStore::new(&config.storage.data_dir))
    };

    let vault = if resume {
        Vault::from_config(config, backend)
    } else {
        Vault::idle_from_config(config, backend)
    };
    vault.context("Failed to open vault")
}

fn balance_query(config: &Config) -> Result<BalanceQuery<RpcBalanceClient>> {
    let client = RpcBalanceClient::from_config(&config.rpc)?;
    Ok(BalanceQuery::new(client, config.rpc.decimals))
}

/// Show the vault summary
pub async fn status(config: &Config, ephemeral: bool) -> Result<()> {
    let vault = open_vault(config, ephemeral, false)?;
    print_status(&vault, None);
    Ok(())
}

/// Deposit into the vault
pub async fn deposit(config: &Config, amount: f64) -> Result<()> {
    let vault = open_vault(config, false, false)?;
    let id = vault.deposit(amount)?;

    println!("Deposited {} [{}]", format_amount(amount), id);
    println!("Balance: {}", format_amount(vault.balance()));
    report_persistence(&vault);
    Ok(())
}

/// Withdraw from the vault
pub async fn withdraw(config: &Config, amount: f64, force: bool) -> Result<()> {
    let vault = open_vault(config, false, false)?;

    let earnings = vault.earnings();
    if !force && earnings > 0.0 && amount.is_finite() && amount > 0.0 && amount <= vault.balance() {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Withdrawing resets {} of tracked earnings to zero. Continue?",
                format_amount(earnings)
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("Withdrawal cancelled.");
            return Ok(());
        }
    }

    let id = vault.withdraw(amount)?;

    println!("Withdrew {} [{}]", format_amount(amount), id);
    println!("Balance: {}", format_amount(vault.balance()));
    report_persistence(&vault);
    Ok(())
}

/// Persist the auto-compound flag; the next `run` session resumes the timer
pub async fn auto_compound(config: &Config, enabled: bool) -> Result<()> {
    let vault = open_vault(config, false, false)?;
    vault.set_auto_compound(enabled)?;

    println!(
        "Auto-compound {}",
        if vault.auto_compound() { "ON" } else { "OFF" }
    );
    if enabled {
        println!("Compounding runs while a `run` session is open.");
    }
    report_persistence(&vault);
    Ok(())
}

/// Look up a wallet balance on the configured node
pub async fn balance(config: &Config, address: &str) -> Result<()> {
    let query = balance_query(config)?;

    match query.fetch(address).await {
        Ok(balance) => println!("Wallet balance: {}", balance),
        Err(Error::InvalidAddress) => anyhow::bail!("Please enter a wallet address"),
        Err(e) => {
            println!("Wallet balance: {}", WalletBalance::Unavailable);
            anyhow::bail!("Error fetching balance: {}", e);
        }
    }
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Interactive session: the compounding timer runs while commands are read
pub async fn run(config: &Config, ephemeral: bool) -> Result<()> {
    let vault = open_vault(config, ephemeral, true)?;
    let query = balance_query(config)?;

    info!(
        "Vault session started (compounding every {}ms)",
        vault.engine().interval().as_millis()
    );
    print_status(&vault, None);
    print_help();

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let result = drive_session(&vault, &query, BufReader::new(tokio::io::stdin()), interrupted).await;

    vault.shutdown();
    info!("Vault session closed");
    result
}

/// Read and execute commands until input ends, `quit`, or `shutdown` resolves
///
/// `shutdown` is raced against both reading a line and running the command,
/// so a stalled balance lookup cannot hold the session open.
pub async fn drive_session<R, S, F>(
    vault: &Vault,
    query: &BalanceQuery<S>,
    input: R,
    shutdown: F,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    S: BalanceSource,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read command")?,
            _ = &mut shutdown => {
                info!("Interrupted, closing session");
                break;
            }
        };

        let line = match line {
            Some(line) => line,
            None => break,
        };

        let command = match SessionCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        let flow = tokio::select! {
            flow = execute(vault, query, command) => flow,
            _ = &mut shutdown => {
                info!("Interrupted during a command, closing session");
                break;
            }
        };

        if flow == Flow::Quit {
            break;
        }
    }

    Ok(())
}

/// One line of interactive input
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Deposit(f64),
    Withdraw(f64),
    AutoCompound(bool),
    Status,
    Balance(String),
    Help,
    Quit,
}

impl SessionCommand {
    /// Parse a line; blank lines yield `Ok(None)`
    ///
    /// Amounts that are not numbers parse as NaN so the vault rejects them
    /// with its own error.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some(command) => command.to_lowercase(),
            None => return Ok(None),
        };
        let arg = words.next();

        let amount = || arg.map(parse_amount).unwrap_or(f64::NAN);

        let parsed = match command.as_str() {
            "deposit" | "d" => SessionCommand::Deposit(amount()),
            "withdraw" | "w" => SessionCommand::Withdraw(amount()),
            "auto" => match arg.map(str::to_lowercase).as_deref() {
                Some("on") => SessionCommand::AutoCompound(true),
                Some("off") => SessionCommand::AutoCompound(false),
                _ => return Err("Usage: auto on|off".to_string()),
            },
            "status" | "s" => SessionCommand::Status,
            "balance" | "b" => SessionCommand::Balance(arg.unwrap_or_default().to_string()),
            "help" | "h" | "?" => SessionCommand::Help,
            "quit" | "exit" | "q" => SessionCommand::Quit,
            other => return Err(format!("Unknown command '{}' (try 'help')", other)),
        };

        Ok(Some(parsed))
    }
}

fn parse_amount(raw: &str) -> f64 {
    raw.parse::<f64>().unwrap_or(f64::NAN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

async fn execute<S: BalanceSource>(
    vault: &Vault,
    query: &BalanceQuery<S>,
    command: SessionCommand,
) -> Flow {
    match command {
        SessionCommand::Deposit(amount) => match vault.deposit(amount) {
            Ok(id) => println!("Deposited {} [{}]", format_amount(amount), id),
            Err(e) => println!("{}", describe_error(&e)),
        },
        SessionCommand::Withdraw(amount) => match vault.withdraw(amount) {
            Ok(id) => println!("Withdrew {} [{}]", format_amount(amount), id),
            Err(e) => println!("{}", describe_error(&e)),
        },
        SessionCommand::AutoCompound(enabled) => match vault.set_auto_compound(enabled) {
            Ok(()) => println!("Auto-compound {}", if enabled { "ON" } else { "OFF" }),
            Err(Error::AutoCompoundRequiresFunds) => {
                println!("Deposit funds before enabling auto-compound. Auto-compound OFF")
            }
            Err(e) => println!("{}", describe_error(&e)),
        },
        SessionCommand::Status => print_status(vault, query.last_balance()),
        SessionCommand::Balance(address) => match query.fetch(&address).await {
            Ok(balance) => println!("Wallet balance: {}", balance),
            Err(Error::InvalidAddress) => println!("Please enter a wallet address"),
            Err(e) => println!(
                "Error fetching balance: {} (wallet balance: {})",
                describe_error(&e),
                WalletBalance::Unavailable
            ),
        },
        SessionCommand::Help => print_help(),
        SessionCommand::Quit => return Flow::Quit,
    }

    report_persistence(vault);
    Flow::Continue
}

fn print_status(vault: &Vault, wallet: Option<WalletBalance>) {
    let summary = vault.summary();
    let projected = vault
        .engine()
        .projected_annual_increment(summary.balance, summary.apy);

    println!("\n=== VAULT STATUS ===\n");
    println!("Balance:        {}", summary.balance_display());
    println!("Earnings:       {}", summary.earnings_display());
    println!("APY:            {}", summary.apy_display());
    println!(
        "Auto-compound:  {}",
        if summary.auto_compound { "ON" } else { "OFF" }
    );
    println!("Projected/year: {}", format_amount(projected));
    println!(
        "Last operation: {}",
        summary
            .last_operation
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(wallet) = wallet {
        println!("Wallet balance: {}", wallet);
    }
    println!();
}

fn print_help() {
    println!("Commands:");
    println!("  deposit <amount>    add funds");
    println!("  withdraw <amount>   remove funds (resets earnings)");
    println!("  auto on|off         toggle auto-compound");
    println!("  status              show the vault");
    println!("  balance <address>   look up a wallet balance");
    println!("  quit                leave the session");
}

/// One-line message for a failed session command
fn describe_error(error: &Error) -> String {
    if error.is_rejection() {
        format!("Rejected: {}", error)
    } else if error.is_transient() {
        format!("{} (try again)", error)
    } else {
        error.to_string()
    }
}

fn report_persistence(vault: &Vault) {
    if let Some(error) = vault.last_persistence_error() {
        println!("Warning: vault state not saved ({})", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::storage::PersistenceStore;
    use crate::vault::CompoundingEngine;

    /// Lookup that never answers
    struct StalledSource;

    #[async_trait]
    impl BalanceSource for StalledSource {
        async fn candidate_balance(&self, _address: &str) -> crate::error::Result<Option<f64>> {
            std::future::pending().await
        }
    }

    fn memory_vault() -> Vault {
        let store = PersistenceStore::new(Arc::new(MemoryStore::new()), "yieldVaultState");
        Vault::open_idle(store, CompoundingEngine::default(), 12.5).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_stalled_lookup_ends_session() {
        let vault = memory_vault();
        let query = BalanceQuery::new(StalledSource, 9);
        let input: &[u8] = b"balance addr1\n";

        drive_session(&vault, &query, input, tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(!query.is_busy());
        assert!(query.last_balance().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_while_waiting_for_input() {
        let vault = memory_vault();
        let query = BalanceQuery::new(StalledSource, 9);
        let (_writer, reader) = tokio::io::duplex(64);

        drive_session(
            &vault,
            &query,
            BufReader::new(reader),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(vault.balance(), 0.0);
    }

    #[tokio::test]
    async fn test_session_runs_commands_until_quit() {
        let vault = memory_vault();
        let query = BalanceQuery::new(StalledSource, 9);
        let input: &[u8] = b"deposit 5\n\nwithdraw lots\nquit\ndeposit 7\n";

        drive_session(&vault, &query, input, std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(vault.balance(), 5.0);
    }

    #[tokio::test]
    async fn test_session_ends_at_end_of_input() {
        let vault = memory_vault();
        let query = BalanceQuery::new(StalledSource, 9);
        let input: &[u8] = b"deposit 2\nauto on";

        drive_session(&vault, &query, input, std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(vault.balance(), 2.0);
        assert!(vault.auto_compound());
        assert!(!vault.is_compounding());
    }

    #[test]
    fn test_one_shot_open_is_idle() {
        let config = Config::default();
        assert!(!open_vault(&config, true, false).unwrap().is_scheduling());
        assert!(open_vault(&config, true, true).unwrap().is_scheduling());
    }

    #[test]
    fn test_describe_error_by_class() {
        assert_eq!(
            describe_error(&Error::InvalidAmount(-1.0)),
            "Rejected: Invalid amount: -1 (must be a finite number greater than zero)"
        );
        assert!(describe_error(&Error::RemoteQuery("timeout".to_string())).ends_with("(try again)"));
        assert_eq!(
            describe_error(&Error::InvalidAddress),
            "Address must not be empty"
        );
    }

    #[test]
    fn test_parse_amount_commands() {
        assert_eq!(
            SessionCommand::parse("deposit 50").unwrap(),
            Some(SessionCommand::Deposit(50.0))
        );
        assert_eq!(
            SessionCommand::parse("  W 1.5 ").unwrap(),
            Some(SessionCommand::Withdraw(1.5))
        );
    }

    #[test]
    fn test_parse_non_numeric_amount_is_nan() {
        match SessionCommand::parse("deposit lots").unwrap() {
            Some(SessionCommand::Deposit(amount)) => assert!(amount.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
        match SessionCommand::parse("withdraw").unwrap() {
            Some(SessionCommand::Withdraw(amount)) => assert!(amount.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_toggle_and_misc() {
        assert_eq!(
            SessionCommand::parse("auto ON").unwrap(),
            Some(SessionCommand::AutoCompound(true))
        );
        assert_eq!(
            SessionCommand::parse("auto off").unwrap(),
            Some(SessionCommand::AutoCompound(false))
        );
        assert!(SessionCommand::parse("auto maybe").is_err());
        assert_eq!(SessionCommand::parse("").unwrap(), None);
        assert_eq!(
            SessionCommand::parse("balance addr1").unwrap(),
            Some(SessionCommand::Balance("addr1".to_string()))
        );
        assert_eq!(SessionCommand::parse("exit").unwrap(), Some(SessionCommand::Quit));
        assert!(SessionCommand::parse("borrow 5").is_err());
    }
}
