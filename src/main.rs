//! Yield Vault - simulated yield-bearing vault with auto-compounding
//!
//! # NOTE
//! - Balances are notional. Nothing here moves real funds.
//! - Amounts are floating-point approximations, not exact decimals.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

// Use the library crate
use yield_vault::cli::commands;
use yield_vault::config::Config;

/// Yield Vault - simulated yield-bearing vault
#[derive(Parser)]
#[command(name = "vault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "vault.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session with auto-compounding running
    Run {
        /// Keep vault state in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show balance, earnings, APY and auto-compound state
    Status {
        /// Show a fresh in-memory vault instead of the saved one
        #[arg(long)]
        ephemeral: bool,
    },

    /// Deposit into the vault
    Deposit {
        /// Amount in vault units
        #[arg(allow_negative_numbers = true)]
        amount: f64,
    },

    /// Withdraw from the vault (resets tracked earnings)
    Withdraw {
        /// Amount in vault units
        #[arg(allow_negative_numbers = true)]
        amount: f64,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Turn auto-compounding on or off
    AutoCompound {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Look up an on-chain wallet balance
    Balance {
        /// Wallet address
        address: String,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let loaded = Config::load(&cli.config);

    // Initialize tracing
    init_tracing(loaded.as_ref().map(|c| c.logging.json).unwrap_or(false))?;

    let config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run { ephemeral } => commands::run(&config, ephemeral).await,
        Commands::Status { ephemeral } => commands::status(&config, ephemeral).await,
        Commands::Deposit { amount } => commands::deposit(&config, amount).await,
        Commands::Withdraw { amount, force } => commands::withdraw(&config, amount, force).await,
        Commands::AutoCompound { state } => {
            commands::auto_compound(&config, matches!(state, Toggle::On)).await
        }
        Commands::Balance { address } => commands::balance(&config, &address).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("yield_vault=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}
