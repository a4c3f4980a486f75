use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::api;
use crate::application::{Ledger, QueryFacade};
use crate::config::Config;
use crate::domain::{AccountId, Amount, SortKey};
use crate::io::{export_records_csv, export_records_json};
use crate::telemetry;

/// Balance Ledger - account balances with an append-only transaction log
#[derive(Parser)]
#[command(name = "balance-ledger")]
#[command(about = "Atomic balance updates and transfers backed by an append-only log")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ./balance-ledger.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file path, overrides the config file
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Show an account's balance (provisions the account at zero)
    Balance {
        id: AccountId,
    },

    /// Credit (positive amount) or debit (negative amount) an account
    Update {
        id: AccountId,

        /// Signed amount in minor units, e.g. 100 or -30
        #[arg(allow_negative_numbers = true)]
        amount: i64,

        /// Description recorded in the log
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Move money between two accounts
    Transfer {
        from: AccountId,

        to: AccountId,

        amount: Amount,

        /// Description recorded on both log entries
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Show an account's transaction log, newest first
    Log {
        id: AccountId,

        /// Sort key: time, amount, description or sequence
        #[arg(short, long)]
        sort: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List all accounts
    Accounts,

    /// Verify ledger integrity
    Check,

    /// Serve the HTTP API
    Serve {
        /// Port to listen on, overrides the config file
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.database.path = database.clone();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let mut config = self.load_config()?;
        telemetry::init(&config.logging);

        match self.command {
            Commands::Init => {
                Ledger::init(&config).await?;
                println!("Database initialized: {}", config.database.path);
            }

            Commands::Balance { id } => {
                let ledger = Ledger::connect(&config).await?;
                let balance = ledger.get_balance(id).await?;
                println!("{}: {}", id, balance);
            }

            Commands::Update {
                id,
                amount,
                description,
            } => {
                let ledger = Ledger::connect(&config).await?;
                let balance = ledger.update_balance(id, amount, description).await?;
                println!("Account {} balance: {}", id, balance);
            }

            Commands::Transfer {
                from,
                to,
                amount,
                description,
            } => {
                let ledger = Ledger::connect(&config).await?;
                let receipt = ledger.transfer(from, to, amount, description).await?;
                println!(
                    "Transferred {} from {} to {} ({})",
                    amount, from, to, receipt.debit.description
                );
                println!("  {:<10} {:>12}", receipt.from.id, receipt.from.balance);
                println!("  {:<10} {:>12}", receipt.to.id, receipt.to.balance);
            }

            Commands::Log { id, sort, format } => {
                let ledger = Ledger::connect(&config).await?;
                run_log_command(&ledger, id, sort.as_deref(), format).await?;
            }

            Commands::Accounts => {
                let ledger = Ledger::connect(&config).await?;
                run_accounts_command(&ledger.queries()).await?;
            }

            Commands::Check => {
                let ledger = Ledger::connect(&config).await?;
                run_check_command(&ledger.queries()).await?;
            }

            Commands::Serve { port } => {
                if let Some(port) = port {
                    config.server.port = port;
                }
                let addr = config.listen_addr()?;
                let ledger = Ledger::init(&config).await?;
                api::serve(ledger, addr).await?;
            }
        }

        Ok(())
    }
}

async fn run_log_command(
    ledger: &Ledger,
    id: AccountId,
    sort: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let records = ledger.get_log(id, sort).await?;

    match format {
        OutputFormat::Json => {
            export_records_json(&records, std::io::stdout().lock())?;
        }
        OutputFormat::Csv => {
            export_records_csv(&records, std::io::stdout().lock())?;
        }
        OutputFormat::Table => {
            if records.is_empty() {
                println!("No transactions for account {}.", id);
                return Ok(());
            }
            let sort = sort.map(SortKey::parse).unwrap_or_default();
            println!("Account {} (sorted by {}, descending)", id, sort);
            println!(
                "{:<8} {:<27} {:>12} DESCRIPTION",
                "SEQ", "CREATED", "DELTA"
            );
            println!("{}", "-".repeat(70));
            for record in &records {
                println!(
                    "{:<8} {:<27} {:>12} {}",
                    record.sequence,
                    record.created_at.format("%Y-%m-%d %H:%M:%S%.6f"),
                    record.delta,
                    truncate(&record.description, 40)
                );
            }
        }
    }
    Ok(())
}

async fn run_accounts_command(queries: &QueryFacade) -> Result<()> {
    let accounts = queries.accounts().await?;
    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!("{:<20} {:>20}", "ACCOUNT", "BALANCE");
    println!("{}", "-".repeat(41));
    for account in accounts {
        println!("{:<20} {:>20}", account.id, account.balance);
    }
    Ok(())
}

async fn run_check_command(queries: &QueryFacade) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = queries
        .check_integrity()
        .await
        .context("Failed to read ledger state")?;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.record_count);
    println!("Total:        {}", report.total_balance);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_negative_update() {
        let cli = Cli::parse_from(["balance-ledger", "update", "7", "-30", "-d", "fee"]);
        match cli.command {
            Commands::Update {
                id,
                amount,
                description,
            } => {
                assert_eq!(id, 7);
                assert_eq!(amount, -30);
                assert_eq!(description.as_deref(), Some("fee"));
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_global_database_override() {
        let cli = Cli::parse_from(["balance-ledger", "log", "1", "--database", "x.db"]);
        assert_eq!(cli.database.as_deref(), Some("x.db"));
        assert!(matches!(
            cli.command,
            Commands::Log {
                format: OutputFormat::Table,
                ..
            }
        ));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long description", 10), "a long ...");
    }
}
