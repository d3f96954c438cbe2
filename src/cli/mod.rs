mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::application::{OperationFilter, RegisterService};
use crate::domain::{format_cents, format_money, parse_cents, CashOperation, Cents, OperationType};

pub use config::{load_settings, Settings, DEFAULT_CONFIG_FILE};

/// Tillbook - Teller Cash Register Ledger
#[derive(Parser)]
#[command(name = "tillbook")]
#[command(about = "A branch-teller cash register: balances, deposits, withdrawals and reconciliation")]
#[command(version)]
pub struct Cli {
    /// Database file path [default: tillbook.db]
    #[arg(short, long)]
    pub database: Option<String>,

    /// Name recorded as performing operations [default: $USER]
    #[arg(long)]
    pub teller: Option<String>,

    /// Configuration file [default: ./tillbook.toml if present]
    #[arg(long)]
    pub config: Option<PathBuf>,

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

    /// Open a register session with an opening float
    Open {
        /// Opening float per currency, e.g. --float USD=3200.00 (repeatable)
        #[arg(short, long = "float", value_name = "CUR=AMOUNT")]
        float: Vec<String>,
    },

    /// Record cash handed in at the counter
    Deposit {
        /// Amount (e.g., "1000" or "1000.00")
        amount: String,

        /// Currency code (e.g., USD)
        #[arg(short, long)]
        currency: String,

        /// Description of the deposit
        #[arg(short = 'm', long)]
        description: Option<String>,

        /// External reference (receipt or slip number)
        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Record cash paid out at the counter
    Withdraw {
        /// Amount (e.g., "200" or "200.00")
        amount: String,

        /// Currency code (e.g., EUR)
        #[arg(short, long)]
        currency: String,

        /// Description of the withdrawal
        #[arg(short = 'm', long)]
        description: Option<String>,

        /// External reference (receipt or slip number)
        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Set a currency to the physically counted amount
    Reconcile {
        /// Counted amount
        counted: String,

        /// Currency code
        #[arg(short, long)]
        currency: String,
    },

    /// Close the open register session
    Close,

    /// Show balance for a currency or all currencies
    Balance {
        /// Currency code (omit for all currencies)
        currency: Option<String>,
    },

    /// List operations of the open register, newest first
    Operations {
        /// Filter by currency
        #[arg(short, long)]
        currency: Option<String>,

        /// Filter by type: deposit, withdrawal, adjustment, open, close
        #[arg(short = 't', long = "type")]
        op_type: Option<String>,

        /// Maximum number of operations to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show detailed operation information
    Show {
        /// Operation ID
        id: String,
    },

    /// Per-currency summary of a register session
    Summary {
        /// Register ID (defaults to the open register)
        #[arg(long)]
        register: Option<String>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Verify balances against the operation log
    Check {
        /// Register ID (defaults to the open register)
        #[arg(long)]
        register: Option<String>,
    },

    /// List register sessions
    Sessions,

    /// Export data to CSV or JSON
    Export {
        /// What to export: operations, balances, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Register ID (defaults to the open register)
        #[arg(long)]
        register: Option<String>,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` is honoured unless `verbose` is set.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tillbook=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings = load_settings(self.config.as_deref(), self.database, self.teller)?;
        let teller = settings.teller.as_str();

        if matches!(self.command, Commands::Init) {
            RegisterService::init(&settings.database).await?;
            println!("Database initialized: {}", settings.database);
            return Ok(());
        }

        let service = RegisterService::connect(&settings.database)
            .await
            .with_context(|| {
                format!(
                    "Cannot open database '{}'. Run `tillbook init` first",
                    settings.database
                )
            })?;

        match self.command {
            Commands::Init => unreachable!("handled above"),

            Commands::Open { float } => {
                let float = float
                    .iter()
                    .map(|entry| parse_float_entry(entry))
                    .collect::<Result<Vec<_>>>()?;
                let register = service.open_register(teller, &float).await?;

                println!("Opened register {} ({})", register.id, register.opened_by);
                for balance in register.balances.values() {
                    println!(
                        "  {:<4} {:>14}",
                        balance.currency,
                        format_cents(balance.amount_cents)
                    );
                }
            }

            Commands::Deposit {
                amount,
                currency,
                description,
                reference,
            } => {
                let amount_cents = parse_amount(&amount)?;
                let description = description.unwrap_or_else(|| "Deposit".to_string());
                let result = service
                    .add_cash(amount_cents, &currency, &description, teller, reference)
                    .await?;

                println!(
                    "Deposited {} (balance {}) [{}]",
                    format_money(result.operation.amount_cents, &result.operation.currency),
                    format_cents(result.balance),
                    result.operation.id
                );
            }

            Commands::Withdraw {
                amount,
                currency,
                description,
                reference,
            } => {
                let amount_cents = parse_amount(&amount)?;
                let description = description.unwrap_or_else(|| "Withdrawal".to_string());
                let result = service
                    .remove_cash(amount_cents, &currency, &description, teller, reference)
                    .await?;

                println!(
                    "Withdrew {} (balance {}) [{}]",
                    format_money(result.operation.amount_cents, &result.operation.currency),
                    format_cents(result.balance),
                    result.operation.id
                );
            }

            Commands::Reconcile { counted, currency } => {
                let counted_cents = parse_amount(&counted)?;
                let result = service.reconcile_cash(counted_cents, &currency, teller).await?;

                match &result.adjustment {
                    Some(op) => println!(
                        "Reconciled {}: expected {}, counted {} ({} {})",
                        result.currency,
                        format_cents(result.previous_balance),
                        format_cents(result.balance),
                        op.direction.map(|d| d.as_str()).unwrap_or("add"),
                        format_cents(op.amount_cents)
                    ),
                    None => println!(
                        "Reconciled {}: count matches balance {}, no adjustment",
                        result.currency,
                        format_cents(result.balance)
                    ),
                }
            }

            Commands::Close => {
                let register = service.close_register(teller).await?;
                println!("Closed register {}", register.id);
                for balance in register.balances.values() {
                    println!(
                        "  {:<4} {:>14}",
                        balance.currency,
                        format_cents(balance.amount_cents)
                    );
                }
            }

            Commands::Balance { currency } => {
                run_balance_command(&service, currency).await?;
            }

            Commands::Operations {
                currency,
                op_type,
                limit,
            } => {
                let op_type = op_type
                    .map(|t| {
                        OperationType::from_str(&t).ok_or_else(|| {
                            anyhow::anyhow!(
                                "Invalid operation type '{}'. Valid types: deposit, withdrawal, adjustment, open, close",
                                t
                            )
                        })
                    })
                    .transpose()?;
                let filter = OperationFilter {
                    currency,
                    op_type,
                    limit,
                };
                let operations = service.list_operations(filter).await?;
                print_operations(&operations);
            }

            Commands::Show { id } => {
                let operation_id =
                    Uuid::parse_str(&id).context("Invalid operation ID format (expected UUID)")?;
                run_show_command(&service, operation_id).await?;
            }

            Commands::Summary { register, format } => {
                let register_id = parse_register_id(register.as_deref())?;
                run_summary_command(&service, register_id, &format).await?;
            }

            Commands::Check { register } => {
                let register_id = parse_register_id(register.as_deref())?;
                run_check_command(&service, register_id).await?;
            }

            Commands::Sessions => {
                run_sessions_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
                register,
            } => {
                let register_id = parse_register_id(register.as_deref())?;
                run_export_command(&service, &export_type, output.as_deref(), register_id).await?;
            }
        }

        Ok(())
    }
}

async fn run_balance_command(service: &RegisterService, currency: Option<String>) -> Result<()> {
    match currency {
        Some(code) => {
            let balance = service.get_balance(&code).await?;
            println!(
                "{}: {}",
                balance.currency,
                format_cents(balance.amount_cents)
            );
        }
        None => {
            let balances = service.get_balances().await?;
            if balances.is_empty() {
                println!("No balances in the open register.");
            } else {
                println!("{:<8} {:>14} {:<20}", "CURRENCY", "BALANCE", "LAST UPDATED");
                println!("{}", "-".repeat(44));
                for balance in balances {
                    println!(
                        "{:<8} {:>14} {:<20}",
                        balance.currency,
                        format_cents(balance.amount_cents),
                        balance.last_updated.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_operations(operations: &[CashOperation]) {
    if operations.is_empty() {
        println!("No operations found.");
        return;
    }

    println!(
        "{:>4} {:<20} {:<12} {:<4} {:>14} {:<12} DESCRIPTION",
        "SEQ", "TIME", "TYPE", "CUR", "AMOUNT", "TELLER"
    );
    println!("{}", "-".repeat(90));
    for op in operations {
        println!(
            "{:>4} {:<20} {:<12} {:<4} {:>14} {:<12} {}",
            op.sequence,
            op.timestamp.format("%Y-%m-%d %H:%M:%S"),
            op.op_type,
            op.currency,
            format_cents(display_amount(op)),
            truncate(&op.performed_by, 12),
            truncate(&op.description, 40)
        );
    }
}

/// Close entries carry the frozen balance rather than a movement.
fn display_amount(op: &CashOperation) -> Cents {
    match op.op_type {
        OperationType::Close => op.amount_cents,
        _ => op.signed_amount(),
    }
}

async fn run_show_command(service: &RegisterService, operation_id: Uuid) -> Result<()> {
    let info = service.get_operation(operation_id).await?;
    let op = &info.operation;

    println!("Operation: {}", op.id);
    println!("  Register:     {}", info.register_id);
    println!("  Sequence:     {}", op.sequence);
    println!("  Type:         {}", op.op_type);
    if let Some(direction) = op.direction {
        println!("  Direction:    {}", direction);
    }
    println!(
        "  Amount:       {}",
        format_money(op.amount_cents, &op.currency)
    );
    println!(
        "  Date:         {}",
        op.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Performed by: {}", op.performed_by);
    println!("  Description:  {}", op.description);
    if let Some(reference) = &op.reference {
        println!("  Reference:    {}", reference);
    }
    Ok(())
}

async fn run_summary_command(
    service: &RegisterService,
    register_id: Option<Uuid>,
    format: &str,
) -> Result<()> {
    let summary = service.summary(register_id).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "table" => {
            println!("Register: {} ({})", summary.register_id, summary.status);
            println!(
                "  Opened:     {} by {}",
                summary.opened_at.format("%Y-%m-%d %H:%M:%S"),
                summary.opened_by
            );
            if let Some(closed) = summary.closed_at {
                println!("  Closed:     {}", closed.format("%Y-%m-%d %H:%M:%S"));
            }
            println!("  Operations: {}", summary.operation_count);
            println!();

            if summary.currencies.is_empty() {
                println!("No currencies in this register.");
                return Ok(());
            }

            println!(
                "{:<4} {:>12} {:>12} {:>12} {:>12} {:>12}",
                "CUR", "OPENING", "DEPOSITS", "WITHDRAWALS", "ADJUSTMENTS", "BALANCE"
            );
            println!("{}", "-".repeat(69));
            for row in &summary.currencies {
                println!(
                    "{:<4} {:>12} {:>12} {:>12} {:>12} {:>12}",
                    row.currency,
                    format_cents(row.opening),
                    format!("{} ({})", format_cents(row.deposits), row.deposit_count),
                    format!("{} ({})", format_cents(row.withdrawals), row.withdrawal_count),
                    format_cents(row.adjustments),
                    format_cents(row.balance)
                );
            }
        }
        _ => anyhow::bail!("Invalid format '{}'. Valid formats: table, json", format),
    }
    Ok(())
}

async fn run_check_command(service: &RegisterService, register_id: Option<Uuid>) -> Result<()> {
    println!("Checking register integrity...\n");

    let report = service.check_integrity(register_id).await?;

    println!("Operations: {}", report.operation_count);
    println!("Currencies: {}", report.currency_count);
    println!();

    println!("Replayed balances:");
    for (currency, balance) in &report.replayed {
        println!("  {:<4} {:>14}", currency, format_cents(*balance));
    }
    println!();

    if report.is_healthy() {
        println!("Register is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Register integrity check failed");
    }

    Ok(())
}

async fn run_sessions_command(service: &RegisterService) -> Result<()> {
    let registers = service.list_registers().await?;
    if registers.is_empty() {
        println!("No register sessions found.");
        return Ok(());
    }

    println!(
        "{:<36} {:<7} {:<17} {:<17} {:>4} TELLER",
        "ID", "STATUS", "OPENED", "CLOSED", "OPS"
    );
    println!("{}", "-".repeat(95));
    for register in registers {
        println!(
            "{:<36} {:<7} {:<17} {:<17} {:>4} {}",
            register.id,
            register.status,
            register.opened_at.format("%Y-%m-%d %H:%M"),
            register
                .closed_at
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
            register.operations.len(),
            register.opened_by
        );
    }
    Ok(())
}

async fn run_export_command(
    service: &RegisterService,
    export_type: &str,
    output: Option<&str>,
    register_id: Option<Uuid>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "operations" => {
            let count = exporter.export_operations_csv(writer, register_id).await?;
            if output.is_some() {
                eprintln!("Exported {} operations", count);
            }
        }
        "balances" => {
            let count = exporter.export_balances_csv(writer, register_id).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {} register session(s)",
                    snapshot.registers.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: operations, balances, full",
                export_type
            );
        }
    }

    Ok(())
}

/// Parse a `CUR=AMOUNT` opening float entry.
fn parse_float_entry(entry: &str) -> Result<(String, Cents)> {
    let (currency, amount) = entry
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid float '{}'. Use CUR=AMOUNT, e.g. USD=3200.00", entry))?;
    let amount_cents = parse_amount(amount)?;
    Ok((currency.trim().to_string(), amount_cents))
}

fn parse_amount(amount: &str) -> Result<Cents> {
    parse_cents(amount).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", amount))
}

fn parse_register_id(id: Option<&str>) -> Result<Option<Uuid>> {
    id.map(|s| Uuid::parse_str(s).context("Invalid register ID format (expected UUID)"))
        .transpose()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_entry() {
        assert_eq!(
            parse_float_entry("USD=3200.00").unwrap(),
            ("USD".to_string(), 320000)
        );
        assert_eq!(
            parse_float_entry("eur = 1800.5").unwrap(),
            ("eur".to_string(), 180050)
        );
        assert!(parse_float_entry("USD3200").is_err());
        assert!(parse_float_entry("USD=abc").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long description", 10), "a very ...");
    }

    #[test]
    fn test_cli_parses_deposit() {
        let cli = Cli::try_parse_from([
            "tillbook", "-d", "x.db", "deposit", "1000", "-c", "USD", "-m", "Cash in", "-r", "R1",
        ])
        .unwrap();

        assert_eq!(cli.database.as_deref(), Some("x.db"));
        match cli.command {
            Commands::Deposit {
                amount,
                currency,
                description,
                reference,
            } => {
                assert_eq!(amount, "1000");
                assert_eq!(currency, "USD");
                assert_eq!(description.as_deref(), Some("Cash in"));
                assert_eq!(reference.as_deref(), Some("R1"));
            }
            _ => panic!("expected deposit command"),
        }
    }

    #[test]
    fn test_cli_parses_repeated_float() {
        let cli =
            Cli::try_parse_from(["tillbook", "open", "-f", "USD=3200", "--float", "EUR=1800.50"])
                .unwrap();
        match cli.command {
            Commands::Open { float } => assert_eq!(float, vec!["USD=3200", "EUR=1800.50"]),
            _ => panic!("expected open command"),
        }
    }
}
