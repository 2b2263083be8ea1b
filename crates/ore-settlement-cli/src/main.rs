mod commands;
mod config;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::payments::{CandidatesArgs, CommitArgs, PaymentsArgs, PreviewArgs};
use commands::settle::{ResolveFeesArgs, SettleArgs};

/// Mineral lot settlement and supplier payments
#[derive(Parser)]
#[command(
    name = "ores",
    version,
    about = "Mineral lot settlement and supplier payments",
    long_about = "Settle coltan, cassiterite and wolframite lots from assay and price inputs, \
                  then preview and commit supplier payments that net selected lots against \
                  outstanding advances. All amounts use decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Fee schedule file (TOML or YAML). Falls back to $ORES_CONFIG
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the settlement of a single lot
    Settle(SettleArgs),
    /// Show which fee parameters apply to a lot
    ResolveFees(ResolveFeesArgs),
    /// List a supplier's lots and advances that can be paid
    Candidates(CandidatesArgs),
    /// Preview a supplier payment without changing the ledger
    Preview(PreviewArgs),
    /// Commit a supplier payment and update the ledger file
    Commit(CommitArgs),
    /// List committed payments
    Payments(PaymentsArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let fee_config = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(2);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Settle(args) => commands::settle::run_settle(args, &fee_config),
        Commands::ResolveFees(args) => commands::settle::run_resolve_fees(args, &fee_config),
        Commands::Candidates(args) => commands::payments::run_candidates(args, &fee_config),
        Commands::Preview(args) => commands::payments::run_preview(args, &fee_config),
        Commands::Commit(args) => commands::payments::run_commit(args, &fee_config),
        Commands::Payments(args) => commands::payments::run_payments(args),
        Commands::Version => {
            println!("ores {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
