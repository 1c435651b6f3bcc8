use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use fxcheck::cli::setup::setup;
use fxcheck::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fxcheck::AppCommand {
    fn from(cmd: Commands) -> fxcheck::AppCommand {
        match cmd {
            Commands::Resolve { table, plan } => fxcheck::AppCommand::Resolve { table, plan },
            Commands::Run {
                date,
                end_date,
                plan,
            } => fxcheck::AppCommand::Run {
                date,
                end_date,
                plan,
            },
            Commands::Facts {
                from,
                to,
                currency,
                all,
            } => fxcheck::AppCommand::Facts {
                from,
                to,
                currency,
                all,
            },
            Commands::Audit {
                from,
                to,
                currency,
                flagged,
            } => fxcheck::AppCommand::Audit {
                from,
                to,
                currency,
                flagged_only: flagged,
            },
            Commands::Quality { from, to } => fxcheck::AppCommand::Quality { from, to },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show the current snapshot location of a provider table
    Resolve {
        /// Table name, e.g. frankfurter_rates
        table: String,
        /// Plan only: return a placeholder without touching storage
        #[arg(long)]
        plan: bool,
    },
    /// Validate rates for a date (or date range) and store the facts
    Run {
        /// Rate date, defaults to today (UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Last rate date of an inclusive range
        #[arg(short, long)]
        end_date: Option<NaiveDate>,
        /// Plan only: resolve placeholders and persist nothing
        #[arg(long)]
        plan: bool,
    },
    /// List stored facts (validated only, unless --all)
    Facts {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Target currency, e.g. USD
        #[arg(long)]
        currency: Option<String>,
        /// Include flagged facts
        #[arg(long)]
        all: bool,
    },
    /// Show per-source deviations behind stored consensus results
    Audit {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        currency: Option<String>,
        /// Only show flagged currencies
        #[arg(long)]
        flagged: bool,
    },
    /// Display data-quality metrics for stored dates
    Quality {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fxcheck::cli::setup::setup_at_path(path),
            None => setup(),
        },
        Some(cmd) => fxcheck::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
