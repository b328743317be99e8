pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use towline_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

use commands::estimate::EstimateArgs;
use commands::quote::QuoteArgs;
use commands::reassign::ReassignArgs;

#[derive(Debug, Parser)]
#[command(
    name = "towline",
    about = "Towline dispatch operator CLI",
    long_about = "Capture and track roadside-assistance services, price trips against client rate \
                  cards and inspect runtime readiness.",
    after_help = "Examples:\n  towline doctor --json\n  towline capture --file service.json\n  towline advance 1001\n  towline quote --client ike-asistencia --mode foraneo --km 42"
)]
pub struct Cli {
    #[arg(long, global = true, default_value = "Operador", help = "Name recorded in the change log")]
    actor: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo client catalogue and verify it")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, map readiness, DB connectivity and schema version")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Dispatch board with summary counters")]
    List {
        #[arg(long, help = "Include closed services")]
        all: bool,
    },
    #[command(about = "Show one service with its rendered change log")]
    Show { folio: i64 },
    #[command(about = "Capture a service from a JSON request file")]
    Capture {
        #[arg(long)]
        file: PathBuf,
    },
    #[command(about = "Unlock the assignment with a reason and change unit, operator or ETA")]
    Reassign {
        folio: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        operator: Option<String>,
        #[arg(long, help = "ETA such as `45`, `1 h 20 min`")]
        eta: Option<String>,
    },
    #[command(about = "Advance a service to its next status")]
    Advance { folio: i64 },
    #[command(about = "Close a service")]
    Archive { folio: i64 },
    #[command(about = "Append a note to the change log")]
    Note { folio: i64, text: String },
    #[command(about = "Price a trip against a client's rate card")]
    Quote {
        #[arg(long)]
        client: String,
        #[arg(long, default_value = "local")]
        mode: String,
        #[arg(long, default_value = "0")]
        km: String,
        #[arg(long = "extra", value_name = "KEY=QTY")]
        extras: Vec<String>,
        #[arg(long)]
        night: bool,
    },
    #[command(about = "Estimate approach and transfer legs from coordinates")]
    Estimate {
        #[arg(long)]
        crane: String,
        #[arg(long)]
        origin: String,
        #[arg(long)]
        destination: Option<String>,
        #[arg(long)]
        odometer: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config.logging);
    }

    let actor = cli.actor.as_str();
    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::List { all } => commands::list::run(all),
        Command::Show { folio } => commands::show::run(folio, actor),
        Command::Capture { file } => commands::capture::run(file, actor),
        Command::Reassign { folio, reason, unit, operator, eta } => {
            commands::reassign::run(ReassignArgs { folio, reason, unit, operator, eta }, actor)
        }
        Command::Advance { folio } => commands::advance::run(folio, actor),
        Command::Archive { folio } => commands::archive::run(folio, actor),
        Command::Note { folio, text } => commands::note::run(folio, &text, actor),
        Command::Quote { client, mode, km, extras, night } => {
            commands::quote::run(QuoteArgs { client, mode, km, extras, night_shift: night })
        }
        Command::Estimate { crane, origin, destination, odometer } => {
            commands::estimate::run(EstimateArgs { crane, origin, destination, odometer })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON document. `RUST_LOG` wins over the
/// configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
