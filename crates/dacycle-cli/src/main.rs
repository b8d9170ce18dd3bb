mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use cmd::run::{RunArgs, RunExit};
use dacycle_core::orchestrator::Variant;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dacycle",
    about = "Cycle MPAS/DART filter and perfect-model jobs through a PBS cluster",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to params.yaml (default: search upward from the current directory)
    #[arg(long, global = true, env = "DACYCLE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ensemble filter for every cycle in the range
    Assimilate {
        #[command(flatten)]
        range: Range,
        /// Prepare run directories and job scripts without submitting
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate synthetic observations with perfect_model_obs for every cycle
    PerfectModel {
        #[command(flatten)]
        range: Range,
        /// Prepare run directories and job scripts without submitting
        #[arg(long)]
        dry_run: bool,
    },

    /// List the cycle dates in a range
    Dates {
        #[command(flatten)]
        range: Range,
    },

    /// Inspect and validate params.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[derive(clap::Args)]
struct Range {
    /// First cycle, YYYYMMDDHH
    start: String,
    /// Last cycle, YYYYMMDDHH (inclusive)
    end: String,
    /// Hours between cycles
    interval: u32,
}

impl Range {
    fn args(&self, dry_run: bool) -> RunArgs<'_> {
        RunArgs {
            start: &self.start,
            end: &self.end,
            interval: self.interval,
            dry_run,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Assimilate { .. } | Commands::PerfectModel { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Assimilate { range, dry_run } => {
            cmd::run::run(&config, Variant::Filter, range.args(dry_run), cli.json)
        }
        Commands::PerfectModel { range, dry_run } => {
            cmd::run::run(&config, Variant::PerfectModel, range.args(dry_run), cli.json)
        }
        Commands::Dates { range } => {
            cmd::dates::run(&range.start, &range.end, range.interval, cli.json)
        }
        Commands::Config { subcommand } => cmd::config::run(&config, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        let code = e.downcast_ref::<RunExit>().map_or(1, RunExit::exit_code);
        std::process::exit(code);
    }
}
