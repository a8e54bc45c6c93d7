//! okectl - planning helper for OKE cluster lifecycle operations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use oke_lifecycle::network::{distribute, MIN_WORKER_SUBNETS};
use oke_lifecycle::LifecycleConfig;

/// okectl - OKE cluster lifecycle helper.
#[derive(Parser)]
#[command(name = "okectl")]
#[command(about = "Plan node pool placement and inspect lifecycle settings")]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a node pool would be spread over worker subnets.
    Plan {
        /// Requested instance count.
        #[arg(long)]
        count: u32,

        /// Worker subnet IDs in network order (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        worker_subnets: Vec<String>,
    },

    /// Print the effective lifecycle configuration.
    Config,
}

#[derive(Serialize)]
struct PlanOutput {
    quantity_per_subnet: u32,
    subnet_ids: Vec<String>,
    total: u32,
    distributable: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Plan {
            count,
            worker_subnets,
        } => {
            info!(count, worker_subnets = worker_subnets.len(), "Planning node pool placement");

            let placement = distribute(count, &worker_subnets);
            if placement.is_empty() && count > 0 {
                info!(
                    required = MIN_WORKER_SUBNETS,
                    "Not distributable: too few worker subnets"
                );
            }

            let output = PlanOutput {
                quantity_per_subnet: placement.quantity_per_subnet,
                total: placement.total(),
                distributable: !placement.is_empty(),
                subnet_ids: placement.subnet_ids,
            };
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialize plan")?;
            println!("{json}");
        }
        Commands::Config => {
            let config = LifecycleConfig::from_env();
            let json =
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("{json}");
        }
    }

    Ok(())
}
