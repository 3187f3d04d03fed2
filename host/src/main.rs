use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use globe_consensus_core::params::Network;
use globe_consensus_host::config::Config;
use globe_consensus_host::{
    append_verdict_log, inspect_block, list_deployments, parse_block_from_file, resolve_params,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Network to use. Overrides GLOBE_NETWORK.
    #[clap(long, global = true)]
    network: Option<Network>,

    /// Governance block size in bytes. Overrides GLOBE_BLOCK_SIZE.
    #[clap(long, global = true)]
    block_size: Option<u32>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Prints the consensus parameters in force at a height.
    Params {
        #[clap(long, default_value_t = 0)]
        height: u32,
    },
    /// Lists the buried and versioned deployments of the network.
    Deployments,
    /// Checks a consensus-encoded block read from a file.
    Inspect {
        file: PathBuf,
        /// Height the block is validated at.
        #[clap(long)]
        height: u32,
        /// Validation time, defaults to the block's own timestamp.
        #[clap(long)]
        time: Option<i64>,
        /// Appends the block verdict to this borsh log.
        #[clap(long)]
        verdict_log: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?.with_overrides(cli.network, cli.block_size);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let params = config.consensus_params();
    params
        .validate()
        .with_context(|| format!("{} parameters failed validation", config.network))?;
    let limits = config.block_size_limits()?;
    info!(network = %config.network, max_block_weight = limits.max_block_weight, "loaded configuration");

    match cli.command {
        Commands::Params { height } => print_json(&resolve_params(&params, height)),
        Commands::Deployments => print_json(&list_deployments(&params)),
        Commands::Inspect {
            file,
            height,
            time,
            verdict_log,
        } => {
            let block = parse_block_from_file(&file)?;
            let time = time.unwrap_or_else(|| i64::from(block.header.time));
            let report = inspect_block(&params, &limits, &block, height, time);
            if let Some(path) = verdict_log {
                append_verdict_log(&path, &report)?;
            }
            print_json(&report)
        }
    }
}
