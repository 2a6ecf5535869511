use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use blockfec::{chunk_count, FecConfig};
use blockfec_sim::{practical_baseline, run_broadcast, BroadcastParams};
use clap::Parser;
use tracing::{error, info};

/// Sends a random blob over simulated lossy links and prints a JSON report.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Blob size in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    size: usize,
    /// Per-chunk loss probability in percent
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    loss_percent: Option<u8>,
    /// Repair slots on top of the data chunks
    #[arg(long)]
    repair_slots: Option<usize>,
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Coding config file (TOML)
    #[arg(long, short, env = "BLOCKFEC_CONFIG")]
    config: Option<PathBuf>,
    /// Re-encode at an intermediate hop and send a second lossy leg
    #[arg(long)]
    relay: bool,
    #[arg(long, short)]
    verbose: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<FecConfig, String> {
    let Some(path) = path else {
        return Ok(FecConfig::default());
    };
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    toml::from_str(&raw).map_err(|err| format!("failed to parse {}: {err}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = std::env::var("BLOCKFEC_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let baseline = practical_baseline();
    let params = BroadcastParams {
        data_size: cli.size,
        loss_percent: cli.loss_percent.unwrap_or(baseline.loss_rate_percent),
        repair_slots: cli
            .repair_slots
            .unwrap_or_else(|| baseline.repair_slots(chunk_count(cli.size))),
        seed: cli.seed,
        relay: cli.relay,
    };
    info!(?params, "starting broadcast");

    let report = match run_broadcast(&params, &config) {
        Ok(report) => report,
        Err(err) => {
            error!("broadcast failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            error!("failed to serialize report: {err}");
            return ExitCode::FAILURE;
        }
    }
    if report.delivered() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
