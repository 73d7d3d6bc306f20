//! block-miner CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miner_core::CancelToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod mempool;
mod pipeline;

use config::MinerConfig;

#[derive(Parser, Debug)]
#[command(name = "block-miner")]
#[command(about = "Build a block template from a mempool directory and mine it", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of mempool transaction records (*.json)
    #[arg(long)]
    mempool: Option<PathBuf>,

    /// Where to write the block report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target as 64 hex digits
    #[arg(long, conflicts_with = "bits")]
    target: Option<String>,

    /// Compact target, e.g. 1f00ffff
    #[arg(long, value_parser = parse_bits)]
    bits: Option<u32>,

    /// Previous block hash (display order)
    #[arg(long)]
    prev_block_hash: Option<String>,

    /// Header timestamp (defaults to now)
    #[arg(long)]
    timestamp: Option<u32>,

    /// Block height, used to derive the subsidy
    #[arg(long)]
    height: Option<u32>,

    /// Explicit subsidy in base units
    #[arg(long)]
    subsidy: Option<u64>,

    /// Hex script the coinbase pays to
    #[arg(long)]
    payout_script: Option<String>,

    /// Worker threads (defaults to all cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Accept inputs without checking their signatures
    #[arg(long)]
    skip_signatures: bool,

    /// Fail instead of mining a coinbase-only block
    #[arg(long)]
    require_transactions: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Apply command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut MinerConfig) {
        if let Some(dir) = &self.mempool {
            config.mempool.dir = dir.clone();
        }
        if let Some(path) = &self.output {
            config.output.path = path.clone();
        }
        if let Some(target) = &self.target {
            config.block.target = Some(target.clone());
            config.block.bits = None;
        }
        if let Some(bits) = self.bits {
            config.block.bits = Some(bits);
            config.block.target = None;
        }
        if let Some(hash) = &self.prev_block_hash {
            config.block.prev_block_hash = hash.clone();
        }
        if self.timestamp.is_some() {
            config.block.timestamp = self.timestamp;
        }
        if let Some(height) = self.height {
            config.block.height = height;
            config.block.subsidy = None;
        }
        if self.subsidy.is_some() {
            config.block.subsidy = self.subsidy;
        }
        if let Some(script) = &self.payout_script {
            config.block.payout_script = script.clone();
        }
        if self.workers.is_some() {
            config.mining.workers = self.workers;
        }
        if self.timeout.is_some() {
            config.mining.timeout_secs = self.timeout;
        }
        if self.skip_signatures {
            config.policy.verify_signatures = false;
        }
        if self.require_transactions {
            config.policy.require_transactions = true;
        }
    }
}

fn parse_bits(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid compact bits '{}': {}", s, e))
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => MinerConfig::load(path)?,
        None => MinerConfig::default(),
    };
    cli.apply(&mut config);

    let summary = pipeline::run(&config, &CancelToken::new())?;
    info!(
        accepted = summary.validation.accepted,
        rejected = summary.validation.rejected,
        nonce = summary.solution.nonce,
        hashes = summary.stats.total_hashes,
        rate = %summary.stats.format_hash_rate(),
        output = %summary.output.display(),
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "block-miner",
            "--mempool",
            "/data/pool",
            "--bits",
            "0x1d00ffff",
            "--subsidy",
            "2500000",
            "--skip-signatures",
            "-w",
            "3",
        ]);

        let mut config = MinerConfig::default();
        config.block.target = Some("ff".repeat(32));
        cli.apply(&mut config);

        assert_eq!(config.mempool.dir, PathBuf::from("/data/pool"));
        assert_eq!(config.block.bits, Some(0x1d00ffff));
        assert_eq!(config.block.target, None);
        assert_eq!(config.block.subsidy(), 2_500_000);
        assert_eq!(config.mining.workers, Some(3));
        assert!(!config.policy.verify_signatures);
        // Untouched fields keep their file values
        assert_eq!(config.output.path, PathBuf::from("./output.txt"));
    }

    #[test]
    fn test_parse_bits() {
        assert_eq!(parse_bits("1f00ffff"), Ok(0x1f00ffff));
        assert_eq!(parse_bits("0x1d00ffff"), Ok(0x1d00ffff));
        assert!(parse_bits("zz").is_err());
    }

    #[test]
    fn test_target_conflicts_with_bits() {
        let result = Cli::try_parse_from(["block-miner", "--target", "00", "--bits", "1d00ffff"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbose_count() {
        let cli = Cli::parse_from(["block-miner", "-vv"]);
        assert_eq!(cli.verbose, 2);
    }
}
