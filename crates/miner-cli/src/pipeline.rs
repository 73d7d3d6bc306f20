//! One block-building run: load, validate, assemble, mine, write.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use miner_core::block::{BlockTemplate, TemplateParams};
use miner_core::difficulty::{expected_hashes, format_difficulty};
use miner_core::validation::ValidationSummary;
use miner_core::{
    BlockReport, CancelToken, CoinbaseBuilder, EcdsaVerifier, HashCounter, Miner, MiningStats,
    SkipVerification, Solution, TemplateError, ValidationReport, Validator,
};
use tracing::{debug, info, warn};

use crate::config::MinerConfig;
use crate::mempool;

/// How often the monitor thread logs search progress.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// What a successful run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub validation: ValidationSummary,
    pub solution: Solution,
    pub stats: MiningStats,
    pub output: PathBuf,
}

/// Run the whole pipeline. The report is written only if mining succeeds.
pub fn run(config: &MinerConfig, cancel: &CancelToken) -> anyhow::Result<RunSummary> {
    let entries = mempool::load_dir(&config.mempool.dir)?;
    info!(files = entries.len(), dir = %config.mempool.dir.display(), "mempool loaded");

    let records = entries.into_iter().map(|(path, record)| {
        if let Err(reason) = &record {
            debug!(file = %path.display(), %reason, "unreadable mempool file");
        }
        record
    });
    let report = if config.policy.verify_signatures {
        Validator::<EcdsaVerifier>::default().validate_loaded(records)
    } else {
        warn!("signature verification disabled by policy");
        Validator::new(SkipVerification).validate_loaded(records)
    };
    let validation = report.summary();
    info!(%validation, "validation finished");

    let template = assemble(config, report)?;
    info!(
        transactions = template.transactions.len() + 1,
        fees = template.total_fees(),
        reward = template.coinbase.value(),
        size = template.serialize_block().len(),
        merkle_root = %hex::encode(template.header.merkle_root),
        "template assembled"
    );
    info!(
        difficulty_target = %template.target,
        difficulty = %format_difficulty(template.target.difficulty()),
        expected_hashes = expected_hashes(&template.target),
        "difficulty"
    );

    let miner = Miner::new(
        config
            .mining
            .workers
            .unwrap_or_else(|| Miner::default().workers()),
    )
    .with_max_timestamp_rolls(config.mining.max_timestamp_rolls);

    let timeout = config.mining.timeout_secs.map(Duration::from_secs);
    let started = Instant::now();
    let outcome = with_monitor(miner.hash_counter(), cancel, timeout, || {
        miner.mine(&template.header, &template.target, cancel)
    });
    let stats = MiningStats::new(miner.hash_counter().get(), started.elapsed());
    let solution = outcome.with_context(|| {
        format!("mining stopped after {} hashes", stats.total_hashes)
    })?;

    let block = BlockReport::new(&template, &solution);
    fs::write(&config.output.path, block.render())
        .with_context(|| format!("failed to write {}", config.output.path.display()))?;
    info!(
        path = %config.output.path.display(),
        hash = %hex::encode(solution.hash),
        "block report written"
    );

    Ok(RunSummary {
        validation,
        solution,
        stats,
        output: config.output.path.clone(),
    })
}

fn assemble(config: &MinerConfig, report: ValidationReport) -> anyhow::Result<BlockTemplate> {
    if report.is_empty() {
        if config.policy.require_transactions {
            return Err(TemplateError::EmptyValidSet.into());
        }
        warn!("no valid transactions, mining a coinbase-only block");
    }

    let block = &config.block;
    let params = TemplateParams {
        version: block.version,
        prev_block_hash: block.prev_block_hash()?,
        timestamp: block.timestamp(),
        target: block.target()?,
    };
    let builder = CoinbaseBuilder::new(block.payout_script()?);

    Ok(BlockTemplate::build(params, &builder, block.subsidy(), report.accepted)?)
}

/// Run `search` while a monitor thread logs progress and enforces `timeout`.
fn with_monitor<T>(
    counter: HashCounter,
    cancel: &CancelToken,
    timeout: Option<Duration>,
    search: impl FnOnce() -> T,
) -> T {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let cancel = cancel.clone();
    let started = Instant::now();

    let monitor = thread::spawn(move || loop {
        let wait = match timeout {
            Some(limit) => match limit.checked_sub(started.elapsed()) {
                Some(left) => left.min(PROGRESS_INTERVAL),
                None => {
                    warn!(secs = limit.as_secs(), "timeout reached, cancelling search");
                    cancel.cancel();
                    return;
                }
            },
            None => PROGRESS_INTERVAL,
        };

        match done_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {
                let stats = MiningStats::new(counter.get(), started.elapsed());
                debug!(hashes = stats.total_hashes, rate = %stats.format_hash_rate(), "searching");
            }
            _ => return,
        }
    });

    let result = search();
    // The monitor may already have exited on timeout
    let _ = done_tx.send(());
    if monitor.join().is_err() {
        warn!("progress monitor panicked");
    }
    result
}
