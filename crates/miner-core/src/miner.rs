//! Proof-of-work nonce search.
//!
//! The nonce space is split into disjoint ranges, one per worker thread.
//! Each worker hashes its own copy of the 76-byte header prefix, so no
//! header state is shared. The first worker to report a match wins and the
//! rest are told to stop; anything they report afterwards is ignored.
//!
//! Every worker checks the [`CancelToken`] before each nonce. When a whole
//! pass comes up empty, [`Miner::mine`] rolls the timestamp forward one
//! second and starts again from nonce 0.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tracing::{debug, info};

use crate::block::BlockHeader;
use crate::difficulty::Target;
use crate::error::MineError;
use crate::hash::{count_leading_zeros, double_sha256, Hash256};

/// Nonces hashed between updates of the shared [`HashCounter`].
pub const HASH_BATCH: u64 = 4096;

/// Default number of timestamp rolls before giving up.
pub const DEFAULT_MAX_TIMESTAMP_ROLLS: u32 = 60;

/// Cloneable flag that aborts an in-progress search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Hashes computed across all workers, for progress reporting.
#[derive(Debug, Clone, Default)]
pub struct HashCounter(Arc<AtomicU64>);

impl HashCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&self, hashes: u64) {
        self.0.fetch_add(hashes, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A nonce and timestamp whose header hash meets the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u32,
    pub timestamp: u32,
    /// Header hash with this nonce and timestamp.
    pub hash: Hash256,
    /// Hashes computed to find it, across all workers and rolls.
    pub hashes: u64,
}

impl Solution {
    /// Write the winning nonce and timestamp into `header`.
    pub fn apply(&self, header: &mut BlockHeader) {
        header.nonce = self.nonce;
        header.timestamp = self.timestamp;
    }
}

/// Multi-threaded nonce searcher.
#[derive(Debug, Clone)]
pub struct Miner {
    workers: usize,
    /// Highest nonce tried in one pass (inclusive).
    nonce_limit: u32,
    max_timestamp_rolls: u32,
    counter: HashCounter,
}

impl Default for Miner {
    fn default() -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Miner::new(workers)
    }
}

impl Miner {
    /// Create a miner with `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        Miner {
            workers: workers.max(1),
            nonce_limit: u32::MAX,
            max_timestamp_rolls: DEFAULT_MAX_TIMESTAMP_ROLLS,
            counter: HashCounter::new(),
        }
    }

    pub fn with_nonce_limit(mut self, nonce_limit: u32) -> Self {
        self.nonce_limit = nonce_limit;
        self
    }

    pub fn with_max_timestamp_rolls(mut self, rolls: u32) -> Self {
        self.max_timestamp_rolls = rolls;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Shared counter of hashes computed by this miner.
    pub fn hash_counter(&self) -> HashCounter {
        self.counter.clone()
    }

    /// Search for a solution, rolling the timestamp when a pass is exhausted.
    ///
    /// `header` is not modified; its nonce is ignored and every pass starts
    /// at 0. Use [`Solution::apply`] to write the result back.
    pub fn mine(
        &self,
        header: &BlockHeader,
        target: &Target,
        cancel: &CancelToken,
    ) -> Result<Solution, MineError> {
        let mut working = *header;
        working.nonce = 0;
        let mut hashes = 0u64;
        let mut rolls = 0u32;

        info!(
            workers = self.workers,
            timestamp = working.timestamp,
            difficulty_target = %target,
            "starting proof-of-work search"
        );

        loop {
            match self.search(&working, target, cancel) {
                Ok(mut solution) => {
                    solution.hashes += hashes;
                    info!(
                        nonce = solution.nonce,
                        timestamp = solution.timestamp,
                        hash = %hex::encode(solution.hash),
                        leading_zeros = count_leading_zeros(&solution.hash),
                        hashes = solution.hashes,
                        "solution found"
                    );
                    return Ok(solution);
                }
                Err(MineError::NonceSpaceExhausted { timestamp })
                    if rolls < self.max_timestamp_rolls =>
                {
                    hashes += self.nonce_limit as u64 + 1;
                    working.timestamp = timestamp
                        .checked_add(1)
                        .ok_or(MineError::NonceSpaceExhausted { timestamp })?;
                    rolls += 1;
                    info!(timestamp = working.timestamp, rolls, "nonce space exhausted, rolling timestamp");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One pass over nonces `0..=nonce_limit` at the header's timestamp.
    pub fn search(
        &self,
        header: &BlockHeader,
        target: &Target,
        cancel: &CancelToken,
    ) -> Result<Solution, MineError> {
        if cancel.is_cancelled() {
            return Err(MineError::Cancelled);
        }

        let prefix = header.serialize_without_nonce();
        let halt = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();

        let (found, hashes) = thread::scope(|scope| {
            for (worker, range) in partition(self.nonce_limit, self.workers).into_iter().enumerate() {
                let tx = tx.clone();
                let halt = &halt;
                let counter = &self.counter;
                scope.spawn(move || {
                    let scan = scan_range(prefix, target, range, cancel, halt, counter);
                    debug!(worker, hashes = scan.hashes, found = scan.found.is_some(), "worker finished");
                    // The receiver outlives every worker
                    let _ = tx.send(scan);
                });
            }
            drop(tx);

            let mut found: Option<(u32, Hash256)> = None;
            let mut hashes = 0u64;
            for scan in rx {
                hashes += scan.hashes;
                if found.is_none() {
                    if let Some(hit) = scan.found {
                        halt.store(true, Ordering::Relaxed);
                        found = Some(hit);
                    }
                }
            }
            (found, hashes)
        });

        match found {
            Some((nonce, hash)) => Ok(Solution {
                nonce,
                timestamp: header.timestamp,
                hash,
                hashes,
            }),
            None if cancel.is_cancelled() => Err(MineError::Cancelled),
            None => Err(MineError::NonceSpaceExhausted {
                timestamp: header.timestamp,
            }),
        }
    }
}

/// What one worker saw in its range.
struct Scan {
    found: Option<(u32, Hash256)>,
    hashes: u64,
}

/// Split `0..=nonce_limit` into at most `workers` disjoint, contiguous ranges.
fn partition(nonce_limit: u32, workers: usize) -> Vec<Range<u64>> {
    let total = nonce_limit as u64 + 1;
    let workers = (workers.max(1) as u64).min(total);
    let chunk = total.div_ceil(workers);

    (0..workers)
        .map(|i| (i * chunk)..((i + 1) * chunk).min(total))
        .filter(|range| !range.is_empty())
        .collect()
}

fn scan_range(
    prefix: [u8; 76],
    target: &Target,
    range: Range<u64>,
    cancel: &CancelToken,
    halt: &AtomicBool,
    counter: &HashCounter,
) -> Scan {
    let mut header = [0u8; 80];
    header[..76].copy_from_slice(&prefix);

    let mut hashes = 0u64;
    let mut pending = 0u64;
    let mut found = None;

    for nonce in range {
        if cancel.is_cancelled() || halt.load(Ordering::Relaxed) {
            break;
        }

        // Ranges never exceed the u32 nonce space
        let nonce = nonce as u32;
        header[76..80].copy_from_slice(&nonce.to_le_bytes());
        let hash = double_sha256(&header);
        hashes += 1;
        pending += 1;

        if target.is_met_by(&hash) {
            found = Some((nonce, hash));
            break;
        }

        if pending == HASH_BATCH {
            counter.add(pending);
            pending = 0;
        }
    }

    counter.add(pending);
    Scan { found, hashes }
}
