use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info};
use rayon::prelude::*;

use super::PROGRESS_INTERVAL;
use super::block::{Block, BlockTemplate, meets_difficulty};
use crate::error::MineError;

/// Periodic snapshot of an in-progress search.
#[derive(Debug, Clone, PartialEq)]
pub struct MiningProgress {
    pub index: u64,
    pub attempts: u64,
    pub elapsed: Duration,
}

impl MiningProgress {
    /// Hashes per second so far.
    pub fn hash_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

/// Outcome of a successful search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningReport {
    pub index: u64,
    pub nonce: u64,
    pub hash: String,
    /// Nonce increments before the winning hash; equals `nonce`.
    pub iterations: u64,
    pub elapsed: Duration,
}

/// Receives advisory telemetry while a block is mined. Implementations must
/// not block for long; nothing they do can change the search result.
pub trait MiningObserver: Send + Sync {
    fn on_progress(&self, _progress: &MiningProgress) {}

    fn on_mined(&self, _report: &MiningReport) {}
}

/// Forwards telemetry to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl MiningObserver for LogObserver {
    fn on_progress(&self, p: &MiningProgress) {
        debug!(
            "MINER - block #{} iteration {} ({:.0} H/s, {} ms)",
            p.index,
            p.attempts,
            p.hash_rate(),
            p.elapsed.as_millis()
        );
    }

    fn on_mined(&self, r: &MiningReport) {
        info!(
            "MINER - sealed block #{} (hash={}, nonce={}, iterations={}, {} ms)",
            r.index,
            r.hash,
            r.nonce,
            r.iterations,
            r.elapsed.as_millis()
        );
    }
}

/// Discards all telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MiningObserver for NoopObserver {}

/// Nonces handed to the rayon pool per round of the parallel search.
pub const PARALLEL_BATCH: u64 = 1 << 14;

/// Knobs for the proof-of-work search. The default is the unbounded,
/// single-threaded search.
#[derive(Debug, Clone)]
pub struct MiningOptions {
    /// Emit progress every this many attempts (0 disables progress).
    pub progress_interval: u64,
    /// Try at most this many nonces, `0..max_attempts`.
    pub max_attempts: Option<u64>,
    /// Set to `true` to abort the search.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Spread the nonce space across the current rayon pool.
    pub parallel: bool,
}

impl Default for MiningOptions {
    fn default() -> Self {
        Self {
            progress_interval: PROGRESS_INTERVAL,
            max_attempts: None,
            cancel: None,
            parallel: false,
        }
    }
}

impl MiningOptions {
    /// Drop the attempt bound and cancellation flag, keeping telemetry and
    /// threading settings.
    pub fn unbounded(&self) -> Self {
        Self {
            max_attempts: None,
            cancel: None,
            ..self.clone()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

impl BlockTemplate {
    /// Unbounded sequential proof-of-work. Returns only once a nonce is found
    /// whose hash starts with `difficulty` zero hex characters.
    pub fn mine(self, difficulty: u32, observer: &dyn MiningObserver) -> (Block, MiningReport) {
        self.mine_sequential(difficulty, &MiningOptions::default(), observer)
            .expect("nonce space exhausted (practically impossible)")
    }

    /// Proof-of-work honouring the attempt bound, cancellation flag and
    /// threading mode in `options`.
    pub fn mine_with(
        self,
        difficulty: u32,
        options: &MiningOptions,
        observer: &dyn MiningObserver,
    ) -> Result<(Block, MiningReport), MineError> {
        if options.parallel {
            self.mine_parallel(difficulty, options, observer)
        } else {
            self.mine_sequential(difficulty, options, observer)
        }
    }

    fn mine_sequential(
        self,
        difficulty: u32,
        options: &MiningOptions,
        observer: &dyn MiningObserver,
    ) -> Result<(Block, MiningReport), MineError> {
        let started = Instant::now();
        let limit = options.max_attempts.unwrap_or(u64::MAX);
        let mut nonce: u64 = 0;
        let mut attempts: u64 = 0;

        loop {
            if attempts >= limit {
                return Err(MineError::Exhausted { attempts });
            }
            if options.is_cancelled() {
                return Err(MineError::Cancelled { attempts });
            }

            let hash = self.hash_at(nonce);
            attempts += 1;

            if meets_difficulty(&hash, difficulty) {
                return Ok(self.finish(nonce, hash, started, observer));
            }

            if options.progress_interval > 0 && attempts % options.progress_interval == 0 {
                observer.on_progress(&MiningProgress {
                    index: self.index(),
                    attempts,
                    elapsed: started.elapsed(),
                });
            }

            nonce = nonce.checked_add(1).ok_or(MineError::Exhausted { attempts })?;
        }
    }

    /// Searches `0..limit` in rounds of [`PARALLEL_BATCH`] nonces. Each round
    /// is split across the rayon pool and the lowest winner in the first
    /// round that has one is committed, which is the nonce the sequential
    /// search would find.
    fn mine_parallel(
        self,
        difficulty: u32,
        options: &MiningOptions,
        observer: &dyn MiningObserver,
    ) -> Result<(Block, MiningReport), MineError> {
        enum Hit {
            Found(u64, String),
            Cancelled,
        }

        let started = Instant::now();
        let limit = options.max_attempts.unwrap_or(u64::MAX);
        let template = &self;
        let mut base: u64 = 0;

        while base < limit {
            if options.is_cancelled() {
                return Err(MineError::Cancelled { attempts: base });
            }

            let end = base.saturating_add(PARALLEL_BATCH).min(limit);
            let hit = (base..end).into_par_iter().find_map_first(|nonce| {
                if options.is_cancelled() {
                    return Some(Hit::Cancelled);
                }
                let hash = template.hash_at(nonce);
                meets_difficulty(&hash, difficulty).then_some(Hit::Found(nonce, hash))
            });

            match hit {
                Some(Hit::Found(nonce, hash)) => {
                    return Ok(self.finish(nonce, hash, started, observer));
                }
                Some(Hit::Cancelled) => return Err(MineError::Cancelled { attempts: base }),
                None => {}
            }

            let interval = options.progress_interval;
            if interval > 0 && end / interval > base / interval {
                observer.on_progress(&MiningProgress {
                    index: self.index(),
                    attempts: end,
                    elapsed: started.elapsed(),
                });
            }
            base = end;
        }

        Err(MineError::Exhausted { attempts: base })
    }

    fn finish(
        self,
        nonce: u64,
        hash: String,
        started: Instant,
        observer: &dyn MiningObserver,
    ) -> (Block, MiningReport) {
        let report = MiningReport {
            index: self.index(),
            nonce,
            hash: hash.clone(),
            iterations: nonce,
            elapsed: started.elapsed(),
        };
        observer.on_mined(&report);
        (self.seal_with_hash(nonce, hash), report)
    }
}
