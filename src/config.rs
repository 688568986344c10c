use clap::Parser;

use crate::blockchain::{
    ChainConfig, DEFAULT_DIFFICULTY, MAX_DIFFICULTY, MiningOptions, PROGRESS_INTERVAL,
};

/// Command-line and environment settings. Values from a `.env` file are
/// picked up as long as it is loaded before parsing.
#[derive(Debug, Clone, Parser)]
#[command(name = "hashchain", version, about = "Interactive proof-of-work hash chain")]
pub struct Config {
    /// Leading zero hex characters required in every block hash.
    #[arg(
        long,
        env = "DIFFICULTY",
        default_value_t = DEFAULT_DIFFICULTY,
        value_parser = clap::value_parser!(u32).range(1..=MAX_DIFFICULTY as i64)
    )]
    pub difficulty: u32,

    /// Attempts between two mining progress log lines (0 disables them).
    #[arg(long, env = "PROGRESS_INTERVAL", default_value_t = PROGRESS_INTERVAL)]
    pub progress_interval: u64,

    /// Give up on a block after this many nonces.
    #[arg(long, env = "MAX_ATTEMPTS")]
    pub max_attempts: Option<u64>,

    /// Mining threads; more than one spreads the nonce search over a pool.
    #[arg(
        long,
        env = "MINING_THREADS",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub threads: u32,

    /// Print the final chain as JSON instead of the text report.
    #[arg(long)]
    pub json: bool,
}

impl Config {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            difficulty: self.difficulty,
            mining: MiningOptions {
                progress_interval: self.progress_interval,
                max_attempts: self.max_attempts,
                cancel: None,
                parallel: self.threads > 1,
            },
        }
    }

    /// Size the global rayon pool used by parallel mining.
    pub fn init_thread_pool(&self) -> Result<(), rayon::ThreadPoolBuildError> {
        if self.threads > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads as usize)
                .thread_name(|i| format!("miner-{i}"))
                .build_global()?;
        }
        Ok(())
    }
}
