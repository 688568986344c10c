pub mod block;
pub mod mining;
pub mod model;

pub use block::{Block, BlockTemplate, calculate_hash, meets_difficulty};
pub use mining::{
    LogObserver, MiningObserver, MiningOptions, MiningProgress, MiningReport, NoopObserver,
};
pub use model::{Blockchain, ChainConfig};

/// Default Proof-of-Work difficulty (number of leading zeros).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// A SHA-256 digest has 64 hex characters, so no harder target exists.
pub const MAX_DIFFICULTY: u32 = 64;

/// Previous-hash sentinel carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Attempts between two progress reports while mining.
pub const PROGRESS_INTERVAL: u64 = 100_000;

/// Timestamp rendering used both in the hash preimage and in reports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
