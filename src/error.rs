use thiserror::Error;

/// Why a proof-of-work search returned without a nonce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    #[error("no valid nonce within {attempts} attempts")]
    Exhausted { attempts: u64 },

    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
}

/// First inconsistency found while scanning a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("chain has no genesis block")]
    Empty,

    #[error("genesis block must have index 0 and previous hash \"0\"")]
    BadGenesis,

    #[error("block #{position} carries index {found}")]
    IndexMismatch { position: usize, found: u64 },

    #[error("block #{index} hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("block #{index} does not link to the previous block's hash")]
    BrokenLink { index: usize },

    #[error("block #{index} hash does not meet difficulty {difficulty}")]
    InsufficientWork { index: usize, difficulty: u32 },
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("difficulty must be between 1 and {max}, got {got}")]
    InvalidDifficulty { got: u32, max: u32 },

    #[error("mining block #{index} failed: {source}")]
    Mining {
        index: u64,
        #[source]
        source: MineError,
    },

    #[error("rejected block: {0}")]
    Rejected(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, ChainError>;
