pub mod blockchain;
pub mod cli;
pub mod config;
pub mod error;

pub use blockchain::{Block, BlockTemplate, Blockchain, ChainConfig};
pub use config::Config;
pub use error::{ChainError, MineError, ValidationError};
