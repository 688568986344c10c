use std::fmt;

use log::warn;
use serde::Serialize;

use super::{
    Block, BlockTemplate, DEFAULT_DIFFICULTY, GENESIS_PREVIOUS_HASH, LogObserver, MAX_DIFFICULTY,
    MiningObserver, MiningOptions,
};
use crate::error::{ChainError, Result, ValidationError};

/// Per-chain settings. The difficulty is fixed for the chain's lifetime.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub difficulty: u32,
    pub mining: MiningOptions,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining: MiningOptions::default(),
        }
    }
}

/// Simple in-memory blockchain with Proof-of-Work.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    config: ChainConfig,
}

#[derive(Serialize)]
struct ChainExport<'a> {
    length: usize,
    difficulty: u32,
    valid: bool,
    chain: &'a [Block],
}

impl Blockchain {
    /// Initialize a new blockchain, mining the genesis block at the default
    /// difficulty.
    pub fn new(genesis_data: impl Into<String>) -> Self {
        let config = ChainConfig::default();
        let (genesis, _) = BlockTemplate::new(0, GENESIS_PREVIOUS_HASH, genesis_data)
            .mine(config.difficulty, &LogObserver);
        Self {
            blocks: vec![genesis],
            config,
        }
    }

    pub fn with_difficulty(genesis_data: impl Into<String>, difficulty: u32) -> Result<Self> {
        let config = ChainConfig {
            difficulty,
            ..ChainConfig::default()
        };
        Self::with_config(genesis_data, config, &LogObserver)
    }

    /// Initialize a blockchain with explicit settings. Genesis mining honours
    /// the attempt bound and cancellation flag in `config.mining`.
    pub fn with_config(
        genesis_data: impl Into<String>,
        config: ChainConfig,
        observer: &dyn MiningObserver,
    ) -> Result<Self> {
        if !(1..=MAX_DIFFICULTY).contains(&config.difficulty) {
            return Err(ChainError::InvalidDifficulty {
                got: config.difficulty,
                max: MAX_DIFFICULTY,
            });
        }

        let (genesis, _) = BlockTemplate::new(0, GENESIS_PREVIOUS_HASH, genesis_data)
            .mine_with(config.difficulty, &config.mining, observer)
            .map_err(|source| ChainError::Mining { index: 0, source })?;

        Ok(Self {
            blocks: vec![genesis],
            config,
        })
    }

    /// Return the last block in the chain.
    pub fn latest(&self) -> &Block {
        self.blocks
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    fn next_template(&self, data: impl Into<String>) -> BlockTemplate {
        BlockTemplate::new(self.blocks.len() as u64, self.latest().hash(), data)
    }

    /// Mine and append a new block with the provided `data`. The search is
    /// unbounded: any attempt limit or cancel flag in the config is ignored.
    pub fn append(&mut self, data: impl Into<String>) -> &Block {
        let options = self.config.mining.unbounded();
        let (block, _) = self
            .next_template(data)
            .mine_with(self.config.difficulty, &options, &LogObserver)
            .expect("nonce space exhausted (practically impossible)");

        self.blocks.push(block);
        self.latest()
    }

    /// Like [`append`](Self::append) but honours the configured attempt bound
    /// and cancellation flag. Nothing is appended on failure.
    pub fn try_append(
        &mut self,
        data: impl Into<String>,
        observer: &dyn MiningObserver,
    ) -> Result<&Block> {
        let template = self.next_template(data);
        let index = template.index();
        let (block, _) = template
            .mine_with(self.config.difficulty, &self.config.mining, observer)
            .map_err(|source| ChainError::Mining { index, source })?;

        self.blocks.push(block);
        Ok(self.latest())
    }

    /// Append a block mined elsewhere after checking that it extends the tip
    /// and carries valid proof-of-work.
    pub fn append_mined(&mut self, block: Block) -> Result<&Block> {
        let position = self.blocks.len();
        if block.index() != position as u64 {
            return Err(ValidationError::IndexMismatch {
                position,
                found: block.index(),
            }
            .into());
        }
        if block.previous_hash() != self.latest().hash() {
            return Err(ValidationError::BrokenLink { index: position }.into());
        }
        if !block.has_intact_hash() {
            return Err(ValidationError::HashMismatch { index: position }.into());
        }
        if !block.meets_difficulty(self.config.difficulty) {
            return Err(ValidationError::InsufficientWork {
                index: position,
                difficulty: self.config.difficulty,
            }
            .into());
        }

        self.blocks.push(block);
        Ok(self.latest())
    }

    /// Scan the whole chain and report the first inconsistency: broken
    /// linkage, a hash that no longer matches its block, or missing work.
    pub fn verify(&self) -> std::result::Result<(), ValidationError> {
        let difficulty = self.config.difficulty;
        let genesis = self.blocks.first().ok_or(ValidationError::Empty)?;

        if genesis.index() != 0 || genesis.previous_hash() != GENESIS_PREVIOUS_HASH {
            return Err(ValidationError::BadGenesis);
        }
        if !genesis.has_intact_hash() {
            return Err(ValidationError::HashMismatch { index: 0 });
        }
        if !genesis.meets_difficulty(difficulty) {
            return Err(ValidationError::InsufficientWork {
                index: 0,
                difficulty,
            });
        }

        for (i, pair) in self.blocks.windows(2).enumerate() {
            let (prev, current) = (&pair[0], &pair[1]);
            let index = i + 1;

            if current.index() != index as u64 {
                return Err(ValidationError::IndexMismatch {
                    position: index,
                    found: current.index(),
                });
            }
            if !current.has_intact_hash() {
                return Err(ValidationError::HashMismatch { index });
            }
            if current.previous_hash() != prev.hash() {
                return Err(ValidationError::BrokenLink { index });
            }
            if !current.meets_difficulty(difficulty) {
                return Err(ValidationError::InsufficientWork { index, difficulty });
            }
        }

        Ok(())
    }

    /// Validate the entire chain: linkage, hashes and PoW.
    pub fn is_valid(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(e) => {
                warn!("chain validation failed: {e}");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn difficulty(&self) -> u32 {
        self.config.difficulty
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// JSON rendering of the chain together with its validity verdict.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ChainExport {
            length: self.len(),
            difficulty: self.difficulty(),
            valid: self.is_valid(),
            chain: &self.blocks,
        })
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            writeln!(f, "{block}")?;
        }
        let verdict = if self.is_valid() { "valid" } else { "invalid" };
        write!(f, "\nThe blockchain is {verdict}")
    }
}
