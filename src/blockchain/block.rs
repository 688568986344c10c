use std::fmt;

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::TIMESTAMP_FORMAT;

/// Compute the SHA-256 commitment of a block's fields.
///
/// The preimage is the plain concatenation `index ++ previous_hash ++ timestamp
/// ++ data ++ nonce` (decimal integers, formatted timestamp, no separators),
/// rendered as lowercase hex.
pub fn calculate_hash(
    index: u64,
    previous_hash: &str,
    timestamp: &NaiveDateTime,
    data: &str,
    nonce: u64,
) -> String {
    let preimage = format!(
        "{}{}{}{}{}",
        index,
        previous_hash,
        timestamp.format(TIMESTAMP_FORMAT),
        data,
        nonce
    );
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    hex::encode(hasher.finalize())
}

/// True when the first `difficulty` hex characters of `hash` are all `'0'`.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|c| c == b'0')
}

/// A block that is still being mined: the immutable fields are fixed, the
/// nonce/hash pair is not yet part of any visible `Block`.
#[derive(Clone)]
pub struct BlockTemplate {
    index: u64,
    previous_hash: String,
    timestamp: NaiveDateTime,
    data: String,
    /// SHA-256 state with everything but the nonce already absorbed.
    prefix: Sha256,
}

impl BlockTemplate {
    /// Create a template stamped with the current local time (second precision).
    pub fn new(index: u64, previous_hash: impl Into<String>, data: impl Into<String>) -> Self {
        Self::with_timestamp(
            index,
            previous_hash,
            data,
            Local::now().naive_local().trunc_subsecs(0),
        )
    }

    /// Create a template with a fixed timestamp.
    pub fn with_timestamp(
        index: u64,
        previous_hash: impl Into<String>,
        data: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        let previous_hash = previous_hash.into();
        let data = data.into();
        let timestamp = timestamp.trunc_subsecs(0);

        let mut prefix = Sha256::new();
        prefix.update(index.to_string().as_bytes());
        prefix.update(previous_hash.as_bytes());
        prefix.update(timestamp.format(TIMESTAMP_FORMAT).to_string().as_bytes());
        prefix.update(data.as_bytes());

        Self {
            index,
            previous_hash,
            timestamp,
            data,
            prefix,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Hash of this template at the given nonce. Equivalent to
    /// [`calculate_hash`] but reuses the absorbed prefix.
    pub fn hash_at(&self, nonce: u64) -> String {
        let mut hasher = self.prefix.clone();
        hasher.update(nonce.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Freeze the template at `nonce`.
    pub fn seal(self, nonce: u64) -> Block {
        let hash = self.hash_at(nonce);
        self.seal_with_hash(nonce, hash)
    }

    pub(crate) fn seal_with_hash(self, nonce: u64, hash: String) -> Block {
        Block {
            index: self.index,
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
            data: self.data,
            nonce,
            hash,
        }
    }
}

impl fmt::Debug for BlockTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockTemplate")
            .field("index", &self.index)
            .field("previous_hash", &self.previous_hash)
            .field("timestamp", &self.timestamp)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// A mined, immutable block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub(crate) index: u64,
    pub(crate) previous_hash: String,
    pub(crate) data: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub(crate) timestamp: NaiveDateTime,
    pub(crate) nonce: u64,
    pub(crate) hash: String,
}

impl Block {
    /// Build an unmined block: timestamp captured now, nonce 0, hash computed.
    pub fn new(index: u64, previous_hash: impl Into<String>, data: impl Into<String>) -> Self {
        BlockTemplate::new(index, previous_hash, data).seal(0)
    }

    /// Start a block in the mining state.
    pub fn builder(
        index: u64,
        previous_hash: impl Into<String>,
        data: impl Into<String>,
    ) -> BlockTemplate {
        BlockTemplate::new(index, previous_hash, data)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Re-derive the hash from the stored fields. Does not touch `self.hash`.
    pub fn calculate_hash(&self) -> String {
        calculate_hash(
            self.index,
            &self.previous_hash,
            &self.timestamp,
            &self.data,
            self.nonce,
        )
    }

    /// Stored hash matches the stored fields.
    pub fn has_intact_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(85))?;
        writeln!(f, "Block Details:")?;
        writeln!(f, "Index         : {}", self.index)?;
        writeln!(f, "Previous Hash : {}", self.previous_hash)?;
        writeln!(f, "Data          : {}", self.data)?;
        writeln!(
            f,
            "Timestamp     : {}",
            self.timestamp.format(TIMESTAMP_FORMAT)
        )?;
        writeln!(f, "Nonce         : {}", self.nonce)?;
        write!(f, "Hash          : {}", self.hash)
    }
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    pub(crate) fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 45))
            .expect("valid date")
    }

    #[test]
    fn hash_matches_known_vector() {
        // sha256("0" ++ "0" ++ "2024-05-01 12:30:45" ++ "Genesis Block" ++ "0")
        let hash = calculate_hash(0, "0", &fixed_time(), "Genesis Block", 0);
        assert_eq!(
            hash,
            "82ce3c662648c04a4753d5ef9f1726b00ee92db069283026c0284d9e92e33544"
        );
    }

    #[test]
    fn hash_is_deterministic() {
        let a = calculate_hash(7, "abc", &fixed_time(), "payload", 42);
        let b = calculate_hash(7, "abc", &fixed_time(), "payload", 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn every_field_feeds_the_hash() {
        let base = calculate_hash(1, "prev", &fixed_time(), "data", 0);
        let later = fixed_time() + chrono::Duration::seconds(1);
        assert_ne!(base, calculate_hash(2, "prev", &fixed_time(), "data", 0));
        assert_ne!(base, calculate_hash(1, "prex", &fixed_time(), "data", 0));
        assert_ne!(base, calculate_hash(1, "prev", &later, "data", 0));
        assert_ne!(base, calculate_hash(1, "prev", &fixed_time(), "dat", 0));
        assert_ne!(base, calculate_hash(1, "prev", &fixed_time(), "data", 1));
    }

    #[test]
    fn template_prefix_agrees_with_full_hash() {
        let template = BlockTemplate::with_timestamp(3, "prev", "hello", fixed_time());
        for nonce in [0, 1, 9, 10, 123_456, u64::MAX] {
            assert_eq!(
                template.hash_at(nonce),
                calculate_hash(3, "prev", &fixed_time(), "hello", nonce)
            );
        }
    }

    #[test]
    fn new_block_is_sealed_at_nonce_zero() {
        let b = Block::new(1, "prev", "data");
        assert_eq!(b.nonce(), 0);
        assert_eq!(b.hash(), b.calculate_hash());
        assert_eq!(b.timestamp().nanosecond(), 0);
    }

    #[test]
    fn tampering_breaks_integrity() {
        let mut b = BlockTemplate::with_timestamp(1, "prev", "data", fixed_time()).seal(5);
        assert!(b.has_intact_hash());
        b.data = "other".into();
        assert!(!b.has_intact_hash());
    }

    #[test]
    fn difficulty_prefix_check() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0ab0", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("00", 3));
    }

    #[test]
    fn display_lists_every_field() {
        let b = BlockTemplate::with_timestamp(2, "prev", "hello", fixed_time()).seal(9);
        let text = b.to_string();
        assert!(text.starts_with(&"=".repeat(85)));
        assert!(text.contains("Index         : 2\n"));
        assert!(text.contains("Previous Hash : prev\n"));
        assert!(text.contains("Data          : hello\n"));
        assert!(text.contains("Timestamp     : 2024-05-01 12:30:45\n"));
        assert!(text.contains("Nonce         : 9\n"));
        assert!(text.ends_with(&format!("Hash          : {}", b.hash())));
    }

    #[test]
    fn serializes_timestamp_in_hash_format() {
        let b = BlockTemplate::with_timestamp(0, "0", "g", fixed_time()).seal(0);
        let json = serde_json::to_value(&b).expect("serialize block");
        assert_eq!(json["timestamp"], "2024-05-01 12:30:45");
        assert_eq!(json["previous_hash"], "0");
        assert_eq!(json["hash"], b.hash());
    }
}
