use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// Contiguous header segment trusted because it descends from a consensus-announced head.
///
/// `next` is the hash of the block expected at `tail - 1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
pub struct Subchain {
    pub head: u64,
    pub tail: u64,
    pub next: B256,
}

impl Subchain {
    pub fn new(head: u64, tail: u64, next: B256) -> Self {
        Self { head, tail, next }
    }

    pub fn contains(&self, number: u64) -> bool {
        self.tail <= number && number <= self.head
    }

    pub fn len(&self) -> u64 {
        self.head + 1 - self.tail
    }
}

/// Persisted skeleton progress record. Subchains are ordered newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
pub struct SkeletonStatus {
    pub subchains: Vec<Subchain>,
    pub linked: bool,
    pub canonical_head_reset: bool,
    pub safe: u64,
    pub finalized: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PutStatus {
    Valid,
    Invalid,
}

/// Outcome of the most recent canonical fill step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillStatus {
    pub status: PutStatus,
    pub height: u64,
    pub hash: B256,
    pub validation_error: Option<String>,
}

impl FillStatus {
    pub fn valid(height: u64, hash: B256) -> Self {
        Self {
            status: PutStatus::Valid,
            height,
            hash,
            validation_error: None,
        }
    }

    pub fn invalid(height: u64, hash: B256, error: impl Into<String>) -> Self {
        Self {
            status: PutStatus::Invalid,
            height,
            hash,
            validation_error: Some(error.into()),
        }
    }
}
