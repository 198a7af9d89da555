//! Request and response payloads of the `snap` protocol.
//!
//! Ranges are inclusive on both ends and addressed by hashed key. `bytes` is a soft limit on
//! the response size; peers are free to return less and then prove that more data exists.

use alloy_primitives::{Bytes, B256};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetAccountRange {
    pub root: B256,
    pub origin: B256,
    pub limit: B256,
    pub bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountData {
    pub hash: B256,
    /// Slim-encoded account.
    pub body: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountRange {
    pub accounts: Vec<AccountData>,
    pub proof: Vec<Bytes>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetStorageRanges {
    pub root: B256,
    pub accounts: Vec<B256>,
    pub origin: B256,
    pub limit: B256,
    pub bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageData {
    pub hash: B256,
    pub body: Bytes,
}

/// One slot list per served account, in request order. Only the last list may be cut short,
/// in which case `proof` covers it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageRanges {
    pub slots: Vec<Vec<StorageData>>,
    pub proof: Vec<Bytes>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetByteCodes {
    pub hashes: Vec<B256>,
    pub bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteCodes {
    pub codes: Vec<Bytes>,
}

/// Each path set is either `[account_path]` or `[account_hash, storage_path...]`, with paths in
/// hex-prefix compact encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetTrieNodes {
    pub root: B256,
    pub paths: Vec<Vec<Bytes>>,
    pub bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrieNodes {
    pub nodes: Vec<Bytes>,
}
