//! Snap sync.
//!
//! Downloads the state under a fixed root in four coupled fetchers:
//!
//! - **Accounts**: pages through the hashed account space with range proofs and hands out
//!   storage and bytecode work for every account that needs it
//! - **Storage**: batches small storage tries into one request, pages large ones
//! - **Bytecode**: fetches contract code by hash
//! - **Trie nodes**: heals whatever part of the trie the range downloads left missing
//!
//! Progress of all four is tracked in one shared [`FetcherDoneFlags`].

pub mod account_fetcher;
pub mod bytecode_fetcher;
pub mod storage_fetcher;
pub mod trie_node_fetcher;

use chain::{RangeProofVerifier, StateStore, SyncConfig};
use containers::{B256, U256, hash_to_u256};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use super::states::SnapPhase;

pub use account_fetcher::{AccountFetcher, AccountTask};
pub use bytecode_fetcher::ByteCodeFetcher;
pub use storage_fetcher::{StorageFetcher, StorageTask};
pub use trie_node_fetcher::{NodePath, NodeRequest, TrieNodeFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapFetcherKind {
    Account,
    Storage,
    ByteCode,
    TrieNode,
}

/// Progress of one fetcher: `count` units covered starting at `first`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetcherProgress {
    pub first: U256,
    pub count: U256,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapProgress {
    pub state_root: B256,
    pub account: FetcherProgress,
    pub storage: FetcherProgress,
    pub byte_code: FetcherProgress,
    pub trie_node: FetcherProgress,
    pub done: bool,
    pub phase: SnapPhase,
}

impl SnapProgress {
    fn fetcher_mut(&mut self, kind: SnapFetcherKind) -> &mut FetcherProgress {
        match kind {
            SnapFetcherKind::Account => &mut self.account,
            SnapFetcherKind::Storage => &mut self.storage,
            SnapFetcherKind::ByteCode => &mut self.byte_code,
            SnapFetcherKind::TrieNode => &mut self.trie_node,
        }
    }

    pub fn fetcher(&self, kind: SnapFetcherKind) -> &FetcherProgress {
        match kind {
            SnapFetcherKind::Account => &self.account,
            SnapFetcherKind::Storage => &self.storage,
            SnapFetcherKind::ByteCode => &self.byte_code,
            SnapFetcherKind::TrieNode => &self.trie_node,
        }
    }
}

/// Completion state shared by the snap fetchers of one run.
#[derive(Debug, Clone)]
pub struct FetcherDoneFlags {
    inner: Arc<RwLock<SnapProgress>>,
}

impl FetcherDoneFlags {
    pub fn new(state_root: B256) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SnapProgress {
                state_root,
                account: FetcherProgress::default(),
                storage: FetcherProgress::default(),
                byte_code: FetcherProgress::default(),
                trie_node: FetcherProgress::default(),
                done: false,
                phase: SnapPhase::Idle,
            })),
        }
    }

    pub fn state_root(&self) -> B256 {
        self.inner.read().state_root
    }

    pub fn snapshot(&self) -> SnapProgress {
        self.inner.read().clone()
    }

    pub fn is_done(&self) -> bool {
        self.inner.read().done
    }

    pub fn phase(&self) -> SnapPhase {
        self.inner.read().phase
    }

    pub fn set_progress(&self, kind: SnapFetcherKind, first: U256, count: U256) {
        let mut progress = self.inner.write();
        let fetcher = progress.fetcher_mut(kind);
        fetcher.first = first;
        fetcher.count = count;
    }

    /// Add `count` units to a fetcher's covered range.
    pub fn add_progress(&self, kind: SnapFetcherKind, count: U256) {
        let mut progress = self.inner.write();
        let fetcher = progress.fetcher_mut(kind);
        fetcher.count = fetcher.count.saturating_add(count);
    }

    /// Mark one fetcher done. The run is done once all four are.
    pub fn mark_done(&self, kind: SnapFetcherKind) {
        let mut progress = self.inner.write();
        progress.fetcher_mut(kind).done = true;
        progress.done = progress.account.done
            && progress.storage.done
            && progress.byte_code.done
            && progress.trie_node.done;
    }

    /// Reopen a fetcher that has new work after being marked done.
    pub fn mark_pending(&self, kind: SnapFetcherKind) {
        let mut progress = self.inner.write();
        progress.fetcher_mut(kind).done = false;
        progress.done = false;
    }

    /// Move to `phase`. Returns false and leaves the phase alone on an invalid transition.
    pub fn advance(&self, phase: SnapPhase) -> bool {
        let mut progress = self.inner.write();
        if !progress.phase.can_transition_to(phase) {
            warn!(from = ?progress.phase, to = ?phase, "Invalid snap phase transition");
            return false;
        }
        info!(from = ?progress.phase, to = ?phase, "Snap phase transition");
        progress.phase = phase;
        true
    }
}

/// Storage slots wanted for one account.
///
/// `first`/`count` bound the hashed slot range still to fetch; a fresh request covers the
/// whole space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRequest {
    pub account_hash: B256,
    pub storage_root: B256,
    pub first: U256,
    pub count: U256,
}

impl StorageRequest {
    pub fn new(account_hash: B256, storage_root: B256) -> Self {
        Self {
            account_hash,
            storage_root,
            first: U256::ZERO,
            count: U256::MAX,
        }
    }

    pub fn is_whole_range(&self) -> bool {
        self.first.is_zero() && self.count == U256::MAX
    }

    /// Last slot hash of the range, inclusive. A count of `U256::MAX` runs to the end of the
    /// key space.
    pub fn limit(&self) -> U256 {
        if self.count == U256::MAX {
            return U256::MAX;
        }
        self.first
            .saturating_add(self.count.saturating_sub(U256::from(1)))
    }

    /// The rest of this request after slot `last`, or `None` when `last` ends it.
    pub fn remainder_after(&self, last: &B256) -> Option<StorageRequest> {
        let last = hash_to_u256(last);
        let limit = self.limit();
        if last >= limit {
            return None;
        }
        let first = last + U256::from(1);
        let count = if limit == U256::MAX {
            U256::MAX - last
        } else {
            limit - last
        };
        Some(StorageRequest {
            account_hash: self.account_hash,
            storage_root: self.storage_root,
            first,
            count,
        })
    }
}

/// Collaborators and limits shared by the snap fetchers.
#[derive(Clone)]
pub struct SnapContext {
    pub state: Arc<dyn StateStore>,
    pub verifier: Arc<dyn RangeProofVerifier>,
    pub flags: FetcherDoneFlags,
    pub max_range_bytes: u64,
    pub max_codes_per_request: usize,
    pub account_range_splits: u64,
    pub max_storage_accounts_per_request: usize,
    pub max_trie_node_paths_per_request: usize,
}

impl SnapContext {
    pub fn new(
        state_root: B256,
        state: Arc<dyn StateStore>,
        verifier: Arc<dyn RangeProofVerifier>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            state,
            verifier,
            flags: FetcherDoneFlags::new(state_root),
            max_range_bytes: config.max_range_bytes,
            max_codes_per_request: (config.max_per_request as usize).max(1),
            account_range_splits: config.account_range_splits.max(1),
            max_storage_accounts_per_request: config.max_storage_accounts_per_request.max(1),
            max_trie_node_paths_per_request: config.max_trie_node_paths_per_request.max(1),
        }
    }

    pub fn state_root(&self) -> B256 {
        self.flags.state_root()
    }
}
