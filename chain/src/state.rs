use alloy_primitives::{keccak256, Bytes, B256};
use containers::{SnapAccount, EMPTY_ROOT_HASH};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::error::StateError;

/// Destination of downloaded state.
///
/// Accounts and storage are keyed by hashed key. Trie nodes and code are keyed by their own
/// hash, so anything present is already verified.
pub trait StateStore: Send + Sync {
    fn put_accounts(&self, accounts: Vec<(B256, SnapAccount)>) -> Result<(), StateError>;

    fn put_storage(&self, account: B256, slots: Vec<(B256, Bytes)>) -> Result<(), StateError>;

    fn put_codes(&self, codes: Vec<Bytes>) -> Result<(), StateError>;

    fn put_nodes(&self, nodes: Vec<Bytes>) -> Result<(), StateError>;

    fn has_code(&self, hash: &B256) -> bool;

    fn has_node(&self, hash: &B256) -> bool;
}

#[derive(Debug, Default)]
struct Inner {
    accounts: BTreeMap<B256, SnapAccount>,
    storage: HashMap<B256, BTreeMap<B256, Bytes>>,
    codes: HashMap<B256, Bytes>,
    nodes: HashMap<B256, Bytes>,
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: RwLock<Inner>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, hash: &B256) -> Option<SnapAccount> {
        self.inner.read().accounts.get(hash).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.inner.read().accounts.len()
    }

    pub fn storage(&self, account: &B256) -> BTreeMap<B256, Bytes> {
        self.inner
            .read()
            .storage
            .get(account)
            .cloned()
            .unwrap_or_default()
    }

    pub fn code(&self, hash: &B256) -> Option<Bytes> {
        self.inner.read().codes.get(hash).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.accounts.is_empty()
            && inner.storage.is_empty()
            && inner.codes.is_empty()
            && inner.nodes.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn put_accounts(&self, accounts: Vec<(B256, SnapAccount)>) -> Result<(), StateError> {
        self.inner.write().accounts.extend(accounts);
        Ok(())
    }

    fn put_storage(&self, account: B256, slots: Vec<(B256, Bytes)>) -> Result<(), StateError> {
        self.inner
            .write()
            .storage
            .entry(account)
            .or_default()
            .extend(slots);
        Ok(())
    }

    fn put_codes(&self, codes: Vec<Bytes>) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        for code in codes {
            inner.codes.insert(keccak256(&code), code);
        }
        Ok(())
    }

    fn put_nodes(&self, nodes: Vec<Bytes>) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        for node in nodes {
            inner.nodes.insert(keccak256(&node), node);
        }
        Ok(())
    }

    fn has_code(&self, hash: &B256) -> bool {
        self.inner.read().codes.contains_key(hash)
    }

    fn has_node(&self, hash: &B256) -> bool {
        *hash == EMPTY_ROOT_HASH || self.inner.read().nodes.contains_key(hash)
    }
}
