use alloy_rlp::Decodable;
use alloy_trie::nodes::{RlpNode, TrieNode};
use async_trait::async_trait;
use chain::StateError;
use containers::trie::{compact_encode, nibbles_to_hash, pack_nibbles};
use containers::{B256, Bytes, GetTrieNodes, SnapAccount, U256, keccak256};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

use super::{SnapContext, SnapFetcherKind};
use crate::sync::error::{RequestError, StoreError, StoreErrorAction, StoreOutcome};
use crate::sync::fetcher::{FetchJob, FetcherHandler, RequestFuture};
use crate::sync::peer_manager::SyncPeer;

/// Position of a node: a nibble path in the account trie, and for storage nodes a second
/// path inside the storage trie of the account the first path leads to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath {
    pub account: Vec<u8>,
    pub storage: Option<Vec<u8>>,
}

impl NodePath {
    pub fn account(account: Vec<u8>) -> Self {
        Self {
            account,
            storage: None,
        }
    }

    pub fn storage(account: Vec<u8>, storage: Vec<u8>) -> Self {
        Self {
            account,
            storage: Some(storage),
        }
    }

    fn join(&self, nibbles: &[u8]) -> Self {
        let mut path = self.clone();
        match &mut path.storage {
            Some(storage) => storage.extend_from_slice(nibbles),
            None => path.account.extend_from_slice(nibbles),
        }
        path
    }

    /// Path set as sent in `GetTrieNodes`.
    pub fn to_wire(&self) -> Vec<Bytes> {
        match &self.storage {
            None => vec![compact_encode(&self.account, false)],
            Some(storage) => vec![
                Bytes::from(pack_nibbles(&self.account)),
                compact_encode(storage, false),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRequest {
    pub path: NodePath,
    pub hash: B256,
}

#[derive(Debug, Clone, Default)]
pub struct TrieNodeResult {
    pub nodes: Vec<(NodeRequest, Bytes)>,
    pub unserved: Vec<NodeRequest>,
}

/// Heals the state trie top-down.
///
/// Starting at the root, every fetched node is decoded and each child not already in the
/// state store is requested in turn. Account leaves lead into their storage tries and
/// surface code hashes the store lacks. Nodes are written in one batch once no request is
/// outstanding, so the store never holds a node whose subtree is incomplete.
pub struct TrieNodeFetcher {
    context: SnapContext,
    queue: VecDeque<NodeRequest>,
    requested: HashSet<B256>,
    outstanding: usize,
    fetched: Vec<Bytes>,
    missing_codes: Vec<B256>,
    seen_codes: HashSet<B256>,
}

impl TrieNodeFetcher {
    pub fn new(context: SnapContext) -> Self {
        let mut fetcher = Self {
            context,
            queue: VecDeque::new(),
            requested: HashSet::new(),
            outstanding: 0,
            fetched: Vec::new(),
            missing_codes: Vec::new(),
            seen_codes: HashSet::new(),
        };
        let root = fetcher.context.state_root();
        fetcher.enqueue(NodeRequest {
            path: NodePath::default(),
            hash: root,
        });
        fetcher
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Code hashes referenced by healed accounts and missing from the store.
    pub fn take_missing_codes(&mut self) -> Vec<B256> {
        std::mem::take(&mut self.missing_codes)
    }

    /// Write all fetched nodes to the state store.
    pub fn flush(&mut self) -> Result<(), StateError> {
        if self.fetched.is_empty() {
            return Ok(());
        }
        let nodes = std::mem::take(&mut self.fetched);
        debug!(count = nodes.len(), "Flushing healed trie nodes");
        self.context.state.put_nodes(nodes)
    }

    fn enqueue(&mut self, request: NodeRequest) {
        if self.context.state.has_node(&request.hash) || !self.requested.insert(request.hash) {
            return;
        }
        self.outstanding += 1;
        self.queue.push_back(request);
    }

    /// Queue the children of `node` found at `path`.
    fn expand(&mut self, path: &NodePath, node: TrieNode) -> Result<(), alloy_rlp::Error> {
        match node {
            TrieNode::EmptyRoot => {}
            TrieNode::Branch(branch) => {
                let mut children = branch.stack.iter();
                for index in 0..16u8 {
                    if !branch.state_mask.is_bit_set(index) {
                        continue;
                    }
                    let child = children.next().ok_or(alloy_rlp::Error::Custom(
                        "branch stack shorter than its mask",
                    ))?;
                    self.expand_child(path.join(&[index]), child)?;
                }
            }
            TrieNode::Extension(extension) => {
                self.expand_child(path.join(&extension.key.to_vec()), &extension.child)?;
            }
            TrieNode::Leaf(leaf) => {
                if path.storage.is_none() {
                    let full = path.join(&leaf.key.to_vec());
                    self.expand_account(full.account, &leaf.value)?;
                }
            }
        }
        Ok(())
    }

    fn expand_child(&mut self, path: NodePath, child: &RlpNode) -> Result<(), alloy_rlp::Error> {
        match child.as_hash() {
            Some(hash) => {
                self.enqueue(NodeRequest { path, hash });
                Ok(())
            }
            None => {
                let node = TrieNode::decode(&mut &child[..])?;
                self.expand(&path, node)
            }
        }
    }

    fn expand_account(&mut self, path: Vec<u8>, value: &[u8]) -> Result<(), alloy_rlp::Error> {
        if nibbles_to_hash(&path).is_none() {
            return Err(alloy_rlp::Error::Custom("account leaf at a partial path"));
        }
        let account = SnapAccount::decode(&mut &value[..])?;
        if account.has_storage() {
            self.enqueue(NodeRequest {
                path: NodePath::storage(path, Vec::new()),
                hash: account.storage_root,
            });
        }
        if account.has_code()
            && !self.context.state.has_code(&account.code_hash)
            && self.seen_codes.insert(account.code_hash)
        {
            self.missing_codes.push(account.code_hash);
        }
        Ok(())
    }
}

#[async_trait]
impl FetcherHandler for TrieNodeFetcher {
    type Task = Vec<NodeRequest>;
    type Result = TrieNodeResult;
    type Item = Bytes;

    fn name(&self) -> &'static str {
        "trie-node"
    }

    fn next_tasks(&mut self, limit: usize) -> Vec<Vec<NodeRequest>> {
        let mut tasks = Vec::new();
        while tasks.len() < limit && !self.queue.is_empty() {
            let count = self
                .queue
                .len()
                .min(self.context.max_trie_node_paths_per_request);
            tasks.push(self.queue.drain(..count).collect());
        }
        tasks
    }

    fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }

    fn peer_filter(&self, peer: &SyncPeer) -> bool {
        peer.snap.is_some()
    }

    fn request(&self, job: &FetchJob<Self>, peer: &SyncPeer) -> RequestFuture<TrieNodeResult> {
        let requests = job.task.clone();
        let message = GetTrieNodes {
            root: self.context.state_root(),
            paths: requests.iter().map(|request| request.path.to_wire()).collect(),
            bytes: self.context.max_range_bytes,
        };
        let snap = peer.snap.clone();
        Box::pin(async move {
            let Some(snap) = snap else {
                return Err(RequestError::invalid("peer does not serve snap"));
            };
            let response = snap.get_trie_nodes(message).await?;
            if response.nodes.is_empty() {
                return Ok(None);
            }
            if response.nodes.len() > requests.len() {
                return Err(RequestError::invalid(format!(
                    "{} nodes for {} paths",
                    response.nodes.len(),
                    requests.len()
                )));
            }

            let served = response.nodes.len();
            let mut requests = requests.into_iter();
            let mut nodes = Vec::with_capacity(served);
            for node in response.nodes {
                let Some(request) = requests.next() else {
                    break;
                };
                if keccak256(&node) != request.hash {
                    return Err(RequestError::invalid(format!(
                        "node for {} does not match its hash",
                        request.hash
                    )));
                }
                nodes.push((request, node));
            }
            Ok(Some(TrieNodeResult {
                nodes,
                unserved: requests.collect(),
            }))
        })
    }

    fn process(&mut self, _job: &mut FetchJob<Self>, result: TrieNodeResult) -> Option<Vec<Bytes>> {
        let mut items = Vec::with_capacity(result.nodes.len());
        for (request, node) in result.nodes {
            let expanded = TrieNode::decode(&mut &node[..])
                .and_then(|decoded| self.expand(&request.path, decoded));
            if let Err(error) = expanded {
                warn!(hash = %request.hash, %error, "Undecodable trie node");
            }
            items.push(node);
        }
        if !result.unserved.is_empty() {
            debug!(count = result.unserved.len(), "Re-queueing unserved trie node paths");
            self.queue.extend(result.unserved);
        }
        Some(items)
    }

    async fn store(&mut self, nodes: Vec<Bytes>) -> Result<StoreOutcome, StoreError> {
        let count = nodes.len();
        self.outstanding = self.outstanding.saturating_sub(count);
        self.fetched.extend(nodes);
        self.context
            .flags
            .add_progress(SnapFetcherKind::TrieNode, U256::from(count));
        if self.outstanding == 0 {
            self.flush()?;
        }
        Ok(StoreOutcome::Stored)
    }

    fn process_store_error(&self, _error: &StoreError, _task: &Vec<NodeRequest>) -> StoreErrorAction {
        StoreErrorAction::destroy()
    }
}
