use alloy_trie::proof::ProofRetainer;
use alloy_trie::{HashBuilder, Nibbles};
use async_trait::async_trait;
use chain::{ProofError, RangeProofVerifier};
use containers::block::transactions_root;
use containers::trie::compact_encode;
use containers::{
    AccountData, AccountRange, B256, Block, BlockBody, ByteCodes, Bytes, EMPTY_OMMER_ROOT_HASH,
    EMPTY_ROOT_HASH, GetAccountRange, GetBlockBodies, GetBlockHeaders, GetByteCodes,
    GetStorageRanges, GetTrieNodes, Header, SnapAccount, StorageData, StorageRanges, TrieNodes,
    hash_to_u256, keccak256,
};
use libp2p_identity::PeerId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::sync::config::FetcherConfig;
use crate::sync::peer_manager::{PeerManager, SharedPeerManager, SyncPeer};
use crate::types::{EthProtocol, PeerRequestError, SnapProtocol};

pub fn test_config() -> FetcherConfig {
    FetcherConfig {
        timeout: Duration::from_secs(1),
        interval: Duration::from_millis(100),
        ban_time: Duration::from_secs(60),
        max_queue: 4,
        max_per_request: 10,
        max_fetcher_jobs: 100,
    }
}

pub fn genesis() -> Block {
    Block {
        header: Header {
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            transactions_root: EMPTY_ROOT_HASH,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Empty child of `parent`; `salt` tells forks apart.
pub fn child(parent: &Block, salt: u8) -> Block {
    Block {
        header: Header {
            parent_hash: parent.hash(),
            number: parent.number() + 1,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            transactions_root: EMPTY_ROOT_HASH,
            extra_data: vec![salt].into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Child of `parent` carrying one transaction, so its body must be fetched.
pub fn child_with_tx(parent: &Block, tx: &[u8]) -> Block {
    let transactions = vec![Bytes::copy_from_slice(tx)];
    Block {
        header: Header {
            parent_hash: parent.hash(),
            number: parent.number() + 1,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            transactions_root: transactions_root(&transactions),
            ..Default::default()
        },
        transactions,
        ..Default::default()
    }
}

/// Genesis plus `len` descendants; index equals block number.
pub fn build_chain(len: u64, salt: u8) -> Vec<Block> {
    extend_chain(vec![genesis()], len, salt)
}

pub fn extend_chain(mut blocks: Vec<Block>, len: u64, salt: u8) -> Vec<Block> {
    for _ in 0..len {
        let parent = blocks.last().cloned().unwrap_or_else(genesis);
        blocks.push(child(&parent, salt));
    }
    blocks
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EthBehaviour {
    /// Serve at most this many headers per request.
    Serve(usize),
    Empty,
    Fail,
    Hang,
    /// Serve headers, but bodies with an altered transaction.
    BadBodies,
}

pub struct MockEth {
    pub blocks: Vec<Block>,
    pub behaviour: EthBehaviour,
    pub header_calls: AtomicUsize,
}

impl MockEth {
    pub fn new(blocks: Vec<Block>, behaviour: EthBehaviour) -> Self {
        Self {
            blocks,
            behaviour,
            header_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EthProtocol for MockEth {
    async fn get_block_headers(
        &self,
        request: GetBlockHeaders,
    ) -> Result<Vec<Header>, PeerRequestError> {
        self.header_calls.fetch_add(1, Ordering::SeqCst);
        let max = match self.behaviour {
            EthBehaviour::Serve(max) => max,
            EthBehaviour::BadBodies => usize::MAX,
            EthBehaviour::Empty => return Ok(Vec::new()),
            EthBehaviour::Fail => return Err(PeerRequestError::Rejected("mock failure".into())),
            EthBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(Vec::new());
            }
        };
        Ok(request
            .expected_numbers()
            .map_while(|number| self.blocks.get(number as usize))
            .take(max)
            .map(|block| block.header.clone())
            .collect())
    }

    async fn get_block_bodies(
        &self,
        request: GetBlockBodies,
    ) -> Result<Vec<BlockBody>, PeerRequestError> {
        Ok(request
            .hashes
            .iter()
            .filter_map(|hash| self.blocks.iter().find(|block| block.hash() == *hash))
            .map(|block| {
                let mut body = block.body();
                if self.behaviour == EthBehaviour::BadBodies {
                    body.transactions = vec![Bytes::from_static(b"forged")];
                }
                body
            })
            .collect())
    }
}

pub fn eth_peer(eth: Arc<MockEth>) -> SyncPeer {
    SyncPeer::new(PeerId::random()).with_eth(eth)
}

pub fn snap_peer(snap: Arc<MockSnap>) -> SyncPeer {
    SyncPeer::new(PeerId::random()).with_snap(snap)
}

pub fn shared_peers(peers: Vec<SyncPeer>) -> SharedPeerManager {
    let mut manager = PeerManager::new();
    for peer in peers {
        manager.add_peer(peer);
    }
    manager.shared()
}

/// Accepts any range unless the proof carries a `bad` node; `more` marks a cut-short range.
pub struct MockVerifier;

pub const MORE: &[u8] = b"more";
pub const END: &[u8] = b"end";
pub const BAD: &[u8] = b"bad";

impl RangeProofVerifier for MockVerifier {
    fn verify_range_proof(
        &self,
        root: B256,
        _origin: B256,
        keys: &[B256],
        _values: &[Bytes],
        proof: &[Bytes],
    ) -> Result<bool, ProofError> {
        if proof.iter().any(|node| node.as_ref() == BAD) {
            return Err(ProofError::RootMismatch {
                expected: root,
                got: B256::ZERO,
            });
        }
        Ok(!keys.is_empty() && proof.iter().any(|node| node.as_ref() == MORE))
    }
}

/// A small state with real tries, served by [`MockSnap`].
#[derive(Clone, Default)]
pub struct TestState {
    pub root: B256,
    pub accounts: Vec<(B256, SnapAccount)>,
    pub storage: HashMap<B256, Vec<(B256, Bytes)>>,
    pub codes: HashMap<B256, Bytes>,
    /// Trie nodes keyed by their `GetTrieNodes` path set.
    pub nodes: HashMap<Vec<Bytes>, Bytes>,
}

fn build_trie(leaves: &[(B256, Bytes)]) -> (B256, Vec<(Vec<u8>, Bytes)>) {
    let targets = leaves.iter().map(|(key, _)| Nibbles::unpack(key));
    let mut builder = HashBuilder::default().with_proof_retainer(ProofRetainer::from_iter(targets));
    for (key, value) in leaves {
        builder.add_leaf(Nibbles::unpack(key), value);
    }
    let root = builder.root();
    let nodes = builder
        .take_proof_nodes()
        .into_inner()
        .into_iter()
        .map(|(path, node)| (path.to_vec(), node))
        .collect();
    (root, nodes)
}

impl TestState {
    /// `accounts` accounts; every third has two storage slots, every fourth has code.
    pub fn generate(accounts: u8) -> Self {
        let mut state = TestState::default();
        for i in 0..accounts {
            let hash = keccak256([i]);
            let mut account = SnapAccount {
                nonce: u64::from(i),
                ..Default::default()
            };
            if i % 3 == 0 {
                let mut slots: Vec<(B256, Bytes)> = (0..2u8)
                    .map(|slot| {
                        (
                            keccak256([i, slot]),
                            Bytes::from(alloy_rlp::encode(u64::from(slot) + 1)),
                        )
                    })
                    .collect();
                slots.sort_by_key(|(key, _)| *key);
                let (storage_root, nodes) = build_trie(&slots);
                for (path, node) in nodes {
                    state.nodes.insert(
                        vec![
                            Bytes::copy_from_slice(hash.as_slice()),
                            compact_encode(&path, false),
                        ],
                        node,
                    );
                }
                account.storage_root = storage_root;
                state.storage.insert(hash, slots);
            }
            if i % 4 == 0 {
                let code = Bytes::from(vec![0x60, i]);
                account.code_hash = keccak256(&code);
                state.codes.insert(account.code_hash, code);
            }
            state.accounts.push((hash, account));
        }
        state.accounts.sort_by_key(|(hash, _)| *hash);

        let leaves: Vec<(B256, Bytes)> = state
            .accounts
            .iter()
            .map(|(hash, account)| (*hash, Bytes::from(account.encode_full())))
            .collect();
        let (root, nodes) = build_trie(&leaves);
        state.root = root;
        for (path, node) in nodes {
            state.nodes.insert(vec![compact_encode(&path, false)], node);
        }
        state
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapBehaviour {
    Honest,
    BadProof,
}

pub struct MockSnap {
    pub state: TestState,
    pub behaviour: SnapBehaviour,
    /// Items per range response.
    pub page: usize,
    /// Accounts served per storage request.
    pub storage_accounts: usize,
    pub calls: AtomicUsize,
    /// Trie node paths asked for so far.
    pub node_paths: AtomicUsize,
}

impl MockSnap {
    pub fn new(state: TestState, behaviour: SnapBehaviour) -> Self {
        Self {
            state,
            behaviour,
            page: usize::MAX,
            storage_accounts: usize::MAX,
            calls: AtomicUsize::new(0),
            node_paths: AtomicUsize::new(0),
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_storage_accounts(mut self, count: usize) -> Self {
        self.storage_accounts = count;
        self
    }

    /// Marker proof for a range; an untruncated range starting at zero gets none, so the real
    /// verifier checks it as a whole trie.
    fn proof(&self, truncated: bool, whole: bool) -> Vec<Bytes> {
        if self.behaviour == SnapBehaviour::BadProof {
            return vec![Bytes::from_static(BAD)];
        }
        if truncated {
            vec![Bytes::from_static(MORE)]
        } else if whole {
            Vec::new()
        } else {
            vec![Bytes::from_static(END)]
        }
    }
}

fn in_range(key: &B256, origin: &B256, limit: &B256) -> bool {
    hash_to_u256(key) >= hash_to_u256(origin) && hash_to_u256(key) <= hash_to_u256(limit)
}

#[async_trait]
impl SnapProtocol for MockSnap {
    async fn get_account_range(
        &self,
        request: GetAccountRange,
    ) -> Result<AccountRange, PeerRequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let matching: Vec<_> = self
            .state
            .accounts
            .iter()
            .filter(|(hash, _)| in_range(hash, &request.origin, &request.limit))
            .collect();
        let truncated = matching.len() > self.page;
        let accounts = matching
            .into_iter()
            .take(self.page)
            .map(|(hash, account)| AccountData {
                hash: *hash,
                body: Bytes::from(account.encode_slim()),
            })
            .collect::<Vec<_>>();
        let whole = request.origin.is_zero() && !accounts.is_empty();
        Ok(AccountRange {
            proof: self.proof(truncated, whole),
            accounts,
        })
    }

    async fn get_storage_ranges(
        &self,
        request: GetStorageRanges,
    ) -> Result<StorageRanges, PeerRequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut slots = Vec::new();
        let mut truncated = false;
        for account in request.accounts.iter().take(self.storage_accounts) {
            let matching: Vec<_> = self
                .state
                .storage
                .get(account)
                .map(|slots| {
                    slots
                        .iter()
                        .filter(|(key, _)| in_range(key, &request.origin, &request.limit))
                        .collect()
                })
                .unwrap_or_default();
            truncated = matching.len() > self.page;
            slots.push(
                matching
                    .into_iter()
                    .take(self.page)
                    .map(|(hash, body)| StorageData {
                        hash: *hash,
                        body: body.clone(),
                    })
                    .collect::<Vec<_>>(),
            );
            if truncated {
                break;
            }
        }
        let whole = request.origin.is_zero();
        Ok(StorageRanges {
            proof: self.proof(truncated, whole),
            slots,
        })
    }

    async fn get_byte_codes(&self, request: GetByteCodes) -> Result<ByteCodes, PeerRequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ByteCodes {
            codes: request
                .hashes
                .iter()
                .filter_map(|hash| self.state.codes.get(hash).cloned())
                .take(self.page)
                .collect(),
        })
    }

    async fn get_trie_nodes(&self, request: GetTrieNodes) -> Result<TrieNodes, PeerRequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.node_paths
            .fetch_add(request.paths.len(), Ordering::SeqCst);
        Ok(TrieNodes {
            nodes: request
                .paths
                .iter()
                .map_while(|path| self.state.nodes.get(path).cloned())
                .take(self.page)
                .collect(),
        })
    }
}
