use async_trait::async_trait;
use containers::{
    AccountRange, BlockBody, ByteCodes, GetAccountRange, GetBlockBodies, GetBlockHeaders,
    GetByteCodes, GetStorageRanges, GetTrieNodes, Header, StorageRanges, TrieNodes,
};
use thiserror::Error;

/// Failure to get any answer out of a peer.
///
/// Anything the peer did answer is judged by the fetcher that asked; this only covers the
/// transport side.
#[derive(Debug, Error)]
pub enum PeerRequestError {
    #[error("peer disconnected")]
    Disconnected,
    #[error("request rejected by peer: {0}")]
    Rejected(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// `eth` capability of a connected peer.
#[async_trait]
pub trait EthProtocol: Send + Sync {
    async fn get_block_headers(
        &self,
        request: GetBlockHeaders,
    ) -> Result<Vec<Header>, PeerRequestError>;

    async fn get_block_bodies(
        &self,
        request: GetBlockBodies,
    ) -> Result<Vec<BlockBody>, PeerRequestError>;
}

/// `snap` capability of a connected peer.
#[async_trait]
pub trait SnapProtocol: Send + Sync {
    async fn get_account_range(
        &self,
        request: GetAccountRange,
    ) -> Result<AccountRange, PeerRequestError>;

    async fn get_storage_ranges(
        &self,
        request: GetStorageRanges,
    ) -> Result<StorageRanges, PeerRequestError>;

    async fn get_byte_codes(&self, request: GetByteCodes) -> Result<ByteCodes, PeerRequestError>;

    async fn get_trie_nodes(&self, request: GetTrieNodes) -> Result<TrieNodes, PeerRequestError>;
}
