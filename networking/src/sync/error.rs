use chain::{ChainError, DbError, ExecutionError, ProofError, StateError};
use containers::B256;
use thiserror::Error;

use crate::types::PeerRequestError;

/// JSON-RPC "invalid params" code carried by [`SkeletonError::InvalidParams`].
pub const INVALID_PARAMS: i64 = -32602;

/// Job-local failure of a request. The job is re-queued and the peer banned; no store is
/// touched.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Peer(#[from] PeerRequestError),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid proof: {0}")]
    InvalidProof(#[from] ProofError),
}

impl RequestError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        RequestError::InvalidResponse(reason.into())
    }
}

/// Failure raised by a fetcher's storage sink.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chain: {0}")]
    Chain(#[from] ChainError),
    #[error("skeleton: {0}")]
    Skeleton(#[from] SkeletonError),
    #[error("state: {0}")]
    State(#[from] StateError),
}

/// Fatal fetcher failure.
#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
    #[error("fetcher destroyed")]
    Destroyed,
}

/// What to do about a failed store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreErrorAction {
    pub destroy_fetcher: bool,
    pub ban_peer: bool,
    pub step_back: u64,
}

impl StoreErrorAction {
    pub fn destroy() -> Self {
        Self {
            destroy_fetcher: true,
            ..Self::default()
        }
    }

    pub fn ban(step_back: u64) -> Self {
        Self {
            destroy_fetcher: false,
            ban_peer: true,
            step_back,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// Stop the fetcher without error; the owner restarts from fresh state.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed,
    Halted,
}

#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("skeleton head reorged")]
    Reorged,
    #[error("block {number} ({hash}) does not extend the current subchain")]
    BlocksDontExtendSubchain { number: u64, hash: B256 },
    #[error("genesis block does not match the local chain")]
    InvalidGenesis,
    #[error("canonical height {height} is behind subchain tail {tail}")]
    CanonicalHeadBehindTail { height: u64, tail: u64 },
    #[error("no subchain set")]
    NoSubchain,
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("undecodable skeleton record: {0}")]
    Decode(#[from] alloy_rlp::Error),
}

impl SkeletonError {
    /// JSON-RPC error code, for the errors an Engine API caller maps to one.
    pub fn code(&self) -> Option<i64> {
        match self {
            SkeletonError::InvalidParams(_) => Some(INVALID_PARAMS),
            _ => None,
        }
    }
}
