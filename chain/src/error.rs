use alloy_primitives::B256;
use containers::BlockValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt database file: {0}")]
    Corrupt(String),
    #[error("undecodable record under key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: alloy_rlp::Error,
    },
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("block {number} has unknown parent {parent_hash}")]
    UnknownParent { number: u64, parent_hash: B256 },
    #[error("invalid block {number}: {source}")]
    InvalidBlock {
        number: u64,
        #[source]
        source: BlockValidationError,
    },
    #[error("cannot replace genesis block")]
    GenesisOverwrite,
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("execution of block {number} failed: {reason}")]
    Failed { number: u64, reason: String },
    #[error("unknown head {0}")]
    UnknownHead(B256),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("keys and values differ in length ({keys} vs {values})")]
    LengthMismatch { keys: usize, values: usize },
    #[error("keys are not strictly increasing")]
    NotMonotonic,
    #[error("first key is below the requested origin")]
    BelowOrigin,
    #[error("range contains an empty value")]
    EmptyValue,
    #[error("root mismatch: expected {expected}, got {got}")]
    RootMismatch { expected: B256, got: B256 },
    #[error("malformed proof: {0}")]
    Malformed(String),
}

impl From<alloy_rlp::Error> for ProofError {
    fn from(error: alloy_rlp::Error) -> Self {
        ProofError::Malformed(error.to_string())
    }
}
