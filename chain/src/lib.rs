pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod proof;
pub mod state;

pub use chain::{Chain, MemoryChain};
pub use config::SyncConfig;
pub use db::{DbOp, KeyValueStore, MemoryDb};
pub use error::{ChainError, DbError, ExecutionError, ProofError, StateError};
pub use execution::Execution;
pub use proof::{RangeProofVerifier, TrieRangeVerifier, VerifiedRange};
pub use state::{MemoryStateStore, StateStore};
