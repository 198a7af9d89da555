use alloy_primitives::B256;
use async_trait::async_trait;
use containers::Block;

use crate::error::ExecutionError;

/// Block execution engine, fed by the canonical fill.
#[async_trait]
pub trait Execution: Send + Sync {
    /// Executes a block already written to the canonical chain without moving the head.
    async fn run_without_set_head(&self, block: &Block) -> Result<(), ExecutionError>;

    async fn set_head(&self, hash: B256) -> Result<(), ExecutionError>;
}
