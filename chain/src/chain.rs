use alloy_primitives::B256;
use async_trait::async_trait;
use containers::Block;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::ChainError;

/// Canonical block storage.
#[async_trait]
pub trait Chain: Send + Sync {
    fn genesis_hash(&self) -> B256;

    /// Number of the canonical head.
    async fn height(&self) -> u64;

    async fn get_block(&self, number: u64) -> Result<Option<Block>, ChainError>;

    async fn get_block_by_hash(&self, hash: &B256) -> Result<Option<Block>, ChainError>;

    /// Inserts blocks in order, replacing any conflicting canonical suffix.
    /// Returns how many blocks were newly written.
    async fn put_blocks(&self, blocks: Vec<Block>) -> Result<usize, ChainError>;

    /// Drops canonical blocks above `number`.
    async fn reset_canonical_head(&self, number: u64) -> Result<(), ChainError>;
}

#[derive(Debug, Default)]
struct Canonical {
    blocks: Vec<Block>,
    by_hash: HashMap<B256, u64>,
}

impl Canonical {
    fn truncate(&mut self, len: usize) {
        for block in self.blocks.drain(len..) {
            self.by_hash.remove(&block.hash());
        }
    }

    fn push(&mut self, block: Block) {
        self.by_hash.insert(block.hash(), block.number());
        self.blocks.push(block);
    }
}

/// Canonical chain held in memory, indexed by number and by hash.
#[derive(Debug)]
pub struct MemoryChain {
    genesis_hash: B256,
    canonical: RwLock<Canonical>,
}

impl MemoryChain {
    pub fn new(genesis: Block) -> Self {
        let mut canonical = Canonical::default();
        let genesis_hash = genesis.hash();
        canonical.push(genesis);
        Self {
            genesis_hash,
            canonical: RwLock::new(canonical),
        }
    }

    fn put_block(canonical: &mut Canonical, block: Block) -> Result<bool, ChainError> {
        let number = block.number();
        let hash = block.hash();

        if number == 0 {
            return match canonical.blocks.first() {
                Some(genesis) if genesis.hash() == hash => Ok(false),
                _ => Err(ChainError::GenesisOverwrite),
            };
        }

        let parent_matches = canonical
            .blocks
            .get((number - 1) as usize)
            .is_some_and(|parent| parent.hash() == block.parent_hash());
        if !parent_matches {
            return Err(ChainError::UnknownParent {
                number,
                parent_hash: block.parent_hash(),
            });
        }

        block
            .validate_data()
            .map_err(|source| ChainError::InvalidBlock { number, source })?;

        if let Some(existing) = canonical.blocks.get(number as usize) {
            if existing.hash() == hash {
                return Ok(false);
            }
            debug!(number, "Replacing canonical suffix");
            canonical.truncate(number as usize);
        }

        canonical.push(block);
        Ok(true)
    }
}

#[async_trait]
impl Chain for MemoryChain {
    fn genesis_hash(&self) -> B256 {
        self.genesis_hash
    }

    async fn height(&self) -> u64 {
        self.canonical.read().blocks.len().saturating_sub(1) as u64
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block>, ChainError> {
        Ok(self.canonical.read().blocks.get(number as usize).cloned())
    }

    async fn get_block_by_hash(&self, hash: &B256) -> Result<Option<Block>, ChainError> {
        let canonical = self.canonical.read();
        Ok(canonical
            .by_hash
            .get(hash)
            .and_then(|number| canonical.blocks.get(*number as usize))
            .cloned())
    }

    async fn put_blocks(&self, blocks: Vec<Block>) -> Result<usize, ChainError> {
        let mut canonical = self.canonical.write();
        let mut written = 0;
        for block in blocks {
            if Self::put_block(&mut canonical, block)? {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn reset_canonical_head(&self, number: u64) -> Result<(), ChainError> {
        let mut canonical = self.canonical.write();
        let keep = (number as usize + 1).max(1);
        if keep < canonical.blocks.len() {
            info!(number, "Resetting canonical head");
            canonical.truncate(keep);
        }
        Ok(())
    }
}
