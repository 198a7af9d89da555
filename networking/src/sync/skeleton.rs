//! Skeleton sync.
//!
//! The skeleton is a set of header segments ("subchains") anchored at heads announced by the
//! consensus client. The newest subchain is extended backwards by the reverse block fetcher
//! until its tail links onto the local canonical chain; from then on the skeleton streams its
//! blocks forward into the canonical chain.
//!
//! ```text
//!   genesis ... canonical height    tail ............ head   (subchains[0])
//!                      └── linked when block(tail - 1).hash == next
//! ```
//!
//! All status mutations happen under one async lock and are flushed to the key-value store
//! before the lock is released.

use alloy_rlp::Decodable;
use chain::{Chain, ChainError, DbOp, Execution, KeyValueStore, SyncConfig};
use containers::types::short;
use containers::{B256, Block, FillStatus, SkeletonStatus, Subchain};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::SkeletonError;

const STATUS_KEY: &[u8] = b"skeleton:status";
const BLOCK_PREFIX: &[u8] = b"skeleton:block:";
const HASH_PREFIX: &[u8] = b"skeleton:hash:";

fn block_key(number: u64) -> Vec<u8> {
    [BLOCK_PREFIX, &number.to_be_bytes()].concat()
}

fn hash_key(hash: &B256) -> Vec<u8> {
    [HASH_PREFIX, hash.as_slice()].concat()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkeletonConfig {
    pub back_step: u64,
    pub merge_minimum: u64,
    pub fill_cutoff: u64,
}

impl From<&SyncConfig> for SkeletonConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            back_step: config.skeleton_fill_canonical_back_step,
            merge_minimum: config.skeleton_subchain_merge_minimum,
            fill_cutoff: config.skeleton_fill_cutoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutBlocksOutcome {
    /// Number of blocks added to the tail.
    Stored(usize),
    /// The tail reached an older subchain and absorbed it; backfill must restart.
    Merged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkchoiceResult {
    pub reorged: bool,
    pub safe_block: Option<Block>,
    pub finalized_block: Option<Block>,
}

pub struct Skeleton {
    config: SkeletonConfig,
    chain: Arc<dyn Chain>,
    db: Arc<dyn KeyValueStore>,
    execution: Option<Arc<dyn Execution>>,
    status: Mutex<SkeletonStatus>,
    filling: AtomicBool,
    fill_status: RwLock<Option<FillStatus>>,
}

impl Skeleton {
    /// Open the skeleton, resuming from the status persisted in `db`.
    pub fn open(
        config: &SyncConfig,
        chain: Arc<dyn Chain>,
        db: Arc<dyn KeyValueStore>,
        execution: Option<Arc<dyn Execution>>,
    ) -> Result<Arc<Self>, SkeletonError> {
        let status = Self::load_status(db.as_ref())?;
        info!(
            subchains = status.subchains.len(),
            linked = status.linked,
            "Skeleton opened"
        );
        Ok(Arc::new(Self {
            config: config.into(),
            chain,
            db,
            execution,
            status: Mutex::new(status),
            filling: AtomicBool::new(false),
            fill_status: RwLock::new(None),
        }))
    }

    /// Read the persisted status without opening a skeleton.
    pub fn load_status(db: &dyn KeyValueStore) -> Result<SkeletonStatus, SkeletonError> {
        match db.get(STATUS_KEY)? {
            Some(encoded) => Ok(SkeletonStatus::decode(&mut encoded.as_slice())?),
            None => Ok(SkeletonStatus::default()),
        }
    }

    /// Forget all subchains.
    pub async fn reset(&self) -> Result<(), SkeletonError> {
        let mut status = self.status.lock().await;
        *status = SkeletonStatus::default();
        self.write_status(&status)?;
        info!("Skeleton reset");
        Ok(())
    }

    pub async fn status(&self) -> SkeletonStatus {
        self.status.lock().await.clone()
    }

    /// The authoritative subchain, if any.
    pub async fn bounds(&self) -> Option<Subchain> {
        self.status.lock().await.subchains.first().copied()
    }

    pub async fn is_linked(&self) -> bool {
        self.status.lock().await.linked
    }

    pub fn fill_status(&self) -> Option<FillStatus> {
        self.fill_status.read().clone()
    }

    pub fn is_filling(&self) -> bool {
        self.filling.load(Ordering::SeqCst)
    }

    pub async fn head_hash(&self) -> Result<Option<B256>, SkeletonError> {
        let Some(bounds) = self.bounds().await else {
            return Ok(None);
        };
        Ok(self.get_skeleton_block(bounds.head)?.map(|block| block.hash()))
    }

    /// Block by number. Skeleton blocks are only served when `only_canonical` is unset or the
    /// skeleton is linked; otherwise the canonical chain answers.
    pub async fn get_block(
        &self,
        number: u64,
        only_canonical: bool,
    ) -> Result<Option<Block>, SkeletonError> {
        let linked = self.is_linked().await;
        self.lookup_block(number, !only_canonical || linked).await
    }

    pub async fn get_block_by_hash(
        &self,
        hash: &B256,
        only_canonical: bool,
    ) -> Result<Option<Block>, SkeletonError> {
        let linked = self.is_linked().await;
        self.lookup_block_by_hash(hash, !only_canonical || linked)
            .await
    }

    /// Range the reverse fetcher should download next, as `(first, count)` walking down from
    /// `first` to the canonical head. Older subchains in the way are trimmed or merged as the
    /// tail reaches them. `None` when linked or nothing is missing.
    pub async fn backfill_range(&self) -> Option<(u64, u64)> {
        let status = self.status.lock().await;
        if status.linked {
            return None;
        }
        let first = status.subchains.first()?;
        let first_missing = first.tail.checked_sub(1)?;
        let count = first_missing.checked_sub(self.chain.height().await)?;
        (count > 0).then_some((first_missing, count))
    }

    /// Announce a new head.
    ///
    /// Returns whether the head reorged the skeleton. With `force` (or `init`) the skeleton
    /// adopts the head; otherwise the announcement is only classified. With `reorgthrow` a reorg
    /// is reported as [`SkeletonError::Reorged`].
    pub async fn set_head(
        self: &Arc<Self>,
        head: Block,
        force: bool,
        init: bool,
        reorgthrow: bool,
    ) -> Result<bool, SkeletonError> {
        let (reorged, progressed) = {
            let mut status = self.status.lock().await;
            let before = (status.subchains.first().copied(), status.linked);
            let reorged = self.set_head_locked(&mut status, &head, force, init).await?;
            let after = (status.subchains.first().copied(), status.linked);
            (reorged, status.linked && before != after)
        };

        if progressed {
            self.spawn_fill();
        }
        if reorged && reorgthrow {
            return Err(SkeletonError::Reorged);
        }
        Ok(reorged)
    }

    async fn set_head_locked(
        &self,
        status: &mut SkeletonStatus,
        head: &Block,
        force: bool,
        init: bool,
    ) -> Result<bool, SkeletonError> {
        let reorged = self.process_new_head(status, head, force, init).await?;
        if reorged && (force || init) {
            self.handle_reorg(status, head).await?;
        }
        self.try_subchains_merge(status)?;
        status.linked = self.check_linked(status).await?;
        self.write_status(status)?;
        debug!(
            number = head.number(),
            hash = %short(&head.hash()),
            force,
            reorged,
            linked = status.linked,
            "Processed new head"
        );
        Ok(reorged)
    }

    /// Classify `head` against the current subchain; extend it when forced. Returns whether
    /// `head` is a reorg. An empty skeleton adopts `head` with `force` or `init`.
    async fn process_new_head(
        &self,
        status: &mut SkeletonStatus,
        head: &Block,
        force: bool,
        init: bool,
    ) -> Result<bool, SkeletonError> {
        let number = head.number();
        let hash = head.hash();

        if number == 0 {
            if hash != self.chain.genesis_hash() {
                return Err(SkeletonError::InvalidGenesis);
            }
            return Ok(false);
        }

        let Some(last) = status.subchains.first().copied() else {
            if force || init {
                status
                    .subchains
                    .push(Subchain::new(number, number, head.parent_hash()));
                self.put_block(head)?;
                info!(number, hash = %short(&hash), "Created initial subchain");
            }
            return Ok(false);
        };

        if number < last.tail {
            debug!(number, tail = last.tail, "Head below subchain tail");
            return Ok(true);
        }

        if number <= last.head {
            let duplicate = self
                .get_skeleton_block(number)?
                .is_some_and(|block| block.hash() == hash);
            return Ok(!duplicate);
        }

        if number > last.head + 1 {
            if force && self.links_to_head(head, last.head)? {
                status.subchains[0].head = number;
                self.put_block(head)?;
                debug!(from = last.head, to = number, "Fast-forwarded subchain head");
                return Ok(false);
            }
            if !force {
                self.put_block(head)?;
            }
            debug!(number, head = last.head, "Gapped head");
            return Ok(true);
        }

        let parent_matches = self
            .get_skeleton_block(last.head)?
            .is_some_and(|parent| parent.hash() == head.parent_hash());
        if !parent_matches {
            debug!(number, "Head does not extend subchain");
            return Ok(true);
        }
        if force {
            status.subchains[0].head = number;
        }
        self.put_block(head)?;
        Ok(false)
    }

    /// Whether the blocks stored above `subchain_head` chain `head` back onto it.
    fn links_to_head(&self, head: &Block, subchain_head: u64) -> Result<bool, SkeletonError> {
        let mut parent_hash = head.parent_hash();
        let mut number = head.number() - 1;
        while number > subchain_head {
            match self.get_skeleton_block(number)? {
                Some(block) if block.hash() == parent_hash => {
                    parent_hash = block.parent_hash();
                    number -= 1;
                }
                _ => return Ok(false),
            }
        }
        Ok(self
            .get_skeleton_block(subchain_head)?
            .is_some_and(|block| block.hash() == parent_hash))
    }

    async fn handle_reorg(
        &self,
        status: &mut SkeletonStatus,
        head: &Block,
    ) -> Result<(), SkeletonError> {
        let number = head.number();
        let first = status.subchains[0];

        if first.tail < number && number <= first.head {
            let parent_matches = self
                .get_skeleton_block(number - 1)?
                .is_some_and(|parent| parent.hash() == head.parent_hash());
            if parent_matches {
                status.subchains[0].head = number;
                self.put_block(head)?;
                if self.chain.height().await >= number {
                    status.canonical_head_reset = true;
                }
                info!(number, previous_head = first.head, "Truncated subchain to new head");
                return Ok(());
            }
        }

        for subchain in status.subchains.iter_mut() {
            if subchain.head >= number {
                subchain.head = number - 1;
            }
        }
        status
            .subchains
            .retain(|subchain| subchain.head >= subchain.tail);
        status
            .subchains
            .insert(0, Subchain::new(number, number, head.parent_hash()));
        status.canonical_head_reset = true;
        self.put_block(head)?;
        info!(
            number,
            hash = %short(&head.hash()),
            subchains = status.subchains.len(),
            "Skeleton reorged, new subchain"
        );
        Ok(())
    }

    /// Trim subchains overlapped by the newest one and merge the next when the newest reached
    /// it. Returns whether a merge happened.
    fn try_subchains_merge(&self, status: &mut SkeletonStatus) -> Result<bool, SkeletonError> {
        while status.subchains.len() > 1 && status.subchains[1].head >= status.subchains[0].tail {
            let tail = status.subchains[0].tail;
            if status.subchains[1].tail >= tail {
                let dropped = status.subchains.remove(1);
                debug!(head = dropped.head, tail = dropped.tail, "Dropped overwritten subchain");
                continue;
            }
            status.subchains[1].head = tail - 1;
        }

        if status.subchains.len() < 2 {
            return Ok(false);
        }
        let previous = status.subchains[1];
        let extends = self
            .get_skeleton_block(previous.head)?
            .is_some_and(|block| block.hash() == status.subchains[0].next);
        if !extends {
            return Ok(false);
        }

        if previous.head - previous.tail > self.config.merge_minimum {
            status.subchains[0].tail = previous.tail;
            status.subchains[0].next = previous.next;
            status.subchains.remove(1);
            info!(
                head = status.subchains[0].head,
                tail = previous.tail,
                "Merged previous subchain"
            );
            Ok(true)
        } else {
            status.subchains.remove(1);
            debug!(
                head = previous.head,
                count = previous.head - previous.tail,
                "Subchain ignored for merge"
            );
            Ok(false)
        }
    }

    /// Whether the newest subchain links onto the canonical chain. Drops the older subchains
    /// once it does.
    async fn check_linked(&self, status: &mut SkeletonStatus) -> Result<bool, SkeletonError> {
        let Some(first) = status.subchains.first().copied() else {
            return Ok(false);
        };
        if first.tail == 0 {
            return Ok(true);
        }
        if first.tail > self.chain.height().await + 1 {
            return Ok(false);
        }
        let linked = self
            .chain
            .get_block(first.tail - 1)
            .await?
            .is_some_and(|block| block.hash() == first.next);
        if linked {
            status.subchains.truncate(1);
            if !status.linked {
                info!(tail = first.tail, head = first.head, "Skeleton linked");
            }
        }
        Ok(linked)
    }

    /// Extend the newest subchain's tail with `blocks`, given in descending order.
    pub async fn put_blocks(
        self: &Arc<Self>,
        blocks: Vec<Block>,
    ) -> Result<PutBlocksOutcome, SkeletonError> {
        let (outcome, linked) = {
            let mut status = self.status.lock().await;
            if status.subchains.is_empty() {
                return Err(SkeletonError::NoSubchain);
            }
            if status.linked {
                return Ok(PutBlocksOutcome::Stored(0));
            }

            let mut imported = 0;
            let mut merged = false;
            let mut failure = None;
            for block in &blocks {
                let number = block.number();
                let first = status.subchains[0];
                if number >= first.tail {
                    continue;
                }
                if number == 0 {
                    if block.hash() != self.chain.genesis_hash() {
                        failure = Some(SkeletonError::InvalidGenesis);
                        break;
                    }
                    continue;
                }
                if block.hash() != first.next {
                    failure = Some(SkeletonError::BlocksDontExtendSubchain {
                        number,
                        hash: block.hash(),
                    });
                    break;
                }

                self.put_block(block)?;
                status.subchains[0].tail = number;
                status.subchains[0].next = block.parent_hash();
                imported += 1;

                status.linked = self.check_linked(&mut status).await?;
                if status.linked {
                    break;
                }
                if self.try_subchains_merge(&mut status)? {
                    merged = true;
                    break;
                }
            }

            self.write_status(&status)?;
            if let Some(error) = failure {
                warn!(%error, imported, "Rejected skeleton blocks");
                return Err(error);
            }
            debug!(
                imported,
                tail = status.subchains[0].tail,
                linked = status.linked,
                merged,
                "Put skeleton blocks"
            );
            let outcome = if merged {
                PutBlocksOutcome::Merged
            } else {
                PutBlocksOutcome::Stored(imported)
            };
            (outcome, status.linked)
        };

        if linked {
            self.spawn_fill();
        }
        Ok(outcome)
    }

    fn spawn_fill(self: &Arc<Self>) {
        let skeleton = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = skeleton.fill_canonical_chain().await {
                warn!(%error, "Canonical fill failed");
            }
        });
    }

    /// Copy linked skeleton blocks into the canonical chain. At most one fill runs at a time;
    /// a call while another fill runs returns immediately.
    pub async fn fill_canonical_chain(self: &Arc<Self>) -> Result<(), SkeletonError> {
        if self.filling.swap(true, Ordering::SeqCst) {
            debug!("Canonical fill already running");
            return Ok(());
        }
        let result = self.fill().await;
        self.filling.store(false, Ordering::SeqCst);
        result
    }

    async fn fill(&self) -> Result<(), SkeletonError> {
        let mut canonical = {
            let mut status = self.status.lock().await;
            let Some(first) = status.subchains.first().copied() else {
                return Ok(());
            };
            if !status.linked {
                return Ok(());
            }
            let height = self.chain.height().await;
            if status.canonical_head_reset {
                if first.tail > height + 1 {
                    return Err(SkeletonError::CanonicalHeadBehindTail {
                        height,
                        tail: first.tail,
                    });
                }
                let new_height = first.tail.saturating_sub(1).min(height);
                if height > 0 {
                    self.chain.reset_canonical_head(new_height).await?;
                }
                status.canonical_head_reset = false;
                self.write_status(&status)?;
                debug!(from = height, to = new_height, "Reset canonical head");
                new_height
            } else {
                height
            }
        };
        let start = canonical;
        let mut last_hash = None;

        loop {
            let number = canonical + 1;
            let (head, linked, resetting) = {
                let status = self.status.lock().await;
                (
                    status.subchains.first().map(|subchain| subchain.head),
                    status.linked,
                    status.canonical_head_reset,
                )
            };
            if resetting || !linked {
                debug!(number, "Canonical fill interrupted by skeleton update");
                break;
            }
            let Some(head) = head else {
                break;
            };
            if number > head {
                break;
            }

            let Some(block) = self.get_skeleton_block(number)? else {
                warn!(number, "Skeleton block missing during canonical fill");
                self.back_step(number).await?;
                break;
            };
            let hash = block.hash();

            match self.chain.put_blocks(vec![block.clone()]).await {
                Ok(_) => {}
                Err(ChainError::UnknownParent { .. }) => {
                    warn!(number, "Canonical fill hit unknown parent");
                    self.back_step(number).await?;
                    break;
                }
                Err(error) => {
                    warn!(number, %error, "Canonical fill rejected block");
                    *self.fill_status.write() =
                        Some(FillStatus::invalid(number, hash, error.to_string()));
                    break;
                }
            }

            if let Some(execution) = &self.execution {
                if let Err(error) = execution.run_without_set_head(&block).await {
                    warn!(number, %error, "Block execution failed");
                    *self.fill_status.write() =
                        Some(FillStatus::invalid(number, hash, error.to_string()));
                    break;
                }
            }

            *self.fill_status.write() = Some(FillStatus::valid(number, hash));
            canonical = number;
            last_hash = Some(hash);

            let mut status = self.status.lock().await;
            if let Some(first) = status.subchains.first_mut() {
                if first.tail <= number && number < first.head {
                    first.tail = number + 1;
                    first.next = hash;
                    self.delete_block(&block)?;
                    self.write_status(&status)?;
                }
            }
        }

        if let Some(hash) = last_hash {
            info!(from = start + 1, to = canonical, "Filled canonical chain");
            if let Some(execution) = &self.execution {
                execution.set_head(hash).await?;
            }
        }
        Ok(())
    }

    /// Move the tail up past a block the canonical chain could not take, so it is fetched
    /// again. Returns the new tail, or `None` when no stored block was found and the
    /// subchains were dropped.
    pub async fn back_step(&self, from: u64) -> Result<Option<u64>, SkeletonError> {
        if self.config.back_step == 0 {
            return Ok(None);
        }
        let mut status = self.status.lock().await;
        let Some(first) = status.subchains.first().copied() else {
            return Ok(None);
        };

        let mut new_tail = first.tail + self.config.back_step;
        let mut tail_block = self.get_skeleton_block(new_tail)?;
        while tail_block.is_none() && new_tail <= first.head {
            new_tail += self.config.back_step;
            tail_block = self.get_skeleton_block(new_tail)?;
        }
        if new_tail > first.head {
            new_tail = first.head;
            tail_block = self.get_skeleton_block(new_tail)?;
        }

        match tail_block {
            Some(block) => {
                status.subchains[0].tail = block.number();
                status.subchains[0].next = block.parent_hash();
                status.linked = self.check_linked(&mut status).await?;
                self.write_status(&status)?;
                info!(from, tail = new_tail, linked = status.linked, "Stepped back skeleton tail");
                Ok(Some(new_tail))
            }
            None => {
                status.subchains.clear();
                status.linked = false;
                self.write_status(&status)?;
                warn!(from, "No skeleton block to step back to, dropped subchains");
                Ok(None)
            }
        }
    }

    /// Apply a forkchoice update: adopt `head` and record the safe and finalized blocks.
    ///
    /// Zero hashes count as unset. The canonical chain is filled before returning when it is
    /// within `fill_cutoff` blocks of the head.
    pub async fn forkchoice_update(
        self: &Arc<Self>,
        head: Block,
        safe: Option<B256>,
        finalized: Option<B256>,
    ) -> Result<ForkchoiceResult, SkeletonError> {
        let safe = safe.filter(|hash| !hash.is_zero());
        let finalized = finalized.filter(|hash| !hash.is_zero());
        if safe.is_none() && finalized.is_some() {
            return Err(SkeletonError::InvalidParams(
                "finalized block set without a safe block".into(),
            ));
        }

        let result = {
            let mut status = self.status.lock().await;
            let reorged = self.set_head_locked(&mut status, &head, true, false).await?;
            let safe_block = match safe {
                Some(hash) => Some(self.resolve_forkchoice_block(&head, &hash, "safe").await?),
                None => None,
            };
            let finalized_block = match finalized {
                Some(hash) => Some(
                    self.resolve_forkchoice_block(&head, &hash, "finalized")
                        .await?,
                ),
                None => None,
            };
            if let (Some(safe), Some(finalized)) = (&safe_block, &finalized_block) {
                if finalized.number() > safe.number() {
                    return Err(SkeletonError::InvalidParams(format!(
                        "finalized block {} is ahead of safe block {}",
                        finalized.number(),
                        safe.number()
                    )));
                }
            }
            if let Some(block) = &safe_block {
                status.safe = block.number();
            }
            if let Some(block) = &finalized_block {
                status.finalized = block.number();
            }
            self.write_status(&status)?;
            ForkchoiceResult {
                reorged,
                safe_block,
                finalized_block,
            }
        };

        self.blocking_fill_with_cutoff().await?;
        Ok(result)
    }

    async fn resolve_forkchoice_block(
        &self,
        head: &Block,
        hash: &B256,
        label: &str,
    ) -> Result<Block, SkeletonError> {
        if *hash == head.hash() {
            return Ok(head.clone());
        }
        self.lookup_block_by_hash(hash, true)
            .await?
            .ok_or_else(|| SkeletonError::InvalidParams(format!("{label} block {hash} not available")))
    }

    /// Fill in place when the canonical chain is close to the head, else in the background.
    pub async fn blocking_fill_with_cutoff(self: &Arc<Self>) -> Result<(), SkeletonError> {
        let (linked, head) = {
            let status = self.status.lock().await;
            (status.linked, status.subchains.first().map(|subchain| subchain.head))
        };
        let Some(head) = head else {
            return Ok(());
        };
        if !linked {
            return Ok(());
        }
        let height = self.chain.height().await;
        if head.saturating_sub(height) <= self.config.fill_cutoff {
            self.fill_canonical_chain().await
        } else {
            self.spawn_fill();
            Ok(())
        }
    }

    async fn lookup_block(
        &self,
        number: u64,
        include_skeleton: bool,
    ) -> Result<Option<Block>, SkeletonError> {
        if include_skeleton {
            if let Some(block) = self.get_skeleton_block(number)? {
                return Ok(Some(block));
            }
        }
        Ok(self.chain.get_block(number).await?)
    }

    async fn lookup_block_by_hash(
        &self,
        hash: &B256,
        include_skeleton: bool,
    ) -> Result<Option<Block>, SkeletonError> {
        if include_skeleton {
            if let Some(block) = self.get_skeleton_block_by_hash(hash)? {
                return Ok(Some(block));
            }
        }
        Ok(self.chain.get_block_by_hash(hash).await?)
    }

    fn get_skeleton_block(&self, number: u64) -> Result<Option<Block>, SkeletonError> {
        match self.db.get(&block_key(number))? {
            Some(encoded) => Ok(Some(Block::decode(&mut encoded.as_slice())?)),
            None => Ok(None),
        }
    }

    fn get_skeleton_block_by_hash(&self, hash: &B256) -> Result<Option<Block>, SkeletonError> {
        let Some(encoded) = self.db.get(&hash_key(hash))? else {
            return Ok(None);
        };
        let number = u64::from_be_bytes(
            encoded
                .as_slice()
                .try_into()
                .map_err(|_| alloy_rlp::Error::UnexpectedLength)?,
        );
        Ok(self
            .get_skeleton_block(number)?
            .filter(|block| block.hash() == *hash))
    }

    fn put_block(&self, block: &Block) -> Result<(), SkeletonError> {
        self.db.write_batch(vec![
            DbOp::Put(block_key(block.number()), alloy_rlp::encode(block)),
            DbOp::Put(hash_key(&block.hash()), block.number().to_be_bytes().to_vec()),
        ])?;
        Ok(())
    }

    fn delete_block(&self, block: &Block) -> Result<(), SkeletonError> {
        self.db.write_batch(vec![
            DbOp::Delete(block_key(block.number())),
            DbOp::Delete(hash_key(&block.hash())),
        ])?;
        Ok(())
    }

    fn write_status(&self, status: &SkeletonStatus) -> Result<(), SkeletonError> {
        self.db.put(STATUS_KEY, alloy_rlp::encode(status))?;
        Ok(())
    }
}
