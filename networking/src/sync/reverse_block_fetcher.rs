use async_trait::async_trait;
use chain::ChainError;
use containers::Block;
use std::sync::Arc;
use tracing::{debug, info};

use super::block_fetcher::{BlockRange, BlockTask, accumulate, headers_request, request_blocks};
use super::config::FetcherConfig;
use super::error::{
    FetchOutcome, FetcherError, RequestError, SkeletonError, StoreError, StoreErrorAction,
    StoreOutcome,
};
use super::fetcher::{FetchJob, Fetcher, FetcherHandler, RequestFuture};
use super::peer_manager::{SharedPeerManager, SyncPeer};
use super::skeleton::{PutBlocksOutcome, Skeleton};

/// Backward block fetcher extending the skeleton's newest subchain towards the canonical
/// chain.
pub struct ReverseBlockFetcher {
    skeleton: Arc<Skeleton>,
    range: BlockRange,
    max_per_request: u64,
    /// Head of the subchain this fetcher was started for.
    head: u64,
}

impl ReverseBlockFetcher {
    pub fn new(
        skeleton: Arc<Skeleton>,
        first: u64,
        count: u64,
        head: u64,
        max_per_request: u64,
    ) -> Self {
        Self {
            skeleton,
            range: BlockRange::new(first, count, true),
            max_per_request,
            head,
        }
    }

    /// Fetcher for the skeleton's current gap, if there is one.
    pub async fn from_skeleton(skeleton: Arc<Skeleton>, max_per_request: u64) -> Option<Self> {
        let (first, count) = skeleton.backfill_range().await?;
        let head = skeleton.bounds().await?.head;
        Some(Self::new(skeleton, first, count, head, max_per_request))
    }
}

#[async_trait]
impl FetcherHandler for ReverseBlockFetcher {
    type Task = BlockTask;
    type Result = Vec<Block>;
    type Item = Block;

    fn name(&self) -> &'static str {
        "reverse-block"
    }

    fn next_tasks(&mut self, limit: usize) -> Vec<BlockTask> {
        self.range.take(self.max_per_request, limit)
    }

    fn is_exhausted(&self) -> bool {
        self.range.is_empty()
    }

    fn peer_filter(&self, peer: &SyncPeer) -> bool {
        peer.eth.is_some()
    }

    fn request(&self, job: &FetchJob<Self>, peer: &SyncPeer) -> RequestFuture<Vec<Block>> {
        let received = job.partial_result.as_ref().map_or(0, Vec::len) as u64;
        let request = headers_request(&job.task, received, true);
        let eth = peer.eth.clone();
        Box::pin(async move {
            let Some(eth) = eth else {
                return Err(RequestError::invalid("peer does not serve eth"));
            };
            request_blocks(eth, request).await
        })
    }

    fn process(&mut self, job: &mut FetchJob<Self>, result: Vec<Block>) -> Option<Vec<Block>> {
        accumulate(&job.task, &mut job.partial_result, result, true)
    }

    async fn store(&mut self, blocks: Vec<Block>) -> Result<StoreOutcome, StoreError> {
        if self.skeleton.bounds().await.map(|subchain| subchain.head) != Some(self.head) {
            info!(head = self.head, "Skeleton head moved, restarting backfill");
            return Ok(StoreOutcome::Halt);
        }

        match self.skeleton.put_blocks(blocks).await? {
            PutBlocksOutcome::Merged => {
                info!("Skeleton subchains merged, restarting backfill");
                Ok(StoreOutcome::Halt)
            }
            PutBlocksOutcome::Stored(imported) => {
                debug!(imported, "Extended skeleton tail");
                if self.skeleton.is_linked().await {
                    info!("Skeleton linked, backfill done");
                    return Ok(StoreOutcome::Halt);
                }
                Ok(StoreOutcome::Stored)
            }
        }
    }

    fn process_store_error(&self, error: &StoreError, _task: &BlockTask) -> StoreErrorAction {
        match error {
            StoreError::Skeleton(SkeletonError::BlocksDontExtendSubchain { .. })
            | StoreError::Skeleton(SkeletonError::Chain(ChainError::UnknownParent { .. })) => {
                StoreErrorAction::ban(0)
            }
            _ => StoreErrorAction::destroy(),
        }
    }
}

/// Backfill the skeleton until it links onto the canonical chain or runs out of work.
///
/// Each round runs a fresh reverse fetcher over the current gap; a halted round (merge, head
/// change) just starts the next one.
pub async fn backfill_skeleton(
    skeleton: Arc<Skeleton>,
    peers: SharedPeerManager,
    config: FetcherConfig,
) -> Result<(), FetcherError> {
    loop {
        if skeleton.is_linked().await {
            return Ok(());
        }
        let tail_before = skeleton.bounds().await.map(|subchain| subchain.tail);
        let Some(handler) =
            ReverseBlockFetcher::from_skeleton(Arc::clone(&skeleton), config.max_per_request)
                .await
        else {
            return Ok(());
        };

        let mut fetcher = Fetcher::new(handler, Arc::clone(&peers), config.clone());
        let outcome = fetcher.fetch().await?;

        let bounds = skeleton.bounds().await;
        if outcome == FetchOutcome::Completed && bounds.map(|subchain| subchain.tail) == tail_before
        {
            debug!("Backfill round made no progress");
            return Ok(());
        }
    }
}
