use async_trait::async_trait;
use chain::{Chain, ChainError, SyncConfig};
use containers::{Block, BlockBody, GetBlockBodies, GetBlockHeaders, Header};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{RequestError, StoreError, StoreErrorAction, StoreOutcome};
use super::fetcher::{FetchJob, FetcherHandler, RequestFuture};
use super::peer_manager::SyncPeer;
use crate::types::EthProtocol;

/// A run of consecutive block numbers.
///
/// Forward tasks cover `first..first + count`; reverse tasks start at `first` and walk down to
/// `first - count + 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTask {
    pub first: u64,
    pub count: u64,
}

impl BlockTask {
    /// Number of the block at position `offset` in response order.
    fn number_at(&self, offset: u64, reverse: bool) -> u64 {
        if reverse {
            self.first - offset
        } else {
            self.first + offset
        }
    }
}

/// Cursor over the not yet tasked part of a block range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRange {
    next: u64,
    remaining: u64,
    reverse: bool,
}

impl BlockRange {
    pub fn new(first: u64, count: u64, reverse: bool) -> Self {
        Self {
            next: first,
            remaining: count,
            reverse,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Cut up to `limit` tasks of at most `max_per_request` blocks off the front.
    pub fn take(&mut self, max_per_request: u64, limit: usize) -> Vec<BlockTask> {
        let max_per_request = max_per_request.max(1);
        let mut tasks = Vec::new();
        while self.remaining > 0 && tasks.len() < limit {
            let count = self.remaining.min(max_per_request);
            tasks.push(BlockTask {
                first: self.next,
                count,
            });
            self.remaining -= count;
            self.next = if self.reverse {
                self.next.saturating_sub(count)
            } else {
                self.next + count
            };
        }
        tasks
    }
}

/// Split a whole range into tasks.
pub fn range_tasks(first: u64, count: u64, max_per_request: u64, reverse: bool) -> Vec<BlockTask> {
    BlockRange::new(first, count, reverse).take(max_per_request, usize::MAX)
}

/// Header request for what `task` still misses after `received` blocks.
pub(crate) fn headers_request(task: &BlockTask, received: u64, reverse: bool) -> GetBlockHeaders {
    GetBlockHeaders {
        start: task.number_at(received, reverse),
        limit: task.count - received,
        skip: 0,
        reverse,
    }
}

fn validate_headers(request: &GetBlockHeaders, headers: &[Header]) -> Result<(), RequestError> {
    if headers.len() as u64 > request.limit {
        return Err(RequestError::invalid(format!(
            "{} headers for a request of {}",
            headers.len(),
            request.limit
        )));
    }
    for (header, expected) in headers.iter().zip(request.expected_numbers()) {
        if header.number != expected {
            return Err(RequestError::invalid(format!(
                "header {} where {expected} was requested",
                header.number
            )));
        }
    }
    for pair in headers.windows(2) {
        let (parent, child) = if request.reverse {
            (&pair[1], &pair[0])
        } else {
            (&pair[0], &pair[1])
        };
        if child.parent_hash != parent.hash() {
            return Err(RequestError::invalid(format!(
                "header {} does not link to {}",
                child.number, parent.number
            )));
        }
    }
    Ok(())
}

/// Fetch headers, then the bodies they commit to, and assemble validated blocks.
///
/// Headers whose roots are all empty get a synthesized empty body. Assembly stops at the first
/// header whose body the peer did not return, so the result is always a prefix of the
/// requested run.
pub(crate) async fn request_blocks(
    eth: Arc<dyn EthProtocol>,
    request: GetBlockHeaders,
) -> Result<Option<Vec<Block>>, RequestError> {
    let headers = eth.get_block_headers(request.clone()).await?;
    if headers.is_empty() {
        return Ok(None);
    }
    validate_headers(&request, &headers)?;

    let hashes: Vec<_> = headers
        .iter()
        .filter(|header| Block::header_expects_body(header))
        .map(Header::hash)
        .collect();
    let bodies = if hashes.is_empty() {
        Vec::new()
    } else {
        let requested = hashes.len();
        let bodies = eth.get_block_bodies(GetBlockBodies { hashes }).await?;
        if bodies.len() > requested {
            return Err(RequestError::invalid(format!(
                "{} bodies for a request of {requested}",
                bodies.len()
            )));
        }
        bodies
    };

    let mut bodies = bodies.into_iter();
    let mut blocks = Vec::with_capacity(headers.len());
    for header in headers {
        let body = if Block::header_expects_body(&header) {
            match bodies.next() {
                Some(body) => body,
                None => break,
            }
        } else {
            BlockBody {
                transactions: Vec::new(),
                ommers: Vec::new(),
                withdrawals: header.withdrawals_root.map(|_| Vec::new()),
            }
        };
        let block = Block::new(header, body);
        block.validate_data().map_err(|error| {
            RequestError::invalid(format!("block {}: {error}", block.number()))
        })?;
        blocks.push(block);
    }

    Ok((!blocks.is_empty()).then_some(blocks))
}

/// Merge a response into the job's partial result. Returns the blocks once the task is full.
pub(crate) fn accumulate(
    task: &BlockTask,
    partial_result: &mut Option<Vec<Block>>,
    result: Vec<Block>,
    reverse: bool,
) -> Option<Vec<Block>> {
    let mut blocks = partial_result.take().unwrap_or_default();
    if let (Some(last), Some(first)) = (blocks.last(), result.first()) {
        let linked = if reverse {
            last.parent_hash() == first.hash()
        } else {
            first.parent_hash() == last.hash()
        };
        if !linked {
            debug!(
                number = first.number(),
                "Response does not link to partial result, dropping both"
            );
            return None;
        }
    }
    blocks.extend(result);
    if (blocks.len() as u64) < task.count {
        *partial_result = Some(blocks);
        return None;
    }
    blocks.truncate(task.count as usize);
    Some(blocks)
}

/// Forward block fetcher filling the canonical chain.
pub struct BlockFetcher {
    chain: Arc<dyn Chain>,
    range: BlockRange,
    max_per_request: u64,
    safe_reorg_distance: u64,
}

impl BlockFetcher {
    pub fn new(chain: Arc<dyn Chain>, first: u64, count: u64, config: &SyncConfig) -> Self {
        Self {
            chain,
            range: BlockRange::new(first, count, false),
            max_per_request: config.max_per_request,
            safe_reorg_distance: config.safe_reorg_distance,
        }
    }
}

#[async_trait]
impl FetcherHandler for BlockFetcher {
    type Task = BlockTask;
    type Result = Vec<Block>;
    type Item = Block;

    fn name(&self) -> &'static str {
        "block"
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
        let request = headers_request(&job.task, received, false);
        let eth = peer.eth.clone();
        Box::pin(async move {
            let Some(eth) = eth else {
                return Err(RequestError::invalid("peer does not serve eth"));
            };
            request_blocks(eth, request).await
        })
    }

    fn process(&mut self, job: &mut FetchJob<Self>, result: Vec<Block>) -> Option<Vec<Block>> {
        accumulate(&job.task, &mut job.partial_result, result, false)
    }

    async fn store(&mut self, blocks: Vec<Block>) -> Result<StoreOutcome, StoreError> {
        let (Some(first), Some(last)) = (
            blocks.first().map(Block::number),
            blocks.last().map(Block::number),
        ) else {
            return Ok(StoreOutcome::Stored);
        };
        let inserted = self.chain.put_blocks(blocks).await?;
        info!(first, last, inserted, "Imported blocks");
        Ok(StoreOutcome::Stored)
    }

    fn process_store_error(&self, error: &StoreError, task: &BlockTask) -> StoreErrorAction {
        match error {
            StoreError::Chain(ChainError::UnknownParent { .. }) => StoreErrorAction::ban(
                self.safe_reorg_distance
                    .min(task.first.saturating_sub(1)),
            ),
            _ => StoreErrorAction::destroy(),
        }
    }

    fn step_back(&mut self, task: &mut BlockTask, count: u64) {
        let count = count.min(task.first.saturating_sub(1));
        task.first -= count;
        task.count += count;
    }
}
