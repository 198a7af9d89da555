use async_trait::async_trait;
use containers::{B256, Bytes, GetByteCodes, U256, keccak256};
use std::collections::VecDeque;
use tracing::debug;

use super::{SnapContext, SnapFetcherKind};
use crate::sync::error::{RequestError, StoreError, StoreErrorAction, StoreOutcome};
use crate::sync::fetcher::{FetchJob, FetcherHandler, RequestFuture};
use crate::sync::peer_manager::SyncPeer;

/// Codes matched to the requested hashes, plus the hashes the peer skipped.
#[derive(Debug, Clone, Default)]
pub struct ByteCodeResult {
    pub codes: Vec<Bytes>,
    pub missing: Vec<B256>,
}

/// Fetches contract code by hash.
pub struct ByteCodeFetcher {
    context: SnapContext,
    hashes: VecDeque<B256>,
    max_per_request: usize,
}

impl ByteCodeFetcher {
    pub fn new(context: SnapContext, hashes: Vec<B256>) -> Self {
        let max_per_request = context.max_codes_per_request;
        Self {
            context,
            hashes: hashes.into(),
            max_per_request,
        }
    }
}

/// Match `codes` against `requested` in order.
///
/// Peers may skip codes they do not have, but may not reorder or invent them. Returns the
/// codes that were delivered and the hashes that were not.
pub fn match_codes(requested: &[B256], codes: Vec<Bytes>) -> Result<ByteCodeResult, RequestError> {
    let mut matched = Vec::with_capacity(codes.len());
    let mut missing = Vec::new();
    let mut wanted = requested.iter();
    for code in codes {
        let hash = keccak256(&code);
        loop {
            match wanted.next() {
                Some(expected) if *expected == hash => break,
                Some(expected) => missing.push(*expected),
                None => {
                    return Err(RequestError::invalid(format!(
                        "unrequested or out of order code {hash}"
                    )));
                }
            }
        }
        matched.push(code);
    }
    missing.extend(wanted.copied());
    Ok(ByteCodeResult {
        codes: matched,
        missing,
    })
}

#[async_trait]
impl FetcherHandler for ByteCodeFetcher {
    type Task = Vec<B256>;
    type Result = ByteCodeResult;
    type Item = Bytes;

    fn name(&self) -> &'static str {
        "bytecode"
    }

    fn next_tasks(&mut self, limit: usize) -> Vec<Vec<B256>> {
        let mut tasks = Vec::new();
        while tasks.len() < limit && !self.hashes.is_empty() {
            let count = self.hashes.len().min(self.max_per_request);
            tasks.push(self.hashes.drain(..count).collect());
        }
        tasks
    }

    fn is_exhausted(&self) -> bool {
        self.hashes.is_empty()
    }

    fn peer_filter(&self, peer: &SyncPeer) -> bool {
        peer.snap.is_some()
    }

    fn request(&self, job: &FetchJob<Self>, peer: &SyncPeer) -> RequestFuture<ByteCodeResult> {
        let hashes = job.task.clone();
        let bytes = self.context.max_range_bytes;
        let snap = peer.snap.clone();
        Box::pin(async move {
            let Some(snap) = snap else {
                return Err(RequestError::invalid("peer does not serve snap"));
            };
            let response = snap
                .get_byte_codes(GetByteCodes {
                    hashes: hashes.clone(),
                    bytes,
                })
                .await?;
            if response.codes.is_empty() {
                return Ok(None);
            }
            match_codes(&hashes, response.codes).map(Some)
        })
    }

    fn process(&mut self, _job: &mut FetchJob<Self>, result: ByteCodeResult) -> Option<Vec<Bytes>> {
        if !result.missing.is_empty() {
            debug!(count = result.missing.len(), "Re-queueing missing codes");
            self.hashes.extend(result.missing);
        }
        Some(result.codes)
    }

    async fn store(&mut self, codes: Vec<Bytes>) -> Result<StoreOutcome, StoreError> {
        let count = codes.len();
        self.context.state.put_codes(codes)?;
        self.context
            .flags
            .add_progress(SnapFetcherKind::ByteCode, U256::from(count));
        debug!(count, "Stored codes");
        Ok(StoreOutcome::Stored)
    }

    fn process_store_error(&self, _error: &StoreError, _task: &Vec<B256>) -> StoreErrorAction {
        StoreErrorAction::destroy()
    }
}
