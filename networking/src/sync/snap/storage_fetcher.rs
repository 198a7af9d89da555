use async_trait::async_trait;
use chain::RangeProofVerifier;
use containers::{
    B256, Bytes, GetStorageRanges, StorageData, U256, hash_to_u256, next_hash, u256_to_hash,
};
use std::collections::VecDeque;
use tracing::debug;

use super::{SnapContext, SnapFetcherKind, StorageRequest};
use crate::sync::error::{RequestError, StoreError, StoreErrorAction, StoreOutcome};
use crate::sync::fetcher::{FetchJob, FetcherHandler, RequestFuture};
use crate::sync::peer_manager::SyncPeer;

/// Storage work for one request.
///
/// A task with several accounts asks for their whole storage tries at once. A fragment task
/// holds a single account whose storage did not fit one response and pages through its
/// remaining slot range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTask {
    pub requests: Vec<StorageRequest>,
}

impl StorageTask {
    pub fn is_fragment(&self) -> bool {
        matches!(self.requests.as_slice(), [request] if !request.is_whole_range())
    }
}

pub type AccountSlots = (B256, Vec<(B256, Bytes)>);

#[derive(Debug, Clone, Default)]
pub struct StorageRangeResult {
    pub slots: Vec<AccountSlots>,
    /// Accounts the peer did not get to.
    pub unserved: Vec<StorageRequest>,
    /// Slot range still missing for the last served account.
    pub remainder: Option<StorageRequest>,
    /// Storage trie nodes fully determined by the verified slots.
    pub nodes: Vec<Bytes>,
}

pub struct StorageFetcher {
    context: SnapContext,
    requests: VecDeque<StorageRequest>,
    tasks: VecDeque<StorageTask>,
    proven_nodes: Vec<Bytes>,
}

impl StorageFetcher {
    pub fn new(context: SnapContext, requests: Vec<StorageRequest>) -> Self {
        Self {
            context,
            requests: requests.into(),
            tasks: VecDeque::new(),
            proven_nodes: Vec::new(),
        }
    }
}

fn split_slots(list: Vec<StorageData>) -> (Vec<B256>, Vec<Bytes>) {
    list.into_iter().map(|slot| (slot.hash, slot.body)).unzip()
}

/// Check a single-account response against the account's storage root.
fn verify_fragment(
    verifier: &dyn RangeProofVerifier,
    request: &StorageRequest,
    origin: B256,
    lists: Vec<Vec<StorageData>>,
    proof: &[Bytes],
) -> Result<StorageRangeResult, RequestError> {
    if lists.len() > 1 {
        return Err(RequestError::invalid(format!(
            "{} slot lists for a single account",
            lists.len()
        )));
    }
    let list = lists.into_iter().next().unwrap_or_default();
    let (keys, values) = split_slots(list);
    let verified = verifier.verify_range(request.storage_root, origin, &keys, &values, proof)?;

    let limit = request.limit();
    let remainder = match keys.last() {
        Some(last) if verified.has_more => request.remainder_after(last),
        _ => None,
    };
    let slots = keys
        .into_iter()
        .zip(values)
        .filter(|(key, _)| hash_to_u256(key) <= limit)
        .collect();
    Ok(StorageRangeResult {
        slots: vec![(request.account_hash, slots)],
        unserved: Vec::new(),
        remainder,
        nodes: verified.nodes,
    })
}

#[async_trait]
impl FetcherHandler for StorageFetcher {
    type Task = StorageTask;
    type Result = StorageRangeResult;
    type Item = AccountSlots;

    fn name(&self) -> &'static str {
        "storage"
    }

    fn next_tasks(&mut self, limit: usize) -> Vec<StorageTask> {
        let mut tasks = Vec::new();
        while tasks.len() < limit {
            if let Some(task) = self.tasks.pop_front() {
                tasks.push(task);
                continue;
            }
            if self.requests.is_empty() {
                break;
            }
            let count = self
                .requests
                .len()
                .min(self.context.max_storage_accounts_per_request);
            tasks.push(StorageTask {
                requests: self.requests.drain(..count).collect(),
            });
        }
        tasks
    }

    fn is_exhausted(&self) -> bool {
        self.tasks.is_empty() && self.requests.is_empty()
    }

    fn peer_filter(&self, peer: &SyncPeer) -> bool {
        peer.snap.is_some()
    }

    fn request(&self, job: &FetchJob<Self>, peer: &SyncPeer) -> RequestFuture<StorageRangeResult> {
        let root = self.context.state_root();
        let bytes = self.context.max_range_bytes;
        let snap = peer.snap.clone();

        if job.task.is_fragment() {
            let request = job.task.requests[0].clone();
            let origin = job
                .partial_result
                .as_ref()
                .and_then(|partial| partial.slots.first())
                .and_then(|(_, slots)| slots.last())
                .and_then(|(hash, _)| next_hash(hash))
                .unwrap_or_else(|| u256_to_hash(request.first));
            let message = GetStorageRanges {
                root,
                accounts: vec![request.account_hash],
                origin,
                limit: u256_to_hash(request.limit()),
                bytes,
            };
            let verifier = self.context.verifier.clone();
            return Box::pin(async move {
                let Some(snap) = snap else {
                    return Err(RequestError::invalid("peer does not serve snap"));
                };
                let response = snap.get_storage_ranges(message).await?;
                if response.slots.is_empty() && response.proof.is_empty() {
                    return Ok(None);
                }
                verify_fragment(
                    verifier.as_ref(),
                    &request,
                    origin,
                    response.slots,
                    &response.proof,
                )
                .map(Some)
            });
        }

        let requests = job.task.requests.clone();
        let message = GetStorageRanges {
            root,
            accounts: requests.iter().map(|request| request.account_hash).collect(),
            origin: B256::ZERO,
            limit: u256_to_hash(U256::MAX),
            bytes,
        };
        let verifier = self.context.verifier.clone();
        Box::pin(async move {
            let Some(snap) = snap else {
                return Err(RequestError::invalid("peer does not serve snap"));
            };
            let response = snap.get_storage_ranges(message).await?;
            if response.slots.is_empty() {
                return Ok(None);
            }
            let served = response.slots.len();
            if served > requests.len() {
                return Err(RequestError::invalid(format!(
                    "{served} slot lists for {} accounts",
                    requests.len()
                )));
            }

            let mut slots = Vec::with_capacity(served);
            let mut remainder = None;
            let mut nodes = Vec::new();
            for (position, (request, list)) in requests.iter().zip(response.slots).enumerate() {
                let (keys, values) = split_slots(list);
                // Only the last list may be cut short, so only it carries a proof.
                let proof: &[Bytes] = if position + 1 == served {
                    &response.proof
                } else {
                    &[]
                };
                let verified = verifier.verify_range(
                    request.storage_root,
                    B256::ZERO,
                    &keys,
                    &values,
                    proof,
                )?;
                if verified.has_more {
                    remainder = keys.last().and_then(|last| request.remainder_after(last));
                }
                nodes.extend(verified.nodes);
                slots.push((request.account_hash, keys.into_iter().zip(values).collect()));
            }

            Ok(Some(StorageRangeResult {
                slots,
                unserved: requests[served..].to_vec(),
                remainder,
                nodes,
            }))
        })
    }

    fn process(
        &mut self,
        job: &mut FetchJob<Self>,
        result: StorageRangeResult,
    ) -> Option<Vec<AccountSlots>> {
        self.proven_nodes.extend(result.nodes);
        if !result.unserved.is_empty() {
            debug!(count = result.unserved.len(), "Re-queueing unserved storage requests");
            for request in result.unserved.into_iter().rev() {
                self.requests.push_front(request);
            }
        }

        if job.task.is_fragment() {
            let mut accumulated = job.partial_result.take().unwrap_or_default();
            match accumulated.slots.first_mut() {
                Some((_, slots)) => {
                    for (_, more) in result.slots {
                        slots.extend(more);
                    }
                }
                None => accumulated.slots = result.slots,
            }
            if result.remainder.is_some() {
                job.partial_result = Some(accumulated);
                return None;
            }
            return Some(accumulated.slots);
        }

        if let Some(remainder) = result.remainder {
            debug!(
                account = %remainder.account_hash,
                first = %remainder.first,
                "Storage does not fit one response, fragmenting"
            );
            self.tasks.push_back(StorageTask {
                requests: vec![remainder],
            });
        }
        Some(result.slots)
    }

    async fn store(&mut self, accounts: Vec<AccountSlots>) -> Result<StoreOutcome, StoreError> {
        let mut total = 0;
        for (account, slots) in accounts {
            total += slots.len();
            self.context.state.put_storage(account, slots)?;
        }
        if !self.proven_nodes.is_empty() {
            let nodes = std::mem::take(&mut self.proven_nodes);
            debug!(count = nodes.len(), "Stored proven storage trie nodes");
            self.context.state.put_nodes(nodes)?;
        }
        self.context
            .flags
            .add_progress(SnapFetcherKind::Storage, U256::from(total));
        debug!(slots = total, "Stored storage slots");
        Ok(StoreOutcome::Stored)
    }

    fn process_store_error(&self, _error: &StoreError, _task: &StorageTask) -> StoreErrorAction {
        StoreErrorAction::destroy()
    }
}
