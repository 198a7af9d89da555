use async_trait::async_trait;
use containers::{
    B256, Bytes, EMPTY_ROOT_HASH, GetAccountRange, SnapAccount, U256, hash_to_u256, next_hash,
    u256_to_hash,
};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

use super::bytecode_fetcher::ByteCodeFetcher;
use super::storage_fetcher::StorageFetcher;
use super::trie_node_fetcher::TrieNodeFetcher;
use super::{FetcherDoneFlags, SnapContext, SnapFetcherKind, StorageRequest};
use crate::sync::config::FetcherConfig;
use crate::sync::error::{FetcherError, RequestError, StoreError, StoreErrorAction, StoreOutcome};
use crate::sync::fetcher::{FetchJob, Fetcher, FetcherHandler, RequestFuture};
use crate::sync::peer_manager::{SharedPeerManager, SyncPeer};
use crate::sync::states::SnapPhase;

/// Inclusive span of the hashed account space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTask {
    pub first: U256,
    pub last: U256,
}

/// Split the whole account space into `splits` contiguous tasks.
pub fn account_tasks(splits: u64) -> Vec<AccountTask> {
    let splits = splits.max(1);
    let step = U256::MAX / U256::from(splits);
    (0..splits)
        .map(|i| {
            let first = step * U256::from(i);
            let last = if i + 1 == splits {
                U256::MAX
            } else {
                step * U256::from(i + 1) - U256::from(1)
            };
            AccountTask { first, last }
        })
        .collect()
}

/// Verified accounts of one response. `has_more` is set when the task's span is not covered
/// yet.
#[derive(Debug, Clone, Default)]
pub struct AccountRangeResult {
    pub accounts: Vec<(B256, SnapAccount)>,
    pub has_more: bool,
    /// Trie nodes fully determined by the verified accounts.
    pub nodes: Vec<Bytes>,
}

/// Downloads every account under the state root and collects the storage and bytecode work
/// they imply.
pub struct AccountFetcher {
    context: SnapContext,
    tasks: VecDeque<AccountTask>,
    storage_requests: Vec<StorageRequest>,
    code_hashes: Vec<B256>,
    seen_codes: HashSet<B256>,
    proven_nodes: Vec<Bytes>,
}

impl AccountFetcher {
    pub fn new(context: SnapContext) -> Self {
        let tasks = if context.state_root() == EMPTY_ROOT_HASH {
            VecDeque::new()
        } else {
            account_tasks(context.account_range_splits).into()
        };
        context
            .flags
            .set_progress(SnapFetcherKind::Account, U256::ZERO, U256::ZERO);
        Self {
            context,
            tasks,
            storage_requests: Vec::new(),
            code_hashes: Vec::new(),
            seen_codes: HashSet::new(),
            proven_nodes: Vec::new(),
        }
    }

    pub fn flags(&self) -> &FetcherDoneFlags {
        &self.context.flags
    }

    pub fn storage_requests(&self) -> &[StorageRequest] {
        &self.storage_requests
    }

    pub fn code_hashes(&self) -> &[B256] {
        &self.code_hashes
    }

    /// Download the whole state: accounts, then storage and bytecode side by side, then
    /// healing. Returns the shared flags, all done.
    pub async fn blocking_fetch(
        self,
        peers: SharedPeerManager,
        config: FetcherConfig,
    ) -> Result<FetcherDoneFlags, FetcherError> {
        let context = self.context.clone();
        let flags = context.flags.clone();
        info!(root = %context.state_root(), "Snap sync started");

        flags.advance(SnapPhase::Accounts);
        let mut accounts = Fetcher::new(self, peers.clone(), config.clone());
        accounts.fetch().await?;
        let mut handler = accounts.into_handler();
        flags.mark_done(SnapFetcherKind::Account);
        let storage_requests = std::mem::take(&mut handler.storage_requests);
        let code_hashes = std::mem::take(&mut handler.code_hashes);
        info!(
            storage = storage_requests.len(),
            codes = code_hashes.len(),
            "Account range downloaded"
        );

        flags.advance(SnapPhase::StorageAndCode);
        let mut storage = Fetcher::new(
            StorageFetcher::new(context.clone(), storage_requests),
            peers.clone(),
            config.clone(),
        );
        let mut codes = Fetcher::new(
            ByteCodeFetcher::new(context.clone(), code_hashes),
            peers.clone(),
            config.clone(),
        );
        tokio::try_join!(storage.fetch(), codes.fetch())?;
        flags.mark_done(SnapFetcherKind::Storage);
        flags.mark_done(SnapFetcherKind::ByteCode);

        flags.advance(SnapPhase::Healing);
        let mut healer = Fetcher::new(
            TrieNodeFetcher::new(context.clone()),
            peers.clone(),
            config.clone(),
        );
        healer.fetch().await?;
        let mut healer = healer.into_handler();
        healer.flush().map_err(StoreError::from)?;

        let missing_codes = healer.take_missing_codes();
        if !missing_codes.is_empty() {
            debug!(count = missing_codes.len(), "Fetching code found while healing");
            flags.mark_pending(SnapFetcherKind::ByteCode);
            let mut codes = Fetcher::new(
                ByteCodeFetcher::new(context.clone(), missing_codes),
                peers,
                config,
            );
            codes.fetch().await?;
            flags.mark_done(SnapFetcherKind::ByteCode);
        }
        flags.mark_done(SnapFetcherKind::TrieNode);
        flags.advance(SnapPhase::Done);
        info!(root = %context.state_root(), "Snap sync done");
        Ok(flags)
    }
}

#[async_trait]
impl FetcherHandler for AccountFetcher {
    type Task = AccountTask;
    type Result = AccountRangeResult;
    type Item = (B256, SnapAccount);

    fn name(&self) -> &'static str {
        "account"
    }

    fn next_tasks(&mut self, limit: usize) -> Vec<AccountTask> {
        let count = limit.min(self.tasks.len());
        self.tasks.drain(..count).collect()
    }

    fn is_exhausted(&self) -> bool {
        self.tasks.is_empty()
    }

    fn peer_filter(&self, peer: &SyncPeer) -> bool {
        peer.snap.is_some()
    }

    fn request(&self, job: &FetchJob<Self>, peer: &SyncPeer) -> RequestFuture<AccountRangeResult> {
        let origin = job
            .partial_result
            .as_ref()
            .and_then(|partial| partial.accounts.last())
            .and_then(|(hash, _)| next_hash(hash))
            .unwrap_or_else(|| u256_to_hash(job.task.first));
        let last = job.task.last;
        let root = self.context.state_root();
        let request = GetAccountRange {
            root,
            origin,
            limit: u256_to_hash(last),
            bytes: self.context.max_range_bytes,
        };
        let verifier = self.context.verifier.clone();
        let snap = peer.snap.clone();

        Box::pin(async move {
            let Some(snap) = snap else {
                return Err(RequestError::invalid("peer does not serve snap"));
            };
            let range = snap.get_account_range(request).await?;
            if range.accounts.is_empty() && range.proof.is_empty() {
                return Ok(None);
            }

            let mut accounts = Vec::with_capacity(range.accounts.len());
            let mut keys = Vec::with_capacity(range.accounts.len());
            let mut values = Vec::with_capacity(range.accounts.len());
            for data in range.accounts {
                let account = SnapAccount::decode_slim(&data.body).map_err(|error| {
                    RequestError::invalid(format!("account {}: {error}", data.hash))
                })?;
                keys.push(data.hash);
                values.push(Bytes::from(account.encode_full()));
                accounts.push((data.hash, account));
            }

            let verified = verifier.verify_range(root, origin, &keys, &values, &range.proof)?;
            let reached_last = keys.last().is_some_and(|key| hash_to_u256(key) >= last);
            accounts.retain(|(hash, _)| hash_to_u256(hash) <= last);

            Ok(Some(AccountRangeResult {
                accounts,
                has_more: verified.has_more && !reached_last,
                nodes: verified.nodes,
            }))
        })
    }

    fn process(
        &mut self,
        job: &mut FetchJob<Self>,
        result: AccountRangeResult,
    ) -> Option<Vec<(B256, SnapAccount)>> {
        let mut accounts = job
            .partial_result
            .take()
            .map(|partial| partial.accounts)
            .unwrap_or_default();
        accounts.extend(result.accounts);
        self.proven_nodes.extend(result.nodes);
        if result.has_more {
            job.partial_result = Some(AccountRangeResult {
                accounts,
                has_more: true,
                nodes: Vec::new(),
            });
            return None;
        }
        Some(accounts)
    }

    async fn store(
        &mut self,
        accounts: Vec<(B256, SnapAccount)>,
    ) -> Result<StoreOutcome, StoreError> {
        for (hash, account) in &accounts {
            if account.has_storage() {
                self.storage_requests
                    .push(StorageRequest::new(*hash, account.storage_root));
            }
            if account.has_code()
                && !self.context.state.has_code(&account.code_hash)
                && self.seen_codes.insert(account.code_hash)
            {
                self.code_hashes.push(account.code_hash);
            }
        }
        let count = accounts.len();
        self.context.state.put_accounts(accounts)?;
        if !self.proven_nodes.is_empty() {
            let nodes = std::mem::take(&mut self.proven_nodes);
            debug!(count = nodes.len(), "Stored proven account trie nodes");
            self.context.state.put_nodes(nodes)?;
        }
        self.context
            .flags
            .add_progress(SnapFetcherKind::Account, U256::from(count));
        debug!(count, "Stored accounts");
        Ok(StoreOutcome::Stored)
    }

    fn process_store_error(&self, _error: &StoreError, _task: &AccountTask) -> StoreErrorAction {
        StoreErrorAction::destroy()
    }
}
