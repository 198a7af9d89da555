//! Generic fetch pipeline.
//!
//! A fetcher turns a lazily generated stream of tasks into requests against idle peers and
//! hands the processed results to a storage sink strictly in task order:
//!
//! ```text
//!   next_tasks ──> pending (min-heap by index)
//!                    │  head index <= processed + max_queue, idle peer available
//!                    v
//!                  active ──request──> peer
//!                    │  timeout / error ──> ban peer, back to pending
//!                    │  empty answer    ──> rest peer, back to pending
//!                    │  process == None ──> back to pending (partial result kept)
//!                    v
//!                  completed (min-heap by index)
//!                    │  head index == processed
//!                    v
//!                  store ──err──> process_store_error: destroy, or ban + step back + retry
//! ```
//!
//! The concrete fetchers only implement [`FetcherHandler`]; all queueing, peer bookkeeping,
//! timeouts and ordering live here.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use libp2p_identity::PeerId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt::Debug;
use tokio::time::{Instant, error::Elapsed};
use tracing::{debug, error, info, warn};

use super::config::FetcherConfig;
use super::error::{
    FetchOutcome, FetcherError, RequestError, StoreError, StoreErrorAction, StoreOutcome,
};
use super::job::{Job, JobState};
use super::peer_manager::{SharedPeerManager, SyncPeer};

pub type FetchJob<H> =
    Job<<H as FetcherHandler>::Task, <H as FetcherHandler>::Result, <H as FetcherHandler>::Item>;

pub type RequestFuture<R> = BoxFuture<'static, Result<Option<R>, RequestError>>;

type Response<R> = (u64, PeerId, Result<Result<Option<R>, RequestError>, Elapsed>);

/// Task-specific behaviour plugged into a [`Fetcher`].
#[async_trait]
pub trait FetcherHandler: Send + 'static {
    type Task: Clone + Debug + Send + Sync + 'static;
    /// Raw (validated) peer answer.
    type Result: Send + 'static;
    /// Unit handed to the storage sink.
    type Item: Send + 'static;

    fn name(&self) -> &'static str;

    /// Produce up to `limit` new tasks.
    fn next_tasks(&mut self, limit: usize) -> Vec<Self::Task>;

    /// No task is left to generate. Must be `false` whenever `next_tasks` would return tasks.
    fn is_exhausted(&self) -> bool;

    /// Whether a peer can serve this fetcher's requests at all.
    fn peer_filter(&self, peer: &SyncPeer) -> bool;

    /// Build the request for `job`. `Ok(None)` means the peer had nothing useful.
    fn request(&self, job: &FetchJob<Self>, peer: &SyncPeer) -> RequestFuture<Self::Result>;

    /// Turn a response into storable items. `None` re-queues the job; any partial result the
    /// handler kept on the job is carried into the next attempt.
    fn process(&mut self, job: &mut FetchJob<Self>, result: Self::Result)
    -> Option<Vec<Self::Item>>;

    async fn store(&mut self, items: Vec<Self::Item>) -> Result<StoreOutcome, StoreError>;

    fn process_store_error(&self, error: &StoreError, task: &Self::Task) -> StoreErrorAction;

    /// Widen `task` backwards by `count` units after a recoverable store error.
    fn step_back(&mut self, _task: &mut Self::Task, _count: u64) {}
}

pub struct Fetcher<H: FetcherHandler> {
    handler: H,
    config: FetcherConfig,
    peers: SharedPeerManager,
    pending: BinaryHeap<Reverse<FetchJob<H>>>,
    active: HashMap<u64, FetchJob<H>>,
    completed: BinaryHeap<Reverse<FetchJob<H>>>,
    in_flight: FuturesUnordered<BoxFuture<'static, Response<H::Result>>>,
    recovering: FuturesUnordered<BoxFuture<'static, PeerId>>,
    resting: HashSet<PeerId>,
    /// Indices handed out so far.
    total: u64,
    /// Jobs delivered to the store; also the next index the store expects.
    processed: u64,
    destroyed: bool,
}

enum Event<R> {
    Response(Response<R>),
    Recovered(PeerId),
    Tick,
}

impl<H: FetcherHandler> Fetcher<H> {
    pub fn new(handler: H, peers: SharedPeerManager, config: FetcherConfig) -> Self {
        Self {
            handler,
            config,
            peers,
            pending: BinaryHeap::new(),
            active: HashMap::new(),
            completed: BinaryHeap::new(),
            in_flight: FuturesUnordered::new(),
            recovering: FuturesUnordered::new(),
            resting: HashSet::new(),
            total: 0,
            processed: 0,
            destroyed: false,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Queue a task and return the index it will be delivered under.
    pub fn enqueue_task(&mut self, task: H::Task) -> u64 {
        let index = self.total;
        self.total += 1;
        self.pending.push(Reverse(Job::new(task, index)));
        index
    }

    /// Run until every task is stored, the sink halts, or a fatal store error.
    pub async fn fetch(&mut self) -> Result<FetchOutcome, FetcherError> {
        if self.destroyed {
            return Err(FetcherError::Destroyed);
        }
        info!(fetcher = self.handler.name(), "Fetcher started");

        loop {
            self.fill_tasks();
            self.dispatch();

            if self.is_complete() {
                self.release_resting();
                info!(
                    fetcher = self.handler.name(),
                    jobs = self.processed,
                    "Fetcher completed"
                );
                return Ok(FetchOutcome::Completed);
            }

            let interval = self.config.interval;
            let event = tokio::select! {
                Some(response) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    Event::Response(response)
                }
                Some(peer_id) = self.recovering.next(), if !self.recovering.is_empty() => {
                    Event::Recovered(peer_id)
                }
                _ = tokio::time::sleep(interval) => Event::Tick,
            };

            match event {
                Event::Response((index, peer_id, outcome)) => {
                    self.on_response(index, peer_id, outcome)
                }
                Event::Recovered(peer_id) => {
                    self.resting.remove(&peer_id);
                    self.peers.lock().set_idle(&peer_id, true);
                }
                Event::Tick => {}
            }

            if let Some(outcome) = self.dequeue().await? {
                return Ok(outcome);
            }
        }
    }

    /// Abandon all work and hand every claimed peer back to the pool.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.in_flight.clear();
        {
            let mut peers = self.peers.lock();
            for job in self.active.values() {
                if let Some(peer_id) = &job.peer {
                    peers.set_idle(peer_id, true);
                }
            }
        }
        self.release_resting();
        self.active.clear();
        self.pending.clear();
        self.completed.clear();
        debug!(fetcher = self.handler.name(), "Fetcher destroyed");
    }

    fn is_complete(&self) -> bool {
        self.pending.is_empty()
            && self.active.is_empty()
            && self.completed.is_empty()
            && self.handler.is_exhausted()
    }

    fn fill_tasks(&mut self) {
        if !self.pending.is_empty() || self.handler.is_exhausted() {
            return;
        }
        let tasks = self.handler.next_tasks(self.config.max_fetcher_jobs);
        if !tasks.is_empty() {
            debug!(
                fetcher = self.handler.name(),
                count = tasks.len(),
                "Generated tasks"
            );
        }
        for task in tasks {
            self.enqueue_task(task);
        }
    }

    fn dispatch(&mut self) {
        loop {
            let Some(index) = self.pending.peek().map(|Reverse(job)| job.index) else {
                break;
            };
            if index > self.processed + self.config.max_queue {
                break;
            }

            let peer = {
                let mut peers = self.peers.lock();
                let Some(peer) = peers.idle_peer(|peer| self.handler.peer_filter(peer)) else {
                    break;
                };
                peers.set_idle(&peer.peer_id, false);
                peer
            };

            let Some(Reverse(mut job)) = self.pending.pop() else {
                self.peers.lock().set_idle(&peer.peer_id, true);
                break;
            };
            job.state = JobState::Active;
            job.peer = Some(peer.peer_id);
            job.time = Instant::now();

            debug!(
                fetcher = self.handler.name(),
                index,
                peer = %peer.peer_id,
                task = ?job.task,
                "Dispatching job"
            );

            let request = self.handler.request(&job, &peer);
            let timeout = self.config.timeout;
            let peer_id = peer.peer_id;
            self.in_flight.push(Box::pin(async move {
                (index, peer_id, tokio::time::timeout(timeout, request).await)
            }));
            self.active.insert(index, job);
        }
    }

    fn on_response(
        &mut self,
        index: u64,
        peer_id: PeerId,
        outcome: Result<Result<Option<H::Result>, RequestError>, Elapsed>,
    ) {
        let Some(mut job) = self.active.remove(&index) else {
            return;
        };

        match outcome {
            Err(_) => {
                job.state = JobState::Expired;
                warn!(
                    fetcher = self.handler.name(),
                    index,
                    peer = %peer_id,
                    elapsed_ms = job.time.elapsed().as_millis() as u64,
                    "Job expired"
                );
                self.ban(&peer_id);
                self.requeue(job);
            }
            Ok(Err(error)) => {
                warn!(
                    fetcher = self.handler.name(),
                    index,
                    peer = %peer_id,
                    %error,
                    "Request failed"
                );
                self.ban(&peer_id);
                self.requeue(job);
            }
            Ok(Ok(None)) => {
                debug!(
                    fetcher = self.handler.name(),
                    index,
                    peer = %peer_id,
                    "Empty response"
                );
                self.rest(peer_id);
                self.requeue(job);
            }
            Ok(Ok(Some(result))) => {
                self.peers.lock().set_idle(&peer_id, true);
                match self.handler.process(&mut job, result) {
                    Some(items) => {
                        job.result = Some(items);
                        self.completed.push(Reverse(job));
                    }
                    None => {
                        debug!(
                            fetcher = self.handler.name(),
                            index,
                            "Job incomplete, re-queued"
                        );
                        self.requeue(job);
                    }
                }
            }
        }
    }

    /// Release completed jobs to the store while they are next in line.
    async fn dequeue(&mut self) -> Result<Option<FetchOutcome>, FetcherError> {
        while self
            .completed
            .peek()
            .is_some_and(|Reverse(job)| job.index == self.processed)
        {
            let Some(Reverse(mut job)) = self.completed.pop() else {
                break;
            };
            let items = job.result.take().unwrap_or_default();

            match self.handler.store(items).await {
                Ok(StoreOutcome::Stored) => {
                    self.processed += 1;
                    debug!(fetcher = self.handler.name(), index = job.index, "Stored job");
                }
                Ok(StoreOutcome::Halt) => {
                    info!(
                        fetcher = self.handler.name(),
                        index = job.index,
                        "Store halted fetcher"
                    );
                    self.destroy();
                    return Ok(Some(FetchOutcome::Halted));
                }
                Err(store_error) => {
                    let action = self.handler.process_store_error(&store_error, &job.task);
                    if action.destroy_fetcher {
                        error!(
                            fetcher = self.handler.name(),
                            index = job.index,
                            error = %store_error,
                            "Fatal store error"
                        );
                        self.destroy();
                        return Err(store_error.into());
                    }

                    warn!(
                        fetcher = self.handler.name(),
                        index = job.index,
                        error = %store_error,
                        step_back = action.step_back,
                        "Store failed, retrying job"
                    );
                    self.retry_after_store_error(job, action);
                    break;
                }
            }
        }
        Ok(None)
    }

    fn retry_after_store_error(&mut self, mut job: FetchJob<H>, action: StoreErrorAction) {
        if action.ban_peer {
            if let Some(peer_id) = job.peer {
                self.ban(&peer_id);
            }
        }
        if action.step_back > 0 {
            self.handler.step_back(&mut job.task, action.step_back);
        }
        job.partial_result = None;
        self.requeue(job);
    }

    fn requeue(&mut self, mut job: FetchJob<H>) {
        job.reset();
        self.pending.push(Reverse(job));
    }

    fn ban(&mut self, peer_id: &PeerId) {
        self.peers.lock().ban(peer_id, self.config.ban_time);
    }

    fn rest(&mut self, peer_id: PeerId) {
        if !self.resting.insert(peer_id) {
            return;
        }
        let interval = self.config.interval;
        self.recovering.push(Box::pin(async move {
            tokio::time::sleep(interval).await;
            peer_id
        }));
    }

    fn release_resting(&mut self) {
        self.recovering.clear();
        let mut peers = self.peers.lock();
        for peer_id in self.resting.drain() {
            peers.set_idle(&peer_id, true);
        }
    }
}
