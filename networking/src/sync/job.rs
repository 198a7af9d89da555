use libp2p_identity::PeerId;
use std::cmp::Ordering;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Active,
    Expired,
}

/// One unit of fetch work.
///
/// `index` is assigned once at enqueue time and never changes, even across retries: it is both
/// the dispatch priority and the position in which results are handed to the store.
#[derive(Debug)]
pub struct Job<T, R, I> {
    pub task: T,
    pub index: u64,
    pub time: Instant,
    pub state: JobState,
    pub peer: Option<PeerId>,
    /// Data kept from earlier incomplete answers.
    pub partial_result: Option<R>,
    pub result: Option<Vec<I>>,
}

impl<T, R, I> Job<T, R, I> {
    pub fn new(task: T, index: u64) -> Self {
        Self {
            task,
            index,
            time: Instant::now(),
            state: JobState::Idle,
            peer: None,
            partial_result: None,
            result: None,
        }
    }

    /// Put the job back into the pending state, keeping any partial result.
    pub fn reset(&mut self) {
        self.state = JobState::Idle;
        self.peer = None;
        self.result = None;
    }
}

impl<T, R, I> PartialEq for Job<T, R, I> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T, R, I> Eq for Job<T, R, I> {}

impl<T, R, I> PartialOrd for Job<T, R, I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, R, I> Ord for Job<T, R, I> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}
