//! Fetcher engine configuration.
//!
//! Derived from the node-wide `SyncConfig`; every fetcher of a run shares the same values.

use chain::SyncConfig;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Per-job request timeout. A peer that misses it is banned.
    pub timeout: Duration,
    /// Idle wake-up period, also the rest given to a peer after an empty answer.
    pub interval: Duration,
    pub ban_time: Duration,
    /// How far past the last stored job a job may be dispatched.
    pub max_queue: u64,
    pub max_per_request: u64,
    /// Tasks pulled from a fetcher each time its queue runs dry.
    pub max_fetcher_jobs: usize,
}

impl From<&SyncConfig> for FetcherConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            interval: config.interval(),
            ban_time: config.ban_time(),
            max_queue: config.max_queue,
            max_per_request: config.max_per_request,
            max_fetcher_jobs: config.max_fetcher_jobs,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}
