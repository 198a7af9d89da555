use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

pub const MAX_PER_REQUEST: u64 = 100;
pub const MAX_FETCHER_JOBS: usize = 100;
pub const MAX_QUEUE: u64 = 4;
pub const REQUEST_TIMEOUT_MS: u64 = 8_000;
pub const INTERVAL_MS: u64 = 1_000;
pub const BAN_TIME_MS: u64 = 60_000;
pub const SAFE_REORG_DISTANCE: u64 = 100;
pub const SKELETON_FILL_CANONICAL_BACK_STEP: u64 = 100;
pub const SKELETON_SUBCHAIN_MERGE_MINIMUM: u64 = 1_000;
pub const SKELETON_FILL_CUTOFF: u64 = 10;
pub const MAX_RANGE_BYTES: u64 = 50_000;
pub const ACCOUNT_RANGE_SPLITS: u64 = 10;
pub const MAX_STORAGE_ACCOUNTS_PER_REQUEST: usize = 64;
pub const MAX_TRIE_NODE_PATHS_PER_REQUEST: usize = 64;

/// Tunables shared by the fetchers and the skeleton.
///
/// Every key is optional in the YAML file; missing keys take the defaults above.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_per_request: u64,
    pub max_fetcher_jobs: usize,
    pub max_queue: u64,
    pub request_timeout_ms: u64,
    pub interval_ms: u64,
    pub ban_time_ms: u64,
    pub safe_reorg_distance: u64,
    pub skeleton_fill_canonical_back_step: u64,
    pub skeleton_subchain_merge_minimum: u64,
    pub skeleton_fill_cutoff: u64,
    pub max_range_bytes: u64,
    pub account_range_splits: u64,
    pub max_storage_accounts_per_request: usize,
    pub max_trie_node_paths_per_request: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_per_request: MAX_PER_REQUEST,
            max_fetcher_jobs: MAX_FETCHER_JOBS,
            max_queue: MAX_QUEUE,
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            interval_ms: INTERVAL_MS,
            ban_time_ms: BAN_TIME_MS,
            safe_reorg_distance: SAFE_REORG_DISTANCE,
            skeleton_fill_canonical_back_step: SKELETON_FILL_CANONICAL_BACK_STEP,
            skeleton_subchain_merge_minimum: SKELETON_SUBCHAIN_MERGE_MINIMUM,
            skeleton_fill_cutoff: SKELETON_FILL_CUTOFF,
            max_range_bytes: MAX_RANGE_BYTES,
            account_range_splits: ACCOUNT_RANGE_SPLITS,
            max_storage_accounts_per_request: MAX_STORAGE_ACCOUNTS_PER_REQUEST,
            max_trie_node_paths_per_request: MAX_TRIE_NODE_PATHS_PER_REQUEST,
        }
    }
}

impl SyncConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn ban_time(&self) -> Duration {
        Duration::from_millis(self.ban_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: SyncConfig =
            serde_yaml::from_str("max_queue: 16\nban_time_ms: 5000\n").unwrap();
        assert_eq!(config.max_queue, 16);
        assert_eq!(config.ban_time(), Duration::from_secs(5));
        assert_eq!(config.max_per_request, MAX_PER_REQUEST);
        assert_eq!(config.skeleton_subchain_merge_minimum, 1_000);
    }

    #[test]
    fn durations_are_millis() {
        let config = SyncConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(8));
        assert_eq!(config.interval(), Duration::from_secs(1));
    }
}
