pub mod block_fetcher;
pub mod config;
pub mod error;
/// Sync core of the execution client.
///
/// This module turns untrusted peer data into a verified local chain and state. It includes:
///
/// - **Peer Manager**: Tracks peers, their capabilities, and bans
/// - **Fetcher**: Generic task pipeline with ordered delivery, timeouts and retries
/// - **Block Fetchers**: Forward fill of the canonical chain, backward fill of the skeleton
/// - **Skeleton**: Subchains anchored at consensus heads, reorg handling, canonical fill
/// - **Snap**: Account, storage, bytecode and trie node download against one state root
///
/// ## Architecture
///
/// The consensus client drives sync through the skeleton:
/// 1. `set_head` / `forkchoice_update` anchor a subchain at the announced head
/// 2. While unlinked, a reverse block fetcher extends the subchain tail
/// 3. Once the tail links onto the canonical chain, the skeleton fills it forward
/// 4. Independently, snap sync downloads the state at a target root and heals it
///
/// ## Snap phases
///
/// - **IDLE**: Nothing running
/// - **ACCOUNTS**: Account range download
/// - **STORAGE AND CODE**: Storage and bytecode fetchers side by side
/// - **HEALING**: Trie node fetcher fills in what the ranges missed
/// - **DONE**: State complete
pub mod fetcher;
pub mod job;
pub mod peer_manager;
pub mod reverse_block_fetcher;
pub mod skeleton;
pub mod snap;
pub mod states;

pub use block_fetcher::{BlockFetcher, BlockTask};
pub use config::FetcherConfig;
pub use error::{FetchOutcome, FetcherError, RequestError, SkeletonError, StoreError};
pub use fetcher::{Fetcher, FetcherHandler};
pub use peer_manager::{PeerManager, SharedPeerManager, SyncPeer};
pub use reverse_block_fetcher::{ReverseBlockFetcher, backfill_skeleton};
pub use skeleton::{ForkchoiceResult, PutBlocksOutcome, Skeleton};
pub use snap::{AccountFetcher, FetcherDoneFlags, SnapContext, StorageRequest};
pub use states::SnapPhase;

#[cfg(test)]
mod tests;
