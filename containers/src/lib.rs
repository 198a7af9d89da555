pub mod account;
pub mod block;
pub mod eth;
pub mod skeleton;
pub mod snap;
pub mod trie;
pub mod types;

pub use account::SnapAccount;
pub use block::{Block, BlockBody, BlockValidationError, Header, Withdrawal};
pub use eth::{GetBlockBodies, GetBlockHeaders};
pub use skeleton::{FillStatus, PutStatus, SkeletonStatus, Subchain};
pub use snap::{
    AccountData, AccountRange, ByteCodes, GetAccountRange, GetByteCodes, GetStorageRanges,
    GetTrieNodes, StorageData, StorageRanges, TrieNodes,
};
pub use types::{
    hash_to_u256, keccak256, next_hash, u256_to_hash, Address, Bloom, Bytes, B256, B64,
    EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH, KECCAK_EMPTY, U256,
};
