pub use alloy_primitives::{b256, keccak256, Address, Bloom, Bytes, B256, B64, U256};
pub use alloy_trie::{EMPTY_ROOT_HASH, KECCAK_EMPTY};

/// Keccak-256 hash of the RLP of an empty list, the ommers hash of a block without uncles.
pub const EMPTY_OMMER_ROOT_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");

/// Interprets a 32-byte hash as a big-endian position in the hashed key space.
pub fn hash_to_u256(hash: &B256) -> U256 {
    U256::from_be_bytes(hash.0)
}

/// Inverse of [`hash_to_u256`].
pub fn u256_to_hash(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// The key immediately after `hash`, or `None` when `hash` is the last key of the space.
pub fn next_hash(hash: &B256) -> Option<B256> {
    hash_to_u256(hash).checked_add(U256::from(1)).map(u256_to_hash)
}

/// Short hex form used in log lines.
pub fn short(hash: &B256) -> String {
    format!("{}..", alloy_primitives::hex::encode(&hash[..4]))
}
