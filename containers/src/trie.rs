//! Nibble path helpers for path-addressed trie node requests.
//!
//! Paths are kept as one nibble per byte. On the wire they travel hex-prefix ("compact")
//! encoded, with the leaf flag always cleared since requests address nodes, not values.

use alloy_primitives::{Bytes, B256};

pub fn unpack_nibbles(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|byte| [byte >> 4, byte & 0x0f]).collect()
}

/// Packs an even-length nibble path back into bytes. A trailing odd nibble is dropped.
pub fn pack_nibbles(nibbles: &[u8]) -> Vec<u8> {
    nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | (pair[1] & 0x0f))
        .collect()
}

/// Hex-prefix encoding of a nibble path.
pub fn compact_encode(nibbles: &[u8], is_leaf: bool) -> Bytes {
    let flag = if is_leaf { 0x20 } else { 0x00 };
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    let rest = if nibbles.len() % 2 == 1 {
        out.push(flag | 0x10 | (nibbles[0] & 0x0f));
        &nibbles[1..]
    } else {
        out.push(flag);
        nibbles
    };
    out.extend(pack_nibbles(rest));
    Bytes::from(out)
}

/// Full 64-nibble path of a hashed key as raw bytes, or `None` for partial paths.
pub fn nibbles_to_hash(nibbles: &[u8]) -> Option<B256> {
    (nibbles.len() == 64).then(|| B256::from_slice(&pack_nibbles(nibbles)))
}
