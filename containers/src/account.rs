use alloy_primitives::{Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};

use crate::types::{EMPTY_ROOT_HASH, KECCAK_EMPTY};

/// Account leaf of the state trie.
///
/// On the snap wire accounts travel in "slim" form, where an empty storage root and an
/// empty code hash are replaced by empty strings. The trie itself always stores the full
/// four-field encoding.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct SnapAccount {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: B256,
    pub code_hash: B256,
}

impl Default for SnapAccount {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        }
    }
}

impl SnapAccount {
    pub fn has_storage(&self) -> bool {
        self.storage_root != EMPTY_ROOT_HASH
    }

    pub fn has_code(&self) -> bool {
        self.code_hash != KECCAK_EMPTY
    }

    pub fn decode_slim(mut buf: &[u8]) -> Result<Self, alloy_rlp::Error> {
        let header = alloy_rlp::Header::decode(&mut buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        if buf.len() < header.payload_length {
            return Err(alloy_rlp::Error::InputTooShort);
        }

        let mut payload = &buf[..header.payload_length];
        let nonce = u64::decode(&mut payload)?;
        let balance = U256::decode(&mut payload)?;
        let storage_root = decode_elided_hash(&mut payload, EMPTY_ROOT_HASH)?;
        let code_hash = decode_elided_hash(&mut payload, KECCAK_EMPTY)?;

        if !payload.is_empty() {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length - payload.len(),
                got: header.payload_length,
            });
        }

        Ok(Self {
            nonce,
            balance,
            storage_root,
            code_hash,
        })
    }

    pub fn encode_slim(&self) -> Vec<u8> {
        let storage_root: &[u8] = if self.has_storage() {
            self.storage_root.as_slice()
        } else {
            &[]
        };
        let code_hash: &[u8] = if self.has_code() {
            self.code_hash.as_slice()
        } else {
            &[]
        };

        let payload_length = self.nonce.length()
            + self.balance.length()
            + storage_root.length()
            + code_hash.length();

        let mut out = Vec::with_capacity(payload_length + 4);
        alloy_rlp::Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.nonce.encode(&mut out);
        self.balance.encode(&mut out);
        storage_root.encode(&mut out);
        code_hash.encode(&mut out);
        out
    }

    /// Encoding stored in trie leaves.
    pub fn encode_full(&self) -> Vec<u8> {
        alloy_rlp::encode(self)
    }
}

fn decode_elided_hash(buf: &mut &[u8], empty: B256) -> Result<B256, alloy_rlp::Error> {
    let bytes = Bytes::decode(buf)?;
    match bytes.len() {
        0 => Ok(empty),
        32 => Ok(B256::from_slice(&bytes)),
        _ => Err(alloy_rlp::Error::UnexpectedLength),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slim_encoding_elides_empty_fields() {
        let account = SnapAccount {
            nonce: 3,
            balance: U256::from(1_000u64),
            ..Default::default()
        };

        let slim = account.encode_slim();
        assert!(slim.len() < account.encode_full().len());
        assert_eq!(SnapAccount::decode_slim(&slim).unwrap(), account);
    }

    #[test]
    fn slim_encoding_keeps_real_roots() {
        let account = SnapAccount {
            nonce: 1,
            balance: U256::from(5u64),
            storage_root: B256::repeat_byte(0x11),
            code_hash: B256::repeat_byte(0x22),
        };

        let slim = account.encode_slim();
        assert_eq!(slim, account.encode_full());
        assert_eq!(SnapAccount::decode_slim(&slim).unwrap(), account);
        assert!(account.has_storage());
        assert!(account.has_code());
    }

    #[test]
    fn decode_slim_accepts_full_encoding() {
        let account = SnapAccount::default();
        assert_eq!(
            SnapAccount::decode_slim(&account.encode_full()).unwrap(),
            account
        );
    }

    #[test]
    fn decode_slim_rejects_short_hash() {
        let mut out = Vec::new();
        let short: &[u8] = &[1, 2, 3];
        let payload_length = 0u64.length() + U256::ZERO.length() + short.length() * 2;
        alloy_rlp::Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        0u64.encode(&mut out);
        U256::ZERO.encode(&mut out);
        short.encode(&mut out);
        short.encode(&mut out);

        assert_eq!(
            SnapAccount::decode_slim(&out),
            Err(alloy_rlp::Error::UnexpectedLength)
        );
    }
}
