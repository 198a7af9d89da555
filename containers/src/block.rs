use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, B64, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use alloy_trie::root::{ordered_trie_root, ordered_trie_root_with_encoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH};

/// Execution-layer block header.
///
/// Post-London and post-Shanghai fields are optional trailing list items, so pre-fork headers
/// keep their received encoding and hash.
#[derive(Clone, Debug, PartialEq, Eq, Default, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
#[rlp(trailing)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub parent_hash: B256,
    pub ommers_hash: B256,
    pub beneficiary: Address,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub mix_hash: B256,
    pub nonce: B64,
    pub base_fee_per_gas: Option<u64>,
    pub withdrawals_root: Option<B256>,
}

impl Header {
    /// Keccak-256 of the RLP encoding.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub index: u64,
    pub validator_index: u64,
    pub address: Address,
    pub amount: u64,
}

/// Block body as served by `GetBlockBodies`.
///
/// Transactions are kept in their opaque network encoding.
#[derive(Clone, Debug, PartialEq, Eq, Default, RlpEncodable, RlpDecodable)]
#[rlp(trailing)]
pub struct BlockBody {
    pub transactions: Vec<Bytes>,
    pub ommers: Vec<Header>,
    pub withdrawals: Option<Vec<Withdrawal>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, RlpEncodable, RlpDecodable)]
#[rlp(trailing)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Bytes>,
    pub ommers: Vec<Header>,
    pub withdrawals: Option<Vec<Withdrawal>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockValidationError {
    #[error("transactions root mismatch: header {expected}, body {got}")]
    TransactionsRoot { expected: B256, got: B256 },
    #[error("ommers hash mismatch: header {expected}, body {got}")]
    OmmersHash { expected: B256, got: B256 },
    #[error("withdrawals root mismatch: header {expected}, body {got}")]
    WithdrawalsRoot { expected: B256, got: B256 },
    #[error("withdrawals present in body but header has no withdrawals root")]
    UnexpectedWithdrawals,
    #[error("header has a withdrawals root but body has no withdrawals")]
    MissingWithdrawals,
}

impl Block {
    pub fn new(header: Header, body: BlockBody) -> Self {
        Self {
            header,
            transactions: body.transactions,
            ommers: body.ommers,
            withdrawals: body.withdrawals,
        }
    }

    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> B256 {
        self.header.parent_hash
    }

    pub fn body(&self) -> BlockBody {
        BlockBody {
            transactions: self.transactions.clone(),
            ommers: self.ommers.clone(),
            withdrawals: self.withdrawals.clone(),
        }
    }

    /// Checks that the body matches the commitments in the header.
    ///
    /// This is data integrity only: no execution, no consensus rules.
    pub fn validate_data(&self) -> Result<(), BlockValidationError> {
        let transactions_root = transactions_root(&self.transactions);
        if transactions_root != self.header.transactions_root {
            return Err(BlockValidationError::TransactionsRoot {
                expected: self.header.transactions_root,
                got: transactions_root,
            });
        }

        let ommers_hash = ommers_hash(&self.ommers);
        if ommers_hash != self.header.ommers_hash {
            return Err(BlockValidationError::OmmersHash {
                expected: self.header.ommers_hash,
                got: ommers_hash,
            });
        }

        match (&self.header.withdrawals_root, &self.withdrawals) {
            (Some(expected), Some(withdrawals)) => {
                let got = withdrawals_root(withdrawals);
                if got != *expected {
                    return Err(BlockValidationError::WithdrawalsRoot {
                        expected: *expected,
                        got,
                    });
                }
            }
            (Some(_), None) => return Err(BlockValidationError::MissingWithdrawals),
            (None, Some(_)) => return Err(BlockValidationError::UnexpectedWithdrawals),
            (None, None) => {}
        }

        Ok(())
    }

    /// Whether the header commits to data that an empty body cannot satisfy.
    pub fn header_expects_body(header: &Header) -> bool {
        header.transactions_root != EMPTY_ROOT_HASH
            || header.ommers_hash != EMPTY_OMMER_ROOT_HASH
            || header
                .withdrawals_root
                .is_some_and(|root| root != EMPTY_ROOT_HASH)
    }
}

pub fn transactions_root(transactions: &[Bytes]) -> B256 {
    ordered_trie_root_with_encoder(transactions, |tx, buf| buf.extend_from_slice(tx))
}

pub fn withdrawals_root(withdrawals: &[Withdrawal]) -> B256 {
    ordered_trie_root(withdrawals)
}

pub fn ommers_hash(ommers: &[Header]) -> B256 {
    let mut out = Vec::new();
    alloy_rlp::encode_list(ommers, &mut out);
    keccak256(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn empty_header(number: u64) -> Header {
        Header {
            number,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            ..Default::default()
        }
    }

    #[test]
    fn empty_body_roots_match_constants() {
        assert_eq!(transactions_root(&[]), EMPTY_ROOT_HASH);
        assert_eq!(withdrawals_root(&[]), EMPTY_ROOT_HASH);
        assert_eq!(ommers_hash(&[]), EMPTY_OMMER_ROOT_HASH);
    }

    #[test]
    fn ommers_hash_covers_the_list() {
        let ommer = empty_header(3);
        let hash = ommers_hash(std::slice::from_ref(&ommer));

        assert_ne!(hash, EMPTY_OMMER_ROOT_HASH);
        assert_eq!(hash, keccak256(alloy_rlp::encode(vec![ommer])));
    }

    #[test]
    fn hash_changes_with_parent() {
        let a = empty_header(1);
        let mut b = a.clone();
        b.parent_hash = B256::repeat_byte(1);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn block_rlp_roundtrip_keeps_hash() {
        let transactions = vec![Bytes::from_static(b"tx-0"), Bytes::from_static(b"tx-1")];
        let mut header = empty_header(7);
        header.transactions_root = transactions_root(&transactions);
        let block = Block {
            header,
            transactions,
            ..Default::default()
        };

        let encoded = alloy_rlp::encode(&block);
        let decoded: Block = alloy_rlp::Decodable::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn validate_data_accepts_matching_body() {
        let transactions = vec![Bytes::from_static(b"tx")];
        let withdrawals = vec![Withdrawal {
            index: 1,
            validator_index: 2,
            address: Address::repeat_byte(3),
            amount: 4,
        }];
        let mut header = empty_header(1);
        header.transactions_root = transactions_root(&transactions);
        header.withdrawals_root = Some(withdrawals_root(&withdrawals));
        header.base_fee_per_gas = Some(7);

        let block = Block {
            header,
            transactions,
            ommers: vec![],
            withdrawals: Some(withdrawals),
        };
        assert_eq!(block.validate_data(), Ok(()));
        assert!(Block::header_expects_body(&block.header));
    }

    #[test]
    fn validate_data_rejects_foreign_transactions() {
        let block = Block {
            header: empty_header(1),
            transactions: vec![Bytes::from_static(b"smuggled")],
            ..Default::default()
        };
        assert!(matches!(
            block.validate_data(),
            Err(BlockValidationError::TransactionsRoot { .. })
        ));
    }

    #[test]
    fn validate_data_rejects_missing_withdrawals() {
        let mut header = empty_header(1);
        header.base_fee_per_gas = Some(1);
        header.withdrawals_root = Some(EMPTY_ROOT_HASH);
        let block = Block {
            header,
            ..Default::default()
        };
        assert_eq!(
            block.validate_data(),
            Err(BlockValidationError::MissingWithdrawals)
        );
    }
}
