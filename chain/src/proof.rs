//! Merkle range proof verification for snap responses.
//!
//! A response covers `[origin, last key]` of a trie. The proof carries the nodes on the two edge
//! paths. Everything hanging off those paths outside the range is known only by hash, everything
//! inside must come from the returned data. Rebuilding the root from both sides proves the data
//! is complete and gap-free.

use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::Decodable;
use alloy_trie::{
    nodes::{RlpNode, TrieNode},
    proof::ProofRetainer,
    HashBuilder, Nibbles,
};
use containers::trie::unpack_nibbles;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::iter;

use crate::error::ProofError;

pub trait RangeProofVerifier: Send + Sync {
    /// Checks that `keys`/`values` are exactly the trie contents under `root` from `origin` up
    /// to the last key. `values` are the leaf encodings. Returns whether the trie holds more
    /// keys to the right of the range.
    fn verify_range_proof(
        &self,
        root: B256,
        origin: B256,
        keys: &[B256],
        values: &[Bytes],
        proof: &[Bytes],
    ) -> Result<bool, ProofError>;

    /// Same check, also returning the trie nodes the range fully determines. Verifiers that do
    /// not rebuild the trie return none.
    fn verify_range(
        &self,
        root: B256,
        origin: B256,
        keys: &[B256],
        values: &[Bytes],
        proof: &[Bytes],
    ) -> Result<VerifiedRange, ProofError> {
        let has_more = self.verify_range_proof(root, origin, keys, values, proof)?;
        Ok(VerifiedRange {
            has_more,
            nodes: Vec::new(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifiedRange {
    pub has_more: bool,
    /// Nodes whose whole subtree lies inside the proven range.
    pub nodes: Vec<Bytes>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TrieRangeVerifier;

impl RangeProofVerifier for TrieRangeVerifier {
    fn verify_range_proof(
        &self,
        root: B256,
        origin: B256,
        keys: &[B256],
        values: &[Bytes],
        proof: &[Bytes],
    ) -> Result<bool, ProofError> {
        self.verify_range(root, origin, keys, values, proof)
            .map(|range| range.has_more)
    }

    fn verify_range(
        &self,
        root: B256,
        origin: B256,
        keys: &[B256],
        values: &[Bytes],
        proof: &[Bytes],
    ) -> Result<VerifiedRange, ProofError> {
        if keys.len() != values.len() {
            return Err(ProofError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ProofError::NotMonotonic);
        }
        if keys.first().is_some_and(|first| *first < origin) {
            return Err(ProofError::BelowOrigin);
        }
        if values.iter().any(|value| value.is_empty()) {
            return Err(ProofError::EmptyValue);
        }

        let mut entries: Vec<Entry> = keys
            .iter()
            .zip(values)
            .map(|(key, value)| Entry::Leaf(unpack_nibbles(key.as_slice()), value.to_vec()))
            .collect();

        let targets: Vec<Nibbles> = keys.iter().map(Nibbles::unpack).collect();
        let left = unpack_nibbles(origin.as_slice());

        // No proof: the data is the whole trie.
        if proof.is_empty() {
            let built = check_root(root, entries, targets)?;
            return Ok(VerifiedRange {
                has_more: false,
                nodes: proven_nodes(built, &left, None),
            });
        }

        let nodes: HashMap<B256, &Bytes> = proof.iter().map(|node| (keccak256(node), node)).collect();
        let right = keys
            .last()
            .map(|key| unpack_nibbles(key.as_slice()))
            .unwrap_or_else(|| left.clone());

        let root_node = nodes
            .get(&root)
            .ok_or_else(|| ProofError::Malformed("root node missing from proof".into()))?;

        let mut walk = EdgeWalk {
            nodes: &nodes,
            left: &left,
            right: &right,
            outside: Vec::new(),
            has_more: false,
        };
        walk.visit(TrieNode::decode(&mut &root_node[..])?, Vec::new())?;

        if keys.is_empty() && walk.has_more {
            return Err(ProofError::Malformed(
                "no keys returned but more are available on the trie".into(),
            ));
        }

        let has_more = walk.has_more;
        entries.extend(walk.outside);
        let built = check_root(root, entries, targets)?;
        let bound = has_more.then_some(right.as_slice());
        Ok(VerifiedRange {
            has_more,
            nodes: proven_nodes(built, &left, bound),
        })
    }
}

enum Entry {
    Leaf(Vec<u8>, Vec<u8>),
    Subtree(Vec<u8>, B256),
}

impl Entry {
    fn path(&self) -> &[u8] {
        match self {
            Entry::Leaf(path, _) | Entry::Subtree(path, _) => path,
        }
    }
}

/// Rebuild the trie from `entries` and compare its root. Returns the built nodes on the paths
/// to `targets`, keyed by path.
fn check_root(
    root: B256,
    mut entries: Vec<Entry>,
    targets: Vec<Nibbles>,
) -> Result<Vec<(Vec<u8>, Bytes)>, ProofError> {
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let mut builder =
        HashBuilder::default().with_proof_retainer(ProofRetainer::from_iter(targets));
    for entry in &entries {
        match entry {
            Entry::Leaf(path, value) => builder.add_leaf(Nibbles::from_nibbles(path), value),
            Entry::Subtree(path, hash) => builder.add_branch(Nibbles::from_nibbles(path), *hash, false),
        }
    }

    let got = builder.root();
    if got != root {
        return Err(ProofError::RootMismatch {
            expected: root,
            got,
        });
    }
    Ok(builder
        .take_proof_nodes()
        .into_inner()
        .into_iter()
        .map(|(path, node)| (path.to_vec(), node))
        .collect())
}

/// Keep the nodes every key of which lies in `[left, right]`. Without `right` the range is
/// known to run to the end of the trie.
fn proven_nodes(built: Vec<(Vec<u8>, Bytes)>, left: &[u8], right: Option<&[u8]>) -> Vec<Bytes> {
    built
        .into_iter()
        .filter(|(path, _)| {
            let lowest: Vec<u8> = path.iter().copied().chain(iter::repeat(0)).take(64).collect();
            let highest: Vec<u8> = path.iter().copied().chain(iter::repeat(0xf)).take(64).collect();
            lowest.as_slice() >= left && right.map_or(true, |right| highest.as_slice() <= right)
        })
        .map(|(_, node)| node)
        .collect()
}

enum Position {
    Left,
    Right,
    Inside,
    Edge,
}

/// Walks the edge paths of a proof and collects everything outside the range.
struct EdgeWalk<'a> {
    nodes: &'a HashMap<B256, &'a Bytes>,
    left: &'a [u8],
    right: &'a [u8],
    outside: Vec<Entry>,
    has_more: bool,
}

impl EdgeWalk<'_> {
    fn position(&self, path: &[u8]) -> Position {
        let to_left = cmp_prefix(path, self.left);
        let to_right = cmp_prefix(path, self.right);
        if to_left == Ordering::Equal || to_right == Ordering::Equal {
            Position::Edge
        } else if to_left == Ordering::Less {
            Position::Left
        } else if to_right == Ordering::Greater {
            Position::Right
        } else {
            Position::Inside
        }
    }

    fn visit(&mut self, node: TrieNode, path: Vec<u8>) -> Result<(), ProofError> {
        match node {
            TrieNode::EmptyRoot => {}
            TrieNode::Branch(branch) => {
                let mut children = branch.stack.iter();
                for index in 0..16u8 {
                    if !branch.state_mask.is_bit_set(index) {
                        continue;
                    }
                    let child = children.next().ok_or_else(|| {
                        ProofError::Malformed("branch stack shorter than its mask".into())
                    })?;
                    let mut child_path = path.clone();
                    child_path.push(index);
                    self.visit_child(child, child_path)?;
                }
            }
            TrieNode::Extension(extension) => {
                let mut child_path = path;
                child_path.extend(extension.key.to_vec());
                self.visit_child(&extension.child, child_path)?;
            }
            TrieNode::Leaf(leaf) => {
                let mut key = path;
                key.extend(leaf.key.to_vec());
                match (cmp_prefix(&key, self.left), cmp_prefix(&key, self.right)) {
                    (Ordering::Less, _) => self.outside.push(Entry::Leaf(key, leaf.value)),
                    (_, Ordering::Greater) => {
                        self.has_more = true;
                        self.outside.push(Entry::Leaf(key, leaf.value));
                    }
                    // in range: supplied by the response data
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn visit_child(&mut self, child: &RlpNode, path: Vec<u8>) -> Result<(), ProofError> {
        match self.position(&path) {
            Position::Inside => Ok(()),
            Position::Edge => {
                let node = match child.as_hash() {
                    Some(hash) => {
                        let encoded = self
                            .nodes
                            .get(&hash)
                            .ok_or_else(|| ProofError::Malformed("proof node missing".into()))?;
                        TrieNode::decode(&mut &encoded[..])?
                    }
                    None => TrieNode::decode(&mut &child[..])?,
                };
                self.visit(node, path)
            }
            position => {
                if matches!(position, Position::Right) {
                    self.has_more = true;
                }
                match child.as_hash() {
                    Some(hash) => {
                        self.outside.push(Entry::Subtree(path, hash));
                        Ok(())
                    }
                    None => self.collect_inline(TrieNode::decode(&mut &child[..])?, path),
                }
            }
        }
    }

    /// Inline nodes have no hash of their own; their contents are added directly.
    fn collect_inline(&mut self, node: TrieNode, path: Vec<u8>) -> Result<(), ProofError> {
        match node {
            TrieNode::EmptyRoot => {}
            TrieNode::Leaf(leaf) => {
                let mut key = path;
                key.extend(leaf.key.to_vec());
                self.outside.push(Entry::Leaf(key, leaf.value));
            }
            TrieNode::Extension(extension) => {
                let mut child_path = path;
                child_path.extend(extension.key.to_vec());
                self.collect_child(&extension.child, child_path)?;
            }
            TrieNode::Branch(branch) => {
                let mut children = branch.stack.iter();
                for index in 0..16u8 {
                    if !branch.state_mask.is_bit_set(index) {
                        continue;
                    }
                    let child = children.next().ok_or_else(|| {
                        ProofError::Malformed("branch stack shorter than its mask".into())
                    })?;
                    let mut child_path = path.clone();
                    child_path.push(index);
                    self.collect_child(child, child_path)?;
                }
            }
        }
        Ok(())
    }

    fn collect_child(&mut self, child: &RlpNode, path: Vec<u8>) -> Result<(), ProofError> {
        match child.as_hash() {
            Some(hash) => {
                self.outside.push(Entry::Subtree(path, hash));
                Ok(())
            }
            None => self.collect_inline(TrieNode::decode(&mut &child[..])?, path),
        }
    }
}

/// Lexicographic comparison that treats a prefix as equal.
fn cmp_prefix(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.cmp(y))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}
