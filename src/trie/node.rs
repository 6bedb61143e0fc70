//! Trie node types

use crate::model::{Cid, Shape};
use crate::store::Block;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node in the merkle trie
///
/// We use a radix trie structure where:
/// - Keys are arbitrary byte strings (record paths)
/// - Values are record CIDs (for leaves) or child node CIDs (for branches)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrieNode {
    /// A branch node with children indexed by key prefix
    Branch {
        /// Prefix bytes shared by all children
        prefix: Vec<u8>,
        /// Children indexed by the next byte after prefix
        children: BTreeMap<u8, Cid>,
        /// Optional value if this exact key exists
        value: Option<Cid>,
    },
    /// A leaf node with a value
    Leaf {
        /// Remaining key suffix
        key_suffix: Vec<u8>,
        /// The record CID
        value: Cid,
    },
    /// An empty node
    Empty,
}

impl TrieNode {
    /// Create an empty node
    pub fn empty() -> Self {
        TrieNode::Empty
    }

    /// Create a leaf node
    pub fn leaf(key_suffix: Vec<u8>, value: Cid) -> Self {
        TrieNode::Leaf { key_suffix, value }
    }

    /// Compute the CID this node is stored under
    pub fn cid(&self) -> Result<Cid> {
        Ok(Block::encode(self)?.cid)
    }

    /// Check if this node is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, TrieNode::Empty)
    }

    /// Get the value at this exact node (if any)
    pub fn value(&self) -> Option<Cid> {
        match self {
            TrieNode::Leaf { value, .. } => Some(*value),
            TrieNode::Branch { value, .. } => *value,
            TrieNode::Empty => None,
        }
    }

    /// CIDs of child nodes
    pub fn children(&self) -> impl DoubleEndedIterator<Item = &Cid> {
        let children = match self {
            TrieNode::Branch { children, .. } => Some(children.values()),
            _ => None,
        };
        children.into_iter().flatten()
    }
}

impl Default for TrieNode {
    fn default() -> Self {
        TrieNode::Empty
    }
}

impl Shape for TrieNode {
    const NAME: &'static str = "trie node";
}
