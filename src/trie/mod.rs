//! Merkle trie holding repository data
//!
//! This implements a content-addressed trie where:
//! - Each node's CID is derived from its children's CIDs
//! - Unchanged subtrees share storage across commits
//! - The root CID uniquely identifies the entire data state
//!
//! Storage only depends on two capabilities here: [`MerkleTrie::load`] to
//! open a snapshot and [`DataDiff::of`] to list what a snapshot introduces.

mod diff;
mod node;
mod tree;

pub use diff::{DataDiff, DiffEntry};
pub use node::TrieNode;
pub use tree::MerkleTrie;
