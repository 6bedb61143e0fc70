//! Merkle trie over repository storage

use super::TrieNode;
use crate::model::Cid;
use crate::storage::RepoStorage;
use crate::store::Block;
use crate::Result;
use std::collections::{BTreeMap, HashSet};

/// A merkle trie mapping record keys to record CIDs
///
/// Nodes are canonical blocks written straight into the backing storage, so
/// unchanged subtrees share identifiers across versions.
pub struct MerkleTrie<'a, S> {
    store: &'a S,
    /// Root node (cached in memory)
    root: TrieNode,
}

impl<'a, S: RepoStorage> MerkleTrie<'a, S> {
    /// Create a new empty trie
    pub fn new(store: &'a S) -> Self {
        MerkleTrie {
            store,
            root: TrieNode::empty(),
        }
    }

    /// Load a trie snapshot from its root CID
    pub fn load(store: &'a S, root: Cid) -> Result<Self> {
        let root = store.read_obj::<TrieNode>(&root)?;
        Ok(MerkleTrie { store, root })
    }

    /// CID of the current root
    pub fn root_cid(&self) -> Result<Cid> {
        self.root.cid()
    }

    /// Insert a key-value pair
    pub fn insert(&mut self, key: &[u8], value: Cid) -> Result<()> {
        self.root = self.insert_recursive(&self.root, key, value)?;
        Ok(())
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Cid>> {
        self.get_recursive(&self.root, key)
    }

    /// Remove a key
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<Cid>> {
        let (new_root, removed) = self.remove_recursive(&self.root, key)?;
        self.root = new_root;
        Ok(removed)
    }

    /// Persist the root to the store and return its CID
    pub fn commit(&self) -> Result<Cid> {
        self.persist_node(&self.root)
    }

    /// List all keys with a given prefix
    pub fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Cid)>> {
        let mut results = Vec::new();
        self.collect_prefix(&self.root, prefix, Vec::new(), &mut results)?;
        Ok(results)
    }

    /// Every key-value pair, keyed for lookup
    pub fn entries(&self) -> Result<BTreeMap<Vec<u8>, Cid>> {
        Ok(self.list_prefix(b"")?.into_iter().collect())
    }

    /// CIDs of every node reachable from the root, root first
    pub fn node_cids(&self) -> Result<Vec<Cid>> {
        self.nodes_excluding(&HashSet::new())
    }

    /// CIDs of reachable nodes not in `known`
    ///
    /// A known node's subtree is not descended: identical CIDs imply
    /// identical subtrees.
    pub fn nodes_excluding(&self, known: &HashSet<Cid>) -> Result<Vec<Cid>> {
        let root_cid = self.root_cid()?;
        let mut out = Vec::new();
        if known.contains(&root_cid) {
            return Ok(out);
        }

        let mut seen = HashSet::new();
        seen.insert(root_cid);
        out.push(root_cid);

        let mut stack: Vec<Cid> = self.root.children().rev().copied().collect();
        while let Some(cid) = stack.pop() {
            if known.contains(&cid) || !seen.insert(cid) {
                continue;
            }
            out.push(cid);
            let node = self.load_node(&cid)?;
            stack.extend(node.children().rev().copied());
        }
        Ok(out)
    }

    // === Internal helpers ===

    fn load_node(&self, cid: &Cid) -> Result<TrieNode> {
        self.store.read_obj(cid)
    }

    fn persist_node(&self, node: &TrieNode) -> Result<Cid> {
        let block = Block::encode(node)?;
        self.store.put_block(block.cid, block.bytes)?;
        Ok(block.cid)
    }

    fn insert_recursive(&self, node: &TrieNode, remaining: &[u8], value: Cid) -> Result<TrieNode> {
        match node {
            TrieNode::Empty => Ok(TrieNode::leaf(remaining.to_vec(), value)),
            TrieNode::Leaf {
                key_suffix,
                value: existing_value,
            } => {
                if key_suffix == remaining {
                    // Same key, update value
                    return Ok(TrieNode::leaf(remaining.to_vec(), value));
                }

                // Split into a branch at the common prefix
                let common_len = common_prefix_len(remaining, key_suffix);
                let mut children = BTreeMap::new();

                if common_len < key_suffix.len() {
                    let existing =
                        TrieNode::leaf(key_suffix[common_len + 1..].to_vec(), *existing_value);
                    children.insert(key_suffix[common_len], self.persist_node(&existing)?);
                }

                if common_len < remaining.len() {
                    let new_leaf = TrieNode::leaf(remaining[common_len + 1..].to_vec(), value);
                    children.insert(remaining[common_len], self.persist_node(&new_leaf)?);
                }

                // One key may be a prefix of the other
                let branch_value = if common_len == remaining.len() {
                    Some(value)
                } else if common_len == key_suffix.len() {
                    Some(*existing_value)
                } else {
                    None
                };

                Ok(TrieNode::Branch {
                    prefix: remaining[..common_len].to_vec(),
                    children,
                    value: branch_value,
                })
            }
            TrieNode::Branch {
                prefix,
                children,
                value: branch_value,
            } => {
                let common_len = common_prefix_len(remaining, prefix);

                if common_len < prefix.len() {
                    // Split the branch: old subtree moves under its next byte
                    let old_branch = TrieNode::Branch {
                        prefix: prefix[common_len + 1..].to_vec(),
                        children: children.clone(),
                        value: *branch_value,
                    };
                    let mut new_children = BTreeMap::new();
                    new_children.insert(prefix[common_len], self.persist_node(&old_branch)?);

                    let new_value = if common_len == remaining.len() {
                        Some(value)
                    } else {
                        let new_leaf = TrieNode::leaf(remaining[common_len + 1..].to_vec(), value);
                        new_children.insert(remaining[common_len], self.persist_node(&new_leaf)?);
                        None
                    };

                    return Ok(TrieNode::Branch {
                        prefix: remaining[..common_len].to_vec(),
                        children: new_children,
                        value: new_value,
                    });
                }

                let after_prefix = &remaining[prefix.len()..];
                if after_prefix.is_empty() {
                    return Ok(TrieNode::Branch {
                        prefix: prefix.clone(),
                        children: children.clone(),
                        value: Some(value),
                    });
                }

                let next_byte = after_prefix[0];
                let child = match children.get(&next_byte) {
                    Some(child_cid) => self.load_node(child_cid)?,
                    None => TrieNode::Empty,
                };
                let new_child = self.insert_recursive(&child, &after_prefix[1..], value)?;
                let mut new_children = children.clone();
                new_children.insert(next_byte, self.persist_node(&new_child)?);

                Ok(TrieNode::Branch {
                    prefix: prefix.clone(),
                    children: new_children,
                    value: *branch_value,
                })
            }
        }
    }

    fn get_recursive(&self, node: &TrieNode, remaining: &[u8]) -> Result<Option<Cid>> {
        match node {
            TrieNode::Empty => Ok(None),
            TrieNode::Leaf { key_suffix, value } => {
                Ok((key_suffix.as_slice() == remaining).then_some(*value))
            }
            TrieNode::Branch {
                prefix,
                children,
                value,
            } => {
                let Some(after_prefix) = remaining.strip_prefix(prefix.as_slice()) else {
                    return Ok(None);
                };
                let Some((next_byte, rest)) = after_prefix.split_first() else {
                    return Ok(*value);
                };
                match children.get(next_byte) {
                    Some(child_cid) => {
                        let child = self.load_node(child_cid)?;
                        self.get_recursive(&child, rest)
                    }
                    None => Ok(None),
                }
            }
        }
    }

    fn remove_recursive(
        &self,
        node: &TrieNode,
        remaining: &[u8],
    ) -> Result<(TrieNode, Option<Cid>)> {
        match node {
            TrieNode::Empty => Ok((TrieNode::Empty, None)),
            TrieNode::Leaf { key_suffix, value } => {
                if key_suffix == remaining {
                    Ok((TrieNode::Empty, Some(*value)))
                } else {
                    Ok((node.clone(), None))
                }
            }
            TrieNode::Branch {
                prefix,
                children,
                value,
            } => {
                let Some(after_prefix) = remaining.strip_prefix(prefix.as_slice()) else {
                    return Ok((node.clone(), None));
                };

                let Some((next_byte, rest)) = after_prefix.split_first() else {
                    // Remove value at this branch
                    if children.is_empty() {
                        return Ok((TrieNode::Empty, *value));
                    }
                    let branch = TrieNode::Branch {
                        prefix: prefix.clone(),
                        children: children.clone(),
                        value: None,
                    };
                    return Ok((branch, *value));
                };

                let Some(child_cid) = children.get(next_byte) else {
                    return Ok((node.clone(), None));
                };
                let child = self.load_node(child_cid)?;
                let (new_child, removed) = self.remove_recursive(&child, rest)?;
                if removed.is_none() {
                    return Ok((node.clone(), None));
                }

                let mut new_children = children.clone();
                if new_child.is_empty() {
                    new_children.remove(next_byte);
                } else {
                    new_children.insert(*next_byte, self.persist_node(&new_child)?);
                }

                if new_children.is_empty() && value.is_none() {
                    return Ok((TrieNode::Empty, removed));
                }

                let branch = TrieNode::Branch {
                    prefix: prefix.clone(),
                    children: new_children,
                    value: *value,
                };
                Ok((branch, removed))
            }
        }
    }

    fn collect_prefix(
        &self,
        node: &TrieNode,
        prefix: &[u8],
        current_key: Vec<u8>,
        results: &mut Vec<(Vec<u8>, Cid)>,
    ) -> Result<()> {
        match node {
            TrieNode::Empty => {}
            TrieNode::Leaf { key_suffix, value } => {
                let mut full_key = current_key;
                full_key.extend(key_suffix);
                if full_key.starts_with(prefix) {
                    results.push((full_key, *value));
                }
            }
            TrieNode::Branch {
                prefix: node_prefix,
                children,
                value,
            } => {
                let mut current = current_key;
                current.extend(node_prefix);

                if let Some(v) = value {
                    if current.starts_with(prefix) {
                        results.push((current.clone(), *v));
                    }
                }

                // Only recurse if we're still matching the prefix
                if current.starts_with(prefix) || prefix.starts_with(&current) {
                    for (byte, child_cid) in children {
                        let mut child_key = current.clone();
                        child_key.push(*byte);

                        let child = self.load_node(child_cid)?;
                        self.collect_prefix(&child, prefix, child_key, results)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Find the length of the common prefix between two byte slices
fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
