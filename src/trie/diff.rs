//! Diff between two trie snapshots

use super::MerkleTrie;
use crate::model::Cid;
use crate::storage::RepoStorage;
use crate::Result;
use std::collections::{BTreeMap, HashSet};

/// Type of change in a diff
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffEntry {
    /// Key was added
    Added { key: Vec<u8>, new_cid: Cid },
    /// Key was removed
    Removed { key: Vec<u8>, old_cid: Cid },
    /// Key was modified
    Modified {
        key: Vec<u8>,
        old_cid: Cid,
        new_cid: Cid,
    },
}

impl DiffEntry {
    pub fn key(&self) -> &[u8] {
        match self {
            DiffEntry::Added { key, .. } => key,
            DiffEntry::Removed { key, .. } => key,
            DiffEntry::Modified { key, .. } => key,
        }
    }

    /// Value introduced by this change, if any
    pub fn new_cid(&self) -> Option<Cid> {
        match self {
            DiffEntry::Added { new_cid, .. } | DiffEntry::Modified { new_cid, .. } => {
                Some(*new_cid)
            }
            DiffEntry::Removed { .. } => None,
        }
    }
}

/// Changes from an old snapshot (or nothing) to a new one
#[derive(Clone, Debug, Default)]
pub struct DataDiff {
    /// Key-level changes, sorted by key
    pub entries: Vec<DiffEntry>,
    /// Trie nodes reachable from the new root but absent from the old tree
    new_nodes: Vec<Cid>,
}

impl DataDiff {
    /// Diff `new` against `old`; with no old snapshot everything is new
    pub fn of<S: RepoStorage>(
        new: &MerkleTrie<'_, S>,
        old: Option<&MerkleTrie<'_, S>>,
    ) -> Result<Self> {
        let (old_nodes, old_entries): (HashSet<Cid>, BTreeMap<Vec<u8>, Cid>) = match old {
            Some(old) => (old.node_cids()?.into_iter().collect(), old.entries()?),
            None => (HashSet::new(), BTreeMap::new()),
        };

        let new_nodes = new.nodes_excluding(&old_nodes)?;
        let new_entries = new.entries()?;

        let mut entries = Vec::new();
        for (key, &new_cid) in &new_entries {
            match old_entries.get(key) {
                None => entries.push(DiffEntry::Added {
                    key: key.clone(),
                    new_cid,
                }),
                Some(&old_cid) if old_cid != new_cid => entries.push(DiffEntry::Modified {
                    key: key.clone(),
                    old_cid,
                    new_cid,
                }),
                Some(_) => {} // Unchanged
            }
        }
        for (key, &old_cid) in &old_entries {
            if !new_entries.contains_key(key) {
                entries.push(DiffEntry::Removed {
                    key: key.clone(),
                    old_cid,
                });
            }
        }

        // Sort entries for determinism
        entries.sort_by(|a, b| a.key().cmp(b.key()));

        Ok(DataDiff { entries, new_nodes })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.new_nodes.is_empty()
    }

    pub fn adds(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Added { .. }))
    }

    pub fn updates(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Modified { .. }))
    }

    pub fn deletes(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Removed { .. }))
    }

    /// Trie nodes introduced by the new snapshot
    pub fn new_nodes(&self) -> &[Cid] {
        &self.new_nodes
    }

    /// Every identifier the new snapshot introduces: new trie nodes first,
    /// then added or modified record values, without duplicates
    pub fn new_cids(&self) -> Vec<Cid> {
        let mut seen = HashSet::new();
        self.new_nodes
            .iter()
            .copied()
            .chain(self.entries.iter().filter_map(DiffEntry::new_cid))
            .filter(|cid| seen.insert(*cid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Codec;
    use crate::storage::MemoryBlockstore;

    fn record(data: &[u8]) -> Cid {
        Cid::for_bytes(Codec::DagJson, data)
    }

    #[test]
    fn test_diff_against_nothing() {
        let store = MemoryBlockstore::new();
        let mut trie = MerkleTrie::new(&store);
        trie.insert(b"posts/1", record(b"p1")).unwrap();
        trie.insert(b"posts/2", record(b"p2")).unwrap();
        let root = trie.commit().unwrap();
        let loaded = MerkleTrie::load(&store, root).unwrap();

        let diff = DataDiff::of(&loaded, None).unwrap();

        assert_eq!(diff.adds().count(), 2);
        assert_eq!(diff.new_nodes(), loaded.node_cids().unwrap().as_slice());
        let cids = diff.new_cids();
        assert_eq!(cids[0], root);
        assert!(cids.contains(&record(b"p1")));
        assert!(cids.contains(&record(b"p2")));
    }

    #[test]
    fn test_diff_modification() {
        let store = MemoryBlockstore::new();
        let mut trie = MerkleTrie::new(&store);
        trie.insert(b"posts/1", record(b"p1")).unwrap();
        trie.insert(b"posts/2", record(b"p2")).unwrap();
        let root1 = trie.commit().unwrap();

        trie.insert(b"posts/2", record(b"p2-edited")).unwrap();
        trie.insert(b"posts/3", record(b"p3")).unwrap();
        trie.remove(b"posts/1").unwrap();
        let root2 = trie.commit().unwrap();

        let old = MerkleTrie::load(&store, root1).unwrap();
        let new = MerkleTrie::load(&store, root2).unwrap();
        let diff = DataDiff::of(&new, Some(&old)).unwrap();

        assert_eq!(diff.adds().count(), 1);
        assert_eq!(diff.updates().count(), 1);
        assert_eq!(diff.deletes().count(), 1);

        let cids = diff.new_cids();
        assert!(cids.contains(&record(b"p2-edited")));
        assert!(cids.contains(&record(b"p3")));
        assert!(!cids.contains(&record(b"p1")));
        assert!(!cids.contains(&record(b"p2")));
    }

    #[test]
    fn test_diff_same_trees() {
        let store = MemoryBlockstore::new();
        let mut trie = MerkleTrie::new(&store);
        trie.insert(b"posts/1", record(b"p1")).unwrap();
        let root = trie.commit().unwrap();

        let a = MerkleTrie::load(&store, root).unwrap();
        let b = MerkleTrie::load(&store, root).unwrap();
        let diff = DataDiff::of(&a, Some(&b)).unwrap();

        assert!(diff.is_empty());
        assert!(diff.new_cids().is_empty());
    }
}
