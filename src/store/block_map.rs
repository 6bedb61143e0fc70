//! In-memory collection of content-addressed blocks

use super::Block;
use crate::model::Cid;
use crate::Result;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;

/// Blocks keyed by identifier
///
/// Pure data structure: no I/O and no failure modes. Absence is always
/// reported structurally.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockMap {
    map: HashMap<Cid, Bytes>,
}

/// Result of a partitioned lookup
///
/// `blocks` and `missing` together cover the request exactly once.
#[derive(Clone, Debug, Default)]
pub struct BlocksAndMissing {
    pub blocks: BlockMap,
    pub missing: Vec<Cid>,
}

impl BlockMap {
    pub fn new() -> Self {
        BlockMap::default()
    }

    /// Canonically encode `value`, insert it and return its identifier
    pub fn add<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<Cid> {
        let block = Block::encode(value)?;
        let cid = block.cid;
        self.insert(block);
        Ok(cid)
    }

    pub fn insert(&mut self, block: Block) {
        self.map.insert(block.cid, block.bytes);
    }

    pub fn set(&mut self, cid: Cid, bytes: impl Into<Bytes>) {
        self.map.insert(cid, bytes.into());
    }

    pub fn get(&self, cid: &Cid) -> Option<&Bytes> {
        self.map.get(cid)
    }

    pub fn has(&self, cid: &Cid) -> bool {
        self.map.contains_key(cid)
    }

    pub fn delete(&mut self, cid: &Cid) -> Option<Bytes> {
        self.map.remove(cid)
    }

    /// Merge `other` in; its values win on collision
    pub fn add_map(&mut self, other: &BlockMap) {
        for (cid, bytes) in &other.map {
            self.map.insert(*cid, bytes.clone());
        }
    }

    /// Partition `cids` into present blocks and absent identifiers
    ///
    /// Duplicate requests are reported once.
    pub fn get_many<'a>(&self, cids: impl IntoIterator<Item = &'a Cid>) -> BlocksAndMissing {
        let mut result = BlocksAndMissing::default();
        for cid in cids {
            match self.map.get(cid) {
                Some(bytes) => result.blocks.set(*cid, bytes.clone()),
                None => {
                    if !result.missing.contains(cid) {
                        result.missing.push(*cid);
                    }
                }
            }
        }
        result
    }

    pub fn for_each(&self, mut f: impl FnMut(&Cid, &Bytes)) {
        for (cid, bytes) in &self.map {
            f(cid, bytes);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Cid, &Bytes)> {
        self.map.iter()
    }

    pub fn cids(&self) -> Vec<Cid> {
        self.map.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of stored byte lengths
    pub fn size_in_bytes(&self) -> usize {
        self.map.values().map(|bytes| bytes.len()).sum()
    }
}

impl FromIterator<Block> for BlockMap {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        let mut map = BlockMap::new();
        for block in iter {
            map.insert(block);
        }
        map
    }
}

impl IntoIterator for BlockMap {
    type Item = (Cid, Bytes);
    type IntoIter = std::collections::hash_map::IntoIter<Cid, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_iter()
    }
}
