//! In-memory repository storage
//!
//! The default backend for ephemeral repositories and tests.

use super::{CommitData, HeadPolicy, RepoStorage};
use crate::model::Cid;
use crate::store::{BlockMap, BlocksAndMissing, Blockstore};
use crate::{Error, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

/// A [`RepoStorage`] holding every block in a [`BlockMap`]
#[derive(Debug, Default)]
pub struct MemoryBlockstore {
    blocks: RwLock<BlockMap>,
    head: RwLock<Option<Cid>>,
    policy: HeadPolicy,
}

impl MemoryBlockstore {
    /// Create an empty store with an advisory head policy
    pub fn new() -> Self {
        MemoryBlockstore::default()
    }

    /// Create a store seeded with `blocks`
    pub fn with_blocks(blocks: &BlockMap) -> Self {
        let store = MemoryBlockstore::new();
        store.blocks.write().add_map(blocks);
        store
    }

    /// Set the head update policy
    pub fn with_policy(mut self, policy: HeadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> HeadPolicy {
        self.policy
    }

    /// Number of stored blocks
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }
}

impl RepoStorage for MemoryBlockstore {
    fn get_head(&self) -> Result<Option<Cid>> {
        Ok(*self.head.read())
    }

    fn get_bytes(&self, cid: &Cid) -> Result<Option<Bytes>> {
        Ok(self.blocks.read().get(cid).cloned())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blocks.read().has(cid))
    }

    fn get_blocks(&self, cids: &[Cid]) -> Result<BlocksAndMissing> {
        Ok(self.blocks.read().get_many(cids))
    }

    fn put_block(&self, cid: Cid, bytes: Bytes) -> Result<()> {
        self.blocks.write().set(cid, bytes);
        Ok(())
    }

    fn put_many(&self, blocks: &BlockMap) -> Result<()> {
        self.blocks.write().add_map(blocks);
        Ok(())
    }

    fn index_commits(&self, commits: &[CommitData]) -> Result<()> {
        let mut blocks = self.blocks.write();
        for commit in commits {
            blocks.add_map(&commit.blocks);
        }
        debug!(commits = commits.len(), "indexed commits");
        Ok(())
    }

    fn update_head(&self, cid: Cid, expected_prev: Option<Cid>) -> Result<()> {
        let mut head = self.head.write();
        self.policy.check(*head, expected_prev)?;
        *head = Some(cid);
        debug!(head = %cid.short(), "head updated");
        Ok(())
    }

    fn apply_commit(&self, commit: &CommitData) -> Result<()> {
        let mut blocks = self.blocks.write();
        let mut head = self.head.write();
        blocks.add_map(&commit.blocks);
        *head = Some(commit.commit);
        debug!(
            commit = %commit.commit.short(),
            blocks = commit.blocks.len(),
            "applied commit"
        );
        Ok(())
    }

    fn size_in_bytes(&self) -> Result<usize> {
        Ok(self.blocks.read().size_in_bytes())
    }

    fn destroy(&self) -> Result<()> {
        self.blocks.write().clear();
        *self.head.write() = None;
        Ok(())
    }
}

impl Blockstore for MemoryBlockstore {
    fn get(&self, cid: &Cid) -> Result<Bytes> {
        self.get_bytes(cid)?.ok_or(Error::BlockNotFound(*cid))
    }

    fn put(&self, cid: Cid, bytes: Bytes) -> Result<()> {
        self.put_block(cid, bytes)
    }
}
