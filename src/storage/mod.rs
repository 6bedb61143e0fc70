//! Repository storage: head pointer, commit ingestion, history traversal and
//! per-commit diff export
//!
//! [`RepoStorage`] is the capability every backend implements. Traversal and
//! export are provided by the trait itself on top of the raw block accessors,
//! so each backend only supplies storage and head management.

mod file;
mod memory;

pub use file::FileBlockstore;
pub use memory::MemoryBlockstore;

use crate::model::{Cid, Commit, RepoMeta, RepoRoot, Shape};
use crate::store::{Block, BlockMap, BlocksAndMissing};
use crate::trie::{DataDiff, MerkleTrie};
use crate::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A commit identifier plus every block it introduces
#[derive(Clone, Debug)]
pub struct CommitData {
    pub commit: Cid,
    pub blocks: BlockMap,
}

impl CommitData {
    pub fn new(commit: Cid, blocks: BlockMap) -> Self {
        CommitData { commit, blocks }
    }
}

/// Whether `update_head` checks its `expected_prev` argument
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeadPolicy {
    /// Trust the caller; `expected_prev` is ignored
    #[default]
    Advisory,
    /// Reject with [`Error::HeadConflict`] when the current head differs
    Enforce,
}

impl HeadPolicy {
    /// Check a proposed head move against the current head
    pub fn check(&self, current: Option<Cid>, expected_prev: Option<Cid>) -> Result<()> {
        match self {
            HeadPolicy::Advisory => Ok(()),
            HeadPolicy::Enforce if current == expected_prev => Ok(()),
            HeadPolicy::Enforce => Err(Error::HeadConflict {
                expected: expected_prev,
                actual: current,
            }),
        }
    }
}

/// Storage contract for a versioned, content-addressed repository
///
/// Writers must be serialized per instance. Reads may interleave with
/// writes, and traversals get no snapshot isolation: a commit applied
/// mid-walk may or may not be observed.
pub trait RepoStorage {
    /// Latest applied commit, `None` for an empty repository
    fn get_head(&self) -> Result<Option<Cid>>;

    /// Raw bytes at `cid`; absence is `Ok(None)`
    fn get_bytes(&self, cid: &Cid) -> Result<Option<Bytes>>;

    fn has(&self, cid: &Cid) -> Result<bool>;

    /// Partitioned lookup of `cids`
    fn get_blocks(&self, cids: &[Cid]) -> Result<BlocksAndMissing>;

    /// Stage a single block without touching the head
    fn put_block(&self, cid: Cid, bytes: Bytes) -> Result<()>;

    /// Stage many blocks without touching the head
    fn put_many(&self, blocks: &BlockMap) -> Result<()>;

    /// Ingest every commit's blocks in order without moving the head
    fn index_commits(&self, commits: &[CommitData]) -> Result<()>;

    /// Point the head at `cid`
    ///
    /// Whether `expected_prev` is checked is up to the backend's
    /// [`HeadPolicy`].
    fn update_head(&self, cid: Cid, expected_prev: Option<Cid>) -> Result<()>;

    /// Store a commit's blocks and move the head to it as one operation
    fn apply_commit(&self, commit: &CommitData) -> Result<()>;

    /// Total stored bytes
    fn size_in_bytes(&self) -> Result<usize>;

    /// Drop every block and reset the head
    fn destroy(&self) -> Result<()>;

    /// Read and validate the object at `cid`
    fn read_obj<T: Shape>(&self, cid: &Cid) -> Result<T>
    where
        Self: Sized,
    {
        self.read_obj_and_bytes(cid).map(|(obj, _)| obj)
    }

    /// Read and validate the object at `cid`, keeping its raw bytes
    fn read_obj_and_bytes<T: Shape>(&self, cid: &Cid) -> Result<(T, Bytes)>
    where
        Self: Sized,
    {
        let not_found = || Error::NotFound {
            shape: T::NAME,
            cid: *cid,
        };
        let bytes = self.get_bytes(cid)?.ok_or_else(not_found)?;
        let value = Block::decode_value(cid, &bytes)?;
        let obj = T::from_value(&value).ok_or_else(not_found)?;
        Ok((obj, bytes))
    }

    /// Commits from just after `earliest` up to and including `latest`,
    /// oldest first
    ///
    /// With `earliest == None` the walk runs back to genesis. Returns
    /// `Ok(None)` when `earliest` is not an ancestor of `latest`. A commit or
    /// root that cannot be read is a hard error.
    fn get_commit_path(&self, latest: Cid, earliest: Option<Cid>) -> Result<Option<Vec<Cid>>>
    where
        Self: Sized,
    {
        let mut current = Some(latest);
        let mut path = Vec::new();

        while let Some(cid) = current {
            path.push(cid);
            let commit: Commit = self.read_obj(&cid)?;
            let root: RepoRoot = self.read_obj(&commit.root)?;
            if root.prev == earliest {
                path.reverse();
                debug!(latest = %latest.short(), len = path.len(), "commit path resolved");
                return Ok(Some(path));
            }
            current = root.prev;
        }

        debug!(latest = %latest.short(), "commit path boundary not reached");
        Ok(None)
    }

    /// Minimal block set for each commit in an oldest-first sequence
    ///
    /// Each commit is diffed against the one before it in `commits`; the
    /// first is diffed against an empty tree. Genesis commits also carry the
    /// repository metadata block.
    fn get_blocks_for_commits(&self, commits: &[Cid]) -> Result<HashMap<Cid, BlockMap>>
    where
        Self: Sized,
    {
        let mut commit_data = HashMap::with_capacity(commits.len());
        let mut prev_data: Option<MerkleTrie<'_, Self>> = None;

        for commit_cid in commits {
            let commit: Commit = self.read_obj(commit_cid)?;
            let root: RepoRoot = self.read_obj(&commit.root)?;
            let data = MerkleTrie::load(self, root.data)?;
            let diff = DataDiff::of(&data, prev_data.as_ref())?;

            let mut wanted = vec![*commit_cid, commit.root];
            wanted.extend(diff.new_cids());
            let BlocksAndMissing {
                mut blocks,
                missing,
            } = self.get_blocks(&wanted)?;
            if !missing.is_empty() {
                warn!(
                    commit = %commit_cid.short(),
                    missing = missing.len(),
                    "cannot export commit, blocks missing locally"
                );
                return Err(Error::MissingCommitBlocks {
                    commit: *commit_cid,
                    missing,
                });
            }

            if root.is_genesis() {
                let meta = root.meta.ok_or_else(|| {
                    Error::Corruption(format!("Genesis root {} has no meta", commit.root))
                })?;
                let (_, bytes) = self.read_obj_and_bytes::<RepoMeta>(&meta)?;
                blocks.set(meta, bytes);
            }

            debug!(
                commit = %commit_cid.short(),
                blocks = blocks.len(),
                bytes = blocks.size_in_bytes(),
                "exported commit blocks"
            );
            commit_data.insert(*commit_cid, blocks);
            prev_data = Some(data);
        }

        Ok(commit_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Codec;

    #[test]
    fn test_advisory_policy_ignores_prev() {
        let a = Cid::for_bytes(Codec::Raw, b"a");
        let b = Cid::for_bytes(Codec::Raw, b"b");
        assert!(HeadPolicy::Advisory.check(Some(a), Some(b)).is_ok());
        assert!(HeadPolicy::Advisory.check(None, Some(b)).is_ok());
    }

    #[test]
    fn test_enforce_policy() {
        let a = Cid::for_bytes(Codec::Raw, b"a");
        let b = Cid::for_bytes(Codec::Raw, b"b");
        assert!(HeadPolicy::Enforce.check(None, None).is_ok());
        assert!(HeadPolicy::Enforce.check(Some(a), Some(a)).is_ok());
        assert!(matches!(
            HeadPolicy::Enforce.check(Some(a), Some(b)),
            Err(Error::HeadConflict { expected, actual })
                if expected == Some(b) && actual == Some(a)
        ));
        assert!(HeadPolicy::Enforce.check(Some(a), None).is_err());
    }

    #[test]
    fn test_root_without_prev_key_is_not_genesis() {
        let storage = MemoryBlockstore::new();
        let mut blocks = BlockMap::new();
        let data = Cid::for_bytes(Codec::DagJson, b"data");
        let root = blocks
            .add(&serde_json::json!({"did": "did:ex:alice", "data": data}))
            .unwrap();
        let commit = blocks.add(&Commit::new(root, b"sig".to_vec())).unwrap();
        storage.put_many(&blocks).unwrap();

        assert!(matches!(
            storage.get_commit_path(commit, None),
            Err(Error::NotFound { shape: "repo root", .. })
        ));
        assert!(matches!(
            storage.get_blocks_for_commits(&[commit]),
            Err(Error::NotFound { shape: "repo root", .. })
        ));
    }
}
