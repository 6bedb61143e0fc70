//! # repo_store
//!
//! Block storage for content-addressed, version-controlled repositories.
//!
//! Every object is stored under a CID derived from its canonical bytes.
//! Commits point at repo roots, roots point at the previous commit and at a
//! merkle trie of repository data, so history is a linked list over hashes
//! and two versions can be diffed by comparing node identifiers.
//!
//! ## Core Concepts
//!
//! - **Blocks**: `(cid, bytes)` pairs, immutable once written
//! - **BlockMap**: in-memory block collections with partitioned lookup
//! - **RepoStorage**: head pointer, commit ingestion, history traversal and
//!   per-commit diff export for replication
//! - **Backends**: [`MemoryBlockstore`] (ephemeral) and [`FileBlockstore`]
//!   (single append-only file)
//!
//! ## Example
//!
//! ```ignore
//! use repo_store::{MemoryBlockstore, RepoStorage};
//!
//! let storage = MemoryBlockstore::new();
//! storage.apply_commit(&commit_data)?;
//! let path = storage.get_commit_path(head, None)?;
//! let export = storage.get_blocks_for_commits(&path.unwrap_or_default())?;
//! ```

pub mod config;
pub mod model;
pub mod storage;
pub mod store;
pub mod trie;

mod error;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use model::{Cid, Codec, Commit, RepoMeta, RepoRoot, Shape, SignedRoot, User};
pub use storage::{CommitData, FileBlockstore, HeadPolicy, MemoryBlockstore, RepoStorage};
pub use store::{Block, BlockMap, BlocksAndMissing, Blockstore, ContentAddressedStore};
pub use trie::{DataDiff, DiffEntry, MerkleTrie};

/// Store format and repository metadata version
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"REPOBLKS";
