//! Commit chain objects: commits, repo roots and repo metadata

use super::shape::{hex_bytes, nullable, Shape};
use super::Cid;
use serde::{Deserialize, Serialize};

/// A signed pointer to a repo root
///
/// Commits form a linked list through their roots: each root names the
/// previous commit, so history is walked newest to oldest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Commit {
    /// Identifier of the [`RepoRoot`] this commit signs
    pub root: Cid,

    /// Issuer signature over `root`
    #[serde(with = "hex_bytes")]
    pub sig: Vec<u8>,
}

impl Commit {
    pub fn new(root: Cid, sig: impl Into<Vec<u8>>) -> Self {
        Commit {
            root,
            sig: sig.into(),
        }
    }
}

impl Shape for Commit {
    const NAME: &'static str = "commit";
}

/// Repository state at one commit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoRoot {
    /// Owner of the repository
    pub did: String,

    /// Previous commit, `None` only at genesis
    #[serde(deserialize_with = "nullable::deserialize")]
    pub prev: Option<Cid>,

    /// Repository metadata, attached only at genesis
    #[serde(deserialize_with = "nullable::deserialize")]
    pub meta: Option<Cid>,

    /// Root of the data tree
    pub data: Cid,
}

impl RepoRoot {
    /// Create the genesis root
    pub fn genesis(did: impl Into<String>, meta: Cid, data: Cid) -> Self {
        RepoRoot {
            did: did.into(),
            prev: None,
            meta: Some(meta),
            data,
        }
    }

    /// Create a root following `prev`
    pub fn child(did: impl Into<String>, prev: Cid, data: Cid) -> Self {
        RepoRoot {
            did: did.into(),
            prev: Some(prev),
            meta: None,
            data,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.prev.is_none()
    }
}

impl Shape for RepoRoot {
    const NAME: &'static str = "repo root";
}

/// Repository-wide metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoMeta {
    pub did: String,
    pub version: u32,
    pub datastore: String,
}

impl RepoMeta {
    pub fn new(did: impl Into<String>) -> Self {
        RepoMeta {
            did: did.into(),
            version: crate::VERSION,
            datastore: "mst".to_string(),
        }
    }
}

impl Shape for RepoMeta {
    const NAME: &'static str = "repo meta";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Codec;
    use serde_json::json;

    fn cid(data: &[u8]) -> Cid {
        Cid::for_bytes(Codec::DagJson, data)
    }

    #[test]
    fn test_genesis_root() {
        let root = RepoRoot::genesis("did:ex:alice", cid(b"meta"), cid(b"data"));
        assert!(root.is_genesis());
        assert_eq!(root.meta, Some(cid(b"meta")));
    }

    #[test]
    fn test_child_root() {
        let root = RepoRoot::child("did:ex:alice", cid(b"c1"), cid(b"data"));
        assert!(!root.is_genesis());
        assert_eq!(root.meta, None);
    }

    #[test]
    fn test_root_prev_is_explicit_null() {
        let root = RepoRoot::genesis("did:ex:alice", cid(b"meta"), cid(b"data"));
        let value = serde_json::to_value(&root).unwrap();
        assert_eq!(value["prev"], json!(null));
        assert_eq!(RepoRoot::from_value(&value), Some(root));
    }

    #[test]
    fn test_root_requires_prev_and_meta_keys() {
        let data = cid(b"data").to_string();
        assert!(!RepoRoot::is_shape(&json!({"did": "did:ex:alice", "data": data})));
        assert!(!RepoRoot::is_shape(
            &json!({"did": "did:ex:alice", "meta": null, "data": data})
        ));
        assert!(!RepoRoot::is_shape(
            &json!({"did": "did:ex:alice", "prev": null, "data": data})
        ));
        assert!(RepoRoot::is_shape(
            &json!({"did": "did:ex:alice", "prev": null, "meta": null, "data": data})
        ));
    }

    #[test]
    fn test_commit_is_not_a_root() {
        let commit = Commit::new(cid(b"root"), b"sig".to_vec());
        let value = serde_json::to_value(&commit).unwrap();
        assert!(Commit::is_shape(&value));
        assert!(!RepoRoot::is_shape(&value));
        assert!(!RepoMeta::is_shape(&value));
    }
}
