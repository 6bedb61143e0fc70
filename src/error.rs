//! Error types for repo_store

use crate::model::Cid;
use thiserror::Error;

/// Result type alias for repo_store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in repo_store operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A typed read found nothing, or found bytes of the wrong shape
    #[error("Could not find a {shape} at {cid}")]
    NotFound { shape: &'static str, cid: Cid },

    /// The backing block capability has no block for this identifier
    #[error("Block not found: {0}")]
    BlockNotFound(Cid),

    #[error("Invalid CID: {0}")]
    InvalidCid(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Local storage cannot export a commit because blocks are missing
    #[error("Missing {} blocks for commit {commit}", .missing.len())]
    MissingCommitBlocks { commit: Cid, missing: Vec<Cid> },

    #[error("Head conflict: expected {}, found {}", display_opt(.expected), display_opt(.actual))]
    HeadConflict {
        expected: Option<Cid>,
        actual: Option<Cid>,
    },

    #[error("Invalid store file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// True for both untyped and typed absence
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::BlockNotFound(_))
    }
}

fn display_opt(cid: &Option<Cid>) -> String {
    match cid {
        Some(cid) => cid.to_string(),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Codec;

    #[test]
    fn test_not_found_message_names_shape() {
        let cid = Cid::for_bytes(Codec::DagJson, b"x");
        let err = Error::NotFound {
            shape: "user",
            cid,
        };
        assert_eq!(err.to_string(), format!("Could not find a user at {}", cid));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_head_conflict_message() {
        let cid = Cid::for_bytes(Codec::Raw, b"head");
        let err = Error::HeadConflict {
            expected: None,
            actual: Some(cid),
        };
        assert!(err.to_string().contains("expected none"));
        assert!(!err.is_not_found());
    }
}
