//! Configuration for durable repository storage

use crate::storage::HeadPolicy;
use crate::{Error, Result};
use std::path::PathBuf;

/// Environment variable naming the store file
pub const ENV_PATH: &str = "REPO_STORE_PATH";
/// Environment variable for the zstd compression level
pub const ENV_ZSTD_LEVEL: &str = "REPO_STORE_ZSTD_LEVEL";
/// Environment variable for the head policy (`advisory` or `enforce`)
pub const ENV_HEAD_POLICY: &str = "REPO_STORE_HEAD_POLICY";
/// Environment variable toggling a sync after every head move
pub const ENV_SYNC_ON_COMMIT: &str = "REPO_STORE_SYNC_ON_COMMIT";

const DEFAULT_FILE_NAME: &str = "repo.blocks";

/// Settings for a [`FileBlockstore`](crate::storage::FileBlockstore)
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Path to the store file
    pub path: PathBuf,
    /// zstd level used for block records
    pub compression_level: i32,
    /// How `update_head` treats its expected previous head
    pub head_policy: HeadPolicy,
    /// Flush index and head to disk after every head move
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: default_path(),
            compression_level: 3,
            head_policy: HeadPolicy::Enforce,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    /// Config for a store at `path` with default settings
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Read overrides from the environment on top of the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = StoreConfig::default();

        if let Some(path) = lookup(ENV_PATH) {
            config.path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_ZSTD_LEVEL) {
            config.compression_level = level.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be an integer, got {:?}",
                    ENV_ZSTD_LEVEL, level
                ))
            })?;
        }
        if let Some(policy) = lookup(ENV_HEAD_POLICY) {
            config.head_policy = parse_policy(&policy)?;
        }
        if let Some(flag) = lookup(ENV_SYNC_ON_COMMIT) {
            config.sync_on_commit = parse_bool(&flag)?;
        }

        Ok(config)
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_head_policy(mut self, policy: HeadPolicy) -> Self {
        self.head_policy = policy;
        self
    }

    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
}

fn default_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repo_store")
        .join(DEFAULT_FILE_NAME)
}

fn parse_policy(s: &str) -> Result<HeadPolicy> {
    match s.trim().to_ascii_lowercase().as_str() {
        "advisory" => Ok(HeadPolicy::Advisory),
        "enforce" => Ok(HeadPolicy::Enforce),
        other => Err(Error::Config(format!(
            "{} must be 'advisory' or 'enforce', got {:?}",
            ENV_HEAD_POLICY, other
        ))),
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got {:?}",
            ENV_SYNC_ON_COMMIT, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.compression_level, 3);
        assert_eq!(config.head_policy, HeadPolicy::Enforce);
        assert!(config.sync_on_commit);
        assert!(config.path.ends_with(DEFAULT_FILE_NAME));
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            (ENV_PATH, "/tmp/x.blocks"),
            (ENV_ZSTD_LEVEL, "9"),
            (ENV_HEAD_POLICY, "Advisory"),
            (ENV_SYNC_ON_COMMIT, "off"),
        ]))
        .unwrap();

        assert_eq!(config.path, PathBuf::from("/tmp/x.blocks"));
        assert_eq!(config.compression_level, 9);
        assert_eq!(config.head_policy, HeadPolicy::Advisory);
        assert!(!config.sync_on_commit);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[(ENV_ZSTD_LEVEL, "high")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[(ENV_HEAD_POLICY, "strict")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[(ENV_SYNC_ON_COMMIT, "maybe")])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = StoreConfig::new("a.blocks")
            .with_compression_level(1)
            .with_head_policy(HeadPolicy::Advisory)
            .with_sync_on_commit(false);
        assert_eq!(config.path, PathBuf::from("a.blocks"));
        assert_eq!(config.compression_level, 1);
        assert_eq!(config.head_policy, HeadPolicy::Advisory);
        assert!(!config.sync_on_commit);
    }
}
