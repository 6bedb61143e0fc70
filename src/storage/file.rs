//! Single-file repository storage
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("REPOBLKS")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 2 bytes (u16 LE, bit 0 = head present)
//!   - object_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE)
//!   - head: 34 bytes (binary CID, zeroed when absent)
//!
//! [OBJECTS: variable]
//!   - zstd-compressed block bytes, concatenated
//!
//! [INDEX: variable]
//!   - sorted array of (cid, offset, size, raw_len) entries
//! ```
//!
//! The index and head are only durable after [`FileBlockstore::sync`]. With
//! `sync_on_commit` enabled every head move syncs, so a persisted head never
//! references blocks missing from the persisted index.
//!
//! Records are only ever appended. A sync that saw new blocks writes a fresh
//! index after the newest record and then points the header at it, so the
//! index the header names is never overwritten. Older indexes become dead
//! space.

use super::{CommitData, HeadPolicy, RepoStorage};
use crate::config::StoreConfig;
use crate::model::Cid;
use crate::store::{BlockMap, BlocksAndMissing, Blockstore};
use crate::{Error, Result, MAGIC, VERSION};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const HEADER_SIZE: u64 = 64;
const FLAG_HEAD: u16 = 1;
const INDEX_ENTRY_SIZE: usize = Cid::ENCODED_LEN + 8 + 4 + 4;

/// Index entry for a block record
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
    raw_len: u32,
}

/// Location of the index the on-disk header points at
#[derive(Clone, Copy, Debug, Default)]
struct PersistedIndex {
    offset: u64,
    count: u64,
}

/// A [`RepoStorage`] backed by a single append-only file
pub struct FileBlockstore {
    path: PathBuf,
    file: RwLock<File>,
    index: RwLock<HashMap<Cid, IndexEntry>>,
    head: RwLock<Option<Cid>>,
    write_offset: RwLock<u64>,
    persisted: RwLock<PersistedIndex>,
    compression_level: i32,
    policy: HeadPolicy,
    sync_on_commit: bool,
}

impl FileBlockstore {
    /// Create a new, empty store file, truncating any existing one
    pub fn create(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&config.path)?;

        let store = Self::from_parts(
            config,
            file,
            HashMap::new(),
            None,
            HEADER_SIZE,
            PersistedIndex::default(),
        );
        {
            let mut file = store.file.write();
            Self::write_header(&mut file, 0, 0, None)?;
            file.sync_all()?;
        }

        info!(path = %config.path.display(), "created block store");
        Ok(store)
    }

    /// Open an existing store file
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = u32::from_le_bytes(read_array(&header[8..12]));
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let flags = u16::from_le_bytes(read_array(&header[12..14]));
        let object_count = u64::from_le_bytes(read_array(&header[14..22]));
        let index_offset = u64::from_le_bytes(read_array(&header[22..30]));
        let head = if flags & FLAG_HEAD != 0 {
            Some(Cid::from_bytes(&header[30..64])?)
        } else {
            None
        };

        let mut index = HashMap::new();
        if index_offset > 0 && object_count > 0 {
            file.seek(SeekFrom::Start(index_offset))?;
            for _ in 0..object_count {
                let mut buf = [0u8; INDEX_ENTRY_SIZE];
                file.read_exact(&mut buf)?;

                let cid = Cid::from_bytes(&buf[0..34])?;
                let offset = u64::from_le_bytes(read_array(&buf[34..42]));
                let size = u32::from_le_bytes(read_array(&buf[42..46]));
                let raw_len = u32::from_le_bytes(read_array(&buf[46..50]));

                index.insert(
                    cid,
                    IndexEntry {
                        offset,
                        size,
                        raw_len,
                    },
                );
            }
        }

        // Append past everything, including the index the header names and
        // any records written after it that never got indexed
        let write_offset = file.seek(SeekFrom::End(0))?.max(HEADER_SIZE);
        let persisted = PersistedIndex {
            offset: index_offset,
            count: object_count,
        };

        info!(
            path = %config.path.display(),
            objects = index.len(),
            head = ?head,
            "opened block store"
        );
        Ok(Self::from_parts(
            config,
            file,
            index,
            head,
            write_offset,
            persisted,
        ))
    }

    /// Open the store at `config.path`, creating it if missing
    pub fn open_or_create(config: &StoreConfig) -> Result<Self> {
        if config.path.exists() {
            Self::open(config)
        } else {
            Self::create(config)
        }
    }

    fn from_parts(
        config: &StoreConfig,
        file: File,
        index: HashMap<Cid, IndexEntry>,
        head: Option<Cid>,
        write_offset: u64,
        persisted: PersistedIndex,
    ) -> Self {
        FileBlockstore {
            path: config.path.clone(),
            file: RwLock::new(file),
            index: RwLock::new(index),
            head: RwLock::new(head),
            write_offset: RwLock::new(write_offset),
            persisted: RwLock::new(persisted),
            compression_level: config.compression_level,
            policy: config.head_policy,
            sync_on_commit: config.sync_on_commit,
        }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> HeadPolicy {
        self.policy
    }

    /// Number of stored blocks
    pub fn block_count(&self) -> usize {
        self.index.read().len()
    }

    /// Flush the index and head to disk
    pub fn sync(&self) -> Result<()> {
        let index = self.index.read();
        let head = *self.head.read();
        let mut persisted = self.persisted.write();
        let mut write_offset = self.write_offset.write();
        let mut file = self.file.write();

        // Blocks are only added between destroys, so an unchanged count
        // means the persisted index is still complete
        if index.len() as u64 != persisted.count {
            // Sort by CID for determinism
            let mut entries: Vec<_> = index.iter().collect();
            entries.sort_by_key(|(cid, _)| **cid);

            let mut buf = Vec::with_capacity(entries.len() * INDEX_ENTRY_SIZE);
            for (cid, entry) in entries {
                buf.extend_from_slice(&cid.to_bytes());
                buf.extend_from_slice(&entry.offset.to_le_bytes());
                buf.extend_from_slice(&entry.size.to_le_bytes());
                buf.extend_from_slice(&entry.raw_len.to_le_bytes());
            }

            file.seek(SeekFrom::Start(*write_offset))?;
            file.write_all(&buf)?;
            // Index must be on disk before the header points at it
            file.sync_data()?;

            *persisted = PersistedIndex {
                offset: *write_offset,
                count: index.len() as u64,
            };
            *write_offset += buf.len() as u64;
        }

        Self::write_header(&mut file, persisted.count, persisted.offset, head)?;
        file.sync_all()?;

        debug!(objects = index.len(), "synced block store");
        Ok(())
    }

    fn write_header(
        file: &mut File,
        object_count: u64,
        index_offset: u64,
        head: Option<Cid>,
    ) -> Result<()> {
        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        let flags = if head.is_some() { FLAG_HEAD } else { 0 };
        header[12..14].copy_from_slice(&flags.to_le_bytes());
        header[14..22].copy_from_slice(&object_count.to_le_bytes());
        header[22..30].copy_from_slice(&index_offset.to_le_bytes());
        if let Some(head) = head {
            header[30..64].copy_from_slice(&head.to_bytes());
        }

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        Ok(())
    }

    fn read_record(&self, cid: &Cid, entry: IndexEntry) -> Result<Bytes> {
        let mut data = vec![0u8; entry.size as usize];
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(entry.offset))?;
            file.read_exact(&mut data)?;
        }

        let bytes = zstd::decode_all(data.as_slice())?;
        if !cid.verify(&bytes) {
            return Err(Error::Corruption(format!(
                "Stored block does not hash to {}",
                cid
            )));
        }
        Ok(Bytes::from(bytes))
    }

    fn write_record(&self, cid: Cid, bytes: &[u8]) -> Result<()> {
        if self.index.read().contains_key(&cid) {
            return Ok(());
        }

        let compressed = zstd::encode_all(bytes, self.compression_level)?;
        let size = compressed.len() as u32;

        let offset = {
            let mut write_offset = self.write_offset.write();
            let offset = *write_offset;

            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&compressed)?;

            *write_offset = offset + size as u64;
            offset
        };

        self.index.write().insert(
            cid,
            IndexEntry {
                offset,
                size,
                raw_len: bytes.len() as u32,
            },
        );
        Ok(())
    }

    fn set_head(&self, cid: Cid) -> Result<()> {
        if self.sync_on_commit {
            self.sync()?;
        }
        debug!(head = %cid.short(), "head updated");
        Ok(())
    }
}

impl RepoStorage for FileBlockstore {
    fn get_head(&self) -> Result<Option<Cid>> {
        Ok(*self.head.read())
    }

    fn get_bytes(&self, cid: &Cid) -> Result<Option<Bytes>> {
        let entry = self.index.read().get(cid).copied();
        match entry {
            Some(entry) => self.read_record(cid, entry).map(Some),
            None => Ok(None),
        }
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.index.read().contains_key(cid))
    }

    fn get_blocks(&self, cids: &[Cid]) -> Result<BlocksAndMissing> {
        let mut result = BlocksAndMissing::default();
        for cid in cids {
            match self.get_bytes(cid)? {
                Some(bytes) => result.blocks.set(*cid, bytes),
                None => {
                    if !result.missing.contains(cid) {
                        result.missing.push(*cid);
                    }
                }
            }
        }
        Ok(result)
    }

    fn put_block(&self, cid: Cid, bytes: Bytes) -> Result<()> {
        self.write_record(cid, &bytes)
    }

    fn put_many(&self, blocks: &BlockMap) -> Result<()> {
        for (cid, bytes) in blocks.iter() {
            self.write_record(*cid, bytes)?;
        }
        Ok(())
    }

    fn index_commits(&self, commits: &[CommitData]) -> Result<()> {
        for commit in commits {
            self.put_many(&commit.blocks)?;
        }
        debug!(commits = commits.len(), "indexed commits");
        Ok(())
    }

    fn update_head(&self, cid: Cid, expected_prev: Option<Cid>) -> Result<()> {
        {
            let mut head = self.head.write();
            self.policy.check(*head, expected_prev)?;
            *head = Some(cid);
        }
        self.set_head(cid)
    }

    fn apply_commit(&self, commit: &CommitData) -> Result<()> {
        self.put_many(&commit.blocks)?;
        *self.head.write() = Some(commit.commit);
        debug!(
            commit = %commit.commit.short(),
            blocks = commit.blocks.len(),
            "applied commit"
        );
        self.set_head(commit.commit)
    }

    fn size_in_bytes(&self) -> Result<usize> {
        Ok(self
            .index
            .read()
            .values()
            .map(|entry| entry.raw_len as usize)
            .sum())
    }

    fn destroy(&self) -> Result<()> {
        let mut index = self.index.write();
        let mut head = self.head.write();
        let mut persisted = self.persisted.write();
        let mut write_offset = self.write_offset.write();
        let mut file = self.file.write();

        index.clear();
        *head = None;
        *persisted = PersistedIndex::default();
        *write_offset = HEADER_SIZE;
        file.set_len(HEADER_SIZE)?;
        Self::write_header(&mut file, 0, 0, None)?;
        file.sync_all()?;

        info!(path = %self.path.display(), "destroyed block store");
        Ok(())
    }
}

impl Blockstore for FileBlockstore {
    fn get(&self, cid: &Cid) -> Result<Bytes> {
        self.get_bytes(cid)?.ok_or(Error::BlockNotFound(*cid))
    }

    fn put(&self, cid: Cid, bytes: Bytes) -> Result<()> {
        self.put_block(cid, bytes)
    }
}

impl Drop for FileBlockstore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Block;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, StoreConfig) {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("test.blocks"));
        (dir, config)
    }

    #[test]
    fn test_create_and_open() {
        let (_dir, config) = setup();

        {
            let store = FileBlockstore::create(&config).unwrap();
            assert_eq!(store.block_count(), 0);
            assert_eq!(store.get_head().unwrap(), None);
        }

        {
            let store = FileBlockstore::open(&config).unwrap();
            assert_eq!(store.block_count(), 0);
            assert_eq!(store.get_head().unwrap(), None);
        }
    }

    #[test]
    fn test_put_and_get() {
        let (_dir, config) = setup();
        let store = FileBlockstore::create(&config).unwrap();

        let block = Block::raw(&b"hello block"[..]);
        store.put_block(block.cid, block.bytes.clone()).unwrap();

        assert!(store.has(&block.cid).unwrap());
        assert_eq!(store.get_bytes(&block.cid).unwrap(), Some(block.bytes));
        assert_eq!(store.size_in_bytes().unwrap(), 11);
    }

    #[test]
    fn test_deduplication() {
        let (_dir, config) = setup();
        let store = FileBlockstore::create(&config).unwrap();

        let block = Block::raw(&b"duplicate data"[..]);
        store.put_block(block.cid, block.bytes.clone()).unwrap();
        store.put_block(block.cid, block.bytes.clone()).unwrap();

        assert_eq!(store.block_count(), 1);
    }

    #[test]
    fn test_persistence() {
        let (_dir, config) = setup();
        let block = Block::raw(&b"persistent"[..]);

        {
            let store = FileBlockstore::create(&config).unwrap();
            let commit = CommitData::new(block.cid, [block.clone()].into_iter().collect());
            store.apply_commit(&commit).unwrap();
        }

        {
            let store = FileBlockstore::open(&config).unwrap();
            assert_eq!(store.get_head().unwrap(), Some(block.cid));
            assert_eq!(store.get_bytes(&block.cid).unwrap(), Some(block.bytes));
        }
    }

    #[test]
    fn test_writes_after_reopen_append() {
        let (_dir, config) = setup();
        let first = Block::raw(&b"first"[..]);
        let second = Block::raw(&b"second"[..]);

        {
            let store = FileBlockstore::create(&config).unwrap();
            store.put_block(first.cid, first.bytes.clone()).unwrap();
            store.sync().unwrap();
        }
        {
            let store = FileBlockstore::open(&config).unwrap();
            store.put_block(second.cid, second.bytes.clone()).unwrap();
            store.sync().unwrap();
        }

        let store = FileBlockstore::open(&config).unwrap();
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.get_bytes(&first.cid).unwrap(), Some(first.bytes));
        assert_eq!(store.get_bytes(&second.cid).unwrap(), Some(second.bytes));
    }

    #[test]
    fn test_unsynced_writes_keep_persisted_index_readable() {
        let (_dir, config) = setup();
        let committed = Block::raw(&b"committed"[..]);
        let pending = Block::raw(&b"pending"[..]);

        {
            let store = FileBlockstore::create(&config).unwrap();
            let commit = CommitData::new(committed.cid, [committed.clone()].into_iter().collect());
            store.apply_commit(&commit).unwrap();
            store.put_block(pending.cid, pending.bytes.clone()).unwrap();
            // Simulate a crash: no drop, no sync
            std::mem::forget(store);
        }

        let store = FileBlockstore::open(&config).unwrap();
        assert_eq!(store.get_head().unwrap(), Some(committed.cid));
        assert_eq!(store.get_bytes(&committed.cid).unwrap(), Some(committed.bytes.clone()));
        assert!(!store.has(&pending.cid).unwrap());

        // Writing after recovery leaves earlier blocks intact
        store.put_block(pending.cid, pending.bytes.clone()).unwrap();
        store.sync().unwrap();
        drop(store);

        let store = FileBlockstore::open(&config).unwrap();
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.get_bytes(&committed.cid).unwrap(), Some(committed.bytes));
        assert_eq!(store.get_bytes(&pending.cid).unwrap(), Some(pending.bytes));
    }

    #[test]
    fn test_repeated_sync_does_not_grow_file() {
        let (_dir, config) = setup();
        let store = FileBlockstore::create(&config).unwrap();
        let block = Block::raw(&b"once"[..]);
        store.put_block(block.cid, block.bytes.clone()).unwrap();

        store.sync().unwrap();
        let len = std::fs::metadata(&config.path).unwrap().len();
        store.sync().unwrap();
        store.update_head(block.cid, None).unwrap();

        assert_eq!(std::fs::metadata(&config.path).unwrap().len(), len);
    }

    #[test]
    fn test_head_conflict_enforced_by_default() {
        let (_dir, config) = setup();
        let store = FileBlockstore::create(&config).unwrap();
        let a = Block::raw(&b"a"[..]).cid;
        let b = Block::raw(&b"b"[..]).cid;

        store.update_head(a, None).unwrap();
        assert!(matches!(
            store.update_head(b, Some(b)),
            Err(Error::HeadConflict { .. })
        ));
        store.update_head(b, Some(a)).unwrap();
        assert_eq!(store.get_head().unwrap(), Some(b));
    }

    #[test]
    fn test_destroy() {
        let (_dir, config) = setup();
        let block = Block::raw(&b"gone"[..]);

        {
            let store = FileBlockstore::create(&config).unwrap();
            let commit = CommitData::new(block.cid, [block.clone()].into_iter().collect());
            store.apply_commit(&commit).unwrap();
            store.destroy().unwrap();

            assert_eq!(store.get_head().unwrap(), None);
            assert_eq!(store.size_in_bytes().unwrap(), 0);
            assert!(!store.has(&block.cid).unwrap());
        }

        let store = FileBlockstore::open(&config).unwrap();
        assert_eq!(store.block_count(), 0);
        assert_eq!(store.get_head().unwrap(), None);
    }

    #[test]
    fn test_invalid_magic() {
        let (_dir, config) = setup();
        std::fs::write(&config.path, [0u8; HEADER_SIZE as usize]).unwrap();

        assert!(matches!(
            FileBlockstore::open(&config),
            Err(Error::InvalidFile(_))
        ));
    }
}
