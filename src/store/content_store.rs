//! Typed get/put over a raw block capability

use super::Block;
use crate::model::{Cid, Shape, SignedRoot, User};
use crate::{Error, Result};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

/// Raw block capability consumed by [`ContentAddressedStore`]
pub trait Blockstore {
    /// Fetch the bytes at `cid`, failing with [`Error::BlockNotFound`] if absent
    fn get(&self, cid: &Cid) -> Result<Bytes>;

    /// Store `bytes` under `cid`
    fn put(&self, cid: Cid, bytes: Bytes) -> Result<()>;
}

impl<B: Blockstore + ?Sized> Blockstore for &B {
    fn get(&self, cid: &Cid) -> Result<Bytes> {
        (**self).get(cid)
    }

    fn put(&self, cid: Cid, bytes: Bytes) -> Result<()> {
        (**self).put(cid, bytes)
    }
}

/// Encodes values into blocks and decodes blocks back into validated objects
pub struct ContentAddressedStore<B> {
    blockstore: B,
}

impl<B: Blockstore> ContentAddressedStore<B> {
    pub fn new(blockstore: B) -> Self {
        ContentAddressedStore { blockstore }
    }

    pub fn blockstore(&self) -> &B {
        &self.blockstore
    }

    /// Decode the block at `cid` into a generic object
    pub fn get(&self, cid: &Cid) -> Result<Value> {
        let bytes = self.blockstore.get(cid)?;
        Block::decode_value(cid, &bytes)
    }

    /// Decode and validate the block at `cid` as `T`
    pub fn get_typed<T: Shape>(&self, cid: &Cid) -> Result<T> {
        let value = self.get(cid)?;
        T::from_value(&value).ok_or(Error::NotFound {
            shape: T::NAME,
            cid: *cid,
        })
    }

    pub fn get_user(&self, cid: &Cid) -> Result<User> {
        self.get_typed(cid)
    }

    pub fn get_signed_root(&self, cid: &Cid) -> Result<SignedRoot> {
        self.get_typed(cid)
    }

    /// Store `value` canonically and return its identifier
    pub fn put<T: Serialize + ?Sized>(&self, value: &T) -> Result<Cid> {
        let block = Block::encode(value)?;
        self.blockstore.put(block.cid, block.bytes)?;
        Ok(block.cid)
    }
}
