//! Block type - the unit of content-addressed storage

use crate::model::{Cid, Codec};
use crate::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// An identifier together with the exact bytes it addresses
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    pub bytes: Bytes,
}

impl Block {
    /// Wrap opaque bytes as a raw block
    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Block {
            cid: Cid::for_bytes(Codec::Raw, &bytes),
            bytes,
        }
    }

    /// Canonically encode a structured value
    ///
    /// The value is lowered to a generic JSON value first, so object keys are
    /// emitted in sorted order regardless of struct field order.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        // Relies on serde_json's sorted `Value` maps; the `preserve_order`
        // feature would change every CID
        let value = serde_json::to_value(value)?;
        let bytes = Bytes::from(serde_json::to_vec(&value)?);
        Ok(Block {
            cid: Cid::for_bytes(Codec::DagJson, &bytes),
            bytes,
        })
    }

    /// Decode `bytes` addressed by `cid` into a generic value
    pub fn decode_value(cid: &Cid, bytes: &[u8]) -> Result<Value> {
        if !cid.verify(bytes) {
            return Err(Error::Corruption(format!("Block bytes do not hash to {}", cid)));
        }
        match cid.codec() {
            Codec::DagJson => Ok(serde_json::from_slice(bytes)?),
            Codec::Raw => Err(Error::Corruption(format!(
                "Cannot decode raw block {} as an object",
                cid
            ))),
        }
    }

    /// Decode `bytes` addressed by `cid` into `T`
    pub fn decode<T: DeserializeOwned>(cid: &Cid, bytes: &[u8]) -> Result<T> {
        let value = Self::decode_value(cid, bytes)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Get the size of the block data
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
