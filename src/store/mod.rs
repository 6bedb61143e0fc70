//! Content-addressed block primitives
//!
//! Blocks are addressed by the BLAKE3 hash of their canonical bytes. This
//! module holds the pure in-memory pieces: the block codec, the block
//! collection and the typed store over a raw block capability.

mod block;
mod block_map;
mod content_store;

pub use block::Block;
pub use block_map::{BlockMap, BlocksAndMissing};
pub use content_store::{Blockstore, ContentAddressedStore};
