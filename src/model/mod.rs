//! Core data model types for repo_store

mod cid;
mod commit;
mod shape;
mod user;

pub use cid::{Cid, Codec};
pub use commit::{Commit, RepoMeta, RepoRoot};
pub use shape::Shape;
pub use user::{SignedRoot, User};
