//! User and signed-root objects

use super::shape::{hex_bytes, Shape};
use super::Cid;
use serde::{Deserialize, Serialize};

/// A repository owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    /// Decentralized identifier of the user
    pub did: String,
    /// Display name
    pub name: String,
}

impl User {
    pub fn new(did: impl Into<String>, name: impl Into<String>) -> Self {
        User {
            did: did.into(),
            name: name.into(),
        }
    }
}

impl Shape for User {
    const NAME: &'static str = "user";
}

/// A root pointer together with the owner's signature over it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignedRoot {
    pub root: Cid,
    #[serde(with = "hex_bytes")]
    pub sig: Vec<u8>,
}

impl SignedRoot {
    pub fn new(root: Cid, sig: impl Into<Vec<u8>>) -> Self {
        SignedRoot {
            root,
            sig: sig.into(),
        }
    }
}

impl Shape for SignedRoot {
    const NAME: &'static str = "signed root";
}
