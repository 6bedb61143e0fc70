//! Content identifier: a BLAKE3 digest tagged with the codec of the bytes it addresses

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Codec tag carried by every identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Codec {
    /// Opaque bytes
    Raw,
    /// Canonical JSON objects
    DagJson,
}

impl Codec {
    /// Multicodec code for this codec
    pub fn code(&self) -> u16 {
        match self {
            Codec::Raw => 0x55,
            Codec::DagJson => 0x0129,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x55 => Some(Codec::Raw),
            0x0129 => Some(Codec::DagJson),
            _ => None,
        }
    }
}

/// A self-describing content address
///
/// The digest is always derived from the block bytes; there is no way to
/// assign an identifier to bytes that do not hash to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    codec: Codec,
    digest: [u8; 32],
}

impl Cid {
    /// Encoded length: 2 codec bytes + 32 digest bytes
    pub const ENCODED_LEN: usize = 34;

    /// Derive the identifier of `bytes` under `codec`
    pub fn for_bytes(codec: Codec, bytes: &[u8]) -> Self {
        Cid {
            codec,
            digest: *blake3::hash(bytes).as_bytes(),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Check that `bytes` hash to this identifier
    pub fn verify(&self, bytes: &[u8]) -> bool {
        blake3::hash(bytes).as_bytes() == &self.digest
    }

    /// Byte-stable binary form
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..2].copy_from_slice(&self.codec.code().to_be_bytes());
        out[2..].copy_from_slice(&self.digest);
        out
    }

    /// Parse the binary form produced by [`Cid::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(crate::Error::InvalidCid(format!(
                "expected {} bytes, got {}",
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        let code = u16::from_be_bytes([bytes[0], bytes[1]]);
        let codec = Codec::from_code(code)
            .ok_or_else(|| crate::Error::InvalidCid(format!("unknown codec 0x{:x}", code)))?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[2..]);
        Ok(Cid { codec, digest })
    }

    /// Canonical string form
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|e| crate::Error::InvalidCid(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Get a short prefix of the digest for display (first 7 chars, like git)
    pub fn short(&self) -> String {
        hex::encode(&self.digest[..4])[..7].to_string()
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({:?}:{})", self.codec, self.short())
    }
}

impl FromStr for Cid {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Cid::from_hex(s)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_derived_from_bytes() {
        let c1 = Cid::for_bytes(Codec::Raw, b"hello");
        let c2 = Cid::for_bytes(Codec::Raw, b"hello");
        let c3 = Cid::for_bytes(Codec::Raw, b"world");

        assert_eq!(c1, c2);
        assert_ne!(c1, c3);
        assert!(c1.verify(b"hello"));
        assert!(!c1.verify(b"world"));
    }

    #[test]
    fn test_codec_is_part_of_identity() {
        let raw = Cid::for_bytes(Codec::Raw, b"data");
        let json = Cid::for_bytes(Codec::DagJson, b"data");
        assert_ne!(raw, json);
        assert_eq!(raw.digest(), json.digest());
    }

    #[test]
    fn test_cid_string_roundtrip() {
        let cid = Cid::for_bytes(Codec::DagJson, b"test data");
        let s = cid.to_string();
        assert_eq!(s.len(), Cid::ENCODED_LEN * 2);
        assert!(s.starts_with("0129"));
        assert_eq!(s.parse::<Cid>().unwrap(), cid);
    }

    #[test]
    fn test_cid_rejects_bad_input() {
        assert!(Cid::from_hex("zz").is_err());
        assert!(Cid::from_hex("0055").is_err());

        let mut bytes = Cid::for_bytes(Codec::Raw, b"x").to_bytes();
        bytes[0] = 0xff;
        assert!(matches!(
            Cid::from_bytes(&bytes),
            Err(crate::Error::InvalidCid(_))
        ));
    }

    #[test]
    fn test_cid_serializes_as_string() {
        let cid = Cid::for_bytes(Codec::Raw, b"x");
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{}\"", cid));
        let back: Cid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);
    }

    #[test]
    fn test_cid_short() {
        let cid = Cid::for_bytes(Codec::Raw, b"test");
        assert_eq!(cid.short().len(), 7);
    }
}
