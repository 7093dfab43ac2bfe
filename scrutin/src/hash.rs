#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! SHA-256 hashing and the canonical byte encodings fed into it.
//!
//! Every hash input in the engine is built from a domain-separator byte,
//! big-endian fixed-width integers (the canonical width of the deployment
//! parameters) and length-prefixed strings, so no two statements can collide
//! structurally.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

pub const HVALUE_BYTE_LEN: usize = 32;

pub type HValueByteArray = [u8; HVALUE_BYTE_LEN];

/// A SHA-256 output value: commitments, payload hashes, token hashes,
/// transaction ids.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HValue(pub HValueByteArray);

impl HValue {
    pub const fn byte_len() -> usize {
        HVALUE_BYTE_LEN
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex, the wire form.
    pub fn to_hex(&self) -> String {
        faster_hex::hex_string(&self.0)
    }

    /// Parses the lowercase (or uppercase) hex wire form.
    pub fn from_hex(s: &str) -> Option<HValue> {
        if s.len() != HVALUE_BYTE_LEN * 2 {
            return None;
        }
        let mut buf = [0u8; HVALUE_BYTE_LEN];
        faster_hex::hex_decode(s.as_bytes(), &mut buf).ok()?;
        Some(HValue(buf))
    }
}

impl std::fmt::Display for HValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for HValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HValue({})", self.to_hex())
    }
}

impl Serialize for HValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        HValue::from_hex(&s).ok_or_else(|| D::Error::custom("expected 64 hex characters"))
    }
}

impl std::str::FromStr for HValue {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HValue::from_hex(s).ok_or(())
    }
}

/// SHA-256 of a single byte string.
pub fn h(data: &[u8]) -> HValue {
    HValue(Sha256::digest(data).into())
}

/// SHA-256 of the concatenation of several byte strings.
pub fn h_cat(parts: &[&[u8]]) -> HValue {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    HValue(hasher.finalize().into())
}

/// Appends the canonical encoding of a string: a 4-byte big-endian length
/// followed by the UTF-8 bytes.
pub fn put_str(v: &mut Vec<u8>, s: &str) {
    v.extend_from_slice(&(s.len() as u32).to_be_bytes());
    v.extend_from_slice(s.as_bytes());
}

/// Appends a 8-byte big-endian unsigned integer.
pub fn put_u64(v: &mut Vec<u8>, x: u64) {
    v.extend_from_slice(&x.to_be_bytes());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn known_digest() {
        // SHA-256("abc")
        assert_eq!(
            h(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn concatenation_matches_single_pass() {
        assert_eq!(h_cat(&[b"ab", b"c"]), h(b"abc"));
    }

    #[test]
    fn hex_round_trip() {
        let v = h(b"wire form");
        assert_eq!(HValue::from_hex(&v.to_hex()), Some(v));
        assert_eq!(HValue::from_hex("too short"), None);
    }

    #[test]
    fn serde_as_hex_string() {
        let v = h(b"serde");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, format!("\"{}\"", v.to_hex()));
        assert_eq!(serde_json::from_str::<HValue>(&json).unwrap(), v);
    }

    #[test]
    fn length_prefixed_strings_do_not_alias() {
        let mut a = Vec::new();
        put_str(&mut a, "ab");
        put_str(&mut a, "c");
        let mut b = Vec::new();
        put_str(&mut b, "a");
        put_str(&mut b, "bc");
        assert_ne!(a, b);
    }
}
