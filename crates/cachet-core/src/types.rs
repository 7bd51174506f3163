use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use crate::crypto;
use crate::error::CachetResult;

// ---------------------------------------------------------------------------
// Address — 32-byte server-side lookup key, derived as HMAC(node_key, "address")
// ---------------------------------------------------------------------------

/// The pseudorandom address a chain node is stored under. Opaque to the
/// server; reveals nothing about the keyword or the node key it came from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encode the full address for use as a storage key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// DocId — 16-byte document / file identifier
// ---------------------------------------------------------------------------

/// Random 16-byte identifier chosen at upload time. Doubles as the key of
/// the server's file table; referenced only through a successful search.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocId(#[serde(with = "hex_bytes")] pub [u8; 16]);

impl DocId {
    /// Sample a fresh identifier from OS entropy.
    pub fn random() -> CachetResult<Self> {
        Ok(Self(crypto::random_array()?))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", self.to_hex())
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// SecretKey — 32-byte symmetric key material, zeroized on drop
// ---------------------------------------------------------------------------

/// A 32-byte AES-256-GCM key. Every chain node and every file gets a fresh
/// random one; none is ever derived from a keyword or a prior key. That
/// independence is what makes future updates unlinkable to past searches.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl SecretKey {
    /// Sample a fresh key from OS entropy.
    pub fn random() -> CachetResult<Self> {
        Ok(Self(crypto::random_array()?))
    }

    /// The all-zero key. Used as the file-key sentinel for index entries
    /// that carry no file payload; real keys are fresh random samples.
    pub fn zeroed() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        write!(f, "SecretKey(..)")
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// ---------------------------------------------------------------------------
// HeadPointer — the (key, address) pair naming the newest node of a chain
// ---------------------------------------------------------------------------

/// Client-only secret: whoever holds this can walk the chain; nobody else
/// can find it.
#[derive(Clone, Serialize, Deserialize)]
pub struct HeadPointer {
    pub key: SecretKey,
    pub addr: Address,
}

impl fmt::Debug for HeadPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeadPointer(addr: {})", self.addr)
    }
}

// ---------------------------------------------------------------------------
// Server row shapes
// ---------------------------------------------------------------------------

/// One encrypted chain node as the server stores it: AES-GCM nonce plus
/// ciphertext with the 16-byte tag appended. The address it lives under is
/// bound in as associated data, so a row cannot be relocated undetected.
#[derive(Clone)]
pub struct NodeRecord {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRecord({} bytes)", self.ciphertext.len())
    }
}

/// One encrypted file row: sealed contents and sealed original name, each
/// under its own nonce but the same per-file key. The key itself never
/// reaches the server; its only copy lives inside a sealed index node.
#[derive(Clone)]
pub struct FileRecord {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
    pub name_nonce: [u8; 12],
    pub enc_name: Vec<u8>,
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FileRecord({} content bytes, {} name bytes)",
            self.ciphertext.len(),
            self.enc_name.len()
        )
    }
}

/// Operational row counts. Enumeration leaks only cardinality, which the
/// threat model already concedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub nodes: u64,
    pub files: u64,
}

// ---------------------------------------------------------------------------
// Hex serialization helper for fixed-size byte arrays
// ---------------------------------------------------------------------------

mod hex_bytes {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {} bytes", N)))
    }
}
