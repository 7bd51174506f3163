//! Cryptographic primitives: OS entropy, AES-256-GCM with associated data,
//! and the HMAC-SHA256 address derivation.
//!
//! All functions are stateless. Nonces are never invented here: every
//! caller samples a fresh 12-byte nonce per seal, and a nonce is never
//! reused under the same key.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CachetError, CachetResult};
use crate::types::{Address, SecretKey};

type HmacSha256 = Hmac<Sha256>;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Domain separator for address derivation. The MAC is used for nothing
/// else; authentication of stored rows is the AEAD tag's job.
pub const ADDRESS_LABEL: &[u8] = b"address";

/// Fill `buf` from the OS entropy source.
pub fn random_bytes(buf: &mut [u8]) -> CachetResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CachetError::Entropy(e.to_string()))
}

/// Sample a fixed-size array from the OS entropy source.
pub fn random_array<const N: usize>() -> CachetResult<[u8; N]> {
    let mut out = [0u8; N];
    random_bytes(&mut out)?;
    Ok(out)
}

/// Encrypt with AES-256-GCM. Returns ciphertext with the 16-byte tag
/// appended. `aad` is authenticated but not encrypted.
pub fn aead_seal(
    key: &SecretKey,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> CachetResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CachetError::Crypto(format!("cipher init failed: {}", e)))?;

    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CachetError::Crypto(format!("encryption failed: {}", e)))
}

/// Verify-and-decrypt AES-256-GCM. Any failure (wrong key, flipped bit,
/// mismatched `aad`) collapses to [`CachetError::Auth`] and yields no
/// plaintext.
pub fn aead_open(
    key: &SecretKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> CachetResult<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CachetError::Auth)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CachetError::Auth)
}

/// HMAC-SHA256 over `label` under `key`.
pub fn mac(key: &SecretKey, label: &[u8]) -> [u8; 32] {
    let mut hmac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .expect("HMAC accepts any key length");
    hmac.update(label);
    let digest = hmac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Derive the storage address for a node key: the full 32 bytes of
/// `HMAC-SHA256(key, "address")`. One-way, so the address reveals nothing
/// about the key; and because every node key is a fresh random sample, no
/// address can be predicted from any earlier one.
pub fn derive_address(key: &SecretKey) -> Address {
    Address(mac(key, ADDRESS_LABEL))
}
