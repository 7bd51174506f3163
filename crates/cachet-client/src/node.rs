//! Canonical chain-node layout.
//!
//! A node is the plaintext the client seals into one server row. The layout
//! is a fixed 113 bytes, hand-encoded for stability; there is no serde
//! involvement, and both ends of the codec are this client:
//!
//! ```text
//! byte  0        flag: 0x00 tail of chain, 0x01 has a predecessor
//! bytes 1..17    doc_id (16 bytes)
//! bytes 17..49   file_key (32 bytes)
//! bytes 49..81   prev_key  (32 bytes, zeros when flag = 0x00)
//! bytes 81..113  prev_addr (32 bytes, zeros when flag = 0x00)
//! ```

use cachet_core::{Address, CachetError, CachetResult, DocId, HeadPointer, SecretKey};

/// Plaintext size of an encoded node. Sealed size is this plus the 16-byte
/// AEAD tag.
pub const NODE_LEN: usize = 113;

const FLAG_TAIL: u8 = 0x00;
const FLAG_LINKED: u8 = 0x01;

/// One decrypted chain node: the document it names, the key for that
/// document's file payload, and the pointer to the next-older node.
#[derive(Debug)]
pub struct ChainNode {
    pub doc_id: DocId,
    pub file_key: SecretKey,
    /// `None` at the tail (the oldest entry).
    pub prev: Option<HeadPointer>,
}

impl ChainNode {
    pub fn encode(&self) -> [u8; NODE_LEN] {
        let mut out = [0u8; NODE_LEN];
        out[1..17].copy_from_slice(self.doc_id.as_bytes());
        out[17..49].copy_from_slice(self.file_key.as_bytes());
        match &self.prev {
            Some(prev) => {
                out[0] = FLAG_LINKED;
                out[49..81].copy_from_slice(prev.key.as_bytes());
                out[81..113].copy_from_slice(prev.addr.as_bytes());
            }
            None => {
                out[0] = FLAG_TAIL;
                // prev fields stay zero
            }
        }
        out
    }

    /// Strict decode. The payload was AEAD-verified before it gets here, so
    /// a failure indicates a codec bug or version skew rather than an
    /// attack, but it must not be tolerated silently.
    pub fn decode(bytes: &[u8]) -> CachetResult<Self> {
        if bytes.len() != NODE_LEN {
            return Err(CachetError::Serialization(format!(
                "node payload is {} bytes, expected {}",
                bytes.len(),
                NODE_LEN
            )));
        }

        let mut doc_id = [0u8; 16];
        doc_id.copy_from_slice(&bytes[1..17]);
        let mut file_key = [0u8; 32];
        file_key.copy_from_slice(&bytes[17..49]);

        let prev = match bytes[0] {
            FLAG_TAIL => {
                if bytes[49..113].iter().any(|&b| b != 0) {
                    return Err(CachetError::Serialization(
                        "tail node carries nonzero predecessor bytes".into(),
                    ));
                }
                None
            }
            FLAG_LINKED => {
                let mut prev_key = [0u8; 32];
                prev_key.copy_from_slice(&bytes[49..81]);
                let mut prev_addr = [0u8; 32];
                prev_addr.copy_from_slice(&bytes[81..113]);
                Some(HeadPointer {
                    key: SecretKey(prev_key),
                    addr: Address(prev_addr),
                })
            }
            other => {
                return Err(CachetError::Serialization(format!(
                    "unknown node flag byte 0x{:02x}",
                    other
                )));
            }
        };

        Ok(Self {
            doc_id: DocId(doc_id),
            file_key: SecretKey(file_key),
            prev,
        })
    }
}
