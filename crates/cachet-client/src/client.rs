//! Update, search, and sealed file transfer.
//!
//! One `Client` owns one head table. Updates run under a client-local lock
//! covering head read → seal → server write → head rotation → state flush,
//! so head rotation is linearizable; searches only snapshot the head under
//! the lock and walk the chain without it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use cachet_core::{
    crypto, Address, CachetError, CachetResult, DocId, FileRecord, HeadPointer, IndexStore,
    NodeRecord, SecretKey,
};

use crate::node::ChainNode;
use crate::state::HeadTable;

/// One search hit: the document id and the key that unseals its file
/// payload. The chain node is a bearer credential for the file; holding
/// this entry is what authorizes retrieval.
pub struct DocEntry {
    pub doc_id: DocId,
    pub file_key: SecretKey,
}

/// Why a chain walk stopped early.
#[derive(Debug)]
pub enum ChainFault {
    /// The server has no row for a linked address: a link was lost.
    Broken { missing: Address },
    /// A row failed AEAD verification: corruption or a forgery attempt.
    Corrupt { at: Address },
}

/// Result of a search: entries in reverse insertion order (newest first).
/// A fault truncates the walk but never invalidates the entries already
/// decrypted; those were individually authenticated.
pub struct SearchOutcome {
    pub entries: Vec<DocEntry>,
    pub fault: Option<ChainFault>,
}

impl SearchOutcome {
    pub fn is_complete(&self) -> bool {
        self.fault.is_none()
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.entries.iter().map(|e| e.doc_id).collect()
    }
}

/// Client for the forward-private encrypted index.
pub struct Client {
    state_path: PathBuf,
    heads: Mutex<HeadTable>,
}

impl Client {
    /// Open a client backed by the given state file, creating empty state
    /// if the file does not exist yet.
    pub fn open<P: Into<PathBuf>>(state_path: P) -> CachetResult<Self> {
        let state_path = state_path.into();
        let heads = HeadTable::load(&state_path)?;
        Ok(Self {
            state_path,
            heads: Mutex::new(heads),
        })
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Number of keywords with a non-empty chain.
    pub fn keyword_count(&self) -> usize {
        self.lock_heads().map(|h| h.len()).unwrap_or(0)
    }

    fn lock_heads(&self) -> CachetResult<MutexGuard<'_, HeadTable>> {
        self.heads
            .lock()
            .map_err(|e| CachetError::State(format!("lock poisoned: {}", e)))
    }

    /// Add `doc_id` to `keyword`'s chain. Index-only entry: the file-key
    /// slot carries the zeroed sentinel. Use [`Client::upload_file`] to
    /// attach an encrypted payload.
    pub fn update(
        &self,
        store: &dyn IndexStore,
        keyword: &[u8],
        doc_id: DocId,
    ) -> CachetResult<()> {
        self.append_entry(store, keyword, doc_id, SecretKey::zeroed())
    }

    /// Encrypt `contents` under a fresh per-file key, store the sealed file
    /// on the server, and append an index entry carrying the key. Returns
    /// the file id, which doubles as the entry's doc id.
    pub fn upload_file(
        &self,
        store: &dyn IndexStore,
        keyword: &[u8],
        file_name: &str,
        contents: &[u8],
    ) -> CachetResult<DocId> {
        let file_key = SecretKey::random()?;
        let file_id = DocId::random()?;
        let nonce: [u8; 12] = crypto::random_array()?;
        let name_nonce: [u8; 12] = crypto::random_array()?;

        let ciphertext = crypto::aead_seal(&file_key, &nonce, contents, file_id.as_bytes())?;
        let enc_name = crypto::aead_seal(
            &file_key,
            &name_nonce,
            file_name.as_bytes(),
            &name_aad(&file_id),
        )?;

        store.put_file(
            &file_id,
            &FileRecord {
                nonce,
                ciphertext,
                name_nonce,
                enc_name,
            },
        )?;
        tracing::debug!(file = %file_id, bytes = contents.len(), "encrypted file stored");

        // The index entry is the only place the file key survives; it is
        // recoverable solely through a successful search.
        self.append_entry(store, keyword, file_id, file_key)?;
        Ok(file_id)
    }

    /// Fetch and unseal a file by id and key (both obtained from a search
    /// hit). Returns the original name and contents.
    pub fn retrieve_file(
        &self,
        store: &dyn IndexStore,
        file_id: &DocId,
        file_key: &SecretKey,
    ) -> CachetResult<(String, Vec<u8>)> {
        let record = store
            .get_file(file_id)?
            .ok_or_else(|| CachetError::NotFound(format!("file {}", file_id)))?;

        let contents =
            crypto::aead_open(file_key, &record.nonce, &record.ciphertext, file_id.as_bytes())?;
        let name_bytes = crypto::aead_open(
            file_key,
            &record.name_nonce,
            &record.enc_name,
            &name_aad(file_id),
        )?;
        let file_name = String::from_utf8(name_bytes)
            .map_err(|e| CachetError::Serialization(format!("file name is not UTF-8: {}", e)))?;

        Ok((file_name, contents))
    }

    /// Walk `keyword`'s chain, newest first. An empty chain returns an
    /// empty outcome without touching the server.
    pub fn search(&self, store: &dyn IndexStore, keyword: &[u8]) -> CachetResult<SearchOutcome> {
        // Snapshot the head; the walk runs without the lock.
        let head = self.lock_heads()?.get(keyword).cloned();

        let mut entries = Vec::new();
        let mut fault = None;
        let mut cursor = head;

        // Iterative on purpose: chains can run to tens of thousands of
        // nodes and must not grow the stack.
        while let Some(HeadPointer { key, addr }) = cursor {
            let record = match store.get_node(&addr)? {
                Some(record) => record,
                None => {
                    tracing::warn!(address = %addr, "chain link missing, stopping walk");
                    fault = Some(ChainFault::Broken { missing: addr });
                    break;
                }
            };

            let plaintext =
                match crypto::aead_open(&key, &record.nonce, &record.ciphertext, addr.as_bytes()) {
                    Ok(plaintext) => plaintext,
                    Err(CachetError::Auth) => {
                        tracing::warn!(address = %addr, "chain node rejected, stopping walk");
                        fault = Some(ChainFault::Corrupt { at: addr });
                        break;
                    }
                    Err(e) => return Err(e),
                };

            let node = ChainNode::decode(&plaintext)?;
            entries.push(DocEntry {
                doc_id: node.doc_id,
                file_key: node.file_key,
            });
            cursor = node.prev;
        }

        Ok(SearchOutcome { entries, fault })
    }

    /// Prepend one sealed entry to `keyword`'s chain and rotate the head.
    fn append_entry(
        &self,
        store: &dyn IndexStore,
        keyword: &[u8],
        doc_id: DocId,
        file_key: SecretKey,
    ) -> CachetResult<()> {
        // Fresh randomness for every entry, sampled before anything is
        // mutated. The key is NOT derived from the keyword, the document,
        // or any earlier key, so the server cannot relate this node's
        // address to anything it has seen.
        let new_key = SecretKey::random()?;
        let nonce: [u8; 12] = crypto::random_array()?;
        let new_addr = crypto::derive_address(&new_key);

        // Critical section: head read through state flush.
        let mut heads = self.lock_heads()?;
        let prev = heads.get(keyword).cloned();

        let node = ChainNode {
            doc_id,
            file_key,
            prev,
        };
        let ciphertext =
            crypto::aead_seal(&new_key, &nonce, &node.encode(), new_addr.as_bytes())?;

        match store.put_node(&new_addr, &NodeRecord { nonce, ciphertext }) {
            Ok(()) => {}
            Err(err @ CachetError::Collision(_)) => {
                // A fresh 32-byte key landed on an occupied address: the
                // entropy source is broken. Abort, never retry.
                return Err(err);
            }
            Err(err) => {
                // Ambiguous failure. The write is not idempotent (a retry
                // would consume fresh randomness and orphan this node), so
                // consult the server once for the intended address instead.
                match store.get_node(&new_addr) {
                    Ok(Some(_)) => {
                        tracing::warn!(
                            address = %new_addr,
                            "put_node reported failure but the row landed; committing head"
                        );
                    }
                    _ => return Err(err),
                }
            }
        }

        // Rotate the head only after the server acknowledged. A crash
        // before this point leaves one unreachable node on the server
        // (harmless: nothing links to it) and the chain consistent.
        heads.set(
            keyword,
            HeadPointer {
                key: new_key,
                addr: new_addr,
            },
        );
        heads.save(&self.state_path)?;

        tracing::debug!(address = %new_addr, doc = %doc_id, "index entry appended");
        Ok(())
    }
}

/// AAD for the sealed file name: `file_id || "name"`, domain-separating it
/// from the sealed contents under the same key.
fn name_aad(file_id: &DocId) -> Vec<u8> {
    let mut aad = Vec::with_capacity(16 + 4);
    aad.extend_from_slice(file_id.as_bytes());
    aad.extend_from_slice(b"name");
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachet_core::StoreStats;
    use cachet_server::MemoryStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn scratch_state() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let tid = std::thread::current().id();
        std::env::temp_dir().join(format!("cachet-test-client-{:?}-{}.json", tid, id))
    }

    fn doc(byte: u8) -> DocId {
        DocId([byte; 16])
    }

    struct Fixture {
        client: Client,
        store: MemoryStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                client: Client::open(scratch_state()).unwrap(),
                store: MemoryStore::new(),
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.client.state_path);
        }
    }

    #[test]
    fn test_search_unknown_keyword_is_empty() {
        let fx = Fixture::new();
        let outcome = fx.client.search(&fx.store, b"never-updated").unwrap();
        assert!(outcome.entries.is_empty());
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_single_entry_chain() {
        let fx = Fixture::new();
        fx.client.update(&fx.store, b"kw", doc(1)).unwrap();

        let outcome = fx.client.search(&fx.store, b"kw").unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.doc_ids(), vec![doc(1)]);
        assert!(outcome.entries[0].file_key.is_zeroed());
    }

    #[test]
    fn test_search_returns_newest_first() {
        let fx = Fixture::new();
        for byte in 1..=4 {
            fx.client.update(&fx.store, b"kw", doc(byte)).unwrap();
        }
        let outcome = fx.client.search(&fx.store, b"kw").unwrap();
        assert_eq!(outcome.doc_ids(), vec![doc(4), doc(3), doc(2), doc(1)]);
    }

    #[test]
    fn test_duplicate_doc_ids_both_retained() {
        let fx = Fixture::new();
        fx.client.update(&fx.store, b"kw", doc(9)).unwrap();
        fx.client.update(&fx.store, b"kw", doc(9)).unwrap();
        let outcome = fx.client.search(&fx.store, b"kw").unwrap();
        assert_eq!(outcome.doc_ids(), vec![doc(9), doc(9)]);
    }

    #[test]
    fn test_keyword_isolation() {
        let fx = Fixture::new();
        fx.client.update(&fx.store, b"a", doc(1)).unwrap();
        fx.client.update(&fx.store, b"b", doc(2)).unwrap();

        assert_eq!(fx.client.search(&fx.store, b"a").unwrap().doc_ids(), vec![doc(1)]);
        assert_eq!(fx.client.search(&fx.store, b"b").unwrap().doc_ids(), vec![doc(2)]);
        assert_eq!(fx.client.keyword_count(), 2);
    }

    #[test]
    fn test_file_upload_retrieve_roundtrip() {
        let fx = Fixture::new();
        let contents = b"quarterly numbers, do not circulate";
        let id = fx
            .client
            .upload_file(&fx.store, b"finance", "q3.txt", contents)
            .unwrap();

        let outcome = fx.client.search(&fx.store, b"finance").unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].doc_id, id);
        assert!(!outcome.entries[0].file_key.is_zeroed());

        let (name, data) = fx
            .client
            .retrieve_file(&fx.store, &id, &outcome.entries[0].file_key)
            .unwrap();
        assert_eq!(name, "q3.txt");
        assert_eq!(data, contents);
    }

    #[test]
    fn test_retrieve_missing_file_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .client
            .retrieve_file(&fx.store, &doc(0x55), &SecretKey([1; 32]))
            .unwrap_err();
        assert!(matches!(err, CachetError::NotFound(_)));
    }

    #[test]
    fn test_retrieve_with_wrong_key_is_auth_error() {
        let fx = Fixture::new();
        let id = fx
            .client
            .upload_file(&fx.store, b"kw", "f.bin", b"payload")
            .unwrap();
        let err = fx
            .client
            .retrieve_file(&fx.store, &id, &SecretKey([0xbb; 32]))
            .unwrap_err();
        assert!(matches!(err, CachetError::Auth));
    }

    // A store whose put_node always collides: update must abort and leave
    // no head behind.
    struct CollidingStore(MemoryStore);

    impl IndexStore for CollidingStore {
        fn put_node(&self, address: &Address, _record: &NodeRecord) -> CachetResult<()> {
            Err(CachetError::Collision(format!("node address {}", address)))
        }
        fn get_node(&self, address: &Address) -> CachetResult<Option<NodeRecord>> {
            self.0.get_node(address)
        }
        fn put_file(&self, file_id: &DocId, record: &FileRecord) -> CachetResult<()> {
            self.0.put_file(file_id, record)
        }
        fn get_file(&self, file_id: &DocId) -> CachetResult<Option<FileRecord>> {
            self.0.get_file(file_id)
        }
        fn stats(&self) -> CachetResult<StoreStats> {
            self.0.stats()
        }
    }

    #[test]
    fn test_collision_aborts_without_rotating_head() {
        let fx = Fixture::new();
        let store = CollidingStore(MemoryStore::new());
        let err = fx.client.update(&store, b"kw", doc(1)).unwrap_err();
        assert!(matches!(err, CachetError::Collision(_)));
        assert_eq!(fx.client.keyword_count(), 0);

        // The chain stayed empty and consistent.
        let outcome = fx.client.search(&store, b"kw").unwrap();
        assert!(outcome.entries.is_empty());
    }

    // A store that performs the write, then reports a transient failure:
    // the client must consult the intended address and commit the head
    // rather than retrying the write.
    struct FlakyAckStore(MemoryStore);

    impl IndexStore for FlakyAckStore {
        fn put_node(&self, address: &Address, record: &NodeRecord) -> CachetResult<()> {
            self.0.put_node(address, record)?;
            Err(CachetError::Storage("ack lost".into()))
        }
        fn get_node(&self, address: &Address) -> CachetResult<Option<NodeRecord>> {
            self.0.get_node(address)
        }
        fn put_file(&self, file_id: &DocId, record: &FileRecord) -> CachetResult<()> {
            self.0.put_file(file_id, record)
        }
        fn get_file(&self, file_id: &DocId) -> CachetResult<Option<FileRecord>> {
            self.0.get_file(file_id)
        }
        fn stats(&self) -> CachetResult<StoreStats> {
            self.0.stats()
        }
    }

    #[test]
    fn test_lost_ack_resolved_by_consulting_server() {
        let fx = Fixture::new();
        let store = FlakyAckStore(MemoryStore::new());

        fx.client.update(&store, b"kw", doc(7)).unwrap();
        assert_eq!(store.0.node_count(), 1);

        let outcome = fx.client.search(&store, b"kw").unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.doc_ids(), vec![doc(7)]);
    }

    #[test]
    fn test_update_flushes_state_to_disk() {
        let fx = Fixture::new();
        fx.client.update(&fx.store, b"kw", doc(3)).unwrap();

        // A second client opened on the same state file sees the head.
        let reopened = Client::open(fx.client.state_path()).unwrap();
        let outcome = reopened.search(&fx.store, b"kw").unwrap();
        assert_eq!(outcome.doc_ids(), vec![doc(3)]);
    }
}
