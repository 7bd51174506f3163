use crate::error::CachetResult;
use crate::types::{Address, DocId, FileRecord, NodeRecord, StoreStats};

// ---------------------------------------------------------------------------
// IndexStore — the honest-but-curious server interface
//
// The server stores opaque rows under opaque keys. It never sees a keyword,
// a plaintext document id, or any key material. There are deliberately no
// range queries, no prefix matches, and no way to enumerate by anything but
// the exact lookup key; any of those would hand the server structure it
// must not have.
// ---------------------------------------------------------------------------

pub trait IndexStore: Send + Sync {
    /// Insert a chain node. Fails with `Collision` if the address is
    /// already occupied; the existing row must be left untouched. Live
    /// rows are never mutated.
    fn put_node(&self, address: &Address, record: &NodeRecord) -> CachetResult<()>;

    /// Exact-match lookup of one chain node.
    fn get_node(&self, address: &Address) -> CachetResult<Option<NodeRecord>>;

    /// Insert an encrypted file row. Same collision contract as `put_node`.
    fn put_file(&self, file_id: &DocId, record: &FileRecord) -> CachetResult<()>;

    /// Exact-match lookup of one file row.
    fn get_file(&self, file_id: &DocId) -> CachetResult<Option<FileRecord>>;

    /// Row counts for diagnostics. Leaks only cardinality and nothing
    /// about which rows relate to which.
    fn stats(&self) -> CachetResult<StoreStats>;
}
