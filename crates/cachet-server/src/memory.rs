use std::collections::HashMap;
use std::sync::Mutex;

use cachet_core::{
    Address, CachetError, CachetResult, DocId, FileRecord, IndexStore, NodeRecord, StoreStats,
};

/// In-memory store implementing [`IndexStore`].
///
/// Volatile: everything is gone when the process exits. Useful for tests
/// and demos; production deployments use [`crate::SqliteStore`].
pub struct MemoryStore {
    nodes: Mutex<HashMap<Address, NodeRecord>>,
    files: Mutex<HashMap<DocId, FileRecord>>,
}

fn lock<'a, K, V>(
    mutex: &'a Mutex<HashMap<K, V>>,
) -> CachetResult<std::sync::MutexGuard<'a, HashMap<K, V>>> {
    mutex
        .lock()
        .map_err(|e| CachetError::Storage(format!("lock poisoned: {}", e)))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// All node addresses currently stored (for testing/inspection).
    pub fn node_addresses(&self) -> Vec<Address> {
        lock(&self.nodes)
            .map(|n| n.keys().copied().collect())
            .unwrap_or_default()
    }

    /// All file ids currently stored (for testing/inspection).
    pub fn file_ids(&self) -> Vec<DocId> {
        lock(&self.files)
            .map(|f| f.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        lock(&self.nodes).map(|n| n.len()).unwrap_or(0)
    }

    pub fn file_count(&self) -> usize {
        lock(&self.files).map(|f| f.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore for MemoryStore {
    fn put_node(&self, address: &Address, record: &NodeRecord) -> CachetResult<()> {
        let mut nodes = lock(&self.nodes)?;
        if nodes.contains_key(address) {
            return Err(CachetError::Collision(format!("node address {}", address)));
        }
        nodes.insert(*address, record.clone());
        Ok(())
    }

    fn get_node(&self, address: &Address) -> CachetResult<Option<NodeRecord>> {
        let nodes = lock(&self.nodes)?;
        Ok(nodes.get(address).cloned())
    }

    fn put_file(&self, file_id: &DocId, record: &FileRecord) -> CachetResult<()> {
        let mut files = lock(&self.files)?;
        if files.contains_key(file_id) {
            return Err(CachetError::Collision(format!("file id {}", file_id)));
        }
        files.insert(*file_id, record.clone());
        Ok(())
    }

    fn get_file(&self, file_id: &DocId) -> CachetResult<Option<FileRecord>> {
        let files = lock(&self.files)?;
        Ok(files.get(file_id).cloned())
    }

    fn stats(&self) -> CachetResult<StoreStats> {
        Ok(StoreStats {
            nodes: lock(&self.nodes)?.len() as u64,
            files: lock(&self.files)?.len() as u64,
        })
    }
}
