//! Durable client state: the keyword → chain-head table.
//!
//! This table *is* the client secret. Losing it makes every chain
//! unrecoverable (the server holds nothing that can rebuild it); leaking
//! it hands an attacker every keyword's full history. It is
//! persisted as JSON with every byte string hex-encoded, so arbitrary
//! keyword bytes survive the round trip, and written atomically
//! (temp file, fsync, rename) so a crash can never tear it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use cachet_core::{CachetError, CachetResult, HeadPointer};

/// In-memory head table. Keyed by raw keyword bytes; a missing entry means
/// the keyword's chain is empty.
#[derive(Debug, Default)]
pub struct HeadTable {
    heads: BTreeMap<Vec<u8>, HeadPointer>,
}

/// On-disk form: hex keyword → hex head fields.
#[derive(Serialize, Deserialize)]
struct PersistedHeads {
    heads: BTreeMap<String, HeadPointer>,
}

impl HeadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, keyword: &[u8]) -> Option<&HeadPointer> {
        self.heads.get(keyword)
    }

    /// Rotate the head for `keyword` to a new pointer.
    pub fn set(&mut self, keyword: &[u8], head: HeadPointer) {
        self.heads.insert(keyword.to_vec(), head);
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Load the table from `path`. A missing file is an empty table;
    /// anything unreadable or malformed is fatal.
    pub fn load(path: &Path) -> CachetResult<Self> {
        let contents = match fs::read(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(CachetError::State(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let persisted: PersistedHeads = serde_json::from_slice(&contents).map_err(|e| {
            CachetError::State(format!("malformed state file {}: {}", path.display(), e))
        })?;

        let mut heads = BTreeMap::new();
        for (hex_keyword, head) in persisted.heads {
            let keyword = hex::decode(&hex_keyword).map_err(|e| {
                CachetError::State(format!("malformed keyword key in state file: {}", e))
            })?;
            heads.insert(keyword, head);
        }
        Ok(Self { heads })
    }

    /// Persist the table to `path` atomically: write a sibling temp file,
    /// fsync it, then rename over the target.
    pub fn save(&self, path: &Path) -> CachetResult<()> {
        let persisted = PersistedHeads {
            heads: self
                .heads
                .iter()
                .map(|(keyword, head)| (hex::encode(keyword), head.clone()))
                .collect(),
        };
        let contents = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| CachetError::Serialization(format!("serialize state: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
