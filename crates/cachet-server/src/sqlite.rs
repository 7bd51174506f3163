use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::Mutex;

use cachet_core::{
    Address, CachetError, CachetResult, DocId, FileRecord, IndexStore, NodeRecord, StoreStats,
};

/// Durable SQLite store implementing [`IndexStore`].
///
/// Two tables, both keyed by hex text, both exact-match only: `nodes` for
/// the encrypted chain and `files` for sealed file payloads. No secondary
/// indexes exist or may be added; the address is the only handle the
/// server gets. A successful return from a `put` means the row is
/// committed; the client is entitled to treat it as durable.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    address    TEXT PRIMARY KEY NOT NULL,
    nonce      BLOB NOT NULL,
    ciphertext BLOB NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS files (
    file_id    TEXT PRIMARY KEY NOT NULL,
    nonce      BLOB NOT NULL,
    ciphertext BLOB NOT NULL,
    name_nonce BLOB NOT NULL,
    enc_name   BLOB NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);
";

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> CachetResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| CachetError::Storage(format!("failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> CachetResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CachetError::Storage(format!("failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> CachetResult<Self> {
        // WAL + synchronous=FULL: the INSERT is on disk before `put`
        // returns, so an acknowledged write survives a crash.
        let _mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| CachetError::Storage(format!("failed to set journal mode: {}", e)))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| CachetError::Storage(format!("failed to set synchronous: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| CachetError::Storage(format!("failed to create tables: {}", e)))?;

        tracing::debug!("sqlite store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> CachetResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CachetError::Storage(format!("lock poisoned: {}", e)))
    }
}

/// Map a failed INSERT to `Collision` when the primary key is taken.
fn map_insert_error(e: rusqlite::Error, what: String) -> CachetError {
    match e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::ConstraintViolation =>
        {
            CachetError::Collision(what)
        }
        other => CachetError::Storage(format!("insert failed: {}", other)),
    }
}

fn blob_to_nonce(blob: Vec<u8>, column: &str) -> CachetResult<[u8; 12]> {
    blob.try_into()
        .map_err(|_| CachetError::Storage(format!("corrupt {} column: wrong length", column)))
}

impl IndexStore for SqliteStore {
    fn put_node(&self, address: &Address, record: &NodeRecord) -> CachetResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO nodes (address, nonce, ciphertext) VALUES (?1, ?2, ?3)",
            params![address.to_hex(), &record.nonce[..], record.ciphertext],
        )
        .map_err(|e| map_insert_error(e, format!("node address {}", address)))?;
        Ok(())
    }

    fn get_node(&self, address: &Address) -> CachetResult<Option<NodeRecord>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT nonce, ciphertext FROM nodes WHERE address = ?1",
            params![address.to_hex()],
            |row| {
                let nonce: Vec<u8> = row.get(0)?;
                let ciphertext: Vec<u8> = row.get(1)?;
                Ok((nonce, ciphertext))
            },
        );
        match result {
            Ok((nonce, ciphertext)) => Ok(Some(NodeRecord {
                nonce: blob_to_nonce(nonce, "nonce")?,
                ciphertext,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CachetError::Storage(format!("query failed: {}", e))),
        }
    }

    fn put_file(&self, file_id: &DocId, record: &FileRecord) -> CachetResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO files (file_id, nonce, ciphertext, name_nonce, enc_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                file_id.to_hex(),
                &record.nonce[..],
                record.ciphertext,
                &record.name_nonce[..],
                record.enc_name,
            ],
        )
        .map_err(|e| map_insert_error(e, format!("file id {}", file_id)))?;
        Ok(())
    }

    fn get_file(&self, file_id: &DocId) -> CachetResult<Option<FileRecord>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT nonce, ciphertext, name_nonce, enc_name FROM files WHERE file_id = ?1",
            params![file_id.to_hex()],
            |row| {
                let nonce: Vec<u8> = row.get(0)?;
                let ciphertext: Vec<u8> = row.get(1)?;
                let name_nonce: Vec<u8> = row.get(2)?;
                let enc_name: Vec<u8> = row.get(3)?;
                Ok((nonce, ciphertext, name_nonce, enc_name))
            },
        );
        match result {
            Ok((nonce, ciphertext, name_nonce, enc_name)) => Ok(Some(FileRecord {
                nonce: blob_to_nonce(nonce, "nonce")?,
                ciphertext,
                name_nonce: blob_to_nonce(name_nonce, "name_nonce")?,
                enc_name,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CachetError::Storage(format!("query failed: {}", e))),
        }
    }

    fn stats(&self) -> CachetResult<StoreStats> {
        let conn = self.lock()?;
        let count = |table: &str| -> CachetResult<u64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(|e| CachetError::Storage(format!("count failed: {}", e)))
        };
        Ok(StoreStats {
            nodes: count("nodes")?,
            files: count("files")?,
        })
    }
}
