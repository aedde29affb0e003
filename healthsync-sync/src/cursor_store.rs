//! Persistent per-sample-type cursor storage.
//!
//! The sync core only needs get/set by key. Keys are independent: no
//! cross-key ordering is required, and each key is only ever written by the
//! observer holding that sample type's fetch lock.

use async_trait::async_trait;
use chrono::DateTime;
use healthsync_types::{AnchorToken, SyncCursor};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Result type for cursor store operations.
pub type CursorStoreResult<T> = Result<T, CursorStoreError>;

/// Errors raised by cursor stores.
#[derive(Debug, Error)]
pub enum CursorStoreError {
    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The blocking worker failed.
    #[error("blocking task failed: {0}")]
    TaskJoin(String),

    /// The store cannot serve requests.
    #[error("cursor store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value storage of sync cursors.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Returns the cursor stored under `key`, if any.
    async fn get(&self, key: &str) -> CursorStoreResult<Option<SyncCursor>>;

    /// Stores `cursor` under `key`, replacing any previous value.
    async fn set(&self, key: &str, cursor: SyncCursor) -> CursorStoreResult<()>;
}

/// In-memory cursor store.
#[derive(Debug, Default, Clone)]
pub struct MemoryCursorStore {
    cursors: Arc<RwLock<HashMap<String, SyncCursor>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored cursors.
    pub async fn len(&self) -> usize {
        self.cursors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cursors.read().await.is_empty()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, key: &str) -> CursorStoreResult<Option<SyncCursor>> {
        Ok(self.cursors.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, cursor: SyncCursor) -> CursorStoreResult<()> {
        self.cursors.write().await.insert(key.to_string(), cursor);
        Ok(())
    }
}

const KIND_TIMESTAMP: &str = "timestamp";
const KIND_ANCHOR: &str = "anchor";

/// Cursor store backed by a SQLite file.
///
/// Blocking SQLite calls run on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteCursorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCursorStore {
    /// Opens (or creates) a cursor store at the given path.
    pub fn open(path: impl AsRef<Path>) -> CursorStoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory cursor store.
    pub fn open_in_memory() -> CursorStoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> CursorStoreResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sync_cursors (
                key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                timestamp_ms INTEGER,
                anchor BLOB
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, op: F) -> CursorStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CursorStoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CursorStoreError::Unavailable("connection lock poisoned".into()))?;
            op(&guard)
        })
        .await
        .map_err(|e| CursorStoreError::TaskJoin(e.to_string()))?
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn get(&self, key: &str) -> CursorStoreResult<Option<SyncCursor>> {
        let key = key.to_string();
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT kind, timestamp_ms, anchor FROM sync_cursors WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<i64>>(1)?,
                            row.get::<_, Option<Vec<u8>>>(2)?,
                        ))
                    },
                )
                .optional()?;

            let Some((kind, timestamp_ms, anchor)) = row else {
                return Ok(None);
            };

            let cursor = match (kind.as_str(), timestamp_ms, anchor) {
                (KIND_TIMESTAMP, Some(ms), _) => {
                    let t = DateTime::from_timestamp_millis(ms).ok_or_else(|| {
                        CursorStoreError::InvalidData(format!("{key}: timestamp out of range"))
                    })?;
                    SyncCursor::Timestamp(t)
                }
                (KIND_ANCHOR, _, Some(bytes)) => SyncCursor::Anchor(AnchorToken::new(bytes)),
                (other, _, _) => {
                    return Err(CursorStoreError::InvalidData(format!(
                        "{key}: malformed cursor of kind {other:?}"
                    )));
                }
            };
            Ok(Some(cursor))
        })
        .await
    }

    async fn set(&self, key: &str, cursor: SyncCursor) -> CursorStoreResult<()> {
        let key = key.to_string();
        self.run(move |conn| {
            let (timestamp_ms, anchor) = match &cursor {
                SyncCursor::Timestamp(t) => (Some(t.timestamp_millis()), None),
                SyncCursor::Anchor(a) => (None, Some(a.as_bytes().to_vec())),
            };
            conn.execute(
                "INSERT OR REPLACE INTO sync_cursors (key, kind, timestamp_ms, anchor)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key, cursor.kind(), timestamp_ms, anchor],
            )?;
            debug!("Stored {} cursor for {}", cursor.kind(), key);
            Ok(())
        })
        .await
    }
}

impl std::fmt::Debug for SqliteCursorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCursorStore").finish_non_exhaustive()
    }
}
