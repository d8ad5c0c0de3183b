//! SQLite implementation of the SnapshotStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use mergehub_core::{ContentDigest, SnapshotId, StoreId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{CreateResult, Snapshot, SnapshotMeta, SnapshotStore};

const SNAPSHOT_COLUMNS: &str = "s.id, s.store_id, s.digest, s.size, s.created_at, s.content";
const META_COLUMNS: &str = "s.id, s.store_id, s.digest, s.size, s.created_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection mutex poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {e}")))?
    }
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

// Columns in META_COLUMNS order.
fn row_to_meta(row: &Row<'_>) -> rusqlite::Result<SnapshotMeta> {
    let store_id: String = row.get(1)?;
    let digest: Vec<u8> = row.get(2)?;
    let size: i64 = row.get(3)?;

    Ok(SnapshotMeta {
        id: SnapshotId::from_raw(row.get(0)?),
        store_id: StoreId::new(store_id).map_err(|e| conversion_error(1, Type::Text, e))?,
        digest: ContentDigest::try_from(digest.as_slice())
            .map_err(|e| conversion_error(2, Type::Blob, e))?,
        size: u64::try_from(size).map_err(|e| conversion_error(3, Type::Integer, e))?,
        created_at: row.get(4)?,
    })
}

// Columns in SNAPSHOT_COLUMNS order.
fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    let meta = row_to_meta(row)?;
    let content: Vec<u8> = row.get(5)?;
    Ok(Snapshot {
        meta,
        content: Bytes::from(content),
    })
}

fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    let meta = &snapshot.meta;
    conn.execute(
        "INSERT INTO snapshots (id, store_id, content, digest, size, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            meta.id.as_i64(),
            meta.store_id.as_str(),
            snapshot.content.as_ref(),
            meta.digest.as_bytes().as_slice(),
            meta.size as i64,
            meta.created_at,
        ],
    )?;
    Ok(())
}

fn pointer(conn: &Connection, store_id: &StoreId) -> Result<Option<SnapshotId>> {
    Ok(conn
        .query_row(
            "SELECT snapshot_id FROM stores WHERE id = ?1",
            params![store_id.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .map(SnapshotId::from_raw))
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn create_store(&self, store_id: &StoreId, content: &[u8]) -> Result<CreateResult> {
        let snapshot = Snapshot::new(store_id.clone(), content, crate::now_millis());

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            if pointer(&tx, &snapshot.meta.store_id)?.is_some() {
                return Ok(CreateResult::AlreadyExists);
            }

            insert_snapshot(&tx, &snapshot)?;
            tx.execute(
                "INSERT INTO stores (id, snapshot_id, updated_at) VALUES (?1, ?2, ?3)",
                params![
                    snapshot.meta.store_id.as_str(),
                    snapshot.meta.id.as_i64(),
                    snapshot.meta.created_at,
                ],
            )?;
            tx.commit()?;

            Ok(CreateResult::Created(snapshot.meta))
        })
        .await
    }

    async fn commit(
        &self,
        store_id: &StoreId,
        expected: SnapshotId,
        content: &[u8],
    ) -> Result<SnapshotMeta> {
        let snapshot = Snapshot::new(store_id.clone(), content, crate::now_millis());

        let meta = self
            .blocking(move |conn| {
                let tx = conn.transaction()?;
                let store_id = &snapshot.meta.store_id;

                let actual =
                    pointer(&tx, store_id)?.ok_or_else(|| StoreError::NotFound(store_id.clone()))?;
                if actual != expected {
                    return Err(StoreError::Conflict {
                        store_id: store_id.clone(),
                        expected,
                        actual,
                    });
                }

                insert_snapshot(&tx, &snapshot)?;
                let updated = tx.execute(
                    "UPDATE stores SET snapshot_id = ?1, updated_at = ?2
                     WHERE id = ?3 AND snapshot_id = ?4",
                    params![
                        snapshot.meta.id.as_i64(),
                        snapshot.meta.created_at,
                        store_id.as_str(),
                        expected.as_i64(),
                    ],
                )?;
                if updated != 1 {
                    return Err(StoreError::InvalidData(format!(
                        "pointer update for {store_id} touched {updated} rows"
                    )));
                }
                tx.commit()?;

                Ok(snapshot.meta)
            })
            .await?;

        tracing::debug!(
            store = %meta.store_id,
            snapshot = %meta.id,
            size = meta.size,
            "committed snapshot"
        );
        Ok(meta)
    }

    async fn current(&self, store_id: &StoreId) -> Result<Option<Snapshot>> {
        let store_id = store_id.clone();
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM stores st
                     JOIN snapshots s ON s.id = st.snapshot_id
                     WHERE st.id = ?1"
                ),
                params![store_id.as_str()],
                row_to_snapshot,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_current(&self) -> Result<Vec<Snapshot>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM stores st
                 JOIN snapshots s ON s.id = st.snapshot_id
                 ORDER BY st.id"
            ))?;
            let snapshots = stmt
                .query_map([], row_to_snapshot)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(snapshots)
        })
        .await
    }

    async fn list_stores(&self) -> Result<Vec<StoreId>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM stores ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    StoreId::new(id).map_err(|e| conversion_error(0, Type::Text, e))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots s WHERE s.id = ?1"),
                params![id.as_i64()],
                row_to_snapshot,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn history(&self, store_id: &StoreId) -> Result<Vec<SnapshotMeta>> {
        let store_id = store_id.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {META_COLUMNS} FROM snapshots s WHERE s.store_id = ?1 ORDER BY s.id"
            ))?;
            let metas = stmt
                .query_map(params![store_id.as_str()], row_to_meta)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(metas)
        })
        .await
    }
}
