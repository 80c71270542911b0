//! SQLite document store
//!
//! Documents are stored as JSON text keyed by path. Partial updates run
//! read-merge-write inside one transaction; a concurrent writer to the same
//! database fails with a busy error instead of dropping either set of fields.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;

use super::{merge_fields, DocPath, Document, DocumentStore, StoreError};

#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn connect(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("create {}: {}", parent.display(), e)))?;
        }

        // mode=rwc: read, write, create
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!("Connecting to database: {}", db_url);

        let pool = SqlitePool::connect(&db_url).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database
    ///
    /// Pinned to one connection that never expires: every SQLite in-memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Create the documents table if it doesn't exist
async fn init_tables(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (documents)");
    Ok(())
}

fn decode(path: &DocPath, raw: &str) -> Result<Document, StoreError> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject(path.to_string())),
    }
}

async fn read_document(
    conn: &mut SqliteConnection,
    path: &DocPath,
) -> Result<Option<Document>, StoreError> {
    let raw: Option<String> = sqlx::query_scalar("SELECT data FROM documents WHERE path = ?")
        .bind(path.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    raw.map(|raw| decode(path, &raw)).transpose()
}

async fn write_document(
    conn: &mut SqliteConnection,
    path: &DocPath,
    document: &Document,
) -> Result<(), StoreError> {
    let data = serde_json::to_string(document)?;
    sqlx::query(
        r#"
        INSERT INTO documents (path, data, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(path.as_str())
    .bind(data)
    .bind(fiinny_common::time::now_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        read_document(&mut conn, path).await
    }

    async fn apply_partial_update(
        &self,
        path: &DocPath,
        fields: Document,
    ) -> Result<(), StoreError> {
        // Rolled back on drop unless committed
        let mut tx = self.pool.begin().await?;

        let mut document = read_document(&mut *tx, path).await?.unwrap_or_default();
        merge_fields(&mut document, fields);
        write_document(&mut *tx, path, &document).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn put(&self, path: &DocPath, document: Document) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        write_document(&mut conn, path, &document).await
    }
}
