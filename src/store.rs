use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::params;
use tokio::sync::Mutex;

use crate::model::ShortLink;

#[derive(Clone, Debug)]
pub struct StoreError {
    pub message: String,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    pub fn new(message: String) -> Self {
        Self { message }
    }

    pub fn from(e: impl std::error::Error) -> Self {
        Self::new(format!("{}", e))
    }
}

/// The record store capability both binaries are handed. A flat key-value
/// namespace: one JSON record per slug, no indexing, no transactions. The
/// get/put sequences built on top are not atomic; see DESIGN.md.
#[async_trait]
pub trait LinkStore: std::fmt::Debug + Send + Sync {
    /// Fetches the record under `slug`, or `None` when the key is absent.
    async fn get(&self, slug: &str) -> Result<Option<ShortLink>, Box<StoreError>>;

    /// Writes the full record under `slug`, overwriting any existing value.
    async fn put(&self, slug: &str, link: &ShortLink) -> Result<(), Box<StoreError>>;

    /// Removes `slug`. Deleting an absent key is not an error.
    async fn delete(&self, slug: &str) -> Result<(), Box<StoreError>>;

    /// Every key in the namespace, in store enumeration order.
    async fn list_keys(&self) -> Result<Vec<String>, Box<StoreError>>;
}

pub type SharedStore = Arc<dyn LinkStore>;

/// Sqlite-backed store: a single `link` table keyed by slug, the record
/// held as a JSON document in the `record` column.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    connection: Arc<Mutex<rusqlite::Connection>>,
}

fn create_link_table(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        r#"create table if not exists link(
    slug    TEXT PRIMARY KEY,
    record  TEXT NOT NULL -- JSON: {"url", "enabled", "usages"}
)"#,
        (),
    )?;

    Ok(())
}

impl SqliteStore {
    pub fn new(connection: rusqlite::Connection) -> Result<Self, rusqlite::Error> {
        create_link_table(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::new(rusqlite::Connection::open_in_memory()?)
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn get(&self, slug: &str) -> Result<Option<ShortLink>, Box<StoreError>> {
        let conn = self.connection.lock().await;

        let mut stmt = conn
            .prepare("SELECT record FROM link WHERE slug = ?1")
            .map_err(|e| StoreError::from(e))?;
        match stmt.query_one([slug], |row| row.get::<_, serde_json::Value>(0)) {
            Ok(record) => {
                let link = serde_json::from_value(record).map_err(|e| StoreError::from(e))?;
                Ok(Some(link))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(StoreError::from(e))),
        }
    }

    async fn put(&self, slug: &str, link: &ShortLink) -> Result<(), Box<StoreError>> {
        let record = serde_json::to_value(link).map_err(|e| StoreError::from(e))?;
        let conn = self.connection.lock().await;

        conn.execute(
            r#"INSERT INTO link (slug, record) VALUES (?1, ?2)
    ON CONFLICT(slug) DO UPDATE SET record = excluded.record"#,
            params![slug, record],
        )
        .map_err(|e| StoreError::from(e))?;

        Ok(())
    }

    async fn delete(&self, slug: &str) -> Result<(), Box<StoreError>> {
        let conn = self.connection.lock().await;

        conn.execute("DELETE FROM link WHERE slug = ?1", [slug])
            .map_err(|e| StoreError::from(e))?;

        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, Box<StoreError>> {
        let conn = self.connection.lock().await;

        let mut stmt = conn
            .prepare("SELECT slug FROM link")
            .map_err(|e| StoreError::from(e))?;
        let rows = stmt.query([]).map_err(|e| StoreError::from(e))?;
        let slugs: Vec<String> = rows
            .map(|row| row.get(0))
            .collect()
            .map_err(|e| Box::new(StoreError::from(e)))?;

        Ok(slugs)
    }
}

/// In-memory store used to exercise the resolver and management core in
/// tests without touching disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    links: DashMap<String, ShortLink>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn get(&self, slug: &str) -> Result<Option<ShortLink>, Box<StoreError>> {
        Ok(self.links.get(slug).map(|entry| entry.value().clone()))
    }

    async fn put(&self, slug: &str, link: &ShortLink) -> Result<(), Box<StoreError>> {
        self.links.insert(slug.to_string(), link.clone());
        Ok(())
    }

    async fn delete(&self, slug: &str) -> Result<(), Box<StoreError>> {
        self.links.remove(slug);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, Box<StoreError>> {
        Ok(self.links.iter().map(|entry| entry.key().clone()).collect())
    }
}
