//! LocalAdapter - Embedded libsql Backend
//!
//! Stores documents and links in a local SQLite-compatible file. Single
//! process, no network, no replica lag.
//!
//! # Connection Pattern
//!
//! Every operation opens its own connection through `connect_with_timeout()`,
//! which sets a 5-second busy timeout. A connection is never held across
//! operations, so Tokio can move futures between threads freely and
//! concurrent writers wait for the lock instead of failing with `SQLITE_BUSY`.
//!
//! `:memory:` is not supported: each connection would see its own empty
//! database. Use a temporary file (or `MemoryAdapter`) in tests.
//!
//! # Examples
//!
//! ```rust,no_run
//! use yearbook_core::db::{DbAdapter, LocalAdapter};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> yearbook_core::db::Result<()> {
//!     let store = LocalAdapter::new(PathBuf::from("./data/yearbook.db")).await?;
//!     let profile = store.get_document("profiles", "ada").await?;
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

use crate::db::adapter::{
    DbAdapter, DocumentEntry, GroupWithMembership, MemberWithProfile, SubscriptionWithProfile,
    UpdateWithContext,
};
use crate::db::error::{Result, StoreError};
use crate::db::sql;
use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Embedded `DbAdapter` over a local libsql database file
pub struct LocalAdapter {
    db: Database,
    db_path: PathBuf,
    closed: AtomicBool,
}

impl LocalAdapter {
    /// Open (or create) the database file and ensure the schema exists
    ///
    /// This will:
    /// 1. Create the parent directory if needed
    /// 2. Open the database file
    /// 3. Enable WAL mode
    /// 4. Create tables and indexes (idempotent)
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` if the parent directory cannot be created
    /// - `StoreError::Backend` if the file cannot be opened or the schema fails
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path).build().await?;

        let adapter = Self {
            db,
            db_path,
            closed: AtomicBool::new(false),
        };

        let conn = adapter.connect_with_timeout().await?;
        execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;
        sql::initialize_schema(&conn).await?;

        tracing::info!(path = %adapter.db_path.display(), "Opened local store");
        Ok(adapter)
    }

    /// Path to the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get a connection with busy timeout configured
    ///
    /// Fails with `StoreError::Closed` once `close()` has run.
    pub async fn connect_with_timeout(&self) -> Result<Connection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        let conn = self.db.connect()?;
        execute_pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        Ok(conn)
    }
}

/// PRAGMA statements return rows, so they go through query() rather than execute()
async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<()> {
    let mut rows = conn.query(pragma, ()).await?;
    while rows.next().await?.is_some() {}
    Ok(())
}

#[async_trait]
impl DbAdapter for LocalAdapter {
    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_document(&conn, collection, key).await
    }

    async fn add_document(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        let conn = self.connect_with_timeout().await?;
        sql::add_document(&conn, collection, key, &value).await
    }

    async fn update_document(&self, collection: &str, key: &str, patch: Value) -> Result<Value> {
        let conn = self.connect_with_timeout().await?;
        sql::update_document(&conn, collection, key, &patch).await
    }

    async fn get_all_documents(&self, collection: &str) -> Result<Vec<DocumentEntry>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_all_documents(&conn, collection).await
    }

    async fn add_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        value: Value,
    ) -> Result<()> {
        let conn = self.connect_with_timeout().await?;
        sql::add_link(&conn, collection, parent_key, child_key, &value).await
    }

    async fn get_child_links(&self, collection: &str, parent_key: &str) -> Result<Vec<Value>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_child_links(&conn, collection, parent_key).await
    }

    async fn get_parent_links(&self, collection: &str, child_key: &str) -> Result<Vec<Value>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_parent_links(&conn, collection, child_key).await
    }

    async fn update_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        patch: Value,
    ) -> Result<Value> {
        let conn = self.connect_with_timeout().await?;
        sql::update_link(&conn, collection, parent_key, child_key, &patch).await
    }

    async fn delete_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
    ) -> Result<()> {
        let conn = self.connect_with_timeout().await?;
        sql::delete_link(&conn, collection, parent_key, child_key).await
    }

    async fn get_user_groups_with_membership(
        &self,
        username: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<GroupWithMembership>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_user_groups_with_membership(&conn, username, viewer).await
    }

    async fn get_group_members_with_profiles(
        &self,
        group_name: &str,
    ) -> Result<Vec<MemberWithProfile>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_group_members_with_profiles(&conn, group_name).await
    }

    async fn get_subscriptions_with_profiles(
        &self,
        subscriber: &str,
    ) -> Result<Vec<SubscriptionWithProfile>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_subscriptions_with_profiles(&conn, subscriber).await
    }

    async fn get_subscribers_with_profiles(
        &self,
        target: &str,
    ) -> Result<Vec<SubscriptionWithProfile>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_subscribers_with_profiles(&conn, target).await
    }

    async fn get_updates_with_profiles_and_groups(
        &self,
        recipient: &str,
    ) -> Result<Vec<UpdateWithContext>> {
        let conn = self.connect_with_timeout().await?;
        sql::get_updates_with_profiles_and_groups(&conn, recipient).await
    }

    /// Flush the WAL into the main file and refuse further operations
    async fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            tracing::warn!(path = %self.db_path.display(), "Local store closed more than once");
            return Ok(());
        }

        let conn = self.connect_with_timeout().await?;
        execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)").await?;
        self.closed.store(true, Ordering::Release);

        tracing::info!(path = %self.db_path.display(), "Closed local store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open() -> (LocalAdapter, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let store = LocalAdapter::new(db_path).await.unwrap();
        (store, temp_dir)
    }

    async fn object_names(store: &LocalAdapter, kind: &str) -> Vec<String> {
        let conn = store.connect_with_timeout().await.unwrap();
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = ? ORDER BY name",
                [kind],
            )
            .await
            .unwrap();
        let mut names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            names.push(row.get::<String>(0).unwrap());
        }
        names
    }

    #[tokio::test]
    async fn test_creates_missing_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("dir").join("test.db");

        let store = LocalAdapter::new(db_path.clone()).await.unwrap();

        assert_eq!(store.db_path(), db_path.as_path());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_schema_tables_and_indexes() {
        let (store, _temp_dir) = open().await;

        let tables = object_names(&store, "table").await;
        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"links".to_string()));

        let indexes = object_names(&store, "index").await;
        assert!(indexes.contains(&"idx_links_parent".to_string()));
        assert!(indexes.contains(&"idx_links_child".to_string()));
    }

    #[tokio::test]
    async fn test_reopen_keeps_data_and_schema_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let store = LocalAdapter::new(db_path.clone()).await.unwrap();
        store
            .add_document("profiles", "ada", json!({"username": "ada"}))
            .await
            .unwrap();
        store.close().await.unwrap();

        let reopened = LocalAdapter::new(db_path).await.unwrap();
        let doc = reopened.get_document("profiles", "ada").await.unwrap();
        assert_eq!(doc, Some(json!({"username": "ada"})));
    }

    #[tokio::test]
    async fn test_data_column_is_json_text() {
        let (store, _temp_dir) = open().await;
        store
            .add_document("groups", "writers", json!({"name": "Writers"}))
            .await
            .unwrap();

        let conn = store.connect_with_timeout().await.unwrap();
        let mut rows = conn
            .query(
                "SELECT typeof(data), json_extract(data, '$.name') FROM documents WHERE key = ?",
                ["writers"],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "text");
        assert_eq!(row.get::<String>(1).unwrap(), "Writers");
    }

    #[tokio::test]
    async fn test_corrupt_data_is_serialization_error() {
        let (store, _temp_dir) = open().await;
        let conn = store.connect_with_timeout().await.unwrap();
        conn.execute(
            "INSERT INTO documents (collection, key, data) VALUES ('profiles', 'bad', 'not json')",
            (),
        )
        .await
        .unwrap();

        let err = store.get_document("profiles", "bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let (store, _temp_dir) = open().await;
        store.close().await.unwrap();
        store.close().await.unwrap();

        let err = store.get_child_links("members", "g").await.unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }
}
