//! RemoteAdapter - Networked libsql (Turso) Backend
//!
//! Talks to a remote/edge libsql service over Hrana (HTTP) with positional
//! `?` placeholders. The statements are the same ones the embedded adapter
//! runs; see [`crate::db::sql`].
//!
//! # Failure Semantics
//!
//! Network and server errors are returned as `StoreError::Backend` exactly as
//! the driver reports them. There is no retry here; callers that want one
//! wrap the call themselves.
//!
//! # Consistency
//!
//! Reads may be served by a replica and can lag behind a write made a moment
//! earlier. Nothing here waits for replication.

use crate::db::adapter::{
    DbAdapter, DocumentEntry, GroupWithMembership, MemberWithProfile, SubscriptionWithProfile,
    UpdateWithContext,
};
use crate::db::error::{Result, StoreError};
use crate::db::sql;
use async_trait::async_trait;
use libsql::{Builder, Connection};
use serde_json::Value;
use tokio::sync::RwLock;

/// Networked `DbAdapter`
pub struct RemoteAdapter {
    /// `None` after `close()`
    conn: RwLock<Option<Connection>>,
    endpoint: String,
}

impl RemoteAdapter {
    /// Connect to `url` with `auth_token` and ensure the schema exists
    ///
    /// # Errors
    ///
    /// - `StoreError::Config` if either argument is empty
    /// - `StoreError::Backend` if the endpoint rejects the connection or DDL
    pub async fn new(url: &str, auth_token: &str) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(StoreError::config("remote database URL is empty"));
        }
        if auth_token.trim().is_empty() {
            return Err(StoreError::config("remote auth token is empty"));
        }

        let db = Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await?;
        let conn = db.connect()?;

        sql::initialize_schema(&conn).await?;

        let endpoint = endpoint_host(url);
        tracing::info!(endpoint = %endpoint, "Connected to remote store");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            endpoint,
        })
    }

    async fn conn(&self) -> Result<Connection> {
        self.conn.read().await.clone().ok_or(StoreError::Closed)
    }
}

/// Host part of the URL for logs; never includes credentials or query
fn endpoint_host(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or(without_scheme);
    authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host)
        .to_string()
}

#[async_trait]
impl DbAdapter for RemoteAdapter {
    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        sql::get_document(&self.conn().await?, collection, key).await
    }

    async fn add_document(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        sql::add_document(&self.conn().await?, collection, key, &value).await
    }

    async fn update_document(&self, collection: &str, key: &str, patch: Value) -> Result<Value> {
        sql::update_document(&self.conn().await?, collection, key, &patch).await
    }

    async fn get_all_documents(&self, collection: &str) -> Result<Vec<DocumentEntry>> {
        sql::get_all_documents(&self.conn().await?, collection).await
    }

    async fn add_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        value: Value,
    ) -> Result<()> {
        sql::add_link(&self.conn().await?, collection, parent_key, child_key, &value).await
    }

    async fn get_child_links(&self, collection: &str, parent_key: &str) -> Result<Vec<Value>> {
        sql::get_child_links(&self.conn().await?, collection, parent_key).await
    }

    async fn get_parent_links(&self, collection: &str, child_key: &str) -> Result<Vec<Value>> {
        sql::get_parent_links(&self.conn().await?, collection, child_key).await
    }

    async fn update_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        patch: Value,
    ) -> Result<Value> {
        sql::update_link(&self.conn().await?, collection, parent_key, child_key, &patch).await
    }

    async fn delete_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
    ) -> Result<()> {
        sql::delete_link(&self.conn().await?, collection, parent_key, child_key).await
    }

    async fn get_user_groups_with_membership(
        &self,
        username: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<GroupWithMembership>> {
        sql::get_user_groups_with_membership(&self.conn().await?, username, viewer).await
    }

    async fn get_group_members_with_profiles(
        &self,
        group_name: &str,
    ) -> Result<Vec<MemberWithProfile>> {
        sql::get_group_members_with_profiles(&self.conn().await?, group_name).await
    }

    async fn get_subscriptions_with_profiles(
        &self,
        subscriber: &str,
    ) -> Result<Vec<SubscriptionWithProfile>> {
        sql::get_subscriptions_with_profiles(&self.conn().await?, subscriber).await
    }

    async fn get_subscribers_with_profiles(
        &self,
        target: &str,
    ) -> Result<Vec<SubscriptionWithProfile>> {
        sql::get_subscribers_with_profiles(&self.conn().await?, target).await
    }

    async fn get_updates_with_profiles_and_groups(
        &self,
        recipient: &str,
    ) -> Result<Vec<UpdateWithContext>> {
        sql::get_updates_with_profiles_and_groups(&self.conn().await?, recipient).await
    }

    /// Drop the connection handle; in-flight calls holding a clone finish first
    async fn close(&self) -> Result<()> {
        match self.conn.write().await.take() {
            Some(_) => tracing::info!(endpoint = %self.endpoint, "Closed remote store"),
            None => tracing::warn!(endpoint = %self.endpoint, "Remote store closed more than once"),
        }
        Ok(())
    }
}
