//! DbAdapter Trait - Document/Link Persistence Abstraction
//!
//! This module defines the `DbAdapter` trait every backend implements. The
//! whole application's relational data is expressed through two schema-less
//! primitives:
//!
//! - **Documents**: `(collection, key) -> JSON`
//! - **Links**: `(collection, parent_key, child_key) -> JSON`, queryable from
//!   either endpoint
//!
//! plus a handful of join queries that resolve links and their endpoint
//! documents in one call.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so the embedded and networked
//!    backends share one interface
//! 2. **Absence vs. failure**: `get_document` returns `Ok(None)` for a missing
//!    key; only `update_*` raises `StoreError::NotFound`
//! 3. **Shallow merge**: `update_*` is read-modify-write and is NOT atomic
//!    against concurrent writers to the same key (last merged blob wins)
//! 4. **No referential integrity**: links may name documents that don't exist
//! 5. **No transactions**: multi-call writes can be left half-applied
//!
//! # Examples
//!
//! ```rust,no_run
//! use yearbook_core::db::{DbAdapter, MemoryAdapter};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> yearbook_core::db::Result<()> {
//!     let store = MemoryAdapter::new();
//!
//!     store.add_document("groups", "writers", json!({"name": "Writers"})).await?;
//!     store
//!         .add_link("members", "writers", "ada", json!({"username": "ada", "status": "approved"}))
//!         .await?;
//!
//!     let members = store.get_child_links("members", "writers").await?;
//!     assert_eq!(members.len(), 1);
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

use crate::db::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// One entry of a full collection scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEntry {
    pub key: String,
    pub value: Value,
}

/// A group the user belongs to, with the user's membership and optionally the
/// viewer's own membership in the same group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupWithMembership {
    pub group: Value,
    pub membership: Value,
    pub viewer_membership: Option<Value>,
}

/// A group membership link with the member's profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberWithProfile {
    pub membership: Value,
    pub profile: Value,
}

/// A subscription link with the profile on the other end
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionWithProfile {
    pub subscription: Value,
    pub profile: Value,
}

/// An activity feed entry with its actor's profile and, when the update
/// belongs to a group, that group's document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateWithContext {
    pub update: Value,
    pub profile: Value,
    pub group: Option<Value>,
}

/// Abstraction over document/link storage backends
///
/// Implementations must be `Send + Sync`; the application constructs one
/// adapter at startup and passes it (usually as `Arc<dyn DbAdapter>`) to every
/// caller. Every backend must produce the same observable results, including
/// error kinds and messages.
///
/// Duplicate inserts (`add_document`/`add_link` on an existing key) fail with
/// `StoreError::AlreadyExists` on every backend.
#[async_trait]
pub trait DbAdapter: Send + Sync {
    //
    // DOCUMENTS
    //

    /// Fetch a document, `None` if the key is absent
    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// Insert a new document
    ///
    /// # Errors
    ///
    /// `StoreError::AlreadyExists` if `(collection, key)` is taken.
    async fn add_document(&self, collection: &str, key: &str, value: Value) -> Result<()>;

    /// Shallow-merge `patch` into an existing document
    ///
    /// Returns the merged value as written.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` naming the collection and key if the document
    /// does not exist.
    async fn update_document(&self, collection: &str, key: &str, patch: Value) -> Result<Value>;

    /// Full collection scan; order is backend-dependent
    async fn get_all_documents(&self, collection: &str) -> Result<Vec<DocumentEntry>>;

    //
    // LINKS
    //

    /// Insert one edge
    async fn add_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        value: Value,
    ) -> Result<()>;

    /// All edges in `collection` with the given parent
    async fn get_child_links(&self, collection: &str, parent_key: &str) -> Result<Vec<Value>>;

    /// All edges in `collection` with the given child
    async fn get_parent_links(&self, collection: &str, child_key: &str) -> Result<Vec<Value>>;

    /// Shallow-merge `patch` into an existing edge
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` naming the collection, parent and child.
    async fn update_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        patch: Value,
    ) -> Result<Value>;

    /// Remove an edge; removing an absent edge is a no-op
    async fn delete_link(&self, collection: &str, parent_key: &str, child_key: &str)
        -> Result<()>;

    //
    // JOIN QUERIES
    //

    /// Groups `username` is a member of, each with its group document, the
    /// user's membership and (if `viewer` is given) the viewer's membership
    ///
    /// Memberships whose group document is missing are dropped.
    async fn get_user_groups_with_membership(
        &self,
        username: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<GroupWithMembership>>;

    /// Members of `group_name` with their profiles; members without a profile
    /// document are silently dropped
    async fn get_group_members_with_profiles(
        &self,
        group_name: &str,
    ) -> Result<Vec<MemberWithProfile>>;

    /// Who `subscriber` follows, with each target's profile
    async fn get_subscriptions_with_profiles(
        &self,
        subscriber: &str,
    ) -> Result<Vec<SubscriptionWithProfile>>;

    /// Who follows `target`, with each subscriber's profile
    async fn get_subscribers_with_profiles(
        &self,
        target: &str,
    ) -> Result<Vec<SubscriptionWithProfile>>;

    /// Activity feed of `recipient` with actor profiles and groups
    ///
    /// Entries whose actor profile is missing, or whose named group is missing,
    /// are dropped.
    async fn get_updates_with_profiles_and_groups(
        &self,
        recipient: &str,
    ) -> Result<Vec<UpdateWithContext>>;

    //
    // LIFECYCLE
    //

    /// Release underlying connections
    ///
    /// Call exactly once during shutdown. Operations issued afterwards fail
    /// with `StoreError::Closed`.
    async fn close(&self) -> Result<()>;
}
