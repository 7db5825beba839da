//! Collection Names and Typed Payloads
//!
//! The links table is shared by every relation kind; the collection string is
//! the only discriminator. This module pins the known names to enums and gives
//! each kind a payload struct, so application code goes through [`TypedStore`]
//! instead of passing raw strings and untyped JSON around.
//!
//! Link key conventions:
//!
//! | collection      | parent key          | child key        |
//! |-----------------|---------------------|------------------|
//! | `members`       | group name          | username         |
//! | `subscriptions` | subscriber username | target username  |
//! | `updates`       | recipient username  | update id (uuid) |
//!
//! Payload structs keep unrecognized fields in `extra`, so documents written by
//! other tooling survive a typed read-modify-write unchanged.

use crate::db::adapter::DbAdapter;
use crate::db::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub const PROFILES: &str = "profiles";
pub const GROUPS: &str = "groups";
pub const MEMBERS: &str = "members";
pub const SUBSCRIPTIONS: &str = "subscriptions";
pub const UPDATES: &str = "updates";

/// Document collections known to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocCollection {
    Profiles,
    Groups,
}

impl DocCollection {
    pub const ALL: [DocCollection; 2] = [DocCollection::Profiles, DocCollection::Groups];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocCollection::Profiles => PROFILES,
            DocCollection::Groups => GROUPS,
        }
    }
}

/// Link collections known to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkCollection {
    Members,
    Subscriptions,
    Updates,
}

impl LinkCollection {
    pub const ALL: [LinkCollection; 3] = [
        LinkCollection::Members,
        LinkCollection::Subscriptions,
        LinkCollection::Updates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkCollection::Members => MEMBERS,
            LinkCollection::Subscriptions => SUBSCRIPTIONS,
            LinkCollection::Updates => UPDATES,
        }
    }
}

impl fmt::Display for DocCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for LinkCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// `profiles` document, keyed by username
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `groups` document, keyed by group name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Approved,
}

/// `members` link payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub group_name: String,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `subscriptions` link payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscriber: String,
    pub target: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `updates` link payload; one copy is fanned out per recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityUpdate {
    #[serde(default)]
    pub id: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn decode<T: DeserializeOwned>(collection: impl fmt::Display, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| StoreError::invalid_payload(collection.to_string(), e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn decode_all<T: DeserializeOwned>(
    collection: LinkCollection,
    values: Vec<Value>,
) -> Result<Vec<T>> {
    values.into_iter().map(|v| decode(collection, v)).collect()
}

/// Typed accessors over a [`DbAdapter`]
///
/// Payloads are validated by deserializing into the collection's struct; a
/// stored value with the wrong shape surfaces as `StoreError::InvalidPayload`.
#[derive(Clone)]
pub struct TypedStore {
    store: Arc<dyn DbAdapter>,
}

impl TypedStore {
    pub fn new(store: Arc<dyn DbAdapter>) -> Self {
        Self { store }
    }

    /// Underlying untyped adapter (for join queries and ad-hoc access)
    pub fn adapter(&self) -> &Arc<dyn DbAdapter> {
        &self.store
    }

    async fn document<T: DeserializeOwned>(
        &self,
        collection: DocCollection,
        key: &str,
    ) -> Result<Option<T>> {
        match self.store.get_document(collection.as_str(), key).await? {
            Some(value) => Ok(Some(decode(collection, value)?)),
            None => Ok(None),
        }
    }

    async fn insert_document<T: Serialize>(
        &self,
        collection: DocCollection,
        key: &str,
        payload: &T,
    ) -> Result<()> {
        self.store
            .add_document(collection.as_str(), key, encode(payload)?)
            .await
    }

    async fn insert_link<T: Serialize>(
        &self,
        collection: LinkCollection,
        parent_key: &str,
        child_key: &str,
        payload: &T,
    ) -> Result<()> {
        self.store
            .add_link(collection.as_str(), parent_key, child_key, encode(payload)?)
            .await
    }

    pub async fn profile(&self, username: &str) -> Result<Option<Profile>> {
        self.document(DocCollection::Profiles, username).await
    }

    pub async fn add_profile(&self, profile: &Profile) -> Result<()> {
        self.insert_document(DocCollection::Profiles, &profile.username, profile)
            .await
    }

    pub async fn group(&self, name: &str) -> Result<Option<Group>> {
        self.document(DocCollection::Groups, name).await
    }

    pub async fn add_group(&self, group: &Group) -> Result<()> {
        self.insert_document(DocCollection::Groups, &group.name, group)
            .await
    }

    pub async fn add_membership(&self, membership: &Membership) -> Result<()> {
        self.insert_link(
            LinkCollection::Members,
            &membership.group_name,
            &membership.username,
            membership,
        )
        .await
    }

    /// Flip a pending membership to approved
    pub async fn approve_membership(&self, group_name: &str, username: &str) -> Result<Membership> {
        let collection = LinkCollection::Members;
        let merged = self
            .store
            .update_link(
                collection.as_str(),
                group_name,
                username,
                json!({ "status": MembershipStatus::Approved }),
            )
            .await?;
        decode(collection, merged)
    }

    /// Members of a group, any status
    pub async fn group_memberships(&self, group_name: &str) -> Result<Vec<Membership>> {
        let collection = LinkCollection::Members;
        let links = self
            .store
            .get_child_links(collection.as_str(), group_name)
            .await?;
        decode_all(collection, links)
    }

    /// Memberships held by a user, any status
    pub async fn user_memberships(&self, username: &str) -> Result<Vec<Membership>> {
        let collection = LinkCollection::Members;
        let links = self
            .store
            .get_parent_links(collection.as_str(), username)
            .await?;
        decode_all(collection, links)
    }

    pub async fn remove_membership(&self, group_name: &str, username: &str) -> Result<()> {
        self.store
            .delete_link(LinkCollection::Members.as_str(), group_name, username)
            .await
    }

    pub async fn subscribe(&self, subscription: &Subscription) -> Result<()> {
        self.insert_link(
            LinkCollection::Subscriptions,
            &subscription.subscriber,
            &subscription.target,
            subscription,
        )
        .await
    }

    /// Subscriptions held by `subscriber`, without the target profiles
    pub async fn subscriptions(&self, subscriber: &str) -> Result<Vec<Subscription>> {
        let collection = LinkCollection::Subscriptions;
        let links = self
            .store
            .get_child_links(collection.as_str(), subscriber)
            .await?;
        decode_all(collection, links)
    }

    pub async fn unsubscribe(&self, subscriber: &str, target: &str) -> Result<()> {
        self.store
            .delete_link(LinkCollection::Subscriptions.as_str(), subscriber, target)
            .await
    }

    /// Fan an update out to every recipient's feed
    ///
    /// Assigns a fresh id (ignoring any id already set on `update`) and writes
    /// one link per recipient. The writes are independent: a failure part way
    /// through leaves the earlier recipients with the entry.
    pub async fn post_update(&self, recipients: &[&str], update: &ActivityUpdate) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let mut payload = update.clone();
        payload.id = id.clone();
        let value = encode(&payload)?;

        for recipient in recipients {
            self.store
                .add_link(LinkCollection::Updates.as_str(), recipient, &id, value.clone())
                .await?;
        }

        tracing::debug!(
            update_id = %id,
            recipients = recipients.len(),
            "Fanned out activity update"
        );

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryAdapter;

    fn typed() -> TypedStore {
        TypedStore::new(Arc::new(MemoryAdapter::new()))
    }

    fn membership(group: &str, user: &str, status: MembershipStatus) -> Membership {
        Membership {
            group_name: group.to_string(),
            username: user.to_string(),
            is_admin: false,
            status,
            joined_at: Utc::now(),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_collection_names() {
        let docs: Vec<&str> = DocCollection::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(docs, vec!["profiles", "groups"]);

        let links: Vec<String> = LinkCollection::ALL.iter().map(|c| c.to_string()).collect();
        assert_eq!(links, vec!["members", "subscriptions", "updates"]);
        assert_eq!(format!("{:<9}|", LinkCollection::Updates), "updates  |");
    }

    #[tokio::test]
    async fn test_typed_writes_land_in_named_collections() {
        let store = typed();
        store
            .add_membership(&membership("writers", "ada", MembershipStatus::Pending))
            .await
            .unwrap();
        store
            .subscribe(&Subscription {
                subscriber: "ada".to_string(),
                target: "grace".to_string(),
                created_at: Utc::now(),
                extra: Map::new(),
            })
            .await
            .unwrap();

        let adapter = store.adapter();
        let members = adapter
            .get_child_links(LinkCollection::Members.as_str(), "writers")
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        let following = adapter
            .get_child_links(LinkCollection::Subscriptions.as_str(), "ada")
            .await
            .unwrap();
        assert_eq!(following[0]["target"], "grace");

        let held = store.subscriptions("ada").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].target, "grace");
    }

    #[tokio::test]
    async fn test_malformed_link_names_its_collection() {
        let store = typed();
        store
            .adapter()
            .add_link(MEMBERS, "writers", "ada", json!({"status": "unknown"}))
            .await
            .unwrap();

        let err = store.group_memberships("writers").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload { ref collection, .. } if collection == "members"));
    }

    #[test]
    fn test_membership_payload_is_camel_case() {
        let value = serde_json::to_value(membership("g", "ada", MembershipStatus::Pending)).unwrap();
        assert_eq!(value["groupName"], "g");
        assert_eq!(value["isAdmin"], false);
        assert_eq!(value["status"], "pending");
    }

    #[tokio::test]
    async fn test_profile_extra_fields_survive_round_trip() {
        let store = typed();
        store
            .adapter()
            .add_document(DocCollection::Profiles.as_str(), "ada", json!({"username": "ada", "city": "London"}))
            .await
            .unwrap();

        let profile = store.profile("ada").await.unwrap().unwrap();
        assert_eq!(profile.extra.get("city"), Some(&json!("London")));
        assert!(store.profile("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_document_is_invalid_payload() {
        let store = typed();
        store
            .adapter()
            .add_document(DocCollection::Groups.as_str(), "broken", json!({"title": "no name field"}))
            .await
            .unwrap();

        let err = store.group("broken").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload { ref collection, .. } if collection == "groups"));
    }

    #[tokio::test]
    async fn test_approve_membership() {
        let store = typed();
        store
            .add_membership(&membership("writers", "grace", MembershipStatus::Pending))
            .await
            .unwrap();

        let approved = store.approve_membership("writers", "grace").await.unwrap();
        assert_eq!(approved.status, MembershipStatus::Approved);

        let held = store.user_memberships("grace").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].status, MembershipStatus::Approved);
    }

    #[tokio::test]
    async fn test_approve_missing_membership_is_not_found() {
        let err = typed()
            .approve_membership("writers", "nobody")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_post_update_fans_out_to_each_recipient() {
        let store = typed();
        let update = ActivityUpdate {
            id: String::new(),
            actor: "ada".to_string(),
            group_name: None,
            kind: "letter_published".to_string(),
            created_at: Utc::now(),
            extra: Map::new(),
        };

        let id = store.post_update(&["grace", "linus"], &update).await.unwrap();

        for recipient in ["grace", "linus"] {
            let feed = store
                .adapter()
                .get_child_links(LinkCollection::Updates.as_str(), recipient)
                .await
                .unwrap();
            assert_eq!(feed.len(), 1);
            assert_eq!(feed[0]["id"], json!(id));
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let store = typed();
        let sub = Subscription {
            subscriber: "grace".to_string(),
            target: "ada".to_string(),
            created_at: Utc::now(),
            extra: Map::new(),
        };
        store.subscribe(&sub).await.unwrap();
        let followers = store
            .adapter()
            .get_parent_links(LinkCollection::Subscriptions.as_str(), "ada")
            .await
            .unwrap();
        assert_eq!(followers.len(), 1);

        store.unsubscribe("grace", "ada").await.unwrap();
        store.unsubscribe("grace", "ada").await.unwrap();
        assert!(store
            .adapter()
            .get_parent_links(LinkCollection::Subscriptions.as_str(), "ada")
            .await
            .unwrap()
            .is_empty());
    }
}
