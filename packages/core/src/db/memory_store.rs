//! MemoryAdapter - In-Memory Reference Implementation of DbAdapter
//!
//! Test double that reproduces the SQL backends' observable behavior: same
//! error kinds and messages, same shallow-merge update, same join results.
//!
//! # Aliasing
//!
//! Values are owned by the store on write and cloned (`serde_json::Value`
//! clones deeply) on every read, so mutating a returned value never touches
//! stored state.
//!
//! # Ordering
//!
//! Scans and link lookups return entries in insertion order. The SQL backends
//! make no such promise, so callers must not rely on it.

use crate::db::adapter::{
    DbAdapter, DocumentEntry, GroupWithMembership, MemberWithProfile, SubscriptionWithProfile,
    UpdateWithContext,
};
use crate::db::collections::{GROUPS, MEMBERS, PROFILES, SUBSCRIPTIONS, UPDATES};
use crate::db::error::{Result, StoreError};
use crate::db::merge::shallow_merge;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct DocumentCollection {
    /// Keys in insertion order
    order: Vec<String>,
    entries: HashMap<String, Value>,
}

struct LinkRow {
    parent_key: String,
    child_key: String,
    value: Value,
}

type LinkKey = (String, String, String);
type EndpointKey = (String, String);

fn link_key(collection: &str, parent_key: &str, child_key: &str) -> LinkKey {
    (
        collection.to_string(),
        parent_key.to_string(),
        child_key.to_string(),
    )
}

fn endpoint_key(collection: &str, key: &str) -> EndpointKey {
    (collection.to_string(), key.to_string())
}

/// Link rows with a primary index on (collection, parent, child) and
/// secondary indices on each endpoint.
///
/// Rows live in insertion-ordered slots; deleting a link empties its slot and
/// unhooks it from both endpoint lists, so lookups stay proportional to the
/// number of links on that endpoint.
#[derive(Default)]
struct LinkTable {
    slots: Vec<Option<LinkRow>>,
    by_key: HashMap<LinkKey, usize>,
    parent_index: HashMap<EndpointKey, Vec<usize>>,
    child_index: HashMap<EndpointKey, Vec<usize>>,
}

impl LinkTable {
    fn slot(&self, collection: &str, parent_key: &str, child_key: &str) -> Option<usize> {
        self.by_key
            .get(&link_key(collection, parent_key, child_key))
            .copied()
    }

    fn get(&self, collection: &str, parent_key: &str, child_key: &str) -> Option<&Value> {
        let slot = self.slot(collection, parent_key, child_key)?;
        self.slots[slot].as_ref().map(|row| &row.value)
    }

    fn get_mut(
        &mut self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
    ) -> Option<&mut Value> {
        let slot = self.slot(collection, parent_key, child_key)?;
        self.slots[slot].as_mut().map(|row| &mut row.value)
    }

    /// Returns false when the link already exists.
    fn insert(
        &mut self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        value: Value,
    ) -> bool {
        let key = link_key(collection, parent_key, child_key);
        if self.by_key.contains_key(&key) {
            return false;
        }
        let slot = self.slots.len();
        self.slots.push(Some(LinkRow {
            parent_key: parent_key.to_string(),
            child_key: child_key.to_string(),
            value,
        }));
        self.by_key.insert(key, slot);
        self.parent_index
            .entry(endpoint_key(collection, parent_key))
            .or_default()
            .push(slot);
        self.child_index
            .entry(endpoint_key(collection, child_key))
            .or_default()
            .push(slot);
        true
    }

    fn remove(&mut self, collection: &str, parent_key: &str, child_key: &str) {
        let Some(slot) = self.by_key.remove(&link_key(collection, parent_key, child_key)) else {
            return;
        };
        self.slots[slot] = None;
        unhook(&mut self.parent_index, endpoint_key(collection, parent_key), slot);
        unhook(&mut self.child_index, endpoint_key(collection, child_key), slot);
    }

    fn by_parent(
        &self,
        collection: &str,
        parent_key: &str,
    ) -> impl Iterator<Item = &LinkRow> + '_ {
        self.rows(self.parent_index.get(&endpoint_key(collection, parent_key)))
    }

    fn by_child(
        &self,
        collection: &str,
        child_key: &str,
    ) -> impl Iterator<Item = &LinkRow> + '_ {
        self.rows(self.child_index.get(&endpoint_key(collection, child_key)))
    }

    fn rows<'a>(
        &'a self,
        slots: Option<&'a Vec<usize>>,
    ) -> impl Iterator<Item = &'a LinkRow> + 'a {
        slots
            .into_iter()
            .flatten()
            .filter_map(move |&slot| self.slots[slot].as_ref())
    }
}

fn unhook(index: &mut HashMap<EndpointKey, Vec<usize>>, key: EndpointKey, slot: usize) {
    if let Some(slots) = index.get_mut(&key) {
        slots.retain(|&s| s != slot);
        if slots.is_empty() {
            index.remove(&key);
        }
    }
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, DocumentCollection>,
    links: LinkTable,
}

impl MemoryState {
    fn document(&self, collection: &str, key: &str) -> Option<&Value> {
        self.documents
            .get(collection)
            .and_then(|c| c.entries.get(key))
    }
}

/// In-memory `DbAdapter`
#[derive(Default)]
pub struct MemoryAdapter {
    state: RwLock<MemoryState>,
    closed: AtomicBool,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl DbAdapter for MemoryAdapter {
    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state.document(collection, key).cloned())
    }

    async fn add_document(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        let docs = state.documents.entry(collection.to_string()).or_default();
        if docs.entries.contains_key(key) {
            return Err(StoreError::document_exists(collection, key));
        }
        docs.order.push(key.to_string());
        docs.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn update_document(&self, collection: &str, key: &str, patch: Value) -> Result<Value> {
        // Read and write take the lock separately, matching the SQL backends'
        // non-atomic read-modify-write.
        let current = self
            .get_document(collection, key)
            .await?
            .ok_or_else(|| StoreError::document_not_found(collection, key))?;
        let merged = shallow_merge(collection, current, &patch)?;

        let mut state = self.state.write().await;
        if let Some(slot) = state
            .documents
            .get_mut(collection)
            .and_then(|c| c.entries.get_mut(key))
        {
            *slot = merged.clone();
        }
        Ok(merged)
    }

    async fn get_all_documents(&self, collection: &str) -> Result<Vec<DocumentEntry>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        let Some(docs) = state.documents.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .order
            .iter()
            .filter_map(|key| {
                docs.entries.get(key).map(|value| DocumentEntry {
                    key: key.clone(),
                    value: value.clone(),
                })
            })
            .collect())
    }

    async fn add_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        value: Value,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        if !state.links.insert(collection, parent_key, child_key, value) {
            return Err(StoreError::link_exists(collection, parent_key, child_key));
        }
        Ok(())
    }

    async fn get_child_links(&self, collection: &str, parent_key: &str) -> Result<Vec<Value>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .links
            .by_parent(collection, parent_key)
            .map(|l| l.value.clone())
            .collect())
    }

    async fn get_parent_links(&self, collection: &str, child_key: &str) -> Result<Vec<Value>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .links
            .by_child(collection, child_key)
            .map(|l| l.value.clone())
            .collect())
    }

    async fn update_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
        patch: Value,
    ) -> Result<Value> {
        self.ensure_open()?;
        let current = {
            let state = self.state.read().await;
            state.links.get(collection, parent_key, child_key).cloned()
        }
        .ok_or_else(|| StoreError::link_not_found(collection, parent_key, child_key))?;
        let merged = shallow_merge(collection, current, &patch)?;

        let mut state = self.state.write().await;
        if let Some(slot) = state.links.get_mut(collection, parent_key, child_key) {
            *slot = merged.clone();
        }
        Ok(merged)
    }

    async fn delete_link(
        &self,
        collection: &str,
        parent_key: &str,
        child_key: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.links.remove(collection, parent_key, child_key);
        Ok(())
    }

    async fn get_user_groups_with_membership(
        &self,
        username: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<GroupWithMembership>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .links
            .by_child(MEMBERS, username)
            .filter_map(|link| {
                let group = state.document(GROUPS, &link.parent_key)?;
                let viewer_membership = viewer
                    .and_then(|v| state.links.get(MEMBERS, &link.parent_key, v))
                    .cloned();
                Some(GroupWithMembership {
                    group: group.clone(),
                    membership: link.value.clone(),
                    viewer_membership,
                })
            })
            .collect())
    }

    async fn get_group_members_with_profiles(
        &self,
        group_name: &str,
    ) -> Result<Vec<MemberWithProfile>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .links
            .by_parent(MEMBERS, group_name)
            .filter_map(|link| {
                state
                    .document(PROFILES, &link.child_key)
                    .map(|profile| MemberWithProfile {
                        membership: link.value.clone(),
                        profile: profile.clone(),
                    })
            })
            .collect())
    }

    async fn get_subscriptions_with_profiles(
        &self,
        subscriber: &str,
    ) -> Result<Vec<SubscriptionWithProfile>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .links
            .by_parent(SUBSCRIPTIONS, subscriber)
            .filter_map(|link| {
                state
                    .document(PROFILES, &link.child_key)
                    .map(|profile| SubscriptionWithProfile {
                        subscription: link.value.clone(),
                        profile: profile.clone(),
                    })
            })
            .collect())
    }

    async fn get_subscribers_with_profiles(
        &self,
        target: &str,
    ) -> Result<Vec<SubscriptionWithProfile>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .links
            .by_child(SUBSCRIPTIONS, target)
            .filter_map(|link| {
                state
                    .document(PROFILES, &link.parent_key)
                    .map(|profile| SubscriptionWithProfile {
                        subscription: link.value.clone(),
                        profile: profile.clone(),
                    })
            })
            .collect())
    }

    async fn get_updates_with_profiles_and_groups(
        &self,
        recipient: &str,
    ) -> Result<Vec<UpdateWithContext>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .links
            .by_parent(UPDATES, recipient)
            .filter_map(|link| {
                let actor = link.value.get("actor")?.as_str()?;
                let profile = state.document(PROFILES, actor)?;
                let group = match link.value.get("groupName") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(name)) => Some(state.document(GROUPS, name)?.clone()),
                    // A non-string group reference can never match a key
                    Some(_) => return None,
                };
                Some(UpdateWithContext {
                    update: link.value.clone(),
                    profile: profile.clone(),
                    group,
                })
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::warn!("MemoryAdapter closed more than once");
        }
        Ok(())
    }
}
