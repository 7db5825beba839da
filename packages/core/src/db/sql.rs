//! Shared SQL for the libsql Backends
//!
//! The embedded and networked adapters speak to the same two-table schema
//! through the same `libsql::Connection` API, so every statement lives here
//! once. Adapters only decide how a connection is obtained.
//!
//! # Schema
//!
//! ```sql
//! documents(collection, key, data)               PRIMARY KEY (collection, key)
//! links(collection, parent_key, child_key, data) PRIMARY KEY (collection, parent_key, child_key)
//! INDEX (collection, parent_key)
//! INDEX (collection, child_key)
//! ```
//!
//! `data` is JSON text. Other tooling reads these tables directly, so the
//! table and index shapes must not change.
//!
//! # Duplicate inserts
//!
//! Inserts use `INSERT OR IGNORE` and report `StoreError::AlreadyExists` when
//! no row was written, so the embedded and remote drivers surface the same
//! error instead of their own constraint-violation messages.

use crate::db::adapter::{
    DocumentEntry, GroupWithMembership, MemberWithProfile, SubscriptionWithProfile,
    UpdateWithContext,
};
use crate::db::collections::{GROUPS, MEMBERS, PROFILES, SUBSCRIPTIONS, UPDATES};
use crate::db::error::{Result, StoreError};
use crate::db::merge::shallow_merge;
use libsql::{Connection, Row, Rows};
use serde_json::Value;

const SCHEMA: [(&str, &str); 4] = [
    (
        "documents",
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            data TEXT NOT NULL,
            PRIMARY KEY (collection, key)
        )",
    ),
    (
        "links",
        "CREATE TABLE IF NOT EXISTS links (
            collection TEXT NOT NULL,
            parent_key TEXT NOT NULL,
            child_key TEXT NOT NULL,
            data TEXT NOT NULL,
            PRIMARY KEY (collection, parent_key, child_key)
        )",
    ),
    (
        "idx_links_parent",
        "CREATE INDEX IF NOT EXISTS idx_links_parent ON links(collection, parent_key)",
    ),
    (
        "idx_links_child",
        "CREATE INDEX IF NOT EXISTS idx_links_child ON links(collection, child_key)",
    ),
];

/// Create tables and indexes; idempotent
pub async fn initialize_schema(conn: &Connection) -> Result<()> {
    for (name, ddl) in SCHEMA {
        conn.execute(ddl, ()).await?;
        tracing::debug!(object = name, "Schema object ensured");
    }
    Ok(())
}

fn decode(row: &Row, idx: i32) -> Result<Value> {
    let data: String = row.get(idx)?;
    Ok(serde_json::from_str(&data)?)
}

fn decode_optional(row: &Row, idx: i32) -> Result<Option<Value>> {
    let data: Option<String> = row.get(idx)?;
    data.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
        .transpose()
}

async fn collect_values(mut rows: Rows) -> Result<Vec<Value>> {
    let mut values = Vec::new();
    while let Some(row) = rows.next().await? {
        values.push(decode(&row, 0)?);
    }
    Ok(values)
}

//
// DOCUMENTS
//

pub async fn get_document(conn: &Connection, collection: &str, key: &str) -> Result<Option<Value>> {
    let mut rows = conn
        .query(
            "SELECT data FROM documents WHERE collection = ? AND key = ?",
            (collection, key),
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(decode(&row, 0)?)),
        None => Ok(None),
    }
}

pub async fn add_document(
    conn: &Connection,
    collection: &str,
    key: &str,
    value: &Value,
) -> Result<()> {
    let data = serde_json::to_string(value)?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO documents (collection, key, data) VALUES (?, ?, ?)",
            (collection, key, data),
        )
        .await?;

    if inserted == 0 {
        return Err(StoreError::document_exists(collection, key));
    }
    tracing::debug!(collection, key, "Inserted document");
    Ok(())
}

/// Read, shallow-merge, write back
///
/// Two separate statements with no transaction: a concurrent writer between
/// them is overwritten by this call's merged blob.
pub async fn update_document(
    conn: &Connection,
    collection: &str,
    key: &str,
    patch: &Value,
) -> Result<Value> {
    let current = get_document(conn, collection, key)
        .await?
        .ok_or_else(|| StoreError::document_not_found(collection, key))?;
    let merged = shallow_merge(collection, current, patch)?;

    conn.execute(
        "UPDATE documents SET data = ? WHERE collection = ? AND key = ?",
        (serde_json::to_string(&merged)?, collection, key),
    )
    .await?;

    tracing::debug!(collection, key, "Updated document");
    Ok(merged)
}

pub async fn get_all_documents(conn: &Connection, collection: &str) -> Result<Vec<DocumentEntry>> {
    let mut rows = conn
        .query(
            "SELECT key, data FROM documents WHERE collection = ?",
            [collection],
        )
        .await?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next().await? {
        entries.push(DocumentEntry {
            key: row.get(0)?,
            value: decode(&row, 1)?,
        });
    }
    Ok(entries)
}

//
// LINKS
//

pub async fn add_link(
    conn: &Connection,
    collection: &str,
    parent_key: &str,
    child_key: &str,
    value: &Value,
) -> Result<()> {
    let data = serde_json::to_string(value)?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO links (collection, parent_key, child_key, data) VALUES (?, ?, ?, ?)",
            (collection, parent_key, child_key, data),
        )
        .await?;

    if inserted == 0 {
        return Err(StoreError::link_exists(collection, parent_key, child_key));
    }
    tracing::debug!(collection, parent_key, child_key, "Inserted link");
    Ok(())
}

pub async fn get_child_links(
    conn: &Connection,
    collection: &str,
    parent_key: &str,
) -> Result<Vec<Value>> {
    let rows = conn
        .query(
            "SELECT data FROM links WHERE collection = ? AND parent_key = ? ORDER BY rowid",
            (collection, parent_key),
        )
        .await?;
    collect_values(rows).await
}

pub async fn get_parent_links(
    conn: &Connection,
    collection: &str,
    child_key: &str,
) -> Result<Vec<Value>> {
    let rows = conn
        .query(
            "SELECT data FROM links WHERE collection = ? AND child_key = ? ORDER BY rowid",
            (collection, child_key),
        )
        .await?;
    collect_values(rows).await
}

async fn get_link(
    conn: &Connection,
    collection: &str,
    parent_key: &str,
    child_key: &str,
) -> Result<Option<Value>> {
    let mut rows = conn
        .query(
            "SELECT data FROM links WHERE collection = ? AND parent_key = ? AND child_key = ?",
            (collection, parent_key, child_key),
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(decode(&row, 0)?)),
        None => Ok(None),
    }
}

pub async fn update_link(
    conn: &Connection,
    collection: &str,
    parent_key: &str,
    child_key: &str,
    patch: &Value,
) -> Result<Value> {
    let current = get_link(conn, collection, parent_key, child_key)
        .await?
        .ok_or_else(|| StoreError::link_not_found(collection, parent_key, child_key))?;
    let merged = shallow_merge(collection, current, patch)?;

    conn.execute(
        "UPDATE links SET data = ? WHERE collection = ? AND parent_key = ? AND child_key = ?",
        (
            serde_json::to_string(&merged)?,
            collection,
            parent_key,
            child_key,
        ),
    )
    .await?;

    tracing::debug!(collection, parent_key, child_key, "Updated link");
    Ok(merged)
}

pub async fn delete_link(
    conn: &Connection,
    collection: &str,
    parent_key: &str,
    child_key: &str,
) -> Result<()> {
    let removed = conn
        .execute(
            "DELETE FROM links WHERE collection = ? AND parent_key = ? AND child_key = ?",
            (collection, parent_key, child_key),
        )
        .await?;

    tracing::debug!(collection, parent_key, child_key, removed, "Deleted link");
    Ok(())
}

//
// JOIN QUERIES
//

pub async fn get_user_groups_with_membership(
    conn: &Connection,
    username: &str,
    viewer: Option<&str>,
) -> Result<Vec<GroupWithMembership>> {
    // A NULL viewer never equals a child_key, so the LEFT JOIN yields NULL
    let mut rows = conn
        .query(
            "SELECT g.data, m.data, v.data
             FROM links m
             JOIN documents g ON g.collection = ? AND g.key = m.parent_key
             LEFT JOIN links v ON v.collection = m.collection
                 AND v.parent_key = m.parent_key
                 AND v.child_key = ?
             WHERE m.collection = ? AND m.child_key = ?
             ORDER BY m.rowid",
            (GROUPS, viewer, MEMBERS, username),
        )
        .await?;

    let mut groups = Vec::new();
    while let Some(row) = rows.next().await? {
        groups.push(GroupWithMembership {
            group: decode(&row, 0)?,
            membership: decode(&row, 1)?,
            viewer_membership: decode_optional(&row, 2)?,
        });
    }
    Ok(groups)
}

pub async fn get_group_members_with_profiles(
    conn: &Connection,
    group_name: &str,
) -> Result<Vec<MemberWithProfile>> {
    let mut rows = conn
        .query(
            "SELECT m.data, p.data
             FROM links m
             JOIN documents p ON p.collection = ? AND p.key = m.child_key
             WHERE m.collection = ? AND m.parent_key = ?
             ORDER BY m.rowid",
            (PROFILES, MEMBERS, group_name),
        )
        .await?;

    let mut members = Vec::new();
    while let Some(row) = rows.next().await? {
        members.push(MemberWithProfile {
            membership: decode(&row, 0)?,
            profile: decode(&row, 1)?,
        });
    }
    Ok(members)
}

async fn collect_subscriptions(mut rows: Rows) -> Result<Vec<SubscriptionWithProfile>> {
    let mut subscriptions = Vec::new();
    while let Some(row) = rows.next().await? {
        subscriptions.push(SubscriptionWithProfile {
            subscription: decode(&row, 0)?,
            profile: decode(&row, 1)?,
        });
    }
    Ok(subscriptions)
}

pub async fn get_subscriptions_with_profiles(
    conn: &Connection,
    subscriber: &str,
) -> Result<Vec<SubscriptionWithProfile>> {
    let rows = conn
        .query(
            "SELECT s.data, p.data
             FROM links s
             JOIN documents p ON p.collection = ? AND p.key = s.child_key
             WHERE s.collection = ? AND s.parent_key = ?
             ORDER BY s.rowid",
            (PROFILES, SUBSCRIPTIONS, subscriber),
        )
        .await?;
    collect_subscriptions(rows).await
}

pub async fn get_subscribers_with_profiles(
    conn: &Connection,
    target: &str,
) -> Result<Vec<SubscriptionWithProfile>> {
    let rows = conn
        .query(
            "SELECT s.data, p.data
             FROM links s
             JOIN documents p ON p.collection = ? AND p.key = s.parent_key
             WHERE s.collection = ? AND s.child_key = ?
             ORDER BY s.rowid",
            (PROFILES, SUBSCRIPTIONS, target),
        )
        .await?;
    collect_subscriptions(rows).await
}

pub async fn get_updates_with_profiles_and_groups(
    conn: &Connection,
    recipient: &str,
) -> Result<Vec<UpdateWithContext>> {
    // Group is optional per update, but an update naming a missing group is dropped.
    // Only JSON string references match keys; a numeric or boolean json_extract
    // result compared against the TEXT key column would match "7" or "1".
    let mut rows = conn
        .query(
            "SELECT u.data, p.data, g.data
             FROM links u
             JOIN documents p ON p.collection = ?
                 AND json_type(u.data, '$.actor') = 'text'
                 AND p.key = json_extract(u.data, '$.actor')
             LEFT JOIN documents g ON g.collection = ?
                 AND json_type(u.data, '$.groupName') = 'text'
                 AND g.key = json_extract(u.data, '$.groupName')
             WHERE u.collection = ? AND u.parent_key = ?
               AND (IFNULL(json_type(u.data, '$.groupName'), 'null') = 'null'
                    OR g.key IS NOT NULL)
             ORDER BY u.rowid",
            (PROFILES, GROUPS, UPDATES, recipient),
        )
        .await?;

    let mut updates = Vec::new();
    while let Some(row) = rows.next().await? {
        updates.push(UpdateWithContext {
            update: decode(&row, 0)?,
            profile: decode(&row, 1)?,
            group: decode_optional(&row, 2)?,
        });
    }
    Ok(updates)
}
