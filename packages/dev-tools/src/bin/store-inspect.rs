//! Store Inspection Binary
//!
//! Opens the backend selected by the environment and logs what it holds.
//! Useful to check that a deployment points at the right database before the
//! web process starts.
//!
//! # Usage
//!
//! ```bash
//! # Document counts for the default local database
//! cargo run -p yearbook-dev-tools --bin store-inspect
//!
//! # Against the remote database, plus one key's link counts, groups and feed
//! YEARBOOK_DB_BACKEND=remote TURSO_DATABASE_URL=libsql://... TURSO_AUTH_TOKEN=... \
//!     cargo run -p yearbook-dev-tools --bin store-inspect -- ada
//! ```
//!
//! # Environment Variables
//!
//! - `YEARBOOK_DB_BACKEND`, `YEARBOOK_DB_PATH`, `TURSO_DATABASE_URL`,
//!   `TURSO_AUTH_TOKEN`: see `yearbook_core::db::config`
//! - `RUST_LOG`: Logging level (default: info)

use std::env;
use std::sync::Arc;

use yearbook_core::db::{AdapterConfig, DbAdapter, DocCollection, LinkCollection, open_adapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AdapterConfig::from_env()?;
    tracing::info!("Backend: {:?}", config);

    let store = open_adapter(&config).await?;
    let result = inspect(&store, env::args().nth(1).as_deref()).await;

    // Close even when inspection failed part way
    store.close().await?;
    result
}

async fn inspect(store: &Arc<dyn DbAdapter>, username: Option<&str>) -> anyhow::Result<()> {
    for collection in DocCollection::ALL {
        let docs = store.get_all_documents(collection.as_str()).await?;
        tracing::info!("{:<14} {} documents", collection, docs.len());
    }

    let Some(username) = username else {
        return Ok(());
    };

    // Links are only indexed by endpoint, so counts are per key rather than per table
    for collection in LinkCollection::ALL {
        let outgoing = store.get_child_links(collection.as_str(), username).await?;
        let incoming = store.get_parent_links(collection.as_str(), username).await?;
        tracing::info!(
            "{:<14} {} as parent, {} as child",
            collection,
            outgoing.len(),
            incoming.len()
        );
    }

    let groups = store.get_user_groups_with_membership(username, None).await?;
    tracing::info!("{} belongs to {} groups", username, groups.len());
    for entry in &groups {
        tracing::info!(
            "  {} (status: {})",
            entry.group["name"],
            entry.membership["status"]
        );
    }

    let following = store.get_subscriptions_with_profiles(username).await?;
    let followers = store.get_subscribers_with_profiles(username).await?;
    tracing::info!(
        "{} follows {}, followed by {}",
        username,
        following.len(),
        followers.len()
    );

    let feed = store.get_updates_with_profiles_and_groups(username).await?;
    tracing::info!("{} has {} feed entries", username, feed.len());
    for entry in feed.iter().take(10) {
        tracing::info!(
            "  {} by {}",
            entry.update["kind"],
            entry.profile["username"]
        );
    }

    Ok(())
}
