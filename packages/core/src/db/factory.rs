//! Adapter Factory
//!
//! Constructs the configured backend once. The returned handle is what the
//! application passes to every caller; nothing here keeps a global.

use crate::db::adapter::DbAdapter;
use crate::db::config::AdapterConfig;
use crate::db::error::Result;
use crate::db::local_store::LocalAdapter;
use crate::db::memory_store::MemoryAdapter;
use crate::db::remote_store::RemoteAdapter;
use std::sync::Arc;

/// Build the backend described by `config`
pub async fn open_adapter(config: &AdapterConfig) -> Result<Arc<dyn DbAdapter>> {
    tracing::info!(backend = config.backend_name(), "Opening store");

    let adapter: Arc<dyn DbAdapter> = match config {
        AdapterConfig::Memory => Arc::new(MemoryAdapter::new()),
        AdapterConfig::Local { path } => Arc::new(LocalAdapter::new(path.clone()).await?),
        AdapterConfig::Remote { url, auth_token } => {
            Arc::new(RemoteAdapter::new(url, auth_token).await?)
        }
    };

    Ok(adapter)
}

/// Read configuration from the environment and build the backend
///
/// Fails immediately on missing or invalid configuration.
pub async fn open_adapter_from_env() -> Result<Arc<dyn DbAdapter>> {
    let config = AdapterConfig::from_env()?;
    open_adapter(&config).await
}
