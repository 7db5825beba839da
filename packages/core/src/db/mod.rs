//! Document/Link Persistence Layer
//!
//! Every feature of the application stores its data through [`DbAdapter`]:
//!
//! - **Documents**: JSON values keyed by `(collection, key)`
//! - **Links**: JSON edge payloads keyed by `(collection, parent_key, child_key)`
//! - **Join queries**: links resolved against their endpoint documents in one call
//!
//! # Backends
//!
//! - [`LocalAdapter`] - embedded libsql file
//! - [`RemoteAdapter`] - networked libsql (Turso) over HTTP
//! - [`MemoryAdapter`] - in-memory reference implementation for tests
//!
//! All three produce the same observable results. [`open_adapter`] picks one
//! from [`AdapterConfig`]; construct it once at startup and pass the handle to
//! every caller.
//!
//! [`TypedStore`] layers typed payloads for the known collections on top.

pub mod adapter;
pub mod collections;
pub mod config;
mod error;
mod factory;
mod local_store;
mod memory_store;
pub mod merge;
mod remote_store;
pub mod sql;

pub use adapter::{
    DbAdapter, DocumentEntry, GroupWithMembership, MemberWithProfile, SubscriptionWithProfile,
    UpdateWithContext,
};
pub use collections::{
    ActivityUpdate, DocCollection, Group, LinkCollection, Membership, MembershipStatus, Profile,
    Subscription, TypedStore,
};
pub use config::AdapterConfig;
pub use error::{RecordKind, Result, StoreError};
pub use factory::{open_adapter, open_adapter_from_env};
pub use local_store::LocalAdapter;
pub use memory_store::MemoryAdapter;
pub use remote_store::RemoteAdapter;
