//! Yearbook Core Persistence Layer
//!
//! Profiles, groups, memberships, subscriptions and the activity feed are all
//! stored as two schema-less primitives, documents and links, behind the
//! [`db::DbAdapter`] trait.
//!
//! # Architecture
//!
//! - **Two tables**: `documents` and `links`, JSON payloads in a `data` column
//! - **libsql/Turso**: the same SQL runs against an embedded file or a remote endpoint
//! - **In-memory adapter**: reference implementation with identical behavior, for tests
//! - **Explicit handle**: the adapter is constructed once and passed to callers
//!
//! # Modules
//!
//! - [`db`] - Adapter trait, backends, join queries, typed collections

pub mod db;

pub use db::{DbAdapter, StoreError};
