//! SQLite storage implementation for Stockclerk.
//!
//! This crate provides all database-related functionality using Diesel ORM
//! with SQLite. It implements the repository traits defined in
//! `stockclerk-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - Repository implementations for all domain entities
//! - The durable per-tenant job-queue substrate
//!
//! # Architecture
//!
//! This crate is the only place in the application where Diesel dependencies
//! exist. All other crates (`core`, `orchestrator`) are database-agnostic
//! and work with traits.
//!
//! ```text
//! core (domain)        orchestrator (lifecycle)
//!       │                      │
//!       └──────────┬───────────┘
//!                  │
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;

// Repository implementations
pub mod alerts;
pub mod channels;
pub mod mappings;
pub mod products;
pub mod queue;
pub mod sync_events;
pub mod tenants;

// Re-export database utilities
pub use db::{create_pool, get_connection, init, run_migrations, DbConnection, DbPool, WriteHandle};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

// Re-export repositories
pub use alerts::AlertRepository;
pub use channels::ChannelRepository;
pub use mappings::MappingRepository;
pub use products::ProductRepository;
pub use queue::SqliteJobQueue;
pub use sync_events::SyncEventRepository;
pub use tenants::TenantRepository;

// Re-export from stockclerk-core for convenience
pub use stockclerk_core::errors::{DatabaseError, Error, Result};
