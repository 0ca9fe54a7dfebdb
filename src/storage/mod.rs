//! Storage backends for monitor and notification persistence
//!
//! ## Design
//!
//! - **Trait-based**: `MonitorStore` allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Atomic checks**: a check's state update and its notification are
//!   committed together
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory**: No persistence, for testing or the `none` backend
//!
//! ## Usage
//!
//! ```no_run
//! use sitewatch::storage::{MonitorStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./sitewatch.db").await?;
//!     println!("{}", store.health_check().await?.message);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, MonitorStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
