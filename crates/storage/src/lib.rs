#![forbid(unsafe_code)]

//! Materialized-path trees persisted in one SQL table.
//!
//! [`TreeManager`] runs every tree operation as one transaction against a
//! [`store::TreeStorage`]: the SQLite store for real tables, or the memory
//! store for embedding and tests.

mod config;
mod manager;
pub mod store;

pub use config::TreeOptions;
pub use manager::{ChildPosition, RebuildReport, TreeManager};
pub use store::{MemoryTreeStore, RebuildOrder, SqliteTreeStore, StoreError};
