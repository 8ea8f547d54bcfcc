#![forbid(unsafe_code)]

//! Materialized-path arithmetic for trees kept in flat relational tables.
//!
//! Every node carries `(tree_id, path, depth)`: `path` is the concatenation
//! of fixed-width base-36 sibling indices from the root down, so subtree,
//! ancestor and child lookups become prefix and range predicates. This crate
//! is storage-agnostic; `mp_storage` runs the predicates and bulk rewrites.

mod address;
mod codec;
mod error;
mod ids;
mod limits;
mod query;
mod types;
mod walk;

pub use address::*;
pub use codec::*;
pub use error::*;
pub use ids::*;
pub use limits::*;
pub use query::*;
pub use types::*;
pub use walk::*;

#[cfg(test)]
mod tests;
