#![forbid(unsafe_code)]

//! The storage collaborator: row reads, set-based rewrites and deletes, all
//! scoped by a transaction that rolls back unless committed.

mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::{MemoryTreeStore, MemoryTx};
pub use sqlite::{SqliteTreeStore, SqliteTx};

use mp_core::{AdjacencyRow, NodeFilter, NodeId, NodeRow, PathAddress, SubtreeRewrite};

/// Sibling order used when paths are regenerated from parent pointers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RebuildOrder {
    #[default]
    PrimaryKey,
    /// Order by another column of the table, primary key breaking ties.
    Column { name: String, descending: bool },
}

/// Read access shared by stores and their open transactions.
///
/// Multi-row reads come back ordered by `(tree_id, path)`.
pub trait TreeRead {
    fn select_row(&self, id: NodeId) -> Result<Option<NodeRow>, StoreError>;

    fn select_rows(&self, filter: &NodeFilter) -> Result<Vec<NodeRow>, StoreError>;

    fn select_all(&self) -> Result<Vec<NodeRow>, StoreError>;

    fn max_tree_id(&self) -> Result<Option<i64>, StoreError>;

    /// Deepest `depth` among rows matching `filter`.
    fn max_depth(&self, filter: &NodeFilter) -> Result<Option<u32>, StoreError>;

    fn select_adjacency(&self, order: &RebuildOrder) -> Result<Vec<AdjacencyRow>, StoreError>;
}

/// Writes issued inside one transaction. Dropping without [`TreeTx::commit`]
/// rolls every write back.
pub trait TreeTx: TreeRead {
    fn insert_row(&mut self, row: &NodeRow) -> Result<(), StoreError>;

    /// Inserts a row whose address is unknown yet; it is parked at
    /// `(-id, "", 0)` until the next rebuild places it.
    fn insert_unplaced(&mut self, id: NodeId, parent_id: Option<NodeId>)
    -> Result<(), StoreError>;

    fn set_parent(&mut self, id: NodeId, parent_id: Option<NodeId>) -> Result<(), StoreError>;

    /// Rewrites every matching row in one set-based statement.
    fn rewrite_subtree(
        &mut self,
        filter: &NodeFilter,
        rewrite: &SubtreeRewrite,
    ) -> Result<usize, StoreError>;

    fn delete_rows(&mut self, filter: &NodeFilter) -> Result<usize, StoreError>;

    /// Moves every row to its own scratch tree `(-id, "", 0)`.
    fn park_all(&mut self) -> Result<usize, StoreError>;

    fn assign_address(&mut self, id: NodeId, address: &PathAddress) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>;
}

pub trait TreeStorage: TreeRead {
    type Tx<'a>: TreeTx
    where
        Self: 'a;

    fn transaction(&mut self) -> Result<Self::Tx<'_>, StoreError>;
}
