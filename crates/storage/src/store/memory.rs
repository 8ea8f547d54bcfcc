#![forbid(unsafe_code)]

use super::{RebuildOrder, StoreError, TreeRead, TreeStorage, TreeTx};
use crate::config::TreeOptions;
use mp_core::{
    AdjacencyRow, NodeFilter, NodeId, NodeRow, PathAddress, PathCodec, SubtreeRewrite,
};
use std::collections::{BTreeMap, BTreeSet};

/// In-process store, mostly for tests and embedding.
///
/// Transactions work on a copy of the table and swap it in on commit. The
/// `(tree_id, path)` uniqueness the SQL index enforces is enforced here too.
#[derive(Clone, Debug)]
pub struct MemoryTreeStore {
    table: MemoryTable,
}

impl MemoryTreeStore {
    pub fn new(options: &TreeOptions) -> Result<Self, StoreError> {
        let limits = options.limits()?;
        Ok(Self {
            table: MemoryTable {
                rows: BTreeMap::new(),
                codec: *limits.codec(),
            },
        })
    }

    pub fn len(&self) -> usize {
        self.table.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.rows.is_empty()
    }
}

#[derive(Clone, Debug)]
struct MemoryTable {
    rows: BTreeMap<NodeId, NodeRow>,
    codec: PathCodec,
}

impl MemoryTable {
    fn ordered(&self, mut rows: Vec<NodeRow>) -> Vec<NodeRow> {
        rows.sort_by(|a, b| {
            (a.tree_id(), a.path(), a.id).cmp(&(b.tree_id(), b.path(), b.id))
        });
        rows
    }

    fn matching(&self, filter: &NodeFilter) -> Vec<NodeRow> {
        let rows = self
            .rows
            .values()
            .filter(|row| filter.matches(row.tree_id(), row.path(), row.depth()))
            .cloned()
            .collect();
        self.ordered(rows)
    }

    fn ensure_unique(&self) -> Result<(), StoreError> {
        let mut seen = BTreeSet::new();
        for row in self.rows.values() {
            if !seen.insert((row.tree_id(), row.path())) {
                return Err(StoreError::InvalidInput(
                    "duplicate (tree_id, path) pair",
                ));
            }
        }
        Ok(())
    }

    fn ensure_free(&self, id: NodeId, address: &PathAddress) -> Result<(), StoreError> {
        let taken = self.rows.values().any(|row| {
            row.id != id && row.tree_id() == address.tree_id() && row.path() == address.path()
        });
        if taken {
            return Err(StoreError::InvalidInput("duplicate (tree_id, path) pair"));
        }
        Ok(())
    }

    fn row_mut(&mut self, id: NodeId) -> Result<&mut NodeRow, StoreError> {
        self.rows.get_mut(&id).ok_or(StoreError::UnknownNode(id))
    }
}

impl TreeRead for MemoryTable {
    fn select_row(&self, id: NodeId) -> Result<Option<NodeRow>, StoreError> {
        Ok(self.rows.get(&id).cloned())
    }

    fn select_rows(&self, filter: &NodeFilter) -> Result<Vec<NodeRow>, StoreError> {
        Ok(self.matching(filter))
    }

    fn select_all(&self) -> Result<Vec<NodeRow>, StoreError> {
        Ok(self.ordered(self.rows.values().cloned().collect()))
    }

    fn max_tree_id(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.rows.values().map(NodeRow::tree_id).max())
    }

    fn max_depth(&self, filter: &NodeFilter) -> Result<Option<u32>, StoreError> {
        Ok(self
            .rows
            .values()
            .filter(|row| filter.matches(row.tree_id(), row.path(), row.depth()))
            .map(NodeRow::depth)
            .max())
    }

    fn select_adjacency(&self, order: &RebuildOrder) -> Result<Vec<AdjacencyRow>, StoreError> {
        if *order != RebuildOrder::PrimaryKey {
            return Err(StoreError::InvalidInput(
                "memory store orders adjacency by primary key only",
            ));
        }
        Ok(self
            .rows
            .values()
            .map(|row| AdjacencyRow {
                id: row.id,
                parent_id: row.parent_id,
            })
            .collect())
    }
}

impl TreeRead for MemoryTreeStore {
    fn select_row(&self, id: NodeId) -> Result<Option<NodeRow>, StoreError> {
        self.table.select_row(id)
    }

    fn select_rows(&self, filter: &NodeFilter) -> Result<Vec<NodeRow>, StoreError> {
        self.table.select_rows(filter)
    }

    fn select_all(&self) -> Result<Vec<NodeRow>, StoreError> {
        self.table.select_all()
    }

    fn max_tree_id(&self) -> Result<Option<i64>, StoreError> {
        self.table.max_tree_id()
    }

    fn max_depth(&self, filter: &NodeFilter) -> Result<Option<u32>, StoreError> {
        self.table.max_depth(filter)
    }

    fn select_adjacency(&self, order: &RebuildOrder) -> Result<Vec<AdjacencyRow>, StoreError> {
        self.table.select_adjacency(order)
    }
}

impl TreeStorage for MemoryTreeStore {
    type Tx<'a>
        = MemoryTx<'a>
    where
        Self: 'a;

    fn transaction(&mut self) -> Result<Self::Tx<'_>, StoreError> {
        let work = self.table.clone();
        Ok(MemoryTx {
            target: &mut self.table,
            work,
        })
    }
}

pub struct MemoryTx<'a> {
    target: &'a mut MemoryTable,
    work: MemoryTable,
}

impl TreeRead for MemoryTx<'_> {
    fn select_row(&self, id: NodeId) -> Result<Option<NodeRow>, StoreError> {
        self.work.select_row(id)
    }

    fn select_rows(&self, filter: &NodeFilter) -> Result<Vec<NodeRow>, StoreError> {
        self.work.select_rows(filter)
    }

    fn select_all(&self) -> Result<Vec<NodeRow>, StoreError> {
        self.work.select_all()
    }

    fn max_tree_id(&self) -> Result<Option<i64>, StoreError> {
        self.work.max_tree_id()
    }

    fn max_depth(&self, filter: &NodeFilter) -> Result<Option<u32>, StoreError> {
        self.work.max_depth(filter)
    }

    fn select_adjacency(&self, order: &RebuildOrder) -> Result<Vec<AdjacencyRow>, StoreError> {
        self.work.select_adjacency(order)
    }
}

impl TreeTx for MemoryTx<'_> {
    fn insert_row(&mut self, row: &NodeRow) -> Result<(), StoreError> {
        if self.work.rows.contains_key(&row.id) {
            return Err(StoreError::NodeAlreadyExists(row.id));
        }
        self.work.ensure_free(row.id, &row.address)?;
        self.work.rows.insert(row.id, row.clone());
        Ok(())
    }

    fn insert_unplaced(
        &mut self,
        id: NodeId,
        parent_id: Option<NodeId>,
    ) -> Result<(), StoreError> {
        self.insert_row(&NodeRow {
            id,
            parent_id,
            address: PathAddress::root(-id.get()),
        })
    }

    fn set_parent(&mut self, id: NodeId, parent_id: Option<NodeId>) -> Result<(), StoreError> {
        self.work.row_mut(id)?.parent_id = parent_id;
        Ok(())
    }

    fn rewrite_subtree(
        &mut self,
        filter: &NodeFilter,
        rewrite: &SubtreeRewrite,
    ) -> Result<usize, StoreError> {
        let codec = self.work.codec;
        let mut touched = 0usize;
        for row in self.work.rows.values_mut() {
            if !filter.matches(row.tree_id(), row.path(), row.depth()) {
                continue;
            }
            let (tree_id, path, depth) = rewrite.apply(row.tree_id(), row.path(), row.depth());
            row.address = PathAddress::from_stored(tree_id, path, depth, &codec)?;
            touched += 1;
        }
        self.work.ensure_unique()?;
        Ok(touched)
    }

    fn delete_rows(&mut self, filter: &NodeFilter) -> Result<usize, StoreError> {
        let before = self.work.rows.len();
        self.work
            .rows
            .retain(|_, row| !filter.matches(row.tree_id(), row.path(), row.depth()));
        Ok(before - self.work.rows.len())
    }

    fn park_all(&mut self) -> Result<usize, StoreError> {
        for row in self.work.rows.values_mut() {
            row.address = PathAddress::root(-row.id.get());
        }
        Ok(self.work.rows.len())
    }

    fn assign_address(&mut self, id: NodeId, address: &PathAddress) -> Result<(), StoreError> {
        self.work.ensure_free(id, address)?;
        self.work.row_mut(id)?.address = address.clone();
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        *self.target = self.work;
        Ok(())
    }
}
