#![forbid(unsafe_code)]

//! Tree operations over a [`TreeStorage`].
//!
//! Every write runs inside one storage transaction: all preconditions
//! (cycle, capacity, depth) are checked before the first write, and any
//! error returned afterwards drops the transaction, which rolls it back.
//! Rows read before a mutation are stale once it commits, siblings included.

mod moves;
mod rebuild;
mod slots;


pub use rebuild::RebuildReport;

use crate::config::TreeOptions;
use crate::store::{StoreError, TreeRead, TreeStorage, TreeTx};
use mp_core::{
    NodeFilter, NodeId, NodeRow, PathAddress, PathCodec, Relation, SubtreeRewrite, TreeError,
    TreeItem, TreeLimits, nest,
};
use tracing::info;

/// Where a node lands among its new siblings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChildPosition {
    First,
    #[default]
    Last,
    Before(NodeId),
    After(NodeId),
}

impl ChildPosition {
    fn anchor(self) -> Option<NodeId> {
        match self {
            Self::Before(id) | Self::After(id) => Some(id),
            Self::First | Self::Last => None,
        }
    }
}

#[derive(Debug)]
pub struct TreeManager<S> {
    options: TreeOptions,
    limits: TreeLimits,
    storage: S,
}

impl<S: TreeStorage> TreeManager<S> {
    pub fn new(options: TreeOptions, storage: S) -> Result<Self, StoreError> {
        options.validate()?;
        let limits = options.limits()?;
        Ok(Self {
            options,
            limits,
            storage,
        })
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    pub fn limits(&self) -> &TreeLimits {
        &self.limits
    }

    pub fn max_children(&self) -> u64 {
        self.limits.max_children()
    }

    /// Number of levels, root included, that fit into `pathlen`.
    pub fn max_depth(&self) -> usize {
        self.limits.max_depth()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn codec(&self) -> &PathCodec {
        self.limits.codec()
    }

    pub fn node(&self, id: NodeId) -> Result<NodeRow, StoreError> {
        load(&self.storage, id)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeRow>, StoreError> {
        self.node(id)?
            .parent_id
            .map(|parent_id| self.node(parent_id))
            .transpose()
    }

    pub fn filter_for(
        &self,
        id: NodeId,
        relation: Relation,
        and_self: bool,
    ) -> Result<NodeFilter, StoreError> {
        let node = self.node(id)?;
        Ok(NodeFilter::for_relation(
            &node.address,
            relation,
            and_self,
            self.codec(),
        ))
    }

    /// Root first.
    pub fn ancestors(&self, id: NodeId, and_self: bool) -> Result<Vec<NodeRow>, StoreError> {
        self.related(id, Relation::Ancestors, and_self)
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeRow>, StoreError> {
        self.related(id, Relation::Children, false)
    }

    pub fn descendants(&self, id: NodeId, and_self: bool) -> Result<Vec<NodeRow>, StoreError> {
        self.related(id, Relation::Descendants, and_self)
    }

    fn related(
        &self,
        id: NodeId,
        relation: Relation,
        and_self: bool,
    ) -> Result<Vec<NodeRow>, StoreError> {
        let filter = self.filter_for(id, relation, and_self)?;
        self.storage.select_rows(&filter)
    }

    /// Every row of every tree, ordered by `(tree_id, path)`.
    pub fn query_all(&self) -> Result<Vec<NodeRow>, StoreError> {
        self.storage.select_all()
    }

    pub fn tree_rows(&self, tree_id: i64) -> Result<Vec<NodeRow>, StoreError> {
        let root = PathAddress::root(tree_id);
        self.storage
            .select_rows(&NodeFilter::subtree(&root, self.codec()))
    }

    /// All trees as owned nested items, built from one ordered read.
    pub fn forest(&self) -> Result<Vec<TreeItem<NodeRow>>, StoreError> {
        Ok(nest(self.query_all()?))
    }

    /// Inserts `id` as the root of a new tree.
    pub fn attach_root(&mut self, id: NodeId) -> Result<NodeRow, StoreError> {
        let mut tx = self.storage.transaction()?;
        ensure_absent(&tx, id)?;
        let row = NodeRow {
            id,
            parent_id: None,
            address: PathAddress::root(next_tree_id(&tx)?),
        };
        tx.insert_row(&row)?;
        tx.commit()?;
        info!(node = %id, tree_id = row.tree_id(), "root attached");
        Ok(row)
    }

    pub fn attach_child(
        &mut self,
        parent_id: NodeId,
        id: NodeId,
        position: ChildPosition,
    ) -> Result<NodeRow, StoreError> {
        let limits = &self.limits;
        let mut tx = self.storage.transaction()?;
        ensure_absent(&tx, id)?;
        let parent = load(&tx, parent_id)?;
        limits.check_depth(parent.depth() + 1)?;
        let siblings = slots::siblings(&tx, &parent.address, limits)?;
        slots::check_capacity(&siblings, None, limits)?;
        slots::check_anchor(&siblings, position)?;

        let index = slots::claim_slot(&mut tx, &parent.address, position, limits)?;
        let row = NodeRow {
            id,
            parent_id: Some(parent_id),
            address: parent.address.child_address(index, limits)?,
        };
        tx.insert_row(&row)?;
        tx.commit()?;
        info!(
            node = %id,
            parent = %parent_id,
            path = %row.path(),
            "child attached"
        );
        Ok(row)
    }
}

fn load(reader: &impl TreeRead, id: NodeId) -> Result<NodeRow, StoreError> {
    reader.select_row(id)?.ok_or(StoreError::UnknownNode(id))
}

fn ensure_absent(reader: &impl TreeRead, id: NodeId) -> Result<(), StoreError> {
    if reader.select_row(id)?.is_some() {
        return Err(StoreError::NodeAlreadyExists(id));
    }
    Ok(())
}

/// Parked rows use negative tree ids, so fresh ids start above zero.
fn next_tree_id(reader: &impl TreeRead) -> Result<i64, StoreError> {
    let max = reader.max_tree_id()?.unwrap_or(0).max(0);
    max.checked_add(1)
        .ok_or(StoreError::InvalidInput("tree id space exhausted"))
}

/// Fails with `MovingToDescendant` before any write when `anchor` lies inside
/// the subtree of `node`.
fn ensure_outside(node: &NodeRow, anchor: &PathAddress) -> Result<(), StoreError> {
    if node.address.is_self_or_ancestor_of(anchor) {
        return Err(TreeError::MovingToDescendant.into());
    }
    Ok(())
}

/// Rewrites a whole subtree from `from` to `to` in one statement.
fn relocate<T: TreeTx>(
    tx: &mut T,
    from: &PathAddress,
    to: &PathAddress,
    codec: &PathCodec,
) -> Result<usize, StoreError> {
    tx.rewrite_subtree(
        &NodeFilter::subtree(from, codec),
        &SubtreeRewrite::between(from, to),
    )
}
