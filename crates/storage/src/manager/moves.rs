#![forbid(unsafe_code)]

use super::{ChildPosition, TreeManager, ensure_outside, load, next_tree_id, relocate, slots};
use crate::store::{StoreError, TreeRead, TreeStorage, TreeTx};
use mp_core::{NodeFilter, NodeId, NodeRow, PathAddress};
use tracing::{debug, info};

impl<S: TreeStorage> TreeManager<S> {
    /// Turns the subtree of `id` into a tree of its own, rooted at `id`.
    pub fn detach_subtree(&mut self, id: NodeId) -> Result<NodeRow, StoreError> {
        let codec = *self.limits.codec();
        let mut tx = self.storage.transaction()?;
        let node = load(&tx, id)?;
        if node.parent_id.is_none() || node.address.is_root() {
            return Err(StoreError::AlreadyRoot(id));
        }

        let new_root = PathAddress::root(next_tree_id(&tx)?);
        let touched = relocate(&mut tx, &node.address, &new_root, &codec)?;
        tx.set_parent(id, None)?;
        let row = load(&tx, id)?;
        tx.commit()?;
        info!(
            node = %id,
            tree_id = new_root.tree_id(),
            rows = touched,
            "subtree detached"
        );
        Ok(row)
    }

    /// Deletes `id` and all of its descendants. Remaining siblings keep their
    /// indices. Returns the number of deleted rows.
    pub fn delete_subtree(&mut self, id: NodeId) -> Result<usize, StoreError> {
        let codec = *self.limits.codec();
        let mut tx = self.storage.transaction()?;
        let node = load(&tx, id)?;
        let deleted = tx.delete_rows(&NodeFilter::subtree(&node.address, &codec))?;
        tx.commit()?;
        info!(node = %id, rows = deleted, "subtree deleted");
        Ok(deleted)
    }

    /// Moves `id` right before its new sibling `anchor`, under `anchor`'s parent.
    pub fn move_subtree_before(
        &mut self,
        id: NodeId,
        anchor: NodeId,
    ) -> Result<NodeRow, StoreError> {
        let parent_id = self.anchor_parent(id, anchor)?;
        self.move_under(id, parent_id, ChildPosition::Before(anchor))
    }

    pub fn move_subtree_after(
        &mut self,
        id: NodeId,
        anchor: NodeId,
    ) -> Result<NodeRow, StoreError> {
        let parent_id = self.anchor_parent(id, anchor)?;
        self.move_under(id, parent_id, ChildPosition::After(anchor))
    }

    /// Makes `id` the first child of `parent_id`.
    pub fn move_subtree_to_top(
        &mut self,
        id: NodeId,
        parent_id: NodeId,
    ) -> Result<NodeRow, StoreError> {
        self.move_under(id, parent_id, ChildPosition::First)
    }

    /// Makes `id` the last child of `parent_id`.
    pub fn move_subtree_to_bottom(
        &mut self,
        id: NodeId,
        parent_id: NodeId,
    ) -> Result<NodeRow, StoreError> {
        self.move_under(id, parent_id, ChildPosition::Last)
    }

    /// Renumbers the children of `parent_id` to `0..n` in their current
    /// order. Returns how many child subtrees changed index.
    pub fn compact_children(&mut self, parent_id: NodeId) -> Result<usize, StoreError> {
        let limits = &self.limits;
        let mut tx = self.storage.transaction()?;
        let parent = load(&tx, parent_id)?;
        let siblings = slots::siblings(&tx, &parent.address, limits)?;
        let moved = slots::compact(&mut tx, &parent.address, &siblings, limits)?;
        tx.commit()?;
        info!(parent = %parent_id, moved, "children compacted");
        Ok(moved)
    }

    fn anchor_parent(&self, id: NodeId, anchor: NodeId) -> Result<NodeId, StoreError> {
        if id == anchor {
            return Err(StoreError::InvalidInput(
                "node cannot be positioned relative to itself",
            ));
        }
        load(&self.storage, anchor)?
            .parent_id
            .ok_or(StoreError::InvalidInput(
                "anchor must not be a tree root; use detach_subtree",
            ))
    }

    /// The subtree is lifted into a scratch tree, a slot is claimed under the
    /// new parent, then the subtree is grafted into it.
    fn move_under(
        &mut self,
        id: NodeId,
        parent_id: NodeId,
        position: ChildPosition,
    ) -> Result<NodeRow, StoreError> {
        let limits = &self.limits;
        let codec = limits.codec();
        let mut tx = self.storage.transaction()?;
        let node = load(&tx, id)?;
        let parent = load(&tx, parent_id)?;

        ensure_outside(&node, &parent.address)?;
        let siblings = slots::siblings(&tx, &parent.address, limits)?;
        slots::check_capacity(&siblings, Some(id), limits)?;
        slots::check_anchor(&siblings, position)?;
        let subtree = NodeFilter::subtree(&node.address, codec);
        let deepest = tx.max_depth(&subtree)?.unwrap_or(node.depth());
        limits.check_depth(deepest - node.depth() + parent.depth() + 1)?;

        let scratch = PathAddress::root(next_tree_id(&tx)?);
        let rows = relocate(&mut tx, &node.address, &scratch, codec)?;
        let index = slots::claim_slot(&mut tx, &parent.address, position, limits)?;
        let target = node.address.reparent(&parent.address, index, limits)?;
        relocate(&mut tx, &scratch, &target, codec)?;
        tx.set_parent(id, Some(parent_id))?;
        debug!(
            node = %id,
            from = %node.path(),
            to = %target.path(),
            "subtree grafted"
        );

        let row = load(&tx, id)?;
        tx.commit()?;
        info!(
            node = %id,
            parent = %parent_id,
            tree_id = target.tree_id(),
            rows,
            "subtree moved"
        );
        Ok(row)
    }
}
