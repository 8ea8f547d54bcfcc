#![forbid(unsafe_code)]

//! Regenerates `(tree_id, path, depth)` for every row from parent pointers.

use super::{TreeManager, ensure_absent};
use crate::store::{RebuildOrder, StoreError, TreeStorage, TreeTx};
use mp_core::{AdjacencyRow, NodeId, PathAddress, TreeError, TreeLimits};
use std::collections::{HashMap, VecDeque};
use tracing::info;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub trees: usize,
    pub nodes: usize,
}

impl<S: TreeStorage> TreeManager<S> {
    /// Discards every stored address and derives new ones from `parent_id`.
    ///
    /// Roots get tree ids `1..=n` in `order`; siblings get indices `0..k` in
    /// the same order. Tree ids are not preserved across rebuilds.
    pub fn rebuild_all_trees(&mut self, order: &RebuildOrder) -> Result<RebuildReport, StoreError> {
        let mut tx = self.storage.transaction()?;
        let report = rebuild_in(&mut tx, &self.limits, order)?;
        tx.commit()?;
        info!(trees = report.trees, nodes = report.nodes, "trees rebuilt");
        Ok(report)
    }

    /// Inserts adjacency-only rows and rebuilds, in one transaction.
    pub fn import_adjacency(
        &mut self,
        rows: &[AdjacencyRow],
        order: &RebuildOrder,
    ) -> Result<RebuildReport, StoreError> {
        let mut tx = self.storage.transaction()?;
        for row in rows {
            ensure_absent(&tx, row.id)?;
            tx.insert_unplaced(row.id, row.parent_id)?;
        }
        let report = rebuild_in(&mut tx, &self.limits, order)?;
        tx.commit()?;
        info!(
            imported = rows.len(),
            trees = report.trees,
            nodes = report.nodes,
            "adjacency imported"
        );
        Ok(report)
    }
}

fn rebuild_in<T: TreeTx>(
    tx: &mut T,
    limits: &TreeLimits,
    order: &RebuildOrder,
) -> Result<RebuildReport, StoreError> {
    let adjacency = tx.select_adjacency(order)?;
    let total = adjacency.len();
    let mut roots = Vec::new();
    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for row in &adjacency {
        match row.parent_id {
            None => roots.push(row.id),
            Some(parent_id) => children.entry(parent_id).or_default().push(row.id),
        }
    }

    tx.park_all()?;
    let mut queue = VecDeque::with_capacity(roots.len());
    for (tree_id, root) in (1i64..).zip(&roots) {
        let address = PathAddress::root(tree_id);
        tx.assign_address(*root, &address)?;
        queue.push_back((*root, address));
    }

    let mut placed = roots.len();
    while let Some((id, address)) = queue.pop_front() {
        let Some(kids) = children.remove(&id) else {
            continue;
        };
        if kids.len() as u64 > limits.max_children() {
            return Err(TreeError::TooManyChildren {
                max_children: limits.max_children(),
            }
            .into());
        }
        for (index, kid) in (0u64..).zip(kids) {
            let child = address.child_address(index, limits)?;
            tx.assign_address(kid, &child)?;
            queue.push_back((kid, child));
            placed += 1;
        }
    }

    if placed != total {
        return Err(StoreError::AdjacencyCycle {
            unreachable: total - placed,
        });
    }
    Ok(RebuildReport {
        trees: roots.len(),
        nodes: total,
    })
}
