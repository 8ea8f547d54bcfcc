#![forbid(unsafe_code)]

//! Sibling index allocation under one parent.
//!
//! A claim takes a free index between the two intended neighbours. When the
//! neighbours are adjacent it shifts the contiguous run of occupied indices
//! at the insertion point up by one, last sibling first so every rewrite
//! lands on a free slot. When that run already ends at the last encodable
//! index the children are compacted to `0..n` once and the claim retried.

use super::{ChildPosition, relocate};
use crate::store::{StoreError, TreeRead, TreeTx};
use mp_core::{NodeFilter, NodeId, PathAddress, TreeError, TreeLimits};
use tracing::{debug, warn};

/// A child of the parent being filled, with its decoded sibling index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Sibling {
    pub id: NodeId,
    pub index: u64,
}

/// Children of `parent` in sibling order.
pub(super) fn siblings(
    reader: &impl TreeRead,
    parent: &PathAddress,
    limits: &TreeLimits,
) -> Result<Vec<Sibling>, StoreError> {
    let codec = limits.codec();
    reader
        .select_rows(&NodeFilter::children(parent, codec))?
        .into_iter()
        .map(|row| {
            let index = row
                .address
                .last_index(codec)?
                .ok_or(StoreError::InvalidInput("child row has an empty path"))?;
            Ok::<_, StoreError>(Sibling { id: row.id, index })
        })
        .collect()
}

/// `moving` is left out of the count when it is already one of the children.
pub(super) fn check_capacity(
    siblings: &[Sibling],
    moving: Option<NodeId>,
    limits: &TreeLimits,
) -> Result<(), StoreError> {
    let occupied = siblings
        .iter()
        .filter(|sibling| Some(sibling.id) != moving)
        .count();
    if occupied as u64 >= limits.max_children() {
        return Err(TreeError::TooManyChildren {
            max_children: limits.max_children(),
        }
        .into());
    }
    Ok(())
}

pub(super) fn check_anchor(
    siblings: &[Sibling],
    position: ChildPosition,
) -> Result<(), StoreError> {
    match position.anchor() {
        Some(anchor) if !siblings.iter().any(|sibling| sibling.id == anchor) => Err(
            StoreError::InvalidInput("anchor is not a child of the destination parent"),
        ),
        _ => Ok(()),
    }
}

/// Returns a free sibling index at `position`, shifting or compacting the
/// existing children as needed.
pub(super) fn claim_slot<T: TreeTx>(
    tx: &mut T,
    parent: &PathAddress,
    position: ChildPosition,
    limits: &TreeLimits,
) -> Result<u64, StoreError> {
    let current = siblings(&*tx, parent, limits)?;
    check_capacity(&current, None, limits)?;
    if let Some(index) = try_claim(tx, parent, &current, position, limits)? {
        return Ok(index);
    }

    warn!(
        parent_tree = parent.tree_id(),
        parent_path = %parent.path(),
        children = current.len(),
        "no free sibling index left, compacting children"
    );
    compact(tx, parent, &current, limits)?;
    let compacted = siblings(&*tx, parent, limits)?;
    try_claim(tx, parent, &compacted, position, limits)?.ok_or_else(|| {
        TreeError::TooManyChildren {
            max_children: limits.max_children(),
        }
        .into()
    })
}

fn try_claim<T: TreeTx>(
    tx: &mut T,
    parent: &PathAddress,
    siblings: &[Sibling],
    position: ChildPosition,
    limits: &TreeLimits,
) -> Result<Option<u64>, StoreError> {
    let (lo, hi) = window(siblings, position, limits.max_children())?;
    if lo < hi {
        return Ok(Some(lo));
    }
    shift_run(tx, parent, siblings, hi, limits)
}

/// Half-open range of indices strictly between the intended neighbours.
fn window(
    siblings: &[Sibling],
    position: ChildPosition,
    max: u64,
) -> Result<(u64, u64), StoreError> {
    let locate = |anchor: NodeId| {
        siblings
            .iter()
            .position(|sibling| sibling.id == anchor)
            .ok_or(StoreError::InvalidInput(
                "anchor is not a child of the destination parent",
            ))
    };
    let after = |slot: Option<&Sibling>| slot.map_or(0, |sibling| sibling.index + 1);
    let before = |slot: Option<&Sibling>| slot.map_or(max, |sibling| sibling.index);

    Ok(match position {
        ChildPosition::First => (0, before(siblings.first())),
        ChildPosition::Last => (after(siblings.last()), max),
        ChildPosition::Before(anchor) => {
            let at = locate(anchor)?;
            let previous = at.checked_sub(1).and_then(|prev| siblings.get(prev));
            (after(previous), siblings[at].index)
        }
        ChildPosition::After(anchor) => {
            let at = locate(anchor)?;
            (siblings[at].index + 1, before(siblings.get(at + 1)))
        }
    })
}

/// Frees `start` by moving the contiguous run of occupied indices beginning
/// there up by one. Returns `None` when the run would leave the encodable
/// range.
fn shift_run<T: TreeTx>(
    tx: &mut T,
    parent: &PathAddress,
    siblings: &[Sibling],
    start: u64,
    limits: &TreeLimits,
) -> Result<Option<u64>, StoreError> {
    if start >= limits.max_children() {
        return Ok(None);
    }
    let Some(first) = siblings.iter().position(|sibling| sibling.index == start) else {
        return Ok(Some(start));
    };
    let mut last = first;
    while siblings
        .get(last + 1)
        .is_some_and(|next| next.index == siblings[last].index + 1)
    {
        last += 1;
    }
    if siblings[last].index + 1 >= limits.max_children() {
        return Ok(None);
    }

    for sibling in siblings[first..=last].iter().rev() {
        renumber(tx, parent, sibling.index, sibling.index + 1, limits)?;
    }
    debug!(
        parent_path = %parent.path(),
        from = start,
        shifted = last - first + 1,
        "siblings shifted"
    );
    Ok(Some(start))
}

/// Renumbers the children of `parent` to `0..n`, keeping their order.
/// Returns how many subtrees were moved.
pub(super) fn compact<T: TreeTx>(
    tx: &mut T,
    parent: &PathAddress,
    siblings: &[Sibling],
    limits: &TreeLimits,
) -> Result<usize, StoreError> {
    let mut moved = 0;
    for (target, sibling) in (0u64..).zip(siblings) {
        if sibling.index != target {
            renumber(tx, parent, sibling.index, target, limits)?;
            moved += 1;
        }
    }
    Ok(moved)
}

fn renumber<T: TreeTx>(
    tx: &mut T,
    parent: &PathAddress,
    from: u64,
    to: u64,
    limits: &TreeLimits,
) -> Result<(), StoreError> {
    let old = parent.child_address(from, limits)?;
    let new = parent.child_address(to, limits)?;
    relocate(tx, &old, &new, limits.codec())?;
    Ok(())
}
