#![forbid(unsafe_code)]

use crate::address::{PathAddress, PathRange};
use crate::codec::PathCodec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    Ancestors,
    Children,
    Descendants,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathPredicate {
    /// `path` inside a range (descendant queries).
    Range(PathRange),
    /// `path IN (...)`; an empty set matches nothing.
    OneOf(Vec<String>),
    /// `path LIKE parent || '_' * steplen`.
    ChildOf { parent: String, steplen: usize },
}

/// Storage-level filter: `tree_id = t AND <path predicate> [AND depth = d]`.
///
/// Every consumer must return matching rows ordered by `(tree_id, path)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeFilter {
    pub tree_id: i64,
    pub path: PathPredicate,
    pub depth: Option<u32>,
}

impl NodeFilter {
    /// `and_self` is ignored for `Relation::Children`.
    pub fn for_relation(
        address: &PathAddress,
        relation: Relation,
        and_self: bool,
        codec: &PathCodec,
    ) -> Self {
        match relation {
            Relation::Ancestors => Self::ancestors(address, and_self, codec),
            Relation::Children => Self::children(address, codec),
            Relation::Descendants => Self::descendants(address, and_self, codec),
        }
    }

    pub fn descendants(address: &PathAddress, and_self: bool, codec: &PathCodec) -> Self {
        Self {
            tree_id: address.tree_id(),
            path: PathPredicate::Range(address.descendant_range(and_self, codec)),
            depth: None,
        }
    }

    /// The node itself plus all of its descendants.
    pub fn subtree(address: &PathAddress, codec: &PathCodec) -> Self {
        Self::descendants(address, true, codec)
    }

    pub fn children(address: &PathAddress, codec: &PathCodec) -> Self {
        Self {
            tree_id: address.tree_id(),
            path: PathPredicate::ChildOf {
                parent: address.path().to_string(),
                steplen: codec.steplen(),
            },
            depth: Some(address.depth() + 1),
        }
    }

    pub fn ancestors(address: &PathAddress, and_self: bool, codec: &PathCodec) -> Self {
        Self {
            tree_id: address.tree_id(),
            path: PathPredicate::OneOf(address.ancestor_paths(and_self, codec)),
            depth: None,
        }
    }

    pub fn matches(&self, tree_id: i64, path: &str, depth: u32) -> bool {
        if tree_id != self.tree_id {
            return false;
        }
        if self.depth.is_some_and(|wanted| wanted != depth) {
            return false;
        }
        match &self.path {
            PathPredicate::Range(range) => range.contains(path),
            PathPredicate::OneOf(paths) => paths.iter().any(|candidate| candidate == path),
            PathPredicate::ChildOf { parent, steplen } => {
                path.len() == parent.len() + steplen && path.starts_with(parent.as_str())
            }
        }
    }
}
