#![forbid(unsafe_code)]

use crate::codec::PathCodec;
use crate::error::TreeError;
use crate::limits::TreeLimits;

/// Where a node sits: its tree, its materialized path and its depth.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathAddress {
    tree_id: i64,
    path: String,
    depth: u32,
}

impl PathAddress {
    pub fn root(tree_id: i64) -> Self {
        Self {
            tree_id,
            path: String::new(),
            depth: 0,
        }
    }

    /// Builds an address from a bare path, deriving the depth.
    pub fn parse(
        tree_id: i64,
        path: impl Into<String>,
        codec: &PathCodec,
    ) -> Result<Self, TreeError> {
        let path = path.into();
        let depth = codec.depth_of(&path)?;
        Ok(Self {
            tree_id,
            path,
            depth,
        })
    }

    /// Builds an address from the three stored columns, refusing rows whose
    /// depth disagrees with their path.
    pub fn from_stored(
        tree_id: i64,
        path: impl Into<String>,
        depth: i64,
        codec: &PathCodec,
    ) -> Result<Self, TreeError> {
        let address = Self::parse(tree_id, path, codec)?;
        if i64::from(address.depth) != depth {
            return Err(TreeError::CorruptPath {
                path: address.path,
                reason: "stored depth does not match path length",
            });
        }
        Ok(address)
    }

    pub fn tree_id(&self) -> i64 {
        self.tree_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn segments(&self, codec: &PathCodec) -> Result<Vec<u64>, TreeError> {
        codec.split(&self.path)
    }

    /// Sibling index of this node under its parent; `None` for roots.
    pub fn last_index(&self, codec: &PathCodec) -> Result<Option<u64>, TreeError> {
        codec
            .last_segment(&self.path)
            .map(|segment| codec.decode(segment))
            .transpose()
    }

    pub fn parent(&self, codec: &PathCodec) -> Option<PathAddress> {
        let parent_path = codec.parent_path(&self.path)?;
        Some(Self {
            tree_id: self.tree_id,
            path: parent_path.to_string(),
            depth: self.depth.saturating_sub(1),
        })
    }

    pub fn child_address(&self, next_index: u64, limits: &TreeLimits) -> Result<Self, TreeError> {
        let segment = limits.codec().encode(next_index)?;
        let depth = self.depth + 1;
        limits.check_depth(depth)?;
        let mut path = String::with_capacity(self.path.len() + segment.len());
        path.push_str(&self.path);
        path.push_str(&segment);
        Ok(Self {
            tree_id: self.tree_id,
            path,
            depth,
        })
    }

    pub fn is_ancestor_of(&self, other: &PathAddress) -> bool {
        self.tree_id == other.tree_id
            && other.path.len() > self.path.len()
            && other.path.starts_with(&self.path)
    }

    pub fn is_self_or_ancestor_of(&self, other: &PathAddress) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Path range covering the subtree rooted here, within `tree_id`.
    pub fn descendant_range(&self, and_self: bool, codec: &PathCodec) -> PathRange {
        PathRange {
            lower: self.path.clone(),
            lower_inclusive: and_self,
            upper: codec.successor(&self.path),
        }
    }

    /// Paths of every ancestor, root first, optionally ending with this node.
    pub fn ancestor_paths(&self, and_self: bool, codec: &PathCodec) -> Vec<String> {
        let steplen = codec.steplen();
        let mut out: Vec<String> = (0..self.depth as usize)
            .map(|level| self.path[..level * steplen].to_string())
            .collect();
        if and_self {
            out.push(self.path.clone());
        }
        out
    }

    /// Address of this node after moving it under `new_parent` at sibling
    /// position `new_index`. A node cannot land inside its own subtree.
    pub fn reparent(
        &self,
        new_parent: &PathAddress,
        new_index: u64,
        limits: &TreeLimits,
    ) -> Result<Self, TreeError> {
        if self.is_self_or_ancestor_of(new_parent) {
            return Err(TreeError::MovingToDescendant);
        }
        new_parent.child_address(new_index, limits)
    }

    /// Carries a descendant of `old_root` along when `old_root` moves to
    /// `new_root`.
    pub fn rebase(
        &self,
        old_root: &PathAddress,
        new_root: &PathAddress,
        limits: &TreeLimits,
    ) -> Result<Self, TreeError> {
        if !old_root.is_self_or_ancestor_of(self) {
            return Err(TreeError::CorruptPath {
                path: self.path.clone(),
                reason: "address is outside the subtree being rebased",
            });
        }
        let rewrite = SubtreeRewrite::between(old_root, new_root);
        let (tree_id, path, depth) = rewrite.apply(self.tree_id, &self.path, self.depth);
        let depth = u32::try_from(depth).map_err(|_| TreeError::CorruptPath {
            path: path.clone(),
            reason: "rebased depth is negative",
        })?;
        limits.check_depth(depth)?;
        Ok(Self {
            tree_id,
            path,
            depth,
        })
    }
}

/// Half-open range of paths: `lower` (inclusive or not) up to `upper`
/// (exclusive, unbounded when `None`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathRange {
    pub lower: String,
    pub lower_inclusive: bool,
    pub upper: Option<String>,
}

impl PathRange {
    pub fn contains(&self, path: &str) -> bool {
        let above = if self.lower_inclusive {
            path >= self.lower.as_str()
        } else {
            path > self.lower.as_str()
        };
        above && self.upper.as_deref().is_none_or(|upper| path < upper)
    }
}

/// One set-based rewrite of a subtree: strip the old prefix, prepend the new
/// one, move to `tree_id`, shift depths by `depth_delta`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubtreeRewrite {
    pub old_prefix_len: usize,
    pub new_prefix: String,
    pub tree_id: Option<i64>,
    pub depth_delta: i64,
}

impl SubtreeRewrite {
    pub fn between(old_root: &PathAddress, new_root: &PathAddress) -> Self {
        Self {
            old_prefix_len: old_root.path.len(),
            new_prefix: new_root.path.clone(),
            tree_id: (old_root.tree_id != new_root.tree_id).then_some(new_root.tree_id),
            depth_delta: i64::from(new_root.depth) - i64::from(old_root.depth),
        }
    }

    pub fn apply(&self, tree_id: i64, path: &str, depth: u32) -> (i64, String, i64) {
        let tail = path.get(self.old_prefix_len..).unwrap_or("");
        let mut new_path = String::with_capacity(self.new_prefix.len() + tail.len());
        new_path.push_str(&self.new_prefix);
        new_path.push_str(tail);
        (
            self.tree_id.unwrap_or(tree_id),
            new_path,
            i64::from(depth) + self.depth_delta,
        )
    }
}
