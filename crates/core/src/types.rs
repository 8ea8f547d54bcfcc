#![forbid(unsafe_code)]

use crate::address::PathAddress;
use crate::ids::NodeId;

/// One stored node: adjacency plus its derived address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRow {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub address: PathAddress,
}

impl NodeRow {
    pub fn tree_id(&self) -> i64 {
        self.address.tree_id()
    }

    pub fn path(&self) -> &str {
        self.address.path()
    }

    pub fn depth(&self) -> u32 {
        self.address.depth()
    }
}

/// Parent pointer of one row, as read by the rebuilder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdjacencyRow {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
}
