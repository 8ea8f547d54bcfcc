#![forbid(unsafe_code)]

/// Primary key of a node row.
///
/// Keys are strictly positive. The rebuilder relies on that to park rows in
/// scratch trees numbered `-id`, which never collide with real tree ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(i64);

impl NodeId {
    pub fn get(self) -> i64 {
        self.0
    }

    pub fn try_new(value: i64) -> Result<Self, NodeIdError> {
        if value <= 0 {
            return Err(NodeIdError::NotPositive);
        }
        Ok(Self(value))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeIdError {
    NotPositive,
}

impl NodeIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotPositive => "node id must be a positive integer",
        }
    }
}
