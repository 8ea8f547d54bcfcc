#![forbid(unsafe_code)]

use mp_core::{NodeId, TreeError};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    InvalidConfig(String),
    UnknownNode(NodeId),
    NodeAlreadyExists(NodeId),
    AlreadyRoot(NodeId),
    AdjacencyCycle { unreachable: usize },
    Tree(TreeError),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQLITE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::UnknownNode(_) => "UNKNOWN_NODE",
            Self::NodeAlreadyExists(_) => "NODE_ALREADY_EXISTS",
            Self::AlreadyRoot(_) => "ALREADY_ROOT",
            Self::AdjacencyCycle { .. } => "ADJACENCY_CYCLE",
            Self::Tree(err) => err.code(),
        }
    }

    pub fn tree_error(&self) -> Option<&TreeError> {
        match self {
            Self::Tree(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::InvalidConfig(message) => write!(f, "invalid config: {message}"),
            Self::UnknownNode(id) => write!(f, "unknown node (id={id})"),
            Self::NodeAlreadyExists(id) => write!(f, "node already exists (id={id})"),
            Self::AlreadyRoot(id) => write!(f, "node is already a tree root (id={id})"),
            Self::AdjacencyCycle { unreachable } => write!(
                f,
                "adjacency has rows unreachable from any root (unreachable={unreachable})"
            ),
            Self::Tree(err) => write!(f, "tree: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Sql(err) => Some(err),
            Self::Tree(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<TreeError> for StoreError {
    fn from(value: TreeError) -> Self {
        Self::Tree(value)
    }
}
