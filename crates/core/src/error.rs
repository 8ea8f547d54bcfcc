#![forbid(unsafe_code)]

/// Failures of path arithmetic and tree-shape checks.
///
/// None of these are transient: the caller asked for a shape the configured
/// `steplen`/`pathlen` cannot represent, or stored data is corrupt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    PathOverflow { index: u64, steplen: usize },
    TooManyChildren { max_children: u64 },
    PathTooDeep { depth: u32, max_depth: u32 },
    MovingToDescendant,
    CorruptPath { path: String, reason: &'static str },
    InvalidLayout(&'static str),
}

impl TreeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathOverflow { .. } => "PATH_OVERFLOW",
            Self::TooManyChildren { .. } => "TOO_MANY_CHILDREN",
            Self::PathTooDeep { .. } => "PATH_TOO_DEEP",
            Self::MovingToDescendant => "MOVING_TO_DESCENDANT",
            Self::CorruptPath { .. } => "CORRUPT_PATH",
            Self::InvalidLayout(_) => "INVALID_LAYOUT",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::PathOverflow { .. } => "sibling index does not fit into one path segment",
            Self::TooManyChildren { .. } => "parent already holds the maximum number of children",
            Self::PathTooDeep { .. } => "resulting path is longer than the path field allows",
            Self::MovingToDescendant => "a subtree cannot be moved into itself",
            Self::CorruptPath { .. } => "stored path is not a valid materialized path",
            Self::InvalidLayout(message) => *message,
        }
    }
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PathOverflow { index, steplen } => {
                write!(f, "path overflow (index={index}, steplen={steplen})")
            }
            Self::TooManyChildren { max_children } => {
                write!(f, "too many children (max_children={max_children})")
            }
            Self::PathTooDeep { depth, max_depth } => {
                write!(f, "path too deep (depth={depth}, max_depth={max_depth})")
            }
            Self::MovingToDescendant => write!(f, "moving to descendant"),
            Self::CorruptPath { path, reason } => {
                write!(f, "corrupt path {path:?}: {reason}")
            }
            Self::InvalidLayout(message) => write!(f, "invalid layout: {message}"),
        }
    }
}

impl std::error::Error for TreeError {}
