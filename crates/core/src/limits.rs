#![forbid(unsafe_code)]

use crate::codec::PathCodec;
use crate::error::TreeError;

pub const DEFAULT_PATHLEN: usize = 255;

/// `36^steplen`, for any steplen a [`PathCodec`] accepts.
pub fn max_children(steplen: usize) -> Result<u64, TreeError> {
    PathCodec::try_new(steplen).map(|codec| codec.capacity())
}

/// Number of levels that fit into a path field, counting the root level.
pub fn max_depth(pathlen: usize, steplen: usize) -> Result<usize, TreeError> {
    TreeLimits::try_new(steplen, pathlen).map(|limits| limits.max_depth())
}

/// Path layout of one tree-bearing table: segment width and field capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeLimits {
    codec: PathCodec,
    pathlen: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            codec: PathCodec::default(),
            pathlen: DEFAULT_PATHLEN,
        }
    }
}

impl TreeLimits {
    pub fn try_new(steplen: usize, pathlen: usize) -> Result<Self, TreeError> {
        let codec = PathCodec::try_new(steplen)?;
        if pathlen < steplen {
            return Err(TreeError::InvalidLayout(
                "pathlen must hold at least one segment",
            ));
        }
        if u32::try_from(pathlen).is_err() {
            return Err(TreeError::InvalidLayout("pathlen is too large"));
        }
        Ok(Self { codec, pathlen })
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    pub fn steplen(&self) -> usize {
        self.codec.steplen()
    }

    pub fn pathlen(&self) -> usize {
        self.pathlen
    }

    pub fn max_children(&self) -> u64 {
        self.codec.capacity()
    }

    pub fn max_depth(&self) -> usize {
        self.pathlen / self.codec.steplen() + 1
    }

    /// Largest `depth` value a row may carry (roots are depth 0).
    pub fn deepest(&self) -> u32 {
        // try_new bounds pathlen by u32::MAX.
        (self.pathlen / self.codec.steplen()) as u32
    }

    pub fn check_depth(&self, depth: u32) -> Result<(), TreeError> {
        if depth > self.deepest() {
            return Err(TreeError::PathTooDeep {
                depth,
                max_depth: self.deepest(),
            });
        }
        Ok(())
    }
}
