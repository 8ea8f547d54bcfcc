#![forbid(unsafe_code)]

use crate::error::TreeError;

/// Digits of one path segment, in ascending order.
pub const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const RADIX: u64 = ALPHABET.len() as u64;
pub const DEFAULT_STEPLEN: usize = 3;
/// 36^13 no longer fits a u64 sibling counter.
pub const MAX_STEPLEN: usize = 12;

/// Fixed-width base-36 encoding of sibling indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathCodec {
    steplen: usize,
}

impl Default for PathCodec {
    fn default() -> Self {
        Self {
            steplen: DEFAULT_STEPLEN,
        }
    }
}

impl PathCodec {
    pub fn try_new(steplen: usize) -> Result<Self, TreeError> {
        if steplen == 0 {
            return Err(TreeError::InvalidLayout("steplen must be at least 1"));
        }
        if steplen > MAX_STEPLEN {
            return Err(TreeError::InvalidLayout("steplen must not exceed 12"));
        }
        Ok(Self { steplen })
    }

    pub fn steplen(&self) -> usize {
        self.steplen
    }

    /// Number of distinct segments, i.e. `36^steplen`.
    pub fn capacity(&self) -> u64 {
        RADIX.pow(self.steplen as u32)
    }

    pub fn encode(&self, index: u64) -> Result<String, TreeError> {
        if index >= self.capacity() {
            return Err(TreeError::PathOverflow {
                index,
                steplen: self.steplen,
            });
        }
        let mut digits = vec![ALPHABET[0]; self.steplen];
        let mut rest = index;
        for slot in digits.iter_mut().rev() {
            *slot = ALPHABET[(rest % RADIX) as usize];
            rest /= RADIX;
        }
        Ok(digits.into_iter().map(char::from).collect())
    }

    pub fn decode(&self, segment: &str) -> Result<u64, TreeError> {
        if segment.len() != self.steplen {
            return Err(TreeError::CorruptPath {
                path: segment.to_string(),
                reason: "segment length differs from steplen",
            });
        }
        let mut value = 0u64;
        for byte in segment.bytes() {
            let Some(digit) = digit_value(byte) else {
                return Err(TreeError::CorruptPath {
                    path: segment.to_string(),
                    reason: "segment contains characters outside the alphabet",
                });
            };
            value = value * RADIX + digit;
        }
        Ok(value)
    }

    /// Checks a whole stored path: length multiple of steplen, alphabet only.
    pub fn validate(&self, path: &str) -> Result<(), TreeError> {
        if path.len() % self.steplen != 0 {
            return Err(TreeError::CorruptPath {
                path: path.to_string(),
                reason: "path length is not a multiple of steplen",
            });
        }
        if path.bytes().any(|b| digit_value(b).is_none()) {
            return Err(TreeError::CorruptPath {
                path: path.to_string(),
                reason: "path contains characters outside the alphabet",
            });
        }
        Ok(())
    }

    pub fn split(&self, path: &str) -> Result<Vec<u64>, TreeError> {
        self.validate(path)?;
        path.as_bytes()
            .chunks(self.steplen)
            .map(|chunk| {
                // validate() guarantees ASCII, so chunks are valid UTF-8.
                let segment = std::str::from_utf8(chunk).map_err(|_| TreeError::CorruptPath {
                    path: path.to_string(),
                    reason: "path is not ASCII",
                })?;
                self.decode(segment)
            })
            .collect()
    }

    pub fn depth_of(&self, path: &str) -> Result<u32, TreeError> {
        self.validate(path)?;
        u32::try_from(path.len() / self.steplen).map_err(|_| TreeError::CorruptPath {
            path: path.to_string(),
            reason: "path is absurdly long",
        })
    }

    /// The last segment of `path`, or `None` for a root path.
    pub fn last_segment<'a>(&self, path: &'a str) -> Option<&'a str> {
        if path.len() < self.steplen {
            return None;
        }
        path.get(path.len() - self.steplen..)
    }

    pub fn parent_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if path.len() < self.steplen {
            return None;
        }
        path.get(..path.len() - self.steplen)
    }

    /// Smallest string of the same length that sorts after `path` and does
    /// not share it as a prefix. `None` when `path` is empty or all `Z`.
    pub fn successor(&self, path: &str) -> Option<String> {
        let mut digits = path.as_bytes().to_vec();
        let top = ALPHABET[ALPHABET.len() - 1];
        for slot in digits.iter_mut().rev() {
            if *slot == top {
                *slot = ALPHABET[0];
                continue;
            }
            let value = digit_value(*slot)?;
            *slot = ALPHABET[(value + 1) as usize];
            return Some(digits.into_iter().map(char::from).collect());
        }
        None
    }
}

fn digit_value(byte: u8) -> Option<u64> {
    match byte {
        b'0'..=b'9' => Some(u64::from(byte - b'0')),
        b'A'..=b'Z' => Some(u64::from(byte - b'A') + 10),
        _ => None,
    }
}
