#![forbid(unsafe_code)]

use crate::store::StoreError;
use mp_core::{DEFAULT_PATHLEN, DEFAULT_STEPLEN, TreeLimits};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

const MAX_IDENTIFIER_LEN: usize = 64;

/// Per-table tree configuration.
///
/// Do not change `steplen` or `pathlen` once the first node has been saved:
/// existing paths would no longer decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeOptions {
    pub table: String,
    pub pk_field: String,
    pub parent_id_field: String,
    pub path_field: String,
    pub depth_field: String,
    pub tree_id_field: String,
    pub steplen: usize,
    pub pathlen: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            table: "nodes".to_string(),
            pk_field: "id".to_string(),
            parent_id_field: "parent_id".to_string(),
            path_field: "mp_path".to_string(),
            depth_field: "mp_depth".to_string(),
            tree_id_field: "mp_tree_id".to_string(),
            steplen: DEFAULT_STEPLEN,
            pathlen: DEFAULT_PATHLEN,
        }
    }
}

impl TreeOptions {
    pub fn from_json_str(raw: &str) -> Result<Self, StoreError> {
        let options: Self = serde_json::from_str(raw)
            .map_err(|err| StoreError::InvalidConfig(format!("tree options: {err}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.limits()?;
        let columns = [
            ("table", &self.table),
            ("pk_field", &self.pk_field),
            ("parent_id_field", &self.parent_id_field),
            ("path_field", &self.path_field),
            ("depth_field", &self.depth_field),
            ("tree_id_field", &self.tree_id_field),
        ];
        for (label, value) in columns {
            validate_identifier(label, value)?;
        }
        let distinct: BTreeSet<String> = columns[1..]
            .iter()
            .map(|(_, value)| value.to_ascii_lowercase())
            .collect();
        if distinct.len() != columns.len() - 1 {
            return Err(StoreError::InvalidConfig(
                "tree options: column names must be distinct".to_string(),
            ));
        }
        Ok(())
    }

    pub fn limits(&self) -> Result<TreeLimits, StoreError> {
        TreeLimits::try_new(self.steplen, self.pathlen)
            .map_err(|err| StoreError::InvalidConfig(format!("tree options: {err}")))
    }
}

/// Accepts plain SQL identifiers only, since they are spliced into SQL text.
pub(crate) fn validate_identifier(label: &str, value: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidConfig(format!("{label}: {reason}"));
    let Some(first) = value.chars().next() else {
        return Err(invalid("must not be empty"));
    };
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid("is too long"));
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(invalid("must start with a letter or '_'"));
    }
    if let Some(ch) = value
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_'))
    {
        return Err(invalid(&format!("invalid character {ch:?}")));
    }
    Ok(())
}
