//! Reference keys and pending-batch snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A raw cross-reference as it appears in a wire record.
///
/// Ids are opaque strings; numeric ids are stringified by the parser.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "lowercase")]
pub enum RefKey {
    Id(String),
    Name(String),
}

impl RefKey {
    pub fn id(id: impl Into<String>) -> Self {
        RefKey::Id(id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        RefKey::Name(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            RefKey::Id(value) | RefKey::Name(value) => value,
        }
    }

    /// Empty or whitespace-only keys never reach the pending set.
    pub fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }

    pub fn is_id(&self) -> bool {
        matches!(self, RefKey::Id(_))
    }
}

impl fmt::Display for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKey::Id(id) => write!(f, "id:{id}"),
            RefKey::Name(name) => write!(f, "name:{name}"),
        }
    }
}

/// Sorted, deduplicated snapshot of one category's pending set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBatch {
    pub ids: Vec<String>,
    pub names: Vec<String>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len() + self.names.len()
    }

    /// Iterate the batch back as keys.
    pub fn keys(&self) -> impl Iterator<Item = RefKey> + '_ {
        self.ids
            .iter()
            .cloned()
            .map(RefKey::Id)
            .chain(self.names.iter().cloned().map(RefKey::Name))
    }
}
