//! Backend seam: bulk lookups that return raw wire records.

use crate::wire::WireRecord;
use std::collections::BTreeMap;
use std::sync::Arc;
use trackref_registry::{Category, RefKey};

/// A tracker backend able to answer bulk lookups.
///
/// Each method is one remote round trip. Keys with no match are simply
/// absent from the response.
pub trait BulkSource: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    fn fetch_by_ids(
        &self,
        category: Category,
        ids: &[String],
    ) -> Result<Vec<WireRecord>, TransportError>;

    fn fetch_by_names(
        &self,
        category: Category,
        names: &[String],
    ) -> Result<Vec<WireRecord>, TransportError>;

    /// Children of every listed parent, grouped under the requested key.
    fn fetch_children(
        &self,
        category: Category,
        parents: &[RefKey],
    ) -> Result<BTreeMap<RefKey, Vec<WireRecord>>, TransportError>;
}

macro_rules! forward_bulk_source {
    ($wrapper:ty) => {
        impl<S: BulkSource + ?Sized> BulkSource for $wrapper {
            fn name(&self) -> &str {
                (**self).name()
            }

            fn fetch_by_ids(
                &self,
                category: Category,
                ids: &[String],
            ) -> Result<Vec<WireRecord>, TransportError> {
                (**self).fetch_by_ids(category, ids)
            }

            fn fetch_by_names(
                &self,
                category: Category,
                names: &[String],
            ) -> Result<Vec<WireRecord>, TransportError> {
                (**self).fetch_by_names(category, names)
            }

            fn fetch_children(
                &self,
                category: Category,
                parents: &[RefKey],
            ) -> Result<BTreeMap<RefKey, Vec<WireRecord>>, TransportError> {
                (**self).fetch_children(category, parents)
            }
        }
    };
}

forward_bulk_source!(Box<S>);
forward_bulk_source!(Arc<S>);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend rejected credentials: {0}")]
    Unauthorized(String),

    #[error("backend timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed backend response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
