//! The batch-loader contract.
//!
//! The registry decides batch boundaries; a loader is always handed the
//! complete pending set of one category and performs one bulk fetch for it.

use crate::category::Category;
use crate::entity::Entity;
use crate::key::{PendingBatch, RefKey};
use std::collections::BTreeMap;

/// Bulk resolution of pending references, one function per category.
///
/// Keys absent from a successful response mean "not found". A loader that
/// cannot tell "nothing found" from "fetch failed" must return an error.
pub trait BatchLoader: Send + Sync {
    /// Resolve a simple category's pending ids and names in one round trip.
    fn load_pending(
        &self,
        category: Category,
        batch: &PendingBatch,
    ) -> Result<Vec<Entity>, LoadError>;

    /// Resolve every child of every pending parent in one round trip.
    ///
    /// Results are grouped by the parent key they were requested under.
    fn load_children(
        &self,
        category: Category,
        parents: &[RefKey],
    ) -> Result<BTreeMap<RefKey, Vec<Entity>>, LoadError> {
        let _ = parents;
        Err(LoadError::Unsupported(category))
    }
}

/// Failure of a whole batch round trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no bulk loader for {0} references")]
    Unsupported(Category),
}

impl<L: BatchLoader + ?Sized> BatchLoader for std::sync::Arc<L> {
    fn load_pending(
        &self,
        category: Category,
        batch: &PendingBatch,
    ) -> Result<Vec<Entity>, LoadError> {
        (**self).load_pending(category, batch)
    }

    fn load_children(
        &self,
        category: Category,
        parents: &[RefKey],
    ) -> Result<BTreeMap<RefKey, Vec<Entity>>, LoadError> {
        (**self).load_children(category, parents)
    }
}
