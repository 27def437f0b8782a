//! Resolution errors and the not-found policy.
//!
//! Only a failed round trip is an error. A key the backend does not know
//! and a blank key both resolve to `Ok(None)`.

use crate::category::Category;
use crate::loader::LoadError;
use serde::{Deserialize, Serialize};

/// Errors surfaced by `get`-style registry calls.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The batch load for `category` failed; its pending set is untouched
    /// and a later call retries the same batch.
    #[error("failed to resolve {category} references: {source}")]
    Transport {
        category: Category,
        #[source]
        source: LoadError,
    },

    /// A simple-category call named a composite category, or the reverse.
    #[error("{category} references are not addressable this way")]
    WrongKeySpace { category: Category },
}

impl ResolveError {
    pub fn category(&self) -> Category {
        match self {
            ResolveError::Transport { category, .. } | ResolveError::WrongKeySpace { category } => {
                *category
            }
        }
    }
}

/// What happens to a key a successful batch did not return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingPolicy {
    /// Remember the key as not found for the registry's lifetime.
    #[default]
    Memoize,
    /// Forget the key; a later lookup queues it again.
    Requery,
}
