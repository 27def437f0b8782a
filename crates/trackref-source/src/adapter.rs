//! `BatchLoader` over a `BulkSource`: fetch raw rows, convert them.

use crate::convert::converter_for;
use crate::transport::{BulkSource, TransportError};
use crate::wire::WireRecord;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, trace};
use trackref_registry::{BatchLoader, Category, Entity, LoadError, PendingBatch, RefKey};

/// Adapts a backend to the registry's loader contract and counts the
/// round trips it makes per category.
pub struct SourceLoader<S> {
    source: S,
    round_trips: Mutex<BTreeMap<Category, u64>>,
}

impl<S: BulkSource> SourceLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            round_trips: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn round_trips(&self, category: Category) -> u64 {
        self.round_trips
            .lock()
            .get(&category)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_round_trips(&self) -> u64 {
        self.round_trips.lock().values().sum()
    }

    fn count(&self, category: Category) {
        *self.round_trips.lock().entry(category).or_insert(0) += 1;
    }

    fn convert_all(
        &self,
        category: Category,
        records: Vec<WireRecord>,
    ) -> Result<Vec<Entity>, LoadError> {
        let spec = converter_for(category).ok_or(LoadError::Unsupported(category))?;
        let source = self.source.name();
        records
            .iter()
            .map(|record| {
                (spec.convert)(record).map_err(|e| {
                    LoadError::Malformed(format!("{source} returned a bad {category} row: {e}"))
                })
            })
            .collect()
    }
}

impl<S: BulkSource> BatchLoader for SourceLoader<S> {
    fn load_pending(
        &self,
        category: Category,
        batch: &PendingBatch,
    ) -> Result<Vec<Entity>, LoadError> {
        if category.is_composite() {
            return Err(LoadError::Unsupported(category));
        }
        let mut records = Vec::new();
        if !batch.ids.is_empty() {
            self.count(category);
            records.extend(
                self.source
                    .fetch_by_ids(category, &batch.ids)
                    .map_err(load_error)?,
            );
        }
        if !batch.names.is_empty() {
            self.count(category);
            records.extend(
                self.source
                    .fetch_by_names(category, &batch.names)
                    .map_err(load_error)?,
            );
        }
        debug!(
            source = self.source.name(),
            %category,
            rows = records.len(),
            "fetched rows"
        );
        self.convert_all(category, records)
    }

    fn load_children(
        &self,
        category: Category,
        parents: &[RefKey],
    ) -> Result<BTreeMap<RefKey, Vec<Entity>>, LoadError> {
        if !category.is_composite() {
            return Err(LoadError::Unsupported(category));
        }
        self.count(category);
        let grouped = self
            .source
            .fetch_children(category, parents)
            .map_err(load_error)?;
        let mut out = BTreeMap::new();
        for (parent, records) in grouped {
            trace!(%category, %parent, rows = records.len(), "fetched children");
            out.insert(parent, self.convert_all(category, records)?);
        }
        Ok(out)
    }
}

fn load_error(err: TransportError) -> LoadError {
    match err {
        TransportError::Malformed(message) => LoadError::Malformed(message),
        other => LoadError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Serves one user and one comment, or fails every call.
    struct Fixed {
        fail: bool,
        bad_rows: bool,
    }

    impl BulkSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_by_ids(
            &self,
            _category: Category,
            ids: &[String],
        ) -> Result<Vec<WireRecord>, TransportError> {
            if self.fail {
                return Err(TransportError::Unreachable("no route to host".to_string()));
            }
            if self.bad_rows {
                return Ok(vec![WireRecord::new().with("realName", "nobody")]);
            }
            Ok(ids
                .iter()
                .filter(|id| id.as_str() == "7")
                .map(|_| WireRecord::new().with("id", 7).with("name", "alice"))
                .collect())
        }

        fn fetch_by_names(
            &self,
            _category: Category,
            names: &[String],
        ) -> Result<Vec<WireRecord>, TransportError> {
            Ok(names
                .iter()
                .filter(|name| name.as_str() == "alice")
                .map(|_| WireRecord::new().with("id", 7).with("name", "alice"))
                .collect())
        }

        fn fetch_children(
            &self,
            _category: Category,
            parents: &[RefKey],
        ) -> Result<BTreeMap<RefKey, Vec<WireRecord>>, TransportError> {
            if self.fail {
                return Err(TransportError::Malformed("truncated body".to_string()));
            }
            let row = WireRecord::from_value(json!({
                "id": "c1", "parent": "BUG-1", "body": "first"
            }))
            .expect("object");
            Ok(parents
                .iter()
                .filter(|parent| parent.as_str() == "BUG-1")
                .map(|parent| (parent.clone(), vec![row.clone()]))
                .collect())
        }
    }

    fn loader(fail: bool, bad_rows: bool) -> SourceLoader<Fixed> {
        SourceLoader::new(Fixed { fail, bad_rows })
    }

    #[test]
    fn ids_and_names_are_separate_round_trips() {
        let loader = loader(false, false);
        let batch = PendingBatch {
            ids: vec!["7".to_string(), "8".to_string()],
            names: vec!["alice".to_string()],
        };
        let entities = loader
            .load_pending(Category::User, &batch)
            .expect("source is up");
        assert_eq!(entities.len(), 2);
        assert_eq!(loader.round_trips(Category::User), 2);

        let ids_only = PendingBatch {
            ids: vec!["7".to_string()],
            names: Vec::new(),
        };
        loader
            .load_pending(Category::User, &ids_only)
            .expect("source is up");
        assert_eq!(loader.round_trips(Category::User), 3);
    }

    #[test]
    fn transport_and_conversion_failures_map_to_load_errors() {
        let batch = PendingBatch {
            ids: vec!["7".to_string()],
            names: Vec::new(),
        };
        assert!(matches!(
            loader(true, false).load_pending(Category::User, &batch),
            Err(LoadError::Transport(_))
        ));
        assert!(matches!(
            loader(false, true).load_pending(Category::User, &batch),
            Err(LoadError::Malformed(_))
        ));
        assert!(matches!(
            loader(true, false).load_children(Category::Comment, &[RefKey::id("BUG-1")]),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn key_spaces_are_enforced() {
        let loader = loader(false, false);
        assert_eq!(
            loader.load_children(Category::User, &[RefKey::id("7")]),
            Err(LoadError::Unsupported(Category::User))
        );
        assert_eq!(
            loader.load_pending(Category::Comment, &PendingBatch::default()),
            Err(LoadError::Unsupported(Category::Comment))
        );
    }

    #[test]
    fn children_are_grouped_by_requested_parent() {
        let loader = loader(false, false);
        let grouped = loader
            .load_children(
                Category::Comment,
                &[RefKey::id("BUG-1"), RefKey::id("BUG-2")],
            )
            .expect("source is up");
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&RefKey::id("BUG-1")].len(), 1);
        assert_eq!(loader.total_round_trips(), 1);
    }
}
