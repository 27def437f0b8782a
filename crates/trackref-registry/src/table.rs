//! Pending set and resolved cache for one simple category.

use crate::entity::Referent;
use crate::error::MissingPolicy;
use crate::key::{PendingBatch, RefKey};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Where a key stands in the register → load → resolve lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyState {
    Unseen,
    Pending,
    Resolved,
    /// A batch covered the key and the backend returned nothing for it.
    NotFound,
}

/// Per-category bookkeeping; owned by the registry behind a mutex.
#[derive(Debug)]
pub struct RefTable<T> {
    by_id: BTreeMap<String, Arc<T>>,
    by_name: BTreeMap<String, Arc<T>>,
    missing: BTreeSet<RefKey>,
    pending_ids: BTreeSet<String>,
    pending_names: BTreeSet<String>,
    batches: u64,
}

impl<T> Default for RefTable<T> {
    fn default() -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_name: BTreeMap::new(),
            missing: BTreeSet::new(),
            pending_ids: BTreeSet::new(),
            pending_names: BTreeSet::new(),
            batches: 0,
        }
    }
}

impl<T: Referent> RefTable<T> {
    pub fn state(&self, key: &RefKey) -> KeyState {
        if self.lookup(key).is_some() {
            return KeyState::Resolved;
        }
        let pending = match key {
            RefKey::Id(id) => self.pending_ids.contains(id),
            RefKey::Name(name) => self.pending_names.contains(name),
        };
        if pending {
            KeyState::Pending
        } else if self.missing.contains(key) {
            KeyState::NotFound
        } else {
            KeyState::Unseen
        }
    }

    pub fn lookup(&self, key: &RefKey) -> Option<Arc<T>> {
        match key {
            RefKey::Id(id) => self.by_id.get(id).cloned(),
            RefKey::Name(name) => self.by_name.get(name).cloned(),
        }
    }

    /// Queue `key` for the next batch. Returns whether it was newly queued.
    pub fn register(&mut self, key: RefKey) -> bool {
        if key.is_blank() || self.state(&key) != KeyState::Unseen {
            return false;
        }
        match key {
            RefKey::Id(id) => self.pending_ids.insert(id),
            RefKey::Name(name) => self.pending_names.insert(name),
        }
    }

    /// Store a fully-formed entity under both of its keys.
    ///
    /// When either key already maps to an instance, that instance wins and
    /// the other key is indexed to it, so one logical entity never has two
    /// instances.
    pub fn insert(&mut self, entity: Arc<T>) -> Arc<T> {
        let existing = entity
            .id()
            .and_then(|id| self.by_id.get(id))
            .or_else(|| entity.name().and_then(|name| self.by_name.get(name)))
            .cloned();
        // Index the keys of the incoming entity as well as the canonical
        // one's; a backend may report a name the first response lacked.
        let mut keys = keys_of(entity.as_ref());
        let canonical = existing.unwrap_or(entity);
        keys.extend(keys_of(canonical.as_ref()));
        for key in keys {
            self.index(key, &canonical);
        }
        canonical
    }

    /// The first instance indexed under a key keeps it. An id-only and a
    /// name-only entity stored before any response linked them stay two
    /// instances; the later merge only fills keys neither of them held.
    fn index(&mut self, key: RefKey, entity: &Arc<T>) {
        self.missing.remove(&key);
        let held = match &key {
            RefKey::Id(id) => {
                self.pending_ids.remove(id);
                self.by_id
                    .entry(id.clone())
                    .or_insert_with(|| Arc::clone(entity))
            }
            RefKey::Name(name) => {
                self.pending_names.remove(name);
                self.by_name
                    .entry(name.clone())
                    .or_insert_with(|| Arc::clone(entity))
            }
        };
        if !Arc::ptr_eq(held, entity) {
            let category = T::CATEGORY;
            debug!(
                %category,
                %key,
                "key already held by another instance; keeping the earlier one"
            );
        }
    }

    /// Snapshot the pending set without draining it.
    pub fn pending_batch(&self) -> PendingBatch {
        PendingBatch {
            ids: self.pending_ids.iter().cloned().collect(),
            names: self.pending_names.iter().cloned().collect(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending_ids.len() + self.pending_names.len()
    }

    /// Apply a successful batch: index the loaded entities, drain the batch
    /// keys from the pending set, and settle the keys the backend skipped.
    pub fn complete(&mut self, batch: &PendingBatch, loaded: Vec<Arc<T>>, policy: MissingPolicy) {
        self.batches += 1;
        for entity in loaded {
            self.insert(entity);
        }
        for key in batch.keys() {
            if self.lookup(&key).is_some() {
                continue;
            }
            match &key {
                RefKey::Id(id) => self.pending_ids.remove(id),
                RefKey::Name(name) => self.pending_names.remove(name),
            };
            if policy == MissingPolicy::Memoize {
                self.missing.insert(key);
            }
        }
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Number of distinct resolved instances.
    pub fn resolved_len(&self) -> usize {
        let mut seen: Vec<*const T> = self
            .by_id
            .values()
            .chain(self.by_name.values())
            .map(Arc::as_ptr)
            .collect();
        seen.sort();
        seen.dedup();
        seen.len()
    }

    pub fn not_found_len(&self) -> usize {
        self.missing.len()
    }
}

fn keys_of<T: Referent>(entity: &T) -> Vec<RefKey> {
    [entity.id().map(RefKey::id), entity.name().map(RefKey::name)]
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::User;

    fn user(id: &str, name: &str) -> Arc<User> {
        Arc::new(User {
            id: id.to_string(),
            name: name.to_string(),
            ..User::default()
        })
    }

    #[test]
    fn register_is_idempotent() {
        let mut table = RefTable::<User>::default();
        assert!(table.register(RefKey::id("42")));
        assert!(!table.register(RefKey::id("42")));
        assert_eq!(table.pending_len(), 1);
    }

    #[test]
    fn blank_keys_are_ignored() {
        let mut table = RefTable::<User>::default();
        assert!(!table.register(RefKey::name("   ")));
        assert_eq!(table.pending_len(), 0);
    }

    #[test]
    fn insert_merges_id_and_name_into_one_instance() {
        let mut table = RefTable::<User>::default();
        let by_id = table.insert(user("7", ""));
        let merged = table.insert(user("7", "alice"));
        assert!(Arc::ptr_eq(&by_id, &merged));

        let by_name = table.lookup(&RefKey::name("alice")).expect("name indexed");
        assert!(Arc::ptr_eq(&by_id, &by_name));
        assert_eq!(table.resolved_len(), 1);
    }

    #[test]
    fn halves_stored_apart_keep_their_first_instances() {
        let mut table = RefTable::<User>::default();
        let by_id = table.insert(user("7", ""));
        let by_name = table.insert(user("", "alice"));
        let merged = table.insert(user("7", "alice"));

        assert!(Arc::ptr_eq(&merged, &by_id));
        let looked_up = table.lookup(&RefKey::name("alice")).expect("name indexed");
        assert!(Arc::ptr_eq(&looked_up, &by_name));
        assert_eq!(table.resolved_len(), 2);
    }

    #[test]
    fn insert_clears_pending_keys() {
        let mut table = RefTable::<User>::default();
        table.register(RefKey::id("7"));
        table.register(RefKey::name("alice"));
        table.insert(user("7", "alice"));
        assert_eq!(table.pending_len(), 0);
        assert_eq!(table.state(&RefKey::name("alice")), KeyState::Resolved);
    }

    #[test]
    fn complete_memoizes_missing_keys() {
        let mut table = RefTable::<User>::default();
        table.register(RefKey::id("1"));
        table.register(RefKey::id("999"));
        let batch = table.pending_batch();

        table.complete(&batch, vec![user("1", "root")], MissingPolicy::Memoize);

        assert_eq!(table.pending_len(), 0);
        assert_eq!(table.state(&RefKey::id("999")), KeyState::NotFound);
        assert!(!table.register(RefKey::id("999")));
        assert_eq!(table.batches(), 1);
    }

    #[test]
    fn requery_policy_forgets_missing_keys() {
        let mut table = RefTable::<User>::default();
        table.register(RefKey::id("999"));
        let batch = table.pending_batch();

        table.complete(&batch, Vec::new(), MissingPolicy::Requery);

        assert_eq!(table.state(&RefKey::id("999")), KeyState::Unseen);
        assert!(table.register(RefKey::id("999")));
    }
}
