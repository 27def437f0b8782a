//! Parent-keyed tables for composite categories (versions, comments,
//! attachments).
//!
//! The remote bulk endpoints for these return a multi-map grouped by parent,
//! so the pending set holds parent keys and a batch fills one bucket per
//! parent.
//!
//! Child ids are unique across a category, so one category-wide id index
//! keeps a child the same instance when it arrives under more than one
//! parent key (a version listed under both its project's id and name).

use crate::entity::ChildReferent;
use crate::key::RefKey;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug)]
struct Bucket<T> {
    children: Vec<Arc<T>>,
    by_id: BTreeMap<String, Arc<T>>,
    by_name: BTreeMap<String, Arc<T>>,
    /// Set once a batch has covered this parent.
    loaded: bool,
}

impl<T> Default for Bucket<T> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            by_id: BTreeMap::new(),
            by_name: BTreeMap::new(),
            loaded: false,
        }
    }
}

impl<T: ChildReferent> Bucket<T> {
    fn lookup(&self, child: &RefKey) -> Option<Arc<T>> {
        match child {
            RefKey::Id(id) => self.by_id.get(id).cloned(),
            RefKey::Name(name) => self.by_name.get(name).cloned(),
        }
    }

    fn insert(&mut self, entity: Arc<T>) -> Arc<T> {
        let existing = entity
            .id()
            .and_then(|id| self.by_id.get(id))
            .or_else(|| entity.name().and_then(|name| self.by_name.get(name)))
            .cloned();
        if let Some(existing) = existing {
            if let Some(name) = entity.name() {
                self.by_name
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::clone(&existing));
            }
            return existing;
        }

        if let Some(id) = entity.id() {
            self.by_id.insert(id.to_string(), Arc::clone(&entity));
        }
        if let Some(name) = entity.name() {
            self.by_name
                .entry(name.to_string())
                .or_insert_with(|| Arc::clone(&entity));
        }
        self.children.push(Arc::clone(&entity));
        entity
    }
}

/// Pending parents plus per-parent resolved children.
#[derive(Debug)]
pub struct ChildTable<T> {
    buckets: BTreeMap<RefKey, Bucket<T>>,
    /// Canonical instance per child id, across every bucket.
    by_id: BTreeMap<String, Arc<T>>,
    pending: BTreeSet<RefKey>,
    batches: u64,
}

impl<T> Default for ChildTable<T> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            by_id: BTreeMap::new(),
            pending: BTreeSet::new(),
            batches: 0,
        }
    }
}

impl<T: ChildReferent> ChildTable<T> {
    pub fn is_loaded(&self, parent: &RefKey) -> bool {
        self.buckets.get(parent).is_some_and(|bucket| bucket.loaded)
    }

    pub fn is_pending(&self, parent: &RefKey) -> bool {
        self.pending.contains(parent)
    }

    /// Queue `parent` for the next batch. Returns whether it was newly queued.
    pub fn register(&mut self, parent: RefKey) -> bool {
        if parent.is_blank() || self.is_loaded(&parent) {
            return false;
        }
        self.pending.insert(parent)
    }

    /// Store an inline child without marking its parent loaded.
    pub fn insert(&mut self, entity: Arc<T>) -> Arc<T> {
        let parent = entity.parent();
        self.insert_under(parent, entity)
    }

    fn insert_under(&mut self, parent: RefKey, entity: Arc<T>) -> Arc<T> {
        let entity = match entity.id() {
            Some(id) => Arc::clone(
                self.by_id
                    .entry(id.to_string())
                    .or_insert_with(|| Arc::clone(&entity)),
            ),
            None => entity,
        };
        self.buckets.entry(parent).or_default().insert(entity)
    }

    pub fn lookup(&self, parent: &RefKey, child: &RefKey) -> Option<Arc<T>> {
        self.buckets
            .get(parent)
            .and_then(|bucket| bucket.lookup(child))
    }

    /// Children known for `parent`, in arrival order.
    pub fn children(&self, parent: &RefKey) -> Vec<Arc<T>> {
        self.buckets
            .get(parent)
            .map(|bucket| bucket.children.clone())
            .unwrap_or_default()
    }

    pub fn pending_parents(&self) -> Vec<RefKey> {
        self.pending.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Demultiplex one batch response into per-parent buckets.
    ///
    /// Every requested parent ends up loaded, including parents the response
    /// did not mention (they simply have no children).
    pub fn complete(&mut self, parents: &[RefKey], loaded: BTreeMap<RefKey, Vec<Arc<T>>>) {
        self.batches += 1;
        for (parent, children) in loaded {
            for child in children {
                self.insert_under(parent.clone(), child);
            }
        }
        for parent in parents {
            self.pending.remove(parent);
            self.buckets.entry(parent.clone()).or_default().loaded = true;
        }
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Distinct children; one listed under several parent keys counts once.
    pub fn resolved_len(&self) -> usize {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.children.iter())
            .map(Arc::as_ptr)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn loaded_parents(&self) -> usize {
        self.buckets.values().filter(|bucket| bucket.loaded).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Attachment;

    fn attachment(issue: &str, id: &str, file_name: &str) -> Arc<Attachment> {
        Arc::new(Attachment {
            id: id.to_string(),
            issue: issue.to_string(),
            file_name: file_name.to_string(),
            content_type: String::new(),
            size: 0,
            creator: None,
            created_at: None,
        })
    }

    #[test]
    fn register_skips_loaded_parents() {
        let mut table = ChildTable::<Attachment>::default();
        let parent = RefKey::id("A");
        assert!(table.register(parent.clone()));
        assert!(!table.register(parent.clone()));

        table.complete(&[parent.clone()], BTreeMap::new());
        assert!(table.is_loaded(&parent));
        assert!(!table.register(parent));
        assert_eq!(table.pending_len(), 0);
    }

    #[test]
    fn complete_demultiplexes_by_parent() {
        let mut table = ChildTable::<Attachment>::default();
        let parents = vec![RefKey::id("A"), RefKey::id("B"), RefKey::id("C")];
        for parent in &parents {
            table.register(parent.clone());
        }

        let mut response = BTreeMap::new();
        response.insert(
            RefKey::id("A"),
            vec![attachment("A", "1", "log.txt"), attachment("A", "2", "trace.txt")],
        );
        response.insert(RefKey::id("B"), vec![attachment("B", "3", "patch.diff")]);
        table.complete(&parents, response);

        assert_eq!(table.children(&RefKey::id("A")).len(), 2);
        assert_eq!(table.children(&RefKey::id("B")).len(), 1);
        assert!(table.children(&RefKey::id("C")).is_empty());
        assert!(table.is_loaded(&RefKey::id("C")));
        assert_eq!(table.loaded_parents(), 3);
        assert_eq!(table.batches(), 1);

        let by_name = table
            .lookup(&RefKey::id("B"), &RefKey::name("patch.diff"))
            .expect("lookup by file name");
        let by_id = table
            .lookup(&RefKey::id("B"), &RefKey::id("3"))
            .expect("lookup by id");
        assert!(Arc::ptr_eq(&by_name, &by_id));
    }

    #[test]
    fn inline_children_keep_identity_after_load() {
        let mut table = ChildTable::<Attachment>::default();
        let inline = table.insert(attachment("A", "1", "log.txt"));
        assert!(!table.is_loaded(&RefKey::id("A")));

        table.register(RefKey::id("A"));
        let mut response = BTreeMap::new();
        response.insert(RefKey::id("A"), vec![attachment("A", "1", "log.txt")]);
        table.complete(&[RefKey::id("A")], response);

        let loaded = table
            .lookup(&RefKey::id("A"), &RefKey::id("1"))
            .expect("child present");
        assert!(Arc::ptr_eq(&inline, &loaded));
        assert_eq!(table.children(&RefKey::id("A")).len(), 1);
    }

    #[test]
    fn one_child_under_two_parent_keys_is_one_instance() {
        let mut table = ChildTable::<Attachment>::default();
        let inline = table.insert(attachment("A", "1", "log.txt"));

        let parents = vec![RefKey::id("A"), RefKey::name("alias-of-a")];
        for parent in &parents {
            table.register(parent.clone());
        }
        let mut response = BTreeMap::new();
        response.insert(RefKey::id("A"), vec![attachment("A", "1", "log.txt")]);
        response.insert(
            RefKey::name("alias-of-a"),
            vec![attachment("A", "1", "log.txt")],
        );
        table.complete(&parents, response);

        let under_alias = table
            .lookup(&RefKey::name("alias-of-a"), &RefKey::id("1"))
            .expect("listed under the alias");
        assert!(Arc::ptr_eq(&inline, &under_alias));
        assert!(Arc::ptr_eq(
            &table.children(&RefKey::id("A"))[0],
            &table.children(&RefKey::name("alias-of-a"))[0],
        ));
        assert_eq!(table.resolved_len(), 1);
    }
}
