//! The reference registry: one per session.
//!
//! Parsers call `register*` for every cross-reference they meet; consumers
//! call `get*`. The first `get` that misses the resolved cache while its
//! category has pending keys runs one batch load covering the whole pending
//! set, then answers from the cache.

use crate::category::Category;
use crate::composite::ChildTable;
use crate::entity::{
    Attachment, ChildReferent, Classification, Comment, Component, Entity, EntityKind, IssueType,
    Priority, Project, Referent, Resolution, Severity, Status, User, Version,
};
use crate::error::{MissingPolicy, ResolveError};
use crate::key::RefKey;
use crate::loader::{BatchLoader, LoadError};
use crate::table::{KeyState, RefTable};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

pub(crate) mod slots {
    use super::*;

    /// One table per category, each behind its own lock.
    #[derive(Default)]
    pub struct Tables {
        pub(in crate::registry) classifications: Mutex<RefTable<Classification>>,
        pub(in crate::registry) projects: Mutex<RefTable<Project>>,
        pub(in crate::registry) components: Mutex<RefTable<Component>>,
        pub(in crate::registry) users: Mutex<RefTable<User>>,
        pub(in crate::registry) priorities: Mutex<RefTable<Priority>>,
        pub(in crate::registry) severities: Mutex<RefTable<Severity>>,
        pub(in crate::registry) statuses: Mutex<RefTable<Status>>,
        pub(in crate::registry) resolutions: Mutex<RefTable<Resolution>>,
        pub(in crate::registry) issue_types: Mutex<RefTable<IssueType>>,
        pub(in crate::registry) versions: Mutex<ChildTable<Version>>,
        pub(in crate::registry) comments: Mutex<ChildTable<Comment>>,
        pub(in crate::registry) attachments: Mutex<ChildTable<Attachment>>,
    }

    pub trait Slot: Sized {
        fn slot(tables: &Tables) -> &Mutex<RefTable<Self>>;
    }

    pub trait ChildSlot: Sized {
        fn slot(tables: &Tables) -> &Mutex<ChildTable<Self>>;
    }
}

use slots::{ChildSlot, Slot, Tables};

macro_rules! slot {
    ($trait:ident, $ty:ident, $field:ident, $table:ident) => {
        impl $trait for $ty {
            fn slot(tables: &Tables) -> &Mutex<$table<Self>> {
                &tables.$field
            }
        }
    };
}

slot!(Slot, Classification, classifications, RefTable);
slot!(Slot, Project, projects, RefTable);
slot!(Slot, Component, components, RefTable);
slot!(Slot, User, users, RefTable);
slot!(Slot, Priority, priorities, RefTable);
slot!(Slot, Severity, severities, RefTable);
slot!(Slot, Status, statuses, RefTable);
slot!(Slot, Resolution, resolutions, RefTable);
slot!(Slot, IssueType, issue_types, RefTable);
slot!(ChildSlot, Version, versions, ChildTable);
slot!(ChildSlot, Comment, comments, ChildTable);
slot!(ChildSlot, Attachment, attachments, ChildTable);

/// Session-scoped, identity-preserving reference resolver.
///
/// Never evicts. Drop it (or call [`Registry::close`]) when the session
/// ends; it is not a cross-session cache.
pub struct Registry {
    tables: Tables,
    loader: Box<dyn BatchLoader>,
    policy: MissingPolicy,
    closed: AtomicBool,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Open a registry for one session.
    pub fn new(loader: impl BatchLoader + 'static) -> Arc<Self> {
        Self::with_policy(loader, MissingPolicy::default())
    }

    pub fn with_policy(loader: impl BatchLoader + 'static, policy: MissingPolicy) -> Arc<Self> {
        Arc::new(Self {
            tables: Tables::default(),
            loader: Box::new(loader),
            policy,
            closed: AtomicBool::new(false),
        })
    }

    pub fn policy(&self) -> MissingPolicy {
        self.policy
    }

    /// Stop accepting registrations. Cached entities stay readable and
    /// already-pending keys can still be resolved; an in-flight batch is not
    /// interrupted.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("registry closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn accepts_registration(&self, category: Category, key: &RefKey) -> bool {
        if self.is_closed() {
            debug!(%category, %key, "ignoring registration on closed registry");
            return false;
        }
        true
    }

    // ── Simple categories ──

    /// Queue `key` for resolution. No network access.
    ///
    /// Blank, pending, resolved and memoized not-found keys are no-ops.
    /// Returns whether the key was newly queued.
    pub fn register<T: Referent>(&self, key: RefKey) -> bool {
        let category = T::CATEGORY;
        if !self.accepts_registration(category, &key) {
            return false;
        }
        let queued = T::slot(&self.tables).lock().register(key.clone());
        if queued {
            trace!(%category, %key, "registered reference");
        }
        queued
    }

    pub fn register_id<T: Referent>(&self, id: impl Into<String>) -> bool {
        self.register::<T>(RefKey::Id(id.into()))
    }

    pub fn register_name<T: Referent>(&self, name: impl Into<String>) -> bool {
        self.register::<T>(RefKey::Name(name.into()))
    }

    /// Store a fully-formed entity under its id and name, bypassing the
    /// pending set. Returns the canonical instance, which is an earlier one
    /// when the same logical entity is already cached.
    pub fn register_entity<T: Referent>(&self, entity: T) -> Arc<T> {
        self.register_shared(Arc::new(entity))
    }

    pub fn register_shared<T: Referent>(&self, entity: Arc<T>) -> Arc<T> {
        let category = T::CATEGORY;
        let Some(key) = entity.key() else {
            return entity;
        };
        if !self.accepts_registration(category, &key) {
            return entity;
        }
        trace!(%category, %key, "registered resolved entity");
        T::slot(&self.tables).lock().insert(entity)
    }

    /// Resolve `key`, running one batch load for the category if needed.
    ///
    /// `Ok(None)` means not found (unknown to the backend, or blank).
    pub fn get<T: Referent>(&self, key: &RefKey) -> Result<Option<Arc<T>>, ResolveError> {
        if key.is_blank() {
            return Ok(None);
        }
        let category = T::CATEGORY;
        let mut table = T::slot(&self.tables).lock();
        if let Some(hit) = table.lookup(key) {
            return Ok(Some(hit));
        }
        if table.state(key) == KeyState::Unseen && !self.is_closed() {
            table.register(key.clone());
        }
        if table.pending_len() == 0 {
            return Ok(None);
        }

        // The lock stays held across the round trip so concurrent callers on
        // this category wait for this batch instead of starting another.
        let batch = table.pending_batch();
        debug!(
            %category,
            ids = batch.ids.len(),
            names = batch.names.len(),
            "loading pending batch"
        );
        let loaded = self
            .loader
            .load_pending(category, &batch)
            .map_err(|source| self.transport_failure(category, batch.len(), source))?;
        let loaded = typed::<T>(loaded);
        debug!(%category, returned = loaded.len(), "batch loaded");
        table.complete(&batch, loaded, self.policy);
        Ok(table.lookup(key))
    }

    pub fn state<T: Referent>(&self, key: &RefKey) -> KeyState {
        T::slot(&self.tables).lock().state(key)
    }

    // ── Composite categories ──

    /// Queue `parent` so its children are fetched with the next batch.
    pub fn register_parent<T: ChildReferent>(&self, parent: RefKey) -> bool {
        let category = T::CATEGORY;
        if !self.accepts_registration(category, &parent) {
            return false;
        }
        let queued = T::slot(&self.tables).lock().register(parent.clone());
        if queued {
            trace!(%category, %parent, "registered parent");
        }
        queued
    }

    /// Store an inline child under its own parent key.
    pub fn register_child_entity<T: ChildReferent>(&self, entity: T) -> Arc<T> {
        self.register_child_shared(Arc::new(entity))
    }

    pub fn register_child_shared<T: ChildReferent>(&self, entity: Arc<T>) -> Arc<T> {
        let parent = entity.parent();
        if parent.is_blank() || !self.accepts_registration(T::CATEGORY, &parent) {
            return entity;
        }
        T::slot(&self.tables).lock().insert(entity)
    }

    /// Resolve one child of `parent`; a load covers every pending parent.
    pub fn get_for_parent<T: ChildReferent>(
        &self,
        parent: &RefKey,
        child: &RefKey,
    ) -> Result<Option<Arc<T>>, ResolveError> {
        if parent.is_blank() || child.is_blank() {
            return Ok(None);
        }
        let mut table = T::slot(&self.tables).lock();
        if let Some(hit) = table.lookup(parent, child) {
            return Ok(Some(hit));
        }
        self.load_parents(&mut table, parent)?;
        Ok(table.lookup(parent, child))
    }

    /// Every child of `parent`, loading the pending parents if `parent` has
    /// not been covered by a batch yet.
    pub fn children<T: ChildReferent>(&self, parent: &RefKey) -> Result<Vec<Arc<T>>, ResolveError> {
        if parent.is_blank() {
            return Ok(Vec::new());
        }
        let mut table = T::slot(&self.tables).lock();
        if !table.is_loaded(parent) {
            self.load_parents(&mut table, parent)?;
        }
        Ok(table.children(parent))
    }

    fn load_parents<T: ChildReferent>(
        &self,
        table: &mut ChildTable<T>,
        parent: &RefKey,
    ) -> Result<(), ResolveError> {
        let category = T::CATEGORY;
        if !table.is_loaded(parent) && !self.is_closed() {
            table.register(parent.clone());
        }
        let parents = table.pending_parents();
        if parents.is_empty() {
            return Ok(());
        }

        debug!(%category, parents = parents.len(), "loading pending parents");
        let response = self
            .loader
            .load_children(category, &parents)
            .map_err(|source| self.transport_failure(category, parents.len(), source))?;
        let response: BTreeMap<RefKey, Vec<Arc<T>>> = response
            .into_iter()
            .map(|(parent, children)| (parent, typed::<T>(children)))
            .collect();
        table.complete(&parents, response);
        Ok(())
    }

    fn transport_failure(&self, category: Category, pending: usize, source: LoadError) -> ResolveError {
        warn!(%category, pending, error = %source, "batch load failed; pending set kept");
        ResolveError::Transport { category, source }
    }

    // ── Category-tagged access ──

    /// Register a raw key under `category`. For composite categories the
    /// key is a parent key.
    pub fn register_key(&self, category: Category, key: RefKey) -> bool {
        match category {
            Category::Classification => self.register::<Classification>(key),
            Category::Project => self.register::<Project>(key),
            Category::Component => self.register::<Component>(key),
            Category::User => self.register::<User>(key),
            Category::Priority => self.register::<Priority>(key),
            Category::Severity => self.register::<Severity>(key),
            Category::Status => self.register::<Status>(key),
            Category::Resolution => self.register::<Resolution>(key),
            Category::IssueType => self.register::<IssueType>(key),
            Category::Version => self.register_parent::<Version>(key),
            Category::Comment => self.register_parent::<Comment>(key),
            Category::Attachment => self.register_parent::<Attachment>(key),
        }
    }

    /// Store any resolved entity; returns the canonical instance.
    pub fn register_entity_dyn(&self, entity: Entity) -> Entity {
        match entity {
            Entity::Classification(e) => Entity::Classification(self.register_shared(e)),
            Entity::Project(e) => Entity::Project(self.register_shared(e)),
            Entity::Component(e) => Entity::Component(self.register_shared(e)),
            Entity::User(e) => Entity::User(self.register_shared(e)),
            Entity::Priority(e) => Entity::Priority(self.register_shared(e)),
            Entity::Severity(e) => Entity::Severity(self.register_shared(e)),
            Entity::Status(e) => Entity::Status(self.register_shared(e)),
            Entity::Resolution(e) => Entity::Resolution(self.register_shared(e)),
            Entity::IssueType(e) => Entity::IssueType(self.register_shared(e)),
            Entity::Version(e) => Entity::Version(self.register_child_shared(e)),
            Entity::Comment(e) => Entity::Comment(self.register_child_shared(e)),
            Entity::Attachment(e) => Entity::Attachment(self.register_child_shared(e)),
        }
    }

    pub fn get_entity(
        &self,
        category: Category,
        key: &RefKey,
    ) -> Result<Option<Entity>, ResolveError> {
        match category {
            Category::Classification => self.get_tagged::<Classification>(key),
            Category::Project => self.get_tagged::<Project>(key),
            Category::Component => self.get_tagged::<Component>(key),
            Category::User => self.get_tagged::<User>(key),
            Category::Priority => self.get_tagged::<Priority>(key),
            Category::Severity => self.get_tagged::<Severity>(key),
            Category::Status => self.get_tagged::<Status>(key),
            Category::Resolution => self.get_tagged::<Resolution>(key),
            Category::IssueType => self.get_tagged::<IssueType>(key),
            Category::Version | Category::Comment | Category::Attachment => {
                Err(ResolveError::WrongKeySpace { category })
            }
        }
    }

    pub fn get_child_entity(
        &self,
        category: Category,
        parent: &RefKey,
        child: &RefKey,
    ) -> Result<Option<Entity>, ResolveError> {
        match category {
            Category::Version => self.get_child_tagged::<Version>(parent, child),
            Category::Comment => self.get_child_tagged::<Comment>(parent, child),
            Category::Attachment => self.get_child_tagged::<Attachment>(parent, child),
            _ => Err(ResolveError::WrongKeySpace { category }),
        }
    }

    fn get_tagged<T: Referent>(&self, key: &RefKey) -> Result<Option<Entity>, ResolveError> {
        Ok(self.get::<T>(key)?.map(T::into_entity))
    }

    fn get_child_tagged<T: ChildReferent>(
        &self,
        parent: &RefKey,
        child: &RefKey,
    ) -> Result<Option<Entity>, ResolveError> {
        Ok(self.get_for_parent::<T>(parent, child)?.map(T::into_entity))
    }

    // ── Introspection ──

    pub fn pending_len(&self, category: Category) -> usize {
        self.category_stats(category).pending
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            categories: Category::ALL
                .into_iter()
                .map(|category| self.category_stats(category))
                .collect(),
        }
    }

    fn category_stats(&self, category: Category) -> CategoryStats {
        match category {
            Category::Classification => self.simple_stats::<Classification>(),
            Category::Project => self.simple_stats::<Project>(),
            Category::Component => self.simple_stats::<Component>(),
            Category::User => self.simple_stats::<User>(),
            Category::Priority => self.simple_stats::<Priority>(),
            Category::Severity => self.simple_stats::<Severity>(),
            Category::Status => self.simple_stats::<Status>(),
            Category::Resolution => self.simple_stats::<Resolution>(),
            Category::IssueType => self.simple_stats::<IssueType>(),
            Category::Version => self.child_stats::<Version>(),
            Category::Comment => self.child_stats::<Comment>(),
            Category::Attachment => self.child_stats::<Attachment>(),
        }
    }

    fn simple_stats<T: Referent>(&self) -> CategoryStats {
        let table = T::slot(&self.tables).lock();
        CategoryStats {
            category: T::CATEGORY,
            pending: table.pending_len(),
            resolved: table.resolved_len(),
            not_found: table.not_found_len(),
            parents_loaded: 0,
            batches: table.batches(),
        }
    }

    fn child_stats<T: ChildReferent>(&self) -> CategoryStats {
        let table = T::slot(&self.tables).lock();
        CategoryStats {
            category: T::CATEGORY,
            pending: table.pending_len(),
            resolved: table.resolved_len(),
            not_found: 0,
            parents_loaded: table.loaded_parents(),
            batches: table.batches(),
        }
    }
}

fn typed<T: EntityKind>(entities: Vec<Entity>) -> Vec<Arc<T>> {
    entities
        .into_iter()
        .filter_map(|entity| {
            let actual = entity.category();
            let expected = T::CATEGORY;
            let converted = T::from_entity(entity);
            if converted.is_none() {
                warn!(
                    %expected,
                    %actual,
                    "dropping entity of unexpected category from batch response"
                );
            }
            converted
        })
        .collect()
}

/// Bookkeeping counters for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: Category,
    pub pending: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub parents_loaded: usize,
    pub batches: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub categories: Vec<CategoryStats>,
}

impl RegistryStats {
    pub fn category(&self, category: Category) -> Option<&CategoryStats> {
        self.categories.iter().find(|row| row.category == category)
    }

    pub fn total_batches(&self) -> u64 {
        self.categories.iter().map(|row| row.batches).sum()
    }

    /// One line per category that saw any activity.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in &self.categories {
            if row.batches == 0 && row.pending == 0 && row.resolved == 0 {
                continue;
            }
            let _ = writeln!(
                out,
                "{:<15} batches={} resolved={} notFound={} pending={}",
                row.category.as_str(),
                row.batches,
                row.resolved,
                row.not_found,
                row.pending
            );
        }
        out
    }
}
