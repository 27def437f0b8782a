//! Behavioural properties of the registry against a scripted backend.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use trackref_registry::{
    Attachment, BatchLoader, Category, Entity, KeyState, LoadError, MissingPolicy, PendingBatch,
    RefKey, Registry, ResolveError, User, Version,
};

/// Scripted backend: a user directory, attachments by issue, versions by
/// project key, a call log, and a switch to make the next round trips fail.
#[derive(Default)]
struct Backend {
    users: Vec<User>,
    attachments: BTreeMap<String, Vec<Attachment>>,
    versions: BTreeMap<RefKey, Vec<Version>>,
    calls: Mutex<Vec<(Category, PendingBatch)>>,
    child_calls: Mutex<Vec<(Category, Vec<RefKey>)>>,
    offline: AtomicBool,
}

impl Backend {
    fn with_users(users: &[(&str, &str)]) -> Self {
        Self {
            users: users
                .iter()
                .map(|(id, name)| User {
                    id: id.to_string(),
                    name: name.to_string(),
                    ..User::default()
                })
                .collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.lock().len()
    }
}

impl BatchLoader for Backend {
    fn load_pending(
        &self,
        category: Category,
        batch: &PendingBatch,
    ) -> Result<Vec<Entity>, LoadError> {
        self.calls.lock().push((category, batch.clone()));
        if self.offline.load(Ordering::SeqCst) {
            return Err(LoadError::Transport("connection refused".to_string()));
        }
        // By-id and by-name lookups are separate remote calls, each
        // returning its own copy of a matching user.
        let by_id = self
            .users
            .iter()
            .filter(|user| batch.ids.contains(&user.id));
        let by_name = self
            .users
            .iter()
            .filter(|user| batch.names.contains(&user.name));
        Ok(by_id
            .chain(by_name)
            .map(|user| Entity::User(Arc::new(user.clone())))
            .collect())
    }

    fn load_children(
        &self,
        category: Category,
        parents: &[RefKey],
    ) -> Result<BTreeMap<RefKey, Vec<Entity>>, LoadError> {
        self.child_calls.lock().push((category, parents.to_vec()));
        if self.offline.load(Ordering::SeqCst) {
            return Err(LoadError::Transport("connection refused".to_string()));
        }
        let mut out = BTreeMap::new();
        if category == Category::Version {
            for parent in parents {
                if let Some(rows) = self.versions.get(parent) {
                    out.insert(
                        parent.clone(),
                        rows.iter()
                            .map(|row| Entity::Version(Arc::new(row.clone())))
                            .collect(),
                    );
                }
            }
            return Ok(out);
        }
        for parent in parents {
            if let Some(rows) = self.attachments.get(parent.as_str()) {
                out.insert(
                    parent.clone(),
                    rows.iter()
                        .map(|row| Entity::Attachment(Arc::new(row.clone())))
                        .collect(),
                );
            }
        }
        Ok(out)
    }
}

fn attachment(issue: &str, id: &str) -> Attachment {
    Attachment {
        id: id.to_string(),
        issue: issue.to_string(),
        file_name: format!("{id}.log"),
        content_type: "text/plain".to_string(),
        size: 10,
        creator: None,
        created_at: None,
    }
}

fn version(project: RefKey, id: &str, name: &str) -> Version {
    Version {
        id: id.to_string(),
        name: name.to_string(),
        project,
        released: false,
    }
}

#[test]
fn registering_the_same_id_twice_keeps_one_pending_entry() {
    let registry = Registry::new(Backend::default());
    assert!(registry.register_id::<User>("42"));
    assert!(!registry.register_id::<User>("42"));
    assert_eq!(registry.pending_len(Category::User), 1);
}

#[test]
fn id_and_name_resolve_to_the_same_instance() {
    let backend = Arc::new(Backend::with_users(&[("7", "alice")]));
    let registry = Registry::new(Arc::clone(&backend));
    registry.register_id::<User>("7");
    registry.register_name::<User>("alice");

    let by_id = registry
        .get::<User>(&RefKey::id("7"))
        .expect("no transport failure")
        .expect("user 7 exists");
    let by_name = registry
        .get::<User>(&RefKey::name("alice"))
        .expect("no transport failure")
        .expect("alice exists");

    assert!(Arc::ptr_eq(&by_id, &by_name));
    assert_eq!(backend.calls(), 1);
}

#[test]
fn one_get_loads_the_whole_pending_set_once() {
    let backend = Arc::new(Backend::with_users(&[
        ("1", "one"),
        ("2", "two"),
        ("3", "three"),
        ("4", "four"),
    ]));
    let registry = Registry::new(Arc::clone(&backend));
    for id in ["1", "2", "3", "4"] {
        registry.register_id::<User>(id);
    }

    registry
        .get::<User>(&RefKey::id("3"))
        .expect("no transport failure")
        .expect("user 3 exists");
    assert_eq!(backend.calls(), 1);
    assert_eq!(backend.calls.lock()[0].1.ids, vec!["1", "2", "3", "4"]);

    for id in ["1", "2", "4"] {
        registry
            .get::<User>(&RefKey::id(id))
            .expect("no transport failure")
            .expect("cached");
    }
    assert_eq!(backend.calls(), 1);
}

#[test]
fn unknown_keys_resolve_to_none_and_are_not_refetched() {
    let backend = Arc::new(Backend::with_users(&[("1", "root")]));
    let registry = Registry::new(Arc::clone(&backend));
    registry.register_id::<User>("999");

    assert!(
        registry
            .get::<User>(&RefKey::id("999"))
            .expect("not found is not an error")
            .is_none()
    );
    assert!(
        registry
            .get::<User>(&RefKey::id("999"))
            .expect("not found is not an error")
            .is_none()
    );
    assert_eq!(backend.calls(), 1);
    assert_eq!(registry.state::<User>(&RefKey::id("999")), KeyState::NotFound);
}

#[test]
fn requery_policy_asks_the_backend_again() {
    let backend = Arc::new(Backend::with_users(&[]));
    let registry = Registry::with_policy(Arc::clone(&backend), MissingPolicy::Requery);

    for _ in 0..2 {
        assert!(
            registry
                .get::<User>(&RefKey::name("ghost"))
                .expect("not found is not an error")
                .is_none()
        );
    }
    assert_eq!(backend.calls(), 2);
}

#[test]
fn transport_failure_keeps_keys_pending_for_a_retry() {
    let backend = Arc::new(Backend::with_users(&[("5", "eve")]));
    let registry = Registry::new(Arc::clone(&backend));
    registry.register_id::<User>("5");
    backend.offline.store(true, Ordering::SeqCst);

    let err = registry
        .get::<User>(&RefKey::id("5"))
        .expect_err("offline backend must fail");
    assert!(matches!(
        err,
        ResolveError::Transport {
            category: Category::User,
            source: LoadError::Transport(_)
        }
    ));
    assert_eq!(registry.state::<User>(&RefKey::id("5")), KeyState::Pending);

    backend.offline.store(false, Ordering::SeqCst);
    let user = registry
        .get::<User>(&RefKey::id("5"))
        .expect("backend recovered")
        .expect("user 5 exists");
    assert_eq!(user.name, "eve");
    assert_eq!(backend.calls(), 2);
}

#[test]
fn attachments_for_all_pending_issues_load_in_one_call() {
    let mut backend = Backend::default();
    backend
        .attachments
        .insert("A".to_string(), vec![attachment("A", "a1")]);
    backend.attachments.insert(
        "B".to_string(),
        vec![attachment("B", "b1"), attachment("B", "b2")],
    );
    backend
        .attachments
        .insert("C".to_string(), vec![attachment("C", "c1")]);
    let backend = Arc::new(backend);
    let registry = Registry::new(Arc::clone(&backend));
    for issue in ["A", "B", "C"] {
        registry.register_parent::<Attachment>(RefKey::id(issue));
    }

    let a1 = registry
        .get_for_parent::<Attachment>(&RefKey::id("A"), &RefKey::id("a1"))
        .expect("no transport failure")
        .expect("a1 exists");
    assert_eq!(a1.file_name, "a1.log");

    let b2 = registry
        .get_for_parent::<Attachment>(&RefKey::id("B"), &RefKey::id("b2"))
        .expect("no transport failure");
    let c_all = registry
        .children::<Attachment>(&RefKey::id("C"))
        .expect("no transport failure");
    assert!(b2.is_some());
    assert_eq!(c_all.len(), 1);

    let child_calls = backend.child_calls.lock();
    assert_eq!(child_calls.len(), 1);
    assert_eq!(
        child_calls[0].1,
        vec![RefKey::id("A"), RefKey::id("B"), RefKey::id("C")]
    );
}

#[test]
fn composite_transport_failure_keeps_parents_pending() {
    let mut backend = Backend::default();
    backend
        .attachments
        .insert("A".to_string(), vec![attachment("A", "a1")]);
    let backend = Arc::new(backend);
    let registry = Registry::new(Arc::clone(&backend));
    registry.register_parent::<Attachment>(RefKey::id("A"));
    backend.offline.store(true, Ordering::SeqCst);

    assert!(registry.children::<Attachment>(&RefKey::id("A")).is_err());
    assert_eq!(registry.pending_len(Category::Attachment), 1);

    backend.offline.store(false, Ordering::SeqCst);
    let rows = registry
        .children::<Attachment>(&RefKey::id("A"))
        .expect("backend recovered");
    assert_eq!(rows.len(), 1);
}

#[test]
fn a_version_listed_under_both_project_keys_is_one_instance() {
    let mut backend = Backend::default();
    backend.versions.insert(
        RefKey::id("10"),
        vec![version(RefKey::id("10"), "100", "1.0")],
    );
    backend.versions.insert(
        RefKey::name("core"),
        vec![version(RefKey::name("core"), "100", "1.0")],
    );
    let backend = Arc::new(backend);
    let registry = Registry::new(Arc::clone(&backend));
    registry.register_parent::<Version>(RefKey::id("10"));
    registry.register_parent::<Version>(RefKey::name("core"));

    let by_id = registry
        .get_for_parent::<Version>(&RefKey::id("10"), &RefKey::name("1.0"))
        .expect("no transport failure")
        .expect("1.0 under project 10");
    let by_name = registry
        .get_for_parent::<Version>(&RefKey::name("core"), &RefKey::name("1.0"))
        .expect("no transport failure")
        .expect("1.0 under project core");
    assert!(Arc::ptr_eq(&by_id, &by_name));
    assert_eq!(backend.child_calls.lock().len(), 1);

    let stats = registry.stats();
    let versions = stats.category(Category::Version).expect("version row");
    assert_eq!(versions.resolved, 1);
    assert_eq!(versions.parents_loaded, 2);
}

#[test]
fn an_inline_child_keeps_identity_when_loaded_under_another_parent_key() {
    let mut backend = Backend::default();
    backend.versions.insert(
        RefKey::id("10"),
        vec![version(RefKey::id("10"), "100", "1.0")],
    );
    let registry = Registry::new(Arc::new(backend));
    let inline = registry.register_child_entity(version(RefKey::name("core"), "100", "1.0"));

    let loaded = registry
        .get_for_parent::<Version>(&RefKey::id("10"), &RefKey::id("100"))
        .expect("no transport failure")
        .expect("100 under project 10");
    assert!(Arc::ptr_eq(&inline, &loaded));
}

#[test]
fn mixed_ids_and_names_resolve_in_one_round_trip() {
    let backend = Arc::new(Backend::with_users(&[
        ("1", "one"),
        ("2", "two"),
        ("3", "three"),
        ("0", "admin"),
    ]));
    let registry = Registry::new(Arc::clone(&backend));
    for id in ["1", "2", "3"] {
        registry.register_id::<User>(id);
    }
    registry.register_name::<User>("admin");

    registry
        .get::<User>(&RefKey::id("1"))
        .expect("no transport failure")
        .expect("user 1 exists");
    {
        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.ids, vec!["1", "2", "3"]);
        assert_eq!(calls[0].1.names, vec!["admin"]);
    }

    let two = registry.get::<User>(&RefKey::id("2")).expect("cached");
    let admin = registry.get::<User>(&RefKey::name("admin")).expect("cached");
    assert_eq!(two.map(|u| u.name.clone()), Some("two".to_string()));
    assert_eq!(admin.map(|u| u.id.clone()), Some("0".to_string()));
    assert_eq!(backend.calls(), 1);

    let stats = registry.stats();
    let users = stats.category(Category::User).expect("user row");
    assert_eq!(users.resolved, 4);
    assert_eq!(users.batches, 1);
}

#[test]
fn concurrent_gets_share_one_batch() {
    struct Slow {
        calls: AtomicUsize,
    }

    impl BatchLoader for Slow {
        fn load_pending(
            &self,
            _category: Category,
            batch: &PendingBatch,
        ) -> Result<Vec<Entity>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            Ok(batch
                .ids
                .iter()
                .map(|id| {
                    Entity::User(Arc::new(User {
                        id: id.clone(),
                        name: format!("user-{id}"),
                        ..User::default()
                    }))
                })
                .collect())
        }
    }

    let loader = Arc::new(Slow {
        calls: AtomicUsize::new(0),
    });
    let registry = Registry::new(Arc::clone(&loader));
    for id in 0..8 {
        registry.register_id::<User>(id.to_string());
    }

    let handles: Vec<_> = (0..8)
        .map(|id| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                registry
                    .get::<User>(&RefKey::id(id.to_string()))
                    .expect("no transport failure")
                    .expect("user exists")
            })
        })
        .collect();
    let users: Vec<Arc<User>> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread should not panic"))
        .collect();

    assert_eq!(users.len(), 8);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
}
