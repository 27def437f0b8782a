//! Resolved entities.
//!
//! Entities are immutable once a batch loader has built them. The registry
//! hands out `Arc`s so that every consumer resolving the same logical entity
//! observes the same instance.

use crate::category::Category;
use crate::key::RefKey;
use crate::registry::slots::{ChildSlot, Slot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Moves a typed entity in and out of the [`Entity`] tagged union.
pub trait EntityKind: fmt::Debug + Send + Sync + Sized + 'static {
    const CATEGORY: Category;

    fn into_entity(this: Arc<Self>) -> Entity;

    fn from_entity(entity: Entity) -> Option<Arc<Self>>;
}

/// An entity of a simple category, reachable by id and/or name.
pub trait Referent: EntityKind + Slot {
    fn id(&self) -> Option<&str>;

    fn name(&self) -> Option<&str>;

    /// Preferred key: id when known, name otherwise.
    fn key(&self) -> Option<RefKey> {
        self.id()
            .map(RefKey::id)
            .or_else(|| self.name().map(RefKey::name))
    }
}

/// An entity of a composite category, scoped under a parent key.
pub trait ChildReferent: EntityKind + ChildSlot {
    fn parent(&self) -> RefKey;

    fn id(&self) -> Option<&str>;

    fn name(&self) -> Option<&str> {
        None
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    /// Login name; what most wire formats use to reference a user.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub real_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Owning project, as the backend referenced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<RefKey>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

// Priority, severity, resolution and issue type share one shape: a named,
// ordered value out of a backend-defined vocabulary.
macro_rules! vocabulary_entity {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $ty {
            #[serde(default)]
            pub id: String,
            #[serde(default)]
            pub name: String,
            #[serde(default, skip_serializing_if = "String::is_empty")]
            pub description: String,
            #[serde(default)]
            pub sort_order: i64,
        }
    };
}

vocabulary_entity!(Priority);
vocabulary_entity!(Severity);
vocabulary_entity!(
    /// How an issue was closed.
    Resolution
);
vocabulary_entity!(IssueType);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default = "default_true")]
    pub is_open: bool,
}

fn default_true() -> bool {
    true
}

/// A released or planned version of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Project the version belongs to (the parent key it was fetched under).
    pub project: RefKey,
    #[serde(default)]
    pub released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    /// Owning issue id.
    pub issue: String,
    /// Author as the backend referenced it; resolve through the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<RefKey>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub issue: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Tagged union of every resolved entity type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", content = "entity", rename_all = "kebab-case")]
pub enum Entity {
    Classification(Arc<Classification>),
    Project(Arc<Project>),
    Component(Arc<Component>),
    User(Arc<User>),
    Priority(Arc<Priority>),
    Severity(Arc<Severity>),
    Status(Arc<Status>),
    Resolution(Arc<Resolution>),
    IssueType(Arc<IssueType>),
    Version(Arc<Version>),
    Comment(Arc<Comment>),
    Attachment(Arc<Attachment>),
}

impl Entity {
    pub fn category(&self) -> Category {
        match self {
            Entity::Classification(_) => Category::Classification,
            Entity::Project(_) => Category::Project,
            Entity::Component(_) => Category::Component,
            Entity::User(_) => Category::User,
            Entity::Priority(_) => Category::Priority,
            Entity::Severity(_) => Category::Severity,
            Entity::Status(_) => Category::Status,
            Entity::Resolution(_) => Category::Resolution,
            Entity::IssueType(_) => Category::IssueType,
            Entity::Version(_) => Category::Version,
            Entity::Comment(_) => Category::Comment,
            Entity::Attachment(_) => Category::Attachment,
        }
    }

    /// The entity's own key (for composite entities, the child key).
    pub fn key(&self) -> Option<RefKey> {
        match self {
            Entity::Classification(e) => e.key(),
            Entity::Project(e) => e.key(),
            Entity::Component(e) => e.key(),
            Entity::User(e) => e.key(),
            Entity::Priority(e) => e.key(),
            Entity::Severity(e) => e.key(),
            Entity::Status(e) => e.key(),
            Entity::Resolution(e) => e.key(),
            Entity::IssueType(e) => e.key(),
            Entity::Version(e) => child_key(e.as_ref()),
            Entity::Comment(e) => child_key(e.as_ref()),
            Entity::Attachment(e) => child_key(e.as_ref()),
        }
    }

    /// Parent key for composite entities.
    pub fn parent(&self) -> Option<RefKey> {
        match self {
            Entity::Version(e) => Some(e.parent()),
            Entity::Comment(e) => Some(e.parent()),
            Entity::Attachment(e) => Some(e.parent()),
            _ => None,
        }
    }

    /// Whether two entities are the very same instance.
    pub fn same_instance(&self, other: &Entity) -> bool {
        match (self, other) {
            (Entity::Classification(a), Entity::Classification(b)) => Arc::ptr_eq(a, b),
            (Entity::Project(a), Entity::Project(b)) => Arc::ptr_eq(a, b),
            (Entity::Component(a), Entity::Component(b)) => Arc::ptr_eq(a, b),
            (Entity::User(a), Entity::User(b)) => Arc::ptr_eq(a, b),
            (Entity::Priority(a), Entity::Priority(b)) => Arc::ptr_eq(a, b),
            (Entity::Severity(a), Entity::Severity(b)) => Arc::ptr_eq(a, b),
            (Entity::Status(a), Entity::Status(b)) => Arc::ptr_eq(a, b),
            (Entity::Resolution(a), Entity::Resolution(b)) => Arc::ptr_eq(a, b),
            (Entity::IssueType(a), Entity::IssueType(b)) => Arc::ptr_eq(a, b),
            (Entity::Version(a), Entity::Version(b)) => Arc::ptr_eq(a, b),
            (Entity::Comment(a), Entity::Comment(b)) => Arc::ptr_eq(a, b),
            (Entity::Attachment(a), Entity::Attachment(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn child_key<T: ChildReferent>(entity: &T) -> Option<RefKey> {
    entity
        .id()
        .map(RefKey::id)
        .or_else(|| entity.name().map(RefKey::name))
}

macro_rules! entity_kind {
    ($ty:ident) => {
        impl EntityKind for $ty {
            const CATEGORY: Category = Category::$ty;

            fn into_entity(this: Arc<Self>) -> Entity {
                Entity::$ty(this)
            }

            fn from_entity(entity: Entity) -> Option<Arc<Self>> {
                match entity {
                    Entity::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

entity_kind!(Classification);
entity_kind!(Project);
entity_kind!(Component);
entity_kind!(User);
entity_kind!(Priority);
entity_kind!(Severity);
entity_kind!(Status);
entity_kind!(Resolution);
entity_kind!(IssueType);
entity_kind!(Version);
entity_kind!(Comment);
entity_kind!(Attachment);

macro_rules! id_name_referent {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl Referent for $ty {
                fn id(&self) -> Option<&str> {
                    non_empty(&self.id)
                }

                fn name(&self) -> Option<&str> {
                    non_empty(&self.name)
                }
            }
        )+
    };
}

id_name_referent!(
    Classification,
    Project,
    Component,
    User,
    Priority,
    Severity,
    Status,
    Resolution,
    IssueType,
);

impl ChildReferent for Version {
    fn parent(&self) -> RefKey {
        self.project.clone()
    }

    fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }
}

impl ChildReferent for Comment {
    fn parent(&self) -> RefKey {
        RefKey::id(self.issue.clone())
    }

    fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }
}

impl ChildReferent for Attachment {
    fn parent(&self) -> RefKey {
        RefKey::id(self.issue.clone())
    }

    fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    fn name(&self) -> Option<&str> {
        non_empty(&self.file_name)
    }
}
