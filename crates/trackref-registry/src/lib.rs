//! # trackref-registry
//!
//! Lazy, batched cross-reference resolution for issue-tracker records.
//!
//! Wire parsers register every scalar reference they meet (a user name, a
//! project id, a severity string). Consumers ask for resolved entities. The
//! registry defers all remote access until a consumer needs an unresolved
//! key, then resolves that category's whole pending set in one round trip and
//! serves every later request from an identity-preserving cache.
//!
//! ## Data flow
//!
//! ```text
//! parser ──register──▶ pending set ──(first get)──▶ BatchLoader ──▶ resolved cache
//!                                                                     │
//! TrackedIssue::assignee() ──get────────────────────────────────────────┘
//! ```
//!
//! This crate does not talk to any backend. Adapters implement
//! [`BatchLoader`] (see `trackref-source`).

pub mod category;
pub mod composite;
pub mod entity;
pub mod error;
pub mod issue;
pub mod key;
pub mod loader;
pub mod registry;
pub mod table;

pub use category::{Category, KeySpace, UnknownCategory};
pub use composite::ChildTable;
pub use entity::{
    Attachment, ChildReferent, Classification, Comment, Component, Entity, EntityKind, IssueType,
    Priority, Project, Referent, Resolution, Severity, Status, User, Version,
};
pub use error::{MissingPolicy, ResolveError};
pub use issue::{IssueRefs, TrackedIssue};
pub use key::{PendingBatch, RefKey};
pub use loader::{BatchLoader, LoadError};
pub use registry::{CategoryStats, Registry, RegistryStats};
pub use table::{KeyState, RefTable};
