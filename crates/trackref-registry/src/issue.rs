//! Issues with deferred cross-references.
//!
//! A `TrackedIssue` keeps the raw key of every field that points at another
//! entity, plus a handle on the session registry. Nothing is fetched until an
//! accessor runs, and then the fetch covers every key registered so far.

use crate::entity::{
    Attachment, Classification, Comment, Component, IssueType, Priority, Project, Referent,
    Resolution, Severity, Status, User, Version,
};
use crate::error::ResolveError;
use crate::key::RefKey;
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Raw cross-reference keys of one issue, as the wire record carried them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_contact: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<RefKey>,
    /// Version key, scoped by `project`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<RefKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<RefKey>,
}

/// An issue whose reference fields resolve on first access.
#[derive(Debug, Clone)]
pub struct TrackedIssue {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    refs: IssueRefs,
    registry: Arc<Registry>,
}

impl TrackedIssue {
    /// Build an issue and register every raw key it carries.
    pub fn new(
        registry: Arc<Registry>,
        id: impl Into<String>,
        summary: impl Into<String>,
        refs: IssueRefs,
    ) -> Self {
        let issue = Self {
            id: id.into(),
            summary: summary.into(),
            description: String::new(),
            keywords: Vec::new(),
            created_at: None,
            updated_at: None,
            refs,
            registry,
        };
        issue.register_refs();
        issue
    }

    fn register_refs(&self) {
        let registry = &self.registry;
        let refs = &self.refs;
        register_opt::<Project>(registry, &refs.project);
        register_opt::<Classification>(registry, &refs.classification);
        register_opt::<Component>(registry, &refs.component);
        register_opt::<User>(registry, &refs.assignee);
        register_opt::<User>(registry, &refs.reporter);
        register_opt::<User>(registry, &refs.qa_contact);
        register_opt::<Priority>(registry, &refs.priority);
        register_opt::<Severity>(registry, &refs.severity);
        register_opt::<Status>(registry, &refs.status);
        register_opt::<Resolution>(registry, &refs.resolution);
        register_opt::<IssueType>(registry, &refs.issue_type);
        for cc in &refs.cc {
            registry.register::<User>(cc.clone());
        }
        if refs.target_version.is_some()
            && let Some(project) = &refs.project
        {
            registry.register_parent::<Version>(project.clone());
        }
        registry.register_parent::<Comment>(self.parent_key());
        registry.register_parent::<Attachment>(self.parent_key());
    }

    fn parent_key(&self) -> RefKey {
        RefKey::id(self.id.clone())
    }

    pub fn refs(&self) -> &IssueRefs {
        &self.refs
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn resolve<T: Referent>(&self, key: &Option<RefKey>) -> Result<Option<Arc<T>>, ResolveError> {
        match key {
            Some(key) => self.registry.get::<T>(key),
            None => Ok(None),
        }
    }

    pub fn project(&self) -> Result<Option<Arc<Project>>, ResolveError> {
        self.resolve(&self.refs.project)
    }

    pub fn classification(&self) -> Result<Option<Arc<Classification>>, ResolveError> {
        self.resolve(&self.refs.classification)
    }

    pub fn component(&self) -> Result<Option<Arc<Component>>, ResolveError> {
        self.resolve(&self.refs.component)
    }

    pub fn assignee(&self) -> Result<Option<Arc<User>>, ResolveError> {
        self.resolve(&self.refs.assignee)
    }

    pub fn reporter(&self) -> Result<Option<Arc<User>>, ResolveError> {
        self.resolve(&self.refs.reporter)
    }

    pub fn qa_contact(&self) -> Result<Option<Arc<User>>, ResolveError> {
        self.resolve(&self.refs.qa_contact)
    }

    pub fn priority(&self) -> Result<Option<Arc<Priority>>, ResolveError> {
        self.resolve(&self.refs.priority)
    }

    pub fn severity(&self) -> Result<Option<Arc<Severity>>, ResolveError> {
        self.resolve(&self.refs.severity)
    }

    pub fn status(&self) -> Result<Option<Arc<Status>>, ResolveError> {
        self.resolve(&self.refs.status)
    }

    pub fn resolution(&self) -> Result<Option<Arc<Resolution>>, ResolveError> {
        self.resolve(&self.refs.resolution)
    }

    pub fn issue_type(&self) -> Result<Option<Arc<IssueType>>, ResolveError> {
        self.resolve(&self.refs.issue_type)
    }

    /// Target version, looked up among the versions of the issue's project.
    pub fn target_version(&self) -> Result<Option<Arc<Version>>, ResolveError> {
        match (&self.refs.project, &self.refs.target_version) {
            (Some(project), Some(version)) => self.registry.get_for_parent(project, version),
            _ => Ok(None),
        }
    }

    /// Users on the cc list; unknown users are skipped.
    pub fn cc(&self) -> Result<Vec<Arc<User>>, ResolveError> {
        let mut users = Vec::with_capacity(self.refs.cc.len());
        for key in &self.refs.cc {
            if let Some(user) = self.registry.get::<User>(key)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub fn comments(&self) -> Result<Vec<Arc<Comment>>, ResolveError> {
        self.registry.children(&self.parent_key())
    }

    pub fn attachments(&self) -> Result<Vec<Arc<Attachment>>, ResolveError> {
        self.registry.children(&self.parent_key())
    }

    pub fn comment_author(&self, comment: &Comment) -> Result<Option<Arc<User>>, ResolveError> {
        self.resolve(&comment.author)
    }
}

fn register_opt<T: Referent>(registry: &Registry, key: &Option<RefKey>) {
    if let Some(key) = key {
        registry.register::<T>(key.clone());
    }
}
