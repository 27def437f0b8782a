//! Reference categories: the closed set of things an issue can point at.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A closed class of cross-referenced entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Classification,
    Project,
    Component,
    User,
    Priority,
    Severity,
    Status,
    Resolution,
    IssueType,
    Version,
    Comment,
    Attachment,
}

/// How keys of a category are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeySpace {
    /// Opaque id or display name, whichever arrives first.
    IdOrName,
    /// Parent key plus the child's own id; bulk fetches return a multi-map by parent.
    ParentScoped,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Classification,
        Category::Project,
        Category::Component,
        Category::User,
        Category::Priority,
        Category::Severity,
        Category::Status,
        Category::Resolution,
        Category::IssueType,
        Category::Version,
        Category::Comment,
        Category::Attachment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Classification => "classification",
            Category::Project => "project",
            Category::Component => "component",
            Category::User => "user",
            Category::Priority => "priority",
            Category::Severity => "severity",
            Category::Status => "status",
            Category::Resolution => "resolution",
            Category::IssueType => "issue-type",
            Category::Version => "version",
            Category::Comment => "comment",
            Category::Attachment => "attachment",
        }
    }

    /// Whether this category is keyed by a parent entity.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Category::Version | Category::Comment | Category::Attachment
        )
    }

    pub fn key_space(self) -> KeySpace {
        if self.is_composite() {
            KeySpace::ParentScoped
        } else {
            KeySpace::IdOrName
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reference category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
