//! Wire record to entity conversion, one converter per category.

use crate::wire::{WireError, WireRecord};
use std::sync::Arc;
use trackref_registry::{
    Attachment, Category, Classification, Comment, Component, Entity, IssueType, Priority,
    Project, RefKey, Resolution, Severity, Status, User, Version,
};

type ConvertFn = fn(&WireRecord) -> Result<Entity, WireError>;

#[derive(Debug, Clone, Copy)]
pub struct ConverterSpec {
    pub category: Category,
    /// Value of the `kind` field on snapshot rows of this category.
    pub kind: &'static str,
    pub convert: ConvertFn,
}

pub const CONVERTERS: [ConverterSpec; 12] = [
    ConverterSpec {
        category: Category::Classification,
        kind: "classification",
        convert: classification,
    },
    ConverterSpec {
        category: Category::Project,
        kind: "project",
        convert: project,
    },
    ConverterSpec {
        category: Category::Component,
        kind: "component",
        convert: component,
    },
    ConverterSpec {
        category: Category::User,
        kind: "user",
        convert: user,
    },
    ConverterSpec {
        category: Category::Priority,
        kind: "priority",
        convert: priority,
    },
    ConverterSpec {
        category: Category::Severity,
        kind: "severity",
        convert: severity,
    },
    ConverterSpec {
        category: Category::Status,
        kind: "status",
        convert: status,
    },
    ConverterSpec {
        category: Category::Resolution,
        kind: "resolution",
        convert: resolution,
    },
    ConverterSpec {
        category: Category::IssueType,
        kind: "issue-type",
        convert: issue_type,
    },
    ConverterSpec {
        category: Category::Version,
        kind: "version",
        convert: version,
    },
    ConverterSpec {
        category: Category::Comment,
        kind: "comment",
        convert: comment,
    },
    ConverterSpec {
        category: Category::Attachment,
        kind: "attachment",
        convert: attachment,
    },
];

pub fn converter_for(category: Category) -> Option<&'static ConverterSpec> {
    CONVERTERS.iter().find(|spec| spec.category == category)
}

/// Category named by a snapshot row's `kind`; accepts the category
/// spellings `Category::from_str` understands as well.
pub fn category_for_kind(kind: &str) -> Option<Category> {
    CONVERTERS
        .iter()
        .find(|spec| spec.kind == kind)
        .map(|spec| spec.category)
        .or_else(|| kind.parse().ok())
}

pub fn convert(category: Category, record: &WireRecord) -> Result<Entity, WireError> {
    let spec =
        converter_for(category).ok_or_else(|| WireError::UnknownKind(category.to_string()))?;
    (spec.convert)(record)
}

/// Id and name of a simple referent; at least one must be present.
fn id_name(record: &WireRecord) -> Result<(String, String), WireError> {
    let id = record.key_field("id")?;
    let name = record.key_field("name")?;
    if id.is_none() && name.is_none() {
        return Err(WireError::Missing { field: "id" });
    }
    Ok((id.unwrap_or_default(), name.unwrap_or_default()))
}

fn classification(record: &WireRecord) -> Result<Entity, WireError> {
    let (id, name) = id_name(record)?;
    Ok(Entity::Classification(Arc::new(Classification {
        id,
        name,
        description: record.str_field("description")?,
    })))
}

fn project(record: &WireRecord) -> Result<Entity, WireError> {
    let (id, name) = id_name(record)?;
    Ok(Entity::Project(Arc::new(Project {
        id,
        name,
        description: record.str_field("description")?,
    })))
}

fn component(record: &WireRecord) -> Result<Entity, WireError> {
    let (id, name) = id_name(record)?;
    Ok(Entity::Component(Arc::new(Component {
        id,
        name,
        project: record.ref_key("project")?,
        description: record.str_field("description")?,
    })))
}

fn user(record: &WireRecord) -> Result<Entity, WireError> {
    let (id, name) = id_name(record)?;
    Ok(Entity::User(Arc::new(User {
        id,
        name,
        real_name: record.str_field("realName")?,
        email: record.str_field("email")?,
        disabled: record.bool_field("disabled", false)?,
    })))
}

macro_rules! vocabulary_converter {
    ($fn_name:ident, $ty:ident) => {
        fn $fn_name(record: &WireRecord) -> Result<Entity, WireError> {
            let (id, name) = id_name(record)?;
            Ok(Entity::$ty(Arc::new($ty {
                id,
                name,
                description: record.str_field("description")?,
                sort_order: record.i64_field("sortOrder")?,
            })))
        }
    };
}

vocabulary_converter!(priority, Priority);
vocabulary_converter!(severity, Severity);
vocabulary_converter!(resolution, Resolution);
vocabulary_converter!(issue_type, IssueType);

fn status(record: &WireRecord) -> Result<Entity, WireError> {
    let (id, name) = id_name(record)?;
    Ok(Entity::Status(Arc::new(Status {
        id,
        name,
        description: record.str_field("description")?,
        sort_order: record.i64_field("sortOrder")?,
        is_open: record.bool_field("isOpen", true)?,
    })))
}

// Composite rows carry their owner in `parent`: the project for versions,
// the issue id for comments and attachments.

fn version(record: &WireRecord) -> Result<Entity, WireError> {
    let (id, name) = id_name(record)?;
    let project = record
        .ref_key("parent")?
        .ok_or(WireError::Missing { field: "parent" })?;
    Ok(Entity::Version(Arc::new(Version {
        id,
        name,
        project,
        released: record.bool_field("released", false)?,
    })))
}

fn comment(record: &WireRecord) -> Result<Entity, WireError> {
    Ok(Entity::Comment(Arc::new(Comment {
        id: record.key_field("id")?.unwrap_or_default(),
        issue: record.required_key("parent")?,
        author: record.ref_key("author")?,
        body: record.str_field("body")?,
        created_at: record.timestamp("createdAt")?,
    })))
}

fn attachment(record: &WireRecord) -> Result<Entity, WireError> {
    Ok(Entity::Attachment(Arc::new(Attachment {
        id: record.key_field("id")?.unwrap_or_default(),
        issue: record.required_key("parent")?,
        file_name: record.str_field("fileName")?,
        content_type: record.str_field("contentType")?,
        size: record.u64_field("size")?,
        creator: record.ref_key("creator")?,
        created_at: record.timestamp("createdAt")?,
    })))
}

/// Key of the project a version row hangs off, as written on the row.
pub fn version_parent(record: &WireRecord) -> Result<Option<RefKey>, WireError> {
    record.ref_key("parent")
}
