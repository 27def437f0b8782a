//! Issue wire records to `TrackedIssue`s, registering every reference.

use crate::convert::convert;
use crate::wire::{Reference, WireError, WireRecord};
use std::sync::Arc;
use tracing::trace;
use trackref_registry::{Category, Entity, IssueRefs, RefKey, Registry, TrackedIssue};

/// Turns issue records into tracked issues bound to one registry.
///
/// Parsing never talks to the backend. Inline objects that carry both an
/// id and a name are stored as resolved entities; everything else is
/// registered as a pending key.
#[derive(Debug, Clone)]
pub struct IssueParser {
    registry: Arc<Registry>,
}

impl IssueParser {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Nothing reaches the registry until the whole record has been read,
    /// so a rejected record registers no keys and stores no inline entities.
    pub fn parse(&self, record: &WireRecord) -> Result<TrackedIssue, WireError> {
        let id = record.required_key("id")?;
        let summary = record.str_field("summary")?;
        let description = record.str_field("description")?;
        let keywords = record.str_list("keywords")?;
        let created_at = record.timestamp("createdAt")?;
        let updated_at = record.timestamp("updatedAt")?;

        let project = stage(record, "project", Category::Project)?;
        let classification = stage(record, "classification", Category::Classification)?;
        let component = stage(record, "component", Category::Component)?;
        let assignee = stage(record, "assignee", Category::User)?;
        let reporter = stage(record, "reporter", Category::User)?;
        let qa_contact = stage(record, "qaContact", Category::User)?;
        let priority = stage(record, "priority", Category::Priority)?;
        let severity = stage(record, "severity", Category::Severity)?;
        let status = stage(record, "status", Category::Status)?;
        let resolution = stage(record, "resolution", Category::Resolution)?;
        let issue_type = stage(record, "type", Category::IssueType)?;
        // Versions are project-scoped; an inline version has no parent here,
        // so only its key is kept.
        let target_version = record.ref_key("targetVersion")?;
        let cc = record
            .references("cc")?
            .into_iter()
            .map(|reference| Staged::read(reference, Category::User))
            .collect::<Result<Vec<_>, _>>()?;
        let mut children = inline_children(record, "comments", Category::Comment, &id)?;
        children.extend(inline_children(
            record,
            "attachments",
            Category::Attachment,
            &id,
        )?);

        let refs = IssueRefs {
            project: self.commit(project),
            classification: self.commit(classification),
            component: self.commit(component),
            assignee: self.commit(assignee),
            reporter: self.commit(reporter),
            qa_contact: self.commit(qa_contact),
            priority: self.commit(priority),
            severity: self.commit(severity),
            status: self.commit(status),
            resolution: self.commit(resolution),
            issue_type: self.commit(issue_type),
            target_version,
            cc: cc
                .into_iter()
                .filter_map(|staged| self.commit(Some(staged)))
                .collect(),
        };

        let mut issue = TrackedIssue::new(Arc::clone(&self.registry), id.clone(), summary, refs);
        issue.description = description;
        issue.keywords = keywords;
        issue.created_at = created_at;
        issue.updated_at = updated_at;

        for child in children {
            self.registry.register_entity_dyn(child);
        }
        trace!(issue = %id, "parsed issue");
        Ok(issue)
    }

    /// Register a staged reference and return the key the issue keeps.
    fn commit(&self, staged: Option<Staged>) -> Option<RefKey> {
        match staged? {
            Staged::Key(key) => Some(key),
            Staged::Inline(entity) => self.registry.register_entity_dyn(entity).key(),
        }
    }
}

/// A reference read off the record but not yet handed to the registry.
enum Staged {
    Key(RefKey),
    Inline(Entity),
}

impl Staged {
    fn read(reference: Reference, category: Category) -> Result<Self, WireError> {
        match reference {
            Reference::Key(key) => Ok(Self::Key(key)),
            Reference::Inline(inline) => Ok(Self::Inline(convert(category, &inline)?)),
        }
    }
}

fn stage(
    record: &WireRecord,
    field: &'static str,
    category: Category,
) -> Result<Option<Staged>, WireError> {
    record
        .reference(field)?
        .map(|reference| Staged::read(reference, category))
        .transpose()
}

/// Inline comment or attachment arrays; rows default to this issue as their
/// parent.
fn inline_children(
    record: &WireRecord,
    field: &'static str,
    category: Category,
    issue_id: &str,
) -> Result<Vec<Entity>, WireError> {
    record
        .records(field)?
        .into_iter()
        .map(|mut child| {
            if child.get("parent").is_none() {
                child.insert("parent", issue_id);
            }
            convert(category, &child)
        })
        .collect()
}
