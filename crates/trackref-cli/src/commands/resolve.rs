use crate::cli::MissingArg;
use crate::support;
use serde_json::{Value, json};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use trackref_registry::{
    Category, Entity, RefKey, Registry, ResolveError, TrackedIssue, User,
};
use trackref_source::{IssueParser, IssueStream, SourceConfig};

pub struct Args {
    pub issues: String,
    pub snapshot: Option<String>,
    pub config: Option<String>,
    pub offline: bool,
    pub missing: Option<MissingArg>,
    pub children: bool,
    pub json: bool,
}

/// One resolved reference field of an issue.
struct Field {
    name: &'static str,
    key: RefKey,
    outcome: Result<Option<Entity>, ResolveError>,
}

pub fn run(args: Args) {
    let mut config = support::load_config_or_exit(args.config.as_deref());
    if let Some(snapshot) = args.snapshot {
        config.source = SourceConfig::Snapshot {
            path: PathBuf::from(snapshot),
        };
    }
    if args.offline {
        config.source = SourceConfig::Offline;
    }
    if let Some(missing) = args.missing {
        config.resolver.missing = missing.into();
    }

    let issues_path = PathBuf::from(&args.issues);
    let file = File::open(&issues_path).unwrap_or_else(|e| {
        eprintln!("error: failed to open {}: {e}", issues_path.display());
        std::process::exit(1);
    });
    let registry = support::open_registry_or_exit(&config);
    let parser = IssueParser::new(Arc::clone(&registry));

    // Parse everything first so each category resolves in one batch.
    let mut issues = Vec::new();
    let mut skipped = Vec::new();
    for item in IssueStream::spawn(BufReader::new(file), config.stream.capacity) {
        match item.map(|record| parser.parse(&record)) {
            Ok(Ok(issue)) => issues.push(issue),
            Ok(Err(e)) => {
                warn!(error = %e, "skipping issue record");
                skipped.push(e.to_string());
            }
            Err(e) => {
                warn!(error = %e, "skipping issue line");
                skipped.push(e.to_string());
            }
        }
    }

    if args.children {
        register_comment_authors(&registry, &issues);
    }
    // Every key the session will ask for is registered by now.
    registry.close();

    let mut failures = 0usize;
    let mut rendered = Vec::with_capacity(issues.len());
    for issue in &issues {
        let fields = resolve_fields(issue);
        let cc = issue.cc();
        let children = args.children.then(|| resolve_children(issue));
        failures += fields.iter().filter(|f| f.outcome.is_err()).count();
        failures += usize::from(cc.is_err());
        if let Some(children) = &children {
            failures += children.iter().filter(|c| c.is_err()).count();
        }
        rendered.push((issue, fields, cc, children));
    }

    let source = support::describe_source(&config.source);
    if args.json {
        let payload = json!({
            "action": "resolve",
            "source": source,
            "issuesPath": issues_path.display().to_string(),
            "issues": rendered
                .iter()
                .map(|(issue, fields, cc, children)| {
                    issue_json(issue, fields, cc, children.as_deref())
                })
                .collect::<Vec<_>>(),
            "skipped": skipped,
            "failures": failures,
            "stats": registry.stats(),
        });
        support::print_json(&payload);
    } else {
        println!("trackref resolve\n  Source: {source}\n  Issues: {}", issues.len());
        for (issue, fields, cc, children) in &rendered {
            print_issue(issue, fields, cc, children.as_deref());
        }
        for line in &skipped {
            println!("skipped: {line}");
        }
        println!();
        print!("{}", registry.stats().render());
    }

    if failures > 0 {
        eprintln!("error: {failures} reference(s) could not be resolved");
        std::process::exit(1);
    }
}

fn resolve_fields(issue: &TrackedIssue) -> Vec<Field> {
    let registry = issue.registry();
    let refs = issue.refs();
    let simple = [
        ("project", Category::Project, &refs.project),
        ("classification", Category::Classification, &refs.classification),
        ("component", Category::Component, &refs.component),
        ("assignee", Category::User, &refs.assignee),
        ("reporter", Category::User, &refs.reporter),
        ("qaContact", Category::User, &refs.qa_contact),
        ("priority", Category::Priority, &refs.priority),
        ("severity", Category::Severity, &refs.severity),
        ("status", Category::Status, &refs.status),
        ("resolution", Category::Resolution, &refs.resolution),
        ("type", Category::IssueType, &refs.issue_type),
    ];
    let mut fields: Vec<Field> = simple
        .into_iter()
        .filter_map(|(name, category, key)| {
            key.as_ref().map(|key| Field {
                name,
                key: key.clone(),
                outcome: registry.get_entity(category, key),
            })
        })
        .collect();
    if let Some(key) = &refs.target_version {
        fields.push(Field {
            name: "targetVersion",
            key: key.clone(),
            outcome: issue
                .target_version()
                .map(|version| version.map(Entity::Version)),
        });
    }
    fields
}

/// Queue comment authors alongside the issue fields so users still resolve
/// in one batch. A failed comment load is reported again when rendering.
fn register_comment_authors(registry: &Registry, issues: &[TrackedIssue]) {
    for issue in issues {
        let Ok(comments) = issue.comments() else {
            continue;
        };
        for author in comments.iter().filter_map(|comment| comment.author.clone()) {
            registry.register::<User>(author);
        }
    }
}

/// Comments then attachments, as display lines.
fn resolve_children(issue: &TrackedIssue) -> Vec<Result<String, ResolveError>> {
    let mut out = Vec::new();
    match issue.comments() {
        Ok(comments) => {
            for comment in comments {
                let author = issue.comment_author(&comment).map(|user| {
                    user.map(|u| u.name.clone())
                        .unwrap_or_else(|| "?".to_string())
                });
                out.push(author.map(|author| {
                    format!("comment {} by {author}: {}", comment.id, comment.body)
                }));
            }
        }
        Err(e) => out.push(Err(e)),
    }
    match issue.attachments() {
        Ok(attachments) => out.extend(attachments.into_iter().map(|a| {
            Ok(format!(
                "attachment {} {} ({} bytes)",
                a.id, a.file_name, a.size
            ))
        })),
        Err(e) => out.push(Err(e)),
    }
    out
}

/// Display name of an entity: its name, falling back to its id.
fn label(entity: &Entity) -> String {
    let (id, name) = match entity {
        Entity::Classification(e) => (&e.id, &e.name),
        Entity::Project(e) => (&e.id, &e.name),
        Entity::Component(e) => (&e.id, &e.name),
        Entity::User(e) if !e.real_name.is_empty() => {
            return format!("{} ({})", e.name, e.real_name);
        }
        Entity::User(e) => (&e.id, &e.name),
        Entity::Priority(e) => (&e.id, &e.name),
        Entity::Severity(e) => (&e.id, &e.name),
        Entity::Status(e) => (&e.id, &e.name),
        Entity::Resolution(e) => (&e.id, &e.name),
        Entity::IssueType(e) => (&e.id, &e.name),
        Entity::Version(e) => (&e.id, &e.name),
        Entity::Comment(e) => (&e.id, &e.id),
        Entity::Attachment(e) => (&e.id, &e.file_name),
    };
    if name.is_empty() {
        id.clone()
    } else {
        name.clone()
    }
}

fn outcome_text(key: &RefKey, outcome: &Result<Option<Entity>, ResolveError>) -> String {
    match outcome {
        Ok(Some(entity)) => label(entity),
        Ok(None) => format!("<not found: {key}>"),
        Err(e) => format!("<unresolved: {e}>"),
    }
}

fn print_issue(
    issue: &TrackedIssue,
    fields: &[Field],
    cc: &Result<Vec<Arc<User>>, ResolveError>,
    children: Option<&[Result<String, ResolveError>]>,
) {
    println!();
    println!("{}  {}", issue.id, issue.summary);
    for field in fields {
        println!("  {:<15} {}", field.name, outcome_text(&field.key, &field.outcome));
    }
    match cc {
        Ok(users) if !users.is_empty() => {
            let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
            println!("  {:<15} {}", "cc", names.join(", "));
        }
        Ok(_) => {}
        Err(e) => println!("  {:<15} <unresolved: {e}>", "cc"),
    }
    for line in children.unwrap_or_default() {
        match line {
            Ok(line) => println!("  {line}"),
            Err(e) => println!("  <unresolved: {e}>"),
        }
    }
}

fn issue_json(
    issue: &TrackedIssue,
    fields: &[Field],
    cc: &Result<Vec<Arc<User>>, ResolveError>,
    children: Option<&[Result<String, ResolveError>]>,
) -> Value {
    let references: serde_json::Map<String, Value> = fields
        .iter()
        .map(|field| {
            let (entity, error) = match &field.outcome {
                Ok(entity) => (json!(entity), Value::Null),
                Err(e) => (Value::Null, json!(e.to_string())),
            };
            (
                field.name.to_string(),
                json!({ "key": field.key, "entity": entity, "error": error }),
            )
        })
        .collect();
    let cc = match cc {
        Ok(users) => json!(users.iter().map(|u| u.name.clone()).collect::<Vec<_>>()),
        Err(e) => json!({ "error": e.to_string() }),
    };
    let mut out = json!({
        "id": issue.id,
        "summary": issue.summary,
        "references": references,
        "cc": cc,
    });
    if let Some(children) = children {
        out["children"] = children
            .iter()
            .map(|line| match line {
                Ok(line) => json!(line),
                Err(e) => json!({ "error": e.to_string() }),
            })
            .collect();
    }
    out
}
