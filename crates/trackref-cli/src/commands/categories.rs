use crate::support;
use serde_json::json;
use trackref_registry::{Category, KeySpace};
use trackref_source::converter_for;

fn parent_of(category: Category) -> Option<&'static str> {
    match category {
        Category::Version => Some("project"),
        Category::Comment | Category::Attachment => Some("issue"),
        _ => None,
    }
}

fn key_space_label(key_space: KeySpace) -> &'static str {
    match key_space {
        KeySpace::IdOrName => "id-or-name",
        KeySpace::ParentScoped => "parent-scoped",
    }
}

pub fn run(json_output: bool) {
    if json_output {
        let rows: Vec<_> = Category::ALL
            .into_iter()
            .map(|category| {
                json!({
                    "category": category,
                    "keySpace": category.key_space(),
                    "parent": parent_of(category),
                    "snapshotKind": converter_for(category).map(|spec| spec.kind),
                })
            })
            .collect();
        support::print_json(&json!({
            "action": "categories",
            "categories": rows,
        }));
    } else {
        println!("trackref categories");
        for category in Category::ALL {
            let scope = match parent_of(category) {
                Some(parent) => format!("{} (by {parent})", key_space_label(category.key_space())),
                None => key_space_label(category.key_space()).to_string(),
            };
            println!("  {:<15} {scope}", category.as_str());
        }
    }
}
