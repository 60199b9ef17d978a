//! Naming-convention relationship suggestions.
//!
//! Many schemas never declare their foreign keys. A column called
//! `customer_id` on `orders` almost always points at `customers.id`; these
//! rules add such edges as advisory (`is_enforced = false`) relationships so
//! the LLM still sees the join paths.

use inflector::Inflector;

use crate::metadata::{IncomingRelationship, IncomingSchema, IncomingTable, RelationshipKind};

/// Irregular plurals that show up in table names.
static IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("address", "addresses"),
    ("status", "statuses"),
    ("category", "categories"),
    ("company", "companies"),
    ("analysis", "analyses"),
    ("criterion", "criteria"),
    ("index", "indices"),
    ("matrix", "matrices"),
];

/// Pluralize a table-name stem, checking irregulars first.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *singular || lower == *plural {
            return plural.to_string();
        }
    }

    word.to_plural()
}

/// Singularize a table name, checking irregulars first.
pub fn singularize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *plural || lower == *singular {
            return singular.to_string();
        }
    }

    word.to_singular()
}

/// Key suffixes and the column each one points at on the referenced table.
const KEY_SUFFIXES: &[(&str, &str)] = &[("_id", "id"), ("_key", "key")];

/// Suggest advisory relationships for `schema`.
///
/// Skips columns that already have a relationship (declared or earlier
/// suggestion), primary-key columns, and self references.
pub fn suggest_relationships(schema: &IncomingSchema) -> Vec<IncomingRelationship> {
    let mut suggestions: Vec<IncomingRelationship> = Vec::new();

    for table in &schema.tables {
        for column in &table.columns {
            if column.is_primary_key || schema.has_relationship(&table.name, &column.name) {
                continue;
            }

            let snake = column.name.to_snake_case();
            for (suffix, target_key) in KEY_SUFFIXES {
                let Some(stem) = snake.strip_suffix(suffix).filter(|s| !s.is_empty()) else {
                    continue;
                };

                let Some(target) = find_table_for_stem(schema, stem) else {
                    continue;
                };
                if target.name.eq_ignore_ascii_case(&table.name) {
                    continue;
                }
                let Some(target_column) = key_column(target, target_key) else {
                    continue;
                };

                let already = suggestions.iter().any(|s| {
                    s.from_table.eq_ignore_ascii_case(&table.name)
                        && s.from_column.eq_ignore_ascii_case(&column.name)
                });
                if already {
                    continue;
                }

                tracing::debug!(
                    from = %format!("{}.{}", table.name, column.name),
                    to = %format!("{}.{}", target.name, target_column),
                    "suggesting relationship"
                );

                suggestions.push(IncomingRelationship {
                    from_table: table.name.clone(),
                    from_column: column.name.clone(),
                    to_table: target.name.clone(),
                    to_column: target_column,
                    kind: RelationshipKind::ManyToOne,
                    is_enforced: false,
                });
            }
        }
    }

    suggestions
}

/// Add suggestions to the schema in place. Returns how many were added.
pub fn add_suggested_relationships(schema: &mut IncomingSchema) -> usize {
    let suggestions = suggest_relationships(schema);
    let added = suggestions.len();
    schema.relationships.extend(suggestions);
    added
}

fn find_table_for_stem<'a>(schema: &'a IncomingSchema, stem: &str) -> Option<&'a IncomingTable> {
    let candidates = [stem.to_string(), pluralize(stem), singularize(stem)];
    schema.tables.iter().find(|t| {
        let name = t.name.to_snake_case();
        candidates.iter().any(|c| name.eq_ignore_ascii_case(c))
    })
}

/// Column named like `key` on the target, else its single primary-key column.
fn key_column(table: &IncomingTable, key: &str) -> Option<String> {
    if let Some(column) = table.columns.iter().find(|c| c.name.eq_ignore_ascii_case(key)) {
        return Some(column.name.clone());
    }

    let mut pks = table.columns.iter().filter(|c| c.is_primary_key);
    match (pks.next(), pks.next()) {
        (Some(pk), None) => Some(pk.name.clone()),
        _ => None,
    }
}
