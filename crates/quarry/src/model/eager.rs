//! Eager loading (batch preloading for relations).
//!
//! One extra query per relation level: the parents' keys are collected, de-duplicated
//! and sent as a single `IN (...)` list. Nested relations (`"invoices.items"`) are loaded
//! on the flat child list before the children are handed out to their parents.

use super::record::{Record, Relationship};
use super::relation::{ModelInfo, PIVOT_PREFIX, Relation, RelationKind};
use crate::connection::Connection;
use crate::error::OrmResult;
use crate::query::Query;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Callback that narrows an eager or existence query.
pub type Constraint = Arc<dyn Fn(&mut Query) + Send + Sync>;

/// One level of the eager-load tree.
#[derive(Clone, Default)]
pub(crate) struct EagerNode {
    pub(crate) constraint: Option<Constraint>,
    pub(crate) children: IndexMap<String, EagerNode>,
}

impl std::fmt::Debug for EagerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EagerNode")
            .field("constrained", &self.constraint.is_some())
            .field("children", &self.children)
            .finish()
    }
}

/// Insert a dotted path into the tree; the constraint applies to the last segment.
pub(crate) fn insert_path(
    tree: &mut IndexMap<String, EagerNode>,
    path: &str,
    constraint: Option<Constraint>,
) {
    let mut level = tree;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let node = level.entry(segment.to_string()).or_default();
        if segments.peek().is_none() {
            if constraint.is_some() {
                node.constraint = constraint;
            }
            return;
        }
        level = &mut node.children;
    }
}

/// Check every segment of a dotted path against the relation registry.
pub(crate) fn validate_path(info: ModelInfo, path: &str) -> OrmResult<()> {
    let mut current = info;
    for segment in path.split('.') {
        current = current.relation(segment)?.related;
    }
    Ok(())
}

/// Load every relation in `tree` onto `records`.
pub(crate) fn eager_load(
    conn: &dyn Connection,
    info: ModelInfo,
    records: &mut [Record],
    tree: &IndexMap<String, EagerNode>,
) -> OrmResult<()> {
    if records.is_empty() {
        return Ok(());
    }
    for (name, node) in tree {
        let relation = info.relation(name)?;
        load_relation(conn, &relation, name, node, records)?;
    }
    Ok(())
}

fn load_relation(
    conn: &dyn Connection,
    relation: &Relation,
    name: &str,
    node: &EagerNode,
    parents: &mut [Record],
) -> OrmResult<()> {
    let keys = distinct_keys(parents, relation.parent_key());
    if keys.is_empty() {
        for parent in parents.iter_mut() {
            parent.set_relation(name, empty(relation));
        }
        return Ok(());
    }

    let mut q = relation.eager_query(keys);
    if let Some(constraint) = &node.constraint {
        constraint(&mut q);
    }
    let rows = q.get(conn)?;
    tracing::debug!(
        target: "quarry.model",
        relation = name,
        table = relation.related.table,
        rows = rows.len(),
        "eager loaded relation"
    );

    let mut children: Vec<Record> = rows.into_iter().map(Record::hydrate).collect();
    if matches!(relation.kind, RelationKind::BelongsToMany { .. }) {
        let pivot_columns = relation.pivot_selects();
        for child in &mut children {
            attach_pivot(child, &pivot_columns);
        }
    }

    if !node.children.is_empty() {
        eager_load(conn, relation.related, &mut children, &node.children)?;
    }

    let child_key = relation.child_key();
    let mut by_key: HashMap<String, Vec<Record>> = HashMap::new();
    for child in children {
        let key = match &relation.kind {
            RelationKind::BelongsToMany { .. } => child.pivot().and_then(|p| p.get(child_key)),
            _ => child.get(child_key),
        }
        .and_then(Value::key);
        if let Some(key) = key {
            by_key.entry(key).or_default().push(child);
        }
    }

    let parent_key = relation.parent_key();
    for parent in parents.iter_mut() {
        let matched = parent
            .get(parent_key)
            .and_then(Value::key)
            .and_then(|k| by_key.get(&k));
        let loaded = if relation.is_many() {
            Relationship::Many(matched.cloned().unwrap_or_default())
        } else {
            Relationship::One(
                matched
                    .and_then(|children| children.first())
                    .map(|c| Box::new(c.clone())),
            )
        };
        parent.set_relation(name, loaded);
    }
    Ok(())
}

fn distinct_keys(records: &[Record], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|r| r.get(column))
        .filter(|v| v.key().is_some_and(|k| seen.insert(k)))
        .cloned()
        .collect()
}

fn empty(relation: &Relation) -> Relationship {
    if relation.is_many() {
        Relationship::Many(Vec::new())
    } else {
        Relationship::One(None)
    }
}

/// Move the aliased pivot `columns` out of the child's attributes into its `pivot`
/// relation. Other attributes, including ones that merely start with the prefix, stay.
fn attach_pivot(child: &mut Record, columns: &[&str]) {
    let mut pivot = Record::new();
    for column in columns {
        if let Some(value) = child.remove(&format!("{PIVOT_PREFIX}{column}")) {
            pivot.set(*column, value);
        }
    }
    pivot.set_exists(true);
    pivot.sync_original();
    child.sync_original();
    child.set_relation("pivot", Relationship::One(Some(Box::new(pivot))));
}
