//! Relation descriptors.
//!
//! A [`Relation`] knows the keys that connect a parent model to its related model and
//! builds the three query shapes the resolver needs:
//!
//! - the batched eager query (`related.key IN (?, ...)` over the parents' keys),
//! - the correlated existence / count sub-query used by `where_has` and `with_count`,
//! - the key pair used to match children back to parents.

use super::Model;
use crate::error::{OrmError, OrmResult};
use crate::query::{Op, Query};
use crate::value::Value;
use heck::ToSnakeCase;

/// Column-alias prefix for pivot columns selected alongside many-to-many children.
pub(crate) const PIVOT_PREFIX: &str = "pivot_";

/// Static description of a model, usable without the model's type.
#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    pub name: &'static str,
    pub table: &'static str,
    pub primary_key: &'static str,
    /// Soft-delete column, if the model uses soft deletes.
    pub deleted_at: Option<&'static str>,
    relation: fn(&str) -> Option<Relation>,
}

impl ModelInfo {
    pub fn of<M: Model>() -> Self {
        let full = std::any::type_name::<M>();
        let name = full
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(full);
        Self {
            name,
            table: M::TABLE,
            primary_key: M::PRIMARY_KEY,
            deleted_at: M::SOFT_DELETES.then_some(M::DELETED_AT),
            relation: M::relation,
        }
    }

    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> OrmResult<Relation> {
        (self.relation)(name).ok_or_else(|| OrmError::unknown_relation(self.name, name))
    }

    /// `Customer` → `customer_id`
    pub fn foreign_key(&self) -> String {
        format!("{}_{}", self.name.to_snake_case(), self.primary_key)
    }
}

/// Relation shape and its key columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    HasOne {
        foreign_key: String,
        local_key: String,
    },
    HasMany {
        foreign_key: String,
        local_key: String,
    },
    BelongsTo {
        foreign_key: String,
        owner_key: String,
    },
    BelongsToMany {
        pivot_table: String,
        foreign_pivot_key: String,
        related_pivot_key: String,
        parent_key: String,
        related_key: String,
        pivot_columns: Vec<String>,
    },
}

/// A relation from a parent model to `related`.
///
/// Built inside [`Model::relation`]:
///
/// ```ignore
/// fn relation(name: &str) -> Option<Relation> {
///     match name {
///         "invoices" => Some(Relation::has_many::<Self, Invoice>()),
///         "tags" => Some(Relation::belongs_to_many::<Self, Tag>().pivot_table("invoice_tag")),
///         _ => None,
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    pub related: ModelInfo,
}

impl Relation {
    /// One related row holding the parent's key (`related.<parent>_id = parent.id`).
    pub fn has_one<P: Model, R: Model>() -> Self {
        let parent = ModelInfo::of::<P>();
        Self {
            kind: RelationKind::HasOne {
                foreign_key: parent.foreign_key(),
                local_key: parent.primary_key.to_string(),
            },
            related: ModelInfo::of::<R>(),
        }
    }

    /// Many related rows holding the parent's key.
    pub fn has_many<P: Model, R: Model>() -> Self {
        let parent = ModelInfo::of::<P>();
        Self {
            kind: RelationKind::HasMany {
                foreign_key: parent.foreign_key(),
                local_key: parent.primary_key.to_string(),
            },
            related: ModelInfo::of::<R>(),
        }
    }

    /// The parent holds the related row's key (`parent.<related>_id = related.id`).
    pub fn belongs_to<P: Model, R: Model>() -> Self {
        let related = ModelInfo::of::<R>();
        Self {
            kind: RelationKind::BelongsTo {
                foreign_key: related.foreign_key(),
                owner_key: related.primary_key.to_string(),
            },
            related,
        }
    }

    /// Rows connected through a pivot table named after both models in alphabetical
    /// order (`invoice_tag`).
    pub fn belongs_to_many<P: Model, R: Model>() -> Self {
        let parent = ModelInfo::of::<P>();
        let related = ModelInfo::of::<R>();
        let mut names = [parent.name.to_snake_case(), related.name.to_snake_case()];
        names.sort();
        Self {
            kind: RelationKind::BelongsToMany {
                pivot_table: names.join("_"),
                foreign_pivot_key: parent.foreign_key(),
                related_pivot_key: related.foreign_key(),
                parent_key: parent.primary_key.to_string(),
                related_key: related.primary_key.to_string(),
                pivot_columns: Vec::new(),
            },
            related,
        }
    }

    /// Override the foreign key column.
    pub fn foreign_key(mut self, column: &str) -> Self {
        match &mut self.kind {
            RelationKind::HasOne { foreign_key, .. }
            | RelationKind::HasMany { foreign_key, .. }
            | RelationKind::BelongsTo { foreign_key, .. } => *foreign_key = column.to_string(),
            RelationKind::BelongsToMany {
                foreign_pivot_key, ..
            } => *foreign_pivot_key = column.to_string(),
        }
        self
    }

    /// Override the parent-side key of has-one / has-many / many-to-many.
    pub fn local_key(mut self, column: &str) -> Self {
        match &mut self.kind {
            RelationKind::HasOne { local_key, .. } | RelationKind::HasMany { local_key, .. } => {
                *local_key = column.to_string()
            }
            RelationKind::BelongsToMany { parent_key, .. } => *parent_key = column.to_string(),
            RelationKind::BelongsTo { .. } => {}
        }
        self
    }

    /// Override the related-side key of belongs-to / many-to-many.
    pub fn owner_key(mut self, column: &str) -> Self {
        match &mut self.kind {
            RelationKind::BelongsTo { owner_key, .. } => *owner_key = column.to_string(),
            RelationKind::BelongsToMany { related_key, .. } => *related_key = column.to_string(),
            _ => {}
        }
        self
    }

    pub fn pivot_table(mut self, table: &str) -> Self {
        if let RelationKind::BelongsToMany { pivot_table, .. } = &mut self.kind {
            *pivot_table = table.to_string();
        }
        self
    }

    /// Override both pivot key columns.
    pub fn pivot_keys(mut self, foreign: &str, related: &str) -> Self {
        if let RelationKind::BelongsToMany {
            foreign_pivot_key,
            related_pivot_key,
            ..
        } = &mut self.kind
        {
            *foreign_pivot_key = foreign.to_string();
            *related_pivot_key = related.to_string();
        }
        self
    }

    /// Extra pivot columns exposed on each child's `pivot` relation.
    pub fn with_pivot(mut self, columns: &[&str]) -> Self {
        if let RelationKind::BelongsToMany { pivot_columns, .. } = &mut self.kind {
            pivot_columns.extend(columns.iter().map(|c| c.to_string()));
        }
        self
    }

    pub fn is_many(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::HasMany { .. } | RelationKind::BelongsToMany { .. }
        )
    }

    /// Parent attribute whose values drive the eager query.
    pub(crate) fn parent_key(&self) -> &str {
        match &self.kind {
            RelationKind::HasOne { local_key, .. } | RelationKind::HasMany { local_key, .. } => {
                local_key
            }
            RelationKind::BelongsTo { foreign_key, .. } => foreign_key,
            RelationKind::BelongsToMany { parent_key, .. } => parent_key,
        }
    }

    /// Child attribute matched against [`Relation::parent_key`]. Many-to-many children
    /// are matched through their pivot row instead.
    pub(crate) fn child_key(&self) -> &str {
        match &self.kind {
            RelationKind::HasOne { foreign_key, .. } | RelationKind::HasMany { foreign_key, .. } => {
                foreign_key
            }
            RelationKind::BelongsTo { owner_key, .. } => owner_key,
            RelationKind::BelongsToMany {
                foreign_pivot_key, ..
            } => foreign_pivot_key,
        }
    }

    /// Pivot columns selected alongside many-to-many children, each aliased with
    /// [`PIVOT_PREFIX`]. Empty for every other kind.
    pub(crate) fn pivot_selects(&self) -> Vec<&str> {
        match &self.kind {
            RelationKind::BelongsToMany {
                foreign_pivot_key,
                related_pivot_key,
                pivot_columns,
                ..
            } => [foreign_pivot_key, related_pivot_key]
                .into_iter()
                .chain(pivot_columns.iter())
                .map(String::as_str)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Batched query for the children of all parents holding `keys`.
    pub(crate) fn eager_query(&self, keys: Vec<Value>) -> Query {
        let table = self.related.table;
        let mut q = Query::table(table);
        match &self.kind {
            RelationKind::HasOne { foreign_key, .. } | RelationKind::HasMany { foreign_key, .. } => {
                q.where_in(format!("{table}.{foreign_key}"), keys);
            }
            RelationKind::BelongsTo { owner_key, .. } => {
                q.where_in(format!("{table}.{owner_key}"), keys);
            }
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
                related_key,
                ..
            } => {
                q.add_select(format!("{table}.*"));
                for column in self.pivot_selects() {
                    q.add_select(format!("{pivot_table}.{column} as {PIVOT_PREFIX}{column}"));
                }
                q.join(
                    pivot_table,
                    &format!("{pivot_table}.{related_pivot_key}"),
                    Op::Eq,
                    &format!("{table}.{related_key}"),
                )
                .where_in(format!("{pivot_table}.{foreign_pivot_key}"), keys);
            }
        }
        if let Some(column) = self.related.deleted_at {
            q.where_null(format!("{table}.{column}"));
        }
        q
    }

    /// Correlated sub-query over the related table, projecting `select`, tied to the
    /// parent rows referenced as `parent`. Returns the query and the name the related
    /// table is reachable under inside it (aliased when the relation is
    /// self-referencing).
    pub(crate) fn existence_query(&self, parent: &str, select: &str) -> (Query, String) {
        let table = self.related.table;
        let (from, related) = if table == parent {
            let alias = format!("{table}_self");
            (format!("{table} as {alias}"), alias)
        } else {
            (table.to_string(), table.to_string())
        };

        let mut q = Query::table(&from);
        q.select_raw(select, Vec::new());
        match &self.kind {
            RelationKind::HasOne {
                foreign_key,
                local_key,
            }
            | RelationKind::HasMany {
                foreign_key,
                local_key,
            } => {
                q.where_column(
                    &format!("{related}.{foreign_key}"),
                    Op::Eq,
                    &format!("{parent}.{local_key}"),
                );
            }
            RelationKind::BelongsTo {
                foreign_key,
                owner_key,
            } => {
                q.where_column(
                    &format!("{related}.{owner_key}"),
                    Op::Eq,
                    &format!("{parent}.{foreign_key}"),
                );
            }
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
                parent_key,
                related_key,
                ..
            } => {
                q.join(
                    pivot_table,
                    &format!("{pivot_table}.{related_pivot_key}"),
                    Op::Eq,
                    &format!("{related}.{related_key}"),
                )
                .where_column(
                    &format!("{pivot_table}.{foreign_pivot_key}"),
                    Op::Eq,
                    &format!("{parent}.{parent_key}"),
                );
            }
        }
        if let Some(column) = self.related.deleted_at {
            q.where_null(format!("{related}.{column}"));
        }
        (q, related)
    }
}
