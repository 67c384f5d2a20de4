//! Model-aware query builder.

use super::eager::{Constraint, EagerNode, eager_load, insert_path, validate_path};
use super::record::Record;
use super::relation::ModelInfo;
use super::Model;
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::query::{Boolean, MAX_ROWS, Paginator, Query, SimplePaginator, Values};
use crate::row::FromRow;
use crate::value::Value;
use indexmap::IndexMap;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Which rows the soft-delete scope lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedScope {
    /// Only rows whose deletion column is NULL.
    #[default]
    Without,
    With,
    Only,
}

/// A [`Query`] bound to model `M`.
///
/// Dereferences to [`Query`], so every builder method is available. Every execution
/// method of [`Query`] is shadowed here so reads and writes go through the soft-delete
/// scope; row-returning ones return models instead of rows:
///
/// ```ignore
/// let mut q = Invoice::query();
/// q.where_eq("status", "open").order_by_desc("created_at");
/// q.with(&["customer", "items"])?;
/// let invoices: Vec<Invoice> = q.get(&conn)?;
/// ```
pub struct ModelQuery<M: Model> {
    query: Query,
    eager: IndexMap<String, EagerNode>,
    trashed: TrashedScope,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for ModelQuery<M> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            eager: self.eager.clone(),
            trashed: self.trashed,
            _model: PhantomData,
        }
    }
}

impl<M: Model> std::fmt::Debug for ModelQuery<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelQuery")
            .field("table", &M::TABLE)
            .field("query", &self.query)
            .field("eager", &self.eager)
            .field("trashed", &self.trashed)
            .finish()
    }
}

impl<M: Model> Default for ModelQuery<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Deref for ModelQuery<M> {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl<M: Model> DerefMut for ModelQuery<M> {
    fn deref_mut(&mut self) -> &mut Query {
        &mut self.query
    }
}

impl<M: Model> ModelQuery<M> {
    pub fn new() -> Self {
        Self {
            query: Query::table(M::TABLE),
            eager: IndexMap::new(),
            trashed: TrashedScope::default(),
            _model: PhantomData,
        }
    }

    fn info() -> ModelInfo {
        ModelInfo::of::<M>()
    }

    fn qualified(column: &str) -> String {
        format!("{}.{column}", M::TABLE)
    }

    /// Apply builder calls in a chain-friendly way.
    pub fn scope<F: FnOnce(&mut Query)>(&mut self, f: F) -> &mut Self {
        f(&mut self.query);
        self
    }

    // ==================== Soft-delete scope ====================

    pub fn with_trashed(&mut self) -> &mut Self {
        self.trashed = TrashedScope::With;
        self
    }

    pub fn only_trashed(&mut self) -> &mut Self {
        self.trashed = TrashedScope::Only;
        self
    }

    pub fn without_trashed(&mut self) -> &mut Self {
        self.trashed = TrashedScope::Without;
        self
    }

    /// The underlying query with the soft-delete scope applied.
    pub fn to_query(&self) -> Query {
        let mut q = self.query.clone();
        if !M::SOFT_DELETES || self.trashed == TrashedScope::With {
            return q;
        }
        // Keep `a OR b` from swallowing the scope.
        if q.has_or_wheres() {
            q.wrap_wheres();
        }
        let column = Self::qualified(M::DELETED_AT);
        match self.trashed {
            TrashedScope::Without => {
                q.where_null(column);
            }
            TrashedScope::Only => {
                q.where_not_null(column);
            }
            TrashedScope::With => {}
        }
        q
    }

    pub fn to_sql(&self) -> String {
        self.to_query().to_sql()
    }

    // ==================== Eager loading ====================

    /// Eager-load relations (dotted paths allowed).
    pub fn with(&mut self, relations: &[&str]) -> OrmResult<&mut Self> {
        for path in relations {
            validate_path(Self::info(), path)?;
            insert_path(&mut self.eager, path, None);
        }
        Ok(self)
    }

    /// Eager-load one relation path, narrowing its query with `constraint`.
    pub fn with_constraint<F>(&mut self, relation: &str, constraint: F) -> OrmResult<&mut Self>
    where
        F: Fn(&mut Query) + Send + Sync + 'static,
    {
        validate_path(Self::info(), relation)?;
        let constraint: Constraint = Arc::new(constraint);
        insert_path(&mut self.eager, relation, Some(constraint));
        Ok(self)
    }

    /// Add a `<relation>_count` column per relation.
    pub fn with_count(&mut self, relations: &[&str]) -> OrmResult<&mut Self> {
        for relation in relations {
            self.add_count(relation, None::<fn(&mut Query)>)?;
        }
        Ok(self)
    }

    /// Add a `<relation>_count` column counting only rows matching `constraint`.
    pub fn with_count_constraint<F>(&mut self, relation: &str, constraint: F) -> OrmResult<&mut Self>
    where
        F: FnOnce(&mut Query),
    {
        self.add_count(relation, Some(constraint))
    }

    fn add_count<F: FnOnce(&mut Query)>(
        &mut self,
        relation: &str,
        constraint: Option<F>,
    ) -> OrmResult<&mut Self> {
        let rel = Self::info().relation(relation)?;
        let (mut sub, _) = rel.existence_query(M::TABLE, "COUNT(*)");
        if let Some(f) = constraint {
            f(&mut sub);
        }
        if self.query.columns.is_empty() {
            self.query.add_select(format!("{}.*", M::TABLE));
        }
        self.query.select_sub(sub, &format!("{relation}_count"));
        Ok(self)
    }

    // ==================== Relation existence ====================

    /// Keep rows that have at least one related row.
    pub fn where_has(&mut self, relation: &str) -> OrmResult<&mut Self> {
        self.add_has(relation, None::<fn(&mut Query)>, Boolean::And, false)
    }

    /// Keep rows with at least one related row matching `constraint`.
    pub fn where_has_with<F: FnOnce(&mut Query)>(
        &mut self,
        relation: &str,
        constraint: F,
    ) -> OrmResult<&mut Self> {
        self.add_has(relation, Some(constraint), Boolean::And, false)
    }

    pub fn or_where_has(&mut self, relation: &str) -> OrmResult<&mut Self> {
        self.add_has(relation, None::<fn(&mut Query)>, Boolean::Or, false)
    }

    pub fn or_where_has_with<F: FnOnce(&mut Query)>(
        &mut self,
        relation: &str,
        constraint: F,
    ) -> OrmResult<&mut Self> {
        self.add_has(relation, Some(constraint), Boolean::Or, false)
    }

    /// Keep rows without related rows.
    pub fn where_doesnt_have(&mut self, relation: &str) -> OrmResult<&mut Self> {
        self.add_has(relation, None::<fn(&mut Query)>, Boolean::And, true)
    }

    pub fn where_doesnt_have_with<F: FnOnce(&mut Query)>(
        &mut self,
        relation: &str,
        constraint: F,
    ) -> OrmResult<&mut Self> {
        self.add_has(relation, Some(constraint), Boolean::And, true)
    }

    pub fn or_where_doesnt_have(&mut self, relation: &str) -> OrmResult<&mut Self> {
        self.add_has(relation, None::<fn(&mut Query)>, Boolean::Or, true)
    }

    fn add_has<F: FnOnce(&mut Query)>(
        &mut self,
        relation: &str,
        constraint: Option<F>,
        boolean: Boolean,
        negated: bool,
    ) -> OrmResult<&mut Self> {
        let path: Vec<&str> = relation.split('.').collect();
        let sub = has_query(Self::info(), M::TABLE, &path, constraint)?;
        self.query.where_exists_query(sub, boolean, negated);
        Ok(self)
    }

    // ==================== Reads ====================

    /// Run the query, hydrate models and eager-load the requested relations.
    pub fn get(&self, conn: &dyn Connection) -> OrmResult<Vec<M>> {
        self.fetch(conn, &self.to_query())
    }

    fn fetch(&self, conn: &dyn Connection, q: &Query) -> OrmResult<Vec<M>> {
        let mut records: Vec<Record> = q.get(conn)?.into_iter().map(Record::hydrate).collect();
        eager_load(conn, Self::info(), &mut records, &self.eager)?;
        Ok(records.into_iter().map(M::from_record).collect())
    }

    pub fn first(&self, conn: &dyn Connection) -> OrmResult<Option<M>> {
        let mut q = self.to_query();
        q.limit(1);
        Ok(self.fetch(conn, &q)?.into_iter().next())
    }

    pub fn first_or_fail(&self, conn: &dyn Connection) -> OrmResult<M> {
        self.first(conn)?
            .ok_or_else(|| OrmError::not_found(format!("no {} row matches the query", M::TABLE)))
    }

    /// Model by primary key.
    pub fn find(&self, conn: &dyn Connection, id: impl Into<Value>) -> OrmResult<Option<M>> {
        let mut q = self.clone();
        q.query.where_eq(Self::qualified(M::PRIMARY_KEY), id);
        q.first(conn)
    }

    pub fn find_or_fail(&self, conn: &dyn Connection, id: impl Into<Value>) -> OrmResult<M> {
        let id = id.into();
        self.find(conn, id.clone())?.ok_or_else(|| {
            OrmError::not_found(format!("no {} row with {} = {id}", M::TABLE, M::PRIMARY_KEY))
        })
    }

    /// Models whose primary key is in `ids`.
    pub fn find_many<V: Into<Value>>(
        &self,
        conn: &dyn Connection,
        ids: impl IntoIterator<Item = V>,
    ) -> OrmResult<Vec<M>> {
        let mut q = self.clone();
        q.query.where_in(Self::qualified(M::PRIMARY_KEY), ids);
        q.get(conn)
    }

    pub fn count(&self, conn: &dyn Connection) -> OrmResult<u64> {
        self.to_query().count(conn)
    }

    pub fn exists(&self, conn: &dyn Connection) -> OrmResult<bool> {
        self.to_query().exists(conn)
    }

    pub fn doesnt_exist(&self, conn: &dyn Connection) -> OrmResult<bool> {
        Ok(!self.exists(conn)?)
    }

    pub fn pluck(&self, conn: &dyn Connection, column: &str) -> OrmResult<Vec<Value>> {
        self.to_query().pluck(conn, column)
    }

    /// Model whose `key` column equals `id`.
    pub fn find_by(
        &self,
        conn: &dyn Connection,
        key: &str,
        id: impl Into<Value>,
    ) -> OrmResult<Option<M>> {
        let mut q = self.clone();
        q.query.where_eq(Self::qualified(key), id);
        q.first(conn)
    }

    /// Scoped rows mapped without hydrating models.
    pub fn get_as<T: FromRow>(&self, conn: &dyn Connection) -> OrmResult<Vec<T>> {
        self.to_query().get_as(conn)
    }

    pub fn value(&self, conn: &dyn Connection, column: &str) -> OrmResult<Option<Value>> {
        self.to_query().value(conn, column)
    }

    // ==================== Aggregates ====================

    pub fn aggregate(
        &self,
        conn: &dyn Connection,
        function: &str,
        column: &str,
    ) -> OrmResult<Value> {
        self.to_query().aggregate(conn, function, column)
    }

    pub fn max(&self, conn: &dyn Connection, column: &str) -> OrmResult<Option<Value>> {
        self.to_query().max(conn, column)
    }

    pub fn min(&self, conn: &dyn Connection, column: &str) -> OrmResult<Option<Value>> {
        self.to_query().min(conn, column)
    }

    pub fn avg(&self, conn: &dyn Connection, column: &str) -> OrmResult<Option<f64>> {
        self.to_query().avg(conn, column)
    }

    pub fn sum(&self, conn: &dyn Connection, column: &str) -> OrmResult<Value> {
        self.to_query().sum(conn, column)
    }

    /// Page of models plus the total count.
    pub fn paginate(
        &self,
        conn: &dyn Connection,
        per_page: u64,
        page: u64,
    ) -> OrmResult<Paginator<M>> {
        let base = self.to_query();
        let total = base.count(conn)?;
        let items = if total == 0 {
            Vec::new()
        } else {
            let mut q = base;
            q.for_page(page, per_page);
            self.fetch(conn, &q)?
        };
        Ok(Paginator::new(items, total, per_page, page))
    }

    /// Page of models without counting.
    pub fn simple_paginate(
        &self,
        conn: &dyn Connection,
        per_page: u64,
        page: u64,
    ) -> OrmResult<SimplePaginator<M>> {
        let mut q = self.to_query();
        q.for_page(page, per_page);
        q.limit(per_page.clamp(1, MAX_ROWS - 1) + 1);
        let records: Vec<Record> = q.get(conn)?.into_iter().map(Record::hydrate).collect();
        let page_of = SimplePaginator::from_overfetch(records, per_page, page);
        let mut items = page_of.items;
        eager_load(conn, Self::info(), &mut items, &self.eager)?;
        Ok(SimplePaginator {
            items: items.into_iter().map(M::from_record).collect(),
            per_page: page_of.per_page,
            current_page: page_of.current_page,
            has_more: page_of.has_more,
        })
    }

    // ==================== Find-or-create ====================

    /// First model matching `attributes`, or a new saved one built from
    /// `attributes + values`.
    pub fn first_or_create(
        &self,
        conn: &dyn Connection,
        attributes: Values,
        values: Values,
    ) -> OrmResult<M> {
        if attributes.is_empty() {
            return Err(OrmError::validation(
                "first_or_create requires identifying attributes",
            ));
        }
        if let Some(found) = self.matching(&attributes).first(conn)? {
            return Ok(found);
        }
        let mut all = attributes;
        all.extend(values);
        M::create(conn, all)
    }

    /// Update the model matching `attributes` with `values`, or create it.
    pub fn update_or_create(
        &self,
        conn: &dyn Connection,
        attributes: Values,
        values: Values,
    ) -> OrmResult<M> {
        if attributes.is_empty() {
            return Err(OrmError::validation(
                "update_or_create requires identifying attributes",
            ));
        }
        match self.matching(&attributes).first(conn)? {
            Some(mut found) => {
                found.fill(values);
                found.save(conn)?;
                Ok(found)
            }
            None => {
                let mut all = attributes;
                all.extend(values);
                M::create(conn, all)
            }
        }
    }

    fn matching(&self, attributes: &Values) -> Self {
        let mut q = self.clone();
        for (column, value) in attributes {
            q.query.where_eq(column.as_str(), value.clone());
        }
        q
    }

    // ==================== Mass writes ====================

    /// Update all matching rows (no hooks). `updated_at` is set when timestamps are on.
    pub fn update(&self, conn: &dyn Connection, values: Values) -> OrmResult<u64> {
        self.to_query().update(conn, Self::touched(values))
    }

    pub fn increment(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
    ) -> OrmResult<u64> {
        self.increment_with(conn, column, amount, Values::new())
    }

    /// Increment matching rows; `updated_at` is set when timestamps are on.
    pub fn increment_with(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
        extra: Values,
    ) -> OrmResult<u64> {
        self.to_query()
            .increment_with(conn, column, amount, Self::touched(extra))
    }

    pub fn decrement(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
    ) -> OrmResult<u64> {
        self.decrement_with(conn, column, amount, Values::new())
    }

    pub fn decrement_with(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
        extra: Values,
    ) -> OrmResult<u64> {
        self.to_query()
            .decrement_with(conn, column, amount, Self::touched(extra))
    }

    fn touched(mut values: Values) -> Values {
        if M::TIMESTAMPS && !values.contains_key(M::UPDATED_AT) {
            values.insert(M::UPDATED_AT.to_string(), Value::now());
        }
        values
    }

    /// Update the scoped row matching `attributes`, or insert `attributes + values`.
    pub fn update_or_insert(
        &self,
        conn: &dyn Connection,
        attributes: Values,
        values: Values,
    ) -> OrmResult<bool> {
        self.to_query().update_or_insert(conn, attributes, values)
    }

    /// Remove every row of the table, trashed rows included.
    pub fn truncate(&self, conn: &dyn Connection) -> OrmResult<()> {
        Query::table(M::TABLE).truncate(conn)
    }

    /// Delete all matching rows (no hooks); soft-deleting models get `deleted_at` set.
    pub fn delete(&self, conn: &dyn Connection) -> OrmResult<u64> {
        if M::SOFT_DELETES {
            let mut values = Values::new();
            values.insert(M::DELETED_AT.to_string(), Value::now());
            return self.update(conn, values);
        }
        self.to_query().delete(conn)
    }

    /// Remove matching rows even for soft-deleting models.
    pub fn force_delete(&self, conn: &dyn Connection) -> OrmResult<u64> {
        self.to_query().delete(conn)
    }

    /// Clear `deleted_at` on matching rows.
    pub fn restore(&self, conn: &dyn Connection) -> OrmResult<u64> {
        if !M::SOFT_DELETES {
            return Err(OrmError::validation(format!(
                "model on '{}' does not use soft deletes",
                M::TABLE
            )));
        }
        let mut q = self.clone();
        if q.trashed == TrashedScope::Without {
            q.trashed = TrashedScope::Only;
        }
        let mut values = Values::new();
        values.insert(M::DELETED_AT.to_string(), Value::Null);
        q.update(conn, values)
    }
}

/// EXISTS sub-query for a relation path, starting at model `info` referenced as
/// `parent`. Nested segments become EXISTS clauses inside the previous level; the
/// constraint applies to the last one.
pub(crate) fn has_query<F: FnOnce(&mut Query)>(
    info: ModelInfo,
    parent: &str,
    path: &[&str],
    constraint: Option<F>,
) -> OrmResult<Query> {
    let Some((first, rest)) = path.split_first() else {
        return Err(OrmError::Relation("empty relation path".to_string()));
    };
    let relation = info.relation(first)?;
    let (mut q, qualifier) = relation.existence_query(parent, "1");
    if rest.is_empty() {
        if let Some(f) = constraint {
            f(&mut q);
        }
    } else {
        let inner = has_query(relation.related, &qualifier, rest, constraint)?;
        q.where_exists_query(inner, Boolean::And, false);
    }
    Ok(q)
}
