//! Active-record models.
//!
//! A model is a thin typed wrapper around a [`Record`]. Implementing [`Model`] takes the
//! table description (associated constants), access to the record, and optionally a
//! relation table and lifecycle hooks; persistence, soft deletes, timestamps and
//! relation loading come from the trait's provided methods.
//!
//! ```ignore
//! use quarry::{Model, Record, Relation};
//!
//! #[derive(Debug, Clone)]
//! pub struct Customer(Record);
//!
//! impl Model for Customer {
//!     const TABLE: &'static str = "customers";
//!     const FILLABLE: &'static [&'static str] = &["name", "email"];
//!     const SOFT_DELETES: bool = true;
//!
//!     fn from_record(record: Record) -> Self { Customer(record) }
//!     fn record(&self) -> &Record { &self.0 }
//!     fn record_mut(&mut self) -> &mut Record { &mut self.0 }
//!
//!     fn relation(name: &str) -> Option<Relation> {
//!         match name {
//!             "invoices" => Some(Relation::has_many::<Self, Invoice>()),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! impl Customer {
//!     pub fn name(&self) -> quarry::OrmResult<String> { self.0.get_as("name") }
//! }
//!
//! let customer = Customer::create(&conn, quarry::values! { "name" => "Acme" })?;
//! let mut q = Customer::query();
//! q.where_has("invoices")?;
//! let with_invoices = q.get(&conn)?;
//! ```

mod builder;
mod eager;
mod record;
mod relation;

pub use builder::{ModelQuery, TrashedScope};
pub use eager::Constraint;
pub use record::{Record, Relationship};
pub use relation::{ModelInfo, Relation, RelationKind};

use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::query::{Query, Values};
use crate::value::Value;
use indexmap::IndexMap;

/// An active-record model backed by a [`Record`].
pub trait Model: Sized {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    /// Whether the primary key is generated by the database on insert.
    const INCREMENTING: bool = true;
    /// Attributes accepted by mass assignment.
    const FILLABLE: &'static [&'static str] = &[];
    const TIMESTAMPS: bool = true;
    const CREATED_AT: &'static str = "created_at";
    const UPDATED_AT: &'static str = "updated_at";
    const SOFT_DELETES: bool = false;
    const DELETED_AT: &'static str = "deleted_at";

    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// Relation registry. Unknown names return `None`.
    fn relation(_name: &str) -> Option<Relation> {
        None
    }

    // ==================== Hooks ====================
    //
    // `*ing` hooks run before the statement and abort it by returning an error.

    fn saving(&mut self) -> OrmResult<()> {
        Ok(())
    }

    fn saved(&mut self) {}

    fn creating(&mut self) -> OrmResult<()> {
        Ok(())
    }

    fn created(&mut self) {}

    fn updating(&mut self) -> OrmResult<()> {
        Ok(())
    }

    fn updated(&mut self) {}

    fn deleting(&mut self) -> OrmResult<()> {
        Ok(())
    }

    fn deleted(&mut self) {}

    fn restoring(&mut self) -> OrmResult<()> {
        Ok(())
    }

    fn restored(&mut self) {}

    // ==================== Construction & lookup ====================

    fn query() -> ModelQuery<Self> {
        ModelQuery::new()
    }

    /// An unsaved model filled from `values` (fillable attributes only).
    fn make(values: Values) -> Self {
        let mut record = Record::new();
        record.fill(Self::FILLABLE, values);
        Self::from_record(record)
    }

    /// Make and save a model.
    fn create(conn: &dyn Connection, values: Values) -> OrmResult<Self> {
        let mut model = Self::make(values);
        model.save(conn)?;
        Ok(model)
    }

    fn find(conn: &dyn Connection, id: impl Into<Value>) -> OrmResult<Option<Self>> {
        Self::query().find(conn, id)
    }

    fn find_or_fail(conn: &dyn Connection, id: impl Into<Value>) -> OrmResult<Self> {
        Self::query().find_or_fail(conn, id)
    }

    fn all(conn: &dyn Connection) -> OrmResult<Vec<Self>> {
        Self::query().get(conn)
    }

    /// Load and delete the models with the given keys (hooks run per model).
    fn destroy<V: Into<Value>>(
        conn: &dyn Connection,
        ids: impl IntoIterator<Item = V>,
    ) -> OrmResult<usize> {
        let models = Self::query().find_many(conn, ids)?;
        let count = models.len();
        for mut model in models {
            model.delete(conn)?;
        }
        Ok(count)
    }

    // ==================== Attributes ====================

    fn key(&self) -> Value {
        self.record().value(Self::PRIMARY_KEY)
    }

    fn get_attribute(&self, key: &str) -> Value {
        self.record().value(key)
    }

    fn set_attribute(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.record_mut().set(key, value);
        self
    }

    /// Mass assignment through the fillable whitelist.
    fn fill(&mut self, values: Values) -> &mut Self {
        self.record_mut().fill(Self::FILLABLE, values);
        self
    }

    fn force_fill(&mut self, values: Values) -> &mut Self {
        self.record_mut().force_fill(values);
        self
    }

    fn exists(&self) -> bool {
        self.record().exists()
    }

    fn is_dirty(&self) -> bool {
        self.record().is_dirty()
    }

    /// Whether the model is soft-deleted.
    fn trashed(&self) -> bool {
        Self::SOFT_DELETES && !self.record().value(Self::DELETED_AT).is_null()
    }

    // ==================== Persistence ====================

    /// Insert a new model or update the dirty attributes of an existing one.
    ///
    /// Saving a clean existing model issues no statement.
    fn save(&mut self, conn: &dyn Connection) -> OrmResult<()> {
        self.saving()?;
        if self.exists() {
            if self.is_dirty() {
                perform_update(self, conn)?;
            }
        } else {
            perform_insert(self, conn)?;
        }
        self.saved();
        self.record_mut().sync_original();
        Ok(())
    }

    /// Fill (fillable only) and save.
    fn update(&mut self, conn: &dyn Connection, values: Values) -> OrmResult<()> {
        if !self.exists() {
            return Err(OrmError::validation(format!(
                "cannot update an unsaved {} model",
                Self::TABLE
            )));
        }
        self.fill(values);
        self.save(conn)
    }

    /// Delete the model; soft-deleting models only get their deletion column set.
    fn delete(&mut self, conn: &dyn Connection) -> OrmResult<()> {
        if !self.exists() {
            return Ok(());
        }
        self.deleting()?;
        if Self::SOFT_DELETES {
            let now = Value::now();
            let mut values = Values::new();
            values.insert(Self::DELETED_AT.to_string(), now.clone());
            self.record_mut().set(Self::DELETED_AT, now.clone());
            if Self::TIMESTAMPS {
                values.insert(Self::UPDATED_AT.to_string(), now.clone());
                self.record_mut().set(Self::UPDATED_AT, now);
            }
            key_query(self)?.update(conn, values)?;
            self.record_mut().sync_original();
        } else {
            key_query(self)?.delete(conn)?;
            self.record_mut().set_exists(false);
        }
        self.deleted();
        Ok(())
    }

    /// Remove the row even when the model soft-deletes.
    fn force_delete(&mut self, conn: &dyn Connection) -> OrmResult<()> {
        if !self.exists() {
            return Ok(());
        }
        self.deleting()?;
        key_query(self)?.delete(conn)?;
        self.record_mut().set_exists(false);
        self.deleted();
        Ok(())
    }

    /// Clear the deletion column of a soft-deleted model.
    fn restore(&mut self, conn: &dyn Connection) -> OrmResult<()> {
        if !Self::SOFT_DELETES {
            return Err(OrmError::validation(format!(
                "model on '{}' does not use soft deletes",
                Self::TABLE
            )));
        }
        self.restoring()?;
        self.record_mut().set(Self::DELETED_AT, Value::Null);
        self.save(conn)?;
        self.restored();
        Ok(())
    }

    /// Update only `updated_at`.
    fn touch(&mut self, conn: &dyn Connection) -> OrmResult<()> {
        if !Self::TIMESTAMPS || !self.exists() {
            return Ok(());
        }
        let now = Value::now();
        self.record_mut().set(Self::UPDATED_AT, now.clone());
        let mut values = Values::new();
        values.insert(Self::UPDATED_AT.to_string(), now);
        key_query(self)?.update(conn, values)?;
        self.record_mut().sync_original();
        Ok(())
    }

    /// Reload attributes (and already loaded relations) from storage.
    fn refresh(&mut self, conn: &dyn Connection) -> OrmResult<()> {
        if !self.exists() {
            return Ok(());
        }
        let fresh = key_query(self)?.first_or_fail(conn)?;
        self.record_mut().replace_attributes(fresh.into_map());

        let loaded: Vec<String> = self
            .record()
            .relation_names()
            .filter(|n| *n != "pivot")
            .map(str::to_string)
            .collect();
        if !loaded.is_empty() {
            let names: Vec<&str> = loaded.iter().map(String::as_str).collect();
            self.load(conn, &names)?;
        }
        Ok(())
    }

    /// A freshly loaded copy of this model.
    fn fresh(&self, conn: &dyn Connection) -> OrmResult<Option<Self>> {
        if !self.exists() {
            return Ok(None);
        }
        let mut q = Self::query();
        q.with_trashed();
        q.find(conn, self.key())
    }

    // ==================== Relations ====================

    /// Load relations (dotted paths allowed) into this model's relation cache.
    fn load(&mut self, conn: &dyn Connection, relations: &[&str]) -> OrmResult<()> {
        let info = ModelInfo::of::<Self>();
        let mut tree = IndexMap::new();
        for path in relations {
            eager::validate_path(info, path)?;
            eager::insert_path(&mut tree, path, None);
        }
        let mut records = [std::mem::take(self.record_mut())];
        let result = eager::eager_load(conn, info, &mut records, &tree);
        let [record] = records;
        *self.record_mut() = record;
        result
    }

    /// Loaded related models (empty when the relation is not loaded).
    fn related<R: Model>(&self, relation: &str) -> Vec<R> {
        self.record()
            .relation(relation)
            .map(|r| {
                r.records()
                    .into_iter()
                    .map(|rec| R::from_record(rec.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The loaded related model of a one-to-one relation.
    fn related_one<R: Model>(&self, relation: &str) -> Option<R> {
        self.record()
            .relation(relation)
            .and_then(Relationship::as_one)
            .map(|rec| R::from_record(rec.clone()))
    }

    /// Query for this model's related rows.
    fn related_query(&self, relation: &str) -> OrmResult<Query> {
        let relation = ModelInfo::of::<Self>().relation(relation)?;
        Ok(relation.eager_query(vec![self.record().value(relation.parent_key())]))
    }

    fn to_json(&self) -> OrmResult<serde_json::Value> {
        self.record().to_json()
    }
}

/// Query targeting this model's row by primary key.
fn key_query<M: Model>(model: &M) -> OrmResult<Query> {
    let key = model.record().original(M::PRIMARY_KEY).cloned().unwrap_or_else(|| model.key());
    if key.is_null() {
        return Err(OrmError::validation(format!(
            "{} model has no '{}' value",
            M::TABLE,
            M::PRIMARY_KEY
        )));
    }
    let mut q = Query::table(M::TABLE);
    q.where_eq(M::PRIMARY_KEY, key);
    Ok(q)
}

fn perform_update<M: Model>(model: &mut M, conn: &dyn Connection) -> OrmResult<()> {
    model.updating()?;
    if M::TIMESTAMPS && !model.record().is_dirty_attr(M::UPDATED_AT) {
        model.record_mut().set(M::UPDATED_AT, Value::now());
    }
    let dirty = model.record().get_dirty();
    if dirty.is_empty() {
        return Ok(());
    }
    key_query(model)?.update(conn, dirty)?;
    model.record_mut().sync_changes();
    model.updated();
    Ok(())
}

fn perform_insert<M: Model>(model: &mut M, conn: &dyn Connection) -> OrmResult<()> {
    model.creating()?;
    if M::TIMESTAMPS {
        let now = Value::now();
        let record = model.record_mut();
        if !record.has(M::UPDATED_AT) {
            record.set(M::UPDATED_AT, now.clone());
        }
        if !record.has(M::CREATED_AT) {
            record.set(M::CREATED_AT, now);
        }
    }

    let attributes: Values = model.record().attributes().clone();
    let q = Query::table(M::TABLE);
    let key_missing = model.record().value(M::PRIMARY_KEY).is_null();
    if M::INCREMENTING && key_missing {
        let id = q.insert_get_id_as(conn, attributes, M::PRIMARY_KEY)?;
        model.record_mut().set(M::PRIMARY_KEY, id);
    } else {
        q.insert(conn, attributes)?;
    }

    let record = model.record_mut();
    record.set_exists(true);
    record.sync_changes();
    model.created();
    Ok(())
}
