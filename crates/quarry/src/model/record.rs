//! Attribute bag behind every model instance.

use crate::error::{OrmError, OrmResult};
use crate::query::Values;
use crate::row::Row;
use crate::value::{FromValue, Value, decode};
use indexmap::IndexMap;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// A loaded relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Relationship {
    /// has-one / belongs-to (and the pivot row of a many-to-many child).
    One(Option<Box<Record>>),
    /// has-many / belongs-to-many.
    Many(Vec<Record>),
}

impl Relationship {
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Relationship::One(r) => r.as_deref(),
            Relationship::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> &[Record] {
        match self {
            Relationship::Many(v) => v,
            Relationship::One(_) => &[],
        }
    }

    /// Records in this relation (zero or one for `One`).
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Relationship::One(r) => r.as_deref().into_iter().collect(),
            Relationship::Many(v) => v.iter().collect(),
        }
    }
}

/// Attributes, original snapshot, loaded relations and the existence flag of one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    attributes: IndexMap<String, Value>,
    original: IndexMap<String, Value>,
    changes: IndexMap<String, Value>,
    relations: IndexMap<String, Relationship>,
    exists: bool,
}

impl Record {
    /// A new, unsaved record.
    pub fn new() -> Self {
        Self::default()
    }

    /// A record loaded from storage: every column is force-filled and becomes the
    /// original snapshot.
    pub fn hydrate(row: Row) -> Self {
        let attributes: IndexMap<String, Value> = row.into_map();
        Self {
            original: attributes.clone(),
            attributes,
            changes: IndexMap::new(),
            relations: IndexMap::new(),
            exists: true,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub(crate) fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    // ==================== Attributes ====================

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Attribute value, `Null` when unset.
    pub fn value(&self, key: &str) -> Value {
        self.attributes.get(key).cloned().unwrap_or_default()
    }

    /// Typed attribute access. A missing attribute decodes as `NULL`.
    pub fn get_as<T: FromValue>(&self, key: &str) -> OrmResult<T> {
        match self.attributes.get(key) {
            Some(v) => decode(key, v),
            None => decode(key, &Value::Null),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.shift_remove(key)
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    /// Mass assignment restricted to `fillable`. Keys outside the whitelist are ignored.
    pub fn fill(&mut self, fillable: &[&str], values: Values) -> &mut Self {
        for (key, value) in values {
            if fillable.contains(&key.as_str()) {
                self.attributes.insert(key, value);
            } else {
                tracing::trace!(target: "quarry.model", attribute = %key, "discarding non-fillable attribute");
            }
        }
        self
    }

    /// Mass assignment without the whitelist.
    pub fn force_fill(&mut self, values: Values) -> &mut Self {
        self.attributes.extend(values);
        self
    }

    // ==================== Dirty tracking ====================

    pub fn original(&self, key: &str) -> Option<&Value> {
        self.original.get(key)
    }

    /// Attributes that differ from the original snapshot.
    pub fn get_dirty(&self) -> Values {
        self.attributes
            .iter()
            .filter(|(k, v)| !self.original.get(*k).is_some_and(|o| equivalent(o, v)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.get_dirty().is_empty()
    }

    pub fn is_dirty_attr(&self, key: &str) -> bool {
        match (self.attributes.get(key), self.original.get(key)) {
            (Some(v), Some(o)) => !equivalent(o, v),
            (Some(_), None) => true,
            _ => false,
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.is_dirty()
    }

    /// Whether the last save changed anything.
    pub fn was_changed(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Whether the last save changed `key`.
    pub fn was_changed_attr(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn get_changes(&self) -> &IndexMap<String, Value> {
        &self.changes
    }

    /// Take a new original snapshot.
    pub fn sync_original(&mut self) -> &mut Self {
        self.original = self.attributes.clone();
        self
    }

    /// Record the current dirty set as the last save's changes.
    pub(crate) fn sync_changes(&mut self) {
        self.changes = self.get_dirty();
    }

    /// Replace attributes with freshly loaded ones.
    pub(crate) fn replace_attributes(&mut self, attributes: IndexMap<String, Value>) {
        self.attributes = attributes;
        self.sync_original();
    }

    // ==================== Relations ====================

    pub fn relation(&self, name: &str) -> Option<&Relationship> {
        self.relations.get(name)
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, relation: Relationship) -> &mut Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn unset_relation(&mut self, name: &str) -> Option<Relationship> {
        self.relations.shift_remove(name)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// Pivot row attached to a many-to-many child.
    pub fn pivot(&self) -> Option<&Record> {
        self.relation("pivot").and_then(Relationship::as_one)
    }

    /// Attributes and loaded relations as JSON.
    pub fn to_json(&self) -> OrmResult<serde_json::Value> {
        serde_json::to_value(self).map_err(OrmError::from)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len() + self.relations.len()))?;
        for (k, v) in &self.attributes {
            map.serialize_entry(k, v)?;
        }
        for (k, r) in &self.relations {
            map.serialize_entry(k, r)?;
        }
        map.end()
    }
}

/// Loose comparison: numbers compare by value (`1` == `"1"` == `1.0`), everything else
/// strictly.
fn equivalent(original: &Value, current: &Value) -> bool {
    if original == current {
        return true;
    }
    match (original, current) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Text(a), Value::Text(b)) => a == b,
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> Record {
        Record::hydrate(Row::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::from("ann")),
            ("age", Value::Int(30)),
        ]))
    }

    #[test]
    fn hydrated_record_is_clean() {
        let r = loaded();
        assert!(r.exists());
        assert!(r.is_clean());
        assert!(r.get_dirty().is_empty());
    }

    #[test]
    fn set_marks_attribute_dirty() {
        let mut r = loaded();
        r.set("name", "bob");
        assert!(r.is_dirty());
        assert!(r.is_dirty_attr("name"));
        assert!(!r.is_dirty_attr("age"));
        assert_eq!(r.get_dirty().keys().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(r.original("name"), Some(&Value::from("ann")));
    }

    #[test]
    fn numeric_equivalence_is_not_dirty() {
        let mut r = loaded();
        r.set("age", "30");
        assert!(r.is_clean());
        r.set("age", Value::Null);
        assert!(r.is_dirty());
    }

    #[test]
    fn fill_respects_whitelist() {
        let mut r = Record::new();
        r.fill(&["name"], crate::values! { "name" => "ann", "is_admin" => true });
        assert!(r.has("name"));
        assert!(!r.has("is_admin"));

        r.force_fill(crate::values! { "is_admin" => true });
        assert!(r.get_as::<bool>("is_admin").unwrap());
    }

    #[test]
    fn sync_tracks_changes() {
        let mut r = loaded();
        r.set("name", "bob");
        r.sync_changes();
        r.sync_original();
        assert!(r.is_clean());
        assert!(r.was_changed());
        assert!(r.was_changed_attr("name"));
        assert!(!r.was_changed_attr("age"));
    }

    #[test]
    fn typed_access_of_missing_attribute() {
        let r = loaded();
        assert_eq!(r.get_as::<Option<String>>("email").unwrap(), None);
        assert!(r.get_as::<i64>("email").is_err());
    }

    #[test]
    fn json_includes_relations() {
        let mut r = loaded();
        r.set_relation(
            "posts",
            Relationship::Many(vec![Record::hydrate(Row::from_pairs([("id", 9)]))]),
        );
        r.set_relation("profile", Relationship::One(None));
        let json = r.to_json().unwrap();
        assert_eq!(json["name"], "ann");
        assert_eq!(json["posts"][0]["id"], 9);
        assert!(json["profile"].is_null());
    }
}
