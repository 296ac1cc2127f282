//! Ordered documents and their values
//!
//! A [`Document`] is an insertion-ordered association list of field name to
//! [`Value`]. Field order is preserved through copies, updates and
//! serialization so that logged operations render identically every run.
//!
//! Field access goes through typed accessors that fail with a
//! [`FieldError`] when a field is absent or holds the wrong kind of value;
//! nothing silently defaults.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the field holding a document's id
pub const ID_FIELD: &str = "_id";

/// A field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    List(Vec<Value>),
    /// Nested document
    Document(Document),
}

impl Value {
    /// Kind of this value, for diagnostics
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Document(_) => ValueKind::Document,
        }
    }

    /// Borrow as a string slice, if this is a string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn get_path(&self, path: &str) -> Option<&Value> {
        match self {
            Value::Document(doc) => doc.get_path(path),
            Value::List(items) => {
                let (head, rest) = split_path(path);
                let item = items.get(head.parse::<usize>().ok()?)?;
                match rest {
                    None => Some(item),
                    Some(rest) => item.get_path(rest),
                }
            }
            _ => None,
        }
    }

    fn set_path(&mut self, full: &str, path: &str, value: Value) -> Result<(), FieldError> {
        match self {
            Value::Document(doc) => doc.set_path_from(full, path, value),
            Value::List(items) => {
                let (head, rest) = split_path(path);
                let slot = head
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get_mut(index))
                    .ok_or_else(|| FieldError::InvalidPath {
                        path: full.to_string(),
                    })?;
                match rest {
                    None => {
                        *slot = value;
                        Ok(())
                    }
                    Some(rest) => slot.set_path(full, rest, value),
                }
            }
            other => Err(FieldError::WrongKind {
                field: full.to_string(),
                expected: ValueKind::Document,
                found: other.kind(),
            }),
        }
    }

    fn unset_path(&mut self, path: &str) {
        match self {
            Value::Document(doc) => doc.unset_path(path),
            Value::List(items) => {
                let (head, rest) = split_path(path);
                let Some(slot) = head.parse::<usize>().ok().and_then(|i| items.get_mut(i)) else {
                    return;
                };
                match rest {
                    // Unsetting a list element keeps the list length stable.
                    None => *slot = Value::Null,
                    Some(rest) => slot.unset_path(rest),
                }
            }
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Document(doc) => write!(f, "{doc}"),
        }
    }
}

/// Kind of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Null
    Null,
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Float
    Float,
    /// String
    String,
    /// List
    List,
    /// Document
    Document,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Document => "document",
        };
        f.write_str(name)
    }
}

/// Field access errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// Field is absent
    #[error("field {field:?} is missing")]
    Missing {
        /// Field name or dotted path
        field: String,
    },

    /// Field holds a value of another kind
    #[error("field {field:?} is {found}, expected {expected}")]
    WrongKind {
        /// Field name or dotted path
        field: String,
        /// Kind the caller asked for
        expected: ValueKind,
        /// Kind actually stored
        found: ValueKind,
    },

    /// Path cannot address a value
    #[error("invalid field path {path:?}")]
    InvalidPath {
        /// The offending path
        path: String,
    },
}

impl FieldError {
    fn wrong_kind(field: &str, expected: ValueKind, found: &Value) -> Self {
        Self::WrongKind {
            field: field.to_string(),
            expected,
            found: found.kind(),
        }
    }
}

/// Insertion-ordered document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: IndexMap<String, Value>,
}

impl Document {
    /// Create an empty document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document whose first field is `_id`
    #[inline]
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::new().with(ID_FIELD, id.into())
    }

    /// Builder form of [`Document::insert`]
    #[inline]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a top-level field
    ///
    /// Replacing keeps the field's original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Replace a field only if it is already present
    pub fn replace(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Remove a top-level field, keeping the order of the rest
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    /// Copy of this document without the named top-level fields
    #[must_use]
    pub fn without(&self, names: &[&str]) -> Document {
        let mut copy = self.clone();
        for name in names {
            copy.remove(name);
        }
        copy
    }

    /// Top-level field by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether a top-level field is present
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of top-level fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Field names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Value at a dotted path (`a.b.0.c`); numeric segments index lists
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let (head, rest) = split_path(path);
        let value = self.fields.get(head)?;
        match rest {
            None => Some(value),
            Some(rest) => value.get_path(rest),
        }
    }

    /// Set the value at a dotted path, creating intermediate documents
    ///
    /// # Errors
    /// - `FieldError::WrongKind` if an intermediate value is a scalar
    /// - `FieldError::InvalidPath` if a list segment is not a valid index
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        self.set_path_from(path, path, value.into())
    }

    fn set_path_from(&mut self, full: &str, path: &str, value: Value) -> Result<(), FieldError> {
        let (head, rest) = split_path(path);
        if head.is_empty() {
            return Err(FieldError::InvalidPath {
                path: full.to_string(),
            });
        }
        match rest {
            None => {
                self.fields.insert(head.to_string(), value);
                Ok(())
            }
            Some(rest) => self
                .fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Document(Document::new()))
                .set_path(full, rest, value),
        }
    }

    /// Remove the value at a dotted path; missing paths are a no-op
    pub fn unset_path(&mut self, path: &str) {
        let (head, rest) = split_path(path);
        match rest {
            None => {
                self.fields.shift_remove(head);
            }
            Some(rest) => {
                if let Some(child) = self.fields.get_mut(head) {
                    child.unset_path(rest);
                }
            }
        }
    }

    /// The document id
    ///
    /// # Errors
    /// Fails if `_id` is missing or not a string.
    pub fn id(&self) -> Result<&str, FieldError> {
        self.get_str(ID_FIELD)
    }

    /// Any value at `path`
    ///
    /// # Errors
    /// `FieldError::Missing` if nothing is stored there.
    pub fn require(&self, path: &str) -> Result<&Value, FieldError> {
        self.get_path(path).ok_or_else(|| FieldError::Missing {
            field: path.to_string(),
        })
    }

    /// String at `path`
    ///
    /// # Errors
    /// Fails if absent or not a string.
    pub fn get_str(&self, path: &str) -> Result<&str, FieldError> {
        match self.require(path)? {
            Value::String(s) => Ok(s),
            other => Err(FieldError::wrong_kind(path, ValueKind::String, other)),
        }
    }

    /// Integer at `path`
    ///
    /// # Errors
    /// Fails if absent or not an integer.
    pub fn get_i64(&self, path: &str) -> Result<i64, FieldError> {
        match self.require(path)? {
            Value::Int(i) => Ok(*i),
            other => Err(FieldError::wrong_kind(path, ValueKind::Int, other)),
        }
    }

    /// Boolean at `path`
    ///
    /// # Errors
    /// Fails if absent or not a boolean.
    pub fn get_bool(&self, path: &str) -> Result<bool, FieldError> {
        match self.require(path)? {
            Value::Bool(b) => Ok(*b),
            other => Err(FieldError::wrong_kind(path, ValueKind::Bool, other)),
        }
    }

    /// Nested document at `path`
    ///
    /// # Errors
    /// Fails if absent or not a document.
    pub fn get_doc(&self, path: &str) -> Result<&Document, FieldError> {
        match self.require(path)? {
            Value::Document(d) => Ok(d),
            other => Err(FieldError::wrong_kind(path, ValueKind::Document, other)),
        }
    }

    /// List at `path`
    ///
    /// # Errors
    /// Fails if absent or not a list.
    pub fn get_list(&self, path: &str) -> Result<&[Value], FieldError> {
        match self.require(path)? {
            Value::List(items) => Ok(items),
            other => Err(FieldError::wrong_kind(path, ValueKind::List, other)),
        }
    }

    /// String at `path` if present
    ///
    /// # Errors
    /// Fails only if present with another kind.
    pub fn opt_str(&self, path: &str) -> Result<Option<&str>, FieldError> {
        match self.get_path(path) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(FieldError::wrong_kind(path, ValueKind::String, other)),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.insert(name, value);
        }
        doc
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unit() -> Document {
        Document::with_id("u1")
            .with("service", "db")
            .with("txn-revno", 3)
            .with("tools", Document::new().with("version", "1.0"))
    }

    #[test]
    fn field_order_is_preserved() {
        let mut doc = unit();
        doc.insert("application", "db");
        doc.remove("service");

        let names: Vec<_> = doc.names().collect();
        assert_eq!(names, vec!["_id", "txn-revno", "tools", "application"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut doc = unit();
        assert!(doc.replace("service", "web"));
        assert!(!doc.replace("absent", "x"));

        let names: Vec<_> = doc.names().collect();
        assert_eq!(names, vec!["_id", "service", "txn-revno", "tools"]);
        assert_eq!(doc.get_str("service").unwrap(), "web");
    }

    #[test]
    fn typed_accessors_fail_explicitly() {
        let doc = unit();
        assert_eq!(doc.id().unwrap(), "u1");
        assert_eq!(doc.get_i64("txn-revno").unwrap(), 3);
        assert_eq!(
            doc.get_str("missing"),
            Err(FieldError::Missing {
                field: "missing".into()
            })
        );
        assert_eq!(
            doc.get_str("txn-revno"),
            Err(FieldError::WrongKind {
                field: "txn-revno".into(),
                expected: ValueKind::String,
                found: ValueKind::Int,
            })
        );
        assert_eq!(doc.opt_str("missing").unwrap(), None);
    }

    #[test]
    fn dotted_paths() {
        let mut doc = unit();
        assert_eq!(doc.get_str("tools.version").unwrap(), "1.0");

        doc.set_path("tools.version", "2.0.0").unwrap();
        doc.set_path("settings.agent-version", "2.0.0").unwrap();
        assert_eq!(doc.get_str("tools.version").unwrap(), "2.0.0");
        assert_eq!(doc.get_str("settings.agent-version").unwrap(), "2.0.0");

        doc.unset_path("tools.version");
        doc.unset_path("no.such.path");
        assert!(doc.get_doc("tools").unwrap().is_empty());
    }

    #[test]
    fn list_paths() {
        let endpoints = vec![
            Value::from(Document::new().with("servicename", "wordpress")),
            Value::from(Document::new().with("servicename", "mysql")),
        ];
        let mut doc = Document::with_id("r1").with("endpoints", endpoints);

        assert_eq!(doc.get_str("endpoints.1.servicename").unwrap(), "mysql");
        doc.set_path("endpoints.1.applicationname", "mysql").unwrap();
        doc.unset_path("endpoints.1.servicename");

        let ep = doc.get_list("endpoints").unwrap()[1].clone();
        assert_eq!(ep, Value::from(Document::new().with("applicationname", "mysql")));

        assert_eq!(
            doc.set_path("endpoints.7.x", 1),
            Err(FieldError::InvalidPath {
                path: "endpoints.7.x".into()
            })
        );
    }

    #[test]
    fn setting_through_scalar_fails() {
        let mut doc = unit();
        let err = doc.set_path("service.name", "x").unwrap_err();
        assert!(matches!(err, FieldError::WrongKind { .. }));
    }

    #[test]
    fn json_round_trip_keeps_order() {
        let doc = unit();
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(
            json,
            r#"{"_id":"u1","service":"db","txn-revno":3,"tools":{"version":"1.0"}}"#
        );
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
