//! Field-match filters

use crate::document::{Document, Value};

/// Conjunction of `field == value` matches
///
/// An empty query matches every document. Field names may be dotted paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    matches: Vec<(String, Value)>,
}

impl Query {
    /// Query matching all documents
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a field match
    #[inline]
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matches.push((field.into(), value.into()));
        self
    }

    /// Whether the query has no conditions
    #[inline]
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.matches.is_empty()
    }

    /// Whether `doc` satisfies every match
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.matches
            .iter()
            .all(|(field, value)| doc.get_path(field) == Some(value))
    }
}
