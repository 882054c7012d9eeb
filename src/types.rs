//! Core types for the Firebase client.

use serde_json::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// A JSON object, the default shape of decoded watch payloads.
pub type Document = serde_json::Map<String, Value>;

/// Security rules for a database. The layout is left to the server.
pub type Rules = serde_json::Map<String, Value>;

/// Query-string parameters attached to a request.
///
/// Keys are kept sorted so the encoded query string is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw parameter value, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Set a parameter whose value the server expects JSON-encoded
    /// (`orderBy`, `equalTo`, `startAt`, `endAt`).
    pub fn set_json(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into().to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Copy every parameter of `other` into `self`; `other` wins on conflicts.
    pub fn extend(&mut self, other: &QueryParams) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl<'a> IntoIterator for &'a QueryParams {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Ordering applied to a query.
///
/// The special keys `$key`, `$value` and `$priority` order by child key,
/// child value and priority respectively; anything else orders by that
/// child property.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OrderBy {
    Key,
    Value,
    Priority,
    Child(String),
}

impl OrderBy {
    /// Parse from the protocol string
    pub fn parse(s: &str) -> Self {
        match s {
            "$key" => OrderBy::Key,
            "$value" => OrderBy::Value,
            "$priority" => OrderBy::Priority,
            other => OrderBy::Child(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderBy::Key => "$key",
            OrderBy::Value => "$value",
            OrderBy::Priority => "$priority",
            OrderBy::Child(s) => s.as_str(),
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for OrderBy {
    fn from(s: &str) -> Self {
        OrderBy::parse(s)
    }
}

impl From<String> for OrderBy {
    fn from(s: String) -> Self {
        OrderBy::parse(&s)
    }
}
