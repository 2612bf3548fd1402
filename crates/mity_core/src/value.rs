//! Property trees that may carry deferred values.

use std::collections::BTreeMap;

use serde_json::{Number, Value};

use crate::token::Token;

/// A property value as built by construct code.
///
/// Mirrors the JSON data model, plus a [`Prop::Token`] leaf for values that
/// are only known at synthesis time. Maps are ordered so that resolution is
/// deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Prop>),
    Map(BTreeMap<String, Prop>),
    Token(Token),
}

impl Default for Prop {
    fn default() -> Self {
        Prop::Null
    }
}

impl Prop {
    /// Build a map from key/value pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Prop)>) -> Self {
        Prop::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list.
    pub fn list(items: impl IntoIterator<Item = Prop>) -> Self {
        Prop::List(items.into_iter().collect())
    }

    /// Empty map.
    pub fn empty_map() -> Self {
        Prop::Map(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Prop::Null)
    }

    /// Get a map entry.
    pub fn get(&self, key: &str) -> Option<&Prop> {
        match self {
            Prop::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Insert into a map, returning `false` when `self` is not a map.
    pub fn insert(&mut self, key: impl Into<String>, value: Prop) -> bool {
        match self {
            Prop::Map(entries) => {
                entries.insert(key.into(), value);
                true
            }
            _ => false,
        }
    }

    /// Whether the tree contains a [`Prop::Token`] leaf anywhere.
    ///
    /// Markers embedded in strings are not detected here; use
    /// [`crate::TokenMap::contains_markers`] for that.
    pub fn has_tokens(&self) -> bool {
        match self {
            Prop::Token(_) => true,
            Prop::List(items) => items.iter().any(Prop::has_tokens),
            Prop::Map(entries) => entries.values().any(Prop::has_tokens),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Prop::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Prop::Null,
            Value::Bool(b) => Prop::Bool(b),
            Value::Number(n) => Prop::Number(n),
            Value::String(s) => Prop::String(s),
            Value::Array(items) => Prop::List(items.into_iter().map(Prop::from).collect()),
            Value::Object(entries) => {
                Prop::Map(entries.into_iter().map(|(k, v)| (k, Prop::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Prop {
    fn from(value: &str) -> Self {
        Prop::String(value.to_string())
    }
}

impl From<String> for Prop {
    fn from(value: String) -> Self {
        Prop::String(value)
    }
}

impl From<bool> for Prop {
    fn from(value: bool) -> Self {
        Prop::Bool(value)
    }
}

impl From<i64> for Prop {
    fn from(value: i64) -> Self {
        Prop::Number(Number::from(value))
    }
}

impl From<u32> for Prop {
    fn from(value: u32) -> Self {
        Prop::Number(Number::from(value))
    }
}

impl From<Token> for Prop {
    fn from(value: Token) -> Self {
        Prop::Token(value)
    }
}

impl From<Vec<Prop>> for Prop {
    fn from(value: Vec<Prop>) -> Self {
        Prop::List(value)
    }
}

impl From<BTreeMap<String, Prop>> for Prop {
    fn from(value: BTreeMap<String, Prop>) -> Self {
        Prop::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_preserves_structure() {
        let prop = Prop::from(json!({"a": [1, "two", null], "b": {"c": true}}));

        let a = prop.get("a").unwrap();
        match a {
            Prop::List(items) => assert_eq!(items.len(), 3),
            other => panic!("expected list, got {:?}", other),
        }
        assert!(matches!(prop.get("b").and_then(|b| b.get("c")), Some(Prop::Bool(true))));
        assert!(!prop.has_tokens());
    }

    #[test]
    fn test_insert_only_on_maps() {
        let mut map = Prop::empty_map();
        assert!(map.insert("key", Prop::from("value")));
        assert_eq!(map.get("key").and_then(Prop::as_str), Some("value"));

        let mut scalar = Prop::from(1i64);
        assert!(!scalar.insert("key", Prop::Null));
    }
}
