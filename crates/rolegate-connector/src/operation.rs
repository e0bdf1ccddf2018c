//! Operation types
//!
//! Attribute values, attribute sets and search filters passed between the
//! provisioning layer and the directory adapters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attributes sent to or read from a directory entry.
///
/// Attribute names are matched case-insensitively, as LDAP does (RFC 4512);
/// the spelling used on insertion is kept for the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    #[serde(flatten)]
    attributes: BTreeMap<String, AttributeValue>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self {
            attributes: BTreeMap::new(),
        }
    }

    fn find_key(&self, name: &str) -> Option<&String> {
        self.attributes
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
    }

    /// Store `value`, replacing whatever was stored under any spelling of `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        if let Some(existing) = self.find_key(&name).cloned() {
            self.attributes.remove(&existing);
        }
        self.attributes.insert(name, value.into());
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.find_key(name).and_then(|k| self.attributes.get(k))
    }

    /// The value of `name` if it holds exactly one string.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_string())
    }

    pub fn has(&self, name: &str) -> bool {
        self.find_key(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        let key = self.find_key(name)?.clone();
        self.attributes.remove(&key)
    }

    /// Attribute names as inserted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes in byte order of their names.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }
}

/// One attribute's value or values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    /// Sent as its decimal text.
    Integer(i64),
    /// Sent as `TRUE` or `FALSE`.
    Boolean(bool),
    /// A multi-valued attribute.
    Array(Vec<AttributeValue>),
    /// Raw bytes, sent to the directory unchanged.
    Binary(Vec<u8>),
}

impl AttributeValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// String values of a single or multi-valued attribute; other kinds are skipped.
    pub fn as_strings(&self) -> Vec<&str> {
        match self {
            AttributeValue::String(s) => vec![s.as_str()],
            AttributeValue::Array(arr) => arr.iter().filter_map(|v| v.as_string()).collect(),
            _ => vec![],
        }
    }

    /// Integer value, parsing decimal strings as directories return them.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<&String> for AttributeValue {
    fn from(s: &String) -> Self {
        AttributeValue::String(s.clone())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<u32> for AttributeValue {
    fn from(i: u32) -> Self {
        AttributeValue::Integer(i64::from(i))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Array(values.into_iter().map(AttributeValue::String).collect())
    }
}

/// Search filter, rendered to the dialect's filter syntax at the session boundary.
///
/// Values are literal; escaping happens during rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Equals { attribute: String, value: String },
    /// `(attribute=value*)`
    StartsWith { attribute: String, value: String },
    /// `(attribute=*)`
    Present { attribute: String },
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn starts_with(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::StartsWith {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Named `negate` so it does not shadow `std::ops::Not`.
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }
}
