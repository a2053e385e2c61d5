//! The generic configuration tree.
//!
//! [`ConfigTree`] is a tagged union of scalars, ordered entry lists and
//! field maps. It is the single representation used for desired state,
//! observed state and external state, regardless of device schema.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A node of a configuration tree.
///
/// Trees convert losslessly to and from [`serde_json::Value`] and serialize
/// as plain JSON.
///
/// ```
/// # use netconverge::tree::ConfigTree;
/// let tree = ConfigTree::from(serde_json::json!({"port": {"admin-state": "enable"}}));
/// assert_eq!(tree.get("port").and_then(|p| p.get("admin-state")), Some(&ConfigTree::from("enable")));
/// assert!(tree.is_map());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum ConfigTree {
    // Scalars
    /// Null/absent value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// JSON number, integer or float
    Number(Number),
    /// Text value
    Text(String),

    // Containers
    /// Ordered list of entries
    List(Vec<ConfigTree>),
    /// Map of field name to child node
    Map(BTreeMap<String, ConfigTree>),
}

impl ConfigTree {
    /// Creates an empty map node.
    pub fn empty_map() -> Self {
        ConfigTree::Map(BTreeMap::new())
    }

    /// Returns true if this node terminates recursion.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ConfigTree::Null | ConfigTree::Bool(_) | ConfigTree::Number(_) | ConfigTree::Text(_)
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ConfigTree::List(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, ConfigTree::Map(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigTree::Null)
    }

    /// Returns true for null, the empty string, and empty containers.
    pub fn is_empty_value(&self) -> bool {
        match self {
            ConfigTree::Null => true,
            ConfigTree::Text(s) => s.is_empty(),
            ConfigTree::List(l) => l.is_empty(),
            ConfigTree::Map(m) => m.is_empty(),
            ConfigTree::Bool(_) | ConfigTree::Number(_) => false,
        }
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigTree::Null => "null",
            ConfigTree::Bool(_) => "bool",
            ConfigTree::Number(_) => "number",
            ConfigTree::Text(_) => "text",
            ConfigTree::List(_) => "list",
            ConfigTree::Map(_) => "map",
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigTree>> {
        match self {
            ConfigTree::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigTree]> {
        match self {
            ConfigTree::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigTree::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigTree::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigTree::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Looks up a field of a map node.
    pub fn get(&self, field: &str) -> Option<&ConfigTree> {
        self.as_map().and_then(|m| m.get(field))
    }

    /// Renders a scalar the way it appears inside a path key.
    ///
    /// Returns `None` for null and for containers, which cannot act as keys.
    pub fn key_string(&self) -> Option<String> {
        match self {
            ConfigTree::Text(s) => Some(s.clone()),
            ConfigTree::Number(n) => Some(n.to_string()),
            ConfigTree::Bool(b) => Some(b.to_string()),
            ConfigTree::Null | ConfigTree::List(_) | ConfigTree::Map(_) => None,
        }
    }

    /// Parses a tree from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(s).map(ConfigTree::from)
    }

    /// Serializes the tree to compact JSON text.
    pub fn to_json_string(&self) -> String {
        serde_json::Value::from(self.clone()).to_string()
    }
}

impl fmt::Display for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigTree::Text(s) => write!(f, "\"{s}\""),
            ConfigTree::Null => write!(f, "null"),
            ConfigTree::Bool(b) => write!(f, "{b}"),
            ConfigTree::Number(n) => write!(f, "{n}"),
            ConfigTree::List(_) | ConfigTree::Map(_) => f.write_str(&self.to_json_string()),
        }
    }
}

impl From<serde_json::Value> for ConfigTree {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ConfigTree::Null,
            serde_json::Value::Bool(b) => ConfigTree::Bool(b),
            serde_json::Value::Number(n) => ConfigTree::Number(n),
            serde_json::Value::String(s) => ConfigTree::Text(s),
            serde_json::Value::Array(items) => {
                ConfigTree::List(items.into_iter().map(ConfigTree::from).collect())
            }
            serde_json::Value::Object(fields) => ConfigTree::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, ConfigTree::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ConfigTree> for serde_json::Value {
    fn from(tree: ConfigTree) -> Self {
        match tree {
            ConfigTree::Null => serde_json::Value::Null,
            ConfigTree::Bool(b) => serde_json::Value::Bool(b),
            ConfigTree::Number(n) => serde_json::Value::Number(n),
            ConfigTree::Text(s) => serde_json::Value::String(s),
            ConfigTree::List(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            ConfigTree::Map(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

// Convenient From implementations for common types
impl From<bool> for ConfigTree {
    fn from(value: bool) -> Self {
        ConfigTree::Bool(value)
    }
}

impl From<i64> for ConfigTree {
    fn from(value: i64) -> Self {
        ConfigTree::Number(value.into())
    }
}

impl From<u32> for ConfigTree {
    fn from(value: u32) -> Self {
        ConfigTree::Number(value.into())
    }
}

impl From<String> for ConfigTree {
    fn from(value: String) -> Self {
        ConfigTree::Text(value)
    }
}

impl From<&str> for ConfigTree {
    fn from(value: &str) -> Self {
        ConfigTree::Text(value.to_string())
    }
}

impl From<Vec<ConfigTree>> for ConfigTree {
    fn from(value: Vec<ConfigTree>) -> Self {
        ConfigTree::List(value)
    }
}

impl From<BTreeMap<String, ConfigTree>> for ConfigTree {
    fn from(value: BTreeMap<String, ConfigTree>) -> Self {
        ConfigTree::Map(value)
    }
}

// PartialEq implementations for comparing scalars with primitives
impl PartialEq<str> for ConfigTree {
    fn eq(&self, other: &str) -> bool {
        self.as_text() == Some(other)
    }
}

impl PartialEq<&str> for ConfigTree {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

impl PartialEq<i64> for ConfigTree {
    fn eq(&self, other: &i64) -> bool {
        self.as_i64() == Some(*other)
    }
}

impl PartialEq<bool> for ConfigTree {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}
