//! Resource extraction from evaluated templates.
//!
//! A template may nest resources under arbitrary namespaces
//! (`web.deployment`, `jobs.cron`, ...). The extractor walks the tree in
//! sorted key order and collects every object carrying the marker field,
//! optionally restricted to the subtree addressed by a [`FilterPath`].

use serde_json::Value;
use tracing::debug;

use crate::config::{FilterPath, DEFAULT_MARKER_FIELD};
use crate::error::{TemplateError, TemplateResult};

/// Shape of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
    Function,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Object => "object",
            NodeKind::Array => "array",
            NodeKind::String => "string",
            NodeKind::Number => "number",
            NodeKind::Bool => "boolean",
            NodeKind::Null => "null",
            NodeKind::Function => "function",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A navigable node of an evaluated template.
///
/// Implemented for parsed JSON and for lazily evaluated Jsonnet values, so
/// that children of pruned branches are never evaluated.
pub trait TreeNode: Sized {
    fn kind(&self) -> NodeKind;

    /// Keys of an object node. Empty for any other node.
    fn keys(&self) -> TemplateResult<Vec<String>>;

    /// Whether an object node has `key`, without evaluating its value.
    fn has_key(&self, key: &str) -> bool;

    /// Value of `key` in an object node.
    fn child(&self, key: &str) -> TemplateResult<Option<Self>>;

    /// Fully materialized JSON of this node.
    fn to_json(&self) -> TemplateResult<Value>;
}

impl<'a> TreeNode for &'a Value {
    fn kind(&self) -> NodeKind {
        match self {
            Value::Object(_) => NodeKind::Object,
            Value::Array(_) => NodeKind::Array,
            Value::String(_) => NodeKind::String,
            Value::Number(_) => NodeKind::Number,
            Value::Bool(_) => NodeKind::Bool,
            Value::Null => NodeKind::Null,
        }
    }

    fn keys(&self) -> TemplateResult<Vec<String>> {
        Ok(match self {
            Value::Object(map) => map.keys().cloned().collect(),
            Value::Array(_) | Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {
                Vec::new()
            }
        })
    }

    fn has_key(&self, key: &str) -> bool {
        match self {
            Value::Object(map) => map.contains_key(key),
            Value::Array(_) | Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {
                false
            }
        }
    }

    fn child(&self, key: &str) -> TemplateResult<Option<Self>> {
        Ok(match self {
            Value::Object(map) => map.get(key),
            Value::Array(_) | Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {
                None
            }
        })
    }

    fn to_json(&self) -> TemplateResult<Value> {
        Ok((*self).clone())
    }
}

/// Collects resource objects from a tree.
#[derive(Debug, Clone)]
pub struct ResourceExtractor {
    marker_field: String,
}

impl Default for ResourceExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_FIELD)
    }
}

impl ResourceExtractor {
    /// Create an extractor recognizing resources by `marker_field`.
    pub fn new(marker_field: impl Into<String>) -> Self {
        Self {
            marker_field: marker_field.into(),
        }
    }

    pub fn marker_field(&self) -> &str {
        &self.marker_field
    }

    /// Collect the resource nodes under `root`, in sorted key order.
    pub fn extract<N: TreeNode>(&self, root: N, filter: &FilterPath) -> TemplateResult<Vec<N>> {
        let mut items = Vec::new();
        let mut path = Vec::new();
        self.walk(root, filter.segments(), &mut path, &mut items)?;
        debug!("Extracted {} resources (filter: '{}')", items.len(), filter);
        Ok(items)
    }

    fn walk<N: TreeNode>(
        &self,
        node: N,
        filter: &[String],
        path: &mut Vec<String>,
        items: &mut Vec<N>,
    ) -> TemplateResult<()> {
        match node.kind() {
            NodeKind::Object => {}
            NodeKind::Null => return Ok(()),
            found @ (NodeKind::Array
            | NodeKind::String
            | NodeKind::Number
            | NodeKind::Bool
            | NodeKind::Function) => {
                return Err(TemplateError::Extraction {
                    path: display_path(path),
                    found: found.to_string(),
                });
            }
        }

        let mut keys = node.keys()?;
        keys.sort();

        for key in keys {
            // Non-matching branches are skipped before their value is touched.
            let rest = match filter.split_first() {
                None => filter,
                Some((head, rest)) if *head == key => rest,
                Some(_) => continue,
            };

            let child = match node.child(&key)? {
                Some(child) => child,
                None => continue,
            };

            if child.kind() == NodeKind::Object && child.has_key(&self.marker_field) {
                items.push(child);
                continue;
            }

            path.push(key);
            self.walk(child, rest, path, items)?;
            path.pop();
        }

        Ok(())
    }
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.join(".")
    }
}
