//! Output assembly.
//!
//! Structured templates produce a Kubernetes `List` envelope; flat
//! templates pass their expanded text through unchanged.

use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TemplateResult;
use crate::extractor::TreeNode;

/// Envelope API version.
pub const LIST_API_VERSION: &str = "v1";

/// Envelope kind.
pub const LIST_KIND: &str = "List";

/// A `List` of resource objects.
///
/// Serializes as `apiVersion`, `kind`, `items`, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub items: Vec<Value>,
}

impl Default for ResourceList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ResourceList {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            api_version: LIST_API_VERSION.to_string(),
            kind: LIST_KIND.to_string(),
            items,
        }
    }

    /// Materialize extracted nodes, keeping their order.
    pub fn assemble<N: TreeNode>(nodes: &[N]) -> TemplateResult<Self> {
        let items = nodes
            .iter()
            .map(TreeNode::to_json)
            .collect::<TemplateResult<Vec<_>>>()?;
        Ok(Self::new(items))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Compact JSON followed by a newline.
    pub fn to_json_string(&self) -> TemplateResult<String> {
        let mut out = serde_json::to_string(self)?;
        out.push('\n');
        Ok(out)
    }
}

/// Final artifact of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputDocument {
    List(ResourceList),
    Text(String),
}

impl OutputDocument {
    /// Render the artifact as text.
    pub fn render(&self) -> TemplateResult<String> {
        match self {
            OutputDocument::List(list) => list.to_json_string(),
            OutputDocument::Text(text) => Ok(text.clone()),
        }
    }

    /// Write the rendered artifact to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> TemplateResult<()> {
        writer.write_all(self.render()?.as_bytes())?;
        Ok(())
    }

    pub fn as_list(&self) -> Option<&ResourceList> {
        match self {
            OutputDocument::List(list) => Some(list),
            OutputDocument::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutputDocument::List(_) => None,
            OutputDocument::Text(text) => Some(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_key_order() {
        let list = ResourceList::new(vec![json!({"kind": "Service", "apiVersion": "v1"})]);
        let rendered = list.to_json_string().unwrap();
        assert!(rendered.starts_with(r#"{"apiVersion":"v1","kind":"List","items":["#));
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn test_empty_list_has_items() {
        let rendered = ResourceList::default().to_json_string().unwrap();
        assert_eq!(rendered, "{\"apiVersion\":\"v1\",\"kind\":\"List\",\"items\":[]}\n");
    }

    #[test]
    fn test_round_trip() {
        let tree = json!({
            "b": {"apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"}},
            "a": {"apiVersion": "apps/v1", "kind": "Deployment"}
        });
        let nodes = vec![&tree["a"], &tree["b"]];
        let list = ResourceList::assemble(&nodes).unwrap();

        let parsed: Value = serde_json::from_str(&list.to_json_string().unwrap()).unwrap();
        assert_eq!(parsed["items"], json!([tree["a"], tree["b"]]));
        assert_eq!(serde_json::from_value::<ResourceList>(parsed).unwrap(), list);
    }

    #[test]
    fn test_text_passthrough() {
        let doc = OutputDocument::Text("services:\n  web: {}\n".to_string());
        assert_eq!(doc.render().unwrap(), "services:\n  web: {}\n");
        assert!(doc.as_list().is_none());

        let mut buf = Vec::new();
        doc.write_to(&mut buf).unwrap();
        assert_eq!(buf, b"services:\n  web: {}\n");
    }
}
