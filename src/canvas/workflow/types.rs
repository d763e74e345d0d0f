// SPDX-License-Identifier: MIT

//! Wire types for workflow graphs and their results

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::kit::error::{CanvasError, ErrorKind};
use crate::kit::provider::Credentials;

/// Open property bag used for node config, resolved inputs and outputs
pub type Values = serde_json::Map<String, Value>;

/// The closed set of node types the engine knows how to run
///
/// Any other type string deserializes to [`NodeKind::Other`] and is run as
/// a passthrough.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    ImageInput,
    TextToImage,
    ImageToImage,
    StyleTransfer,
    TextOverlay,
    CropResize,
    Output,
    Other(String),
}

impl NodeKind {
    pub const KNOWN: [NodeKind; 7] = [
        NodeKind::ImageInput,
        NodeKind::TextToImage,
        NodeKind::ImageToImage,
        NodeKind::StyleTransfer,
        NodeKind::TextOverlay,
        NodeKind::CropResize,
        NodeKind::Output,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::ImageInput => "image_input",
            NodeKind::TextToImage => "text_to_image",
            NodeKind::ImageToImage => "image_to_image",
            NodeKind::StyleTransfer => "style_transfer",
            NodeKind::TextOverlay => "text_overlay",
            NodeKind::CropResize => "crop_resize",
            NodeKind::Output => "output",
            NodeKind::Other(name) => name,
        }
    }
}

impl From<&str> for NodeKind {
    fn from(value: &str) -> Self {
        match value {
            "image_input" => NodeKind::ImageInput,
            "text_to_image" => NodeKind::TextToImage,
            "image_to_image" => NodeKind::ImageToImage,
            "style_transfer" => NodeKind::StyleTransfer,
            "text_overlay" => NodeKind::TextOverlay,
            "crop_resize" => NodeKind::CropResize,
            "output" => NodeKind::Output,
            other => NodeKind::Other(other.to_string()),
        }
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        NodeKind::from(value.as_str())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the submitted graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Canvas coordinates; carried but never read by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    /// Static properties; the UI sends these as `data`
    #[serde(default, alias = "data")]
    pub config: Values,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position: None,
            config: Values::new(),
        }
    }

    /// Builder-style config setter
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }
}

/// A directed connection between two node handles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, rename = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, rename = "targetHandle", skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}-{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn handles(mut self, source_handle: &str, target_handle: &str) -> Self {
        self.source_handle = Some(source_handle.to_string());
        self.target_handle = Some(target_handle.to_string());
        self
    }

    pub fn source_handle(&self) -> Option<&str> {
        self.source_handle.as_deref().filter(|h| !h.is_empty())
    }

    pub fn target_handle(&self) -> Option<&str> {
        self.target_handle.as_deref().filter(|h| !h.is_empty())
    }
}

/// A workflow submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, alias = "api_keys")]
    pub credentials: Credentials,
}

/// Final artefact produced by one `output` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub node_id: String,
    pub image_url: String,
    pub format: String,
    pub source_path: String,
}

/// Results of a completed run keyed by sink node id
pub type Results = BTreeMap<String, ExecutionResult>;

/// What the engine hands back for a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome {
    pub execution_id: String,
    pub results: Results,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub success: bool,
    pub result: Results,
    pub execution_id: String,
    pub timestamp: String,
}

impl From<WorkflowOutcome> for WorkflowResponse {
    fn from(outcome: WorkflowOutcome) -> Self {
        Self {
            success: true,
            result: outcome.results,
            execution_id: outcome.execution_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Body returned when a run fails
#[derive(Debug, Clone, Serialize)]
pub struct FailureResponse {
    pub success: bool,
    pub message: String,
    pub error_kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stranded: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub timestamp: String,
}

impl FailureResponse {
    pub fn new(error: &CanvasError, execution_id: Option<String>) -> Self {
        let (node_id, node_type) = error
            .failed_node()
            .map(|(id, kind)| (Some(id.to_string()), Some(kind.to_string())))
            .unwrap_or((None, None));

        Self {
            success: false,
            message: error.to_string(),
            error_kind: error.kind(),
            node_id,
            node_type,
            stranded: error.stranded_nodes().map(<[String]>::to_vec),
            execution_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::error::WorkflowError;
    use serde_json::json;

    #[test]
    fn test_node_accepts_data_alias() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "type": "style_transfer",
            "position": {"x": 10, "y": 20},
            "data": {"style": "neon", "label": "Neon"}
        }))
        .unwrap();

        assert_eq!(node.kind, NodeKind::StyleTransfer);
        assert_eq!(node.config["style"], "neon");
        assert_eq!(node.config["label"], "Neon");
    }

    #[test]
    fn test_unknown_kind_round_trips_name() {
        let node: Node = serde_json::from_value(json!({"id": "x", "type": "sharpen"})).unwrap();
        assert_eq!(node.kind, NodeKind::Other("sharpen".into()));
        assert!(node.config.is_empty());
        assert_eq!(serde_json::to_value(&node).unwrap()["type"], "sharpen");
    }

    #[test]
    fn test_edge_ui_fields_ignored() {
        let edge: Edge = serde_json::from_value(json!({
            "id": "e1",
            "source": "a",
            "target": "b",
            "sourceHandle": "image",
            "targetHandle": "",
            "animated": true,
            "label": "flow"
        }))
        .unwrap();

        assert_eq!(edge.source_handle(), Some("image"));
        assert_eq!(edge.target_handle(), None);
    }

    #[test]
    fn test_request_api_keys_alias() {
        let req: WorkflowRequest = serde_json::from_value(json!({
            "nodes": [],
            "api_keys": {"openai": "sk-test"}
        }))
        .unwrap();

        assert!(req.edges.is_empty());
        assert_eq!(req.credentials.resolve("openai").unwrap(), "sk-test");
    }

    #[test]
    fn test_failure_response_names_node() {
        let err = CanvasError::from(WorkflowError::NodeFailed {
            node_id: "gen".into(),
            node_type: "text_to_image".into(),
            source: Box::new(CanvasError::missing("gen", "prompt")),
        });

        let body = serde_json::to_value(FailureResponse::new(&err, Some("e1".into()))).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "configuration");
        assert_eq!(body["node_id"], "gen");
        assert_eq!(body["node_type"], "text_to_image");
        assert!(body["message"].as_str().unwrap().contains("prompt"));
    }
}
