// SPDX-License-Identifier: MIT

//! Typed error handling for canvas-rs
//!
//! Every failure in the engine is a [`CanvasError`]. Node failures are
//! wrapped in [`WorkflowError::NodeFailed`] so callers always learn which
//! node (and of which type) aborted the run.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = CanvasError> = std::result::Result<T, E>;

/// Top-level error type for canvas-rs
#[derive(Debug, Error)]
pub enum CanvasError {
    /// A node is missing a required parameter
    #[error("Node '{node_id}' is missing required field '{field}'")]
    MissingField { node_id: String, field: String },

    /// A parameter is present but cannot be used
    #[error("Node '{node_id}' has invalid value for '{field}': {message}")]
    InvalidField {
        node_id: String,
        field: String,
        message: String,
    },

    /// No credential supplied for the requested provider
    #[error("API key for {provider} not found. Ensure it is passed with the request.")]
    MissingCredential { provider: String },

    /// Provider name does not match any adapter
    #[error("Unknown AI provider: {0}")]
    UnknownProvider(String),

    /// Configuration errors (bad settings, unsupported formats)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider was reached but reported a failure
    #[error("Generation failed for provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// An image referenced by a node no longer exists
    #[error("Image path does not exist: {}", .0.display())]
    ResourceMissing(PathBuf),

    /// Workflow-level errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Image decode/encode errors
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow-specific errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Some nodes never reached in-degree zero
    #[error(
        "Cycle detected in workflow graph or unreachable prerequisites, nodes not executed: {0:?}"
    )]
    Stranded(Vec<String>),

    /// Two nodes share an id
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// A node raised an error while executing
    #[error("Workflow execution failed at node {node_id} ({node_type}): {source}")]
    NodeFailed {
        node_id: String,
        node_type: String,
        #[source]
        source: Box<CanvasError>,
    },

    /// Workflow file not found when loading
    #[error("Workflow file not found: {0}")]
    FileNotFound(String),
}

/// Coarse classification used by the HTTP layer and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    UpstreamProvider,
    GraphIntegrity,
    ResourceMissing,
    Internal,
}

impl CanvasError {
    /// Create a missing field error
    pub fn missing(node_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            node_id: node_id.into(),
            field: field.into(),
        }
    }

    /// Create an invalid field error
    pub fn invalid(
        node_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            node_id: node_id.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a provider failure
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Classify this error, looking through node wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. }
            | Self::InvalidField { .. }
            | Self::MissingCredential { .. }
            | Self::UnknownProvider(_)
            | Self::Config(_) => ErrorKind::Configuration,
            Self::Provider { .. } => ErrorKind::UpstreamProvider,
            Self::ResourceMissing(_) => ErrorKind::ResourceMissing,
            Self::Workflow(WorkflowError::NodeFailed { source, .. }) => source.kind(),
            Self::Workflow(WorkflowError::Stranded(_))
            | Self::Workflow(WorkflowError::DuplicateNode(_)) => ErrorKind::GraphIntegrity,
            Self::Workflow(WorkflowError::FileNotFound(_)) => ErrorKind::Configuration,
            Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_)
            | Self::Http(_)
            | Self::Image(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Id and type of the node that failed, if any
    pub fn failed_node(&self) -> Option<(&str, &str)> {
        match self {
            Self::Workflow(WorkflowError::NodeFailed {
                node_id, node_type, ..
            }) => Some((node_id, node_type)),
            _ => None,
        }
    }

    /// Ids left unexecuted by a stranded graph
    pub fn stranded_nodes(&self) -> Option<&[String]> {
        match self {
            Self::Workflow(WorkflowError::Stranded(ids)) => Some(ids),
            _ => None,
        }
    }
}

impl From<&str> for CanvasError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for CanvasError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
