// SPDX-License-Identifier: MIT

pub mod descriptor;
pub mod events;
pub mod graph;
pub mod loader;
pub mod node;
pub mod params;
pub mod types;

pub use events::{EventSink, ExecutionEvent};
pub use graph::WorkflowEngine;
pub use node::GeneratedImage;
pub use types::{
    Edge, ExecutionResult, FailureResponse, Node, NodeKind, Values, WorkflowOutcome,
    WorkflowRequest, WorkflowResponse,
};
