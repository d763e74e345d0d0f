// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module compiles submitted nodes and edges into a [`Plan`] and runs
//! it with the [`WorkflowEngine`].

pub mod executor;
mod plan;

pub use executor::WorkflowEngine;
pub use plan::{DroppedEdge, Plan};
