// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! Nodes run in Kahn order: the ready frontier (nodes whose upstream
//! nodes have all finished) is drained, optionally concurrently, then
//! outputs are recorded and downstream in-degrees decremented in frontier
//! order. The first failing node aborts the run.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::future::try_join_all;

use super::plan::{DroppedEdge, Plan};
use crate::canvas::workflow::events::{EventSink, ExecutionEvent};
use crate::canvas::workflow::node::{
    GeneratedImage, NodeExecutor, FINAL_IMAGE_PATH, FINAL_IMAGE_URL,
};
use crate::canvas::workflow::params::{OutputParams, Params};
use crate::canvas::workflow::types::{
    Edge, ExecutionResult, Node, NodeKind, Results, Values, WorkflowOutcome, WorkflowRequest,
};
use crate::kit::config::Settings;
use crate::kit::error::{CanvasError, Result, WorkflowError};
use crate::kit::provider::{
    Credentials, GenerationRequest, HttpProviderFactory, ProviderFactory,
};
use crate::kit::storage::Storage;
use crate::kit::transform::TransformService;

/// Executes workflow graphs; cheap to share behind an `Arc`
pub struct WorkflowEngine {
    executor: NodeExecutor,
    parallel: bool,
}

impl WorkflowEngine {
    /// Create an engine that builds providers with `providers`
    pub fn new(settings: &Settings, providers: Arc<dyn ProviderFactory>) -> Result<Self> {
        let storage = Storage::new(settings)?;
        let transforms = TransformService::new(storage, settings.font_path.as_deref());
        Ok(Self {
            executor: NodeExecutor::new(transforms, providers),
            parallel: settings.parallel_nodes,
        })
    }

    /// Create an engine that talks to the real provider APIs
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let factory =
            HttpProviderFactory::new(settings.endpoints.clone(), settings.provider_timeout);
        Self::new(settings, Arc::new(factory))
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn storage(&self) -> &Storage {
        self.executor.storage()
    }

    /// Fresh execution id
    pub fn new_execution_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Run a graph under a fresh execution id
    pub async fn execute(
        &self,
        nodes: &[Node],
        edges: &[Edge],
        credentials: &Credentials,
    ) -> Result<WorkflowOutcome> {
        let execution_id = Self::new_execution_id();
        self.execute_with(&execution_id, nodes, edges, credentials, &EventSink::none())
            .await
    }

    /// Generate a single image without a graph; `image` selects image-to-image
    pub async fn generate(
        &self,
        provider: &str,
        credentials: &Credentials,
        request: GenerationRequest,
        image: Option<&str>,
    ) -> Result<GeneratedImage> {
        self.executor
            .generate_direct(provider, credentials, request, image)
            .await
    }

    /// Run a submitted request under a fresh execution id
    pub async fn execute_request(&self, request: &WorkflowRequest) -> Result<WorkflowOutcome> {
        self.execute(&request.nodes, &request.edges, &request.credentials)
            .await
    }

    /// Run a graph, reporting progress to `events`
    pub async fn execute_with(
        &self,
        execution_id: &str,
        nodes: &[Node],
        edges: &[Edge],
        credentials: &Credentials,
        events: &EventSink,
    ) -> Result<WorkflowOutcome> {
        events
            .emit(ExecutionEvent::Started {
                execution_id: execution_id.to_string(),
            })
            .await;

        match self.run(execution_id, nodes, edges, credentials, events).await {
            Ok(results) => {
                events
                    .emit(ExecutionEvent::Finished {
                        execution_id: execution_id.to_string(),
                        results: results.clone(),
                    })
                    .await;
                Ok(WorkflowOutcome {
                    execution_id: execution_id.to_string(),
                    results,
                })
            }
            Err(e) => {
                events
                    .emit(ExecutionEvent::Failed {
                        message: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        execution_id: &str,
        nodes: &[Node],
        edges: &[Edge],
        credentials: &Credentials,
        events: &EventSink,
    ) -> Result<Results> {
        let plan = Plan::build(nodes, edges)?;
        report_dropped(events, &plan.dropped).await;

        log::info!(
            "Execution {}: {} nodes, {} edges",
            execution_id,
            plan.order.len(),
            edges.len() - plan.dropped.len()
        );

        let mut in_degree = plan.in_degree.clone();
        let mut ready: VecDeque<&str> = plan.roots().into();
        let mut outputs: HashMap<&str, Values> = HashMap::new();
        let mut inputs_by_node: HashMap<&str, Values> = HashMap::new();
        let mut executed: Vec<&str> = Vec::with_capacity(plan.order.len());

        while !ready.is_empty() {
            let frontier: Vec<&str> = ready.drain(..).collect();

            let mut prepared = Vec::with_capacity(frontier.len());
            for node_id in &frontier {
                let (inputs, dropped) = plan.resolve_inputs(node_id, &outputs);
                report_dropped(events, &dropped).await;
                prepared.push((plan.nodes[node_id], inputs));
            }

            let produced = if self.parallel && prepared.len() > 1 {
                log::info!("Running {} nodes concurrently: {:?}", prepared.len(), frontier);
                try_join_all(prepared.iter().map(|(node, inputs)| {
                    self.run_node(node, inputs, credentials, execution_id, events)
                }))
                .await?
            } else {
                let mut produced = Vec::with_capacity(prepared.len());
                for (node, inputs) in &prepared {
                    produced.push(
                        self.run_node(node, inputs, credentials, execution_id, events)
                            .await?,
                    );
                }
                produced
            };

            for ((node, inputs), node_outputs) in prepared.into_iter().zip(produced) {
                let node_id = node.id.as_str();
                events
                    .emit(ExecutionEvent::NodeCompleted {
                        node_id: node_id.to_string(),
                        outputs: node_outputs.clone(),
                    })
                    .await;

                outputs.insert(node_id, node_outputs);
                inputs_by_node.insert(node_id, inputs);
                executed.push(node_id);

                for edge in plan.outgoing.get(node_id).into_iter().flatten() {
                    let target = edge.target.as_str();
                    if let Some(degree) = in_degree.get_mut(target) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.push_back(target);
                        }
                    }
                }
            }
        }

        if executed.len() < plan.order.len() {
            let stranded: Vec<String> = plan
                .order
                .iter()
                .filter(|id| !outputs.contains_key(*id))
                .map(|id| id.to_string())
                .collect();
            log::error!("Execution {} stranded nodes {:?}", execution_id, stranded);
            return Err(WorkflowError::Stranded(stranded).into());
        }

        let mut results = Results::new();
        for node_id in executed {
            let node = plan.nodes[node_id];
            if node.kind != NodeKind::Output {
                continue;
            }
            let produced = &outputs[node_id];
            let Some(image_url) = produced.get(FINAL_IMAGE_URL).and_then(|v| v.as_str()) else {
                continue;
            };
            let inputs = &inputs_by_node[node_id];
            results.insert(
                node_id.to_string(),
                ExecutionResult {
                    node_id: node_id.to_string(),
                    image_url: image_url.to_string(),
                    format: OutputParams::format_of(&Params::new(node, inputs)),
                    source_path: produced
                        .get(FINAL_IMAGE_PATH)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                },
            );
        }

        log::info!(
            "Execution {} finished with {} result(s)",
            execution_id,
            results.len()
        );
        Ok(results)
    }

    async fn run_node(
        &self,
        node: &Node,
        inputs: &Values,
        credentials: &Credentials,
        execution_id: &str,
        events: &EventSink,
    ) -> Result<Values> {
        log::info!("Executing node {} ({})", node.id, node.kind);
        events
            .emit(ExecutionEvent::NodeStarted {
                node_id: node.id.clone(),
                node_type: node.kind.to_string(),
            })
            .await;

        self.executor
            .execute(node, inputs, credentials, execution_id)
            .await
            .map_err(|e| {
                log::error!("Node {} ({}) failed: {}", node.id, node.kind, e);
                CanvasError::from(WorkflowError::NodeFailed {
                    node_id: node.id.clone(),
                    node_type: node.kind.to_string(),
                    source: Box::new(e),
                })
            })
    }
}

async fn report_dropped(events: &EventSink, dropped: &[DroppedEdge]) {
    for edge in dropped {
        events
            .emit(ExecutionEvent::EdgeDropped {
                edge_id: edge.edge_id.clone(),
                reason: edge.reason.clone(),
            })
            .await;
    }
}
