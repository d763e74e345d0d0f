// SPDX-License-Identifier: MIT

//! Graph compilation and input routing

use std::collections::HashMap;

use super::super::descriptor::inputs_of;
use super::super::types::{Edge, Node, Values};
use crate::kit::error::{Result, WorkflowError};

/// An edge the engine chose not to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEdge {
    pub edge_id: String,
    pub reason: String,
}

impl DroppedEdge {
    fn new(edge: &Edge, reason: String) -> Self {
        Self {
            edge_id: edge.id.clone(),
            reason,
        }
    }
}

/// Nodes indexed by id with adjacency and in-degrees
pub struct Plan<'a> {
    pub nodes: HashMap<&'a str, &'a Node>,
    /// Node ids in submission order
    pub order: Vec<&'a str>,
    pub outgoing: HashMap<&'a str, Vec<&'a Edge>>,
    pub incoming: HashMap<&'a str, Vec<&'a Edge>>,
    pub in_degree: HashMap<&'a str, usize>,
    /// Edges pointing at unknown nodes
    pub dropped: Vec<DroppedEdge>,
}

impl<'a> Plan<'a> {
    pub fn build(nodes: &'a [Node], edges: &'a [Edge]) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        let mut order = Vec::with_capacity(nodes.len());
        for node in nodes {
            if index.insert(node.id.as_str(), node).is_some() {
                return Err(WorkflowError::DuplicateNode(node.id.clone()).into());
            }
            order.push(node.id.as_str());
        }

        let mut outgoing: HashMap<&str, Vec<&Edge>> = HashMap::new();
        let mut incoming: HashMap<&str, Vec<&Edge>> = HashMap::new();
        let mut in_degree: HashMap<&str, usize> = order.iter().map(|id| (*id, 0)).collect();
        let mut dropped = Vec::new();

        for edge in edges {
            let missing: Vec<&str> = [edge.source.as_str(), edge.target.as_str()]
                .into_iter()
                .filter(|id| !index.contains_key(id))
                .collect();
            if !missing.is_empty() {
                log::warn!(
                    "Dropping edge '{}' ({} -> {}): unknown node(s) {:?}",
                    edge.id,
                    edge.source,
                    edge.target,
                    missing
                );
                dropped.push(DroppedEdge::new(
                    edge,
                    format!("references unknown node(s): {}", missing.join(", ")),
                ));
                continue;
            }

            outgoing.entry(edge.source.as_str()).or_default().push(edge);
            incoming.entry(edge.target.as_str()).or_default().push(edge);
            *in_degree.entry(edge.target.as_str()).or_default() += 1;
        }

        Ok(Self {
            nodes: index,
            order,
            outgoing,
            incoming,
            in_degree,
            dropped,
        })
    }

    /// Nodes with no incoming edges, in submission order
    pub fn roots(&self) -> Vec<&'a str> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.in_degree.get(id).copied().unwrap_or(0) == 0)
            .collect()
    }

    /// Route upstream outputs into the inputs of `node_id`
    ///
    /// Edges whose input name or value cannot be determined are reported
    /// and skipped; later edges win when two feed the same input.
    pub fn resolve_inputs(
        &self,
        node_id: &str,
        outputs: &HashMap<&str, Values>,
    ) -> (Values, Vec<DroppedEdge>) {
        let mut inputs = Values::new();
        let mut dropped = Vec::new();

        let Some(node) = self.nodes.get(node_id) else {
            return (inputs, dropped);
        };

        for edge in self.incoming.get(node_id).into_iter().flatten() {
            let input_name = match edge.target_handle() {
                Some(handle) => handle.to_string(),
                None => match inputs_of(&node.kind) {
                    [only] => only.to_string(),
                    declared => {
                        let reason = format!(
                            "no targetHandle and type '{}' declares {} inputs",
                            node.kind,
                            declared.len()
                        );
                        log::warn!("Dropping edge '{}' into {}: {}", edge.id, node_id, reason);
                        dropped.push(DroppedEdge::new(edge, reason));
                        continue;
                    }
                },
            };

            let source_outputs = outputs.get(edge.source.as_str());
            let value = source_outputs.and_then(|out| {
                edge.source_handle()
                    .and_then(|h| out.get(h))
                    .or_else(|| (out.len() == 1).then(|| out.values().next()).flatten())
                    .or_else(|| out.get(&input_name))
            });

            match value {
                Some(value) => {
                    inputs.insert(input_name, value.clone());
                }
                None => {
                    let reason = format!(
                        "source '{}' has no output for '{}' (sourceHandle {:?})",
                        edge.source,
                        input_name,
                        edge.source_handle()
                    );
                    log::warn!("Dropping edge '{}' into {}: {}", edge.id, node_id, reason);
                    dropped.push(DroppedEdge::new(edge, reason));
                }
            }
        }

        (inputs, dropped)
    }
}
