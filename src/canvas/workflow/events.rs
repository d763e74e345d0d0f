// SPDX-License-Identifier: MIT

//! Progress events emitted while a workflow runs

use serde::Serialize;
use tokio::sync::mpsc;

use super::types::{Results, Values};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Started {
        execution_id: String,
    },
    NodeStarted {
        node_id: String,
        node_type: String,
    },
    NodeCompleted {
        node_id: String,
        outputs: Values,
    },
    EdgeDropped {
        edge_id: String,
        reason: String,
    },
    Finished {
        execution_id: String,
        results: Results,
    },
    Failed {
        message: String,
    },
}

impl ExecutionEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::Started { .. } => "started",
            ExecutionEvent::NodeStarted { .. } => "node_started",
            ExecutionEvent::NodeCompleted { .. } => "node_completed",
            ExecutionEvent::EdgeDropped { .. } => "edge_dropped",
            ExecutionEvent::Finished { .. } => "finished",
            ExecutionEvent::Failed { .. } => "failed",
        }
    }
}

/// Optional event channel; a closed or absent receiver is not an error
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<mpsc::Sender<ExecutionEvent>>);

impl EventSink {
    pub fn new(sender: mpsc::Sender<ExecutionEvent>) -> Self {
        Self(Some(sender))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub async fn emit(&self, event: ExecutionEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = ExecutionEvent::EdgeDropped {
            edge_id: "e1".into(),
            reason: "unknown node".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "edge_dropped");
        assert_eq!(json["edge_id"], "e1");
        assert_eq!(event.name(), "edge_dropped");
    }

    #[tokio::test]
    async fn test_emit_ignores_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        EventSink::new(tx)
            .emit(ExecutionEvent::Failed {
                message: "x".into(),
            })
            .await;
        EventSink::none()
            .emit(ExecutionEvent::Started {
                execution_id: "e".into(),
            })
            .await;
    }
}
