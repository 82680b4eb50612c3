use crate::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::sync::broadcast;

/// Events emitted during workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: ExecutionId,
        workflow_id: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        run_id: ExecutionId,
        status: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        run_id: ExecutionId,
        node: String,
        node_type: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        run_id: ExecutionId,
        node: String,
        branch: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        run_id: ExecutionId,
        node: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    NodeRetrying {
        run_id: ExecutionId,
        node: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },
    NodeSkipped {
        run_id: ExecutionId,
        node: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        run_id: ExecutionId,
        node: String,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events raised by a handler while it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Data { name: String, value: Json },
}

/// Event emitter handed to each handler invocation
#[derive(Clone)]
pub struct EventEmitter {
    run_id: ExecutionId,
    node: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        run_id: ExecutionId,
        node: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            run_id,
            node: node.into(),
            sender,
        }
    }

    /// Emit a node-specific event. Never blocks; dropped without subscribers.
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            run_id: self.run_id,
            node: self.node.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }

    /// Publish a named payload to subscribers
    pub fn data(&self, name: impl Into<String>, value: Json) {
        self.emit(NodeEvent::Data {
            name: name.into(),
            value,
        });
    }
}

/// In-process event bus
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, run_id: ExecutionId, node: impl Into<String>) -> EventEmitter {
        EventEmitter::new(run_id, node, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
