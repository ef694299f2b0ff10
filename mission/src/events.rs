//! Typed notifications published while missions run.
//!
//! The bus is a `tokio::sync::broadcast` channel: publishing never blocks and
//! succeeds with zero subscribers. Slow subscribers may observe `Lagged`.

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::trace;

use crate::core::types::ToolStatus;
use crate::task::Task;

const DEFAULT_CAPACITY: usize = 256;

/// Closed set of pipeline notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MissionEvent {
    TaskAdded {
        task: Task,
    },
    TaskDone {
        task_id: u64,
    },
    TaskRemoved {
        task_id: u64,
    },
    LogReplaced {
        count: usize,
    },
    LogCleared,
    LogLoaded {
        count: usize,
    },
    ToolCallStarted {
        call_id: u64,
        tool_name: String,
        arguments: Map<String, Value>,
    },
    ToolCallFinished {
        call_id: u64,
        tool_name: String,
        status: ToolStatus,
        message: String,
    },
    FileTreeChanged,
    MissionStarted {
        task_count: usize,
    },
    MissionAccomplished {
        executed: usize,
    },
    MissionFailed {
        task_id: Option<u64>,
        error: String,
    },
    SelfCorrectionStarted {
        attempt: u32,
        max_attempts: u32,
    },
    SelfCorrectionExhausted {
        attempts: u32,
        report: String,
    },
    /// Phase transition of an agent (architect, coder, tester, finalizer, repair).
    Status {
        agent: String,
        message: String,
    },
    /// Streamed code fragment for a file being generated.
    CodeChunk {
        filename: String,
        chunk: String,
    },
}

impl MissionEvent {
    pub fn status(agent: &str, message: impl Into<String>) -> Self {
        Self::Status {
            agent: agent.to_string(),
            message: message.into(),
        }
    }
}

/// Cloneable handle to the shared broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MissionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: MissionEvent) {
        if self.sender.send(event).is_err() {
            trace!("event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MissionEvent> {
        self.sender.subscribe()
    }
}

/// Collect every event currently buffered in `receiver` without waiting.
pub fn drain(receiver: &mut broadcast::Receiver<MissionEvent>) -> Vec<MissionEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}
