use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded frame from the runner's event stream.
///
/// Produced by the remote engine, consumed exactly once in arrival order.
/// Unknown `type` tags fail deserialization and are dropped by the decoder
/// as malformed frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    NodeStart {
        node_id: String,
    },
    NodeEnd {
        node_id: String,
        step_number: u64,
        /// Captured channel state after this node ran.
        state: Value,
    },
    /// Terminal success. Some runner versions emit `graph_complete`.
    #[serde(alias = "graph_complete")]
    Complete {
        output: Value,
    },
    /// The run suspended at an interrupt node awaiting human input.
    /// A valid suspend point, not an error.
    Interrupted {
        session_id: String,
        #[serde(default)]
        checkpoint_id: Option<String>,
        interrupt_value: Value,
    },
    Error {
        message: String,
    },
}

/// Opaque identifiers correlating a suspended run with its resume request.
///
/// Created only by an `interrupted` event; invalidated once a resumed run
/// produces its next interrupt or terminal event. At most one lives per
/// execution session.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptSession {
    pub session_id: String,
    pub thread_id: Option<String>,
    pub checkpoint_id: Option<String>,
    pub interrupt_value: Value,
}

/// Fan-out of decoded run events over a tokio broadcast channel.
/// All subscribers receive every event of the current run; a subscriber
/// that falls more than the buffer behind sees `Lagged` and loses the
/// oldest events, never blocks the run.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<ExecutionEvent>,
}

/// A run emits two events per node step plus one terminal; this buffers
/// a few hundred steps for slow subscribers like a terminal printer.
const DEFAULT_BUS_CAPACITY: usize = 512;

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: ExecutionEvent) {
        // Skip the clone into the ring buffer when nobody is listening
        if self.tx.receiver_count() == 0 {
            return;
        }
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
