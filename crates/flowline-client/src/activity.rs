use std::collections::BTreeMap;

use serde_json::Value;

use flowline_core::event::ExecutionEvent;

/// A captured channel snapshot from one `node_end` event.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub step: u64,
    pub state: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct NodeTrace {
    active: bool,
    history: Vec<StateSnapshot>,
}

/// Per-node highlight state and snapshot history, folded from the event
/// sequence of the current run.
///
/// A pure projection: replaying the same events always produces the same
/// state, and nothing here depends on the clock or the transport. An orphan
/// `node_end` (no prior `node_start`) is applied idempotently — the engine
/// owns the ordering contract, the projection just tolerates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeActivity {
    nodes: BTreeMap<String, NodeTrace>,
}

impl NodeActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event. Events that carry no node information are ignored.
    pub fn apply(&mut self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::NodeStart { node_id } => {
                self.nodes.entry(node_id.clone()).or_default().active = true;
            }
            ExecutionEvent::NodeEnd {
                node_id,
                step_number,
                state,
            } => {
                let trace = self.nodes.entry(node_id.clone()).or_default();
                trace.active = false;
                trace.history.push(StateSnapshot {
                    step: *step_number,
                    state: state.clone(),
                });
            }
            _ => {}
        }
    }

    /// Rebuild a projection from scratch by replaying an event sequence.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a ExecutionEvent>) -> Self {
        let mut activity = Self::new();
        for event in events {
            activity.apply(event);
        }
        activity
    }

    /// Node ids currently highlighted as running.
    pub fn active(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, t)| t.active)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn is_active(&self, node_id: &str) -> bool {
        self.nodes.get(node_id).is_some_and(|t| t.active)
    }

    /// Ordered snapshot history for a node. Empty for unknown ids.
    pub fn history_of(&self, node_id: &str) -> &[StateSnapshot] {
        self.nodes
            .get(node_id)
            .map(|t| t.history.as_slice())
            .unwrap_or(&[])
    }

    /// Reset at the start of a new run.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
