use std::collections::VecDeque;

use flowline_core::document::{Channel, Edge, GraphDocument, Node};

/// Default bound on the undo stack; oldest snapshots are evicted first.
pub const DEFAULT_CAPACITY: usize = 50;

/// A deep copy of the document's editable content at a point in time.
///
/// Snapshots own their data outright — the live document keeps being
/// mutated by reference after capture, so structural sharing is not safe.
/// `node_counter` is deliberately excluded: it stays monotonic across
/// undo so re-added nodes never reuse an id.
#[derive(Debug, Clone)]
pub struct EditSnapshot {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    channels: Vec<Channel>,
}

impl EditSnapshot {
    fn capture(doc: &GraphDocument) -> Self {
        Self {
            nodes: doc.nodes.clone(),
            edges: doc.edges.clone(),
            channels: doc.channels.clone(),
        }
    }

    fn install(self, doc: &mut GraphDocument) {
        doc.nodes = self.nodes;
        doc.edges = self.edges;
        doc.channels = self.channels;
    }
}

/// Bounded two-stack undo/redo history over the graph document.
///
/// Call `record` with the document's current state before applying a
/// mutation. `undo`/`redo` install the adjacent snapshot into the live
/// document themselves; while they do, `record` is a no-op so the
/// replacement is never mistaken for a new edit.
#[derive(Debug, Default)]
pub struct EditHistory {
    undo: VecDeque<EditSnapshot>,
    redo: Vec<EditSnapshot>,
    applying: bool,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the document before a mutation.
    ///
    /// Any new edit after an undo discards the redo branch. No-op while a
    /// history operation is installing a snapshot.
    pub fn record(&mut self, doc: &GraphDocument) {
        if self.applying {
            return;
        }
        self.redo.clear();
        if self.undo.len() == DEFAULT_CAPACITY {
            self.undo.pop_front();
        }
        self.undo.push_back(EditSnapshot::capture(doc));
    }

    /// Restore the most recent snapshot into `doc`. Returns false when
    /// there is nothing to undo.
    pub fn undo(&mut self, doc: &mut GraphDocument) -> bool {
        let Some(snapshot) = self.undo.pop_back() else {
            return false;
        };
        self.redo.push(EditSnapshot::capture(doc));
        self.applying = true;
        snapshot.install(doc);
        self.applying = false;
        true
    }

    /// Mirror of `undo`.
    pub fn redo(&mut self, doc: &mut GraphDocument) -> bool {
        let Some(snapshot) = self.redo.pop() else {
            return false;
        };
        self.undo.push_back(EditSnapshot::capture(doc));
        self.applying = true;
        snapshot.install(doc);
        self.applying = false;
        true
    }

    /// Whether a history operation is currently replacing the document.
    pub fn is_applying(&self) -> bool {
        self.applying
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }
}
