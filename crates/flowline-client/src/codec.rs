//! Pure conversion between the editable graph document and the wire DTOs
//! exchanged with the runner. Total and side-effect-free: malformed per-node
//! config is passed through opaquely and only rejected by the remote
//! validator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use flowline_core::document::{Channel, Edge, GraphDocument, Node, NodeKind};

/// Config keys whose value may be entered as newline-delimited free text.
/// The wire schema expects arrays for these.
const LIST_FIELDS: &[&str] = &["stores", "tools", "stop_conditions"];

/// A node as sent over the wire. Presentation fields (label, position)
/// stay local.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub nodes: Vec<WireNode>,
    pub edges: Vec<Edge>,
    pub channels: Vec<Channel>,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<u32>,
}

/// A run opened with a caller-generated thread id so it can suspend at an
/// interrupt node and be resumed later.
#[derive(Debug, Clone, Serialize)]
pub struct ResumableRunRequest {
    pub thread_id: String,
    #[serde(flatten)]
    pub run: RunRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeRequest {
    pub session_id: String,
    pub resume_value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateRequest {
    pub nodes: Vec<WireNode>,
    pub edges: Vec<Edge>,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub recursion_limit: Option<u32>,
}

/// Encode a document for a plain run.
pub fn encode_run(doc: &GraphDocument, input: Value, opts: &EncodeOptions) -> RunRequest {
    RunRequest {
        nodes: wire_nodes(doc),
        edges: doc.edges.clone(),
        channels: doc.channels.clone(),
        input,
        recursion_limit: opts.recursion_limit,
    }
}

/// Encode a document for a resumable (HITL) run.
pub fn encode_resumable(
    doc: &GraphDocument,
    input: Value,
    thread_id: impl Into<String>,
    opts: &EncodeOptions,
) -> ResumableRunRequest {
    ResumableRunRequest {
        thread_id: thread_id.into(),
        run: encode_run(doc, input, opts),
    }
}

pub fn encode_validate(doc: &GraphDocument) -> ValidateRequest {
    ValidateRequest {
        nodes: wire_nodes(doc),
        edges: doc.edges.clone(),
        channels: doc.channels.clone(),
    }
}

/// Reconstruct an editable document from a saved wire graph.
///
/// Positions and config come back verbatim. An empty channel list gets the
/// default `value` channel so every document has at least one. The node
/// counter is recovered from the largest numeric id suffix so newly added
/// nodes never collide with loaded ones.
pub fn decode_saved_graph(graph: &GraphDocument) -> GraphDocument {
    let channels = if graph.channels.is_empty() {
        vec![Channel::default_value_channel()]
    } else {
        graph.channels.clone()
    };

    let node_counter = graph
        .nodes
        .iter()
        .filter_map(|n| n.id.rsplit('_').next()?.parse::<u64>().ok())
        .max()
        .max(Some(graph.node_counter))
        .unwrap_or(0);

    GraphDocument {
        nodes: graph.nodes.clone(),
        edges: graph.edges.clone(),
        channels,
        node_counter,
    }
}

fn wire_nodes(doc: &GraphDocument) -> Vec<WireNode> {
    doc.nodes
        .iter()
        .filter(|n| !n.kind.is_presentational())
        .map(|n| WireNode {
            id: n.id.clone(),
            kind: n.kind,
            config: normalize_config(n),
        })
        .collect()
}

/// Turn newline-delimited free-text list fields into arrays, dropping
/// blank entries. Everything else is passed through untouched.
fn normalize_config(node: &Node) -> serde_json::Map<String, Value> {
    let mut config = node.config.clone();
    for key in LIST_FIELDS {
        if let Some(Value::String(text)) = config.get(*key) {
            let items: Vec<Value> = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| Value::String(line.to_string()))
                .collect();
            config.insert((*key).to_string(), Value::Array(items));
        }
    }
    config
}
