use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a node in the editable graph.
///
/// `start` and `end` are presentation-only anchors: they carry no executable
/// config and are dropped from wire requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    Llm,
    Agent,
    Transform,
    Conditional,
    Interrupt,
}

impl NodeKind {
    /// Presentation-only kinds never appear in a wire request's node list.
    pub fn is_presentational(&self) -> bool {
        matches!(self, Self::Start | Self::End)
    }

    /// The snake_case wire name, also used as the id prefix for new nodes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Llm => "llm",
            Self::Agent => "agent",
            Self::Transform => "transform",
            Self::Conditional => "conditional",
            Self::Interrupt => "interrupt",
        }
    }
}

/// Canvas position of a node. Preserved verbatim across save/load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node in the editable graph document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the document.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub position: Position,
    /// Polymorphic per-kind configuration. Opaque to the client; only the
    /// remote validator rejects malformed config.
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            position: Position::default(),
            config: serde_json::Map::new(),
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn with_config(mut self, config: serde_json::Map<String, Value>) -> Self {
        self.config = config;
        self
    }
}

/// An edge connecting two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Branch label for conditional routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Execute alternatives concurrently rather than as branches.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fan_out: bool,
    /// Taken only when the source node fails.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub on_error: bool,
}

/// How an edge branches, after applying the precedence rule
/// `on_error > fan_out > condition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    OnError,
    FanOut,
    Conditional,
    Plain,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
            fan_out: false,
            on_error: false,
        }
    }

    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            condition: Some(condition.into()),
            ..Self::new(from, to)
        }
    }

    pub fn fan_out(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            fan_out: true,
            ..Self::new(from, to)
        }
    }

    pub fn on_error(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            on_error: true,
            ..Self::new(from, to)
        }
    }

    /// Resolve the branch flags into one kind. `on_error` wins over
    /// `fan_out`, which wins over a plain `condition`.
    pub fn branch_kind(&self) -> BranchKind {
        if self.on_error {
            BranchKind::OnError
        } else if self.fan_out {
            BranchKind::FanOut
        } else if self.condition.is_some() {
            BranchKind::Conditional
        } else {
            BranchKind::Plain
        }
    }
}

/// Channel reducer semantics on the runner side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    #[default]
    LastValue,
    Append,
}

/// A named state channel shared between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Unique within the document.
    pub key: String,
    #[serde(rename = "type", default)]
    pub kind: ChannelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Channel {
    pub fn new(key: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            key: key.into(),
            kind,
            default: None,
        }
    }

    /// The channel every document is guaranteed to have.
    pub fn default_value_channel() -> Self {
        Self::new("value", ChannelKind::LastValue)
    }
}

/// The editable graph document.
///
/// Owned by the editor; mutated only through the explicit edit operations
/// below. The execution path never writes to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub channels: Vec<Channel>,
    /// Monotonic counter used to mint unique node ids.
    #[serde(default)]
    pub node_counter: u64,
}

impl GraphDocument {
    pub fn new() -> Self {
        Self {
            channels: vec![Channel::default_value_channel()],
            ..Self::default()
        }
    }

    /// Add a node of the given kind, minting an id from the counter.
    /// Returns the new node's id.
    pub fn add_node(&mut self, kind: NodeKind, label: impl Into<String>) -> String {
        self.node_counter += 1;
        let id = format!("{}_{}", kind.as_str(), self.node_counter);
        self.nodes.push(Node::new(id.clone(), kind, label));
        id
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) {
        self.nodes.retain(|n| n.id != id);
        self.edges.retain(|e| e.from != id && e.to != id);
    }

    /// Replace a node's label and config. Unknown ids are ignored.
    pub fn update_node(
        &mut self,
        id: &str,
        label: impl Into<String>,
        config: serde_json::Map<String, Value>,
    ) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.label = label.into();
            node.config = config;
        }
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) {
        self.edges.retain(|e| !(e.from == from && e.to == to));
    }

    pub fn add_channel(&mut self, channel: Channel) {
        self.channels.push(channel);
    }

    pub fn remove_channel(&mut self, key: &str) {
        self.channels.retain(|c| c.key != key);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
