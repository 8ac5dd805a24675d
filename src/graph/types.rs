use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::dsl::{
    DynamicConfig, FillSlotsConfig, JudgeConfig, RpcConfig, SayConfig, StartConfig, SwitchConfig,
    UserInputConfig,
};

/// Index of a node inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// A cross-graph node handle: jumps between graphs are plain lookups into
/// the agent's `graph_id → Graph` table, never object pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub graph_id: String,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(graph_id: impl Into<String>, node: NodeId) -> Self {
        NodeRef {
            graph_id: graph_id.into(),
            node,
        }
    }
}

/// Closed set of node kinds, each carrying its decoded payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Start(StartConfig),
    UserInput(UserInputConfig),
    FillSlots(FillSlotsConfig),
    Judge(JudgeConfig),
    Rpc(RpcConfig),
    Say(SayConfig),
    Switch(SwitchConfig),
    Dynamic(DynamicConfig),
}

impl NodeKind {
    /// Short tag used in trace records and the per-session type recorder.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Start(_) => "start",
            NodeKind::UserInput(_) => "userSay",
            NodeKind::FillSlots(_) => "fillSlot",
            NodeKind::Judge(_) => "if",
            NodeKind::Rpc(_) => "fun",
            NodeKind::Say(_) => "robotSay",
            NodeKind::Switch(_) => "jump",
            NodeKind::Dynamic(_) => "dynamic",
        }
    }
}

/// One compiled node: its payload plus resolved child links.
///
/// Child resolution priority is option > branch > intent > default.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub default_child: Option<NodeId>,
    pub intent_child: HashMap<String, NodeId>,
    pub branch_child: HashMap<String, NodeId>,
    pub option_child: HashMap<String, NodeId>,
    /// Child node → id of the connection line, for trace reporting.
    pub line_ids: HashMap<NodeId, String>,
    /// Intent id carried by the default connection, forced onto the message
    /// when a forward falls back to the default child.
    pub default_intent_id: String,
}

impl Node {
    pub(crate) fn new(id: String, name: String, kind: NodeKind) -> Self {
        Node {
            id,
            name,
            kind,
            default_child: None,
            intent_child: HashMap::new(),
            branch_child: HashMap::new(),
            option_child: HashMap::new(),
            line_ids: HashMap::new(),
            default_intent_id: String::new(),
        }
    }

    pub fn line_id(&self, child: NodeId) -> &str {
        self.line_ids.get(&child).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn has_children(&self) -> bool {
        self.default_child.is_some()
            || !self.intent_child.is_empty()
            || !self.branch_child.is_empty()
            || !self.option_child.is_empty()
    }

    /// Re-ask phrases used when intent forwarding misses.
    pub fn callback_words(&self) -> &[String] {
        match &self.kind {
            NodeKind::UserInput(c) => &c.callback_words,
            NodeKind::Say(c) => &c.callback_words,
            _ => &[],
        }
    }

    /// A strict node never gives up on re-asking.
    pub fn strict(&self) -> bool {
        match &self.kind {
            NodeKind::UserInput(c) => c.strict,
            NodeKind::Say(c) => c.strict,
            _ => false,
        }
    }

    /// Literal options this node presents, if any.
    pub fn options(&self) -> &[String] {
        match &self.kind {
            NodeKind::Say(c) => &c.options,
            _ => &[],
        }
    }
}

/// A compiled graph: an arena of nodes rooted at one start node.
#[derive(Debug, Clone)]
pub struct Graph {
    pub id: String,
    pub name: String,
    pub version: String,
    pub global_slots: HashMap<String, String>,
    pub global_params: HashMap<String, Value>,
    pub start: NodeId,
    pub(crate) nodes: Vec<Node>,
}

impl Graph {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Bounds-checked lookup, for handles that may outlive a hot swap.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn start_node(&self) -> &Node {
        self.node(self.start)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Handle to this graph's start node.
    pub fn start_ref(&self) -> NodeRef {
        NodeRef::new(self.id.clone(), self.start)
    }
}

/// All graphs loaded for one robot, kept in declaration order because
/// trigger probing walks them in that order.
#[derive(Debug, Clone, Default)]
pub struct GraphRegistry {
    order: Vec<String>,
    by_id: HashMap<String, Arc<Graph>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or hot-swap a graph. A swap keeps the original position in
    /// trigger order.
    pub fn insert(&mut self, graph: Graph) {
        let id = graph.id.clone();
        if !self.by_id.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.by_id.insert(id, Arc::new(graph));
    }

    pub fn remove(&mut self, graph_id: &str) -> Option<Arc<Graph>> {
        self.order.retain(|id| id != graph_id);
        self.by_id.remove(graph_id)
    }

    pub fn get(&self, graph_id: &str) -> Option<&Arc<Graph>> {
        self.by_id.get(graph_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Graph>> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Union of every graph's slot → ability map, used to seed new sessions.
    pub fn merged_global_slots(&self) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        for graph in self.iter() {
            for (slot, ability) in &graph.global_slots {
                merged.insert(slot.clone(), ability.clone());
            }
        }
        merged
    }

    /// Union of every graph's global params.
    pub fn merged_global_params(&self) -> HashMap<String, Value> {
        let mut merged = HashMap::new();
        for graph in self.iter() {
            for (key, value) in &graph.global_params {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}
