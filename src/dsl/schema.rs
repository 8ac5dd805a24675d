use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ================================
// Graph configuration
// ================================

/// One dialogue graph as configured by the authoring tool.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GraphConfig {
    pub graph_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Global slot name → ability (extraction capability) name.
    #[serde(default)]
    pub global_slots: HashMap<String, String>,
    /// Free-form globals seeded into every new session.
    #[serde(default)]
    pub global_params: HashMap<String, Value>,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Common node envelope. The `payload` map carries the node-type-specific
/// fields and is decoded per kind by the graph builder.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    #[serde(default)]
    pub node_name: String,
    pub node_type: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
}

impl NodeConfig {
    /// A display name for diagnostics: the configured name, else the id.
    pub fn display_name(&self) -> &str {
        if self.node_name.is_empty() {
            &self.node_id
        } else {
            &self.node_name
        }
    }
}

/// One or several intent ids routed over a single connection.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum IntentIds {
    One(String),
    Many(Vec<String>),
}

impl IntentIds {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let ids = match self {
            IntentIds::One(id) => std::slice::from_ref(id),
            IntentIds::Many(ids) => ids.as_slice(),
        };
        ids.iter().map(|s| s.as_str())
    }
}

/// A directed connection between two nodes.
///
/// At most one of `option_id`, `branch_id`, `intent_id` may be set; an
/// unmarked connection is the source node's default outgoing edge.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConnectionConfig {
    pub line_id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub intent_id: Option<IntentIds>,
    #[serde(default)]
    pub option_id: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

// ================================
// Conditions
// ================================

/// Comparison operators understood by the condition evaluator.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "isNull")]
    IsNull,
    #[serde(rename = "notNull")]
    NotNull,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "len_gt")]
    LenGt,
    #[serde(rename = "len_lt")]
    LenLt,
    #[serde(rename = "len_eq")]
    LenEq,
}

/// Where a condition clause reads its left-hand value from.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    /// The latest message's resolved intent.
    Intent,
    /// Values extracted by a named ability on the latest message.
    Entity,
    /// A global session slot.
    Global,
    /// A global session param.
    Params,
}

/// One comparison clause. `value` may be a list, in which case the clause
/// holds if any element satisfies the operator.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConditionClause {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    /// Slot / param / ability name; unused for intent clauses.
    #[serde(default)]
    pub name: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

/// OR of ANDs: the group list holds if any inner group is fully satisfied.
pub type ConditionGroups = Vec<Vec<ConditionClause>>;

// ================================
// Node payloads
// ================================

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StartConfig {
    pub condition_group: ConditionGroups,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct UserInputConfig {
    #[serde(default)]
    pub life_cycle: u32,
    #[serde(default)]
    pub callback_words: Vec<String>,
    /// A strict node keeps re-asking instead of ever falling back to the
    /// default child.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SlotSpec {
    pub slot_name: String,
    #[serde(default)]
    pub slot_alias: Option<String>,
    /// How many re-asks are allowed before a non-required slot is given up.
    pub rounds: u32,
    pub reask_words: Vec<String>,
    #[serde(default)]
    pub callback_words: Vec<String>,
    #[serde(default)]
    pub is_necessary: bool,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub warning: bool,
}

impl SlotSpec {
    pub fn alias(&self) -> &str {
        self.slot_alias.as_deref().unwrap_or(&self.slot_name)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FillSlotsConfig {
    pub slots: Vec<SlotSpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BranchSpec {
    pub branch_id: String,
    #[serde(default)]
    pub branch_name: String,
    pub conditions: ConditionGroups,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct JudgeConfig {
    pub branches: Vec<BranchSpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RpcSlotSpec {
    pub slot_name: String,
    #[serde(default)]
    pub slot_alias: Option<String>,
    pub response_field: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RpcConfig {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request parameter templates; values may reference `${slot.x}` and
    /// `${params.y}`.
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub slots: Vec<RpcSlotSpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SayBranchSpec {
    #[serde(default)]
    pub branch_name: String,
    pub conditions: ConditionGroups,
    pub content: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SayConfig {
    #[serde(default)]
    pub content: Vec<String>,
    #[serde(default)]
    pub branches: Vec<SayBranchSpec>,
    /// Literal options presented to the user; option connections route on them.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub life_cycle: u32,
    #[serde(default)]
    pub callback_words: Vec<String>,
    #[serde(default)]
    pub strict: bool,
}

/// What a switch node does when reached.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpType {
    /// Jump to another graph's start node.
    #[serde(rename = "1")]
    Flow,
    /// End the session, flagged for human hand-off.
    #[serde(rename = "2")]
    Manual,
    /// End the session as a user-initiated hangup.
    #[serde(rename = "3")]
    Hangup,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SwitchConfig {
    pub jump_type: JumpType,
    #[serde(default)]
    pub graph_id: Option<String>,
    /// One-shot transitional reply emitted before switching.
    #[serde(default)]
    pub jump_reply: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomMode {
    /// Present the one question with the configured id.
    Fixed,
    /// Sample within configured categories.
    Category,
}

impl<'de> Deserialize<'de> for RandomMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match u8::deserialize(deserializer)? {
            1 => Ok(RandomMode::Fixed),
            2 => Ok(RandomMode::Category),
            other => Err(serde::de::Error::custom(format!(
                "random_mode must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl Serialize for RandomMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            RandomMode::Fixed => serializer.serialize_u8(1),
            RandomMode::Category => serializer.serialize_u8(2),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleRule {
    Polling,
    NoRepeat,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DynamicConfig {
    pub random_mode: RandomMode,
    #[serde(default)]
    pub qes_id: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub choice: Option<usize>,
    #[serde(default)]
    pub rule: Option<SampleRule>,
}
