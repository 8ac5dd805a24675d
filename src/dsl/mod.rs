//! Raw graph-configuration schema and parsing.
//!
//! A dialogue graph arrives as one JSON document per graph; [`parse_graph_config`]
//! decodes it into [`GraphConfig`]. Node payloads stay as a flattened JSON map
//! until the graph builder decodes them per node kind.

pub mod schema;

pub use schema::{
    BranchSpec, ConditionClause, ConditionKind, ConditionGroups, ConnectionConfig, DynamicConfig,
    FillSlotsConfig, GraphConfig, HttpMethod, IntentIds, JudgeConfig, JumpType, NodeConfig, Operator,
    RandomMode, RpcConfig, RpcSlotSpec, SampleRule, SayBranchSpec, SayConfig, SlotSpec,
    StartConfig, SwitchConfig, UserInputConfig,
};

use crate::error::{CheckResult, StaticCheckError};

/// Parse one raw graph configuration document.
pub fn parse_graph_config(raw: &str) -> CheckResult<GraphConfig> {
    serde_json::from_str(raw).map_err(|e| StaticCheckError::ParseError(e.to_string()))
}
