use std::collections::HashMap;

use serde_json::Value;

use crate::dsl::{
    ConnectionConfig, DynamicConfig, FillSlotsConfig, GraphConfig, JudgeConfig, JumpType,
    NodeConfig, RandomMode, RpcConfig, SayConfig, StartConfig, SwitchConfig, UserInputConfig,
};
use crate::error::{CheckResult, StaticCheckError};
use crate::graph::types::{Graph, Node, NodeId, NodeKind};

/// Compile one raw graph configuration into a linked node arena.
///
/// Every static-check failure aborts this graph only; the caller decides
/// whether to keep serving other graphs.
pub fn build_graph(config: &GraphConfig) -> CheckResult<Graph> {
    let mut nodes = Vec::with_capacity(config.nodes.len());
    let mut index: HashMap<String, NodeId> = HashMap::new();

    for node_config in &config.nodes {
        let kind = decode_kind(node_config)?;
        check_kind(node_config, &kind)?;
        let id = NodeId(nodes.len());
        if index.insert(node_config.node_id.clone(), id).is_some() {
            return Err(StaticCheckError::InvalidField {
                node: node_config.display_name().to_string(),
                field: "node_id".to_string(),
                reason: format!("duplicate node id `{}`", node_config.node_id),
            });
        }
        nodes.push(Node::new(
            node_config.node_id.clone(),
            node_config.display_name().to_string(),
            kind,
        ));
    }

    let starts: Vec<NodeId> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| matches!(n.kind, NodeKind::Start(_)))
        .map(|(i, _)| NodeId(i))
        .collect();
    if starts.len() != 1 {
        return Err(StaticCheckError::StartNodeCount {
            graph: config.graph_id.clone(),
            found: starts.len(),
        });
    }
    let start = starts[0];

    for conn in &config.connections {
        wire_connection(&mut nodes, &index, start, conn)?;
    }

    check_judge_branches(&nodes)?;

    Ok(Graph {
        id: config.graph_id.clone(),
        name: config.name.clone(),
        version: config.version.clone(),
        global_slots: config.global_slots.clone(),
        global_params: config.global_params.clone(),
        start,
        nodes,
    })
}

fn decode_kind(node: &NodeConfig) -> CheckResult<NodeKind> {
    let payload = Value::Object(node.payload.clone());
    let name = node.display_name();
    let wrap = |e: serde_json::Error| StaticCheckError::invalid_payload(name, e);
    match node.node_type.as_str() {
        "start" => Ok(NodeKind::Start(
            serde_json::from_value::<StartConfig>(payload).map_err(wrap)?,
        )),
        "user_input" => Ok(NodeKind::UserInput(
            serde_json::from_value::<UserInputConfig>(payload).map_err(wrap)?,
        )),
        "fill_slots" => Ok(NodeKind::FillSlots(
            serde_json::from_value::<FillSlotsConfig>(payload).map_err(wrap)?,
        )),
        "judge" => Ok(NodeKind::Judge(
            serde_json::from_value::<JudgeConfig>(payload).map_err(wrap)?,
        )),
        "rpc" => Ok(NodeKind::Rpc(
            serde_json::from_value::<RpcConfig>(payload).map_err(wrap)?,
        )),
        "say" => Ok(NodeKind::Say(
            serde_json::from_value::<SayConfig>(payload).map_err(wrap)?,
        )),
        "switch" => Ok(NodeKind::Switch(
            serde_json::from_value::<SwitchConfig>(payload).map_err(wrap)?,
        )),
        "dynamic" => Ok(NodeKind::Dynamic(
            serde_json::from_value::<DynamicConfig>(payload).map_err(wrap)?,
        )),
        other => Err(StaticCheckError::UnknownNodeType {
            node: name.to_string(),
            node_type: other.to_string(),
        }),
    }
}

/// Kind-specific semantic checks beyond what serde enforces.
fn check_kind(node: &NodeConfig, kind: &NodeKind) -> CheckResult<()> {
    let name = node.display_name();
    let invalid = |field: &str, reason: String| StaticCheckError::InvalidField {
        node: name.to_string(),
        field: field.to_string(),
        reason,
    };
    let missing = |field: &str| StaticCheckError::MissingField {
        node: name.to_string(),
        field: field.to_string(),
    };

    match kind {
        NodeKind::UserInput(c) => {
            if c.life_cycle > 0 && c.callback_words.is_empty() {
                return Err(invalid(
                    "callback_words",
                    "life_cycle and callback_words must be configured together".to_string(),
                ));
            }
        }
        NodeKind::FillSlots(c) => {
            if c.slots.is_empty() {
                return Err(invalid("slots", "slot list must not be empty".to_string()));
            }
            for slot in &c.slots {
                if slot.reask_words.is_empty() {
                    return Err(invalid(
                        "slots",
                        format!("slot `{}` has no reask_words", slot.slot_name),
                    ));
                }
            }
        }
        NodeKind::Say(c) => {
            if c.content.is_empty() && c.branches.is_empty() {
                return Err(invalid(
                    "content",
                    "a say node needs either content or branches".to_string(),
                ));
            }
            if c.life_cycle > 0 && c.callback_words.is_empty() {
                return Err(invalid(
                    "callback_words",
                    "life_cycle and callback_words must be configured together".to_string(),
                ));
            }
        }
        NodeKind::Switch(c) => {
            if c.jump_type == JumpType::Flow && c.graph_id.is_none() {
                return Err(missing("graph_id"));
            }
        }
        NodeKind::Dynamic(c) => match c.random_mode {
            RandomMode::Fixed => {
                if c.qes_id.is_none() {
                    return Err(missing("qes_id"));
                }
            }
            RandomMode::Category => {
                if c.choice.is_none() || c.rule.is_none() {
                    return Err(invalid(
                        "choice",
                        "category mode needs both choice and rule".to_string(),
                    ));
                }
            }
        },
        NodeKind::Start(_) | NodeKind::Judge(_) | NodeKind::Rpc(_) => {}
    }
    Ok(())
}

fn wire_connection(
    nodes: &mut [Node],
    index: &HashMap<String, NodeId>,
    start: NodeId,
    conn: &ConnectionConfig,
) -> CheckResult<()> {
    let source = *index
        .get(&conn.source_id)
        .ok_or_else(|| StaticCheckError::UnknownEndpoint {
            line: conn.line_id.clone(),
            end: "source",
            id: conn.source_id.clone(),
        })?;
    let target = *index
        .get(&conn.target_id)
        .ok_or_else(|| StaticCheckError::UnknownEndpoint {
            line: conn.line_id.clone(),
            end: "target",
            id: conn.target_id.clone(),
        })?;

    let markers = [
        conn.option_id.is_some(),
        conn.branch_id.is_some(),
        conn.intent_id.is_some(),
    ];
    if markers.iter().filter(|m| **m).count() > 1 {
        return Err(StaticCheckError::AmbiguousConnection {
            line: conn.line_id.clone(),
        });
    }

    // The start node is the logical root: it may only be re-entered as a
    // default child (e.g. the tail of a loop), never via a marked edge.
    if target == start && markers.iter().any(|m| *m) {
        return Err(StaticCheckError::StartAsTarget {
            line: conn.line_id.clone(),
            target: conn.target_id.clone(),
        });
    }

    let node = &mut nodes[source.0];
    node.line_ids.insert(target, conn.line_id.clone());

    if let Some(option_id) = &conn.option_id {
        node.option_child.insert(option_id.clone(), target);
    } else if let Some(branch_id) = &conn.branch_id {
        node.branch_child.insert(branch_id.clone(), target);
    } else if let Some(intent_ids) = &conn.intent_id {
        for intent_id in intent_ids.iter() {
            node.intent_child.insert(intent_id.to_string(), target);
            // Intent id "0" is the catch-all "other intent": it has no
            // training data and doubles as the default edge.
            if intent_id == "0" {
                node.default_child = Some(target);
            }
        }
    } else {
        node.default_child = Some(target);
    }

    if conn.is_default {
        node.default_child = Some(target);
        if let Some(intent_ids) = &conn.intent_id {
            if let Some(first) = intent_ids.iter().next() {
                node.default_intent_id = first.to_string();
            }
        }
    }
    Ok(())
}

/// Every branch a judge node declares must have a connected child.
fn check_judge_branches(nodes: &[Node]) -> CheckResult<()> {
    for node in nodes {
        if let NodeKind::Judge(config) = &node.kind {
            for branch in &config.branches {
                if !node.branch_child.contains_key(&branch.branch_id) {
                    return Err(StaticCheckError::DanglingBranch {
                        node: node.name.clone(),
                        branch: branch.branch_id.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
