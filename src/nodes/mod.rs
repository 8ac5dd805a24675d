//! The node catalog.
//!
//! Each node kind contributes one resumable iterator; [`NodeIter`] is the
//! closed sum over them so the turn loop stays exhaustive when a kind is
//! added.

pub mod dynamic;
pub mod fill_slots;
pub mod iterator;
pub mod judge;
pub mod rpc_call;
pub mod say;
pub mod start;
pub mod switch;
pub mod user_input;
pub mod utils;

use serde_json::{json, Value};

use crate::error::{FlowError, FlowResult};
use crate::graph::{Node, NodeId, NodeKind, NodeRef};
use crate::session::state_tracker::DialogStatus;
use crate::session::{FlowCtx, TurnEnv};

pub use iterator::{ForwardIter, OptionIter, Step};

pub use dynamic::DynamicIter;
pub use fill_slots::FillSlotsIter;
pub use judge::JudgeIter;
pub use rpc_call::RpcIter;
pub use say::SayIter;
pub use start::StartIter;
pub use switch::SwitchIter;
pub use user_input::UserInputIter;

/// Resolve a node handle against the turn's graph snapshot.
pub(crate) fn resolve<'a>(env: &'a TurnEnv, nref: &NodeRef) -> FlowResult<&'a Node> {
    let graph = env
        .graphs
        .get(&nref.graph_id)
        .ok_or_else(|| FlowError::GraphNotFound(nref.graph_id.clone()))?;
    graph.get_node(nref.node).ok_or_else(|| {
        FlowError::runtime(
            &nref.graph_id,
            format!("node index {} no longer exists", nref.node.0),
        )
    })
}

/// Trace record for taking one connection.
pub(crate) fn conn_trace(
    env: &TurnEnv,
    graph_id: &str,
    node: &Node,
    child: NodeId,
    conn_type: &str,
) -> Value {
    let target_name = env
        .graphs
        .get(graph_id)
        .and_then(|g| g.get_node(child))
        .map(|n| n.name.clone())
        .unwrap_or_default();
    json!({
        "type": "conn",
        "conn_type": conn_type,
        "line_id": node.line_id(child),
        "source_node_name": node.name,
        "target_node_name": target_name,
    })
}

/// One active node computation.
#[derive(Debug)]
pub enum NodeIter {
    Start(StartIter),
    UserInput(UserInputIter),
    FillSlots(FillSlotsIter),
    Judge(JudgeIter),
    Rpc(RpcIter),
    Say(SayIter),
    Switch(SwitchIter),
    Dynamic(DynamicIter),
}

impl NodeIter {
    /// Instantiate the iterator for a node, recording the node-visit trace
    /// template and any entry side effects (start marking, say hangup).
    pub fn new(nref: NodeRef, ctx: &mut FlowCtx<'_>) -> FlowResult<NodeIter> {
        let env = ctx.env;
        let node = resolve(env, &nref)?;

        let mut record = json!({"type": node.kind.tag(), "node_name": node.name});
        match &node.kind {
            NodeKind::Start(config) => {
                let (graph_name, version) = env
                    .graphs
                    .get(&nref.graph_id)
                    .map(|g| (g.name.clone(), g.version.clone()))
                    .unwrap_or_default();
                record["graph_name"] = json!(graph_name);
                record["version"] = json!(version);
                record["trigger_method"] = json!("intent_and_params");
                record["global"] = serde_json::to_value(&ctx.session.params).unwrap_or_default();
                record["condition_group"] =
                    serde_json::to_value(&config.condition_group).unwrap_or_default();
            }
            NodeKind::FillSlots(_) => {
                record["info"] = json!([]);
            }
            NodeKind::Say(_) => {
                record["is_end"] = json!(false);
            }
            _ => {}
        }
        ctx.session.push_trace(record);

        let iter = match &node.kind {
            NodeKind::Start(_) => {
                if let Some(msg) = ctx.session.latest_msg_mut() {
                    msg.is_start = true;
                }
                NodeIter::Start(StartIter::new(nref))
            }
            NodeKind::UserInput(config) => {
                NodeIter::UserInput(UserInputIter::new(nref, config.life_cycle))
            }
            NodeKind::FillSlots(_) => NodeIter::FillSlots(FillSlotsIter::new(nref)),
            NodeKind::Judge(_) => NodeIter::Judge(JudgeIter::new(nref)),
            NodeKind::Rpc(_) => NodeIter::Rpc(RpcIter::new(nref)),
            NodeKind::Say(_) => {
                // A reply node with nowhere to go hangs up the robot. An
                // earlier transfer flag on this turn wins over the hangup.
                if !node.has_children() {
                    ctx.session.is_end = true;
                    if ctx.session.dialog_status == DialogStatus::Normal {
                        ctx.session.dialog_status = DialogStatus::Hangup;
                    }
                    ctx.session.update_trace("is_end", json!(true));
                }
                NodeIter::Say(SayIter::new(nref))
            }
            NodeKind::Switch(_) => NodeIter::Switch(SwitchIter::new(nref)),
            NodeKind::Dynamic(_) => NodeIter::Dynamic(DynamicIter::new(nref)),
        };
        Ok(iter)
    }

    pub async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        match self {
            NodeIter::Start(iter) => iter.advance(ctx).await,
            NodeIter::UserInput(iter) => iter.advance(ctx).await,
            NodeIter::FillSlots(iter) => iter.advance(ctx).await,
            NodeIter::Judge(iter) => iter.advance(ctx).await,
            NodeIter::Rpc(iter) => iter.advance(ctx).await,
            NodeIter::Say(iter) => iter.advance(ctx).await,
            NodeIter::Switch(iter) => iter.advance(ctx).await,
            NodeIter::Dynamic(iter) => iter.advance(ctx).await,
        }
    }
}
