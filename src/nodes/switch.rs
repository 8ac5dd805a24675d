//! Non-conversational control transfer: jump to another graph, hand off to
//! a human, or hang up.

use serde_json::json;

use crate::dsl::JumpType;
use crate::error::{FlowError, FlowResult};
use crate::graph::{NodeKind, NodeRef};
use crate::nlu::Understanding;
use crate::nodes::iterator::Step;
use crate::nodes::resolve;
use crate::session::state_tracker::DialogStatus;
use crate::session::FlowCtx;

#[derive(Debug)]
pub struct SwitchIter {
    node: NodeRef,
    state: u8,
}

impl SwitchIter {
    pub(crate) fn new(node: NodeRef) -> Self {
        SwitchIter { node, state: 0 }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        let env = ctx.env;
        let node = resolve(env, &self.node)?;
        let NodeKind::Switch(config) = &node.kind else {
            return Err(FlowError::runtime(&node.name, "not a switch node"));
        };

        match self.state {
            0 => {
                match config.jump_type {
                    JumpType::Hangup => {
                        ctx.session.is_end = true;
                        ctx.session.dialog_status = DialogStatus::Hangup;
                    }
                    JumpType::Manual => {
                        ctx.session.is_end = true;
                        // Understood means the user asked for a human on
                        // purpose; otherwise the system gave up.
                        let understood = ctx.session.latest_msg().understanding
                            == Understanding::Understood;
                        ctx.session.dialog_status = if understood {
                            DialogStatus::UserTransfer
                        } else {
                            DialogStatus::SystemTransfer
                        };
                    }
                    JumpType::Flow => {}
                }

                let target_name = match config.jump_type {
                    JumpType::Hangup => "hangup".to_string(),
                    JumpType::Manual => "manual transfer".to_string(),
                    JumpType::Flow => config
                        .graph_id
                        .as_deref()
                        .and_then(|id| env.graphs.get(id))
                        .map(|g| g.name.clone())
                        .unwrap_or_default(),
                };
                ctx.session.update_trace(
                    "jump_type",
                    serde_json::to_value(config.jump_type).unwrap_or_default(),
                );
                ctx.session.update_trace("graph_name", json!(target_name));

                self.state = 1;
                if let Some(reply) = &config.jump_reply {
                    ctx.session.update_trace("reply", json!(reply));
                    return Ok(Step::Reply(reply.clone()));
                }
                Ok(Step::Continue)
            }
            _ => {
                if config.jump_type != JumpType::Flow {
                    return Ok(Step::End);
                }
                let graph_id = config.graph_id.as_deref().unwrap_or_default();
                let graph = env
                    .graphs
                    .get(graph_id)
                    .ok_or_else(|| FlowError::GraphNotFound(graph_id.to_string()))?;
                Ok(Step::Goto(graph.start_ref()))
            }
        }
    }
}
