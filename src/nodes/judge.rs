//! Pure branch router: first satisfied branch wins, in declared order.

use serde_json::json;

use crate::error::{FlowError, FlowResult};
use crate::evaluator::judge_branch;
use crate::graph::{NodeKind, NodeRef};
use crate::nodes::iterator::Step;
use crate::nodes::{conn_trace, resolve};
use crate::session::FlowCtx;

#[derive(Debug)]
pub struct JudgeIter {
    node: NodeRef,
}

impl JudgeIter {
    pub(crate) fn new(node: NodeRef) -> Self {
        JudgeIter { node }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        let env = ctx.env;
        let node = resolve(env, &self.node)?;
        let NodeKind::Judge(config) = &node.kind else {
            return Err(FlowError::runtime(&node.name, "not a judge node"));
        };

        for branch in &config.branches {
            let satisfied = judge_branch(&ctx.session.scope(), &branch.conditions)
                .map_err(|reason| FlowError::runtime(&node.name, reason))?;
            if !satisfied {
                continue;
            }
            let child = node.branch_child.get(&branch.branch_id).copied().ok_or_else(|| {
                FlowError::runtime(
                    &node.name,
                    format!("branch `{}` has no connected child", branch.branch_id),
                )
            })?;
            ctx.session.update_trace("branch_name", json!(branch.branch_name));
            ctx.session.update_trace(
                "condition_group",
                serde_json::to_value(&branch.conditions).unwrap_or_default(),
            );
            let mut record = conn_trace(env, &self.node.graph_id, node, child, "branch");
            record["branch_name"] = json!(branch.branch_name);
            ctx.session.push_trace(record);
            return Ok(Step::Goto(NodeRef::new(self.node.graph_id.clone(), child)));
        }

        // No branch matched: the default child, else the flow ends silently
        // and the turn loop re-triggers.
        match node.default_child {
            Some(child) => {
                ctx.session
                    .push_trace(conn_trace(env, &self.node.graph_id, node, child, "default"));
                Ok(Step::Goto(NodeRef::new(self.node.graph_id.clone(), child)))
            }
            None => Ok(Step::End),
        }
    }
}
