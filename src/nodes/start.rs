//! Graph entry node: a trigger predicate plus immediate intent forwarding.

use crate::error::{FlowError, FlowResult};
use crate::evaluator::judge_branch;
use crate::graph::{NodeKind, NodeRef};
use crate::nodes::iterator::{ForwardIter, Step};
use crate::session::{FlowCtx, SessionState, TurnEnv};

#[derive(Debug)]
pub struct StartIter {
    forward: ForwardIter,
}

impl StartIter {
    pub(crate) fn new(node: NodeRef) -> Self {
        StartIter {
            forward: ForwardIter::new(node, 0, true),
        }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        self.forward.advance(ctx).await
    }
}

/// Probe every graph's start predicate in declaration order; the first to
/// hold wins. Empty graphs never trigger.
pub(crate) fn find_triggered_graph(
    session: &SessionState,
    env: &TurnEnv,
) -> FlowResult<Option<NodeRef>> {
    for graph in env.graphs.iter() {
        if graph.node_count() == 0 {
            continue;
        }
        let start = graph.start_node();
        let NodeKind::Start(config) = &start.kind else {
            continue;
        };
        let triggered = judge_branch(&session.scope(), &config.condition_group)
            .map_err(|reason| FlowError::runtime(&start.name, reason))?;
        if triggered {
            return Ok(Some(graph.start_ref()));
        }
    }
    Ok(None)
}
