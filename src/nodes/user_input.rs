//! Pure intent router: wait for the user, re-classify, forward.

use crate::error::FlowResult;
use crate::graph::NodeRef;
use crate::nodes::iterator::{ForwardIter, Step};
use crate::session::FlowCtx;

#[derive(Debug)]
pub struct UserInputIter {
    forward: ForwardIter,
}

impl UserInputIter {
    pub(crate) fn new(node: NodeRef, life_cycle: u32) -> Self {
        UserInputIter {
            forward: ForwardIter::new(node, life_cycle, true),
        }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        self.forward.advance(ctx).await
    }
}
