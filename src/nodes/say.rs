//! Scripted reply node: pick content, say it, then route the user's answer.

use crate::error::{FlowError, FlowResult};
use crate::evaluator::judge_branch;
use crate::graph::{NodeKind, NodeRef};
use crate::nodes::iterator::{ForwardIter, OptionIter, Step};
use crate::nodes::utils::choose;
use crate::nodes::resolve;
use crate::session::FlowCtx;

#[derive(Debug)]
enum SaySub {
    Forward(ForwardIter),
    Options(OptionIter),
}

#[derive(Debug)]
pub struct SayIter {
    node: NodeRef,
    state: u8,
    sub: Option<SaySub>,
}

impl SayIter {
    pub(crate) fn new(node: NodeRef) -> Self {
        SayIter {
            node,
            state: 0,
            sub: None,
        }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        let env = ctx.env;
        let node = resolve(env, &self.node)?;
        let NodeKind::Say(config) = &node.kind else {
            return Err(FlowError::runtime(&node.name, "not a say node"));
        };

        match self.state {
            0 => {
                // Conditional content first, literal content as fallback.
                let mut content: Option<&[String]> = None;
                for branch in &config.branches {
                    let satisfied = judge_branch(&ctx.session.scope(), &branch.conditions)
                        .map_err(|reason| FlowError::runtime(&node.name, reason))?;
                    if satisfied {
                        content = Some(&branch.content);
                        break;
                    }
                }
                if content.is_none() && !config.content.is_empty() {
                    content = Some(&config.content);
                }
                let Some(content) = content else {
                    return Err(FlowError::runtime(
                        &node.name,
                        "no branch matched and no fixed content is configured",
                    ));
                };
                let text = choose(content).unwrap_or_default().to_string();
                if let Some(msg) = ctx.session.latest_msg_mut() {
                    msg.options = config.options.clone();
                }
                self.state = 1;
                Ok(Step::Reply(text))
            }
            1 => {
                self.sub = Some(if !node.option_child.is_empty() {
                    SaySub::Options(OptionIter::new(
                        self.node.clone(),
                        config.life_cycle as i32,
                    ))
                } else {
                    SaySub::Forward(ForwardIter::new(
                        self.node.clone(),
                        config.life_cycle,
                        true,
                    ))
                });
                self.state = 2;
                Ok(Step::Continue)
            }
            _ => match self.sub.as_mut() {
                Some(SaySub::Forward(forward)) => forward.advance(ctx).await,
                Some(SaySub::Options(options)) => options.advance(ctx).await,
                None => Ok(Step::End),
            },
        }
    }
}
