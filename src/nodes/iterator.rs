//! The resumable iterator contract and the two shared sub-iterators.
//!
//! Every node drives the conversation through a small, explicit state
//! machine: a node reference, an integer-ish cursor and a few counters. No
//! generators — a parked multi-turn computation stays a plain value that
//! can be inspected or serialized between turns.

use serde_json::json;

use crate::error::FlowResult;
use crate::graph::NodeRef;
use crate::nlu::Understanding;
use crate::nodes::start::find_triggered_graph;
use crate::nodes::utils::{choose, match_option};
use crate::nodes::{conn_trace, resolve};
use crate::session::FlowCtx;

/// Stock pull-back phrase when a forwarding node has none configured.
pub(crate) const FALLBACK_CALLBACK: &str = "我没有理解您的意思，请换个说法试试。";
/// Stock phrase re-presenting literal options.
pub(crate) const OPTION_CALLBACK: &str =
    "我没有理解您的意思，请您在选项中进行选择，或者接着询问其他问题。";

/// What one advance of a node iterator produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Reply to the user; the iterator is parked awaiting the next utterance.
    Reply(String),
    /// In-flow knowledge-base detour: answer from the FAQ, keep the iterator
    /// parked at its current state.
    Faq,
    /// Hand control to another node without consuming an utterance.
    Goto(NodeRef),
    /// Keep driving this iterator within the same turn.
    Continue,
    /// The flow ended with no answer; the turn loop re-triggers.
    End,
}

/// Intent-based forwarding shared by start, user-input and say nodes, and
/// used with `use_default = false` as the mid-fill "jump out" probe.
#[derive(Debug)]
pub struct ForwardIter {
    node: NodeRef,
    life_cycle: i32,
    use_default: bool,
}

impl ForwardIter {
    pub(crate) fn new(node: NodeRef, life_cycle: u32, use_default: bool) -> Self {
        ForwardIter {
            node,
            life_cycle: life_cycle as i32,
            use_default,
        }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        let env = ctx.env;
        let node = resolve(env, &self.node)?;
        let candidates: Vec<String> = node.intent_child.keys().cloned().collect();

        // The original intent survives if forwarding dead-ends here.
        let origin_intent = ctx.session.latest_msg().intent.clone();
        if let Some(msg) = ctx.session.latest_msg_mut() {
            msg.resolve_among(&candidates, env.collab.interpreter.as_ref())
                .await?;
        }

        let resolved = ctx.session.latest_msg().intent.clone();
        if let Some(intent) = resolved.filter(|i| node.intent_child.contains_key(i)) {
            let child = node.intent_child[&intent];
            let intent_name = ctx.session.latest_msg().intent_name(&intent).to_string();
            let mut record = conn_trace(env, &self.node.graph_id, node, child, "intent");
            record["intent_name"] = json!(intent_name);
            ctx.session.push_trace(record);
            return Ok(Step::Goto(NodeRef::new(self.node.graph_id.clone(), child)));
        }

        if let Some(msg) = ctx.session.latest_msg_mut() {
            msg.understanding = Understanding::IntentMiss;
        }
        if !self.use_default {
            if let Some(msg) = ctx.session.latest_msg_mut() {
                msg.intent = origin_intent;
            }
            return Ok(Step::End);
        }

        let mut target = node.default_child;
        if target.is_none() && node.intent_child.len() == 1 {
            target = node.intent_child.values().next().copied();
        }
        if target.is_none() {
            if let Some(msg) = ctx.session.latest_msg_mut() {
                msg.intent = origin_intent;
            }
        }

        if self.life_cycle > 0 || target.is_none() || node.strict() {
            let phrase = choose(node.callback_words())
                .unwrap_or(FALLBACK_CALLBACK)
                .to_string();
            if let Some(msg) = ctx.session.latest_msg_mut() {
                msg.set_callback_words(phrase);
            }
            self.life_cycle -= 1;
            return Ok(Step::Faq);
        }

        // Give up re-asking: fall back to the default child, forcing the
        // default connection's intent onto the message.
        let Some(child) = target else {
            return Ok(Step::End);
        };
        ctx.session
            .push_trace(conn_trace(env, &self.node.graph_id, node, child, "default"));
        if !node.default_intent_id.is_empty() {
            if let Some(msg) = ctx.session.latest_msg_mut() {
                msg.intent = Some(node.default_intent_id.clone());
            }
        }
        Ok(Step::Goto(NodeRef::new(self.node.graph_id.clone(), child)))
    }
}

/// Literal-option routing for nodes that presented choices to the user.
#[derive(Debug)]
pub struct OptionIter {
    node: NodeRef,
    repeats_left: i32,
}

impl OptionIter {
    pub(crate) fn new(node: NodeRef, repeats_left: i32) -> Self {
        OptionIter { node, repeats_left }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        let env = ctx.env;
        let node = resolve(env, &self.node)?;
        let text = ctx.session.latest_msg().text.clone();

        let chosen = match_option(&text, node.option_child.keys()).cloned();
        if let Some(label) = chosen {
            if let Some(&child) = node.option_child.get(&label) {
                let mut record = conn_trace(env, &self.node.graph_id, node, child, "option");
                record["option_name"] = json!(text);
                record["option_list"] =
                    json!(node.option_child.keys().collect::<Vec<_>>());
                ctx.session.push_trace(record);
                return Ok(Step::Goto(NodeRef::new(self.node.graph_id.clone(), child)));
            }
        }

        // Out of repeats: the user may have pivoted topic, so probe every
        // graph's start predicate before asking yet again.
        if self.repeats_left <= 0 {
            if let Some(start) = find_triggered_graph(ctx.session, env)? {
                return Ok(Step::Goto(start));
            }
        }

        let phrase = choose(node.callback_words())
            .unwrap_or(OPTION_CALLBACK)
            .to_string();
        let options = node.options().to_vec();
        if let Some(msg) = ctx.session.latest_msg_mut() {
            msg.set_callback_words(phrase);
            msg.options = options;
        }
        self.repeats_left -= 1;
        Ok(Step::Faq)
    }
}
