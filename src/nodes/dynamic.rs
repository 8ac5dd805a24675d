//! Question-bank driven scripted reply.
//!
//! Content comes from an external question bank scoped by a perspective
//! filter; after presenting a question the node tries to detect a follow-up
//! intent in the user's answer (regex rules, then semantic classification,
//! then edit-distance correction for speech noise) and recurses into the
//! matching sub-questions.

use rand::seq::SliceRandom;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::dsl::RandomMode;
use crate::error::{FlowError, FlowResult};
use crate::faq::{
    IntentItem, QuestionItem, QuestionQuery, MAIN_QUESTION_PERSPECTIVE, SUB_QUESTION_PERSPECTIVE,
};
use crate::graph::{NodeKind, NodeRef};
use crate::nlu::INTENT_THRESHOLD;
use crate::nodes::iterator::{ForwardIter, Step};
use crate::nodes::utils::levenshtein;
use crate::nodes::resolve;
use crate::session::FlowCtx;

/// Session param carrying the question-library id this node draws from.
const LIBRARY_PARAM: &str = "global_question_id";

#[derive(Debug)]
pub struct DynamicIter {
    node: NodeRef,
    state: u8,
    /// Sub-question ids to present next; empty means main questions.
    next_qids: Vec<String>,
    /// Intent that led into the current sub-questions, used to filter them.
    selected_intent: Option<String>,
    /// The question the user is currently answering.
    last_asked: Option<QuestionItem>,
    /// Sampled but not yet presented questions (polling).
    queue: Vec<QuestionItem>,
    sub: Option<ForwardIter>,
}

impl DynamicIter {
    pub(crate) fn new(node: NodeRef) -> Self {
        DynamicIter {
            node,
            state: 0,
            next_qids: Vec::new(),
            selected_intent: None,
            last_asked: None,
            queue: Vec::new(),
            sub: None,
        }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        let env = ctx.env;
        let node = resolve(env, &self.node)?;
        let NodeKind::Dynamic(config) = &node.kind else {
            return Err(FlowError::runtime(&node.name, "not a dynamic node"));
        };

        match self.state {
            // Present the next question.
            0 => {
                let library = ctx
                    .session
                    .params
                    .get(LIBRARY_PARAM)
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .ok_or_else(|| {
                        FlowError::runtime(
                            &node.name,
                            format!("dynamic node requires the `{LIBRARY_PARAM}` param"),
                        )
                    })?;

                let marker = if self.next_qids.is_empty() {
                    MAIN_QUESTION_PERSPECTIVE
                } else {
                    SUB_QUESTION_PERSPECTIVE
                };
                let should = if !self.next_qids.is_empty() {
                    self.next_qids.clone()
                } else if config.random_mode == RandomMode::Category {
                    config.categories.clone()
                } else {
                    vec![config.qes_id.clone().unwrap_or_default()]
                };
                let query = QuestionQuery {
                    robot_code: env.robot_code.clone(),
                    perspective: vec![library.clone(), marker.to_string()],
                    should_perspective: should.clone(),
                };
                let mut items = env.collab.question_bank.search_questions(&query).await?;
                if items.is_empty() {
                    return Err(FlowError::runtime(
                        &node.name,
                        format!("question library {library} has no entries for {should:?}"),
                    ));
                }
                if let Some(selected) = &self.selected_intent {
                    items.retain(|item| item.parent_intent_id.as_deref() == Some(selected));
                    if items.is_empty() {
                        // The matched intent leads to no sub-question.
                        self.state = 1;
                        return Ok(Step::Continue);
                    }
                }

                let first = if config.random_mode == RandomMode::Fixed
                    || !self.next_qids.is_empty()
                {
                    items.swap_remove(0)
                } else {
                    let k = config.choice.unwrap_or(1).max(1);
                    let mut sampled: Vec<QuestionItem> = items
                        .choose_multiple(&mut rand::thread_rng(), k)
                        .cloned()
                        .collect();
                    if sampled.is_empty() {
                        return Err(FlowError::runtime(&node.name, "empty question sample"));
                    }
                    let first = sampled.remove(0);
                    self.queue.extend(sampled);
                    first
                };

                let content = first.content.clone();
                ctx.session.update_trace("robot_says", json!(content));
                self.last_asked = Some(first);
                self.state = 1;
                Ok(Step::Reply(content))
            }
            // The user answered: look for a follow-up intent.
            1 => {
                let Some(asked) = self.last_asked.take() else {
                    return self.forward_out(ctx).await;
                };
                let text = ctx.session.latest_msg().text.clone();
                ctx.session.update_trace("user_says", json!(text));

                let detected = detect_follow_up(ctx, &asked).await?;
                fill_bound_slots(ctx, &asked, detected.as_ref());

                if let Some(intent) = &detected {
                    ctx.session.update_trace("intent", json!(intent.intent_name));
                }
                if let (Some(intent), false) = (detected, asked.child_ids.is_empty()) {
                    self.next_qids = asked.child_ids.clone();
                    self.selected_intent = Some(intent.intent_id);
                    self.state = 0;
                    return Ok(Step::Continue);
                }

                // No sub-question to enter: keep polling queued questions,
                // then forward normally.
                if let Some(next) = self.queue.pop() {
                    let content = next.content.clone();
                    ctx.session.update_trace("robot_says", json!(content));
                    self.last_asked = Some(next);
                    return Ok(Step::Reply(content));
                }
                self.forward_out(ctx).await
            }
            _ => match self.sub.as_mut() {
                Some(forward) => forward.advance(ctx).await,
                None => Ok(Step::End),
            },
        }
    }

    async fn forward_out(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        self.sub = Some(ForwardIter::new(self.node.clone(), 0, true));
        self.state = 2;
        let Some(forward) = self.sub.as_mut() else {
            return Ok(Step::End);
        };
        forward.advance(ctx).await
    }
}

/// Ordered follow-up detection: regex rules, semantic classification, then
/// edit-distance correction for speech noise on same-length utterances.
async fn detect_follow_up(
    ctx: &mut FlowCtx<'_>,
    asked: &QuestionItem,
) -> FlowResult<Option<IntentItem>> {
    if asked.intent_ids.is_empty() {
        return Ok(None);
    }
    let env = ctx.env;
    let intents = env
        .collab
        .question_bank
        .search_intents(&env.robot_code, &asked.intent_ids)
        .await?;
    let text = ctx.session.latest_msg().text.clone();

    for intent in &intents {
        for rule in &intent.rules {
            match Regex::new(rule) {
                Ok(re) if re.is_match(&text) => return Ok(Some(intent.clone())),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(rule = %rule, intent = %intent.intent_id, error = %err, "skipping malformed intent rule");
                }
            }
        }
    }

    let group: HashMap<String, Vec<String>> = intents
        .iter()
        .filter(|i| !i.examples.is_empty())
        .map(|i| (i.intent_id.clone(), i.examples.clone()))
        .collect();
    if !group.is_empty() {
        let scores = env
            .collab
            .interpreter
            .classify_intent(&text, &group)
            .await?;
        let best = scores
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((intent_id, score)) = best {
            if *score >= INTENT_THRESHOLD {
                if let Some(intent) = intents.iter().find(|i| &i.intent_id == intent_id) {
                    return Ok(Some(intent.clone()));
                }
            }
        }
    }

    // ASR noise: a same-length utterance one edit away from an example.
    let text_len = text.chars().count();
    if text_len >= 2 {
        for intent in &intents {
            let close = intent
                .examples
                .iter()
                .filter(|e| e.chars().count() == text_len)
                .any(|e| levenshtein(e, &text) <= 1);
            if close {
                return Ok(Some(intent.clone()));
            }
        }
    }
    Ok(None)
}

/// Fill the `@sys.*` slot bindings the question item declares.
fn fill_bound_slots(ctx: &mut FlowCtx<'_>, asked: &QuestionItem, detected: Option<&IntentItem>) {
    let text = ctx.session.latest_msg().text.clone();
    for binding in &asked.slot_bindings {
        match binding.entity_key.as_str() {
            "@sys.recent_usersays" => {
                ctx.session
                    .fill_slot(&binding.key, &text, &binding.name, binding.warning);
            }
            "@sys.recent_intent" => {
                if let Some(intent) = detected {
                    ctx.session.fill_slot(
                        &binding.key,
                        &intent.intent_name,
                        &binding.name,
                        binding.warning,
                    );
                }
            }
            "@sys.recent_intent_and_says" => {
                let value = detected.map(|i| i.intent_name.as_str()).unwrap_or(&text);
                ctx.session
                    .fill_slot(&binding.key, value, &binding.name, binding.warning);
            }
            _ => {}
        }
    }
}
