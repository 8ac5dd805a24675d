//! Per-session state and the turn loop.
//!
//! The trampoline drives the active node iterator until it yields a reply
//! or the flow naturally ends; suspension happens only by returning to the
//! caller with the iterator parked.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{FlowError, FlowResult};
use crate::evaluator::EvalScope;
use crate::nlu::{Message, Understanding};
use crate::nodes::start::find_triggered_graph;
use crate::nodes::{NodeIter, Step};
use crate::session::{FlowCtx, TurnEnv};
use crate::template::{render, RenderScope};

/// Hard cap on node transitions within one turn; a graph cycling without
/// ever replying is a configuration bug, not a reason to spin forever.
const MAX_TRANSITIONS: usize = 256;

/// Session lifecycle status, carried on the wire as a digit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogStatus {
    #[default]
    Normal,
    /// The user asked for a human.
    UserTransfer,
    /// The system gave up and escalated.
    SystemTransfer,
    /// The robot hung up.
    Hangup,
}

impl DialogStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            DialogStatus::Normal => "0",
            DialogStatus::UserTransfer => "10",
            DialogStatus::SystemTransfer => "11",
            DialogStatus::Hangup => "20",
        }
    }
}

/// How a recorded reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Flow,
    Faq,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub kind: ReplyKind,
}

/// Everything one session accumulates across turns.
#[derive(Debug)]
pub struct SessionState {
    pub user_id: String,
    pub robot_code: String,
    pub slots: HashMap<String, String>,
    pub slot_abilities: HashMap<String, String>,
    pub slot_aliases: HashMap<String, String>,
    pub slot_warnings: HashMap<String, bool>,
    /// Slot name → turn in which it was last filled.
    pub slot_turns: HashMap<String, u64>,
    pub params: HashMap<String, Value>,
    pub msg_recorder: Vec<Message>,
    pub response_recorder: Vec<Reply>,
    /// Node ids visited, in order.
    pub state_recorder: Vec<String>,
    /// Node type tags visited, aligned with `state_recorder`.
    pub type_recorder: Vec<String>,
    pub turn_id: u64,
    pub start_time: DateTime<Utc>,
    pub time_stamp_turns: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub is_end: bool,
    pub dialog_status: DialogStatus,
    pub current_graph_id: String,
    empty_msg: Message,
}

impl SessionState {
    pub fn new(
        user_id: impl Into<String>,
        robot_code: impl Into<String>,
        slot_abilities: HashMap<String, String>,
        params: HashMap<String, Value>,
    ) -> Self {
        let slots = slot_abilities
            .keys()
            .map(|name| (name.clone(), String::new()))
            .collect();
        SessionState {
            user_id: user_id.into(),
            robot_code: robot_code.into(),
            slots,
            slot_abilities,
            slot_aliases: HashMap::new(),
            slot_warnings: HashMap::new(),
            slot_turns: HashMap::new(),
            params,
            msg_recorder: Vec::new(),
            response_recorder: Vec::new(),
            state_recorder: Vec::new(),
            type_recorder: Vec::new(),
            turn_id: 0,
            start_time: Utc::now(),
            time_stamp_turns: Vec::new(),
            is_end: false,
            dialog_status: DialogStatus::Normal,
            current_graph_id: String::new(),
            empty_msg: Message::default(),
        }
    }

    pub fn latest_msg(&self) -> &Message {
        self.msg_recorder.last().unwrap_or(&self.empty_msg)
    }

    pub fn latest_msg_mut(&mut self) -> Option<&mut Message> {
        self.msg_recorder.last_mut()
    }

    /// The view conditions evaluate against.
    pub fn scope(&self) -> EvalScope<'_> {
        let msg = self.latest_msg();
        EvalScope {
            intent: msg.intent.as_deref(),
            abilities: &msg.abilities,
            slots: &self.slots,
            params: &self.params,
        }
    }

    pub fn fill_slot(&mut self, name: &str, value: &str, alias: &str, warning: bool) {
        self.slots.insert(name.to_string(), value.to_string());
        self.slot_turns.insert(name.to_string(), self.turn_id);
        self.slot_aliases.insert(name.to_string(), alias.to_string());
        self.slot_warnings.insert(name.to_string(), warning);
    }

    pub fn ability_for_slot(&self, slot_name: &str) -> String {
        self.slot_abilities
            .get(slot_name)
            .cloned()
            .unwrap_or_else(|| slot_name.to_string())
    }

    pub fn update_params(&mut self, params: HashMap<String, Value>) {
        self.params.extend(params);
    }

    /// A freshly (re)triggered flow starts from a clean lifecycle status.
    pub fn reset_status(&mut self) {
        self.is_end = false;
        self.dialog_status = DialogStatus::Normal;
    }

    pub fn push_trace(&mut self, record: Value) {
        if let Some(msg) = self.latest_msg_mut() {
            msg.push_trace(record);
        }
    }

    pub fn update_trace(&mut self, key: &str, value: Value) {
        if let Some(msg) = self.latest_msg_mut() {
            msg.update_trace(key, value);
        }
    }

    /// Substitute `${slot.*}` / `${params.*}` references in reply text.
    pub fn render(&self, content: &str) -> String {
        let msg = self.latest_msg();
        render(
            content,
            &RenderScope {
                slots: &self.slots,
                params: &self.params,
                user_says: &msg.text,
                robot_code: &self.robot_code,
            },
        )
    }
}

/// One session's turn-by-turn driver: state plus the parked iterator.
#[derive(Debug)]
pub struct StateTracker {
    pub session: SessionState,
    current_iter: Option<NodeIter>,
}

impl StateTracker {
    pub fn new(
        user_id: impl Into<String>,
        robot_code: impl Into<String>,
        slot_abilities: HashMap<String, String>,
        params: HashMap<String, Value>,
    ) -> Self {
        StateTracker {
            session: SessionState::new(user_id, robot_code, slot_abilities, params),
            current_iter: None,
        }
    }

    /// Whether a flow computation is parked mid-way.
    pub fn is_active(&self) -> bool {
        self.current_iter.is_some()
    }

    /// Process one utterance and produce the reply text.
    pub async fn handle_message(
        &mut self,
        text: &str,
        flow_hint: Option<String>,
        env: &TurnEnv,
    ) -> FlowResult<String> {
        self.session.turn_id += 1;
        let turn_start = Utc::now();

        let mut msg = env.collab.interpreter.parse(text).await?;
        // Carry the previous turn's trailing trace node forward as context.
        if let Some(seed) = self
            .session
            .msg_recorder
            .last()
            .and_then(|m| m.trace.last().cloned())
        {
            msg.push_trace(seed);
        }
        self.session.msg_recorder.push(msg);

        let mut hint = flow_hint;
        let mut transitions = 0usize;
        let reply = 'turn: loop {
            if self.current_iter.is_none() && !self.trigger(hint.take(), env)? {
                // Nothing triggered: knowledge base, then chit-chat.
                break 'turn self.perform_faq(env).await?;
            }
            let Some(mut iter) = self.current_iter.take() else {
                continue;
            };
            loop {
                transitions += 1;
                if transitions > MAX_TRANSITIONS {
                    return Err(FlowError::runtime(
                        &self.session.current_graph_id,
                        "transition limit exceeded; graph cycles without replying",
                    ));
                }
                let step = {
                    let mut ctx = FlowCtx {
                        session: &mut self.session,
                        env,
                    };
                    iter.advance(&mut ctx).await?
                };
                match step {
                    Step::Reply(text) => {
                        let rendered = self.session.render(&text);
                        self.session.response_recorder.push(Reply {
                            text: rendered.clone(),
                            kind: ReplyKind::Flow,
                        });
                        self.current_iter = Some(iter);
                        break 'turn rendered;
                    }
                    Step::Faq => {
                        let answer = self.perform_faq(env).await?;
                        self.current_iter = Some(iter);
                        break 'turn answer;
                    }
                    Step::Goto(nref) => {
                        iter = self.enter_node(nref, env)?;
                    }
                    Step::Continue => {}
                    Step::End => {
                        // Flow ended with no answer: drop the iterator and
                        // let the outer loop re-trigger.
                        break;
                    }
                }
            }
        };

        self.session
            .time_stamp_turns
            .push((turn_start, Utc::now()));
        Ok(reply)
    }

    /// Try to activate a graph: the hinted one unconditionally, else the
    /// first whose start predicate holds.
    fn trigger(&mut self, hint: Option<String>, env: &TurnEnv) -> FlowResult<bool> {
        let target = match hint {
            Some(flow_id) => {
                let graph = env
                    .graphs
                    .get(&flow_id)
                    .ok_or_else(|| FlowError::GraphNotFound(flow_id.clone()))?;
                Some(graph.start_ref())
            }
            None => find_triggered_graph(&self.session, env)?,
        };
        let Some(nref) = target else {
            return Ok(false);
        };
        self.session.reset_status();
        let iter = self.enter_node(nref, env)?;
        self.current_iter = Some(iter);
        Ok(true)
    }

    /// Make a node the active one: switch graphs if needed, record the
    /// visit, instantiate the iterator.
    fn enter_node(&mut self, nref: crate::graph::NodeRef, env: &TurnEnv) -> FlowResult<NodeIter> {
        self.session.current_graph_id = nref.graph_id.clone();
        if let Some(node) = env
            .graphs
            .get(&nref.graph_id)
            .and_then(|g| g.get_node(nref.node))
        {
            tracing::debug!(node = %node.id, graph = %nref.graph_id, "entering node");
            self.session.state_recorder.push(node.id.clone());
            self.session.type_recorder.push(node.kind.tag().to_string());
        }
        let mut ctx = FlowCtx {
            session: &mut self.session,
            env,
        };
        NodeIter::new(nref, &mut ctx)
    }

    /// Answer from the knowledge base, falling through to chit-chat on a
    /// miss. The active iterator (if any) stays parked.
    async fn perform_faq(&mut self, env: &TurnEnv) -> FlowResult<String> {
        let robot_code = self.session.robot_code.clone();
        let question = self.session.latest_msg().text.clone();

        let needs_fetch = self
            .session
            .msg_recorder
            .last()
            .map(|m| m.faq_result.is_none())
            .unwrap_or(false);
        if needs_fetch {
            let answer = env.collab.faq.ask(&robot_code, &question).await?;
            if let Some(msg) = self.session.latest_msg_mut() {
                msg.faq_result = Some(answer);
            }
        }

        let is_miss = self
            .session
            .latest_msg()
            .faq_result
            .as_ref()
            .map(|f| f.is_miss())
            .unwrap_or(true);
        if is_miss {
            let words = env.collab.faq.chitchat(&robot_code, &question).await?;
            if let Some(msg) = self.session.latest_msg_mut() {
                msg.chitchat_words = words;
                msg.understanding = Understanding::FaqMiss;
            }
        }

        let record = {
            let msg = self.session.latest_msg();
            match &msg.faq_result {
                Some(result) => json!({
                    "type": "faq",
                    "hit": result.title,
                    "category": result.category,
                    "confidence": result.confidence,
                    "recall": result.recommend_questions,
                }),
                None => json!({"type": "faq"}),
            }
        };
        self.session.push_trace(record);
        self.session.state_recorder.push("faq".to_string());
        self.session.type_recorder.push("faq".to_string());

        let answer = self.session.latest_msg().faq_answer_text();
        self.session.response_recorder.push(Reply {
            text: answer.clone(),
            kind: ReplyKind::Faq,
        });
        Ok(answer)
    }
}
