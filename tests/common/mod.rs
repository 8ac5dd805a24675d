//! Fake collaborators and graph fixtures shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use xdialogue::error::FlowResult;
use xdialogue::faq::{
    FaqAnswer, FaqClient, IntentItem, QuestionBank, QuestionItem, QuestionQuery,
};
use xdialogue::nlu::{Interpreter, Message};
use xdialogue::rpc::RpcTransport;
use xdialogue::{Collaborators, GraphConfig};

// ================================
// Fakes
// ================================

/// Scripted interpreter: canned intent and ability extraction per utterance.
#[derive(Default)]
pub struct FakeInterpreter {
    intents: HashMap<String, (String, f64)>,
    abilities: HashMap<String, Vec<(String, Vec<String>)>>,
}

impl FakeInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent(mut self, text: &str, intent: &str, score: f64) -> Self {
        self.intents
            .insert(text.to_string(), (intent.to_string(), score));
        self
    }

    pub fn ability(mut self, text: &str, ability: &str, value: &str) -> Self {
        self.abilities
            .entry(text.to_string())
            .or_default()
            .push((ability.to_string(), vec![value.to_string()]));
        self
    }
}

#[async_trait]
impl Interpreter for FakeInterpreter {
    async fn parse(&self, text: &str) -> FlowResult<Message> {
        let mut msg = Message::new(text);
        if let Some((intent, score)) = self.intents.get(text) {
            msg.intent = Some(intent.clone());
            msg.intent_confidence = *score;
            msg.intent_ranking.insert(intent.clone(), *score);
        }
        if let Some(extractions) = self.abilities.get(text) {
            for (ability, values) in extractions {
                msg.add_ability(ability.clone(), values.clone());
            }
        }
        Ok(msg)
    }

    async fn classify_intent(
        &self,
        _text: &str,
        _group: &HashMap<String, Vec<String>>,
    ) -> FlowResult<HashMap<String, f64>> {
        Ok(HashMap::new())
    }

    async fn extract_ability(&self, _msg: &mut Message, _ability: &str) -> FlowResult<()> {
        Ok(())
    }
}

/// Scripted knowledge base.
pub struct FakeFaq {
    answers: HashMap<String, FaqAnswer>,
    chitchat_text: String,
}

impl FakeFaq {
    pub fn new(chitchat_text: &str) -> Self {
        FakeFaq {
            answers: HashMap::new(),
            chitchat_text: chitchat_text.to_string(),
        }
    }

    pub fn answer(mut self, question: &str, title: &str, answer: &str, confidence: f64) -> Self {
        let mut hit = FaqAnswer::miss();
        hit.faq_id = format!("faq-{}", self.answers.len() + 1);
        hit.title = title.to_string();
        hit.answer = answer.to_string();
        hit.confidence = confidence;
        self.answers.insert(question.to_string(), hit);
        self
    }
}

#[async_trait]
impl FaqClient for FakeFaq {
    async fn ask(&self, _robot_code: &str, question: &str) -> FlowResult<FaqAnswer> {
        Ok(self
            .answers
            .get(question)
            .cloned()
            .unwrap_or_else(FaqAnswer::miss))
    }

    async fn chitchat(&self, _robot_code: &str, _question: &str) -> FlowResult<String> {
        Ok(self.chitchat_text.clone())
    }
}

/// In-memory question bank for dynamic-node tests.
#[derive(Default)]
pub struct FakeBank {
    pub questions: Vec<QuestionItem>,
    pub intents: Vec<IntentItem>,
}

#[async_trait]
impl QuestionBank for FakeBank {
    async fn search_questions(&self, query: &QuestionQuery) -> FlowResult<Vec<QuestionItem>> {
        Ok(self
            .questions
            .iter()
            .filter(|q| query.should_perspective.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn search_intents(
        &self,
        _robot_code: &str,
        intent_ids: &[String],
    ) -> FlowResult<Vec<IntentItem>> {
        Ok(self
            .intents
            .iter()
            .filter(|i| intent_ids.contains(&i.intent_id))
            .cloned()
            .collect())
    }
}

/// Always answers with the same JSON and counts invocations.
#[derive(Default)]
pub struct FakeRpc {
    pub response: Value,
    pub calls: Mutex<usize>,
}

impl FakeRpc {
    pub fn new(response: Value) -> Self {
        FakeRpc {
            response,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl RpcTransport for FakeRpc {
    async fn get(
        &self,
        _url: &str,
        _params: &HashMap<String, String>,
        _headers: &HashMap<String, String>,
    ) -> FlowResult<Value> {
        *self.calls.lock() += 1;
        Ok(self.response.clone())
    }

    async fn post(
        &self,
        _url: &str,
        _params: &HashMap<String, String>,
        _headers: &HashMap<String, String>,
    ) -> FlowResult<Value> {
        *self.calls.lock() += 1;
        Ok(self.response.clone())
    }
}

pub fn collaborators(
    interpreter: Arc<dyn Interpreter>,
    faq: Arc<dyn FaqClient>,
    question_bank: Arc<dyn QuestionBank>,
    rpc: Arc<dyn RpcTransport>,
) -> Collaborators {
    Collaborators {
        interpreter,
        faq,
        question_bank,
        rpc,
    }
}

/// Collaborators with a given interpreter and all-miss FAQ.
pub fn basic_collaborators(interpreter: FakeInterpreter) -> Collaborators {
    collaborators(
        Arc::new(interpreter),
        Arc::new(FakeFaq::new("我们聊点别的吧")),
        Arc::new(FakeBank::default()),
        Arc::new(FakeRpc::default()),
    )
}

// ================================
// Graph fixtures
// ================================

pub fn graph(value: Value) -> GraphConfig {
    serde_json::from_value(value).expect("fixture graph config must parse")
}

/// Start (intent move_car) → user input → fill plate_number → final say.
pub fn move_car_graph() -> GraphConfig {
    graph(json!({
        "graph_id": "g_move_car",
        "name": "挪车服务",
        "version": "1",
        "global_slots": {"plate_number": "plate"},
        "nodes": [
            {
                "node_id": "n_start",
                "node_name": "开始",
                "node_type": "start",
                "condition_group": [[{"type": "intent", "operator": "==", "value": "move_car"}]]
            },
            {
                "node_id": "n_input",
                "node_name": "用户输入",
                "node_type": "user_input"
            },
            {
                "node_id": "n_fill",
                "node_name": "收集车牌",
                "node_type": "fill_slots",
                "slots": [{
                    "slot_name": "plate_number",
                    "slot_alias": "车牌号",
                    "rounds": 2,
                    "reask_words": ["请问您的车牌号是多少？"],
                    "is_necessary": true
                }]
            },
            {
                "node_id": "n_done",
                "node_name": "完成",
                "node_type": "say",
                "content": ["已通知车主挪车，车牌${slot.plate_number}"]
            }
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_input"},
            {"line_id": "l2", "source_id": "n_input", "target_id": "n_fill"},
            {"line_id": "l3", "source_id": "n_fill", "target_id": "n_done"}
        ]
    }))
}
