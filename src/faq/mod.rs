//! Knowledge-base, chit-chat and question-bank collaborator interfaces.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FlowResult;
use crate::nlu::UNK;

/// Perspective marker for top-level question-bank entries.
pub const MAIN_QUESTION_PERSPECTIVE: &str = "main_question";
/// Perspective marker for follow-up (sub) question-bank entries.
pub const SUB_QUESTION_PERSPECTIVE: &str = "sub_question";

/// One knowledge-base answer. `faq_id == UNK` marks a miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqAnswer {
    pub faq_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub recommend_questions: Vec<String>,
    #[serde(default)]
    pub related_questions: Vec<String>,
    #[serde(default)]
    pub hot_questions: Vec<String>,
    /// "1" is a plain text reply; other modes carry an SMS payload.
    #[serde(default = "default_reply_mode")]
    pub reply_mode: String,
    #[serde(default)]
    pub sms_content: String,
}

fn default_reply_mode() -> String {
    "1".to_string()
}

impl FaqAnswer {
    pub fn miss() -> Self {
        FaqAnswer {
            faq_id: UNK.to_string(),
            title: String::new(),
            answer: String::new(),
            confidence: 0.0,
            category: String::new(),
            recommend_questions: Vec::new(),
            related_questions: Vec::new(),
            hot_questions: Vec::new(),
            reply_mode: default_reply_mode(),
            sms_content: String::new(),
        }
    }

    pub fn is_miss(&self) -> bool {
        self.faq_id == UNK
    }
}

/// The knowledge-base / chit-chat collaborator.
#[async_trait]
pub trait FaqClient: Send + Sync {
    /// Full-text-and-vector search over the robot's knowledge base.
    async fn ask(&self, robot_code: &str, question: &str) -> FlowResult<FaqAnswer>;

    /// Chit-chat fallback; same shape, no confidence gating.
    async fn chitchat(&self, robot_code: &str, question: &str) -> FlowResult<String>;
}

/// Tag-based filter for question-bank lookups.
#[derive(Debug, Clone, Default)]
pub struct QuestionQuery {
    pub robot_code: String,
    /// All of these tags must match.
    pub perspective: Vec<String>,
    /// At least one of these tags must match.
    pub should_perspective: Vec<String>,
}

/// A slot to fill from the dynamic-node conversation itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotBinding {
    pub key: String,
    #[serde(default)]
    pub name: String,
    /// `@sys.recent_usersays`, `@sys.recent_intent` or
    /// `@sys.recent_intent_and_says`.
    pub entity_key: String,
    #[serde(default)]
    pub warning: bool,
}

/// One question-bank entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub intent_ids: Vec<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(default)]
    pub parent_intent_id: Option<String>,
    #[serde(default)]
    pub slot_bindings: Vec<SlotBinding>,
}

/// One intent entry from the intent bank, used for follow-up detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentItem {
    pub intent_id: String,
    #[serde(default)]
    pub intent_name: String,
    #[serde(default)]
    pub examples: Vec<String>,
    /// Regex sources tried before any model-based classification.
    #[serde(default)]
    pub rules: Vec<String>,
}

/// The external question-bank collaborator consumed by dynamic nodes.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn search_questions(&self, query: &QuestionQuery) -> FlowResult<Vec<QuestionItem>>;

    async fn search_intents(
        &self,
        robot_code: &str,
        intent_ids: &[String],
    ) -> FlowResult<Vec<IntentItem>>;
}
