//! NLU collaborator interface.
//!
//! The engine never does language understanding itself: it consumes a parsed
//! [`Message`] from an [`Interpreter`] and re-classifies against candidate
//! intents where a node demands it. Intent correction (rules, phonetics) is
//! the interpreter's business.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::FlowResult;
use crate::faq::FaqAnswer;

/// Marker for "nothing recognized" — shared with the FAQ miss marker.
pub const UNK: &str = "unknown";

/// A candidate intent needs at least this score to win a re-classification.
pub const INTENT_THRESHOLD: f64 = 0.5;

/// Per-turn understanding outcome, carried on the wire as a digit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Understanding {
    #[default]
    Understood,
    IntentMiss,
    SlotMiss,
    FaqMiss,
}

impl Understanding {
    pub fn as_code(&self) -> &'static str {
        match self {
            Understanding::Understood => "0",
            Understanding::IntentMiss => "1",
            Understanding::SlotMiss => "2",
            Understanding::FaqMiss => "3",
        }
    }
}

/// One parsed utterance plus everything the turn attaches to it.
///
/// Created once per turn and appended to the session history; later turns
/// never mutate it except to attach trace records produced while it was the
/// active message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub text: String,
    /// Winning intent after ranking / re-classification; `None` when nothing
    /// cleared the threshold.
    pub intent: Option<String>,
    pub intent_confidence: f64,
    /// Parse-time scores per intent id.
    pub intent_ranking: HashMap<String, f64>,
    /// Ability name → values it extracted from this utterance.
    pub abilities: HashMap<String, Vec<String>>,
    /// Intent id → display name, provided by the interpreter.
    pub intent_names: HashMap<String, String>,
    /// Intent id → training examples, used for candidate re-classification.
    pub intent_examples: HashMap<String, Vec<String>>,
    /// Knowledge-base answer, fetched lazily the first time the turn needs it.
    pub faq_result: Option<FaqAnswer>,
    pub chitchat_words: String,
    /// Pull-back phrase appended to FAQ/chit-chat answers to steer the user
    /// back into the flow.
    pub callback_words: String,
    /// Options offered to the user this turn.
    pub options: Vec<String>,
    pub understanding: Understanding,
    /// Whether this turn passed through a start node.
    pub is_start: bool,
    /// Ordered trace records attached while processing this message.
    pub trace: Vec<Value>,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Message {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn add_ability(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.abilities.entry(name.into()).or_default().extend(values);
    }

    pub fn intent_name<'a>(&'a self, intent_id: &'a str) -> &'a str {
        self.intent_names
            .get(intent_id)
            .map(|s| s.as_str())
            .unwrap_or(intent_id)
    }

    pub fn set_callback_words(&mut self, words: impl Into<String>) {
        self.callback_words = words.into();
    }

    /// Re-resolve the intent restricted to `candidates`: the best of the
    /// classifier score and the parse-time ranking wins, gated by
    /// [`INTENT_THRESHOLD`].
    pub async fn resolve_among(
        &mut self,
        candidates: &[String],
        interpreter: &dyn Interpreter,
    ) -> FlowResult<()> {
        let group: HashMap<String, Vec<String>> = candidates
            .iter()
            .filter_map(|c| self.intent_examples.get(c).map(|ex| (c.clone(), ex.clone())))
            .collect();
        let mut scores = if group.is_empty() {
            HashMap::new()
        } else {
            interpreter.classify_intent(&self.text, &group).await?
        };
        for candidate in candidates {
            let ranked = self.intent_ranking.get(candidate).copied().unwrap_or(0.0);
            let entry = scores.entry(candidate.clone()).or_insert(0.0);
            if ranked > *entry {
                *entry = ranked;
            }
        }

        let best = scores
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(intent, score)| (intent.clone(), *score));
        match best {
            Some((intent, score)) if score >= INTENT_THRESHOLD => {
                let total: f64 = scores.values().sum();
                self.intent = Some(intent);
                self.intent_confidence = if total > 0.0 { score / total } else { 0.0 };
            }
            _ => {
                self.intent = None;
                self.intent_confidence = 0.0;
            }
        }
        Ok(())
    }

    /// The reply text a knowledge-base turn produces: the answer (or the
    /// chit-chat result on a miss) joined with any pull-back phrase.
    pub fn faq_answer_text(&self) -> String {
        let answer = match &self.faq_result {
            Some(result) if !result.is_miss() => result.answer.as_str(),
            _ => self.chitchat_words.as_str(),
        };
        let joined = format!("{}\n{}", answer, self.callback_words);
        joined.trim().to_string()
    }

    pub fn push_trace(&mut self, record: Value) {
        self.trace.push(record);
    }

    /// Update a key of the most recent trace record; list-valued fields
    /// accumulate instead of being replaced.
    pub fn update_trace(&mut self, key: &str, value: Value) {
        if let Some(Value::Object(last)) = self.trace.last_mut() {
            match last.get_mut(key) {
                Some(Value::Array(items)) => items.push(value),
                _ => {
                    last.insert(key.to_string(), value);
                }
            }
        }
    }
}

/// The language-understanding collaborator.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Parse one raw utterance into a [`Message`].
    async fn parse(&self, text: &str) -> FlowResult<Message>;

    /// Score `text` against each candidate intent given its example
    /// utterances; returns the best score per intent id.
    async fn classify_intent(
        &self,
        text: &str,
        group: &HashMap<String, Vec<String>>,
    ) -> FlowResult<HashMap<String, f64>>;

    /// Run the builtin / hard-coded extractor registered for `ability` over
    /// the message, adding whatever it finds to `msg.abilities`.
    async fn extract_ability(&self, msg: &mut Message, ability: &str) -> FlowResult<()>;
}
