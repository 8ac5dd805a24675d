//! The packaged per-turn reply handed back to the hosting layer.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::session::state_tracker::{ReplyKind, StateTracker};

#[derive(Debug, Clone, Serialize)]
pub struct DialogInfo {
    pub graph_id: String,
    pub node_id: String,
    pub node_type: String,
    /// Whether this turn passed through a start node.
    pub is_start: bool,
    pub is_end: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentSummary {
    pub understanding: String,
    pub intent: String,
    pub intent_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotTouch {
    pub key: String,
    pub name: String,
    pub value: String,
    pub warning: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaqMeta {
    pub faq_id: String,
    pub hit: String,
    pub confidence: f64,
    pub recommend_questions: Vec<String>,
    pub related_questions: Vec<String>,
}

/// Everything the hosting layer needs to answer one turn.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyPacket {
    pub session_id: String,
    /// "1" when the knowledge base answered, "2" for a flow answer.
    pub reply_type: String,
    pub says: String,
    pub user_says: String,
    pub response_time: String,
    pub dialog_status: String,
    pub understanding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialog: Option<DialogInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentSummary>,
    pub slots: Vec<SlotTouch>,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faq: Option<FaqMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<Vec<Value>>,
}

impl StateTracker {
    /// Package the most recent turn.
    pub fn latest_pack(&self, traceback: bool) -> ReplyPacket {
        let s = &self.session;
        let msg = s.latest_msg();
        let last_reply = s.response_recorder.last();
        let is_faq = matches!(last_reply.map(|r| r.kind), Some(ReplyKind::Faq));

        let dialog = (!s.state_recorder.is_empty()).then(|| DialogInfo {
            graph_id: s.current_graph_id.clone(),
            node_id: s.state_recorder.last().cloned().unwrap_or_default(),
            node_type: s.type_recorder.last().cloned().unwrap_or_default(),
            is_start: msg.is_start,
            is_end: s.is_end,
        });

        // The very first request only establishes the session; intent and
        // slot summaries start with the second.
        let established = s.msg_recorder.len() > 1;
        let intent = (established && !is_faq).then(|| IntentSummary {
            understanding: msg.understanding.as_code().to_string(),
            intent: msg.intent.clone().unwrap_or_default(),
            intent_name: msg
                .intent
                .as_deref()
                .map(|i| msg.intent_name(i).to_string())
                .unwrap_or_default(),
        });

        let slots: Vec<SlotTouch> = if established {
            s.slots
                .iter()
                .filter(|(name, value)| {
                    !value.is_empty() && s.slot_turns.get(*name) == Some(&s.turn_id)
                })
                .map(|(name, value)| SlotTouch {
                    key: name.clone(),
                    name: s.slot_aliases.get(name).cloned().unwrap_or_else(|| name.clone()),
                    value: value.clone(),
                    warning: s.slot_warnings.get(name).copied().unwrap_or(false),
                })
                .collect()
        } else {
            Vec::new()
        };

        let faq = if is_faq {
            msg.faq_result.as_ref().map(|f| FaqMeta {
                faq_id: f.faq_id.clone(),
                hit: f.title.clone(),
                confidence: f.confidence,
                recommend_questions: f.recommend_questions.clone(),
                related_questions: f.related_questions.clone(),
            })
        } else {
            None
        };

        ReplyPacket {
            session_id: s.user_id.clone(),
            reply_type: if is_faq { "1" } else { "2" }.to_string(),
            says: last_reply.map(|r| r.text.clone()).unwrap_or_default(),
            user_says: msg.text.clone(),
            response_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            dialog_status: s.dialog_status.as_code().to_string(),
            understanding: msg.understanding.as_code().to_string(),
            dialog,
            intent,
            slots,
            options: msg.options.clone(),
            faq,
            traceback: traceback.then(|| msg.trace.clone()),
        }
    }
}
