//! Per-session state and the turn loop.

pub mod reply;
pub mod state_tracker;

pub use reply::{DialogInfo, FaqMeta, IntentSummary, ReplyPacket, SlotTouch};
pub use state_tracker::{DialogStatus, Reply, ReplyKind, SessionState, StateTracker};

use std::sync::Arc;

use crate::faq::{FaqClient, QuestionBank};
use crate::graph::GraphRegistry;
use crate::nlu::Interpreter;
use crate::rpc::RpcTransport;

/// Handles to every external service the engine consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub interpreter: Arc<dyn Interpreter>,
    pub faq: Arc<dyn FaqClient>,
    pub question_bank: Arc<dyn QuestionBank>,
    pub rpc: Arc<dyn RpcTransport>,
}

/// Everything one turn executes against: a consistent snapshot of the
/// robot's graphs plus the collaborator handles.
pub struct TurnEnv {
    pub robot_code: String,
    pub graphs: GraphRegistry,
    pub collab: Collaborators,
}

/// Mutable view handed to node iterators while a turn is being driven.
pub struct FlowCtx<'a> {
    pub session: &'a mut SessionState,
    pub env: &'a TurnEnv,
}
