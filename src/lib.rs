//! # XDialogue — a resumable dialogue-flow engine
//!
//! `xdialogue` drives task-oriented, multi-turn conversations from a
//! declaratively configured graph of dialogue nodes: ask a question, fill a
//! slot, branch on a condition, call an external service, hand off to a
//! human, jump to another graph.
//!
//! - **Graph compiler**: raw JSON configuration is statically checked and
//!   compiled into an arena of linked nodes; a bad graph is rejected at load
//!   time and never reaches a conversation.
//! - **Resumable execution**: each node runs as a small explicit state
//!   machine. Producing a reply suspends the computation; the next utterance
//!   resumes it exactly where it parked. A pending multi-turn computation is
//!   a plain value (node handle + integer cursor), never a captured stack.
//! - **Session tracking**: per-session slots, params, histories and debug
//!   traces, with strict turn sequencing and lazy TTL eviction.
//! - **Fallback chain**: when no graph triggers — or a node asks for an
//!   in-flow detour — the turn falls through to the knowledge base and then
//!   to chit-chat.
//! - **External collaborators**: language understanding, knowledge base,
//!   question bank and RPC endpoints are consumed through traits; the engine
//!   itself stays free of model code.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use xdialogue::{Agent, Collaborators, TurnRequest};
//!
//! # async fn run(collab: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let agent = Agent::new("robot-1", collab, Duration::from_secs(600));
//! let configs = vec![xdialogue::parse_graph_config(&std::fs::read_to_string("graph.json")?)?];
//! agent.load_graphs(&configs);
//!
//! let reply = agent
//!     .handle_message(TurnRequest::new("session-1", "帮我挪一下车"))
//!     .await?;
//! println!("{}", reply.says);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod dsl;
pub mod error;
pub mod evaluator;
pub mod faq;
pub mod graph;
pub mod nlu;
pub mod nodes;
pub mod rpc;
pub mod session;
pub mod template;

pub use crate::agent::{Agent, Clock, LoadReport, ManualClock, SystemClock, TurnRequest};
pub use crate::dsl::{parse_graph_config, GraphConfig};
pub use crate::error::{CheckResult, FlowError, FlowResult, StaticCheckError};
pub use crate::evaluator::{judge_branch, judge_condition, EvalScope};
pub use crate::faq::{
    FaqAnswer, FaqClient, IntentItem, QuestionBank, QuestionItem, QuestionQuery,
};
pub use crate::graph::{build_graph, Graph, GraphRegistry, Node, NodeId, NodeKind, NodeRef};
pub use crate::nlu::{Interpreter, Message, Understanding, UNK};
pub use crate::nodes::{NodeIter, Step};
pub use crate::rpc::{ReqwestTransport, RpcTransport};
pub use crate::session::{
    Collaborators, DialogStatus, Reply, ReplyKind, ReplyPacket, SessionState, StateTracker,
    TurnEnv,
};
