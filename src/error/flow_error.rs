use thiserror::Error;

/// Errors raised while executing one turn of a session.
///
/// Runtime-flow violations come from the graph referencing something that
/// does not exist at execution time; collaborator failures come from the
/// external NLU / knowledge-base / RPC services. Neither destroys the
/// session: history recorded up to the failure point stays valid.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("node {node}: {reason}")]
    RuntimeFlow { node: String, reason: String },
    #[error("graph `{0}` not found")]
    GraphNotFound(String),
    #[error("nlu failure: {0}")]
    Nlu(String),
    #[error("knowledge base failure: {0}")]
    KnowledgeBase(String),
    #[error("question bank failure: {0}")]
    QuestionBank(String),
    #[error("rpc call failed: {0}")]
    Rpc(String),
    #[error("malformed collaborator response: {0}")]
    MalformedResponse(String),
}

impl FlowError {
    pub fn runtime(node: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::RuntimeFlow {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for FlowError {
    fn from(e: reqwest::Error) -> Self {
        FlowError::Rpc(e.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::MalformedResponse(e.to_string())
    }
}
