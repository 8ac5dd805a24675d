use thiserror::Error;

/// Errors found while compiling a raw graph configuration.
///
/// Any of these aborts loading of the offending graph; other graphs owned by
/// the same agent keep serving.
#[derive(Debug, Error)]
pub enum StaticCheckError {
    #[error("graph config parse error: {0}")]
    ParseError(String),
    #[error("node {node}: field `{field}`: {reason}")]
    InvalidField {
        node: String,
        field: String,
        reason: String,
    },
    #[error("node {node}: missing required field `{field}`")]
    MissingField { node: String, field: String },
    #[error("unknown node type `{node_type}` on node {node}")]
    UnknownNodeType { node: String, node_type: String },
    #[error("graph {graph}: expected exactly one start node, found {found}")]
    StartNodeCount { graph: String, found: usize },
    #[error("connection {line}: unknown {end} node `{id}`")]
    UnknownEndpoint {
        line: String,
        end: &'static str,
        id: String,
    },
    #[error("connection {line}: at most one of option_id, branch_id, intent_id may be set")]
    AmbiguousConnection { line: String },
    #[error("connection {line}: start node `{target}` may only be entered as a default child")]
    StartAsTarget { line: String, target: String },
    #[error("node {node}: branch `{branch}` has no connected child")]
    DanglingBranch { node: String, branch: String },
}

impl StaticCheckError {
    /// Wrap a serde error raised while decoding one node's payload.
    pub fn invalid_payload(node: &str, err: serde_json::Error) -> Self {
        StaticCheckError::InvalidField {
            node: node.to_string(),
            field: "payload".to_string(),
            reason: err.to_string(),
        }
    }
}
