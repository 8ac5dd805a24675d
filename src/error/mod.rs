//! Error types for the dialogue engine.
//!
//! - [`StaticCheckError`] — Graph configuration errors, fatal at compile time
//!   for the one graph being loaded.
//! - [`FlowError`] — Errors raised while executing a turn: runtime-flow
//!   violations and collaborator (NLU / FAQ / RPC) failures.

pub mod flow_error;
pub mod static_check;

pub use flow_error::FlowError;
pub use static_check::StaticCheckError;

/// Convenience alias for graph-compile results.
pub type CheckResult<T> = Result<T, StaticCheckError>;
/// Convenience alias for turn-execution results.
pub type FlowResult<T> = Result<T, FlowError>;
