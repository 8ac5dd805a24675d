//! Compiled dialogue graphs.
//!
//! [`build_graph`] turns a raw [`GraphConfig`](crate::dsl::GraphConfig) into
//! an arena of linked [`Node`]s; all static checking happens here so a bad
//! configuration never reaches the turn loop.

pub mod builder;
pub mod types;

pub use builder::build_graph;
pub use types::{Graph, GraphRegistry, Node, NodeId, NodeKind, NodeRef};
