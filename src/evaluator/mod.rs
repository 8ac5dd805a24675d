//! Shared condition evaluation.
//!
//! Every node kind that branches — start triggers, judge branches, robot-say
//! conditional content — goes through [`judge_branch`], which is an OR of
//! ANDs over [`ConditionClause`](crate::dsl::ConditionClause) groups.

pub mod condition;
pub mod operators;

pub use condition::{judge_branch, judge_condition, EvalScope};
pub use operators::evaluate;
