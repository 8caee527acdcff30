//! # Sandbox Evaluation
//!
//! Executes validated expression ASTs against a namespace made of the builtin
//! whitelist plus the task's execution context.
//!
//! ## Core Components
//!
//! ### Expression Evaluator
//! Walks the AST producing a [`Value`](expression::Value), consuming a step
//! budget and checking a wall-clock deadline at every node so pathological
//! comprehensions cannot run away.
//!
//! ### Builtins
//! The closed table of pure functions and methods reachable from sandboxed
//! code. The whitelist is data; nothing is looked up reflectively.
//!
//! ### Execution Context
//! The externally-owned binding map carrying `last_result` between calls. The
//! evaluator only reads it; updates happen in the facade after a full success.

pub mod builtins;
pub mod context;
pub mod expression;

use thiserror::Error;

pub use context::{ExecutionContext, LAST_RESULT};
pub use expression::{EvalLimits, Evaluated, ExpressionEvaluator, Value};

/// Internal evaluation fault. Never crosses the sandbox boundary: the facade
/// converts every variant into the discriminated evaluation result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    Name(String),
    #[error("{0}")]
    Type(String),
    #[error("computation exceeded its budget")]
    Timeout,
    #[error("assertion failed")]
    AssertionFailed,
    #[error("{0}")]
    Internal(String),
}

pub type EvalResult<T> = Result<T, EvalError>;
