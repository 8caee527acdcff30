//! # AGORA: Autonomous Store-Benchmark Agent
//!
//! AGORA solves natural-language tasks from a store-challenge platform by letting a
//! hosted language model pick one structured tool per step and executing that tool
//! against the platform or locally.
//!
//! ## Core Components
//!
//! ### Sandbox
//! The deterministic-compute helper: a restricted expression language that is
//! tokenized, parsed, statically validated, and evaluated under tight resource
//! limits. Model-supplied code never reaches anything beyond a closed set of pure
//! operations ([`sandbox`]).
//!
//! ### Decision Schema
//! The structured decision object the model must emit each step, plus the uniform
//! tool-result envelope fed back into the conversation ([`schema`]).
//!
//! ### LLM Client
//! Schema-guided JSON querying of an OpenAI-compatible endpoint with rate limiting
//! and a recovery ladder for malformed output ([`llm`]).
//!
//! ### Platform Client
//! Session/task lifecycle and store-tool dispatch against the benchmark platform
//! ([`platform`]).
//!
//! ### Agent and Session
//! The per-task reasoning loop ([`agent`]) and the session runner that iterates
//! tasks and aggregates metrics ([`session`]).
//!
//! ## Sandbox Pipeline
//!
//! ```text
//! Source Code → Tokenizer → Parser → Validator → Evaluator
//! ```
//!
//! Validation always runs before evaluation in the same call; a failed evaluation
//! leaves the task's execution context untouched.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod platform;
pub mod sandbox;
pub mod schema;
pub mod session;
pub mod store;
pub mod structured;

// Re-exports
pub use error::*;
pub use sandbox::{ComputeMode, Evaluation, ExecutionContext, FailureKind, Sandbox, Validation};
