//! # Deterministic-Compute Sandbox
//!
//! The sandbox executes single expressions supplied by an untrusted model
//! under tight restrictions, preserving a `last_result` binding across calls
//! within one task.
//!
//! # Core Components
//!
//! ## Tokenizer
//! Lexes the expression language, preserving position information and
//! tokenizing forbidden statement keywords so they can be rejected precisely.
//!
//! ## Parser
//! Parser-combinator grammar producing the expression AST. Only
//! value-producing forms exist, plus the policy-gated single binding and
//! assertion.
//!
//! ## Validator
//! Static gate: statement forms, multi-line input, non-whitelisted names,
//! dunder and reflection surfaces are rejected before any execution.
//!
//! ## Evaluator
//! Executes the validated AST against the builtin whitelist plus the task
//! context, under a step budget, a wall-clock deadline, and an output-length
//! ceiling.
//!
//! # Evaluation Pipeline
//!
//! ```text
//! Source Code → Tokenizer → Parser → Validator → Evaluator
//! ```
//!
//! Per call: `Received → Validating → {Rejected | Validated} → Executing →
//! {Succeeded | Failed}`. Nothing persists inside the sandbox itself; only
//! the externally-owned [`ExecutionContext`] carries state across calls, and
//! it is written only after a full success.

pub mod ast;
pub mod eval;
pub mod parser;
pub mod tokenizer;
pub mod validator;

use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use eval::{ExecutionContext, Value, LAST_RESULT};
pub use validator::{Rejection, ValidationPolicy, Whitelist};

use crate::config::SandboxConfig;
use eval::{EvalError, EvalLimits, ExpressionEvaluator};

/// Caller-declared intent tag. Tightens the output ceiling for validation
/// proofs; never changes execution semantics.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComputeMode {
    #[default]
    Analytics,
    Validation,
}

/// Closed failure taxonomy of the sandbox. Every internal fault maps onto
/// exactly one of these before crossing the component boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum FailureKind {
    SyntaxError,
    DisallowedConstruct,
    DisallowedName,
    NameError,
    TypeMismatch,
    OutputTooLong,
    Timeout,
    Unknown,
}

impl FailureKind {
    /// Short corrective hint rendered back to the model next turn.
    pub fn hint(&self) -> &'static str {
        match self {
            FailureKind::SyntaxError => "submit exactly one well-formed expression",
            FailureKind::DisallowedConstruct => {
                "expressions only: no statements, imports, or multi-line code"
            }
            FailureKind::DisallowedName => {
                "only whitelisted builtins and already-bound names are available"
            }
            FailureKind::NameError => {
                "the name is not bound yet; successful results persist as last_result"
            }
            FailureKind::TypeMismatch => "check the operand types in the expression",
            FailureKind::OutputTooLong => {
                "the result exceeds the output budget; slice or aggregate it first"
            }
            FailureKind::Timeout => "the computation exceeded its budget; simplify the expression",
            FailureKind::Unknown => "unexpected failure; try a simpler expression",
        }
    }
}

/// Outcome of the validation gate alone.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Pass,
    Reject(Rejection),
}

impl Validation {
    pub fn is_pass(&self) -> bool {
        matches!(self, Validation::Pass)
    }
}

/// Discriminated outcome of one evaluation. No error type ever crosses this
/// boundary; failures are data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Evaluation {
    Success { value: String },
    Failure { kind: FailureKind, message: String },
}

impl Evaluation {
    pub fn is_success(&self) -> bool {
        matches!(self, Evaluation::Success { .. })
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Evaluation::Success { value } => Some(value),
            Evaluation::Failure { .. } => None,
        }
    }

    /// `Kind: message` rendering used in tool-result envelopes.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Evaluation::Success { .. } => None,
            Evaluation::Failure { kind, message } => Some(format!("{}: {}", kind, message)),
        }
    }
}

/// The sandbox facade: validation and evaluation with the limits from
/// [`SandboxConfig`].
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
    whitelist: Whitelist,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            whitelist: Whitelist::default(),
        }
    }

    fn policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            allow_binding: self.config.allow_binding,
        }
    }

    /// Static check only; the context is read for its known names and never
    /// mutated.
    pub fn validate(&self, source: &str, context: &ExecutionContext) -> Validation {
        match validator::analyze(
            source,
            &self.whitelist,
            &context.known_names(),
            &self.policy(),
        ) {
            Ok(_) => Validation::Pass,
            Err(rejection) => Validation::Reject(rejection),
        }
    }

    /// Validates and executes one expression. On success `last_result` (and
    /// the bound name for the binding form) is written into the context; any
    /// failure leaves the context untouched.
    #[tracing::instrument(level = "debug", skip(self, context))]
    pub fn evaluate(
        &self,
        source: &str,
        context: &mut ExecutionContext,
        mode: ComputeMode,
    ) -> Evaluation {
        let program = match validator::analyze(
            source,
            &self.whitelist,
            &context.known_names(),
            &self.policy(),
        ) {
            Ok(program) => program,
            Err(rejection) => {
                tracing::debug!(kind = %rejection.kind, "expression rejected");
                return Evaluation::Failure {
                    kind: rejection.kind,
                    message: rejection.message,
                };
            }
        };

        let limits = EvalLimits {
            max_steps: self.config.max_eval_steps,
            deadline: Instant::now() + self.config.time_budget,
        };
        let evaluated = match ExpressionEvaluator::new(context, limits).eval_program(&program) {
            Ok(evaluated) => evaluated,
            Err(error) => {
                tracing::debug!(%error, "evaluation failed");
                return Evaluation::Failure {
                    kind: failure_kind(&error),
                    message: error.to_string(),
                };
            }
        };

        let rendered = evaluated.value.to_string();
        let ceiling = self.config.max_output_len(mode);
        if rendered.len() > ceiling {
            return Evaluation::Failure {
                kind: FailureKind::OutputTooLong,
                message: format!(
                    "result length {} exceeds maximum {}",
                    rendered.len(),
                    ceiling
                ),
            };
        }

        if let Some((name, value)) = evaluated.binding {
            context.set(name, value);
        }
        context.set(LAST_RESULT, Value::String(rendered.clone()));
        Evaluation::Success { value: rendered }
    }
}

fn failure_kind(error: &EvalError) -> FailureKind {
    match error {
        EvalError::Name(_) => FailureKind::NameError,
        EvalError::Type(_) => FailureKind::TypeMismatch,
        EvalError::Timeout => FailureKind::Timeout,
        EvalError::AssertionFailed | EvalError::Internal(_) => FailureKind::Unknown,
    }
}
