//! # Expression Validator
//!
//! Decides, before any execution, whether a candidate expression is safe to
//! run. Pure function of (source, whitelist, known context names): no side
//! effects, never touches the execution context.
//!
//! The checks run in order of increasing depth:
//!
//! 1. empty input and lexing failures surface as syntax errors
//! 2. a token pre-scan rejects statement keywords, multi-line input, and the
//!    policy-gated binding forms when the policy is off
//! 3. the parse itself rejects anything outside the expression grammar
//! 4. an AST walk checks every referenced name against the whitelist, the
//!    context's known names, and a hard deny list that no whitelist
//!    configuration can override

use std::collections::HashSet;

use lazy_static::lazy_static;

use super::ast::{Expr, IndexExpr, Program};
use super::eval::builtins;
use super::eval::context::LAST_RESULT;
use super::parser;
use super::tokenizer::{Token, TokenSpan, Tokenizer};
use super::FailureKind;

lazy_static! {
    /// Reflection, import and capability surfaces rejected regardless of the
    /// whitelist. Defense in depth: even a misconfigured whitelist cannot
    /// admit these.
    static ref DENIED_NAMES: HashSet<&'static str> = [
        "__import__",
        "getattr",
        "setattr",
        "delattr",
        "hasattr",
        "eval",
        "exec",
        "compile",
        "open",
        "input",
        "globals",
        "locals",
        "vars",
        "dir",
        "type",
        "super",
        "object",
        "memoryview",
        "breakpoint",
        "exit",
        "quit",
        "help",
    ]
    .into_iter()
    .collect();
}

/// A failed validation: the kind feeds retry logic, the message is shown to
/// the model verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub kind: FailureKind,
    pub message: String,
}

impl Rejection {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Policy switches that widen the expression-only rule.
#[derive(Debug, Clone, Copy)]
pub struct ValidationPolicy {
    /// Admit a single top-level `name = expr` binding and `assert expr`.
    pub allow_binding: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            allow_binding: true,
        }
    }
}

/// The closed set of callable names the sandbox admits. The default tables
/// come from the builtin implementations, so the whitelist can never drift
/// from what the evaluator actually provides.
#[derive(Debug, Clone)]
pub struct Whitelist {
    functions: HashSet<String>,
    methods: HashSet<String>,
}

impl Default for Whitelist {
    fn default() -> Self {
        Self {
            functions: builtins::FUNCTION_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            methods: builtins::METHOD_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Whitelist {
    pub fn allows_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    pub fn allows_method(&self, name: &str) -> bool {
        self.methods.contains(name)
    }
}

/// Full validation pipeline. Returns the parsed program so the evaluator
/// never re-parses what was just checked.
pub fn analyze(
    source: &str,
    whitelist: &Whitelist,
    known_names: &HashSet<String>,
    policy: &ValidationPolicy,
) -> Result<Program, Rejection> {
    if source.trim().is_empty() {
        return Err(Rejection::new(
            FailureKind::SyntaxError,
            "empty expression",
        ));
    }

    let spans = Tokenizer::new().tokenize(source).map_err(|e| {
        Rejection::new(FailureKind::SyntaxError, e.to_string())
    })?;

    scan_tokens(&spans, policy)?;

    let tokens: Vec<Token> = spans
        .into_iter()
        .map(|ts| ts.token)
        .filter(Token::is_significant)
        .collect();
    let program = parser::parse(&tokens)
        .map_err(|e| Rejection::new(FailureKind::SyntaxError, e.to_string()))?;

    check_program(&program, whitelist, known_names, policy)?;
    Ok(program)
}

/// Token-level rejection of statement forms, before the grammar gets a say.
fn scan_tokens(spans: &[TokenSpan], policy: &ValidationPolicy) -> Result<(), Rejection> {
    use super::tokenizer::{Keyword, Operator};

    let mut assignments = 0usize;
    let mut saw_newline = false;

    for span in spans {
        match &span.token {
            Token::Newline => saw_newline = true,
            token if !token.is_significant() => {}
            token => {
                if saw_newline {
                    return Err(Rejection::new(
                        FailureKind::DisallowedConstruct,
                        "expressions only, no multi-line code",
                    ));
                }
                match token {
                    Token::Keyword(k) if k.is_statement() => {
                        return Err(Rejection::new(
                            FailureKind::DisallowedConstruct,
                            format!("statement form '{}' is not allowed at {}", k, span.span),
                        ));
                    }
                    Token::Keyword(Keyword::Assert) if !policy.allow_binding => {
                        return Err(Rejection::new(
                            FailureKind::DisallowedConstruct,
                            "assertions are disabled by policy",
                        ));
                    }
                    Token::Operator(Operator::Assign) => {
                        if !policy.allow_binding {
                            return Err(Rejection::new(
                                FailureKind::DisallowedConstruct,
                                "assignment is disabled by policy",
                            ));
                        }
                        assignments += 1;
                        if assignments > 1 {
                            return Err(Rejection::new(
                                FailureKind::DisallowedConstruct,
                                "only a single top-level assignment is allowed",
                            ));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn check_program(
    program: &Program,
    whitelist: &Whitelist,
    known_names: &HashSet<String>,
    policy: &ValidationPolicy,
) -> Result<(), Rejection> {
    if let Program::Binding { name, .. } = program {
        if !policy.allow_binding {
            return Err(Rejection::new(
                FailureKind::DisallowedConstruct,
                "assignment is disabled by policy",
            ));
        }
        check_hard_denied(name)?;
        if whitelist.allows_function(name) {
            return Err(Rejection::new(
                FailureKind::DisallowedName,
                format!("cannot rebind builtin '{}'", name),
            ));
        }
    }

    let mut comp_scope = Vec::new();
    check_expr(
        program.value_expr(),
        whitelist,
        known_names,
        &mut comp_scope,
    )
}

/// Names carrying dunder shapes or on the deny list are out unconditionally.
fn check_hard_denied(name: &str) -> Result<(), Rejection> {
    if name.contains("__") || DENIED_NAMES.contains(name) {
        return Err(Rejection::new(
            FailureKind::DisallowedName,
            format!("name '{}' is not permitted", name),
        ));
    }
    Ok(())
}

fn check_expr(
    expr: &Expr,
    whitelist: &Whitelist,
    known_names: &HashSet<String>,
    comp_scope: &mut Vec<String>,
) -> Result<(), Rejection> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Name(name) => {
            check_hard_denied(name)?;
            let bound = name == LAST_RESULT
                || known_names.contains(name)
                || comp_scope.iter().any(|n| n == name);
            if bound {
                Ok(())
            } else {
                Err(Rejection::new(
                    FailureKind::DisallowedName,
                    format!("name '{}' is not whitelisted and not bound", name),
                ))
            }
        }
        Expr::List(items) | Expr::Tuple(items) => {
            for item in items {
                check_expr(item, whitelist, known_names, comp_scope)?;
            }
            Ok(())
        }
        Expr::Map(entries) => {
            for (key, value) in entries {
                check_expr(key, whitelist, known_names, comp_scope)?;
                check_expr(value, whitelist, known_names, comp_scope)?;
            }
            Ok(())
        }
        Expr::UnaryOp { operand, .. } => check_expr(operand, whitelist, known_names, comp_scope),
        Expr::BinaryOp { left, right, .. } => {
            check_expr(left, whitelist, known_names, comp_scope)?;
            check_expr(right, whitelist, known_names, comp_scope)
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            check_expr(condition, whitelist, known_names, comp_scope)?;
            check_expr(then_branch, whitelist, known_names, comp_scope)?;
            check_expr(else_branch, whitelist, known_names, comp_scope)
        }
        Expr::Index { value, index } => {
            check_expr(value, whitelist, known_names, comp_scope)?;
            match index.as_ref() {
                IndexExpr::Single(i) => check_expr(i, whitelist, known_names, comp_scope),
                IndexExpr::Slice { start, stop, step } => {
                    for bound in [start, stop, step].into_iter().flatten() {
                        check_expr(bound, whitelist, known_names, comp_scope)?;
                    }
                    Ok(())
                }
            }
        }
        Expr::Call {
            function,
            arguments,
        } => {
            check_hard_denied(function)?;
            if !whitelist.allows_function(function) {
                return Err(Rejection::new(
                    FailureKind::DisallowedName,
                    format!("function '{}' is not whitelisted", function),
                ));
            }
            for arg in arguments {
                check_expr(arg, whitelist, known_names, comp_scope)?;
            }
            Ok(())
        }
        Expr::MethodCall {
            receiver,
            method,
            arguments,
        } => {
            check_hard_denied(method)?;
            if method.starts_with('_') || !whitelist.allows_method(method) {
                return Err(Rejection::new(
                    FailureKind::DisallowedName,
                    format!("method '{}' is not whitelisted", method),
                ));
            }
            check_expr(receiver, whitelist, known_names, comp_scope)?;
            for arg in arguments {
                check_expr(arg, whitelist, known_names, comp_scope)?;
            }
            Ok(())
        }
        Expr::Attribute { attribute, .. } => {
            check_hard_denied(attribute)?;
            Err(Rejection::new(
                FailureKind::DisallowedConstruct,
                format!(
                    "attribute access '.{}' is limited to whitelisted method calls",
                    attribute
                ),
            ))
        }
        Expr::ListComp {
            element,
            binding,
            iterable,
            condition,
        } => {
            check_hard_denied(binding)?;
            check_expr(iterable, whitelist, known_names, comp_scope)?;
            comp_scope.push(binding.clone());
            let result = check_expr(element, whitelist, known_names, comp_scope).and_then(|_| {
                match condition {
                    Some(cond) => check_expr(cond, whitelist, known_names, comp_scope),
                    None => Ok(()),
                }
            });
            comp_scope.pop();
            result
        }
    }
}
