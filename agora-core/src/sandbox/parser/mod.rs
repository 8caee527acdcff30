//! # Expression Parser
//!
//! Transforms the tokenizer's output into the expression AST using a parser
//! combinator pattern: a core [`Parser`](core::Parser) trait, small composable
//! combinators, and grammar rules built from them.
//!
//! ```text
//! Source Code → Tokenizer → Parser → Validator → Evaluator
//! ```

pub mod combinators;
pub mod core;
pub mod expression;
pub mod prelude;

pub use core::{ParseError, ParseResult, Parser};
pub use expression::{parse, parse_expression, parse_program};
