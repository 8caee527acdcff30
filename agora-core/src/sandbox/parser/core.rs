//! # Core Parser Definitions
//!
//! The fundamental parser interface and error types underlying the expression
//! grammar's combinator system.

use thiserror::Error;

/// Core parsing interface.
///
/// A parser takes an input slice and a position and either succeeds with a new
/// position and an output value, or fails with a [`ParseError`].
pub trait Parser<I, O> {
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O>;
}

impl<I, O> Parser<I, O> for Box<dyn Parser<I, O> + '_> {
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O> {
        (**self).parse(input, pos)
    }
}

pub type ParseResult<O> = Result<(usize, O), ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    Eof,
    #[error("no alternative matched")]
    NoAlternative,
    #[error("{0}")]
    Fail(String),
    #[error("{message}: {inner}")]
    WithContext {
        message: String,
        inner: Box<ParseError>,
    },
}
