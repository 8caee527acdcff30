//! Literal tokens: single- or double-quoted strings with escapes, integers,
//! floats, booleans and `None`. Numeric literals are unsigned here; a leading
//! `-` lexes as an operator and becomes unary negation in the parser.

use core::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{anychar, char, digit1, satisfy},
    combinator::{map, map_res, not, peek, recognize, value},
    error::context,
    multi::fold_many0,
    sequence::{delimited, preceded, tuple},
};

use super::token::{ParserResult, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Boolean(true) => write!(f, "True"),
            Literal::Boolean(false) => write!(f, "False"),
            Literal::Null => write!(f, "None"),
        }
    }
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

fn parse_string_body<'a>(quote: char) -> impl FnMut(&'a str) -> ParserResult<'a, String> {
    fold_many0(
        alt((
            preceded(char('\\'), map(anychar, unescape)),
            satisfy(move |c| c != quote && c != '\\' && c != '\n' && c != '\r'),
        )),
        String::new,
        |mut acc, c| {
            acc.push(c);
            acc
        },
    )
}

#[tracing::instrument(level = "trace", skip(input))]
fn parse_string_literal(input: &str) -> ParserResult<Literal> {
    context(
        "string literal",
        map(
            alt((
                delimited(char('\''), parse_string_body('\''), char('\'')),
                delimited(char('"'), parse_string_body('"'), char('"')),
            )),
            Literal::String,
        ),
    )(input)
}

#[tracing::instrument(level = "trace", skip(input))]
fn parse_float_literal(input: &str) -> ParserResult<Literal> {
    context(
        "float literal",
        map_res(recognize(tuple((digit1, char('.'), digit1))), |s: &str| {
            s.parse::<f64>().map(Literal::Float)
        }),
    )(input)
}

#[tracing::instrument(level = "trace", skip(input))]
fn parse_integer_literal(input: &str) -> ParserResult<Literal> {
    context(
        "integer literal",
        map_res(digit1, |s: &str| s.parse::<i64>().map(Literal::Integer)),
    )(input)
}

/// Word-boundary guard so `True` matches but `Trued` stays an identifier.
fn word_end(input: &str) -> ParserResult<()> {
    not(peek(take_while1(|c: char| c.is_alphanumeric() || c == '_')))(input)
}

#[tracing::instrument(level = "trace", skip(input))]
fn parse_named_literal(input: &str) -> ParserResult<Literal> {
    context(
        "named literal",
        alt((
            value(Literal::Boolean(true), tuple((tag("True"), word_end))),
            value(Literal::Boolean(false), tuple((tag("False"), word_end))),
            value(Literal::Null, tuple((tag("None"), word_end))),
        )),
    )(input)
}

#[tracing::instrument(level = "trace", skip(input))]
pub fn parse_literal(input: &str) -> ParserResult<Token> {
    context(
        "literal",
        map(
            alt((
                parse_string_literal,
                parse_float_literal,
                parse_integer_literal,
                parse_named_literal,
            )),
            Token::Literal,
        ),
    )(input)
}
