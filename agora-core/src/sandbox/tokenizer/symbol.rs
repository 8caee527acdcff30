//! # Symbol Token Handling
//!
//! Operators and delimiters of the expression language. Multi-character
//! operators (`**`, `//`, `==`, `!=`, `<=`, `>=`) are matched before their
//! single-character prefixes so `x ** y` never lexes as two `*` tokens.

use strum_macros::{AsRefStr, Display, EnumString};

use nom::{branch::alt, bytes::complete::tag, combinator::map, combinator::value, error::context};

use super::token::{ParserResult, Token};

/// Operators of the sandbox expression language.
#[derive(Debug, Clone, PartialEq, EnumString, Display, AsRefStr)]
pub enum Operator {
    /// Exponentiation (`**`)
    #[strum(serialize = "**")]
    Pow,
    /// Floor division (`//`)
    #[strum(serialize = "//")]
    FloorDiv,
    /// Equality comparison (`==`)
    #[strum(serialize = "==")]
    EqualEqual,
    /// Inequality comparison (`!=`)
    #[strum(serialize = "!=")]
    NotEqual,
    /// Greater than or equal (`>=`)
    #[strum(serialize = ">=")]
    GreaterEqual,
    /// Less than or equal (`<=`)
    #[strum(serialize = "<=")]
    LessEqual,
    /// Greater than (`>`)
    #[strum(serialize = ">")]
    Greater,
    /// Less than (`<`)
    #[strum(serialize = "<")]
    Less,
    /// Addition / concatenation (`+`)
    #[strum(serialize = "+")]
    Plus,
    /// Subtraction / negation (`-`)
    #[strum(serialize = "-")]
    Minus,
    /// Multiplication / repetition (`*`)
    #[strum(serialize = "*")]
    Star,
    /// Division (`/`)
    #[strum(serialize = "/")]
    Slash,
    /// Modulo (`%`)
    #[strum(serialize = "%")]
    Percent,
    /// Method access (`.`)
    #[strum(serialize = ".")]
    Dot,
    /// Top-level binding (`=`), admitted only under the binding policy.
    #[strum(serialize = "=")]
    Assign,
}

/// Delimiters of the sandbox expression language.
#[derive(Debug, Clone, PartialEq, EnumString, Display, AsRefStr)]
pub enum Delimiter {
    /// Opening parenthesis (`(`)
    #[strum(serialize = "(")]
    OpenParen,
    /// Closing parenthesis (`)`)
    #[strum(serialize = ")")]
    CloseParen,
    /// Opening bracket (`[`)
    #[strum(serialize = "[")]
    OpenBracket,
    /// Closing bracket (`]`)
    #[strum(serialize = "]")]
    CloseBracket,
    /// Opening brace (`{`)
    #[strum(serialize = "{")]
    OpenBrace,
    /// Closing brace (`}`)
    #[strum(serialize = "CLOSE_BRACE")]
    CloseBrace,
    /// Comma (`,`)
    #[strum(serialize = ",")]
    Comma,
    /// Colon (`:`) for slices and map displays
    #[strum(serialize = ":")]
    Colon,
}

/// Parses an operator token, longest match first.
#[tracing::instrument(level = "trace", skip(input))]
pub fn parse_operator(input: &str) -> ParserResult<Token> {
    context(
        "operator",
        map(
            alt((
                // Multi-character operators first
                value(Operator::Pow, tag("**")),
                value(Operator::FloorDiv, tag("//")),
                value(Operator::EqualEqual, tag("==")),
                value(Operator::NotEqual, tag("!=")),
                value(Operator::GreaterEqual, tag(">=")),
                value(Operator::LessEqual, tag("<=")),
                // Single-character operators
                value(Operator::Greater, tag(">")),
                value(Operator::Less, tag("<")),
                value(Operator::Plus, tag("+")),
                value(Operator::Minus, tag("-")),
                value(Operator::Star, tag("*")),
                value(Operator::Slash, tag("/")),
                value(Operator::Percent, tag("%")),
                value(Operator::Dot, tag(".")),
                value(Operator::Assign, tag("=")),
            )),
            Token::Operator,
        ),
    )(input)
}

/// Parses a delimiter token.
#[tracing::instrument(level = "trace", skip(input))]
pub fn parse_delimiter(input: &str) -> ParserResult<Token> {
    context(
        "delimiter",
        map(
            alt((
                value(Delimiter::OpenParen, tag("(")),
                value(Delimiter::CloseParen, tag(")")),
                value(Delimiter::OpenBracket, tag("[")),
                value(Delimiter::CloseBracket, tag("]")),
                value(Delimiter::OpenBrace, tag("{")),
                value(Delimiter::CloseBrace, tag("}")),
                value(Delimiter::Comma, tag(",")),
                value(Delimiter::Colon, tag(":")),
            )),
            Token::Delimiter,
        ),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_char_operators_win() {
        let (rest, token) = parse_operator("** y").unwrap();
        assert_eq!(token, Token::Operator(Operator::Pow));
        assert_eq!(rest, " y");

        let (rest, token) = parse_operator("//2").unwrap();
        assert_eq!(token, Token::Operator(Operator::FloorDiv));
        assert_eq!(rest, "2");

        let (rest, token) = parse_operator("==1").unwrap();
        assert_eq!(token, Token::Operator(Operator::EqualEqual));
        assert_eq!(rest, "1");
    }

    #[test]
    fn test_single_char_operators() {
        let cases = [
            ("+", Operator::Plus),
            ("-", Operator::Minus),
            ("*", Operator::Star),
            ("/", Operator::Slash),
            ("%", Operator::Percent),
            (".", Operator::Dot),
            ("=", Operator::Assign),
        ];
        for (input, expected) in cases {
            let (rest, token) = parse_operator(input).unwrap();
            assert_eq!(token, Token::Operator(expected));
            assert_eq!(rest, "");
        }
    }

    #[test]
    fn test_delimiters() {
        let (rest, token) = parse_delimiter("[1]").unwrap();
        assert_eq!(token, Token::Delimiter(Delimiter::OpenBracket));
        assert_eq!(rest, "1]");

        let (rest, token) = parse_delimiter(":]").unwrap();
        assert_eq!(token, Token::Delimiter(Delimiter::Colon));
        assert_eq!(rest, "]");
    }

    #[test]
    fn test_unknown_symbol_fails() {
        assert!(parse_operator("@").is_err());
        assert!(parse_delimiter(";").is_err());
    }
}
