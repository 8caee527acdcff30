//! Whitespace and newline handling. Newlines are preserved as tokens so the
//! validator can reject multi-line submissions with a precise error instead of
//! a parse failure.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    combinator::map,
    error::context,
};

use super::token::{ParserResult, Token};

/// Parses a run of spaces and tabs.
#[tracing::instrument(level = "trace", skip(input))]
pub fn parse_whitespace(input: &str) -> ParserResult<Token> {
    context(
        "whitespace",
        map(take_while1(|c| c == ' ' || c == '\t'), |ws: &str| {
            Token::Whitespace(ws.to_string())
        }),
    )(input)
}

/// Parses a single line break, Unix or Windows style.
#[tracing::instrument(level = "trace", skip(input))]
pub fn parse_newline(input: &str) -> ParserResult<Token> {
    context(
        "newline",
        map(alt((tag("\r\n"), tag("\n"))), |_| Token::Newline),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace() {
        let (rest, token) = parse_whitespace("  \tx").unwrap();
        assert_eq!(token, Token::Whitespace("  \t".to_string()));
        assert_eq!(rest, "x");
    }

    #[test]
    fn test_newline() {
        let (rest, token) = parse_newline("\nrest").unwrap();
        assert_eq!(token, Token::Newline);
        assert_eq!(rest, "rest");

        let (rest, token) = parse_newline("\r\nrest").unwrap();
        assert_eq!(token, Token::Newline);
        assert_eq!(rest, "rest");
    }

    #[test]
    fn test_error() {
        assert!(parse_whitespace("x").is_err());
        assert!(parse_newline("x").is_err());
    }
}
