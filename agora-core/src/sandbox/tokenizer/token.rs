use core::fmt;

use nom::{
    branch::alt,
    error::VerboseError,
    IResult,
};
use thiserror::Error;

use super::{
    keyword::{parse_word, Keyword},
    literal::{parse_literal, Literal},
    symbol::{parse_delimiter, parse_operator, Delimiter, Operator},
    whitespace::{parse_newline, parse_whitespace},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    Identifier(String),
    Operator(Operator),
    Delimiter(Delimiter),
    Literal(Literal),
    // Formatting
    Whitespace(String),
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Keyword(k) => write!(f, "{}", k),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Operator(op) => write!(f, "{}", op),
            Token::Delimiter(d) => write!(f, "{}", d),
            Token::Literal(lit) => write!(f, "{}", lit),
            Token::Whitespace(_) => write!(f, "<whitespace>"),
            Token::Newline => write!(f, "<newline>"),
        }
    }
}

impl Token {
    /// Whether the token carries meaning for the parser (formatting tokens
    /// are stripped before parsing).
    pub fn is_significant(&self) -> bool {
        !matches!(self, Token::Whitespace(_) | Token::Newline)
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    current_position: usize,
    current_line: usize,
    current_column: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            current_position: 0,
            current_line: 1,   // 1-based
            current_column: 1, // 1-based
        }
    }

    #[tracing::instrument(level = "debug", skip(self, input))]
    pub fn tokenize(&mut self, input: &str) -> Result<Vec<TokenSpan>, TokenizerError> {
        let mut tokens = Vec::new();
        let mut remaining = input;

        while !remaining.is_empty() {
            let start_position = self.current_position;
            let start_line = self.current_line;
            let start_column = self.current_column;

            let result = alt((
                // Formatting
                parse_whitespace,
                parse_newline,
                // Literals before words so True/False/None never become identifiers
                parse_literal,
                parse_word,
                parse_operator,
                parse_delimiter,
            ))(remaining);

            match result {
                Ok((new_remaining, token)) => {
                    let consumed = &remaining[..(remaining.len() - new_remaining.len())];
                    self.update_position(consumed);

                    tokens.push(TokenSpan {
                        token,
                        span: Span {
                            start: start_position,
                            end: self.current_position,
                            line: start_line,
                            column: start_column,
                        },
                    });

                    remaining = new_remaining;
                }
                Err(_) => {
                    let found = remaining.chars().take(20).collect::<String>();
                    let error = TokenizerError::UnexpectedInput {
                        found,
                        span: Span {
                            start: self.current_position,
                            end: self.current_position + 1,
                            line: self.current_line,
                            column: self.current_column,
                        },
                    };
                    tracing::debug!("{}", error);
                    return Err(error);
                }
            }
        }

        Ok(tokens)
    }

    fn update_position(&mut self, text: &str) {
        for c in text.chars() {
            self.current_position += c.len_utf8();
            if c == '\n' {
                self.current_line += 1;
                self.current_column = 1;
            } else {
                self.current_column += 1;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenizerError {
    #[error("unexpected input {found:?} at {span}")]
    UnexpectedInput { found: String, span: Span },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant(input: &str) -> Vec<Token> {
        Tokenizer::new()
            .tokenize(input)
            .unwrap()
            .into_iter()
            .map(|ts| ts.token)
            .filter(Token::is_significant)
            .collect()
    }

    #[test]
    fn test_reversal_expression() {
        let tokens = significant("'NcS9euQa'[::-1]");
        assert_eq!(
            tokens,
            vec![
                Token::Literal(Literal::String("NcS9euQa".to_string())),
                Token::Delimiter(Delimiter::OpenBracket),
                Token::Delimiter(Delimiter::Colon),
                Token::Delimiter(Delimiter::Colon),
                Token::Operator(Operator::Minus),
                Token::Literal(Literal::Integer(1)),
                Token::Delimiter(Delimiter::CloseBracket),
            ]
        );
    }

    #[test]
    fn test_method_call_expression() {
        let tokens = significant("last_result.upper()");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("last_result".to_string()),
                Token::Operator(Operator::Dot),
                Token::Identifier("upper".to_string()),
                Token::Delimiter(Delimiter::OpenParen),
                Token::Delimiter(Delimiter::CloseParen),
            ]
        );
    }

    #[test]
    fn test_statement_keyword_is_tokenized() {
        let tokens = significant("import os");
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Import),
                Token::Identifier("os".to_string()),
            ]
        );
    }

    #[test]
    fn test_position_tracking() {
        let mut tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("x\ny").unwrap();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[0].span.column, 1);
        assert_eq!(tokens[2].span.line, 2);
        assert_eq!(tokens[2].span.column, 1);
        assert_eq!(tokens[2].token, Token::Identifier("y".to_string()));
    }

    #[test]
    fn test_unexpected_input() {
        let mut tokenizer = Tokenizer::new();
        let result = tokenizer.tokenize("a ; b");
        assert!(matches!(
            result,
            Err(TokenizerError::UnexpectedInput { .. })
        ));
    }

    #[test]
    fn test_dunder_is_still_an_identifier() {
        // The tokenizer is permissive here; the validator rejects dunders.
        let tokens = significant("__import__");
        assert_eq!(tokens, vec![Token::Identifier("__import__".to_string())]);
    }
}
