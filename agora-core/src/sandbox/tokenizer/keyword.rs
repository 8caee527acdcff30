//! # Keyword Token Handling
//!
//! Keywords come in two groups:
//!
//! * **Expression keywords**: `if`, `else`, `for`, `in`, `and`, `or`, `not` —
//!   legal inside the expression grammar (conditionals, comprehensions,
//!   membership and boolean operators).
//! * **Statement keywords**: `import`, `def`, `class`, `while`, `lambda`, ... —
//!   tokenized so the validator can reject them as disallowed constructs, plus
//!   `assert`, which is only admitted under the single-binding policy flag.
//!
//! Keywords are matched with a word boundary so identifiers that merely start
//! with a keyword (`information`, `order`) are not misclassified.

use std::str::FromStr;

use nom::{
    bytes::complete::{take_while, take_while1},
    combinator::recognize,
    error::context,
    sequence::pair,
};

use super::token::{ParserResult, Token};

/// Keywords recognized by the sandbox expression language.
#[derive(
    Debug, Clone, PartialEq, strum::EnumString, strum::Display, strum::EnumIter, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    /// Conditional expression / comprehension filter.
    If,
    /// Conditional expression alternative.
    Else,
    /// Comprehension iteration.
    For,
    /// Membership test and comprehension source.
    In,
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
    /// Logical negation (also `not in`).
    Not,
    /// One-shot assertion, admitted only under the binding policy.
    Assert,
    // Statement keywords, recognized purely so they can be rejected.
    Import,
    From,
    Def,
    Class,
    While,
    Lambda,
    Return,
    Del,
    Global,
    Nonlocal,
    With,
    Try,
    Except,
    Finally,
    Raise,
    Yield,
    Pass,
    Break,
    Continue,
}

impl Keyword {
    /// Whether this keyword introduces a statement form the sandbox forbids.
    ///
    /// `assert` is excluded here: its admissibility depends on the binding
    /// policy, which the validator checks separately.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Keyword::Import
                | Keyword::From
                | Keyword::Def
                | Keyword::Class
                | Keyword::While
                | Keyword::Lambda
                | Keyword::Return
                | Keyword::Del
                | Keyword::Global
                | Keyword::Nonlocal
                | Keyword::With
                | Keyword::Try
                | Keyword::Except
                | Keyword::Finally
                | Keyword::Raise
                | Keyword::Yield
                | Keyword::Pass
                | Keyword::Break
                | Keyword::Continue
        )
    }
}

/// Parses a word (keyword or identifier) from the input string.
///
/// A word is a maximal run of `[A-Za-z_][A-Za-z0-9_]*`; taking the whole run
/// gives keyword matching its word boundary for free. If the word is a known
/// keyword it becomes a [`Token::Keyword`], otherwise a [`Token::Identifier`].
#[tracing::instrument(level = "trace", skip(input))]
pub fn parse_word(input: &str) -> ParserResult<Token> {
    let (input, word) = context(
        "word",
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
    )(input)?;

    if let Ok(keyword) = Keyword::from_str(word) {
        return Ok((input, Token::Keyword(keyword)));
    }

    Ok((input, Token::Identifier(word.to_string())))
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_keywords() {
        let test_cases = [
            ("if x", Keyword::If),
            ("for item", Keyword::For),
            ("in xs", Keyword::In),
            ("not done", Keyword::Not),
            ("import os", Keyword::Import),
            ("lambda x", Keyword::Lambda),
        ];

        for (input, expected_keyword) in test_cases.iter() {
            let (rest, token) = parse_word(input).unwrap();
            assert_eq!(token, Token::Keyword(expected_keyword.clone()));
            assert!(rest.starts_with(' '));
        }
    }

    #[test]
    fn test_all_keywords_round_trip() {
        for keyword_string in Keyword::iter().map(|k| k.to_string()) {
            let (rest, token) = parse_word(&keyword_string).unwrap();
            let keyword = Keyword::from_str(&keyword_string).unwrap();
            assert_eq!(token, Token::Keyword(keyword));
            assert_eq!(rest, "");
        }
    }

    #[test]
    fn test_keyword_boundary() {
        // Words that merely start with a keyword stay identifiers.
        let test_cases = ["iffy", "information", "fortune", "classes", "delta"];
        for input in test_cases.iter() {
            let (rest, token) = parse_word(input).unwrap();
            assert_eq!(token, Token::Identifier(input.to_string()), "{}", input);
            assert_eq!(rest, "");
        }
    }

    #[test]
    fn test_statement_classification() {
        assert!(Keyword::Import.is_statement());
        assert!(Keyword::While.is_statement());
        assert!(Keyword::Lambda.is_statement());
        assert!(!Keyword::If.is_statement());
        assert!(!Keyword::In.is_statement());
        assert!(!Keyword::Assert.is_statement());
    }
}
