//! # Expression Tokenizer
//!
//! Lexical analysis for the sandbox expression language, transforming raw model
//! output into a structured token stream for the parser.
//!
//! ## Design Principles
//!
//! * **Position tracking**: every token carries line/column/offset information so
//!   rejections can point at the offending spot.
//! * **Statement keywords are tokens too**: forms the sandbox forbids (`import`,
//!   `def`, `while`, ...) are tokenized rather than failing the lexer, so the
//!   validator can reject them structurally with a precise error kind instead of
//!   an opaque syntax error.
//! * **Whitespace preservation**: whitespace and newlines become tokens; the
//!   validator uses newline tokens to reject multi-line submissions before the
//!   parser ever runs.
//!
//! ## Component Structure
//!
//! * [`token`]: core token types and the tokenizer loop
//! * [`keyword`]: expression and statement keywords
//! * [`symbol`]: operators and delimiters
//! * [`literal`]: string, number, boolean and `None` literals
//! * [`whitespace`]: whitespace and newline handling

pub mod keyword;
pub mod literal;
pub mod symbol;
pub mod token;
pub mod whitespace;

pub use keyword::Keyword;
pub use literal::Literal;
pub use symbol::{Delimiter, Operator};
pub use token::{Span, Token, TokenSpan, Tokenizer, TokenizerError};
