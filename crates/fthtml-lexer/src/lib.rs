//! ftHTML Lexer
//!
//! Tokenizes `.fthtml` source into a lazy stream of position-tagged tokens.
//! Owns the grammar registry (keywords, pragmas, functions, macros, ...)
//! and a tolerant reverse scanner used for completion contexts.
//!
//! # Example
//!
//! ```
//! use fthtml_lexer::{Scanner, TokenKind};
//!
//! let tokens = Scanner::tokenize("div(#main) \"Hello\"").unwrap();
//! assert_eq!(tokens[0].kind, TokenKind::Word);
//! assert_eq!(tokens[2].kind, TokenKind::AttrId);
//! ```

pub mod grammar;
pub mod reverse;
pub mod scanner;
pub mod token;

pub use grammar::Grammar;
pub use scanner::{Scanner, TokenStream};
pub use token::{Position, Span, Token, TokenKind};

/// What went wrong while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedString,
    UnterminatedComment,
    UnterminatedEmbeddedBlock,
    IllegalCharacter,
}

/// Lexer error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Lexer error at line {line}, column {column}: {message}")]
pub struct LexerError {
    pub kind: LexErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}
