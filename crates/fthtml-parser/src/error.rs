//! Parse errors and their diagnostic projection.

use std::fmt;
use std::path::PathBuf;

use fthtml_lexer::{LexErrorKind, LexerError, Position, Token};
use serde::Serialize;

/// Broad class of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Lexical,
    Syntactic,
    Semantic,
    Resource,
}

/// Every failure the front end can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    // Lexical
    UnterminatedString,
    UnterminatedComment,
    UnterminatedEmbeddedBlock,
    IllegalCharacter,

    // Syntactic
    InvalidType,
    IncompleteElement,
    InvalidElementName,
    InvalidVariableName,
    InvalidKeyword,
    InvalidTinyTemplateName,

    // Semantic
    NotEnoughArguments { required: usize, given: usize },
    IllegalArgumentType,
    DuplicateId,
    InvalidTinyTemplatePlaceholder,

    // Resource
    Import,
}

impl ErrorKind {
    pub fn category(&self) -> Category {
        match self {
            ErrorKind::UnterminatedString
            | ErrorKind::UnterminatedComment
            | ErrorKind::UnterminatedEmbeddedBlock
            | ErrorKind::IllegalCharacter => Category::Lexical,
            ErrorKind::InvalidType
            | ErrorKind::IncompleteElement
            | ErrorKind::InvalidElementName
            | ErrorKind::InvalidVariableName
            | ErrorKind::InvalidKeyword
            | ErrorKind::InvalidTinyTemplateName => Category::Syntactic,
            ErrorKind::NotEnoughArguments { .. }
            | ErrorKind::IllegalArgumentType
            | ErrorKind::DuplicateId
            | ErrorKind::InvalidTinyTemplatePlaceholder => Category::Semantic,
            ErrorKind::Import => Category::Resource,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::UnterminatedString => "unterminated string",
            ErrorKind::UnterminatedComment => "unterminated comment",
            ErrorKind::UnterminatedEmbeddedBlock => "unterminated embedded block",
            ErrorKind::IllegalCharacter => "illegal character",
            ErrorKind::InvalidType => "invalid type",
            ErrorKind::IncompleteElement => "incomplete element",
            ErrorKind::InvalidElementName => "invalid element name",
            ErrorKind::InvalidVariableName => "invalid variable name",
            ErrorKind::InvalidKeyword => "invalid keyword",
            ErrorKind::InvalidTinyTemplateName => "invalid tiny template name",
            ErrorKind::NotEnoughArguments { .. } => "not enough arguments",
            ErrorKind::IllegalArgumentType => "illegal argument type",
            ErrorKind::DuplicateId => "duplicate id",
            ErrorKind::InvalidTinyTemplatePlaceholder => "invalid tiny template placeholder",
            ErrorKind::Import => "import error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<LexErrorKind> for ErrorKind {
    fn from(kind: LexErrorKind) -> Self {
        match kind {
            LexErrorKind::UnterminatedString => ErrorKind::UnterminatedString,
            LexErrorKind::UnterminatedComment => ErrorKind::UnterminatedComment,
            LexErrorKind::UnterminatedEmbeddedBlock => ErrorKind::UnterminatedEmbeddedBlock,
            LexErrorKind::IllegalCharacter => ErrorKind::IllegalCharacter,
        }
    }
}

/// One import site an error passed through on its way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub file: Option<PathBuf>,
    pub position: Position,
    pub message: String,
}

/// Parser error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error at line {}, column {}: {message}", .position.line, .position.column)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Position,
    /// The offending token, when there is one.
    pub token: Option<Token>,
    /// What the parser was looking for.
    pub expected: Option<String>,
    /// File the error occurred in, when parsing from disk.
    pub file: Option<PathBuf>,
    /// Import sites between the document being checked and `file`,
    /// innermost first.
    pub stack: Vec<StackFrame>,
}

impl ParseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            message: message.into(),
            position,
            token: None,
            expected: None,
            file: None,
            stack: Vec::new(),
        }
    }

    pub fn at_token(kind: ErrorKind, message: impl Into<String>, token: &Token) -> Self {
        let mut error = Self::new(kind, message, token.position);
        error.token = Some(token.clone());
        error
    }

    pub fn expecting(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Project onto the editor diagnostic shape.
    ///
    /// An error raised inside an imported file is reported at the outermost
    /// import site, with the real location first in the related stack.
    pub fn diagnostic(&self) -> Diagnostic {
        let Some(outermost) = self.stack.last() else {
            return Diagnostic {
                message: self.message.clone(),
                position: Range::from(self.position),
                related_stack: Vec::new(),
            };
        };

        let mut related_stack = vec![RelatedInformation {
            location: Location::new(self.file.as_ref(), self.position),
            message: self.message.clone(),
        }];
        related_stack.extend(self.stack[..self.stack.len() - 1].iter().map(|frame| {
            RelatedInformation {
                location: Location::new(frame.file.as_ref(), frame.position),
                message: frame.message.clone(),
            }
        }));

        Diagnostic {
            message: format!("{} ({})", self.message, outermost.message),
            position: Range::from(outermost.position),
            related_stack,
        }
    }
}

impl From<LexerError> for ParseError {
    fn from(e: LexerError) -> Self {
        ParseError::new(
            e.kind.into(),
            e.message,
            Position::single_line(e.line, e.column, 1),
        )
    }
}

// --- Diagnostics ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    pub position: Range,
    pub related_stack: Vec<RelatedInformation>,
}

/// A single-line range: `start`/`end` are 1-based columns on `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl From<Position> for Range {
    fn from(p: Position) -> Self {
        let end = if p.end_line == p.line { p.end } else { p.column + 1 };
        Range {
            line: p.line,
            start: p.column,
            end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl Location {
    fn new(file: Option<&PathBuf>, position: Position) -> Self {
        let range = Range::from(position);
        Self {
            file: file.map(|f| f.display().to_string()).unwrap_or_default(),
            line: range.line,
            start: range.start,
            end: range.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedInformation {
    pub location: Location,
    pub message: String,
}
