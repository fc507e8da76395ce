//! ftHTML Parser
//!
//! Parses a token stream into a lossless concrete syntax tree, resolving
//! imports, `#vars` declarations and tiny templates along the way.
//!
//! ```
//! use fthtml_parser::{NodeKind, Parser};
//!
//! let elements = Parser::parse_source("div(.card) { p \"Hello\" }").unwrap();
//! assert_eq!(elements[0].kind, NodeKind::Tag);
//! assert!(elements[0].is_parent_element());
//! ```

pub mod condition;
pub mod config;
pub mod cst;
pub mod error;
pub mod parser;
pub mod symbols;
pub mod vars;

pub use config::{ConfigError, ProjectConfig};
pub use cst::{AttributeSet, Delimiters, Element, NodeKind, SymbolKind};
pub use error::{Category, Diagnostic, ErrorKind, ParseError};
pub use parser::Parser;
pub use symbols::{document_symbols, DocumentSymbol};
pub use vars::{ParserVariables, Scope, TinyTemplate};
