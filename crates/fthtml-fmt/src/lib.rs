//! ftHTML Formatter
//!
//! Pretty-prints parsed ftHTML documents and converts pasted HTML into
//! ftHTML. Layout is driven by [`FormatStyle`] (project settings) and
//! [`FormattingOptions`] (editor whitespace settings).
//!
//! ```
//! use fthtml_fmt::{format_source, FormatStyle, FormattingOptions};
//!
//! let out = format_source(
//!     "div(.b .a) { span \"x\" }",
//!     &FormatStyle::default(),
//!     &FormattingOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(out, "div(.a .b) { span \"x\" }");
//! ```

pub mod html;
pub mod printer;
pub mod style;

use fthtml_lexer::grammar;
use fthtml_parser::{Element, ParseError, Parser, ProjectConfig};
use tracing::warn;

pub use html::convert_html_fragment;
pub use printer::Printer;
pub use style::{AttributeStyle, BraceStyle, FormatStyle, FormattingOptions, PasteStyle};

/// Print an already parsed document.
pub fn format(elements: &[Element], style: &FormatStyle, options: &FormattingOptions) -> String {
    Printer::new(style, options).print(elements)
}

/// Parse and print `source` without project settings.
pub fn format_source(
    source: &str,
    style: &FormatStyle,
    options: &FormattingOptions,
) -> Result<String, ParseError> {
    let elements = Parser::parse_source(source)?;
    Ok(format(&elements, style, options))
}

/// Format a document the way an editor does: with the project's global tiny
/// templates in scope, and no edit at all when the document does not parse.
pub fn format_document(
    source: &str,
    config: Option<&ProjectConfig>,
    style: &FormatStyle,
    options: &FormattingOptions,
) -> Option<String> {
    match Parser::new(source, grammar::standard(), config).parse() {
        Ok(elements) => Some(format(&elements, style, options)),
        Err(e) => {
            warn!(error = %e, "document not formatted");
            None
        }
    }
}
