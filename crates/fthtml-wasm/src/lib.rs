//! WASM bindings for the ftHTML editor tooling.
//!
//! Exposes formatting, diagnostics, HTML paste conversion, the document
//! outline and completion context to JavaScript via wasm-bindgen. Style and
//! option arguments are plain JS objects; `undefined` or `null` selects the
//! defaults.

use fthtml_fmt::{FormatStyle, FormattingOptions};
use fthtml_lexer::reverse;
use fthtml_parser::{document_symbols, Diagnostic, DocumentSymbol, Parser};
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

/// Format a document. Returns `undefined` when it does not parse.
#[wasm_bindgen]
pub fn format(source: &str, style: JsValue, options: JsValue) -> Result<Option<String>, JsError> {
    let style: FormatStyle = from_js_or_default(style)?;
    let options: FormattingOptions = from_js_or_default(options)?;
    Ok(fthtml_fmt::format_document(source, None, &style, &options))
}

/// Diagnostics for a document: an empty array, or one entry describing the
/// first error with its import chain.
#[wasm_bindgen]
pub fn diagnostics(source: &str) -> Result<JsValue, JsError> {
    to_js(&diagnostic_list(source))
}

/// Convert pasted HTML. Returns `undefined` when the text is not HTML.
#[wasm_bindgen(js_name = convertHtml)]
pub fn convert_html(
    html: &str,
    indent: usize,
    style: JsValue,
    options: JsValue,
) -> Result<Option<String>, JsError> {
    let style: FormatStyle = from_js_or_default(style)?;
    let options: FormattingOptions = from_js_or_default(options)?;
    Ok(fthtml_fmt::convert_html_fragment(html, indent, &style, &options))
}

/// The document outline.
#[wasm_bindgen]
pub fn symbols(source: &str, include_tag_names: bool) -> Result<JsValue, JsError> {
    let outline = outline(source, include_tag_names).map_err(|e| JsError::new(&e))?;
    to_js(&outline)
}

/// Values of the last tokens before the cursor, oldest first.
#[wasm_bindgen(js_name = completionContext)]
pub fn completion_context(text: &str) -> js_sys::Array {
    completion_tokens(text)
        .into_iter()
        .map(JsValue::from)
        .collect()
}

/// Get the tooling version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// --- Native implementations ---

fn diagnostic_list(source: &str) -> Vec<Diagnostic> {
    match Parser::parse_source(source) {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.diagnostic()],
    }
}

fn outline(source: &str, include_tag_names: bool) -> Result<Vec<DocumentSymbol>, String> {
    let elements = Parser::parse_source(source).map_err(|e| e.to_string())?;
    Ok(document_symbols(&elements, include_tag_names))
}

fn completion_tokens(text: &str) -> Vec<String> {
    reverse::tokens_ending_at(text, 4)
        .into_iter()
        .map(|token| token.source_text())
        .collect()
}

fn from_js_or_default<T: DeserializeOwned + Default>(value: JsValue) -> Result<T, JsError> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| JsError::new(&e.to_string()))
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsError::new(&e.to_string()))
}
