//! Conversion of pasted HTML into ftHTML.
//!
//! A small tolerant HTML reader builds a node tree, which is then written
//! out with the formatter's brace and attribute rules. Comments are
//! dropped; `<script>` and `<style>` without attributes become `js` / `css`
//! blocks.

use std::sync::LazyLock;

use fthtml_lexer::{grammar, TokenKind};
use regex::Regex;

use crate::printer::{AttributeParts, Printer};
use crate::style::{FormatStyle, FormattingOptions};

/// Attribute values that can be written without quotes.
static BARE_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w-][\w.-]*[\w-]$").expect("valid pattern"));

/// Convert an HTML fragment to ftHTML, indented `indent` levels.
///
/// Returns `None` unless the trimmed input starts with `<` and ends with
/// `>` and contains at least one element.
pub fn convert_html_fragment(
    html: &str,
    indent: usize,
    style: &FormatStyle,
    options: &FormattingOptions,
) -> Option<String> {
    let html = html.trim();
    if !html.starts_with('<') || !html.ends_with('>') {
        return None;
    }

    let nodes: Vec<Node> = HtmlReader::new(html)
        .read()
        .into_iter()
        .filter(|node| !matches!(node, Node::Text(_)))
        .collect();
    if nodes.is_empty() {
        return None;
    }

    let converter = Converter {
        printer: Printer::new(style, options),
        quote: style.on_paste_html.quotation_mark,
        options,
    };
    let mut out = String::new();
    for node in &nodes {
        converter.node(node, indent, &mut out);
    }
    Some(out)
}

// =============================================================================
// HTML reader
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Doctype(String),
    Text(String),
    Element(HtmlElement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HtmlElement {
    tag: String,
    /// In source order; a bare attribute has no value.
    attributes: Vec<(String, Option<String>)>,
    children: Vec<Node>,
    /// Raw text between the start and end tags. `None` for void elements.
    inner: Option<String>,
}

impl HtmlElement {
    fn has_element_children(&self) -> bool {
        self.children.iter().any(|c| matches!(c, Node::Element(_)))
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

struct HtmlReader {
    chars: Vec<char>,
    pos: usize,
}

impl HtmlReader {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn read(&mut self) -> Vec<Node> {
        let mut open = Vec::new();
        self.content(None, &mut open).0
    }

    /// Read nodes until the end tag of `parent`, returning them and the
    /// offset the end tag starts at.
    fn content(&mut self, parent: Option<&str>, open: &mut Vec<String>) -> (Vec<Node>, usize) {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while !self.is_at_end() {
            if self.starts_with("<!--") {
                self.skip_past("-->");
                continue;
            }

            if self.starts_with("</") {
                let start = self.pos;
                self.pos += 2;
                let name = self.name().to_ascii_lowercase();

                if parent == Some(name.as_str()) {
                    self.skip_past(">");
                    flush_text(&mut text, &mut nodes);
                    return (nodes, start);
                }
                if open.contains(&name) {
                    // closes an ancestor, which closes this element too
                    self.pos = start;
                    flush_text(&mut text, &mut nodes);
                    return (nodes, start);
                }
                self.skip_past(">");
                continue;
            }

            if self.starts_with("<!") {
                flush_text(&mut text, &mut nodes);
                self.pos += 2;
                let start = self.pos;
                self.skip_past(">");
                let end = self.pos.saturating_sub(1).max(start);
                let declaration: String = self.chars[start..end].iter().collect();
                if let Some(rest) = strip_prefix_ignore_case(declaration.trim(), "doctype") {
                    nodes.push(Node::Doctype(rest.trim().to_string()));
                }
                continue;
            }

            if self.peek() == '<' && self.peek_next().is_ascii_alphabetic() {
                flush_text(&mut text, &mut nodes);
                nodes.push(Node::Element(self.element(open)));
                continue;
            }

            text.push(self.peek());
            self.advance();
        }

        flush_text(&mut text, &mut nodes);
        (nodes, self.pos)
    }

    fn element(&mut self, open: &mut Vec<String>) -> HtmlElement {
        self.advance(); // <
        let tag = self.name();
        let lower = tag.to_ascii_lowercase();
        let (attributes, self_closed) = self.attributes();

        let mut element = HtmlElement {
            tag,
            attributes,
            children: Vec::new(),
            inner: None,
        };
        if self_closed || VOID_ELEMENTS.contains(&lower.as_str()) {
            return element;
        }

        let body_start = self.pos;
        if RAW_TEXT_ELEMENTS.contains(&lower.as_str()) {
            let closer = format!("</{lower}");
            while !self.is_at_end() && !self.starts_with_ignore_case(&closer) {
                self.advance();
            }
            element.inner = Some(self.chars[body_start..self.pos].iter().collect());
            self.skip_past(">");
            return element;
        }

        open.push(lower.clone());
        let (children, body_end) = self.content(Some(lower.as_str()), open);
        open.pop();

        element.children = children;
        element.inner = Some(self.chars[body_start..body_end].iter().collect());
        element
    }

    /// Attributes up to and including the closing `>` of a start tag.
    /// Reports whether the tag closed itself with `/>`.
    fn attributes(&mut self) -> (Vec<(String, Option<String>)>, bool) {
        let mut attributes: Vec<(String, Option<String>)> = Vec::new();

        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                return (attributes, false);
            }
            match self.peek() {
                '>' => {
                    self.advance();
                    return (attributes, false);
                }
                '/' if self.peek_next() == '>' => {
                    self.pos += 2;
                    return (attributes, true);
                }
                '/' => {
                    self.advance();
                    continue;
                }
                _ => {}
            }

            let name = self.take_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/'));
            if name.is_empty() {
                self.advance();
                continue;
            }

            self.skip_whitespace();
            let value = if self.peek() == '=' {
                self.advance();
                self.skip_whitespace();
                Some(self.attribute_value())
            } else {
                None
            };

            if !attributes.iter().any(|(key, _)| key.eq_ignore_ascii_case(&name)) {
                attributes.push((name, value));
            }
        }
    }

    // --- Scanners ---

    fn attribute_value(&mut self) -> String {
        let quote = self.peek();
        if quote != '"' && quote != '\'' {
            return self.take_while(|c| !c.is_whitespace() && c != '>');
        }
        self.advance();
        let value = self.take_while(|c| c != quote);
        self.advance();
        value
    }

    fn name(&mut self) -> String {
        self.take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while !self.is_at_end() && predicate(self.peek()) {
            self.advance();
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    /// Move past the next occurrence of `marker`, or to the end.
    fn skip_past(&mut self, marker: &str) {
        while !self.is_at_end() && !self.starts_with(marker) {
            self.advance();
        }
        self.pos = (self.pos + marker.chars().count()).min(self.chars.len());
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn starts_with_ignore_case(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| {
            self.chars
                .get(self.pos + i)
                .is_some_and(|x| x.eq_ignore_ascii_case(&c))
        })
    }

    fn peek(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }
}

fn flush_text(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.trim().is_empty() {
        nodes.push(Node::Text(text.trim().to_string()));
    }
    text.clear();
}

fn strip_prefix_ignore_case<'s>(s: &'s str, prefix: &str) -> Option<&'s str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

// =============================================================================
// ftHTML writer
// =============================================================================

struct Converter<'a> {
    printer: Printer<'a>,
    quote: char,
    options: &'a FormattingOptions,
}

impl Converter<'_> {
    fn node(&self, node: &Node, depth: usize, out: &mut String) {
        let spacing = self.options.indentation(depth);
        match node {
            Node::Doctype(value) => {
                out.push_str(&format!("{spacing}doctype {}\n", self.quoted(value)));
            }
            Node::Text(text) => {
                out.push_str(&format!("{spacing}{}\n", self.value(text)));
            }
            Node::Element(element) => self.element(element, depth, &spacing, out),
        }
    }

    fn element(&self, element: &HtmlElement, depth: usize, spacing: &str, out: &mut String) {
        let tag = element.tag.to_ascii_lowercase();
        let body = element.inner.as_deref().unwrap_or_default().trim();

        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) && element.attributes.is_empty() {
            let elang = if tag == "script" { "js" } else { "css" };
            out.push_str(spacing);
            out.push_str(&self.elang(elang, body, depth, spacing));
            out.push('\n');
            return;
        }

        out.push_str(spacing);
        out.push_str(&element.tag);
        let parts = self.attribute_parts(element);
        let has_attributes = parts.is_some();
        if let Some(parts) = parts {
            out.push_str(&self.printer.layout_attributes(&element.tag, parts, Some(spacing)));
        }

        if element.has_element_children() {
            out.push_str(&self.printer.tag_brace(has_attributes, spacing));
            out.push('\n');
            for child in &element.children {
                self.node(child, depth + 1, out);
            }
            out.push_str(spacing);
            out.push('}');
        } else if element.inner.is_some() && !body.is_empty() {
            out.push(' ');
            out.push_str(&self.value(body));
        }
        out.push('\n');
    }

    fn elang(&self, name: &str, body: &str, depth: usize, spacing: &str) -> String {
        let open = if self.printer.style().braces.new_line_after_embedded_langs {
            format!("\n{spacing}{{")
        } else {
            " {".to_string()
        };
        if body.is_empty() {
            return format!("{name}{open}\n{spacing}}}");
        }
        let inner = self.options.indentation(depth + 1);
        format!("{name}{open}\n{inner}{body}\n{spacing}}}")
    }

    fn attribute_parts(&self, element: &HtmlElement) -> Option<AttributeParts> {
        if element.attributes.is_empty() {
            return None;
        }

        let mut parts = AttributeParts::default();
        for (name, value) in &element.attributes {
            let key = name.to_ascii_lowercase();
            match (key.as_str(), value) {
                ("id", Some(id)) if is_selector_name(id) => parts.id = Some(format!("#{id}")),
                ("class", Some(classes)) if classes.split_whitespace().all(is_selector_name) => {
                    parts
                        .classes
                        .extend(classes.split_whitespace().map(|c| format!(".{c}")));
                }
                (_, Some(value)) => parts
                    .kvps
                    .push(format!("{name}={}", self.attribute_value(value))),
                (_, None) => parts.misc.push(name.clone()),
            }
        }

        if self.printer.style().attributes.sorted {
            parts.sort();
        }
        Some(parts)
    }

    fn attribute_value(&self, value: &str) -> String {
        if BARE_VALUE.is_match(value) {
            value.to_string()
        } else {
            self.quoted(value)
        }
    }

    /// Element or text content: macros stay bare, the rest is quoted.
    fn value(&self, text: &str) -> String {
        if grammar::standard().classify(text) == TokenKind::Macro {
            text.to_string()
        } else {
            self.quoted(text)
        }
    }

    fn quoted(&self, text: &str) -> String {
        format!("{q}{}{q}", add_slashes(text), q = self.quote)
    }
}

fn is_selector_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn add_slashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn convert(html: &str) -> Option<String> {
        convert_html_fragment(html, 0, &FormatStyle::default(), &FormattingOptions::default())
    }

    // =========================================================================
    // Reader
    // =========================================================================

    #[test]
    fn test_reader_nesting_and_text() {
        let nodes = HtmlReader::new("<p>Hi <b>there</b></p>").read();
        let [Node::Element(p)] = nodes.as_slice() else {
            panic!("expected one element, got {nodes:?}");
        };
        assert_eq!(p.tag, "p");
        assert_eq!(p.inner.as_deref(), Some("Hi <b>there</b>"));
        assert_eq!(p.children.len(), 2);
        assert_eq!(p.children[0], Node::Text("Hi".into()));
    }

    #[test]
    fn test_reader_attributes() {
        let nodes = HtmlReader::new("<input type=text value='a b' disabled/>").read();
        let [Node::Element(input)] = nodes.as_slice() else {
            panic!("expected one element");
        };
        assert_eq!(
            input.attributes,
            vec![
                ("type".to_string(), Some("text".to_string())),
                ("value".to_string(), Some("a b".to_string())),
                ("disabled".to_string(), None),
            ]
        );
        assert_eq!(input.inner, None);
    }

    #[test]
    fn test_reader_unclosed_and_stray_tags() {
        let nodes = HtmlReader::new("<div><p>one</div></span><i>x</i>").read();
        assert_eq!(nodes.len(), 2);
        let Node::Element(div) = &nodes[0] else {
            panic!("expected div");
        };
        let Node::Element(p) = &div.children[0] else {
            panic!("expected p");
        };
        assert_eq!(p.inner.as_deref(), Some("one"));
    }

    #[test]
    fn test_reader_raw_text() {
        let nodes = HtmlReader::new("<script>if (a < b) { x(\"</p>\") }</script>").read();
        let [Node::Element(script)] = nodes.as_slice() else {
            panic!("expected one element");
        };
        assert_eq!(script.inner.as_deref(), Some("if (a < b) { x(\"</p>\") }"));
        assert!(script.children.is_empty());
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    #[test]
    fn test_nested_element_with_attributes() {
        assert_eq!(
            convert("<div id=\"main\" class=\"a b\"><p>Hello</p></div>").as_deref(),
            Some("div(#main .a .b) {\n    p 'Hello'\n}\n")
        );
    }

    #[test]
    fn test_brace_on_own_line_without_attributes() {
        assert_eq!(
            convert("<ul>\n  <li>One</li>\n  <li>Two</li>\n</ul>").as_deref(),
            Some("ul\n{\n    li 'One'\n    li 'Two'\n}\n")
        );
    }

    #[test]
    fn test_attribute_values() {
        assert_eq!(
            convert("<input type=\"text\" disabled>").as_deref(),
            Some("input(type=text disabled)\n")
        );
        assert_eq!(
            convert("<a href=\"https://x.com/?q=1\" title=\"it's\">Link</a>").as_deref(),
            Some("a(href='https://x.com/?q=1' title='it\\'s') 'Link'\n")
        );
        assert_eq!(
            convert("<div class=\"a\" id=\"not an id\"></div>").as_deref(),
            Some("div(.a id='not an id')\n")
        );
    }

    #[test]
    fn test_text_bodies() {
        assert_eq!(convert("<p>It's</p>").as_deref(), Some("p 'It\\'s'\n"));
        assert_eq!(convert("<span>__DATE__</span>").as_deref(), Some("span __DATE__\n"));
        assert_eq!(convert("<div></div>").as_deref(), Some("div\n"));
        assert_eq!(
            convert("<p>Hello <b>world</b></p>").as_deref(),
            Some("p\n{\n    'Hello'\n    b 'world'\n}\n")
        );
    }

    #[test]
    fn test_doctype_comments_and_siblings() {
        assert_eq!(
            convert("<!DOCTYPE html>\n<!-- note -->\n<html></html>").as_deref(),
            Some("doctype 'html'\nhtml\n")
        );
    }

    #[test]
    fn test_embedded_languages() {
        assert_eq!(
            convert("<style>body { margin: 0 }</style>").as_deref(),
            Some("css {\n    body { margin: 0 }\n}\n")
        );
        assert_eq!(convert("<script></script>").as_deref(), Some("js {\n}\n"));
        assert_eq!(
            convert("<script src=\"app.js\"></script>").as_deref(),
            Some("script(src=app.js)\n")
        );
    }

    #[test]
    fn test_indent_and_quotation_mark() {
        let mut style = FormatStyle::default();
        style.on_paste_html.quotation_mark = '"';
        let out =
            convert_html_fragment("<p>x</p>", 1, &style, &FormattingOptions::default()).unwrap();
        assert_eq!(out, "    p \"x\"\n");
    }

    #[test]
    fn test_wraps_many_attributes() {
        assert_eq!(
            convert("<input id=q class=\"b a\" type=search name=query required>").as_deref(),
            Some("input(#q\n      .a .b\n      name=query type=search\n      required)\n")
        );
    }

    #[test]
    fn test_not_html() {
        assert_eq!(convert("hello"), None);
        assert_eq!(convert("<b>unterminated"), None);
        assert_eq!(convert("<!-- only a comment -->"), None);
        assert_eq!(convert("   "), None);
    }
}
