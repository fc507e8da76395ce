//! Concrete syntax tree for ftHTML.
//!
//! Every node keeps the token it came from, so the tree can be printed back
//! with the author's spelling and positions. Structural punctuation (braces,
//! parentheses, `#end`) is recorded beside the children rather than inside
//! them.

use fthtml_lexer::{Position, Token, TokenKind};
use serde::Serialize;

/// How an element projects into an editor outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolKind {
    Function,
    Method,
    Variable,
    Property,
    Constant,
    Struct,
    Null,
}

/// What an element is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// `div(...) value` or `div { ... }`
    Tag,
    /// A string literal.
    Text,
    /// `@name`
    Reference,
    /// `name(args)`
    Call,
    /// `__NAME__`
    Macro,
    /// A bare word in argument, attribute or condition position, or the raw
    /// body of an embedded language.
    Literal,
    /// Comparison in an `#if` header.
    Operator,
    /// `doctype`, `comment` or `import`
    Keyword,
    /// `css { ... }` / `js { ... }`
    Elang,
    /// `#vars`, `#templates`, `#if`, `#ifdef`, `#debug`
    Pragma,
    /// One arm of an `#if`: `#if`, `#elif` or `#else`.
    Branch,
    /// A named value inside `#vars`, `#templates` or an import body.
    Binding,
    /// Use of a declared tiny template.
    TinyTemplate,
    Comment,
}

/// Positions of a matching pair of delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub open: Position,
    pub close: Position,
}

impl Delimiters {
    pub fn new(open: &Token, close: &Token) -> Self {
        Self {
            open: open.position,
            close: close.position,
        }
    }
}

/// The parenthesized attribute list of a tag.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSet {
    pub id: Option<Box<Element>>,
    pub classes: Vec<Element>,
    /// `key=value` pairs; the value is the pair's only child.
    pub kvps: Vec<Element>,
    /// Bare words and variables.
    pub misc: Vec<Element>,
    pub parens: Delimiters,
}

impl AttributeSet {
    pub fn new(parens: Delimiters) -> Self {
        Self {
            id: None,
            classes: Vec::new(),
            kvps: Vec::new(),
            misc: Vec::new(),
            parens,
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.id.is_some()) + self.classes.len() + self.kvps.len() + self.misc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an id was given, either as `#id` or `id=...`.
    pub fn has_id(&self) -> bool {
        self.id.is_some() || self.kvps.iter().any(|kvp| kvp.token.value == "id")
    }

    pub fn push_class(&mut self, class: Element) {
        push_unique(&mut self.classes, class);
    }

    pub fn push_kvp(&mut self, kvp: Element) {
        push_unique(&mut self.kvps, kvp);
    }

    pub fn push_misc(&mut self, misc: Element) {
        push_unique(&mut self.misc, misc);
    }
}

/// Insertion-ordered set semantics keyed on source spelling.
fn push_unique(list: &mut Vec<Element>, element: Element) {
    let text = element.source_text();
    if !list.iter().any(|e| e.source_text() == text) {
        list.push(element);
    }
}

/// A node of the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub token: Token,
    pub kind: NodeKind,
    pub children: Vec<Element>,
    pub attrs: Option<AttributeSet>,
    /// `{` and `}` of a block body.
    pub braces: Option<Delimiters>,
    /// `(` and `)` of a function call.
    pub parens: Option<Delimiters>,
    /// The `#end` closing a pragma block.
    pub end: Option<Position>,
    pub symbol_kind: SymbolKind,
}

impl Element {
    pub fn new(token: Token, kind: NodeKind) -> Self {
        let symbol_kind = match kind {
            NodeKind::Reference | NodeKind::TinyTemplate => SymbolKind::Variable,
            NodeKind::Call => SymbolKind::Function,
            NodeKind::Macro => SymbolKind::Constant,
            NodeKind::Binding => SymbolKind::Property,
            _ => SymbolKind::Null,
        };
        Self {
            token,
            kind,
            children: Vec::new(),
            attrs: None,
            braces: None,
            parens: None,
            end: None,
            symbol_kind,
        }
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_symbol_kind(mut self, symbol_kind: SymbolKind) -> Self {
        self.symbol_kind = symbol_kind;
        self
    }

    /// The element's own name or value as written, without sigils.
    pub fn name(&self) -> &str {
        &self.token.value
    }

    /// Whether the element owns a `{ }` body.
    pub fn is_parent_element(&self) -> bool {
        self.braces.is_some()
    }

    pub fn is_comment(&self) -> bool {
        self.kind == NodeKind::Comment
    }

    /// Whether this is a line (`//`) comment.
    pub fn is_line_comment(&self) -> bool {
        self.kind == NodeKind::Comment && self.token.kind == TokenKind::Comment
    }

    pub fn is_pragma(&self, name: &str) -> bool {
        self.kind == NodeKind::Pragma && self.token.value == name
    }

    pub fn first_line(&self) -> usize {
        self.token.position.line
    }

    /// The last source line this element covers, children and closing
    /// delimiters included.
    pub fn last_line(&self) -> usize {
        let mut line = self.token.position.end_line;
        for delimiters in [self.braces, self.parens].into_iter().flatten() {
            line = line.max(delimiters.close.end_line);
        }
        if let Some(end) = self.end {
            line = line.max(end.end_line);
        }
        if let Some(attrs) = &self.attrs {
            line = line.max(attrs.parens.close.end_line);
        }
        self.children
            .iter()
            .map(Element::last_line)
            .fold(line, usize::max)
    }

    /// The token as it was written, sigils and quotes included.
    pub fn source_text(&self) -> String {
        match self.kind {
            NodeKind::Literal | NodeKind::Binding if self.token.kind == TokenKind::Word => {
                match self.children.first() {
                    // key=value pairs compare on the whole pair
                    Some(value) if self.kind == NodeKind::Literal => {
                        format!("{}={}", self.token.value, value.source_text())
                    }
                    _ => self.token.value.clone(),
                }
            }
            _ => self.token.source_text(),
        }
    }

    /// `tag#id` or `tag.class`, whichever identifies the tag first.
    pub fn selector(&self) -> Option<String> {
        let attrs = self.attrs.as_ref()?;
        if let Some(id) = &attrs.id {
            return Some(format!("{}#{}", self.name(), id.name()));
        }
        attrs
            .classes
            .first()
            .map(|class| format!("{}{}", self.name(), class.token.source_text()))
    }

    /// Body of an `#if` branch: everything after the `lhs op rhs` header.
    pub fn branch_body(&self) -> &[Element] {
        if self.kind != NodeKind::Branch {
            return &self.children;
        }
        let header = if self.token.value == "else" { 0 } else { 3 };
        self.children.get(header..).unwrap_or(&[])
    }
}

/// Find the binding declaring `name` anywhere in `elements`.
pub fn find_binding<'a>(elements: &'a [Element], name: &str) -> Option<&'a Element> {
    elements.iter().find_map(|el| {
        if el.kind == NodeKind::Binding && el.name() == name {
            Some(el)
        } else {
            find_binding(&el.children, name)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use fthtml_lexer::Span;

    fn token(kind: TokenKind, value: &str, line: usize) -> Token {
        Token::new(kind, value, Position::single_line(line, 1, value.len()), Span::default())
    }

    #[test]
    fn test_last_line_covers_closers() {
        let mut el = Element::new(token(TokenKind::Word, "div", 1), NodeKind::Tag);
        el.braces = Some(Delimiters {
            open: Position::single_line(1, 5, 1),
            close: Position::single_line(4, 1, 1),
        });
        el.children
            .push(Element::new(token(TokenKind::Word, "p", 2), NodeKind::Tag));
        assert_eq!(el.first_line(), 1);
        assert_eq!(el.last_line(), 4);
        assert!(el.is_parent_element());
    }

    #[test]
    fn test_attribute_set_dedupes() {
        let parens = Delimiters {
            open: Position::default(),
            close: Position::default(),
        };
        let mut attrs = AttributeSet::new(parens);
        attrs.push_class(Element::new(token(TokenKind::AttrClass, "a", 1), NodeKind::Literal));
        attrs.push_class(Element::new(token(TokenKind::AttrClass, "a", 1), NodeKind::Literal));
        attrs.push_class(Element::new(token(TokenKind::AttrClassVar, "a", 1), NodeKind::Reference));
        assert_eq!(attrs.classes.len(), 2);
        assert_eq!(attrs.len(), 2);
        assert!(!attrs.has_id());
    }

    #[test]
    fn test_symbol_kind_defaults() {
        assert_eq!(
            Element::new(token(TokenKind::Function, "len", 1), NodeKind::Call).symbol_kind,
            SymbolKind::Function
        );
        assert_eq!(
            Element::new(token(TokenKind::Macro, "__NOW__", 1), NodeKind::Macro).symbol_kind,
            SymbolKind::Constant
        );
        assert_eq!(
            Element::new(token(TokenKind::Word, "div", 1), NodeKind::Tag).symbol_kind,
            SymbolKind::Null
        );
    }
}
