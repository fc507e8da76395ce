/// Byte offsets of a token in its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Line/column position of a token, 1-based.
///
/// `end` is the exclusive column on `end_line`, so for a token that stays on
/// one line `end - column` is its length in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, end_line: usize, end: usize) -> Self {
        Self {
            line,
            column,
            end_line,
            end,
        }
    }

    /// A position covering `len` characters on a single line.
    pub fn single_line(line: usize, column: usize, len: usize) -> Self {
        Self::new(line, column, line, column + len)
    }
}

/// Token classification for ftHTML source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Bare identifier: tag names, attribute keys, literal arguments.
    Word,
    String,
    /// `@name`
    Variable,
    /// `@name.member` or `@name[0]`
    LiteralVariable,
    Function,
    /// `__NAME__`
    Macro,
    Keyword,
    KeywordDoctype,
    /// `#name` outside of parentheses.
    Pragma,
    /// `css` or `js`
    Elang,
    /// Raw text between the braces that follow an embedded language.
    ElangBody,
    /// `// ...`
    Comment,
    /// `/* ... */`
    BlockComment,
    /// One of `{ } ( ) =`
    Symbol,
    /// `.name` inside an attribute list.
    AttrClass,
    /// `.@name` inside an attribute list.
    AttrClassVar,
    /// `#name` inside an attribute list.
    AttrId,
    /// Comparison word inside an `#if` header.
    Operator,
}

impl TokenKind {
    pub fn is_comment(self) -> bool {
        matches!(self, TokenKind::Comment | TokenKind::BlockComment)
    }

    pub fn is_variable(self) -> bool {
        matches!(self, TokenKind::Variable | TokenKind::LiteralVariable)
    }
}

/// A token produced by the ftHTML lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub position: Position,
    pub span: Span,
    /// The delimiter of a string token.
    pub quote: Option<char>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, position: Position, span: Span) -> Self {
        Self {
            kind,
            value: value.into(),
            position,
            span,
            quote: None,
        }
    }

    /// A token with no source location, used for values synthesized at parse
    /// time.
    pub fn synthetic(kind: TokenKind, value: impl Into<String>, position: Position) -> Self {
        Self::new(kind, value, position, Span::default())
    }

    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.value == symbol
    }

    /// Whether this is a `#name` pragma token.
    pub fn is_pragma(&self, name: &str) -> bool {
        self.kind == TokenKind::Pragma && self.value == name
    }

    /// Source-form rendering: the value with its sigil or delimiters restored.
    pub fn source_text(&self) -> String {
        match self.kind {
            TokenKind::AttrClass => format!(".{}", self.value),
            TokenKind::AttrClassVar => format!(".@{}", self.value),
            TokenKind::AttrId | TokenKind::Pragma => format!("#{}", self.value),
            TokenKind::Variable | TokenKind::LiteralVariable => format!("@{}", self.value),
            TokenKind::String => {
                let quote = self.quote.unwrap_or('"');
                format!("{quote}{}{quote}", self.value)
            }
            _ => self.value.clone(),
        }
    }
}
