use crate::grammar::{self, Grammar};
use crate::token::{Position, Span, Token, TokenKind};
use crate::{LexErrorKind, LexerError};

/// ftHTML source scanner.
///
/// Produces tokens lazily, one per call to [`Scanner::next_token`].
/// Whitespace and newlines are insignificant and never emitted; every
/// token carries its exact source span so later stages can reconstruct
/// layout from positions alone.
///
/// - `Vec<char>` source for index-based navigation
/// - Parenthesis depth decides whether `#name` is an id or a pragma
/// - The braces after `css`/`js` are captured verbatim as one token
pub struct Scanner<'a> {
    source: &'a str,
    grammar: &'a Grammar,
    chars: Vec<char>,
    pos: usize,
    offset: usize,
    line: usize,
    column: usize,
    paren_depth: usize,
    expect_elang_body: bool,
    start: Mark,
}

/// Where the token currently being scanned began.
#[derive(Debug, Clone, Copy, Default)]
struct Mark {
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given source.
    pub fn new(source: &'a str, grammar: &'a Grammar) -> Self {
        Self {
            source,
            grammar,
            chars: source.chars().collect(),
            pos: 0,
            offset: 0,
            line: 1,
            column: 1,
            paren_depth: 0,
            expect_elang_body: false,
            start: Mark::default(),
        }
    }

    /// Tokenize the entire source with the standard grammar.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
        let mut scanner = Scanner::new(source, grammar::standard());
        let mut tokens = Vec::new();
        while let Some(token) = scanner.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Scan the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexerError> {
        self.skip_whitespace();
        if self.is_at_end() {
            return Ok(None);
        }

        self.mark();

        if std::mem::take(&mut self.expect_elang_body) && self.peek() == '{' {
            return self.scan_elang_body().map(Some);
        }

        let ch = self.peek();
        let token = match ch {
            '/' if self.peek_next() == '/' => self.scan_line_comment(),
            '/' if self.peek_next() == '*' => self.scan_block_comment()?,
            '"' | '\'' => self.scan_string()?,
            '(' => {
                self.paren_depth += 1;
                self.advance();
                self.emit(TokenKind::Symbol, "(")
            }
            ')' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                self.advance();
                self.emit(TokenKind::Symbol, ")")
            }
            '{' | '}' | '=' => {
                self.advance();
                self.emit(TokenKind::Symbol, ch.to_string())
            }
            '@' => self.scan_variable()?,
            '#' => self.scan_hash()?,
            '.' => self.scan_class()?,
            c if is_word_char(c) => self.scan_word(),
            c => {
                return Err(self.error(
                    LexErrorKind::IllegalCharacter,
                    format!("Illegal character '{c}'"),
                ))
            }
        };

        Ok(Some(token))
    }

    // --- Scanners ---

    fn scan_line_comment(&mut self) -> Token {
        while !self.is_at_end() && self.peek() != '\n' && self.peek() != '\r' {
            self.advance();
        }
        let text = self.lexeme();
        self.emit(TokenKind::Comment, text)
    }

    fn scan_block_comment(&mut self) -> Result<Token, LexerError> {
        self.advance(); // /
        self.advance(); // *
        loop {
            if self.is_at_end() {
                return Err(self.error_at_start(
                    LexErrorKind::UnterminatedComment,
                    "Unterminated block comment",
                ));
            }
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                break;
            }
            self.advance();
        }
        let text = self.lexeme();
        Ok(self.emit(TokenKind::BlockComment, text))
    }

    /// Strings keep their escape sequences verbatim; only the delimiters are
    /// stripped from the value.
    fn scan_string(&mut self) -> Result<Token, LexerError> {
        let quote = self.peek();
        self.advance(); // opening quote
        let content_start = self.offset;

        while !self.is_at_end() && self.peek() != quote {
            if self.peek() == '\\' {
                self.advance();
                if self.is_at_end() {
                    break;
                }
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(self.error_at_start(
                LexErrorKind::UnterminatedString,
                "Unterminated string",
            ));
        }

        let value = self.source[content_start..self.offset].to_string();
        self.advance(); // closing quote
        Ok(self.emit(TokenKind::String, value).with_quote(quote))
    }

    fn scan_variable(&mut self) -> Result<Token, LexerError> {
        self.advance(); // @
        if !is_word_char(self.peek()) {
            return Err(self.error_at_start(
                LexErrorKind::IllegalCharacter,
                "Expected a variable name after '@'",
            ));
        }
        self.consume_name();

        let mut kind = TokenKind::Variable;
        loop {
            if self.peek() == '.' && is_word_char(self.peek_next()) {
                kind = TokenKind::LiteralVariable;
                self.advance();
                self.consume_name();
            } else if self.peek() == '[' {
                kind = TokenKind::LiteralVariable;
                while !self.is_at_end() && self.peek() != ']' {
                    self.advance();
                }
                if self.is_at_end() {
                    return Err(self.error_at_start(
                        LexErrorKind::IllegalCharacter,
                        "Unterminated variable index, expecting ']'",
                    ));
                }
                self.advance();
            } else {
                break;
            }
        }

        let value = self.lexeme()[1..].to_string();
        Ok(self.emit(kind, value))
    }

    /// `#name` is an id inside an attribute list and a pragma anywhere else.
    fn scan_hash(&mut self) -> Result<Token, LexerError> {
        self.advance(); // #
        if !is_word_char(self.peek()) {
            return Err(self.error_at_start(
                LexErrorKind::IllegalCharacter,
                "Expected a name after '#'",
            ));
        }
        self.consume_name();
        let value = self.lexeme()[1..].to_string();
        let kind = if self.paren_depth > 0 {
            TokenKind::AttrId
        } else {
            TokenKind::Pragma
        };
        Ok(self.emit(kind, value))
    }

    fn scan_class(&mut self) -> Result<Token, LexerError> {
        self.advance(); // .
        let kind = if self.peek() == '@' && is_word_char(self.peek_next()) {
            self.advance();
            TokenKind::AttrClassVar
        } else if is_word_char(self.peek()) {
            TokenKind::AttrClass
        } else {
            return Err(self.error_at_start(
                LexErrorKind::IllegalCharacter,
                "Illegal character '.'",
            ));
        };
        self.consume_name();
        let lexeme = self.lexeme();
        let value = lexeme.trim_start_matches('.').trim_start_matches('@').to_string();
        Ok(self.emit(kind, value))
    }

    fn scan_word(&mut self) -> Token {
        while !self.is_at_end() {
            let ch = self.peek();
            if is_word_char(ch) || (matches!(ch, '.' | ':') && is_word_char(self.peek_next())) {
                self.advance();
            } else {
                break;
            }
        }

        let word = self.lexeme();
        let kind = self.grammar.classify(&word);
        if kind == TokenKind::Elang {
            self.expect_elang_body = true;
        }
        self.emit(kind, word)
    }

    /// Capture `{ ... }` after an embedded language name. Braces nest and
    /// quoted strings are skipped so their braces do not count.
    fn scan_elang_body(&mut self) -> Result<Token, LexerError> {
        self.advance(); // {
        let content_start = self.offset;
        let mut depth = 1usize;

        loop {
            if self.is_at_end() {
                return Err(self.error_at_start(
                    LexErrorKind::UnterminatedEmbeddedBlock,
                    "Unterminated embedded language block, expecting '}'",
                ));
            }
            match self.peek() {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                quote @ ('"' | '\'' | '`') => {
                    self.advance();
                    while !self.is_at_end() && self.peek() != quote {
                        if self.peek() == '\\' {
                            self.advance();
                        }
                        self.advance();
                    }
                }
                _ => {}
            }
            self.advance();
        }

        let body = self.source[content_start..self.offset].to_string();
        self.advance(); // }
        Ok(self.emit(TokenKind::ElangBody, body))
    }

    // --- Helpers ---

    fn consume_name(&mut self) {
        while is_word_char(self.peek()) {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn mark(&mut self) {
        self.start = Mark {
            offset: self.offset,
            line: self.line,
            column: self.column,
        };
    }

    fn lexeme(&self) -> String {
        self.source[self.start.offset..self.offset].to_string()
    }

    fn emit(&self, kind: TokenKind, value: impl Into<String>) -> Token {
        let position = Position::new(self.start.line, self.start.column, self.line, self.column);
        Token::new(kind, value, position, Span::new(self.start.offset, self.offset))
    }

    fn peek(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if let Some(&ch) = self.chars.get(self.pos) {
            self.pos += 1;
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, kind: LexErrorKind, message: String) -> LexerError {
        LexerError {
            kind,
            message,
            line: self.line,
            column: self.column,
        }
    }

    fn error_at_start(&self, kind: LexErrorKind, message: &str) -> LexerError {
        LexerError {
            kind,
            message: message.to_string(),
            line: self.start.line,
            column: self.start.column,
        }
    }
}

/// Letters, digits, `_` and `-`.
pub fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-'
}

/// A lazily scanned token sequence with one token of lookahead.
pub struct TokenStream<'a> {
    scanner: Scanner<'a>,
    peeked: Option<Token>,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str, grammar: &'a Grammar) -> Self {
        Self {
            scanner: Scanner::new(source, grammar),
            peeked: None,
        }
    }

    /// Consume and return the next token.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Token>, LexerError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.scanner.next_token(),
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek(&mut self) -> Result<Option<&Token>, LexerError> {
        if self.peeked.is_none() {
            self.peeked = self.scanner.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    pub fn eof(&mut self) -> Result<bool, LexerError> {
        Ok(self.peek()?.is_none())
    }
}
