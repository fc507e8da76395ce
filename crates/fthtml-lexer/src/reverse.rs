//! Tolerant scanning of partial text behind an editor cursor.
//!
//! Completion and signature help only see the text up to the cursor, which is
//! usually not a complete document: strings are still open, calls are missing
//! their `)`, comments run to the end. The functions here never fail. They
//! walk the text forward with a small state machine (string / comment /
//! parenthesis depth) and answer questions about the trailing end of it.

use crate::grammar::{self, Grammar};
use crate::scanner::is_word_char;
use crate::token::{Position, Span, Token, TokenKind};

/// The innermost unclosed function call at the end of the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCall {
    pub name: String,
    /// Zero-based index of the argument being typed.
    pub argument: usize,
}

/// The last `count` logical tokens of `text`, in source order.
///
/// A function name followed by `(` is reported as one `Function` token whose
/// value is the whole call, nested calls included, even if its `)` is missing.
pub fn tokens_ending_at(text: &str, count: usize) -> Vec<Token> {
    tokens_ending_at_with(text, count, grammar::standard())
}

pub fn tokens_ending_at_with(text: &str, count: usize, grammar: &Grammar) -> Vec<Token> {
    let lexemes = Walker::new(text, grammar).run();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < lexemes.len() {
        let lexeme = &lexemes[i];
        let opens_call = lexeme.kind == TokenKind::Function
            && lexemes.get(i + 1).is_some_and(|next| next.is_symbol("("));

        if !opens_call {
            tokens.push(lexeme.clone());
            i += 1;
            continue;
        }

        // Swallow everything up to the matching `)`.
        let mut depth = 0usize;
        let mut j = i + 1;
        let mut last = &lexemes[i];
        while j < lexemes.len() {
            let inner = &lexemes[j];
            last = inner;
            j += 1;
            if inner.is_symbol("(") {
                depth += 1;
            } else if inner.is_symbol(")") {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
        }

        let span = Span::new(lexeme.span.start, last.span.end);
        let position = Position::new(
            lexeme.position.line,
            lexeme.position.column,
            last.position.end_line,
            last.position.end,
        );
        tokens.push(Token::new(
            TokenKind::Function,
            &text[span.start..span.end],
            position,
            span,
        ));
        i = j;
    }

    let skip = tokens.len().saturating_sub(count);
    tokens.split_off(skip)
}

/// Find the call whose argument list the end of `text` is inside.
pub fn active_call(text: &str) -> Option<ActiveCall> {
    active_call_with(text, grammar::standard())
}

pub fn active_call_with(text: &str, grammar: &Grammar) -> Option<ActiveCall> {
    struct Frame {
        name: Option<String>,
        args: usize,
    }

    let lexemes = Walker::new(text, grammar).run();
    let mut stack: Vec<Frame> = Vec::new();

    for (i, lexeme) in lexemes.iter().enumerate() {
        if lexeme.is_symbol("(") {
            let name = i
                .checked_sub(1)
                .map(|p| &lexemes[p])
                .filter(|prev| prev.kind == TokenKind::Function)
                .map(|prev| prev.value.clone());
            if let Some(frame) = stack.last_mut() {
                // A nested call is one argument of its parent; its name was
                // already counted.
                if name.is_none() {
                    frame.args += 1;
                }
            }
            stack.push(Frame { name, args: 0 });
        } else if lexeme.is_symbol(")") {
            stack.pop();
        } else if let Some(frame) = stack.last_mut() {
            if !lexeme.kind.is_comment() {
                frame.args += 1;
            }
        }
    }

    let frame = stack.pop()?;
    let name = frame.name?;
    let typing_new = text.ends_with(|c: char| c.is_whitespace() || c == '(');
    let argument = if typing_new || frame.args == 0 {
        frame.args
    } else {
        frame.args - 1
    };
    Some(ActiveCall { name, argument })
}

/// Tokens typed after an `#if`/`#elif` pragma, when the cursor is still in
/// its header (no more than two tokens after the pragma). Operator words are
/// reported as `Operator`.
pub fn condition_context(text: &str) -> Option<Vec<Token>> {
    let grammar = grammar::standard();
    let tokens = tokens_ending_at_with(text, 4, grammar);
    let start = tokens
        .iter()
        .rposition(|t| t.is_pragma("if") || t.is_pragma("elif"))?;
    let header: Vec<Token> = tokens[start + 1..]
        .iter()
        .cloned()
        .map(|mut t| {
            if t.kind == TokenKind::Word && grammar.is_operator(&t.value) {
                t.kind = TokenKind::Operator;
            }
            t
        })
        .collect();
    (header.len() <= 2).then_some(header)
}

/// Forward walker producing raw lexemes without ever failing.
struct Walker<'a> {
    text: &'a str,
    grammar: &'a Grammar,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    column: usize,
    paren_depth: usize,
    string_closed: bool,
}

impl<'a> Walker<'a> {
    fn new(text: &'a str, grammar: &'a Grammar) -> Self {
        Self {
            text,
            grammar,
            chars: text.char_indices().collect(),
            pos: 0,
            line: 1,
            column: 1,
            paren_depth: 0,
            string_closed: false,
        }
    }

    fn run(mut self) -> Vec<Token> {
        let mut out = Vec::new();
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
                continue;
            }

            let start = (self.offset(), self.line, self.column);
            let kind = match ch {
                '/' if self.peek_at(1) == Some('/') => {
                    self.advance_while(|c| c != '\n');
                    TokenKind::Comment
                }
                '/' if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.peek() {
                        self.advance();
                        if c == '*' && self.peek() == Some('/') {
                            self.advance();
                            break;
                        }
                    }
                    TokenKind::BlockComment
                }
                '"' | '\'' => {
                    self.advance();
                    self.string_closed = false;
                    while let Some(c) = self.peek() {
                        self.advance();
                        if c == '\\' {
                            self.advance();
                        } else if c == ch {
                            self.string_closed = true;
                            break;
                        }
                    }
                    TokenKind::String
                }
                '(' | ')' | '{' | '}' | '=' => {
                    if ch == '(' {
                        self.paren_depth += 1;
                    } else if ch == ')' {
                        self.paren_depth = self.paren_depth.saturating_sub(1);
                    }
                    self.advance();
                    TokenKind::Symbol
                }
                '@' => {
                    self.advance();
                    self.advance_while(|c| is_word_char(c) || matches!(c, '.' | '[' | ']'));
                    TokenKind::Variable
                }
                '#' => {
                    self.advance();
                    self.advance_while(is_word_char);
                    if self.paren_depth > 0 {
                        TokenKind::AttrId
                    } else {
                        TokenKind::Pragma
                    }
                }
                '.' if self.peek_at(1).is_some_and(|c| is_word_char(c) || c == '@') => {
                    self.advance();
                    self.advance_while(|c| is_word_char(c) || c == '@');
                    TokenKind::AttrClass
                }
                c if is_word_char(c) => {
                    self.advance_while(|c| is_word_char(c) || matches!(c, '.' | ':'));
                    TokenKind::Word
                }
                _ => {
                    self.advance();
                    continue;
                }
            };

            out.push(self.finish(kind, start));
        }
        out
    }

    fn finish(&self, kind: TokenKind, (start, line, column): (usize, usize, usize)) -> Token {
        let end = self.offset();
        let raw = &self.text[start..end];
        let (kind, value, quote) = match kind {
            TokenKind::String => {
                let quote = raw.chars().next();
                let inner = &raw[1..];
                let inner = match quote {
                    Some(q) if self.string_closed => &inner[..inner.len() - q.len_utf8()],
                    _ => inner,
                };
                (kind, inner.to_string(), quote)
            }
            TokenKind::Variable => {
                let name = &raw[1..];
                let kind = if name.contains(['.', '[']) {
                    TokenKind::LiteralVariable
                } else {
                    TokenKind::Variable
                };
                (kind, name.to_string(), None)
            }
            TokenKind::Pragma | TokenKind::AttrId | TokenKind::AttrClass => {
                let name = raw[1..].to_string();
                match name.strip_prefix('@') {
                    Some(var) if kind == TokenKind::AttrClass => {
                        (TokenKind::AttrClassVar, var.to_string(), None)
                    }
                    _ => (kind, name, None),
                }
            }
            TokenKind::Word => (self.grammar.classify(raw), raw.to_string(), None),
            _ => (kind, raw.to_string(), None),
        };

        let position = Position::new(line, column, self.line, self.column);
        let mut token = Token::new(kind, value, position, Span::new(start, end));
        token.quote = quote;
        token
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.text.len())
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|(_, c)| *c)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values(text: &str, count: usize) -> Vec<String> {
        tokens_ending_at(text, count)
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    // =========================================================================
    // tokens_ending_at
    // =========================================================================

    #[test]
    fn test_last_tokens_in_order() {
        assert_eq!(values("div span p", 2), vec!["span", "p"]);
        assert_eq!(values("div", 4), vec!["div"]);
        assert!(values("", 4).is_empty());
    }

    #[test]
    fn test_whole_call_is_one_token() {
        let tokens = tokens_ending_at("p random(1 len(@x)) \"a\"", 2);
        assert_eq!(tokens[0].kind, TokenKind::Function);
        assert_eq!(tokens[0].value, "random(1 len(@x))");
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].value, "a");
    }

    #[test]
    fn test_unclosed_call_is_tolerated() {
        let tokens = tokens_ending_at("p str_repeat(\"ab\" ", 1);
        assert_eq!(tokens[0].kind, TokenKind::Function);
        assert_eq!(tokens[0].value, "str_repeat(\"ab\"");
    }

    #[test]
    fn test_unterminated_string_and_comment() {
        let tokens = tokens_ending_at("div \"abc", 1);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].value, "abc");

        let tokens = tokens_ending_at("div /* open", 1);
        assert_eq!(tokens[0].kind, TokenKind::BlockComment);
    }

    #[test]
    fn test_parens_inside_strings_do_not_count() {
        let tokens = tokens_ending_at("p replace(@x \")\" 'y') b", 2);
        assert_eq!(tokens[0].value, "replace(@x \")\" 'y')");
        assert_eq!(tokens[1].value, "b");
    }

    #[test]
    fn test_sigils_classified() {
        let tokens = tokens_ending_at("#if @a.b div(#x .y .@z", 8);
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Pragma,
                TokenKind::LiteralVariable,
                TokenKind::Word,
                TokenKind::Symbol,
                TokenKind::AttrId,
                TokenKind::AttrClass,
                TokenKind::AttrClassVar,
            ]
        );
    }

    // =========================================================================
    // active_call
    // =========================================================================

    #[test]
    fn test_active_call_argument_index() {
        assert_eq!(
            active_call("p random("),
            Some(ActiveCall { name: "random".into(), argument: 0 })
        );
        assert_eq!(
            active_call("p random(1"),
            Some(ActiveCall { name: "random".into(), argument: 0 })
        );
        assert_eq!(
            active_call("p random(1 "),
            Some(ActiveCall { name: "random".into(), argument: 1 })
        );
    }

    #[test]
    fn test_active_call_nested() {
        assert_eq!(
            active_call("p substring(len(\"ab\") "),
            Some(ActiveCall { name: "substring".into(), argument: 1 })
        );
        assert_eq!(
            active_call("p substring(@x tcase("),
            Some(ActiveCall { name: "tcase".into(), argument: 0 })
        );
    }

    #[test]
    fn test_active_call_closed_or_absent() {
        assert_eq!(active_call("p random(1 2) "), None);
        assert_eq!(active_call("div(.a "), None);
        assert_eq!(active_call("div"), None);
    }

    #[test]
    fn test_active_call_ignores_open_string_parens() {
        assert_eq!(
            active_call("p trim(\"(\" "),
            Some(ActiveCall { name: "trim".into(), argument: 1 })
        );
    }

    // =========================================================================
    // condition_context
    // =========================================================================

    #[test]
    fn test_condition_context() {
        let header = condition_context("#if @x eq").unwrap();
        assert_eq!(header.len(), 2);
        assert_eq!(header[0].kind, TokenKind::Variable);
        assert_eq!(header[1].kind, TokenKind::Operator);

        assert_eq!(condition_context("#elif ").map(|h| h.len()), Some(0));
        assert_eq!(condition_context("#if @x eq 'a'"), None);
        assert_eq!(condition_context("div"), None);
    }
}
