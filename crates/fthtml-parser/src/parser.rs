//! Document parser for ftHTML.
//!
//! Pulls tokens from a lazy `TokenStream` and builds a lossless CST using
//! recursive descent. Each production is a method; which productions may
//! appear at a given point is decided by a small set of allowed token kinds
//! threaded through the block parsers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fthtml_lexer::grammar::{self, FunctionSignature, Grammar};
use fthtml_lexer::{Position, Token, TokenKind, TokenStream};
use tracing::{debug, trace};

use crate::config::ProjectConfig;
use crate::cst::{AttributeSet, Delimiters, Element, NodeKind, SymbolKind};
use crate::error::{ErrorKind, StackFrame};
use crate::vars::{FileContext, Origin, ParserVariables, Scope, TinyTemplate};
use crate::ParseError;

/// Token kinds that may start a top-level node.
const TOP_LEVEL: &[TokenKind] = &[
    TokenKind::Comment,
    TokenKind::BlockComment,
    TokenKind::Word,
    TokenKind::Elang,
    TokenKind::Function,
    TokenKind::Macro,
    TokenKind::Pragma,
    TokenKind::Keyword,
    TokenKind::Variable,
    TokenKind::LiteralVariable,
];

/// Token kinds that may start a node inside an element body.
const BODY: &[TokenKind] = &[
    TokenKind::Word,
    TokenKind::Elang,
    TokenKind::Pragma,
    TokenKind::String,
    TokenKind::Keyword,
    TokenKind::Variable,
    TokenKind::LiteralVariable,
    TokenKind::Function,
    TokenKind::Macro,
    TokenKind::Comment,
    TokenKind::BlockComment,
];

/// Token kinds allowed in the `{ }` value of a variable or property.
const BINDING_BODY: &[TokenKind] = &[
    TokenKind::Word,
    TokenKind::Elang,
    TokenKind::String,
    TokenKind::Keyword,
    TokenKind::Variable,
    TokenKind::LiteralVariable,
    TokenKind::Function,
    TokenKind::Macro,
    TokenKind::Comment,
    TokenKind::BlockComment,
];

/// What ends a run of nodes.
enum Until<'t> {
    EndOfInput,
    /// A `}` closing the body owned by the token.
    Brace(&'t Token),
    /// One of the named pragmas closing the block owned by the token.
    Pragma(&'t Token, &'static [&'static str]),
}

/// ftHTML document parser.
pub struct Parser<'a> {
    stream: TokenStream<'a>,
    grammar: &'a Grammar,
    config: Option<&'a ProjectConfig>,
    vars: ParserVariables,
    scope: Scope,
    tiny_templates: HashMap<String, TinyTemplate>,
    /// Files currently being imported, outermost first.
    import_chain: Vec<PathBuf>,
}

impl<'a> Parser<'a> {
    /// Create a parser over `source`.
    pub fn new(source: &'a str, grammar: &'a Grammar, config: Option<&'a ProjectConfig>) -> Self {
        Self::from_stream(TokenStream::new(source, grammar), grammar, config)
    }

    pub fn from_stream(
        stream: TokenStream<'a>,
        grammar: &'a Grammar,
        config: Option<&'a ProjectConfig>,
    ) -> Self {
        let globals = config.map(|c| c.globalvars.clone()).unwrap_or_default();
        Self {
            stream,
            grammar,
            config,
            vars: ParserVariables::default(),
            scope: Scope::new(globals),
            tiny_templates: HashMap::new(),
            import_chain: Vec::new(),
        }
    }

    /// Attach the location of the document, enabling import and json
    /// resolution relative to it.
    pub fn in_file(mut self, path: &Path) -> Self {
        self.vars = ParserVariables::new(FileContext::for_path(path));
        self
    }

    /// Parse source text with the standard grammar and no project configuration.
    pub fn parse_source(source: &str) -> Result<Vec<Element>, ParseError> {
        Parser::new(source, grammar::standard(), None).parse()
    }

    /// Read and parse a file from disk.
    pub fn parse_file(
        path: &Path,
        config: Option<&ProjectConfig>,
    ) -> Result<Vec<Element>, ParseError> {
        let path = normalize_document_path(path)?;
        let source = std::fs::read_to_string(&path).map_err(|e| {
            ParseError::new(
                ErrorKind::Import,
                format!("Can not read file '{}': {e}", path.display()),
                Position::default(),
            )
        })?;
        Parser::new(&source, grammar::standard(), config)
            .in_file(&path)
            .parse()
    }

    pub fn variables(&self) -> &ParserVariables {
        &self.vars
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn tiny_templates(&self) -> &HashMap<String, TinyTemplate> {
        &self.tiny_templates
    }

    /// Parse the whole stream.
    pub fn parse(&mut self) -> Result<Vec<Element>, ParseError> {
        self.parse_document().map_err(|mut e| {
            if e.file.is_none() && e.stack.is_empty() {
                e.file = self.vars.file().filename.clone();
            }
            e
        })
    }

    fn parse_document(&mut self) -> Result<Vec<Element>, ParseError> {
        let mut elements = Vec::new();

        if let Some(token) = self.peek()? {
            if token.kind == TokenKind::KeywordDoctype {
                self.advance()?;
                elements.push(self.parse_keyword(token)?);
            }
        }

        elements.extend(self.parse_block(TOP_LEVEL, Until::EndOfInput)?);
        Ok(elements)
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Parse nodes until `until` is reached. The closing token is left in
    /// the stream.
    fn parse_block(
        &mut self,
        allowed: &'static [TokenKind],
        until: Until<'_>,
    ) -> Result<Vec<Element>, ParseError> {
        let mut elements = Vec::new();

        loop {
            let Some(token) = self.peek()? else {
                return match until {
                    Until::EndOfInput => Ok(elements),
                    Until::Brace(owner) => Err(incomplete(owner, "opening and closing braces")),
                    Until::Pragma(owner, closers) => {
                        Err(incomplete(owner, &format!("#{}", closers.join(" or #"))))
                    }
                };
            };

            let closes = match until {
                Until::EndOfInput => false,
                Until::Brace(_) => token.is_symbol("}"),
                Until::Pragma(_, closers) => {
                    token.kind == TokenKind::Pragma && closers.contains(&token.value.as_str())
                }
            };
            if closes {
                return Ok(elements);
            }

            if !allowed.contains(&token.kind) {
                return Err(invalid_type(&token, "an element, string, variable, function or pragma"));
            }

            self.advance()?;
            elements.push(self.parse_node(token, allowed)?);
        }
    }

    fn parse_node(
        &mut self,
        token: Token,
        context: &'static [TokenKind],
    ) -> Result<Element, ParseError> {
        match token.kind {
            TokenKind::Word if self.is_tiny_template(&token.value) => {
                self.parse_tiny_template_ref(token)
            }
            TokenKind::Word => self.parse_tag(token),
            TokenKind::String => Ok(Element::new(token, NodeKind::Text)),
            TokenKind::Variable | TokenKind::LiteralVariable => {
                Ok(Element::new(token, NodeKind::Reference))
            }
            TokenKind::Function => self.parse_function(token),
            TokenKind::Macro => self.parse_macro(token),
            TokenKind::Keyword => self.parse_keyword(token),
            TokenKind::Elang => self.parse_elang(token),
            TokenKind::Pragma => self.parse_pragma(token, context),
            TokenKind::Comment | TokenKind::BlockComment => {
                Ok(Element::new(token, NodeKind::Comment))
            }
            _ => Err(invalid_type(&token, "an element, string, variable, function or pragma")),
        }
    }

    /// Parse `{ ... }` after its opening brace has been consumed, recording the
    /// braces on `element`.
    fn parse_braced_body(
        &mut self,
        element: &mut Element,
        open: &Token,
        allowed: &'static [TokenKind],
    ) -> Result<(), ParseError> {
        let owner = element.token.clone();
        let children = self.parse_block(allowed, Until::Brace(&owner))?;
        let close = self.expect_next(&owner, "opening and closing braces")?;
        element.children.extend(children);
        element.braces = Some(Delimiters::new(open, &close));
        Ok(())
    }

    // =========================================================================
    // Element parsing
    // =========================================================================

    fn parse_tag(&mut self, token: Token) -> Result<Element, ParseError> {
        if !is_valid_name(&token.value) {
            return Err(ParseError::at_token(
                ErrorKind::InvalidElementName,
                format!("Invalid element name '{}', names must match [\\w-]+", token.value),
                &token,
            )
            .expecting("[\\w-]+"));
        }

        let self_closing = self.grammar.is_self_closing(&token.value);
        let mut element = Element::new(token, NodeKind::Tag);

        if let Some(open) = self.next_if_symbol("(")? {
            element.attrs = Some(self.parse_attributes(&element.token, &open)?);
        }
        if self_closing {
            return Ok(element);
        }

        self.parse_tag_value(&mut element)?;
        Ok(element)
    }

    /// The optional value after a tag: a string, variable, `{ body }`,
    /// function or macro.
    fn parse_tag_value(&mut self, element: &mut Element) -> Result<(), ParseError> {
        let Some(token) = self.peek()? else {
            return Ok(());
        };

        match token.kind {
            TokenKind::String => {
                self.advance()?;
                element.children.push(Element::new(token, NodeKind::Text));
            }
            TokenKind::Variable | TokenKind::LiteralVariable => {
                self.advance()?;
                element.children.push(Element::new(token, NodeKind::Reference));
            }
            TokenKind::Function => {
                self.advance()?;
                element.children.push(self.parse_function(token)?);
            }
            TokenKind::Macro => {
                self.advance()?;
                element.children.push(self.parse_macro(token)?);
            }
            TokenKind::Symbol if token.value == "{" => {
                self.advance()?;
                self.parse_braced_body(element, &token, BODY)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Parse an attribute list after its `(`.
    fn parse_attributes(&mut self, owner: &Token, open: &Token) -> Result<AttributeSet, ParseError> {
        let mut attrs = AttributeSet::new(Delimiters::new(open, open));

        loop {
            let token = self.expect_next(owner, "opening and closing parenthesis")?;
            match token.kind {
                TokenKind::Symbol if token.value == ")" => {
                    attrs.parens.close = token.position;
                    return Ok(attrs);
                }
                TokenKind::AttrClass => {
                    attrs.push_class(Element::new(token, NodeKind::Literal));
                }
                TokenKind::AttrClassVar => {
                    attrs.push_class(Element::new(token, NodeKind::Reference));
                }
                TokenKind::AttrId => {
                    if attrs.has_id() {
                        return Err(duplicate_id(&token));
                    }
                    attrs.id = Some(Box::new(Element::new(token, NodeKind::Literal)));
                }
                TokenKind::Variable | TokenKind::LiteralVariable => {
                    attrs.push_misc(Element::new(token, NodeKind::Reference));
                }
                TokenKind::Word => {
                    if self.next_if_symbol("=")?.is_none() {
                        attrs.push_misc(Element::new(token, NodeKind::Literal));
                        continue;
                    }

                    let value = self.expect_next(&token, "a key value pair")?;
                    let value = match value.kind {
                        TokenKind::String => Element::new(value, NodeKind::Text),
                        TokenKind::Word => Element::new(value, NodeKind::Literal),
                        TokenKind::Variable | TokenKind::LiteralVariable => {
                            Element::new(value, NodeKind::Reference)
                        }
                        TokenKind::Macro => self.parse_macro(value)?,
                        _ => return Err(invalid_type(&value, "a key value pair")),
                    };

                    if token.value == "id" && attrs.has_id() {
                        return Err(duplicate_id(&token));
                    }
                    attrs.push_kvp(Element::new(token, NodeKind::Literal).with_child(value));
                }
                _ => {
                    return Err(invalid_type(
                        &token,
                        "an attribute selector, identifier or word",
                    ))
                }
            }
        }
    }

    // =========================================================================
    // Functions and macros
    // =========================================================================

    fn parse_function(&mut self, token: Token) -> Result<Element, ParseError> {
        let grammar = self.grammar;
        let Some(signature) = grammar.function(&token.value) else {
            return Err(invalid_type(&token, "a function"));
        };

        let open = self.expect_next(&token, "opening and closing parenthesis")?;
        if !open.is_symbol("(") {
            return Err(invalid_type(&open, "'('"));
        }

        let mut args = Vec::new();
        if signature.args_sequence_strict {
            for param in signature.params.iter().filter(|p| !p.rest) {
                let next = self.peek_required(&token, "opening and closing parenthesis")?;
                if next.is_symbol(")") {
                    break;
                }
                if !param.accepts(next.kind) {
                    if param.optional {
                        continue;
                    }
                    return Err(illegal_argument(signature, param.name, &param.describe(), &next));
                }
                self.advance()?;
                args.push(self.parse_argument(next)?);
            }

            if let Some(rest) = signature.params.iter().find(|p| p.rest) {
                loop {
                    let next = self.peek_required(&token, "opening and closing parenthesis")?;
                    if next.is_symbol(")") {
                        break;
                    }
                    if !rest.accepts(next.kind) {
                        return Err(illegal_argument(signature, rest.name, &rest.describe(), &next));
                    }
                    self.advance()?;
                    args.push(self.parse_argument(next)?);
                }
            }
        } else {
            loop {
                let next = self.peek_required(&token, "opening and closing parenthesis")?;
                if next.is_symbol(")") {
                    break;
                }
                if !signature.accepts_any(next.kind) {
                    let types: Vec<&str> =
                        signature.accepted_types().iter().map(|t| t.name()).collect();
                    return Err(invalid_type(&next, &types.join(" or ")));
                }
                self.advance()?;
                args.push(self.parse_argument(next)?);
            }
        }

        let close = self.expect_next(&token, "opening and closing parenthesis")?;
        if !close.is_symbol(")") {
            return Err(invalid_type(&close, "')'"));
        }

        let required = signature.required_count();
        if args.len() < required {
            return Err(ParseError::at_token(
                ErrorKind::NotEnoughArguments {
                    required,
                    given: args.len(),
                },
                format!(
                    "Not enough arguments for '{}': {required} required, {} given",
                    signature.name,
                    args.len()
                ),
                &token,
            )
            .expecting(signature.label()));
        }

        let mut element = Element::new(token, NodeKind::Call);
        element.children = args;
        element.parens = Some(Delimiters::new(&open, &close));
        Ok(element)
    }

    fn parse_argument(&mut self, token: Token) -> Result<Element, ParseError> {
        match token.kind {
            TokenKind::String => Ok(Element::new(token, NodeKind::Text)),
            TokenKind::Variable | TokenKind::LiteralVariable => {
                Ok(Element::new(token, NodeKind::Reference))
            }
            TokenKind::Word => Ok(Element::new(token, NodeKind::Literal)),
            TokenKind::Function => self.parse_function(token),
            TokenKind::Macro => self.parse_macro(token),
            _ => Err(invalid_type(&token, "a function argument")),
        }
    }

    /// Macros are resolved against the registry as soon as they are read.
    fn parse_macro(&mut self, token: Token) -> Result<Element, ParseError> {
        match self.grammar.macro_def(&token.value) {
            Some(def) => {
                trace!(name = %def.name, kind = ?def.kind, "macro");
                Ok(Element::new(token, NodeKind::Macro))
            }
            None => Err(invalid_type(&token, "a macro")),
        }
    }

    // =========================================================================
    // Keywords and embedded languages
    // =========================================================================

    fn parse_keyword(&mut self, token: Token) -> Result<Element, ParseError> {
        let value = self.expect_next(&token, "string values")?;
        if value.kind != TokenKind::String {
            return Err(incomplete(&token, "string values"));
        }

        match token.value.as_str() {
            "doctype" | "comment" => {
                Ok(Element::new(token, NodeKind::Keyword).with_child(Element::new(value, NodeKind::Text)))
            }
            "import" => {
                self.resolve_import(&token, &value)?;
                let mut element = Element::new(token, NodeKind::Keyword)
                    .with_symbol_kind(SymbolKind::Method)
                    .with_child(Element::new(value, NodeKind::Text));
                if let Some(open) = self.next_if_symbol("{")? {
                    self.parse_properties(&mut element, &open)?;
                }
                Ok(element)
            }
            _ => Err(invalid_keyword(&token)),
        }
    }

    fn parse_elang(&mut self, token: Token) -> Result<Element, ParseError> {
        let body = self.expect_next(&token, "opening and closing braces")?;
        if body.kind != TokenKind::ElangBody {
            return Err(incomplete(&token, "opening and closing braces"));
        }

        let p = body.position;
        let braces = Delimiters {
            open: Position::single_line(p.line, p.column, 1),
            close: Position::single_line(p.end_line, p.end.saturating_sub(1), 1),
        };
        let mut element = Element::new(token, NodeKind::Elang);
        element.children.push(Element::new(body, NodeKind::Literal));
        element.braces = Some(braces);
        Ok(element)
    }

    /// `{ name value ... }` after an import or tiny template reference.
    fn parse_properties(&mut self, element: &mut Element, open: &Token) -> Result<(), ParseError> {
        let owner = element.token.clone();
        loop {
            let token = self.expect_next(&owner, "opening and closing braces")?;
            match token.kind {
                TokenKind::Symbol if token.value == "}" => {
                    element.braces = Some(Delimiters::new(open, &token));
                    return Ok(());
                }
                TokenKind::Comment | TokenKind::BlockComment => {
                    element.children.push(Element::new(token, NodeKind::Comment));
                }
                TokenKind::Word => {
                    let property = self.parse_binding_value(
                        token,
                        "string, macro, function or ftHTML block values",
                        true,
                    )?;
                    element.children.push(property);
                }
                _ => return Err(invalid_type(&token, "a property name")),
            }
        }
    }

    /// The value bound to a `#vars` entry or property: a string, variable,
    /// function, macro or `{ }` block.
    fn parse_binding_value(
        &mut self,
        name: Token,
        expected: &str,
        allow_bare: bool,
    ) -> Result<Element, ParseError> {
        let mut binding = Element::new(name, NodeKind::Binding);
        let value = self.peek_required(&binding.token, expected)?;

        match value.kind {
            TokenKind::String => {
                self.advance()?;
                binding.children.push(Element::new(value, NodeKind::Text));
            }
            TokenKind::Variable | TokenKind::LiteralVariable => {
                self.advance()?;
                binding.children.push(Element::new(value, NodeKind::Reference));
            }
            TokenKind::Function if value.value == "json" => {
                self.advance()?;
                binding.children.push(self.parse_json(value)?);
            }
            TokenKind::Function => {
                self.advance()?;
                binding.children.push(self.parse_function(value)?);
            }
            TokenKind::Macro => {
                self.advance()?;
                binding.children.push(self.parse_macro(value)?);
            }
            TokenKind::Symbol if value.value == "{" => {
                self.advance()?;
                self.parse_braced_body(&mut binding, &value, BINDING_BODY)?;
            }
            TokenKind::Comment | TokenKind::BlockComment if allow_bare => {}
            _ => return Err(invalid_type(&value, expected)),
        }
        Ok(binding)
    }

    // =========================================================================
    // Pragmas
    // =========================================================================

    fn parse_pragma(
        &mut self,
        token: Token,
        context: &'static [TokenKind],
    ) -> Result<Element, ParseError> {
        match token.value.as_str() {
            "vars" => self.parse_vars(token),
            "templates" | "tinytemplates" => self.parse_templates(token),
            "if" => self.parse_if(token, context),
            "ifdef" => {
                let name = self.expect_next(&token, "a variable name")?;
                if name.kind != TokenKind::Word {
                    return Err(invalid_type(&name, "a variable name"));
                }
                let mut element = Element::new(token, NodeKind::Pragma)
                    .with_child(Element::new(name, NodeKind::Literal));
                let owner = element.token.clone();
                let body = self.parse_block(context, Until::Pragma(&owner, &["end"]))?;
                element.children.extend(body);
                element.end = Some(self.expect_next(&owner, "#end")?.position);
                Ok(element)
            }
            "debug" => {
                let value = self.expect_next(&token, "a value to debug")?;
                let value = match value.kind {
                    TokenKind::Function | TokenKind::Macro | TokenKind::String
                    | TokenKind::Variable | TokenKind::LiteralVariable => {
                        self.parse_argument(value)?
                    }
                    _ => return Err(invalid_type(&value, "a string, variable, function or macro")),
                };
                Ok(Element::new(token, NodeKind::Pragma).with_child(value))
            }
            _ => Err(invalid_keyword(&token)),
        }
    }

    fn parse_vars(&mut self, token: Token) -> Result<Element, ParseError> {
        let mut element =
            Element::new(token, NodeKind::Pragma).with_symbol_kind(SymbolKind::Struct);
        let owner = element.token.clone();

        loop {
            let token = self.expect_next(&owner, "#end")?;
            match token.kind {
                TokenKind::Pragma if token.value == "end" => {
                    element.end = Some(token.position);
                    return Ok(element);
                }
                TokenKind::Comment | TokenKind::BlockComment => {
                    element.children.push(Element::new(token, NodeKind::Comment));
                }
                TokenKind::Word if is_valid_name(&token.value) => {
                    let binding =
                        self.parse_binding_value(token, "string or ftHTML block values", false)?;
                    self.scope.declare(binding.name(), binding.clone());
                    element.children.push(binding);
                }
                _ => {
                    return Err(ParseError::at_token(
                        ErrorKind::InvalidVariableName,
                        format!(
                            "Invalid variable name '{}', names must match [\\w-]+",
                            token.value
                        ),
                        &token,
                    )
                    .expecting("[\\w-]+"))
                }
            }
        }
    }

    /// `json("file")` inside `#vars`.
    fn parse_json(&mut self, token: Token) -> Result<Element, ParseError> {
        let open = self.expect_next(&token, "opening and closing parenthesis")?;
        if !open.is_symbol("(") {
            return Err(invalid_type(&open, "'('"));
        }
        let file = self.expect_next(&token, "opening and closing parenthesis")?;
        if file.kind != TokenKind::String {
            return Err(invalid_type(&file, "a string"));
        }
        let close = self.expect_next(&token, "opening and closing parenthesis")?;
        if !close.is_symbol(")") {
            return Err(invalid_type(&close, "')'"));
        }

        self.resolve_json(&file)?;

        let mut element = Element::new(token, NodeKind::Call);
        element.children.push(Element::new(file, NodeKind::Text));
        element.parens = Some(Delimiters::new(&open, &close));
        Ok(element)
    }

    fn parse_templates(&mut self, token: Token) -> Result<Element, ParseError> {
        let mut element =
            Element::new(token, NodeKind::Pragma).with_symbol_kind(SymbolKind::Struct);
        let owner = element.token.clone();

        loop {
            let token = self.expect_next(&owner, "#end")?;
            match token.kind {
                TokenKind::Pragma if token.value == "end" => {
                    element.end = Some(token.position);
                    return Ok(element);
                }
                TokenKind::Comment | TokenKind::BlockComment => {
                    element.children.push(Element::new(token, NodeKind::Comment));
                }
                TokenKind::Word if is_valid_name(&token.value) => {
                    let (binding, template) = self.parse_template_declaration(token)?;
                    self.tiny_templates.insert(template.name.clone(), template);
                    element.children.push(binding);
                }
                _ => {
                    return Err(ParseError::at_token(
                        ErrorKind::InvalidTinyTemplateName,
                        format!(
                            "Invalid tiny template name '{}', names must match [\\w-]+",
                            token.value
                        ),
                        &token,
                    )
                    .expecting("[\\w-]+"))
                }
            }
        }
    }

    /// One `name value` entry of `#templates`:
    ///
    /// ```text
    /// name "literal ${val}"
    /// name element
    /// name element "value ${val}"
    /// name element(attrs) "value ${val}"
    /// ```
    fn parse_template_declaration(
        &mut self,
        name: Token,
    ) -> Result<(Element, TinyTemplate), ParseError> {
        let mut binding = Element::new(name, NodeKind::Binding);
        let value = self.expect_next(&binding.token, "string or element values")?;

        let template = match value.kind {
            TokenKind::String => {
                binding.children.push(Element::new(value.clone(), NodeKind::Text));
                TinyTemplate {
                    name: binding.name().to_string(),
                    value,
                    element: None,
                    origin: Origin::Local,
                }
            }
            TokenKind::Word => {
                if !is_valid_name(&value.value) {
                    return Err(ParseError::at_token(
                        ErrorKind::InvalidElementName,
                        format!("Invalid element name '{}', names must match [\\w-]+", value.value),
                        &value,
                    ));
                }
                let mut tag = Element::new(value, NodeKind::Tag);
                if let Some(open) = self.next_if_symbol("(")? {
                    tag.attrs = Some(self.parse_attributes(&tag.token, &open)?);
                }

                let text = match self.peek()? {
                    Some(text) if text.kind == TokenKind::String => {
                        self.advance()?;
                        tag.children.push(Element::new(text.clone(), NodeKind::Text));
                        text
                    }
                    _ => Token::synthetic(TokenKind::String, "${val}", tag.token.position),
                };

                binding.children.push(tag.clone());
                TinyTemplate {
                    name: binding.name().to_string(),
                    value: text,
                    element: Some(tag),
                    origin: Origin::Local,
                }
            }
            _ => return Err(invalid_type(&value, "string or element values")),
        };

        Ok((binding, template))
    }

    /// `#if lhs op rhs ... (#elif lhs op rhs ...)* (#else ...)? #end`
    fn parse_if(
        &mut self,
        token: Token,
        context: &'static [TokenKind],
    ) -> Result<Element, ParseError> {
        let mut element = Element::new(token.clone(), NodeKind::Pragma);
        let mut branch_token = token;

        loop {
            let mut branch = Element::new(branch_token.clone(), NodeKind::Branch);
            if branch_token.value != "else" {
                let lhs = self.parse_operand(&branch_token)?;
                let op = self.expect_next(&branch_token, "an operator")?;
                if op.kind != TokenKind::Word || !self.grammar.is_operator(&op.value) {
                    return Err(invalid_type(&op, "an operator"));
                }
                let op = Token {
                    kind: TokenKind::Operator,
                    ..op
                };
                let rhs = self.parse_operand(&branch_token)?;
                branch.children.push(lhs);
                branch.children.push(Element::new(op, NodeKind::Operator));
                branch.children.push(rhs);
            }

            let closers: &'static [&'static str] = if branch_token.value == "else" {
                &["end"]
            } else {
                &["elif", "else", "end"]
            };
            let body = self.parse_block(context, Until::Pragma(&element.token, closers))?;
            branch.children.extend(body);
            element.children.push(branch);

            let closer = self.expect_next(&element.token, "#end")?;
            if closer.value == "end" {
                element.end = Some(closer.position);
                return Ok(element);
            }
            branch_token = closer;
        }
    }

    fn parse_operand(&mut self, owner: &Token) -> Result<Element, ParseError> {
        let token = self.expect_next(owner, "a value to compare")?;
        match token.kind {
            TokenKind::String
            | TokenKind::Variable
            | TokenKind::LiteralVariable
            | TokenKind::Word
            | TokenKind::Function
            | TokenKind::Macro => self.parse_argument(token),
            _ => Err(invalid_type(&token, "a string, variable, word, function or macro")),
        }
    }

    // =========================================================================
    // Tiny templates
    // =========================================================================

    fn is_tiny_template(&self, name: &str) -> bool {
        self.tiny_templates.contains_key(name)
            || self
                .config
                .is_some_and(|c| c.global_tiny_templates.contains_key(name))
    }

    fn lookup_tiny_template(&self, name: &str, at: &Token) -> Option<TinyTemplate> {
        if let Some(template) = self.tiny_templates.get(name) {
            return Some(template.clone());
        }
        let raw = self.config?.global_tiny_templates.get(name)?;
        Some(self.compile_global_template(name, raw, at))
    }

    /// Recompile a configured template through the `#templates` grammar. If
    /// that fails the raw text is used as a literal template.
    fn compile_global_template(&self, name: &str, raw: &str, at: &Token) -> TinyTemplate {
        let source = format!("#templates {name} {raw} #end");
        let mut parser = self.template_parser(&source);
        let compiled = match parser.parse() {
            Ok(_) => parser.tiny_templates.remove(name),
            Err(e) => {
                debug!(template = name, error = %e, "configured tiny template used literally");
                None
            }
        };

        match compiled {
            Some(mut template) => {
                template.origin = Origin::Config;
                template
            }
            None => TinyTemplate {
                name: name.to_string(),
                value: Token::synthetic(TokenKind::String, raw, at.position),
                element: None,
                origin: Origin::Config,
            },
        }
    }

    /// A parser sharing this one's project settings and file location.
    fn template_parser<'s>(&self, source: &'s str) -> Parser<'s>
    where
        'a: 's,
    {
        let mut parser = Parser::new(source, self.grammar, self.config);
        parser.vars = ParserVariables::new(self.vars.file().clone());
        parser
    }

    fn parse_tiny_template_ref(&mut self, token: Token) -> Result<Element, ParseError> {
        let Some(template) = self.lookup_tiny_template(&token.value, &token) else {
            return self.parse_tag(token);
        };

        if template.placeholder_count() == 0 {
            return Err(ParseError::at_token(
                ErrorKind::InvalidTinyTemplatePlaceholder,
                format!(
                    "Tiny template '{}' has no unescaped ${{val}} placeholder",
                    template.name
                ),
                &token,
            )
            .expecting("${val}"));
        }

        let mut element = Element::new(token, NodeKind::TinyTemplate);
        let Some(next) = self.peek()? else {
            return Ok(element);
        };

        match next.kind {
            TokenKind::Symbol if next.value == "{" => {
                self.advance()?;
                self.parse_properties(&mut element, &next)?;
            }
            TokenKind::String
            | TokenKind::Function
            | TokenKind::Macro
            | TokenKind::Variable
            | TokenKind::LiteralVariable => {
                self.advance()?;
                element.children.push(self.parse_argument(next)?);
            }
            _ => {}
        }
        Ok(element)
    }

    // =========================================================================
    // Imports and json files
    // =========================================================================

    fn current_dir(&self) -> Option<PathBuf> {
        self.vars.file().dir.clone()
    }

    /// Resolve and parse an imported document. Without a file context or
    /// an `importDir` the import is left unresolved.
    fn resolve_import(&mut self, keyword: &Token, file: &Token) -> Result<(), ParseError> {
        let raw = file.value.as_str();
        if is_remote(raw) {
            return Err(ParseError::at_token(
                ErrorKind::Import,
                format!("Files must be local, can not access '{raw}'"),
                file,
            ));
        }

        let (base, name) = match raw.strip_prefix('&') {
            Some(relative) => (self.current_dir(), relative),
            None => (
                self.config
                    .and_then(ProjectConfig::import_dir)
                    .or_else(|| self.current_dir()),
                raw,
            ),
        };
        let Some(base) = base else {
            trace!(import = raw, "no file context, import left unresolved");
            return Ok(());
        };

        let path = base.join(with_extension(name, "fthtml"));
        if !path.is_file() {
            return Err(ParseError::at_token(
                ErrorKind::Import,
                format!("Can not find file '{}' to import", path.display()),
                file,
            ));
        }
        if self.import_chain.contains(&path) || self.vars.file().filename.as_ref() == Some(&path) {
            return Err(ParseError::at_token(
                ErrorKind::Import,
                format!("Circular import of '{}'", path.display()),
                file,
            ));
        }
        if self.vars.is_imported(&path) {
            return Ok(());
        }

        debug!(path = %path.display(), "resolving import");
        let source = std::fs::read_to_string(&path).map_err(|e| {
            ParseError::at_token(
                ErrorKind::Import,
                format!("Can not read file '{}': {e}", path.display()),
                file,
            )
        })?;

        let mut chain = self.import_chain.clone();
        chain.extend(self.vars.file().filename.clone());

        let mut child = Parser::new(&source, self.grammar, self.config).in_file(&path);
        child.import_chain = chain;
        let elements = child.parse().map_err(|mut e| {
            e.stack.push(StackFrame {
                file: self.vars.file().filename.clone(),
                position: keyword.position,
                message: format!("import \"{raw}\""),
            });
            e
        })?;

        self.vars.record_import(path, elements);
        Ok(())
    }

    fn resolve_json(&mut self, file: &Token) -> Result<(), ParseError> {
        let raw = file.value.as_str();
        if is_remote(raw) {
            return Err(ParseError::at_token(
                ErrorKind::Import,
                format!("Files must be local, can not access '{raw}'"),
                file,
            ));
        }

        let (base, name) = match raw.strip_prefix('&') {
            Some(relative) => (self.current_dir(), relative),
            None => (
                self.config
                    .and_then(ProjectConfig::json_dir)
                    .or_else(|| self.current_dir()),
                raw,
            ),
        };
        let Some(base) = base else {
            return Ok(());
        };

        let path = base.join(with_extension(name, "json"));
        let text = std::fs::read_to_string(&path).map_err(|_| {
            ParseError::at_token(
                ErrorKind::Import,
                format!("Can not find json file '{}'", path.display()),
                file,
            )
        })?;
        serde_json::from_str::<serde_json::Value>(&text).map_err(|e| {
            ParseError::at_token(
                ErrorKind::Import,
                format!("Invalid json in '{}': {e}", path.display()),
                file,
            )
        })?;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn peek(&mut self) -> Result<Option<Token>, ParseError> {
        Ok(self.stream.peek()?.cloned())
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.stream.next()?;
        Ok(())
    }

    /// Peek, treating end of input as an incomplete `owner`.
    fn peek_required(&mut self, owner: &Token, expected: &str) -> Result<Token, ParseError> {
        self.peek()?.ok_or_else(|| incomplete(owner, expected))
    }

    /// Consume the next token, treating end of input as an incomplete `owner`.
    fn expect_next(&mut self, owner: &Token, expected: &str) -> Result<Token, ParseError> {
        self.stream.next()?.ok_or_else(|| incomplete(owner, expected))
    }

    fn next_if_symbol(&mut self, symbol: &str) -> Result<Option<Token>, ParseError> {
        match self.peek()? {
            Some(token) if token.is_symbol(symbol) => {
                self.advance()?;
                Ok(Some(token))
            }
            _ => Ok(None),
        }
    }
}

// --- Free helpers ---

/// `[\w-]+`
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(fthtml_lexer::scanner::is_word_char)
}

fn is_remote(path: &str) -> bool {
    path.starts_with("http:") || path.starts_with("https:")
}

fn with_extension(name: &str, extension: &str) -> String {
    if name.ends_with(&format!(".{extension}")) {
        name.to_string()
    } else {
        format!("{name}.{extension}")
    }
}

fn normalize_document_path(path: &Path) -> Result<PathBuf, ParseError> {
    let raw = path.to_string_lossy();
    if is_remote(&raw) {
        return Err(ParseError::new(
            ErrorKind::Import,
            format!("Files must be local, can not access '{raw}'"),
            Position::default(),
        ));
    }
    Ok(PathBuf::from(with_extension(&raw, "fthtml")))
}

fn incomplete(owner: &Token, expected: &str) -> ParseError {
    ParseError::at_token(
        ErrorKind::IncompleteElement,
        format!("Incomplete element '{}', expecting {expected}", owner.source_text()),
        owner,
    )
    .expecting(expected)
}

fn invalid_type(token: &Token, expected: &str) -> ParseError {
    ParseError::at_token(
        ErrorKind::InvalidType,
        format!("Invalid type '{}', expecting {expected}", token.source_text()),
        token,
    )
    .expecting(expected)
}

fn invalid_keyword(token: &Token) -> ParseError {
    ParseError::at_token(
        ErrorKind::InvalidKeyword,
        format!("Invalid keyword '{}'", token.source_text()),
        token,
    )
}

fn duplicate_id(token: &Token) -> ParseError {
    ParseError::at_token(
        ErrorKind::DuplicateId,
        "An id has already been assigned to this element",
        token,
    )
}

fn illegal_argument(
    signature: &FunctionSignature,
    param: &str,
    expected: &str,
    token: &Token,
) -> ParseError {
    ParseError::at_token(
        ErrorKind::IllegalArgumentType,
        format!(
            "Illegal argument '{}' for parameter '{param}' of '{}', expecting {expected}",
            token.source_text(),
            signature.name
        ),
        token,
    )
    .expecting(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::cst::find_binding;
    use crate::vars::Resolved;
    use fthtml_lexer::grammar::{ArgType, Param};

    /// Helper: parse and panic on error.
    fn parse(source: &str) -> Vec<Element> {
        Parser::parse_source(source).unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        Parser::parse_source(source).unwrap_err()
    }

    // =========================================================================
    // Tags
    // =========================================================================

    #[test]
    fn test_empty_document() {
        assert!(parse("").is_empty());
        assert!(parse("  \n ").is_empty());
    }

    #[test]
    fn test_tag_with_string() {
        let elements = parse("div \"Hello\"");
        assert_eq!(elements.len(), 1);
        let div = &elements[0];
        assert_eq!(div.kind, NodeKind::Tag);
        assert_eq!(div.name(), "div");
        assert_eq!(div.children.len(), 1);
        assert_eq!(div.children[0].kind, NodeKind::Text);
        assert_eq!(div.children[0].name(), "Hello");
        assert!(!div.is_parent_element());
    }

    #[test]
    fn test_tag_with_attributes_and_body() {
        let elements = parse("div(#id .cls) {\n  span \"x\"\n}");
        let div = &elements[0];
        let attrs = div.attrs.as_ref().unwrap();
        assert_eq!(attrs.id.as_ref().map(|e| e.name()), Some("id"));
        assert_eq!(attrs.classes.len(), 1);
        assert_eq!(attrs.classes[0].name(), "cls");
        assert!(div.is_parent_element());
        assert_eq!(div.children.len(), 1);
        assert_eq!(div.children[0].name(), "span");
        let braces = div.braces.unwrap();
        assert_eq!((braces.open.line, braces.close.line), (1, 3));
    }

    #[test]
    fn test_ids_on_nested_tags() {
        let elements = parse(
            "nav(#top) {\n  a(#home .x) \"h\"\n  section(#s) { p(#inner) \"b\" }\n}",
        );
        let nav = &elements[0];
        assert_eq!(nav.selector().as_deref(), Some("nav#top"));
        assert_eq!(nav.children[0].selector().as_deref(), Some("a#home"));

        let inner = &nav.children[1].children[0];
        let id = inner.attrs.as_ref().and_then(|a| a.id.as_deref()).unwrap();
        assert_eq!(id.name(), "inner");
        assert_eq!(id.kind, NodeKind::Literal);
        assert_eq!(nav.clone(), *nav);
    }

    #[test]
    fn test_tag_values() {
        let elements = parse("p @title\np random(1 10)\np __UUID__\np");
        assert_eq!(elements[0].children[0].kind, NodeKind::Reference);
        assert_eq!(elements[1].children[0].kind, NodeKind::Call);
        assert_eq!(elements[2].children[0].kind, NodeKind::Macro);
        assert!(elements[3].children.is_empty());
    }

    #[test]
    fn test_nested_bodies() {
        let elements = parse("ul { li \"a\" li { b \"c\" } }");
        let ul = &elements[0];
        assert_eq!(ul.children.len(), 2);
        assert_eq!(ul.children[1].children[0].name(), "b");
    }

    #[test]
    fn test_self_closing_takes_no_value() {
        let elements = parse("img(src=a.png) p \"x\"");
        assert_eq!(elements.len(), 2);
        assert!(elements[0].children.is_empty());
        assert_eq!(elements[1].name(), "p");
    }

    #[test]
    fn test_invalid_element_name() {
        let err = parse_err("div.x \"a\"");
        assert_eq!(err.kind, ErrorKind::InvalidElementName);
    }

    #[test]
    fn test_unclosed_body() {
        let err = parse_err("div {\n span");
        assert_eq!(err.kind, ErrorKind::IncompleteElement);
        assert_eq!(err.token.map(|t| t.value), Some("div".to_string()));
    }

    #[test]
    fn test_string_not_allowed_at_top_level() {
        let err = parse_err("\"loose\"");
        assert_eq!(err.kind, ErrorKind::InvalidType);
    }

    #[test]
    fn test_doctype_only_first() {
        let elements = parse("doctype \"html\"\nhtml");
        assert_eq!(elements[0].kind, NodeKind::Keyword);
        assert_eq!(elements[0].children[0].name(), "html");

        let err = parse_err("html\ndoctype \"html\"");
        assert_eq!(err.kind, ErrorKind::InvalidType);
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    #[test]
    fn test_attribute_groups() {
        let elements = parse("a(href=\"/\" .x .@y target=_blank data-on @flag)");
        let attrs = elements[0].attrs.as_ref().unwrap();
        assert_eq!(attrs.classes.len(), 2);
        assert_eq!(attrs.classes[1].kind, NodeKind::Reference);
        assert_eq!(attrs.kvps.len(), 2);
        assert_eq!(attrs.kvps[0].name(), "href");
        assert_eq!(attrs.kvps[0].children[0].kind, NodeKind::Text);
        assert_eq!(attrs.kvps[1].children[0].name(), "_blank");
        assert_eq!(attrs.misc.len(), 2);
        assert_eq!(attrs.misc[1].kind, NodeKind::Reference);
    }

    #[test]
    fn test_macro_attribute_value_keeps_provenance() {
        let elements = parse("div(data-id=__UUID__)");
        let kvp = &elements[0].attrs.as_ref().unwrap().kvps[0];
        assert_eq!(kvp.children[0].kind, NodeKind::Macro);
        assert_eq!(kvp.children[0].name(), "__UUID__");
    }

    #[test]
    fn test_duplicate_id() {
        assert_eq!(parse_err("div(#a #b)").kind, ErrorKind::DuplicateId);
        assert_eq!(parse_err("div(#a id=b)").kind, ErrorKind::DuplicateId);
        assert_eq!(parse_err("div(id=a #b)").kind, ErrorKind::DuplicateId);
        assert!(Parser::parse_source("div(#a)").is_ok());
        assert!(Parser::parse_source("div(id=a)").is_ok());
    }

    #[test]
    fn test_duplicate_classes_ignored() {
        let elements = parse("div(.a .b .a)");
        assert_eq!(elements[0].attrs.as_ref().unwrap().classes.len(), 2);
    }

    #[test]
    fn test_invalid_attribute_token() {
        let err = parse_err("div(\"x\")");
        assert_eq!(err.kind, ErrorKind::InvalidType);
        assert_eq!(
            err.expected.as_deref(),
            Some("an attribute selector, identifier or word")
        );
    }

    #[test]
    fn test_unclosed_attributes() {
        assert_eq!(parse_err("div(.a").kind, ErrorKind::IncompleteElement);
    }

    #[test]
    fn test_kvp_needs_value() {
        assert_eq!(parse_err("div(a=)").kind, ErrorKind::InvalidType);
    }

    // =========================================================================
    // Functions
    // =========================================================================

    #[test]
    fn test_not_enough_arguments() {
        let err = parse_err("div random(1)");
        assert_eq!(
            err.kind,
            ErrorKind::NotEnoughArguments {
                required: 2,
                given: 1
            }
        );
        assert_eq!(err.token.map(|t| t.value), Some("random".to_string()));
    }

    #[test]
    fn test_illegal_argument_type() {
        let err = parse_err("p join(\"a\")");
        assert_eq!(err.kind, ErrorKind::IllegalArgumentType);
    }

    #[test]
    fn test_optional_argument_skipped_on_mismatch() {
        let elements = parse("p substring(@x 1)");
        assert_eq!(elements[0].children[0].children.len(), 2);
        let elements = parse("p trim(@x)");
        assert_eq!(elements[0].children[0].children.len(), 1);
    }

    #[test]
    fn test_too_many_arguments() {
        assert_eq!(parse_err("p len(@a @b)").kind, ErrorKind::InvalidType);
    }

    #[test]
    fn test_nested_calls_and_macros() {
        let elements = parse("p str_repeat(tcase(__DATE__ \"upper\") 2)");
        let call = &elements[0].children[0];
        assert_eq!(call.name(), "str_repeat");
        assert_eq!(call.children[0].kind, NodeKind::Call);
        assert_eq!(call.children[0].children[0].kind, NodeKind::Macro);
        assert!(call.parens.is_some());
    }

    #[test]
    fn test_non_strict_union_scan() {
        let elements = parse("p choose(a \"b\" @c len(@d))");
        assert_eq!(elements[0].children[0].children.len(), 4);
        assert!(matches!(
            parse_err("p choose()").kind,
            ErrorKind::NotEnoughArguments { required: 1, given: 0 }
        ));
    }

    #[test]
    fn test_missing_paren() {
        assert_eq!(parse_err("p random").kind, ErrorKind::IncompleteElement);
        assert_eq!(parse_err("p random 1").kind, ErrorKind::InvalidType);
        assert_eq!(parse_err("p random(1 2").kind, ErrorKind::IncompleteElement);
    }

    fn rest_grammar(required: usize) -> Grammar {
        let mut params: Vec<Param> = (0..required)
            .map(|_| Param {
                name: "value",
                types: &[ArgType::Word],
                optional: false,
                rest: false,
                choices: &[],
            })
            .collect();
        params.push(Param {
            name: "more",
            types: &[ArgType::Word],
            optional: false,
            rest: true,
            choices: &[],
        });
        Grammar::with_functions(vec![FunctionSignature {
            name: "collect",
            description: "",
            params,
            args_sequence_strict: true,
            return_type: ArgType::String,
        }])
    }

    #[test]
    fn test_rest_parameter_arity() {
        let grammar = rest_grammar(2);
        let ok = |src: &str| Parser::new(src, &grammar, None).parse();
        assert!(ok("p collect(a b)").is_ok());
        assert!(ok("p collect(a b c)").is_ok());
        assert!(ok("p collect(a b c d e)").is_ok());
        assert!(matches!(
            ok("p collect(a)").unwrap_err().kind,
            ErrorKind::NotEnoughArguments { required: 2, given: 1 }
        ));
    }

    // =========================================================================
    // Keywords and embedded languages
    // =========================================================================

    #[test]
    fn test_comment_keyword() {
        let elements = parse("comment \"note\"");
        assert_eq!(elements[0].kind, NodeKind::Keyword);
        assert_eq!(parse_err("comment div").kind, ErrorKind::IncompleteElement);
    }

    #[test]
    fn test_import_without_file_context() {
        let elements = parse("import \"header\" {\n  title \"Home\"\n  nav { a \"x\" }\n}");
        let import = &elements[0];
        assert_eq!(import.symbol_kind, SymbolKind::Method);
        assert_eq!(import.children[0].name(), "header");
        assert_eq!(import.children[1].kind, NodeKind::Binding);
        assert_eq!(import.children[2].name(), "nav");
        assert!(import.children[2].is_parent_element());
        assert!(import.is_parent_element());
    }

    #[test]
    fn test_remote_import_rejected() {
        let err = parse_err("import \"https://example.com/a\"");
        assert_eq!(err.kind, ErrorKind::Import);
    }

    #[test]
    fn test_elang() {
        let elements = parse("css {\n  a { color: red; }\n}\njs { x() }");
        assert_eq!(elements[0].kind, NodeKind::Elang);
        assert_eq!(elements[0].children[0].token.kind, TokenKind::ElangBody);
        let braces = elements[0].braces.unwrap();
        assert_eq!((braces.open.line, braces.close.line), (1, 3));
        assert_eq!(braces.close.column, 1);
        assert_eq!(elements[0].last_line(), 3);
        assert_eq!(elements[1].name(), "js");
    }

    #[test]
    fn test_elang_without_body() {
        assert_eq!(parse_err("div { css }").kind, ErrorKind::IncompleteElement);
    }

    // =========================================================================
    // Pragmas
    // =========================================================================

    #[test]
    fn test_vars_pragma() {
        let mut parser = Parser::new(
            "#vars\n  x \"1\"\n  y { b \"bold\" }\n  z random(1 2)\n#end\ndiv @x",
            grammar::standard(),
            None,
        );
        let elements = parser.parse().unwrap();
        assert_eq!(elements.len(), 2);
        let vars = &elements[0];
        assert_eq!(vars.symbol_kind, SymbolKind::Struct);
        assert_eq!(vars.children.len(), 3);
        assert_eq!(vars.end.map(|p| p.line), Some(5));
        assert!(matches!(parser.scope().resolve("x"), Some(Resolved::Local(_))));
        assert!(find_binding(&elements, "y").is_some_and(|b| b.is_parent_element()));
        assert_eq!(elements[1].children[0].kind, NodeKind::Reference);
    }

    #[test]
    fn test_vars_errors() {
        let err = parse_err("#vars\n  x \"1\"");
        assert_eq!(err.kind, ErrorKind::IncompleteElement);
        assert!(err.message.contains("#vars"));
        assert_eq!(parse_err("#vars \"x\" #end").kind, ErrorKind::InvalidVariableName);
        assert_eq!(parse_err("#vars x div #end").kind, ErrorKind::InvalidType);
        assert_eq!(parse_err("#vars x { #vars #end } #end").kind, ErrorKind::InvalidType);
    }

    #[test]
    fn test_json_value_in_vars() {
        let elements = parse("#vars\n  data json(\"posts\")\n#end");
        let call = &elements[0].children[0].children[0];
        assert_eq!(call.name(), "json");
        assert_eq!(call.children[0].name(), "posts");
    }

    #[test]
    fn test_unknown_pragma() {
        assert_eq!(parse_err("#nope").kind, ErrorKind::InvalidKeyword);
        assert_eq!(parse_err("div #end").kind, ErrorKind::InvalidKeyword);
    }

    #[test]
    fn test_if_elif_else() {
        let elements = parse(
            "#if @a eq \"x\"\n  p \"one\"\n#elif @a ne y\n  p \"two\"\n#else\n  p \"three\"\n#end",
        );
        let if_ = &elements[0];
        assert_eq!(if_.children.len(), 3);
        let first = &if_.children[0];
        assert_eq!(first.kind, NodeKind::Branch);
        assert_eq!(first.children[1].kind, NodeKind::Operator);
        assert_eq!(first.children[1].token.kind, TokenKind::Operator);
        assert_eq!(first.branch_body().len(), 1);
        assert_eq!(if_.children[2].name(), "else");
        assert_eq!(if_.children[2].branch_body().len(), 1);
        assert_eq!(if_.end.map(|p| p.line), Some(7));
    }

    #[test]
    fn test_if_requires_operator() {
        assert_eq!(parse_err("#if @a is \"x\" #end").kind, ErrorKind::InvalidType);
        assert_eq!(parse_err("#if @a eq \"x\" p").kind, ErrorKind::IncompleteElement);
        assert_eq!(parse_err("#if @a eq \"x\" #else #elif").kind, ErrorKind::InvalidKeyword);
    }

    #[test]
    fn test_ifdef_and_debug() {
        let elements = parse("div {\n  #ifdef title\n    h1 @title\n  #end\n  #debug @title\n}");
        let div = &elements[0];
        assert!(div.children[0].is_pragma("ifdef"));
        assert_eq!(div.children[0].children.len(), 2);
        assert!(div.children[1].is_pragma("debug"));
        assert_eq!(div.children[1].children[0].kind, NodeKind::Reference);
    }

    // =========================================================================
    // Tiny templates
    // =========================================================================

    #[test]
    fn test_tiny_template_forms() {
        let mut parser = Parser::new(
            "#templates\n  lit \"<b>${val}</b>\"\n  bold b\n  link a(href=\"${val}\") \"${val}\"\n  em i \"${val}!\"\n#end",
            grammar::standard(),
            None,
        );
        parser.parse().unwrap();
        let templates = parser.tiny_templates();
        assert_eq!(templates.len(), 4);
        assert_eq!(templates["lit"].expand("x"), "<b>x</b>");
        assert_eq!(templates["bold"].value.value, "${val}");
        assert!(templates["bold"].element.is_some());
        assert!(templates["link"].element.as_ref().unwrap().attrs.is_some());
        assert_eq!(templates["em"].expand("hey"), "hey!");
    }

    #[test]
    fn test_tiny_template_reference() {
        let elements = parse("#templates\n  bold b\n#end\ndiv { bold \"x\" }");
        let use_ = &elements[1].children[0];
        assert_eq!(use_.kind, NodeKind::TinyTemplate);
        assert_eq!(use_.symbol_kind, SymbolKind::Variable);
        assert_eq!(use_.children[0].name(), "x");
    }

    #[test]
    fn test_tiny_template_visible_after_declaration_only() {
        let elements = parse("bold \"x\"\n#templates\n  bold b\n#end");
        assert_eq!(elements[0].kind, NodeKind::Tag);
    }

    #[test]
    fn test_tiny_template_without_placeholder() {
        let err = parse_err("#templates\n  t \"static\"\n#end\nt \"x\"");
        assert_eq!(err.kind, ErrorKind::InvalidTinyTemplatePlaceholder);
        assert_eq!(err.position.line, 4);

        let err = parse_err("#templates\n  t \"\\${val}\"\n#end\nt \"x\"");
        assert_eq!(err.kind, ErrorKind::InvalidTinyTemplatePlaceholder);
    }

    #[test]
    fn test_invalid_tiny_template_name() {
        assert_eq!(
            parse_err("#templates \"x\" b #end").kind,
            ErrorKind::InvalidTinyTemplateName
        );
    }

    #[test]
    fn test_config_tiny_templates_visible_from_first_line() {
        let config = ProjectConfig::from_json(
            r#"{ "globalTinyTemplates": { "bold": "b", "raw": "<<${val}>>" } }"#,
        )
        .unwrap();
        let mut parser = Parser::new("bold \"x\"\nraw \"y\"", grammar::standard(), Some(&config));
        let elements = parser.parse().unwrap();
        assert_eq!(elements[0].kind, NodeKind::TinyTemplate);
        assert_eq!(elements[1].kind, NodeKind::TinyTemplate);

        let compiled = parser.compile_global_template("bold", "b", &elements[0].token);
        assert!(compiled.element.is_some());
        assert_eq!(compiled.origin, Origin::Config);

        // `<<...` does not lex, so the raw text is kept as a literal template
        let literal = parser.compile_global_template("raw", "<<${val}>>", &elements[1].token);
        assert!(literal.element.is_none());
        assert_eq!(literal.expand("z"), "<<z>>");
    }

    #[test]
    fn test_config_templates_compile_in_file_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.fthtml");
        let config = ProjectConfig::from_json(r#"{ "globalTinyTemplates": { "bold": "b" } }"#)
            .unwrap();
        let parser = Parser::new("bold \"x\"", grammar::standard(), Some(&config)).in_file(&path);

        let inner = parser.template_parser("#templates bold b #end");
        assert!(inner.config.is_some_and(|c| std::ptr::eq(c, &config)));
        assert_eq!(inner.variables().file(), parser.variables().file());
    }

    #[test]
    fn test_tiny_template_with_several_placeholders() {
        let elements = parse(
            "#templates\n  link a(href=\"${val}\") \"${val}\"\n#end\nlink \"/about\"",
        );
        assert_eq!(elements[1].kind, NodeKind::TinyTemplate);

        let parser = {
            let mut p = Parser::new(
                "#templates\n  pair \"${val} and ${val}\"\n#end",
                grammar::standard(),
                None,
            );
            p.parse().unwrap();
            p
        };
        let pair = &parser.tiny_templates()["pair"];
        assert_eq!(pair.placeholder_count(), 2);
        assert_eq!(pair.expand("x"), "x and x");
    }

    #[test]
    fn test_local_template_shadows_tag_names() {
        let elements = parse("#templates\n  div span\n#end\ndiv \"x\"");
        assert_eq!(elements[1].kind, NodeKind::TinyTemplate);
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_unterminated_string_is_lexical() {
        let err = parse_err("div \"abc");
        assert_eq!(err.kind, ErrorKind::UnterminatedString);
        assert_eq!((err.position.line, err.position.column), (1, 5));
    }

    #[test]
    fn test_error_positions() {
        let err = parse_err("div {\n  p(#a #b)\n}");
        assert_eq!((err.position.line, err.position.column), (2, 8));
    }

    // =========================================================================
    // Files and imports
    // =========================================================================

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_parse_file_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.fthtml", "div \"x\"");
        let elements = Parser::parse_file(&dir.path().join("index"), None).unwrap();
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn test_import_resolution() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "header.fthtml", "header \"Top\"");
        let index = write(dir.path(), "index.fthtml", "import \"header\"\ndiv");

        let source = std::fs::read_to_string(&index).unwrap();
        let mut parser = Parser::new(&source, grammar::standard(), None).in_file(&index);
        parser.parse().unwrap();
        let imports = parser.variables().imports();
        assert_eq!(imports.len(), 1);
        let (path, elements) = imports.iter().next().unwrap();
        assert_eq!(path, &dir.path().join("header.fthtml"));
        assert_eq!(elements[0].name(), "header");
    }

    #[test]
    fn test_import_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let index = write(dir.path(), "index.fthtml", "import \"nope\"");
        let err = Parser::parse_file(&index, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Import);
        assert!(err.message.contains("Can not find file"));
    }

    #[test]
    fn test_import_dir_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("partials")).unwrap();
        write(&dir.path().join("partials"), "nav.fthtml", "nav");
        write(dir.path(), "nav.fthtml", "div $");
        let config_path = write(
            dir.path(),
            crate::config::CONFIG_FILE_NAME,
            r#"{ "importDir": "partials" }"#,
        );
        let config = ProjectConfig::load(&config_path).unwrap();
        let index = write(dir.path(), "index.fthtml", "import \"nav\"\nimport \"&nav\"");

        // The `&` form bypasses importDir and reaches the broken sibling.
        let err = Parser::parse_file(&index, Some(&config)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalCharacter);
        assert_eq!(err.stack.len(), 1);
        assert_eq!(err.stack[0].position.line, 2);
        assert_eq!(err.file, Some(dir.path().join("nav.fthtml")));
    }

    #[test]
    fn test_nested_import_error_stack() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "inner.fthtml", "div(#a #b)");
        write(dir.path(), "mid.fthtml", "p\nimport \"inner\"");
        let index = write(dir.path(), "index.fthtml", "import \"mid\"");

        let err = Parser::parse_file(&index, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateId);
        assert_eq!(err.stack.len(), 2);
        assert_eq!(err.stack[0].file, Some(dir.path().join("mid.fthtml")));
        assert_eq!(err.stack[0].position.line, 2);
        assert_eq!(err.stack[1].file, Some(index.clone()));

        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic.position.line, 1);
        assert_eq!(diagnostic.related_stack.len(), 2);
    }

    #[test]
    fn test_circular_import() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.fthtml", "import \"b\"");
        write(dir.path(), "b.fthtml", "import \"a\"");
        let err = Parser::parse_file(&dir.path().join("a.fthtml"), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Import);
        assert!(err.message.contains("Circular"));
    }

    #[test]
    fn test_json_resolution() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "posts.json", "[1, 2]");
        write(dir.path(), "broken.json", "[1,");
        let ok = write(dir.path(), "ok.fthtml", "#vars\n  p json(\"posts\")\n#end");
        let bad = write(dir.path(), "bad.fthtml", "#vars\n  p json(\"broken\")\n#end");
        let missing = write(dir.path(), "missing.fthtml", "#vars\n  p json(\"none\")\n#end");

        assert!(Parser::parse_file(&ok, None).is_ok());
        assert!(Parser::parse_file(&bad, None)
            .unwrap_err()
            .message
            .contains("Invalid json"));
        assert_eq!(
            Parser::parse_file(&missing, None).unwrap_err().kind,
            ErrorKind::Import
        );
    }
}
