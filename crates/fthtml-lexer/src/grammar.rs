//! The ftHTML grammar registry.
//!
//! A static description of the language's vocabulary: keywords, pragmas,
//! embedded languages, operators, functions with their argument signatures,
//! macros and self-closing tags. The registry is built once by a pure
//! constructor and shared read-only by every lexer, parser and formatter.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::token::TokenKind;

static STANDARD: LazyLock<Grammar> = LazyLock::new(Grammar::standard);

/// The shared standard registry.
pub fn standard() -> &'static Grammar {
    &STANDARD
}

pub const KEYWORDS: &[&str] = &["doctype", "comment", "import"];

pub const PRAGMAS: &[&str] = &[
    "vars",
    "templates",
    "tinytemplates",
    "if",
    "elif",
    "else",
    "end",
    "debug",
    "ifdef",
];

pub const EMBEDDED_LANGUAGES: &[&str] = &["css", "js"];

pub const OPERATORS: &[&str] = &[
    "eq", "ne", "ie", "gt", "lt", "ge", "le", "contains", "icontains", "starts", "ends", "istarts",
    "iends", "match", "imatch",
];

/// HTML void elements: these never take a body, only attributes.
pub const SELF_CLOSING_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Macros that evaluate to plain text and also have a `JS_` script alias.
const DATE_MACROS: &[&str] = &[
    "DATE",
    "DATETIME",
    "ISO_DATE",
    "LOCAL_DATE",
    "LOCAL_DATETIME",
    "NOW",
];

/// Macros that only exist as client-side script.
const SCRIPT_MACROS: &[&str] = &[
    "JS_AGENT",
    "JS_URI",
    "JS_URI_HASH",
    "JS_URI_HOSTNAME",
    "JS_URI_HOST",
    "JS_URI_PORT",
    "JS_URI_PATH",
    "JS_URI_PROTOCOL",
    "JS_URI_SEARCH",
];

/// The kind of token an argument slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    String,
    Variable,
    Word,
    Function,
    Macro,
}

impl ArgType {
    /// Whether a token of `kind` can fill a slot of this type.
    pub fn accepts(self, kind: TokenKind) -> bool {
        matches!(
            (self, kind),
            (ArgType::String, TokenKind::String)
                | (ArgType::Variable, TokenKind::Variable | TokenKind::LiteralVariable)
                | (ArgType::Word, TokenKind::Word)
                | (ArgType::Function, TokenKind::Function)
                | (ArgType::Macro, TokenKind::Macro)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Variable => "variable",
            ArgType::Word => "word",
            ArgType::Function => "function",
            ArgType::Macro => "macro",
        }
    }
}

/// One parameter in a function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub types: &'static [ArgType],
    pub optional: bool,
    pub rest: bool,
    /// Accepted literal values for enumerated parameters, empty otherwise.
    pub choices: &'static [&'static str],
}

impl Param {
    const fn required(name: &'static str, types: &'static [ArgType]) -> Self {
        Self {
            name,
            types,
            optional: false,
            rest: false,
            choices: &[],
        }
    }

    const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    const fn rest(mut self) -> Self {
        self.rest = true;
        self
    }

    const fn choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }

    /// Whether a token of `kind` fits this parameter.
    pub fn accepts(&self, kind: TokenKind) -> bool {
        self.types.iter().any(|t| t.accepts(kind))
    }

    /// Human readable list of accepted types, e.g. `string or variable`.
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.types.iter().map(|t| t.name()).collect();
        names.join(" or ")
    }
}

/// Signature of a built-in function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<Param>,
    /// When true arguments are matched positionally against `params`; when
    /// false any mix of the parameters' types is accepted until `)`.
    pub args_sequence_strict: bool,
    pub return_type: ArgType,
}

impl FunctionSignature {
    /// Number of parameters that must be supplied.
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| !p.optional && !p.rest).count()
    }

    /// Union of every parameter's accepted types.
    pub fn accepted_types(&self) -> Vec<ArgType> {
        let mut types: Vec<ArgType> = Vec::new();
        for t in self.params.iter().flat_map(|p| p.types.iter()) {
            if !types.contains(t) {
                types.push(*t);
            }
        }
        types
    }

    pub fn accepts_any(&self, kind: TokenKind) -> bool {
        self.params.iter().any(|p| p.accepts(kind))
    }

    /// `name(param param?)` form used in hover text and signature help.
    pub fn label(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let mut label = p.name.to_string();
                if p.rest {
                    label = format!("...{label}");
                }
                if p.optional {
                    label.push('?');
                }
                label
            })
            .collect();
        format!("{}({})", self.name, params.join(" "))
    }
}

/// Whether a macro evaluates to text or to an inline client-side script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    Pure,
    Script,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    pub name: String,
    pub kind: MacroKind,
}

/// The language vocabulary.
#[derive(Debug, Clone)]
pub struct Grammar {
    functions: HashMap<&'static str, FunctionSignature>,
    macros: HashMap<String, MacroDef>,
}

impl Grammar {
    /// Build the standard registry.
    pub fn standard() -> Self {
        Self::with_functions(standard_functions())
    }

    /// Build a registry with the standard vocabulary but a custom function table.
    pub fn with_functions(functions: impl IntoIterator<Item = FunctionSignature>) -> Self {
        let functions = functions.into_iter().map(|f| (f.name, f)).collect();

        let pure = DATE_MACROS.iter().chain(std::iter::once(&"UUID")).map(|name| MacroDef {
            name: name.to_string(),
            kind: MacroKind::Pure,
        });
        let aliases = DATE_MACROS.iter().map(|name| MacroDef {
            name: format!("JS_{name}"),
            kind: MacroKind::Script,
        });
        let scripts = SCRIPT_MACROS.iter().map(|name| MacroDef {
            name: name.to_string(),
            kind: MacroKind::Script,
        });
        let macros = pure
            .chain(aliases)
            .chain(scripts)
            .map(|m| (m.name.clone(), m))
            .collect();

        Self { functions, macros }
    }

    // --- Lookups ---

    pub fn is_keyword(&self, word: &str) -> bool {
        KEYWORDS.contains(&word)
    }

    pub fn is_pragma(&self, word: &str) -> bool {
        PRAGMAS.contains(&word)
    }

    pub fn is_elang(&self, word: &str) -> bool {
        EMBEDDED_LANGUAGES.contains(&word)
    }

    pub fn is_operator(&self, word: &str) -> bool {
        OPERATORS.contains(&word)
    }

    pub fn is_self_closing(&self, tag: &str) -> bool {
        SELF_CLOSING_TAGS.contains(&tag)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.functions.values()
    }

    /// Look up a macro by its written form (`__UUID__`) or bare name (`UUID`).
    pub fn macro_def(&self, name: &str) -> Option<&MacroDef> {
        let bare = strip_macro_delimiters(name).unwrap_or(name);
        self.macros.get(bare)
    }

    pub fn macros(&self) -> impl Iterator<Item = &MacroDef> {
        self.macros.values()
    }

    /// Classify a raw lexeme.
    ///
    /// Priority: keyword (with `doctype` sub-typed), embedded language,
    /// `#`-prefixed pragma, function, `__macro__`, otherwise a plain word.
    /// Names declared at parse time (tiny templates) are layered on top by
    /// the parser and never consulted here.
    pub fn classify(&self, lexeme: &str) -> TokenKind {
        if self.is_keyword(lexeme) {
            if lexeme == "doctype" {
                return TokenKind::KeywordDoctype;
            }
            return TokenKind::Keyword;
        }
        if self.is_elang(lexeme) {
            return TokenKind::Elang;
        }
        if let Some(pragma) = lexeme.strip_prefix('#') {
            if self.is_pragma(pragma) {
                return TokenKind::Pragma;
            }
        }
        if self.functions.contains_key(lexeme) {
            return TokenKind::Function;
        }
        if strip_macro_delimiters(lexeme).is_some_and(|m| self.macros.contains_key(m)) {
            return TokenKind::Macro;
        }
        TokenKind::Word
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::standard()
    }
}

/// `__NAME__` → `NAME`.
pub fn strip_macro_delimiters(word: &str) -> Option<&str> {
    word.strip_prefix("__")
        .and_then(|w| w.strip_suffix("__"))
        .filter(|w| !w.is_empty())
}

// --- Built-in functions ---

use ArgType::{Function as Fn_, Macro, String as Str, Variable as Var, Word};

const TEXT_CASES: &[&str] = &["capitalization", "upper", "lower", "alternating", "title"];
const TRIM_STYLES: &[&str] = &["left", "right", "start", "end", "both"];
const FORMAT_STYLES: &[&str] = &["currency", "number", "percent", "date", "bytes"];

fn strict(
    name: &'static str,
    description: &'static str,
    params: Vec<Param>,
    return_type: ArgType,
) -> FunctionSignature {
    FunctionSignature {
        name,
        description,
        params,
        args_sequence_strict: true,
        return_type,
    }
}

fn standard_functions() -> Vec<FunctionSignature> {
    vec![
        strict(
            "addslashes",
            "Escapes quotes and backslashes with a backslash",
            vec![Param::required("value", &[Str, Var, Fn_, Macro])],
            Str,
        ),
        FunctionSignature {
            name: "choose",
            description: "Picks one of the given values at random",
            params: vec![
                Param::required("value", &[Str, Var, Word, Fn_, Macro]),
                Param::required("values", &[Str, Var, Word, Fn_, Macro]).rest(),
            ],
            args_sequence_strict: false,
            return_type: Str,
        },
        strict(
            "html_encode",
            "Converts characters to their HTML entities",
            vec![Param::required("value", &[Str, Var, Fn_])],
            Str,
        ),
        strict(
            "html_decode",
            "Converts HTML entities back to characters",
            vec![Param::required("value", &[Str, Var, Fn_])],
            Str,
        ),
        strict(
            "join",
            "Joins the values of an array variable",
            vec![
                Param::required("value", &[Var]),
                Param::required("delimiter", &[Str, Var]).optional(),
            ],
            Str,
        ),
        strict(
            "json",
            "Reads a json file from the json directory",
            vec![Param::required("file", &[Str])],
            Var,
        ),
        strict(
            "len",
            "Length of a string or array",
            vec![Param::required("value", &[Str, Var, Fn_, Word])],
            Word,
        ),
        strict(
            "random",
            "Random integer between min and max inclusive",
            vec![
                Param::required("min", &[Str, Var, Word, Fn_]),
                Param::required("max", &[Str, Var, Word, Fn_]),
            ],
            Word,
        ),
        strict(
            "replace",
            "Replaces every match of a pattern",
            vec![
                Param::required("value", &[Str, Var, Fn_, Macro]),
                Param::required("pattern", &[Str]),
                Param::required("replace value", &[Str, Var, Fn_]),
            ],
            Str,
        ),
        strict(
            "str_split",
            "Splits a string into an array",
            vec![
                Param::required("value", &[Str, Var, Fn_, Macro]),
                Param::required("delimiter", &[Str, Var]),
            ],
            Var,
        ),
        strict(
            "str_repeat",
            "Repeats a string",
            vec![
                Param::required("value", &[Str, Var, Fn_, Macro]),
                Param::required("quantity", &[Str, Word]),
            ],
            Str,
        ),
        strict(
            "str_reverse",
            "Reverses a string",
            vec![Param::required("value", &[Str, Var, Fn_, Macro])],
            Str,
        ),
        strict(
            "str_format",
            "Formats a value as currency, number, percent, date or bytes",
            vec![
                Param::required("value", &[Str, Var, Fn_]),
                Param::required("style", &[Word, Str]).choices(FORMAT_STYLES),
                Param::required("options", &[Str]).optional(),
            ],
            Str,
        ),
        strict(
            "substring",
            "Extracts part of a string",
            vec![
                Param::required("value", &[Str, Var, Fn_, Macro]),
                Param::required("start", &[Str, Var, Word]),
                Param::required("end", &[Str, Var, Word]).optional(),
            ],
            Str,
        ),
        strict(
            "tcase",
            "Changes the text case of a string",
            vec![
                Param::required("value", &[Str, Var, Fn_, Macro]),
                Param::required("text case", &[Str, Word]).choices(TEXT_CASES),
            ],
            Str,
        ),
        strict(
            "trim",
            "Removes surrounding whitespace",
            vec![
                Param::required("value", &[Str, Var, Fn_, Macro]),
                Param::required("trim style", &[Str, Word])
                    .choices(TRIM_STYLES)
                    .optional(),
            ],
            Str,
        ),
    ]
}
