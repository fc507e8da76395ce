//! Parse-time state: the file context, declared variables and tiny templates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use fthtml_lexer::Token;
use regex::Regex;

use crate::cst::Element;

/// Matches `${val}` placeholders, capturing a preceding backslash when the
/// placeholder is escaped.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\?)\$\{ *val *\}").expect("valid placeholder regex"));

/// Where the document being parsed lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileContext {
    pub dir: Option<PathBuf>,
    pub filename: Option<PathBuf>,
}

impl FileContext {
    pub fn for_path(path: &Path) -> Self {
        Self {
            dir: path.parent().map(Path::to_path_buf),
            filename: Some(path.to_path_buf()),
        }
    }
}

/// Reserved parser variables.
///
/// The set of entries is fixed: the `_$` file context and the imports that
/// have been resolved while parsing.
#[derive(Debug, Clone, Default)]
pub struct ParserVariables {
    file: FileContext,
    imports: BTreeMap<PathBuf, Vec<Element>>,
}

impl ParserVariables {
    pub fn new(file: FileContext) -> Self {
        Self {
            file,
            imports: BTreeMap::new(),
        }
    }

    /// The `_$` entry.
    pub fn file(&self) -> &FileContext {
        &self.file
    }

    pub fn imports(&self) -> &BTreeMap<PathBuf, Vec<Element>> {
        &self.imports
    }

    pub fn is_imported(&self, path: &Path) -> bool {
        self.imports.contains_key(path)
    }

    pub(crate) fn record_import(&mut self, path: PathBuf, elements: Vec<Element>) {
        self.imports.insert(path, elements);
    }
}

/// What a variable name resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    /// Declared in a `#vars` block of this document.
    Local(&'a Element),
    /// Declared in the project configuration's `globalvars`.
    Global(&'a serde_json::Value),
}

/// Variable declarations visible to the document.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    locals: BTreeMap<String, Element>,
    globals: BTreeMap<String, serde_json::Value>,
}

impl Scope {
    pub fn new(globals: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            locals: BTreeMap::new(),
            globals,
        }
    }

    pub(crate) fn declare(&mut self, name: &str, binding: Element) {
        self.locals.insert(name.to_string(), binding);
    }

    /// Locals shadow globals.
    pub fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        self.locals
            .get(name)
            .map(Resolved::Local)
            .or_else(|| self.globals.get(name).map(Resolved::Global))
    }

    pub fn locals(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.locals.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Where a tiny template was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Config,
}

/// A named snippet with a `${val}` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct TinyTemplate {
    pub name: String,
    /// The text the placeholder lives in. For `name element` declarations
    /// this is a synthesized `${val}`.
    pub value: Token,
    /// Element wrapping the value, with its attributes.
    pub element: Option<Element>,
    pub origin: Origin,
}

impl TinyTemplate {
    /// Number of unescaped placeholders in the value and in the element's
    /// attribute values.
    pub fn placeholder_count(&self) -> usize {
        let mut count = count_placeholders(&self.value.value);
        if let Some(attrs) = self.element.as_ref().and_then(|e| e.attrs.as_ref()) {
            count += attrs
                .kvps
                .iter()
                .flat_map(|kvp| kvp.children.iter())
                .map(|value| count_placeholders(&value.token.value))
                .sum::<usize>();
        }
        count
    }

    /// The template's text with every unescaped placeholder replaced.
    pub fn expand(&self, argument: &str) -> String {
        PLACEHOLDER
            .replace_all(&self.value.value, |caps: &regex::Captures<'_>| {
                if caps[1].is_empty() {
                    argument.to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }
}

pub fn count_placeholders(text: &str) -> usize {
    PLACEHOLDER
        .captures_iter(text)
        .filter(|caps| caps[1].is_empty())
        .count()
}
