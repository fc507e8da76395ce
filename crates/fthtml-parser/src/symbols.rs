//! Document outline.

use serde::Serialize;

use crate::cst::{Element, NodeKind, SymbolKind};

/// One entry of the outline, with its nested entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub children: Vec<DocumentSymbol>,
}

/// Project a parsed document onto an outline.
///
/// Elements without a symbol kind are transparent: their descendants are
/// lifted into the enclosing level. With `include_tag_names`, tags that carry
/// an id or class appear as `tag#id` / `tag.class` entries.
pub fn document_symbols(elements: &[Element], include_tag_names: bool) -> Vec<DocumentSymbol> {
    let mut symbols = Vec::new();
    for element in elements {
        collect(element, include_tag_names, &mut symbols);
    }
    symbols
}

fn collect(element: &Element, include_tag_names: bool, out: &mut Vec<DocumentSymbol>) {
    if matches!(element.kind, NodeKind::Text | NodeKind::Comment) {
        return;
    }

    let children = child_elements(element)
        .flat_map(|child| {
            let mut nested = Vec::new();
            collect(child, include_tag_names, &mut nested);
            nested
        })
        .collect();

    let (name, kind) = match element.symbol_kind {
        SymbolKind::Null => match element.selector() {
            Some(selector) if include_tag_names && element.kind == NodeKind::Tag => {
                (selector, SymbolKind::Struct)
            }
            _ => {
                out.extend(children);
                return;
            }
        },
        kind => (symbol_name(element), kind),
    };

    out.push(DocumentSymbol {
        name,
        kind,
        line: element.first_line(),
        column: element.token.position.column,
        end_line: element.last_line(),
        children,
    });
}

/// Children plus attribute values, which may hold references and macros.
fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    let attrs = element.attrs.iter().flat_map(|attrs| {
        attrs
            .classes
            .iter()
            .chain(attrs.kvps.iter().flat_map(|kvp| kvp.children.iter()))
            .chain(attrs.misc.iter())
    });
    attrs.chain(element.children.iter())
}

fn symbol_name(element: &Element) -> String {
    match element.kind {
        NodeKind::Keyword => match element.children.first() {
            Some(target) => format!("{} \"{}\"", element.name(), target.name()),
            None => element.name().to_string(),
        },
        NodeKind::Reference => format!("@{}", element.name()),
        NodeKind::Pragma => element.token.source_text(),
        _ => element.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::Parser;

    fn outline(source: &str, include_tag_names: bool) -> Vec<DocumentSymbol> {
        document_symbols(&Parser::parse_source(source).unwrap(), include_tag_names)
    }

    fn names(symbols: &[DocumentSymbol]) -> Vec<&str> {
        symbols.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_plain_tags_are_transparent() {
        let symbols = outline("div {\n  p @title\n  span len(@x)\n}", false);
        assert_eq!(names(&symbols), vec!["@title", "len"]);
        assert_eq!(symbols[0].kind, SymbolKind::Variable);
        assert_eq!(symbols[1].kind, SymbolKind::Function);
        assert_eq!(names(&symbols[1].children), vec!["@x"]);
    }

    #[test]
    fn test_vars_and_import() {
        let symbols = outline(
            "#vars\n  title \"Home\"\n  year __DATE__\n#end\nimport \"header\" {\n  title @title\n}",
            false,
        );
        assert_eq!(names(&symbols), vec!["#vars", "import \"header\""]);
        assert_eq!(symbols[0].kind, SymbolKind::Struct);
        assert_eq!(symbols[0].end_line, 4);
        assert_eq!(names(&symbols[0].children), vec!["title", "year"]);
        assert_eq!(symbols[0].children[1].children[0].kind, SymbolKind::Constant);
        assert_eq!(symbols[1].kind, SymbolKind::Method);
        assert_eq!(names(&symbols[1].children), vec!["title"]);
    }

    #[test]
    fn test_tag_names_when_requested() {
        let source = "main(#app) {\n  section(.intro) { p @x }\n  div { p }\n}";
        assert_eq!(names(&outline(source, false)), vec!["@x"]);

        let symbols = outline(source, true);
        assert_eq!(names(&symbols), vec!["main#app"]);
        assert_eq!(symbols[0].kind, SymbolKind::Struct);
        assert_eq!(names(&symbols[0].children), vec!["section.intro"]);
        assert_eq!(names(&symbols[0].children[0].children), vec!["@x"]);
    }

    #[test]
    fn test_attribute_references() {
        let symbols = outline("a(href=@url .@theme)", false);
        assert_eq!(names(&symbols), vec!["@theme", "@url"]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let symbols = outline("p @x", false);
        let json = serde_json::to_value(&symbols).unwrap();
        assert_eq!(json[0]["endLine"], 1);
        assert_eq!(json[0]["kind"], "Variable");
    }
}
