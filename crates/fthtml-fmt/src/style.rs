//! Formatter style options.
//!
//! Every field has a default, so a partial JSON object (or none at all)
//! deserializes into a complete style.

use serde::{Deserialize, Serialize};

/// Tags that are usually inline and too small to deserve an `// end of`
/// comment.
const INLINE_TAGS: &[&str] = &[
    "span", "li", "a", "abbr", "acronym", "audio", "b", "bdi", "bdo", "big", "br", "button",
    "canvas", "cite", "code", "data", "datalist", "del", "dfn", "em", "embed", "i", "iframe",
    "img", "input", "ins", "kbd", "label", "map", "mark", "meter", "noscript", "object", "output",
    "picture", "progress", "q", "ruby", "s", "samp", "script", "select", "slot", "small",
    "strong", "sub", "sup", "svg", "template", "textarea", "time", "u", "tr", "td", "tt", "var",
    "video", "wbr",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatStyle {
    pub braces: BraceStyle,
    pub attributes: AttributeStyle,
    #[serde(rename = "onPasteHTML")]
    pub on_paste_html: PasteStyle,
    pub collapse_single_child_elements: bool,
    pub collapse_single_child_elements_if_line_length_less_than: usize,
    pub skip_tag_names_for_collapsing: Vec<String>,
    pub align_variable_or_property_binding_values: bool,
    pub new_line_before_comments: bool,
    pub new_line_before_first_child_element: bool,
    pub new_line_after_last_child_element: bool,
    pub new_line_before_after_child_element_minimum_depth: usize,
    pub new_line_before_after_child_element_maximum_depth: usize,
}

impl Default for FormatStyle {
    fn default() -> Self {
        Self {
            braces: BraceStyle::default(),
            attributes: AttributeStyle::default(),
            on_paste_html: PasteStyle::default(),
            collapse_single_child_elements: true,
            collapse_single_child_elements_if_line_length_less_than: 80,
            skip_tag_names_for_collapsing: vec!["pre".into(), "code".into()],
            align_variable_or_property_binding_values: true,
            new_line_before_comments: true,
            new_line_before_first_child_element: true,
            new_line_after_last_child_element: true,
            new_line_before_after_child_element_minimum_depth: 1,
            new_line_before_after_child_element_maximum_depth: 1,
        }
    }
}

impl FormatStyle {
    /// Whether a block nested `depth` levels deep gets padding lines around
    /// its children.
    pub(crate) fn pads_depth(&self, depth: usize) -> bool {
        (self.new_line_before_after_child_element_minimum_depth
            ..=self.new_line_before_after_child_element_maximum_depth)
            .contains(&depth)
    }

    pub(crate) fn skips_collapsing(&self, name: &str) -> bool {
        self.skip_tag_names_for_collapsing.iter().any(|t| t == name)
    }
}

/// Where opening braces go, and the synthetic `// end of` comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BraceStyle {
    pub new_line_after_element: bool,
    pub new_line_after_embedded_langs: bool,
    pub new_line_after_attributes: bool,
    pub new_line_after_import: bool,
    pub new_line_after_variable_or_property_binding: bool,
    pub add_identifier_comment_after_closing_brace: bool,
    pub remove_braces_for_empty_parents: bool,
    pub skip_tag_names_for_comment_after_closing_brace: Vec<String>,
    pub minimum_number_of_lines_to_add_identifier_comment: usize,
}

impl Default for BraceStyle {
    fn default() -> Self {
        Self {
            new_line_after_element: true,
            new_line_after_embedded_langs: false,
            new_line_after_attributes: false,
            new_line_after_import: false,
            new_line_after_variable_or_property_binding: false,
            add_identifier_comment_after_closing_brace: true,
            remove_braces_for_empty_parents: true,
            skip_tag_names_for_comment_after_closing_brace: INLINE_TAGS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            minimum_number_of_lines_to_add_identifier_comment: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeStyle {
    pub add_space_before_attribute_parenthesis: bool,
    pub pad_attributes_with_space: bool,
    /// Either `"id, class, kvp, misc"` or `"id, class, misc, kvp"`.
    pub order: String,
    pub sorted: bool,
    pub wrap_ordered_attributes: bool,
    pub minimum_number_of_attributes_for_wrapping: usize,
}

impl Default for AttributeStyle {
    fn default() -> Self {
        Self {
            add_space_before_attribute_parenthesis: false,
            pad_attributes_with_space: false,
            order: "id, class, kvp, misc".into(),
            sorted: true,
            wrap_ordered_attributes: true,
            minimum_number_of_attributes_for_wrapping: 6,
        }
    }
}

impl AttributeStyle {
    /// Whether bare attributes are written before key/value pairs.
    pub(crate) fn misc_first(&self) -> bool {
        let order: String = self.order.chars().filter(|c| !c.is_whitespace()).collect();
        order == "id,class,misc,kvp"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasteStyle {
    pub quotation_mark: char,
}

impl Default for PasteStyle {
    fn default() -> Self {
        Self { quotation_mark: '\'' }
    }
}

/// Editor-level whitespace options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormattingOptions {
    pub tab_size: usize,
    pub insert_spaces: bool,
    pub insert_final_newline: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
            insert_final_newline: false,
        }
    }
}

impl FormattingOptions {
    /// Whitespace for `depth` levels of indentation.
    pub fn indentation(&self, depth: usize) -> String {
        if self.insert_spaces {
            " ".repeat(self.tab_size * depth)
        } else {
            "\t".repeat(depth)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let style: FormatStyle = serde_json::from_str(
            r#"{ "braces": { "newLineAfterElement": false }, "collapseSingleChildElements": false }"#,
        )
        .unwrap();
        assert!(!style.braces.new_line_after_element);
        assert!(style.braces.remove_braces_for_empty_parents);
        assert!(!style.collapse_single_child_elements);
        assert_eq!(style.attributes.minimum_number_of_attributes_for_wrapping, 6);
    }

    #[test]
    fn test_paste_quotation_mark() {
        let style: FormatStyle =
            serde_json::from_str(r#"{ "onPasteHTML": { "quotationMark": "\"" } }"#).unwrap();
        assert_eq!(style.on_paste_html.quotation_mark, '"');
        assert_eq!(FormatStyle::default().on_paste_html.quotation_mark, '\'');
    }

    #[test]
    fn test_attribute_order() {
        let mut attributes = AttributeStyle::default();
        assert!(!attributes.misc_first());
        attributes.order = "id,class, misc,kvp".into();
        assert!(attributes.misc_first());
    }

    #[test]
    fn test_depth_padding() {
        let style = FormatStyle::default();
        assert!(!style.pads_depth(0));
        assert!(style.pads_depth(1));
        assert!(!style.pads_depth(2));
    }

    #[test]
    fn test_indentation() {
        let spaces = FormattingOptions::default();
        assert_eq!(spaces.indentation(2), "        ");
        let tabs = FormattingOptions {
            insert_spaces: false,
            ..FormattingOptions::default()
        };
        assert_eq!(tabs.indentation(2), "\t\t");
    }
}
