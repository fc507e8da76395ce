//! Pretty-printer for the ftHTML syntax tree.
//!
//! Each print routine takes what it needs about its surroundings as
//! arguments and returns its text together with an [`Anchor`] describing
//! where it ended in the source. The next sibling uses that anchor to decide
//! blank lines and whether a trailing comment belongs on the same line.

use fthtml_parser::{AttributeSet, Element, NodeKind};

use crate::style::{FormatStyle, FormattingOptions};

/// The structural context a block of elements is printed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Root,
    Word,
    Vars,
    TinyTemplates,
    Import,
    Ifdef,
}

impl Mode {
    fn allows_collapsing(self) -> bool {
        matches!(self, Mode::Root | Mode::Word)
    }

    fn aligns_bindings(self) -> bool {
        matches!(self, Mode::Vars | Mode::TinyTemplates | Mode::Import)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnchorKind {
    Start,
    OpenBrace,
    CloseBrace,
    Other,
}

/// Where the previously printed sibling ended in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    line: usize,
    kind: AnchorKind,
}

impl Anchor {
    const START: Anchor = Anchor {
        line: 0,
        kind: AnchorKind::Start,
    };

    fn after(element: &Element) -> Self {
        Anchor {
            line: element.last_line(),
            kind: AnchorKind::Other,
        }
    }
}

/// Per-sibling layout inputs.
struct Context<'e> {
    depth: usize,
    spacing: &'e str,
    mode: Mode,
    /// Width binding names are padded to.
    name_width: usize,
    next: Option<&'e Element>,
}

/// Attribute texts grouped the way they are laid out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AttributeParts {
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub kvps: Vec<String>,
    pub misc: Vec<String>,
}

impl AttributeParts {
    fn len(&self) -> usize {
        usize::from(self.id.is_some()) + self.classes.len() + self.kvps.len() + self.misc.len()
    }

    pub fn sort(&mut self) {
        self.classes.sort();
        self.kvps.sort();
        self.misc.sort();
    }
}

pub struct Printer<'a> {
    style: &'a FormatStyle,
    options: &'a FormattingOptions,
}

impl<'a> Printer<'a> {
    pub fn new(style: &'a FormatStyle, options: &'a FormattingOptions) -> Self {
        Self { style, options }
    }

    pub(crate) fn style(&self) -> &FormatStyle {
        self.style
    }

    /// Print a whole document.
    pub fn print(&self, elements: &[Element]) -> String {
        let (text, _) = self.block(elements, 0, Mode::Root, Anchor::START);
        let mut out = text.trim().to_string();
        if self.options.insert_final_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    fn block(
        &self,
        elements: &[Element],
        depth: usize,
        mode: Mode,
        mut prev: Anchor,
    ) -> (String, Anchor) {
        let spacing = self.options.indentation(depth);
        let name_width = self.binding_name_width(elements, mode);
        let padded = self.style.pads_depth(depth);
        let mut out = String::new();

        for (i, element) in elements.iter().enumerate() {
            if element.is_comment() {
                out.push_str(&self.comment(element, &spacing, prev));
                prev = Anchor::after(element);
                continue;
            }

            let mut newlines = 1;
            if element.first_line().saturating_sub(prev.line) > 1 {
                newlines += 1;
            }
            if i == 0 && padded && self.style.new_line_before_first_child_element {
                newlines += 1;
            }
            out.push_str(&"\n".repeat(newlines.min(2)));

            let ctx = Context {
                depth,
                spacing: &spacing,
                mode,
                name_width,
                next: elements.get(i + 1),
            };
            let (text, anchor) = self.element(element, &ctx);
            out.push_str(&text);
            prev = anchor;
        }

        if !elements.is_empty() && padded && self.style.new_line_after_last_child_element {
            out.push('\n');
        }
        (out, prev)
    }

    fn binding_name_width(&self, elements: &[Element], mode: Mode) -> usize {
        if !mode.aligns_bindings() || !self.style.align_variable_or_property_binding_values {
            return 0;
        }
        elements
            .iter()
            .filter(|e| e.kind == NodeKind::Binding && has_value(e))
            .map(|e| e.name().chars().count())
            .max()
            .unwrap_or(0)
    }

    fn comment(&self, element: &Element, spacing: &str, prev: Anchor) -> String {
        let text = element.token.value.trim_end();
        if element.is_line_comment()
            && prev.kind != AnchorKind::Start
            && prev.line == element.first_line()
        {
            return format!(" {text}");
        }

        let gap = element.first_line().saturating_sub(prev.line) > 1;
        let after_block = self.style.new_line_before_comments && prev.kind == AnchorKind::CloseBrace;
        let newlines = if gap || after_block { 2 } else { 1 };

        let body: Vec<String> = text
            .lines()
            .map(|line| format!("{spacing}{}", line.trim()))
            .collect();
        format!("{}{}", "\n".repeat(newlines), body.join("\n"))
    }

    // =========================================================================
    // Elements
    // =========================================================================

    fn element(&self, element: &Element, ctx: &Context<'_>) -> (String, Anchor) {
        match element.kind {
            NodeKind::Tag => self.tag(element, ctx),
            NodeKind::TinyTemplate => self.tiny_template(element, ctx),
            NodeKind::Binding => self.binding(element, ctx),
            NodeKind::Keyword => self.keyword(element, ctx),
            NodeKind::Elang => self.elang(element, ctx),
            NodeKind::Pragma => self.pragma(element, ctx),
            _ => (
                format!("{}{}", ctx.spacing, self.inline(element)),
                Anchor::after(element),
            ),
        }
    }

    fn tag(&self, element: &Element, ctx: &Context<'_>) -> (String, Anchor) {
        let mut out = format!("{}{}", ctx.spacing, element.name());
        out.push_str(&self.attributes(element, Some(ctx.spacing)));

        if element.is_parent_element() {
            if let Some(collapsed) = self.collapsed(element, &out, ctx) {
                out.push_str(&collapsed);
                return (out, Anchor::after(element));
            }
            if element.children.is_empty() && self.style.braces.remove_braces_for_empty_parents {
                return (out, Anchor::after(element));
            }
            let open = self.tag_brace(element.attrs.is_some(), ctx.spacing);
            return self.braced(element, out, &open, &element.children, ctx, Mode::Word);
        }

        if let Some(value) = element.children.first() {
            out.push(' ');
            out.push_str(&self.inline(value));
        }
        (out, Anchor::after(element))
    }

    /// `{ child }` on the tag's own line, when the rules allow it.
    fn collapsed(&self, element: &Element, head: &str, ctx: &Context<'_>) -> Option<String> {
        let style = self.style;
        if !style.collapse_single_child_elements
            || !ctx.mode.allows_collapsing()
            || style.skips_collapsing(element.name())
        {
            return None;
        }

        let [child] = element.children.as_slice() else {
            return None;
        };
        if child.is_parent_element()
            || child.is_comment()
            || child.children.len() > 1
            || style.skips_collapsing(child.name())
            || child
                .children
                .first()
                .is_some_and(|grandchild| style.skips_collapsing(grandchild.name()))
        {
            return None;
        }
        if !matches!(
            child.kind,
            NodeKind::Tag
                | NodeKind::Text
                | NodeKind::Reference
                | NodeKind::Call
                | NodeKind::Macro
                | NodeKind::TinyTemplate
        ) {
            return None;
        }

        let text = format!(" {{ {} }}", self.inline(child));
        if head.contains('\n') {
            return None;
        }
        let width = head.chars().count() + text.chars().count();
        (width < style.collapse_single_child_elements_if_line_length_less_than).then_some(text)
    }

    fn tiny_template(&self, element: &Element, ctx: &Context<'_>) -> (String, Anchor) {
        let mut out = format!("{}{}", ctx.spacing, element.name());

        if element.is_parent_element() {
            if element.children.is_empty() && self.style.braces.remove_braces_for_empty_parents {
                return (out, Anchor::after(element));
            }
            let open = self.tag_brace(false, ctx.spacing);
            return self.braced(element, out, &open, &element.children, ctx, Mode::Import);
        }

        if let Some(value) = element.children.first() {
            out.push(' ');
            out.push_str(&self.inline(value));
        }
        (out, Anchor::after(element))
    }

    fn binding(&self, element: &Element, ctx: &Context<'_>) -> (String, Anchor) {
        let out = format!("{}{}", ctx.spacing, element.name());
        let pad = " ".repeat(ctx.name_width.saturating_sub(element.name().chars().count()));

        if element.is_parent_element() {
            let open = if self.style.braces.new_line_after_variable_or_property_binding {
                format!("\n{}{{", ctx.spacing)
            } else {
                format!(" {pad}{{")
            };
            return self.braced(element, out, &open, &element.children, ctx, Mode::Word);
        }

        match element.children.first() {
            Some(value) => (
                format!("{out} {pad}{}", self.inline(value)),
                Anchor::after(element),
            ),
            None => (out, Anchor::after(element)),
        }
    }

    fn keyword(&self, element: &Element, ctx: &Context<'_>) -> (String, Anchor) {
        let Some((target, properties)) = element.children.split_first() else {
            return (
                format!("{}{}", ctx.spacing, element.name()),
                Anchor::after(element),
            );
        };
        let out = format!("{}{} {}", ctx.spacing, element.name(), self.inline(target));

        if !element.is_parent_element()
            || (properties.is_empty() && self.style.braces.remove_braces_for_empty_parents)
        {
            return (out, Anchor::after(element));
        }

        let open = if self.style.braces.new_line_after_import {
            format!("\n{}{{", ctx.spacing)
        } else {
            " {".to_string()
        };
        self.braced(element, out, &open, properties, ctx, Mode::Import)
    }

    fn elang(&self, element: &Element, ctx: &Context<'_>) -> (String, Anchor) {
        let spacing = ctx.spacing;
        let open = if self.style.braces.new_line_after_embedded_langs {
            format!("\n{spacing}{{")
        } else {
            " {".to_string()
        };
        let body = element
            .children
            .first()
            .map(|b| b.token.value.trim())
            .unwrap_or_default();

        let mut out = format!("{spacing}{}{open}", element.name());
        if body.is_empty() {
            out.push_str(&format!("\n{spacing}}}"));
        } else {
            let inner = self.options.indentation(ctx.depth + 1);
            out.push_str(&format!("\n\n{inner}{body}\n\n{spacing}}}"));
        }

        let anchor = Anchor {
            line: element.last_line(),
            kind: AnchorKind::CloseBrace,
        };
        (out, anchor)
    }

    /// Print `open`, the children and the closing brace after `out`.
    fn braced(
        &self,
        element: &Element,
        mut out: String,
        open: &str,
        children: &[Element],
        ctx: &Context<'_>,
        mode: Mode,
    ) -> (String, Anchor) {
        let Some(braces) = element.braces else {
            return (out, Anchor::after(element));
        };
        let close = Anchor {
            line: braces.close.line,
            kind: AnchorKind::CloseBrace,
        };

        out.push_str(open);
        if children.is_empty() {
            out.push('}');
            return (out, close);
        }

        let open_anchor = Anchor {
            line: braces.open.line,
            kind: AnchorKind::OpenBrace,
        };
        let (body, _) = self.block(children, ctx.depth + 1, mode, open_anchor);
        out.push_str(&body);
        out.push('\n');
        out.push_str(ctx.spacing);
        out.push('}');

        if self.wants_end_comment(element, &out, ctx) {
            out.push_str(" // end of ");
            out.push_str(&self.end_selector(element));
        }
        (out, close)
    }

    /// Brace opener for a tag-like element.
    pub(crate) fn tag_brace(&self, has_attributes: bool, spacing: &str) -> String {
        let braces = &self.style.braces;
        let own_line = if has_attributes {
            braces.new_line_after_attributes
        } else {
            braces.new_line_after_element
        };
        if own_line {
            format!("\n{spacing}{{")
        } else {
            " {".to_string()
        }
    }

    /// Decided on the printed height of the block, not on how many lines it
    /// spanned in the source. A block written on one line that prints tall
    /// gets the comment, so reformatting never flips the decision.
    fn wants_end_comment(&self, element: &Element, printed: &str, ctx: &Context<'_>) -> bool {
        let braces = &self.style.braces;
        if !braces.add_identifier_comment_after_closing_brace
            || braces
                .skip_tag_names_for_comment_after_closing_brace
                .iter()
                .any(|t| t == element.name())
        {
            return false;
        }

        let height = printed.matches('\n').count();
        if height < braces.minimum_number_of_lines_to_add_identifier_comment {
            return false;
        }

        !ctx.next.is_some_and(|next| {
            next.is_line_comment() && next.first_line() == element.last_line()
        })
    }

    /// `tag#id`, `tag.class`, `tag key=value` or `tag misc`.
    fn end_selector(&self, element: &Element) -> String {
        let name = element.name();
        let Some(attrs) = &element.attrs else {
            return name.to_string();
        };
        let parts = self.sorted_parts(attrs);
        if let Some(id) = parts.id {
            return format!("{name}{id}");
        }
        if let Some(class) = parts.classes.first() {
            return format!("{name}{class}");
        }
        match parts.kvps.first().or(parts.misc.first()) {
            Some(attr) => format!("{name} {attr}"),
            None => name.to_string(),
        }
    }

    // =========================================================================
    // Pragmas
    // =========================================================================

    fn pragma(&self, element: &Element, ctx: &Context<'_>) -> (String, Anchor) {
        let spacing = ctx.spacing;
        match element.name() {
            "vars" => {
                let head = format!("{spacing}#vars");
                self.pragma_block(element, &element.children, head, ctx, Mode::Vars)
            }
            name @ ("templates" | "tinytemplates") => {
                let head = format!("{spacing}#{name}");
                self.pragma_block(element, &element.children, head, ctx, Mode::TinyTemplates)
            }
            "ifdef" => match element.children.split_first() {
                Some((name, body)) => {
                    let head = format!("{spacing}#ifdef {}", name.name());
                    self.pragma_block(element, body, head, ctx, Mode::Ifdef)
                }
                None => (format!("{spacing}#ifdef"), Anchor::after(element)),
            },
            "debug" => {
                let value = element
                    .children
                    .first()
                    .map(|v| format!(" {}", self.inline(v)))
                    .unwrap_or_default();
                (format!("{spacing}#debug{value}"), Anchor::after(element))
            }
            "if" => self.conditional(element, ctx),
            _ => (
                format!("{spacing}{}", element.token.source_text()),
                Anchor::after(element),
            ),
        }
    }

    fn pragma_block(
        &self,
        element: &Element,
        children: &[Element],
        head: String,
        ctx: &Context<'_>,
        mode: Mode,
    ) -> (String, Anchor) {
        let start = Anchor {
            line: element.first_line(),
            kind: AnchorKind::Other,
        };
        let (body, _) = self.block(children, ctx.depth + 1, mode, start);
        (
            format!("{head}{body}\n{}#end", ctx.spacing),
            Anchor::after(element),
        )
    }

    /// `#if` with its `#elif` / `#else` branches.
    fn conditional(&self, element: &Element, ctx: &Context<'_>) -> (String, Anchor) {
        let mut out = String::new();

        for (i, branch) in element.children.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(ctx.spacing);
            out.push('#');
            out.push_str(branch.name());

            if branch.name() != "else" {
                if let [lhs, op, rhs, ..] = branch.children.as_slice() {
                    out.push_str(&format!(
                        " {} {} {}",
                        self.inline(lhs),
                        op.name(),
                        self.inline(rhs)
                    ));
                }
            }

            let start = Anchor {
                line: branch.first_line(),
                kind: AnchorKind::Other,
            };
            let (body, _) = self.block(branch.branch_body(), ctx.depth + 1, ctx.mode, start);
            out.push_str(&body);
        }

        out.push('\n');
        out.push_str(ctx.spacing);
        out.push_str("#end");
        (out, Anchor::after(element))
    }

    // =========================================================================
    // Inline values and attributes
    // =========================================================================

    /// An element on a single line, as it appears after a tag or binding name.
    fn inline(&self, element: &Element) -> String {
        match element.kind {
            NodeKind::Call => {
                let args: Vec<String> = element.children.iter().map(|a| self.inline(a)).collect();
                format!("{}({})", element.name(), args.join(" "))
            }
            NodeKind::Tag | NodeKind::TinyTemplate => {
                let mut out = element.name().to_string();
                out.push_str(&self.attributes(element, None));
                if let Some(value) = element.children.first() {
                    out.push(' ');
                    out.push_str(&self.inline(value));
                }
                out
            }
            _ => element.token.source_text(),
        }
    }

    /// The parenthesized attribute list. Without `wrap_spacing` the list is
    /// never wrapped.
    fn attributes(&self, element: &Element, wrap_spacing: Option<&str>) -> String {
        match &element.attrs {
            Some(attrs) => {
                self.layout_attributes(element.name(), self.sorted_parts(attrs), wrap_spacing)
            }
            None => String::new(),
        }
    }

    fn sorted_parts(&self, attrs: &AttributeSet) -> AttributeParts {
        let mut parts = AttributeParts {
            id: attrs.id.as_ref().map(|id| format!("#{}", id.name())),
            classes: attrs.classes.iter().map(|c| c.token.source_text()).collect(),
            kvps: attrs
                .kvps
                .iter()
                .map(|kvp| {
                    let value = kvp.children.first().map(|v| self.inline(v)).unwrap_or_default();
                    format!("{}={value}", kvp.name())
                })
                .collect(),
            misc: attrs.misc.iter().map(|m| m.token.source_text()).collect(),
        };
        if self.style.attributes.sorted {
            parts.sort();
        }
        parts
    }

    /// Lay out attribute groups: the id, then classes, then key/value pairs
    /// and bare attributes in the configured order. Once there are enough
    /// attributes each group goes on its own line, aligned past the `(`.
    pub(crate) fn layout_attributes(
        &self,
        name: &str,
        parts: AttributeParts,
        wrap_spacing: Option<&str>,
    ) -> String {
        let style = &self.style.attributes;
        let count = parts.len();

        let mut groups: Vec<String> = parts.id.into_iter().collect();
        if !parts.classes.is_empty() {
            groups.push(parts.classes.join(" "));
        }
        let (kvps, misc) = (parts.kvps.join(" "), parts.misc.join(" "));
        let tail = if style.misc_first() {
            [misc, kvps]
        } else {
            [kvps, misc]
        };
        groups.extend(tail.into_iter().filter(|g| !g.is_empty()));

        let space = if style.add_space_before_attribute_parenthesis { " " } else { "" };
        let pad = if style.pad_attributes_with_space { " " } else { "" };

        let separator = match wrap_spacing {
            Some(spacing)
                if style.wrap_ordered_attributes
                    && count >= style.minimum_number_of_attributes_for_wrapping =>
            {
                let offset = name.chars().count() + 1 + space.len() + pad.len();
                format!("\n{spacing}{}", " ".repeat(offset))
            }
            _ => " ".to_string(),
        };

        format!("{space}({pad}{}{pad})", groups.join(&separator))
    }
}

fn has_value(element: &Element) -> bool {
    element.is_parent_element() || !element.children.is_empty()
}
