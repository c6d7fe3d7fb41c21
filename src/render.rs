//! Rendered output of the sandbox.
//!
//! Evaluation produces a plain tree of elements, text and editable fields.
//! The tree serializes for the Node bridge and renders itself to HTML for
//! direct display.

use serde::Serialize;

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER TREE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RenderNode {
    Element(ElementNode),
    Text(TextNode),
    Editable(EditableNode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<RenderAttribute>,
    pub children: Vec<RenderNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextNode {
    pub value: String,
}

/// A field rendered by the editable-text primitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableNode {
    pub tag: String,
    pub value: String,
    /// Key the edit is written to, when the binding could be resolved.
    pub binding: Option<String>,
    pub multiline: bool,
    pub placeholder: Option<String>,
    pub attributes: Vec<RenderAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderAttribute {
    pub name: String,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum AttributeValue {
    Text(String),
    Flag(bool),
    /// Inline style as CSS declaration text.
    Style(String),
    /// Event handler; `binding` is the key it forwards its input to.
    Handler { binding: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedTree {
    pub nodes: Vec<RenderNode>,
}

impl RenderedTree {
    pub fn new(nodes: Vec<RenderNode>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            write_node(node, &mut out);
        }
        out
    }

    /// Concatenated text content, the way `textContent` reads it.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            collect_text(node, &mut out);
        }
        out
    }

    /// Every editable field, in document order.
    pub fn editables(&self) -> Vec<&EditableNode> {
        let mut found = Vec::new();
        for node in &self.nodes {
            collect_editables(node, &mut found);
        }
        found
    }

    /// Keys that some rendered control writes to, in document order.
    pub fn edit_bindings(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for node in &self.nodes {
            collect_bindings(node, &mut keys);
        }
        keys
    }
}

fn collect_text(node: &RenderNode, out: &mut String) {
    match node {
        RenderNode::Text(t) => out.push_str(&t.value),
        RenderNode::Editable(e) => out.push_str(&e.value),
        RenderNode::Element(el) => {
            for child in &el.children {
                collect_text(child, out);
            }
        }
    }
}

fn collect_editables<'t>(node: &'t RenderNode, found: &mut Vec<&'t EditableNode>) {
    match node {
        RenderNode::Editable(e) => found.push(e),
        RenderNode::Element(el) => {
            for child in &el.children {
                collect_editables(child, found);
            }
        }
        RenderNode::Text(_) => {}
    }
}

fn collect_bindings(node: &RenderNode, keys: &mut Vec<String>) {
    let mut push = |attrs: &[RenderAttribute]| {
        for attr in attrs {
            if let AttributeValue::Handler {
                binding: Some(key),
            } = &attr.value
            {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
    };
    match node {
        RenderNode::Editable(e) => {
            if let Some(key) = &e.binding {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        RenderNode::Element(el) => {
            push(&el.attributes);
            for child in &el.children {
                collect_bindings(child, keys);
            }
        }
        RenderNode::Text(_) => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn html_attribute_name(name: &str) -> &str {
    match name {
        "className" => "class",
        "htmlFor" => "for",
        _ => name,
    }
}

fn write_attributes(attributes: &[RenderAttribute], out: &mut String) {
    for attr in attributes {
        let name = html_attribute_name(&attr.name);
        match &attr.value {
            AttributeValue::Text(v) | AttributeValue::Style(v) => {
                out.push_str(&format!(" {}=\"{}\"", name, escape_html(v)));
            }
            AttributeValue::Flag(true) => {
                out.push(' ');
                out.push_str(name);
            }
            AttributeValue::Flag(false) | AttributeValue::Handler { .. } => {}
        }
    }
}

fn write_node(node: &RenderNode, out: &mut String) {
    match node {
        RenderNode::Text(t) => out.push_str(&escape_html(&t.value)),
        RenderNode::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            write_attributes(&el.attributes, out);
            if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                out.push_str(" />");
                return;
            }
            out.push('>');
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str(&format!("</{}>", el.tag));
        }
        RenderNode::Editable(e) => {
            out.push('<');
            out.push_str(&e.tag);
            if let Some(key) = &e.binding {
                out.push_str(&format!(" data-field=\"{}\"", escape_html(key)));
            }
            out.push_str(" contenteditable=\"true\"");
            if let Some(placeholder) = &e.placeholder {
                out.push_str(&format!(" data-placeholder=\"{}\"", escape_html(placeholder)));
            }
            write_attributes(&e.attributes, out);
            out.push('>');
            out.push_str(&escape_html(&e.value));
            out.push_str(&format!("</{}>", e.tag));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STYLE OBJECTS
// ═══════════════════════════════════════════════════════════════════════════════

const UNITLESS_PROPERTIES: &[&str] = &[
    "opacity",
    "zIndex",
    "fontWeight",
    "lineHeight",
    "flex",
    "flexGrow",
    "flexShrink",
    "order",
    "zoom",
    "orphans",
    "widows",
    "columnCount",
    "gridRow",
    "gridColumn",
];

/// `fontSize` -> `font-size`, `WebkitTransform` -> `-webkit-transform`.
pub fn css_property_name(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 || name.starts_with("Webkit") || name.starts_with("Moz") {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Numeric style values get `px` unless the property is unitless.
pub fn css_number_value(property: &str, value: f64, formatted: &str) -> String {
    if value == 0.0 || UNITLESS_PROPERTIES.contains(&property) {
        formatted.to_string()
    } else {
        format!("{}px", formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(v: &str) -> RenderNode {
        RenderNode::Text(TextNode {
            value: v.to_string(),
        })
    }

    #[test]
    fn test_html_output() {
        let tree = RenderedTree::new(vec![RenderNode::Element(ElementNode {
            tag: "div".to_string(),
            attributes: vec![
                RenderAttribute {
                    name: "className".to_string(),
                    value: AttributeValue::Text("card".to_string()),
                },
                RenderAttribute {
                    name: "onClick".to_string(),
                    value: AttributeValue::Handler { binding: None },
                },
            ],
            children: vec![
                text("a < b"),
                RenderNode::Element(ElementNode {
                    tag: "br".to_string(),
                    attributes: vec![],
                    children: vec![],
                }),
            ],
        })]);
        assert_eq!(tree.to_html(), r#"<div class="card">a &lt; b<br /></div>"#);
        assert_eq!(tree.text_content(), "a < b");
    }

    #[test]
    fn test_editable_html_and_bindings() {
        let tree = RenderedTree::new(vec![RenderNode::Editable(EditableNode {
            tag: "h1".to_string(),
            value: "Paris".to_string(),
            binding: Some("city".to_string()),
            multiline: false,
            placeholder: None,
            attributes: vec![],
        })]);
        assert_eq!(
            tree.to_html(),
            r#"<h1 data-field="city" contenteditable="true">Paris</h1>"#
        );
        assert_eq!(tree.edit_bindings(), vec!["city".to_string()]);
        assert_eq!(tree.editables().len(), 1);
    }

    #[test]
    fn test_css_names() {
        assert_eq!(css_property_name("fontSize"), "font-size");
        assert_eq!(css_property_name("WebkitTransform"), "-webkit-transform");
        assert_eq!(css_property_name("--accent"), "--accent");
        assert_eq!(css_number_value("fontSize", 12.0, "12"), "12px");
        assert_eq!(css_number_value("opacity", 0.5, "0.5"), "0.5");
        assert_eq!(css_number_value("margin", 0.0, "0"), "0");
    }

    #[test]
    fn test_serializes_with_type_tags() {
        let json = serde_json::to_value(RenderedTree::new(vec![text("hi")])).unwrap();
        assert_eq!(json["nodes"][0]["type"], "text");
        assert_eq!(json["nodes"][0]["value"], "hi");
    }
}
