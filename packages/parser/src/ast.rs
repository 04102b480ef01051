use serde::{Deserialize, Serialize};

/// Root of a parsed template file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Markup element (`%div`, `.class`, `#id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagNode {
    pub namespace: Option<String>,
    pub name: String,
    /// `HtmlAttribute` nodes, possibly nested in `TagId`, `TagClass` or
    /// `AttributeCollection` wrappers
    pub attributes: Vec<Node>,
    pub children: Vec<Node>,
    pub self_closing: bool,
    pub line: usize,
}

impl TagNode {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            namespace: None,
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: false,
            line,
        }
    }

    /// Name as written into the output, `ns:name` when namespaced
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

/// Template node tree
///
/// The tree is read-only once parsed. Every variant carries the 1-based
/// source line it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    Tag(TagNode),

    /// `#id` shorthand, wraps the generated `id` attribute
    TagId { children: Vec<Node>, line: usize },

    /// `.class` shorthand, wraps the generated `class` attribute
    TagClass { children: Vec<Node>, line: usize },

    /// `(...)` or `{...}` attribute collection
    AttributeCollection { children: Vec<Node>, line: usize },

    /// Single attribute; value children are `TextLiteral` or `Eval` nodes
    HtmlAttribute {
        name: String,
        children: Vec<Node>,
        line: usize,
    },

    /// Line of plain text, split into literal and interpolated parts
    TextContainer { children: Vec<Node>, line: usize },

    TextLiteral { content: String, line: usize },

    /// `#{...}` interpolation
    TextVariable { path: String, line: usize },

    /// `= expr`
    Eval { expr: String, line: usize },

    /// `- code`, with the nested block as children
    Code {
        content: String,
        children: Vec<Node>,
        line: usize,
    },

    /// `!!!`
    DocType { line: usize },

    /// `_ yield` or `_ render 'name'`
    Partial { directive: String, line: usize },
}

impl Node {
    pub fn line(&self) -> usize {
        match self {
            Node::Tag(tag) => tag.line,
            Node::TagId { line, .. }
            | Node::TagClass { line, .. }
            | Node::AttributeCollection { line, .. }
            | Node::HtmlAttribute { line, .. }
            | Node::TextContainer { line, .. }
            | Node::TextLiteral { line, .. }
            | Node::TextVariable { line, .. }
            | Node::Eval { line, .. }
            | Node::Code { line, .. }
            | Node::DocType { line }
            | Node::Partial { line, .. } => *line,
        }
    }

    pub fn text(content: impl Into<String>, line: usize) -> Self {
        Node::TextLiteral {
            content: content.into(),
            line,
        }
    }

    pub fn eval(expr: impl Into<String>, line: usize) -> Self {
        Node::Eval {
            expr: expr.into(),
            line,
        }
    }

    pub fn attribute(name: impl Into<String>, value: Node) -> Self {
        let line = value.line();
        Node::HtmlAttribute {
            name: name.into(),
            children: vec![value],
            line,
        }
    }
}
