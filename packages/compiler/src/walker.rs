use crate::code_host::{CodeHost, ReturnKind};
use crate::context::RenderContext;
use crate::error::{CompileError, CompileResult};
use crate::ir::{IrBuilder, Op};
use crate::options::UnitSharing;
use nhaml_parser::{Node, TagNode};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

const DOCTYPE: &str = "<!DOCTYPE html>";

/// Output of a complete walk: the root op sequence and its units
#[derive(Debug)]
pub struct WalkOutput {
    pub ops: Vec<Op>,
    pub host: CodeHost,
}

/// Template currently being expanded, for recursion checks
#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Main,
    Partial(PathBuf),
}

/// Walks the node tree and emits IR
///
/// Conditionals open a new IR scope for their body; `yield` and `render`
/// directives splice other trees in place.
pub struct Walker<'a> {
    context: &'a RenderContext,
    host: CodeHost,
    ir: IrBuilder,
    frames: Vec<Frame>,
}

impl<'a> Walker<'a> {
    pub fn new(context: &'a RenderContext, model_type: &str, sharing: UnitSharing) -> Self {
        Self {
            context,
            host: CodeHost::new(model_type, sharing),
            ir: IrBuilder::new(),
            frames: Vec::new(),
        }
    }

    /// Walk the context's root tree and finish the IR
    pub fn walk_view(mut self) -> CompileResult<WalkOutput> {
        let root: Arc<_> = self.context.root().clone();
        if self.context.layout().is_none() {
            self.frames.push(Frame::Main);
        }
        self.walk(&root.children)?;

        Ok(WalkOutput {
            ops: self.ir.finish()?,
            host: self.host,
        })
    }

    pub fn walk(&mut self, nodes: &[Node]) -> CompileResult<()> {
        for node in nodes {
            self.walk_node(node)?;
        }
        Ok(())
    }

    fn walk_node(&mut self, node: &Node) -> CompileResult<()> {
        match node {
            Node::Tag(tag) => self.walk_tag(tag),

            Node::TagId { children, .. }
            | Node::TagClass { children, .. }
            | Node::AttributeCollection { children, .. }
            | Node::TextContainer { children, .. } => self.walk(children),

            Node::HtmlAttribute { name, children, .. } => {
                self.ir.write(&format!(" {}=\"", name));
                self.walk(children)?;
                self.ir.write_char('"');
                Ok(())
            }

            Node::TextLiteral { content, .. } => {
                self.ir.write(content);
                Ok(())
            }

            Node::TextVariable { path: source, line } | Node::Eval { expr: source, line } => {
                let unit = self.host.register(source, ReturnKind::Text, *line);
                self.ir.expression(unit);
                Ok(())
            }

            Node::Code {
                content,
                children,
                line,
            } => self.walk_code(content.trim(), children, *line),

            Node::DocType { .. } => {
                self.ir.write(DOCTYPE);
                Ok(())
            }

            Node::Partial { directive, line } => self.walk_partial(directive.trim(), *line),
        }
    }

    fn walk_code(&mut self, content: &str, children: &[Node], line: usize) -> CompileResult<()> {
        if content.is_empty() {
            return Ok(());
        }

        if let Some(rest) = strip_keyword(content, "if") {
            let condition = extract_condition(rest, line)?;
            let unit = self.host.register(condition, ReturnKind::Boolean, line);

            self.ir.push_scope();
            self.walk(children)?;
            let then_ops = self.ir.pop_scope()?;
            self.ir.conditional(unit, then_ops);
            return Ok(());
        }

        if content == "else" {
            if !self.ir.can_attach_else() {
                return Err(CompileError::ElseWithoutIf { line });
            }
            self.ir.push_scope();
            self.walk(children)?;
            let else_ops = self.ir.pop_scope()?;
            return self
                .ir
                .attach_else(else_ops)
                .map_err(|_| CompileError::ElseWithoutIf { line });
        }

        Err(CompileError::UnsupportedCodeConstruct {
            line,
            content: content.to_string(),
        })
    }

    fn walk_partial(&mut self, directive: &str, line: usize) -> CompileResult<()> {
        if directive == "yield" {
            if self.frames.contains(&Frame::Main) {
                return Err(CompileError::RecursivePartial {
                    name: "yield".to_string(),
                });
            }
            let main = self.context.main_template().clone();
            self.frames.push(Frame::Main);
            self.walk(&main.children)?;
            self.frames.pop();
            return Ok(());
        }

        if let Some(rest) = strip_keyword(directive, "render") {
            let Some(name) = single_quoted(rest.trim()) else {
                warn!(line, directive, "render directive without a quoted name ignored");
                return Ok(());
            };

            let (path, doc) = self.context.resolve_partial(name)?;
            let frame = Frame::Partial(path.clone());
            if self.frames.contains(&frame) {
                return Err(CompileError::RecursivePartial {
                    name: path.display().to_string(),
                });
            }
            debug!(partial = %path.display(), line, "walking partial");

            self.frames.push(frame);
            self.walk(&doc.children)?;
            self.frames.pop();
            return Ok(());
        }

        debug!(line, directive, "ignoring unknown partial directive");
        Ok(())
    }

    fn walk_tag(&mut self, tag: &TagNode) -> CompileResult<()> {
        let name = tag.qualified_name();
        self.ir.write_char('<');
        self.ir.write(&name);

        let mut groups: Vec<AttributeGroup<'_>> = Vec::new();
        collect_attributes(&tag.attributes, &mut groups)?;
        for group in &groups {
            self.write_attribute(group);
        }

        if !tag.children.is_empty() {
            self.ir.write_char('>');
            self.walk(&tag.children)?;
            self.ir.write("</");
            self.ir.write(&name);
            self.ir.write_char('>');
        } else if !tag.self_closing {
            self.ir.write("/>");
        } else {
            self.ir.write_char('>');
        }
        Ok(())
    }

    /// Literal values sorted and space joined, then expression values
    fn write_attribute(&mut self, group: &AttributeGroup<'_>) {
        self.ir.write(&format!(" {}=\"", group.name));

        let mut literals: Vec<&str> = group.literals.clone();
        literals.sort_unstable();
        let leading_space = !literals.is_empty();
        self.ir.write(&escape_attribute(&literals.join(" ")));

        for (index, (source, line)) in group.expressions.iter().enumerate() {
            if index > 0 || leading_space {
                self.ir.write_char(' ');
            }
            let unit = self.host.register(source, ReturnKind::Text, *line);
            self.ir.expression(unit);
        }

        self.ir.write_char('"');
    }
}

/// Attribute fragments sharing one name, in first-appearance order
#[derive(Debug)]
struct AttributeGroup<'n> {
    name: &'n str,
    literals: Vec<&'n str>,
    expressions: Vec<(&'n str, usize)>,
}

fn collect_attributes<'n>(
    nodes: &'n [Node],
    groups: &mut Vec<AttributeGroup<'n>>,
) -> CompileResult<()> {
    for node in nodes {
        match node {
            Node::TagId { children, .. }
            | Node::TagClass { children, .. }
            | Node::AttributeCollection { children, .. } => collect_attributes(children, groups)?,

            Node::HtmlAttribute { name, children, .. } => {
                let index = match groups.iter().position(|g| g.name == name.as_str()) {
                    Some(index) => index,
                    None => {
                        groups.push(AttributeGroup {
                            name,
                            literals: Vec::new(),
                            expressions: Vec::new(),
                        });
                        groups.len() - 1
                    }
                };
                collect_values(children, &mut groups[index])?;
            }

            other => {
                return Err(CompileError::MalformedTag {
                    line: other.line(),
                    message: "Only attributes may appear in an attribute list".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn collect_values<'n>(nodes: &'n [Node], group: &mut AttributeGroup<'n>) -> CompileResult<()> {
    for node in nodes {
        match node {
            Node::TextContainer { children, .. } => collect_values(children, group)?,
            Node::TextLiteral { content, .. } => group.literals.push(content.as_str()),
            Node::Eval { expr: source, line } | Node::TextVariable { path: source, line } => {
                group.expressions.push((source.as_str(), *line))
            }
            other => {
                return Err(CompileError::MalformedTag {
                    line: other.line(),
                    message: format!("Unsupported value for attribute \"{}\"", group.name),
                });
            }
        }
    }
    Ok(())
}

/// `keyword` followed by whitespace, `(`, `'` or the end of input
fn strip_keyword<'s>(content: &'s str, keyword: &str) -> Option<&'s str> {
    let rest = content.strip_prefix(keyword)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c == '(' || c == '\'' => Some(rest),
        Some(_) => None,
    }
}

/// Condition of `if (...)`, found with a balanced, string-aware scan
fn extract_condition(rest: &str, line: usize) -> CompileResult<&str> {
    let rest = rest.trim();
    if !rest.starts_with('(') {
        return Err(CompileError::MalformedCode {
            line,
            message: "expected a parenthesized condition after `if`".to_string(),
        });
    }

    let close = matching_paren(rest).ok_or_else(|| CompileError::MalformedCode {
        line,
        message: format!("unbalanced parentheses in condition `{}`", rest),
    })?;

    // `(a) && (b)` is kept whole; a single outer group is unwrapped
    let condition = if close == rest.len() - 1 {
        &rest[1..close]
    } else {
        if !is_balanced(&rest[close + 1..]) {
            return Err(CompileError::MalformedCode {
                line,
                message: format!("unbalanced parentheses in condition `{}`", rest),
            });
        }
        rest
    };

    let condition = condition.trim();
    if condition.is_empty() {
        return Err(CompileError::MalformedCode {
            line,
            message: "empty condition".to_string(),
        });
    }
    Ok(condition)
}

/// Byte index of the `)` matching the `(` at index 0
fn matching_paren(input: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (index, c) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_balanced(input: &str) -> bool {
    let wrapped = format!("({})", input);
    matching_paren(&wrapped) == Some(wrapped.len() - 1)
}

fn single_quoted(input: &str) -> Option<&str> {
    let inner = input.strip_prefix('\'')?;
    let end = inner.find('\'')?;
    let name = inner[..end].trim();
    (!name.is_empty()).then_some(name)
}

fn escape_attribute(value: &str) -> String {
    value.replace('"', "&quot;")
}
