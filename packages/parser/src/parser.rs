use crate::ast::*;
use crate::error::{ParseError, ParseResult};

/// A non-blank source line with its indentation measured
#[derive(Debug, Clone, Copy)]
struct Line<'src> {
    number: usize,
    indent: usize,
    content: &'src str,
}

/// Parser for NHaml templates
///
/// Templates are line oriented: a line's children are the lines directly
/// below it at a deeper indent.
pub struct Parser<'src> {
    lines: Vec<Line<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        let mut lines = Vec::new();

        for (index, raw) in source.lines().enumerate() {
            let number = index + 1;
            let content = raw.trim_end();
            if content.trim_start().is_empty() {
                continue;
            }

            let body = content.trim_start();
            let prefix = &content[..content.len() - body.len()];
            if prefix.contains(' ') && prefix.contains('\t') {
                return Err(ParseError::malformed_tag(
                    number,
                    "Indentation mixes tabs and spaces",
                ));
            }

            lines.push(Line {
                number,
                indent: prefix.chars().count(),
                content: body,
            });
        }

        Ok(Self { lines, pos: 0 })
    }

    /// Parse a complete document
    pub fn parse_document(&mut self) -> ParseResult<Document> {
        let children = self.parse_block(None)?;
        Ok(Document::new(children))
    }

    /// Parse sibling lines deeper than `parent_indent`
    fn parse_block(&mut self, parent_indent: Option<usize>) -> ParseResult<Vec<Node>> {
        let mut nodes = Vec::new();
        let mut block_indent: Option<usize> = None;

        while let Some(line) = self.peek() {
            if let Some(parent) = parent_indent {
                if line.indent <= parent {
                    break;
                }
            }

            match block_indent {
                None => block_indent = Some(line.indent),
                Some(expected) if line.indent != expected => {
                    return Err(ParseError::malformed_tag(
                        line.number,
                        format!(
                            "Inconsistent indentation: expected {} but found {}",
                            expected, line.indent
                        ),
                    ));
                }
                Some(_) => {}
            }

            self.advance();
            if let Some(node) = self.parse_line(line)? {
                nodes.push(node);
            }
        }

        Ok(nodes)
    }

    fn parse_line(&mut self, line: Line<'src>) -> ParseResult<Option<Node>> {
        let content = line.content;

        if content.starts_with("!!!") {
            self.expect_no_children(line, "Doctype")?;
            return Ok(Some(Node::DocType { line: line.number }));
        }

        if content.starts_with("-#") || content.starts_with('/') {
            self.skip_nested(line);
            return Ok(None);
        }

        if let Some(code) = content.strip_prefix('-') {
            let children = self.parse_block(Some(line.indent))?;
            return Ok(Some(Node::Code {
                content: code.trim().to_string(),
                children,
                line: line.number,
            }));
        }

        if let Some(expr) = content.strip_prefix('=') {
            self.expect_no_children(line, "Evaluated line")?;
            return Ok(Some(eval_node(expr, line.number)?));
        }

        if content == "_" || content.starts_with("_ ") || content.starts_with("_\t") {
            self.expect_no_children(line, "Partial")?;
            return Ok(Some(Node::Partial {
                directive: content[1..].trim().to_string(),
                line: line.number,
            }));
        }

        if let Some(escaped) = content.strip_prefix('\\') {
            self.expect_no_children(line, "Text")?;
            return Ok(Some(text_container(escaped, line.number)?));
        }

        if starts_tag(content) {
            let mut tag = parse_tag(content, line.number)?;
            let nested = self.parse_block(Some(line.indent))?;
            if !nested.is_empty() {
                if tag.self_closing {
                    return Err(ParseError::malformed_tag(
                        line.number,
                        "Self-closing tag cannot have nested content",
                    ));
                }
                tag.children.extend(nested);
            }
            return Ok(Some(Node::Tag(tag)));
        }

        self.expect_no_children(line, "Text")?;
        Ok(Some(text_container(content, line.number)?))
    }

    fn expect_no_children(&self, line: Line<'src>, what: &str) -> ParseResult<()> {
        match self.peek() {
            Some(next) if next.indent > line.indent => Err(ParseError::malformed_tag(
                next.number,
                format!("{} on line {} cannot have nested content", what, line.number),
            )),
            _ => Ok(()),
        }
    }

    fn skip_nested(&mut self, line: Line<'src>) {
        while let Some(next) = self.peek() {
            if next.indent <= line.indent {
                break;
            }
            self.advance();
        }
    }

    fn peek(&self) -> Option<Line<'src>> {
        self.lines.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}

fn starts_tag(content: &str) -> bool {
    let mut chars = content.chars();
    match (chars.next(), chars.next()) {
        (Some('%'), _) => true,
        (Some('.'), Some(c)) | (Some('#'), Some(c)) => is_name_char(c),
        _ => false,
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_name(input: &str, allow_colon: bool) -> (&str, &str) {
    let end = input
        .char_indices()
        .find(|&(_, c)| !(is_name_char(c) || (allow_colon && c == ':')))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    input.split_at(end)
}

fn parse_tag(content: &str, line: usize) -> ParseResult<TagNode> {
    let mut tag = TagNode::new("div", line);
    let mut rest = content;

    if let Some(after) = rest.strip_prefix('%') {
        let (name, remaining) = take_name(after, true);
        if name.is_empty() {
            return Err(ParseError::malformed_tag(line, "Tag name expected after '%'"));
        }
        match name.split_once(':') {
            Some((ns, local)) if !ns.is_empty() && !local.is_empty() => {
                tag.namespace = Some(ns.to_string());
                tag.name = local.to_string();
            }
            Some(_) => {
                return Err(ParseError::malformed_tag(
                    line,
                    format!("Malformed namespaced tag name \"{}\"", name),
                ));
            }
            None => tag.name = name.to_string(),
        }
        rest = remaining;
    }

    loop {
        let shorthand = match rest.chars().next() {
            Some('.') => "class",
            Some('#') => "id",
            _ => break,
        };
        let (name, remaining) = take_name(&rest[1..], false);
        if name.is_empty() {
            return Err(ParseError::malformed_tag(
                line,
                format!("Empty {} shorthand", shorthand),
            ));
        }
        let attribute = Node::attribute(shorthand, Node::text(name, line));
        tag.attributes.push(if shorthand == "class" {
            Node::TagClass {
                children: vec![attribute],
                line,
            }
        } else {
            Node::TagId {
                children: vec![attribute],
                line,
            }
        });
        rest = remaining;
    }

    while let Some(open) = rest.chars().next().filter(|c| *c == '(' || *c == '{') {
        let close = find_collection_end(rest, line)?;
        let inner = &rest[1..close];
        tag.attributes.push(Node::AttributeCollection {
            children: parse_attributes(inner, open, line)?,
            line,
        });
        rest = &rest[close + 1..];
    }

    if let Some(after) = rest.strip_prefix('/') {
        if !after.trim().is_empty() {
            return Err(ParseError::malformed_tag(
                line,
                "Self-closing tag cannot have content",
            ));
        }
        tag.self_closing = true;
        return Ok(tag);
    }

    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) && !rest.starts_with('=') {
        return Err(ParseError::malformed_tag(
            line,
            format!("Unexpected \"{}\" after tag {}", rest, tag.qualified_name()),
        ));
    }

    let inline = rest.trim();
    if let Some(expr) = inline.strip_prefix('=') {
        tag.children.push(eval_node(expr, line)?);
    } else if !inline.is_empty() {
        tag.children.push(text_container(inline, line)?);
    }

    Ok(tag)
}

/// Byte index of the bracket closing the collection that opens `input`
fn find_collection_end(input: &str, line: usize) -> ParseResult<usize> {
    let mut stack: Vec<char> = Vec::new();
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
            '\'' | '"' => quote = Some(c),
            '(' => stack.push(')'),
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            ')' | '}' | ']' => {
                if stack.pop() != Some(c) {
                    return Err(ParseError::malformed_tag(
                        line,
                        format!("Mismatched '{}' in attribute collection", c),
                    ));
                }
                if stack.is_empty() {
                    return Ok(index);
                }
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(ParseError::malformed_tag(
            line,
            "Unterminated string in attribute collection",
        ));
    }
    Err(ParseError::malformed_tag(
        line,
        "AttributeCollection tag must be closed by a matching bracket",
    ))
}

/// Parse the inside of `(...)` (HTML style) or `{...}` (hash style)
fn parse_attributes(inner: &str, open: char, line: usize) -> ParseResult<Vec<Node>> {
    let hash_style = open == '{';
    let mut attributes = Vec::new();
    let mut rest = inner;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let (name, after_name) = if hash_style {
            let symbol = rest.strip_prefix(':').unwrap_or(rest);
            match symbol.chars().next() {
                Some(q @ ('\'' | '"')) => {
                    let end = find_quote_end(symbol, q, line)?;
                    (&symbol[1..end], &symbol[end + 1..])
                }
                _ => take_attribute_name(symbol, false),
            }
        } else {
            take_attribute_name(rest, true)
        };

        if name.is_empty() {
            return Err(ParseError::malformed_tag(
                line,
                format!("Malformed HTML attribute \"{}\"", rest),
            ));
        }

        let after_name = after_name.trim_start();
        let separator = if hash_style {
            after_name
                .strip_prefix("=>")
                .or_else(|| after_name.strip_prefix(':'))
        } else {
            after_name.strip_prefix('=')
        };

        let Some(value_start) = separator else {
            if hash_style {
                return Err(ParseError::malformed_tag(
                    line,
                    format!("Attribute \"{}\" has no value", name),
                ));
            }
            // Bare HTML attribute such as `(checked)`
            attributes.push(Node::attribute(name, Node::text(name, line)));
            rest = after_name;
            continue;
        };

        let value_start = value_start.trim_start();
        let (value, remaining) = match value_start.chars().next() {
            Some(q @ ('\'' | '"')) => {
                let end = find_quote_end(value_start, q, line)?;
                (quoted_value(&value_start[1..end], line)?, &value_start[end + 1..])
            }
            Some(_) => {
                let end = find_value_end(value_start, hash_style);
                let expr = value_start[..end].trim();
                (eval_node(expr, line)?, &value_start[end..])
            }
            None => {
                return Err(ParseError::malformed_tag(
                    line,
                    format!("Attribute \"{}\" has no value", name),
                ));
            }
        };

        attributes.push(Node::attribute(name, value));
        rest = remaining;
    }

    Ok(attributes)
}

fn take_attribute_name(input: &str, allow_colon: bool) -> (&str, &str) {
    let end = input
        .char_indices()
        .find(|&(_, c)| {
            !(is_name_char(c) || c == '@' || c == '.' || (allow_colon && c == ':'))
        })
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    input.split_at(end)
}

fn find_quote_end(input: &str, quote: char, line: usize) -> ParseResult<usize> {
    let mut escaped = false;
    for (index, c) in input.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok(index);
        }
    }
    Err(ParseError::malformed_tag(
        line,
        format!("Unterminated string {}", input),
    ))
}

/// End of an unquoted attribute value: whitespace (HTML style) or a comma
/// (hash style) outside brackets and strings
fn find_value_end(input: &str, hash_style: bool) -> usize {
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
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 && hash_style => return index,
            c if c.is_whitespace() && depth == 0 && !hash_style => return index,
            _ => {}
        }
    }
    input.len()
}

/// A quoted attribute value. `#{...}` parts turn the value into an
/// expression that concatenates literal and interpolated pieces.
fn quoted_value(raw: &str, line: usize) -> ParseResult<Node> {
    let segments = split_interpolation(raw, line)?;

    match segments.as_slice() {
        [Segment::Variable(path)] => return Ok(Node::eval(path.clone(), line)),
        s if s.iter().all(|seg| matches!(seg, Segment::Literal(_))) => {
            return Ok(Node::text(unescape(raw), line));
        }
        _ => {}
    }

    let pieces: Vec<String> = segments
        .iter()
        .map(|segment| match segment {
            Segment::Variable(path) => format!("({})", path),
            Segment::Literal(content) => string_literal(content),
        })
        .collect();

    // A leading empty string keeps `+` in concatenation mode
    Ok(Node::eval(format!("\"\" + {}", pieces.join(" + ")), line))
}

fn string_literal(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 2);
    out.push('"');
    for c in content.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn eval_node(expr: &str, line: usize) -> ParseResult<Node> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ParseError::malformed_variable(line, "empty expression"));
    }
    Ok(Node::eval(expr, line))
}

fn text_container(text: &str, line: usize) -> ParseResult<Node> {
    let children = split_interpolation(text, line)?
        .into_iter()
        .map(|segment| match segment {
            Segment::Literal(content) => Node::text(content, line),
            Segment::Variable(path) => Node::TextVariable { path, line },
        })
        .collect();
    Ok(Node::TextContainer { children, line })
}

enum Segment {
    Literal(String),
    Variable(String),
}

/// Split text on `#{...}` into literal and variable parts
fn split_interpolation(text: &str, line: usize) -> ParseResult<Vec<Segment>> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(start) = rest.find("#{") {
        if rest[..start].ends_with('\\') {
            literal.push_str(&rest[..start - 1]);
            literal.push_str("#{");
            rest = &rest[start + 2..];
            continue;
        }

        literal.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let end = find_interpolation_end(body)
            .ok_or_else(|| ParseError::malformed_variable(line, &rest[start..]))?;
        let path = body[..end].trim();
        if path.is_empty() {
            return Err(ParseError::malformed_variable(line, &rest[start..start + end + 3]));
        }

        if !literal.is_empty() {
            parts.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        parts.push(Segment::Variable(path.to_string()));
        rest = &body[end + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(Segment::Literal(literal));
    }
    Ok(parts)
}

fn find_interpolation_end(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (index, c) in body.char_indices() {
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
            '\'' | '"' => quote = Some(c),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(index),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

pub fn parse(source: &str) -> ParseResult<Document> {
    Parser::new(source)?.parse_document()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_tag(doc: &Document) -> &TagNode {
        match doc.children.as_slice() {
            [Node::Tag(tag)] => tag,
            other => panic!("expected a single tag, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_tag() {
        let doc = parse("%p Hello").unwrap();
        let tag = only_tag(&doc);
        assert_eq!(tag.name, "p");
        assert_eq!(
            tag.children,
            vec![Node::TextContainer {
                children: vec![Node::text("Hello", 1)],
                line: 1
            }]
        );
    }

    #[test]
    fn test_parse_class_and_id_shorthand() {
        let doc = parse(".card#main").unwrap();
        let tag = only_tag(&doc);
        assert_eq!(tag.name, "div");
        assert!(matches!(tag.attributes[0], Node::TagClass { .. }));
        assert!(matches!(tag.attributes[1], Node::TagId { .. }));
    }

    #[test]
    fn test_parse_namespaced_tag() {
        let doc = parse("%svg:rect/").unwrap();
        let tag = only_tag(&doc);
        assert_eq!(tag.qualified_name(), "svg:rect");
        assert!(tag.self_closing);
    }

    #[test]
    fn test_parse_nested_children() {
        let source = "%ul\n  %li one\n  %li two\n%p after";
        let doc = parse(source).unwrap();
        assert_eq!(doc.children.len(), 2);
        match &doc.children[0] {
            Node::Tag(ul) => assert_eq!(ul.children.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(doc.children[1].line(), 4);
    }

    #[test]
    fn test_parse_html_style_attributes() {
        let doc = parse(r#"%a(href="/home" title=model.title)"#).unwrap();
        let tag = only_tag(&doc);
        let Node::AttributeCollection { children, .. } = &tag.attributes[0] else {
            panic!("expected attribute collection");
        };
        assert_eq!(
            children,
            &vec![
                Node::attribute("href", Node::text("/home", 1)),
                Node::attribute("title", Node::eval("model.title", 1)),
            ]
        );
    }

    #[test]
    fn test_parse_hash_style_attributes() {
        let doc = parse(r#"%a{:href => "/x", class: model.kind}"#).unwrap();
        let tag = only_tag(&doc);
        let Node::AttributeCollection { children, .. } = &tag.attributes[0] else {
            panic!("expected attribute collection");
        };
        assert_eq!(
            children,
            &vec![
                Node::attribute("href", Node::text("/x", 1)),
                Node::attribute("class", Node::eval("model.kind", 1)),
            ]
        );
    }

    #[test]
    fn test_quoted_attribute_with_interpolation() {
        let doc = parse(r#"%a(class="btn #{model.kind}")"#).unwrap();
        let tag = only_tag(&doc);
        let Node::AttributeCollection { children, .. } = &tag.attributes[0] else {
            panic!("expected attribute collection");
        };
        assert_eq!(
            children[0],
            Node::attribute("class", Node::eval("\"\" + \"btn \" + (model.kind)", 1))
        );
    }

    #[test]
    fn test_unmatched_bracket_reports_line() {
        let source = "%div\n  %p ok\n  %a(href=\"/x\"";
        let err = parse(source).unwrap_err();
        assert!(matches!(err, ParseError::MalformedTag { line: 3, .. }));
    }

    #[test]
    fn test_mismatched_bracket_reports_line() {
        let err = parse("%p\n%a{href: (1}").unwrap_err();
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn test_text_interpolation() {
        let doc = parse("Hello #{model.name}!").unwrap();
        assert_eq!(
            doc.children[0],
            Node::TextContainer {
                children: vec![
                    Node::text("Hello ", 1),
                    Node::TextVariable {
                        path: "model.name".to_string(),
                        line: 1
                    },
                    Node::text("!", 1),
                ],
                line: 1
            }
        );
    }

    #[test]
    fn test_escaped_interpolation_stays_literal() {
        let doc = parse(r"Price \#{none}").unwrap();
        assert_eq!(
            doc.children[0],
            Node::TextContainer {
                children: vec![Node::text("Price #{none}", 1)],
                line: 1
            }
        );
    }

    #[test]
    fn test_unterminated_variable() {
        let err = parse("%p\n  Hi #{model.name").unwrap_err();
        assert!(matches!(err, ParseError::MalformedVariable { line: 2, .. }));
    }

    #[test]
    fn test_code_block_children() {
        let source = "- if (model.ok)\n  %p yes\n- else\n  %p no";
        let doc = parse(source).unwrap();
        match &doc.children[..] {
            [Node::Code {
                content, children, ..
            }, Node::Code { content: else_content, .. }] => {
                assert_eq!(content, "if (model.ok)");
                assert_eq!(children.len(), 1);
                assert_eq!(else_content, "else");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_comments_are_dropped() {
        let source = "-# hidden\n  %p also hidden\n/ markup comment\n%p shown";
        let doc = parse(source).unwrap();
        assert_eq!(doc.children.len(), 1);
    }

    #[test]
    fn test_doctype_eval_and_partial() {
        let doc = parse("!!! 5\n= model.title\n_ render 'header'").unwrap();
        assert_eq!(
            doc.children,
            vec![
                Node::DocType { line: 1 },
                Node::eval("model.title", 2),
                Node::Partial {
                    directive: "render 'header'".to_string(),
                    line: 3
                },
            ]
        );
    }

    #[test]
    fn test_inconsistent_indentation() {
        let err = parse("%div\n    %p a\n  %p b").unwrap_err();
        assert!(matches!(err, ParseError::MalformedTag { line: 3, .. }));
    }

    #[test]
    fn test_nested_content_under_text_is_rejected() {
        let err = parse("plain\n  %p child").unwrap_err();
        assert_eq!(err.line(), 2);
    }
}
