use crate::ast::{BinaryOp, Expr, FunctionDecl, UnaryOp};
use crate::builtins::FunctionTable;
use crate::lexer::{tokenize, LexError, Token};
use nhaml_compiler::{Diagnostic, ReturnKind};
use serde_json::{Number, Value};
use std::ops::Range;

struct SyntaxError {
    span: Range<usize>,
    message: String,
}

type SyntaxResult<T> = Result<T, SyntaxError>;

/// Parser for generated expression programs
///
/// Every problem is recorded as a [`Diagnostic`] and parsing resumes at
/// the next `fn`, so one pass reports all of them.
pub struct ProgramParser<'src, 'lib> {
    source: &'src str,
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    functions: &'lib FunctionTable,
    lex_errors: Vec<LexError>,
    /// Name and start offset of every declaration seen
    headers: Vec<(String, usize)>,
    unit: Option<String>,
    param: Option<&'src str>,
    diagnostics: Vec<Diagnostic>,
}

impl<'src, 'lib> ProgramParser<'src, 'lib> {
    pub fn new(source: &'src str, functions: &'lib FunctionTable) -> Self {
        let (tokens, lex_errors) = tokenize(source);
        Self {
            source,
            tokens,
            pos: 0,
            functions,
            lex_errors,
            headers: Vec::new(),
            unit: None,
            param: None,
            diagnostics: Vec::new(),
        }
    }

    /// Parse every declaration, returning them with all diagnostics found
    pub fn parse_program(mut self) -> (Vec<FunctionDecl>, Vec<Diagnostic>) {
        let mut decls = Vec::new();

        while !self.is_at_end() {
            self.unit = None;
            self.param = None;
            match self.parse_function() {
                Ok(decl) => decls.push(decl),
                Err(err) => {
                    self.report(err.span, err.message);
                    self.recover();
                }
            }
        }

        for error in std::mem::take(&mut self.lex_errors) {
            self.unit = self
                .headers
                .iter()
                .rev()
                .find(|(_, start)| *start <= error.span.start)
                .map(|(name, _)| name.clone());
            self.report(error.span, error.message);
        }

        self.diagnostics
            .sort_by_key(|d| d.span.as_ref().map(|span| span.start));
        (decls, self.diagnostics)
    }

    fn parse_function(&mut self) -> SyntaxResult<FunctionDecl> {
        let start = self.peek_span().start;
        self.expect(Token::Fn)?;
        let name = self.expect_ident("a function name")?;
        self.unit = Some(name.to_string());
        self.headers.push((name.to_string(), start));

        self.expect(Token::LParen)?;
        let param = self.expect_ident("a parameter name")?;
        self.expect(Token::RParen)?;
        self.expect(Token::Arrow)?;

        let kind_span = self.peek_span();
        let kind = match self.expect_ident("a return type")? {
            "text" => ReturnKind::Text,
            "bool" => ReturnKind::Boolean,
            other => {
                return Err(SyntaxError {
                    span: kind_span,
                    message: format!("Unknown return type `{}`", other),
                })
            }
        };

        self.expect(Token::LBrace)?;
        self.param = Some(param);
        let body = self.parse_expression()?;
        self.expect(Token::RBrace)?;

        Ok(FunctionDecl {
            name: name.to_string(),
            kind,
            body,
            span: start..self.previous_end(),
        })
    }

    /// Skip to the next declaration
    fn recover(&mut self) {
        while !self.is_at_end() && !self.check(&Token::Fn) {
            self.advance();
        }
    }

    fn parse_expression(&mut self) -> SyntaxResult<Expr> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> SyntaxResult<Expr> {
        let mut left = self.parse_and_expression()?;
        while self.match_token(&Token::Or) {
            let right = self.parse_and_expression()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> SyntaxResult<Expr> {
        let mut left = self.parse_equality_expression()?;
        while self.match_token(&Token::And) {
            let right = self.parse_equality_expression()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    /// `==` and `!=`
    fn parse_equality_expression(&mut self) -> SyntaxResult<Expr> {
        let mut left = self.parse_comparison_expression()?;
        while let Some(op) = self.match_operator(|token| match token {
            Token::EqEq => Some(BinaryOp::Equals),
            Token::NotEq => Some(BinaryOp::NotEquals),
            _ => None,
        }) {
            let right = self.parse_comparison_expression()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    /// `<`, `<=`, `>` and `>=`
    fn parse_comparison_expression(&mut self) -> SyntaxResult<Expr> {
        let mut left = self.parse_additive_expression()?;
        while let Some(op) = self.match_operator(|token| match token {
            Token::Lt => Some(BinaryOp::LessThan),
            Token::Lte => Some(BinaryOp::LessThanOrEqual),
            Token::Gt => Some(BinaryOp::GreaterThan),
            Token::Gte => Some(BinaryOp::GreaterThanOrEqual),
            _ => None,
        }) {
            let right = self.parse_additive_expression()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> SyntaxResult<Expr> {
        let mut left = self.parse_multiplicative_expression()?;
        while let Some(op) = self.match_operator(|token| match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Subtract),
            _ => None,
        }) {
            let right = self.parse_multiplicative_expression()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> SyntaxResult<Expr> {
        let mut left = self.parse_unary_expression()?;
        while let Some(op) = self.match_operator(|token| match token {
            Token::Star => Some(BinaryOp::Multiply),
            Token::Slash => Some(BinaryOp::Divide),
            Token::Percent => Some(BinaryOp::Remainder),
            _ => None,
        }) {
            let right = self.parse_unary_expression()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> SyntaxResult<Expr> {
        let operator = if self.match_token(&Token::Bang) {
            UnaryOp::Not
        } else if self.match_token(&Token::Minus) {
            UnaryOp::Negate
        } else {
            return self.parse_postfix_expression();
        };

        let operand = self.parse_unary_expression()?;
        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    /// Member access and indexing: `a.b`, `a[0]`
    fn parse_postfix_expression(&mut self) -> SyntaxResult<Expr> {
        let mut expr = self.parse_primary_expression()?;
        loop {
            if self.match_token(&Token::Dot) {
                let property = self.expect_ident("a member name")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: property.to_string(),
                };
            } else if self.match_token(&Token::LBracket) {
                let index = self.parse_expression()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary_expression(&mut self) -> SyntaxResult<Expr> {
        let Some((token, span)) = self.peek().cloned() else {
            return Err(SyntaxError {
                span: self.peek_span(),
                message: "Expected an expression, found end of input".to_string(),
            });
        };

        let literal = match token {
            Token::Integer(n) => Value::from(n),
            Token::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            Token::String(s) => Value::String(s),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                return Ok(expr);
            }
            Token::Ident(name) => {
                self.advance();
                if self.check(&Token::LParen) {
                    return self.parse_call(name, span);
                }
                if self.param == Some(name) {
                    return Ok(Expr::Model);
                }
                self.report(span, format!("Unknown name `{}`", name));
                return Ok(Expr::Literal(Value::Null));
            }
            other => {
                return Err(SyntaxError {
                    span,
                    message: format!("Expected an expression, found {}", other.describe()),
                })
            }
        };

        self.advance();
        Ok(Expr::Literal(literal))
    }

    fn parse_call(&mut self, name: &str, span: Range<usize>) -> SyntaxResult<Expr> {
        self.expect(Token::LParen)?;
        let mut arguments = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                arguments.push(self.parse_expression()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        match self.functions.get(name) {
            Some(function) if function.accepts(arguments.len()) => Ok(Expr::Call {
                function,
                arguments,
            }),
            Some(function) => {
                self.report(
                    span,
                    format!(
                        "`{}` takes {} argument(s) but {} were given",
                        name,
                        function.arity(),
                        arguments.len()
                    ),
                );
                Ok(Expr::Literal(Value::Null))
            }
            None => {
                self.report(span, format!("Unknown function `{}`", name));
                Ok(Expr::Literal(Value::Null))
            }
        }
    }

    fn report(&mut self, span: Range<usize>, message: impl Into<String>) {
        let mut diagnostic =
            Diagnostic::new(line_of(self.source, span.start), message).with_span(span);
        if let Some(unit) = &self.unit {
            diagnostic = diagnostic.with_unit(unit.clone());
        }
        self.diagnostics.push(diagnostic);
    }

    fn peek(&self) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn peek_span(&self) -> Range<usize> {
        self.peek()
            .map(|(_, span)| span.clone())
            .unwrap_or(self.source.len()..self.source.len())
    }

    fn previous_end(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, span)| span.end)
            .unwrap_or(0)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, expected: &Token<'src>) -> bool {
        matches!(self.peek(), Some((token, _)) if token == expected)
    }

    fn match_token(&mut self, expected: &Token<'src>) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_operator(&mut self, table: fn(&Token<'_>) -> Option<BinaryOp>) -> Option<BinaryOp> {
        let op = self.peek().and_then(|(token, _)| table(token))?;
        self.advance();
        Some(op)
    }

    fn expect(&mut self, expected: Token<'src>) -> SyntaxResult<()> {
        if self.match_token(&expected) {
            return Ok(());
        }
        Err(self.unexpected(&expected.describe()))
    }

    fn expect_ident(&mut self, what: &str) -> SyntaxResult<&'src str> {
        match self.peek() {
            Some((Token::Ident(name), _)) => {
                let name = *name;
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let found = self
            .peek()
            .map(|(token, _)| token.describe())
            .unwrap_or_else(|| "end of input".to_string());
        SyntaxError {
            span: self.peek_span(),
            message: format!("Expected {}, found {}", expected, found),
        }
    }
}

fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    }
}

/// 1-based line of a byte offset
pub fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

/// Parse `source` with the functions in `table` in scope
pub fn parse_program(
    source: &str,
    table: &FunctionTable,
) -> (Vec<FunctionDecl>, Vec<Diagnostic>) {
    ProgramParser::new(source, table).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::CORE;

    fn table() -> FunctionTable {
        let mut table = FunctionTable::new();
        table.import(&CORE);
        table
    }

    fn parse_body(expr: &str) -> Expr {
        let source = format!("fn f(model) -> text {{\n    {}\n}}\n", expr);
        let (mut decls, diagnostics) = parse_program(&source, &table());
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        decls.remove(0).body
    }

    fn member(object: Expr, property: &str) -> Expr {
        Expr::Member {
            object: Box::new(object),
            property: property.to_string(),
        }
    }

    #[test]
    fn test_parse_declarations() {
        let source = "// generated\nfn a(model) -> text {\n    model.x\n}\nfn b(m) -> bool {\n    m.ok\n}\n";
        let (decls, diagnostics) = parse_program(source, &table());
        assert!(diagnostics.is_empty());
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "a");
        assert_eq!(decls[0].kind, ReturnKind::Text);
        assert_eq!(decls[0].body, member(Expr::Model, "x"));
        assert_eq!(decls[1].kind, ReturnKind::Boolean);
        assert_eq!(decls[1].body, member(Expr::Model, "ok"));
    }

    #[test]
    fn test_precedence() {
        let expr = parse_body("1 + 2 * 3 == 7 && !model.off || model.on");
        let Expr::Binary { operator, left, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(operator, BinaryOp::Or);
        let Expr::Binary { operator, left, .. } = *left else {
            panic!("expected binary");
        };
        assert_eq!(operator, BinaryOp::And);
        let Expr::Binary { operator, left, .. } = *left else {
            panic!("expected binary");
        };
        assert_eq!(operator, BinaryOp::Equals);
        let Expr::Binary { operator, right, .. } = *left else {
            panic!("expected binary");
        };
        assert_eq!(operator, BinaryOp::Add);
        assert!(matches!(
            *right,
            Expr::Binary {
                operator: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn test_postfix_and_calls() {
        let expr = parse_body("upper(model.items[0].name)");
        let Expr::Call {
            function,
            arguments,
        } = expr
        else {
            panic!("expected call");
        };
        assert_eq!(function.name, "upper");
        assert_eq!(
            arguments[0],
            member(
                Expr::Index {
                    object: Box::new(member(Expr::Model, "items")),
                    index: Box::new(Expr::Literal(Value::from(0))),
                },
                "name"
            )
        );
    }

    #[test]
    fn test_collects_every_diagnostic() {
        let source = "\
fn a(model) -> text {
    model.
}
fn b(model) -> text {
    nope(1)
}
fn c(model) -> text {
    len(1, 2)
}
fn d(model) -> text {
    other.x
}
fn e(model) -> number {
    1
}
";
        let (decls, diagnostics) = parse_program(source, &table());
        assert_eq!(diagnostics.len(), 5, "{:?}", diagnostics);
        let units: Vec<_> = diagnostics.iter().map(|d| d.unit.as_deref()).collect();
        assert_eq!(units, vec![Some("a"), Some("b"), Some("c"), Some("d"), Some("e")]);
        assert_eq!(diagnostics[0].line, 3);
        assert!(diagnostics[1].message.contains("Unknown function `nope`"));
        assert!(diagnostics[2].message.contains("takes 1 argument(s)"));
        assert!(diagnostics[3].message.contains("Unknown name `other`"));
        assert!(diagnostics[4].message.contains("Unknown return type"));
        // semantic problems still yield a declaration; syntax errors do not
        assert_eq!(decls.len(), 3);
    }

    #[test]
    fn test_lex_errors_are_attributed_to_their_unit() {
        let source = "fn a(model) -> text {\n    model.x\n}\nfn b(model) -> text {\n    model @ 1\n}\n";
        let (_, diagnostics) = parse_program(source, &table());
        assert!(diagnostics
            .iter()
            .any(|d| d.unit.as_deref() == Some("b") && d.message.contains("Unexpected character")));
    }

    #[test]
    fn test_line_of() {
        assert_eq!(line_of("a\nb\nc", 0), 1);
        assert_eq!(line_of("a\nb\nc", 2), 2);
        assert_eq!(line_of("a\nb\nc", 99), 3);
    }
}
