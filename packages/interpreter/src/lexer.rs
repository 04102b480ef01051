//! Lexer for generated expression programs using logos

use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token<'src> {
    #[token("fn")]
    Fn,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r"'([^'\\]|\\.)*'", |lex| unescape(lex.slice()))]
    String(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Lte,
    #[token(">")]
    Gt,
    #[token(">=")]
    Gte,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Bang,
    #[token("->")]
    Arrow,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
}

impl Token<'_> {
    /// How the token reads in a diagnostic
    pub fn describe(&self) -> String {
        let symbol = match self {
            Token::Ident(name) => return format!("identifier `{}`", name),
            Token::String(_) => return "string".to_string(),
            Token::Integer(_) | Token::Float(_) => return "number".to_string(),
            Token::Fn => "fn",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Lte => "<=",
            Token::Gt => ">",
            Token::Gte => ">=",
            Token::And => "&&",
            Token::Or => "||",
            Token::Bang => "!",
            Token::Arrow => "->",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Dot => ".",
        };
        format!("`{}`", symbol)
    }
}

/// Strip the surrounding quotes and resolve backslash escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Range<usize>,
    pub message: String,
}

/// Lex `source`, returning tokens with byte spans and any bad characters
pub fn tokenize(source: &str) -> (Vec<(Token<'_>, Range<usize>)>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(_) => errors.push(LexError {
                message: format!("Unexpected character `{}`", &source[span.clone()]),
                span,
            }),
        }
    }

    (tokens, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        let (tokens, errors) = tokenize(source);
        assert!(errors.is_empty(), "{:?}", errors);
        tokens.into_iter().map(|(token, _)| token).collect()
    }

    #[test]
    fn test_lex_function_header() {
        assert_eq!(
            kinds("fn _1a2b(model) -> text {"),
            vec![
                Token::Fn,
                Token::Ident("_1a2b"),
                Token::LParen,
                Token::Ident("model"),
                Token::RParen,
                Token::Arrow,
                Token::Ident("text"),
                Token::LBrace,
            ]
        );
    }

    #[test]
    fn test_lex_literals() {
        assert_eq!(
            kinds(r#"12 3.5 "a\"b" 'c' true null"#),
            vec![
                Token::Integer(12),
                Token::Float(3.5),
                Token::String("a\"b".to_string()),
                Token::String("c".to_string()),
                Token::True,
                Token::Null,
            ]
        );
    }

    #[test]
    fn test_lex_operators() {
        assert_eq!(
            kinds("a <= b && !c || d != -1"),
            vec![
                Token::Ident("a"),
                Token::Lte,
                Token::Ident("b"),
                Token::And,
                Token::Bang,
                Token::Ident("c"),
                Token::Or,
                Token::Ident("d"),
                Token::NotEq,
                Token::Minus,
                Token::Integer(1),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// generated\nmodel // trailing"),
            vec![Token::Ident("model")]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let (tokens, errors) = tokenize("model @ 1");
        assert_eq!(tokens.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, 6..7);
    }
}
