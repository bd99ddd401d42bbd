//! Token types for the Stencil lexer.
//!
//! A template lexes to literal [`TokenKind::Text`] runs and tags. Each tag is
//! bracketed by [`TokenKind::TagOpen`] / [`TokenKind::TagClose`] with the
//! in-tag tokens between them.

use stencil_types::{format_number, Span};
use std::fmt;

/// Words that start a directive when they lead a tag (case-insensitive).
///
/// They are not reserved: the lexer emits them as identifiers and the parser
/// decides from position whether they act as keywords.
pub const DIRECTIVE_KEYWORDS: &[&str] = &[
    "if", "else", "endif", "loop", "loopbw", "endloop", "set", "include",
];

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Template structure ───────────────────────────────────

    /// Literal text between tags.
    Text(String),
    /// `{`, carrying the raw tag source, braces included, for diagnostics
    /// and for falling back to literal text.
    TagOpen(String),
    /// `}`
    TagClose,

    // ── Literals ─────────────────────────────────────────────

    Identifier(String),
    /// Unsigned; a leading `-` is a separate [`TokenKind::Minus`].
    NumberLit(f64),
    /// Escapes already resolved.
    StringLiteral(String),

    // ── Operators ────────────────────────────────────────────

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `~`
    Tilde,
    /// `==`
    EqEq,
    /// `===`
    EqEqEq,
    /// `!=`
    BangEq,
    /// `!==`
    BangEqEq,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessEq,
    /// `>=`
    GreaterEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,

    // ── Punctuation ──────────────────────────────────────────

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `..`
    DotDot,
    /// `=`
    Eq,
    /// `=>`
    FatArrow,

    /// End of template
    Eof,
}

impl TokenKind {
    /// `true` for an identifier equal to `keyword`, ignoring ASCII case.
    pub fn is_word(&self, keyword: &str) -> bool {
        matches!(self, TokenKind::Identifier(name) if name.eq_ignore_ascii_case(keyword))
    }

    /// `true` for an identifier that can lead a directive tag.
    pub fn is_directive_keyword(&self) -> bool {
        DIRECTIVE_KEYWORDS.iter().any(|kw| self.is_word(kw))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Text(_) => "text",
            TokenKind::TagOpen(_) => "{",
            TokenKind::TagClose => "}",
            TokenKind::Identifier(name) => return f.write_str(name),
            TokenKind::NumberLit(n) => return f.write_str(&format_number(*n)),
            TokenKind::StringLiteral(s) => return write!(f, "\"{s}\""),
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Tilde => "~",
            TokenKind::EqEq => "==",
            TokenKind::EqEqEq => "===",
            TokenKind::BangEq => "!=",
            TokenKind::BangEqEq => "!==",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEq => "<=",
            TokenKind::GreaterEq => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Eq => "=",
            TokenKind::FatArrow => "=>",
            TokenKind::Eof => "end of template",
        };
        f.write_str(s)
    }
}
