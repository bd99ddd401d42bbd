//! Core Stencil lexer: converts template text to a token stream.
//!
//! Features:
//! - Literal text is kept byte-for-byte as [`TokenKind::Text`] runs
//! - A `{` opens a tag only when followed by an identifier/number/string
//!   start, `(` or `-`; anything else (`{ `, `{{`, `{}`) is literal text
//! - A tag that cannot be tokenized up to its `}` is literal text, so CSS and
//!   script braces survive untouched
//! - `{* ... *}` comments may span lines; their text is dropped but directive
//!   tags inside them (`{IF ..}`, `{SET ..}`, `{ENDLOOP}`, ...) still lex

use stencil_types::{CompileErrors, ErrorCode, SourceFile, Span, StencilError};

use crate::token::{Token, TokenKind};

/// Saved cursor position, used to backtrack out of a failed tag scan.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    pos: usize,
    line: u32,
    col: u32,
}

/// The Stencil lexer.
pub struct Lexer<'src> {
    source_file: &'src SourceFile,
    source: &'src str,
    bytes: &'src [u8],
    /// File name (for errors).
    file_name: &'src str,
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
    errors: CompileErrors,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: CompileErrors,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source file.
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source_file,
            source: &source_file.source,
            bytes: source_file.source.as_bytes(),
            file_name: &source_file.name,
            pos: 0,
            line: 1,
            col: 1,
            errors: CompileErrors::empty(),
        }
    }

    /// Lex the entire template into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();
        let mut text_start = self.checkpoint();

        while let Some(ch) = self.peek() {
            if ch == b'{' {
                let here = self.checkpoint();
                if self.peek_at(1) == Some(b'*') {
                    self.flush_text(&mut tokens, text_start, here);
                    self.lex_comment(&mut tokens);
                    text_start = self.checkpoint();
                    continue;
                }
                if self.peek_at(1).is_some_and(starts_tag) {
                    if let Some(tag) = self.scan_tag() {
                        self.flush_text(&mut tokens, text_start, here);
                        tokens.extend(tag);
                        text_start = self.checkpoint();
                        continue;
                    }
                    self.restore(here);
                }
            }
            self.advance();
        }

        let end = self.checkpoint();
        self.flush_text(&mut tokens, text_start, end);
        tokens.push(Token::new(TokenKind::Eof, self.current_span()));

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Cursor helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn restore(&mut self, at: Checkpoint) {
        self.pos = at.pos;
        self.line = at.line;
        self.col = at.col;
    }

    fn current_span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    fn span_from(&self, start: Checkpoint) -> Span {
        Span::new(
            start.line,
            start.col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn flush_text(&self, tokens: &mut Vec<Token>, start: Checkpoint, end: Checkpoint) {
        if end.pos > start.pos {
            let span = Span::new(start.line, start.col, end.line, end.col);
            let text = self.source[start.pos..end.pos].to_string();
            tokens.push(Token::new(TokenKind::Text(text), span));
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Comments
    // ─────────────────────────────────────────────────────────────

    /// Lex a `{* ... *}` comment. Literal text and output tags inside it are
    /// dropped; directive tags are kept. An unterminated comment swallows the
    /// rest of the template and is reported.
    fn lex_comment(&mut self, tokens: &mut Vec<Token>) {
        let start = self.checkpoint();
        let Some(end) = self.source[self.pos + 2..].find("*}").map(|i| self.pos + 2 + i) else {
            while self.advance().is_some() {}
            let span = self.span_from(start);
            self.errors.push_error(StencilError::new(
                self.file_name,
                ErrorCode::UNTERMINATED_COMMENT,
                "comment opened with `{*` is never closed with `*}`",
                span,
                "{*",
            )
            .located_in(self.source_file));
            return;
        };
        self.advance();
        self.advance();

        while self.pos < end {
            if self.peek() == Some(b'{') && self.peek_at(1).is_some_and(starts_tag) {
                let here = self.checkpoint();
                match self.scan_tag() {
                    Some(tag) if self.pos <= end && is_directive_tag(&tag) => {
                        tokens.extend(tag);
                        continue;
                    }
                    _ => self.restore(here),
                }
            }
            self.advance();
        }
        self.advance();
        self.advance();
    }

    // ─────────────────────────────────────────────────────────────
    // Tags
    // ─────────────────────────────────────────────────────────────

    /// Scan `{ ... }` into `TagOpen`, inner tokens, `TagClose`.
    /// Returns `None` (cursor left wherever it stopped) if the tag is not lexable.
    fn scan_tag(&mut self) -> Option<Vec<Token>> {
        let start = self.checkpoint();
        self.advance(); // eat `{`
        let mut inner = Vec::new();
        let close_start = loop {
            self.skip_whitespace();
            match self.peek()? {
                b'}' => {
                    let at = self.checkpoint();
                    self.advance();
                    break at;
                }
                _ => inner.push(self.scan_tag_token()?),
            }
        };

        let raw = self.source[start.pos..self.pos].to_string();
        let mut tokens = Vec::with_capacity(inner.len() + 2);
        tokens.push(Token::new(
            TokenKind::TagOpen(raw),
            Span::point(start.line, start.col),
        ));
        tokens.extend(inner);
        tokens.push(Token::new(
            TokenKind::TagClose,
            Span::point(close_start.line, close_start.col),
        ));
        Some(tokens)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|ch| ch.is_ascii_whitespace()) {
            self.advance();
        }
    }

    fn scan_tag_token(&mut self) -> Option<Token> {
        let start = self.checkpoint();
        let kind = match self.peek()? {
            quote @ (b'"' | b'\'') => self.scan_string(quote)?,
            b'0'..=b'9' => self.scan_number(),
            ch if ch.is_ascii_alphabetic() || ch == b'_' => self.scan_identifier(),
            _ => self.scan_operator()?,
        };
        Some(Token::new(kind, self.span_from(start)))
    }

    /// String literal with backslash escapes; `None` if unterminated.
    fn scan_string(&mut self, quote: u8) -> Option<TokenKind> {
        self.advance(); // eat opening quote
        let mut buf = Vec::new();
        loop {
            match self.advance()? {
                ch if ch == quote => break,
                b'\\' => match self.advance()? {
                    b'n' => buf.push(b'\n'),
                    b't' => buf.push(b'\t'),
                    b'r' => buf.push(b'\r'),
                    other => buf.push(other),
                },
                ch => buf.push(ch),
            }
        }
        String::from_utf8(buf).ok().map(TokenKind::StringLiteral)
    }

    /// `digit+ ('.' digit+)?`. A `.` not followed by a digit is left alone
    /// so that `1..3` lexes as a range.
    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                self.advance();
            }
        }
        TokenKind::NumberLit(self.source[start..self.pos].parse().unwrap_or(0.0))
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == b'_')
        {
            self.advance();
        }
        TokenKind::Identifier(self.source[start..self.pos].to_string())
    }

    fn scan_operator(&mut self) -> Option<TokenKind> {
        let ch = self.peek()?;
        let (kind, len) = match (ch, self.peek_at(1), self.peek_at(2)) {
            (b'=', Some(b'='), Some(b'=')) => (TokenKind::EqEqEq, 3),
            (b'=', Some(b'='), _) => (TokenKind::EqEq, 2),
            (b'=', Some(b'>'), _) => (TokenKind::FatArrow, 2),
            (b'=', _, _) => (TokenKind::Eq, 1),
            (b'!', Some(b'='), Some(b'=')) => (TokenKind::BangEqEq, 3),
            (b'!', Some(b'='), _) => (TokenKind::BangEq, 2),
            (b'<', Some(b'='), _) => (TokenKind::LessEq, 2),
            (b'<', _, _) => (TokenKind::Less, 1),
            (b'>', Some(b'='), _) => (TokenKind::GreaterEq, 2),
            (b'>', _, _) => (TokenKind::Greater, 1),
            (b'&', Some(b'&'), _) => (TokenKind::AndAnd, 2),
            (b'|', Some(b'|'), _) => (TokenKind::OrOr, 2),
            (b'.', Some(b'.'), _) => (TokenKind::DotDot, 2),
            (b'.', _, _) => (TokenKind::Dot, 1),
            (b'+', _, _) => (TokenKind::Plus, 1),
            (b'-', _, _) => (TokenKind::Minus, 1),
            (b'*', _, _) => (TokenKind::Star, 1),
            (b'/', _, _) => (TokenKind::Slash, 1),
            (b'%', _, _) => (TokenKind::Percent, 1),
            (b'~', _, _) => (TokenKind::Tilde, 1),
            (b'(', _, _) => (TokenKind::LParen, 1),
            (b')', _, _) => (TokenKind::RParen, 1),
            (b',', _, _) => (TokenKind::Comma, 1),
            (b':', _, _) => (TokenKind::Colon, 1),
            _ => return None,
        };
        for _ in 0..len {
            self.advance();
        }
        Some(kind)
    }
}

/// Characters that may follow `{` in a tag.
fn starts_tag(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'"' | b'\'' | b'(' | b'-')
}

/// A scanned tag led by a directive keyword; `tag[0]` is the `TagOpen`.
fn is_directive_tag(tag: &[Token]) -> bool {
    tag.get(1).is_some_and(|t| t.kind.is_directive_keyword())
}
