//! Core parser infrastructure: token cursor, tag helpers, error reporting.

use stencil_lexer::token::{Token, TokenKind};
use stencil_types::ast::{Ident, Template};
use stencil_types::{CompileErrors, ErrorCode, SourceFile, Span, StencilError};

/// Maximum nesting depth of `IF` / `LOOP` blocks.
pub const MAX_BLOCK_DEPTH: u32 = 32;

/// Maximum nesting depth of parenthesised condition groups.
pub const MAX_GROUP_DEPTH: u32 = 8;

/// Parser options.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// `{include ...}` is rejected when false (string templates).
    pub allow_includes: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allow_includes: true,
        }
    }
}

/// The Stencil parser.
///
/// Consumes a token stream produced by the lexer and builds a [`Template`].
/// Errors are collected; a broken directive is skipped up to its `}` and
/// parsing resumes with the next token.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source_file: &'src SourceFile,
    file_name: &'src str,
    errors: CompileErrors,
    pub(crate) options: ParseOptions,
    /// Raw text of the tag being parsed, attached to every diagnostic.
    pub(crate) current_tag: String,
    /// Current `IF`/`LOOP` nesting depth.
    pub(crate) block_depth: u32,
    /// Current `(` nesting depth inside a condition.
    pub(crate) group_depth: u32,
    /// While set, errors are swallowed (speculative output-tag parsing).
    pub(crate) quiet: bool,
    pub(crate) failed: bool,
}

/// Result of parsing.
pub struct ParseResult {
    pub template: Option<Template>,
    pub errors: CompileErrors,
}

impl<'src> Parser<'src> {
    /// Create a new parser from a token stream and source file.
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile) -> Self {
        Self::with_options(tokens, source_file, ParseOptions::default())
    }

    pub fn with_options(
        tokens: Vec<Token>,
        source_file: &'src SourceFile,
        options: ParseOptions,
    ) -> Self {
        Self {
            tokens,
            pos: 0,
            source_file,
            file_name: &source_file.name,
            errors: CompileErrors::empty(),
            options,
            current_tag: String::new(),
            block_depth: 0,
            group_depth: 0,
            quiet: false,
            failed: false,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn previous_span(&self) -> Span {
        match self.pos.checked_sub(1) {
            Some(i) => self.tokens[i].span,
            None => Span::point(1, 1),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check_exact(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check_exact(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// If the current token is the contextual keyword `word`, advance.
    pub(crate) fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_kind().is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    pub(crate) fn save(&self) -> usize {
        self.pos
    }

    pub(crate) fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check_exact(expected) {
            Some(self.advance())
        } else {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected '{}', got '{}'", expected, self.peek_kind()),
            );
            None
        }
    }

    pub(crate) fn expect_word(&mut self, word: &str) -> Option<()> {
        if self.eat_word(word) {
            Some(())
        } else {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected '{word}', got '{}'", self.peek_kind()),
            );
            None
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected identifier, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// A directive header must end exactly at the tag's `}`.
    pub(crate) fn expect_tag_close(&mut self) -> Option<()> {
        self.expect(&TokenKind::TagClose).map(|_| ())
    }

    /// Skip the rest of the current tag, including its `}`.
    pub(crate) fn skip_tag(&mut self) {
        while !self.at_end() {
            if self.advance().kind == TokenKind::TagClose {
                return;
            }
        }
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.failed = true;
        if self.quiet {
            return;
        }
        let error = StencilError::new(self.file_name, code, message, span, &self.current_tag)
            .located_in(self.source_file);
        self.errors.push_error(error);
    }

    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= stencil_types::MAX_ERRORS
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a [`Template`].
    pub fn parse(mut self) -> ParseResult {
        let nodes = self.parse_template();
        let template = if self.errors.has_errors() {
            None
        } else {
            Some(Template {
                name: self.file_name.to_string(),
                nodes,
            })
        };
        ParseResult {
            template,
            errors: self.errors,
        }
    }
}
