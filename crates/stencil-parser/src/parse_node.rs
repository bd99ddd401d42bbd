//! Template-level parsing: text runs, output tags and block directives.

use crate::parser::{Parser, MAX_BLOCK_DEPTH};
use stencil_lexer::token::TokenKind;
use stencil_types::ast::*;
use stencil_types::{ErrorCode, Span};

/// The kind of body being parsed; decides which terminators are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Top,
    If,
    Else,
    Loop,
}

/// How a body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    Else,
    EndIf,
    EndLoop,
    Eof,
}

impl BlockEnd {
    fn tag(self) -> &'static str {
        match self {
            BlockEnd::Else => "{ELSE}",
            BlockEnd::EndIf => "{ENDIF}",
            BlockEnd::EndLoop => "{ENDLOOP}",
            BlockEnd::Eof => "end of template",
        }
    }
}

/// The header of a `LOOP`/`LOOPBW` tag.
enum LoopHeader {
    ForEach {
        source: VarRef,
        key: Option<Ident>,
        value: Ident,
    },
    Range {
        var: Ident,
        from: Expr,
        to: Expr,
    },
}

impl<'src> Parser<'src> {
    pub(crate) fn parse_template(&mut self) -> Vec<Node> {
        self.parse_body(BlockKind::Top).0
    }

    fn parse_body(&mut self, kind: BlockKind) -> (Vec<Node>, BlockEnd) {
        let mut nodes = Vec::new();
        loop {
            if self.too_many_errors() {
                return (nodes, BlockEnd::Eof);
            }
            match self.peek_kind().clone() {
                TokenKind::Eof => return (nodes, BlockEnd::Eof),
                TokenKind::Text(text) => {
                    self.advance();
                    push_text(&mut nodes, &text);
                }
                TokenKind::TagOpen(raw) => {
                    self.current_tag = raw.clone();
                    if let Some(end) = self.block_terminator() {
                        let span = self.current_span();
                        self.skip_tag();
                        match (kind, end) {
                            (BlockKind::If, BlockEnd::Else | BlockEnd::EndIf)
                            | (BlockKind::Else, BlockEnd::EndIf)
                            | (BlockKind::Loop, BlockEnd::EndLoop) => return (nodes, end),
                            (BlockKind::Else, BlockEnd::Else) => self.error_at(
                                ErrorCode::DUPLICATE_ELSE,
                                "{IF} already has an {ELSE} branch",
                                span,
                            ),
                            _ => self.error_at(
                                ErrorCode::UNMATCHED_END,
                                format!("{} has no matching opening directive", end.tag()),
                                span,
                            ),
                        }
                    } else if let Some(node) = self.parse_tag(raw) {
                        match node {
                            Node::Text(text) => push_text(&mut nodes, &text),
                            node => nodes.push(node),
                        }
                    }
                }
                _ => {
                    // In-tag tokens are always consumed by their tag.
                    self.advance();
                }
            }
        }
    }

    /// `{ELSE}`, `{ENDIF}` or `{ENDLOOP}` at the cursor.
    fn block_terminator(&self) -> Option<BlockEnd> {
        if self.look_ahead(2) != &TokenKind::TagClose {
            return None;
        }
        let head = self.look_ahead(1);
        if head.is_word("else") {
            Some(BlockEnd::Else)
        } else if head.is_word("endif") {
            Some(BlockEnd::EndIf)
        } else if head.is_word("endloop") {
            Some(BlockEnd::EndLoop)
        } else {
            None
        }
    }

    /// Parse one tag. Returns `None` for a broken directive (already reported).
    fn parse_tag(&mut self, raw: String) -> Option<Node> {
        let open_span = self.current_span();
        let head = self.look_ahead(1).clone();
        let has_args = self.look_ahead(2) != &TokenKind::TagClose;

        if has_args && head.is_directive_keyword() {
            if head.is_word("if") {
                return self.parse_if(open_span);
            }
            if head.is_word("loop") || head.is_word("loopbw") {
                return self.parse_loop(open_span);
            }
            if head.is_word("set") {
                return self.parse_set(open_span);
            }
            if head.is_word("include") {
                return self.parse_include(open_span);
            }
            if head.is_word("else") || head.is_word("endif") || head.is_word("endloop") {
                self.error_at(
                    ErrorCode::INVALID_DIRECTIVE,
                    format!("{{{head}}} takes no arguments"),
                    open_span,
                );
                self.skip_tag();
                return None;
            }
        }
        Some(self.parse_output(raw))
    }

    // ── Output ────────────────────────────────────────────────────────────────

    /// `{expr}` / `{obj.method(args)}`. A tag that is not a valid expression
    /// is literal text, never an error.
    fn parse_output(&mut self, raw: String) -> Node {
        let start = self.save();
        self.advance(); // eat `{`
        self.quiet = true;
        self.failed = false;
        let expr = self.parse_objval();
        let complete = !self.failed && self.check_exact(&TokenKind::TagClose);
        self.quiet = false;
        self.failed = false;

        match expr {
            Some(expr) if complete => {
                self.advance(); // eat `}`
                Node::Output(expr)
            }
            _ => {
                self.rewind(start);
                self.skip_tag();
                Node::Text(raw)
            }
        }
    }

    // ── Conditions ────────────────────────────────────────────────────────────

    /// `{IF cond} ... [{ELSE} ...] {ENDIF}`
    fn parse_if(&mut self, open_span: Span) -> Option<Node> {
        let raw = self.current_tag.clone();
        self.advance(); // eat `{`
        self.advance(); // eat `IF`
        let condition = self.parse_condition();
        let header_ok = condition.is_some() && self.expect_tag_close().is_some();
        if !header_ok {
            self.skip_tag();
        }

        if !self.enter_block(open_span) {
            return None;
        }
        let (then_body, end) = self.parse_body(BlockKind::If);
        let else_body = match end {
            BlockEnd::Else => {
                let (body, end) = self.parse_body(BlockKind::Else);
                if end != BlockEnd::EndIf {
                    self.unclosed(&raw, open_span, "{ENDIF}");
                }
                Some(body)
            }
            BlockEnd::EndIf => None,
            _ => {
                self.unclosed(&raw, open_span, "{ENDIF}");
                None
            }
        };
        self.block_depth -= 1;

        let span = open_span.merge(self.previous_span());
        Some(Node::If(IfNode {
            condition: condition.filter(|_| header_ok)?,
            then_body,
            else_body,
            span,
        }))
    }

    // ── Loops ─────────────────────────────────────────────────────────────────

    /// `{LOOP arr as [k =>] v}`, `{LOOPBW arr as [k =>] v}`, `{LOOP x in a..b}`
    fn parse_loop(&mut self, open_span: Span) -> Option<Node> {
        let raw = self.current_tag.clone();
        self.advance(); // eat `{`
        let direction = if self.advance().kind.is_word("loopbw") {
            Direction::Backward
        } else {
            Direction::Forward
        };
        let header = self.parse_loop_header(direction);
        let header_ok = header.is_some() && self.expect_tag_close().is_some();
        if !header_ok {
            self.skip_tag();
        }

        if !self.enter_block(open_span) {
            return None;
        }
        let (body, end) = self.parse_body(BlockKind::Loop);
        if end != BlockEnd::EndLoop {
            self.unclosed(&raw, open_span, "{ENDLOOP}");
        }
        self.block_depth -= 1;

        let span = open_span.merge(self.previous_span());
        let node = match header.filter(|_| header_ok)? {
            LoopHeader::ForEach { source, key, value } => Node::ForEach(ForEachNode {
                direction,
                source,
                key,
                value,
                body,
                span,
            }),
            LoopHeader::Range { var, from, to } => Node::Range(RangeNode {
                var,
                from,
                to,
                body,
                span,
            }),
        };
        Some(node)
    }

    fn parse_loop_header(&mut self, direction: Direction) -> Option<LoopHeader> {
        let is_range = matches!(self.peek_kind(), TokenKind::Identifier(_))
            && self.look_ahead(1).is_word("in");
        if is_range {
            if direction == Direction::Backward {
                self.error_at_current(
                    ErrorCode::INVALID_DIRECTIVE,
                    "{LOOPBW} iterates arrays only; write a descending range as {LOOP x in b..a}",
                );
                return None;
            }
            let var = self.expect_identifier()?;
            self.advance(); // eat `in`
            let from = self.parse_numvar()?;
            self.expect(&TokenKind::DotDot)?;
            let to = self.parse_numvar()?;
            return Some(LoopHeader::Range { var, from, to });
        }

        let source = self.parse_var_ref()?;
        self.expect_word("as")?;
        let first = self.expect_identifier()?;
        let (key, value) = if self.eat(&TokenKind::FatArrow) {
            (Some(first), self.expect_identifier()?)
        } else {
            (None, first)
        };
        Some(LoopHeader::ForEach { source, key, value })
    }

    // ── Assignment & Include ──────────────────────────────────────────────────

    /// `{SET name = value}`
    fn parse_set(&mut self, open_span: Span) -> Option<Node> {
        self.advance(); // eat `{`
        self.advance(); // eat `SET`
        match self.parse_set_parts() {
            Some((name, value)) => Some(Node::Set(SetNode {
                name,
                value,
                span: open_span.merge(self.previous_span()),
            })),
            None => {
                self.skip_tag();
                None
            }
        }
    }

    /// `{include target}`
    fn parse_include(&mut self, open_span: Span) -> Option<Node> {
        self.advance(); // eat `{`
        self.advance(); // eat `include`
        if !self.options.allow_includes {
            self.error_at(
                ErrorCode::INCLUDE_NOT_ALLOWED,
                "{include} is not available in string templates",
                open_span,
            );
            self.skip_tag();
            return None;
        }
        match self.parse_include_target() {
            Some(target) => Some(Node::Include(IncludeNode {
                target,
                span: open_span.merge(self.previous_span()),
            })),
            None => {
                self.skip_tag();
                None
            }
        }
    }

    fn parse_set_parts(&mut self) -> Option<(Ident, Expr)> {
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_objval()?;
        self.expect_tag_close()?;
        Some((name, value))
    }

    fn parse_include_target(&mut self) -> Option<Expr> {
        let target = self.parse_concat()?;
        self.expect_tag_close()?;
        Some(target)
    }

    // ── Block bookkeeping ─────────────────────────────────────────────────────

    /// Open a block body. Past [`MAX_BLOCK_DEPTH`] the error is reported and
    /// the whole block, nested blocks included, is skipped without descending.
    fn enter_block(&mut self, span: Span) -> bool {
        if self.block_depth == MAX_BLOCK_DEPTH {
            self.error_at(
                ErrorCode::STRUCTURAL_LIMIT_EXCEEDED,
                format!("maximum block nesting depth is {MAX_BLOCK_DEPTH}"),
                span,
            );
            self.skip_block();
            return false;
        }
        self.block_depth += 1;
        true
    }

    /// Skip past the `{ENDIF}`/`{ENDLOOP}` closing the block whose header was
    /// just consumed, counting nested openers iteratively.
    fn skip_block(&mut self) {
        let mut open = 1usize;
        while !self.at_end() {
            if !matches!(self.peek_kind(), TokenKind::TagOpen(_)) {
                self.advance();
                continue;
            }
            let head = self.look_ahead(1);
            let opens = (head.is_word("if") || head.is_word("loop") || head.is_word("loopbw"))
                && self.look_ahead(2) != &TokenKind::TagClose;
            let closes = matches!(
                self.block_terminator(),
                Some(BlockEnd::EndIf | BlockEnd::EndLoop)
            );
            self.skip_tag();
            if opens {
                open += 1;
            } else if closes {
                open -= 1;
                if open == 0 {
                    return;
                }
            }
        }
    }

    fn unclosed(&mut self, raw: &str, span: Span, closer: &str) {
        self.current_tag = raw.to_string();
        self.error_at(
            ErrorCode::UNCLOSED_BLOCK,
            format!("block is never closed; expected {closer}"),
            span,
        );
    }
}

/// Append text, merging with a preceding text node.
fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if let Some(Node::Text(prev)) = nodes.last_mut() {
        prev.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}
