//! Expression and condition parsing.
//!
//! ```text
//! condition := or_cond
//! or_cond   := and_cond ('||' and_cond)*
//! and_cond  := atom ('&&' atom)*
//! atom      := '(' or_cond ')' | objval (cmpop objval)?
//! objval    := ident '.' ident '(' args ')' | concat
//! concat    := value ('~' value)*
//! value     := string | numvar (mathop numvar)?
//! numvar    := '-'? number | ident (':' key){0,3} ('.' prop)?
//! ```

use stencil_lexer::token::TokenKind;
use stencil_types::ast::*;
use stencil_types::{format_number, ErrorCode};

use crate::parser::{Parser, MAX_GROUP_DEPTH};

/// A single operand stands alone; several are combined with `combine`.
fn join(mut operands: Vec<Condition>, combine: fn(Vec<Condition>) -> Condition) -> Condition {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        combine(operands)
    }
}

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Conditions
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_condition(&mut self) -> Option<Condition> {
        self.parse_or_condition()
    }

    fn parse_or_condition(&mut self) -> Option<Condition> {
        let mut operands = vec![self.parse_and_condition()?];
        while self.eat(&TokenKind::OrOr) {
            operands.push(self.parse_and_condition()?);
        }
        Some(join(operands, Condition::Or))
    }

    fn parse_and_condition(&mut self) -> Option<Condition> {
        let mut operands = vec![self.parse_condition_atom()?];
        while self.eat(&TokenKind::AndAnd) {
            operands.push(self.parse_condition_atom()?);
        }
        Some(join(operands, Condition::And))
    }

    fn parse_condition_atom(&mut self) -> Option<Condition> {
        if self.check_exact(&TokenKind::LParen) {
            if self.group_depth == MAX_GROUP_DEPTH {
                self.error_at_current(
                    ErrorCode::STRUCTURAL_LIMIT_EXCEEDED,
                    format!("maximum parenthesis nesting depth is {MAX_GROUP_DEPTH}"),
                );
                return None;
            }
            self.advance();
            self.group_depth += 1;
            let inner = self
                .parse_or_condition()
                .and_then(|inner| self.expect(&TokenKind::RParen).map(|_| inner));
            self.group_depth -= 1;
            return inner;
        }
        let left = self.parse_objval()?;
        let Some(op) = self.match_comparison_op() else {
            let span = left.span;
            return Some(Condition::Compare {
                left,
                right: None,
                span,
            });
        };
        self.advance(); // consume operator
        let right = self.parse_objval()?;
        let span = left.span.merge(right.span);
        Some(Condition::Compare {
            left,
            right: Some((op, right)),
            span,
        })
    }

    fn match_comparison_op(&self) -> Option<CmpOp> {
        match self.peek_kind() {
            TokenKind::EqEq => Some(CmpOp::Eq),
            TokenKind::EqEqEq => Some(CmpOp::StrictEq),
            TokenKind::BangEq => Some(CmpOp::NotEq),
            TokenKind::BangEqEq => Some(CmpOp::StrictNotEq),
            TokenKind::Less => Some(CmpOp::Less),
            TokenKind::Greater => Some(CmpOp::Greater),
            TokenKind::LessEq => Some(CmpOp::LessEq),
            TokenKind::GreaterEq => Some(CmpOp::GreaterEq),
            _ => None,
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Values
    // ══════════════════════════════════════════════════════════════════════════

    /// A method call or a concatenation.
    pub(crate) fn parse_objval(&mut self) -> Option<Expr> {
        let is_call = matches!(self.peek_kind(), TokenKind::Identifier(_))
            && self.look_ahead(1) == &TokenKind::Dot
            && matches!(self.look_ahead(2), TokenKind::Identifier(_))
            && self.look_ahead(3) == &TokenKind::LParen;
        if is_call {
            self.parse_method_call()
        } else {
            self.parse_concat()
        }
    }

    /// `object.method(arg, ...)`
    fn parse_method_call(&mut self) -> Option<Expr> {
        let object = self.expect_identifier()?;
        self.expect(&TokenKind::Dot)?;
        let method = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check_exact(&TokenKind::RParen) {
            loop {
                args.push(self.parse_concat()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        let span = object.span.merge(self.previous_span());
        Some(Expr::new(
            ExprKind::MethodCall {
                object,
                method,
                args,
            },
            span,
        ))
    }

    /// `value ('~' value)*`
    pub(crate) fn parse_concat(&mut self) -> Option<Expr> {
        let first = self.parse_value()?;
        if !self.check_exact(&TokenKind::Tilde) {
            return Some(first);
        }
        let mut span = first.span;
        let mut parts = vec![first];
        while self.eat(&TokenKind::Tilde) {
            let part = self.parse_value()?;
            span = span.merge(part.span);
            parts.push(part);
        }
        Some(Expr::new(ExprKind::Concat(parts), span))
    }

    /// A string literal, or a numeric operand with at most one operator.
    fn parse_value(&mut self) -> Option<Expr> {
        if let TokenKind::StringLiteral(s) = self.peek_kind().clone() {
            let span = self.advance().span;
            return Some(Expr::new(ExprKind::StringLit(s), span));
        }
        let left = self.parse_numvar()?;
        let op = match self.peek_kind() {
            TokenKind::Plus => MathOp::Add,
            TokenKind::Minus => MathOp::Sub,
            TokenKind::Star => MathOp::Mul,
            TokenKind::Slash => MathOp::Div,
            TokenKind::Percent => MathOp::Mod,
            _ => return Some(left),
        };
        self.advance();
        let right = self.parse_numvar()?;
        let span = left.span.merge(right.span);
        Some(Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        ))
    }

    /// A number (optionally negative) or a variable property.
    pub(crate) fn parse_numvar(&mut self) -> Option<Expr> {
        let start = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Minus => {
                if let TokenKind::NumberLit(n) = self.look_ahead(1).clone() {
                    self.advance();
                    let end = self.advance().span;
                    return Some(Expr::new(ExprKind::NumberLit(-n), start.merge(end)));
                }
                self.error_at_current(
                    ErrorCode::EXPECTED_VALUE,
                    "expected a number after '-'",
                );
                None
            }
            TokenKind::NumberLit(n) => {
                self.advance();
                Some(Expr::new(ExprKind::NumberLit(n), start))
            }
            TokenKind::Identifier(_) => self.parse_property(),
            other => {
                self.error_at_current(
                    ErrorCode::EXPECTED_VALUE,
                    format!("expected a variable, number or string, got '{other}'"),
                );
                None
            }
        }
    }

    /// `arrayref ('.' ('length' | 'last' | 'current'))?`
    fn parse_property(&mut self) -> Option<Expr> {
        let target = self.parse_var_ref()?;
        let has_property = self.check_exact(&TokenKind::Dot)
            && matches!(self.look_ahead(1), TokenKind::Identifier(_));
        if !has_property {
            let span = target.span;
            return Some(Expr::new(ExprKind::Var(target), span));
        }
        self.advance(); // eat `.`
        let name = self.expect_identifier()?;
        let Some(prop) = PseudoProp::from_name(&name.name) else {
            self.error_at(
                ErrorCode::UNKNOWN_PROPERTY,
                format!(
                    "unknown property '.{}'; expected length, last or current",
                    name.name
                ),
                name.span,
            );
            return None;
        };
        let span = target.span.merge(name.span);
        Some(Expr::new(ExprKind::Property { target, prop }, span))
    }

    /// `ident (':' (ident | number)){0,3}`
    pub(crate) fn parse_var_ref(&mut self) -> Option<VarRef> {
        let name = self.expect_identifier()?;
        let mut span = name.span;
        let mut keys = Vec::new();
        while self.eat(&TokenKind::Colon) {
            let key = match self.peek_kind().clone() {
                TokenKind::Identifier(key) => key,
                TokenKind::NumberLit(n) => format_number(n),
                TokenKind::Minus => match self.look_ahead(1).clone() {
                    TokenKind::NumberLit(n) => {
                        self.advance();
                        format_number(-n)
                    }
                    _ => {
                        self.error_at_current(ErrorCode::EXPECTED_VALUE, "expected array key after ':'");
                        return None;
                    }
                },
                other => {
                    self.error_at_current(
                        ErrorCode::EXPECTED_VALUE,
                        format!("expected array key after ':', got '{other}'"),
                    );
                    return None;
                }
            };
            span = span.merge(self.advance().span);
            keys.push(key);
            if keys.len() == VarRef::MAX_KEYS + 1 {
                self.error_at(
                    ErrorCode::ARRAY_DEPTH_EXCEEDED,
                    format!(
                        "'{}' has more than {} array keys",
                        name.name,
                        VarRef::MAX_KEYS
                    ),
                    span,
                );
            }
        }
        Some(VarRef {
            name: name.name,
            keys,
            span,
        })
    }
}
