//! AST node types for Stencil templates.
//!
//! A compiled unit is a serialized [`Template`], so every node derives
//! serde. Every directive carries a [`Span`] for error reporting.

use crate::Span;
use serde::{Deserialize, Serialize};

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A parsed template: literal text interleaved with directives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub nodes: Vec<Node>,
}

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Nodes
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Literal template text, emitted unchanged.
    Text(String),
    /// `{expr}` or `{obj.method(args)}`
    Output(Expr),
    If(IfNode),
    ForEach(ForEachNode),
    Range(RangeNode),
    Set(SetNode),
    Include(IncludeNode),
}

/// `{IF cond} ... [{ELSE} ...] {ENDIF}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfNode {
    pub condition: Condition,
    pub then_body: Vec<Node>,
    pub else_body: Option<Vec<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// `LOOP`
    Forward,
    /// `LOOPBW`
    Backward,
}

/// `{LOOP arr as [key =>] value} ... {ENDLOOP}` and its `LOOPBW` twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForEachNode {
    pub direction: Direction,
    pub source: VarRef,
    pub key: Option<Ident>,
    pub value: Ident,
    pub body: Vec<Node>,
    pub span: Span,
}

/// `{LOOP x in a..b} ... {ENDLOOP}`: inclusive, step ±1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeNode {
    pub var: Ident,
    pub from: Expr,
    pub to: Expr,
    pub body: Vec<Node>,
    pub span: Span,
}

/// `{SET name = value}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetNode {
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

/// `{include target}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeNode {
    pub target: Expr,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// `name`, `name:key`, `name:key1:key2:key3`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    pub name: String,
    pub keys: Vec<String>,
    pub span: Span,
}

impl VarRef {
    /// Maximum number of `:key` segments.
    pub const MAX_KEYS: usize = 3;

    /// The reference as written, e.g. `rows:0:title`. Loop counters are keyed by it.
    pub fn path(&self) -> String {
        let mut path = self.name.clone();
        for key in &self.keys {
            path.push(':');
            path.push_str(key);
        }
        path
    }
}

/// Computed array attributes; never stored as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PseudoProp {
    Length,
    Last,
    Current,
}

impl PseudoProp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "length" => Some(Self::Length),
            "last" => Some(Self::Last),
            "current" => Some(Self::Current),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Variable operands must exist before a comparison looks at their value.
    /// Literals, arithmetic and call results are never guarded.
    pub fn is_variable_ref(&self) -> bool {
        matches!(self.kind, ExprKind::Var(_) | ExprKind::Property { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    NumberLit(f64),
    StringLit(String),
    Var(VarRef),
    /// `arr.length`, `arr.last`, `arr.current`
    Property { target: VarRef, prop: PseudoProp },
    /// A single arithmetic operator between two numeric operands.
    Binary {
        left: Box<Expr>,
        op: MathOp,
        right: Box<Expr>,
    },
    /// `a ~ b ~ c`
    Concat(Vec<Expr>),
    /// `object.method(args)`
    MethodCall {
        object: Ident,
        method: Ident,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `===`
    StrictEq,
    /// `!=`
    NotEq,
    /// `!==`
    StrictNotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
}

// ══════════════════════════════════════════════════════════════════════════════
// Conditions
// ══════════════════════════════════════════════════════════════════════════════

/// `&&` binds tighter than `||`; parentheses group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// A bare value (truthiness test) or a single comparison.
    Compare {
        left: Expr,
        right: Option<(CmpOp, Expr)>,
        span: Span,
    },
    /// Two or more operands, all of which must hold.
    And(Vec<Condition>),
    /// Two or more operands, any of which may hold.
    Or(Vec<Condition>),
}
