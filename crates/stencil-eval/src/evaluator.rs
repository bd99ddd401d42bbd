//! Tree-walking evaluator: renders template nodes into text.

use crate::env::Environment;
use crate::error::{RenderError, RenderResult};
use crate::handler::{Handler, TemplateId};
use stencil_types::ast::*;
use stencil_types::{Bindings, Value};

/// Where `SET` writes and where template-level variables are read from.
pub(crate) enum Frame {
    /// A file template; its binding table lives in the handler.
    Template(TemplateId),
    /// A string template rendered with a private copy of its bindings.
    Inline(Bindings),
}

/// Renders one template invocation. Includes run in a fresh evaluator with
/// their own frame, created by the handler.
pub(crate) struct Evaluator<'h> {
    handler: &'h mut Handler,
    frame: Frame,
    /// Template name used in error messages.
    template: String,
    env: Environment,
}

impl<'h> Evaluator<'h> {
    pub(crate) fn new(handler: &'h mut Handler, frame: Frame, template: impl Into<String>) -> Self {
        Self {
            handler,
            frame,
            template: template.into(),
            env: Environment::new(),
        }
    }

    /// Render a node list to a string.
    pub(crate) fn render(mut self, nodes: &[Node]) -> RenderResult<String> {
        let mut out = String::new();
        self.render_nodes(nodes, &mut out)?;
        Ok(out)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Nodes
    // ══════════════════════════════════════════════════════════════════════

    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> RenderResult<()> {
        for node in nodes {
            self.render_node(node, out)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node, out: &mut String) -> RenderResult<()> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => {
                let value = self.eval_expr(expr)?;
                out.push_str(&value.display());
            }
            Node::If(if_node) => {
                if self.eval_condition(&if_node.condition)? {
                    self.render_nodes(&if_node.then_body, out)?;
                } else if let Some(else_body) = &if_node.else_body {
                    self.render_nodes(else_body, out)?;
                }
            }
            Node::ForEach(loop_node) => self.render_for_each(loop_node, out)?,
            Node::Range(range) => self.render_range(range, out)?,
            Node::Set(set) => {
                let value = self.eval_expr(&set.value)?;
                self.assign(&set.name.name, value);
            }
            Node::Include(include) => {
                let path = self.eval_expr(&include.target)?.display();
                tracing::debug!(from = %self.template, include = %path, "entering include");
                let rendered = self.handler.execute(TemplateId::new(path, 0))?;
                out.push_str(&rendered);
            }
        }
        Ok(())
    }

    // ── Loops ─────────────────────────────────────────────────────────────

    fn render_for_each(&mut self, node: &ForEachNode, out: &mut String) -> RenderResult<()> {
        let mut entries: Vec<(String, Value)> = match self.resolve(&node.source) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => return Ok(()),
        };
        let len = entries.len();
        if node.direction == Direction::Backward {
            entries.reverse();
        }

        self.env.push_scope(Some(node.source.path()));
        let result = self.for_each_body(node, entries, len, out);
        self.env.pop_scope();
        result
    }

    fn for_each_body(
        &mut self,
        node: &ForEachNode,
        entries: Vec<(String, Value)>,
        len: usize,
        out: &mut String,
    ) -> RenderResult<()> {
        for (i, (key, value)) in entries.into_iter().enumerate() {
            // The counter is the element's position, so it runs downwards
            // in a backward loop.
            let position = match node.direction {
                Direction::Forward => i,
                Direction::Backward => len - 1 - i,
            };
            self.env.set_counter(position);
            if let Some(key_var) = &node.key {
                self.env.define(&key_var.name, Value::String(key));
            }
            self.env.define(&node.value.name, value);
            self.render_nodes(&node.body, out)?;
        }
        Ok(())
    }

    fn render_range(&mut self, node: &RangeNode, out: &mut String) -> RenderResult<()> {
        let from = self.eval_expr(&node.from)?.to_number().trunc() as i64;
        let to = self.eval_expr(&node.to)?.to_number().trunc() as i64;

        self.env.push_scope(None);
        let result = self.range_body(node, from, to, out);
        self.env.pop_scope();
        result
    }

    fn range_body(&mut self, node: &RangeNode, from: i64, to: i64, out: &mut String) -> RenderResult<()> {
        let steps: Box<dyn Iterator<Item = i64>> = if from <= to {
            Box::new(from..=to)
        } else {
            Box::new((to..=from).rev())
        };
        for n in steps {
            self.env.define(&node.var.name, Value::from(n));
            self.render_nodes(&node.body, out)?;
        }
        Ok(())
    }

    // ── Assignment ────────────────────────────────────────────────────────

    /// `SET` writes to the frame's table. A loop variable of the same name is
    /// updated too, since it would otherwise shadow the new value.
    fn assign(&mut self, name: &str, value: Value) {
        self.env.set(name, value.clone());
        match &mut self.frame {
            Frame::Template(id) => self.handler.frame_bindings_mut(id).insert(name.to_string(), value),
            Frame::Inline(bindings) => bindings.insert(name.to_string(), value),
        };
    }

    // ══════════════════════════════════════════════════════════════════════
    // Conditions
    // ══════════════════════════════════════════════════════════════════════

    fn eval_condition(&mut self, condition: &Condition) -> RenderResult<bool> {
        match condition {
            Condition::And(operands) => {
                for operand in operands {
                    if !self.eval_condition(operand)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(operands) => {
                for operand in operands {
                    if self.eval_condition(operand)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Compare { left, right, .. } => {
                let Some(lhs) = self.eval_operand(left)? else {
                    return Ok(false);
                };
                let Some((op, right)) = right else {
                    return Ok(lhs.is_truthy());
                };
                let Some(rhs) = self.eval_operand(right)? else {
                    return Ok(false);
                };
                Ok(compare(*op, &lhs, &rhs))
            }
        }
    }

    /// Evaluate a comparison operand. Variable references must exist:
    /// `None` means an unbound or null variable, which makes the whole
    /// comparison false whatever the operator.
    fn eval_operand(&mut self, expr: &Expr) -> RenderResult<Option<Value>> {
        let value = self.eval_expr(expr)?;
        if expr.is_variable_ref() && value.is_null() {
            return Ok(None);
        }
        Ok(Some(value))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> RenderResult<Value> {
        match &expr.kind {
            ExprKind::NumberLit(n) => Ok(Value::Number(*n)),
            ExprKind::StringLit(s) => Ok(Value::String(s.clone())),
            ExprKind::Var(var) => Ok(self.resolve(var).cloned().unwrap_or_default()),
            ExprKind::Property { target, prop } => Ok(self.eval_property(target, *prop)),
            ExprKind::Binary { left, op, right } => {
                let lhs = self.eval_expr(left)?.to_number();
                let rhs = self.eval_expr(right)?.to_number();
                self.eval_math(lhs, *op, rhs)
            }
            ExprKind::Concat(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&self.eval_expr(part)?.display());
                }
                Ok(Value::String(text))
            }
            ExprKind::MethodCall {
                object,
                method,
                args,
            } => self.eval_method_call(&object.name, &method.name, args),
        }
    }

    fn eval_property(&self, target: &VarRef, prop: PseudoProp) -> Value {
        if prop == PseudoProp::Current {
            return self
                .env
                .current(&target.path())
                .map_or(Value::Null, Value::from);
        }
        let len = match self.resolve(target) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::String(s)) => s.chars().count(),
            _ => return Value::Null,
        };
        match prop {
            PseudoProp::Length => Value::from(len),
            _ => Value::Number(len as f64 - 1.0),
        }
    }

    fn eval_math(&self, lhs: f64, op: MathOp, rhs: f64) -> RenderResult<Value> {
        let result = match op {
            MathOp::Add => lhs + rhs,
            MathOp::Sub => lhs - rhs,
            MathOp::Mul => lhs * rhs,
            MathOp::Div => {
                if rhs == 0.0 {
                    return Err(self.division_by_zero());
                }
                lhs / rhs
            }
            MathOp::Mod => {
                let (a, b) = (lhs.trunc() as i64, rhs.trunc() as i64);
                if b == 0 {
                    return Err(self.division_by_zero());
                }
                a.wrapping_rem(b) as f64
            }
        };
        Ok(Value::Number(result))
    }

    fn division_by_zero(&self) -> RenderError {
        RenderError::DivisionByZero {
            template: self.template.clone(),
        }
    }

    fn eval_method_call(&mut self, object: &str, method: &str, args: &[Expr]) -> RenderResult<Value> {
        if !self.handler.is_method_allowed(object, method) {
            return Err(RenderError::MethodNotAllowed {
                object: object.to_string(),
                method: method.to_string(),
                template: self.template.clone(),
            });
        }
        let target = match self.lookup(object) {
            Some(Value::Object(target)) => target.clone(),
            _ => return Ok(Value::String(String::new())),
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg)?);
        }
        target
            .call_method(method, &values)
            .map_err(|message| RenderError::MethodFailed {
                object: object.to_string(),
                method: method.to_string(),
                message,
            })
    }

    // ── Variables ─────────────────────────────────────────────────────────

    /// Loop scopes, then the frame's table, then globals.
    fn lookup(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.env.get(name) {
            return Some(value);
        }
        let frame_value = match &self.frame {
            Frame::Template(id) => self.handler.frame_bindings(id).and_then(|b| b.get(name)),
            Frame::Inline(bindings) => bindings.get(name),
        };
        frame_value.or_else(|| self.handler.global(name))
    }

    /// Follow `name:key1:key2:key3` down through nested arrays.
    fn resolve(&self, var: &VarRef) -> Option<&Value> {
        var.keys
            .iter()
            .try_fold(self.lookup(&var.name)?, |value, key| value.get(key))
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CmpOp::Eq => lhs.loose_eq(rhs),
        CmpOp::NotEq => !lhs.loose_eq(rhs),
        CmpOp::StrictEq => lhs.strict_eq(rhs),
        CmpOp::StrictNotEq => !lhs.strict_eq(rhs),
        CmpOp::Less => lhs.loose_cmp(rhs) == Some(Less),
        CmpOp::Greater => lhs.loose_cmp(rhs) == Some(Greater),
        CmpOp::LessEq => matches!(lhs.loose_cmp(rhs), Some(Less | Equal)),
        CmpOp::GreaterEq => matches!(lhs.loose_cmp(rhs), Some(Greater | Equal)),
    }
}
