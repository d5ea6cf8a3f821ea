//! Tree-walking evaluator.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cel::ast::{BinaryOp, Comprehension, Expr, UnaryOp};
use crate::cel::error::EvalError;
use crate::cel::library::Library;
use crate::cel::value::{map_get, MapKey, Value, ValueMap};

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

/// Variable bindings visible to an evaluation.
pub trait Activation {
    fn resolve(&self, name: &str) -> Option<Value>;
}

impl Activation for HashMap<String, Value> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Comprehension scope layered over an outer activation.
struct Frame<'a> {
    parent: &'a dyn Activation,
    vars: Vec<(&'a str, Value)>,
}

impl Activation for Frame<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
            .or_else(|| self.parent.resolve(name))
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct Evaluator<'l> {
    library: &'l Library,
}

impl<'l> Evaluator<'l> {
    pub fn new(library: &'l Library) -> Self {
        Evaluator { library }
    }

    pub fn eval(&self, expr: &Expr, act: &dyn Activation) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => act
                .resolve(name)
                .ok_or_else(|| EvalError::UndeclaredReference(name.clone())),
            Expr::Select {
                operand,
                field,
                test_only,
                optional,
            } => {
                let value = self.eval(operand, act)?;
                if *test_only {
                    has_field(&value, field)
                } else {
                    select(value, field, *optional)
                }
            }
            Expr::Index {
                operand,
                index,
                optional,
            } => {
                let value = self.eval(operand, act)?;
                let index = self.eval(index, act)?;
                index_value(value, &index, *optional)
            }
            Expr::Call {
                target,
                function,
                args,
            } => {
                let mut values = Vec::with_capacity(args.len() + 1);
                if let Some(target) = target {
                    values.push(self.eval(target, act)?);
                }
                for arg in args {
                    values.push(self.eval(arg, act)?);
                }
                match self.library.function(function) {
                    Some(f) => f.call(&values),
                    None => Err(EvalError::no_overload(function, &values)),
                }
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.eval(&item.value, act)?;
                    if !item.optional {
                        out.push(value);
                        continue;
                    }
                    match value {
                        Value::Optional(Some(v)) => out.push(*v),
                        Value::Optional(None) => {}
                        other => return Err(EvalError::no_overload("optional list element", &[other])),
                    }
                }
                Ok(Value::list(out))
            }
            Expr::Map(entries) => {
                let mut out = ValueMap::with_capacity(entries.len());
                for entry in entries {
                    let key = MapKey::from_value(&self.eval(&entry.key, act)?)?;
                    let value = self.eval(&entry.value, act)?;
                    let value = if entry.optional {
                        match value {
                            Value::Optional(Some(v)) => *v,
                            Value::Optional(None) => continue,
                            other => {
                                return Err(EvalError::no_overload("optional map entry", &[other]))
                            }
                        }
                    } else {
                        value
                    };
                    let twin = key.numeric_twin();
                    if out.contains_key(&key) || twin.is_some_and(|t| out.contains_key(&t)) {
                        return Err(EvalError::DuplicateKey(key.to_string()));
                    }
                    out.insert(key, value);
                }
                Ok(Value::map(out))
            }
            Expr::Unary(op, operand) => unary(*op, self.eval(operand, act)?),
            Expr::Binary(BinaryOp::And, lhs, rhs) => self.logical(true, lhs, rhs, act),
            Expr::Binary(BinaryOp::Or, lhs, rhs) => self.logical(false, lhs, rhs, act),
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs, act)?;
                let r = self.eval(rhs, act)?;
                binary(*op, l, r)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => match self.eval(condition, act)? {
                Value::Bool(true) => self.eval(then, act),
                Value::Bool(false) => self.eval(otherwise, act),
                other => Err(EvalError::no_overload("_?_:_", &[other])),
            },
            Expr::Comprehension(c) => self.comprehension(c, act),
        }
    }

    /// `&&` / `||` with error absorption: a definitive operand on either side
    /// decides the result even when the other side fails.
    fn logical(
        &self,
        is_and: bool,
        lhs: &Expr,
        rhs: &Expr,
        act: &dyn Activation,
    ) -> Result<Value, EvalError> {
        let decisive = !is_and;
        let l = self.eval(lhs, act);
        if matches!(l, Ok(Value::Bool(b)) if b == decisive) {
            return Ok(Value::Bool(decisive));
        }
        let r = self.eval(rhs, act);
        match (l, r) {
            (_, Ok(Value::Bool(b))) if b == decisive => Ok(Value::Bool(decisive)),
            (Ok(Value::Bool(_)), Ok(Value::Bool(b))) => Ok(Value::Bool(b)),
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(l), Ok(r)) => {
                let symbol = if is_and { BinaryOp::And } else { BinaryOp::Or }.symbol();
                Err(EvalError::no_overload(symbol, &[l, r]))
            }
        }
    }

    fn comprehension(&self, c: &Comprehension, act: &dyn Activation) -> Result<Value, EvalError> {
        let range = self.eval(&c.iter_range, act)?;
        let two_vars = c.iter_var2.is_some();
        let pairs: Vec<(Value, Option<Value>)> = match &range {
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    if two_vars {
                        (Value::Int(i as i64), Some(v.clone()))
                    } else {
                        (v.clone(), None)
                    }
                })
                .collect(),
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| (k.to_value(), two_vars.then(|| v.clone())))
                .collect(),
            other => return Err(EvalError::no_overload("comprehension range", &[other.clone()])),
        };

        let mut accu = self.eval(&c.accu_init, act)?;
        for (first, second) in pairs {
            let mut vars = Vec::with_capacity(3);
            vars.push((c.accu_var.as_str(), accu));
            vars.push((c.iter_var.as_str(), first));
            if let (Some(name), Some(value)) = (c.iter_var2.as_deref(), second) {
                vars.push((name, value));
            }
            let frame = Frame { parent: act, vars };
            let proceed = match self.eval(&c.loop_condition, &frame)? {
                Value::Bool(b) => b,
                other => return Err(EvalError::no_overload("loop condition", &[other])),
            };
            if !proceed {
                let Frame { mut vars, .. } = frame;
                accu = vars.swap_remove(0).1;
                break;
            }
            accu = self.eval(&c.loop_step, &frame)?;
        }

        let frame = Frame {
            parent: act,
            vars: vec![(c.accu_var.as_str(), accu)],
        };
        self.eval(&c.result, &frame)
    }
}

// ---------------------------------------------------------------------------
// Field and index access
// ---------------------------------------------------------------------------

fn has_field(value: &Value, field: &str) -> Result<Value, EvalError> {
    match value {
        Value::Map(m) => Ok(Value::Bool(m.contains_key(&MapKey::from(field)))),
        other => Err(EvalError::UnsupportedSelection(other.type_name())),
    }
}

fn select(value: Value, field: &str, optional: bool) -> Result<Value, EvalError> {
    match value {
        Value::Optional(None) => Ok(Value::optional_none()),
        Value::Optional(Some(inner)) => select(*inner, field, true),
        Value::Map(m) => match m.get(&MapKey::from(field)) {
            Some(v) if optional => Ok(Value::optional_of(v.clone())),
            Some(v) => Ok(v.clone()),
            None if optional => Ok(Value::optional_none()),
            None => Err(EvalError::NoSuchKey(field.to_owned())),
        },
        other => Err(EvalError::UnsupportedSelection(other.type_name())),
    }
}

fn list_index(index: &Value) -> Option<i64> {
    match index {
        Value::Int(i) => Some(*i),
        Value::Uint(u) => i64::try_from(*u).ok(),
        Value::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
        _ => None,
    }
}

fn key_display(key: &Value) -> String {
    match key {
        Value::String(s) => s.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Uint(u) => u.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.type_name().to_owned(),
    }
}

fn index_value(value: Value, index: &Value, optional: bool) -> Result<Value, EvalError> {
    let wrap = |v: &Value| {
        if optional {
            Value::optional_of(v.clone())
        } else {
            v.clone()
        }
    };
    match value {
        Value::Optional(None) => Ok(Value::optional_none()),
        Value::Optional(Some(inner)) => index_value(*inner, index, true),
        Value::List(items) => {
            let Some(i) = list_index(index) else {
                return Err(EvalError::no_overload("_[_]", &[Value::List(items), index.clone()]));
            };
            match usize::try_from(i).ok().and_then(|i| items.get(i)) {
                Some(v) => Ok(wrap(v)),
                None if optional => Ok(Value::optional_none()),
                None => Err(EvalError::IndexOutOfRange {
                    index: i,
                    size: items.len(),
                }),
            }
        }
        Value::Map(m) => match map_get(&m, index) {
            Some(v) => Ok(wrap(v)),
            None if optional => Ok(Value::optional_none()),
            None => Err(EvalError::NoSuchKey(key_display(index))),
        },
        other => Err(EvalError::no_overload("_[_]", &[other, index.clone()])),
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or(EvalError::Overflow("negation")),
        (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
        (UnaryOp::Not, other) => Err(EvalError::no_overload("!_", &[other])),
        (UnaryOp::Neg, other) => Err(EvalError::no_overload("-_", &[other])),
    }
}

pub(crate) fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => add(l, r),
        BinaryOp::Sub => arithmetic(op, l, r, i64::checked_sub, u64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, l, r, i64::checked_mul, u64::checked_mul, |a, b| a * b),
        BinaryOp::Div => match (&l, &r) {
            (Value::Int(_), Value::Int(0)) | (Value::Uint(_), Value::Uint(0)) => {
                Err(EvalError::DivisionByZero)
            }
            _ => arithmetic(op, l, r, i64::checked_div, u64::checked_div, |a, b| a / b),
        },
        BinaryOp::Rem => match (l, r) {
            (Value::Int(_), Value::Int(0)) | (Value::Uint(_), Value::Uint(0)) => {
                Err(EvalError::ModulusByZero)
            }
            (Value::Int(a), Value::Int(b)) => a
                .checked_rem(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow("modulus")),
            (Value::Uint(a), Value::Uint(b)) => Ok(Value::Uint(a % b)),
            (l, r) => Err(EvalError::no_overload(op.symbol(), &[l, r])),
        },
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::Ne => Ok(Value::Bool(l != r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, l, r),
        BinaryOp::In => match r {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|v| *v == l))),
            Value::Map(m) => Ok(Value::Bool(map_get(&m, &l).is_some())),
            r => Err(EvalError::no_overload(op.symbol(), &[l, r])),
        },
        BinaryOp::And | BinaryOp::Or => match (l, r) {
            (Value::Bool(a), Value::Bool(b)) if op == BinaryOp::And => Ok(Value::Bool(a && b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
            (l, r) => Err(EvalError::no_overload(op.symbol(), &[l, r])),
        },
    }
}

fn add(l: Value, r: Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(&a);
            s.push_str(&b);
            Ok(Value::string(s))
        }
        (Value::Bytes(a), Value::Bytes(b)) => {
            let mut out = Vec::with_capacity(a.len() + b.len());
            out.extend_from_slice(&a);
            out.extend_from_slice(&b);
            Ok(Value::bytes(out))
        }
        (Value::List(a), Value::List(b)) => {
            if b.is_empty() {
                return Ok(Value::List(a));
            }
            if a.is_empty() {
                return Ok(Value::List(b));
            }
            let mut a = a;
            Arc::make_mut(&mut a).extend(b.iter().cloned());
            Ok(Value::List(a))
        }
        (l, r) => arithmetic(BinaryOp::Add, l, r, i64::checked_add, u64::checked_add, |a, b| a + b),
    }
}

fn arithmetic(
    op: BinaryOp,
    l: Value,
    r: Value,
    int: fn(i64, i64) -> Option<i64>,
    uint: fn(u64, u64) -> Option<u64>,
    double: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    let overflow = || EvalError::Overflow(op_name(op));
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int(a, b).map(Value::Int).ok_or_else(overflow),
        (Value::Uint(a), Value::Uint(b)) => uint(a, b).map(Value::Uint).ok_or_else(overflow),
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(double(a, b))),
        (l, r) => Err(EvalError::no_overload(op.symbol(), &[l, r])),
    }
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "addition",
        BinaryOp::Sub => "subtraction",
        BinaryOp::Mul => "multiplication",
        BinaryOp::Div => "division",
        _ => "arithmetic",
    }
}

fn compare(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    let Some(ordering) = l.compare(&r) else {
        let numeric = |v: &Value| matches!(v, Value::Int(_) | Value::Uint(_) | Value::Double(_));
        // NaN is unordered against every number.
        if numeric(&l) && numeric(&r) {
            return Ok(Value::Bool(false));
        }
        return Err(EvalError::no_overload(op.symbol(), &[l, r]));
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
