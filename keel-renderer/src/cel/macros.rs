//! Macro expansion and the standard comprehension macros.
//!
//! Expansion runs once, bottom-up, after parsing: arguments are expanded
//! before the call that holds them, and a macro's own output is not expanded
//! again.

use crate::cel::ast::{BinaryOp, Comprehension, Expr, UnaryOp, ACCUMULATOR};
use crate::cel::error::CompileError;
use crate::cel::library::{Arity, Library, Macro};
use crate::cel::value::{Value, ValueMap};

/// Internal function: true unless its argument is the boolean `false`.
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";
/// Internal function: `@map_insert(m, k, v)` or `@map_insert(m, entries)`.
pub const MAP_INSERT: &str = "@map_insert";

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

pub fn expand(expr: Expr, library: &Library) -> Result<Expr, CompileError> {
    Ok(match expr {
        Expr::Literal(_) | Expr::Ident(_) => expr,
        Expr::Select {
            operand,
            field,
            test_only,
            optional,
        } => Expr::Select {
            operand: Box::new(expand(*operand, library)?),
            field,
            test_only,
            optional,
        },
        Expr::Index {
            operand,
            index,
            optional,
        } => Expr::Index {
            operand: Box::new(expand(*operand, library)?),
            index: Box::new(expand(*index, library)?),
            optional,
        },
        Expr::Call {
            target,
            function,
            args,
        } => {
            let target = target.map(|t| expand(*t, library)).transpose()?;
            let args = args
                .into_iter()
                .map(|a| expand(a, library))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(m) = library.find_macro(&function, target.is_some(), args.len()) {
                if let Some(expanded) = m.expand(target.as_ref(), &args)? {
                    return Ok(expanded);
                }
            }
            Expr::Call {
                target: target.map(Box::new),
                function,
                args,
            }
        }
        Expr::List(mut items) => {
            for item in &mut items {
                item.value = expand(std::mem::replace(&mut item.value, Expr::Literal(Value::Null)), library)?;
            }
            Expr::List(items)
        }
        Expr::Map(mut entries) => {
            for entry in &mut entries {
                entry.key = expand(std::mem::replace(&mut entry.key, Expr::Literal(Value::Null)), library)?;
                entry.value = expand(std::mem::replace(&mut entry.value, Expr::Literal(Value::Null)), library)?;
            }
            Expr::Map(entries)
        }
        Expr::Unary(op, operand) => Expr::Unary(op, Box::new(expand(*operand, library)?)),
        Expr::Binary(op, lhs, rhs) => Expr::binary(op, expand(*lhs, library)?, expand(*rhs, library)?),
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => Expr::conditional(
            expand(*condition, library)?,
            expand(*then, library)?,
            expand(*otherwise, library)?,
        ),
        Expr::Comprehension(c) => Expr::Comprehension(c),
    })
}

// ---------------------------------------------------------------------------
// Standard macros
// ---------------------------------------------------------------------------

/// Register `has`, the list/map comprehension macros and the two-variable
/// `transform*` macros.
pub fn register_standard(library: &mut Library) {
    library.add_macro(Macro::global("has", Arity::Exact(1), |_, args| has(args)));

    for name in ["all", "exists", "exists_one", "existsOne"] {
        library.add_macro(Macro::receiver(name, Arity::Exact(2), move |t, a| {
            quantifier(name, t, a)
        }));
        library.add_macro(Macro::receiver(name, Arity::Exact(3), move |t, a| {
            quantifier(name, t, a)
        }));
    }
    library.add_macro(Macro::receiver("map", Arity::Exact(2), map));
    library.add_macro(Macro::receiver("map", Arity::Exact(3), map));
    library.add_macro(Macro::receiver("filter", Arity::Exact(2), filter));
    for arity in [3, 4] {
        library.add_macro(Macro::receiver("transformList", Arity::Exact(arity), |t, a| {
            transform("transformList", t, a)
        }));
        library.add_macro(Macro::receiver("transformMap", Arity::Exact(arity), |t, a| {
            transform("transformMap", t, a)
        }));
        library.add_macro(Macro::receiver("transformMapEntry", Arity::Exact(arity), |t, a| {
            transform("transformMapEntry", t, a)
        }));
    }
}

fn accu() -> Expr {
    Expr::ident(ACCUMULATOR)
}

fn literal(value: Value) -> Expr {
    Expr::Literal(value)
}

fn var_name(macro_name: &str, expr: &Expr) -> Result<String, CompileError> {
    match expr {
        Expr::Ident(name) if name != ACCUMULATOR => Ok(name.clone()),
        _ => Err(CompileError::Macro(format!(
            "{macro_name}() variable name must be a simple identifier"
        ))),
    }
}

fn target_of(macro_name: &str, target: Option<&Expr>) -> Result<Expr, CompileError> {
    target
        .cloned()
        .ok_or_else(|| CompileError::Macro(format!("{macro_name}() requires a receiver")))
}

struct Fold {
    iter_var: String,
    iter_var2: Option<String>,
    range: Expr,
    init: Expr,
    condition: Expr,
    step: Expr,
    result: Expr,
}

impl Fold {
    fn build(self) -> Expr {
        Expr::Comprehension(Box::new(Comprehension {
            iter_var: self.iter_var,
            iter_var2: self.iter_var2,
            iter_range: self.range,
            accu_var: ACCUMULATOR.to_owned(),
            accu_init: self.init,
            loop_condition: self.condition,
            loop_step: self.step,
            result: self.result,
        }))
    }
}

fn has(args: &[Expr]) -> Result<Option<Expr>, CompileError> {
    match args.first() {
        Some(Expr::Select {
            operand,
            field,
            test_only: false,
            optional: false,
        }) => Ok(Some(Expr::Select {
            operand: operand.clone(),
            field: field.clone(),
            test_only: true,
            optional: false,
        })),
        _ => Err(CompileError::Macro(
            "invalid argument to has() macro".to_owned(),
        )),
    }
}

/// `all`, `exists`, `exists_one` in their one- and two-variable forms.
fn quantifier(name: &str, target: Option<&Expr>, args: &[Expr]) -> Result<Option<Expr>, CompileError> {
    let range = target_of(name, target)?;
    let (iter_var, iter_var2, predicate) = match args {
        [v, p] => (var_name(name, v)?, None, p.clone()),
        [k, v, p] => (var_name(name, k)?, Some(var_name(name, v)?), p.clone()),
        _ => return Ok(None),
    };
    let fold = match name {
        "all" => Fold {
            iter_var,
            iter_var2,
            range,
            init: literal(Value::Bool(true)),
            condition: Expr::call(NOT_STRICTLY_FALSE, vec![accu()]),
            step: Expr::binary(BinaryOp::And, accu(), predicate),
            result: accu(),
        },
        "exists" => Fold {
            iter_var,
            iter_var2,
            range,
            init: literal(Value::Bool(false)),
            condition: Expr::call(
                NOT_STRICTLY_FALSE,
                vec![Expr::Unary(UnaryOp::Not, Box::new(accu()))],
            ),
            step: Expr::binary(BinaryOp::Or, accu(), predicate),
            result: accu(),
        },
        _ => Fold {
            iter_var,
            iter_var2,
            range,
            init: literal(Value::Int(0)),
            condition: literal(Value::Bool(true)),
            step: Expr::conditional(
                predicate,
                Expr::binary(BinaryOp::Add, accu(), literal(Value::Int(1))),
                accu(),
            ),
            result: Expr::binary(BinaryOp::Eq, accu(), literal(Value::Int(1))),
        },
    };
    Ok(Some(fold.build()))
}

fn append(value: Expr) -> Expr {
    Expr::binary(BinaryOp::Add, accu(), Expr::list(vec![value]))
}

fn map(target: Option<&Expr>, args: &[Expr]) -> Result<Option<Expr>, CompileError> {
    let range = target_of("map", target)?;
    let (iter_var, step) = match args {
        [v, t] => (var_name("map", v)?, append(t.clone())),
        [v, p, t] => (
            var_name("map", v)?,
            Expr::conditional(p.clone(), append(t.clone()), accu()),
        ),
        _ => return Ok(None),
    };
    Ok(Some(
        Fold {
            iter_var,
            iter_var2: None,
            range,
            init: Expr::List(Vec::new()),
            condition: literal(Value::Bool(true)),
            step,
            result: accu(),
        }
        .build(),
    ))
}

fn filter(target: Option<&Expr>, args: &[Expr]) -> Result<Option<Expr>, CompileError> {
    let range = target_of("filter", target)?;
    let [v, p] = args else { return Ok(None) };
    let iter_var = var_name("filter", v)?;
    let step = Expr::conditional(p.clone(), append(Expr::ident(iter_var.clone())), accu());
    Ok(Some(
        Fold {
            iter_var,
            iter_var2: None,
            range,
            init: Expr::List(Vec::new()),
            condition: literal(Value::Bool(true)),
            step,
            result: accu(),
        }
        .build(),
    ))
}

/// `transformList(i, v, [filter,] t)`, `transformMap(k, v, [filter,] t)` and
/// `transformMapEntry(k, v, [filter,] {key: value})`.
fn transform(name: &str, target: Option<&Expr>, args: &[Expr]) -> Result<Option<Expr>, CompileError> {
    let range = target_of(name, target)?;
    let (first, second, filter, body) = match args {
        [k, v, t] => (k, v, None, t.clone()),
        [k, v, p, t] => (k, v, Some(p.clone()), t.clone()),
        _ => return Ok(None),
    };
    let iter_var = var_name(name, first)?;
    let iter_var2 = var_name(name, second)?;

    let (init, step) = match name {
        "transformList" => (Expr::List(Vec::new()), append(body)),
        "transformMap" => (
            Expr::Map(Vec::new()),
            Expr::call(MAP_INSERT, vec![accu(), Expr::ident(iter_var.clone()), body]),
        ),
        _ => (Expr::Map(Vec::new()), Expr::call(MAP_INSERT, vec![accu(), body])),
    };
    let step = match filter {
        Some(p) => Expr::conditional(p, step, accu()),
        None => step,
    };
    Ok(Some(
        Fold {
            iter_var,
            iter_var2: Some(iter_var2),
            range,
            init,
            condition: literal(Value::Bool(true)),
            step,
            result: accu(),
        }
        .build(),
    ))
}

/// Shared by `@map_insert` and callers that need the same duplicate-key rule.
pub(crate) fn insert_entries(
    target: &mut ValueMap,
    entries: &ValueMap,
) -> Result<(), crate::cel::error::EvalError> {
    for (k, v) in entries {
        if target.contains_key(k) {
            return Err(crate::cel::error::EvalError::DuplicateKey(k.to_string()));
        }
        target.insert(k.clone(), v.clone());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
