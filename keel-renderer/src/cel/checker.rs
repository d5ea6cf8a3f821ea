//! Reference checking.
//!
//! Variables are dynamically typed, so checking is limited to names: every
//! identifier must be declared or bound by an enclosing comprehension, and
//! every call must name a registered function in a style it supports.
//! Qualified calls such as `base64.encode(x)` are rewritten into global calls
//! here.

use std::collections::HashSet;

use crate::cel::ast::Expr;
use crate::cel::error::CompileError;
use crate::cel::library::Library;

pub fn check(
    expr: Expr,
    variables: &HashSet<String>,
    library: &Library,
) -> Result<Expr, CompileError> {
    Checker {
        variables,
        library,
        scope: Vec::new(),
    }
    .check(expr)
}

struct Checker<'a> {
    variables: &'a HashSet<String>,
    library: &'a Library,
    scope: Vec<String>,
}

impl Checker<'_> {
    fn is_bound(&self, name: &str) -> bool {
        self.scope.iter().any(|s| s == name) || self.variables.contains(name)
    }

    fn check(&mut self, expr: Expr) -> Result<Expr, CompileError> {
        Ok(match expr {
            Expr::Literal(_) => expr,
            Expr::Ident(name) => {
                if !self.is_bound(&name) {
                    return Err(CompileError::UndeclaredReference(name));
                }
                Expr::Ident(name)
            }
            Expr::Select {
                operand,
                field,
                test_only,
                optional,
            } => Expr::Select {
                operand: Box::new(self.check(*operand)?),
                field,
                test_only,
                optional,
            },
            Expr::Index {
                operand,
                index,
                optional,
            } => Expr::Index {
                operand: Box::new(self.check(*operand)?),
                index: Box::new(self.check(*index)?),
                optional,
            },
            Expr::Call {
                target,
                function,
                args,
            } => self.check_call(target, function, args)?,
            Expr::List(mut items) => {
                for item in &mut items {
                    item.value = self.check(std::mem::replace(&mut item.value, placeholder()))?;
                }
                Expr::List(items)
            }
            Expr::Map(mut entries) => {
                for entry in &mut entries {
                    entry.key = self.check(std::mem::replace(&mut entry.key, placeholder()))?;
                    entry.value = self.check(std::mem::replace(&mut entry.value, placeholder()))?;
                }
                Expr::Map(entries)
            }
            Expr::Unary(op, operand) => Expr::Unary(op, Box::new(self.check(*operand)?)),
            Expr::Binary(op, lhs, rhs) => Expr::binary(op, self.check(*lhs)?, self.check(*rhs)?),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => Expr::conditional(
                self.check(*condition)?,
                self.check(*then)?,
                self.check(*otherwise)?,
            ),
            Expr::Comprehension(mut c) => {
                c.iter_range = self.check(std::mem::replace(&mut c.iter_range, placeholder()))?;
                c.accu_init = self.check(std::mem::replace(&mut c.accu_init, placeholder()))?;

                let depth = self.scope.len();
                self.scope.push(c.accu_var.clone());
                c.result = self.check(std::mem::replace(&mut c.result, placeholder()))?;
                self.scope.push(c.iter_var.clone());
                if let Some(v) = &c.iter_var2 {
                    self.scope.push(v.clone());
                }
                let condition = self.check(std::mem::replace(&mut c.loop_condition, placeholder()));
                let step = self.check(std::mem::replace(&mut c.loop_step, placeholder()));
                self.scope.truncate(depth);
                c.loop_condition = condition?;
                c.loop_step = step?;
                Expr::Comprehension(c)
            }
        })
    }

    fn check_call(
        &mut self,
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    ) -> Result<Expr, CompileError> {
        let args = args
            .into_iter()
            .map(|a| self.check(a))
            .collect::<Result<Vec<_>, _>>()?;

        let Some(target) = target else {
            let f = self
                .library
                .function(&function)
                .ok_or_else(|| CompileError::UndeclaredFunction(function.clone()))?;
            if !f.style().allows_global() {
                return Err(CompileError::CallStyle {
                    name: function,
                    style: "a global function",
                });
            }
            return Ok(Expr::call(function, args));
        };

        // `ns.f(x)` names a namespaced global function unless `ns` is a
        // bound variable.
        if let Some(prefix) = target.qualified_name() {
            let root = prefix.split('.').next().unwrap_or_default();
            let qualified = format!("{prefix}.{function}");
            if let Some(f) = self.library.function(&qualified) {
                if f.style().allows_global() && !self.is_bound(root) {
                    return Ok(Expr::call(qualified, args));
                }
            }
        }

        let f = self
            .library
            .function(&function)
            .ok_or_else(|| CompileError::UndeclaredFunction(function.clone()))?;
        if !f.style().allows_member() {
            return Err(CompileError::CallStyle {
                name: function,
                style: "a member function",
            });
        }
        Ok(Expr::Call {
            target: Some(Box::new(self.check(*target)?)),
            function,
            args,
        })
    }
}

fn placeholder() -> Expr {
    Expr::Literal(crate::cel::value::Value::Null)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::library::CallStyle;
    use crate::cel::macros;
    use crate::cel::parser::parse;
    use crate::cel::value::Value;

    fn library() -> Library {
        let mut lib = Library::new();
        macros::register_standard(&mut lib);
        lib.define("size", CallStyle::Both, |_| Ok(Value::Int(0)))
            .define("base64.encode", CallStyle::Global, |_| Ok(Value::Null))
            .define("startsWith", CallStyle::Member, |_| Ok(Value::Bool(true)))
            .define(macros::NOT_STRICTLY_FALSE, CallStyle::Global, |_| Ok(Value::Bool(true)));
        lib
    }

    fn compile(src: &str, vars: &[&str]) -> Result<Expr, CompileError> {
        let lib = library();
        let vars: HashSet<String> = vars.iter().map(|v| v.to_string()).collect();
        check(macros::expand(parse(src)?, &lib)?, &vars, &lib)
    }

    #[test]
    fn undeclared_identifier_is_reported() {
        assert_eq!(
            compile("spec.name", &["metadata"]).unwrap_err(),
            CompileError::UndeclaredReference("spec".into())
        );
    }

    #[test]
    fn field_access_on_declared_variable_is_not_checked() {
        assert!(compile("spec.anything.goes", &["spec"]).is_ok());
    }

    #[test]
    fn comprehension_variables_are_scoped() {
        assert!(compile("xs.all(x, x > 0)", &["xs"]).is_ok());
        assert_eq!(
            compile("xs.all(x, x > 0) && x > 1", &["xs"]).unwrap_err(),
            CompileError::UndeclaredReference("x".into())
        );
    }

    #[test]
    fn qualified_function_becomes_global_call() {
        let expr = compile("base64.encode(b)", &["b"]).expect("check");
        assert_eq!(expr, Expr::call("base64.encode", vec![Expr::ident("b")]));
    }

    #[test]
    fn unknown_and_misstyled_functions() {
        assert_eq!(
            compile("nope(1)", &[]).unwrap_err(),
            CompileError::UndeclaredFunction("nope".into())
        );
        assert!(matches!(
            compile("startsWith(s, 'a')", &["s"]).unwrap_err(),
            CompileError::CallStyle { .. }
        ));
        assert!(compile("s.startsWith('a') && size(s) > 0", &["s"]).is_ok());
    }
}
