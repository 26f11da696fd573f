//! Static checks over a parsed expression.
//!
//! The checker infers a best-effort static type for every node (`Dyn` when
//! the type depends on variables), rejects programs that can never succeed,
//! and collects the metadata the compiler attaches to a program: referenced
//! variables, functions used, and a cost estimate.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::ast::{BinaryOp, Comprehension, Expr, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::functions::{FunctionRegistry, REGEX_ARGUMENTS};
use crate::value::{Value, ValueType};

const NODE_COST: u64 = 1;
const CALL_COST: u64 = 5;
const COMPREHENSION_FACTOR: u64 = 10;

/// Everything learned about a program during checking.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub result_type: ValueType,
    pub cost: u64,
    pub warnings: Vec<String>,
    /// Root identifier → dotted paths selected from it.
    pub variables: BTreeMap<String, BTreeSet<String>>,
    pub functions: BTreeSet<String>,
    pub custom_functions: BTreeSet<String>,
}

/// Check `ast` against `registry`. Unknown functions, arity mismatches and
/// statically impossible operations are errors; undeclared variables and
/// a cost above `max_cost` are warnings.
pub fn check(
    ast: &Expr,
    registry: &FunctionRegistry,
    declared: &[String],
    max_cost: u64,
) -> ExprResult<CheckReport> {
    let mut checker = Checker {
        registry,
        locals: Vec::new(),
        report: CheckReport::default(),
    };
    let (result_type, cost) = checker.visit(ast)?;

    let mut report = checker.report;
    report.result_type = result_type;
    report.cost = cost;

    for name in report.variables.keys() {
        if !declared.iter().any(|d| d == name) {
            report
                .warnings
                .push(format!("reference to undeclared variable '{name}'"));
        }
    }
    if cost > max_cost {
        report
            .warnings
            .push(format!("estimated cost {cost} exceeds limit {max_cost}"));
    }
    Ok(report)
}

struct Checker<'a> {
    registry: &'a FunctionRegistry,
    locals: Vec<String>,
    report: CheckReport,
}

fn compile_error(message: impl Into<String>) -> ExprError {
    ExprError::Compilation(message.into())
}

fn clash(op: &str, types: &[ValueType]) -> ExprError {
    let types: Vec<String> = types.iter().map(ToString::to_string).collect();
    compile_error(format!(
        "found no matching overload for '{op}' applied to ({})",
        types.join(", ")
    ))
}

impl Checker<'_> {
    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|local| local == name)
    }

    fn record_variable(&mut self, root: &str, path: Option<String>) {
        let paths = self.report.variables.entry(root.to_string()).or_default();
        if let Some(path) = path {
            paths.insert(path);
        }
    }

    fn visit(&mut self, expr: &Expr) -> ExprResult<(ValueType, u64)> {
        match expr {
            Expr::Literal(value) => Ok((value.value_type(), NODE_COST)),

            Expr::Ident(name) => {
                if !self.is_local(name) {
                    self.record_variable(name, None);
                }
                Ok((ValueType::Dyn, NODE_COST))
            }

            Expr::Member { target, field } => {
                if let Some((root, path)) = expr.dotted_path() {
                    if !self.is_local(root) {
                        let depth = path.split('.').count() as u64;
                        self.record_variable(root, Some(path));
                        return Ok((ValueType::Dyn, depth * NODE_COST));
                    }
                }
                let (ty, cost) = self.visit(target)?;
                if ty.is_known() && ty != ValueType::Map {
                    return Err(compile_error(format!(
                        "type '{ty}' does not support field selection ('{field}')"
                    )));
                }
                Ok((ValueType::Dyn, cost + NODE_COST))
            }

            Expr::Index { target, index } => {
                let (target_ty, target_cost) = self.visit(target)?;
                let (index_ty, index_cost) = self.visit(index)?;
                let valid = match (target_ty, index_ty) {
                    (ValueType::Dyn, _) | (_, ValueType::Dyn) => true,
                    (ValueType::List, ValueType::Int) => true,
                    (ValueType::Map, ValueType::String) => true,
                    _ => false,
                };
                if !valid {
                    return Err(clash("_[_]", &[target_ty, index_ty]));
                }
                Ok((ValueType::Dyn, target_cost + index_cost + NODE_COST))
            }

            Expr::Call { function, args } => self.visit_call(function, args),

            Expr::Unary { op, operand } => {
                let (ty, cost) = self.visit(operand)?;
                let result = match op {
                    UnaryOp::Not if ty == ValueType::Bool || !ty.is_known() => ValueType::Bool,
                    UnaryOp::Neg if ty.is_numeric() || !ty.is_known() => ty,
                    UnaryOp::Not => return Err(clash("!_", &[ty])),
                    UnaryOp::Neg => return Err(clash("-_", &[ty])),
                };
                Ok((result, cost + NODE_COST))
            }

            Expr::Binary { op, lhs, rhs } => {
                let (lhs_ty, lhs_cost) = self.visit(lhs)?;
                let (rhs_ty, rhs_cost) = self.visit(rhs)?;
                let result = binary_type(*op, lhs_ty, rhs_ty)?;
                Ok((result, lhs_cost + rhs_cost + NODE_COST))
            }

            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let (cond_ty, cond_cost) = self.visit(condition)?;
                if cond_ty.is_known() && cond_ty != ValueType::Bool {
                    return Err(compile_error(format!(
                        "conditional requires a bool condition, found '{cond_ty}'"
                    )));
                }
                let (then_ty, then_cost) = self.visit(then_branch)?;
                let (else_ty, else_cost) = self.visit(else_branch)?;
                let result = if then_ty == else_ty { then_ty } else { ValueType::Dyn };
                Ok((result, cond_cost + then_cost + else_cost + NODE_COST))
            }

            Expr::List(items) => {
                let mut cost = NODE_COST;
                for item in items {
                    cost += self.visit(item)?.1;
                }
                Ok((ValueType::List, cost))
            }

            Expr::Map(entries) => {
                let mut cost = NODE_COST;
                for (key, value) in entries {
                    let (key_ty, key_cost) = self.visit(key)?;
                    if key_ty.is_known() && key_ty != ValueType::String {
                        return Err(compile_error(format!(
                            "map keys must be strings, found '{key_ty}'"
                        )));
                    }
                    cost += key_cost + self.visit(value)?.1;
                }
                Ok((ValueType::Map, cost))
            }

            Expr::Has { target, .. } => {
                let (ty, cost) = self.visit(target)?;
                if ty.is_known() && ty != ValueType::Map {
                    return Err(compile_error(format!(
                        "has() requires a map selection, found '{ty}'"
                    )));
                }
                Ok((ValueType::Bool, cost + NODE_COST))
            }

            Expr::Comprehension {
                kind,
                range,
                var,
                body,
            } => {
                let (range_ty, range_cost) = self.visit(range)?;
                if range_ty.is_known() && !matches!(range_ty, ValueType::List | ValueType::Map) {
                    return Err(compile_error(format!(
                        "comprehension range must be a list or map, found '{range_ty}'"
                    )));
                }

                self.locals.push(var.clone());
                let visited = self.visit(body);
                self.locals.pop();
                let (body_ty, body_cost) = visited?;

                let predicate = matches!(
                    kind,
                    Comprehension::All | Comprehension::Exists | Comprehension::Filter
                );
                if predicate && body_ty.is_known() && body_ty != ValueType::Bool {
                    return Err(compile_error(format!(
                        "comprehension predicate must be bool, found '{body_ty}'"
                    )));
                }

                let result = match kind {
                    Comprehension::All | Comprehension::Exists => ValueType::Bool,
                    Comprehension::Filter | Comprehension::Map => ValueType::List,
                };
                let cost = NODE_COST + range_cost + body_cost * COMPREHENSION_FACTOR;
                Ok((result, cost))
            }
        }
    }

    fn visit_call(&mut self, function: &str, args: &[Expr]) -> ExprResult<(ValueType, u64)> {
        let def = self.registry.get(function).ok_or_else(|| {
            compile_error(format!("undeclared reference to function '{function}'"))
        })?;
        if !def.accepts(args.len()) {
            return Err(compile_error(format!(
                "function '{function}' expects {}, got {}",
                def.arity_description(),
                args.len()
            )));
        }

        self.report.functions.insert(function.to_string());
        if !def.is_builtin() {
            self.report.custom_functions.insert(function.to_string());
        }
        let return_type = def.return_type();

        for (name, position) in REGEX_ARGUMENTS {
            if name != function {
                continue;
            }
            if let Some(Expr::Literal(Value::String(pattern))) = args.get(position) {
                Regex::new(pattern).map_err(|e| {
                    compile_error(format!("invalid regex {pattern:?} in {function}(): {e}"))
                })?;
            }
        }

        let mut cost = CALL_COST;
        for arg in args {
            cost += self.visit(arg)?.1;
        }
        Ok((return_type, cost))
    }
}

/// Static result type of a binary operator, or an error when both operand
/// types are known and no overload applies.
fn binary_type(op: BinaryOp, lhs: ValueType, rhs: ValueType) -> ExprResult<ValueType> {
    use ValueType as T;

    let loose = |ty: ValueType, want: ValueType| ty == want || !ty.is_known();
    let dynamic = !lhs.is_known() || !rhs.is_known();
    let concatenable = |ty: ValueType| ty.is_numeric() || matches!(ty, T::String | T::List);

    let result = match op {
        BinaryOp::And | BinaryOp::Or if loose(lhs, T::Bool) && loose(rhs, T::Bool) => Some(T::Bool),
        BinaryOp::And | BinaryOp::Or => None,
        BinaryOp::Eq | BinaryOp::Ne => Some(T::Bool),
        BinaryOp::In if matches!(rhs, T::List | T::Map | T::Dyn) => Some(T::Bool),
        BinaryOp::In => None,
        _ if op.is_ordering() => {
            let comparable = dynamic
                || (lhs.is_numeric() && rhs.is_numeric())
                || (lhs == T::String && rhs == T::String);
            comparable.then_some(T::Bool)
        }
        BinaryOp::Add if lhs == T::String && rhs == T::String => Some(T::String),
        BinaryOp::Add if lhs == T::List && rhs == T::List => Some(T::List),
        BinaryOp::Rem if lhs == T::Double || rhs == T::Double => None,
        _ => match (lhs, rhs) {
            (T::Int, T::Int) => Some(T::Int),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(T::Double),
            (T::Dyn, T::Dyn) => Some(T::Dyn),
            (T::Dyn, other) | (other, T::Dyn) => {
                let ok = if op == BinaryOp::Add { concatenable(other) } else { other.is_numeric() };
                ok.then_some(T::Dyn)
            }
            _ => None,
        },
    };
    result.ok_or_else(|| clash(op.symbol(), &[lhs, rhs]))
}
