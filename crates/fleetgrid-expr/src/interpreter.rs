//! Tree-walking evaluation of a checked program.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use fleetgrid_core::Cancellation;

use crate::ast::{BinaryOp, Comprehension, Expr, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::functions::FunctionRegistry;
use crate::value::Value;

/// Nodes evaluated between two deadline checks.
const CHECK_INTERVAL: u64 = 16;

/// Cooperative deadline polled while walking the tree.
#[derive(Debug)]
pub(crate) struct Deadline {
    expires_at: Option<Instant>,
    timeout: Duration,
    cancel: Cancellation,
    steps: u64,
}

impl Deadline {
    pub(crate) fn unbounded() -> Self {
        Self::new(None, Cancellation::none())
    }

    pub(crate) fn new(timeout: Option<Duration>, cancel: Cancellation) -> Self {
        Self {
            expires_at: timeout.map(|t| Instant::now() + t),
            timeout: timeout.unwrap_or_default(),
            cancel,
            steps: 0,
        }
    }

    fn step(&mut self) -> ExprResult<()> {
        let due = self.steps % CHECK_INTERVAL == 0;
        self.steps += 1;
        if !due {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(ExprError::EvaluationCancelled);
        }
        match self.expires_at {
            Some(at) if Instant::now() >= at => Err(ExprError::EvaluationTimeout(self.timeout)),
            _ => Ok(()),
        }
    }
}

/// Evaluate `ast` with `vars` in scope, calling into `registry`.
pub(crate) fn evaluate(
    ast: &Expr,
    registry: &FunctionRegistry,
    vars: &HashMap<String, Value>,
    deadline: Deadline,
) -> ExprResult<Value> {
    Interpreter {
        registry,
        vars,
        locals: Vec::new(),
        deadline,
    }
    .eval(ast)
}

struct Interpreter<'a> {
    registry: &'a FunctionRegistry,
    vars: &'a HashMap<String, Value>,
    locals: Vec<(String, Value)>,
    deadline: Deadline,
}

fn eval_error(message: impl Into<String>) -> ExprError {
    ExprError::Evaluation(message.into())
}

fn expect_bool(op: &str, value: &Value) -> ExprResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ExprError::no_overload(op, &[value.value_type()]))
}

impl Interpreter<'_> {
    fn lookup(&self, name: &str) -> ExprResult<Value> {
        if let Some((_, value)) = self.locals.iter().rev().find(|(local, _)| local == name) {
            return Ok(value.clone());
        }
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| eval_error(format!("no such variable '{name}'")))
    }

    fn eval(&mut self, expr: &Expr) -> ExprResult<Value> {
        self.deadline.step()?;

        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self.lookup(name),

            Expr::Member { target, field } => match self.eval(target)? {
                Value::Map(mut map) => map
                    .remove(field)
                    .ok_or_else(|| eval_error(format!("no such key: '{field}'"))),
                other => Err(eval_error(format!(
                    "type '{}' does not support field selection ('{field}')",
                    other.value_type()
                ))),
            },

            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(target, &index)
            }

            Expr::Has { target, field } => match self.eval(target)? {
                Value::Map(map) => Ok(Value::Bool(map.contains_key(field))),
                other => Err(eval_error(format!(
                    "has() requires a map, found '{}'",
                    other.value_type()
                ))),
            },

            Expr::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<ExprResult<Vec<_>>>()?;
                self.registry.call(function, &args)
            }

            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(i)) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| eval_error("integer overflow in negation")),
                    (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
                    (UnaryOp::Not, other) => {
                        Err(ExprError::no_overload("!_", &[other.value_type()]))
                    }
                    (UnaryOp::Neg, other) => {
                        Err(ExprError::no_overload("-_", &[other.value_type()]))
                    }
                }
            }

            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),

            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.eval(condition)?;
                if expect_bool("_?_:_", &condition)? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }

            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<ExprResult<Vec<_>>>()
                .map(Value::List),

            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::String(key) => key,
                        other => {
                            return Err(eval_error(format!(
                                "map keys must be strings, found '{}'",
                                other.value_type()
                            )));
                        }
                    };
                    let value = self.eval(value)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }

            Expr::Comprehension {
                kind,
                range,
                var,
                body,
            } => self.eval_comprehension(*kind, range, var, body),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> ExprResult<Value> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let short = op == BinaryOp::Or;
                let left = self.eval(lhs)?;
                if expect_bool(op.symbol(), &left)? == short {
                    return Ok(Value::Bool(short));
                }
                let right = self.eval(rhs)?;
                expect_bool(op.symbol(), &right).map(Value::Bool)
            }
            _ => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                apply_binary(op, left, right)
            }
        }
    }

    fn eval_comprehension(
        &mut self,
        kind: Comprehension,
        range: &Expr,
        var: &str,
        body: &Expr,
    ) -> ExprResult<Value> {
        let items = match self.eval(range)? {
            Value::List(items) => items,
            Value::Map(map) => map.into_keys().map(Value::String).collect(),
            other => {
                return Err(eval_error(format!(
                    "comprehension range must be a list or map, found '{}'",
                    other.value_type()
                )));
            }
        };

        let mut collected = Vec::new();
        for item in items {
            self.locals.push((var.to_string(), item.clone()));
            let result = self.eval(body);
            self.locals.pop();
            let result = result?;

            match kind {
                Comprehension::All => {
                    if !expect_bool("all", &result)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Comprehension::Exists => {
                    if expect_bool("exists", &result)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Comprehension::Filter => {
                    if expect_bool("filter", &result)? {
                        collected.push(item);
                    }
                }
                Comprehension::Map => collected.push(result),
            }
        }

        Ok(match kind {
            Comprehension::All => Value::Bool(true),
            Comprehension::Exists => Value::Bool(false),
            Comprehension::Filter | Comprehension::Map => Value::List(collected),
        })
    }
}

fn index_value(target: Value, index: &Value) -> ExprResult<Value> {
    match (target, index) {
        (Value::List(mut items), Value::Int(i)) => {
            let len = items.len();
            usize::try_from(*i)
                .ok()
                .filter(|i| *i < len)
                .map(|i| items.swap_remove(i))
                .ok_or_else(|| eval_error(format!("index {i} out of range for list of size {len}")))
        }
        (Value::Map(mut map), Value::String(key)) => map
            .remove(key)
            .ok_or_else(|| eval_error(format!("no such key: '{key}'"))),
        (target, index) => Err(ExprError::no_overload(
            "_[_]",
            &[target.value_type(), index.value_type()],
        )),
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> ExprResult<Value> {
    let mismatch = |left: &Value, right: &Value| {
        ExprError::no_overload(op.symbol(), &[left.value_type(), right.value_type()])
    };

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.loose_eq(&right))),
        BinaryOp::Ne => Ok(Value::Bool(!left.loose_eq(&right))),

        BinaryOp::In => match &right {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.loose_eq(&left)))),
            Value::Map(map) => Ok(Value::Bool(
                left.as_str().is_some_and(|key| map.contains_key(key)),
            )),
            _ => Err(mismatch(&left, &right)),
        },

        _ if op.is_ordering() => {
            let ordering = compare(&left, &right).ok_or_else(|| mismatch(&left, &right))?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }

        _ => match (left, right) {
            (Value::Int(a), Value::Int(b)) => int_arithmetic(op, a, b),
            (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
                Ok(Value::String(a + &b))
            }
            (Value::List(mut a), Value::List(b)) if op == BinaryOp::Add => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (left, right) => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) if op != BinaryOp::Rem => {
                    let result = match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        _ => a / b,
                    };
                    Ok(Value::Double(result))
                }
                _ => Err(mismatch(&left, &right)),
            },
        },
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> ExprResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div if b == 0 => return Err(eval_error("division by zero")),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem if b == 0 => return Err(eval_error("modulus by zero")),
        BinaryOp::Rem => a.checked_rem(b),
        _ => return Err(ExprError::no_overload(op.symbol(), &[])),
    };
    result
        .map(Value::Int)
        .ok_or_else(|| eval_error(format!("integer overflow in '{a} {op} {b}'")))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}
