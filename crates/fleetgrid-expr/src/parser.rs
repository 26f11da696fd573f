//! Source text → [`Expr`] using the pest grammar in `grammar.pest`.
//!
//! Operator precedence, lowest first: `?:`, `||`, `&&`, comparisons and
//! `in`, `+ -`, `* / %`, unary `! -`, then member access, indexing and
//! receiver calls.

use std::sync::LazyLock;

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::ast::{BinaryOp, Comprehension, Expr, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::value::Value;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct ExpressionGrammar;

static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left)
            | Op::infix(Rule::ne, Assoc::Left)
            | Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left)
            | Op::infix(Rule::in_op, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::not) | Op::prefix(Rule::neg))
        .op(Op::postfix(Rule::method_call)
            | Op::postfix(Rule::field)
            | Op::postfix(Rule::index))
});

/// Parse an expression. Syntax errors carry pest's positioned diagnostic.
pub fn parse(source: &str) -> ExprResult<Expr> {
    let pairs = ExpressionGrammar::parse(Rule::program, source)
        .map_err(|e| ExprError::Compilation(e.renamed_rules(rule_label).to_string()))?;

    let expr = pairs
        .flatten()
        .find(|pair| pair.as_rule() == Rule::expr)
        .ok_or_else(|| ExprError::Compilation("empty expression".to_string()))?;
    build_expr(expr)
}

fn rule_label(rule: &Rule) -> String {
    let label = match rule {
        Rule::expr | Rule::operation => "expression",
        Rule::ident => "identifier",
        Rule::arguments => "arguments",
        Rule::EOI => "end of input",
        Rule::or => "`||`",
        Rule::and => "`&&`",
        Rule::eq => "`==`",
        Rule::ne => "`!=`",
        Rule::lt => "`<`",
        Rule::le => "`<=`",
        Rule::gt => "`>`",
        Rule::ge => "`>=`",
        Rule::in_op => "`in`",
        Rule::add => "`+`",
        Rule::sub => "`-`",
        Rule::mul => "`*`",
        Rule::div => "`/`",
        Rule::rem => "`%`",
        Rule::field | Rule::method_call => "`.`",
        Rule::index => "`[`",
        other => return format!("{other:?}"),
    };
    label.to_string()
}

fn build_expr(pair: Pair<'_, Rule>) -> ExprResult<Expr> {
    let mut inner = pair.into_inner();
    let operation = next_pair(&mut inner, "operation")?;
    let condition = build_operation(operation)?;
    match (inner.next(), inner.next()) {
        (Some(then_pair), Some(else_pair)) => Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(build_expr(then_pair)?),
            else_branch: Box::new(build_expr(else_pair)?),
        }),
        _ => Ok(condition),
    }
}

fn build_operation(pair: Pair<'_, Rule>) -> ExprResult<Expr> {
    PRATT
        .map_primary(|primary| build_primary(primary))
        .map_prefix(|op, operand| {
            let op = match op.as_rule() {
                Rule::not => UnaryOp::Not,
                Rule::neg => UnaryOp::Neg,
                rule => return Err(unexpected(rule)),
            };
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand?),
            })
        })
        .map_postfix(|target, op| build_postfix(target?, op))
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::Ne,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::in_op => BinaryOp::In,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                Rule::rem => BinaryOp::Rem,
                rule => return Err(unexpected(rule)),
            };
            Ok(Expr::Binary {
                op,
                lhs: Box::new(lhs?),
                rhs: Box::new(rhs?),
            })
        })
        .parse(pair.into_inner())
}

fn build_primary(pair: Pair<'_, Rule>) -> ExprResult<Expr> {
    match pair.as_rule() {
        Rule::int => pair
            .as_str()
            .parse::<i64>()
            .map(|i| Expr::Literal(Value::Int(i)))
            .map_err(|_| {
                ExprError::Compilation(format!("integer literal out of range: {}", pair.as_str()))
            }),
        Rule::double => pair
            .as_str()
            .parse::<f64>()
            .map(|d| Expr::Literal(Value::Double(d)))
            .map_err(|e| ExprError::Compilation(format!("invalid double literal: {e}"))),
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Expr::Literal(Value::String(unescape(raw)?)))
        }
        Rule::boolean => Ok(Expr::Literal(Value::Bool(pair.as_str() == "true"))),
        Rule::null => Ok(Expr::Literal(Value::Null)),
        Rule::ident => Ok(Expr::Ident(pair.as_str().to_string())),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner, "function name")?.as_str().to_string();
            let args = build_arguments(next_pair(&mut inner, "arguments")?)?;
            if name == "has" {
                return build_has(args);
            }
            Ok(Expr::Call {
                function: name,
                args,
            })
        }
        Rule::list => pair
            .into_inner()
            .map(build_expr)
            .collect::<ExprResult<Vec<_>>>()
            .map(Expr::List),
        Rule::map => pair
            .into_inner()
            .map(|entry| {
                let mut kv = entry.into_inner();
                let key = build_expr(next_pair(&mut kv, "map key")?)?;
                let value = build_expr(next_pair(&mut kv, "map value")?)?;
                Ok((key, value))
            })
            .collect::<ExprResult<Vec<_>>>()
            .map(Expr::Map),
        Rule::expr => build_expr(pair),
        rule => Err(unexpected(rule)),
    }
}

fn build_postfix(target: Expr, op: Pair<'_, Rule>) -> ExprResult<Expr> {
    match op.as_rule() {
        Rule::field => {
            let field = next_pair(&mut op.into_inner(), "field name")?;
            Ok(Expr::Member {
                target: Box::new(target),
                field: field.as_str().to_string(),
            })
        }
        Rule::index => {
            let index = next_pair(&mut op.into_inner(), "index")?;
            Ok(Expr::Index {
                target: Box::new(target),
                index: Box::new(build_expr(index)?),
            })
        }
        Rule::method_call => {
            let mut inner = op.into_inner();
            let name = next_pair(&mut inner, "method name")?.as_str().to_string();
            let mut args = build_arguments(next_pair(&mut inner, "arguments")?)?;

            if let Some(kind) = Comprehension::from_name(&name) {
                let var = match args.as_slice() {
                    [Expr::Ident(var), _] => var.clone(),
                    _ => {
                        return Err(ExprError::Compilation(format!(
                            "{name}() macro expects (variable, expression)"
                        )));
                    }
                };
                let body = args
                    .pop()
                    .map(Box::new)
                    .ok_or_else(|| unexpected(Rule::arguments))?;
                return Ok(Expr::Comprehension {
                    kind,
                    range: Box::new(target),
                    var,
                    body,
                });
            }

            args.insert(0, target);
            Ok(Expr::Call {
                function: name,
                args,
            })
        }
        rule => Err(unexpected(rule)),
    }
}

fn build_arguments(pair: Pair<'_, Rule>) -> ExprResult<Vec<Expr>> {
    pair.into_inner().map(build_expr).collect()
}

fn build_has(mut args: Vec<Expr>) -> ExprResult<Expr> {
    match (args.len(), args.pop()) {
        (1, Some(Expr::Member { target, field })) => Ok(Expr::Has { target, field }),
        _ => Err(ExprError::Compilation(
            "has() requires a single field selection argument, e.g. has(a.b)".to_string(),
        )),
    }
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> ExprResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ExprError::Compilation(format!("malformed syntax tree: missing {what}")))
}

fn unexpected(rule: Rule) -> ExprError {
    ExprError::Compilation(format!("malformed syntax tree: unexpected {rule:?}"))
}

fn unescape(raw: &str) -> ExprResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '"' | '\'')) => out.push(c),
            Some(other) => {
                return Err(ExprError::Compilation(format!(
                    "unknown escape sequence: \\{other}"
                )));
            }
            None => {
                return Err(ExprError::Compilation(
                    "unterminated escape sequence".to_string(),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_string()))
    }

    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Int(i)))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: int(1),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: int(2),
                    rhs: int(3),
                }),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("a || b && c").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Or, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("expected ||, got {other:?}"),
        }
    }

    #[test]
    fn member_chain_and_index() {
        let expr = parse("cluster.labels[\"zone\"]").unwrap();
        assert_eq!(
            expr,
            Expr::Index {
                target: Box::new(Expr::Member {
                    target: ident("cluster"),
                    field: "labels".to_string(),
                }),
                index: Box::new(Expr::Literal(Value::String("zone".to_string()))),
            }
        );
    }

    #[test]
    fn receiver_call_prepends_target() {
        let expr = parse("name.startsWith('prod')").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                function: "startsWith".to_string(),
                args: vec![
                    Expr::Ident("name".to_string()),
                    Expr::Literal(Value::String("prod".to_string())),
                ],
            }
        );
    }

    #[test]
    fn conditional_is_right_associative() {
        let expr = parse("a ? 1 : b ? 2 : 3").unwrap();
        match expr {
            Expr::Conditional { else_branch, .. } => {
                assert!(matches!(*else_branch, Expr::Conditional { .. }));
            }
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn has_macro_requires_field_selection() {
        assert!(matches!(parse("has(a.b)").unwrap(), Expr::Has { .. }));
        assert!(matches!(parse("has(a)"), Err(ExprError::Compilation(_))));
    }

    #[test]
    fn comprehension_macros() {
        let expr = parse("taints.exists(t, t.key == 'gpu')").unwrap();
        match expr {
            Expr::Comprehension { kind, var, .. } => {
                assert_eq!(kind, Comprehension::Exists);
                assert_eq!(var, "t");
            }
            other => panic!("expected comprehension, got {other:?}"),
        }
        assert!(parse("items.all(1, true)").is_err());
    }

    #[test]
    fn keywords_are_not_identifiers_but_prefixes_are() {
        assert!(matches!(parse("index").unwrap(), Expr::Ident(_)));
        assert!(matches!(parse("trueish").unwrap(), Expr::Ident(_)));
        assert!(matches!(
            parse("'a' in names").unwrap(),
            Expr::Binary { op: BinaryOp::In, .. }
        ));
    }

    #[test]
    fn literals() {
        assert_eq!(parse("2.5").unwrap(), Expr::Literal(Value::Double(2.5)));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(
            parse(r#""a\"b\n""#).unwrap(),
            Expr::Literal(Value::String("a\"b\n".to_string()))
        );
        assert!(matches!(parse("[1, 2,]").unwrap(), Expr::List(items) if items.len() == 2));
        assert!(matches!(parse("{'a': 1}").unwrap(), Expr::Map(entries) if entries.len() == 1));
    }

    #[test]
    fn syntax_error_surfaces_position() {
        let err = parse("a &&").unwrap_err();
        match err {
            ExprError::Compilation(msg) => assert!(msg.contains("1:"), "diagnostic: {msg}"),
            other => panic!("expected compilation error, got {other:?}"),
        }
    }

    #[test]
    fn integer_overflow_is_a_compile_error() {
        assert!(parse("99999999999999999999").is_err());
    }
}
