use super::functions;
use super::parser::{CompareOp, Expr};
use super::Scope;
use crate::value::{is_truthy, json_type_name};
use crate::ExpressionError;
use serde_json::Value as Json;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Evaluate a parsed expression against a scope.
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Json, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        Expr::Root(_) | Expr::Member(..) | Expr::Index(..) => evaluate_path(expr, scope),
        Expr::Call {
            namespace,
            name,
            args,
        } => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            functions::call(namespace, name, args)
        }
        Expr::Not(inner) => Ok(Json::Bool(!is_truthy(&evaluate(inner, scope)?))),
        Expr::Neg(inner) => {
            let value = evaluate(inner, scope)?;
            value
                .as_f64()
                .and_then(|n| serde_json::Number::from_f64(-n))
                .map(Json::Number)
                .ok_or_else(|| ExpressionError::BadArgument {
                    function: "-".to_string(),
                    message: format!("cannot negate {}", json_type_name(&value)),
                })
        }
        Expr::Compare(op, left, right) => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            compare(*op, &left, &right).map(Json::Bool)
        }
        Expr::And(left, right) => {
            let left = evaluate(left, scope)?;
            if is_truthy(&left) {
                evaluate(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => match evaluate(left, scope) {
            Ok(value) if is_truthy(&value) => Ok(value),
            Ok(_) | Err(ExpressionError::Unresolved { .. }) => evaluate(right, scope),
            Err(other) => Err(other),
        },
        Expr::Ternary(cond, then, otherwise) => {
            if is_truthy(&evaluate(cond, scope)?) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
    }
}

enum Segment<'e> {
    Key(&'e str),
    Index(&'e Expr),
}

/// Walk `base.a[b].c` without cloning intermediate values.
fn evaluate_path(expr: &Expr, scope: &dyn Scope) -> Result<Json, ExpressionError> {
    let mut segments = Vec::new();
    let base = collect_segments(expr, &mut segments);

    let (mut path, root): (String, Cow<'_, Json>) = match base {
        Expr::Root(name) => {
            let value = scope.root(name).ok_or_else(|| {
                if super::ROOTS.contains(&name.as_str()) {
                    ExpressionError::Unresolved { path: name.clone() }
                } else {
                    ExpressionError::UnknownRoot(name.clone())
                }
            })?;
            (name.clone(), value)
        }
        other => ("(value)".to_string(), Cow::Owned(evaluate(other, scope)?)),
    };

    let mut current: &Json = root.as_ref();
    for segment in segments {
        let next = match segment {
            Segment::Key(key) => {
                path.push('.');
                path.push_str(key);
                current.as_object().and_then(|map| map.get(key))
            }
            Segment::Index(index_expr) => {
                let index = evaluate(index_expr, scope)?;
                match (&index, current) {
                    (Json::String(key), Json::Object(map)) => {
                        path.push_str(&format!("[{:?}]", key));
                        map.get(key.as_str())
                    }
                    (Json::Number(n), Json::Array(items)) => {
                        path.push_str(&format!("[{}]", n));
                        n.as_u64().and_then(|i| items.get(i as usize))
                    }
                    (Json::String(_), _) | (Json::Number(_), _) => {
                        path.push_str(&format!("[{}]", index));
                        None
                    }
                    _ => {
                        return Err(ExpressionError::NotIndexable(format!(
                            "{} with {} key",
                            json_type_name(current),
                            json_type_name(&index)
                        )))
                    }
                }
            }
        };
        current = next.ok_or_else(|| ExpressionError::Unresolved { path: path.clone() })?;
    }
    Ok(current.clone())
}

fn collect_segments<'e>(expr: &'e Expr, segments: &mut Vec<Segment<'e>>) -> &'e Expr {
    match expr {
        Expr::Member(base, key) => {
            let root = collect_segments(base, segments);
            segments.push(Segment::Key(key));
            root
        }
        Expr::Index(base, index) => {
            let root = collect_segments(base, segments);
            segments.push(Segment::Index(index));
            root
        }
        other => other,
    }
}

fn compare(op: CompareOp, left: &Json, right: &Json) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Eq => Ok(loose_eq(left, right)),
        CompareOp::Ne => Ok(!loose_eq(left, right)),
        _ => {
            let ordering = match (left, right) {
                (Json::Number(a), Json::Number(b)) => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(a, b)| a.partial_cmp(&b)),
                (Json::String(a), Json::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(|| ExpressionError::BadArgument {
                function: op.symbol().to_string(),
                message: format!(
                    "cannot compare {} with {}",
                    json_type_name(left),
                    json_type_name(right)
                ),
            })?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Equality where `1` and `1.0` are the same number.
pub(crate) fn loose_eq(left: &Json, right: &Json) -> bool {
    match (left, right) {
        (Json::Number(a), Json::Number(b)) => a.as_f64() == b.as_f64(),
        (Json::Array(a), Json::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        _ => left == right,
    }
}
