//! Templated expression resolution.
//!
//! A parameter string is either a literal (no `{{`) or a template made of
//! literal text and `{{ expression }}` markers. Expressions support property
//! access into the four run roots (`$json`, `$context`, `$config`, `$steps`),
//! literals, comparisons, `&&`/`||`/`!`, the ternary operator and calls into a
//! closed helper namespace (see [`functions`]). A reference that does not
//! resolve is an error unless an `||` fallback catches it.

mod eval;
pub mod functions;
mod parser;

pub use eval::evaluate;
pub use parser::{parse_expression, CompareOp, Expr};

use crate::ExpressionError;
use serde_json::{Map, Value as Json};
use std::borrow::Cow;
use std::collections::BTreeMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Root names an expression may start from.
pub const ROOTS: [&str; 4] = ["$json", "$context", "$config", "$steps"];

/// Source of root values for expression evaluation.
pub trait Scope {
    /// Value bound to a root name such as `$json`, or `None` when unbound.
    fn root(&self, name: &str) -> Option<Cow<'_, Json>>;
}

/// A scope backed by a plain map, for hosts and tests that have no run
/// context.
#[derive(Debug, Clone, Default)]
pub struct MapScope {
    roots: BTreeMap<String, Json>,
}

impl MapScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, root: impl Into<String>, value: Json) -> Self {
        self.roots.insert(root.into(), value);
        self
    }
}

impl Scope for MapScope {
    fn root(&self, name: &str) -> Option<Cow<'_, Json>> {
        self.roots.get(name).map(Cow::Borrowed)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Expr(Expr),
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let mut parts = Vec::new();
        let mut rest = source;
        let mut offset = 0;
        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                parts.push(Part::Text(rest[..start].to_string()));
            }
            let body_start = start + OPEN.len();
            let end = rest[body_start..]
                .find(CLOSE)
                .ok_or_else(|| ExpressionError::Syntax {
                    position: offset + start,
                    message: "unterminated '{{'".to_string(),
                })?;
            let body = &rest[body_start..body_start + end];
            let expr = parse_expression(body).map_err(|e| match e {
                ExpressionError::Syntax { position, message } => ExpressionError::Syntax {
                    position: offset + body_start + position,
                    message,
                },
                other => other,
            })?;
            parts.push(Part::Expr(expr));
            let consumed = body_start + end + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_string()));
        }
        Ok(Self { parts })
    }

    /// Whether rendering can produce anything other than the source text.
    pub fn is_literal(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Text(_)))
    }

    /// Render the template.
    ///
    /// A template that is exactly one marker (surrounding whitespace aside)
    /// yields the expression's typed value; anything else is interpolated
    /// into a string.
    pub fn render(&self, scope: &dyn Scope) -> Result<Json, ExpressionError> {
        let exprs: Vec<&Expr> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Expr(e) => Some(e),
                Part::Text(_) => None,
            })
            .collect();
        let only_whitespace = self.parts.iter().all(|p| match p {
            Part::Text(t) => t.trim().is_empty(),
            Part::Expr(_) => true,
        });
        if exprs.len() == 1 && only_whitespace {
            return evaluate(exprs[0], scope);
        }

        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr(expr) => out.push_str(&to_display(&evaluate(expr, scope)?)),
            }
        }
        Ok(Json::String(out))
    }
}

/// Whether a string contains a `{{` marker.
pub fn is_template(source: &str) -> bool {
    source.contains(OPEN)
}

/// Resolve one templated string against a scope.
pub fn resolve(template: &str, scope: &dyn Scope) -> Result<Json, ExpressionError> {
    if !is_template(template) {
        return Ok(Json::String(template.to_string()));
    }
    Template::parse(template)?.render(scope)
}

/// Resolve every string inside a JSON tree; keys are left alone.
pub fn resolve_value(value: &Json, scope: &dyn Scope) -> Result<Json, ExpressionError> {
    match value {
        Json::String(s) => resolve(s, scope),
        Json::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        Json::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(item, scope)?);
            }
            Ok(Json::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Text form of a value inside an interpolated string: strings are inserted
/// raw, `null` as the empty string, everything else as JSON.
pub fn to_display(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}
