//! The fixed helper namespace available inside `{{ }}`.
//!
//! `str.*` string helpers, `date.*` RFC 3339 date helpers, `coll.*` array and
//! object helpers, `json.*` and `num.*` conversions. There is no way to add a
//! function from a workflow document.

use super::eval::loose_eq;
use super::parser::number_literal;
use super::to_display;
use crate::value::json_type_name;
use crate::ExpressionError;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value as Json;

pub fn call(namespace: &str, name: &str, args: Vec<Json>) -> Result<Json, ExpressionError> {
    let call = Call {
        function: format!("{}.{}", namespace, name),
        args,
    };
    match namespace {
        "str" => string_fn(name, call),
        "date" => date_fn(name, call),
        "coll" => collection_fn(name, call),
        "json" => json_fn(name, call),
        "num" => number_fn(name, call),
        _ => Err(ExpressionError::UnknownFunction(call.function)),
    }
}

struct Call {
    function: String,
    args: Vec<Json>,
}

impl Call {
    fn bad(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::BadArgument {
            function: self.function.clone(),
            message: message.into(),
        }
    }

    fn unknown(self) -> ExpressionError {
        ExpressionError::UnknownFunction(self.function)
    }

    fn arity(&self, min: usize, max: usize) -> Result<(), ExpressionError> {
        let n = self.args.len();
        if n < min || n > max {
            return Err(self.bad(format!("expected {}..={} arguments, got {}", min, max, n)));
        }
        Ok(())
    }

    fn arg(&self, i: usize) -> &Json {
        self.args.get(i).unwrap_or(&Json::Null)
    }

    fn str(&self, i: usize) -> Result<&str, ExpressionError> {
        let value = self.arg(i);
        value.as_str().ok_or_else(|| {
            self.bad(format!(
                "argument {} must be a string, got {}",
                i + 1,
                json_type_name(value)
            ))
        })
    }

    fn num(&self, i: usize) -> Result<f64, ExpressionError> {
        let value = self.arg(i);
        value.as_f64().ok_or_else(|| {
            self.bad(format!(
                "argument {} must be a number, got {}",
                i + 1,
                json_type_name(value)
            ))
        })
    }

    fn array(&self, i: usize) -> Result<&Vec<Json>, ExpressionError> {
        let value = self.arg(i);
        value.as_array().ok_or_else(|| {
            self.bad(format!(
                "argument {} must be an array, got {}",
                i + 1,
                json_type_name(value)
            ))
        })
    }

    fn date(&self, i: usize) -> Result<DateTime<Utc>, ExpressionError> {
        let text = self.str(i)?;
        DateTime::parse_from_rfc3339(text)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| self.bad(format!("'{}' is not an RFC 3339 date: {}", text, e)))
    }
}

fn string_fn(name: &str, call: Call) -> Result<Json, ExpressionError> {
    let out = match name {
        "upper" => {
            call.arity(1, 1)?;
            Json::String(call.str(0)?.to_uppercase())
        }
        "lower" => {
            call.arity(1, 1)?;
            Json::String(call.str(0)?.to_lowercase())
        }
        "trim" => {
            call.arity(1, 1)?;
            Json::String(call.str(0)?.trim().to_string())
        }
        "length" => {
            call.arity(1, 1)?;
            Json::from(call.str(0)?.chars().count())
        }
        "concat" => Json::String(call.args.iter().map(to_display).collect()),
        "contains" => {
            call.arity(2, 2)?;
            Json::Bool(call.str(0)?.contains(call.str(1)?))
        }
        "startsWith" => {
            call.arity(2, 2)?;
            Json::Bool(call.str(0)?.starts_with(call.str(1)?))
        }
        "endsWith" => {
            call.arity(2, 2)?;
            Json::Bool(call.str(0)?.ends_with(call.str(1)?))
        }
        "replace" => {
            call.arity(3, 3)?;
            Json::String(call.str(0)?.replace(call.str(1)?, call.str(2)?))
        }
        "split" => {
            call.arity(2, 2)?;
            Json::Array(
                call.str(0)?
                    .split(call.str(1)?)
                    .map(|s| Json::String(s.to_string()))
                    .collect(),
            )
        }
        "substring" => {
            call.arity(2, 3)?;
            let chars: Vec<char> = call.str(0)?.chars().collect();
            let start = (call.num(1)?.max(0.0) as usize).min(chars.len());
            let end = if call.args.len() == 3 {
                (call.num(2)?.max(0.0) as usize).clamp(start, chars.len())
            } else {
                chars.len()
            };
            Json::String(chars[start..end].iter().collect())
        }
        "of" => {
            call.arity(1, 1)?;
            Json::String(to_display(call.arg(0)))
        }
        _ => return Err(call.unknown()),
    };
    Ok(out)
}

fn date_fn(name: &str, call: Call) -> Result<Json, ExpressionError> {
    let out = match name {
        "now" => {
            call.arity(0, 0)?;
            Json::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        "parse" => {
            call.arity(1, 1)?;
            Json::String(call.date(0)?.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        "format" => {
            call.arity(2, 2)?;
            let pattern = call.str(1)?;
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(call.bad(format!("invalid format string '{}'", pattern)));
            }
            Json::String(call.date(0)?.format(pattern).to_string())
        }
        "addDays" => {
            call.arity(2, 2)?;
            let date = call.date(0)?;
            let days = call.num(1)?;
            let shifted = Duration::try_days(days as i64)
                .and_then(|delta| date.checked_add_signed(delta))
                .ok_or_else(|| call.bad(format!("shifting by {} days is out of range", days)))?;
            Json::String(shifted.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        "toMillis" => {
            call.arity(1, 1)?;
            Json::from(call.date(0)?.timestamp_millis())
        }
        _ => return Err(call.unknown()),
    };
    Ok(out)
}

fn collection_fn(name: &str, call: Call) -> Result<Json, ExpressionError> {
    let out = match name {
        "length" => {
            call.arity(1, 1)?;
            match call.arg(0) {
                Json::Array(items) => Json::from(items.len()),
                Json::Object(map) => Json::from(map.len()),
                Json::String(s) => Json::from(s.chars().count()),
                other => {
                    return Err(call.bad(format!("{} has no length", json_type_name(other))))
                }
            }
        }
        "isEmpty" => {
            call.arity(1, 1)?;
            Json::Bool(match call.arg(0) {
                Json::Null => true,
                Json::Array(items) => items.is_empty(),
                Json::Object(map) => map.is_empty(),
                Json::String(s) => s.is_empty(),
                _ => false,
            })
        }
        "first" => {
            call.arity(1, 1)?;
            call.array(0)?.first().cloned().unwrap_or(Json::Null)
        }
        "last" => {
            call.arity(1, 1)?;
            call.array(0)?.last().cloned().unwrap_or(Json::Null)
        }
        "includes" => {
            call.arity(2, 2)?;
            let needle = call.arg(1);
            Json::Bool(call.array(0)?.iter().any(|item| loose_eq(item, needle)))
        }
        "join" => {
            call.arity(1, 2)?;
            let sep = if call.args.len() == 2 { call.str(1)? } else { "," };
            Json::String(
                call.array(0)?
                    .iter()
                    .map(to_display)
                    .collect::<Vec<_>>()
                    .join(sep),
            )
        }
        "keys" => {
            call.arity(1, 1)?;
            let map = call
                .arg(0)
                .as_object()
                .ok_or_else(|| call.bad("argument 1 must be an object"))?;
            Json::Array(map.keys().cloned().map(Json::String).collect())
        }
        "values" => {
            call.arity(1, 1)?;
            let map = call
                .arg(0)
                .as_object()
                .ok_or_else(|| call.bad("argument 1 must be an object"))?;
            Json::Array(map.values().cloned().collect())
        }
        "get" => {
            call.arity(2, 3)?;
            let found = match (call.arg(0), call.arg(1)) {
                (Json::Object(map), Json::String(key)) => map.get(key.as_str()),
                (Json::Array(items), Json::Number(n)) => {
                    n.as_u64().and_then(|i| items.get(i as usize))
                }
                _ => None,
            };
            found.cloned().unwrap_or_else(|| call.arg(2).clone())
        }
        _ => return Err(call.unknown()),
    };
    Ok(out)
}

fn json_fn(name: &str, call: Call) -> Result<Json, ExpressionError> {
    match name {
        "parse" => {
            call.arity(1, 1)?;
            serde_json::from_str(call.str(0)?).map_err(|e| call.bad(e.to_string()))
        }
        "stringify" => {
            call.arity(1, 1)?;
            Ok(Json::String(call.arg(0).to_string()))
        }
        _ => Err(call.unknown()),
    }
}

fn number_fn(name: &str, call: Call) -> Result<Json, ExpressionError> {
    match name {
        "parse" => {
            call.arity(1, 1)?;
            let text = call.str(0)?.trim();
            let parsed: f64 = text
                .parse()
                .map_err(|_| call.bad(format!("'{}' is not a number", text)))?;
            Ok(number_literal(parsed))
        }
        "round" => {
            call.arity(1, 1)?;
            Ok(number_literal(call.num(0)?.round()))
        }
        _ => Err(call.unknown()),
    }
}
