use crate::value::json_type_name;
use crate::{Variable, VariableType, WorkflowError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// Build the `$config` object for a run.
///
/// Caller overrides win over declared defaults. A `required` variable with
/// neither fails with [`WorkflowError::VariableMissing`]; an optional one is
/// simply absent. Overrides for undeclared names are passed through as-is.
pub fn resolve_variables(
    declared: &BTreeMap<String, Variable>,
    overrides: &Map<String, Json>,
) -> Result<Map<String, Json>, WorkflowError> {
    let mut config = Map::new();

    for (name, variable) in declared {
        let value = match (overrides.get(name), variable.default_value.as_deref()) {
            (Some(value), _) => coerce_json(name, variable.var_type, value)?,
            (None, Some(text)) => coerce(name, variable.var_type, text)?,
            (None, None) if variable.required => {
                return Err(WorkflowError::VariableMissing(name.clone()))
            }
            (None, None) => {
                tracing::debug!("Variable {} has no value, leaving it out of $config", name);
                continue;
            }
        };
        config.insert(name.clone(), value);
    }

    for (name, value) in overrides {
        if !declared.contains_key(name) {
            config.insert(name.clone(), value.clone());
        }
    }

    Ok(config)
}

/// Coerce a stored default string into the declared type.
pub fn coerce(name: &str, var_type: VariableType, text: &str) -> Result<Json, WorkflowError> {
    let fail = |message: String| WorkflowError::VariableType {
        name: name.to_string(),
        expected: var_type.as_str().to_string(),
        message,
    };

    match var_type {
        VariableType::String => Ok(Json::String(text.to_string())),
        VariableType::Number => {
            let n: f64 = text
                .trim()
                .parse()
                .map_err(|_| fail(format!("'{}' is not a number", text)))?;
            serde_json::Number::from_f64(n)
                .map(Json::Number)
                .ok_or_else(|| fail(format!("'{}' is not a finite number", text)))
        }
        VariableType::Boolean => match text.trim() {
            "true" => Ok(Json::Bool(true)),
            "false" => Ok(Json::Bool(false)),
            other => Err(fail(format!("'{}' is not true or false", other))),
        },
        VariableType::Array | VariableType::Object => {
            let value: Json = serde_json::from_str(text).map_err(|e| fail(e.to_string()))?;
            check_shape(var_type, &value).map_err(fail)?;
            Ok(value)
        }
        VariableType::Date => DateTime::parse_from_rfc3339(text.trim())
            .map(|d| {
                Json::String(
                    d.with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                )
            })
            .map_err(|e| fail(e.to_string())),
        VariableType::Any => {
            Ok(serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.to_string())))
        }
    }
}

fn coerce_json(name: &str, var_type: VariableType, value: &Json) -> Result<Json, WorkflowError> {
    if let Json::String(text) = value {
        return match var_type {
            VariableType::Any => Ok(value.clone()),
            _ => coerce(name, var_type, text),
        };
    }
    let matches = match var_type {
        VariableType::Number => value.is_number(),
        VariableType::Boolean => value.is_boolean(),
        VariableType::Array | VariableType::Object => check_shape(var_type, value).is_ok(),
        VariableType::Any => true,
        VariableType::String | VariableType::Date => false,
    };
    if matches {
        Ok(value.clone())
    } else {
        Err(WorkflowError::VariableType {
            name: name.to_string(),
            expected: var_type.as_str().to_string(),
            message: format!("got {}", json_type_name(value)),
        })
    }
}

fn check_shape(var_type: VariableType, value: &Json) -> Result<(), String> {
    let ok = match var_type {
        VariableType::Array => value.is_array(),
        VariableType::Object => value.is_object(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("got {}", json_type_name(value)))
    }
}
