use crate::HandlerError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A literal node parameter that is not a template expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    String(String),
    Number(f64),
    Bool(bool),
    StringList(Vec<String>),
    NumberList(Vec<f64>),
}

impl ParameterValue {
    pub fn string(value: impl Into<String>) -> Self {
        ParameterValue::String(value.into())
    }

    pub fn number(value: f64) -> Self {
        ParameterValue::Number(value)
    }

    pub fn boolean(value: bool) -> Self {
        ParameterValue::Bool(value)
    }

    pub fn string_list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParameterValue::StringList(values.into_iter().map(Into::into).collect())
    }

    pub fn number_list(values: impl IntoIterator<Item = f64>) -> Self {
        ParameterValue::NumberList(values.into_iter().collect())
    }

    /// Narrow a JSON parameter into one of the literal shapes.
    ///
    /// Objects, nulls and mixed arrays have no literal form and yield `None`.
    /// An empty array reads as an empty string list.
    pub fn from_json(value: &Json) -> Option<Self> {
        match value {
            Json::String(s) => Some(Self::string(s.clone())),
            Json::Number(n) => n.as_f64().map(Self::number),
            Json::Bool(b) => Some(Self::boolean(*b)),
            Json::Array(items) => {
                if let Some(strings) = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                {
                    return Some(Self::StringList(strings));
                }
                items
                    .iter()
                    .map(Json::as_f64)
                    .collect::<Option<Vec<_>>>()
                    .map(Self::NumberList)
            }
            Json::Null | Json::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<ParameterValue> for Json {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::String(s) => Json::String(s),
            ParameterValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            ParameterValue::Bool(b) => Json::Bool(b),
            ParameterValue::StringList(items) => {
                Json::Array(items.into_iter().map(Json::String).collect())
            }
            ParameterValue::NumberList(items) => Json::Array(
                items
                    .into_iter()
                    .filter_map(serde_json::Number::from_f64)
                    .map(Json::Number)
                    .collect(),
            ),
        }
    }
}

/// A node's parameters after every template has been resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: Map<String, Json>,
}

impl Parameters {
    pub fn new(values: Map<String, Json>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Json> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn parameter(&self, name: &str) -> Option<ParameterValue> {
        self.values.get(name).and_then(ParameterValue::from_json)
    }

    /// Get required parameter or return error
    pub fn require(&self, name: &str) -> Result<&Json, HandlerError> {
        self.values
            .get(name)
            .ok_or_else(|| HandlerError::MissingParameter(name.to_string()))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, HandlerError> {
        let value = self.require(name)?;
        value
            .as_str()
            .ok_or_else(|| HandlerError::type_mismatch(name, "string", value))
    }

    pub fn require_f64(&self, name: &str) -> Result<f64, HandlerError> {
        let value = self.require(name)?;
        value
            .as_f64()
            .ok_or_else(|| HandlerError::type_mismatch(name, "number", value))
    }

    pub fn require_u64(&self, name: &str) -> Result<u64, HandlerError> {
        let value = self.require(name)?;
        as_whole(value).ok_or_else(|| HandlerError::type_mismatch(name, "non-negative integer", value))
    }

    /// `Ok(None)` when absent; a present value must be a whole number
    /// within `range`.
    pub fn get_u64_in(
        &self,
        name: &str,
        range: std::ops::RangeInclusive<u64>,
    ) -> Result<Option<u64>, HandlerError> {
        let Some(value) = self.values.get(name) else {
            return Ok(None);
        };
        match as_whole(value) {
            Some(n) if range.contains(&n) => Ok(Some(n)),
            _ => Err(HandlerError::type_mismatch(
                name,
                format!("integer in {}..={}", range.start(), range.end()),
                value,
            )),
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Json::as_str)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Json::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Json::as_bool)
    }

    pub fn get_string_list(&self, name: &str) -> Option<Vec<String>> {
        match self.parameter(name)? {
            ParameterValue::StringList(items) => Some(items),
            ParameterValue::String(s) => Some(vec![s]),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Json)> {
        self.values.iter()
    }

    pub fn into_inner(self) -> Map<String, Json> {
        self.values
    }
}

/// A JSON number with no fractional part that fits in `u64`; `2.0` counts.
fn as_whole(value: &Json) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v < u64::MAX as f64)
            .map(|v| v as u64)
    })
}
