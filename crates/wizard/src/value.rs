//! Filter values as they arrive from a request.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A requested filter value.
///
/// Lists come from comma-separated strings or request arrays; maps come from
/// keyed request parameters such as `filter[created_between][start]=...`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<FilterValue>),
    Map(IndexMap<String, FilterValue>),
}

impl FilterValue {
    /// Normalise a raw request value.
    ///
    /// Strings are trimmed, strings containing `separator` become lists of
    /// trimmed tokens, and "true"/"false" become booleans. Arrays and maps
    /// keep their shape with each member normalised the same way, except
    /// that members are never split further.
    pub fn from_request(raw: &JsonValue, separator: char) -> Self {
        match raw {
            JsonValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.contains(separator) {
                    FilterValue::List(
                        trimmed
                            .split(separator)
                            .map(|part| Self::scalar_from_str(part.trim()))
                            .collect(),
                    )
                } else {
                    Self::scalar_from_str(trimmed)
                }
            }
            JsonValue::Array(items) => FilterValue::List(
                items
                    .iter()
                    .map(|item| Self::member_from_request(item, separator))
                    .collect(),
            ),
            JsonValue::Object(map) => FilterValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::member_from_request(v, separator)))
                    .collect(),
            ),
            other => Self::from(other.clone()),
        }
    }

    fn member_from_request(raw: &JsonValue, separator: char) -> Self {
        match raw {
            JsonValue::String(s) => Self::scalar_from_str(s.trim()),
            other => Self::from_request(other, separator),
        }
    }

    fn scalar_from_str(s: &str) -> Self {
        match s {
            "true" => FilterValue::Boolean(true),
            "false" => FilterValue::Boolean(false),
            _ => FilterValue::String(s.to_string()),
        }
    }

    /// True for list and map values.
    pub fn is_multiple(&self) -> bool {
        matches!(self, FilterValue::List(_) | FilterValue::Map(_))
    }

    /// Get as a string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an i64, parsing strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FilterValue::Integer(n) => Some(*n),
            FilterValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Scalar members: list items, map values, or the value itself.
    pub fn items(&self) -> Vec<FilterValue> {
        match self {
            FilterValue::List(items) => items.clone(),
            FilterValue::Map(map) => map.values().cloned().collect(),
            other => vec![other.clone()],
        }
    }

    /// Text rendering; lists and maps join their members with ','.
    pub fn to_text(&self) -> String {
        match self {
            FilterValue::String(s) => s.clone(),
            FilterValue::Integer(n) => n.to_string(),
            FilterValue::Float(f) => f.to_string(),
            FilterValue::Boolean(b) => b.to_string(),
            FilterValue::List(_) | FilterValue::Map(_) => self
                .items()
                .iter()
                .map(FilterValue::to_text)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// JSON rendering.
    pub fn to_json(&self) -> JsonValue {
        match self {
            FilterValue::String(s) => JsonValue::String(s.clone()),
            FilterValue::Integer(n) => JsonValue::from(*n),
            FilterValue::Float(f) => JsonValue::from(*f),
            FilterValue::Boolean(b) => JsonValue::Bool(*b),
            FilterValue::List(items) => {
                JsonValue::Array(items.iter().map(FilterValue::to_json).collect())
            }
            FilterValue::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// SQL bind value for a scalar; lists and maps bind their text form.
    pub fn to_sql_value(&self) -> sea_query::Value {
        match self {
            FilterValue::String(s) => s.clone().into(),
            FilterValue::Integer(n) => (*n).into(),
            FilterValue::Float(f) => (*f).into(),
            FilterValue::Boolean(b) => (*b).into(),
            FilterValue::List(_) | FilterValue::Map(_) => self.to_text().into(),
        }
    }
}

impl From<JsonValue> for FilterValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => FilterValue::String(String::new()),
            JsonValue::Bool(b) => FilterValue::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => FilterValue::Integer(i),
                None => FilterValue::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => FilterValue::String(s),
            JsonValue::Array(items) => {
                FilterValue::List(items.into_iter().map(FilterValue::from).collect())
            }
            JsonValue::Object(map) => FilterValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, FilterValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}
