//! Shared query types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested or default sort: a sort alias plus a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Parse `name` (ascending) or `-name` (descending).
    ///
    /// Returns `None` for tokens with no field name.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (field, direction) = match token.strip_prefix('-') {
            Some(rest) => (rest.trim(), SortDirection::Desc),
            None => (token, SortDirection::Asc),
        };
        if field.is_empty() {
            return None;
        }
        Some(Self::new(field, direction))
    }
}

impl From<&str> for Sort {
    /// Like [`Sort::parse`], but keeps an empty field for empty input.
    fn from(token: &str) -> Self {
        Sort::parse(token).unwrap_or_else(|| Sort::new("", SortDirection::Asc))
    }
}

/// Keep the first sort for each field.
pub(crate) fn dedup_sorts(sorts: impl IntoIterator<Item = Sort>) -> Vec<Sort> {
    let mut result: Vec<Sort> = Vec::new();
    for sort in sorts {
        if sort.field.is_empty() || result.iter().any(|s| s.field == sort.field) {
            continue;
        }
        result.push(sort);
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_direction_prefix() {
        assert_eq!(Sort::parse("name").unwrap(), Sort::new("name", SortDirection::Asc));
        assert_eq!(Sort::parse(" -name ").unwrap(), Sort::new("name", SortDirection::Desc));
        assert!(Sort::parse("-").is_none());
        assert!(Sort::parse("  ").is_none());
    }

    #[test]
    fn dedup_keeps_first_per_field() {
        let sorts = dedup_sorts([Sort::from("name"), Sort::from("-name"), Sort::from("-id")]);
        assert_eq!(
            sorts,
            vec![
                Sort::new("name", SortDirection::Asc),
                Sort::new("id", SortDirection::Desc)
            ]
        );
    }

    #[test]
    fn direction_serialization() {
        assert_eq!(serde_json::to_string(&SortDirection::Desc).unwrap(), "\"desc\"");
        assert_eq!(SortDirection::Asc.to_string(), "asc");
    }
}
