//! Request interpretation.
//!
//! Turns raw request parameters into a normalized, read-only snapshot of the
//! requested fields, filters, sorts, includes and appends. Nothing is
//! validated here; the allow-list decides what is acceptable.

mod params;

pub use params::parse_query;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::config::WizardConfig;
use crate::types::{Sort, dedup_sorts};
use crate::value::FilterValue;

/// Requested operations for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSnapshot {
    fields: IndexMap<String, Vec<String>>,
    filters: IndexMap<String, FilterValue>,
    sorts: Vec<Sort>,
    includes: Vec<String>,
    appends: Vec<String>,
}

impl RequestSnapshot {
    /// An empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret a decoded parameter object.
    pub fn from_json(params: &JsonValue, config: &WizardConfig) -> Self {
        let names = &config.parameters;
        let separator = config.array_separator;
        let param = |name: &str| params.get(name).filter(|v| !v.is_null());

        let mut snapshot = Self::new();

        if let Some(JsonValue::Object(groups)) = param(&names.fields) {
            for (group, raw) in groups {
                let group = group.trim();
                if group.is_empty() || raw.is_object() {
                    continue;
                }
                let columns = name_list(raw, separator);
                if !columns.is_empty() {
                    snapshot.fields.insert(group.to_string(), columns);
                }
            }
        }

        if let Some(JsonValue::Object(filters)) = param(&names.filter) {
            for (alias, raw) in filters {
                let alias = alias.trim();
                if alias.is_empty() {
                    continue;
                }
                snapshot
                    .filters
                    .insert(alias.to_string(), FilterValue::from_request(raw, separator));
            }
        }

        if let Some(raw) = param(&names.sort) {
            snapshot.sorts = dedup_sorts(
                name_list(raw, separator)
                    .iter()
                    .filter_map(|token| Sort::parse(token)),
            );
        }

        if let Some(raw) = param(&names.include) {
            snapshot.includes = name_list(raw, separator);
        }

        if let Some(raw) = param(&names.append) {
            snapshot.appends = name_list(raw, separator);
        }

        snapshot
    }

    /// Decode and interpret a URL query string.
    pub fn from_query_str(query: &str, config: &WizardConfig) -> Self {
        Self::from_json(&parse_query(query), config)
    }

    /// Requested column groups, keyed by table path.
    pub fn fields(&self) -> &IndexMap<String, Vec<String>> {
        &self.fields
    }

    /// Requested filters in request order.
    pub fn filters(&self) -> &IndexMap<String, FilterValue> {
        &self.filters
    }

    /// Requested sorts in request order, one per field.
    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn appends(&self) -> &[String] {
        &self.appends
    }

    /// Add a field group.
    pub fn with_fields<S: Into<String>>(
        mut self,
        group: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if !columns.is_empty() {
            self.fields.insert(group.into(), columns);
        }
        self
    }

    /// Add a filter value.
    pub fn with_filter(mut self, alias: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filters.insert(alias.into(), value.into());
        self
    }

    /// Add a sort token such as `-name`.
    pub fn with_sort(mut self, token: &str) -> Self {
        if let Some(sort) = Sort::parse(token) {
            self.sorts = dedup_sorts(self.sorts.into_iter().chain(Some(sort)));
        }
        self
    }

    pub fn with_include(mut self, include: impl Into<String>) -> Self {
        push_unique(&mut self.includes, include.into());
        self
    }

    pub fn with_append(mut self, append: impl Into<String>) -> Self {
        push_unique(&mut self.appends, append.into());
        self
    }
}

/// A comma list or array of names: split, trimmed, de-duplicated, empties dropped.
fn name_list(raw: &JsonValue, separator: char) -> Vec<String> {
    let mut names = Vec::new();
    let mut push_tokens = |s: &str| {
        for token in s.split(separator) {
            push_unique(&mut names, token.trim().to_string());
        }
    };

    match raw {
        JsonValue::String(s) => push_tokens(s),
        JsonValue::Array(items) => {
            for item in items {
                match item {
                    JsonValue::String(s) => push_tokens(s),
                    JsonValue::Number(n) => push_tokens(&n.to_string()),
                    _ => {}
                }
            }
        }
        JsonValue::Number(n) => push_tokens(&n.to_string()),
        _ => {}
    }

    names
}

fn push_unique(list: &mut Vec<String>, name: String) {
    if !name.is_empty() && !list.contains(&name) {
        list.push(name);
    }
}
