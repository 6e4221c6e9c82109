//! Allow-list registry.
//!
//! Holds the filters, sorts, includes, fields and appends a wizard accepts,
//! plus the defaults used when a request section is empty. Bare names are
//! promoted to handlers through an injected [`DefaultHandlers`] factory.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{QueryKind, WizardError, WizardResult};
use crate::handlers::{
    CallbackFilter, CallbackInclude, CallbackSort, ExactFilter, FieldSort, FilterHandler,
    IncludeHandler, IncludedCount, IncludedRelationship, ScopeFilter, SortHandler, TrashedFilter,
};
use crate::types::{Sort, dedup_sorts};

// ---------------------------------------------------------------------------
// Default handler factory
// ---------------------------------------------------------------------------

/// Promotes bare allow-list names to handlers.
pub trait DefaultHandlers: Send + Sync {
    fn filter(&self, name: &str) -> Arc<dyn FilterHandler>;
    fn sort(&self, name: &str) -> Arc<dyn SortHandler>;
    fn include(&self, name: &str, count_suffix: &str) -> Arc<dyn IncludeHandler>;
}

/// Exact filters, field sorts, and relationship includes (count includes
/// for names ending in the count suffix).
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoutDefaults;

impl DefaultHandlers for ScoutDefaults {
    fn filter(&self, name: &str) -> Arc<dyn FilterHandler> {
        Arc::new(ExactFilter::new(name))
    }

    fn sort(&self, name: &str) -> Arc<dyn SortHandler> {
        Arc::new(FieldSort::new(name))
    }

    fn include(&self, name: &str, count_suffix: &str) -> Arc<dyn IncludeHandler> {
        match name.strip_suffix(count_suffix) {
            Some(relation) if !relation.is_empty() && !count_suffix.is_empty() => {
                Arc::new(IncludedCount::new(relation).alias(name))
            }
            _ => Arc::new(IncludedRelationship::new(name)),
        }
    }
}

// ---------------------------------------------------------------------------
// Allow-list inputs
// ---------------------------------------------------------------------------

/// An allowed filter: a bare name or a handler.
#[derive(Clone)]
pub enum AllowedFilter {
    Name(String),
    Handler(Arc<dyn FilterHandler>),
}

impl AllowedFilter {
    pub fn handler(handler: impl FilterHandler + 'static) -> Self {
        AllowedFilter::Handler(Arc::new(handler))
    }
}

/// An allowed sort: a bare name (`name` or `-name`) or a handler.
#[derive(Clone)]
pub enum AllowedSort {
    Name(String),
    Handler(Arc<dyn SortHandler>),
}

impl AllowedSort {
    pub fn handler(handler: impl SortHandler + 'static) -> Self {
        AllowedSort::Handler(Arc::new(handler))
    }
}

/// An allowed include: a bare relation path or a handler.
#[derive(Clone)]
pub enum AllowedInclude {
    Name(String),
    Handler(Arc<dyn IncludeHandler>),
}

impl AllowedInclude {
    pub fn handler(handler: impl IncludeHandler + 'static) -> Self {
        AllowedInclude::Handler(Arc::new(handler))
    }
}

macro_rules! allowed_conversions {
    ($target:ident, $trait:ident, [$($handler:ty),* $(,)?]) => {
        impl From<&str> for $target {
            fn from(name: &str) -> Self {
                $target::Name(name.to_string())
            }
        }

        impl From<String> for $target {
            fn from(name: String) -> Self {
                $target::Name(name)
            }
        }

        impl From<Arc<dyn $trait>> for $target {
            fn from(handler: Arc<dyn $trait>) -> Self {
                $target::Handler(handler)
            }
        }

        $(
            impl From<$handler> for $target {
                fn from(handler: $handler) -> Self {
                    $target::Handler(Arc::new(handler))
                }
            }
        )*
    };
}

allowed_conversions!(
    AllowedFilter,
    FilterHandler,
    [ExactFilter, ScopeFilter, TrashedFilter, CallbackFilter]
);
allowed_conversions!(AllowedSort, SortHandler, [FieldSort, CallbackSort]);
allowed_conversions!(
    AllowedInclude,
    IncludeHandler,
    [IncludedRelationship, IncludedCount, CallbackInclude]
);

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Per-wizard allow-lists and defaults.
///
/// Each allow-list is `None` until set; a request naming anything of an
/// unset kind is rejected.
pub struct AllowList {
    defaults: Arc<dyn DefaultHandlers>,
    count_suffix: String,
    /// Field group of the searched model (its table).
    default_group: String,

    filters: Option<IndexMap<String, Arc<dyn FilterHandler>>>,
    sorts: Option<IndexMap<String, Arc<dyn SortHandler>>>,
    includes: Option<IndexMap<String, Arc<dyn IncludeHandler>>>,
    fields: Option<Vec<String>>,
    appends: Option<Vec<String>>,

    default_sorts: Vec<Sort>,
    default_includes: Vec<String>,
    default_fields: IndexMap<String, Vec<String>>,
    default_appends: Vec<String>,
}

impl AllowList {
    pub fn new(default_group: impl Into<String>, count_suffix: impl Into<String>) -> Self {
        Self {
            defaults: Arc::new(ScoutDefaults),
            count_suffix: count_suffix.into(),
            default_group: default_group.into(),
            filters: None,
            sorts: None,
            includes: None,
            fields: None,
            appends: None,
            default_sorts: Vec::new(),
            default_includes: Vec::new(),
            default_fields: IndexMap::new(),
            default_appends: Vec::new(),
        }
    }

    /// Replace the bare-name promotion strategy. Affects lists set afterwards.
    pub fn set_default_handlers(&mut self, defaults: Arc<dyn DefaultHandlers>) {
        self.defaults = defaults;
    }

    pub fn default_group(&self) -> &str {
        &self.default_group
    }

    pub fn count_suffix(&self) -> &str {
        &self.count_suffix
    }

    // -- configuration ------------------------------------------------------

    pub fn set_allowed_filters<T: Into<AllowedFilter>>(&mut self, items: impl IntoIterator<Item = T>) {
        let mut map = IndexMap::new();
        for item in items {
            let handler = match item.into() {
                AllowedFilter::Name(name) => match non_empty(&name) {
                    Some(name) => self.defaults.filter(name),
                    None => continue,
                },
                AllowedFilter::Handler(handler) => handler,
            };
            map.insert(handler.property().alias().to_string(), handler);
        }
        self.filters = Some(map);
    }

    pub fn set_allowed_sorts<T: Into<AllowedSort>>(&mut self, items: impl IntoIterator<Item = T>) {
        let mut map = IndexMap::new();
        for item in items {
            let handler = match item.into() {
                AllowedSort::Name(name) => {
                    let name = name.trim();
                    match non_empty(name.strip_prefix('-').unwrap_or(name)) {
                        Some(name) => self.defaults.sort(name),
                        None => continue,
                    }
                }
                AllowedSort::Handler(handler) => handler,
            };
            map.insert(handler.property().alias().to_string(), handler);
        }
        self.sorts = Some(map);
    }

    /// Relationship includes also register every intermediate relation path,
    /// the count of their first relation, and (for undotted paths) the count
    /// under `alias + count_suffix`.
    pub fn set_allowed_includes<T: Into<AllowedInclude>>(
        &mut self,
        items: impl IntoIterator<Item = T>,
    ) {
        let mut map: IndexMap<String, Arc<dyn IncludeHandler>> = IndexMap::new();
        for item in items {
            let handler = match item.into() {
                AllowedInclude::Name(name) => match non_empty(&name) {
                    Some(name) => self.defaults.include(name, &self.count_suffix),
                    None => continue,
                },
                AllowedInclude::Handler(handler) => handler,
            };
            self.register_include(&mut map, handler);
        }
        self.includes = Some(map);
    }

    fn register_include(
        &self,
        map: &mut IndexMap<String, Arc<dyn IncludeHandler>>,
        handler: Arc<dyn IncludeHandler>,
    ) {
        let property = handler.property().clone();
        let expands = handler.expands();
        let segments: Vec<&str> = property.name().split('.').collect();

        if expands {
            for depth in 1..segments.len() {
                let prefix = segments[..depth].join(".");
                if !map.contains_key(&prefix) {
                    map.insert(prefix.clone(), Arc::new(IncludedRelationship::new(prefix)));
                }
            }
        }

        map.insert(property.alias().to_string(), handler);

        if expands {
            let first = segments[0];
            // An aliased top-level include answers only to its aliased count.
            let alias = if segments.len() == 1 && property.alias() != property.name() {
                format!("{}{}", property.alias(), self.count_suffix)
            } else {
                format!("{first}{}", self.count_suffix)
            };
            if !map.contains_key(&alias) {
                map.insert(alias.clone(), Arc::new(IncludedCount::new(first).alias(alias)));
            }
        }
    }

    /// Bare names are qualified with the searched model's table.
    pub fn set_allowed_fields<S: AsRef<str>>(&mut self, fields: impl IntoIterator<Item = S>) {
        let mut allowed = Vec::new();
        for field in fields {
            let Some(field) = non_empty(field.as_ref()) else {
                continue;
            };
            let field = self.qualify_field(field);
            if !allowed.contains(&field) {
                allowed.push(field);
            }
        }
        self.fields = Some(allowed);
    }

    pub fn set_allowed_appends<S: AsRef<str>>(&mut self, appends: impl IntoIterator<Item = S>) {
        let mut allowed: Vec<String> = Vec::new();
        for append in appends {
            if let Some(append) = non_empty(append.as_ref()) {
                if !allowed.iter().any(|a| a == append) {
                    allowed.push(append.to_string());
                }
            }
        }
        self.appends = Some(allowed);
    }

    /// Sorts used when the request has none; one per field, first wins.
    pub fn set_default_sorts<T: Into<Sort>>(&mut self, sorts: impl IntoIterator<Item = T>) {
        self.default_sorts = dedup_sorts(sorts.into_iter().map(Into::into));
    }

    pub fn set_default_includes<S: AsRef<str>>(&mut self, includes: impl IntoIterator<Item = S>) {
        self.default_includes = unique_names(includes);
    }

    /// Field groups used when the request has none. `group` is a table path;
    /// an empty group means the searched model.
    pub fn set_default_fields<S: AsRef<str>>(
        &mut self,
        group: &str,
        fields: impl IntoIterator<Item = S>,
    ) {
        let group = match non_empty(group) {
            Some(group) => group.to_string(),
            None => self.default_group.clone(),
        };
        let fields = unique_names(fields);
        if fields.is_empty() {
            self.default_fields.shift_remove(&group);
        } else {
            self.default_fields.insert(group, fields);
        }
    }

    pub fn set_default_appends<S: AsRef<str>>(&mut self, appends: impl IntoIterator<Item = S>) {
        self.default_appends = unique_names(appends);
    }

    // -- lookups ------------------------------------------------------------

    pub fn resolve_filter(&self, alias: &str) -> Option<Arc<dyn FilterHandler>> {
        self.filters.as_ref()?.get(alias).cloned()
    }

    pub fn resolve_sort(&self, alias: &str) -> Option<Arc<dyn SortHandler>> {
        self.sorts.as_ref()?.get(alias).cloned()
    }

    pub fn resolve_include(&self, alias: &str) -> Option<Arc<dyn IncludeHandler>> {
        self.includes.as_ref()?.get(alias).cloned()
    }

    /// Allowed aliases of `kind`, in registration order.
    pub fn allowed(&self, kind: QueryKind) -> Vec<String> {
        fn keys<V>(map: &Option<IndexMap<String, V>>) -> Vec<String> {
            map.as_ref()
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default()
        }
        match kind {
            QueryKind::Filter => keys(&self.filters),
            QueryKind::Sort => keys(&self.sorts),
            QueryKind::Include => keys(&self.includes),
            QueryKind::Field => self.fields.clone().unwrap_or_default(),
            QueryKind::Append => self.appends.clone().unwrap_or_default(),
        }
    }

    /// Filter handlers carrying a default value, in registration order.
    pub fn filters_with_defaults(&self) -> Vec<Arc<dyn FilterHandler>> {
        self.filters
            .iter()
            .flat_map(|map| map.values())
            .filter(|handler| handler.default_value().is_some())
            .cloned()
            .collect()
    }

    pub fn default_sorts(&self) -> &[Sort] {
        &self.default_sorts
    }

    pub fn default_includes(&self) -> &[String] {
        &self.default_includes
    }

    pub fn default_fields(&self) -> &IndexMap<String, Vec<String>> {
        &self.default_fields
    }

    pub fn default_appends(&self) -> &[String] {
        &self.default_appends
    }

    // -- validation ---------------------------------------------------------

    /// Reject requested names outside the allow-list of `kind`.
    ///
    /// An empty request is always valid. Unknown names are reported in
    /// request order, allowed names in registration order.
    pub fn validate<S: AsRef<str>>(&self, kind: QueryKind, requested: &[S]) -> WizardResult<()> {
        if requested.is_empty() {
            return Ok(());
        }
        let allowed = self.allowed(kind);
        let mut unknown: Vec<String> = Vec::new();
        for name in requested {
            let name = name.as_ref();
            if !allowed.iter().any(|a| a == name) && !unknown.iter().any(|u| u == name) {
                unknown.push(name.to_string());
            }
        }
        if unknown.is_empty() {
            Ok(())
        } else {
            tracing::debug!(
                kind = kind.plural(),
                unknown = ?unknown,
                "request names outside the allow-list"
            );
            Err(WizardError::invalid(kind, unknown, allowed))
        }
    }

    /// Validate requested field groups; names are compared qualified with
    /// their group.
    pub fn validate_fields(&self, groups: &IndexMap<String, Vec<String>>) -> WizardResult<()> {
        let requested: Vec<String> = groups
            .iter()
            .flat_map(|(group, fields)| fields.iter().map(move |f| qualify(group, f)))
            .collect();
        self.validate(QueryKind::Field, &requested)
    }

    pub fn qualify_field(&self, field: &str) -> String {
        qualify(&self.default_group, field)
    }
}

fn qualify(group: &str, field: &str) -> String {
    if field.contains('.') {
        field.to_string()
    } else {
        format!("{group}.{field}")
    }
}

fn non_empty(name: &str) -> Option<&str> {
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

fn unique_names<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if let Some(name) = non_empty(name.as_ref()) {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::SortDirection;

    fn registry() -> AllowList {
        AllowList::new("test_models", "Count")
    }

    #[test]
    fn bare_include_registers_count() {
        let mut allow = registry();
        allow.set_allowed_includes(["relatedModels"]);
        assert_eq!(
            allow.allowed(QueryKind::Include),
            ["relatedModels", "relatedModelsCount"]
        );
        let count = allow.resolve_include("relatedModelsCount").unwrap();
        assert_eq!(count.property().name(), "relatedModels");
        assert!(!count.expands());
    }

    #[test]
    fn nested_include_registers_prefixes_and_first_level_count() {
        let mut allow = registry();
        allow.set_allowed_includes(["relatedModels.nestedRelatedModels"]);
        assert_eq!(
            allow.allowed(QueryKind::Include),
            [
                "relatedModels",
                "relatedModels.nestedRelatedModels",
                "relatedModelsCount"
            ]
        );
        assert!(allow.resolve_include("nestedRelatedModelsCount").is_none());
    }

    #[test]
    fn duplicate_includes_collapse() {
        let mut allow = registry();
        allow.set_allowed_includes(["relatedModels.nestedRelatedModels", "relatedModels"]);
        assert_eq!(allow.allowed(QueryKind::Include).len(), 3);
    }

    #[test]
    fn count_suffix_promotes_to_count_include() {
        let mut allow = registry();
        allow.set_allowed_includes(["relatedModelsCount"]);
        assert_eq!(allow.allowed(QueryKind::Include), ["relatedModelsCount"]);
        let handler = allow.resolve_include("relatedModelsCount").unwrap();
        assert_eq!(handler.property().name(), "relatedModels");
    }

    #[test]
    fn aliased_include_registers_alias_count() {
        let mut allow = registry();
        allow.set_allowed_includes([IncludedRelationship::new("relatedModels").alias("include-alias")]);
        assert_eq!(
            allow.allowed(QueryKind::Include),
            ["include-alias", "include-aliasCount"]
        );
        assert!(allow.resolve_include("relatedModelsCount").is_none());
        let count = allow.resolve_include("include-aliasCount").unwrap();
        assert_eq!(count.property().name(), "relatedModels");
    }

    #[test]
    fn bare_include_lists_itself_before_its_count() {
        let mut allow = registry();
        allow.set_allowed_includes(["relatedModels", "otherRelatedModels"]);
        assert_eq!(
            allow.allowed(QueryKind::Include),
            [
                "relatedModels",
                "relatedModelsCount",
                "otherRelatedModels",
                "otherRelatedModelsCount"
            ]
        );
    }

    #[test]
    fn sorts_strip_direction_and_keep_aliases() {
        let mut allow = registry();
        allow.set_allowed_sorts([
            AllowedSort::from("-name"),
            FieldSort::new("created_at").alias("joined").into(),
        ]);
        assert_eq!(allow.allowed(QueryKind::Sort), ["name", "joined"]);
        assert_eq!(
            allow.resolve_sort("joined").unwrap().property().name(),
            "created_at"
        );
    }

    #[test]
    fn fields_are_qualified_with_default_group() {
        let mut allow = registry();
        allow.set_allowed_fields(["id", " name ", "related_models.name", ""]);
        assert_eq!(
            allow.allowed(QueryKind::Field),
            ["test_models.id", "test_models.name", "related_models.name"]
        );

        let mut groups = IndexMap::new();
        groups.insert("test_models".to_string(), vec!["id".to_string(), "secret".to_string()]);
        let err = allow.validate_fields(&groups).unwrap_err();
        assert_eq!(err.unknown(), ["test_models.secret"]);
    }

    #[test]
    fn validation_reports_unknown_and_allowed() {
        let mut allow = registry();
        allow.set_allowed_filters(["name", "id"]);
        let err = allow
            .validate(QueryKind::Filter, &["random", "name", "other"])
            .unwrap_err();
        assert!(matches!(err, WizardError::InvalidFilterQuery { .. }));
        assert_eq!(err.unknown(), ["random", "other"]);
        assert_eq!(err.allowed(), ["name", "id"]);
    }

    #[test]
    fn unset_allow_list_rejects_requests_but_accepts_empty() {
        let allow = registry();
        let none: [&str; 0] = [];
        assert!(allow.validate(QueryKind::Append, &none).is_ok());
        let err = allow.validate(QueryKind::Append, &["fullname"]).unwrap_err();
        assert!(err.allowed().is_empty());
    }

    #[test]
    fn filter_defaults_and_replacement() {
        let mut allow = registry();
        allow.set_allowed_filters([
            AllowedFilter::from(ExactFilter::new("name").default("John")),
            "id".into(),
        ]);
        assert_eq!(allow.filters_with_defaults().len(), 1);

        allow.set_allowed_filters(["other"]);
        assert_eq!(allow.allowed(QueryKind::Filter), ["other"]);
        assert!(allow.filters_with_defaults().is_empty());
    }

    #[test]
    fn default_sorts_dedup_by_field() {
        let mut allow = registry();
        allow.set_default_sorts(["name", "-name", "-id"]);
        assert_eq!(
            allow.default_sorts(),
            [
                Sort::new("name", SortDirection::Asc),
                Sort::new("id", SortDirection::Desc)
            ]
        );
    }

    #[test]
    fn custom_default_handlers() {
        struct AllScopes;
        impl DefaultHandlers for AllScopes {
            fn filter(&self, name: &str) -> Arc<dyn FilterHandler> {
                Arc::new(ScopeFilter::new(name))
            }
            fn sort(&self, name: &str) -> Arc<dyn SortHandler> {
                ScoutDefaults.sort(name)
            }
            fn include(&self, name: &str, suffix: &str) -> Arc<dyn IncludeHandler> {
                ScoutDefaults.include(name, suffix)
            }
        }

        let mut allow = registry();
        allow.set_default_handlers(Arc::new(AllScopes));
        allow.set_allowed_filters(["named"]);
        assert!(allow.resolve_filter("named").is_some());
    }
}
