//! Built-in filter handlers.

use std::sync::Arc;

use anyhow::Result;

use super::{FilterHandler, HandlerContext, NamedProperty};
use crate::schema::is_relation_property;
use crate::search::SearchBuilder;
use crate::value::FilterValue;

/// Exact match: a list value becomes a set-membership predicate, anything
/// else an equality predicate.
///
/// `relatedModels.name` style properties whose first segment is a relation
/// of the searched model become a deferred relation-existence constraint,
/// since the search engine cannot see related rows.
#[derive(Debug, Clone)]
pub struct ExactFilter {
    property: NamedProperty,
    default: Option<FilterValue>,
    relation_constraint: bool,
}

impl ExactFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            property: NamedProperty::new(name),
            default: None,
            relation_constraint: true,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.property = self.property.with_alias(alias);
        self
    }

    pub fn default(mut self, value: impl Into<FilterValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Treat dotted properties as plain search fields.
    pub fn without_relation_constraint(mut self) -> Self {
        self.relation_constraint = false;
        self
    }
}

impl FilterHandler for ExactFilter {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn default_value(&self) -> Option<&FilterValue> {
        self.default.as_ref()
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext,
        query: &mut SearchBuilder,
        value: &FilterValue,
    ) -> Result<()> {
        let property = self.property.name();

        if self.relation_constraint && is_relation_property(ctx.model(), property) {
            if let Some((relation, column)) = property.rsplit_once('.') {
                let relation = relation.to_string();
                let column = column.to_string();
                let value = value.clone();
                ctx.defer(move |q| {
                    q.where_has(&relation, |related| {
                        let column = related.qualify_column(&column);
                        if value.is_multiple() {
                            related.where_in(column, value.items());
                        } else {
                            related.where_eq(column, value.clone());
                        }
                        Ok(())
                    })?;
                    Ok(())
                });
                return Ok(());
            }
        }

        if value.is_multiple() {
            query.where_in(property, value.items());
        } else {
            query.where_eq(property, value.clone());
        }
        Ok(())
    }
}

/// Calls a named model scope with the value spread into arguments.
///
/// `relatedModels.named` calls the `named` scope of the related model inside
/// a relation-existence constraint.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    property: NamedProperty,
    default: Option<FilterValue>,
}

impl ScopeFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            property: NamedProperty::new(name),
            default: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.property = self.property.with_alias(alias);
        self
    }

    pub fn default(mut self, value: impl Into<FilterValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl FilterHandler for ScopeFilter {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn default_value(&self) -> Option<&FilterValue> {
        self.default.as_ref()
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext,
        _query: &mut SearchBuilder,
        value: &FilterValue,
    ) -> Result<()> {
        let name = self.property.name();
        let args = value.items();

        match name.rsplit_once('.') {
            Some((relation, scope)) if is_relation_property(ctx.model(), name) => {
                let relation = relation.to_string();
                let scope = scope.to_string();
                ctx.defer(move |q| {
                    q.where_has(&relation, |related| {
                        related.scope(&scope, &args)?;
                        Ok(())
                    })?;
                    Ok(())
                });
            }
            _ => {
                let scope = name.to_string();
                ctx.defer(move |q| {
                    q.scope(&scope, &args)?;
                    Ok(())
                });
            }
        }
        Ok(())
    }
}

/// Soft-delete visibility: `with` includes deleted records, `only` restricts
/// to them, any other value excludes them.
#[derive(Debug, Clone)]
pub struct TrashedFilter {
    property: NamedProperty,
    default: Option<FilterValue>,
}

impl TrashedFilter {
    /// Filter named `trashed`.
    pub fn new() -> Self {
        Self::named("trashed")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            property: NamedProperty::new(name),
            default: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.property = self.property.with_alias(alias);
        self
    }

    pub fn default(mut self, value: impl Into<FilterValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl Default for TrashedFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterHandler for TrashedFilter {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn default_value(&self) -> Option<&FilterValue> {
        self.default.as_ref()
    }

    fn handle(
        &self,
        _ctx: &mut HandlerContext,
        query: &mut SearchBuilder,
        value: &FilterValue,
    ) -> Result<()> {
        match value.as_str() {
            Some("with") => query.with_trashed(),
            Some("only") => query.only_trashed(),
            _ => query.without_trashed(),
        };
        Ok(())
    }
}

type FilterCallback =
    Arc<dyn Fn(&mut HandlerContext, &mut SearchBuilder, &FilterValue) -> Result<()> + Send + Sync>;

/// Forwards the filter to a closure.
#[derive(Clone)]
pub struct CallbackFilter {
    property: NamedProperty,
    default: Option<FilterValue>,
    callback: FilterCallback,
}

impl std::fmt::Debug for CallbackFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackFilter")
            .field("property", &self.property)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl CallbackFilter {
    pub fn new(
        name: impl Into<String>,
        callback: impl Fn(&mut HandlerContext, &mut SearchBuilder, &FilterValue) -> Result<()>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            property: NamedProperty::new(name),
            default: None,
            callback: Arc::new(callback),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.property = self.property.with_alias(alias);
        self
    }

    pub fn default(mut self, value: impl Into<FilterValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl FilterHandler for CallbackFilter {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn default_value(&self) -> Option<&FilterValue> {
        self.default.as_ref()
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext,
        query: &mut SearchBuilder,
        value: &FilterValue,
    ) -> Result<()> {
        (self.callback)(ctx, query, value)
    }
}
