//! Built-in sort handlers.

use std::sync::Arc;

use anyhow::Result;

use super::{HandlerContext, NamedProperty, SortHandler};
use crate::search::SearchBuilder;
use crate::types::SortDirection;

/// Orders the search by the property name.
#[derive(Debug, Clone)]
pub struct FieldSort {
    property: NamedProperty,
}

impl FieldSort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            property: NamedProperty::new(name),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.property = self.property.with_alias(alias);
        self
    }
}

impl SortHandler for FieldSort {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn handle(
        &self,
        _ctx: &mut HandlerContext,
        query: &mut SearchBuilder,
        direction: SortDirection,
    ) -> Result<()> {
        query.order_by(self.property.name(), direction);
        Ok(())
    }
}

type SortCallback =
    Arc<dyn Fn(&mut HandlerContext, &mut SearchBuilder, SortDirection) -> Result<()> + Send + Sync>;

/// Forwards the sort to a closure.
#[derive(Clone)]
pub struct CallbackSort {
    property: NamedProperty,
    callback: SortCallback,
}

impl std::fmt::Debug for CallbackSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSort")
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}

impl CallbackSort {
    pub fn new(
        name: impl Into<String>,
        callback: impl Fn(&mut HandlerContext, &mut SearchBuilder, SortDirection) -> Result<()>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            property: NamedProperty::new(name),
            callback: Arc::new(callback),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.property = self.property.with_alias(alias);
        self
    }
}

impl SortHandler for CallbackSort {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext,
        query: &mut SearchBuilder,
        direction: SortDirection,
    ) -> Result<()> {
        (self.callback)(ctx, query, direction)
    }
}
