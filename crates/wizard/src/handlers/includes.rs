//! Built-in include handlers.

use std::sync::Arc;

use anyhow::Result;

use super::{IncludeHandler, NamedProperty, RequestedFields};
use crate::relational::RelationalQuery;

/// Eager-loads a relation path and every relation on the way to it.
///
/// Each level is restricted to the columns requested for its field group,
/// keyed by the related tables (`fields[related_models.test_models]=id` for
/// `relatedModels.testModel`).
#[derive(Debug, Clone)]
pub struct IncludedRelationship {
    property: NamedProperty,
}

impl IncludedRelationship {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            property: NamedProperty::new(path),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.property = self.property.with_alias(alias);
        self
    }
}

impl IncludeHandler for IncludedRelationship {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn expands(&self) -> bool {
        true
    }

    fn handle(&self, fields: &RequestedFields, query: &mut RelationalQuery) -> Result<()> {
        let schema = query.schema().clone();
        let model = query.model().clone();

        let segments: Vec<&str> = self.property.name().split('.').collect();
        for depth in 1..=segments.len() {
            let path = segments[..depth].join(".");
            let columns = fields.for_relation(&schema, &model, &path);
            query.with(&path, columns)?;
        }
        Ok(())
    }
}

/// Loads the row count of a relation as `<snake_relation>_count`.
#[derive(Debug, Clone)]
pub struct IncludedCount {
    property: NamedProperty,
}

impl IncludedCount {
    /// Count of `relation`; requested as `alias` (default: the relation name).
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            property: NamedProperty::new(relation),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.property = self.property.with_alias(alias);
        self
    }
}

impl IncludeHandler for IncludedCount {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn handle(&self, _fields: &RequestedFields, query: &mut RelationalQuery) -> Result<()> {
        query.with_count(self.property.name())?;
        Ok(())
    }
}

type IncludeCallback =
    Arc<dyn Fn(&RequestedFields, &mut RelationalQuery) -> Result<()> + Send + Sync>;

/// Forwards the include to a closure.
#[derive(Clone)]
pub struct CallbackInclude {
    property: NamedProperty,
    callback: IncludeCallback,
}

impl std::fmt::Debug for CallbackInclude {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackInclude")
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}

impl CallbackInclude {
    pub fn new(
        name: impl Into<String>,
        callback: impl Fn(&RequestedFields, &mut RelationalQuery) -> Result<()> + Send + Sync + 'static,
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

impl IncludeHandler for CallbackInclude {
    fn property(&self) -> &NamedProperty {
        &self.property
    }

    fn handle(&self, fields: &RequestedFields, query: &mut RelationalQuery) -> Result<()> {
        (self.callback)(fields, query)
    }
}
