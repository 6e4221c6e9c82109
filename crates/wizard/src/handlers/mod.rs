//! Filter, sort and include handlers.
//!
//! Each requested alias resolves to one handler. Filter and sort handlers
//! act on the search query directly or defer relational work through the
//! [`HandlerContext`]; include handlers always run inside the relational
//! refinement, against the hydration query.

mod filters;
mod includes;
mod sorts;

pub use filters::{CallbackFilter, ExactFilter, ScopeFilter, TrashedFilter};
pub use includes::{CallbackInclude, IncludedCount, IncludedRelationship};
pub use sorts::{CallbackSort, FieldSort};

use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;

use crate::config::WizardConfig;
use crate::relational::RelationalQuery;
use crate::schema::{ModelSchema, Schema};
use crate::search::SearchBuilder;
use crate::types::SortDirection;
use crate::value::FilterValue;

/// A deferred refinement of the relational hydration query.
pub type Refinement = Arc<dyn Fn(&mut RelationalQuery) -> Result<()> + Send + Sync>;

/// Canonical property path plus the public alias requests use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedProperty {
    name: String,
    alias: Option<String>,
}

impl NamedProperty {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Canonical dotted path, e.g. `relatedModels.name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public name; defaults to the canonical name.
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// Applies one requested filter.
pub trait FilterHandler: Send + Sync {
    fn property(&self) -> &NamedProperty;

    /// Value applied when the request carries no filters at all.
    fn default_value(&self) -> Option<&FilterValue> {
        None
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext,
        query: &mut SearchBuilder,
        value: &FilterValue,
    ) -> Result<()>;
}

/// Applies one requested sort.
pub trait SortHandler: Send + Sync {
    fn property(&self) -> &NamedProperty;

    fn handle(
        &self,
        ctx: &mut HandlerContext,
        query: &mut SearchBuilder,
        direction: SortDirection,
    ) -> Result<()>;
}

/// Applies one requested include to the hydration query.
pub trait IncludeHandler: Send + Sync {
    fn property(&self) -> &NamedProperty;

    /// Whether registering this include also registers its intermediate
    /// relation paths and their counts.
    fn expands(&self) -> bool {
        false
    }

    fn handle(&self, fields: &RequestedFields, query: &mut RelationalQuery) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Requested column groups, shared with deferred include handlers.
#[derive(Debug, Clone, Default)]
pub struct RequestedFields(Arc<IndexMap<String, Vec<String>>>);

impl RequestedFields {
    pub fn new(groups: IndexMap<String, Vec<String>>) -> Self {
        Self(Arc::new(groups))
    }

    pub fn group(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn groups(&self) -> &IndexMap<String, Vec<String>> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Columns requested for the relation at `path` from `model`, qualified
    /// with the related table. Empty when the group was not requested.
    pub fn for_relation(&self, schema: &Schema, model: &ModelSchema, path: &str) -> Vec<String> {
        let Some(key) = schema.table_path(model, path) else {
            return Vec::new();
        };
        let table = key.rsplit('.').next().unwrap_or(&key).to_string();
        self.group(&key)
            .map(|columns| {
                columns
                    .iter()
                    .map(|column| {
                        if column.contains('.') {
                            column.clone()
                        } else {
                            format!("{table}.{column}")
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// State shared by handlers while one request is applied.
pub struct HandlerContext {
    schema: Arc<Schema>,
    model: Arc<ModelSchema>,
    config: WizardConfig,
    fields: RequestedFields,
    refinements: Vec<Refinement>,
}

impl HandlerContext {
    pub fn new(schema: Arc<Schema>, model: Arc<ModelSchema>, config: WizardConfig) -> Self {
        Self {
            schema,
            model,
            config,
            fields: RequestedFields::default(),
            refinements: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Model of the search subject.
    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.model
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    pub fn fields(&self) -> &RequestedFields {
        &self.fields
    }

    pub(crate) fn set_fields(&mut self, fields: RequestedFields) {
        self.fields = fields;
    }

    /// Queue a refinement for the relational hydration query.
    pub fn defer(
        &mut self,
        refinement: impl Fn(&mut RelationalQuery) -> Result<()> + Send + Sync + 'static,
    ) {
        self.refinements.push(Arc::new(refinement));
    }

    /// Refinements queued so far, in order.
    pub fn refinements(&self) -> &[Refinement] {
        &self.refinements
    }

    pub(crate) fn take_refinements(&mut self) -> Vec<Refinement> {
        std::mem::take(&mut self.refinements)
    }
}
