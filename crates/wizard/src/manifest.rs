//! TOML manifest describing models and one wizard's allow-lists.
//!
//! Used by the `scout-wizard explain` command to build a wizard without
//! application code. Scopes are limited to equality and range scopes on a
//! single column; appends are validated but never computed.

use std::path::Path;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::handlers::{ExactFilter, ScopeFilter, TrashedFilter};
use crate::registry::AllowedFilter;
use crate::schema::{ModelSchema, RelationKind, Schema};
use crate::value::FilterValue;
use crate::wizard::ScoutQueryWizard;

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Model the wizard searches.
    pub model: String,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
    #[serde(default)]
    pub allow: AllowEntry,
    #[serde(default)]
    pub defaults: DefaultsEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub table: String,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default)]
    pub soft_deletes: bool,
    #[serde(default)]
    pub relations: Vec<RelationEntry>,
    #[serde(default)]
    pub scopes: Vec<ScopeEntry>,
}

fn default_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKindEntry {
    HasMany,
    HasOne,
    BelongsTo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationEntry {
    pub name: String,
    pub kind: RelationKindEntry,
    pub target: String,
    pub foreign_key: String,
    /// Parent key for has-many/has-one, owner key for belongs-to
    /// (default: the relevant model's key).
    pub local_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    #[default]
    Equals,
    Between,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeEntry {
    pub name: String,
    pub column: String,
    #[serde(default)]
    pub kind: ScopeKind,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllowEntry {
    pub filters: Option<Vec<String>>,
    #[serde(default)]
    pub scope_filters: Vec<String>,
    /// Allow the `trashed` filter.
    #[serde(default)]
    pub trashed: bool,
    pub sorts: Option<Vec<String>>,
    pub includes: Option<Vec<String>>,
    pub fields: Option<Vec<String>>,
    pub appends: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsEntry {
    #[serde(default)]
    pub sorts: Vec<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub appends: Vec<String>,
    /// Group → columns.
    #[serde(default)]
    pub fields: IndexMap<String, Vec<String>>,
    /// Default values for exact filters.
    #[serde(default)]
    pub filters: IndexMap<String, JsonValue>,
}

impl Manifest {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid manifest")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&source)
    }

    /// Build the model catalog.
    pub fn schema(&self) -> Result<Schema> {
        let mut schema = Schema::new();
        for entry in &self.models {
            let mut model = ModelSchema::new(&entry.name, &entry.table).with_key(&entry.key);
            if entry.soft_deletes {
                model = model.soft_deletes();
            }
            for relation in &entry.relations {
                let kind = match relation.kind {
                    RelationKindEntry::HasMany => RelationKind::HasMany,
                    RelationKindEntry::HasOne => RelationKind::HasOne,
                    RelationKindEntry::BelongsTo => RelationKind::BelongsTo,
                };
                let local_key = relation.local_key.clone().unwrap_or_else(|| match kind {
                    RelationKind::BelongsTo => "id".to_string(),
                    _ => entry.key.clone(),
                });
                model = model.relation(
                    kind,
                    &relation.name,
                    &relation.target,
                    &relation.foreign_key,
                    local_key,
                );
            }
            for scope in &entry.scopes {
                let column = scope.column.clone();
                let name = scope.name.clone();
                model = match scope.kind {
                    ScopeKind::Equals => model.scope(&scope.name, move |q, args| {
                        let Some(value) = args.first() else {
                            bail!("scope `{name}` expects one argument");
                        };
                        let column = q.qualify_column(&column);
                        q.where_eq(column, value.clone());
                        Ok(())
                    }),
                    ScopeKind::Between => model.scope(&scope.name, move |q, args| {
                        let [low, high] = args else {
                            bail!("scope `{name}` expects two arguments");
                        };
                        let column = q.qualify_column(&column);
                        q.where_between(column, low.clone(), high.clone());
                        Ok(())
                    }),
                };
            }
            schema = schema.with_model(model);
        }

        if schema.model(&self.model).is_none() {
            bail!("searched model `{}` is not declared", self.model);
        }
        Ok(schema)
    }

    /// Apply the allow-lists and defaults to a wizard.
    pub fn configure(&self, mut wizard: ScoutQueryWizard) -> ScoutQueryWizard {
        let allow = &self.allow;
        let defaults = &self.defaults;

        let has_filters =
            allow.filters.is_some() || !allow.scope_filters.is_empty() || allow.trashed;
        if has_filters {
            let mut filters: Vec<AllowedFilter> = Vec::new();
            for name in allow.filters.iter().flatten() {
                let mut filter = ExactFilter::new(name);
                if let Some(value) = defaults.filters.get(name) {
                    filter = filter.default(FilterValue::from(value.clone()));
                }
                filters.push(filter.into());
            }
            filters.extend(allow.scope_filters.iter().map(|name| ScopeFilter::new(name).into()));
            if allow.trashed {
                filters.push(TrashedFilter::new().into());
            }
            wizard = wizard.set_allowed_filters(filters);
        }
        if let Some(sorts) = &allow.sorts {
            wizard = wizard.set_allowed_sorts(sorts.iter().map(String::as_str));
        }
        if let Some(includes) = &allow.includes {
            wizard = wizard.set_allowed_includes(includes.iter().map(String::as_str));
        }
        if let Some(fields) = &allow.fields {
            wizard = wizard.set_allowed_fields(fields);
        }
        if let Some(appends) = &allow.appends {
            wizard = wizard.set_allowed_appends(appends);
        }

        wizard = wizard
            .set_default_sorts(defaults.sorts.iter().map(String::as_str))
            .set_default_includes(&defaults.includes)
            .set_default_appends(&defaults.appends);
        for (group, columns) in &defaults.fields {
            wizard = wizard.set_default_fields(group, columns);
        }
        wizard
    }
}
