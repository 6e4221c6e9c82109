//! Model catalog: tables, keys, relations, scopes and accessors.
//!
//! Relation detection and scope dispatch go through this explicit catalog
//! instead of inspecting model types at runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::record::Record;
use crate::relational::RelationalQuery;
use crate::value::FilterValue;

/// A named query scope. Receives the relational query and the filter value
/// spread into arguments.
pub type ScopeFn = Arc<dyn Fn(&mut RelationalQuery, &[FilterValue]) -> Result<()> + Send + Sync>;

/// A computed attribute that can be appended to serialized records.
pub type AccessorFn = Arc<dyn Fn(&Record) -> JsonValue + Send + Sync>;

/// Relation cardinality and key direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Related rows hold `foreign_key` pointing at the parent's `local_key`.
    HasMany,
    /// Like `HasMany`, at most one related row.
    HasOne,
    /// The parent holds `foreign_key` pointing at the related `local_key`.
    BelongsTo,
}

/// A declared relation between two models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Name of the related model in the schema.
    pub target: String,
    pub foreign_key: String,
    pub local_key: String,
}

impl Relation {
    /// Column on the parent side of the join.
    pub fn parent_column(&self) -> &str {
        match self.kind {
            RelationKind::HasMany | RelationKind::HasOne => &self.local_key,
            RelationKind::BelongsTo => &self.foreign_key,
        }
    }

    /// Column on the related side of the join.
    pub fn related_column(&self) -> &str {
        match self.kind {
            RelationKind::HasMany | RelationKind::HasOne => &self.foreign_key,
            RelationKind::BelongsTo => &self.local_key,
        }
    }

    pub fn is_many(&self) -> bool {
        self.kind == RelationKind::HasMany
    }
}

/// A searchable model.
#[derive(Clone)]
pub struct ModelSchema {
    name: String,
    table: String,
    key: String,
    soft_deletes: bool,
    relations: IndexMap<String, Relation>,
    scopes: HashMap<String, ScopeFn>,
    accessors: HashMap<String, AccessorFn>,
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scopes: Vec<_> = self.scopes.keys().collect();
        scopes.sort();
        let mut accessors: Vec<_> = self.accessors.keys().collect();
        accessors.sort();
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("key", &self.key)
            .field("soft_deletes", &self.soft_deletes)
            .field("relations", &self.relations)
            .field("scopes", &scopes)
            .field("accessors", &accessors)
            .finish()
    }
}

impl ModelSchema {
    /// Create a model stored in `table` with primary key `id`.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            key: "id".to_string(),
            soft_deletes: false,
            relations: IndexMap::new(),
            scopes: HashMap::new(),
            accessors: HashMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Mark the model as soft-deleting through a `deleted_at` column.
    pub fn soft_deletes(mut self) -> Self {
        self.soft_deletes = true;
        self
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let local_key = self.key.clone();
        self.relation(RelationKind::HasMany, name, target, foreign_key, local_key)
    }

    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let local_key = self.key.clone();
        self.relation(RelationKind::HasOne, name, target, foreign_key, local_key)
    }

    /// The related model's key is assumed to be `id`.
    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(RelationKind::BelongsTo, name, target, foreign_key, "id")
    }

    pub fn relation(
        mut self,
        kind: RelationKind,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        local_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.relations.insert(
            name.clone(),
            Relation {
                name,
                kind,
                target: target.into(),
                foreign_key: foreign_key.into(),
                local_key: local_key.into(),
            },
        );
        self
    }

    pub fn scope(
        mut self,
        name: impl Into<String>,
        scope: impl Fn(&mut RelationalQuery, &[FilterValue]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.scopes.insert(name.into(), Arc::new(scope));
        self
    }

    pub fn accessor(
        mut self,
        name: impl Into<String>,
        accessor: impl Fn(&Record) -> JsonValue + Send + Sync + 'static,
    ) -> Self {
        self.accessors.insert(name.into(), Arc::new(accessor));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn uses_soft_deletes(&self) -> bool {
        self.soft_deletes
    }

    pub fn relation_named(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn scope_named(&self, name: &str) -> Option<ScopeFn> {
        self.scopes.get(name).cloned()
    }

    pub fn accessor_named(&self, name: &str) -> Option<AccessorFn> {
        self.accessors.get(name).cloned()
    }

    /// Qualify a bare column with this model's table.
    pub fn qualify_column(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.table, column)
        }
    }
}

/// All models known to the application.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: HashMap<String, Arc<ModelSchema>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, replacing any model of the same name.
    pub fn with_model(mut self, model: ModelSchema) -> Self {
        self.models.insert(model.name.clone(), Arc::new(model));
        self
    }

    pub fn model(&self, name: &str) -> Option<Arc<ModelSchema>> {
        self.models.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<ModelSchema>> {
        self.model(name)
            .ok_or_else(|| anyhow!("model `{name}` is not registered"))
    }

    /// Follow a dotted relation path from `model`.
    ///
    /// Returns one `(relation, related model)` pair per segment.
    pub fn resolve_path(
        &self,
        model: &ModelSchema,
        path: &str,
    ) -> Result<Vec<(Relation, Arc<ModelSchema>)>> {
        let mut hops: Vec<(Relation, Arc<ModelSchema>)> = Vec::new();

        for segment in path.split('.') {
            let parent: &ModelSchema = match hops.last() {
                Some((_, target)) => target,
                None => model,
            };
            let relation = parent.relation_named(segment).cloned().ok_or_else(|| {
                anyhow!(
                    "relation `{segment}` is not defined on model `{}`",
                    parent.name
                )
            })?;
            let target = self.require(&relation.target)?;
            hops.push((relation, target));
        }

        Ok(hops)
    }

    /// Field-group key for a relation path: the related tables joined by `.`.
    ///
    /// `relatedModels.testModel` from `TestModel` gives
    /// `related_models.test_models`.
    pub fn table_path(&self, model: &ModelSchema, path: &str) -> Option<String> {
        let hops = self.resolve_path(model, path).ok()?;
        Some(
            hops.iter()
                .map(|(_, target)| target.table.as_str())
                .collect::<Vec<_>>()
                .join("."),
        )
    }
}

/// True when `property` is dotted and its first segment is a relation of `model`.
pub fn is_relation_property(model: &ModelSchema, property: &str) -> bool {
    match property.split_once('.') {
        Some((first, _)) => model.relation_named(first).is_some(),
        None => false,
    }
}

/// `relatedModels` → `related_models`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
