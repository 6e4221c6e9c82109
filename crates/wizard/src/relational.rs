//! Relational refinement query.
//!
//! A structured plan over one model: column projection, constraints
//! (including nested relation-existence constraints), eager loads and
//! relation counts. Record stores execute the plan; [`RelationalQuery::to_sql`]
//! renders it for PostgreSQL.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use sea_query::{
    Alias, Asterisk, Expr, PostgresQueryBuilder, Query, SelectStatement, SimpleExpr,
};

use crate::schema::{ModelSchema, Relation, Schema, snake_case};
use crate::value::FilterValue;

/// A row constraint. Columns may be bare or table-qualified.
#[derive(Debug, Clone)]
pub enum Constraint {
    Eq {
        column: String,
        value: FilterValue,
    },
    In {
        column: String,
        values: Vec<FilterValue>,
    },
    Between {
        column: String,
        low: FilterValue,
        high: FilterValue,
    },
    /// At least one related row satisfies every nested constraint.
    Has {
        relation: Relation,
        target: Arc<ModelSchema>,
        constraints: Vec<Constraint>,
    },
}

/// An eager-loaded relation path with an optional column restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerLoad {
    pub path: String,
    /// Empty means every column.
    pub columns: Vec<String>,
}

/// Relational query over one model.
#[derive(Debug, Clone)]
pub struct RelationalQuery {
    schema: Arc<Schema>,
    model: Arc<ModelSchema>,
    columns: Vec<String>,
    constraints: Vec<Constraint>,
    eager_loads: Vec<EagerLoad>,
    counts: Vec<String>,
}

impl RelationalQuery {
    pub fn new(schema: Arc<Schema>, model: Arc<ModelSchema>) -> Self {
        Self {
            schema,
            model,
            columns: Vec::new(),
            constraints: Vec::new(),
            eager_loads: Vec::new(),
            counts: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.model
    }

    /// Selected columns; empty means every column.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn eager_loads(&self) -> &[EagerLoad] {
        &self.eager_loads
    }

    /// Relations whose row counts are selected as `<snake_relation>_count`.
    pub fn counts(&self) -> &[String] {
        &self.counts
    }

    /// Replace the column selection.
    pub fn select<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn where_eq(&mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> &mut Self {
        self.constraints.push(Constraint::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_in(&mut self, column: impl Into<String>, values: Vec<FilterValue>) -> &mut Self {
        self.constraints.push(Constraint::In {
            column: column.into(),
            values,
        });
        self
    }

    pub fn where_between(
        &mut self,
        column: impl Into<String>,
        low: impl Into<FilterValue>,
        high: impl Into<FilterValue>,
    ) -> &mut Self {
        self.constraints.push(Constraint::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
        });
        self
    }

    /// Constrain to rows with at least one related row along `path`
    /// (dot-separated) for which `constrain` holds.
    pub fn where_has<F>(&mut self, path: &str, constrain: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut RelationalQuery) -> Result<()>,
    {
        let (first, rest) = match path.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (path, None),
        };
        let relation = self
            .model
            .relation_named(first)
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "relation `{first}` is not defined on model `{}`",
                    self.model.name()
                )
            })?;
        let target = self.schema.require(&relation.target)?;

        let mut related = RelationalQuery::new(self.schema.clone(), target.clone());
        match rest {
            Some(rest) => {
                related.where_has(rest, constrain)?;
            }
            None => constrain(&mut related)?,
        }

        self.constraints.push(Constraint::Has {
            relation,
            target,
            constraints: related.constraints,
        });
        Ok(self)
    }

    /// Apply a named scope of the model.
    pub fn scope(&mut self, name: &str, args: &[FilterValue]) -> Result<&mut Self> {
        let scope = self.model.scope_named(name).ok_or_else(|| {
            anyhow!(
                "scope `{name}` is not defined on model `{}`",
                self.model.name()
            )
        })?;
        scope(self, args)?;
        Ok(self)
    }

    /// Eager-load a relation path. Loading the same path again replaces
    /// its column restriction.
    pub fn with(&mut self, path: &str, columns: Vec<String>) -> Result<&mut Self> {
        self.schema.resolve_path(&self.model, path)?;
        match self.eager_loads.iter_mut().find(|load| load.path == path) {
            Some(load) => load.columns = columns,
            None => self.eager_loads.push(EagerLoad {
                path: path.to_string(),
                columns,
            }),
        }
        Ok(self)
    }

    /// Select the row count of a direct relation.
    pub fn with_count(&mut self, relation: &str) -> Result<&mut Self> {
        if self.model.relation_named(relation).is_none() {
            return Err(anyhow!(
                "relation `{relation}` is not defined on model `{}`",
                self.model.name()
            ));
        }
        if !self.counts.iter().any(|c| c == relation) {
            self.counts.push(relation.to_string());
        }
        Ok(self)
    }

    /// Qualify a bare column with the model's table.
    pub fn qualify_column(&self, column: &str) -> String {
        self.model.qualify_column(column)
    }

    /// Build the SELECT statement for this plan.
    pub fn to_select(&self) -> SelectStatement {
        let table = self.model.table();
        let mut query = Query::select();

        if self.columns.is_empty() {
            query.column((Alias::new(table), Asterisk));
        } else {
            for column in &self.columns {
                query.column(column_ref(table, column));
            }
        }

        query.from(Alias::new(table));

        for relation_name in &self.counts {
            let Some(relation) = self.model.relation_named(relation_name) else {
                continue;
            };
            let Some(target) = self.schema.model(&relation.target) else {
                continue;
            };
            let count = Query::select()
                .expr(Expr::col(Asterisk).count())
                .from(Alias::new(target.table()))
                .and_where(join_condition(relation, table, target.table()))
                .to_owned();
            query.expr_as(
                Expr::cust(format!("({})", count.to_string(PostgresQueryBuilder))),
                Alias::new(format!("{}_count", snake_case(relation_name))),
            );
        }

        for constraint in &self.constraints {
            query.and_where(constraint.to_expr(table));
        }

        query
    }

    /// Render as PostgreSQL.
    pub fn to_sql(&self) -> String {
        self.to_select().to_string(PostgresQueryBuilder)
    }
}

impl Constraint {
    /// Condition expression against rows of `table`.
    pub fn to_expr(&self, table: &str) -> SimpleExpr {
        match self {
            Constraint::Eq { column, value } => {
                Expr::col(column_ref(table, column)).eq(value.to_sql_value())
            }
            Constraint::In { column, values } => Expr::col(column_ref(table, column))
                .is_in(values.iter().map(FilterValue::to_sql_value)),
            Constraint::Between { column, low, high } => Expr::col(column_ref(table, column))
                .between(low.to_sql_value(), high.to_sql_value()),
            Constraint::Has {
                relation,
                target,
                constraints,
            } => {
                let mut exists = Query::select();
                exists
                    .expr(Expr::val(1))
                    .from(Alias::new(target.table()))
                    .and_where(join_condition(relation, table, target.table()));
                for nested in constraints {
                    exists.and_where(nested.to_expr(target.table()));
                }
                Expr::exists(exists)
            }
        }
    }
}

fn column_ref(table: &str, column: &str) -> (Alias, Alias) {
    match column.split_once('.') {
        Some((qualifier, name)) => (Alias::new(qualifier), Alias::new(name)),
        None => (Alias::new(table), Alias::new(column)),
    }
}

fn join_condition(relation: &Relation, parent_table: &str, related_table: &str) -> SimpleExpr {
    Expr::col((Alias::new(related_table), Alias::new(relation.related_column())))
        .equals((Alias::new(parent_table), Alias::new(relation.parent_column())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new()
                .with_model(
                    ModelSchema::new("TestModel", "test_models")
                        .has_many("relatedModels", "RelatedModel", "test_model_id")
                        .scope("named", |query, args| {
                            let name = args.first().map(FilterValue::to_text).unwrap_or_default();
                            query.where_eq("name", name);
                            Ok(())
                        }),
                )
                .with_model(
                    ModelSchema::new("RelatedModel", "related_models").has_many(
                        "nestedRelatedModels",
                        "NestedRelatedModel",
                        "related_model_id",
                    ),
                )
                .with_model(ModelSchema::new("NestedRelatedModel", "nested_related_models")),
        )
    }

    fn query() -> RelationalQuery {
        let schema = schema();
        let model = schema.model("TestModel").unwrap();
        RelationalQuery::new(schema, model)
    }

    #[test]
    fn select_replaces_columns() {
        let mut q = query();
        q.select(["id", "name"]);
        q.select(["test_models.name"]);
        assert_eq!(q.columns(), ["test_models.name"]);
        assert_eq!(q.to_sql(), r#"SELECT "test_models"."name" FROM "test_models""#);
    }

    #[test]
    fn where_in_and_eq_render() {
        let mut q = query();
        q.where_in("test_models.id", vec![1i64.into(), 2i64.into()])
            .where_eq("name", "x");
        assert_eq!(
            q.to_sql(),
            r#"SELECT "test_models".* FROM "test_models" WHERE "test_models"."id" IN (1, 2) AND "test_models"."name" = 'x'"#
        );
    }

    #[test]
    fn nested_where_has_builds_exists_chain() {
        let mut q = query();
        q.where_has("relatedModels.nestedRelatedModels", |nested| {
            nested.where_eq("nested_related_models.name", "test0");
            Ok(())
        })
        .unwrap();

        let [Constraint::Has { constraints, target, .. }] = q.constraints() else {
            panic!("expected one Has constraint");
        };
        assert_eq!(target.table(), "related_models");
        assert!(matches!(constraints.as_slice(), [Constraint::Has { .. }]));

        let sql = q.to_sql();
        assert!(sql.contains(r#"EXISTS(SELECT 1 FROM "related_models""#), "{sql}");
        assert!(sql.contains(r#"EXISTS(SELECT 1 FROM "nested_related_models""#), "{sql}");
        assert!(sql.contains(r#""nested_related_models"."name" = 'test0'"#), "{sql}");
    }

    #[test]
    fn where_has_unknown_relation_fails() {
        let mut q = query();
        assert!(q.where_has("bogus", |_| Ok(())).is_err());
        assert!(q.constraints().is_empty());
    }

    #[test]
    fn scopes_apply_or_fail() {
        let mut q = query();
        q.scope("named", &["John".into()]).unwrap();
        assert_eq!(q.constraints().len(), 1);
        assert!(q.scope("missing", &[]).is_err());
    }

    #[test]
    fn eager_loads_and_counts() {
        let mut q = query();
        q.with("relatedModels", vec![]).unwrap();
        q.with("relatedModels", vec!["related_models.name".to_string()])
            .unwrap();
        q.with("relatedModels.nestedRelatedModels", vec![]).unwrap();
        assert!(q.with("nestedRelatedModels", vec![]).is_err());
        assert_eq!(q.eager_loads().len(), 2);
        assert_eq!(q.eager_loads()[0].columns, ["related_models.name"]);

        q.with_count("relatedModels").unwrap();
        q.with_count("relatedModels").unwrap();
        assert_eq!(q.counts(), ["relatedModels"]);
        assert!(q.to_sql().contains(r#"AS "related_models_count""#));
    }

    #[test]
    fn between_renders() {
        let mut q = query();
        q.where_between("created_at", "2016-01-01", "2017-01-01");
        assert!(
            q.to_sql()
                .contains(r#""test_models"."created_at" BETWEEN '2016-01-01' AND '2017-01-01'"#)
        );
    }
}
