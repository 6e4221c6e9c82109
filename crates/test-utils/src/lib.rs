//! Scout wizard test utilities.
//!
//! An in-memory search engine and record store over shared tables, the
//! model schema the integration tests search, and seed data builders.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value as JsonValue};

use scout_wizard::relational::{Constraint, EagerLoad};
use scout_wizard::schema::snake_case;
use scout_wizard::search::{Page, SOFT_DELETED};
use scout_wizard::{
    FilterValue, ModelSchema, Record, RecordStore, Related, Relation, RelationalQuery, Schema,
    SearchBuilder, SearchEngine, SearchHits, Searchable, SortDirection,
};

/// A stored row.
pub type Row = Map<String, JsonValue>;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Tables of rows shared by the engine and the store.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &str, row: impl Into<Row>) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .push(row.into());
    }

    /// Snapshot of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Search engine
// ---------------------------------------------------------------------------

/// Search engine that scans a table.
///
/// Text matches any string attribute case-insensitively; equality is loose
/// (`true` matches `1`, `"2"` matches `2`). The soft-delete marker is
/// answered from the `deleted_at` column.
#[derive(Debug)]
pub struct MemoryEngine {
    db: Arc<MemoryDatabase>,
    searches: Mutex<usize>,
}

impl MemoryEngine {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self {
            db,
            searches: Mutex::new(0),
        }
    }

    /// Number of searches run so far.
    pub fn search_count(&self) -> usize {
        *self.searches.lock()
    }
}

impl SearchEngine for MemoryEngine {
    fn search(&self, builder: &SearchBuilder, page: Option<Page>) -> Result<SearchHits> {
        *self.searches.lock() += 1;

        let model = builder.model();
        let text = builder.query_text().trim().to_lowercase();
        let mut rows: Vec<Row> = self
            .db
            .rows(model.table())
            .into_iter()
            .filter(|row| matches_text(row, &text))
            .filter(|row| {
                builder
                    .wheres()
                    .iter()
                    .all(|(field, value)| matches_where(row, field, value))
            })
            .filter(|row| {
                builder.where_ins().iter().all(|(field, values)| {
                    values.iter().any(|value| loosely_equal(row.get(field), value))
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            for order in builder.orders() {
                let ordering = compare_json(a.get(&order.column), b.get(&order.column));
                let ordering = match order.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        let total = rows.len() as u64;
        let (offset, limit) = match page {
            Some(page) => (page.offset(), page.per_page),
            None => (0, rows.len()),
        };
        let keys: Vec<JsonValue> = rows
            .iter()
            .skip(offset)
            .take(limit)
            .map(|row| row.get(model.key()).cloned().unwrap_or(JsonValue::Null))
            .collect();

        tracing::debug!(model = %model.name(), total, returned = keys.len(), "memory search");
        Ok(SearchHits { keys, total })
    }
}

fn matches_text(row: &Row, text: &str) -> bool {
    text.is_empty()
        || row
            .values()
            .filter_map(JsonValue::as_str)
            .any(|value| value.to_lowercase().contains(text))
}

fn matches_where(row: &Row, field: &str, value: &FilterValue) -> bool {
    if field == SOFT_DELETED {
        let deleted = row.get("deleted_at").is_some_and(|at| !at.is_null());
        let marker = JsonValue::from(i64::from(deleted));
        return loosely_equal(Some(&marker), value);
    }
    loosely_equal(row.get(field), value)
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

/// Record store that evaluates relational queries against the tables.
///
/// Every query it receives is kept for inspection.
#[derive(Debug)]
pub struct MemoryStore {
    db: Arc<MemoryDatabase>,
    queries: Mutex<Vec<RelationalQuery>>,
}

impl MemoryStore {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self {
            db,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far, oldest first.
    pub fn queries(&self) -> Vec<RelationalQuery> {
        self.queries.lock().clone()
    }

    pub fn last_query(&self) -> Option<RelationalQuery> {
        self.queries.lock().last().cloned()
    }

    fn satisfies(&self, row: &Row, constraint: &Constraint) -> bool {
        match constraint {
            Constraint::Eq { column, value } => loosely_equal(row.get(column_name(column)), value),
            Constraint::In { column, values } => {
                let attribute = row.get(column_name(column));
                values.iter().any(|value| loosely_equal(attribute, value))
            }
            Constraint::Between { column, low, high } => {
                let Some(attribute) = row.get(column_name(column)).filter(|v| !v.is_null()) else {
                    return false;
                };
                let text = json_text(attribute);
                compare_text(&text, &filter_text(low)) != Ordering::Less
                    && compare_text(&text, &filter_text(high)) != Ordering::Greater
            }
            Constraint::Has {
                relation,
                target,
                constraints,
            } => self
                .related_rows(row, relation, target)
                .iter()
                .any(|related| constraints.iter().all(|c| self.satisfies(related, c))),
        }
    }

    fn related_rows(&self, row: &Row, relation: &Relation, target: &ModelSchema) -> Vec<Row> {
        let Some(parent) = row.get(relation.parent_column()).filter(|v| !v.is_null()) else {
            return Vec::new();
        };
        let parent = json_text(parent);
        self.db
            .rows(target.table())
            .into_iter()
            .filter(|related| {
                related
                    .get(relation.related_column())
                    .is_some_and(|value| json_text(value) == parent)
            })
            .collect()
    }

    fn hydrate(
        &self,
        schema: &Schema,
        model: &Arc<ModelSchema>,
        row: &Row,
        columns: &[String],
        counts: &[String],
        loads: &LoadNode,
    ) -> Result<Record> {
        let mut record = Record::new(model.clone(), project(row, columns));

        for name in counts {
            let relation = model
                .relation_named(name)
                .with_context(|| format!("no relation `{name}` on `{}`", model.name()))?;
            let target = schema.require(&relation.target)?;
            let count = self.related_rows(row, relation, &target).len();
            record.set(format!("{}_count", snake_case(name)), JsonValue::from(count));
        }

        for (name, node) in &loads.children {
            let relation = model
                .relation_named(name)
                .with_context(|| format!("no relation `{name}` on `{}`", model.name()))?;
            let target = schema.require(&relation.target)?;
            let related = self
                .related_rows(row, relation, &target)
                .iter()
                .map(|related| self.hydrate(schema, &target, related, &node.columns, &[], node))
                .collect::<Result<Vec<_>>>()?;
            let related = if relation.is_many() {
                Related::Many(related)
            } else {
                Related::One(related.into_iter().next().map(Box::new))
            };
            record.set_relation(name.clone(), related);
        }

        Ok(record)
    }
}

impl RecordStore for MemoryStore {
    fn fetch(&self, query: &RelationalQuery) -> Result<Vec<Record>> {
        self.queries.lock().push(query.clone());

        let model = query.model();
        let loads = LoadNode::from_loads(query.eager_loads());
        let mut records = Vec::new();
        for row in self.db.rows(model.table()) {
            if !query.constraints().iter().all(|c| self.satisfies(&row, c)) {
                continue;
            }
            records.push(self.hydrate(
                query.schema(),
                model,
                &row,
                query.columns(),
                query.counts(),
                &loads,
            )?);
        }
        Ok(records)
    }
}

/// Eager loads arranged by path segment.
#[derive(Debug, Default)]
struct LoadNode {
    columns: Vec<String>,
    children: Vec<(String, LoadNode)>,
}

impl LoadNode {
    fn from_loads(loads: &[EagerLoad]) -> Self {
        let mut root = LoadNode::default();
        for load in loads {
            let mut node = &mut root;
            for segment in load.path.split('.') {
                node = node.child(segment);
            }
            node.columns = load.columns.clone();
        }
        root
    }

    fn child(&mut self, name: &str) -> &mut LoadNode {
        let position = match self.children.iter().position(|(n, _)| n == name) {
            Some(position) => position,
            None => {
                self.children.push((name.to_string(), LoadNode::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[position].1
    }
}

fn project(row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .map(|column| column_name(column))
        .filter_map(|name| row.get(name).map(|value| (name.to_string(), value.clone())))
        .collect()
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

fn column_name(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

fn json_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => i64::from(*b).to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_text(value: &FilterValue) -> String {
    match value {
        FilterValue::Boolean(b) => i64::from(*b).to_string(),
        other => other.to_text(),
    }
}

/// Loose equality between a stored attribute and a filter value.
pub fn loosely_equal(attribute: Option<&JsonValue>, value: &FilterValue) -> bool {
    json_text(attribute.unwrap_or(&JsonValue::Null)) == filter_text(value)
}

fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    let a = a.map(json_text).unwrap_or_default();
    let b = b.map(json_text).unwrap_or_default();
    compare_text(&a, &b)
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Models the integration tests search.
///
/// `TestModel` (`test_models`) has many `relatedModels` and
/// `otherRelatedModels` and the scopes `named` and `created_between`;
/// `RelatedModel` belongs to `testModel` and has many
/// `nestedRelatedModels`; `SoftDeleteModel` soft-deletes; `AppendModel`
/// defines the `fullname` and `reversename` accessors.
pub fn test_schema() -> Schema {
    Schema::new()
        .with_model(
            ModelSchema::new("TestModel", "test_models")
                .has_many("relatedModels", "RelatedModel", "test_model_id")
                .has_many("otherRelatedModels", "OtherRelatedModel", "test_model_id")
                .scope("named", |query, args| {
                    let Some(name) = args.first() else {
                        bail!("scope `named` expects a name");
                    };
                    let column = query.qualify_column("name");
                    query.where_eq(column, name.clone());
                    Ok(())
                })
                .scope("created_between", |query, args| {
                    let [start, end] = args else {
                        bail!("scope `created_between` expects a start and an end");
                    };
                    let column = query.qualify_column("created_at");
                    query.where_between(column, start.clone(), end.clone());
                    Ok(())
                }),
        )
        .with_model(
            ModelSchema::new("RelatedModel", "related_models")
                .belongs_to("testModel", "TestModel", "test_model_id")
                .has_many("nestedRelatedModels", "NestedRelatedModel", "related_model_id")
                .scope("named", |query, args| {
                    let Some(name) = args.first() else {
                        bail!("scope `named` expects a name");
                    };
                    let column = query.qualify_column("name");
                    query.where_eq(column, name.clone());
                    Ok(())
                }),
        )
        .with_model(
            ModelSchema::new("NestedRelatedModel", "nested_related_models")
                .belongs_to("relatedModel", "RelatedModel", "related_model_id"),
        )
        .with_model(ModelSchema::new("OtherRelatedModel", "other_related_models"))
        .with_model(ModelSchema::new("SoftDeleteModel", "soft_delete_models").soft_deletes())
        .with_model(
            ModelSchema::new("AppendModel", "append_models")
                .accessor("fullname", |record| {
                    let first = record.get_str("firstname").unwrap_or_default();
                    let last = record.get_str("lastname").unwrap_or_default();
                    JsonValue::from(format!("{first} {last}"))
                })
                .accessor("reversename", |record| {
                    let first = record.get_str("firstname").unwrap_or_default();
                    let last = record.get_str("lastname").unwrap_or_default();
                    JsonValue::from(format!("{last} {first}"))
                }),
        )
}

/// Create a row with the given id.
pub fn test_row(id: i64) -> TestRow {
    let mut attributes = Row::new();
    attributes.insert("id".to_string(), JsonValue::from(id));
    TestRow { attributes }
}

/// A row builder for seeding tables.
#[derive(Debug, Clone, Default)]
pub struct TestRow {
    pub attributes: Row,
}

impl TestRow {
    /// Set any attribute.
    pub fn with(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_name(self, name: &str) -> Self {
        self.with("name", name)
    }

    /// Set `is_visible`.
    pub fn visible(self, visible: bool) -> Self {
        self.with("is_visible", visible)
    }

    pub fn created_at(self, at: &str) -> Self {
        self.with("created_at", at)
    }

    /// Point `foreign_key` at a parent row.
    pub fn belonging_to(self, foreign_key: &str, id: i64) -> Self {
        self.with(foreign_key, id)
    }

    /// Mark as soft-deleted.
    pub fn trashed(self, at: &str) -> Self {
        self.with("deleted_at", at)
    }
}

impl From<TestRow> for Row {
    fn from(row: TestRow) -> Self {
        row.attributes
    }
}

/// Names of the searchable test models, in id order.
pub const TEST_MODEL_NAMES: [&str; 5] = ["John Testing Doe", "Alice", "Bob", "Carol", "Dave"];

/// Fill the tables with the standard data set.
///
/// Five test models (ids 1-5, named after [`TEST_MODEL_NAMES`], visible when
/// odd, created on the first of months 1-5 of 2024). Each has one related
/// model with the same id and one other related model; test model 1 has a
/// second related model (id 6). Every related model has one nested model
/// with the same id. Two live and one trashed soft-delete model, and two
/// append models.
pub fn seed(db: &MemoryDatabase) {
    for (index, name) in TEST_MODEL_NAMES.iter().enumerate() {
        let id = index as i64 + 1;
        db.insert(
            "test_models",
            test_row(id)
                .with_name(name)
                .visible(id % 2 == 1)
                .created_at(&format!("2024-{id:02}-01")),
        );
        db.insert(
            "related_models",
            test_row(id)
                .with_name(&format!("related-{id}"))
                .belonging_to("test_model_id", id),
        );
        db.insert(
            "other_related_models",
            test_row(id)
                .with_name(&format!("other-{id}"))
                .belonging_to("test_model_id", id),
        );
    }
    db.insert(
        "related_models",
        test_row(6)
            .with_name("related-6")
            .belonging_to("test_model_id", 1),
    );
    for id in 1..=6 {
        db.insert(
            "nested_related_models",
            test_row(id)
                .with_name(&format!("nested-{id}"))
                .belonging_to("related_model_id", id),
        );
    }

    db.insert("soft_delete_models", test_row(1).with_name("live-1"));
    db.insert("soft_delete_models", test_row(2).with_name("live-2"));
    db.insert(
        "soft_delete_models",
        test_row(3).with_name("trashed-3").trashed("2024-06-01"),
    );

    db.insert(
        "append_models",
        test_row(1).with("firstname", "John").with("lastname", "Doe"),
    );
    db.insert(
        "append_models",
        test_row(2).with("firstname", "Jane").with("lastname", "Roe"),
    );
}

/// Schema, tables, engine and store wired together.
pub struct TestBackend {
    pub schema: Arc<Schema>,
    pub db: Arc<MemoryDatabase>,
    pub engine: Arc<MemoryEngine>,
    pub store: Arc<MemoryStore>,
}

impl TestBackend {
    /// Empty tables over [`test_schema`].
    pub fn new() -> Self {
        let db = Arc::new(MemoryDatabase::new());
        Self {
            schema: Arc::new(test_schema()),
            engine: Arc::new(MemoryEngine::new(db.clone())),
            store: Arc::new(MemoryStore::new(db.clone())),
            db,
        }
    }

    /// Tables filled by [`seed`].
    pub fn seeded() -> Self {
        let backend = Self::new();
        seed(&backend.db);
        backend
    }

    pub fn searchable(&self, model: &str) -> Result<Searchable> {
        Searchable::new(
            self.schema.clone(),
            model,
            self.engine.clone(),
            self.store.clone(),
        )
    }

    /// An empty-text search over `model`.
    pub fn search(&self, model: &str) -> Result<SearchBuilder> {
        Ok(self.searchable(model)?.search(""))
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// `name` attribute of each record.
pub fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.get_str("name").unwrap_or_default().to_string())
        .collect()
}

/// Integer key of each record.
pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|record| record.key().and_then(JsonValue::as_i64))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn engine_ranks_by_orders_and_pages() {
        let backend = TestBackend::seeded();
        let mut search = backend.search("TestModel").unwrap();
        search.order_by("name", SortDirection::Desc);

        let hits = backend
            .engine
            .search(&search, Some(Page { per_page: 2, page: 1 }))
            .unwrap();
        assert_eq!(hits.total, 5);
        assert_eq!(hits.keys, [JsonValue::from(1), JsonValue::from(5)]);
    }

    #[test]
    fn engine_equality_is_loose() {
        let backend = TestBackend::seeded();
        let mut search = backend.search("TestModel").unwrap();
        search.where_eq("is_visible", true);
        assert_eq!(backend.engine.search(&search, None).unwrap().total, 3);

        let mut search = backend.search("TestModel").unwrap();
        search.where_eq("id", "2");
        assert_eq!(backend.engine.search(&search, None).unwrap().total, 1);
    }

    #[test]
    fn engine_hides_trashed_rows() {
        let backend = TestBackend::seeded();
        let search = backend.search("SoftDeleteModel").unwrap();
        assert_eq!(backend.engine.search(&search, None).unwrap().total, 2);
    }

    #[test]
    fn store_loads_counts_and_nested_relations() {
        let backend = TestBackend::seeded();
        let model = backend.schema.require("TestModel").unwrap();
        let mut query = RelationalQuery::new(backend.schema.clone(), model);
        query.where_eq("test_models.id", 1_i64);
        query.with_count("relatedModels").unwrap();
        query
            .with("relatedModels.nestedRelatedModels", vec!["nested_related_models.name".to_string()])
            .unwrap();

        let records = backend.store.fetch(&query).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.get("related_models_count"), Some(&JsonValue::from(2)));

        let related = record.relation("relatedModels").unwrap().records();
        assert_eq!(related.len(), 2);
        let nested = related[0].relation("nestedRelatedModels").unwrap().records();
        assert_eq!(nested[0].attributes().len(), 1);
        assert_eq!(nested[0].get_str("name"), Some("nested-1"));
    }

    #[test]
    fn store_evaluates_relation_constraints() {
        let backend = TestBackend::seeded();
        let model = backend.schema.require("TestModel").unwrap();
        let mut query = RelationalQuery::new(backend.schema.clone(), model);
        query
            .where_has("relatedModels", |related| {
                related.where_eq("related_models.name", "related-6");
                Ok(())
            })
            .unwrap();

        let records = backend.store.fetch(&query).unwrap();
        assert_eq!(ids(&records), [1]);
    }
}
