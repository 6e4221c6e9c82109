//! Search query builder and its execution contract.
//!
//! A [`SearchBuilder`] collects the predicates and orderings a search engine
//! understands natively. Executing it asks the [`SearchEngine`] for ranked
//! keys, then hydrates them through the [`RecordStore`] with a fresh
//! [`RelationalQuery`] that the builder's query hook may refine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::record::{Paginator, Record};
use crate::relational::RelationalQuery;
use crate::schema::{ModelSchema, Schema};
use crate::types::SortDirection;
use crate::value::FilterValue;

/// Soft-delete marker the engine understands: 0 live, 1 deleted.
pub const SOFT_DELETED: &str = "__soft_deleted";

/// Refines the relational query used to hydrate search hits.
pub type QueryHook = Arc<dyn Fn(&mut RelationalQuery) -> Result<()> + Send + Sync>;

/// A native ordering clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub column: String,
    pub direction: SortDirection,
}

/// Page request passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub per_page: usize,
    /// 1-based.
    pub page: usize,
}

impl Page {
    pub fn offset(&self) -> usize {
        self.per_page.saturating_mul(self.page.saturating_sub(1))
    }
}

/// Engine response: keys in rank order plus the total hit count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub keys: Vec<JsonValue>,
    pub total: u64,
}

/// Search backend.
pub trait SearchEngine: Send + Sync {
    /// Run the builder's predicates, returning one page (or every hit when
    /// `page` is `None`).
    fn search(&self, builder: &SearchBuilder, page: Option<Page>) -> Result<SearchHits>;
}

/// Relational record source used to hydrate search hits.
pub trait RecordStore: Send + Sync {
    fn fetch(&self, query: &RelationalQuery) -> Result<Vec<Record>>;
}

/// A searchable model bound to its engine and store.
#[derive(Clone)]
pub struct Searchable {
    schema: Arc<Schema>,
    model: Arc<ModelSchema>,
    engine: Arc<dyn SearchEngine>,
    store: Arc<dyn RecordStore>,
    soft_delete: bool,
}

impl fmt::Debug for Searchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Searchable")
            .field("model", &self.model.name())
            .field("soft_delete", &self.soft_delete)
            .finish_non_exhaustive()
    }
}

impl Searchable {
    pub fn new(
        schema: Arc<Schema>,
        model: &str,
        engine: Arc<dyn SearchEngine>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        let model = schema.require(model)?;
        Ok(Self {
            schema,
            model,
            engine,
            store,
            soft_delete: true,
        })
    }

    /// Whether searches over soft-deleting models hide deleted records
    /// unless asked otherwise (default: true).
    pub fn with_soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete = enabled;
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.model
    }

    /// Start a search for `text` (empty matches everything).
    pub fn search(&self, text: impl Into<String>) -> SearchBuilder {
        let mut wheres = IndexMap::new();
        if self.soft_delete && self.model.uses_soft_deletes() {
            wheres.insert(SOFT_DELETED.to_string(), FilterValue::Integer(0));
        }
        SearchBuilder {
            searchable: self.clone(),
            query: text.into(),
            wheres,
            where_ins: IndexMap::new(),
            orders: Vec::new(),
            hook: None,
        }
    }
}

/// A search query under construction.
#[derive(Clone)]
pub struct SearchBuilder {
    searchable: Searchable,
    query: String,
    wheres: IndexMap<String, FilterValue>,
    where_ins: IndexMap<String, Vec<FilterValue>>,
    orders: Vec<Order>,
    hook: Option<QueryHook>,
}

impl fmt::Debug for SearchBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchBuilder")
            .field("model", &self.searchable.model.name())
            .field("query", &self.query)
            .field("wheres", &self.wheres)
            .field("where_ins", &self.where_ins)
            .field("orders", &self.orders)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl SearchBuilder {
    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.searchable.model
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.searchable.schema
    }

    /// Search text.
    pub fn query_text(&self) -> &str {
        &self.query
    }

    /// Equality predicates; a later predicate on the same field replaces
    /// the earlier one.
    pub fn wheres(&self) -> &IndexMap<String, FilterValue> {
        &self.wheres
    }

    pub fn where_ins(&self) -> &IndexMap<String, Vec<FilterValue>> {
        &self.where_ins
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    pub fn where_eq(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> &mut Self {
        self.wheres.insert(field.into(), value.into());
        self
    }

    pub fn where_in(&mut self, field: impl Into<String>, values: Vec<FilterValue>) -> &mut Self {
        self.where_ins.insert(field.into(), values);
        self
    }

    pub fn order_by(&mut self, column: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.orders.push(Order {
            column: column.into(),
            direction,
        });
        self
    }

    /// Include soft-deleted records.
    pub fn with_trashed(&mut self) -> &mut Self {
        self.wheres.shift_remove(SOFT_DELETED);
        self
    }

    /// Only soft-deleted records.
    pub fn only_trashed(&mut self) -> &mut Self {
        self.wheres
            .insert(SOFT_DELETED.to_string(), FilterValue::Integer(1));
        self
    }

    /// Exclude soft-deleted records.
    pub fn without_trashed(&mut self) -> &mut Self {
        self.wheres
            .insert(SOFT_DELETED.to_string(), FilterValue::Integer(0));
        self
    }

    /// Set the hook that refines the hydration query, replacing any
    /// previous hook.
    pub fn query(
        &mut self,
        hook: impl Fn(&mut RelationalQuery) -> Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub(crate) fn take_hook(&mut self) -> Option<QueryHook> {
        self.hook.take()
    }

    pub(crate) fn set_hook(&mut self, hook: QueryHook) {
        self.hook = Some(hook);
    }

    /// The relational query the hook produces, before any key restriction.
    pub fn refined_query(&self) -> Result<RelationalQuery> {
        let mut query = RelationalQuery::new(self.schema().clone(), self.model().clone());
        if let Some(hook) = &self.hook {
            hook(&mut query)?;
        }
        Ok(query)
    }

    /// The hydration query for a set of keys, with the hook applied.
    pub fn hydration_query(&self, keys: &[JsonValue]) -> Result<RelationalQuery> {
        let model = self.model();
        let mut query = RelationalQuery::new(self.schema().clone(), model.clone());
        let key_column = query.qualify_column(model.key());
        query.where_in(
            key_column,
            keys.iter().cloned().map(FilterValue::from).collect(),
        );
        if let Some(hook) = &self.hook {
            hook(&mut query)?;
        }
        Ok(query)
    }

    /// Every matching record, in rank order.
    pub fn get(&self) -> Result<Vec<Record>> {
        let hits = self.searchable.engine.search(self, None)?;
        self.hydrate(&hits.keys)
    }

    /// The best match.
    pub fn first(&self) -> Result<Option<Record>> {
        let page = Page {
            per_page: 1,
            page: 1,
        };
        let hits = self.searchable.engine.search(self, Some(page))?;
        Ok(self.hydrate(&hits.keys)?.into_iter().next())
    }

    /// One page with the total hit count.
    pub fn paginate(&self, per_page: usize, page: usize) -> Result<Paginator> {
        let page = Page {
            per_page,
            page: page.max(1),
        };
        let hits = self.searchable.engine.search(self, Some(page))?;
        let items = self.hydrate(&hits.keys)?;
        Ok(Paginator::length_aware(items, page.per_page, page.page, hits.total))
    }

    /// One page, knowing only whether another follows.
    pub fn simple_paginate(&self, per_page: usize, page: usize) -> Result<Paginator> {
        let page = Page {
            per_page,
            page: page.max(1),
        };
        let hits = self.searchable.engine.search(self, Some(page))?;
        let has_more = hits.total > (page.offset() + hits.keys.len()) as u64;
        let items = self.hydrate(&hits.keys)?;
        Ok(Paginator::simple(items, page.per_page, page.page, has_more))
    }

    fn hydrate(&self, keys: &[JsonValue]) -> Result<Vec<Record>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.hydration_query(keys)?;
        let records = self.searchable.store.fetch(&query)?;
        tracing::debug!(
            model = %self.model().name(),
            hits = keys.len(),
            hydrated = records.len(),
            "hydrated search hits"
        );

        Ok(rank_order(records, keys))
    }
}

/// Sort records into the engine's rank order. Records without a selected
/// key keep their store order after the ranked ones.
fn rank_order(records: Vec<Record>, keys: &[JsonValue]) -> Vec<Record> {
    let positions: HashMap<String, usize> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| (key_text(key), i))
        .collect();

    let mut ranked: Vec<(usize, Record)> = Vec::with_capacity(records.len());
    let mut unranked = Vec::new();
    for record in records {
        match record.key().and_then(|k| positions.get(&key_text(k))) {
            Some(&position) => ranked.push((position, record)),
            None => unranked.push(record),
        }
    }
    ranked.sort_by_key(|(position, _)| *position);

    ranked
        .into_iter()
        .map(|(_, record)| record)
        .chain(unranked)
        .collect()
}

fn key_text(key: &JsonValue) -> String {
    match key {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct FixedEngine(Vec<JsonValue>);

    impl SearchEngine for FixedEngine {
        fn search(&self, _builder: &SearchBuilder, page: Option<Page>) -> Result<SearchHits> {
            let keys = match page {
                Some(page) => self
                    .0
                    .iter()
                    .skip(page.offset())
                    .take(page.per_page)
                    .cloned()
                    .collect(),
                None => self.0.clone(),
            };
            Ok(SearchHits {
                keys,
                total: self.0.len() as u64,
            })
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        queries: Mutex<Vec<RelationalQuery>>,
    }

    impl RecordStore for RecordingStore {
        fn fetch(&self, query: &RelationalQuery) -> Result<Vec<Record>> {
            self.queries.lock().push(query.clone());
            // Store order is the reverse of rank order.
            Ok([1, 2, 3]
                .into_iter()
                .rev()
                .map(|id| {
                    let attrs = json!({"id": id});
                    Record::new(query.model().clone(), attrs.as_object().cloned().unwrap_or_default())
                })
                .collect())
        }
    }

    fn searchable(store: Arc<RecordingStore>) -> Searchable {
        let schema = Arc::new(
            Schema::new()
                .with_model(ModelSchema::new("TestModel", "test_models"))
                .with_model(ModelSchema::new("SoftDeleteModel", "soft_delete_models").soft_deletes()),
        );
        Searchable::new(
            schema,
            "TestModel",
            Arc::new(FixedEngine(vec![json!(1), json!(2), json!(3)])),
            store,
        )
        .unwrap()
    }

    #[test]
    fn get_reorders_by_rank_and_runs_hook_once() {
        let store = Arc::new(RecordingStore::default());
        let mut builder = searchable(store.clone()).search("");
        builder.query(|q| {
            q.where_eq("name", "x");
            Ok(())
        });

        let records = builder.get().unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.key().cloned().unwrap()).collect();
        assert_eq!(ids, [json!(1), json!(2), json!(3)]);

        let queries = store.queries.lock();
        assert_eq!(queries.len(), 1);
        // key restriction plus the hook's constraint
        assert_eq!(queries[0].constraints().len(), 2);
    }

    #[test]
    fn first_and_pages() {
        let store = Arc::new(RecordingStore::default());
        let builder = searchable(store).search("");

        assert!(builder.first().unwrap().is_some());

        let page = builder.paginate(2, 1).unwrap();
        assert_eq!(page.total(), Some(3));
        assert!(page.has_more_pages());

        let page = builder.simple_paginate(2, 2).unwrap();
        assert_eq!(page.total(), None);
        assert!(!page.has_more_pages());
    }

    #[test]
    fn soft_delete_marker() {
        let store = Arc::new(RecordingStore::default());
        let searchable = searchable(store.clone());
        assert!(searchable.search("").wheres().is_empty());

        let schema = searchable.schema().clone();
        let soft = Searchable::new(
            schema,
            "SoftDeleteModel",
            Arc::new(FixedEngine(vec![])),
            store,
        )
        .unwrap();
        let mut builder = soft.search("");
        assert_eq!(builder.wheres()[SOFT_DELETED], FilterValue::Integer(0));
        builder.only_trashed();
        assert_eq!(builder.wheres()[SOFT_DELETED], FilterValue::Integer(1));
        builder.with_trashed();
        assert!(!builder.wheres().contains_key(SOFT_DELETED));

        let disabled = soft.with_soft_delete(false).search("");
        assert!(disabled.wheres().is_empty());
    }

    #[test]
    fn orders_keep_insertion_order() {
        let store = Arc::new(RecordingStore::default());
        let mut builder = searchable(store).search("");
        builder
            .order_by("name", SortDirection::Asc)
            .order_by("id", SortDirection::Desc);
        assert_eq!(
            serde_json::to_value(builder.orders()).unwrap(),
            json!([
                {"column": "name", "direction": "asc"},
                {"column": "id", "direction": "desc"}
            ])
        );
    }
}
