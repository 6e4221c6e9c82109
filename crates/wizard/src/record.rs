//! Hydrated records and result containers.

use std::fmt;
use std::sync::Arc;

use anyhow::{Result, bail};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::schema::ModelSchema;

/// Loaded relation data on a record.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Related {
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Related::One(record) => record.iter().map(|r| r.as_ref()).collect(),
            Related::Many(records) => records.iter().collect(),
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Related::One(Some(record)) => record.to_json(),
            Related::One(None) => JsonValue::Null,
            Related::Many(records) => JsonValue::Array(records.iter().map(Record::to_json).collect()),
        }
    }
}

/// One model instance returned from the record store.
#[derive(Clone)]
pub struct Record {
    model: Arc<ModelSchema>,
    attributes: Map<String, JsonValue>,
    relations: IndexMap<String, Related>,
    appends: Vec<String>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model.name())
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .field("appends", &self.appends)
            .finish()
    }
}

impl Record {
    pub fn new(model: Arc<ModelSchema>, attributes: Map<String, JsonValue>) -> Self {
        Self {
            model,
            attributes,
            relations: IndexMap::new(),
            appends: Vec::new(),
        }
    }

    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.model
    }

    pub fn attributes(&self) -> &Map<String, JsonValue> {
        &self.attributes
    }

    pub fn get(&self, attribute: &str) -> Option<&JsonValue> {
        self.attributes.get(attribute)
    }

    /// String attribute, if present and a string.
    pub fn get_str(&self, attribute: &str) -> Option<&str> {
        self.get(attribute).and_then(JsonValue::as_str)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: JsonValue) {
        self.attributes.insert(attribute.into(), value);
    }

    /// Primary key value, if selected.
    pub fn key(&self) -> Option<&JsonValue> {
        self.get(self.model.key())
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.relations.get_mut(name)
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Attach computed attributes to the serialized form.
    ///
    /// Names are case-sensitive and must match an accessor on the model.
    pub fn append(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            if self.model.accessor_named(name).is_none() {
                bail!(
                    "accessor `{name}` is not defined on model `{}`",
                    self.model.name()
                );
            }
            if !self.appends.contains(name) {
                self.appends.push(name.clone());
            }
        }
        Ok(())
    }

    pub fn appends(&self) -> &[String] {
        &self.appends
    }

    /// Value of an appended attribute.
    pub fn appended(&self, name: &str) -> Option<JsonValue> {
        if !self.appends.iter().any(|a| a == name) {
            return None;
        }
        self.model.accessor_named(name).map(|accessor| accessor(self))
    }

    /// Serialized form: attributes, loaded relations, then appended attributes.
    pub fn to_json(&self) -> JsonValue {
        let mut out = self.attributes.clone();
        for (name, related) in &self.relations {
            out.insert(name.clone(), related.to_json());
        }
        for name in &self.appends {
            if let Some(value) = self.appended(name) {
                out.insert(name.clone(), value);
            }
        }
        JsonValue::Object(out)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// One page of records.
///
/// Length-aware pages know the total; simple pages only know whether
/// another page follows.
#[derive(Debug, Clone, Serialize)]
pub struct Paginator {
    items: Vec<Record>,
    per_page: usize,
    current_page: usize,
    total: Option<u64>,
    has_more: bool,
}

impl Paginator {
    pub fn length_aware(items: Vec<Record>, per_page: usize, current_page: usize, total: u64) -> Self {
        let seen = (per_page as u64).saturating_mul(current_page as u64);
        Self {
            items,
            per_page,
            current_page,
            total: Some(total),
            has_more: total > seen,
        }
    }

    pub fn simple(items: Vec<Record>, per_page: usize, current_page: usize, has_more: bool) -> Self {
        Self {
            items,
            per_page,
            current_page,
            total: None,
            has_more,
        }
    }

    pub fn items(&self) -> &[Record] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Record] {
        &mut self.items
    }

    pub fn into_items(self) -> Vec<Record> {
        self.items
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn has_more_pages(&self) -> bool {
        self.has_more
    }

    /// Last page number, for length-aware pages.
    pub fn last_page(&self) -> Option<usize> {
        let total = self.total?;
        let per_page = self.per_page.max(1) as u64;
        Some(total.div_ceil(per_page).max(1) as usize)
    }
}

/// Anything a terminal query operation can return.
pub trait ResultSet {
    fn records_mut(&mut self) -> Box<dyn Iterator<Item = &mut Record> + '_>;
}

impl ResultSet for Record {
    fn records_mut(&mut self) -> Box<dyn Iterator<Item = &mut Record> + '_> {
        Box::new(std::iter::once(self))
    }
}

impl ResultSet for Option<Record> {
    fn records_mut(&mut self) -> Box<dyn Iterator<Item = &mut Record> + '_> {
        Box::new(self.iter_mut())
    }
}

impl ResultSet for Vec<Record> {
    fn records_mut(&mut self) -> Box<dyn Iterator<Item = &mut Record> + '_> {
        Box::new(self.iter_mut())
    }
}

impl ResultSet for Paginator {
    fn records_mut(&mut self) -> Box<dyn Iterator<Item = &mut Record> + '_> {
        Box::new(self.items.iter_mut())
    }
}
