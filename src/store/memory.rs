//! Embedded in-memory document engine.
//!
//! The built-in [`DataEngine`] backend: keeps collections in process memory
//! and mimics a document store's observable behavior (store-assigned object
//! ids, extended-JSON native values, equality filters, stable multi-field
//! sorts). TTL indexes are tracked as metadata; actual age-based deletion is
//! the engine's concern and is not simulated here.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::types::Document;

use super::engine::{DataEngine, FindQuery, SortOrder, TtlIndex};

/// In-memory collections keyed by name
#[derive(Default)]
pub struct MemoryEngine {
    collections: DashMap<String, Vec<Document>>,
    ttl_indexes: DashMap<String, TtlIndex>,
    closed: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            anyhow::bail!("engine is shut down");
        }
        Ok(())
    }

    /// Store-style object id: 24 hex characters.
    fn next_object_id() -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        hex[..24].to_string()
    }

    fn matches(document: &Document, filter: &Document) -> bool {
        filter
            .iter()
            .all(|(key, expected)| document.get(key) == Some(expected))
    }

    fn sort_documents(documents: &mut [Document], sort: &[(String, SortOrder)]) {
        // Stable sort: ties keep insertion order, the store's natural order.
        documents.sort_by(|a, b| {
            for (field, order) in sort {
                let ordering = compare_values(a.get(field), b.get(field));
                let ordering = match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}

/// Compare two optional field values with a total order.
///
/// Missing fields sort first. Across types the order is
/// null < bool < number < string < array < object, mirroring how document
/// stores keep heterogeneous fields sortable.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            // Native datetimes arrive as {"$date": ...}; compare their inner value.
            if let (Some(a_inner), Some(b_inner)) = (extended_date(a), extended_date(b)) {
                return compare_values(Some(a_inner), Some(b_inner));
            }
            let (ra, rb) = (type_rank(a), type_rank(b));
            if ra != rb {
                return ra.cmp(&rb);
            }
            match (a, b) {
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                (Value::Number(x), Value::Number(y)) => {
                    let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            }
        }
    }
}

fn extended_date(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get("$date"),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[async_trait]
impl DataEngine for MemoryEngine {
    async fn ping(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.collections.remove(name);
        self.ttl_indexes.remove(name);
        Ok(())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<String> {
        self.ensure_open()?;
        let id = Self::next_object_id();
        document
            .entry("_id".to_string())
            .or_insert_with(|| serde_json::json!({ "$oid": id.clone() }));
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        self.ensure_open()?;
        let count = documents.len();
        let mut entry = self.collections.entry(collection.to_string()).or_default();
        for mut document in documents {
            document
                .entry("_id".to_string())
                .or_insert_with(|| serde_json::json!({ "$oid": Self::next_object_id() }));
            entry.push(document);
        }
        Ok(count)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let mut matched: Vec<Document> = match self.collections.get(collection) {
            Some(documents) => documents
                .iter()
                .filter(|d| Self::matches(d, &query.filter))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if !query.sort.is_empty() {
            Self::sort_documents(&mut matched, &query.sort);
        }

        let skip = query.skip.min(matched.len() as u64) as usize;
        let mut page: Vec<Document> = matched.split_off(skip);
        if let Some(limit) = query.limit {
            page.truncate(limit as usize);
        }
        Ok(page)
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        self.ensure_open()?;
        Ok(self
            .collections
            .get(collection)
            .map(|documents| documents.len() as u64)
            .unwrap_or(0))
    }

    async fn ttl_index(&self, collection: &str) -> Result<Option<TtlIndex>> {
        self.ensure_open()?;
        Ok(self.ttl_indexes.get(collection).map(|e| e.value().clone()))
    }

    async fn create_ttl_index(&self, collection: &str, index: TtlIndex) -> Result<()> {
        self.ensure_open()?;
        // One logical TTL slot per collection: a concurrent create converges
        // on a single entry rather than accumulating duplicates.
        self.ttl_indexes.insert(collection.to_string(), index);
        Ok(())
    }

    async fn update_ttl_index(
        &self,
        collection: &str,
        name: &str,
        expire_after_secs: u64,
    ) -> Result<()> {
        self.ensure_open()?;
        match self.ttl_indexes.get_mut(collection) {
            Some(mut entry) if entry.name == name => {
                entry.expire_after_secs = expire_after_secs;
                Ok(())
            }
            _ => anyhow::bail!("no index named '{}' on collection '{}'", name, collection),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }
}
