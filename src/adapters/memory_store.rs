//! In-Memory Document Store Adapter
//!
//! Implements the `DocumentStore` port over documents held in memory. Used by
//! tests and by the CLI, which loads a JSON export of the catalog:
//!
//! ```json
//! { "products": { "ring-01": { "name": "...", "price": 120.0 } } }
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::ports::{Document, DocumentStore, FieldFilter, Query};
use crate::error::{Error, Result};

/// Document store backed by memory.
///
/// Collections keep insertion order so query results are reproducible.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: DashMap<String, Vec<Document>>,
    queries: AtomicU64,
    reads: AtomicU64,
    largest_in_batch: AtomicUsize,
}

impl InMemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSON export (`collection -> id -> fields`).
    pub fn from_export(export: &Value) -> Result<Self> {
        let store = Self::new();
        let collections = export
            .as_object()
            .ok_or_else(|| Error::Store("export root must be an object".into()))?;

        for (collection, docs) in collections {
            let docs = docs.as_object().ok_or_else(|| {
                Error::Store(format!("collection '{collection}' must be an object"))
            })?;
            for (id, data) in docs {
                // Non-object documents are kept empty so decoding reports them
                let data = data.as_object().cloned().unwrap_or_default();
                store.insert(collection, id, data);
            }
        }

        Ok(store)
    }

    /// Load a JSON export from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let export: Value = serde_json::from_slice(&raw)?;
        let store = Self::from_export(&export)?;
        debug!(
            path = %path.as_ref().display(),
            collections = store.collections.len(),
            "Loaded catalog export"
        );
        Ok(store)
    }

    /// Insert or replace a document
    pub fn insert(&self, collection: &str, id: &str, data: Map<String, Value>) {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.data = data,
            None => docs.push(Document::new(id, data)),
        }
    }

    /// Number of queries served
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Number of single-document reads served
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Largest id `in` filter seen so far
    pub fn largest_in_batch(&self) -> usize {
        self.largest_in_batch.load(Ordering::Relaxed)
    }

    fn matches(&self, doc: &Document, filter: &FieldFilter) -> bool {
        match filter {
            FieldFilter::Equals { field, value } => doc.data.get(field) == Some(value),
            FieldFilter::IdIn(ids) => {
                self.largest_in_batch.fetch_max(ids.len(), Ordering::Relaxed);
                ids.iter().any(|id| *id == doc.id)
            }
        }
    }
}

/// Orders JSON values: numbers numerically, strings lexically, missing last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::MAX);
            let y = y.as_f64().unwrap_or(f64::MAX);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned()))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        query.validate(collection)?;
        self.queries.fetch_add(1, Ordering::Relaxed);

        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<Document> = docs
            .iter()
            .filter(|doc| query.filters.iter().all(|f| self.matches(doc, f)))
            .cloned()
            .collect();
        drop(docs);

        if let Some(field) = &query.order_by {
            results.sort_by(|a, b| compare_values(a.data.get(field), b.data.get(field)));
        }
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}

// =============================================================================
// Tests
// =============================================================================
