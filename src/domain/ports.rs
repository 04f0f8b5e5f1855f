//! Domain Ports (Port/Adapter Pattern)
//!
//! The catalog core never talks to the managed document database directly.
//! It depends on the [`DocumentStore`] port; adapters implement it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Catalog Core                            │
//! │        CatalogRepository ──▶ DocumentStore (trait)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │     InMemoryDocumentStore (JSON export) │ hosted client      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Maximum number of ids a single document-id `in` filter may carry.
pub const MAX_IN_QUERY_IDS: usize = 10;

// =============================================================================
// Value Objects
// =============================================================================

/// Raw document as returned by the store: id plus untyped fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document identifier (not part of `data`)
    pub id: String,
    /// Field values
    pub data: Map<String, Value>,
}

impl Document {
    /// Create a document from an id and a JSON object
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Read a string-array field, ignoring non-string elements
    pub fn string_list(&self, field: &str) -> Option<Vec<String>> {
        let items = self.data.get(field)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }
}

/// Single query predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// `field == value`
    Equals { field: String, value: Value },
    /// Document id is one of `ids` (at most [`MAX_IN_QUERY_IDS`])
    IdIn(Vec<String>),
}

/// Collection query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Conjunction of predicates
    pub filters: Vec<FieldFilter>,
    /// Ascending order field
    pub order_by: Option<String>,
    /// Maximum number of documents
    pub limit: Option<usize>,
}

impl Query {
    /// Match every document
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality predicate
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Add a document-id membership predicate
    pub fn where_id_in(mut self, ids: Vec<String>) -> Self {
        self.filters.push(FieldFilter::IdIn(ids));
        self
    }

    /// Order ascending by a field
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Cap the result size
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject queries the hosted store would refuse.
    pub fn validate(&self, collection: &str) -> Result<()> {
        for filter in &self.filters {
            if let FieldFilter::IdIn(ids) = filter {
                if ids.is_empty() || ids.len() > MAX_IN_QUERY_IDS {
                    return Err(Error::InvalidQuery {
                        collection: collection.to_string(),
                        reason: format!(
                            "id 'in' filter needs 1..={} ids, got {}",
                            MAX_IN_QUERY_IDS,
                            ids.len()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Port Traits
// =============================================================================

/// Read access to the managed document database.
///
/// Responses to `in` queries carry no ordering guarantee.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a single document; `None` when it does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Run a query against a collection.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;
}

// =============================================================================
// Tests
// =============================================================================
