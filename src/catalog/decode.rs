//! Document Decoding
//!
//! Turns raw store documents into typed entities in one step. A document either
//! decodes completely or yields a [`DocumentDecodeError`]; batch decoding drops
//! the bad documents and keeps going.

use serde_json::Value;
use tracing::warn;

use crate::domain::models::CatalogEntity;
use crate::domain::ports::Document;
use crate::error::DocumentDecodeError;

/// Clean subset of a fetch plus the documents that were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    /// Successfully decoded entities, in fetch order
    pub items: Vec<T>,
    /// Documents that failed to decode
    pub skipped: Vec<DocumentDecodeError>,
}

impl<T> Default for Fetched<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Fetched<T> {
    /// Discard the skip report
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Number of decoded entities
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing decoded
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Decode one document. The document id is injected as the `id` field.
pub fn decode_document<T: CatalogEntity>(
    collection: &str,
    doc: &Document,
) -> Result<T, DocumentDecodeError> {
    let fail = |reason: String| DocumentDecodeError {
        collection: collection.to_string(),
        document_id: doc.id.clone(),
        reason,
    };

    let mut data = doc.data.clone();
    data.insert("id".to_string(), Value::String(doc.id.clone()));

    let entity: T = serde_json::from_value(Value::Object(data)).map_err(|e| fail(e.to_string()))?;
    entity.validate().map_err(fail)?;
    Ok(entity)
}

/// Decode a batch, skipping and logging documents that fail.
pub fn decode_all<T: CatalogEntity>(collection: &str, docs: &[Document]) -> Fetched<T> {
    let mut fetched = Fetched::default();

    for doc in docs {
        match decode_document::<T>(collection, doc) {
            Ok(entity) => fetched.items.push(entity),
            Err(err) => {
                warn!(
                    collection = %collection,
                    document_id = %err.document_id,
                    reason = %err.reason,
                    "Skipping undecodable document"
                );
                fetched.skipped.push(err);
            }
        }
    }

    if !fetched.skipped.is_empty() {
        warn!(
            collection = %collection,
            decoded = fetched.items.len(),
            skipped = fetched.skipped.len(),
            "Dropped documents during decode"
        );
    }

    fetched
}

// =============================================================================
// Tests
// =============================================================================
