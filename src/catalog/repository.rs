//! Catalog Repository
//!
//! Typed catalog reads over the [`DocumentStore`] port. Indirection documents
//! (featured list, category membership, collection membership) are resolved with
//! batched id lookups of at most [`MAX_IN_QUERY_IDS`] ids, then re-sorted to the
//! indirection order because the store answers `in` queries unordered.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::models::{
    collections, CarouselItem, Category, Material, Product, ThemedCollection,
};
use crate::domain::ports::{DocumentStore, Query, MAX_IN_QUERY_IDS};
use crate::error::Result;

use super::decode::{decode_all, Fetched};

/// Field on indirection documents listing product ids
const PRODUCT_IDS_FIELD: &str = "product_ids";
/// Field on themed collections listing product ids
const COLLECTION_PRODUCT_IDS_FIELD: &str = "productIds";

/// Typed read access to the catalog.
#[derive(Clone)]
pub struct CatalogRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for CatalogRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogRepository").finish_non_exhaustive()
    }
}

impl CatalogRepository {
    /// Create a repository over a document store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Home-feed banners. Image URLs are trimmed before decoding.
    pub async fn fetch_carousel_items(&self) -> Result<Fetched<CarouselItem>> {
        let mut docs = self
            .store
            .query(collections::CAROUSEL_ITEMS, &Query::all())
            .await?;

        for doc in &mut docs {
            if let Some(serde_json::Value::String(url)) = doc.data.get_mut("imageUrl") {
                let cleaned = url.trim().to_string();
                *url = cleaned;
            }
        }

        Ok(decode_all(collections::CAROUSEL_ITEMS, &docs))
    }

    /// Categories ordered by their `order` field.
    pub async fn fetch_categories(&self) -> Result<Fetched<Category>> {
        let docs = self
            .store
            .query(collections::CATEGORIES, &Query::all().order_by("order"))
            .await?;
        Ok(decode_all(collections::CATEGORIES, &docs))
    }

    /// Featured products in the order given by the featured list document.
    ///
    /// A missing list document or an empty id list is an empty result.
    pub async fn fetch_featured_products(&self) -> Result<Fetched<Product>> {
        let ids = self
            .product_ids_from(
                collections::FEATURED_PRODUCTS,
                collections::FEATURED_LIST_DOC,
                PRODUCT_IDS_FIELD,
            )
            .await?;

        let Some(ids) = ids else {
            debug!("No featured product ids found");
            return Ok(Fetched::default());
        };

        let fetched = self.products_by_ids(&ids, false).await?;
        info!(count = fetched.len(), "Fetched featured products");
        Ok(fetched)
    }

    /// Products of a category.
    ///
    /// Uses the `category_products/<id>` membership document when present and
    /// falls back to an equality filter on `category_id` otherwise.
    pub async fn fetch_products_by_category(&self, category_id: &str) -> Result<Fetched<Product>> {
        let ids = self
            .product_ids_from(collections::CATEGORY_PRODUCTS, category_id, PRODUCT_IDS_FIELD)
            .await?;

        let fetched = match ids {
            Some(ids) => self.products_by_ids(&ids, false).await?,
            None => {
                debug!(category_id, "No membership document, filtering by category_id");
                let docs = self
                    .store
                    .query(
                        collections::PRODUCTS,
                        &Query::all().where_eq("category_id", category_id),
                    )
                    .await?;
                decode_all(collections::PRODUCTS, &docs)
            }
        };

        info!(category_id, count = fetched.len(), "Fetched category products");
        Ok(fetched)
    }

    /// Available products belonging to a themed collection.
    pub async fn fetch_products_by_collection(
        &self,
        collection_id: &str,
    ) -> Result<Fetched<Product>> {
        let ids = self
            .product_ids_from(
                collections::THEMED_COLLECTIONS,
                collection_id,
                COLLECTION_PRODUCT_IDS_FIELD,
            )
            .await?;

        match ids {
            Some(ids) => self.products_by_ids(&ids, true).await,
            None => Ok(Fetched::default()),
        }
    }

    /// Filter facets.
    pub async fn fetch_materials(&self) -> Result<Fetched<Material>> {
        let docs = self
            .store
            .query(collections::MATERIALS, &Query::all())
            .await?;
        let fetched = decode_all(collections::MATERIALS, &docs);
        debug!(count = fetched.len(), "Fetched materials");
        Ok(fetched)
    }

    /// Themed collections ordered by their `order` field.
    pub async fn fetch_themed_collections(&self) -> Result<Fetched<ThemedCollection>> {
        let docs = self
            .store
            .query(collections::THEMED_COLLECTIONS, &Query::all().order_by("order"))
            .await?;
        Ok(decode_all(collections::THEMED_COLLECTIONS, &docs))
    }

    /// Available products whose name, description or material type contains
    /// `query`, compared case-insensitively.
    pub async fn search_products(&self, query: &str) -> Result<Fetched<Product>> {
        let docs = self
            .store
            .query(collections::PRODUCTS, &Query::all().where_eq("available", true))
            .await?;
        let mut fetched: Fetched<Product> = decode_all(collections::PRODUCTS, &docs);

        let needle = query.to_lowercase();
        fetched.items.retain(|p| {
            p.name.to_lowercase().contains(&needle)
                || p.description.to_lowercase().contains(&needle)
                || p
                    .material_type
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
        });
        Ok(fetched)
    }

    /// Read an id list from an indirection document.
    ///
    /// `None` when the document or field is missing or the list is empty.
    async fn product_ids_from(
        &self,
        collection: &str,
        doc_id: &str,
        field: &str,
    ) -> Result<Option<Vec<String>>> {
        let doc = self.store.get_document(collection, doc_id).await?;
        Ok(doc
            .and_then(|d| d.string_list(field))
            .filter(|ids| !ids.is_empty()))
    }

    /// Resolve ids in batches and restore the requested order.
    async fn products_by_ids(&self, ids: &[String], available_only: bool) -> Result<Fetched<Product>> {
        let mut by_id: HashMap<String, Product> = HashMap::with_capacity(ids.len());
        let mut skipped = Vec::new();

        for batch in ids.chunks(MAX_IN_QUERY_IDS) {
            let mut query = Query::all().where_id_in(batch.to_vec());
            if available_only {
                query = query.where_eq("available", true);
            }
            let docs = self.store.query(collections::PRODUCTS, &query).await?;
            let decoded: Fetched<Product> = decode_all(collections::PRODUCTS, &docs);
            skipped.extend(decoded.skipped);
            by_id.extend(decoded.items.into_iter().map(|p| (p.id.clone(), p)));
        }

        let items = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        Ok(Fetched { items, skipped })
    }
}

// =============================================================================
// Tests
// =============================================================================
