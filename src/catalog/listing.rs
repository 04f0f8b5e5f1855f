//! Category Listing Controller
//!
//! Holds one category's products and the material facets, keeps a
//! [`FilterSelection`], and recomputes the visible list after every change.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::models::{Material, Product};
use crate::error::Result;
use crate::image_cache::{ImageCache, PreloadHandle};
use crate::scheduler::Rotator;

use super::filter::{apply, FilterDimension, FilterOutcome, FilterSelection, SortOption};
use super::repository::CatalogRepository;

/// Filterable product listing for one category
#[derive(Debug, Clone)]
pub struct CategoryListing {
    category_id: String,
    products: Vec<Product>,
    materials: Vec<Material>,
    selection: FilterSelection,
    outcome: FilterOutcome,
}

impl CategoryListing {
    /// Fetch the category's products and the materials concurrently.
    pub async fn load(repo: &CatalogRepository, category_id: &str) -> Result<Self> {
        let (products, materials) = tokio::try_join!(
            repo.fetch_products_by_category(category_id),
            repo.fetch_materials()
        )?;

        info!(
            category_id,
            products = products.len(),
            materials = materials.len(),
            skipped = products.skipped.len() + materials.skipped.len(),
            "Loaded category listing"
        );
        Ok(Self::new(category_id, products.items, materials.items))
    }

    /// Listing over already-fetched data, unfiltered
    pub fn new(category_id: impl Into<String>, products: Vec<Product>, materials: Vec<Material>) -> Self {
        let selection = FilterSelection::new();
        let outcome = apply(&products, &selection, &materials);
        Self {
            category_id: category_id.into(),
            products,
            materials,
            selection,
            outcome,
        }
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    /// Products in catalog order, unfiltered
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    /// Products to display
    pub fn visible(&self) -> &[Product] {
        &self.outcome.visible
    }

    /// Active filter chips
    pub fn active_labels(&self) -> &[String] {
        &self.outcome.active_labels
    }

    /// Type labels offered by a material, in catalog order
    pub fn types_for_material(&self, material_id: &str) -> &[String] {
        self.material(material_id)
            .map(|m| m.types.as_slice())
            .unwrap_or_default()
    }

    fn material(&self, material_id: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == material_id)
    }

    fn recompute(&mut self) {
        self.outcome = apply(&self.products, &self.selection, &self.materials);
        debug!(
            category_id = %self.category_id,
            visible = self.outcome.visible.len(),
            labels = ?self.outcome.active_labels,
            "Recomputed listing"
        );
    }

    /// Toggle a material facet. `false` when the id is unknown.
    pub fn toggle_material(&mut self, material_id: &str) -> bool {
        let Some(material) = self.material(material_id).cloned() else {
            return false;
        };
        self.selection.toggle_material(&material);
        self.recompute();
        true
    }

    /// Toggle a type label of a material. `false` when the id is unknown or
    /// the material does not offer the label.
    pub fn toggle_material_type(&mut self, material_id: &str, label: &str) -> bool {
        let Some(material) = self.material(material_id).cloned() else {
            return false;
        };
        let accepted = self
            .selection
            .toggle_material_type(&material, label, &self.materials);
        if accepted {
            self.recompute();
        }
        accepted
    }

    /// Set or clear the gender filter
    pub fn set_gender(&mut self, gender: Option<String>) {
        self.selection.set_gender(gender);
        self.recompute();
    }

    pub fn set_sort(&mut self, sort: SortOption) {
        self.selection.set_sort(sort);
        self.recompute();
    }

    /// Remove the filter behind a chip label
    pub fn remove_filter(&mut self, label: &str) -> Option<FilterDimension> {
        let removed = self.selection.remove_label(label, &self.materials);
        if removed.is_some() {
            self.recompute();
        }
        removed
    }

    /// Clear every filter and the sort
    pub fn reset_filters(&mut self) {
        self.selection.reset();
        self.recompute();
    }

    /// Primary image of every visible product, in display order
    pub fn visible_image_urls(&self) -> Vec<String> {
        self.outcome
            .visible
            .iter()
            .filter_map(|p| p.primary_image())
            .map(str::to_string)
            .collect()
    }

    /// Preload the primary images of the visible products
    pub fn preload_images(&self, cache: &Arc<ImageCache>) -> PreloadHandle {
        cache.preload(self.visible_image_urls())
    }

    /// Image cycler for a product with several images. `None` when the
    /// product is unknown.
    pub fn image_cycler(&self, product_id: &str, period: Duration) -> Option<Rotator> {
        self.products
            .iter()
            .find(|p| p.id == product_id)
            .map(|p| Rotator::spawn("product-images", p.images.len(), period))
    }
}

// =============================================================================
// Tests
// =============================================================================
