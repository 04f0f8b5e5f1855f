//! Home Feed Controller
//!
//! Loads the home screen sections concurrently and picks which images to warm:
//!
//! - every carousel banner
//! - the first [`CATEGORY_PRELOAD_LIMIT`] category images
//! - the primary image of the first [`FEATURED_PRELOAD_LIMIT`] featured products

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::domain::models::{CarouselItem, Category, Product, ThemedCollection};
use crate::error::Result;
use crate::image_cache::{ImageCache, PreloadHandle};
use crate::scheduler::Rotator;

use super::repository::CatalogRepository;

/// Category images preloaded for the home screen
pub const CATEGORY_PRELOAD_LIMIT: usize = 8;

/// Featured products whose primary image is preloaded
pub const FEATURED_PRELOAD_LIMIT: usize = 4;

/// Default carousel auto-advance period
pub const CAROUSEL_PERIOD: Duration = Duration::from_secs(5);

/// Home screen content
#[derive(Debug, Clone, Default)]
pub struct HomeFeed {
    pub carousel: Vec<CarouselItem>,
    pub categories: Vec<Category>,
    pub featured: Vec<Product>,
    pub collections: Vec<ThemedCollection>,
    /// Documents dropped while decoding any section
    pub skipped: usize,
}

impl HomeFeed {
    /// Fetch every section concurrently; any store failure fails the load.
    pub async fn load(repo: &CatalogRepository) -> Result<Self> {
        let (carousel, categories, featured, collections) = tokio::try_join!(
            repo.fetch_carousel_items(),
            repo.fetch_categories(),
            repo.fetch_featured_products(),
            repo.fetch_themed_collections(),
        )?;

        let skipped = carousel.skipped.len()
            + categories.skipped.len()
            + featured.skipped.len()
            + collections.skipped.len();

        let feed = Self {
            carousel: carousel.items,
            categories: categories.items,
            featured: featured.items,
            collections: collections.items,
            skipped,
        };
        info!(
            carousel = feed.carousel.len(),
            categories = feed.categories.len(),
            featured = feed.featured.len(),
            collections = feed.collections.len(),
            skipped,
            "Loaded home feed"
        );
        Ok(feed)
    }

    /// Images worth fetching before the screen is shown
    pub fn preload_urls(&self) -> Vec<String> {
        collect_preload_urls(&self.carousel, &self.categories, &self.featured)
    }

    /// Start preloading [`Self::preload_urls`]
    pub fn preload(&self, cache: &Arc<ImageCache>) -> PreloadHandle {
        cache.preload(self.preload_urls())
    }

    /// Auto-advancing carousel position
    pub fn carousel_rotator(&self, period: Duration) -> Rotator {
        Rotator::spawn("carousel", self.carousel.len(), period)
    }
}

/// Preload selection: carousel images, leading category images, leading
/// featured primary images. Blank URLs are skipped, duplicates kept once.
pub fn collect_preload_urls(
    carousel: &[CarouselItem],
    categories: &[Category],
    featured: &[Product],
) -> Vec<String> {
    let candidates = carousel
        .iter()
        .map(|c| c.image_url.as_str())
        .chain(
            categories
                .iter()
                .take(CATEGORY_PRELOAD_LIMIT)
                .map(|c| c.image_url.as_str()),
        )
        .chain(
            featured
                .iter()
                .take(FEATURED_PRELOAD_LIMIT)
                .filter_map(|p| p.primary_image()),
        );

    let mut seen = HashSet::new();
    candidates
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDocumentStore;
    use serde_json::{json, Map, Value};

    fn export() -> Value {
        let mut categories = Map::new();
        for i in 0..10 {
            categories.insert(
                format!("cat{i:02}"),
                json!({"name": format!("Category {i}"), "description": "", "has_gender_variants": false,
                       "image_url": format!("https://cdn.example.com/cat{i}.jpg"), "order": i}),
            );
        }

        let mut products = Map::new();
        let mut featured_ids = Vec::new();
        for i in 0..6 {
            let id = format!("f{i}");
            products.insert(
                id.clone(),
                json!({"name": "Piece", "price": 10.0, "description": "", "category_id": "rings",
                       "images": [format!("https://cdn.example.com/{id}-a.jpg"), format!("https://cdn.example.com/{id}-b.jpg")]}),
            );
            featured_ids.push(id);
        }

        json!({
            "carousel_items": {
                "b1": {"imageUrl": "  https://cdn.example.com/banner1.jpg\n", "title": "Festive", "subtitle": "",
                       "buttonText": "Shop", "actionTarget": "rings", "actionType": "category"},
                "b2": {"imageUrl": "https://cdn.example.com/banner2.jpg", "title": "Bridal", "subtitle": "",
                       "buttonText": "Shop", "actionTarget": "bridal", "actionType": "collection"}
            },
            "categories": categories,
            "products": products,
            "featured_products": {"featured_list": {"product_ids": featured_ids}},
            "themed_collections": {
                "bridal": {"name": "Bridal", "description": "", "imageUrl": "https://cdn.example.com/bridal.jpg",
                           "order": 1, "featured": true, "productIds": ["f0"]}
            }
        })
    }

    fn repo() -> CatalogRepository {
        let store = InMemoryDocumentStore::from_export(&export()).unwrap();
        CatalogRepository::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_load_all_sections() {
        let feed = HomeFeed::load(&repo()).await.unwrap();
        assert_eq!(feed.carousel.len(), 2);
        assert_eq!(feed.categories.len(), 10);
        assert_eq!(feed.featured.len(), 6);
        assert_eq!(feed.collections.len(), 1);
        assert_eq!(feed.skipped, 0);
    }

    #[tokio::test]
    async fn test_preload_selection() {
        let feed = HomeFeed::load(&repo()).await.unwrap();
        let urls = feed.preload_urls();

        // 2 banners + 8 categories + 4 featured primaries
        assert_eq!(urls.len(), 14);
        assert_eq!(urls[0], "https://cdn.example.com/banner1.jpg");
        assert!(urls.contains(&"https://cdn.example.com/cat7.jpg".to_string()));
        assert!(!urls.contains(&"https://cdn.example.com/cat8.jpg".to_string()));
        assert!(urls.contains(&"https://cdn.example.com/f3-a.jpg".to_string()));
        assert!(!urls.contains(&"https://cdn.example.com/f4-a.jpg".to_string()));
        assert!(!urls.iter().any(|u| u.ends_with("-b.jpg")));
    }

    #[test]
    fn test_preload_dedupes_and_skips_blank() {
        let category = |url: &str| Category {
            id: "c".into(),
            name: "C".into(),
            description: String::new(),
            has_gender_variants: false,
            image_url: url.into(),
            order: 0,
        };
        let urls = collect_preload_urls(
            &[],
            &[category("https://x/a.jpg"), category(""), category("https://x/a.jpg")],
            &[],
        );
        assert_eq!(urls, vec!["https://x/a.jpg"]);
    }

    #[tokio::test]
    async fn test_carousel_rotator() {
        let feed = HomeFeed::load(&repo()).await.unwrap();
        let rotator = feed.carousel_rotator(CAROUSEL_PERIOD);
        assert_eq!(rotator.len(), 2);
        assert!(rotator.is_running());
    }
}
