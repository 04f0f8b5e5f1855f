//! Jewel Catalog Integration Tests
//!
//! Tests across module boundaries:
//! - Feature 1: Catalog browsing (store → repository → filter engine)
//! - Feature 2: Tiered image cache over the filesystem
//! - Feature 3: Home feed preloading through the cache

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageBuffer, ImageFormat, Rgb};
use serde_json::{json, Map, Value};

use jewel_catalog::adapters::InMemoryDocumentStore;
use jewel_catalog::catalog::{CatalogRepository, CategoryListing, HomeFeed, SortOption};
use jewel_catalog::error::ImageError;
use jewel_catalog::image_cache::{
    CacheType, FsDiskStore, ImageCache, ImageCacheConfig, ImageFetcher, ImageSource,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Serves a small PNG for every URL after `delay`; counts calls.
struct CountingFetcher {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingFetcher {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if url.contains("missing") {
            return Err(ImageError::Network {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".into(),
            });
        }

        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 6, Rgb([192, 192, 192]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        Ok(Bytes::from(buf.into_inner()))
    }
}

fn catalog_export() -> Value {
    let mut products = Map::new();
    let mut ring_ids = Vec::new();
    for i in 0..10 {
        let id = format!("ring-{i:02}");
        let material = match i % 3 {
            0 => "gold",
            1 => "silver",
            _ => "platinum",
        };
        let material = if i == 9 { "silver" } else { material };
        let price = 100.0 + ((i * 7) % 10) as f64 * 50.0;
        let gender = if i % 2 == 0 { "Women" } else { "Men" };
        products.insert(
            id.clone(),
            json!({
                "name": format!("Ring {i}"),
                "price": price,
                "images": [format!("https://cdn.example.com/rings/{id}.png?token=abc")],
                "description": "Handcrafted ring",
                "category_id": "rings",
                "material_id": material,
                "weight": format!("{}.{}g", 2 + i % 4, i),
                "gender": gender,
                "available": true
            }),
        );
        ring_ids.push(id);
    }

    json!({
        "products": products,
        "category_products": {"rings": {"product_ids": ring_ids}},
        "featured_products": {"featured_list": {"product_ids": ["ring-03", "ring-01", "ring-07"]}},
        "materials": {
            "gold": {"name": "Gold", "types": ["22K", "18K"]},
            "silver": {"name": "Silver", "type": "925"},
            "platinum": {"name": "Platinum", "types": ["950"]}
        },
        "categories": {
            "rings": {"name": "Rings", "description": "", "has_gender_variants": true,
                      "image_url": "https://cdn.example.com/cat/rings.png", "order": 1}
        },
        "carousel_items": {
            "diwali": {"imageUrl": " https://cdn.example.com/banners/diwali.png ", "title": "Diwali",
                       "subtitle": "", "buttonText": "Shop", "actionTarget": "rings", "actionType": "category"}
        },
        "themed_collections": {}
    })
}

fn repository() -> CatalogRepository {
    let store = InMemoryDocumentStore::from_export(&catalog_export()).unwrap();
    CatalogRepository::new(Arc::new(store))
}

fn fs_cache(dir: &std::path::Path, fetcher: Arc<CountingFetcher>) -> Arc<ImageCache> {
    let config = ImageCacheConfig {
        cache_dir: dir.to_path_buf(),
        ..Default::default()
    };
    let store = FsDiskStore::new(config.cache_dir.clone());
    ImageCache::new(config, Arc::new(store), fetcher)
}

// =============================================================================
// Feature 1: Catalog Browsing
// =============================================================================

mod catalog_tests {
    use super::*;

    #[tokio::test]
    async fn test_gold_price_descending_scenario() {
        let mut listing = CategoryListing::load(&repository(), "rings").await.unwrap();
        assert_eq!(listing.visible().len(), 10);

        listing.toggle_material("gold");
        listing.set_sort(SortOption::PriceDescending);

        let visible = listing.visible();
        assert_eq!(visible.len(), 3);
        assert!(visible.iter().all(|p| p.material_id.as_deref() == Some("gold")));
        assert!(visible.windows(2).all(|w| w[0].price >= w[1].price));
        assert_eq!(listing.active_labels(), ["Gold", "Price ↓"]);

        listing.reset_filters();
        let ids: Vec<_> = listing.visible().iter().map(|p| p.id.clone()).collect();
        let expected: Vec<_> = (0..10).map(|i| format!("ring-{i:02}")).collect();
        assert_eq!(ids, expected);
        assert_eq!(listing.active_labels(), ["All"]);
    }

    #[tokio::test]
    async fn test_single_type_field_decodes() {
        let listing = CategoryListing::load(&repository(), "rings").await.unwrap();
        assert_eq!(listing.types_for_material("silver"), ["925"]);
    }

    #[tokio::test]
    async fn test_featured_order_follows_list() {
        let featured = repository().fetch_featured_products().await.unwrap();
        let ids: Vec<_> = featured.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ring-03", "ring-01", "ring-07"]);
    }

    #[tokio::test]
    async fn test_bad_document_skipped_not_fatal() {
        let mut export = catalog_export();
        export["products"]["ring-05"]["price"] = json!("expensive");
        let store = InMemoryDocumentStore::from_export(&export).unwrap();
        let repo = CatalogRepository::new(Arc::new(store));

        let fetched = repo.fetch_products_by_category("rings").await.unwrap();
        assert_eq!(fetched.items.len(), 9);
        assert_eq!(fetched.skipped.len(), 1);
        assert_eq!(fetched.skipped[0].document_id, "ring-05");
    }
}

// =============================================================================
// Feature 2: Tiered Image Cache
// =============================================================================

mod cache_tests {
    use super::*;

    const URL: &str = "https://cdn.example.com/rings/ring-00.png?token=abc";

    #[tokio::test]
    async fn test_tiers_over_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(Duration::ZERO);
        let cache = fs_cache(dir.path(), fetcher.clone());

        assert_eq!(cache.cache_type_of(URL).await, CacheType::None);
        assert_eq!(cache.get_served(URL).await.unwrap().source, ImageSource::Network);
        assert_eq!(cache.cache_type_of(URL).await, CacheType::Memory);

        cache.clear_memory();
        assert_eq!(cache.cache_type_of(URL).await, CacheType::Disk);
        assert_eq!(cache.get_served(URL).await.unwrap().source, ImageSource::Disk);
        assert_eq!(fetcher.calls(), 1);

        let report = cache.size_report().await.unwrap();
        assert_eq!(report.file_count, 1);
        assert!(report.total_bytes > 0);
    }

    #[tokio::test]
    async fn test_disk_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(Duration::ZERO);

        let first = fs_cache(dir.path(), fetcher.clone());
        first.get(URL).await.unwrap();
        drop(first);

        let second = fs_cache(dir.path(), fetcher.clone());
        let served = second.get_served(&format!("  {URL}\n")).await.unwrap();
        assert_eq!(served.source, ImageSource::Disk);
        assert_eq!((served.image.width(), served.image.height()), (8, 6));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(Duration::from_millis(100));
        let cache = fs_cache(dir.path(), fetcher.clone());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get(URL).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_then_clear_all() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(Duration::ZERO);
        let cache = fs_cache(dir.path(), fetcher.clone());

        let err = cache.get("https://cdn.example.com/missing.png").await.unwrap_err();
        assert_matches!(err, ImageError::Network { .. });
        assert!(err.is_retryable());

        cache.get(URL).await.unwrap();
        cache.clear_all().await.unwrap();
        assert_eq!(cache.cache_type_of(URL).await, CacheType::None);
        assert_eq!(cache.size_report().await.unwrap().file_count, 0);

        // Cache keeps working after the directory is removed
        cache.get(URL).await.unwrap();
        assert_eq!(cache.size_report().await.unwrap().file_count, 1);
    }
}

// =============================================================================
// Feature 3: Home Feed Preloading
// =============================================================================

mod home_tests {
    use super::*;

    #[tokio::test]
    async fn test_home_preload_warms_cache() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(Duration::from_millis(5));
        let cache = fs_cache(dir.path(), fetcher.clone());

        let feed = HomeFeed::load(&repository()).await.unwrap();
        // 1 banner + 1 category + 3 featured primaries
        assert_eq!(feed.preload_urls().len(), 5);

        let report = feed.preload(&cache).await.unwrap();
        assert_eq!(report.fetched, 5);
        assert_eq!(report.failed, 0);

        let again = feed.preload(&cache).await.unwrap();
        assert_eq!(again.already_cached, 5);
        assert_eq!(fetcher.calls(), 5);

        assert_eq!(
            cache.cache_type_of("https://cdn.example.com/banners/diwali.png").await,
            CacheType::Memory
        );
    }

    #[tokio::test]
    async fn test_listing_preload_follows_filter() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(Duration::ZERO);
        let cache = fs_cache(dir.path(), fetcher.clone());

        let mut listing = CategoryListing::load(&repository(), "rings").await.unwrap();
        listing.toggle_material("platinum");
        let report = listing.preload_images(&cache).await.unwrap();

        assert_eq!(report.requested, listing.visible().len());
        assert_eq!(fetcher.calls(), listing.visible().len());
    }
}
