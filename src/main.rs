//! Jewel Catalog CLI
//!
//! Runs the catalog core against a JSON catalog export and a local image cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        jewel-catalog                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ JSON export  │───▶│  Repository  │───▶│ Filter/Sort  │       │
//! │  │ (doc store)  │    │              │    │   engine     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │                             │                                    │
//! │                             ▼                                    │
//! │                      ┌──────────────┐                            │
//! │                      │ Image cache  │ memory → disk → network    │
//! │                      └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jewel_catalog::adapters::InMemoryDocumentStore;
use jewel_catalog::catalog::{CatalogRepository, CategoryListing, HomeFeed, SortOption};
use jewel_catalog::image_cache::{FsDiskStore, HttpImageFetcher, ImageCache, ImageCacheConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Jewel Catalog - browse a catalog export and manage the image cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image cache configuration file (YAML)
    #[arg(long, env = "IMAGE_CACHE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Image cache directory (overrides the configuration file)
    #[arg(long, env = "IMAGE_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Network fetch timeout in seconds (overrides the configuration file)
    #[arg(long, env = "IMAGE_FETCH_TIMEOUT_SECONDS", global = true)]
    fetch_timeout_seconds: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter and sort one category's products
    Browse {
        /// Catalog export (collection -> id -> fields)
        #[arg(long, env = "CATALOG_DATA")]
        data: PathBuf,

        /// Category id
        #[arg(long)]
        category: String,

        /// Material id to filter by (repeatable)
        #[arg(long = "material")]
        materials: Vec<String>,

        /// Material type as MATERIAL_ID:LABEL, e.g. gold:22K (repeatable)
        #[arg(long = "type")]
        types: Vec<String>,

        /// Gender filter ("All" disables it)
        #[arg(long)]
        gender: Option<String>,

        /// Sort: none, price-asc, price-desc, weight-asc, weight-desc
        #[arg(long, default_value = "none")]
        sort: SortOption,

        /// Preload the images of the visible products
        #[arg(long)]
        preload: bool,

        /// Print the visible products as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load the home feed and preload its images
    Home {
        /// Catalog export (collection -> id -> fields)
        #[arg(long, env = "CATALOG_DATA")]
        data: PathBuf,

        /// Skip image preloading
        #[arg(long)]
        no_preload: bool,
    },

    /// Fetch images through the cache and report the tier that answered
    Fetch {
        /// Image URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Report disk cache usage
    CacheSize,

    /// Delete every cached image
    ClearCache,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    let config = load_config(&args)?;
    info!(cache_dir = %config.cache_dir.display(), "Starting jewel-catalog");

    match args.command {
        Command::Browse {
            data,
            category,
            materials,
            types,
            gender,
            sort,
            preload,
            json,
        } => {
            let repo = open_repository(&data).await?;
            let mut listing = CategoryListing::load(&repo, &category).await?;

            for material in &materials {
                if !listing.toggle_material(material) {
                    warn!(material = %material, "Unknown material, ignored");
                }
            }
            for entry in &types {
                let Some((material, label)) = entry.split_once(':') else {
                    bail!("--type expects MATERIAL_ID:LABEL, got '{entry}'");
                };
                if !listing.toggle_material_type(material, label) {
                    warn!(material = %material, label = %label, "Unknown material type, ignored");
                }
            }
            listing.set_gender(gender);
            listing.set_sort(sort);

            if json {
                println!("{}", serde_json::to_string_pretty(listing.visible())?);
            } else {
                println!("Filters: {}", listing.active_labels().join(", "));
                for product in listing.visible() {
                    println!(
                        "{:<16} {:>10.2}  {:<8} {}",
                        product.id,
                        product.price,
                        product.weight.as_deref().unwrap_or("-"),
                        product.name
                    );
                }
            }

            if preload {
                let cache = open_cache(&config).await?;
                let report = listing.preload_images(&cache).await?;
                println!(
                    "Preloaded {} images: {} cached, {} fetched, {} failed",
                    report.requested, report.already_cached, report.fetched, report.failed
                );
                cache.on_terminate().await?;
            }
        }

        Command::Home { data, no_preload } => {
            let repo = open_repository(&data).await?;
            let feed = HomeFeed::load(&repo).await?;

            println!("Carousel: {}", feed.carousel.len());
            println!("Categories: {}", feed.categories.len());
            println!("Featured: {}", feed.featured.len());
            println!("Collections: {}", feed.collections.len());
            if feed.skipped > 0 {
                println!("Skipped documents: {}", feed.skipped);
            }

            if !no_preload {
                let cache = open_cache(&config).await?;
                let report = feed.preload(&cache).await?;
                println!(
                    "Preloaded {} images: {} cached, {} fetched, {} failed",
                    report.requested, report.already_cached, report.fetched, report.failed
                );
                cache.on_terminate().await?;
            }
        }

        Command::Fetch { urls } => {
            let cache = open_cache(&config).await?;
            let mut failures = 0;
            for url in &urls {
                match cache.get_served(url).await {
                    Ok(served) => println!(
                        "{:<8} {:>5}x{:<5} {:>9} bytes  {}",
                        served.source.to_string(),
                        served.image.width(),
                        served.image.height(),
                        served.image.size(),
                        url
                    ),
                    Err(e) => {
                        failures += 1;
                        println!("failed   {e}");
                    }
                }
            }
            let metrics = cache.metrics();
            info!(hit_ratio = metrics.hit_ratio, fetches = metrics.network_fetches, "Fetch finished");
            cache.on_terminate().await?;
            if failures > 0 {
                bail!("{failures} of {} images failed", urls.len());
            }
        }

        Command::CacheSize => {
            let cache = open_cache(&config).await?;
            let report = cache.size_report().await?;
            println!("{} files, {} bytes", report.file_count, report.total_bytes);
        }

        Command::ClearCache => {
            let cache = open_cache(&config).await?;
            cache.clear_all().await?;
            println!("Cleared {}", config.cache_dir.display());
        }
    }

    Ok(())
}

// =============================================================================
// Setup
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<ImageCacheConfig> {
    let mut config = match &args.config {
        Some(path) => ImageCacheConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ImageCacheConfig::default(),
    };

    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(secs) = args.fetch_timeout_seconds {
        config.fetch_timeout_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

async fn open_repository(path: &Path) -> anyhow::Result<CatalogRepository> {
    let store = InMemoryDocumentStore::load(path)
        .await
        .with_context(|| format!("loading catalog export {}", path.display()))?;
    Ok(CatalogRepository::new(Arc::new(store)))
}

async fn open_cache(config: &ImageCacheConfig) -> anyhow::Result<Arc<ImageCache>> {
    let fetcher = HttpImageFetcher::new(config.fetch_timeout())?;
    let store = FsDiskStore::new(config.cache_dir.clone());
    let cache = ImageCache::new(config.clone(), Arc::new(store), Arc::new(fetcher));

    // Entries left by earlier runs may have expired
    if let Err(e) = cache.sweep_disk().await {
        warn!(error = %e, "Initial disk sweep failed");
    }
    Ok(cache)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}
