//! Jewel Catalog - Storefront Catalog Core
//!
//! Catalog browsing for a jewelry storefront: typed catalog reads, a product
//! filter/sort engine, and a tiered image cache (memory → disk → network).
//!
//! # Architecture
//!
//! Two independent subsystems, composed by the controllers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Controllers                              │
//! │        HomeFeed (preload)          CategoryListing (filter)      │
//! ├────────────────────────────────┬────────────────────────────────┤
//! │  Catalog                       │  Image Cache                    │
//! │  ┌──────────────┐ ┌──────────┐ │  ┌────────┐ ┌──────┐ ┌───────┐  │
//! │  │ Repository   │▶│ Filter   │ │  │ Memory │▶│ Disk │▶│ Fetch │  │
//! │  │ (store port) │ │ engine   │ │  │ LRU    │ │ blobs│ │ HTTP  │  │
//! │  └──────────────┘ └──────────┘ │  └────────┘ └──────┘ └───────┘  │
//! └────────────────────────────────┴────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`catalog`] - Repository, filter engine, listing and home controllers
//! - [`domain`] - Catalog entities and the document store port
//! - [`error`] - Error types
//! - [`image_cache`] - Tiered image cache
//! - [`scheduler`] - Owned periodic tasks

pub mod adapters;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod image_cache;
pub mod scheduler;

// Re-export commonly used types
pub use catalog::{CatalogRepository, CategoryListing, FilterSelection, HomeFeed, SortOption};
pub use domain::{Category, DocumentStore, Material, Product};
pub use error::{Error, ImageError, Result};
pub use image_cache::{CacheType, ImageCache, ImageCacheConfig};
pub use scheduler::{Rotator, ScheduledTask};
