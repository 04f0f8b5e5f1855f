//! Catalog Core
//!
//! Typed catalog reads, the product filter/sort engine, and the controllers that
//! combine them with the image cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  HomeFeed                         CategoryListing                │
//! │  (sections + preload selection)   (selection + visible + chips)  │
//! └───────────────┬──────────────────────────────┬───────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────────┐   ┌──────────────────────────────┐
//! │ CatalogRepository             │   │ filter::apply                │
//! │ batched id lookups, decode    │   │ pure, never fails            │
//! └───────────────┬───────────────┘   └──────────────────────────────┘
//!                 ▼
//!          DocumentStore port
//! ```

pub mod decode;
pub mod filter;
pub mod home;
pub mod listing;
pub mod repository;

mod proptest;

pub use decode::{decode_all, decode_document, Fetched};
pub use filter::{
    apply, extract_weight, FilterDimension, FilterOutcome, FilterSelection, SortOption, ALL_LABEL,
};
pub use home::{collect_preload_urls, HomeFeed};
pub use listing::CategoryListing;
pub use repository::CatalogRepository;
