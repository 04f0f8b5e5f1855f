//! Domain Layer
//!
//! Catalog entities and the ports the catalog core depends on.
//!
//! - **Models** (`models.rs`) - Typed catalog entities with explicit schemas
//! - **Ports** (`ports.rs`) - Trait abstraction over the document store

pub mod models;
pub mod ports;

pub use models::{
    collections, CarouselItem, CatalogEntity, Category, Material, Product, ThemedCollection,
};
pub use ports::{Document, DocumentStore, FieldFilter, Query, MAX_IN_QUERY_IDS};
