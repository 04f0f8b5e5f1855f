//! Catalog Entities
//!
//! Typed snapshots of the documents held by the catalog document store. Each
//! entity declares its required and optional fields up front; decoding either
//! produces the whole entity or fails with a structured error (see
//! [`crate::catalog::decode`]).

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Collection Names
// =============================================================================

/// Document store collection names
pub mod collections {
    pub const CAROUSEL_ITEMS: &str = "carousel_items";
    pub const CATEGORIES: &str = "categories";
    pub const FEATURED_PRODUCTS: &str = "featured_products";
    pub const PRODUCTS: &str = "products";
    pub const THEMED_COLLECTIONS: &str = "themed_collections";
    pub const MATERIALS: &str = "materials";
    pub const CATEGORY_PRODUCTS: &str = "category_products";

    /// Document inside `featured_products` holding the ordered product ids
    pub const FEATURED_LIST_DOC: &str = "featured_list";
}

/// Entity that can be decoded from a catalog document.
pub trait CatalogEntity: serde::de::DeserializeOwned {
    /// Semantic checks that serde cannot express
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

// =============================================================================
// Product
// =============================================================================

/// Catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    /// Image URLs; index 0 is the primary image
    pub images: Vec<String>,
    pub description: String,
    pub category_id: String,
    #[serde(default)]
    pub material_id: Option<String>,
    /// Free label, not validated against the material's type list
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    /// Display string such as "24.6g"
    #[serde(default, deserialize_with = "text_or_number")]
    pub weight: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub featured: Option<bool>,
    #[serde(default, deserialize_with = "store_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Primary image URL, if any
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Treats a missing availability flag as available
    pub fn is_available(&self) -> bool {
        self.available.unwrap_or(true)
    }
}

impl CatalogEntity for Product {
    fn validate(&self) -> Result<(), String> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(format!("price must be a non-negative number, got {}", self.price));
        }
        Ok(())
    }
}

// =============================================================================
// Material
// =============================================================================

/// Filter facet. Type labels double as display text and filter keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "type", deserialize_with = "one_or_many")]
    pub types: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub purity: Option<String>,
}

impl Material {
    /// Whether this material offers the given type label
    pub fn has_type(&self, label: &str) -> bool {
        self.types.iter().any(|t| t == label)
    }
}

impl CatalogEntity for Material {
    fn validate(&self) -> Result<(), String> {
        for (i, label) in self.types.iter().enumerate() {
            if self.types[..i].contains(label) {
                return Err(format!("duplicate type label '{label}'"));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Category
// =============================================================================

/// Browsable product category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: String,
    pub has_gender_variants: bool,
    pub image_url: String,
    pub order: i64,
}

impl CatalogEntity for Category {}

// =============================================================================
// Carousel Item
// =============================================================================

/// Promotional banner on the home feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselItem {
    pub id: String,
    pub image_url: String,
    pub title: String,
    pub subtitle: String,
    pub button_text: String,
    pub action_target: String,
    pub action_type: String,
}

impl CatalogEntity for CarouselItem {}

// =============================================================================
// Themed Collection
// =============================================================================

/// Curated subset of products for merchandising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemedCollection {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub order: i64,
    pub featured: bool,
    #[serde(default)]
    pub product_ids: Option<Vec<String>>,
}

impl CatalogEntity for ThemedCollection {}

// =============================================================================
// Field Helpers
// =============================================================================

/// Store timestamps arrive either as epoch seconds or as `{seconds, nanoseconds}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(f64),
    Parts {
        seconds: i64,
        #[serde(default, alias = "nanos")]
        nanoseconds: u32,
    },
}

fn store_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let ts = match raw {
        RawTimestamp::Seconds(secs) => {
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        RawTimestamp::Parts {
            seconds,
            nanoseconds,
        } => Utc.timestamp_opt(seconds, nanoseconds).single(),
    };
    ts.map(Some)
        .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(f64),
}

fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<TextOrNumber>::deserialize(deserializer)?.map(|v| match v {
            TextOrNumber::Text(s) => s,
            TextOrNumber::Number(n) => n.to_string(),
        }),
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_optional_fields_default() {
        let product: Product = serde_json::from_value(json!({
            "id": "p1",
            "name": "Solitaire Ring",
            "price": 1200,
            "images": ["https://cdn.example.com/p1.jpg"],
            "description": "18k",
            "category_id": "rings"
        }))
        .unwrap();

        assert_eq!(product.price, 1200.0);
        assert!(product.material_id.is_none());
        assert!(product.created_at.is_none());
        assert!(product.is_available());
        assert_eq!(product.primary_image(), Some("https://cdn.example.com/p1.jpg"));
    }

    #[test]
    fn test_product_timestamp_forms() {
        let secs: Product = serde_json::from_value(json!({
            "id": "p1", "name": "n", "price": 1.0, "images": [],
            "description": "", "category_id": "c", "created_at": 1_700_000_000
        }))
        .unwrap();
        let parts: Product = serde_json::from_value(json!({
            "id": "p1", "name": "n", "price": 1.0, "images": [],
            "description": "", "category_id": "c",
            "created_at": {"seconds": 1_700_000_000, "nanoseconds": 0}
        }))
        .unwrap();

        assert_eq!(secs.created_at, parts.created_at);
        assert_eq!(secs.created_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_product_weight_accepts_number() {
        let product: Product = serde_json::from_value(json!({
            "id": "p1", "name": "n", "price": 1.0, "images": [],
            "description": "", "category_id": "c", "weight": 12.5
        }))
        .unwrap();
        assert_eq!(product.weight.as_deref(), Some("12.5"));
    }

    #[test]
    fn test_negative_price_fails_validation() {
        let product: Product = serde_json::from_value(json!({
            "id": "p1", "name": "n", "price": -3.0, "images": [],
            "description": "", "category_id": "c"
        }))
        .unwrap();
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_material_single_type_alias() {
        let material: Material = serde_json::from_value(json!({
            "id": "gold", "name": "Gold", "type": "22K"
        }))
        .unwrap();
        assert_eq!(material.types, vec!["22K".to_string()]);
        assert!(material.has_type("22K"));
    }

    #[test]
    fn test_material_duplicate_types_rejected() {
        let material: Material = serde_json::from_value(json!({
            "id": "gold", "name": "Gold", "types": ["22K", "18K", "22K"]
        }))
        .unwrap();
        assert!(material.validate().is_err());
    }

    #[test]
    fn test_carousel_item_camel_case() {
        let item: CarouselItem = serde_json::from_value(json!({
            "id": "c1",
            "imageUrl": "https://cdn.example.com/banner.jpg",
            "title": "Festive",
            "subtitle": "New arrivals",
            "buttonText": "Shop",
            "actionTarget": "rings",
            "actionType": "category"
        }))
        .unwrap();
        assert_eq!(item.button_text, "Shop");
    }
}
