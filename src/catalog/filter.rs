//! Product Filter/Sort Engine
//!
//! Pure recomputation of a product listing from a [`FilterSelection`]: filter by
//! material, material type and gender, sort by price or weight, and produce the
//! active-filter chip labels shown above the listing.
//!
//! # Pipeline
//!
//! ```text
//! products ─▶ material ids ─▶ type labels ─▶ gender ─▶ sort ─▶ visible
//!                 │                │            │         │
//!                 └──── labels ────┴────────────┴─────────┴──▶ chips
//! ```
//!
//! The engine never fails: products missing a filtered field are excluded,
//! unparseable weights sort as `0.0`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::models::{Material, Product};

/// Chip shown when no filter or sort is active; also the "any gender" value.
pub const ALL_LABEL: &str = "All";

// =============================================================================
// Sort Option
// =============================================================================

/// Listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOption {
    /// Catalog order
    #[default]
    None,
    PriceAscending,
    PriceDescending,
    WeightAscending,
    WeightDescending,
}

impl SortOption {
    /// All options in menu order
    pub const ALL: [SortOption; 5] = [
        SortOption::None,
        SortOption::PriceAscending,
        SortOption::PriceDescending,
        SortOption::WeightAscending,
        SortOption::WeightDescending,
    ];

    /// Chip label, `None` when unsorted
    pub fn chip_label(&self) -> Option<&'static str> {
        match self {
            SortOption::None => None,
            SortOption::PriceAscending => Some("Price ↑"),
            SortOption::PriceDescending => Some("Price ↓"),
            SortOption::WeightAscending => Some("Weight ↑"),
            SortOption::WeightDescending => Some("Weight ↓"),
        }
    }

    /// Menu text
    pub fn display_name(&self) -> &'static str {
        match self {
            SortOption::None => "None",
            SortOption::PriceAscending => "Price: Low to High",
            SortOption::PriceDescending => "Price: High to Low",
            SortOption::WeightAscending => "Weight: Low to High",
            SortOption::WeightDescending => "Weight: High to Low",
        }
    }

    fn is_price(&self) -> bool {
        matches!(self, SortOption::PriceAscending | SortOption::PriceDescending)
    }

    fn is_weight(&self) -> bool {
        matches!(self, SortOption::WeightAscending | SortOption::WeightDescending)
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SortOption::None),
            "price-asc" | "price-ascending" => Ok(SortOption::PriceAscending),
            "price-desc" | "price-descending" => Ok(SortOption::PriceDescending),
            "weight-asc" | "weight-ascending" => Ok(SortOption::WeightAscending),
            "weight-desc" | "weight-descending" => Ok(SortOption::WeightDescending),
            other => Err(format!("unknown sort option '{other}'")),
        }
    }
}

// =============================================================================
// Filter Selection
// =============================================================================

/// Dimension cleared by [`FilterSelection::remove_label`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDimension {
    /// A material (by id), together with its type labels
    Material(String),
    /// A single type label
    MaterialType(String),
    Gender,
    Sort,
}

/// Current filter/sort state of a listing.
///
/// Type selection is linked to material selection: selecting a type selects its
/// material, deselecting a material clears its types, and deselecting the last
/// selected type of a material deselects the material. Type labels are matched
/// by value only, so identical labels on different materials are one filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    selected_materials: BTreeSet<String>,
    selected_material_types: BTreeSet<String>,
    selected_gender: Option<String>,
    sort_by: SortOption,
}

impl FilterSelection {
    /// Empty selection
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_materials(&self) -> &BTreeSet<String> {
        &self.selected_materials
    }

    pub fn selected_material_types(&self) -> &BTreeSet<String> {
        &self.selected_material_types
    }

    pub fn selected_gender(&self) -> Option<&str> {
        self.selected_gender.as_deref()
    }

    pub fn sort_by(&self) -> SortOption {
        self.sort_by
    }

    /// Whether the selection changes nothing
    pub fn is_empty(&self) -> bool {
        self.selected_materials.is_empty()
            && self.selected_material_types.is_empty()
            && self.active_gender().is_none()
            && self.sort_by == SortOption::None
    }

    /// Gender that actually filters (`"All"` does not)
    fn active_gender(&self) -> Option<&str> {
        self.selected_gender
            .as_deref()
            .filter(|g| !g.eq_ignore_ascii_case(ALL_LABEL))
    }

    pub fn select_material(&mut self, material: &Material) {
        self.selected_materials.insert(material.id.clone());
    }

    /// Deselect a material and every one of its type labels.
    pub fn deselect_material(&mut self, material: &Material) {
        self.selected_materials.remove(&material.id);
        for label in &material.types {
            self.selected_material_types.remove(label);
        }
    }

    pub fn toggle_material(&mut self, material: &Material) {
        if self.selected_materials.contains(&material.id) {
            self.deselect_material(material);
        } else {
            self.select_material(material);
        }
    }

    /// Select a type label and its parent material. Ignored, returning
    /// `false`, when the material does not offer the label.
    pub fn select_material_type(&mut self, material: &Material, label: &str) -> bool {
        if !material.has_type(label) {
            return false;
        }
        self.selected_material_types.insert(label.to_string());
        self.selected_materials.insert(material.id.clone());
        true
    }

    /// Deselect a type label. Selected materials offering the label that are
    /// left without any selected type are deselected too.
    pub fn deselect_material_type(&mut self, label: &str, materials: &[Material]) {
        if !self.selected_material_types.remove(label) {
            return;
        }
        for material in materials.iter().filter(|m| m.has_type(label)) {
            let any_left = material
                .types
                .iter()
                .any(|t| self.selected_material_types.contains(t));
            if !any_left {
                self.selected_materials.remove(&material.id);
            }
        }
    }

    /// `false` when the material does not offer the label; nothing changes.
    pub fn toggle_material_type(
        &mut self,
        material: &Material,
        label: &str,
        materials: &[Material],
    ) -> bool {
        if !material.has_type(label) {
            return false;
        }
        if self.selected_material_types.contains(label) {
            self.deselect_material_type(label, materials);
            true
        } else {
            self.select_material_type(material, label)
        }
    }

    /// Set or clear the gender filter; `"All"` disables it.
    pub fn set_gender(&mut self, gender: Option<String>) {
        self.selected_gender = gender;
    }

    pub fn set_sort(&mut self, sort: SortOption) {
        self.sort_by = sort;
    }

    /// Clear the one dimension a chip label refers to.
    ///
    /// Checked in order: selected material name, selected type label, gender
    /// value, sort indicator. A material named like a type label resolves to the
    /// material.
    pub fn remove_label(&mut self, label: &str, materials: &[Material]) -> Option<FilterDimension> {
        if let Some(material) = materials
            .iter()
            .find(|m| m.name == label && self.selected_materials.contains(&m.id))
        {
            let id = material.id.clone();
            self.deselect_material(material);
            return Some(FilterDimension::Material(id));
        }

        if self.selected_material_types.contains(label) {
            self.deselect_material_type(label, materials);
            return Some(FilterDimension::MaterialType(label.to_string()));
        }

        if self.active_gender() == Some(label) {
            self.selected_gender = None;
            return Some(FilterDimension::Gender);
        }

        let sort_matches = (label.contains("Price") && self.sort_by.is_price())
            || (label.contains("Weight") && self.sort_by.is_weight());
        if sort_matches {
            self.sort_by = SortOption::None;
            return Some(FilterDimension::Sort);
        }

        None
    }

    /// Clear all four dimensions.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Result of applying a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Products to render, in display order
    pub visible: Vec<Product>,
    /// Chip labels: materials, types, gender, sort; `["All"]` when none
    pub active_labels: Vec<String>,
}

/// Numeric weight from a display string.
///
/// Keeps ASCII digits and decimal points and parses what remains, so
/// `"24.6g"` is `24.6` and `"2 x 3.5mm"` is `23.5`. Anything unparseable is `0.0`.
pub fn extract_weight(text: &str) -> f64 {
    let digits: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse::<f64>().unwrap_or(0.0)
}

fn product_weight(product: &Product) -> f64 {
    product.weight.as_deref().map(extract_weight).unwrap_or(0.0)
}

/// Apply a selection to a product list.
pub fn apply(products: &[Product], selection: &FilterSelection, materials: &[Material]) -> FilterOutcome {
    let mut visible: Vec<Product> = products.to_vec();
    let mut labels: Vec<String> = Vec::new();

    if !selection.selected_materials.is_empty() {
        visible.retain(|p| {
            p.material_id
                .as_ref()
                .is_some_and(|id| selection.selected_materials.contains(id))
        });
        labels.extend(
            materials
                .iter()
                .filter(|m| selection.selected_materials.contains(&m.id))
                .map(|m| m.name.clone()),
        );
    }

    if !selection.selected_material_types.is_empty() {
        visible.retain(|p| {
            p.material_type
                .as_ref()
                .is_some_and(|t| selection.selected_material_types.contains(t))
        });
        labels.extend(selection.selected_material_types.iter().cloned());
    }

    if let Some(gender) = selection.active_gender() {
        let wanted = gender.to_lowercase();
        visible.retain(|p| p.gender.as_ref().is_some_and(|g| g.to_lowercase() == wanted));
        labels.push(gender.to_string());
    }

    match selection.sort_by {
        SortOption::None => {}
        SortOption::PriceAscending => visible.sort_by(|a, b| a.price.total_cmp(&b.price)),
        SortOption::PriceDescending => visible.sort_by(|a, b| b.price.total_cmp(&a.price)),
        SortOption::WeightAscending => {
            visible.sort_by(|a, b| product_weight(a).total_cmp(&product_weight(b)))
        }
        SortOption::WeightDescending => {
            visible.sort_by(|a, b| product_weight(b).total_cmp(&product_weight(a)))
        }
    }
    if let Some(label) = selection.sort_by.chip_label() {
        labels.push(label.to_string());
    }

    if labels.is_empty() {
        labels.push(ALL_LABEL.to_string());
    }

    FilterOutcome {
        visible,
        active_labels: labels,
    }
}

// =============================================================================
// Tests
// =============================================================================
