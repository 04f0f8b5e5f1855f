//! Property-Based Tests for the Filter/Sort Engine
//!
//! # Test Properties
//!
//! 1. **Membership**: every visible product matches every active filter
//! 2. **Completeness**: no matching product is dropped
//! 3. **Ordering**: sorts are monotone and stable
//! 4. **Reset**: a reset selection reproduces the input
//! 5. **Linkage**: selected types always belong to a selected material

#![cfg(test)]

use proptest::prelude::*;

use super::filter::tests::{material, product};
use super::filter::{apply, extract_weight, FilterSelection, SortOption, ALL_LABEL};
use crate::domain::models::{Material, Product};

// =============================================================================
// Property Strategies
// =============================================================================

const MATERIAL_IDS: [&str; 3] = ["gold", "silver", "platinum"];
const TYPE_LABELS: [&str; 4] = ["22K", "18K", "925", "950"];

fn catalog_materials() -> Vec<Material> {
    vec![
        material("gold", "Gold", &["22K", "18K"]),
        material("silver", "Silver", &["925"]),
        material("platinum", "Platinum", &["950"]),
    ]
}

/// Strategy for a product with optional facets and a noisy weight string.
fn product_strategy() -> impl Strategy<Value = Product> {
    (
        0u32..5000,
        prop::option::of(prop::sample::select(MATERIAL_IDS.to_vec())),
        prop::option::of(prop::sample::select(TYPE_LABELS.to_vec())),
        prop::option::of(prop::sample::select(vec!["Men", "Women", "women", "Unisex"])),
        prop::option::of("[0-9]{0,2}(\\.[0-9])?[a-z ]{0,3}"),
    )
        .prop_map(|(price, material_id, material_type, gender, weight)| {
            let mut p = product("p", price as f64 / 4.0, material_id);
            p.material_type = material_type.map(str::to_string);
            p.gender = gender.map(str::to_string);
            p.weight = weight;
            p
        })
}

/// Strategy for a catalog with unique ids.
fn products_strategy() -> impl Strategy<Value = Vec<Product>> {
    prop::collection::vec(product_strategy(), 0..40).prop_map(|mut products| {
        for (i, p) in products.iter_mut().enumerate() {
            p.id = format!("p{i:03}");
        }
        products
    })
}

fn sort_strategy() -> impl Strategy<Value = SortOption> {
    prop::sample::select(SortOption::ALL.to_vec())
}

#[derive(Debug, Clone)]
enum Op {
    ToggleMaterial(usize),
    ToggleType(usize, usize),
    RemoveLabel(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3).prop_map(Op::ToggleMaterial),
        (0usize..3, 0usize..2).prop_map(|(m, t)| Op::ToggleType(m, t)),
        (0usize..7).prop_map(Op::RemoveLabel),
    ]
}

fn position(products: &[Product], id: &str) -> usize {
    products.iter().position(|p| p.id == id).unwrap_or(usize::MAX)
}

// =============================================================================
// Filter Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: material filtering keeps exactly the products of the selected materials.
    #[test]
    fn prop_material_membership(
        products in products_strategy(),
        picks in prop::collection::vec(0usize..3, 1..3),
    ) {
        let materials = catalog_materials();
        let mut selection = FilterSelection::new();
        for i in &picks {
            selection.select_material(&materials[*i]);
        }

        let outcome = apply(&products, &selection, &materials);
        let selected = selection.selected_materials();

        for p in &outcome.visible {
            let id = p.material_id.as_ref();
            prop_assert!(id.is_some_and(|id| selected.contains(id)));
        }
        let expected = products
            .iter()
            .filter(|p| p.material_id.as_ref().is_some_and(|id| selected.contains(id)))
            .count();
        prop_assert_eq!(outcome.visible.len(), expected);
    }

    /// Property: gender filtering is case-insensitive and "All" is a no-op.
    #[test]
    fn prop_gender_filter(products in products_strategy()) {
        let mut selection = FilterSelection::new();
        selection.set_gender(Some("WOMEN".into()));
        let outcome = apply(&products, &selection, &[]);
        prop_assert!(outcome
            .visible
            .iter()
            .all(|p| p.gender.as_deref().is_some_and(|g| g.eq_ignore_ascii_case("women"))));

        selection.set_gender(Some(ALL_LABEL.into()));
        prop_assert_eq!(apply(&products, &selection, &[]).visible, products);
    }

    /// Property: every sort is a monotone, stable permutation of the filtered input.
    #[test]
    fn prop_sort_monotone_and_stable(
        products in products_strategy(),
        sort in sort_strategy(),
    ) {
        let mut selection = FilterSelection::new();
        selection.set_sort(sort);
        let visible = apply(&products, &selection, &[]).visible;
        prop_assert_eq!(visible.len(), products.len());

        let key = |p: &Product| match sort {
            SortOption::None => 0.0,
            SortOption::PriceAscending => p.price,
            SortOption::PriceDescending => -p.price,
            SortOption::WeightAscending => p.weight.as_deref().map(extract_weight).unwrap_or(0.0),
            SortOption::WeightDescending => -p.weight.as_deref().map(extract_weight).unwrap_or(0.0),
        };

        for pair in visible.windows(2) {
            let (a, b) = (key(&pair[0]), key(&pair[1]));
            prop_assert!(a <= b, "{} before {}", a, b);
            if a == b {
                prop_assert!(position(&products, &pair[0].id) < position(&products, &pair[1].id));
            }
        }
    }

    /// Property: resetting any selection reproduces the input and the "All" chip.
    #[test]
    fn prop_reset_restores_input(
        products in products_strategy(),
        sort in sort_strategy(),
        pick in 0usize..3,
    ) {
        let materials = catalog_materials();
        let mut selection = FilterSelection::new();
        selection.select_material_type(&materials[pick], &materials[pick].types[0]);
        selection.set_gender(Some("Men".into()));
        selection.set_sort(sort);

        selection.reset();
        let outcome = apply(&products, &selection, &materials);
        prop_assert_eq!(outcome.visible, products);
        prop_assert_eq!(outcome.active_labels, vec![ALL_LABEL.to_string()]);
    }

    /// Property: selected types always belong to a selected material, whatever
    /// sequence of toggles and chip removals produced the selection.
    #[test]
    fn prop_type_material_linkage(ops in prop::collection::vec(op_strategy(), 0..30)) {
        let materials = catalog_materials();
        let labels = ["Gold", "Silver", "Platinum", "22K", "18K", "925", "950"];
        let mut selection = FilterSelection::new();

        for op in ops {
            match op {
                Op::ToggleMaterial(m) => selection.toggle_material(&materials[m]),
                Op::ToggleType(m, t) => {
                    let material = &materials[m];
                    let label = &material.types[t % material.types.len()];
                    selection.toggle_material_type(material, label, &materials);
                }
                Op::RemoveLabel(l) => {
                    selection.remove_label(labels[l], &materials);
                }
            }

            for label in selection.selected_material_types() {
                prop_assert!(
                    materials
                        .iter()
                        .any(|m| m.has_type(label) && selection.selected_materials().contains(&m.id)),
                    "type {} selected without its material", label
                );
            }
        }
    }

    /// Property: the chip list is ["All"] exactly when the selection is empty.
    #[test]
    fn prop_all_chip_iff_empty(
        products in products_strategy(),
        sort in sort_strategy(),
        pick in prop::option::of(0usize..3),
    ) {
        let materials = catalog_materials();
        let mut selection = FilterSelection::new();
        if let Some(i) = pick {
            selection.select_material(&materials[i]);
        }
        selection.set_sort(sort);

        let labels = apply(&products, &selection, &materials).active_labels;
        prop_assert_eq!(labels == vec![ALL_LABEL.to_string()], selection.is_empty());
    }

    /// Property: weight extraction never fails and never goes negative.
    #[test]
    fn prop_extract_weight_total(text in ".{0,24}") {
        let weight = extract_weight(&text);
        prop_assert!(weight.is_finite());
        prop_assert!(weight >= 0.0);
    }
}
