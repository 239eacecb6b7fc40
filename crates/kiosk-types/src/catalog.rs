//! Product catalog: categories, items, and operator availability flags.
//!
//! The catalog is the source of legal relay numbers. The wire codec accepts
//! any relay, so the order machine resolves every selection through
//! [`Catalog::find_item`] before it builds a command.

use serde::{Deserialize, Serialize};

/// Dispense duration used when an item does not set one.
pub const DEFAULT_DISPENSE_SECS: u32 = 3;
pub const MIN_DISPENSE_SECS: u32 = 1;
pub const MAX_DISPENSE_SECS: u32 = 120;

fn default_dispense_secs() -> u32 {
    DEFAULT_DISPENSE_SECS
}

fn default_enabled() -> bool {
    true
}

/// Clamp a dispense duration into the 1–120 s operator range.
pub fn clamp_dispense_secs(secs: u32) -> u32 {
    secs.clamp(MIN_DISPENSE_SECS, MAX_DISPENSE_SECS)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub relay: u32,
    #[serde(default = "default_dispense_secs")]
    pub dispense_secs: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Operator override shown instead of `name` when non-blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Payment barcode shown while the kiosk waits for confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode_image: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, relay: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            relay,
            dispense_secs: DEFAULT_DISPENSE_SECS,
            enabled: true,
            display_name: None,
            barcode_image: None,
        }
    }

    /// Custom name when one is set and non-blank, else the built-in name.
    pub fn display_name(&self) -> &str {
        match self.display_name.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => custom,
            _ => &self.name,
        }
    }

    /// Dispense duration with the 1–120 s range applied on read.
    pub fn dispense_secs(&self) -> u32 {
        clamp_dispense_secs(self.dispense_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            items,
        }
    }

    pub fn available_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| i.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Default for Catalog {
    fn default() -> Self {
        default_catalog()
    }
}

impl Catalog {
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// An item together with its owning category, if both exist.
    pub fn find_item(&self, category_id: &str, item_id: &str) -> Option<(&Category, &Item)> {
        let category = self.category(category_id)?;
        let item = category.items.iter().find(|i| i.id == item_id)?;
        Some((category, item))
    }

    pub fn available_categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.enabled)
    }

    /// Toggle a category. Returns `false` when the id is unknown.
    pub fn set_category_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.categories.iter_mut().find(|c| c.id == id) {
            Some(category) => {
                category.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Toggle an item in any category. Returns `false` when the id is unknown.
    pub fn set_item_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Set an item's dispense duration, clamped into range. Returns the
    /// stored value, or `None` for an unknown id.
    pub fn set_dispense_secs(&mut self, id: &str, secs: u32) -> Option<u32> {
        let item = self.item_mut(id)?;
        item.dispense_secs = clamp_dispense_secs(secs);
        Some(item.dispense_secs)
    }

    /// Set or clear the custom display name. Blank names clear it.
    pub fn set_display_name(&mut self, id: &str, name: Option<&str>) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.display_name = name
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string);
                true
            }
            None => false,
        }
    }

    /// Set or clear the payment barcode image. Blank paths clear it.
    pub fn set_barcode_image(&mut self, id: &str, image: Option<&str>) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.barcode_image = image
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string);
                true
            }
            None => false,
        }
    }

    fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.categories
            .iter_mut()
            .flat_map(|c| c.items.iter_mut())
            .find(|i| i.id == id)
    }
}

fn stock_category(id: &str, name: &str, items: [(&str, &str); 4], first_relay: u32) -> Category {
    let items = items
        .into_iter()
        .zip(first_relay..)
        .map(|((item_id, item_name), relay)| Item::new(item_id, item_name, relay))
        .collect();
    Category::new(id, name, items)
}

/// The stock layout: four categories of four items on relays 0–15.
pub fn default_catalog() -> Catalog {
    Catalog {
        categories: vec![
            stock_category(
                "aneka-kopi",
                "Aneka Kopi",
                [
                    ("kopi-hitam", "Kopi Hitam"),
                    ("kapal-api-mix", "Kapal Api Mix"),
                    ("gula-aren", "Gula Aren"),
                    ("susu-panas", "Susu Panas"),
                ],
                0,
            ),
            stock_category(
                "minuman-dingin",
                "Minuman Dingin",
                [
                    ("es-teh", "Teh Pucuk"),
                    ("es-jeruk", "Susu Beruang"),
                    ("es-kopi", "Mizone"),
                    ("jus-buah", "Air Mineral"),
                ],
                4,
            ),
            stock_category(
                "makanan-ringan",
                "Snack, Biskuit & Pop Mie",
                [
                    ("keripik", "Pop Mie Goreng"),
                    ("biskuit", "Pop Mie Kuah"),
                    ("kacang", "Roma Kelapa"),
                    ("permen", "Teh Manis Panas"),
                ],
                8,
            ),
            stock_category(
                "rokok-ketengah",
                "Rokok Ketengan",
                [
                    ("marlboro", "Surya"),
                    ("gudang-garam", "Jarum Coklat"),
                    ("sampoerna", "Sampoerna Mild"),
                    ("djarum", "Rc Biru"),
                ],
                12,
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_covers_sixteen_relays() {
        let catalog = default_catalog();
        assert_eq!(catalog.categories.len(), 4);
        let mut relays: Vec<u32> = catalog
            .categories
            .iter()
            .flat_map(|c| c.items.iter().map(|i| i.relay))
            .collect();
        relays.sort_unstable();
        assert_eq!(relays, (0..16).collect::<Vec<_>>());

        let (_, item) = catalog.find_item("minuman-dingin", "es-teh").unwrap();
        assert_eq!(item.relay, 4);
        assert_eq!(item.dispense_secs(), DEFAULT_DISPENSE_SECS);
    }

    #[test]
    fn display_name_falls_back_when_blank() {
        let mut catalog = default_catalog();
        assert!(catalog.set_display_name("kopi-hitam", Some("  ")));
        let (_, item) = catalog.find_item("aneka-kopi", "kopi-hitam").unwrap();
        assert_eq!(item.display_name(), "Kopi Hitam");

        catalog.set_display_name("kopi-hitam", Some("Black Coffee"));
        let (_, item) = catalog.find_item("aneka-kopi", "kopi-hitam").unwrap();
        assert_eq!(item.display_name(), "Black Coffee");
    }

    #[test]
    fn barcode_image_is_set_and_cleared() {
        let mut catalog = default_catalog();
        assert!(catalog.set_barcode_image("susu-panas", Some(" qris/susu.png ")));
        let (_, item) = catalog.find_item("aneka-kopi", "susu-panas").unwrap();
        assert_eq!(item.barcode_image.as_deref(), Some("qris/susu.png"));

        assert!(catalog.set_barcode_image("susu-panas", Some("")));
        let (_, item) = catalog.find_item("aneka-kopi", "susu-panas").unwrap();
        assert_eq!(item.barcode_image, None);
        assert!(!catalog.set_barcode_image("nope", Some("x.png")));
    }

    #[test]
    fn dispense_duration_is_clamped() {
        let mut catalog = default_catalog();
        assert_eq!(catalog.set_dispense_secs("gula-aren", 0), Some(1));
        assert_eq!(catalog.set_dispense_secs("gula-aren", 500), Some(120));
        assert_eq!(catalog.set_dispense_secs("gula-aren", 45), Some(45));
        assert_eq!(catalog.set_dispense_secs("nope", 45), None);

        let raw = Item {
            dispense_secs: 0,
            ..Item::new("x", "X", 0)
        };
        assert_eq!(raw.dispense_secs(), 1);
    }

    #[test]
    fn disabling_hides_from_available_lists() {
        let mut catalog = default_catalog();
        assert!(catalog.set_category_enabled("rokok-ketengah", false));
        assert!(catalog.set_item_enabled("es-kopi", false));
        assert!(!catalog.set_item_enabled("missing", false));

        assert_eq!(catalog.available_categories().count(), 3);
        let cold = catalog.category("minuman-dingin").unwrap();
        assert_eq!(cold.available_items().count(), 3);
    }

    #[test]
    fn catalog_toml_defaults_fill_missing_fields() {
        let toml_src = r#"
            [[categories]]
            id = "drinks"
            name = "Drinks"

            [[categories.items]]
            id = "water"
            name = "Water"
            relay = 7
        "#;
        let catalog: Catalog = toml::from_str(toml_src).unwrap();
        let (category, item) = catalog.find_item("drinks", "water").unwrap();
        assert!(category.enabled);
        assert!(item.enabled);
        assert_eq!(item.dispense_secs, DEFAULT_DISPENSE_SECS);
        assert_eq!(item.display_name, None);
    }
}
