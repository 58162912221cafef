use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Top,
    Bottom,
    Outerwear,
    Shoes,
    Accessory,
    Other,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Top => "top",
            Category::Bottom => "bottom",
            Category::Outerwear => "outerwear",
            Category::Shoes => "shoes",
            Category::Accessory => "accessory",
            Category::Other => "other",
        }
    }

    /// Strict parse of a category label as the model or the store writes it.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "top" => Some(Category::Top),
            "bottom" => Some(Category::Bottom),
            "outerwear" => Some(Category::Outerwear),
            "shoes" => Some(Category::Shoes),
            "accessory" => Some(Category::Accessory),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked top to bottom; the first table with a matching keyword wins.
const KEYWORD_TABLES: &[(Category, &[&str])] = &[
    (
        Category::Top,
        &[
            "shirt", "t-shirt", "tshirt", "blouse", "polo", "sweater", "hoodie", "top", "tank",
        ],
    ),
    (
        Category::Bottom,
        &["pants", "jeans", "trousers", "shorts", "skirt"],
    ),
    (
        Category::Outerwear,
        &[
            "jacket",
            "coat",
            "blazer",
            "cardigan",
            "vest",
            "parka",
            "windbreaker",
        ],
    ),
    (
        Category::Shoes,
        &["shoes", "sneakers", "boots", "loafers", "sandals", "heels"],
    ),
    (
        Category::Accessory,
        &[
            "hat",
            "cap",
            "scarf",
            "belt",
            "bag",
            "watch",
            "jewelry",
            "sunglasses",
        ],
    ),
];

pub fn classify(garment_type: &str) -> Category {
    let lowered = garment_type.to_lowercase();
    KEYWORD_TABLES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

/// Wardrobe categories that stay visible when a product of `product_category` is worn.
pub fn visible_categories(product_category: Category) -> BTreeSet<Category> {
    use Category::*;

    let visible: &[Category] = match product_category {
        Outerwear => &[Bottom, Shoes, Accessory],
        Top => &[Bottom, Shoes, Outerwear, Accessory],
        Bottom => &[Top, Shoes, Outerwear, Accessory],
        Shoes => &[Bottom, Top, Outerwear, Accessory],
        _ => &[Top, Bottom, Outerwear, Shoes, Accessory],
    };
    visible.iter().copied().collect()
}
