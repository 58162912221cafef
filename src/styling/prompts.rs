use serde_json::{json, Value};

use super::types::{Product, UserProfile, ViewAngle, WardrobeItem};
use super::wardrobe::{format_id_list, format_wardrobe_list, FilteredItem};
use crate::config::{ANGLE_PROMPT, PRODUCT_EXTRACTION_PROMPT, STYLING_RANKING_PROMPT, TRYON_PROMPT};

/// Substitutes `{key}` placeholders in a single pass, so values that happen to
/// contain placeholder syntax (scraped HTML, page titles) are never expanded.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match replacement {
            Some((value, close)) => {
                output.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}

pub fn truncate_chars(value: &str, limit: usize) -> &str {
    match value.char_indices().nth(limit) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}

pub fn product_extraction_prompt(
    page_url: &str,
    page_title: &str,
    html_content: &str,
    html_char_limit: usize,
) -> String {
    fill_template(
        PRODUCT_EXTRACTION_PROMPT,
        &[
            ("page_url", page_url),
            ("page_title", page_title),
            ("html_content", truncate_chars(html_content, html_char_limit)),
        ],
    )
}

pub fn product_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING" },
            "type": { "type": "STRING" },
            "color": { "type": "STRING" },
            "style": { "type": "STRING" },
            "category": {
                "type": "STRING",
                "enum": ["top", "bottom", "outerwear", "shoes", "accessory"]
            },
            "brand": { "type": "STRING", "nullable": true },
            "price": { "type": "STRING", "nullable": true },
            "material": { "type": "STRING", "nullable": true },
            "description": { "type": "STRING" }
        },
        "required": ["name", "type", "color", "style", "category", "description"]
    })
}

pub fn styling_ranking_prompt(product: &Product, user_context: &str, items: &[FilteredItem]) -> String {
    let wardrobe_list = format_wardrobe_list(items);
    let valid_ids = format_id_list(items);
    fill_template(
        STYLING_RANKING_PROMPT,
        &[
            ("product_name", &product.name),
            ("product_type", &product.garment_type),
            ("product_color", &product.color),
            ("product_style", &product.style),
            ("product_category", product.category.as_str()),
            ("user_context", user_context),
            ("wardrobe_list", &wardrobe_list),
            ("valid_ids", &valid_ids),
        ],
    )
}

pub fn styling_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "overall_fit_score": { "type": "INTEGER" },
            "best_matches": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "item_id": { "type": "STRING" },
                        "fit_score": { "type": "INTEGER" },
                        "reason": { "type": "STRING" }
                    },
                    "required": ["item_id", "fit_score", "reason"]
                }
            },
            "styling_tip": { "type": "STRING" }
        },
        "required": ["overall_fit_score", "best_matches", "styling_tip"]
    })
}

/// `wardrobe_items` are the pieces whose images follow the user photo and the
/// product image, so the first one is IMAGE 3.
pub fn tryon_prompt(product: &Product, profile: &UserProfile, wardrobe_items: &[&WardrobeItem]) -> String {
    let height = profile.height_cm.unwrap_or(175).to_string();
    let size_top = profile.usual_sizes.tshirts.as_deref().unwrap_or("M");
    let size_bottom = profile.usual_sizes.pants.as_deref().unwrap_or("32");

    let mut extras = Vec::new();
    if let Some(weight) = profile.weight_kg {
        extras.push(format!("Weight: {weight} kg"));
    }
    extras.push(format!(
        "Body type: {}",
        profile.body_type.as_deref().unwrap_or("average")
    ));
    if let Some(gender) = profile.gender.as_deref().filter(|v| !v.trim().is_empty()) {
        extras.push(format!("Gender: {gender}"));
    }
    let extra_measurements = format!("- {}", extras.join(" | "));

    let wardrobe_section = if wardrobe_items.is_empty() {
        "No additional wardrobe items provided.".to_string()
    } else {
        wardrobe_items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                format!(
                    "**IMAGE {} - {}**: {} {}",
                    index + 3,
                    item.name.to_uppercase(),
                    item.color,
                    item.garment_type
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    fill_template(
        TRYON_PROMPT,
        &[
            ("height", &height),
            ("size_top", size_top),
            ("size_bottom", size_bottom),
            ("extra_measurements", &extra_measurements),
            ("product_name", &product.name),
            ("product_color", &product.color),
            ("product_type", &product.garment_type),
            ("wardrobe_section", &wardrobe_section),
        ],
    )
}

pub fn angle_prompt(angle: ViewAngle) -> String {
    let angle_upper = angle.as_str().to_uppercase();
    fill_template(
        ANGLE_PROMPT,
        &[
            ("angle_description", angle.description()),
            ("angle", angle.as_str()),
            ("angle_upper", &angle_upper),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::styling::category::Category;

    #[test]
    fn fill_template_is_single_pass() {
        let filled = fill_template(
            "A={a} B={b} C={missing} {",
            &[("a", "{b}"), ("b", "two")],
        );
        assert_eq!(filled, "A={b} B=two C={missing} {");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 30), "short");
    }

    #[test]
    fn extraction_prompt_truncates_html() {
        let html = "x".repeat(50);
        let prompt = product_extraction_prompt("https://shop.test/p/1", "Linen Shirt", &html, 10);
        assert!(prompt.contains("Page Title: Linen Shirt"));
        assert!(prompt.contains(&"x".repeat(10)));
        assert!(!prompt.contains(&"x".repeat(11)));
    }

    #[test]
    fn tryon_prompt_numbers_wardrobe_images_from_three() {
        let product = Product::fallback("Oversized Linen Shirt");
        let jeans = WardrobeItem {
            id: "bottom_01".into(),
            name: "Blue Jeans".into(),
            garment_type: "jeans".into(),
            color: "blue".into(),
            color_hex: None,
            style: "casual".into(),
            description: String::new(),
            image_url: None,
        };
        let prompt = tryon_prompt(&product, &UserProfile::default(), &[&jeans]);
        assert!(prompt.contains("**IMAGE 3 - BLUE JEANS**: blue jeans"));
        assert!(prompt.contains("Height: 175 cm | Top: M | Bottom: 32"));
        assert!(prompt.contains("Body type: average"));
        assert_eq!(product.category, Category::Other);
    }

    #[test]
    fn angle_prompt_names_the_view() {
        let prompt = angle_prompt(ViewAngle::Back);
        assert!(prompt.contains("BACK VIEW"));
        assert!(prompt.contains("180 degrees"));
        assert!(prompt.contains("Generate the back view image now."));
    }
}
