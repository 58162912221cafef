use std::collections::{BTreeSet, HashMap, HashSet};

use super::category::{classify, Category};
use super::types::{UserProfile, WardrobeItem};

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredItem {
    pub item: WardrobeItem,
    pub category: Category,
}

pub fn filter_wardrobe(items: &[WardrobeItem], visible: &BTreeSet<Category>) -> Vec<FilteredItem> {
    items
        .iter()
        .filter_map(|item| {
            let category = classify(&item.garment_type);
            visible.contains(&category).then(|| FilteredItem {
                item: item.clone(),
                category,
            })
        })
        .collect()
}

pub fn valid_ids(items: &[FilteredItem]) -> HashSet<String> {
    items.iter().map(|entry| entry.item.id.clone()).collect()
}

pub fn id_to_category(items: &[FilteredItem]) -> HashMap<String, Category> {
    items
        .iter()
        .map(|entry| (entry.item.id.clone(), entry.category))
        .collect()
}

/// One line per item, IDs quoted so the model can copy them verbatim.
pub fn format_wardrobe_list(items: &[FilteredItem]) -> String {
    items
        .iter()
        .map(|entry| {
            format!(
                "- ID=\"{}\" | {} | Type: {} | Color: {} | Category: {}",
                entry.item.id,
                entry.item.name,
                entry.item.garment_type,
                entry.item.color,
                entry.category
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_id_list(items: &[FilteredItem]) -> String {
    let quoted = items
        .iter()
        .map(|entry| format!("\"{}\"", entry.item.id))
        .collect::<Vec<_>>();
    format!("[{}]", quoted.join(", "))
}

fn wardrobe_summary(wardrobe: &[WardrobeItem]) -> String {
    if wardrobe.is_empty() {
        return "No wardrobe items found.".to_string();
    }

    let mut lines = vec!["User's current wardrobe:".to_string()];
    for item in wardrobe {
        let mut line = format!("- {} ({}): {}", item.name, item.garment_type, item.color);
        if !item.style.trim().is_empty() {
            line.push_str(&format!(", {} style", item.style.trim()));
        }
        line.push('.');
        if !item.description.trim().is_empty() {
            line.push(' ');
            line.push_str(item.description.trim());
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Profile and wardrobe rendered as the client section of the ranking prompt.
pub fn user_context(profile: &UserProfile, wardrobe: &[WardrobeItem]) -> String {
    let display_name = profile
        .name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(profile.username.as_str());

    let mut lines = vec!["User Profile:".to_string(), format!("- Name: {display_name}")];
    if let Some(height) = profile.height_cm {
        lines.push(format!("- Height: {height}cm"));
    }
    if let Some(gender) = profile.gender.as_deref().filter(|v| !v.trim().is_empty()) {
        lines.push(format!("- Gender: {gender}"));
    }
    if let Some(size) = profile.usual_sizes.tshirts.as_deref() {
        lines.push(format!("- Typical top size: {size}"));
    }
    if let Some(size) = profile.usual_sizes.pants.as_deref() {
        lines.push(format!("- Typical bottom size: {size}"));
    }
    if let Some(size) = profile.usual_sizes.shoes.as_deref() {
        lines.push(format!("- Shoe size: {size}"));
    }
    if !profile.style_preferences.is_empty() {
        lines.push(format!(
            "- Style preferences: {}",
            profile.style_preferences.join(", ")
        ));
    }

    format!("{}\n\n{}", lines.join("\n"), wardrobe_summary(wardrobe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::styling::category::visible_categories;

    fn item(id: &str, garment_type: &str) -> WardrobeItem {
        WardrobeItem {
            id: id.to_string(),
            name: format!("Item {id}"),
            garment_type: garment_type.to_string(),
            color: "black".to_string(),
            color_hex: None,
            style: "casual".to_string(),
            description: String::new(),
            image_url: None,
        }
    }

    fn sample_wardrobe() -> Vec<WardrobeItem> {
        vec![
            item("top_01", "hoodie"),
            item("bottom_01", "jeans"),
            item("shoes_01", "sneakers"),
            item("outer_01", "bomber jacket"),
            item("acc_01", "cap"),
            item("misc_01", "dress"),
            item("top_02", "sweater"),
        ]
    }

    #[test]
    fn keeps_exactly_the_visible_categories() {
        let wardrobe = sample_wardrobe();
        for product in [
            Category::Top,
            Category::Bottom,
            Category::Outerwear,
            Category::Shoes,
            Category::Accessory,
            Category::Other,
        ] {
            let visible = visible_categories(product);
            let filtered = filter_wardrobe(&wardrobe, &visible);
            assert!(filtered.iter().all(|entry| visible.contains(&entry.category)));
            let expected = wardrobe
                .iter()
                .filter(|item| visible.contains(&classify(&item.garment_type)))
                .count();
            assert_eq!(filtered.len(), expected, "{product}");
        }
    }

    #[test]
    fn preserves_order_and_annotates_category() {
        let filtered = filter_wardrobe(&sample_wardrobe(), &visible_categories(Category::Outerwear));
        let ids: Vec<_> = filtered.iter().map(|entry| entry.item.id.as_str()).collect();
        assert_eq!(ids, vec!["bottom_01", "shoes_01", "acc_01"]);
        assert_eq!(filtered[0].category, Category::Bottom);
        assert_eq!(filtered[2].category, Category::Accessory);
    }

    #[test]
    fn empty_when_nothing_is_visible() {
        let wardrobe = vec![item("top_01", "hoodie"), item("top_02", "t-shirt")];
        assert!(filter_wardrobe(&wardrobe, &visible_categories(Category::Outerwear)).is_empty());
    }

    #[test]
    fn prompt_lists_quote_every_id() {
        let filtered = filter_wardrobe(&sample_wardrobe(), &visible_categories(Category::Shoes));
        assert_eq!(
            format_id_list(&filtered),
            "[\"top_01\", \"bottom_01\", \"outer_01\", \"acc_01\", \"top_02\"]"
        );
        let listing = format_wardrobe_list(&filtered);
        assert!(listing.starts_with("- ID=\"top_01\" | Item top_01 | Type: hoodie"));
        assert!(listing.contains("Category: outerwear"));
    }

    #[test]
    fn user_context_lists_profile_and_wardrobe() {
        let profile = UserProfile {
            username: "alex".to_string(),
            height_cm: Some(178),
            style_preferences: vec!["minimalist".to_string(), "smart casual".to_string()],
            ..Default::default()
        };
        let context = user_context(&profile, &[item("top_01", "hoodie")]);
        assert!(context.contains("- Name: alex"));
        assert!(context.contains("- Height: 178cm"));
        assert!(context.contains("- Style preferences: minimalist, smart casual"));
        assert!(context.contains("- Item top_01 (hoodie): black, casual style."));
    }
}
