//! Sanitizes structured output from the model before it reaches a user.
//!
//! Everything the model returns is treated as untrusted input: entries that
//! reference unknown wardrobe IDs, carry out-of-range scores or repeat an
//! already claimed category are dropped instead of failing the request.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::category::{classify, Category};
use super::types::{CandidateMatch, Product, StylingResult, GENERIC_STYLING_TIP};
use crate::error::{StylistError, StylistResult};

/// Parses a JSON object out of model text, tolerating code fences or prose around it.
pub fn parse_json_object_from_text(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn score_from_value(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(number) => number
            .as_i64()
            .map(|v| v as f64)
            .or_else(|| number.as_f64())?,
        _ => return None,
    };
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return None;
    }
    Some(score.round() as u8)
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn candidate_from_value(value: &Value) -> Option<CandidateMatch> {
    let object = value.as_object()?;
    let item_id = non_empty_string(object.get("item_id"))?;
    let fit_score = object.get("fit_score").and_then(score_from_value)?;
    let reason = non_empty_string(object.get("reason")).unwrap_or_default();
    Some(CandidateMatch {
        item_id,
        fit_score,
        reason,
    })
}

/// Keeps the first grounded match per category, in the order the model ranked them.
pub fn validate(
    raw_matches: &[Value],
    valid_ids: &HashSet<String>,
    id_to_category: &HashMap<String, Category>,
) -> Vec<CandidateMatch> {
    let mut claimed = HashSet::new();
    let mut validated = Vec::new();

    for (index, raw) in raw_matches.iter().enumerate() {
        let Some(candidate) = candidate_from_value(raw) else {
            warn!(index, "Dropping malformed styling match entry");
            continue;
        };
        if !valid_ids.contains(&candidate.item_id) {
            warn!(item_id = %candidate.item_id, "Dropping match for unknown wardrobe item");
            continue;
        }
        let Some(category) = id_to_category.get(&candidate.item_id).copied() else {
            warn!(item_id = %candidate.item_id, "Dropping match without a resolved category");
            continue;
        };
        if !claimed.insert(category) {
            debug!(
                item_id = %candidate.item_id,
                category = %category,
                "Dropping match for already claimed category"
            );
            continue;
        }
        validated.push(candidate);
    }

    validated
}

/// Parses the ranking response and runs the match validator over it.
pub fn parse_styling_result(
    raw: &str,
    valid_ids: &HashSet<String>,
    id_to_category: &HashMap<String, Category>,
) -> StylistResult<StylingResult> {
    let object = parse_json_object_from_text(raw)
        .ok_or_else(|| StylistError::MalformedOutput("ranking response is not a JSON object".into()))?;

    let overall_fit_score = match object.get("overall_fit_score") {
        Some(Value::Number(number)) => number
            .as_f64()
            .filter(|score| score.is_finite())
            .map(|score| score.clamp(0.0, 100.0).round() as u8)
            .ok_or_else(|| StylistError::MalformedOutput("overall_fit_score is not finite".into()))?,
        _ => {
            return Err(StylistError::MalformedOutput(
                "overall_fit_score is missing or not a number".into(),
            ))
        }
    };

    let raw_matches = match object.get("best_matches") {
        Some(Value::Array(entries)) => entries.as_slice(),
        _ => {
            return Err(StylistError::MalformedOutput(
                "best_matches is missing or not an array".into(),
            ))
        }
    };

    let best_matches = validate(raw_matches, valid_ids, id_to_category);
    if best_matches.len() < raw_matches.len() {
        warn!(
            proposed = raw_matches.len(),
            kept = best_matches.len(),
            "Styling matches were filtered by validation"
        );
    }

    let styling_tip = non_empty_string(object.get("styling_tip"))
        .unwrap_or_else(|| GENERIC_STYLING_TIP.to_string());

    Ok(StylingResult {
        overall_fit_score,
        best_matches,
        styling_tip,
    })
}

fn optional_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    non_empty_string(object.get(key))
}

/// Parses the extraction response; the category is re-derived from the garment type
/// when the model leaves it out, invents one, or answers `other`.
pub fn parse_product(raw: &str) -> StylistResult<Product> {
    let object = parse_json_object_from_text(raw)
        .ok_or_else(|| StylistError::MalformedOutput("extraction response is not a JSON object".into()))?;

    let required = |key: &str| {
        optional_text(&object, key)
            .ok_or_else(|| StylistError::MalformedOutput(format!("product field '{key}' is missing")))
    };

    let name = required("name")?;
    let garment_type = required("type")?;
    let color = required("color")?;
    let style = required("style")?;
    let description = required("description")?;

    let category = optional_text(&object, "category")
        .and_then(|label| Category::parse(&label))
        .filter(|category| *category != Category::Other)
        .unwrap_or_else(|| classify(&garment_type));

    Ok(Product {
        name,
        garment_type,
        color,
        style,
        category,
        brand: optional_text(&object, "brand"),
        price: optional_text(&object, "price"),
        material: optional_text(&object, "material"),
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inventory() -> (HashSet<String>, HashMap<String, Category>) {
        let entries = [
            ("top_01", Category::Top),
            ("top_02", Category::Top),
            ("bottom_01", Category::Bottom),
            ("shoes_01", Category::Shoes),
            ("acc_01", Category::Accessory),
        ];
        let ids = entries.iter().map(|(id, _)| id.to_string()).collect();
        let categories = entries
            .iter()
            .map(|(id, category)| (id.to_string(), *category))
            .collect();
        (ids, categories)
    }

    fn ids(matches: &[CandidateMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.item_id.as_str()).collect()
    }

    #[test]
    fn keeps_only_the_first_match_per_category() {
        let (valid, categories) = inventory();
        let raw = vec![
            json!({ "item_id": "top_02", "fit_score": 70, "reason": "first top" }),
            json!({ "item_id": "bottom_01", "fit_score": 80, "reason": "jeans" }),
            json!({ "item_id": "top_01", "fit_score": 95, "reason": "second top" }),
        ];
        let validated = validate(&raw, &valid, &categories);
        assert_eq!(ids(&validated), vec!["top_02", "bottom_01"]);
        assert_eq!(validated[0].reason, "first top");
    }

    #[test]
    fn drops_hallucinated_ids_silently() {
        let (valid, categories) = inventory();
        let raw = vec![
            json!({ "item_id": "ghost_99", "fit_score": 99, "reason": "not real" }),
            json!({ "item_id": "shoes_01", "fit_score": 88, "reason": "clean sneakers" }),
        ];
        assert_eq!(ids(&validate(&raw, &valid, &categories)), vec!["shoes_01"]);
    }

    #[test]
    fn hallucinated_entry_does_not_claim_a_category() {
        let (valid, mut categories) = inventory();
        categories.insert("ghost_99".to_string(), Category::Top);
        let raw = vec![
            json!({ "item_id": "ghost_99", "fit_score": 99, "reason": "" }),
            json!({ "item_id": "top_01", "fit_score": 60, "reason": "" }),
        ];
        assert_eq!(ids(&validate(&raw, &valid, &categories)), vec!["top_01"]);
    }

    #[test]
    fn drops_malformed_entries() {
        let (valid, categories) = inventory();
        let raw = vec![
            json!("top_01"),
            json!({ "fit_score": 80, "reason": "no id" }),
            json!({ "item_id": "", "fit_score": 80 }),
            json!({ "item_id": 7, "fit_score": 80 }),
            json!({ "item_id": "top_01", "fit_score": 140, "reason": "too high" }),
            json!({ "item_id": "top_01", "fit_score": -1 }),
            json!({ "item_id": "top_01", "fit_score": "90" }),
            json!({ "item_id": "bottom_01" }),
            json!({ "item_id": "top_01", "fit_score": 72.4 }),
        ];
        let validated = validate(&raw, &valid, &categories);
        assert_eq!(ids(&validated), vec!["top_01"]);
        assert_eq!(validated[0].fit_score, 72);
        assert_eq!(validated[0].reason, "");
    }

    #[test]
    fn output_is_grounded_unique_and_ordered() {
        let (valid, categories) = inventory();
        let raw = vec![
            json!({ "item_id": "acc_01", "fit_score": 50, "reason": "" }),
            json!({ "item_id": "ghost_1", "fit_score": 50, "reason": "" }),
            json!({ "item_id": "top_01", "fit_score": 50, "reason": "" }),
            json!({ "item_id": "acc_01", "fit_score": 90, "reason": "" }),
            json!({ "item_id": "bottom_01", "fit_score": 50, "reason": "" }),
            json!({ "item_id": "top_02", "fit_score": 50, "reason": "" }),
        ];
        let validated = validate(&raw, &valid, &categories);
        assert!(validated.iter().all(|m| valid.contains(&m.item_id)));
        let claimed: HashSet<_> = validated.iter().map(|m| categories[&m.item_id]).collect();
        assert_eq!(claimed.len(), validated.len());
        assert_eq!(ids(&validated), vec!["acc_01", "top_01", "bottom_01"]);
    }

    #[test]
    fn parses_fenced_ranking_output() {
        let (valid, categories) = inventory();
        let raw = "```json\n{\"overall_fit_score\": 104, \"best_matches\": [{\"item_id\": \"bottom_01\", \"fit_score\": 91, \"reason\": \"Navy and camel\"}], \"styling_tip\": \"Cuff the jeans.\"}\n```";
        let result = parse_styling_result(raw, &valid, &categories).unwrap();
        assert_eq!(result.overall_fit_score, 100);
        assert_eq!(ids(&result.best_matches), vec!["bottom_01"]);
        assert_eq!(result.styling_tip, "Cuff the jeans.");
    }

    #[test]
    fn ranking_output_without_required_fields_is_malformed() {
        let (valid, categories) = inventory();
        for raw in [
            "not json at all",
            "{\"best_matches\": []}",
            "{\"overall_fit_score\": \"high\", \"best_matches\": []}",
            "{\"overall_fit_score\": 80, \"best_matches\": {}}",
        ] {
            assert!(matches!(
                parse_styling_result(raw, &valid, &categories),
                Err(StylistError::MalformedOutput(_))
            ));
        }
    }

    #[test]
    fn missing_tip_uses_generic_tip() {
        let (valid, categories) = inventory();
        let result =
            parse_styling_result("{\"overall_fit_score\": 77, \"best_matches\": []}", &valid, &categories)
                .unwrap();
        assert_eq!(result.styling_tip, GENERIC_STYLING_TIP);
        assert_eq!(result.overall_fit_score, 77);
    }

    #[test]
    fn product_category_is_rederived_when_unusable() {
        let raw = json!({
            "name": "Classic Straight Leg Jeans",
            "type": "jeans",
            "color": "indigo",
            "style": "casual",
            "category": "other",
            "brand": "Levi's",
            "price": "",
            "description": "Everyday denim."
        })
        .to_string();
        let product = parse_product(&raw).unwrap();
        assert_eq!(product.category, Category::Bottom);
        assert_eq!(product.brand.as_deref(), Some("Levi's"));
        assert_eq!(product.price, None);

        let invented = raw.replace("\"other\"", "\"legwear\"");
        assert_eq!(parse_product(&invented).unwrap().category, Category::Bottom);
    }

    #[test]
    fn product_category_from_model_is_kept() {
        let raw = "{\"name\": \"Shacket\", \"type\": \"shirt jacket\", \"color\": \"olive\", \"style\": \"casual\", \"category\": \"outerwear\", \"description\": \"Layering piece.\"}";
        assert_eq!(parse_product(raw).unwrap().category, Category::Outerwear);
    }

    #[test]
    fn product_without_required_fields_is_malformed() {
        assert!(parse_product("{\"name\": \"Hat\"}").is_err());
        assert!(parse_product("[]").is_err());
    }
}
