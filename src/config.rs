use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub max_request_bytes: usize,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub gemini_image_model: String,
    pub gemini_angle_model: String,
    pub gemini_temperature: f32,
    pub gemini_safety_settings: String,
    pub gemini_timeout_secs: u64,
    pub html_char_limit: usize,
    pub max_tryon_items: usize,
    pub enable_angle_views: bool,
    pub angle_max_retries: usize,
    pub angle_retry_base_delay_ms: u64,
    pub angle_spacing_ms: u64,
    pub wardrobe_store_url: String,
    pub wardrobe_document_name: String,
    pub store_timeout_secs: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "permissive".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to permissive.",
                value
            );
            "permissive".to_string()
        }
    }
}

fn normalize_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let bind_addr = env_string("BIND_ADDR", "0.0.0.0:8000");
        let bind_addr = bind_addr
            .trim()
            .parse::<SocketAddr>()
            .with_context(|| format!("BIND_ADDR is not a valid socket address: {bind_addr}"))?;

        let wardrobe_document_name = env_string("WARDROBE_DOCUMENT_NAME", "user_info.json");
        let wardrobe_document_name = match wardrobe_document_name.trim() {
            "" => "user_info.json".to_string(),
            name => name.to_string(),
        };

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            bind_addr,
            max_request_bytes: env_usize("MAX_REQUEST_BYTES", 25 * 1024 * 1024),
            gemini_api_key: env_string("GEMINI_API_KEY", "").trim().to_string(),
            gemini_api_base: normalize_base_url(env_string(
                "GEMINI_API_BASE",
                "https://generativelanguage.googleapis.com/v1beta",
            )),
            gemini_model: env_string("GEMINI_MODEL", "gemini-3-flash-preview"),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-3-pro-image-preview"),
            gemini_angle_model: env_string("GEMINI_ANGLE_MODEL", "gemini-2.5-flash-image"),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.5),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "permissive",
            )),
            gemini_timeout_secs: env_u64("GEMINI_TIMEOUT_SECS", 120),
            html_char_limit: env_usize("HTML_CHAR_LIMIT", 30_000),
            max_tryon_items: env_usize("MAX_TRYON_ITEMS", 3),
            enable_angle_views: env_bool("ENABLE_ANGLE_VIEWS", true),
            angle_max_retries: env_usize("ANGLE_MAX_RETRIES", 2),
            angle_retry_base_delay_ms: env_u64("ANGLE_RETRY_BASE_DELAY_MS", 2000),
            angle_spacing_ms: env_u64("ANGLE_SPACING_MS", 1000),
            wardrobe_store_url: normalize_base_url(env_string("WARDROBE_STORE_URL", "")),
            wardrobe_document_name,
            store_timeout_secs: env_u64("STORE_TIMEOUT_SECS", 10),
        })
    }

    pub fn has_gemini_api_key(&self) -> bool {
        !self.gemini_api_key.is_empty()
    }
}

pub const PRODUCT_EXTRACTION_PROMPT: &str = r#"You are an expert fashion product analyst with deep knowledge of clothing, brands, and retail. Your task is to extract precise product information from an e-commerce product page.

## CONTEXT
You are provided with:
1. A screenshot of the product page (analyze visuals: product image, color, style cues)
2. HTML content containing structured product data
3. Page metadata

Page URL: {page_url}
Page Title: {page_title}

## HTML CONTENT (for structured data extraction)
{html_content}

## EXTRACTION INSTRUCTIONS

Analyze BOTH the visual screenshot AND the HTML to extract accurate product details. Cross-reference visual information with text data for accuracy.

**name**: The exact product name as displayed.
**type**: The specific garment type (e.g. "t-shirt", "jeans", "denim jacket", "sneakers", "scarf").
**color**: The primary color(s), as specific as possible ("navy blue", "camel", "black and white striped").
**style**: One aesthetic: casual, smart casual, formal, streetwear, athleisure, bohemian, minimalist, vintage.
**category**: MUST be exactly one of: "top", "bottom", "outerwear", "shoes", "accessory".
**brand**: Brand name from logo, URL or HTML, properly capitalized.
**price**: Full price with currency symbol.
**material**: Fabric composition if available.
**description**: ONE concise sentence capturing the key selling points.

## OUTPUT
Return valid JSON matching the schema exactly. Ensure all string values are properly escaped."#;

pub const STYLING_RANKING_PROMPT: &str = r#"You are a world-renowned personal stylist with encyclopedic knowledge of fashion theory, color science, silhouette and proportion.

## YOUR MISSION
A client is considering purchasing a new item. Analyze whether it will integrate with their existing wardrobe, and which specific pieces create the strongest combinations.

## THE NEW PIECE UNDER CONSIDERATION
- **Item**: {product_name}
- **Garment Type**: {product_type}
- **Color**: {product_color}
- **Style Aesthetic**: {product_style}
- **Category**: {product_category}

## CLIENT PROFILE
{user_context}

## CLIENT'S CURRENT WARDROBE
{wardrobe_list}

**Available Item IDs**: {valid_ids}

## EXPERT STYLING FRAMEWORK
1. Color harmony: 60-30-10 balance, undertone temperature, monochromatic / analogous / complementary pairings, avoid competing brights.
2. Silhouette: balance volume against fitted pieces, respect waistline and layering hierarchy.
3. Texture: contrast matte with shiny and rough with smooth, keep fabric weights consistent, vary pattern scale.
4. Style coherence: items may move one or two steps on the athleisure to formal spectrum, not more.
5. Wardrobe value: favour pieces that fill gaps and pair with many existing items.

## SCORING
Overall fit score 0-100: 95+ wardrobe essential, 85-94 excellent, 75-84 good, 65-74 decent, 50-64 marginal, 35-49 poor, below 35 does not belong.
Individual pairing score 0-100: 90+ perfect harmony, 80-89 strong, 70-79 good, 60-69 acceptable, below 60 weak.

## STRICT CONSTRAINTS
1. ONLY select from these IDs: {valid_ids}. Never invent items.
2. ONE item per category maximum.
3. Select only items that would be VISIBLE in the final outfit.
4. If the new piece is outerwear, tops are hidden underneath; do not select them.
5. If the new piece is a top, do not select another top.
6. Select accessories only where they genuinely fit the outfit and season.

## REQUIRED OUTPUT
Return JSON with:
1. overall_fit_score: integer 0-100
2. best_matches: array, best first, ONE match per visible category, each with item_id (exactly from {valid_ids}), fit_score (0-100) and reason (10 words max, cite a styling principle)
3. styling_tip: one specific expert tip, max 15 words

Return valid JSON only."#;

pub const TRYON_PROMPT: &str = r#"You are a world-class fashion photographer and virtual try-on specialist. Create a photorealistic virtual try-on image for a high-end retail e-commerce store.

## CRITICAL: USE THE PERSON FROM IMAGE 1
IMAGE 1 is the ACTUAL USER. Use their exact face, facial features, skin tone and hair, and match their body proportions. The result must look like the same person, not a generic model.

## USER'S MEASUREMENTS
- Height: {height} cm | Top: {size_top} | Bottom: {size_bottom}
{extra_measurements}

## IMAGE REFERENCES
**IMAGE 1 - THE USER (MANDATORY)**

**IMAGE 2 - NEW PRODUCT: {product_name}**
- {product_color} {product_type}: this is the hero piece being tried on
- Extract ONLY the garment, ignore any model in this image
- This item MUST appear in the final image

{wardrobe_section}

## MANDATORY: INCLUDE ALL PROVIDED ITEMS
Every wardrobe item shown in the reference images was selected as part of the recommended outfit and MUST be worn, including accessories. Make all items look cohesive together.

## PHOTOGRAPHY REQUIREMENTS
- Composition: full body, head to feet, centered, light gray (#F5F5F5) studio backdrop
- Pose: natural confident standing pose
- Lighting: soft diffused studio lighting, no harsh shadows
- Quality: sharp focus, visible fabric textures, accurate colors
- Orientation: vertical full body shot, no cropping, no extra blank space on the sides

Generate the image now."#;

pub const ANGLE_PROMPT: &str = r#"You are given IMAGE 1 which shows a fashion model wearing an outfit (front view).

Your task: Generate the EXACT SAME image but from a {angle_description}.

## CRITICAL REQUIREMENTS - PRESERVE EVERYTHING
- SAME PERSON: identical face, hair, skin tone, body proportions
- SAME OUTFIT: every clothing item identical in color, pattern, fit and draping
- SAME POSE ENERGY: similar confident stance, rotated to show the {angle} view
- SAME LIGHTING and SAME BACKGROUND: light gray (#F5F5F5) studio backdrop
- SAME QUALITY: professional e-commerce photography grade

## ANGLE SPECIFICATION: {angle_upper} VIEW
- Rotate the camera to a {angle_description}
- Maintain the same distance and framing

## DO NOT
- Change any clothing items or colors
- Alter the person's appearance
- Add or remove any elements

Generate the {angle} view image now."#;
