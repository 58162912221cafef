use serde::{Deserialize, Serialize};

use super::category::Category;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(rename = "type")]
    pub garment_type: String,
    pub color: String,
    pub style: String,
    pub category: Category,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    pub description: String,
}

impl Product {
    /// Stand-in used when the extraction output cannot be trusted.
    pub fn fallback(page_title: &str) -> Self {
        let title = page_title.trim();
        Product {
            name: if title.is_empty() {
                "Unknown Product".to_string()
            } else {
                title.to_string()
            },
            garment_type: "clothing".to_string(),
            color: "unknown".to_string(),
            style: "casual".to_string(),
            category: Category::Other,
            brand: None,
            price: None,
            material: None,
            description: "Could not extract product details".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardrobeItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub garment_type: String,
    pub color: String,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub description: String,
    /// Absolute URL or a path relative to the user's folder in the store.
    #[serde(default, alias = "image_path", alias = "image")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsualSizes {
    #[serde(default)]
    pub tshirts: Option<String>,
    #[serde(default)]
    pub pants: Option<String>,
    #[serde(default)]
    pub shoes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub height_cm: Option<u32>,
    #[serde(default)]
    pub weight_kg: Option<f32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub body_type: Option<String>,
    #[serde(default)]
    pub usual_sizes: UsualSizes,
    #[serde(default)]
    pub style_preferences: Vec<String>,
    #[serde(default, alias = "photo_path", alias = "profile_image")]
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub profile: UserProfile,
    pub wardrobe: Vec<WardrobeItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateMatch {
    pub item_id: String,
    pub fit_score: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StylingResult {
    pub overall_fit_score: u8,
    pub best_matches: Vec<CandidateMatch>,
    pub styling_tip: String,
}

pub const EMPTY_WARDROBE_TIP: &str = "Add more items to your wardrobe for better recommendations.";
pub const GENERIC_STYLING_TIP: &str = "This piece could work with neutral basics.";
pub const NEUTRAL_FIT_SCORE: u8 = 50;

impl StylingResult {
    /// Returned without a model call when nothing in the wardrobe stays visible.
    pub fn nothing_to_match() -> Self {
        StylingResult {
            overall_fit_score: NEUTRAL_FIT_SCORE,
            best_matches: Vec::new(),
            styling_tip: EMPTY_WARDROBE_TIP.to_string(),
        }
    }

    /// Returned when the ranking output fails validation.
    pub fn neutral() -> Self {
        StylingResult {
            overall_fit_score: NEUTRAL_FIT_SCORE,
            best_matches: Vec::new(),
            styling_tip: GENERIC_STYLING_TIP.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewAngle {
    Front,
    Left,
    Right,
    Back,
}

impl ViewAngle {
    pub const SECONDARY: [ViewAngle; 3] = [ViewAngle::Left, ViewAngle::Right, ViewAngle::Back];

    pub const fn as_str(self) -> &'static str {
        match self {
            ViewAngle::Front => "front",
            ViewAngle::Left => "left",
            ViewAngle::Right => "right",
            ViewAngle::Back => "back",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            ViewAngle::Front => "FRONT view (facing the camera)",
            ViewAngle::Left => "LEFT SIDE view (90 degrees rotated, showing the left profile)",
            ViewAngle::Right => "RIGHT SIDE view (90 degrees rotated, showing the right profile)",
            ViewAngle::Back => "BACK view (180 degrees rotated, showing from behind)",
        }
    }
}

/// Base64 encoded renders keyed by camera angle; absent angles failed or were skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratedImages {
    pub front: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
    pub back: Option<String>,
}

impl GeneratedImages {
    pub fn set(&mut self, angle: ViewAngle, image: Option<String>) {
        match angle {
            ViewAngle::Front => self.front = image,
            ViewAngle::Left => self.left = image,
            ViewAngle::Right => self.right = image,
            ViewAngle::Back => self.back = image,
        }
    }

    pub fn generated_angles(&self) -> Vec<&'static str> {
        [
            (ViewAngle::Front, &self.front),
            (ViewAngle::Left, &self.left),
            (ViewAngle::Right, &self.right),
            (ViewAngle::Back, &self.back),
        ]
        .into_iter()
        .filter(|(_, image)| image.is_some())
        .map(|(angle, _)| angle.as_str())
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub garment_type: String,
    pub color: String,
    pub color_hex: Option<String>,
    pub fit_score: u8,
    pub match_reason: String,
    pub image_base64: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub product: Product,
    pub fit_score: u8,
    pub selected_items: Vec<SelectedItem>,
    pub commentary: String,
    pub generated_images: GeneratedImages,
}
