//! Scripted doubles for the model and store seams.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;

use super::types::{UserProfile, UserRecord, UsualSizes, ViewAngle, WardrobeItem};
use crate::config::Config;
use crate::llm::gemini::{ImageGenerationError, TextGenerationError};
use crate::llm::media::{sample_png, InlineImage};
use crate::llm::model::{GenerativeModel, ImageTask, JsonTask};
use crate::store::WardrobeStore;

pub const PRODUCT_TOP_JSON: &str = r#"{
    "name": "Oversized Linen Shirt",
    "type": "linen shirt",
    "color": "white",
    "style": "smart casual",
    "category": "top",
    "brand": "Arket",
    "price": "€59",
    "material": "100% linen",
    "description": "Relaxed linen shirt with a boxy fit."
}"#;

pub fn png_base64() -> String {
    general_purpose::STANDARD.encode(sample_png())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageScript {
    Succeed,
    Fail,
    FailAngle(ViewAngle),
}

pub struct ScriptedModel {
    credentials: bool,
    text_failure: bool,
    blocked_text: Option<JsonTask>,
    extraction: String,
    ranking: String,
    images: ImageScript,
    calls: Mutex<Vec<String>>,
    tryon_references: Mutex<Option<usize>>,
}

impl ScriptedModel {
    pub fn new(extraction: &str, ranking: &str) -> Self {
        ScriptedModel {
            credentials: true,
            text_failure: false,
            blocked_text: None,
            extraction: extraction.to_string(),
            ranking: ranking.to_string(),
            images: ImageScript::Succeed,
            calls: Mutex::new(Vec::new()),
            tryon_references: Mutex::new(None),
        }
    }

    pub fn with_images(mut self, images: ImageScript) -> Self {
        self.images = images;
        self
    }

    pub fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    pub fn with_text_failure(mut self) -> Self {
        self.text_failure = true;
        self
    }

    /// Answers `task` as if the reply had been safety-filtered.
    pub fn with_blocked_text(mut self, task: JsonTask) -> Self {
        self.blocked_text = Some(task);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of reference images sent with the last front render.
    pub fn tryon_reference_count(&self) -> Option<usize> {
        *self.tryon_references.lock().unwrap()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn has_credentials(&self) -> bool {
        self.credentials
    }

    async fn generate_json(
        &self,
        task: JsonTask,
        _prompt: &str,
        _images: &[InlineImage],
        _schema: &Value,
    ) -> Result<String, TextGenerationError> {
        self.calls.lock().unwrap().push(task.operation().to_string());
        if self.text_failure {
            return Err(TextGenerationError::Request(anyhow!("connection reset")));
        }
        if self.blocked_text == Some(task) {
            return Err(TextGenerationError::Blocked("SAFETY".into()));
        }
        Ok(match task {
            JsonTask::ProductExtraction => self.extraction.clone(),
            JsonTask::StylingRanking => self.ranking.clone(),
        })
    }

    async fn generate_image(
        &self,
        task: ImageTask,
        _prompt: &str,
        images: &[InlineImage],
    ) -> Result<Vec<u8>, ImageGenerationError> {
        self.calls.lock().unwrap().push(task.operation());
        if task == ImageTask::TryOn {
            *self.tryon_references.lock().unwrap() = Some(images.len());
        }
        match (self.images, task) {
            (ImageScript::Fail, _) => Err(ImageGenerationError::Blocked("IMAGE_SAFETY".into())),
            (ImageScript::FailAngle(failing), ImageTask::Angle(angle)) if failing == angle => {
                Err(ImageGenerationError::NoImage("scripted".into()))
            }
            _ => Ok(sample_png()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    users: HashMap<String, UserRecord>,
    images: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Registers `record` and a decodable image for every reference it names,
    /// except `shoes.png` which is left missing.
    pub fn with_user(username: &str, record: UserRecord) -> Self {
        let mut store = MemoryStore::default();
        let references = record
            .profile
            .profile_image_url
            .iter()
            .chain(record.wardrobe.iter().filter_map(|item| item.image_url.as_ref()));
        for reference in references {
            if reference != "shoes.png" {
                store.images.insert(reference.clone(), sample_png());
            }
        }
        store.users.insert(username.to_string(), record);
        store
    }
}

#[async_trait]
impl WardrobeStore for MemoryStore {
    async fn fetch_user(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.get(username).cloned())
    }

    async fn fetch_image(&self, _username: &str, reference: &str) -> Option<Vec<u8>> {
        self.images.get(reference).cloned()
    }
}

fn item(id: &str, name: &str, garment_type: &str, color: &str, image: Option<&str>) -> WardrobeItem {
    WardrobeItem {
        id: id.to_string(),
        name: name.to_string(),
        garment_type: garment_type.to_string(),
        color: color.to_string(),
        color_hex: None,
        style: "casual".to_string(),
        description: String::new(),
        image_url: image.map(str::to_string),
    }
}

pub fn sample_record() -> UserRecord {
    UserRecord {
        profile: UserProfile {
            username: "alex".to_string(),
            name: Some("Alex".to_string()),
            height_cm: Some(178),
            usual_sizes: UsualSizes {
                tshirts: Some("M".to_string()),
                pants: Some("32".to_string()),
                shoes: Some("10 US".to_string()),
            },
            style_preferences: vec!["smart casual".to_string()],
            profile_image_url: Some("photo.png".to_string()),
            ..UserProfile::default()
        },
        wardrobe: vec![
            item("top_01", "White Hoodie", "hoodie", "white", Some("hoodie.png")),
            item("bottom_01", "Blue Jeans", "jeans", "blue", Some("jeans.png")),
            item("bottom_02", "Gray Jeans", "jeans", "gray", None),
            item("shoes_01", "White Sneakers", "sneakers", "white", Some("shoes.png")),
        ],
    }
}

pub fn config() -> Config {
    Config {
        log_level: "info".into(),
        log_dir: "logs".into(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_request_bytes: 1024 * 1024,
        gemini_api_key: String::new(),
        gemini_api_base: "http://127.0.0.1:9".into(),
        gemini_model: "text-model".into(),
        gemini_image_model: "image-model".into(),
        gemini_angle_model: "angle-model".into(),
        gemini_temperature: 0.5,
        gemini_safety_settings: "permissive".into(),
        gemini_timeout_secs: 5,
        html_char_limit: 100,
        max_tryon_items: 3,
        enable_angle_views: true,
        angle_max_retries: 2,
        angle_retry_base_delay_ms: 0,
        angle_spacing_ms: 0,
        wardrobe_store_url: "http://127.0.0.1:9".into(),
        wardrobe_document_name: "user_info.json".into(),
        store_timeout_secs: 1,
    }
}
