//! Model seam used by the styling pipeline.
//!
//! The pipeline only talks to [`GenerativeModel`]; the Gemini client is the
//! production implementation and tests script their own.

use async_trait::async_trait;
use serde_json::Value;

use super::gemini::{GeminiClient, ImageGenerationError, TextGenerationError};
use super::media::InlineImage;
use crate::styling::types::ViewAngle;

/// Structured-output calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonTask {
    ProductExtraction,
    StylingRanking,
}

impl JsonTask {
    pub const fn operation(self) -> &'static str {
        match self {
            JsonTask::ProductExtraction => "product_extraction",
            JsonTask::StylingRanking => "styling_ranking",
        }
    }

    /// Extraction is mostly reading, ranking needs more deliberation.
    pub const fn thinking_level(self) -> &'static str {
        match self {
            JsonTask::ProductExtraction => "low",
            JsonTask::StylingRanking => "medium",
        }
    }
}

/// Image-output calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTask {
    TryOn,
    Angle(ViewAngle),
}

impl ImageTask {
    pub fn operation(self) -> String {
        match self {
            ImageTask::TryOn => "tryon_front".to_string(),
            ImageTask::Angle(angle) => format!("tryon_{}", angle.as_str()),
        }
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Whether calls can be made at all.
    fn has_credentials(&self) -> bool;

    /// Returns the raw JSON text produced for `task`.
    async fn generate_json(
        &self,
        task: JsonTask,
        prompt: &str,
        images: &[InlineImage],
        schema: &Value,
    ) -> Result<String, TextGenerationError>;

    /// Returns encoded image bytes produced for `task`.
    async fn generate_image(
        &self,
        task: ImageTask,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<Vec<u8>, ImageGenerationError>;
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn has_credentials(&self) -> bool {
        self.has_api_key()
    }

    async fn generate_json(
        &self,
        task: JsonTask,
        prompt: &str,
        images: &[InlineImage],
        schema: &Value,
    ) -> Result<String, TextGenerationError> {
        GeminiClient::generate_json(
            self,
            &self.text_model,
            task.operation(),
            prompt,
            images,
            schema,
            Some(task.thinking_level()),
        )
        .await
    }

    async fn generate_image(
        &self,
        task: ImageTask,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<Vec<u8>, ImageGenerationError> {
        let model = match task {
            ImageTask::TryOn => &self.image_model,
            ImageTask::Angle(_) => &self.angle_model,
        };
        GeminiClient::generate_image(self, model, &task.operation(), prompt, images).await
    }
}
