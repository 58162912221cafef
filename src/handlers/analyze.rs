use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppError;
use crate::state::AppState;
use crate::styling::AnalysisRequest;
use crate::styling::types::{AnalysisOutcome, GeneratedImages, Product, SelectedItem};
use crate::utils::timing::{complete_request_timer, start_request_timer};

pub const ANALYZE_ENDPOINT: &str = "/analyze-and-style";

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub page_url: String,
    #[serde(default)]
    pub page_title: String,
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub screenshot_base64: String,
}

impl From<AnalyzeRequest> for AnalysisRequest {
    fn from(request: AnalyzeRequest) -> Self {
        AnalysisRequest {
            username: request.username,
            page_url: request.page_url,
            page_title: request.page_title,
            html_content: request.html_content,
            screenshot_base64: request.screenshot_base64,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub product: Product,
    pub fit_score: u8,
    pub selected_items: Vec<SelectedItem>,
    pub commentary: String,
    /// Same as `generated_images.front`, kept for older extension builds.
    pub generated_image_base64: Option<String>,
    pub generated_images: GeneratedImages,
}

impl From<AnalysisOutcome> for AnalyzeResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        AnalyzeResponse {
            product: outcome.product,
            fit_score: outcome.fit_score,
            selected_items: outcome.selected_items,
            commentary: outcome.commentary,
            generated_image_base64: outcome.generated_images.front.clone(),
            generated_images: outcome.generated_images,
        }
    }
}

pub async fn analyze_and_style(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(payload) = payload?;
    let request = AnalysisRequest::from(payload);

    let mut timer = start_request_timer(ANALYZE_ENDPOINT, &request.username, &request.page_url);
    info!(
        username = %request.username,
        page_url = %request.page_url,
        html_chars = request.html_content.len(),
        screenshot_chars = request.screenshot_base64.len(),
        "Analyze request received"
    );

    match state.stylist.analyze(&request).await {
        Ok(outcome) => {
            complete_request_timer(&mut timer, "success", None);
            Ok(Json(AnalyzeResponse::from(outcome)))
        }
        Err(err) => {
            let err = AppError::from(err);
            complete_request_timer(
                &mut timer,
                "error",
                Some(format!("status={}", err.status().as_u16())),
            );
            Err(err)
        }
    }
}
