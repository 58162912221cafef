use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::{truncate_for_log, InlineImage};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, thiserror::Error)]
pub enum TextGenerationError {
    #[error("Gemini response blocked: {0}")]
    Blocked(String),
    #[error("Gemini returned no text (model: {0})")]
    Empty(String),
    #[error("Gemini request failed: {0}")]
    Request(#[source] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ImageGenerationError {
    #[error("Image generation blocked by safety filters: {0}")]
    Blocked(String),
    #[error("No image returned by Gemini (model: {0})")]
    NoImage(String),
    #[error("Image generation request failed: {0}")]
    Request(#[source] anyhow::Error),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

const GEMINI_MAX_RETRY_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn gemini_retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using permissive defaults.",
                profile
            );
            "OFF"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn inline_image_part(image: &InlineImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": image.to_base64()
        }
    })
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(parts) = payload
        .pointer("/contents/0/parts")
        .and_then(|value| value.as_array())
    {
        summary.insert(
            "parts".to_string(),
            Value::Array(summarize_gemini_parts(parts)),
        );
    }

    if let Some(config) = payload.get("generationConfig") {
        let mut config = config.clone();
        // The schema is static and noisy.
        if let Some(object) = config.as_object_mut() {
            object.remove("responseSchema");
        }
        summary.insert("generationConfig".to_string(), config);
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    for part in response_parts(response) {
        match part {
            GeminiPart::Text { text, thought } => {
                text_parts += 1;
                if !thought && text_preview.is_none() && !text.trim().is_empty() {
                    text_preview = Some(truncate_for_log(text, 200));
                }
            }
            GeminiPart::InlineData { inline_data } => {
                if inline_data.mime_type.starts_with("image/") {
                    image_parts += 1;
                }
            }
            GeminiPart::Other(_) => {}
        }
    }

    json!({
        "candidates": response.candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview,
        "finishReasons": response
            .candidates
            .iter()
            .filter_map(|candidate| candidate.finish_reason.as_deref())
            .collect::<Vec<_>>(),
        "blockReason": response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref()),
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn response_parts(response: &GeminiResponse) -> impl Iterator<Item = &GeminiPart> {
    response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| content.parts.iter())
}

/// Reason the prompt or every candidate was withheld, if any.
fn block_reason(response: &GeminiResponse) -> Option<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.clone())
    {
        return Some(reason);
    }

    response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.finish_reason.as_deref())
        .find(|reason| BLOCKING_FINISH_REASONS.contains(reason))
        .map(|reason| reason.to_string())
}

fn extract_text_from_response(response: &GeminiResponse) -> String {
    response_parts(response)
        .filter_map(|part| match part {
            GeminiPart::Text { text, thought: false } if !text.trim().is_empty() => {
                Some(text.as_str())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Empty text is reported as blocked when the response carries a block reason.
fn text_result(response: &GeminiResponse, model: &str) -> Result<String, TextGenerationError> {
    let text = extract_text_from_response(response);
    if !text.trim().is_empty() {
        return Ok(text);
    }
    Err(match block_reason(response) {
        Some(reason) => TextGenerationError::Blocked(reason),
        None => TextGenerationError::Empty(model.to_string()),
    })
}

fn extract_image_from_response(
    response: &GeminiResponse,
    model: &str,
) -> Result<Vec<u8>, ImageGenerationError> {
    for part in response_parts(response) {
        if let GeminiPart::InlineData { inline_data } = part {
            if !inline_data.mime_type.starts_with("image/") {
                continue;
            }
            match general_purpose::STANDARD.decode(inline_data.data.trim()) {
                Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
                Ok(_) => warn!(model, "Gemini returned an empty image part"),
                Err(err) => warn!(model, "Gemini returned undecodable image data: {err}"),
            }
        }
    }

    match block_reason(response) {
        Some(reason) => Err(ImageGenerationError::Blocked(reason)),
        None => Err(ImageGenerationError::NoImage(model.to_string())),
    }
}

/// Thin REST client for `models/{model}:generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    api_base: String,
    timeout: Duration,
    safety_profile: String,
    temperature: f32,
    pub text_model: String,
    pub image_model: String,
    pub angle_model: String,
}

impl GeminiClient {
    pub fn from_config(config: &Config) -> Self {
        GeminiClient {
            api_key: config.gemini_api_key.clone(),
            api_base: config.gemini_api_base.clone(),
            timeout: Duration::from_secs(config.gemini_timeout_secs.max(1)),
            safety_profile: config.gemini_safety_settings.clone(),
            temperature: config.gemini_temperature,
            text_model: config.gemini_model.clone(),
            image_model: config.gemini_image_model.clone(),
            angle_model: config.gemini_angle_model.clone(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn redact_api_key(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    async fn call_gemini_api(&self, model: &str, payload: &Value) -> Result<GeminiResponse> {
        if !self.has_api_key() {
            return Err(anyhow!("GEMINI_API_KEY not configured"));
        }

        let client = get_http_client();
        let url = format!("{}/models/{}:generateContent", self.api_base, model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(payload);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = self.redact_api_key(&err.to_string());
                    let should_retry =
                        gemini_should_retry_error(&err) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                    warn!(
                        "Gemini request failed to send: {} (timeout={}, connect={}, status={:?}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        err.status(),
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(gemini_retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("Gemini request failed: {}", err_text));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&self.redact_api_key(&body));
                let should_retry =
                    gemini_should_retry_status(status) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini API error: status={}, body={}, retrying={}",
                    status, body_summary, should_retry
                );
                if should_retry {
                    tokio::time::sleep(gemini_retry_delay(attempt)).await;
                    continue;
                }
                let detail = message.unwrap_or(body_summary);
                return Err(anyhow!(
                    "Gemini request failed with status {}: {}",
                    status,
                    detail
                ));
            }

            let value = response.json::<GeminiResponse>().await.map_err(|err| {
                anyhow!(
                    "Gemini response could not be parsed: {}",
                    self.redact_api_key(&err.to_string())
                )
            })?;
            if tracing::enabled!(tracing::Level::DEBUG) {
                let response_summary = summarize_gemini_response(&value);
                debug!(target: "llm.gemini", model = model, response = %response_summary);
            }
            return Ok(value);
        }
    }

    /// Structured generation: images precede the prompt, output is constrained by `schema`.
    pub async fn generate_json(
        &self,
        model: &str,
        operation: &str,
        prompt: &str,
        images: &[InlineImage],
        schema: &Value,
        thinking_level: Option<&str>,
    ) -> Result<String, TextGenerationError> {
        let mut parts: Vec<Value> = images.iter().map(inline_image_part).collect();
        parts.push(json!({ "text": prompt }));

        let mut generation_config = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
            "temperature": self.temperature,
        });
        if let (Some(level), Some(object)) = (thinking_level, generation_config.as_object_mut()) {
            object.insert(
                "thinkingConfig".to_string(),
                json!({ "thinkingLevel": level }),
            );
        }

        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
            "safetySettings": build_safety_settings(&self.safety_profile),
        });

        let metadata = json!({ "images": images.len(), "promptChars": prompt.chars().count() });
        log_llm_timing("gemini", model, operation, Some(metadata), || async {
            let response = self
                .call_gemini_api(model, &payload)
                .await
                .map_err(TextGenerationError::Request)?;
            text_result(&response, model)
        })
        .await
    }

    /// Image generation: the prompt precedes the reference images.
    pub async fn generate_image(
        &self,
        model: &str,
        operation: &str,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<Vec<u8>, ImageGenerationError> {
        let mut parts = vec![json!({ "text": prompt })];
        parts.extend(images.iter().map(inline_image_part));

        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"]
            },
            "safetySettings": build_safety_settings(&self.safety_profile),
        });

        let metadata = json!({ "images": images.len() });
        log_llm_timing("gemini", model, operation, Some(metadata), || async {
            let response = self
                .call_gemini_api(model, &payload)
                .await
                .map_err(ImageGenerationError::Request)?;
            extract_image_from_response(&response, model)
        })
        .await
    }
}
