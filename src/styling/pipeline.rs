use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose, Engine as _};
use tracing::{info, warn};

use super::category::visible_categories;
use super::prompts::{
    angle_prompt, product_extraction_prompt, product_response_schema, styling_ranking_prompt,
    styling_response_schema, tryon_prompt,
};
use super::types::{
    AnalysisOutcome, CandidateMatch, GeneratedImages, Product, SelectedItem, StylingResult,
    UserProfile, UserRecord, ViewAngle, WardrobeItem,
};
use super::validator::{parse_product, parse_styling_result};
use super::wardrobe::{filter_wardrobe, id_to_category, user_context, valid_ids, FilteredItem};
use crate::config::Config;
use crate::error::{StylistError, StylistResult};
use crate::llm::gemini::TextGenerationError;
use crate::llm::media::{decode_base64_payload, image_dimensions, load_reference_image, InlineImage};
use crate::llm::model::{GenerativeModel, ImageTask, JsonTask};
use crate::store::WardrobeStore;
use crate::utils::schedule::{retry_with_backoff, run_sequential, RetryPolicy};

/// User photo, product screenshot and at most three wardrobe items.
pub const MAX_TRYON_REFERENCES: usize = 5;

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub username: String,
    pub page_url: String,
    pub page_title: String,
    pub html_content: String,
    pub screenshot_base64: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub html_char_limit: usize,
    pub max_tryon_items: usize,
    pub enable_angle_views: bool,
    pub image_retry: RetryPolicy,
    pub angle_spacing: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        PipelineSettings {
            html_char_limit: config.html_char_limit,
            max_tryon_items: config.max_tryon_items,
            enable_angle_views: config.enable_angle_views,
            image_retry: RetryPolicy {
                max_retries: config.angle_max_retries,
                base_delay: Duration::from_millis(config.angle_retry_base_delay_ms),
            },
            angle_spacing: Duration::from_millis(config.angle_spacing_ms),
        }
    }
}

/// A validated match joined with the wardrobe item it points at.
#[derive(Debug, Clone, Copy)]
struct Pick<'a> {
    item: &'a WardrobeItem,
    matched: &'a CandidateMatch,
}

fn join_matches<'a>(styling: &'a StylingResult, filtered: &'a [FilteredItem]) -> Vec<Pick<'a>> {
    let lookup: HashMap<&str, &WardrobeItem> = filtered
        .iter()
        .map(|entry| (entry.item.id.as_str(), &entry.item))
        .collect();
    styling
        .best_matches
        .iter()
        .filter_map(|matched| {
            lookup
                .get(matched.item_id.as_str())
                .copied()
                .map(|item| Pick { item, matched })
        })
        .collect()
}

fn decode_screenshot(payload: &str) -> StylistResult<InlineImage> {
    if payload.trim().is_empty() {
        return Err(StylistError::InvalidRequest(
            "screenshot_base64 is required".to_string(),
        ));
    }
    let bytes = decode_base64_payload(payload).map_err(|err| {
        StylistError::InvalidRequest(format!("screenshot_base64 is not valid base64: {err}"))
    })?;
    if image_dimensions(&bytes).is_none() {
        return Err(StylistError::InvalidRequest(
            "screenshot_base64 is not a supported image".to_string(),
        ));
    }
    Ok(InlineImage::new(bytes))
}

/// Runs one analysis request: product extraction, wardrobe ranking and try-on renders.
pub struct Stylist {
    model: Arc<dyn GenerativeModel>,
    store: Arc<dyn WardrobeStore>,
    settings: PipelineSettings,
}

impl Stylist {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        store: Arc<dyn WardrobeStore>,
        settings: PipelineSettings,
    ) -> Self {
        Stylist {
            model,
            store,
            settings,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.model.has_credentials()
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> StylistResult<AnalysisOutcome> {
        let started = Instant::now();
        let username = request.username.trim();
        if username.is_empty() {
            return Err(StylistError::InvalidRequest("username is required".to_string()));
        }

        let record = self.load_user(username).await?;
        if !self.model.has_credentials() {
            return Err(StylistError::MissingCredentials);
        }
        let screenshot = decode_screenshot(&request.screenshot_base64)?;

        let product = self.extract_product(request, &screenshot).await?;
        let visible = visible_categories(product.category);
        let filtered = filter_wardrobe(&record.wardrobe, &visible);
        info!(
            username,
            product = %product.name,
            category = %product.category,
            wardrobe = record.wardrobe.len(),
            visible_items = filtered.len(),
            "Product extracted"
        );

        let styling = if filtered.is_empty() {
            info!(username, "No visible wardrobe items; skipping ranking");
            StylingResult::nothing_to_match()
        } else {
            self.rank(&product, &record, &filtered).await?
        };

        let picks = join_matches(&styling, &filtered);
        let item_images = self.fetch_item_images(username, &picks).await;
        let generated_images = self
            .generate_images(username, &product, &record.profile, &screenshot, &picks, &item_images)
            .await;

        let selected_items = picks
            .iter()
            .zip(item_images)
            .map(|(pick, bytes)| SelectedItem {
                id: pick.item.id.clone(),
                name: pick.item.name.clone(),
                garment_type: pick.item.garment_type.clone(),
                color: pick.item.color.clone(),
                color_hex: pick.item.color_hex.clone(),
                fit_score: pick.matched.fit_score,
                match_reason: pick.matched.reason.clone(),
                image_base64: bytes.map(|bytes| general_purpose::STANDARD.encode(bytes)),
                image_url: pick.item.image_url.clone(),
            })
            .collect::<Vec<_>>();

        info!(
            username,
            fit_score = styling.overall_fit_score,
            selected = selected_items.len(),
            angles = ?generated_images.generated_angles(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            product,
            fit_score: styling.overall_fit_score,
            selected_items,
            commentary: styling.styling_tip,
            generated_images,
        })
    }

    async fn load_user(&self, username: &str) -> StylistResult<UserRecord> {
        let record = self
            .store
            .fetch_user(username)
            .await
            .map_err(StylistError::Store)?
            .ok_or_else(|| StylistError::UserNotFound(username.to_string()))?;
        if record.wardrobe.is_empty() {
            return Err(StylistError::EmptyWardrobe(username.to_string()));
        }
        Ok(record)
    }

    async fn extract_product(
        &self,
        request: &AnalysisRequest,
        screenshot: &InlineImage,
    ) -> StylistResult<Product> {
        let prompt = product_extraction_prompt(
            &request.page_url,
            &request.page_title,
            &request.html_content,
            self.settings.html_char_limit,
        );
        let raw = self
            .model
            .generate_json(
                JsonTask::ProductExtraction,
                &prompt,
                std::slice::from_ref(screenshot),
                &product_response_schema(),
            )
            .await;

        let parsed = match raw {
            Ok(raw) => parse_product(&raw),
            Err(TextGenerationError::Request(err)) => return Err(StylistError::Model(err)),
            Err(err) => Err(StylistError::MalformedOutput(err.to_string())),
        };
        match parsed {
            Ok(product) => Ok(product),
            Err(err) => {
                warn!("Falling back to page title for product details: {err}");
                Ok(Product::fallback(&request.page_title))
            }
        }
    }

    async fn rank(
        &self,
        product: &Product,
        record: &UserRecord,
        filtered: &[FilteredItem],
    ) -> StylistResult<StylingResult> {
        let context = user_context(&record.profile, &record.wardrobe);
        let prompt = styling_ranking_prompt(product, &context, filtered);
        let raw = self
            .model
            .generate_json(
                JsonTask::StylingRanking,
                &prompt,
                &[],
                &styling_response_schema(),
            )
            .await;

        let parsed = match raw {
            Ok(raw) => parse_styling_result(&raw, &valid_ids(filtered), &id_to_category(filtered)),
            Err(TextGenerationError::Request(err)) => return Err(StylistError::Model(err)),
            Err(err) => Err(StylistError::MalformedOutput(err.to_string())),
        };
        match parsed {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!("Using neutral styling result: {err}");
                Ok(StylingResult::neutral())
            }
        }
    }

    /// One fetch per selected item, shared by try-on references and thumbnails.
    async fn fetch_item_images(&self, username: &str, picks: &[Pick<'_>]) -> Vec<Option<Vec<u8>>> {
        let mut images = Vec::with_capacity(picks.len());
        for pick in picks {
            let bytes = match pick.item.image_url.as_deref().map(str::trim) {
                Some(reference) if !reference.is_empty() => {
                    self.store.fetch_image(username, reference).await
                }
                _ => None,
            };
            if bytes.is_none() {
                warn!(username, item_id = %pick.item.id, "No image available for selected item");
            }
            images.push(bytes);
        }
        images
    }

    async fn generate_images(
        &self,
        username: &str,
        product: &Product,
        profile: &UserProfile,
        screenshot: &InlineImage,
        picks: &[Pick<'_>],
        item_images: &[Option<Vec<u8>>],
    ) -> GeneratedImages {
        let user_photo = match profile
            .profile_image_url
            .as_deref()
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
        {
            Some(reference) => match self.store.fetch_image(username, reference).await {
                Some(bytes) => load_reference_image(bytes, "user_photo"),
                None => None,
            },
            None => None,
        };
        let Some(user_photo) = user_photo else {
            warn!(username, "User photo unavailable; skipping try-on images");
            return GeneratedImages::default();
        };

        let mut references = vec![user_photo, screenshot.clone()];
        let item_limit = self
            .settings
            .max_tryon_items
            .min(MAX_TRYON_REFERENCES - references.len());
        let mut worn = Vec::new();
        for (pick, bytes) in picks.iter().zip(item_images) {
            if worn.len() >= item_limit {
                break;
            }
            let Some(bytes) = bytes else { continue };
            if let Some(image) = load_reference_image(bytes.clone(), &pick.item.id) {
                references.push(image);
                worn.push(pick.item);
            }
        }

        let prompt = tryon_prompt(product, profile, &worn);
        let Some(front) = self.render_front(&prompt, &references).await else {
            return GeneratedImages::default();
        };

        let mut images = GeneratedImages {
            front: Some(front.to_base64()),
            ..GeneratedImages::default()
        };
        if self.settings.enable_angle_views {
            for (angle, image) in self.render_angles(&front).await {
                images.set(angle, image);
            }
        }
        images
    }

    async fn render_front(&self, prompt: &str, references: &[InlineImage]) -> Option<InlineImage> {
        let model = self.model.as_ref();
        let result = retry_with_backoff("tryon_front", self.settings.image_retry, |_| async move {
            model
                .generate_image(ImageTask::TryOn, prompt, references)
                .await
                .map_err(anyhow::Error::from)
        })
        .await;

        match result {
            Ok(bytes) => Some(InlineImage::new(bytes)),
            Err(err) => {
                warn!("Front try-on failed; returning text results only: {err:#}");
                None
            }
        }
    }

    async fn render_angles(&self, front: &InlineImage) -> BTreeMap<ViewAngle, Option<String>> {
        let model = self.model.as_ref();
        let policy = self.settings.image_retry;

        let tasks = ViewAngle::SECONDARY
            .into_iter()
            .map(|angle| {
                let prompt = angle_prompt(angle);
                let task = move || async move {
                    let task = ImageTask::Angle(angle);
                    let label = task.operation();
                    let bytes = retry_with_backoff(&label, policy, |_| {
                        let prompt = prompt.as_str();
                        async move {
                            model
                                .generate_image(task, prompt, std::slice::from_ref(front))
                                .await
                                .map_err(anyhow::Error::from)
                        }
                    })
                    .await?;
                    Ok::<_, anyhow::Error>(InlineImage::new(bytes).to_base64())
                };
                (angle, task)
            })
            .collect::<Vec<_>>();

        run_sequential(tasks, self.settings.angle_spacing).await
    }
}
