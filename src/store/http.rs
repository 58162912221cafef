use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::WardrobeStore;
use crate::config::Config;
use crate::llm::media::{download_media, truncate_for_log};
use crate::styling::types::{UserProfile, UserRecord, WardrobeItem};
use crate::utils::http::get_http_client;

#[derive(Debug, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    profile: Option<Value>,
    #[serde(default)]
    wardrobe: Vec<Value>,
}

/// Parses a user document, skipping wardrobe entries that cannot be used.
pub fn parse_document(raw: &[u8], username: &str) -> Result<UserRecord> {
    let document: StoreDocument =
        serde_json::from_slice(raw).context("User document is not valid JSON")?;

    let mut profile = match document.profile {
        Some(Value::Null) | None => UserProfile::default(),
        Some(value) => serde_json::from_value::<UserProfile>(value)
            .with_context(|| format!("Malformed profile for user {username}"))?,
    };
    if profile.username.trim().is_empty() {
        profile.username = username.to_string();
    }

    let mut seen = HashSet::new();
    let mut wardrobe = Vec::with_capacity(document.wardrobe.len());
    for (index, entry) in document.wardrobe.into_iter().enumerate() {
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            warn!(username, index, "Skipping wardrobe entry without an id");
            continue;
        }
        if seen.contains(&id) {
            warn!(username, id = %id, "Skipping duplicate wardrobe id");
            continue;
        }
        match serde_json::from_value::<WardrobeItem>(entry) {
            Ok(mut item) => {
                item.id = id.clone();
                seen.insert(id);
                wardrobe.push(item);
            }
            Err(err) => {
                warn!(username, id = %id, "Skipping malformed wardrobe entry: {err}");
            }
        }
    }

    Ok(UserRecord { profile, wardrobe })
}

/// Wardrobe documents kept in an HTTP-readable bucket, one folder per user.
#[derive(Debug, Clone)]
pub struct ObjectStoreWardrobe {
    base: Url,
    document_name: String,
    timeout: Duration,
}

impl ObjectStoreWardrobe {
    pub fn new(base_url: &str, document_name: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url.trim())
            .with_context(|| format!("WARDROBE_STORE_URL is not a valid URL: {base_url}"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("WARDROBE_STORE_URL cannot be used as a base: {base_url}"));
        }
        Ok(ObjectStoreWardrobe {
            base,
            document_name: document_name.to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.wardrobe_store_url,
            &config.wardrobe_document_name,
            Duration::from_secs(config.store_timeout_secs.max(1)),
        )
    }

    fn user_url(&self, username: &str, tail: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Store URL cannot carry a path"))?
            .pop_if_empty()
            .push(username)
            .extend(tail);
        Ok(url)
    }

    pub fn document_url(&self, username: &str) -> Result<Url> {
        self.user_url(username, &[self.document_name.as_str()])
    }

    pub fn image_url(&self, username: &str, reference: &str) -> Result<Url> {
        let reference = reference.trim();
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Url::parse(reference)
                .with_context(|| format!("Invalid image URL: {reference}"));
        }
        let segments: Vec<&str> = reference
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .collect();
        if segments.is_empty() {
            return Err(anyhow!("Empty image reference"));
        }
        self.user_url(username, &segments)
    }
}

#[async_trait]
impl WardrobeStore for ObjectStoreWardrobe {
    async fn fetch_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let url = self.document_url(username)?;
        debug!(username, url = %url, "Fetching user document");

        let response = get_http_client()
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to reach wardrobe store at {url}"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!(username, "No user document in wardrobe store");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Wardrobe store returned {} for {}: {}",
                status,
                url,
                truncate_for_log(&body, 500)
            ));
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read user document from {url}"))?;
        let record = parse_document(&bytes, username)?;
        info!(
            username,
            items = record.wardrobe.len(),
            has_photo = record.profile.profile_image_url.is_some(),
            "Loaded user document"
        );
        Ok(Some(record))
    }

    async fn fetch_image(&self, username: &str, reference: &str) -> Option<Vec<u8>> {
        let url = match self.image_url(username, reference) {
            Ok(url) => url,
            Err(err) => {
                warn!(username, reference, "Cannot resolve image reference: {err:#}");
                return None;
            }
        };
        download_media(url.as_str(), self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    use super::*;

    fn store(base: &str) -> ObjectStoreWardrobe {
        ObjectStoreWardrobe::new(base, "user_info.json", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn builds_document_and_image_urls() {
        let store = store("https://bucket.example.com/users/");
        assert_eq!(
            store.document_url("alex").unwrap().as_str(),
            "https://bucket.example.com/users/alex/user_info.json"
        );
        assert_eq!(
            store.image_url("alex", "images/jeans blue.png").unwrap().as_str(),
            "https://bucket.example.com/users/alex/images/jeans%20blue.png"
        );
        assert_eq!(
            store
                .image_url("alex", "https://cdn.example.com/photo.jpg")
                .unwrap()
                .as_str(),
            "https://cdn.example.com/photo.jpg"
        );
    }

    #[test]
    fn username_is_a_single_path_segment() {
        let store = store("https://bucket.example.com");
        let url = store.document_url("a/b").unwrap();
        assert_eq!(url.as_str(), "https://bucket.example.com/a%2Fb/user_info.json");
    }

    #[test]
    fn relative_references_cannot_escape_user_folder() {
        let store = store("https://bucket.example.com/users");
        let url = store.image_url("alex", "../bob/photo.jpg").unwrap();
        assert_eq!(url.as_str(), "https://bucket.example.com/users/alex/bob/photo.jpg");
        assert!(store.image_url("alex", " / ").is_err());
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(ObjectStoreWardrobe::new("not a url", "user_info.json", Duration::from_secs(1)).is_err());
        assert!(ObjectStoreWardrobe::new("mailto:me@example.com", "user_info.json", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn parses_document_leniently() {
        let raw = json!({
            "profile": {
                "name": "Alex",
                "height_cm": 178,
                "usual_sizes": {"tshirts": "M", "pants": "32"},
                "photo_path": "photo.jpg"
            },
            "wardrobe": [
                {"id": "top_01", "name": "White Hoodie", "type": "hoodie", "color": "white", "image_path": "hoodie.png"},
                {"name": "No Id", "type": "jeans", "color": "blue"},
                {"id": "top_01", "name": "Duplicate", "type": "hoodie", "color": "red"},
                {"id": "bottom_01", "name": "Missing color", "type": "jeans"},
                {"id": " shoes_01 ", "name": "White Sneakers", "type": "sneakers", "color": "white"}
            ]
        });
        let record = parse_document(raw.to_string().as_bytes(), "alex").unwrap();

        assert_eq!(record.profile.username, "alex");
        assert_eq!(record.profile.height_cm, Some(178));
        assert_eq!(record.profile.profile_image_url.as_deref(), Some("photo.jpg"));
        let ids: Vec<&str> = record.wardrobe.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["top_01", "shoes_01"]);
        assert_eq!(record.wardrobe[0].name, "White Hoodie");
        assert_eq!(record.wardrobe[0].image_url.as_deref(), Some("hoodie.png"));
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let record = parse_document(b"{}", "alex").unwrap();
        assert!(record.wardrobe.is_empty());
        assert_eq!(record.profile.username, "alex");
        assert!(parse_document(b"not json", "alex").is_err());
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetches_documents_over_http() {
        let router = Router::new()
            .route(
                "/alex/user_info.json",
                get(|| async {
                    Json(json!({
                        "profile": {"name": "Alex"},
                        "wardrobe": [{"id": "bottom_01", "name": "Blue Jeans", "type": "jeans", "color": "blue"}]
                    }))
                }),
            )
            .route("/alex/jeans.png", get(|| async { vec![1u8, 2, 3] }));
        let base = serve(router).await;
        let store = store(&base);

        let record = store.fetch_user("alex").await.unwrap().unwrap();
        assert_eq!(record.wardrobe.len(), 1);
        assert!(store.fetch_user("nobody").await.unwrap().is_none());
        assert_eq!(store.fetch_image("alex", "jeans.png").await, Some(vec![1, 2, 3]));
    }
}
