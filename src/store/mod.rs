pub mod http;

use anyhow::Result;
use async_trait::async_trait;

use crate::styling::types::UserRecord;

pub use http::ObjectStoreWardrobe;

/// Read-only access to per-user profiles, wardrobes and their images.
#[async_trait]
pub trait WardrobeStore: Send + Sync {
    /// `Ok(None)` when the user has no document.
    async fn fetch_user(&self, username: &str) -> Result<Option<UserRecord>>;

    /// `reference` is an absolute URL or a path relative to the user's folder.
    async fn fetch_image(&self, username: &str, reference: &str) -> Option<Vec<u8>>;
}
