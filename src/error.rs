use thiserror::Error;

#[derive(Debug, Error)]
pub enum StylistError {
    #[error("GEMINI_API_KEY not configured")]
    MissingCredentials,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("No wardrobe items found for user: {0}")]
    EmptyWardrobe(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Wardrobe store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Model request failed: {0}")]
    Model(#[source] anyhow::Error),
}

pub type StylistResult<T> = Result<T, StylistError>;
