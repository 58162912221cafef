pub mod gemini;
pub mod media;
pub mod model;

pub use gemini::GeminiClient;
