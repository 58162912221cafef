pub mod category;
pub mod pipeline;
pub mod prompts;
pub mod types;
pub mod validator;
pub mod wardrobe;

#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{AnalysisRequest, PipelineSettings, Stylist};
