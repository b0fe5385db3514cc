//! Generation collaborators
//!
//! This module provides:
//! - `ImageGenerator`, `ImageAnalyzer` and `PromptInspector` contracts
//! - The ordered prompt-building pipeline
//! - Mock implementations for testing
//! - A Stable Diffusion HTTP client

mod mock;
mod model;
pub mod prompt;
pub mod stable_diffusion;

pub use mock::{MockAnalyzer, MockGenerator, MockPromptInspector};
pub use model::{
    AspectRatio, GenerationParams, ImageAnalyzer, ImageGenerator, ModelTier, PromptAnalysis,
    PromptInspector, Sentiment, DEFAULT_STRENGTH,
};
pub use prompt::{BuiltPrompt, PromptPipeline, PromptStage};
pub use stable_diffusion::{FixedPromptAnalyzer, StableDiffusionClient};
