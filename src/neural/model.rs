//! Collaborator contracts for image generation and analysis
//!
//! The generative model, the vision analyzer and the prompt inspector
//! are opaque services. The orchestrator only depends on the traits
//! defined here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::layers::EncodedImage;

/// Image-to-image strength used when the caller gives none
pub const DEFAULT_STRENGTH: f32 = 0.75;

/// Output aspect ratio requested from the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "3:4")]
    Book,
}

impl AspectRatio {
    pub fn all() -> &'static [AspectRatio] {
        &[
            AspectRatio::Square,
            AspectRatio::Landscape,
            AspectRatio::Portrait,
            AspectRatio::Classic,
            AspectRatio::Book,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Classic => "4:3",
            AspectRatio::Book => "3:4",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Square => "Square (1:1)",
            AspectRatio::Landscape => "Landscape (16:9)",
            AspectRatio::Portrait => "Portrait (9:16)",
            AspectRatio::Classic => "Classic (4:3)",
            AspectRatio::Book => "Book (3:4)",
        }
    }

    /// Pixel size requested from Stable Diffusion style backends
    pub fn sd_dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (512, 512),
            AspectRatio::Landscape => (768, 512),
            _ => (512, 768),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        AspectRatio::all()
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| StudioError::InvalidParameter {
                param: "aspectRatio".to_string(),
                value: s.to_string(),
                expected: "1:1, 16:9, 9:16, 4:3 or 3:4".to_string(),
            })
    }
}

/// Generation backend class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Fast, standard quality
    #[default]
    Fast,
    /// High fidelity; may require authorization
    Pro,
    /// Locally configured endpoint
    Custom,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Pro => "pro",
            ModelTier::Custom => "custom",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelTier::Fast => "Fast, versatile, standard quality.",
            ModelTier::Pro => "High fidelity, best for materials & lighting.",
            ModelTier::Custom => "Connect to an external API (e.g. A1111).",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "flash" => Ok(ModelTier::Fast),
            "pro" => Ok(ModelTier::Pro),
            "custom" | "sd" | "stable-diffusion" => Ok(ModelTier::Custom),
            _ => Err(StudioError::InvalidParameter {
                param: "modelTier".to_string(),
                value: s.to_string(),
                expected: "fast, pro or custom".to_string(),
            }),
        }
    }
}

/// Request sent to the generation collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Final prompt, context and `--no` clause already folded in
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub model_tier: ModelTier,
    /// Present for image-to-image
    pub input_image: Option<EncodedImage>,
    /// Denoising strength in [0, 1]; 0 keeps the input
    pub strength: Option<f32>,
    /// Route to a locally configured service instead of the default one
    pub endpoint_override: Option<String>,
}

impl GenerationParams {
    pub fn text_to_image(prompt: impl Into<String>, model_tier: ModelTier) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            aspect_ratio: AspectRatio::Square,
            model_tier,
            input_image: None,
            strength: None,
            endpoint_override: None,
        }
    }

    pub fn image_to_image(
        prompt: impl Into<String>,
        model_tier: ModelTier,
        input: EncodedImage,
        strength: f32,
    ) -> Self {
        Self {
            input_image: Some(input),
            strength: Some(strength),
            ..Self::text_to_image(prompt, model_tier)
        }
    }

    pub fn with_negative(mut self, negative: impl Into<String>) -> Self {
        let negative = negative.into();
        self.negative_prompt = (!negative.trim().is_empty()).then_some(negative);
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint_override = endpoint;
        self
    }

    pub fn is_image_to_image(&self) -> bool {
        self.input_image.is_some()
    }

    /// Strength to send for image-to-image requests
    pub fn effective_strength(&self) -> f32 {
        self.strength.unwrap_or(DEFAULT_STRENGTH)
    }

    /// Reject requests no backend can serve
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(StudioError::EmptyPrompt);
        }
        if let Some(strength) = self.strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(StudioError::InvalidParameter {
                    param: "strength".to_string(),
                    value: strength.to_string(),
                    expected: "value between 0.0 and 1.0".to_string(),
                });
            }
        }
        if self.model_tier == ModelTier::Custom && self.endpoint_override.is_none() {
            return Err(StudioError::Config {
                reason: "Custom endpoint URL is required for the custom model tier".to_string(),
            });
        }
        Ok(())
    }
}

/// Opaque image generator: `generate(params) -> image`
pub trait ImageGenerator: Send + Sync {
    /// Backend name used in logs and error messages
    fn name(&self) -> &str;

    /// Text-to-image when `input_image` is absent, image-to-image otherwise
    fn generate(&self, params: &GenerationParams) -> Result<EncodedImage>;
}

/// Vision analyzer producing repair prompt keywords for an image
pub trait ImageAnalyzer: Send + Sync {
    fn analyze(&self, image: &EncodedImage) -> Result<String>;
}

/// Language and keyword analysis of a user prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAnalysis {
    pub language: String,
    pub confidence: f32,
    /// English rendition; the original text when already English
    pub translated_prompt: String,
    pub keywords: Vec<String>,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl PromptAnalysis {
    /// Result used when inspection is unavailable
    pub fn neutral(text: &str) -> Self {
        Self {
            language: "Unknown".to_string(),
            confidence: 0.0,
            translated_prompt: text.to_string(),
            keywords: Vec::new(),
            sentiment: Sentiment::Neutral,
        }
    }
}

pub trait PromptInspector: Send + Sync {
    fn inspect(&self, text: &str) -> Result<PromptAnalysis>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(AspectRatio::Square, (512, 512))]
    #[test_case(AspectRatio::Landscape, (768, 512))]
    #[test_case(AspectRatio::Portrait, (512, 768))]
    #[test_case(AspectRatio::Classic, (512, 768))]
    #[test_case(AspectRatio::Book, (512, 768))]
    fn test_sd_dimensions(ratio: AspectRatio, expected: (u32, u32)) {
        assert_eq!(ratio.sd_dimensions(), expected);
    }

    #[test]
    fn test_aspect_ratio_serde_uses_ratio_text() {
        assert_eq!(serde_json::to_string(&AspectRatio::Landscape).unwrap(), "\"16:9\"");
        assert_eq!("3:4".parse::<AspectRatio>().unwrap(), AspectRatio::Book);
        assert!("2:1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_prompt() {
        let params = GenerationParams::text_to_image("   ", ModelTier::Fast);
        assert!(matches!(params.validate(), Err(StudioError::EmptyPrompt)));
    }

    #[test]
    fn test_validate_rejects_out_of_range_strength() {
        let input = EncodedImage::with_mime(vec![1], "image/png");
        let params = GenerationParams::image_to_image("x", ModelTier::Pro, input, 1.5);
        assert!(params.validate().unwrap_err().is_validation());
    }

    #[test]
    fn test_custom_tier_needs_endpoint() {
        let params = GenerationParams::text_to_image("x", ModelTier::Custom);
        assert_eq!(params.validate().unwrap_err().error_code(), "CONFIG_ERROR");
        let params = params.with_endpoint(Some("http://127.0.0.1:7860/sdapi/v1/txt2img".into()));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_blank_negative_is_dropped() {
        let params = GenerationParams::text_to_image("x", ModelTier::Fast).with_negative("  ");
        assert_eq!(params.negative_prompt, None);
        assert_eq!(params.effective_strength(), DEFAULT_STRENGTH);
    }
}
