//! Mock collaborators for testing
//!
//! These don't run any model. The generator paints a solid-colour PNG
//! whose colour is a digest of the request, so outputs are deterministic
//! and distinguishable. Every mock records the calls it received.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};

use super::model::{
    GenerationParams, ImageAnalyzer, ImageGenerator, PromptAnalysis, PromptInspector, Sentiment,
};
use crate::error::{Result, StudioError};
use crate::layers::EncodedImage;

/// Generated rasters are the SD dimensions divided by this
const MOCK_DOWNSCALE: u32 = 8;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock image generator
#[derive(Debug, Default)]
pub struct MockGenerator {
    failure: Option<String>,
    calls: Mutex<Vec<GenerationParams>>,
    outputs: Mutex<Vec<EncodedImage>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Requests received, in call order
    pub fn calls(&self) -> Vec<GenerationParams> {
        lock(&self.calls).clone()
    }

    /// Images returned, in call order
    pub fn outputs(&self) -> Vec<EncodedImage> {
        lock(&self.outputs).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Colour painted for a request
    pub fn color_for(params: &GenerationParams) -> Rgba<u8> {
        let mut hasher = Sha256::new();
        hasher.update(params.prompt.as_bytes());
        hasher.update(params.effective_strength().to_le_bytes());
        if let Some(input) = &params.input_image {
            hasher.update(input.as_bytes());
        }
        let digest = hasher.finalize();
        Rgba([digest[0], digest[1], digest[2], 255])
    }
}

impl ImageGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    fn generate(&self, params: &GenerationParams) -> Result<EncodedImage> {
        lock(&self.calls).push(params.clone());

        if let Some(message) = &self.failure {
            return Err(StudioError::external(self.name(), message.clone()));
        }

        let (width, height) = params.aspect_ratio.sd_dimensions();
        let raster = RgbaImage::from_pixel(
            width / MOCK_DOWNSCALE,
            height / MOCK_DOWNSCALE,
            Self::color_for(params),
        );
        let image = EncodedImage::from_raster(&raster)?;
        lock(&self.outputs).push(image.clone());
        Ok(image)
    }
}

/// Mock vision analyzer with scripted answers
#[derive(Debug)]
pub struct MockAnalyzer {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    failure: Option<String>,
    calls: Mutex<Vec<EncodedImage>>,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new("denoise, sharpen details, color correct")
    }
}

impl MockAnalyzer {
    /// Answers `fallback` to every call
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers `responses` in order, then the default answer
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let analyzer = Self::default();
        lock(&analyzer.responses).extend(responses.into_iter().map(Into::into));
        analyzer
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Images analyzed, in call order
    pub fn calls(&self) -> Vec<EncodedImage> {
        lock(&self.calls).clone()
    }
}

impl ImageAnalyzer for MockAnalyzer {
    fn analyze(&self, image: &EncodedImage) -> Result<String> {
        lock(&self.calls).push(image.clone());
        if let Some(message) = &self.failure {
            return Err(StudioError::external("mock-analyzer", message.clone()));
        }
        Ok(lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Keyword-splitting prompt inspector
#[derive(Debug, Default)]
pub struct MockPromptInspector {
    failure: Option<String>,
}

impl MockPromptInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
        }
    }
}

impl PromptInspector for MockPromptInspector {
    fn inspect(&self, text: &str) -> Result<PromptAnalysis> {
        if let Some(message) = &self.failure {
            return Err(StudioError::external("mock-inspector", message.clone()));
        }

        let mut keywords: Vec<String> = Vec::new();
        for word in text
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.chars().count() > 3)
        {
            if !keywords.contains(&word) {
                keywords.push(word);
            }
        }

        let english = text.is_ascii();
        Ok(PromptAnalysis {
            language: if english { "English" } else { "Unknown" }.to_string(),
            confidence: if english { 0.9 } else { 0.3 },
            translated_prompt: text.to_string(),
            keywords,
            sentiment: Sentiment::Neutral,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::model::{AspectRatio, ModelTier};

    #[test]
    fn test_generator_is_deterministic_and_records() {
        let generator = MockGenerator::new();
        let params = GenerationParams::text_to_image("misty forest", ModelTier::Fast);

        let a = generator.generate(&params).unwrap();
        let b = generator.generate(&params).unwrap();

        assert_eq!(a, b);
        assert_eq!(generator.call_count(), 2);
        assert_eq!(generator.calls()[0].prompt, "misty forest");
        let decoded = a.decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_generator_respects_aspect_ratio() {
        let generator = MockGenerator::new();
        let params = GenerationParams::text_to_image("dunes", ModelTier::Fast)
            .with_aspect_ratio(AspectRatio::Landscape);
        let decoded = generator.generate(&params).unwrap().decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (96, 64));
    }

    #[test]
    fn test_failing_generator_still_records() {
        let generator = MockGenerator::failing("quota exceeded");
        let err = generator
            .generate(&GenerationParams::text_to_image("x", ModelTier::Fast))
            .unwrap_err();
        assert_eq!(err.to_string(), "mock-generator call failed: quota exceeded");
        assert_eq!(generator.call_count(), 1);
        assert!(generator.outputs().is_empty());
    }

    #[test]
    fn test_scripted_analyzer_then_fallback() {
        let analyzer = MockAnalyzer::scripted(["remove scratches"]);
        let image = EncodedImage::with_mime(vec![7], "image/png");
        assert_eq!(analyzer.analyze(&image).unwrap(), "remove scratches");
        assert_eq!(
            analyzer.analyze(&image).unwrap(),
            "denoise, sharpen details, color correct"
        );
        assert_eq!(analyzer.calls().len(), 2);
    }

    #[test]
    fn test_inspector_keywords() {
        let analysis = MockPromptInspector::new()
            .inspect("Golden hour, golden light over harbor")
            .unwrap();
        assert_eq!(analysis.language, "English");
        assert_eq!(analysis.keywords, vec!["golden", "hour", "light", "over", "harbor"]);
    }
}
