//! Stable Diffusion bridge
//!
//! Generation against an A1111-compatible HTTP API. Text-to-image
//! requests go to the configured endpoint; image-to-image requests are
//! rewritten from `txt2img` to `img2img`.
//!
//! The HTTP transport is only compiled with the `sd-bridge` feature.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::model::{GenerationParams, ImageAnalyzer, ImageGenerator};
use crate::config::StudioConfig;
use crate::error::{Result, StudioError};
use crate::layers::EncodedImage;

pub const DEFAULT_SD_ENDPOINT: &str = "http://127.0.0.1:7860/sdapi/v1/txt2img";
pub const DEFAULT_SD_TIMEOUT_MS: u64 = 300_000;
pub const SD_STEPS: u32 = 25;

const SERVICE: &str = "stable-diffusion";

/// JSON body of a txt2img / img2img job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    /// Base64 payloads without data-URL header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denoising_strength: Option<f32>,
}

impl SdRequest {
    pub fn from_params(params: &GenerationParams) -> Self {
        let (width, height) = params.aspect_ratio.sd_dimensions();
        let (init_images, denoising_strength) = match &params.input_image {
            Some(image) => (
                Some(vec![image.to_base64()]),
                Some(params.effective_strength()),
            ),
            None => (None, None),
        };
        Self {
            prompt: params.prompt.clone(),
            negative_prompt: params.negative_prompt.clone().unwrap_or_default(),
            steps: SD_STEPS,
            width,
            height,
            init_images,
            denoising_strength,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdResponse {
    #[serde(default)]
    pub images: Vec<String>,
}

impl SdResponse {
    /// First image of the job, decoded from base64
    pub fn into_image(self) -> Result<EncodedImage> {
        let first = self
            .images
            .into_iter()
            .next()
            .filter(|payload| !payload.is_empty())
            .ok_or_else(|| StudioError::external(SERVICE, "Invalid response from external API"))?;
        let image = EncodedImage::from_data_url(&first)?;
        Ok(EncodedImage::with_mime(image.as_bytes().to_vec(), "image/png"))
    }
}

/// Pick the job URL for a request
pub fn resolve_endpoint(endpoint: &str, image_to_image: bool) -> String {
    if image_to_image && !endpoint.contains("img2img") && endpoint.contains("txt2img") {
        endpoint.replace("txt2img", "img2img")
    } else {
        endpoint.to_string()
    }
}

/// HTTP generation client
#[derive(Debug, Clone)]
pub struct StableDiffusionClient {
    endpoint: String,
    timeout_ms: u64,
}

impl StableDiffusionClient {
    /// Endpoint and timeout taken from the studio config
    pub fn from_config(config: &StudioConfig) -> Self {
        Self::with_config(config.custom_endpoint.clone(), config.request_timeout_ms)
    }

    pub fn with_config(endpoint: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_ms,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    #[cfg(feature = "sd-bridge")]
    fn send_request(&self, url: &str, request: &SdRequest) -> Result<SdResponse> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| StudioError::external(SERVICE, e.to_string()))?;

        let response = client.post(url).json(request).send().map_err(|e| {
            if e.is_timeout() {
                StudioError::external(SERVICE, format!("timed out after {} ms", self.timeout_ms))
            } else if e.is_connect() {
                StudioError::external(SERVICE, format!("cannot connect to {}: {}", url, e))
            } else {
                StudioError::external(SERVICE, e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(StudioError::external(
                SERVICE,
                format!("External API Error: {}", response.status()),
            ));
        }

        response
            .json::<SdResponse>()
            .map_err(|e| StudioError::external(SERVICE, format!("Invalid response from external API: {}", e)))
    }

    #[cfg(not(feature = "sd-bridge"))]
    fn send_request(&self, _url: &str, _request: &SdRequest) -> Result<SdResponse> {
        Err(StudioError::external(
            SERVICE,
            "Stable Diffusion support not compiled. Build with --features sd-bridge",
        ))
    }
}

impl ImageGenerator for StableDiffusionClient {
    fn name(&self) -> &str {
        SERVICE
    }

    fn generate(&self, params: &GenerationParams) -> Result<EncodedImage> {
        let base = params.endpoint_override.as_deref().unwrap_or(&self.endpoint);
        let url = resolve_endpoint(base, params.is_image_to_image());
        let request = SdRequest::from_params(params);

        debug!(url = %url, width = request.width, height = request.height, "sending SD job");
        let image = self.send_request(&url, &request)?.into_image()?;
        info!(url = %url, bytes = image.len(), "SD job finished");
        Ok(image)
    }
}

/// Analyzer for backends without a vision endpoint
///
/// Every image gets the same repair prompt.
#[derive(Debug, Clone)]
pub struct FixedPromptAnalyzer {
    prompt: String,
}

impl FixedPromptAnalyzer {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl ImageAnalyzer for FixedPromptAnalyzer {
    fn analyze(&self, _image: &EncodedImage) -> Result<String> {
        debug!(prompt = %self.prompt, "no vision endpoint, using fixed repair prompt");
        Ok(self.prompt.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::model::{AspectRatio, ModelTier};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_txt2img_body() {
        let params = GenerationParams::text_to_image("a lighthouse --no fog", ModelTier::Custom)
            .with_negative("fog")
            .with_aspect_ratio(AspectRatio::Landscape);
        let body = serde_json::to_value(SdRequest::from_params(&params)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "prompt": "a lighthouse --no fog",
                "negative_prompt": "fog",
                "steps": 25,
                "width": 768,
                "height": 512,
            })
        );
    }

    #[test]
    fn test_img2img_body_carries_raw_base64() {
        let input = EncodedImage::with_mime(vec![1, 2, 3], "image/png");
        let params = GenerationParams::image_to_image("oil paint", ModelTier::Custom, input, 0.5);
        let request = SdRequest::from_params(&params);
        assert_eq!(request.init_images, Some(vec!["AQID".to_string()]));
        assert_eq!(request.denoising_strength, Some(0.5));
        assert_eq!((request.width, request.height), (512, 512));
    }

    #[test]
    fn test_endpoint_rewrite() {
        assert_eq!(
            resolve_endpoint(DEFAULT_SD_ENDPOINT, true),
            "http://127.0.0.1:7860/sdapi/v1/img2img"
        );
        assert_eq!(resolve_endpoint(DEFAULT_SD_ENDPOINT, false), DEFAULT_SD_ENDPOINT);
        assert_eq!(resolve_endpoint("http://host/run", true), "http://host/run");
    }

    #[test]
    fn test_response_first_image() {
        let response: SdResponse = serde_json::from_str(r#"{"images":["AQID","BAUG"]}"#).unwrap();
        let image = response.into_image().unwrap();
        assert_eq!(image.as_bytes(), &[1, 2, 3]);
        assert_eq!(image.mime(), "image/png");
    }

    #[test]
    fn test_empty_response_is_external_error() {
        let response: SdResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.into_image().unwrap_err().error_code(), "EXTERNAL_CALL_FAILED");
    }

    #[test]
    fn test_client_from_config() {
        let config = StudioConfig {
            custom_endpoint: "http://gpu-box:7860/sdapi/v1/txt2img".to_string(),
            request_timeout_ms: 45_000,
            ..StudioConfig::default()
        };
        let client = StableDiffusionClient::from_config(&config);
        assert_eq!(client.endpoint(), "http://gpu-box:7860/sdapi/v1/txt2img");
        assert_eq!(client.timeout_ms(), 45_000);

        let defaults = StableDiffusionClient::from_config(&StudioConfig::default());
        assert_eq!(defaults.endpoint(), DEFAULT_SD_ENDPOINT);
        assert_eq!(defaults.timeout_ms(), DEFAULT_SD_TIMEOUT_MS);
    }

    #[test]
    fn test_fixed_prompt_analyzer() {
        let analyzer = FixedPromptAnalyzer::new("sharpen, denoise");
        let image = EncodedImage::with_mime(vec![9, 9], "image/png");
        assert_eq!(analyzer.analyze(&image).unwrap(), "sharpen, denoise");
    }

    #[cfg(not(feature = "sd-bridge"))]
    #[test]
    fn test_without_feature_reports_missing_transport() {
        let client = StableDiffusionClient::with_config(DEFAULT_SD_ENDPOINT, 10);
        let err = client
            .generate(&GenerationParams::text_to_image("x", ModelTier::Custom))
            .unwrap_err();
        assert!(err.to_string().contains("sd-bridge"));
    }
}
