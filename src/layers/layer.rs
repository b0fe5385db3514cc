//! Layer data model
//!
//! A layer is one encoded image plus the visual modifiers applied when it
//! is painted onto the canvas: visibility, opacity, blend mode and an
//! ordered filter chain.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, ImageOutputFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::filter::FilterChain;
use crate::error::{Result, StudioError};

/// Opaque, immutable layer identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Encoded raster payload (PNG, JPEG, ...) shared cheaply between layers,
/// requests and results.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    mime: String,
}

impl EncodedImage {
    /// Wrap encoded bytes, sniffing the mime type from the magic number
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        let mime = image::guess_format(&bytes)
            .map(mime_for_format)
            .unwrap_or("application/octet-stream");
        Self {
            bytes: bytes.into(),
            mime: mime.to_string(),
        }
    }

    pub fn with_mime(bytes: impl Into<Vec<u8>>, mime: impl Into<String>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL. A bare base64 payload
    /// without the header is accepted too.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        let (mime, payload) = match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let (meta, payload) = rest.split_once(',').ok_or_else(|| StudioError::Decode {
                    reason: "data URL is missing its ',' separator".to_string(),
                })?;
                let mime = meta.split(';').next().filter(|m| !m.is_empty());
                (mime.map(str::to_string), payload)
            }
            None => (None, trimmed),
        };

        let bytes = BASE64.decode(payload.trim()).map_err(|e| StudioError::Decode {
            reason: format!("invalid base64 payload: {}", e),
        })?;

        Ok(match mime {
            Some(mime) => Self::with_mime(bytes, mime),
            None => Self::from_bytes(bytes),
        })
    }

    /// Encode an RGBA raster as PNG
    pub fn from_raster(raster: &RgbaImage) -> Result<Self> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(raster.clone())
            .write_to(&mut buffer, ImageOutputFormat::Png)
            .map_err(|e| StudioError::Encode {
                reason: e.to_string(),
            })?;
        Ok(Self::with_mime(buffer.into_inner(), "image/png"))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }

    /// Base64 payload without the data-URL header
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode into pixels
    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory(&self.bytes).map_err(|e| StudioError::Decode {
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn mime_for_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Tiff => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Pixel-combination operator used when painting a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Returns all blend modes in menu order
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Hue,
            BlendMode::Saturation,
            BlendMode::Color,
            BlendMode::Luminosity,
        ]
    }

    /// Canonical lowercase identifier (`color-dodge`, `hard-light`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Hue => "hue",
            BlendMode::Saturation => "saturation",
            BlendMode::Color => "color",
            BlendMode::Luminosity => "luminosity",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
        }
    }

    /// Compositing operator name; `normal` is plain source-over
    pub fn composite_operation(&self) -> &'static str {
        match self {
            BlendMode::Normal => "source-over",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        BlendMode::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| StudioError::InvalidParameter {
                param: "blendMode".to_string(),
                value: s.to_string(),
                expected: "normal, multiply, screen, overlay, darken, lighten, color-dodge, \
                           color-burn, hard-light, soft-light, difference, exclusion, hue, \
                           saturation, color or luminosity"
                    .to_string(),
            })
    }
}

/// Layer opacity in percent, always within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "u8")]
pub struct Opacity(u8);

impl Opacity {
    pub const OPAQUE: Opacity = Opacity(100);
    pub const TRANSPARENT: Opacity = Opacity(0);

    /// Clamp any integer into range
    pub fn new(percent: i64) -> Self {
        Self(percent.clamp(0, 100) as u8)
    }

    /// Round and clamp a fractional percentage; NaN counts as 0
    pub fn from_f64(percent: f64) -> Self {
        if percent.is_nan() {
            return Self::TRANSPARENT;
        }
        Self(percent.round().clamp(0.0, 100.0) as u8)
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Global alpha in 0.0..=1.0
    pub fn alpha(&self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self::OPAQUE
    }
}

impl From<f64> for Opacity {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

impl From<Opacity> for u8 {
    fn from(value: Opacity) -> Self {
        value.0
    }
}

/// A single visual unit in the composition
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    id: LayerId,
    pub name: String,
    /// Absent only transiently, before the first paint
    pub image: Option<EncodedImage>,
    pub visible: bool,
    opacity: Opacity,
    pub blend_mode: BlendMode,
    pub filters: FilterChain,
    /// Last instruction associated with this layer's AI history
    pub action_prompt: String,
    // Reserved placement fields; composition always draws full-canvas.
    pub x: i32,
    pub y: i32,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Layer {
    pub fn new(image: Option<EncodedImage>, name: impl Into<String>) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            image,
            visible: true,
            opacity: Opacity::OPAQUE,
            blend_mode: BlendMode::Normal,
            filters: FilterChain::new(),
            action_prompt: String::new(),
            x: 0,
            y: 0,
            width: None,
            height: None,
        }
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_opacity(mut self, opacity: Opacity) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_action_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.action_prompt = prompt.into();
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    pub fn id(&self) -> &LayerId {
        &self.id
    }

    pub fn opacity(&self) -> Opacity {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: Opacity) {
        self.opacity = opacity;
    }

    /// Whether the compositor will paint this layer at all
    pub fn is_paintable(&self) -> bool {
        self.visible && self.image.is_some()
    }

    /// Shallow-merge a patch; returns true if any field was present
    pub fn apply(&mut self, patch: LayerPatch) -> bool {
        let touched = !patch.is_empty();
        let LayerPatch {
            name,
            image,
            visible,
            opacity,
            blend_mode,
            filters,
            action_prompt,
            x,
            y,
            width,
            height,
        } = patch;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(image) = image {
            self.image = Some(image);
        }
        if let Some(visible) = visible {
            self.visible = visible;
        }
        if let Some(opacity) = opacity {
            self.opacity = opacity;
        }
        if let Some(blend_mode) = blend_mode {
            self.blend_mode = blend_mode;
        }
        if let Some(filters) = filters {
            self.filters = filters;
        }
        if let Some(prompt) = action_prompt {
            self.action_prompt = prompt;
        }
        if let Some(x) = x {
            self.x = x;
        }
        if let Some(y) = y {
            self.y = y;
        }
        if let Some(width) = width {
            self.width = Some(width);
        }
        if let Some(height) = height {
            self.height = Some(height);
        }
        touched
    }
}

/// Partial layer update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub image: Option<EncodedImage>,
    pub visible: Option<bool>,
    pub opacity: Option<Opacity>,
    pub blend_mode: Option<BlendMode>,
    pub filters: Option<FilterChain>,
    pub action_prompt: Option<String>,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl LayerPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn image(mut self, image: EncodedImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    /// Opacity in percent; clamped into 0..=100
    pub fn opacity(mut self, percent: i64) -> Self {
        self.opacity = Some(Opacity::new(percent));
        self
    }

    pub fn blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = Some(mode);
        self
    }

    pub fn filters(mut self, filters: FilterChain) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn action_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.action_prompt = Some(prompt.into());
        self
    }

    pub fn position(mut self, x: i32, y: i32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Edits worth an action-log entry
    pub fn is_visual_edit(&self) -> bool {
        self.filters.is_some() || self.opacity.is_some() || self.blend_mode.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(-20, 0; "negative clamps to zero")]
    #[test_case(0, 0; "lower bound")]
    #[test_case(55, 55; "in range")]
    #[test_case(100, 100; "upper bound")]
    #[test_case(250, 100; "above range clamps to hundred")]
    fn test_opacity_clamps(input: i64, expected: u8) {
        assert_eq!(Opacity::new(input).percent(), expected);
    }

    #[test]
    fn test_opacity_deserialize_clamps() {
        let opacity: Opacity = serde_json::from_str("140.2").unwrap();
        assert_eq!(opacity.percent(), 100);
        let opacity: Opacity = serde_json::from_str("-3").unwrap();
        assert_eq!(opacity.percent(), 0);
    }

    #[test]
    fn test_blend_mode_parse() {
        assert_eq!("color-dodge".parse::<BlendMode>().unwrap(), BlendMode::ColorDodge);
        assert_eq!("Soft Light".parse::<BlendMode>().unwrap(), BlendMode::SoftLight);
        assert_eq!("hard_light".parse::<BlendMode>().unwrap(), BlendMode::HardLight);
        assert!("plasma".parse::<BlendMode>().is_err());
    }

    #[test]
    fn test_normal_maps_to_source_over() {
        assert_eq!(BlendMode::Normal.composite_operation(), "source-over");
        assert_eq!(BlendMode::Multiply.composite_operation(), "multiply");
        assert_eq!(BlendMode::all().len(), 16);
    }

    #[test]
    fn test_data_url_round_trip_keeps_mime() {
        let image = EncodedImage::with_mime(vec![1, 2, 3, 4], "image/webp");
        let parsed = EncodedImage::from_data_url(&image.to_data_url()).unwrap();
        assert_eq!(parsed.mime(), "image/webp");
        assert_eq!(parsed.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_invalid_data_url_is_decode_error() {
        let err = EncodedImage::from_data_url("data:image/png;base64").unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let mut layer = Layer::new(None, "Sky").with_blend_mode(BlendMode::Screen);
        let id = layer.id().clone();

        let touched = layer.apply(LayerPatch::new().opacity(140).visible(false));

        assert!(touched);
        assert_eq!(layer.id(), &id);
        assert_eq!(layer.opacity().percent(), 100);
        assert!(!layer.visible);
        assert_eq!(layer.blend_mode, BlendMode::Screen);
        assert_eq!(layer.name, "Sky");
    }

    #[test]
    fn test_empty_patch_touches_nothing() {
        let mut layer = Layer::new(None, "Base");
        assert!(!layer.apply(LayerPatch::new()));
    }
}
