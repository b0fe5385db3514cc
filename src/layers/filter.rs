//! Per-layer filter chain
//!
//! The chain stores filter parameters, not rendered pixels. Real-time
//! kinds are re-evaluated by the compositor on every render; baked kinds
//! (`ai-style`, `ai-material`) only record an AI transformation that is
//! already committed to the layer's pixels. Order matters: filters apply
//! left to right in insertion order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StudioError};

/// Kind of filter entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    Blur,
    Contrast,
    Brightness,
    Grayscale,
    Sepia,
    Saturate,
    HueRotate,
    Invert,
    /// AI style transform marker
    AiStyle,
    /// AI texture overlay marker
    AiMaterial,
}

/// Bounds and display metadata of a real-time filter kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub label: &'static str,
    pub unit: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

/// Catalog of adjustable filters, in panel order
pub const REALTIME_FILTERS: [FilterSpec; 8] = [
    FilterSpec { kind: FilterKind::Blur, label: "Blur", unit: "px", min: 0.0, max: 20.0, default: 0.0 },
    FilterSpec { kind: FilterKind::Contrast, label: "Contrast", unit: "%", min: 0.0, max: 200.0, default: 100.0 },
    FilterSpec { kind: FilterKind::Brightness, label: "Brightness", unit: "%", min: 0.0, max: 200.0, default: 100.0 },
    FilterSpec { kind: FilterKind::Grayscale, label: "Black & White", unit: "%", min: 0.0, max: 100.0, default: 0.0 },
    FilterSpec { kind: FilterKind::Sepia, label: "Sepia", unit: "%", min: 0.0, max: 100.0, default: 0.0 },
    FilterSpec { kind: FilterKind::Saturate, label: "Saturation", unit: "%", min: 0.0, max: 200.0, default: 100.0 },
    FilterSpec { kind: FilterKind::HueRotate, label: "Hue", unit: "deg", min: 0.0, max: 360.0, default: 0.0 },
    FilterSpec { kind: FilterKind::Invert, label: "Invert", unit: "%", min: 0.0, max: 100.0, default: 0.0 },
];

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Blur => "blur",
            FilterKind::Contrast => "contrast",
            FilterKind::Brightness => "brightness",
            FilterKind::Grayscale => "grayscale",
            FilterKind::Sepia => "sepia",
            FilterKind::Saturate => "saturate",
            FilterKind::HueRotate => "hue-rotate",
            FilterKind::Invert => "invert",
            FilterKind::AiStyle => "ai-style",
            FilterKind::AiMaterial => "ai-material",
        }
    }

    /// Baked kinds document a past AI edit and never render
    pub fn is_baked(&self) -> bool {
        matches!(self, FilterKind::AiStyle | FilterKind::AiMaterial)
    }

    /// Catalog entry for real-time kinds
    pub fn spec(&self) -> Option<&'static FilterSpec> {
        REALTIME_FILTERS.iter().find(|spec| spec.kind == *self)
    }

    /// Clamp a value into this kind's valid range. Baked kinds store a
    /// strength percentage.
    pub fn clamp(&self, value: f32) -> f32 {
        let value = if value.is_nan() { 0.0 } else { value };
        match self.spec() {
            Some(spec) => value.clamp(spec.min, spec.max),
            None => value.clamp(0.0, 100.0),
        }
    }

    /// CSS-style filter function, e.g. `blur(4px)`. None for baked kinds.
    pub fn css_function(&self, value: f32) -> Option<String> {
        let css = match self {
            FilterKind::Blur => format!("blur({}px)", value),
            FilterKind::Contrast => format!("contrast({}%)", value),
            FilterKind::Brightness => format!("brightness({}%)", value),
            FilterKind::Grayscale => format!("grayscale({}%)", value),
            FilterKind::Sepia => format!("sepia({}%)", value),
            FilterKind::Saturate => format!("saturate({}%)", value),
            FilterKind::HueRotate => format!("hue-rotate({}deg)", value),
            FilterKind::Invert => format!("invert({}%)", value),
            FilterKind::AiStyle | FilterKind::AiMaterial => return None,
        };
        Some(css)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "blur" => Ok(FilterKind::Blur),
            "contrast" => Ok(FilterKind::Contrast),
            "brightness" => Ok(FilterKind::Brightness),
            "grayscale" | "greyscale" => Ok(FilterKind::Grayscale),
            "sepia" => Ok(FilterKind::Sepia),
            "saturate" | "saturation" => Ok(FilterKind::Saturate),
            "hue-rotate" | "hue" => Ok(FilterKind::HueRotate),
            "invert" => Ok(FilterKind::Invert),
            "ai-style" => Ok(FilterKind::AiStyle),
            "ai-material" => Ok(FilterKind::AiMaterial),
            _ => Err(StudioError::InvalidParameter {
                param: "filterType".to_string(),
                value: s.to_string(),
                expected: "blur, contrast, brightness, grayscale, sepia, saturate, hue-rotate or invert"
                    .to_string(),
            }),
        }
    }
}

/// One entry in a layer's filter chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FilterRecord")]
pub struct Filter {
    /// Unique within the owning chain
    pub id: String,
    pub kind: FilterKind,
    value: f32,
    /// Display text only
    pub label: String,
}

impl Filter {
    /// Create a filter with the catalog label, clamping the value
    pub fn new(kind: FilterKind, value: f32) -> Self {
        let label = kind
            .spec()
            .map(|spec| spec.label.to_string())
            .unwrap_or_else(|| kind.as_str().to_string());
        Self::with_label(kind, value, label)
    }

    pub fn with_label(kind: FilterKind, value: f32, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            kind,
            value: kind.clamp(value),
            label: label.into(),
        }
    }

    /// Baked marker for an in-place AI transform; value is the strength
    /// in percent.
    pub fn ai_style(strength: f32, label: impl Into<String>) -> Self {
        let percent = (strength.clamp(0.0, 1.0) * 100.0).round();
        Self::with_label(FilterKind::AiStyle, percent, label)
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn set_value(&mut self, value: f32) {
        self.value = self.kind.clamp(value);
    }

    pub fn is_baked(&self) -> bool {
        self.kind.is_baked()
    }

    pub fn css_function(&self) -> Option<String> {
        self.kind.css_function(self.value)
    }
}

/// Serialized form of a `Filter`, clamped on the way in
#[derive(Deserialize)]
struct FilterRecord {
    id: String,
    kind: FilterKind,
    value: f32,
    #[serde(default)]
    label: String,
}

impl From<FilterRecord> for Filter {
    fn from(record: FilterRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            value: record.kind.clamp(record.value),
            label: record.label,
        }
    }
}

/// Ordered filter list of a layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Append a filter to the end of the chain
    ///
    /// # Returns
    /// The id of the appended filter
    pub fn push(&mut self, filter: Filter) -> String {
        let id = filter.id.clone();
        self.filters.push(filter);
        id
    }

    /// Remove a filter by its ID, preserving the order of the rest
    pub fn remove(&mut self, id: &str) -> Option<Filter> {
        let index = self.filters.iter().position(|f| f.id == id)?;
        Some(self.filters.remove(index))
    }

    /// Replace only the value of a matching filter
    ///
    /// # Returns
    /// false if no filter has this ID
    pub fn set_value(&mut self, id: &str, value: f32) -> bool {
        match self.filters.iter_mut().find(|f| f.id == id) {
            Some(filter) => {
                filter.set_value(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// Filters that contribute a rendering-time effect, in order
    pub fn realtime(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter().filter(|f| !f.is_baked())
    }

    /// Combined filter string, `none` when nothing renders
    pub fn css_string(&self) -> String {
        let parts: Vec<String> = self.realtime().filter_map(Filter::css_function).collect();
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" ")
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn as_slice(&self) -> &[Filter] {
        &self.filters
    }
}

impl From<Vec<Filter>> for FilterChain {
    fn from(filters: Vec<Filter>) -> Self {
        Self { filters }
    }
}

impl<'a> IntoIterator for &'a FilterChain {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}
