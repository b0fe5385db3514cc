//! Tool-call boundary
//!
//! Tool calls arrive from the conversational model as a name plus loosely
//! typed JSON arguments. They are validated into `ToolCall` before any
//! dispatch; unknown names and malformed arguments are rejected here.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::layers::{BlendMode, FilterKind, LayerPatch, REALTIME_FILTERS};

pub const GENERATE_IMAGE: &str = "generate_image";
pub const UPDATE_LAYER: &str = "update_layer";
pub const APPLY_FILTER: &str = "apply_filter";

/// Tool call exactly as the model returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl RawToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Function declaration advertised to the model in command mode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// The three editor tools, in advertisement order
pub fn command_tools() -> Vec<ToolDeclaration> {
    let filter_kinds: Vec<&str> = REALTIME_FILTERS.iter().map(|f| f.kind.as_str()).collect();
    vec![
        ToolDeclaration {
            name: GENERATE_IMAGE,
            description: "Generate a new image layer from a text prompt",
            parameters: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "The image description" }
                },
                "required": ["prompt"]
            }),
        },
        ToolDeclaration {
            name: UPDATE_LAYER,
            description: "Update the currently selected layer's properties",
            parameters: json!({
                "type": "object",
                "properties": {
                    "opacity": { "type": "number", "description": "Opacity from 0 to 100" },
                    "visible": { "type": "boolean", "description": "Layer visibility" },
                    "blendMode": {
                        "type": "string",
                        "description": "Blend mode (normal, multiply, screen, overlay, etc)"
                    }
                }
            }),
        },
        ToolDeclaration {
            name: APPLY_FILTER,
            description: "Apply a standard image filter to the current layer",
            parameters: json!({
                "type": "object",
                "properties": {
                    "filterType": {
                        "type": "string",
                        "enum": filter_kinds
                    },
                    "value": { "type": "number", "description": "Filter intensity value" }
                },
                "required": ["filterType", "value"]
            }),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// Validated tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    GenerateImage {
        prompt: String,
    },
    UpdateLayer {
        opacity: Option<i64>,
        visible: Option<bool>,
        blend_mode: Option<BlendMode>,
    },
    /// Real-time kinds only
    ApplyFilter { kind: FilterKind, value: f32 },
}

#[derive(Deserialize)]
struct GenerateArgs {
    prompt: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UpdateArgs {
    opacity: Option<f64>,
    visible: Option<bool>,
    #[serde(alias = "blend_mode")]
    blend_mode: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterArgs {
    #[serde(alias = "filter_type", alias = "type")]
    filter_type: String,
    value: f64,
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::GenerateImage { .. } => GENERATE_IMAGE,
            ToolCall::UpdateLayer { .. } => UPDATE_LAYER,
            ToolCall::ApplyFilter { .. } => APPLY_FILTER,
        }
    }

    /// Coerce a raw call into a typed variant
    pub fn parse(raw: &RawToolCall) -> Result<Self, ToolCallError> {
        let invalid = |reason: String| ToolCallError::InvalidArguments {
            tool: raw.name.clone(),
            reason,
        };
        // Missing argument objects count as empty
        let args = if raw.args.is_null() { json!({}) } else { raw.args.clone() };

        match raw.name.as_str() {
            GENERATE_IMAGE => {
                let args: GenerateArgs =
                    serde_json::from_value(args).map_err(|e| invalid(e.to_string()))?;
                Ok(ToolCall::GenerateImage {
                    prompt: args.prompt,
                })
            }
            UPDATE_LAYER => {
                let args: UpdateArgs =
                    serde_json::from_value(args).map_err(|e| invalid(e.to_string()))?;
                let opacity = match args.opacity {
                    Some(v) if !v.is_finite() => {
                        return Err(invalid(format!("opacity {} is not a number", v)))
                    }
                    Some(v) => Some(v.round() as i64),
                    None => None,
                };
                let blend_mode = args
                    .blend_mode
                    .map(|mode| mode.parse::<BlendMode>())
                    .transpose()
                    .map_err(|e| invalid(e.to_string()))?;
                Ok(ToolCall::UpdateLayer {
                    opacity,
                    visible: args.visible,
                    blend_mode,
                })
            }
            APPLY_FILTER => {
                let args: FilterArgs =
                    serde_json::from_value(args).map_err(|e| invalid(e.to_string()))?;
                let kind = args
                    .filter_type
                    .parse::<FilterKind>()
                    .map_err(|e| invalid(e.to_string()))?;
                if kind.is_baked() {
                    return Err(invalid(format!("{} cannot be applied as a filter", kind)));
                }
                if !args.value.is_finite() {
                    return Err(invalid(format!("value {} is not a number", args.value)));
                }
                Ok(ToolCall::ApplyFilter {
                    kind,
                    value: args.value as f32,
                })
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }

    /// Layer patch for `UpdateLayer`
    pub fn layer_patch(&self) -> Option<LayerPatch> {
        match self {
            ToolCall::UpdateLayer {
                opacity,
                visible,
                blend_mode,
            } => {
                let mut patch = LayerPatch::new();
                if let Some(opacity) = opacity {
                    patch = patch.opacity(*opacity);
                }
                if let Some(visible) = visible {
                    patch = patch.visible(*visible);
                }
                if let Some(mode) = blend_mode {
                    patch = patch.blend_mode(*mode);
                }
                Some(patch)
            }
            _ => None,
        }
    }
}
