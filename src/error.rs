//! Error handling for Diffusion Studio
//!
//! Every error carries a stable code, a recoverability hint and
//! user-facing recovery suggestions.

use thiserror::Error;

/// Result type alias for Diffusion Studio operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Main error type for Diffusion Studio operations
#[derive(Error, Debug)]
pub enum StudioError {
    // Validation Errors (raised before any external call)
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("No layer selected")]
    NoLayerSelected,

    #[error("Invalid parameter '{param}': got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Precondition Errors
    #[error("Authorization required for the {tier} model tier")]
    AuthRequired { tier: String },

    #[error("Another generation is already in progress")]
    Busy,

    // External Collaborator Errors
    #[error("{service} call failed: {message}")]
    ExternalCall { service: String, message: String },

    // Image Payload Errors
    #[error("Could not decode image: {reason}")]
    Decode { reason: String },

    #[error("Could not encode image: {reason}")]
    Encode { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl StudioError {
    /// Shorthand for a failed generation/analysis/conversation call
    pub fn external(service: &str, message: impl Into<String>) -> Self {
        StudioError::ExternalCall {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            StudioError::EmptyPrompt => "EMPTY_PROMPT",
            StudioError::NoLayerSelected => "NO_LAYER_SELECTED",
            StudioError::InvalidParameter { .. } => "INVALID_PARAMETER",
            StudioError::AuthRequired { .. } => "AUTH_REQUIRED",
            StudioError::Busy => "BUSY",
            StudioError::ExternalCall { .. } => "EXTERNAL_CALL_FAILED",
            StudioError::Decode { .. } => "DECODE_ERROR",
            StudioError::Encode { .. } => "ENCODE_ERROR",
            StudioError::Config { .. } => "CONFIG_ERROR",
            StudioError::Io(_) => "IO_ERROR",
            StudioError::Serialization(_) => "SERIALIZATION_ERROR",
            StudioError::Image(_) => "IMAGE_ERROR",
        }
    }

    /// Errors rejected before any collaborator was contacted
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StudioError::EmptyPrompt
                | StudioError::NoLayerSelected
                | StudioError::InvalidParameter { .. }
        )
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            StudioError::EmptyPrompt => true,
            StudioError::NoLayerSelected => true,
            StudioError::InvalidParameter { .. } => true,
            StudioError::AuthRequired { .. } => true,
            StudioError::Busy => true,
            StudioError::ExternalCall { .. } => true,
            StudioError::Decode { .. } => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StudioError::EmptyPrompt => vec![
                "Describe the image you want to create",
                "Pick one of the material or style presets",
            ],
            StudioError::NoLayerSelected => vec![
                "Select a layer in the layer panel first",
                "Upload or generate an image to create a layer",
            ],
            StudioError::AuthRequired { .. } => vec![
                "Select an API key for the Pro model",
                "Switch to the Fast model tier",
            ],
            StudioError::Busy => vec!["Wait for the current generation to finish"],
            StudioError::ExternalCall { .. } => vec![
                "Check your network connection",
                "Try again with a simpler prompt",
                "Switch to a different model tier",
            ],
            StudioError::Decode { .. } => vec![
                "Re-export the image as PNG or JPEG",
                "The file may be corrupted - try uploading it again",
            ],
            StudioError::Config { .. } => vec![
                "Check the configuration file and environment variables",
                "Custom models need an endpoint URL (e.g. http://127.0.0.1:7860/sdapi/v1/txt2img)",
            ],
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            StudioError::EmptyPrompt => "Type a prompt first, then hit generate.".to_string(),
            StudioError::NoLayerSelected => {
                "Pick a layer to work on - nothing is selected right now.".to_string()
            }
            StudioError::AuthRequired { tier } => {
                format!("The {} model needs an API key before it can run.", tier)
            }
            StudioError::ExternalCall { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }
}
