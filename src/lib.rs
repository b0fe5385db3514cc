//! Diffusion Studio - Layered Image Compositing Core
//!
//! A headless image editor core with two ways of working on a picture:
//! 1. Manual layer controls - opacity, blend modes and real-time filters
//! 2. AI actions - generation, transforms, smart repair and a tool-calling chat
//!
//! # Architecture
//!
//! - `layers`: the ordered layer store, the single source of truth
//! - `compositor`: pure rendering of the store into one raster
//! - `neural`: generation, analysis and prompt collaborators
//! - `agent`: the action orchestrator and the chat bridge
//! - `state`: profile, action log and the editor session

pub mod agent;
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod layers;
pub mod neural;
pub mod state;

pub use config::StudioConfig;
pub use error::{Result, StudioError};
pub use state::EditorSession;
