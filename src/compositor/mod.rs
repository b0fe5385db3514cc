//! Compositor Module
//!
//! Renders the layer sequence bottom to top onto an opaque canvas.
//!
//! - `blend`: per-pixel blend operators
//! - `filters`: real-time filter operators
//! - `render`: the render pass and the live canvas observer
//! - `export`: raster encoders

pub mod blend;
pub mod export;
pub mod filters;
mod render;

pub use export::{encode, export_to_file, raster_digest, ExportFormat};
pub use filters::{apply_chain, FilterOp};
pub use render::{
    parse_hex_color, to_hex_color, CanvasSize, Compositor, DrawOp, LiveCanvas, DEFAULT_BACKGROUND,
    MAX_CANVAS_SIDE,
};
