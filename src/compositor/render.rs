//! Full-redraw compositing of a layer sequence

use std::fmt;
use std::str::FromStr;

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::blend::blend_pixel;
use super::filters::apply_chain;
use crate::error::{Result, StudioError};
use crate::layers::{BlendMode, Layer, LayerId, LayerObserver};

/// Fixed opaque canvas background (`#0f172a`)
pub const DEFAULT_BACKGROUND: Rgba<u8> = Rgba([15, 23, 42, 255]);

/// Largest accepted canvas side in pixels
pub const MAX_CANVAS_SIDE: u32 = 8192;

/// Canvas dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// Size with both sides in `1..=MAX_CANVAS_SIDE`
    pub fn validated(width: u32, height: u32) -> Result<Self> {
        let in_range = |side: u32| (1..=MAX_CANVAS_SIDE).contains(&side);
        if !in_range(width) || !in_range(height) {
            return Err(StudioError::InvalidParameter {
                param: "canvasSize".to_string(),
                value: format!("{}x{}", width, height),
                expected: format!("sides between 1 and {}", MAX_CANVAS_SIDE),
            });
        }
        Ok(Self::new(width, height))
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self::square(1024)
    }
}

impl fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for CanvasSize {
    type Err = StudioError;

    /// Accepts `1024` or `800x600`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StudioError::InvalidParameter {
            param: "canvasSize".to_string(),
            value: s.to_string(),
            expected: "<side> or <width>x<height>".to_string(),
        };
        let parse = |v: &str| v.trim().parse::<u32>().map_err(|_| invalid());

        let (width, height) = match s.split_once(['x', 'X']) {
            Some((w, h)) => (parse(w)?, parse(h)?),
            None => {
                let side = parse(s)?;
                (side, side)
            }
        };
        Self::validated(width, height)
    }
}

/// Parse `#rrggbb` / `#rrggbbaa` (leading `#` optional)
pub fn parse_hex_color(text: &str) -> Result<Rgba<u8>> {
    let hex = text.trim().trim_start_matches('#');
    let invalid = || StudioError::Config {
        reason: format!("invalid colour '{}', expected #rrggbb", text),
    };
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

pub fn to_hex_color(color: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// One paint step of a render pass, as the canvas would receive it
#[derive(Debug, Clone, PartialEq)]
pub struct DrawOp {
    pub layer_id: LayerId,
    pub blend_mode: BlendMode,
    /// `source-over` for normal, otherwise the blend mode name
    pub operation: &'static str,
    /// Global alpha, opacity / 100
    pub alpha: f32,
    /// Combined real-time filter string, `none` when empty
    pub filter: String,
}

/// Stateless renderer from a layer sequence to a flattened raster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compositor {
    size: CanvasSize,
    background: Rgba<u8>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(CanvasSize::default(), DEFAULT_BACKGROUND)
    }
}

impl Compositor {
    pub fn new(size: CanvasSize, background: Rgba<u8>) -> Self {
        // The canvas is never transparent
        let background = Rgba([background[0], background[1], background[2], 255]);
        Self { size, background }
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn background(&self) -> Rgba<u8> {
        self.background
    }

    /// Paint steps for the paintable layers, bottom to top
    pub fn plan(&self, layers: &[Layer]) -> Vec<DrawOp> {
        layers
            .iter()
            .filter(|layer| layer.is_paintable())
            .map(|layer| DrawOp {
                layer_id: layer.id().clone(),
                blend_mode: layer.blend_mode,
                operation: layer.blend_mode.composite_operation(),
                alpha: layer.opacity().alpha(),
                filter: layer.filters.css_string(),
            })
            .collect()
    }

    /// Render the full composition
    ///
    /// Hidden layers and layers without image data are skipped. A layer
    /// whose payload does not decode paints nothing.
    pub fn render(&self, layers: &[Layer]) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(self.size.width, self.size.height, self.background);

        for (index, layer) in layers.iter().enumerate() {
            if !layer.is_paintable() {
                continue;
            }
            let Some(source) = self.rasterize(layer) else {
                continue;
            };
            debug!(
                index,
                layer = %layer.id(),
                mode = layer.blend_mode.as_str(),
                opacity = layer.opacity().percent(),
                "painting layer"
            );
            paint(&mut canvas, &source, layer.blend_mode, layer.opacity().alpha());
        }

        canvas
    }

    /// Decode, scale to the full canvas and run the real-time filters
    fn rasterize(&self, layer: &Layer) -> Option<RgbaImage> {
        let image = layer.image.as_ref()?;
        let decoded = match image.decode() {
            Ok(decoded) => decoded.to_rgba8(),
            Err(e) => {
                debug!(layer = %layer.id(), error = %e, "layer image not decodable, skipping");
                return None;
            }
        };

        let mut scaled = if decoded.dimensions() == (self.size.width, self.size.height) {
            decoded
        } else {
            imageops::resize(&decoded, self.size.width, self.size.height, FilterType::Triangle)
        };
        apply_chain(&mut scaled, &layer.filters);
        Some(scaled)
    }
}

fn paint(canvas: &mut RgbaImage, source: &RgbaImage, mode: BlendMode, alpha: f32) {
    let dst: &mut [u8] = canvas;
    let src: &[u8] = source;
    dst.par_chunks_mut(4)
        .zip(src.par_chunks(4))
        .for_each(|(base, top)| {
            let out = blend_pixel(
                Rgba([base[0], base[1], base[2], base[3]]),
                Rgba([top[0], top[1], top[2], top[3]]),
                mode,
                alpha,
            );
            base.copy_from_slice(&out.0);
        });
}

/// Compositor-backed layer observer holding the latest frame
///
/// Redraws the whole canvas on every notification.
#[derive(Debug)]
pub struct LiveCanvas {
    compositor: Compositor,
    frame: RgbaImage,
    revision: u64,
    renders: usize,
}

impl LiveCanvas {
    pub fn new(compositor: Compositor) -> Self {
        let frame = compositor.render(&[]);
        Self {
            compositor,
            frame,
            revision: 0,
            renders: 0,
        }
    }

    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    /// Store revision of the current frame
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of redraws triggered by notifications
    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }
}

impl LayerObserver for LiveCanvas {
    fn layers_changed(&mut self, layers: &[Layer], revision: u64) {
        self.frame = self.compositor.render(layers);
        self.revision = revision;
        self.renders += 1;
    }
}
