//! JSON scene files used by `render` and `inspect`
//!
//! ```json
//! {
//!   "width": 512, "height": 512, "background": "#0f172a",
//!   "layers": [
//!     { "name": "base", "image": "photo.png" },
//!     { "image": "texture.png", "blend_mode": "multiply", "opacity": 60,
//!       "filters": [{ "kind": "blur", "value": 4 }] }
//!   ]
//! }
//! ```
//!
//! Image paths are resolved relative to the scene file; `data:` URLs are
//! accepted inline. Layers are listed bottom first.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compositor::{parse_hex_color, CanvasSize, Compositor};
use crate::config::StudioConfig;
use crate::error::Result;
use crate::layers::{
    BlendMode, EncodedImage, Filter, FilterChain, FilterKind, Layer, LayerStore, Opacity,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub layers: Vec<SceneLayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneLayer {
    #[serde(default)]
    pub name: Option<String>,
    /// File path or data URL
    pub image: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: i64,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default)]
    pub filters: Vec<SceneFilter>,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFilter {
    pub kind: FilterKind,
    pub value: f32,
}

fn default_visible() -> bool {
    true
}

fn default_opacity() -> i64 {
    100
}

/// A loaded scene and the directory its image paths are relative to
#[derive(Debug, Clone)]
pub struct SceneFile {
    pub scene: Scene,
    pub base_dir: PathBuf,
}

impl SceneFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let scene: Scene = serde_json::from_str(&content)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self { scene, base_dir })
    }

    /// Canvas from the scene, falling back to the config for missing fields
    pub fn compositor(&self, config: &StudioConfig) -> Result<Compositor> {
        let size = CanvasSize::validated(
            self.scene.width.unwrap_or(config.canvas_width),
            self.scene.height.unwrap_or(config.canvas_height),
        )?;
        let background =
            parse_hex_color(self.scene.background.as_deref().unwrap_or(&config.background))?;
        Ok(Compositor::new(size, background))
    }

    /// Populate a store, bottom layer first
    pub fn build_store(&self) -> Result<LayerStore> {
        let mut store = LayerStore::new();
        for (index, entry) in self.scene.layers.iter().enumerate() {
            let image = self.load_image(&entry.image)?;
            let name = entry
                .name
                .clone()
                .unwrap_or_else(|| format!("Layer {}", index + 1));

            let mut filters = FilterChain::new();
            for filter in &entry.filters {
                filters.push(Filter::new(filter.kind, filter.value));
            }

            let mut layer = Layer::new(Some(image), name)
                .with_blend_mode(entry.blend_mode)
                .with_opacity(Opacity::new(entry.opacity))
                .with_action_prompt(entry.prompt.clone())
                .with_filters(filters);
            layer.visible = entry.visible;
            store.push_layer(layer);
        }
        Ok(store)
    }

    fn load_image(&self, source: &str) -> Result<EncodedImage> {
        if source.starts_with("data:") {
            return EncodedImage::from_data_url(source);
        }
        let bytes = fs::read(self.base_dir.join(source))?;
        Ok(EncodedImage::from_bytes(bytes))
    }
}
