//! Layer Model Module
//!
//! - `layer`: layer data, blend modes, opacity and encoded payloads
//! - `filter`: ordered per-layer filter chains (real-time and baked)
//! - `store`: the ordered layer sequence, selection and mutations
//! - `observer`: "layers changed" notification

mod filter;
mod layer;
mod observer;
mod store;

pub use filter::{Filter, FilterChain, FilterKind, FilterSpec, REALTIME_FILTERS};
pub use layer::{BlendMode, EncodedImage, Layer, LayerId, LayerPatch, Opacity};
pub use observer::LayerObserver;
pub use store::{LayerStore, MoveDirection, MERGED_LAYER_NAME};
