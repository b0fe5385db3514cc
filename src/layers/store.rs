//! Layer Store
//!
//! Owns the ordered layer sequence and the selection cursor. Array
//! position encodes stacking order: index 0 is the bottom-most layer,
//! the last index is painted last (visually in front).
//!
//! Every effective mutation bumps the store revision and notifies the
//! subscribed observers synchronously. No-op calls (unknown id, boundary
//! moves, empty patches) notify nobody.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::filter::Filter;
use super::layer::{BlendMode, EncodedImage, Layer, LayerId, LayerPatch};
use super::observer::LayerObserver;
use crate::compositor::Compositor;
use crate::error::{Result, StudioError};

/// Name given to the flattened layer produced by `merge_visible`
pub const MERGED_LAYER_NAME: &str = "Merged Composition";

/// Direction for swapping a layer with its stack neighbour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    /// Towards the top of the stack (higher index)
    Up,
    /// Towards the bottom of the stack (lower index)
    Down,
}

impl FromStr for MoveDirection {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(MoveDirection::Up),
            "down" => Ok(MoveDirection::Down),
            other => Err(StudioError::InvalidParameter {
                param: "direction".to_string(),
                value: other.to_string(),
                expected: "up or down".to_string(),
            }),
        }
    }
}

/// Ordered layer sequence plus selection
#[derive(Default)]
pub struct LayerStore {
    layers: Vec<Layer>,
    selected: Option<LayerId>,
    revision: u64,
    observers: Vec<Box<dyn LayerObserver>>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for "layers changed" notifications
    pub fn subscribe(&mut self, observer: Box<dyn LayerObserver>) {
        self.observers.push(observer);
    }

    /// Monotonic counter of effective mutations
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn index_of(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    pub fn selected_id(&self) -> Option<&LayerId> {
        self.selected.as_ref()
    }

    /// The selected layer, re-fetched from the current sequence
    pub fn selected(&self) -> Option<&Layer> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    /// Select a layer; unknown ids clear the selection
    pub fn select(&mut self, id: Option<&LayerId>) {
        self.selected = id.filter(|id| self.get(id).is_some()).cloned();
    }

    /// Append a new top layer and select it
    pub fn add_layer(
        &mut self,
        image: EncodedImage,
        name: impl Into<String>,
        blend_mode: BlendMode,
        action_prompt: impl Into<String>,
    ) -> LayerId {
        let layer = Layer::new(Some(image), name)
            .with_blend_mode(blend_mode)
            .with_action_prompt(action_prompt);
        self.push_layer(layer)
    }

    /// Append a fully built layer on top and select it
    pub fn push_layer(&mut self, layer: Layer) -> LayerId {
        let id = layer.id().clone();
        debug!(layer = %id, name = %layer.name, "adding layer");
        self.layers.push(layer);
        self.selected = Some(id.clone());
        self.commit();
        id
    }

    /// Shallow-merge fields into a layer
    ///
    /// # Returns
    /// false (and no notification) if the id is absent or the patch is empty
    pub fn update_layer(&mut self, id: &LayerId, patch: LayerPatch) -> bool {
        let Some(layer) = self.layers.iter_mut().find(|l| l.id() == id) else {
            return false;
        };
        if !layer.apply(patch) {
            return false;
        }
        self.commit();
        true
    }

    /// Remove a layer, clearing the selection if it was selected
    pub fn delete_layer(&mut self, id: &LayerId) -> Option<Layer> {
        let index = self.index_of(id)?;
        let removed = self.layers.remove(index);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.commit();
        Some(removed)
    }

    /// Swap a layer with its neighbour. Moving the top layer up or the
    /// bottom layer down is a silent no-op.
    ///
    /// # Returns
    /// true if the sequence changed
    pub fn move_layer(&mut self, id: &LayerId, direction: MoveDirection) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let neighbour = match direction {
            MoveDirection::Up if index + 1 < self.layers.len() => index + 1,
            MoveDirection::Down if index > 0 => index - 1,
            _ => return false,
        };
        self.layers.swap(index, neighbour);
        self.commit();
        true
    }

    /// Flatten the current composite into one new top layer
    pub fn merge_visible(&mut self, compositor: &Compositor) -> Result<LayerId> {
        let raster = compositor.render(&self.layers);
        let flat = EncodedImage::from_raster(&raster)?;
        Ok(self.add_layer(flat, MERGED_LAYER_NAME, BlendMode::Normal, ""))
    }

    /// Remove every layer and the selection
    pub fn clear(&mut self) {
        if self.layers.is_empty() && self.selected.is_none() {
            return;
        }
        self.layers.clear();
        self.selected = None;
        self.commit();
    }

    /// Append a filter to a layer's chain
    pub fn add_filter(&mut self, id: &LayerId, filter: Filter) -> Option<String> {
        let layer = self.layers.iter_mut().find(|l| l.id() == id)?;
        let filter_id = layer.filters.push(filter);
        self.commit();
        Some(filter_id)
    }

    /// Splice a filter out of a layer's chain by id
    pub fn remove_filter(&mut self, id: &LayerId, filter_id: &str) -> Option<Filter> {
        let layer = self.layers.iter_mut().find(|l| l.id() == id)?;
        let removed = layer.filters.remove(filter_id)?;
        self.commit();
        Some(removed)
    }

    /// Replace only the value of one filter
    pub fn set_filter_value(&mut self, id: &LayerId, filter_id: &str, value: f32) -> bool {
        let Some(layer) = self.layers.iter_mut().find(|l| l.id() == id) else {
            return false;
        };
        if !layer.filters.set_value(filter_id, value) {
            return false;
        }
        self.commit();
        true
    }

    /// One line per layer, bottom first, followed by the selection
    pub fn describe(&self) -> String {
        let mut lines: Vec<String> = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| {
                format!(
                    "Layer {}: {} (ID: {}, Visible: {}, Opacity: {}%)",
                    i,
                    l.name,
                    l.id(),
                    l.visible,
                    l.opacity().percent()
                )
            })
            .collect();
        lines.push(format!(
            "Selected Layer ID: {}",
            self.selected
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "None".to_string())
        ));
        lines.join("\n")
    }

    fn commit(&mut self) {
        self.revision += 1;
        for observer in &mut self.observers {
            observer.layers_changed(&self.layers, self.revision);
        }
    }
}

impl fmt::Debug for LayerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerStore")
            .field("layers", &self.layers)
            .field("selected", &self.selected)
            .field("revision", &self.revision)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::FilterKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn payload() -> EncodedImage {
        EncodedImage::with_mime(vec![0u8; 4], "image/png")
    }

    fn names(store: &LayerStore) -> Vec<&str> {
        store.layers().iter().map(|l| l.name.as_str()).collect()
    }

    #[derive(Default)]
    struct Recorder {
        revisions: Vec<u64>,
    }

    impl LayerObserver for Recorder {
        fn layers_changed(&mut self, _layers: &[Layer], revision: u64) {
            self.revisions.push(revision);
        }
    }

    #[test]
    fn test_add_appends_on_top_and_selects() {
        let mut store = LayerStore::new();
        store.add_layer(payload(), "A", BlendMode::Normal, "");
        let b = store.add_layer(payload(), "B", BlendMode::Multiply, "dusk");

        assert_eq!(names(&store), vec!["A", "B"]);
        assert_eq!(store.selected_id(), Some(&b));
        assert_eq!(store.selected().unwrap().action_prompt, "dusk");
    }

    #[test]
    fn test_ids_are_unique() {
        let mut store = LayerStore::new();
        let ids: Vec<LayerId> = (0..20)
            .map(|i| store.add_layer(payload(), format!("L{}", i), BlendMode::Normal, ""))
            .collect();
        let mut deduped = ids.clone();
        deduped.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_update_missing_id_is_noop() {
        let mut store = LayerStore::new();
        store.add_layer(payload(), "A", BlendMode::Normal, "");
        let before = store.revision();

        assert!(!store.update_layer(&LayerId::from("ghost"), LayerPatch::new().opacity(10)));
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn test_update_clamps_opacity() {
        let mut store = LayerStore::new();
        let id = store.add_layer(payload(), "A", BlendMode::Normal, "");

        store.update_layer(&id, LayerPatch::new().opacity(-40));
        assert_eq!(store.get(&id).unwrap().opacity().percent(), 0);

        store.update_layer(&id, LayerPatch::new().opacity(400));
        assert_eq!(store.get(&id).unwrap().opacity().percent(), 100);
    }

    #[test]
    fn test_move_boundaries_are_noops() {
        let mut store = LayerStore::new();
        let a = store.add_layer(payload(), "A", BlendMode::Normal, "");
        let b = store.add_layer(payload(), "B", BlendMode::Normal, "");
        let before = store.revision();

        assert!(!store.move_layer(&b, MoveDirection::Up));
        assert!(!store.move_layer(&a, MoveDirection::Down));
        assert_eq!(names(&store), vec!["A", "B"]);
        assert_eq!(store.revision(), before);

        assert!(store.move_layer(&a, MoveDirection::Up));
        assert_eq!(names(&store), vec!["B", "A"]);
    }

    #[test]
    fn test_delete_selected_clears_selection() {
        let mut store = LayerStore::new();
        let a = store.add_layer(payload(), "A", BlendMode::Normal, "");
        let b = store.add_layer(payload(), "B", BlendMode::Normal, "");

        store.delete_layer(&a);
        assert_eq!(store.selected_id(), Some(&b));

        store.delete_layer(&b);
        assert_eq!(store.selected_id(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_select_unknown_clears() {
        let mut store = LayerStore::new();
        store.add_layer(payload(), "A", BlendMode::Normal, "");
        store.select(Some(&LayerId::from("nope")));
        assert!(store.selected().is_none());
    }

    #[test]
    fn test_filter_operations() {
        let mut store = LayerStore::new();
        let id = store.add_layer(payload(), "A", BlendMode::Normal, "");

        let blur = store.add_filter(&id, Filter::new(FilterKind::Blur, 3.0)).unwrap();
        store.add_filter(&id, Filter::new(FilterKind::Sepia, 50.0));
        assert!(store.set_filter_value(&id, &blur, 6.0));
        assert_eq!(
            store.get(&id).unwrap().filters.css_string(),
            "blur(6px) sepia(50%)"
        );

        store.remove_filter(&id, &blur);
        assert_eq!(store.get(&id).unwrap().filters.css_string(), "sepia(50%)");
    }

    #[test]
    fn test_observers_see_every_effective_mutation() {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let mut store = LayerStore::new();
        store.subscribe(Box::new(recorder.clone()));

        let id = store.add_layer(payload(), "A", BlendMode::Normal, "");
        store.update_layer(&id, LayerPatch::new().visible(false));
        store.move_layer(&id, MoveDirection::Up);
        store.delete_layer(&id);

        assert_eq!(recorder.borrow().revisions, vec![1, 2, 3]);
    }

    #[test]
    fn test_describe_lists_layers_and_selection() {
        let mut store = LayerStore::new();
        let id = store.add_layer(payload(), "Sky", BlendMode::Normal, "");
        store.update_layer(&id, LayerPatch::new().opacity(40));

        let text = store.describe();
        assert!(text.starts_with(&format!(
            "Layer 0: Sky (ID: {}, Visible: true, Opacity: 40%)",
            id
        )));
        assert!(text.ends_with(&format!("Selected Layer ID: {}", id)));

        store.clear();
        assert_eq!(store.describe(), "Selected Layer ID: None");
    }
}
