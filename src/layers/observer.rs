//! "Layers changed" notification

use std::cell::RefCell;
use std::rc::Rc;

use super::layer::Layer;

/// Subscriber notified synchronously after every effective store mutation
pub trait LayerObserver {
    /// Called with the full, already-mutated layer sequence
    fn layers_changed(&mut self, layers: &[Layer], revision: u64);
}

impl<T: LayerObserver> LayerObserver for Rc<RefCell<T>> {
    fn layers_changed(&mut self, layers: &[Layer], revision: u64) {
        self.borrow_mut().layers_changed(layers, revision);
    }
}
