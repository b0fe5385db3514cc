//! Mutable editor state shared by the orchestrator and the chat bridge

use crate::layers::LayerStore;

use super::history::ActionLog;

/// Layer store plus the action log that records what changed it
#[derive(Debug, Default)]
pub struct Workspace {
    pub layers: LayerStore,
    pub log: ActionLog,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }
}
