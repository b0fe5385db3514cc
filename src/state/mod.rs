//! State Management Module
//!
//! Provides the training profile and its persistence, the action log,
//! the workspace pair and the editor session that owns them.

mod history;
mod profile;
mod session;
mod workspace;

pub use history::{ActionEntry, ActionKind, ActionLog, MAX_LOG_ENTRIES};
pub use profile::{JsonProfileStore, MemoryProfileStore, ProfileStore, TrainingProfile, PROFILE_FILE};
pub use session::EditorSession;
pub use workspace::Workspace;
