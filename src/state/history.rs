//! Action log
//!
//! Capped audit trail of user and AI actions, newest first. Purely
//! observational: nothing reads it back to decide behavior.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of entries kept
pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Generation,
    Edit,
    Chat,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Generation => write!(f, "generation"),
            ActionKind::Edit => write!(f, "edit"),
            ActionKind::Chat => write!(f, "chat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub id: String,
    pub kind: ActionKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    entries: VecDeque<ActionEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an action, dropping the oldest past the cap
    pub fn record(&mut self, kind: ActionKind, description: impl Into<String>) {
        self.entries.push_front(ActionEntry {
            id: Uuid::new_v4().simple().to_string(),
            kind,
            description: description.into(),
            timestamp: Utc::now(),
        });
        self.entries.truncate(MAX_LOG_ENTRIES);
    }

    /// Newest first
    pub fn entries(&self) -> impl Iterator<Item = &ActionEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ActionEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
