//! Training profile persistence
//!
//! The profile is user-authored personalization: a creative philosophy,
//! preferred style keywords and elements to avoid. It is loaded once at
//! startup and written only on an explicit save.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, StudioError};

/// Default file name of the persisted profile
pub const PROFILE_FILE: &str = "diffusion_training_profile.json";

/// Personalization context injected into generation and chat requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainingProfile {
    /// Free-text creative philosophy
    pub imagination_road: String,
    /// Keywords appended to every prompt
    pub preferred_styles: String,
    /// Global negative keywords
    pub avoid_elements: String,
    /// Inject this profile into every request
    pub auto_apply: bool,
}

impl Default for TrainingProfile {
    fn default() -> Self {
        Self {
            imagination_road: String::new(),
            preferred_styles: String::new(),
            avoid_elements: String::new(),
            auto_apply: true,
        }
    }
}

impl TrainingProfile {
    /// The profile to hand to collaborators, if it is active
    pub fn active(&self) -> Option<&TrainingProfile> {
        self.auto_apply.then_some(self)
    }

    pub fn is_blank(&self) -> bool {
        self.imagination_road.trim().is_empty()
            && self.preferred_styles.trim().is_empty()
            && self.avoid_elements.trim().is_empty()
    }

    /// Personalization block forwarded to the conversational model
    pub fn personalization_block(&self) -> String {
        format!(
            "USER PERSONALIZATION MODULE (Training Data):\n\
             - Imagination Road: \"{}\"\n\
             - Styles: \"{}\"\n\
             - Dislikes: \"{}\"",
            self.imagination_road, self.preferred_styles, self.avoid_elements
        )
    }
}

/// Opaque load/store of the profile record
pub trait ProfileStore {
    /// Saved profile, or the default one when nothing was saved yet
    fn load(&self) -> Result<TrainingProfile>;

    fn save(&self, profile: &TrainingProfile) -> Result<()>;
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self) -> Result<TrainingProfile> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no saved training profile, using defaults");
            return Ok(TrainingProfile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, profile: &TrainingProfile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(profile)?;
        fs::write(&self.path, content)?;
        info!(path = %self.path.display(), "training profile saved");
        Ok(())
    }
}

/// In-process store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    saved: Mutex<Option<TrainingProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: TrainingProfile) -> Self {
        Self {
            saved: Mutex::new(Some(profile)),
        }
    }

    pub fn saved(&self) -> Option<TrainingProfile> {
        self.slot().ok().and_then(|saved| saved.clone())
    }

    fn slot(&self) -> Result<MutexGuard<'_, Option<TrainingProfile>>> {
        self.saved.lock().map_err(|_| {
            StudioError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "in-memory profile store lock poisoned",
            ))
        })
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self) -> Result<TrainingProfile> {
        Ok(self.slot()?.clone().unwrap_or_default())
    }

    fn save(&self, profile: &TrainingProfile) -> Result<()> {
        *self.slot()? = Some(profile.clone());
        Ok(())
    }
}
