//! Prompt-building pipeline
//!
//! Every generation request goes through the same ordered stages:
//!
//! 1. `Base` - the caller's prompt, trimmed; empty is rejected
//! 2. `ContextInjection` - with an auto-applying profile, append
//!    `. (Creative Context: <philosophy>)` and then `, <styles>`
//! 3. `NegativeFold` - explicit negative plus the profile's avoid list,
//!    appended to the prompt as ` --no <negative>` when non-empty

use std::fmt;

use crate::error::{Result, StudioError};
use crate::state::TrainingProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStage {
    Base,
    ContextInjection,
    NegativeFold,
}

impl PromptStage {
    /// Execution order
    pub const ORDER: [PromptStage; 3] = [
        PromptStage::Base,
        PromptStage::ContextInjection,
        PromptStage::NegativeFold,
    ];
}

impl fmt::Display for PromptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptStage::Base => write!(f, "base"),
            PromptStage::ContextInjection => write!(f, "context-injection"),
            PromptStage::NegativeFold => write!(f, "negative-fold"),
        }
    }
}

/// Output of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    /// Prompt with context and `--no` clause folded in
    pub prompt: String,
    /// Combined negative text, empty when there is none
    pub negative: String,
}

#[derive(Debug, Clone, Default)]
pub struct PromptPipeline<'a> {
    base: &'a str,
    negative: &'a str,
    profile: Option<&'a TrainingProfile>,
}

impl<'a> PromptPipeline<'a> {
    pub fn new(base: &'a str) -> Self {
        Self {
            base,
            negative: "",
            profile: None,
        }
    }

    pub fn negative(mut self, negative: &'a str) -> Self {
        self.negative = negative;
        self
    }

    /// Profiles without `auto_apply` are ignored
    pub fn profile(mut self, profile: Option<&'a TrainingProfile>) -> Self {
        self.profile = profile.filter(|p| p.auto_apply);
        self
    }

    pub fn build(&self) -> Result<BuiltPrompt> {
        let mut prompt = String::new();
        let mut negative = String::new();
        for stage in PromptStage::ORDER {
            match stage {
                PromptStage::Base => prompt = self.base_stage()?,
                PromptStage::ContextInjection => self.inject_context(&mut prompt),
                PromptStage::NegativeFold => negative = self.fold_negative(&mut prompt),
            }
        }
        Ok(BuiltPrompt { prompt, negative })
    }

    fn base_stage(&self) -> Result<String> {
        let base = self.base.trim();
        if base.is_empty() {
            return Err(StudioError::EmptyPrompt);
        }
        Ok(base.to_string())
    }

    fn inject_context(&self, prompt: &mut String) {
        let Some(profile) = self.profile else {
            return;
        };
        let philosophy = profile.imagination_road.trim();
        if !philosophy.is_empty() {
            prompt.push_str(&format!(". (Creative Context: {})", philosophy));
        }
        let styles = profile.preferred_styles.trim();
        if !styles.is_empty() {
            prompt.push_str(&format!(", {}", styles));
        }
    }

    fn fold_negative(&self, prompt: &mut String) -> String {
        let mut negative = self.negative.trim().to_string();
        if let Some(profile) = self.profile {
            let avoid = profile.avoid_elements.trim();
            if !avoid.is_empty() {
                if !negative.is_empty() {
                    negative.push(' ');
                }
                negative.push_str(avoid);
            }
        }
        if !negative.is_empty() {
            prompt.push_str(&format!(" --no {}", negative));
        }
        negative
    }
}
