//! AI Action Orchestrator
//!
//! Sequences calls to the generation and analysis collaborators for
//! direct generation, material generation, transform / compose and the
//! two-pass smart repair. Results are written back through the layer
//! store; the layer is always re-fetched by id after a collaborator call.
//!
//! At most one generation or analysis call runs at a time. The busy flag
//! is raised by a guard that lowers it on drop, so every exit path
//! (success, error, early return) resets it.

use std::cell::{Cell, RefCell};
use std::env;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, StudioError};
use crate::layers::{BlendMode, EncodedImage, Filter, LayerId, LayerPatch, LayerStore};
use crate::neural::{
    AspectRatio, GenerationParams, ImageAnalyzer, ImageGenerator, ModelTier, PromptAnalysis,
    PromptInspector, PromptPipeline,
};
use crate::state::{ActionKind, TrainingProfile, Workspace};

/// First repair pass strength
pub const REPAIR_STRENGTH: f32 = 0.65;
/// Second, refining repair pass strength
pub const REFINE_STRENGTH: f32 = 0.5;
/// Repair prompt when the analyzer fails
pub const ANALYSIS_FALLBACK: &str = "high quality, restored image";
/// Repair prompt when the analyzer returns nothing
pub const ANALYSIS_BLANK_FALLBACK: &str = "high quality, sharp focus, denoised, color corrected";

/// Named prompt from a preset catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub id: &'static str,
    pub label: &'static str,
    pub prompt: &'static str,
}

/// Texture overlays for material generation
pub const MATERIAL_PRESETS: [Preset; 10] = [
    Preset { id: "marble", label: "White Marble", prompt: "seamless white marble texture, high detail, polished stone" },
    Preset { id: "granite", label: "Granite", prompt: "seamless black granite stone texture, speckled" },
    Preset { id: "gold", label: "Metallic Gold", prompt: "seamless brushed gold metal texture, shiny, reflection" },
    Preset { id: "rust", label: "Rusted Metal", prompt: "seamless rusted iron texture, corrosion, orange and brown" },
    Preset { id: "wood", label: "Dark Wood", prompt: "seamless dark oak wood grain texture, polished" },
    Preset { id: "crackle", label: "Crackle Paint", prompt: "seamless crackle paint texture, old wall, peeling paint" },
    Preset { id: "fabric", label: "Canvas Fabric", prompt: "seamless rough canvas fabric texture, beige" },
    Preset { id: "carbon", label: "Carbon Fiber", prompt: "seamless carbon fiber texture, black pattern" },
    Preset { id: "glass", label: "Crystal / Glass", prompt: "seamless crystal glass texture, refraction, geometric" },
    Preset { id: "noise", label: "Digital Noise", prompt: "grayscale static noise texture, film grain, seamless" },
];

/// Style instructions for image-to-image transforms
pub const STYLE_PRESETS: [Preset; 8] = [
    Preset { id: "smudge", label: "Smudge / Oil", prompt: "transform into an oil painting with heavy smudging and brush strokes" },
    Preset { id: "sketch", label: "Carbon Pencil", prompt: "transform into a rough charcoal pencil sketch, black on white paper" },
    Preset { id: "radiosity", label: "Radiosity", prompt: "add strong global illumination, soft bounced light, radiosity rendering style" },
    Preset { id: "caustics", label: "Caustics", prompt: "add underwater caustic lighting effects, light refraction patterns" },
    Preset { id: "old-sepia", label: "Old Sepia", prompt: "transform into a damaged vintage photograph, scratches, dust, sepia tone" },
    Preset { id: "burn", label: "Burn / Scorch", prompt: "add burnt edges, scorching marks, fire damage effect" },
    Preset { id: "crackle-eff", label: "Crackle Effect", prompt: "add heavy surface cracking, dried earth texture overlay" },
    Preset { id: "bw", label: "Noir B&W", prompt: "transform into film noir style, high contrast black and white" },
];

pub fn find_preset(presets: &'static [Preset], id: &str) -> Option<&'static Preset> {
    presets.iter().find(|preset| preset.id == id)
}

/// Precondition consulted before an action starts
pub trait AuthGate: Send + Sync {
    fn authorize(&self, tier: ModelTier) -> bool;
}

/// Gate that lets everything through
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthGate for AllowAll {
    fn authorize(&self, _tier: ModelTier) -> bool {
        true
    }
}

/// Requires an API key for the pro tier
#[derive(Debug, Clone, Default)]
pub struct ApiKeyGate {
    key: Option<String>,
}

impl ApiKeyGate {
    pub const ENV_VAR: &'static str = "STUDIO_API_KEY";

    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env::var(Self::ENV_VAR).ok())
    }
}

impl AuthGate for ApiKeyGate {
    fn authorize(&self, tier: ModelTier) -> bool {
        tier != ModelTier::Pro || self.key.is_some()
    }
}

/// Where a transform result goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// Replace the selected layer's pixels and append an `ai-style` marker
    InPlace,
    /// Add the result as a new layer, keeping the original
    ComposeNew,
}

/// User-facing generation settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model_tier: ModelTier,
    pub aspect_ratio: AspectRatio,
    /// Explicit negative prompt for direct generation
    pub negative_prompt: String,
    /// Endpoint used by the custom tier
    pub custom_endpoint: Option<String>,
}

impl GenerationSettings {
    /// Tier for image-to-image work
    pub fn image_tier(&self) -> ModelTier {
        match self.model_tier {
            ModelTier::Custom => ModelTier::Custom,
            _ => ModelTier::Pro,
        }
    }

    /// Tier for material textures
    pub fn material_tier(&self) -> ModelTier {
        match self.model_tier {
            ModelTier::Custom => ModelTier::Custom,
            _ => ModelTier::Fast,
        }
    }

    /// Endpoint override for a tier; the custom tier requires one
    pub fn endpoint_for(&self, tier: ModelTier) -> Result<Option<String>> {
        if tier != ModelTier::Custom {
            return Ok(None);
        }
        match self.custom_endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => Ok(Some(endpoint.to_string())),
            _ => Err(StudioError::Config {
                reason: "Custom Endpoint URL is required for Open Source models".to_string(),
            }),
        }
    }
}

/// Outcome of a smart repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairReport {
    NoLayerSelected,
    AuthFailed,
    /// The message is also stored as the orchestrator's last error
    Failed(String),
    Repaired {
        /// Last analysis text applied
        analysis: String,
        passes: u8,
    },
}

impl RepairReport {
    /// Display text; anything but `Repaired` is a sentinel, not a prompt
    pub fn text(&self) -> &str {
        match self {
            RepairReport::NoLayerSelected => "No layer selected",
            RepairReport::AuthFailed => "Auth failed",
            RepairReport::Failed(_) => "Repair failed",
            RepairReport::Repaired { analysis, .. } => analysis,
        }
    }

    pub fn is_repaired(&self) -> bool {
        matches!(self, RepairReport::Repaired { .. })
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Raises a flag for its lifetime
pub(crate) struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> FlagGuard<'a> {
    /// None if the flag is already raised
    pub(crate) fn raise(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Backend routing for one image-to-image pass
struct PassTarget<'p> {
    tier: ModelTier,
    endpoint: Option<String>,
    profile: Option<&'p TrainingProfile>,
}

pub struct AiOrchestrator {
    generator: Arc<dyn ImageGenerator>,
    analyzer: Arc<dyn ImageAnalyzer>,
    inspector: Option<Arc<dyn PromptInspector>>,
    auth: Arc<dyn AuthGate>,
    settings: GenerationSettings,
    generating: Cell<bool>,
    inspecting: Cell<bool>,
    last_error: RefCell<Option<String>>,
}

impl AiOrchestrator {
    pub fn new(generator: Arc<dyn ImageGenerator>, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        Self {
            generator,
            analyzer,
            inspector: None,
            auth: Arc::new(AllowAll),
            settings: GenerationSettings::default(),
            generating: Cell::new(false),
            inspecting: Cell::new(false),
            last_error: RefCell::new(None),
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn PromptInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn with_auth_gate(mut self, auth: Arc<dyn AuthGate>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut GenerationSettings {
        &mut self.settings
    }

    /// A generation or analysis call is in flight
    pub fn is_generating(&self) -> bool {
        self.generating.get()
    }

    pub fn is_inspecting(&self) -> bool {
        self.inspecting.get()
    }

    /// Readable message of the last failed action
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn clear_error(&self) {
        self.last_error.replace(None);
    }

    /// Text-to-image into a new top layer
    pub fn generate(
        &self,
        ws: &mut Workspace,
        prompt: &str,
        profile: Option<&TrainingProfile>,
    ) -> Result<LayerId> {
        self.attempt("generate", || {
            let built = PromptPipeline::new(prompt)
                .negative(&self.settings.negative_prompt)
                .profile(profile)
                .build()?;
            let tier = self.settings.model_tier;
            let endpoint = self.settings.endpoint_for(tier)?;
            self.authorize(tier)?;
            let _busy = self.begin()?;

            let params = GenerationParams::text_to_image(built.prompt, tier)
                .with_negative(built.negative)
                .with_aspect_ratio(self.settings.aspect_ratio)
                .with_endpoint(endpoint);
            let image = self.call_generator(&params)?;

            let prompt = prompt.trim();
            let id = ws.layers.add_layer(
                image,
                format!("Gen: {}...", preview(prompt, 10)),
                BlendMode::Normal,
                prompt,
            );
            ws.log.record(
                ActionKind::Generation,
                format!("Generated: {}...", preview(prompt, 20)),
            );
            info!(layer = %id, tier = %tier, "generated layer");
            Ok(id)
        })
    }

    /// Square texture layer blended with `overlay`
    pub fn generate_material(
        &self,
        ws: &mut Workspace,
        prompt: &str,
        label: &str,
        profile: Option<&TrainingProfile>,
    ) -> Result<LayerId> {
        self.attempt("material", || {
            let built = PromptPipeline::new(prompt).profile(profile).build()?;
            let tier = self.settings.material_tier();
            let endpoint = self.settings.endpoint_for(tier)?;
            self.authorize(tier)?;
            let _busy = self.begin()?;

            let params = GenerationParams::text_to_image(built.prompt, tier)
                .with_negative(built.negative)
                .with_aspect_ratio(AspectRatio::Square)
                .with_endpoint(endpoint);
            let image = self.call_generator(&params)?;

            let id = ws.layers.add_layer(
                image,
                format!("AI Material: {}", label),
                BlendMode::Overlay,
                prompt.trim(),
            );
            ws.log
                .record(ActionKind::Generation, format!("Created material: {}", label));
            info!(layer = %id, material = label, "generated material layer");
            Ok(id)
        })
    }

    pub fn apply_material_preset(
        &self,
        ws: &mut Workspace,
        preset_id: &str,
        profile: Option<&TrainingProfile>,
    ) -> Result<LayerId> {
        let preset = find_preset(&MATERIAL_PRESETS, preset_id)
            .ok_or_else(|| unknown_preset("material", preset_id, &MATERIAL_PRESETS))?;
        self.generate_material(ws, preset.prompt, preset.label, profile)
    }

    /// Image-to-image on the selected layer
    ///
    /// The instruction is stored as the layer's action prompt before the
    /// generator is called, so it survives a failed generation.
    pub fn transform(
        &self,
        ws: &mut Workspace,
        instruction: &str,
        strength: f32,
        mode: TransformMode,
        profile: Option<&TrainingProfile>,
    ) -> Result<LayerId> {
        self.attempt("transform", || {
            let (layer_id, input) = selected_input(&ws.layers)?;
            let built = PromptPipeline::new(instruction).profile(profile).build()?;
            validate_strength(strength)?;
            let tier = self.settings.image_tier();
            let endpoint = self.settings.endpoint_for(tier)?;
            self.authorize(tier)?;
            let _busy = self.begin()?;

            let instruction = instruction.trim();
            ws.layers
                .update_layer(&layer_id, LayerPatch::new().action_prompt(instruction));

            let params = GenerationParams::image_to_image(built.prompt, tier, input, strength)
                .with_negative(built.negative)
                .with_endpoint(endpoint);
            let image = self.call_generator(&params)?;

            let result_id = match mode {
                TransformMode::ComposeNew => ws.layers.add_layer(
                    image,
                    format!("Comp: {}...", preview(instruction, 10)),
                    BlendMode::Normal,
                    instruction,
                ),
                TransformMode::InPlace => {
                    let Some(layer) = ws.layers.get(&layer_id) else {
                        warn!(layer = %layer_id, "layer removed while transforming, result dropped");
                        return Err(StudioError::NoLayerSelected);
                    };
                    let mut filters = layer.filters.clone();
                    filters.push(Filter::ai_style(
                        strength,
                        format!("{}...", preview(instruction, 15)),
                    ));
                    // Pixels and marker land in one commit.
                    ws.layers.update_layer(
                        &layer_id,
                        LayerPatch::new().image(image).filters(filters),
                    );
                    layer_id
                }
            };
            ws.log
                .record(ActionKind::Edit, format!("AI Transform: {}", instruction));
            info!(layer = %result_id, ?mode, strength, "transform applied");
            Ok(result_id)
        })
    }

    pub fn apply_style_preset(
        &self,
        ws: &mut Workspace,
        preset_id: &str,
        strength: f32,
        mode: TransformMode,
        profile: Option<&TrainingProfile>,
    ) -> Result<LayerId> {
        let preset = find_preset(&STYLE_PRESETS, preset_id)
            .ok_or_else(|| unknown_preset("style", preset_id, &STYLE_PRESETS))?;
        self.transform(ws, preset.prompt, strength, mode, profile)
    }

    /// Analyze then regenerate the selected layer, optionally twice
    ///
    /// The second pass analyzes the already repaired pixels and runs at a
    /// lower strength. Never returns an error; failures are reported as
    /// sentinel variants.
    pub fn smart_repair(
        &self,
        ws: &mut Workspace,
        two_pass: bool,
        profile: Option<&TrainingProfile>,
    ) -> RepairReport {
        let Ok((layer_id, input)) = selected_input(&ws.layers) else {
            return RepairReport::NoLayerSelected;
        };
        let tier = self.settings.image_tier();
        if let Err(e) = self.authorize(tier) {
            self.record_failure("repair", e);
            return RepairReport::AuthFailed;
        }

        match self.repair_passes(ws, &layer_id, input, two_pass, tier, profile) {
            Ok((analysis, passes)) => RepairReport::Repaired { analysis, passes },
            Err(e) => RepairReport::Failed(self.record_failure("repair", e).friendly_message()),
        }
    }

    fn repair_passes(
        &self,
        ws: &mut Workspace,
        layer_id: &LayerId,
        input: EncodedImage,
        two_pass: bool,
        tier: ModelTier,
        profile: Option<&TrainingProfile>,
    ) -> Result<(String, u8)> {
        let target = PassTarget {
            tier,
            endpoint: self.settings.endpoint_for(tier)?,
            profile,
        };
        let _busy = self.begin()?;

        let first = self.analyze_for_repair(&input);
        let repaired = self.repair_pass(ws, layer_id, &first, input, REPAIR_STRENGTH, &target)?;
        if !two_pass {
            ws.log.record(ActionKind::Edit, "Smart Repair performed");
            info!(layer = %layer_id, "smart repair finished");
            return Ok((first, 1));
        }

        let second = self.analyze_for_repair(&repaired);
        self.repair_pass(ws, layer_id, &second, repaired, REFINE_STRENGTH, &target)?;
        ws.log.record(ActionKind::Edit, "Smart Repair performed (2-pass)");
        info!(layer = %layer_id, "two-pass smart repair finished");
        Ok((second, 2))
    }

    fn repair_pass(
        &self,
        ws: &mut Workspace,
        layer_id: &LayerId,
        analysis: &str,
        input: EncodedImage,
        strength: f32,
        target: &PassTarget<'_>,
    ) -> Result<EncodedImage> {
        let built = PromptPipeline::new(analysis).profile(target.profile).build()?;
        let params = GenerationParams::image_to_image(built.prompt, target.tier, input, strength)
            .with_negative(built.negative)
            .with_endpoint(target.endpoint.clone());
        let image = self.call_generator(&params)?;

        if ws.layers.get(layer_id).is_none() {
            warn!(layer = %layer_id, "layer removed during repair, result dropped");
            return Err(StudioError::NoLayerSelected);
        }
        ws.layers.update_layer(
            layer_id,
            LayerPatch::new().image(image.clone()).action_prompt(analysis),
        );
        debug!(layer = %layer_id, strength, "repair pass committed");
        Ok(image)
    }

    fn analyze_for_repair(&self, image: &EncodedImage) -> String {
        match self.analyzer.analyze(image) {
            Ok(text) if text.trim().is_empty() => ANALYSIS_BLANK_FALLBACK.to_string(),
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "image analysis failed, using generic repair prompt");
                ANALYSIS_FALLBACK.to_string()
            }
        }
    }

    /// Defect analysis of the selected layer; never touches the layer
    pub fn analyze_selected(&self, ws: &Workspace) -> Result<String> {
        self.attempt("analyze", || {
            let (_, input) = selected_input(&ws.layers)?;
            let _busy = self.begin()?;
            let text = self.analyzer.analyze(&input)?;
            Ok(match text.trim() {
                "" => ANALYSIS_BLANK_FALLBACK.to_string(),
                trimmed => trimmed.to_string(),
            })
        })
    }

    /// Language and keyword analysis of a prompt
    ///
    /// Blank text, or an inspection already running, yields None.
    /// Inspector failures fall back to a neutral result.
    pub fn inspect_prompt(&self, text: &str) -> Option<PromptAnalysis> {
        if text.trim().is_empty() {
            return None;
        }
        let _inspecting = FlagGuard::raise(&self.inspecting)?;
        let analysis = match &self.inspector {
            Some(inspector) => inspector.inspect(text).unwrap_or_else(|e| {
                warn!(error = %e, "prompt inspection failed");
                PromptAnalysis::neutral(text)
            }),
            None => PromptAnalysis::neutral(text),
        };
        Some(analysis)
    }

    fn begin(&self) -> Result<FlagGuard<'_>> {
        let guard = FlagGuard::raise(&self.generating).ok_or(StudioError::Busy)?;
        self.clear_error();
        Ok(guard)
    }

    fn authorize(&self, tier: ModelTier) -> Result<()> {
        if self.auth.authorize(tier) {
            Ok(())
        } else {
            Err(StudioError::AuthRequired {
                tier: tier.to_string(),
            })
        }
    }

    fn call_generator(&self, params: &GenerationParams) -> Result<EncodedImage> {
        params.validate()?;
        debug!(
            generator = self.generator.name(),
            tier = %params.model_tier,
            img2img = params.is_image_to_image(),
            "calling generator"
        );
        self.generator.generate(params)
    }

    fn attempt<T>(&self, action: &str, run: impl FnOnce() -> Result<T>) -> Result<T> {
        run().map_err(|e| self.record_failure(action, e))
    }

    fn record_failure(&self, action: &str, error: StudioError) -> StudioError {
        warn!(action, code = error.error_code(), error = %error, "AI action failed");
        if !matches!(error, StudioError::Busy) {
            self.last_error.replace(Some(error.friendly_message()));
        }
        error
    }
}

impl fmt::Debug for AiOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiOrchestrator")
            .field("generator", &self.generator.name())
            .field("settings", &self.settings)
            .field("generating", &self.generating.get())
            .field("last_error", &self.last_error.borrow())
            .finish()
    }
}

fn selected_input(store: &LayerStore) -> Result<(LayerId, EncodedImage)> {
    let layer = store.selected().ok_or(StudioError::NoLayerSelected)?;
    let image = layer.image.clone().ok_or(StudioError::NoLayerSelected)?;
    Ok((layer.id().clone(), image))
}

fn validate_strength(strength: f32) -> Result<()> {
    if (0.0..=1.0).contains(&strength) {
        Ok(())
    } else {
        Err(StudioError::InvalidParameter {
            param: "strength".to_string(),
            value: strength.to_string(),
            expected: "value between 0.0 and 1.0".to_string(),
        })
    }
}

fn unknown_preset(kind: &str, id: &str, presets: &[Preset]) -> StudioError {
    StudioError::InvalidParameter {
        param: format!("{} preset", kind),
        value: id.to_string(),
        expected: presets
            .iter()
            .map(|p| p.id)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// First `n` characters
fn preview(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}
