//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use super::scene::SceneFile;
use crate::agent::{
    AiOrchestrator, ChatModel, RepairReport, ScriptedChatModel, UnavailableChatModel,
    ANALYSIS_BLANK_FALLBACK,
};
use crate::compositor::{self, ExportFormat};
use crate::config::StudioConfig;
use crate::error::{Result, StudioError};
use crate::layers::EncodedImage;
use crate::neural::{
    FixedPromptAnalyzer, MockAnalyzer, MockGenerator, ModelTier, StableDiffusionClient,
};
use crate::state::{EditorSession, JsonProfileStore, ProfileStore, TrainingProfile};

/// Load the config file if given, else defaults with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<StudioConfig> {
    match path {
        Some(path) => {
            let mut config = StudioConfig::load(path)?;
            config.apply_env()?;
            Ok(config)
        }
        None => StudioConfig::from_env(),
    }
}

/// Composite a scene file and export it.
pub fn render(
    config: &StudioConfig,
    scene: &Path,
    output: &Path,
    format: Option<&str>,
) -> Result<()> {
    info!("Rendering scene: {}", scene.display());

    let file = SceneFile::load(scene)?;
    let compositor = file.compositor(config)?;
    let store = file.build_store()?;
    let format = output_format(output, format)?;

    let raster = compositor.render(store.layers());
    let written = compositor::export_to_file(&raster, format, output)?;

    println!("Rendered {} layer(s) at {}", store.len(), compositor.size());
    println!("Wrote {} ({} bytes, {})", output.display(), written, format);
    println!("Digest: {}", compositor::raster_digest(&raster));

    Ok(())
}

/// Print the layer table of a scene.
pub fn inspect(config: &StudioConfig, scene: &Path) -> Result<()> {
    info!("Inspecting scene: {}", scene.display());

    let file = SceneFile::load(scene)?;
    let compositor = file.compositor(config)?;
    let store = file.build_store()?;

    println!("Canvas: {} on {}", compositor.size(), compositor::to_hex_color(compositor.background()));
    println!("Layers (bottom first):");
    for (index, layer) in store.layers().iter().enumerate() {
        let baked = layer.filters.iter().filter(|f| f.is_baked()).count();
        println!(
            "  {}. {} [{}] opacity {}%{}",
            index,
            layer.name,
            layer.blend_mode.display_name(),
            layer.opacity().percent(),
            if layer.visible { "" } else { " (hidden)" }
        );
        println!("     filter: {}", layer.filters.css_string());
        if baked > 0 {
            println!("     baked markers: {}", baked);
        }
    }

    let plan = compositor.plan(store.layers());
    println!("Paint steps: {}", plan.len());

    Ok(())
}

/// Print the saved training profile.
pub fn show_profile(config: &StudioConfig) -> Result<()> {
    let store = JsonProfileStore::new(&config.profile_path);
    let profile = store.load()?;

    println!("Profile: {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&profile)?);
    if profile.is_blank() {
        println!("(profile is empty)");
    }

    Ok(())
}

/// Update and save fields of the training profile.
pub fn set_profile(
    config: &StudioConfig,
    imagination: Option<String>,
    styles: Option<String>,
    avoid: Option<String>,
    auto_apply: Option<bool>,
) -> Result<()> {
    let store = JsonProfileStore::new(&config.profile_path);
    let mut profile: TrainingProfile = store.load()?;

    if let Some(text) = imagination {
        profile.imagination_road = text;
    }
    if let Some(text) = styles {
        profile.preferred_styles = text;
    }
    if let Some(text) = avoid {
        profile.avoid_elements = text;
    }
    if let Some(flag) = auto_apply {
        profile.auto_apply = flag;
    }

    store.save(&profile)?;
    println!("Profile saved: {}", store.path().display());

    Ok(())
}

/// Generate an image from a prompt and write it out.
pub fn generate(
    config: &StudioConfig,
    prompt: &str,
    output: &Path,
    mock: bool,
    aspect: Option<&str>,
    negative: Option<&str>,
) -> Result<()> {
    info!("Generating: {}", prompt);

    let mut session = build_session(config, mock)?;
    {
        let settings = session.orchestrator_mut().settings_mut();
        if let Some(aspect) = aspect {
            settings.aspect_ratio = aspect.parse()?;
        }
        if let Some(negative) = negative {
            settings.negative_prompt = negative.to_string();
        }
    }

    let id = session.generate(prompt)?;
    let layer = session
        .layers()
        .get(&id)
        .ok_or(StudioError::NoLayerSelected)?;
    println!("Generated layer: {}", layer.name);

    if let Some(image) = &layer.image {
        write_image(image, output)?;
    }

    Ok(())
}

/// Run smart repair on an image file.
pub fn repair(config: &StudioConfig, input: &Path, output: &Path, two_pass: bool, mock: bool) -> Result<()> {
    info!("Repairing: {}", input.display());

    let mut session = build_session(config, mock)?;
    let bytes = fs::read(input)?;
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    session.import_image(bytes, &file_name)?;

    match session.smart_repair(two_pass) {
        RepairReport::Repaired { analysis, passes } => {
            println!("Repaired in {} pass(es): {}", passes, analysis);
        }
        report => {
            let message = session
                .orchestrator()
                .last_error()
                .unwrap_or_else(|| report.text().to_string());
            warn!("Repair did not complete: {}", message);
            return Err(StudioError::external("smart-repair", message));
        }
    }

    if let Some(image) = session.layers().selected().and_then(|l| l.image.as_ref()) {
        write_image(image, output)?;
    }

    Ok(())
}

fn build_session(config: &StudioConfig, mock: bool) -> Result<EditorSession> {
    let (orchestrator, chat_model) = if mock {
        let orchestrator =
            AiOrchestrator::new(Arc::new(MockGenerator::new()), Arc::new(MockAnalyzer::default()))
                .with_settings(config.generation_settings());
        let chat_model: Arc<dyn ChatModel> = Arc::new(ScriptedChatModel::new());
        (orchestrator, chat_model)
    } else {
        // The HTTP bridge has no vision endpoint; repair runs on the generic prompt.
        let client = StableDiffusionClient::from_config(config);
        let mut settings = config.generation_settings();
        settings.model_tier = ModelTier::Custom;
        let orchestrator = AiOrchestrator::new(
            Arc::new(client),
            Arc::new(FixedPromptAnalyzer::new(ANALYSIS_BLANK_FALLBACK)),
        )
        .with_settings(settings);
        let chat_model: Arc<dyn ChatModel> = Arc::new(UnavailableChatModel);
        (orchestrator, chat_model)
    };

    EditorSession::new(
        config,
        orchestrator,
        chat_model,
        Box::new(JsonProfileStore::new(&config.profile_path)),
    )
}

fn output_format(output: &Path, explicit: Option<&str>) -> Result<ExportFormat> {
    match explicit {
        Some(name) => name.parse(),
        None => Ok(ExportFormat::from_path(output).unwrap_or(ExportFormat::Png)),
    }
}

fn write_image(image: &EncodedImage, output: &Path) -> Result<()> {
    let raster = image.decode()?.to_rgba8();
    let format = output_format(output, None)?;
    let written = compositor::export_to_file(&raster, format, output)?;
    println!("Wrote {} ({} bytes)", output.display(), written);
    Ok(())
}
