//! Editor session
//!
//! Owns the workspace, the AI collaborators, the chat transcript and the
//! training profile, and keeps a live canvas subscribed to the layer store.

use std::cell::{Ref, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{info, warn};

use super::history::{ActionKind, ActionLog};
use super::profile::{MemoryProfileStore, ProfileStore, TrainingProfile};
use super::workspace::Workspace;
use crate::agent::{
    AiOrchestrator, ChatBridge, ChatMessage, ChatMode, ChatModel, RepairReport,
    ScriptedChatModel, ToolContext, TransformMode,
};
use crate::compositor::{self, Compositor, ExportFormat, LiveCanvas};
use crate::config::StudioConfig;
use crate::error::Result;
use crate::layers::{BlendMode, EncodedImage, LayerId, LayerStore};
use crate::neural::{MockAnalyzer, MockGenerator, MockPromptInspector, PromptAnalysis};

pub struct EditorSession {
    workspace: Workspace,
    orchestrator: AiOrchestrator,
    chat: ChatBridge,
    profile: TrainingProfile,
    profile_store: Box<dyn ProfileStore>,
    compositor: Compositor,
    canvas: Rc<RefCell<LiveCanvas>>,
}

impl EditorSession {
    /// Build a session and load the saved profile
    ///
    /// A profile that fails to load is replaced by the default one.
    pub fn new(
        config: &StudioConfig,
        orchestrator: AiOrchestrator,
        chat_model: Arc<dyn ChatModel>,
        profile_store: Box<dyn ProfileStore>,
    ) -> Result<Self> {
        config.validate()?;
        let compositor = config.compositor()?;
        let profile = profile_store.load().unwrap_or_else(|e| {
            warn!(error = %e, "could not load training profile, starting blank");
            TrainingProfile::default()
        });

        let canvas = Rc::new(RefCell::new(LiveCanvas::new(compositor)));
        let mut workspace = Workspace::new();
        workspace.layers.subscribe(Box::new(Rc::clone(&canvas)));

        info!(canvas = %compositor.size(), "editor session ready");
        Ok(Self {
            workspace,
            orchestrator,
            chat: ChatBridge::new(chat_model),
            profile,
            profile_store,
            compositor,
            canvas,
        })
    }

    /// Session wired to the deterministic mock collaborators
    pub fn with_mocks(config: &StudioConfig) -> Result<Self> {
        let orchestrator =
            AiOrchestrator::new(Arc::new(MockGenerator::new()), Arc::new(MockAnalyzer::default()))
                .with_inspector(Arc::new(MockPromptInspector::new()))
                .with_settings(config.generation_settings());
        Self::new(
            config,
            orchestrator,
            Arc::new(ScriptedChatModel::new()),
            Box::new(MemoryProfileStore::new()),
        )
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn layers(&self) -> &LayerStore {
        &self.workspace.layers
    }

    /// Direct store access for manual edits
    pub fn layers_mut(&mut self) -> &mut LayerStore {
        &mut self.workspace.layers
    }

    pub fn log(&self) -> &ActionLog {
        &self.workspace.log
    }

    pub fn orchestrator(&self) -> &AiOrchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut AiOrchestrator {
        &mut self.orchestrator
    }

    pub fn chat(&self) -> &ChatBridge {
        &self.chat
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Latest live frame
    pub fn canvas(&self) -> Ref<'_, LiveCanvas> {
        self.canvas.borrow()
    }

    pub fn profile(&self) -> &TrainingProfile {
        &self.profile
    }

    /// Replace the in-memory profile; persisted only by `save_profile`
    pub fn set_profile(&mut self, profile: TrainingProfile) {
        self.profile = profile;
    }

    pub fn save_profile(&self) -> Result<()> {
        self.profile_store.save(&self.profile)
    }

    pub fn profile_store(&self) -> &dyn ProfileStore {
        self.profile_store.as_ref()
    }

    /// Add an uploaded image as a new layer named after the file
    pub fn import_image(&mut self, bytes: Vec<u8>, file_name: &str) -> Result<LayerId> {
        let image = EncodedImage::from_bytes(bytes);
        image.decode()?;
        let id = self
            .workspace
            .layers
            .add_layer(image, file_name, BlendMode::Normal, "");
        info!(layer = %id, file = file_name, "imported image");
        Ok(id)
    }

    pub fn generate(&mut self, prompt: &str) -> Result<LayerId> {
        self.orchestrator
            .generate(&mut self.workspace, prompt, Some(&self.profile))
    }

    pub fn generate_material(&mut self, preset_id: &str) -> Result<LayerId> {
        self.orchestrator
            .apply_material_preset(&mut self.workspace, preset_id, Some(&self.profile))
    }

    pub fn transform(
        &mut self,
        instruction: &str,
        strength: f32,
        mode: TransformMode,
    ) -> Result<LayerId> {
        self.orchestrator.transform(
            &mut self.workspace,
            instruction,
            strength,
            mode,
            Some(&self.profile),
        )
    }

    pub fn apply_style(
        &mut self,
        preset_id: &str,
        strength: f32,
        mode: TransformMode,
    ) -> Result<LayerId> {
        self.orchestrator.apply_style_preset(
            &mut self.workspace,
            preset_id,
            strength,
            mode,
            Some(&self.profile),
        )
    }

    pub fn smart_repair(&mut self, two_pass: bool) -> RepairReport {
        self.orchestrator
            .smart_repair(&mut self.workspace, two_pass, Some(&self.profile))
    }

    pub fn analyze_selected(&self) -> Result<String> {
        self.orchestrator.analyze_selected(&self.workspace)
    }

    pub fn inspect_prompt(&self, text: &str) -> Option<PromptAnalysis> {
        self.orchestrator.inspect_prompt(text)
    }

    pub fn send_message(&mut self, text: &str, mode: ChatMode) -> Option<ChatMessage> {
        let ctx = ToolContext {
            orchestrator: &self.orchestrator,
            workspace: &mut self.workspace,
            profile: Some(&self.profile),
        };
        self.chat.send_message(text, mode, ctx)
    }

    /// Flatten the visible composition into a new top layer
    pub fn merge_visible(&mut self) -> Result<LayerId> {
        let id = self.workspace.layers.merge_visible(&self.compositor)?;
        self.workspace
            .log
            .record(ActionKind::Edit, "Merged visible layers");
        Ok(id)
    }

    /// Fresh render of the current layers
    pub fn render(&self) -> RgbaImage {
        self.compositor.render(self.workspace.layers.layers())
    }

    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        compositor::encode(&self.render(), format)
    }

    pub fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<usize> {
        compositor::export_to_file(&self.render(), format, path)
    }
}
