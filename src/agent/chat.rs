//! Chat Bridge
//!
//! Relays user messages to the conversational model in one of two modes.
//! Knowledge mode asks a grounded question and never touches the editor.
//! Command mode advertises the editor tools and dispatches every returned
//! tool call, in order, against the layer store.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::conversation::{ChatMessage, ChatModel, ConverseRequest};
use super::orchestrator::{AiOrchestrator, FlagGuard};
use super::tools::{command_tools, RawToolCall, ToolCall};
use crate::layers::Filter;
use crate::state::{ActionKind, TrainingProfile, Workspace};

/// Reply when a command produced neither text nor tool output
pub const EMPTY_REPLY: &str = "Done.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Grounded Q&A, no editor access
    #[default]
    Knowledge,
    /// Tool-calling editor control
    Command,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Knowledge => "knowledge",
            ChatMode::Command => "command",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a tool call may act on
pub struct ToolContext<'a> {
    pub orchestrator: &'a AiOrchestrator,
    pub workspace: &'a mut Workspace,
    pub profile: Option<&'a TrainingProfile>,
}

pub struct ChatBridge {
    model: Arc<dyn ChatModel>,
    transcript: Vec<ChatMessage>,
    processing: Cell<bool>,
}

impl ChatBridge {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            transcript: Vec::new(),
            processing: Cell::new(false),
        }
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn is_processing(&self) -> bool {
        self.processing.get()
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Send one user message and return the model's reply
    ///
    /// Blank input is ignored. Model failures become an `Error: ...`
    /// reply in the transcript rather than an error.
    pub fn send_message(
        &mut self,
        text: &str,
        mode: ChatMode,
        mut ctx: ToolContext<'_>,
    ) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let Some(_processing) = FlagGuard::raise(&self.processing) else {
            warn!("chat message dropped, previous message still processing");
            return None;
        };

        let history = self.transcript.clone();
        self.transcript.push(ChatMessage::user(text));
        ctx.workspace.log.record(
            ActionKind::Chat,
            match mode {
                ChatMode::Knowledge => "Asked Expert Question",
                ChatMode::Command => "Sent AI Command",
            },
        );

        let request = build_request(text, history, mode, &ctx);
        debug!(%mode, history = request.history.len(), "sending chat message");

        let reply = match self.model.converse(&request) {
            Ok(response) => match mode {
                ChatMode::Knowledge => {
                    if !response.tool_calls.is_empty() {
                        warn!(
                            count = response.tool_calls.len(),
                            "ignoring tool calls in knowledge mode"
                        );
                    }
                    // Answers are kept verbatim.
                    ChatMessage::model(response.text).with_grounding(response.citations)
                }
                ChatMode::Command => {
                    let results: Vec<String> = response
                        .tool_calls
                        .iter()
                        .map(|raw| dispatch(raw, &mut ctx))
                        .collect();
                    ChatMessage::model(assemble_reply(response.text.trim(), &results))
                        .with_grounding(response.citations)
                }
            },
            Err(e) => {
                warn!(error = %e, "chat model call failed");
                ChatMessage::model(format!("Error: {}", e.friendly_message()))
            }
        };

        self.transcript.push(reply.clone());
        Some(reply)
    }
}

impl fmt::Debug for ChatBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatBridge")
            .field("messages", &self.transcript.len())
            .field("processing", &self.processing.get())
            .finish()
    }
}

fn build_request(
    message: &str,
    history: Vec<ChatMessage>,
    mode: ChatMode,
    ctx: &ToolContext<'_>,
) -> ConverseRequest {
    let personalization = ctx
        .profile
        .and_then(TrainingProfile::active)
        .map(TrainingProfile::personalization_block);
    let user_context = personalization.as_deref().unwrap_or_default();

    match mode {
        ChatMode::Knowledge => ConverseRequest {
            message: message.to_string(),
            history,
            system_instruction: format!(
                "You are an expert Art & Photography Tutor for Diffusion Studio.\n\
                 The user is asking for knowledge, history, or technical advice about art/photography.\n\
                 Use web search to find accurate, up-to-date answers if needed.\n\
                 Do NOT attempt to control the app interface (do not use layer tools).\n\
                 {}\n\
                 Provide helpful, educational responses.",
                user_context
            ),
            context: None,
            personalization,
            grounding: true,
            tools: Vec::new(),
        },
        ChatMode::Command => {
            let state = ctx.workspace.layers.describe();
            ConverseRequest {
                message: message.to_string(),
                history,
                system_instruction: format!(
                    "You are the AI Assistant for 'Diffusion Studio', a layer-based image editor.\n\
                     You can execute actions to control the app.\n\
                     {}\n\
                     CURRENT APP STATE (Layers):\n\
                     {}\n\
                     If the user asks to generate an image, call 'generate_image'.\n\
                     If the user wants to change opacity/visibility/blend of active layer, call 'update_layer'.\n\
                     If the user wants a filter, call 'apply_filter'.\n\
                     Be helpful and concise.",
                    user_context, state
                ),
                context: Some(state),
                personalization,
                grounding: false,
                tools: command_tools(),
            }
        }
    }
}

/// Execute one tool call and describe the outcome
fn dispatch(raw: &RawToolCall, ctx: &mut ToolContext<'_>) -> String {
    let call = match ToolCall::parse(raw) {
        Ok(call) => call,
        Err(e) => {
            warn!(tool = %raw.name, error = %e, "rejected tool call");
            return e.to_string();
        }
    };
    info!(tool = call.name(), "executing tool call");

    match call {
        ToolCall::GenerateImage { prompt } => {
            match ctx.orchestrator.generate(ctx.workspace, &prompt, ctx.profile) {
                Ok(_) => "Generated new layer with image.".to_string(),
                Err(e) => format!("Image generation failed: {}", e.friendly_message()),
            }
        }
        ToolCall::UpdateLayer { .. } => {
            let Some(id) = ctx.workspace.layers.selected_id().cloned() else {
                return "No layer selected to update.".to_string();
            };
            if let Some(patch) = call.layer_patch() {
                ctx.workspace.layers.update_layer(&id, patch);
            }
            "Updated layer properties.".to_string()
        }
        ToolCall::ApplyFilter { kind, value } => {
            let Some(id) = ctx.workspace.layers.selected_id().cloned() else {
                return "No layer selected.".to_string();
            };
            ctx.workspace
                .layers
                .add_filter(&id, Filter::with_label(kind, value, kind.as_str()));
            format!("Applied {} filter.", kind)
        }
    }
}

fn assemble_reply(text: &str, results: &[String]) -> String {
    let mut reply = text.to_string();
    for result in results {
        if reply.is_empty() {
            reply = result.clone();
        } else {
            reply.push_str(&format!("\n[Action: {}]", result));
        }
    }
    if reply.is_empty() {
        reply = EMPTY_REPLY.to_string();
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::conversation::{ConverseResponse, GroundingChunk, ScriptedChatModel};
    use crate::agent::ChatRole;
    use crate::layers::{BlendMode, EncodedImage, FilterKind};
    use crate::neural::{MockAnalyzer, MockGenerator};
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        orchestrator: AiOrchestrator,
        generator: Arc<MockGenerator>,
        workspace: Workspace,
    }

    fn fixture() -> Fixture {
        let generator = Arc::new(MockGenerator::new());
        Fixture {
            orchestrator: AiOrchestrator::new(generator.clone(), Arc::new(MockAnalyzer::default())),
            generator,
            workspace: Workspace::new(),
        }
    }

    impl Fixture {
        fn ctx(&mut self) -> ToolContext<'_> {
            ToolContext {
                orchestrator: &self.orchestrator,
                workspace: &mut self.workspace,
                profile: None,
            }
        }

        fn add_layer(&mut self) {
            let image =
                EncodedImage::from_raster(&RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])))
                    .unwrap();
            self.workspace
                .layers
                .add_layer(image, "base", BlendMode::Normal, "");
        }
    }

    #[test]
    fn test_reply_assembly() {
        assert_eq!(assemble_reply("", &[]), "Done.");
        assert_eq!(assemble_reply("", &["a".into(), "b".into()]), "a\n[Action: b]");
        assert_eq!(assemble_reply("Sure", &["a".into()]), "Sure\n[Action: a]");
    }

    #[test]
    fn test_knowledge_mode_is_grounded_and_ignores_tools() {
        let model = Arc::new(
            ScriptedChatModel::new().reply(
                ConverseResponse::text("Use a long exposure.")
                    .with_tool_call(RawToolCall::new("generate_image", json!({"prompt": "x"})))
                    .with_citation(GroundingChunk::web("https://example.org", "Guide")),
            ),
        );
        let mut bridge = ChatBridge::new(model.clone());
        let mut fx = fixture();

        let reply = bridge
            .send_message("How do I shoot waterfalls?", ChatMode::Knowledge, fx.ctx())
            .unwrap();

        assert_eq!(reply.text, "Use a long exposure.");
        assert_eq!(reply.grounding_chunks.len(), 1);
        assert_eq!(fx.generator.call_count(), 0);
        let request = &model.requests()[0];
        assert!(request.grounding);
        assert!(request.tools.is_empty());
        assert!(request.context.is_none());
        assert_eq!(fx.workspace.log.latest().unwrap().description, "Asked Expert Question");
    }

    #[test]
    fn test_command_mode_sends_layer_state() {
        let model = Arc::new(ScriptedChatModel::new());
        let mut bridge = ChatBridge::new(model.clone());
        let mut fx = fixture();
        fx.add_layer();

        let reply = bridge.send_message("hi", ChatMode::Command, fx.ctx()).unwrap();

        assert_eq!(reply.text, "Done.");
        let request = &model.requests()[0];
        assert_eq!(request.tools.len(), 3);
        assert!(request.context.as_deref().unwrap().starts_with("Layer 0: base"));
        assert!(!request.grounding);
    }

    #[test]
    fn test_history_excludes_current_message() {
        let model = Arc::new(ScriptedChatModel::new().reply(ConverseResponse::text("one")));
        let mut bridge = ChatBridge::new(model.clone());
        let mut fx = fixture();

        bridge.send_message("first", ChatMode::Knowledge, fx.ctx());
        bridge.send_message("second", ChatMode::Knowledge, fx.ctx());

        let requests = model.requests();
        assert!(requests[0].history.is_empty());
        assert_eq!(requests[1].history.len(), 2);
        assert_eq!(requests[1].history[1].role, ChatRole::Model);
        assert_eq!(bridge.transcript().len(), 4);
    }

    #[test]
    fn test_model_failure_becomes_error_reply() {
        let model = Arc::new(ScriptedChatModel::new().fail("quota exceeded"));
        let mut bridge = ChatBridge::new(model);
        let mut fx = fixture();

        let reply = bridge.send_message("hello", ChatMode::Command, fx.ctx()).unwrap();

        assert_eq!(reply.text, "Error: quota exceeded");
        assert!(!bridge.is_processing());
    }

    #[test]
    fn test_blank_message_ignored() {
        let model = Arc::new(ScriptedChatModel::new());
        let mut bridge = ChatBridge::new(model.clone());
        let mut fx = fixture();
        assert!(bridge.send_message("  ", ChatMode::Command, fx.ctx()).is_none());
        assert!(model.requests().is_empty());
        assert!(bridge.transcript().is_empty());
    }

    #[test]
    fn test_tools_without_selection() {
        let model = Arc::new(ScriptedChatModel::new().reply(
            ConverseResponse::default()
                .with_tool_call(RawToolCall::new("update_layer", json!({"opacity": 10})))
                .with_tool_call(RawToolCall::new(
                    "apply_filter",
                    json!({"filterType": "blur", "value": 3}),
                )),
        ));
        let mut bridge = ChatBridge::new(model);
        let mut fx = fixture();

        let reply = bridge.send_message("soften it", ChatMode::Command, fx.ctx()).unwrap();

        assert_eq!(reply.text, "No layer selected to update.\n[Action: No layer selected.]");
    }

    #[test]
    fn test_filter_and_unknown_tool_results() {
        let model = Arc::new(ScriptedChatModel::new().reply(
            ConverseResponse::text("On it.")
                .with_tool_call(RawToolCall::new(
                    "apply_filter",
                    json!({"filterType": "sepia", "value": 60}),
                ))
                .with_tool_call(RawToolCall::new("rotate_canvas", json!({}))),
        ));
        let mut bridge = ChatBridge::new(model);
        let mut fx = fixture();
        fx.add_layer();

        let reply = bridge.send_message("vintage", ChatMode::Command, fx.ctx()).unwrap();

        assert_eq!(
            reply.text,
            "On it.\n[Action: Applied sepia filter.]\n[Action: Unknown tool: rotate_canvas]"
        );
        let layer = fx.workspace.layers.selected().unwrap();
        let filter = &layer.filters.as_slice()[0];
        assert_eq!(filter.kind, FilterKind::Sepia);
        assert_eq!(filter.value(), 60.0);
    }

    #[test]
    fn test_generate_failure_reported_inline() {
        let model = Arc::new(ScriptedChatModel::new().reply(
            ConverseResponse::default()
                .with_tool_call(RawToolCall::new("generate_image", json!({"prompt": "  "}))),
        ));
        let mut bridge = ChatBridge::new(model);
        let mut fx = fixture();

        let reply = bridge.send_message("make art", ChatMode::Command, fx.ctx()).unwrap();

        assert!(reply.text.starts_with("Image generation failed: "));
        assert!(fx.workspace.layers.is_empty());
    }
}
