//! Agent Integration Tests
//!
//! AI actions and chat commands driven against mock collaborators.

use std::sync::Arc;

use diffusion_studio::agent::{
    AiOrchestrator, ChatBridge, ChatMode, ConverseResponse, RawToolCall, RepairReport,
    ScriptedChatModel, ToolContext, TransformMode, REFINE_STRENGTH, REPAIR_STRENGTH,
};
use diffusion_studio::layers::{BlendMode, EncodedImage, FilterKind, LayerId};
use diffusion_studio::neural::{MockAnalyzer, MockGenerator, ModelTier};
use diffusion_studio::state::{ActionKind, EditorSession, MemoryProfileStore, Workspace};
use diffusion_studio::{StudioConfig, StudioError};
use image::{Rgba, RgbaImage};
use serde_json::json;
use test_case::test_case;

fn photo() -> EncodedImage {
    EncodedImage::from_raster(&RgbaImage::from_pixel(6, 6, Rgba([120, 110, 100, 255]))).unwrap()
}

struct Harness {
    orchestrator: AiOrchestrator,
    generator: Arc<MockGenerator>,
    analyzer: Arc<MockAnalyzer>,
    workspace: Workspace,
    layer: LayerId,
}

fn harness(analyses: &[&str]) -> Harness {
    let generator = Arc::new(MockGenerator::new());
    let analyzer = Arc::new(MockAnalyzer::scripted(analyses.iter().copied()));
    let orchestrator = AiOrchestrator::new(generator.clone(), analyzer.clone());
    let mut workspace = Workspace::new();
    let layer = workspace
        .layers
        .add_layer(photo(), "scan.png", BlendMode::Normal, "");
    Harness {
        orchestrator,
        generator,
        analyzer,
        workspace,
        layer,
    }
}

// === Smart repair ===

#[test]
fn test_single_pass_repair() {
    let mut h = harness(&["remove jpeg artifacts"]);
    let revision = h.workspace.layers.revision();

    let report = h.orchestrator.smart_repair(&mut h.workspace, false, None);

    assert_eq!(
        report,
        RepairReport::Repaired {
            analysis: "remove jpeg artifacts".to_string(),
            passes: 1,
        }
    );
    assert_eq!(h.analyzer.calls(), vec![photo()]);
    let calls = h.generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].strength, Some(REPAIR_STRENGTH));
    assert_eq!(calls[0].model_tier, ModelTier::Pro);

    let layer = h.workspace.layers.get(&h.layer).unwrap();
    assert_eq!(layer.image.as_ref(), Some(&h.generator.outputs()[0]));
    assert_eq!(layer.action_prompt, "remove jpeg artifacts");
    assert_eq!(h.workspace.layers.revision(), revision + 1);
    assert!(!h.orchestrator.is_generating());
}

#[test]
fn test_two_pass_repair_analyzes_intermediate_image() {
    let mut h = harness(&["fix scratches", "balance colors"]);
    let revision = h.workspace.layers.revision();

    let report = h.orchestrator.smart_repair(&mut h.workspace, true, None);

    assert_eq!(report.text(), "balance colors");
    let outputs = h.generator.outputs();
    let analyzed = h.analyzer.calls();
    assert_eq!(analyzed.len(), 2);
    assert_eq!(analyzed[0], photo());
    assert_eq!(analyzed[1], outputs[0]);
    assert_ne!(analyzed[1], photo());

    let calls = h.generator.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].strength, Some(REPAIR_STRENGTH));
    assert_eq!(calls[1].strength, Some(REFINE_STRENGTH));
    assert!(REFINE_STRENGTH < REPAIR_STRENGTH);
    assert_eq!(calls[1].input_image.as_ref(), Some(&outputs[0]));

    let layer = h.workspace.layers.get(&h.layer).unwrap();
    assert_eq!(layer.image.as_ref(), Some(&outputs[1]));
    assert_eq!(h.workspace.layers.revision(), revision + 2);
    assert_eq!(
        h.workspace.log.latest().unwrap().description,
        "Smart Repair performed (2-pass)"
    );
}

// === Generation ===

#[test]
fn test_empty_prompt_generates_nothing() {
    let mut h = harness(&[]);
    let before = h.workspace.layers.len();

    let err = h.orchestrator.generate(&mut h.workspace, "", None).unwrap_err();

    assert!(matches!(err, StudioError::EmptyPrompt));
    assert!(err.is_validation());
    assert_eq!(h.workspace.layers.len(), before);
    assert_eq!(h.generator.call_count(), 0);
    assert!(!h.orchestrator.is_generating());
}

#[test]
fn test_style_preset_in_place() {
    let mut h = harness(&[]);

    h.orchestrator
        .apply_style_preset(&mut h.workspace, "sketch", 0.6, TransformMode::InPlace, None)
        .unwrap();

    let layer = h.workspace.layers.get(&h.layer).unwrap();
    assert_eq!(layer.filters.as_slice()[0].kind, FilterKind::AiStyle);
    assert!(layer.action_prompt.starts_with("transform into a rough charcoal"));
    assert_eq!(h.workspace.log.latest().unwrap().kind, ActionKind::Edit);
}

// === Chat ===

#[test]
fn test_chat_command_applies_tools_in_order() {
    let mut h = harness(&[]);
    let model = Arc::new(
        ScriptedChatModel::new().reply(
            ConverseResponse::default()
                .with_tool_call(RawToolCall::new("update_layer", json!({"opacity": 40})))
                .with_tool_call(RawToolCall::new(
                    "apply_filter",
                    json!({"filterType": "blur", "value": 5}),
                )),
        ),
    );
    let mut bridge = ChatBridge::new(model);

    let reply = bridge
        .send_message(
            "fade it and soften",
            ChatMode::Command,
            ToolContext {
                orchestrator: &h.orchestrator,
                workspace: &mut h.workspace,
                profile: None,
            },
        )
        .unwrap();

    let layer = h.workspace.layers.get(&h.layer).unwrap();
    assert_eq!(layer.opacity().percent(), 40);
    let filters = layer.filters.as_slice();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].kind, FilterKind::Blur);
    assert_eq!(filters[0].value(), 5.0);
    assert_eq!(
        reply.text,
        "Updated layer properties.\n[Action: Applied blur filter.]"
    );
}

#[test]
fn test_chat_tool_calls_see_earlier_results() {
    let mut h = harness(&[]);
    let model = Arc::new(
        ScriptedChatModel::new().reply(
            ConverseResponse::text("Here you go.")
                .with_tool_call(RawToolCall::new(
                    "generate_image",
                    json!({"prompt": "a paper boat"}),
                ))
                .with_tool_call(RawToolCall::new("update_layer", json!({"opacity": 70})))
                .with_tool_call(RawToolCall::new(
                    "apply_filter",
                    json!({"filterType": "sepia", "value": 30}),
                )),
        ),
    );
    let mut bridge = ChatBridge::new(model);

    let reply = bridge
        .send_message(
            "make a boat and age it",
            ChatMode::Command,
            ToolContext {
                orchestrator: &h.orchestrator,
                workspace: &mut h.workspace,
                profile: None,
            },
        )
        .unwrap();

    assert_eq!(
        reply.text,
        "Here you go.\n[Action: Generated new layer with image.]\n\
         [Action: Updated layer properties.]\n[Action: Applied sepia filter.]"
    );

    // The edits land on the generated layer, not the original scan.
    assert_eq!(h.workspace.layers.len(), 2);
    let generated = h.workspace.layers.selected().unwrap();
    assert_ne!(generated.id(), &h.layer);
    assert_eq!(generated.image.as_ref(), Some(&h.generator.outputs()[0]));
    assert_eq!(generated.opacity().percent(), 70);
    let filters = generated.filters.as_slice();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].kind, FilterKind::Sepia);

    let scan = h.workspace.layers.get(&h.layer).unwrap();
    assert_eq!(scan.opacity().percent(), 100);
    assert!(scan.filters.is_empty());
}

fn knowledge_session(answer: &str) -> EditorSession {
    let orchestrator = AiOrchestrator::new(
        Arc::new(MockGenerator::new()),
        Arc::new(MockAnalyzer::default()),
    );
    EditorSession::new(
        &StudioConfig::default(),
        orchestrator,
        Arc::new(ScriptedChatModel::new().reply(ConverseResponse::text(answer))),
        Box::new(MemoryProfileStore::new()),
    )
    .unwrap()
}

#[test_case("  Use a slow shutter.\n" ; "surrounding whitespace")]
#[test_case("" ; "empty answer")]
fn test_session_knowledge_answer_kept_verbatim(answer: &str) {
    let mut session = knowledge_session(answer);

    let reply = session
        .send_message("what is chiaroscuro?", ChatMode::Knowledge)
        .unwrap();

    assert_eq!(reply.text, answer);
    let transcript = session.chat().transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].text, answer);
    assert_eq!(session.log().latest().unwrap().kind, ActionKind::Chat);
}
