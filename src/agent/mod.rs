//! AI actions and the chat bridge
//!
//! This module provides:
//! - The action orchestrator (generate, material, transform, smart repair)
//! - Preset catalogs for materials and styles
//! - The two-mode chat bridge and its tool-call boundary

mod chat;
mod conversation;
mod orchestrator;
pub mod tools;

pub use chat::{ChatBridge, ChatMode, ToolContext, EMPTY_REPLY};
pub use conversation::{
    ChatMessage, ChatModel, ChatRole, ConverseRequest, ConverseResponse, GroundingChunk,
    ScriptedChatModel, UnavailableChatModel, WebSource,
};
pub use orchestrator::{
    find_preset, AiOrchestrator, AllowAll, ApiKeyGate, AuthGate, GenerationSettings, Preset,
    RepairReport, TransformMode, ANALYSIS_BLANK_FALLBACK, ANALYSIS_FALLBACK, MATERIAL_PRESETS,
    REFINE_STRENGTH, REPAIR_STRENGTH, STYLE_PRESETS,
};
pub use tools::{command_tools, RawToolCall, ToolCall, ToolCallError, ToolDeclaration};
