//! Conversation types and the conversational model contract

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tools::{RawToolCall, ToolDeclaration};
use crate::error::{Result, StudioError};

/// Who sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
    System,
}

/// Web source backing a knowledge answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebSource>,
}

impl GroundingChunk {
    pub fn web(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            web: Some(WebSource {
                uri: uri.into(),
                title: title.into(),
            }),
        }
    }
}

/// A message in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_chunks: Vec<GroundingChunk>,
}

impl ChatMessage {
    fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            grounding_chunks: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Model, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ChatRole::System, text)
    }

    pub fn with_grounding(mut self, chunks: Vec<GroundingChunk>) -> Self {
        self.grounding_chunks = chunks;
        self
    }
}

/// One call to the conversational model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConverseRequest {
    pub message: String,
    /// Transcript before `message`
    pub history: Vec<ChatMessage>,
    pub system_instruction: String,
    /// Rendered layer state, command mode only
    pub context: Option<String>,
    /// Training profile block, when it auto-applies
    pub personalization: Option<String>,
    /// Search augmentation, knowledge mode only
    pub grounding: bool,
    /// Callable tools, command mode only
    pub tools: Vec<ToolDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ConverseResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<RawToolCall>,
    #[serde(default)]
    pub citations: Vec<GroundingChunk>,
}

impl ConverseResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_tool_call(mut self, call: RawToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_citation(mut self, chunk: GroundingChunk) -> Self {
        self.citations.push(chunk);
        self
    }
}

/// Opaque conversational model
pub trait ChatModel: Send + Sync {
    fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse>;
}

/// Chat model replaying queued responses
///
/// Once the queue is exhausted every call gets an empty response.
#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<std::result::Result<ConverseResponse, String>>>,
    requests: Mutex<Vec<ConverseRequest>>,
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, response: ConverseResponse) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queue a failing call
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    fn push(&self, reply: std::result::Result<ConverseResponse, String>) {
        self.replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(reply);
    }

    /// Requests received, in call order
    pub fn requests(&self) -> Vec<ConverseRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl ChatModel for ScriptedChatModel {
    fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(StudioError::external("chat-model", message)),
            None => Ok(ConverseResponse::default()),
        }
    }
}

/// Stand-in for a session with no conversational backend
///
/// Every call fails, which the chat bridge reports as an error reply.
#[derive(Debug, Default)]
pub struct UnavailableChatModel;

impl ChatModel for UnavailableChatModel {
    fn converse(&self, _request: &ConverseRequest) -> Result<ConverseResponse> {
        Err(StudioError::external(
            "chat-model",
            "no conversational model is configured",
        ))
    }
}
