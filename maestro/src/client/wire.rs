//! Wire structures for the OpenAI-compatible chat completions API.
//!
//! Kept separate from the engine's domain types: [`crate::message::Message`]
//! converts into [`WireMessage`] at the transport boundary, where the
//! engine-internal `tool_result` role becomes a `user` turn.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<WireMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response.
    pub stream: bool,
    /// Stream options; `include_usage` when streaming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

/// Streaming request options.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreamOptions {
    /// Ask the provider to append a terminal usage record.
    pub include_usage: bool,
}

/// A message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Wire role (`system`, `user`, `assistant`).
    pub role: String,
    /// Text content.
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.wire_name().to_owned(),
            content: msg.content.clone(),
        }
    }
}

/// Non-streaming response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    /// Response choices; the engine reads the first.
    #[serde(default)]
    pub choices: Vec<ResponseChoice>,
    /// Token usage.
    pub usage: Option<WireUsage>,
}

/// A non-streaming response choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseChoice {
    /// The generated message.
    pub message: ResponseMessage,
}

/// The message inside a response choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    /// Generated text; absent for some refusal shapes.
    pub content: Option<String>,
}

/// A streaming chunk (`data: {…}` record).
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    /// Chunk choices; the engine reads the first.
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    /// Usage; providers send it in a terminal record when requested.
    pub usage: Option<WireUsage>,
}

/// A streaming chunk choice.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    /// Incremental delta.
    pub delta: StreamDelta,
}

/// Delta content in a streaming chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDelta {
    /// Incremental text content.
    pub content: Option<String>,
}

/// Usage object on the wire.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WireUsage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u64,
}
