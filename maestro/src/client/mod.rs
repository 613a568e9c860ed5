//! Model client: chat completions over an OpenAI-compatible API.
//!
//! [`ChatProvider`] is the seam every subsystem calls through —
//! non-streaming [`complete`](ChatProvider::complete) for decomposition,
//! critics, rewrites, and one-shot helpers; streaming
//! [`stream`](ChatProvider::stream) for the ReAct driver.
//! [`HttpChatClient`] is the production implementation;
//! [`MockProvider`] is the scripted test double.

mod http;
mod mock;
mod sse;
mod wire;

pub use http::{HttpChatClient, HttpChatClientBuilder};
pub use mock::{MockProvider, ScriptedResponse};
pub use sse::{SseEvent, SseParser};

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::message::Message;
use crate::usage::Usage;

/// Reasoning-token budget named in the think-mode preamble.
pub const THINK_BUDGET_TOKENS: u32 = 2_048;

/// System-level preamble prepended when think mode is enabled.
#[must_use]
pub fn think_mode_preamble() -> String {
    format!(
        "Reason step by step inside <think>...</think> before answering. \
         Keep the reasoning under {THINK_BUDGET_TOKENS} tokens. \
         Never place tool calls inside think blocks.",
    )
}

/// Options for one chat completion call.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    pub stop: Option<Vec<String>>,
    /// Prepend the think-mode preamble and budget.
    pub think_mode: bool,
    /// Cancellation handle checked before, during, and after the call.
    pub cancel: CancelToken,
}

impl ChatOptions {
    /// Options with the given messages and engine defaults elsewhere.
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
            think_mode: false,
            cancel: CancelToken::new(),
        }
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of generated tokens.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Enable think mode for this call.
    #[must_use]
    pub const fn think_mode(mut self, on: bool) -> Self {
        self.think_mode = on;
        self
    }

    /// Attach a cancellation handle.
    #[must_use]
    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Messages with the think-mode preamble applied when enabled.
    #[must_use]
    pub fn effective_messages(&self) -> Vec<Message> {
        if !self.think_mode {
            return self.messages.clone();
        }
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(Message::system(think_mode_preamble()));
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

/// A completed (fully accumulated) chat response.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The full response text.
    pub text: String,
    /// Token usage, provider-reported or estimated.
    pub usage: Usage,
}

/// A stream of [`SseEvent`]s from an in-flight completion.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<SseEvent>> + Send>>;

/// Chat completion provider.
///
/// Implementations must be safe under concurrent requests; each request
/// carries its own cancellation handle in [`ChatOptions`].
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run a non-streaming completion and return the full text.
    async fn complete(&self, opts: &ChatOptions) -> Result<Completion>;

    /// Open a streaming completion.
    async fn stream(&self, opts: &ChatOptions) -> Result<ChunkStream>;

    /// Stream a completion to a token callback, returning the accumulated text.
    ///
    /// The default implementation drains [`stream`](Self::stream), invoking
    /// `on_token` per text chunk, estimating usage when the provider sends
    /// none, and recording totals into the process [`TokenMeter`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Cancelled`] when the handle fires mid-stream;
    /// transport errors propagate from the underlying stream.
    async fn stream_complete(
        &self,
        opts: &ChatOptions,
        on_token: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> Result<Completion> {
        use futures::StreamExt as _;

        opts.cancel.check()?;
        let mut chunks = self.stream(opts).await?;
        let mut text = String::new();
        let mut usage: Option<Usage> = None;

        loop {
            let next = tokio::select! {
                () = opts.cancel.cancelled() => return Err(crate::error::Error::Cancelled),
                next = chunks.next() => next,
            };
            let Some(event) = next else { break };
            match event? {
                SseEvent::Token(token) => {
                    on_token(&token);
                    text.push_str(&token);
                }
                SseEvent::Usage(reported) => usage = Some(reported),
                SseEvent::Done => break,
            }
        }

        let usage = usage.unwrap_or_else(|| Usage::new(0, Usage::estimate(&text)));
        crate::usage::TokenMeter::global().record(usage);
        Ok(Completion { text, usage })
    }
}
