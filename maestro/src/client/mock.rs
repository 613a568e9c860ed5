//! Scripted provider for tests.
//!
//! [`MockProvider`] answers from three layers, in order: substring rules
//! (matched against the conversation), a FIFO script, then a default.
//! Every call is recorded for assertions. Parallel callers are safe; rule
//! matching keeps multi-agent tests deterministic where FIFO order is not.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt as _;

use crate::error::{Error, Result};
use crate::usage::Usage;

use super::sse::SseEvent;
use super::{ChatOptions, ChatProvider, ChunkStream, Completion};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Answer with this text.
    Text(String),
    /// Fail with this error.
    Fail(Error),
}

/// A [`ChatProvider`] that replays a script.
#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<ScriptedResponse>>,
    rules: Mutex<Vec<(String, String)>>,
    default_response: Mutex<Option<String>>,
    calls: Mutex<Vec<ChatOptions>>,
}

impl MockProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted text reply.
    #[must_use]
    pub fn push(self, text: impl Into<String>) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .push_back(ScriptedResponse::Text(text.into()));
        self
    }

    /// Append a scripted failure.
    #[must_use]
    pub fn push_error(self, error: Error) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .push_back(ScriptedResponse::Fail(error));
        self
    }

    /// Answer with `response` whenever the conversation contains `needle`.
    ///
    /// Rules take precedence over the FIFO script and are checked in
    /// registration order.
    #[must_use]
    pub fn rule(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules
            .lock()
            .expect("rules lock")
            .push((needle.into(), response.into()));
        self
    }

    /// Fallback reply when no rule matches and the script is empty.
    #[must_use]
    pub fn with_default(self, response: impl Into<String>) -> Self {
        *self.default_response.lock().expect("default lock") = Some(response.into());
        self
    }

    /// Number of completed calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    /// Snapshot of every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<ChatOptions> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn next_response(&self, opts: &ChatOptions) -> Result<String> {
        let conversation: String = opts
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        for (needle, response) in self.rules.lock().expect("rules lock").iter() {
            if conversation.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        if let Some(scripted) = self.script.lock().expect("script lock").pop_front() {
            return match scripted {
                ScriptedResponse::Text(text) => Ok(text),
                ScriptedResponse::Fail(error) => Err(error),
            };
        }
        if let Some(default) = self.default_response.lock().expect("default lock").clone() {
            return Ok(default);
        }
        Err(Error::internal("MockProvider: script exhausted"))
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn complete(&self, opts: &ChatOptions) -> Result<Completion> {
        opts.cancel.check()?;
        self.calls.lock().expect("calls lock").push(opts.clone());
        let text = self.next_response(opts)?;
        let usage = Usage::new(0, Usage::estimate(&text));
        Ok(Completion { text, usage })
    }

    async fn stream(&self, opts: &ChatOptions) -> Result<ChunkStream> {
        let completion = self.complete(opts).await?;
        // Split the reply into small chunks so consumers exercise real
        // accumulation, then finish with usage + done.
        let chars: Vec<char> = completion.text.chars().collect();
        let mut events: Vec<Result<SseEvent>> = chars
            .chunks(7)
            .map(|c| Ok(SseEvent::Token(c.iter().collect())))
            .collect();
        events.push(Ok(SseEvent::Usage(completion.usage)));
        events.push(Ok(SseEvent::Done));
        Ok(futures::stream::iter(events).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn test_fifo_script_then_default() {
        let provider = MockProvider::new().push("first").with_default("fallback");
        let opts = ChatOptions::new(vec![Message::user("x")]);

        assert_eq!(provider.complete(&opts).await.unwrap().text, "first");
        assert_eq!(provider.complete(&opts).await.unwrap().text, "fallback");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rules_take_precedence() {
        let provider = MockProvider::new()
            .push("scripted")
            .rule("deploy", "rule matched");

        let opts = ChatOptions::new(vec![Message::user("please deploy the service")]);
        assert_eq!(provider.complete(&opts).await.unwrap().text, "rule matched");

        let opts = ChatOptions::new(vec![Message::user("unrelated")]);
        assert_eq!(provider.complete(&opts).await.unwrap().text, "scripted");
    }

    #[tokio::test]
    async fn test_stream_reassembles_to_full_text() {
        let provider = MockProvider::new().push("The quick brown fox jumps over the lazy dog");
        let opts = ChatOptions::new(vec![Message::user("x")]);

        let completion = provider.stream_complete(&opts, &|_| {}).await.unwrap();
        assert_eq!(completion.text, "The quick brown fox jumps over the lazy dog");
    }

    #[tokio::test]
    async fn test_scripted_error_surfaces() {
        let provider = MockProvider::new().push_error(Error::auth("nope"));
        let opts = ChatOptions::new(vec![Message::user("x")]);
        assert!(matches!(provider.complete(&opts).await, Err(Error::Auth { .. })));
    }
}
