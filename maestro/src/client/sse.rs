//! Server-sent-events parsing for streaming completions.
//!
//! The provider emits newline-delimited `data: <json>` records terminated
//! by `data: [DONE]`. Non-`data:` lines are ignored and malformed JSON
//! records are dropped silently — the stream keeps going.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::usage::Usage;

use super::wire::StreamChunk;

/// A parsed streaming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Incremental text from `choices[0].delta.content`.
    Token(String),
    /// Terminal usage record.
    Usage(Usage),
    /// `data: [DONE]` was received.
    Done,
}

/// Streaming response parser over a byte stream.
pub struct SseParser<S> {
    inner: S,
    buffer: String,
    done: bool,
}

impl<S> std::fmt::Debug for SseParser<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseParser")
            .field("buffered", &self.buffer.len())
            .field("done", &self.done)
            .finish()
    }
}

impl<S> SseParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    /// Create a new parser over a byte stream.
    pub const fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: String::new(),
            done: false,
        }
    }

    /// Parse a single line into an event, if it produces one.
    fn parse_line(line: &str) -> Option<SseEvent> {
        let trimmed = line.trim();
        // Only data records matter; comments and field lines are skipped.
        let data = trimmed.strip_prefix("data:")?.trim();
        if data == "[DONE]" {
            return Some(SseEvent::Done);
        }
        // Malformed JSON records are dropped silently.
        let chunk: StreamChunk = serde_json::from_str(data).ok()?;
        if let Some(usage) = chunk.usage {
            return Some(SseEvent::Usage(Usage::new(
                usage.prompt_tokens,
                usage.completion_tokens,
            )));
        }
        let token = chunk.choices.into_iter().next()?.delta.content?;
        if token.is_empty() {
            return None;
        }
        Some(SseEvent::Token(token))
    }
}

impl<S> Stream for SseParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<SseEvent, crate::error::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }

            // Drain complete lines from the buffer first.
            if let Some(newline_pos) = self.buffer.find('\n') {
                let line = self.buffer[..newline_pos].to_owned();
                self.buffer.drain(..=newline_pos);

                if let Some(event) = Self::parse_line(&line) {
                    if event == SseEvent::Done {
                        self.done = true;
                    }
                    return Poll::Ready(Some(Ok(event)));
                }
                continue;
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        self.buffer.push_str(text);
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(crate::error::Error::from(e))));
                }
                Poll::Ready(None) => {
                    // Stream ended; flush whatever complete lines remain.
                    if self.buffer.is_empty() {
                        return Poll::Ready(None);
                    }
                    let remaining = std::mem::take(&mut self.buffer);
                    for line in remaining.lines() {
                        if let Some(event) = Self::parse_line(line) {
                            if event == SseEvent::Done {
                                self.done = true;
                            }
                            return Poll::Ready(Some(Ok(event)));
                        }
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
