//! Engine events and the sink they are delivered through.
//!
//! The engine never talks to a UI directly. Every observable step — phase
//! boundaries, assistant text, thinking traces, tool calls and results,
//! errors, completion — is emitted as an [`EngineEvent`] into a caller-owned
//! [`EventSink`]. Producers may be concurrent specialists; the channel-backed
//! sink decouples their timing from the consumer's.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

/// An event emitted by the engine during a run.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EngineEvent {
    /// A phase or routing boundary was crossed.
    Status(String),
    /// Assistant-visible text (the non-tool-call remainder of a turn).
    Text(String),
    /// Stripped `<think>` content from a think-mode turn.
    Thinking(String),
    /// A tool is about to be invoked.
    ToolCall {
        /// Tool name.
        tool: String,
        /// Invocation arguments.
        args: Value,
    },
    /// A tool invocation finished.
    ToolResult {
        /// Tool name.
        tool: String,
        /// Whether the tool reported success.
        success: bool,
        /// Display-truncated result text.
        output: String,
    },
    /// A non-recoverable error occurred in the emitting subsystem.
    Error(String),
    /// An assistant turn is starting.
    StartAssistant,
    /// An assistant turn has ended.
    EndAssistant,
    /// The run is complete.
    Done,
    /// The UI should clear its transcript.
    Clear,
    /// A user message was added to the conversation programmatically.
    AddUserMessage(String),
    /// Think mode was toggled.
    ThinkModeChanged(bool),
    /// The attachment set changed.
    AttachmentsUpdated(usize),
}

/// Destination for engine events.
///
/// Implementations must be cheap and non-blocking: the engine emits from
/// its own execution context, including from parallel specialists.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: EngineEvent);
}

impl fmt::Debug for dyn EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Shared handle to an event sink.
pub type SharedSink = Arc<dyn EventSink>;

/// A sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// A sink backed by an unbounded channel.
///
/// The engine emits without awaiting; the consumer drains at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving half.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        // A closed receiver just means nobody is watching anymore.
        let _ = self.tx.send(event);
    }
}

/// A sink that invokes a closure per event.
pub struct FnSink<F>(pub F);

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSink")
    }
}

impl<F> EventSink for FnSink<F>
where
    F: Fn(EngineEvent) + Send + Sync,
{
    fn emit(&self, event: EngineEvent) {
        (self.0)(event);
    }
}

/// Convenience constructor for a shared no-op sink.
#[must_use]
pub fn noop_sink() -> SharedSink {
    Arc::new(NoopSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(EngineEvent::Status("routing".into()));
        sink.emit(EngineEvent::Text("hello".into()));
        sink.emit(EngineEvent::Done);

        assert_eq!(rx.recv().await, Some(EngineEvent::Status("routing".into())));
        assert_eq!(rx.recv().await, Some(EngineEvent::Text("hello".into())));
        assert_eq!(rx.recv().await, Some(EngineEvent::Done));
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(EngineEvent::Done);
    }

    #[test]
    fn test_fn_sink_invokes_closure() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let count = AtomicUsize::new(0);
        let sink = FnSink(|_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        sink.emit(EngineEvent::Done);
        sink.emit(EngineEvent::Clear);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
