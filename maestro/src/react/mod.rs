//! ReAct driver — the single-agent reasoning loop.
//!
//! The driver alternates model turns and tool execution: stream a
//! completion, parse `<tool_call>` blocks out of it, execute them in
//! document order, inject the results as one synthetic tool_result
//! message, and repeat until the model emits no more tool calls.
//!
//! Event order within one iteration is fixed: `thinking` (when think mode
//! stripped anything), then `text`, then a `tool_call`/`tool_result` pair
//! per call in document order. Streamed deltas are never forwarded raw.
//!
//! Every assistant-role message appended to the conversation is the raw
//! model output, tool_call XML included; every tool_result message is
//! produced by the driver. The conversation shape is therefore
//! deterministic given the model outputs and tool results.

pub mod parse;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument as _};

use crate::cancel::CancelToken;
use crate::client::{ChatOptions, ChatProvider};
use crate::error::Error;
use crate::event::{EngineEvent, SharedSink};
use crate::message::Message;
use crate::tool::{ToolCallRecord, ToolContext, ToolRegistry};
use crate::usage::Usage;

use parse::{parse_tool_calls, render_tool_results, strip_think, truncate_chars};

/// Character limit for tool output shown in `tool_result` events.
pub const DISPLAY_LIMIT: usize = 2_000;

/// Default iteration budget when the agent spec does not set one.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// How a ReAct run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactStatus {
    /// The model produced a turn with no tool calls.
    Completed,
    /// The iteration budget was exhausted (soft failure).
    MaxIterations,
    /// The run was cancelled or timed out.
    Cancelled,
    /// The model call failed; the message is the error rendering.
    ModelError(String),
}

impl ReactStatus {
    /// Whether the run produced a usable final answer.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Outcome of one ReAct run.
#[derive(Debug, Clone)]
pub struct ReactOutcome {
    /// The final (or partial) response text, think blocks and tool-call
    /// XML removed.
    pub response: String,
    /// The full conversation, including raw assistant turns and synthetic
    /// tool_result messages.
    pub messages: Vec<Message>,
    /// Every executed tool call, in execution order.
    pub records: Vec<ToolCallRecord>,
    /// Number of model turns taken.
    pub iterations: usize,
    /// Accumulated usage across all turns.
    pub usage: Usage,
    /// How the run ended.
    pub status: ReactStatus,
}

impl ReactOutcome {
    /// Paths modified by successful write/edit/delete tool calls.
    #[must_use]
    pub fn files_modified(&self) -> Vec<String> {
        const MUTATING: [&str; 3] = ["write_file", "edit_file", "delete_file"];
        let mut files = Vec::new();
        for record in &self.records {
            if record.success
                && MUTATING.contains(&record.tool.as_str())
                && let Some(path) = record.args.get("path").and_then(Value::as_str)
                && !files.iter().any(|f| f == path)
            {
                files.push(path.to_owned());
            }
        }
        files
    }
}

/// The single-agent reasoning loop.
#[derive(Clone)]
pub struct ReactDriver {
    provider: Arc<dyn ChatProvider>,
    registry: ToolRegistry,
    tool_ctx: ToolContext,
    events: SharedSink,
    cancel: CancelToken,
    max_iterations: usize,
    max_tokens: Option<u32>,
    think_mode: bool,
}

impl std::fmt::Debug for ReactDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactDriver")
            .field("tools", &self.registry.len())
            .field("max_iterations", &self.max_iterations)
            .field("think_mode", &self.think_mode)
            .finish()
    }
}

impl ReactDriver {
    /// Create a driver.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        registry: ToolRegistry,
        tool_ctx: ToolContext,
        events: SharedSink,
    ) -> Self {
        let cancel = tool_ctx.cancel.clone();
        Self {
            provider,
            registry,
            tool_ctx,
            events,
            cancel,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tokens: None,
            think_mode: false,
        }
    }

    /// Set the iteration budget (tool-execution rounds).
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Cap the tokens generated per model turn.
    #[must_use]
    pub const fn token_budget(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Enable think mode.
    #[must_use]
    pub const fn think_mode(mut self, on: bool) -> Self {
        self.think_mode = on;
        self
    }

    /// Drive the loop to completion over a seeded conversation.
    ///
    /// Model errors and cancellation terminate the loop and are reported
    /// in [`ReactOutcome::status`]; text accumulated before the failure is
    /// returned as the partial response. This function itself only
    /// allocates — failures never escape as `Err`.
    pub async fn run(&self, seed: Vec<Message>) -> ReactOutcome {
        let span = info_span!("react", iterations = tracing::field::Empty);
        self.run_inner(seed).instrument(span).await
    }

    async fn run_inner(&self, seed: Vec<Message>) -> ReactOutcome {
        let mut messages = seed;
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut usage = Usage::zero();
        let mut response = String::new();
        let mut iterations = 0usize;

        let status = loop {
            if self.cancel.is_cancelled() {
                self.events.emit(EngineEvent::Error("Operation cancelled".into()));
                break ReactStatus::Cancelled;
            }

            iterations += 1;
            debug!(iteration = iterations, "Starting ReAct turn");

            let mut opts = ChatOptions::new(messages.clone())
                .think_mode(self.think_mode)
                .cancel(self.cancel.clone());
            opts.max_tokens = self.max_tokens;
            let completion = match self.provider.stream_complete(&opts, &|_| {}).await {
                Ok(completion) => completion,
                Err(Error::Cancelled | Error::Timeout { .. }) => {
                    self.events.emit(EngineEvent::Error("Operation cancelled".into()));
                    break ReactStatus::Cancelled;
                }
                Err(err) => {
                    warn!(error = %err, "Model call failed; terminating loop");
                    self.events.emit(EngineEvent::Error(err.to_string()));
                    break ReactStatus::ModelError(err.to_string());
                }
            };
            usage += completion.usage;

            // Parse order: tool calls out first, then think blocks out of
            // the remainder, so reasoning never leaks into the text event.
            let raw = completion.text;
            let parsed = parse_tool_calls(&raw);
            let (mut display, thinking) = if self.think_mode {
                strip_think(&parsed.text)
            } else {
                (parsed.text, String::new())
            };
            if !thinking.is_empty() {
                self.events.emit(EngineEvent::Thinking(thinking));
            }
            display = display.trim().to_owned();
            if !display.is_empty() {
                self.events.emit(EngineEvent::Text(display.clone()));
                response = display;
            }

            // The conversation keeps the raw model output.
            messages.push(Message::assistant(raw));

            if parsed.calls.is_empty() {
                break ReactStatus::Completed;
            }
            if iterations > self.max_iterations {
                info!(max_iterations = self.max_iterations, "Iteration budget exhausted");
                break ReactStatus::MaxIterations;
            }

            let mut turn_records = Vec::with_capacity(parsed.calls.len());
            let mut cancelled_mid_turn = false;
            for call in parsed.calls {
                if self.cancel.is_cancelled() {
                    cancelled_mid_turn = true;
                    break;
                }
                self.events.emit(EngineEvent::ToolCall {
                    tool: call.tool.clone(),
                    args: Value::Object(call.args.clone()),
                });

                let started = Instant::now();
                let outcome = self.registry.execute(&call.tool, &call.args, &self.tool_ctx).await;
                let record = ToolCallRecord {
                    tool: call.tool,
                    args: call.args,
                    result: outcome.text,
                    success: outcome.success,
                    duration: started.elapsed(),
                };

                self.events.emit(EngineEvent::ToolResult {
                    tool: record.tool.clone(),
                    success: record.success,
                    output: truncate_chars(&record.result, DISPLAY_LIMIT),
                });
                turn_records.push(record);
            }

            if !turn_records.is_empty() {
                messages.push(Message::tool_result(render_tool_results(&turn_records)));
                records.extend(turn_records);
            }
            if cancelled_mid_turn {
                self.events.emit(EngineEvent::Error("Operation cancelled".into()));
                break ReactStatus::Cancelled;
            }
        };

        tracing::Span::current().record("iterations", iterations);
        ReactOutcome {
            response,
            messages,
            records,
            iterations,
            usage,
            status,
        }
    }
}
