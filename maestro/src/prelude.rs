//! Convenience re-exports for common usage.
//!
//! ```rust,ignore
//! use maestro::prelude::*;
//!
//! let provider = Arc::new(HttpChatClient::from_env()?);
//! let result = Orchestrator::new(provider, ".")
//!     .run(Goal::new("Add input validation to the login form"))
//!     .await;
//! ```

pub use std::sync::Arc;

pub use crate::cancel::CancelToken;
pub use crate::catalog::{AgentCatalog, AgentSpec, Domain};
pub use crate::client::{ChatOptions, ChatProvider, HttpChatClient, MockProvider};
pub use crate::context::{Attachment, ContextAssembler, MemoryStore, Retriever};
pub use crate::error::{Error, Result};
pub use crate::event::{ChannelSink, EngineEvent, EventSink, NoopSink};
pub use crate::executor::{ExecutorConfig, SubTaskResult, TieredExecutor};
pub use crate::graph::{SubTask, TaskGraph, TaskStatus};
pub use crate::message::{Message, Role};
pub use crate::pipeline::{Goal, Orchestrator, PipelineResult, RouteDetail};
pub use crate::quality::{QualityConfig, QualityPipeline};
pub use crate::react::{ReactDriver, ReactOutcome, ReactStatus};
pub use crate::route::{Route, RouteConfig, RouteSelector};
pub use crate::tool::{ParamSpec, ParamType, Tool, ToolContext, ToolRegistry};
pub use crate::usage::{TokenMeter, Usage};
