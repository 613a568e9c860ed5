//! Orchestrator facade — goal in, pipeline result out.
//!
//! Routes a [`Goal`] through one of the five paths and normalizes the
//! outcome into a [`PipelineResult`]. The orchestrator owns the shared
//! plumbing every path needs: the provider, the tool registry, the agent
//! catalog, the event sink, and the workspace root.

pub mod app;
pub mod standard;

pub use app::{AppReport, ArchitectureSpec, PhaseRecord, PhaseStatus, TechStack};
pub use standard::StandardReport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, info_span, Instrument as _};

use crate::cancel::CancelToken;
use crate::catalog::{AgentCatalog, Domain};
use crate::client::{ChatOptions, ChatProvider};
use crate::context::{Attachment, ContextAssembler};
use crate::decompose::Decomposer;
use crate::error::{Error, Result};
use crate::event::{noop_sink, EngineEvent, SharedSink};
use crate::executor::{ExecutorConfig, TieredExecutor};
use crate::message::Message;
use crate::prompts;
use crate::quality::{QualityPipeline, QualityReport};
use crate::react::{ReactDriver, ReactOutcome};
use crate::route::{Route, RouteConfig, RouteSelector};
use crate::tool::{ToolContext, ToolRegistry};
use crate::usage::TokenMeter;

/// A request to the engine.
#[derive(Debug, Clone)]
pub struct Goal {
    /// The natural-language goal.
    pub text: String,
    /// Prior conversation turns (chat continuation).
    pub prior: Vec<Message>,
    /// Attachments to merge into context.
    pub attachments: Vec<Attachment>,
    /// Cancellation handle shared with every subsystem.
    pub cancel: CancelToken,
    /// Whether specialists reason in think mode.
    pub think_mode: bool,
}

impl Goal {
    /// A goal with no prior context.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prior: Vec::new(),
            attachments: Vec::new(),
            cancel: CancelToken::new(),
            think_mode: false,
        }
    }

    /// Attach a cancellation handle.
    #[must_use]
    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Enable think mode.
    #[must_use]
    pub const fn think_mode(mut self, on: bool) -> Self {
        self.think_mode = on;
        self
    }

    /// Seed prior conversation turns.
    #[must_use]
    pub fn prior(mut self, prior: Vec<Message>) -> Self {
        self.prior = prior;
        self
    }

    /// Attach request attachments.
    #[must_use]
    pub fn attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Route-specific detail inside a [`PipelineResult`].
#[derive(Debug)]
#[non_exhaustive]
pub enum RouteDetail {
    /// Simple assistant pass.
    Simple(ReactOutcome),
    /// Standard plan → code → review.
    Standard(StandardReport),
    /// DAG execution report.
    Dag(crate::executor::ExecutionReport),
    /// App pipeline report.
    App(AppReport),
    /// Quality pipeline report.
    Quality(QualityReport),
}

/// Aggregate result of one engine run.
#[derive(Debug)]
pub struct PipelineResult {
    /// Unique id of this run (also on the run's tracing span).
    pub run_id: uuid::Uuid,
    /// Whether the run succeeded.
    pub success: bool,
    /// The route taken.
    pub route: Route,
    /// Final user-facing text (answer or summary).
    pub response: String,
    /// Route-specific detail.
    pub detail: Option<RouteDetail>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Total tokens the process had consumed when the run finished.
    pub tokens_total: u64,
}

impl PipelineResult {
    fn cancelled(run_id: uuid::Uuid, route: Route, duration: Duration) -> Self {
        Self {
            run_id,
            success: false,
            route,
            response: "Operation cancelled.".to_owned(),
            detail: None,
            duration,
            tokens_total: TokenMeter::global().snapshot().total(),
        }
    }

    fn hard_failure(run_id: uuid::Uuid, route: Route, err: &Error, duration: Duration) -> Self {
        Self {
            run_id,
            success: false,
            route,
            response: format!("[{}] {err}", err.kind()),
            detail: None,
            duration,
            tokens_total: TokenMeter::global().snapshot().total(),
        }
    }
}

/// The engine entry point.
pub struct Orchestrator {
    provider: Arc<dyn ChatProvider>,
    registry: ToolRegistry,
    catalog: Arc<AgentCatalog>,
    events: SharedSink,
    workspace_root: PathBuf,
    workspace_context: Option<String>,
    assembler: Option<ContextAssembler>,
    selector: RouteSelector,
    executor_config: ExecutorConfig,
    think_mode: bool,
    cancel: CancelToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workspace_root", &self.workspace_root)
            .field("tools", &self.registry.len())
            .field("agents", &self.catalog.len())
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator with built-in agents and default routing.
    #[must_use]
    pub fn new(provider: Arc<dyn ChatProvider>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            registry: ToolRegistry::new(),
            catalog: Arc::new(AgentCatalog::with_builtins()),
            events: noop_sink(),
            workspace_root: workspace_root.into(),
            workspace_context: None,
            assembler: None,
            selector: RouteSelector::default(),
            executor_config: ExecutorConfig::default(),
            think_mode: false,
            cancel: CancelToken::new(),
        }
    }

    /// Attach the tool registry.
    #[must_use]
    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the agent catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: Arc<AgentCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Attach the event sink.
    #[must_use]
    pub fn events(mut self, events: SharedSink) -> Self {
        self.events = events;
        self
    }

    /// Attach a pre-assembled workspace context block.
    #[must_use]
    pub fn workspace_context(mut self, context: impl Into<String>) -> Self {
        self.workspace_context = Some(context.into());
        self
    }

    /// Attach a context assembler; each run then assembles a fresh block
    /// from the goal and its attachments.
    #[must_use]
    pub fn assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    /// Override route selection.
    #[must_use]
    pub fn route_config(mut self, config: RouteConfig) -> Self {
        self.selector = RouteSelector::new(config);
        self
    }

    /// Override executor behavior.
    #[must_use]
    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Run a goal through the engine.
    pub async fn run(&self, goal: Goal) -> PipelineResult {
        let run_id = uuid::Uuid::new_v4();
        let route = self.selector.select(&goal.text);
        let span = info_span!("pipeline", %run_id, route = route.as_str());
        self.run_routed(goal, route, run_id).instrument(span).await
    }

    async fn run_routed(&self, goal: Goal, route: Route, run_id: uuid::Uuid) -> PipelineResult {
        let started = Instant::now();
        info!(route = route.as_str(), "Goal routed");
        self.events.emit(EngineEvent::Status(format!("route: {}", route.as_str())));

        // A fresh context block when an assembler is attached; otherwise
        // whatever was set at construction.
        let workspace_context = if let Some(assembler) = &self.assembler {
            Some(assembler.assemble(&goal.text, &goal.attachments).await)
        } else {
            self.workspace_context.clone()
        };

        // The goal's cancellation handle and think flag scope every
        // downstream call for this request.
        let scoped = Self {
            provider: Arc::clone(&self.provider),
            registry: self.registry.clone(),
            catalog: Arc::clone(&self.catalog),
            events: Arc::clone(&self.events),
            workspace_root: self.workspace_root.clone(),
            workspace_context,
            assembler: None,
            selector: self.selector,
            executor_config: self.executor_config.clone(),
            think_mode: goal.think_mode,
            cancel: goal.cancel.clone(),
        };

        let result = match route {
            Route::Simple => scoped.run_simple(&goal).await,
            Route::Standard => standard::run_standard(&scoped, &goal.text)
                .await
                .map(|report| {
                    let response = report.summary.clone();
                    (report.success, response, RouteDetail::Standard(report))
                }),
            Route::Dag => Ok(scoped.run_dag(&goal).await),
            Route::AppPipeline => app::run_app(&scoped, &goal.text).await.map(|report| {
                let response = report.summary();
                (report.is_success(), response, RouteDetail::App(report))
            }),
            Route::Quality => QualityPipeline::new(Arc::clone(&scoped.provider))
                .run(&goal.text, &goal.cancel, &scoped.events)
                .await
                .map(|report| {
                    let response = report.final_text.clone();
                    (true, response, RouteDetail::Quality(report))
                }),
        };

        let duration = started.elapsed();
        let result = match result {
            Ok((success, response, detail)) => PipelineResult {
                run_id,
                success,
                route,
                response,
                detail: Some(detail),
                duration,
                tokens_total: TokenMeter::global().snapshot().total(),
            },
            Err(err) if err.is_cancellation() => {
                PipelineResult::cancelled(run_id, route, duration)
            }
            Err(err) => PipelineResult::hard_failure(run_id, route, &err, duration),
        };
        self.events.emit(EngineEvent::Done);
        result
    }

    /// The simple assistant pass: one ReAct run, no tools.
    async fn run_simple(&self, goal: &Goal) -> Result<(bool, String, RouteDetail)> {
        let mut seed = vec![Message::system(
            "You are a concise engineering assistant. Answer directly; \
             use short examples when they help.",
        )];
        seed.extend(goal.prior.iter().cloned());
        seed.push(Message::user(goal.text.clone()));

        let driver = ReactDriver::new(
            Arc::clone(&self.provider),
            ToolRegistry::new(),
            ToolContext::new(self.workspace_root.clone())
                .with_events(Arc::clone(&self.events))
                .with_cancel(self.cancel.clone()),
            Arc::clone(&self.events),
        )
        .max_iterations(1)
        .think_mode(self.think_mode);

        let outcome = driver.run(seed).await;
        if outcome.status == crate::react::ReactStatus::Cancelled {
            return Err(Error::Cancelled);
        }
        let success = outcome.status.is_completed();
        let response = outcome.response.clone();
        Ok((success, response, RouteDetail::Simple(outcome)))
    }

    /// The DAG path: decompose, then execute in tiers.
    async fn run_dag(&self, goal: &Goal) -> (bool, String, RouteDetail) {
        self.events.emit(EngineEvent::Status("decomposing goal".into()));
        let graph = Decomposer::new(Arc::clone(&self.provider))
            .decompose(&goal.text, &goal.cancel)
            .await;

        let mut executor = TieredExecutor::new(
            Arc::clone(&self.provider),
            self.registry.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.events),
            self.workspace_root.clone(),
        )
        .config(self.executor_config.clone());
        if let Some(context) = &self.workspace_context {
            executor = executor.workspace_context(context.clone());
        }

        let report = executor.execute(graph, &goal.cancel).await;
        let response = if report.cancelled {
            format!("Pipeline cancelled.\n\n{}", report.summary())
        } else {
            report.summary()
        };
        (report.is_success(), response, RouteDetail::Dag(report))
    }

    /// Run one specialist by domain over a task description.
    ///
    /// Shared by the standard and app pipelines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AgentUnavailable`] when no spec covers `domain`.
    pub(crate) async fn run_specialist(&self, domain: &Domain, task: &str) -> Result<ReactOutcome> {
        let spec = self
            .catalog
            .by_domain(domain)
            .ok_or_else(|| Error::agent_unavailable(domain.as_str()))?;

        let tools = if spec.is_tool_less() {
            ToolRegistry::new()
        } else {
            self.registry.filtered(spec.allowed_tools.as_ref())
        };
        let system = prompts::specialist_system(
            &spec.display_name,
            &spec.instructions,
            &tools.describe_for_prompt(),
            spec.requires_workspace
                .then(|| self.workspace_context.as_deref().unwrap_or_default()),
        );

        let driver = ReactDriver::new(
            Arc::clone(&self.provider),
            tools,
            ToolContext::new(self.workspace_root.clone())
                .with_events(Arc::clone(&self.events))
                .with_cancel(self.cancel.clone()),
            Arc::clone(&self.events),
        )
        .max_iterations(spec.max_iterations)
        .token_budget(spec.token_budget)
        .think_mode(self.think_mode);

        Ok(driver
            .run(vec![Message::system(system), Message::user(task.to_owned())])
            .await)
    }

    /// One-shot non-streaming helper with a system prompt.
    pub(crate) async fn complete_with_system(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String> {
        let opts = ChatOptions::new(vec![
            Message::system(system.to_owned()),
            Message::user(user.to_owned()),
        ])
        .temperature(temperature)
        .cancel(self.cancel.clone());
        Ok(self.provider.complete(&opts).await?.text)
    }

    pub(crate) fn sink(&self) -> &SharedSink {
        &self.events
    }

    pub(crate) const fn cancel(&self) -> &CancelToken {
        &self.cancel
    }
}
