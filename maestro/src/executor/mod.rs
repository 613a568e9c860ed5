//! Tiered executor — bounded-parallel execution of a task graph.
//!
//! Tiers come from Kahn grouping on the graph; within a tier, tasks run
//! in batches of at most `max_parallel` workers, each worker a ReAct
//! driver in its own spawned task so a crash cannot take down batch
//! siblings. Later tiers read earlier results from a flat
//! `task id → SubTaskResult` map; a failed dependency skips its
//! dependents before they launch. Per-agent deadlines combine with the
//! caller's cancellation handle by logical OR.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::catalog::{AgentCatalog, AgentSpec, Domain};
use crate::client::ChatProvider;
use crate::error::Error;
use crate::event::{EngineEvent, SharedSink};
use crate::graph::{TaskGraph, TaskStatus};
use crate::message::Message;
use crate::prompts;
use crate::react::parse::truncate_chars;
use crate::react::{ReactDriver, ReactStatus};
use crate::tool::{ToolContext, ToolRegistry};

/// Character budget per dependency response in a worker's context block.
pub const DEP_CONTEXT_LIMIT: usize = 3_000;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum workers per batch.
    pub max_parallel: usize,
    /// Per-agent wall-clock deadline.
    pub agent_deadline: Duration,
    /// Domains whose failures do not fail the pipeline.
    pub lenient_domains: BTreeSet<Domain>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            agent_deadline: Duration::from_secs(120),
            lenient_domains: BTreeSet::from([Domain::Docs]),
        }
    }
}

/// Result of one sub-task run.
#[derive(Debug, Clone)]
pub struct SubTaskResult {
    /// The task this result belongs to.
    pub task_id: String,
    /// Domain that ran it.
    pub domain: Domain,
    /// Whether the run completed normally.
    pub success: bool,
    /// The specialist's final (or partial) response.
    pub response: String,
    /// Files modified by successful mutating tool calls.
    pub files_modified: Vec<String>,
    /// Number of tool calls executed.
    pub tool_call_count: usize,
    /// Model turns taken.
    pub iterations: usize,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Tokens consumed.
    pub tokens_used: u64,
    /// Error rendering when the run did not complete.
    pub error: Option<String>,
}

impl SubTaskResult {
    fn skipped(task_id: &str, domain: Domain) -> Self {
        Self {
            task_id: task_id.to_owned(),
            domain,
            success: false,
            response: "Skipped: dependency failed".to_owned(),
            files_modified: Vec::new(),
            tool_call_count: 0,
            iterations: 0,
            duration: Duration::ZERO,
            tokens_used: 0,
            error: Some("dependency failed".to_owned()),
        }
    }

    fn failed(task_id: &str, domain: Domain, error: String) -> Self {
        Self {
            task_id: task_id.to_owned(),
            domain,
            success: false,
            response: String::new(),
            files_modified: Vec::new(),
            tool_call_count: 0,
            iterations: 0,
            duration: Duration::ZERO,
            tokens_used: 0,
            error: Some(error),
        }
    }
}

/// Aggregate outcome of a graph execution.
#[derive(Debug)]
pub struct ExecutionReport {
    /// The graph, statuses updated in place.
    pub graph: TaskGraph,
    /// Results keyed by task id, populated strictly in tier order.
    pub results: HashMap<String, SubTaskResult>,
    /// Number of tiers that were started.
    pub tiers_run: usize,
    /// Highest number of workers observed in flight at once.
    pub peak_parallelism: usize,
    /// Whether the run stopped on cancellation.
    pub cancelled: bool,
    /// Lenient domains used for the success criterion.
    lenient_domains: BTreeSet<Domain>,
}

impl ExecutionReport {
    /// Pipeline success: not cancelled, and no non-lenient task failed.
    /// Skips do not count as failures.
    #[must_use]
    pub fn is_success(&self) -> bool {
        if self.cancelled {
            return false;
        }
        self.graph.tasks.iter().all(|task| {
            task.status != TaskStatus::Failed || self.lenient_domains.contains(&task.domain)
        })
    }

    /// Per-task checkmark summary, one line per task in graph order.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.graph.tasks.len());
        for task in &self.graph.tasks {
            let detail = self.results.get(&task.id).map_or_else(String::new, |r| {
                if r.success {
                    format!(
                        " — {} tool call(s), {} iteration(s), {:.1}s",
                        r.tool_call_count,
                        r.iterations,
                        r.duration.as_secs_f64(),
                    )
                } else {
                    r.error
                        .as_ref()
                        .map_or_else(String::new, |e| format!(" — {e}"))
                }
            });
            lines.push(format!(
                "{} {} ({}) {}{detail}",
                task.status.symbol(),
                task.id,
                task.domain,
                task.title,
            ));
        }
        lines.join("\n")
    }
}

/// Executes a [`TaskGraph`] tier by tier.
#[derive(Clone)]
pub struct TieredExecutor {
    provider: Arc<dyn ChatProvider>,
    registry: ToolRegistry,
    catalog: Arc<AgentCatalog>,
    events: SharedSink,
    workspace_root: std::path::PathBuf,
    workspace_context: Option<String>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for TieredExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredExecutor")
            .field("max_parallel", &self.config.max_parallel)
            .field("agent_deadline", &self.config.agent_deadline)
            .finish()
    }
}

impl TieredExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        registry: ToolRegistry,
        catalog: Arc<AgentCatalog>,
        events: SharedSink,
        workspace_root: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            provider,
            registry,
            catalog,
            events,
            workspace_root: workspace_root.into(),
            workspace_context: None,
            config: ExecutorConfig::default(),
        }
    }

    /// Override the configuration.
    #[must_use]
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an assembled workspace-context block for specialists that
    /// require workspace awareness.
    #[must_use]
    pub fn workspace_context(mut self, context: impl Into<String>) -> Self {
        self.workspace_context = Some(context.into());
        self
    }

    /// Execute the graph to completion, cancellation, or exhaustion.
    pub async fn execute(&self, mut graph: TaskGraph, cancel: &CancelToken) -> ExecutionReport {
        let tiers = graph.tiers();
        let mut results: HashMap<String, SubTaskResult> = HashMap::new();
        let mut tiers_run = 0usize;
        let mut peak_parallelism = 0usize;
        let mut cancelled = false;

        'tiers: for (tier_index, tier) in tiers.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break 'tiers;
            }
            tiers_run += 1;
            self.events.emit(EngineEvent::Status(format!(
                "tier {}/{}: {} task(s)",
                tier_index + 1,
                tiers.len(),
                tier.len(),
            )));

            for batch in tier.chunks(self.config.max_parallel.max(1)) {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'tiers;
                }

                let mut launches = Vec::new();
                for id in batch {
                    let task = graph.get(id).expect("tier ids come from the graph").clone();

                    // Dependency-failure propagation happens before launch.
                    let failed_dep = task.dependencies.iter().any(|dep| {
                        results.get(dep).is_none_or(|r| !r.success)
                    });
                    if failed_dep {
                        info!(task = %task.id, "Skipping task: dependency failed");
                        results.insert(
                            task.id.clone(),
                            SubTaskResult::skipped(&task.id, task.domain.clone()),
                        );
                        set_status(&mut graph, &task.id, TaskStatus::Skipped);
                        continue;
                    }

                    set_status(&mut graph, &task.id, TaskStatus::Queued);
                    let dep_context = self.dependency_context(&task.dependencies, &results);
                    launches.push((task, dep_context));
                }

                peak_parallelism = peak_parallelism.max(launches.len());
                let mut handles = Vec::with_capacity(launches.len());
                for (task, dep_context) in launches {
                    set_status(&mut graph, &task.id, TaskStatus::Running);
                    let worker = self.worker(&task, dep_context, cancel);
                    let task_id = task.id.clone();
                    let domain = task.domain.clone();
                    handles.push((task_id, domain, tokio::spawn(worker)));
                }

                for (task_id, domain, handle) in handles {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(join_err) => {
                            // A panicking worker is isolated to its own task.
                            warn!(task = %task_id, error = %join_err, "Worker crashed");
                            SubTaskResult::failed(&task_id, domain, join_err.to_string())
                        }
                    };
                    let status = if result.success {
                        TaskStatus::Completed
                    } else if cancel.is_cancelled() {
                        TaskStatus::Cancelled
                    } else {
                        TaskStatus::Failed
                    };
                    set_status(&mut graph, &task_id, status);
                    results.insert(task_id, result);
                }
            }
        }

        if cancelled {
            for task in &mut graph.tasks {
                if matches!(task.status, TaskStatus::Pending | TaskStatus::Queued) {
                    task.status = TaskStatus::Cancelled;
                }
            }
        }

        info!(
            tiers_run,
            peak_parallelism,
            cancelled,
            completed = results.values().filter(|r| r.success).count(),
            "Graph execution finished",
        );
        ExecutionReport {
            graph,
            results,
            tiers_run,
            peak_parallelism,
            cancelled,
            lenient_domains: self.config.lenient_domains.clone(),
        }
    }

    /// Build the dependency-result context block for one task.
    fn dependency_context(
        &self,
        dependencies: &[String],
        results: &HashMap<String, SubTaskResult>,
    ) -> String {
        let mut block = String::new();
        for dep in dependencies {
            if let Some(result) = results.get(dep) {
                block.push_str(&format!(
                    "### Result from {} ({})\n{}\n\n",
                    result.task_id,
                    result.domain,
                    truncate_chars(&result.response, DEP_CONTEXT_LIMIT),
                ));
            }
        }
        block
    }

    /// Build the future that runs one sub-task end to end.
    ///
    /// Everything the worker needs is cloned in here so the future is
    /// `'static` and can be spawned.
    fn worker(
        &self,
        task: &crate::graph::SubTask,
        dep_context: String,
        cancel: &CancelToken,
    ) -> impl std::future::Future<Output = SubTaskResult> + Send + use<> {
        let provider = Arc::clone(&self.provider);
        let events = Arc::clone(&self.events);
        let registry = self.registry.clone();
        let workspace_root = self.workspace_root.clone();
        let workspace_context = self.workspace_context.clone();
        let spec = self.catalog.by_domain(&task.domain);
        let deadline = self.config.agent_deadline;
        let caller_cancel = cancel.clone();
        let task = task.clone();

        async move {
            let Some(spec) = spec else {
                return SubTaskResult::failed(
                    &task.id,
                    task.domain.clone(),
                    Error::agent_unavailable(task.domain.as_str()).to_string(),
                );
            };

            let started = Instant::now();
            let combined = caller_cancel.merged(&CancelToken::deadline(deadline));
            let tools = if spec.is_tool_less() {
                ToolRegistry::new()
            } else {
                registry.filtered(spec.allowed_tools.as_ref())
            };

            let seed = build_seed(&spec, &tools, workspace_context.as_deref(), &task, &dep_context);
            let driver = ReactDriver::new(
                provider,
                tools,
                ToolContext::new(workspace_root)
                    .with_events(Arc::clone(&events))
                    .with_cancel(combined),
                events,
            )
            .max_iterations(spec.max_iterations)
            .token_budget(spec.token_budget);

            let outcome = driver.run(seed).await;
            let (success, error) = match &outcome.status {
                ReactStatus::Completed => (true, None),
                ReactStatus::MaxIterations => (false, Some("max steps reached".to_owned())),
                ReactStatus::Cancelled => (false, Some("cancelled".to_owned())),
                ReactStatus::ModelError(message) => (false, Some(message.clone())),
            };
            SubTaskResult {
                task_id: task.id.clone(),
                domain: task.domain.clone(),
                success,
                response: outcome.response.clone(),
                files_modified: outcome.files_modified(),
                tool_call_count: outcome.records.len(),
                iterations: outcome.iterations,
                duration: started.elapsed(),
                tokens_used: outcome.usage.total(),
                error,
            }
        }
    }
}

fn set_status(graph: &mut TaskGraph, id: &str, status: TaskStatus) {
    if let Some(task) = graph.get_mut(id) {
        task.status = status;
    }
}

/// Seed conversation for one specialist run.
fn build_seed(
    spec: &AgentSpec,
    tools: &ToolRegistry,
    workspace_context: Option<&str>,
    task: &crate::graph::SubTask,
    dep_context: &str,
) -> Vec<Message> {
    let system = prompts::specialist_system(
        &spec.display_name,
        &spec.instructions,
        &tools.describe_for_prompt(),
        spec.requires_workspace.then_some(workspace_context.unwrap_or_default()),
    );

    let mut user = format!("Task: {}\n{}", task.title, task.description);
    if !task.relevant_files.is_empty() {
        user.push_str(&format!("\nRelevant files: {}", task.relevant_files.join(", ")));
    }
    if !dep_context.is_empty() {
        user.push_str("\n\nResults from prerequisite tasks:\n");
        user.push_str(dep_context);
    }

    vec![Message::system(system), Message::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockProvider;
    use crate::decompose::fallback_graph;
    use crate::event::ChannelSink;
    use crate::graph::SubTask;

    fn executor(provider: MockProvider) -> TieredExecutor {
        let (sink, _rx) = ChannelSink::new();
        TieredExecutor::new(
            Arc::new(provider),
            ToolRegistry::new(),
            Arc::new(AgentCatalog::with_builtins()),
            Arc::new(sink),
            "/tmp",
        )
    }

    fn graph(tasks: Vec<SubTask>) -> TaskGraph {
        TaskGraph::new("goal", tasks).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_graph_runs_in_three_tiers() {
        let provider = MockProvider::new().with_default("done");
        let report = executor(provider)
            .execute(fallback_graph("ship"), &CancelToken::new())
            .await;

        assert!(report.is_success());
        assert_eq!(report.tiers_run, 3);
        assert_eq!(report.results.len(), 3);
        assert!(report.results.values().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_dependency_results_reach_later_tiers() {
        let provider = MockProvider::new()
            .rule("Task: first", "FIRST_RESULT_MARKER")
            .rule("FIRST_RESULT_MARKER", "saw it");
        let g = graph(vec![
            SubTask::new("first", "first", "produce a marker", Domain::Coder),
            SubTask::new("second", "second", "consume the marker", Domain::Coder)
                .depends_on(["first"]),
        ]);

        let report = executor(provider).execute(g, &CancelToken::new()).await;
        assert!(report.is_success());
        assert_eq!(report.results["second"].response, "saw it");
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependents() {
        // "boom" fails because no spec exists for its custom domain.
        let provider = MockProvider::new().with_default("fine");
        let g = graph(vec![
            SubTask::new("boom", "boom", "fails by unavailable domain", Domain::Custom("ghost".into())),
            SubTask::new("child", "child", "needs boom", Domain::Coder).depends_on(["boom"]),
            SubTask::new("free", "free", "independent", Domain::Coder),
        ]);

        let report = executor(provider).execute(g, &CancelToken::new()).await;
        assert!(!report.is_success());
        assert_eq!(report.graph.get("boom").unwrap().status, TaskStatus::Failed);
        assert_eq!(report.graph.get("child").unwrap().status, TaskStatus::Skipped);
        assert_eq!(report.results["child"].response, "Skipped: dependency failed");
        // Failure is isolated: the independent sibling still ran.
        assert_eq!(report.graph.get("free").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_lenient_domain_failure_keeps_success() {
        let provider = MockProvider::new().with_default("fine");
        let g = graph(vec![
            SubTask::new("code", "code", "implement", Domain::Coder),
            SubTask::new("docs", "docs", "document", Domain::Custom("ghost-docs".into())),
        ]);
        let mut config = ExecutorConfig::default();
        config
            .lenient_domains
            .insert(Domain::Custom("ghost-docs".into()));

        let report = executor(provider)
            .config(config)
            .execute(g, &CancelToken::new())
            .await;
        // The ghost-docs task failed (no spec for its domain) but the
        // pipeline still counts as a success.
        assert_eq!(report.graph.get("docs").unwrap().status, TaskStatus::Failed);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let provider = MockProvider::new().with_default("done");
        let g = graph(vec![
            SubTask::new("t1", "t1", "tier one", Domain::Coder),
            SubTask::new("t2", "t2", "tier two", Domain::Coder).depends_on(["t1"]),
        ]);

        let report = executor(provider).execute(g, &cancel).await;
        assert!(report.cancelled);
        assert!(!report.is_success());
        assert_eq!(report.tiers_run, 0);
        assert!(report.results.is_empty());
        assert!(report
            .graph
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_peak_parallelism_bounded() {
        let provider = MockProvider::new().with_default("done");
        let g = graph(
            (0..6)
                .map(|i| SubTask::new(format!("t{i}"), "t", "work", Domain::Coder))
                .collect(),
        );
        let mut config = ExecutorConfig::default();
        config.max_parallel = 2;

        let report = executor(provider).config(config).execute(g, &CancelToken::new()).await;
        assert!(report.is_success());
        assert!(report.peak_parallelism <= 2);
        assert_eq!(report.results.len(), 6);
    }

    #[tokio::test]
    async fn test_summary_has_one_line_per_task() {
        let provider = MockProvider::new().with_default("done");
        let report = executor(provider)
            .execute(fallback_graph("ship"), &CancelToken::new())
            .await;
        let summary = report.summary();
        assert_eq!(summary.lines().count(), 3);
        assert!(summary.contains('\u{2705}'));
    }
}
