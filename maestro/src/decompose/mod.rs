//! Decomposer — goal to validated task graph.
//!
//! One low-temperature, JSON-only model call proposes the sub-tasks; the
//! engine does the rest deterministically: tolerant parsing, field
//! validation, dependency cleanup, and cycle removal. The decomposer
//! never fails — any unrecoverable problem yields the three-node
//! fallback plan → implement → review.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::catalog::Domain;
use crate::client::{ChatOptions, ChatProvider};
use crate::graph::{clamp_complexity, topological_order, SubTask, TaskGraph};
use crate::json_repair::parse_relaxed;
use crate::message::Message;
use crate::prompts;

/// Maximum tasks accepted from the model.
pub const MAX_TASKS: usize = 12;

/// Sampling temperature for the decomposition call.
const DECOMPOSE_TEMPERATURE: f32 = 0.2;

/// Decomposer configuration.
#[derive(Debug, Clone, Copy)]
pub struct DecomposerConfig {
    /// Cap on tasks kept from the model's proposal.
    pub max_tasks: usize,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            max_tasks: MAX_TASKS,
        }
    }
}

/// Turns a goal into a [`TaskGraph`].
#[derive(Clone)]
pub struct Decomposer {
    provider: Arc<dyn ChatProvider>,
    config: DecomposerConfig,
}

impl std::fmt::Debug for Decomposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decomposer")
            .field("max_tasks", &self.config.max_tasks)
            .finish()
    }
}

impl Decomposer {
    /// Create a decomposer.
    #[must_use]
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            config: DecomposerConfig::default(),
        }
    }

    /// Override the configuration.
    #[must_use]
    pub const fn config(mut self, config: DecomposerConfig) -> Self {
        self.config = config;
        self
    }

    /// Decompose a goal. Never fails: parse or validation problems fall
    /// back to the three-node plan.
    pub async fn decompose(&self, goal: &str, cancel: &CancelToken) -> TaskGraph {
        let opts = ChatOptions::new(vec![
            Message::system(prompts::decomposer_system(self.config.max_tasks)),
            Message::user(goal.to_owned()),
        ])
        .temperature(DECOMPOSE_TEMPERATURE)
        .cancel(cancel.clone());

        let response = match self.provider.complete(&opts).await {
            Ok(completion) => completion.text,
            Err(err) => {
                warn!(error = %err, "Decomposition call failed; using fallback plan");
                return fallback_graph(goal);
            }
        };

        match self.parse_graph(goal, &response) {
            Some(graph) => {
                info!(
                    tasks = graph.tasks.len(),
                    total_complexity = graph.total_complexity,
                    "Goal decomposed",
                );
                graph
            }
            None => {
                warn!("Decomposition produced no usable tasks; using fallback plan");
                fallback_graph(goal)
            }
        }
    }

    /// Parse and sanitize the model's JSON into a valid graph.
    fn parse_graph(&self, goal: &str, response: &str) -> Option<TaskGraph> {
        let value = match parse_relaxed(response) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Decomposer output unparseable");
                return None;
            }
        };

        let raw_tasks = value.get("tasks")?.as_array()?;
        if raw_tasks.is_empty() {
            return None;
        }

        let mut tasks = Vec::new();
        let mut seen = HashSet::new();
        for raw in raw_tasks.iter().take(self.config.max_tasks) {
            match parse_task(raw) {
                Some(task) if seen.insert(task.id.clone()) => tasks.push(task),
                Some(task) => warn!(id = %task.id, "Dropping duplicate task id"),
                None => warn!("Dropping task missing required fields"),
            }
        }
        if tasks.is_empty() {
            return None;
        }

        drop_unknown_dependencies(&mut tasks);
        remove_cycles(&mut tasks);

        match TaskGraph::new(goal, tasks) {
            Ok(graph) => Some(graph),
            Err(err) => {
                warn!(error = %err, "Cleaned tasks still failed validation");
                None
            }
        }
    }
}

/// Parse one task object; `None` when a required field is missing.
fn parse_task(raw: &Value) -> Option<SubTask> {
    let obj = raw.as_object()?;
    let id = non_empty_str(obj.get("id")?)?;
    let title = non_empty_str(obj.get("title")?)?;
    let description = non_empty_str(obj.get("description")?)?;
    let domain_name = non_empty_str(obj.get("domain")?)?;

    // Unknown domains fall back to the coder.
    let domain = Domain::parse(domain_name).unwrap_or_else(|| {
        debug!(domain = domain_name, "Unknown domain; falling back to coder");
        Domain::Coder
    });

    let dependencies: Vec<String> = obj
        .get("dependencies")
        .and_then(Value::as_array)
        .map(|deps| {
            deps.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let complexity = obj
        .get("complexity")
        .and_then(Value::as_u64)
        .map_or(3, |c| clamp_complexity(c.min(u64::from(u8::MAX)) as u8));
    let priority = obj
        .get("priority")
        .and_then(Value::as_u64)
        .map_or(50, |p| p.min(u64::from(u32::MAX)) as u32);
    let relevant_files: Vec<String> = obj
        .get("relevant_files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let mut task = SubTask::new(id, title, description, domain)
        .priority(priority)
        .complexity(complexity);
    task.dependencies = dependencies;
    task.relevant_files = relevant_files;
    Some(task)
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Drop dependencies on ids that do not exist (logged, not fatal).
fn drop_unknown_dependencies(tasks: &mut [SubTask]) {
    let ids: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    for task in tasks {
        task.dependencies.retain(|dep| {
            let keep = ids.contains(dep) && dep != &task.id;
            if !keep {
                warn!(task = %task.id, dep = %dep, "Dropping dependency on unknown id");
            }
            keep
        });
    }
}

/// Remove back-edges left by the model.
///
/// Kahn's algorithm identifies every processable task; any task it cannot
/// reach sits on a cycle and has all its dependencies cleared.
fn remove_cycles(tasks: &mut Vec<SubTask>) {
    let probe = TaskGraph {
        goal: String::new(),
        tasks: tasks.clone(),
        edges: forward_edges(tasks),
        created_at: std::time::SystemTime::now(),
        total_complexity: 0,
    };
    if topological_order(&probe).is_some() {
        return;
    }

    let processable: HashSet<String> = {
        let mut done = HashSet::new();
        let mut changed = true;
        while changed {
            changed = false;
            for task in tasks.iter() {
                if !done.contains(&task.id)
                    && task.dependencies.iter().all(|d| done.contains(d))
                {
                    done.insert(task.id.clone());
                    changed = true;
                }
            }
        }
        done
    };

    for task in tasks.iter_mut() {
        if !processable.contains(&task.id) {
            warn!(task = %task.id, "Clearing dependencies to break a cycle");
            task.dependencies.clear();
        }
    }
}

fn forward_edges(tasks: &[SubTask]) -> std::collections::BTreeMap<String, Vec<String>> {
    let mut edges: std::collections::BTreeMap<String, Vec<String>> =
        tasks.iter().map(|t| (t.id.clone(), Vec::new())).collect();
    for task in tasks {
        for dep in &task.dependencies {
            if let Some(slot) = edges.get_mut(dep) {
                slot.push(task.id.clone());
            }
        }
    }
    edges
}

/// The three-node fallback: plan → implement → review.
#[must_use]
pub fn fallback_graph(goal: &str) -> TaskGraph {
    let tasks = vec![
        SubTask::new("plan", "Plan the work", format!("Plan how to: {goal}"), Domain::Planner)
            .complexity(2),
        SubTask::new(
            "implement",
            "Implement the goal",
            format!("Implement: {goal}"),
            Domain::Coder,
        )
        .depends_on(["plan"])
        .complexity(3),
        SubTask::new(
            "review",
            "Review the changes",
            format!("Review the changes made for: {goal}"),
            Domain::Reviewer,
        )
        .depends_on(["implement"])
        .complexity(2),
    ];
    TaskGraph::new(goal, tasks).expect("fallback graph is statically valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockProvider;

    async fn decompose_with(response: &str) -> TaskGraph {
        let provider = Arc::new(MockProvider::new().push(response));
        Decomposer::new(provider)
            .decompose("test goal", &CancelToken::new())
            .await
    }

    fn is_fallback(graph: &TaskGraph) -> bool {
        graph.tasks.len() == 3
            && graph.get("plan").is_some()
            && graph.get("implement").is_some()
            && graph.get("review").is_some()
    }

    #[tokio::test]
    async fn test_clean_json_parses() {
        let graph = decompose_with(
            r#"{"tasks":[
                {"id":"t1","title":"Schema","description":"Design schema","domain":"database","dependencies":[],"complexity":3,"priority":80},
                {"id":"t2","title":"API","description":"Build API","domain":"backend","dependencies":["t1"],"complexity":4},
                {"id":"t3","title":"Tests","description":"Write tests","domain":"testing","dependencies":["t2"]}
            ]}"#,
        )
        .await;
        assert_eq!(graph.tasks.len(), 3);
        assert_eq!(graph.get("t1").unwrap().domain, Domain::Database);
        assert_eq!(graph.get("t2").unwrap().dependencies, vec!["t1"]);
        assert_eq!(graph.tiers().len(), 3);
    }

    #[tokio::test]
    async fn test_fenced_and_commented_json_parses() {
        let graph = decompose_with(
            "```json\n{\n  // the plan\n  \"tasks\": [\n    {\"id\":\"a\",\"title\":\"T\",\"description\":\"D\",\"domain\":\"coder\",\"dependencies\":[],},\n  ]\n}\n```",
        )
        .await;
        assert_eq!(graph.tasks.len(), 1);
        assert_eq!(graph.get("a").unwrap().domain, Domain::Coder);
    }

    #[tokio::test]
    async fn test_unknown_domain_falls_back_to_coder() {
        let graph = decompose_with(
            r#"{"tasks":[{"id":"a","title":"T","description":"D","domain":"astrology"}]}"#,
        )
        .await;
        assert_eq!(graph.get("a").unwrap().domain, Domain::Coder);
    }

    #[tokio::test]
    async fn test_complexity_clamped_and_priority_defaulted() {
        let graph = decompose_with(
            r#"{"tasks":[{"id":"a","title":"T","description":"D","domain":"coder","complexity":99}]}"#,
        )
        .await;
        let task = graph.get("a").unwrap();
        assert_eq!(task.complexity, 5);
        assert_eq!(task.priority, 50);
    }

    #[tokio::test]
    async fn test_unknown_dependencies_dropped() {
        let graph = decompose_with(
            r#"{"tasks":[
                {"id":"a","title":"T","description":"D","domain":"coder","dependencies":["ghost","b"]},
                {"id":"b","title":"U","description":"E","domain":"testing"}
            ]}"#,
        )
        .await;
        assert_eq!(graph.get("a").unwrap().dependencies, vec!["b"]);
    }

    #[tokio::test]
    async fn test_cycle_broken_by_clearing_dependencies() {
        let graph = decompose_with(
            r#"{"tasks":[
                {"id":"root","title":"R","description":"G","domain":"planner"},
                {"id":"a","title":"T","description":"D","domain":"coder","dependencies":["b"]},
                {"id":"b","title":"U","description":"E","domain":"coder","dependencies":["a"]},
                {"id":"c","title":"V","description":"F","domain":"testing","dependencies":["root"]}
            ]}"#,
        )
        .await;
        assert!(!graph.has_cycle());
        assert_eq!(graph.tasks.len(), 4);
        // The cycle members lost their dependencies; c kept its clean edge.
        assert!(graph.get("a").unwrap().dependencies.is_empty());
        assert!(graph.get("b").unwrap().dependencies.is_empty());
        assert_eq!(graph.get("c").unwrap().dependencies, vec!["root"]);
    }

    #[tokio::test]
    async fn test_zero_tasks_yields_fallback() {
        let graph = decompose_with(r#"{"tasks":[]}"#).await;
        assert!(is_fallback(&graph));
        assert_eq!(graph.tiers().len(), 3);
    }

    #[tokio::test]
    async fn test_garbage_yields_fallback() {
        assert!(is_fallback(&decompose_with("I cannot help with that.").await));
    }

    #[tokio::test]
    async fn test_model_error_yields_fallback() {
        let provider =
            Arc::new(MockProvider::new().push_error(crate::error::Error::server(500, "down")));
        let graph = Decomposer::new(provider)
            .decompose("goal", &CancelToken::new())
            .await;
        assert!(is_fallback(&graph));
    }

    #[tokio::test]
    async fn test_task_cap_enforced() {
        let tasks: Vec<String> = (0..20)
            .map(|i| {
                format!(
                    r#"{{"id":"t{i}","title":"T{i}","description":"D","domain":"coder"}}"#,
                )
            })
            .collect();
        let graph = decompose_with(&format!(r#"{{"tasks":[{}]}}"#, tasks.join(","))).await;
        assert_eq!(graph.tasks.len(), MAX_TASKS);
    }

    #[test]
    fn test_fallback_shape() {
        let graph = fallback_graph("ship it");
        assert!(is_fallback(&graph));
        assert_eq!(
            graph.tiers(),
            vec![vec!["plan"], vec!["implement"], vec!["review"]],
        );
    }
}
