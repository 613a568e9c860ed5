//! The sub-task graph produced by decomposition.
//!
//! A [`TaskGraph`] holds one [`SubTask`] per domain specialist plus the
//! forward adjacency (`edges`) derived from the dependency relation.
//! Invariants: ids are unique, every dependency id exists, the graph is
//! acyclic, and `edges` is the transpose of the dependency relation.
//! [`TaskGraph::tiers`] groups tasks Kahn-style so every tier only
//! depends on strictly earlier tiers.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::catalog::Domain;
use crate::error::{Error, Result};

/// Execution status of one sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet scheduled.
    Pending,
    /// In a batch waiting for a worker.
    Queued,
    /// A driver is executing it.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Not run because a dependency failed.
    Skipped,
    /// Not run because the pipeline was cancelled.
    Cancelled,
}

impl TaskStatus {
    /// Checkmark used in summaries.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Completed => "\u{2705}",
            Self::Failed => "\u{274c}",
            Self::Skipped => "\u{23ed}\u{fe0f}",
            Self::Cancelled => "\u{1f6d1}",
            Self::Pending | Self::Queued | Self::Running => "\u{2026}",
        }
    }
}

/// One unit of decomposed work, bound to a specialist domain.
#[derive(Debug, Clone)]
pub struct SubTask {
    /// Unique id within the graph.
    pub id: String,
    /// Short title for summaries.
    pub title: String,
    /// Full task description handed to the specialist.
    pub description: String,
    /// Domain of the specialist that should run this.
    pub domain: Domain,
    /// Ids of tasks that must complete first.
    pub dependencies: Vec<String>,
    /// Current status; the only field mutated after construction.
    pub status: TaskStatus,
    /// Files the decomposer believes are relevant.
    pub relevant_files: Vec<String>,
    /// Scheduling priority within a tier (higher first).
    pub priority: u32,
    /// Estimated complexity in `[1..5]`.
    pub complexity: u8,
}

impl SubTask {
    /// Create a task with default priority and complexity.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        domain: Domain,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            domain,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            relevant_files: Vec::new(),
            priority: 50,
            complexity: 3,
        }
    }

    /// Add dependencies.
    #[must_use]
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the complexity, clamped to `[1..5]`.
    #[must_use]
    pub const fn complexity(mut self, complexity: u8) -> Self {
        self.complexity = clamp_complexity(complexity);
        self
    }
}

/// Clamp a complexity estimate into `[1..5]`.
#[must_use]
pub const fn clamp_complexity(complexity: u8) -> u8 {
    if complexity < 1 {
        1
    } else if complexity > 5 {
        5
    } else {
        complexity
    }
}

/// A validated DAG of sub-tasks.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// The goal this graph decomposes.
    pub goal: String,
    /// The tasks, in decomposer order.
    pub tasks: Vec<SubTask>,
    /// Forward adjacency: task id → ids that depend on it.
    pub edges: BTreeMap<String, Vec<String>>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Sum of task complexities.
    pub total_complexity: u32,
}

impl TaskGraph {
    /// Build a graph from tasks, validating invariants and deriving the
    /// forward adjacency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on duplicate ids, dependencies on unknown
    /// ids, or cycles.
    pub fn new(goal: impl Into<String>, tasks: Vec<SubTask>) -> Result<Self> {
        let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        if ids.len() != tasks.len() {
            return Err(Error::parse("task graph has duplicate ids"));
        }
        for task in &tasks {
            for dep in &task.dependencies {
                if !ids.contains(dep.as_str()) {
                    return Err(Error::parse(format!(
                        "task '{}' depends on unknown id '{dep}'",
                        task.id,
                    )));
                }
                if dep == &task.id {
                    return Err(Error::parse(format!("task '{}' depends on itself", task.id)));
                }
            }
        }

        // Forward adjacency is the transpose of the dependency relation.
        let mut edges: BTreeMap<String, Vec<String>> =
            tasks.iter().map(|t| (t.id.clone(), Vec::new())).collect();
        for task in &tasks {
            for dep in &task.dependencies {
                edges
                    .get_mut(dep)
                    .expect("dependency id validated above")
                    .push(task.id.clone());
            }
        }

        let total_complexity = tasks.iter().map(|t| u32::from(t.complexity)).sum();
        let graph = Self {
            goal: goal.into(),
            tasks,
            edges,
            created_at: SystemTime::now(),
            total_complexity,
        };
        if graph.has_cycle() {
            return Err(Error::parse("task graph contains a cycle"));
        }
        Ok(graph)
    }

    /// Look up a task by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&SubTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Mutable lookup, used by the executor for status updates.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut SubTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// DFS cycle detection over the dependency relation.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        let deps: HashMap<&str, &[String]> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.dependencies.as_slice()))
            .collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        fn visit(
            id: &str,
            deps: &HashMap<&str, &[String]>,
            marks: &mut HashMap<String, Mark>,
        ) -> bool {
            match marks.get(id).copied().unwrap_or(Mark::White) {
                Mark::Grey => return true,
                Mark::Black => return false,
                Mark::White => {}
            }
            marks.insert(id.to_owned(), Mark::Grey);
            if let Some(children) = deps.get(id) {
                for child in *children {
                    if visit(child, deps, marks) {
                        return true;
                    }
                }
            }
            marks.insert(id.to_owned(), Mark::Black);
            false
        }

        let mut marks = HashMap::new();
        self.tasks
            .iter()
            .any(|t| visit(&t.id, &deps, &mut marks))
    }

    /// Group tasks into execution tiers with Kahn's algorithm.
    ///
    /// Every task in tier `k` has all its dependencies in tiers `< k`.
    /// Within a tier, tasks are ordered by descending priority. Tasks that
    /// survive a cycle (possible only on graphs built outside
    /// [`TaskGraph::new`]) are emitted as one final forced tier.
    #[must_use]
    pub fn tiers(&self) -> Vec<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.dependencies.len()))
            .collect();
        let priority: HashMap<&str, u32> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.priority))
            .collect();

        let mut tiers: Vec<Vec<String>> = Vec::new();
        let mut remaining: usize = self.tasks.len();
        let mut frontier: Vec<&str> = self
            .tasks
            .iter()
            .filter(|t| t.dependencies.is_empty())
            .map(|t| t.id.as_str())
            .collect();

        while !frontier.is_empty() {
            frontier.sort_by(|a, b| priority[b].cmp(&priority[a]).then_with(|| a.cmp(b)));
            let tier: Vec<String> = frontier.iter().map(|id| (*id).to_owned()).collect();
            remaining -= tier.len();

            let mut next: Vec<&str> = Vec::new();
            for id in &frontier {
                for dependent in self.edges.get(*id).map(Vec::as_slice).unwrap_or_default() {
                    let degree = in_degree
                        .get_mut(dependent.as_str())
                        .expect("dependent exists");
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent.as_str());
                    }
                }
            }
            tiers.push(tier);
            frontier = next;
        }

        if remaining > 0 {
            // Back-edges survived: force everything unprocessed into one
            // final tier rather than dropping it.
            let placed: HashSet<&str> = tiers
                .iter()
                .flatten()
                .map(String::as_str)
                .collect();
            let mut forced: Vec<&SubTask> = self
                .tasks
                .iter()
                .filter(|t| !placed.contains(t.id.as_str()))
                .collect();
            forced.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
            tiers.push(forced.into_iter().map(|t| t.id.clone()).collect());
        }

        tiers
    }
}

/// Breadth-first distance layering, used by tests as an oracle.
#[must_use]
pub fn topological_order(graph: &TaskGraph) -> Option<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = graph
        .tasks
        .iter()
        .map(|t| (t.id.as_str(), t.dependencies.len()))
        .collect();
    let mut queue: VecDeque<&str> = graph
        .tasks
        .iter()
        .filter(|t| t.dependencies.is_empty())
        .map(|t| t.id.as_str())
        .collect();
    let mut order = Vec::with_capacity(graph.tasks.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_owned());
        for dependent in graph.edges.get(id).map(Vec::as_slice).unwrap_or_default() {
            let degree = in_degree.get_mut(dependent.as_str())?;
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(dependent.as_str());
            }
        }
    }

    (order.len() == graph.tasks.len()).then_some(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> SubTask {
        SubTask::new(id, id, format!("do {id}"), Domain::Coder)
            .depends_on(deps.iter().copied())
    }

    fn graph(tasks: Vec<SubTask>) -> TaskGraph {
        TaskGraph::new("goal", tasks).unwrap()
    }

    #[test]
    fn test_edges_are_transpose_of_dependencies() {
        let g = graph(vec![task("a", &[]), task("b", &["a"]), task("c", &["a", "b"])]);
        assert_eq!(g.edges["a"], vec!["b", "c"]);
        assert_eq!(g.edges["b"], vec!["c"]);
        assert!(g.edges["c"].is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = TaskGraph::new("g", vec![task("a", &[]), task("a", &[])]);
        assert!(matches!(err, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = TaskGraph::new("g", vec![task("a", &["ghost"])]);
        assert!(matches!(err, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = TaskGraph::new("g", vec![task("a", &["b"]), task("b", &["a"])]);
        assert!(matches!(err, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_tiers_linear_chain() {
        let g = graph(vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])]);
        assert_eq!(g.tiers(), vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_tiers_diamond() {
        let g = graph(vec![
            task("plan", &[]),
            task("left", &["plan"]),
            task("right", &["plan"]),
            task("join", &["left", "right"]),
        ]);
        let tiers = g.tiers();
        assert_eq!(tiers.len(), 3);
        assert_eq!(tiers[0], vec!["plan"]);
        assert_eq!(tiers[1].len(), 2);
        assert_eq!(tiers[2], vec!["join"]);
    }

    #[test]
    fn test_tier_ordering_by_priority() {
        let g = graph(vec![
            task("low", &[]).priority(10),
            task("high", &[]).priority(90),
            task("mid", &[]).priority(50),
        ]);
        assert_eq!(g.tiers(), vec![vec!["high", "mid", "low"]]);
    }

    #[test]
    fn test_tier_soundness_and_completeness() {
        let g = graph(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
            task("e", &[]),
        ]);
        let tiers = g.tiers();

        // Completeness: the union of all tiers is the task set, no dupes.
        let mut seen = HashSet::new();
        for id in tiers.iter().flatten() {
            assert!(seen.insert(id.clone()), "duplicate {id}");
        }
        assert_eq!(seen.len(), g.tasks.len());

        // Soundness: every dependency lives in a strictly earlier tier.
        let tier_of: HashMap<&str, usize> = tiers
            .iter()
            .enumerate()
            .flat_map(|(k, tier)| tier.iter().map(move |id| (id.as_str(), k)))
            .collect();
        for t in &g.tasks {
            for dep in &t.dependencies {
                assert!(tier_of[dep.as_str()] < tier_of[t.id.as_str()]);
            }
        }
    }

    // Random DAGs (edges only point at earlier tasks) always tier into a
    // sound, complete, duplicate-free partition.
    proptest::proptest! {
        #[test]
        fn prop_tiers_sound_and_complete(
            n in 1usize..10,
            edges in proptest::collection::vec((1usize..10, 0usize..10), 0..20),
            priorities in proptest::collection::vec(0u32..100, 10),
        ) {
            let tasks: Vec<SubTask> = (0..n)
                .map(|i| {
                    let deps: Vec<String> = edges
                        .iter()
                        .filter(|(to, from)| *to == i && from < to)
                        .map(|(_, from)| format!("t{from}"))
                        .collect::<std::collections::BTreeSet<_>>()
                        .into_iter()
                        .collect();
                    task(&format!("t{i}"), &deps.iter().map(String::as_str).collect::<Vec<_>>())
                        .priority(priorities[i])
                })
                .collect();
            let g = TaskGraph::new("goal", tasks).unwrap();
            let tiers = g.tiers();

            let mut seen = HashSet::new();
            for id in tiers.iter().flatten() {
                proptest::prop_assert!(seen.insert(id.clone()));
            }
            proptest::prop_assert_eq!(seen.len(), g.tasks.len());

            let tier_of: HashMap<&str, usize> = tiers
                .iter()
                .enumerate()
                .flat_map(|(k, tier)| tier.iter().map(move |id| (id.as_str(), k)))
                .collect();
            for t in &g.tasks {
                for dep in &t.dependencies {
                    proptest::prop_assert!(tier_of[dep.as_str()] < tier_of[t.id.as_str()]);
                }
            }
        }
    }

    #[test]
    fn test_clamp_complexity() {
        assert_eq!(clamp_complexity(0), 1);
        assert_eq!(clamp_complexity(3), 3);
        assert_eq!(clamp_complexity(9), 5);
    }

    #[test]
    fn test_total_complexity_sums() {
        let g = graph(vec![
            task("a", &[]).complexity(2),
            task("b", &[]).complexity(5),
        ]);
        assert_eq!(g.total_complexity, 7);
    }
}
