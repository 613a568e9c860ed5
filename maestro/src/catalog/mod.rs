//! Agent catalog — the registry of domain specialists.
//!
//! Every specialist is data, not code: an [`AgentSpec`] carrying a prompt,
//! a tool allow-list, and an iteration budget. The engine drives all of
//! them through the same ReAct loop. Built-ins are inserted in a fixed
//! order so domain lookups are deterministic; user-defined specs may be
//! registered on top (including [`Domain::Custom`] ones).

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

/// The closed set of specialist domains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Domain {
    /// Breaks goals into steps and sequences work.
    Planner,
    /// Writes and edits code.
    Coder,
    /// Reviews changes for correctness and style.
    Reviewer,
    /// Audits for vulnerabilities and unsafe patterns.
    Security,
    /// Writes and repairs tests.
    Testing,
    /// Writes documentation.
    Docs,
    /// Profiles and optimizes.
    Performance,
    /// Designs and evolves APIs.
    Api,
    /// Plans and executes migrations.
    Migration,
    /// Designs schemas and queries.
    Database,
    /// CI/CD, containers, deployment.
    DevOps,
    /// System-level architecture decisions.
    Architect,
    /// UI work.
    Frontend,
    /// Server-side work.
    Backend,
    /// A user-defined domain.
    Custom(String),
}

impl Domain {
    /// Canonical lowercase name, as used in decomposer JSON.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Planner => "planner",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Security => "security",
            Self::Testing => "testing",
            Self::Docs => "docs",
            Self::Performance => "performance",
            Self::Api => "api",
            Self::Migration => "migration",
            Self::Database => "database",
            Self::DevOps => "devops",
            Self::Architect => "architect",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Custom(name) => name,
        }
    }

    /// Parse a domain name. Unknown names yield `None` (callers decide the
    /// fallback; the decomposer falls back to [`Domain::Coder`]).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim().to_lowercase().as_str() {
            "planner" | "planning" => Self::Planner,
            "coder" | "coding" | "implementation" => Self::Coder,
            "reviewer" | "review" => Self::Reviewer,
            "security" => Self::Security,
            "testing" | "test" | "tests" => Self::Testing,
            "docs" | "documentation" => Self::Docs,
            "performance" | "perf" => Self::Performance,
            "api" => Self::Api,
            "migration" | "migrations" => Self::Migration,
            "database" | "db" => Self::Database,
            "devops" | "ci" | "cicd" => Self::DevOps,
            "architect" | "architecture" => Self::Architect,
            "frontend" | "ui" => Self::Frontend,
            "backend" | "server" => Self::Backend,
            _ => return None,
        })
    }

    /// Every built-in domain, in catalog insertion order.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::Planner,
            Self::Coder,
            Self::Reviewer,
            Self::Security,
            Self::Testing,
            Self::Docs,
            Self::Performance,
            Self::Api,
            Self::Migration,
            Self::Database,
            Self::DevOps,
            Self::Architect,
            Self::Frontend,
            Self::Backend,
        ]
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain specialist: prompt, tool allow-list, iteration budget.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    /// Unique id (also the registry key).
    pub id: String,
    /// Human-readable name shown in summaries.
    pub display_name: String,
    /// The specialist's domain.
    pub domain: Domain,
    /// System-prompt instructions.
    pub instructions: String,
    /// Tool names this specialist may use. `None` (or empty) means all.
    pub allowed_tools: Option<BTreeSet<String>>,
    /// ReAct iteration budget.
    pub max_iterations: usize,
    /// Whether the specialist needs workspace context in its prompt.
    pub requires_workspace: bool,
    /// Scheduling priority (higher runs earlier within a tier).
    pub priority: u32,
    /// Optional per-run output token budget.
    pub token_budget: Option<u32>,
}

impl AgentSpec {
    /// Create a spec with engine defaults.
    #[must_use]
    pub fn new(id: impl Into<String>, domain: Domain, instructions: impl Into<String>) -> Self {
        let id = id.into();
        let display_name = {
            let mut chars = id.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        };
        Self {
            id,
            display_name,
            domain,
            instructions: instructions.into(),
            allowed_tools: None,
            max_iterations: crate::react::DEFAULT_MAX_ITERATIONS,
            requires_workspace: true,
            priority: 50,
            token_budget: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Restrict the spec to the named tools.
    #[must_use]
    pub fn allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Mark the spec tool-less: it reasons but never acts.
    #[must_use]
    pub fn tool_less(mut self) -> Self {
        self.allowed_tools = Some(BTreeSet::new());
        self.requires_workspace = false;
        self
    }

    /// Set the iteration budget.
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the scheduling priority.
    #[must_use]
    pub const fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this spec declared an explicit empty tool set.
    #[must_use]
    pub fn is_tool_less(&self) -> bool {
        self.allowed_tools.as_ref().is_some_and(BTreeSet::is_empty)
            && !self.requires_workspace
    }
}

/// The process-wide specialist registry.
///
/// Single writer, many readers: mutation happens behind one lock at
/// startup or via explicit `register`/`unregister`; the hot path only
/// reads. Iteration order is insertion order.
#[derive(Debug, Default)]
pub struct AgentCatalog {
    specs: RwLock<Vec<Arc<AgentSpec>>>,
}

impl AgentCatalog {
    /// A catalog seeded with the built-in specialists.
    #[must_use]
    pub fn with_builtins() -> Self {
        let catalog = Self::default();
        for spec in builtin_specs() {
            catalog.register(spec);
        }
        catalog
    }

    /// Register a spec. A spec with an existing id replaces it in place.
    pub fn register(&self, spec: AgentSpec) {
        let mut specs = self.specs.write().expect("catalog lock");
        if let Some(slot) = specs.iter_mut().find(|s| s.id == spec.id) {
            *slot = Arc::new(spec);
        } else {
            specs.push(Arc::new(spec));
        }
    }

    /// Remove a spec by id. Returns whether anything was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut specs = self.specs.write().expect("catalog lock");
        let before = specs.len();
        specs.retain(|s| s.id != id);
        specs.len() != before
    }

    /// Restore the built-ins and drop everything else.
    pub fn reset(&self) {
        let mut specs = self.specs.write().expect("catalog lock");
        specs.clear();
        specs.extend(builtin_specs().into_iter().map(Arc::new));
    }

    /// Look up a spec by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<AgentSpec>> {
        self.specs
            .read()
            .expect("catalog lock")
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// Look up the first spec registered for a domain.
    #[must_use]
    pub fn by_domain(&self, domain: &Domain) -> Option<Arc<AgentSpec>> {
        self.specs
            .read()
            .expect("catalog lock")
            .iter()
            .find(|s| &s.domain == domain)
            .cloned()
    }

    /// Snapshot of all specs in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<AgentSpec>> {
        self.specs.read().expect("catalog lock").clone()
    }

    /// Number of registered specs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.read().expect("catalog lock").len()
    }

    /// Check whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.read().expect("catalog lock").is_empty()
    }
}

/// The built-in specialists, in fixed insertion order.
fn builtin_specs() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new(
            "planner",
            Domain::Planner,
            "You are a planning specialist. Break the goal into a short, \
             ordered list of concrete steps. Name the files and commands \
             involved. Do not write code.",
        )
        .display_name("Planner")
        .allowed_tools(["read_file", "search_files", "list_files"])
        .max_iterations(6),
        AgentSpec::new(
            "coder",
            Domain::Coder,
            "You are an implementation specialist. Make the smallest change \
             that satisfies the task. Read before you write, keep edits \
             focused, and run nothing destructive.",
        )
        .display_name("Coder")
        .max_iterations(15),
        AgentSpec::new(
            "reviewer",
            Domain::Reviewer,
            "You are a code reviewer. Inspect the changes for correctness, \
             missed edge cases, and style drift. End with a verdict line: \
             approved=true or approved=false, followed by an issue list.",
        )
        .display_name("Reviewer")
        .allowed_tools(["read_file", "search_files", "diagnostics"])
        .max_iterations(8),
        AgentSpec::new(
            "security",
            Domain::Security,
            "You are a security auditor. Hunt for injection, secret \
             leakage, path escapes, and unsafe defaults. Report findings \
             with severity and file locations.",
        )
        .display_name("Security Auditor")
        .allowed_tools(["read_file", "search_files"])
        .max_iterations(8),
        AgentSpec::new(
            "testing",
            Domain::Testing,
            "You are a testing specialist. Write focused tests for the \
             changed behavior, run them, and fix failures you introduced.",
        )
        .display_name("Test Engineer")
        .max_iterations(12),
        AgentSpec::new(
            "docs",
            Domain::Docs,
            "You are a documentation writer. Update README, API docs, and \
             inline docs to match the implemented behavior. Keep it terse.",
        )
        .display_name("Docs Writer")
        .max_iterations(6),
        AgentSpec::new(
            "performance",
            Domain::Performance,
            "You are a performance specialist. Find hot paths, avoidable \
             allocations, and N+1 patterns; apply targeted fixes and \
             explain the expected effect.",
        )
        .display_name("Performance Engineer")
        .max_iterations(10),
        AgentSpec::new(
            "api",
            Domain::Api,
            "You are an API designer. Define or evolve endpoints with \
             consistent naming, explicit error shapes, and versioning in \
             mind.",
        )
        .display_name("API Designer")
        .max_iterations(10),
        AgentSpec::new(
            "migration",
            Domain::Migration,
            "You are a migration specialist. Produce reversible, ordered \
             migration steps and keep the system working at every step.",
        )
        .display_name("Migration Engineer")
        .max_iterations(10),
        AgentSpec::new(
            "database",
            Domain::Database,
            "You are a database specialist. Design schemas and queries for \
             the workload at hand; index deliberately and document \
             trade-offs.",
        )
        .display_name("Database Engineer")
        .max_iterations(10),
        AgentSpec::new(
            "devops",
            Domain::DevOps,
            "You are a DevOps engineer. Set up builds, CI, containers, and \
             deployment configuration appropriate to the project's stack.",
        )
        .display_name("DevOps Engineer")
        .max_iterations(10),
        AgentSpec::new(
            "architect",
            Domain::Architect,
            "You are a software architect. Decide structure: components, \
             boundaries, data flow, and technology choices. Justify each \
             decision in one sentence.",
        )
        .display_name("Architect")
        .tool_less()
        .max_iterations(4),
        AgentSpec::new(
            "frontend",
            Domain::Frontend,
            "You are a frontend engineer. Build accessible, minimal UI \
             that matches the project's existing component conventions.",
        )
        .display_name("Frontend Engineer")
        .max_iterations(12),
        AgentSpec::new(
            "backend",
            Domain::Backend,
            "You are a backend engineer. Implement services and handlers \
             with explicit error handling and no hidden global state.",
        )
        .display_name("Backend Engineer")
        .max_iterations(12),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_every_domain() {
        let catalog = AgentCatalog::with_builtins();
        assert_eq!(catalog.len(), Domain::builtin().len());
        for domain in Domain::builtin() {
            assert!(
                catalog.by_domain(&domain).is_some(),
                "no spec for {domain}",
            );
        }
    }

    #[test]
    fn test_domain_parse_aliases() {
        assert_eq!(Domain::parse("db"), Some(Domain::Database));
        assert_eq!(Domain::parse("PERF"), Some(Domain::Performance));
        assert_eq!(Domain::parse(" ui "), Some(Domain::Frontend));
        assert_eq!(Domain::parse("quantum"), None);
    }

    #[test]
    fn test_register_replaces_in_place() {
        let catalog = AgentCatalog::with_builtins();
        let order_before: Vec<String> = catalog.all().iter().map(|s| s.id.clone()).collect();

        catalog.register(AgentSpec::new("coder", Domain::Coder, "replacement prompt"));
        let order_after: Vec<String> = catalog.all().iter().map(|s| s.id.clone()).collect();

        assert_eq!(order_before, order_after);
        assert_eq!(catalog.get("coder").unwrap().instructions, "replacement prompt");
    }

    #[test]
    fn test_custom_domain_registration_and_reset() {
        let catalog = AgentCatalog::with_builtins();
        catalog.register(AgentSpec::new(
            "ml",
            Domain::Custom("ml".to_owned()),
            "You tune models.",
        ));
        assert!(catalog.get("ml").is_some());
        assert!(catalog.by_domain(&Domain::Custom("ml".to_owned())).is_some());

        catalog.reset();
        assert!(catalog.get("ml").is_none());
        assert_eq!(catalog.len(), Domain::builtin().len());
    }

    #[test]
    fn test_unregister() {
        let catalog = AgentCatalog::with_builtins();
        assert!(catalog.unregister("docs"));
        assert!(!catalog.unregister("docs"));
        assert!(catalog.get("docs").is_none());
    }

    #[test]
    fn test_architect_is_tool_less() {
        let catalog = AgentCatalog::with_builtins();
        let architect = catalog.get("architect").unwrap();
        assert!(architect.is_tool_less());
        assert!(!catalog.get("coder").unwrap().is_tool_less());
    }
}
