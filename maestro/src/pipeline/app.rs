//! The fixed eight-phase app-creation pipeline.
//!
//! Phase 1 (architect) is a single JSON-only model call producing an
//! [`ArchitectureSpec`], normalized with defaults — the one phase whose
//! total failure aborts the pipeline. Phases 2–8 each run a specialist
//! through the ReAct driver with a prompt templated from the spec. A
//! phase failure logs, emits a warning event, and the pipeline continues;
//! cancellation at a phase boundary returns the work done so far.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::Domain;
use crate::error::{Error, Result};
use crate::event::EngineEvent;
use crate::json_repair::parse_relaxed;
use crate::prompts;
use crate::react::ReactStatus;

use super::Orchestrator;

/// The technology stack chosen by the architect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TechStack {
    /// Frontend framework.
    pub frontend: String,
    /// Styling approach.
    pub styling: String,
    /// Backend framework, or `"none"` for static apps.
    pub backend: String,
    /// Database.
    pub database: String,
    /// ORM or data layer.
    pub orm: String,
    /// Authentication approach.
    pub auth: String,
    /// Deployment target.
    pub deployment: String,
}

impl Default for TechStack {
    fn default() -> Self {
        Self {
            frontend: "react".to_owned(),
            styling: "tailwind".to_owned(),
            backend: "node".to_owned(),
            database: "postgres".to_owned(),
            orm: "prisma".to_owned(),
            auth: "jwt".to_owned(),
            deployment: "docker".to_owned(),
        }
    }
}

/// The architect's output, normalized with defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureSpec {
    /// Application name.
    pub name: String,
    /// One-paragraph description.
    pub description: String,
    /// Feature list.
    pub features: Vec<String>,
    /// Chosen stack.
    pub tech_stack: TechStack,
    /// Planned directory layout.
    pub directory_structure: Vec<String>,
    /// API endpoints as `METHOD /path - purpose` lines.
    pub api_contracts: Vec<String>,
    /// Data models as `Model: fields` lines.
    pub data_models: Vec<String>,
    /// Component hierarchy.
    pub component_tree: Vec<String>,
    /// Environment variables the app needs.
    pub env_vars: Vec<String>,
    /// Third-party integrations.
    pub integrations: Vec<String>,
}

impl ArchitectureSpec {
    /// Parse and normalize architect output.
    ///
    /// Shape deviations are tolerated field-by-field (missing fields take
    /// defaults, matching the decomposer's policy); only a fully
    /// unparseable response is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the response holds no JSON object.
    pub fn parse(response: &str) -> Result<Self> {
        let value = parse_relaxed(response)?;
        if !value.is_object() {
            return Err(Error::parse("architect response is not a JSON object"));
        }
        let mut spec: Self = serde_json::from_value(value)
            .map_err(|e| Error::parse(format!("architect response shape: {e}")))?;
        spec.normalize();
        Ok(spec)
    }

    fn normalize(&mut self) {
        if self.name.trim().is_empty() {
            self.name = "app".to_owned();
        }
        if self.tech_stack.backend.trim().is_empty() {
            self.tech_stack.backend = TechStack::default().backend;
        }
        for list in [
            &mut self.features,
            &mut self.directory_structure,
            &mut self.api_contracts,
            &mut self.data_models,
            &mut self.component_tree,
            &mut self.env_vars,
            &mut self.integrations,
        ] {
            list.retain(|item| !item.trim().is_empty());
        }
    }

    /// Whether the app has no server side.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.tech_stack.backend.trim().eq_ignore_ascii_case("none")
    }
}

/// Status of one pipeline phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    /// Ran to completion.
    Completed,
    /// Failed; the pipeline continued.
    Failed(String),
    /// Skipped (static app, or cancellation).
    Skipped,
    /// Never started because the run was cancelled.
    Cancelled,
}

impl PhaseStatus {
    const fn symbol(&self) -> &'static str {
        match self {
            Self::Completed => "\u{2705}",
            Self::Failed(_) => "\u{274c}",
            Self::Skipped => "\u{23ed}\u{fe0f}",
            Self::Cancelled => "\u{1f6d1}",
        }
    }
}

/// Record of one executed phase.
#[derive(Debug, Clone)]
pub struct PhaseRecord {
    /// Phase name.
    pub name: &'static str,
    /// Outcome.
    pub status: PhaseStatus,
    /// Files this phase created or edited.
    pub files: Vec<String>,
}

/// Aggregate app-pipeline outcome.
#[derive(Debug, Clone)]
pub struct AppReport {
    /// The normalized architecture.
    pub architecture: ArchitectureSpec,
    /// One record per phase, in order.
    pub phases: Vec<PhaseRecord>,
    /// Deduplicated union of files created across phases.
    pub files_created: Vec<String>,
    /// Whether the run was cancelled mid-pipeline.
    pub cancelled: bool,
}

impl AppReport {
    /// The eight-row phase table plus a files line.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Built **{}** — {}\n\n| # | Phase | Status | Files |\n|---|-------|--------|-------|\n",
            self.architecture.name, self.architecture.description,
        );
        for (i, phase) in self.phases.iter().enumerate() {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                i + 1,
                phase.name,
                phase.status.symbol(),
                phase.files.len(),
            );
        }
        let _ = write!(out, "\n{} file(s) created", self.files_created.len());
        out
    }

    /// Success means the architect produced a spec and the run was not
    /// cancelled; individual phase failures are warnings.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled
    }
}

/// The seven ReAct phases after the architect, in execution order.
const REACT_PHASES: [(&str, Domain); 7] = [
    ("scaffold", Domain::Coder),
    ("backend", Domain::Backend),
    ("frontend", Domain::Frontend),
    ("testing", Domain::Testing),
    ("security", Domain::Security),
    ("devops", Domain::DevOps),
    ("docs", Domain::Docs),
];

static REPORTED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:created?|wrote|updated|edited)\b[^\n]{0,40}?([\w./-]+\.[A-Za-z]{1,4})")
        .expect("reported-path regex")
});

pub(super) async fn run_app(orchestrator: &Orchestrator, goal: &str) -> Result<AppReport> {
    let events = orchestrator.sink();

    events.emit(EngineEvent::Status("phase 1/8: architect".into()));
    let architecture = architect(orchestrator, goal).await?;
    info!(app = %architecture.name, "Architecture produced");

    let mut phases = vec![PhaseRecord {
        name: "architect",
        status: PhaseStatus::Completed,
        files: Vec::new(),
    }];
    let mut files_created: Vec<String> = Vec::new();
    let mut cancelled = false;

    for (index, (name, domain)) in REACT_PHASES.iter().enumerate() {
        if orchestrator.cancel().is_cancelled() {
            cancelled = true;
            phases.push(PhaseRecord {
                name,
                status: PhaseStatus::Cancelled,
                files: Vec::new(),
            });
            continue;
        }

        if *name == "backend" && architecture.is_static() {
            info!("Static app: skipping backend phase");
            phases.push(PhaseRecord {
                name,
                status: PhaseStatus::Skipped,
                files: Vec::new(),
            });
            continue;
        }

        events.emit(EngineEvent::Status(format!("phase {}/8: {name}", index + 2)));
        let task = phase_prompt(name, goal, &architecture);
        match orchestrator.run_specialist(domain, &task).await {
            Ok(outcome) => match outcome.status {
                ReactStatus::Cancelled => {
                    cancelled = true;
                    phases.push(PhaseRecord {
                        name,
                        status: PhaseStatus::Cancelled,
                        files: Vec::new(),
                    });
                }
                ReactStatus::Completed | ReactStatus::MaxIterations => {
                    let mut files = outcome.files_modified();
                    for path in extract_reported_paths(&outcome.response) {
                        if !files.contains(&path) {
                            files.push(path);
                        }
                    }
                    for file in &files {
                        if !files_created.contains(file) {
                            files_created.push(file.clone());
                        }
                    }
                    phases.push(PhaseRecord {
                        name,
                        status: PhaseStatus::Completed,
                        files,
                    });
                }
                ReactStatus::ModelError(message) => {
                    warn!(phase = name, error = %message, "Phase failed; continuing");
                    events.emit(EngineEvent::Error(format!(
                        "warning: phase {name} failed: {message}",
                    )));
                    phases.push(PhaseRecord {
                        name,
                        status: PhaseStatus::Failed(message),
                        files: Vec::new(),
                    });
                }
            },
            Err(err) => {
                warn!(phase = name, error = %err, "Phase failed; continuing");
                events.emit(EngineEvent::Error(format!("warning: phase {name} failed: {err}")));
                phases.push(PhaseRecord {
                    name,
                    status: PhaseStatus::Failed(err.to_string()),
                    files: Vec::new(),
                });
            }
        }
    }

    Ok(AppReport {
        architecture,
        phases,
        files_created,
        cancelled,
    })
}

/// Phase 1: the architect's one-shot JSON call.
async fn architect(orchestrator: &Orchestrator, goal: &str) -> Result<ArchitectureSpec> {
    let response = orchestrator
        .complete_with_system(prompts::ARCHITECT_SYSTEM, goal, 0.2)
        .await?;
    ArchitectureSpec::parse(&response)
}

/// Templated prompt for one ReAct phase.
fn phase_prompt(phase: &str, goal: &str, spec: &ArchitectureSpec) -> String {
    let features = spec.features.join(", ");
    match phase {
        "scaffold" => format!(
            "Scaffold the project `{}` for: {goal}\nDirectory structure:\n{}\n\
             Create the directories, manifests, and configuration for a {} + {} project.",
            spec.name,
            spec.directory_structure.join("\n"),
            spec.tech_stack.frontend,
            spec.tech_stack.backend,
        ),
        "backend" => format!(
            "Implement the backend ({} + {} via {}). API contracts:\n{}\nData models:\n{}",
            spec.tech_stack.backend,
            spec.tech_stack.database,
            spec.tech_stack.orm,
            spec.api_contracts.join("\n"),
            spec.data_models.join("\n"),
        ),
        "frontend" => format!(
            "Implement the frontend ({} with {}). Features: {features}\nComponent tree:\n{}",
            spec.tech_stack.frontend,
            spec.tech_stack.styling,
            spec.component_tree.join("\n"),
        ),
        "testing" => format!(
            "Write tests for `{}` covering: {features}\nFocus on the API contracts and core flows.",
            spec.name,
        ),
        "security" => format!(
            "Audit `{}` for security issues. Auth approach: {}. Env vars: {}",
            spec.name,
            spec.tech_stack.auth,
            spec.env_vars.join(", "),
        ),
        "devops" => format!(
            "Set up deployment for `{}` targeting {}. Include CI configuration.",
            spec.name, spec.tech_stack.deployment,
        ),
        _ => format!(
            "Write the README and setup docs for `{}` — {}. Features: {features}",
            spec.name, spec.description,
        ),
    }
}

/// File paths the specialist reported creating, scraped from its summary.
fn extract_reported_paths(response: &str) -> Vec<String> {
    REPORTED_PATH
        .captures_iter(response)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
        .collect()
}
