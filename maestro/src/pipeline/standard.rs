//! The standard plan → code → review path.
//!
//! Three specialists in sequence. When the reviewer rejects, the coder
//! gets exactly one follow-up run with the reviewer's issue list, and the
//! reviewer's summary is surfaced with a ⚠️ instead of a ✅.

use tracing::info;

use crate::catalog::Domain;
use crate::error::{Error, Result};
use crate::event::EngineEvent;
use crate::react::parse::truncate_chars;
use crate::react::{ReactOutcome, ReactStatus};

use super::Orchestrator;

/// Outcome of the standard path.
#[derive(Debug, Clone)]
pub struct StandardReport {
    /// Whether all stages completed (review may still disapprove).
    pub success: bool,
    /// Whether the reviewer approved the final state.
    pub approved: bool,
    /// Whether the coder got a follow-up run.
    pub revised: bool,
    /// Final user-facing summary (reviewer verdict, check-marked).
    pub summary: String,
    /// Files modified across coder runs.
    pub files_modified: Vec<String>,
}

/// Reviewer verdict extraction: an explicit `approved=false` (or
/// `approved: false`) rejects; anything else approves.
#[must_use]
pub fn review_approved(review: &str) -> bool {
    let lower = review.to_lowercase();
    !(lower.contains("approved=false") || lower.contains("approved: false"))
}

pub(super) async fn run_standard(orchestrator: &Orchestrator, goal: &str) -> Result<StandardReport> {
    let events = orchestrator.sink();

    events.emit(EngineEvent::Status("planning".into()));
    let plan = run_stage(orchestrator, &Domain::Planner, &format!("Plan how to: {goal}")).await?;

    events.emit(EngineEvent::Status("implementing".into()));
    let coder_task = format!(
        "Implement: {goal}\n\nPlan from the planner:\n{}",
        truncate_chars(&plan.response, 3_000),
    );
    let mut code = run_stage(orchestrator, &Domain::Coder, &coder_task).await?;
    let mut files = code.files_modified();

    events.emit(EngineEvent::Status("reviewing".into()));
    let review_task = format!(
        "Review the changes made for: {goal}\n\nImplementer's report:\n{}",
        truncate_chars(&code.response, 3_000),
    );
    let review = run_stage(orchestrator, &Domain::Reviewer, &review_task).await?;

    // One follow-up only; the original verdict stands in the summary.
    let approved = review_approved(&review.response);
    let mut revised = false;
    if !approved {
        info!("Review rejected; running one follow-up coder pass");
        events.emit(EngineEvent::Status("addressing review issues".into()));
        let followup_task = format!(
            "Address these review issues for: {goal}\n\nReviewer's issues:\n{}",
            truncate_chars(&review.response, 3_000),
        );
        code = run_stage(orchestrator, &Domain::Coder, &followup_task).await?;
        for file in code.files_modified() {
            if !files.contains(&file) {
                files.push(file);
            }
        }
        revised = true;
    }

    let mark = if approved { "\u{2705}" } else { "\u{26a0}\u{fe0f}" };
    let summary = format!("{mark} {}", review.response.trim());
    Ok(StandardReport {
        success: true,
        approved,
        revised,
        summary,
        files_modified: files,
    })
}

/// Run one specialist stage; stage-level model failures abort the path.
async fn run_stage(
    orchestrator: &Orchestrator,
    domain: &Domain,
    task: &str,
) -> Result<ReactOutcome> {
    let outcome = orchestrator.run_specialist(domain, task).await?;
    match &outcome.status {
        ReactStatus::Completed | ReactStatus::MaxIterations => Ok(outcome),
        ReactStatus::Cancelled => Err(Error::Cancelled),
        ReactStatus::ModelError(message) => Err(Error::internal(message.clone())),
    }
}
