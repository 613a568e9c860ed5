//! End-to-end scenarios for the maestro engine.
//!
//! Every scenario drives the real orchestrator against a scripted
//! provider; no network, no filesystem mutation beyond temp dirs.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use maestro::prelude::*;

/// Provider wrapper that fires a cancellation token after a fixed number
/// of completed model calls.
struct TripwireProvider {
    inner: MockProvider,
    cancel: CancelToken,
    after_calls: usize,
    count: AtomicUsize,
}

impl TripwireProvider {
    fn new(inner: MockProvider, cancel: CancelToken, after_calls: usize) -> Self {
        Self {
            inner,
            cancel,
            after_calls,
            count: AtomicUsize::new(0),
        }
    }

    fn bump(&self) {
        if self.count.fetch_add(1, Ordering::SeqCst) + 1 == self.after_calls {
            self.cancel.cancel();
        }
    }

    fn calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for TripwireProvider {
    async fn complete(&self, opts: &ChatOptions) -> Result<maestro::client::Completion> {
        let result = self.inner.complete(opts).await;
        self.bump();
        result
    }

    async fn stream(&self, opts: &ChatOptions) -> Result<maestro::client::ChunkStream> {
        self.inner.stream(opts).await
    }

    async fn stream_complete(
        &self,
        opts: &ChatOptions,
        on_token: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> Result<maestro::client::Completion> {
        let result = self.inner.stream_complete(opts, on_token).await;
        self.bump();
        result
    }
}

fn orchestrator(provider: impl ChatProvider + 'static) -> Orchestrator {
    Orchestrator::new(Arc::new(provider), "/tmp/maestro-it")
}

// Scenario 1: a simple question takes one ReAct pass with zero tools.
#[tokio::test]
async fn simple_question_route() {
    let provider = MockProvider::new()
        .with_default("TypeScript is JavaScript with static types.");
    let result = orchestrator(provider).run(Goal::new("What is TypeScript?")).await;

    assert!(result.success);
    assert_eq!(result.route, Route::Simple);
    assert!(!result.response.is_empty());
    let Some(RouteDetail::Simple(outcome)) = result.detail else {
        panic!("expected simple detail");
    };
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.records.is_empty());
}

// Boundary: the empty goal also takes the simple path with no tools.
#[tokio::test]
async fn empty_goal_is_simple() {
    let provider = MockProvider::new().with_default("How can I help?");
    let result = orchestrator(provider).run(Goal::new("")).await;

    assert_eq!(result.route, Route::Simple);
    let Some(RouteDetail::Simple(outcome)) = result.detail else {
        panic!("expected simple detail");
    };
    assert!(outcome.records.is_empty());
}

// Scenario 2: standard plan → code → review, with a follow-up coder run
// when the reviewer rejects, and a ⚠️-prefixed reviewer summary.
#[tokio::test]
async fn standard_pipeline_with_review_rejection() {
    let provider = MockProvider::new()
        .rule("You are Planner", "1. Add a validator\n2. Wire it into the form")
        .rule("You are Coder", "Implemented validation in the login form.")
        .rule(
            "You are Reviewer",
            "approved=false\nIssues:\n- empty email accepted",
        );
    let provider = Arc::new(provider);
    let result = Orchestrator::new(Arc::clone(&provider) as Arc<dyn ChatProvider>, "/tmp")
        .run(Goal::new("Add input validation to the login form"))
        .await;

    assert_eq!(result.route, Route::Standard);
    assert!(result.success);
    assert!(result.response.starts_with('\u{26a0}'));
    assert!(result.response.contains("empty email accepted"));

    let Some(RouteDetail::Standard(report)) = result.detail else {
        panic!("expected standard detail");
    };
    assert!(!report.approved);
    assert!(report.revised);
    // planner + coder + reviewer + follow-up coder.
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test]
async fn standard_pipeline_approved() {
    let provider = MockProvider::new()
        .rule("You are Planner", "1. do it")
        .rule("You are Coder", "Done.")
        .rule("You are Reviewer", "approved=true — clean change");
    let provider = Arc::new(provider);
    let result = Orchestrator::new(Arc::clone(&provider) as Arc<dyn ChatProvider>, "/tmp")
        .run(Goal::new("Add input validation to the login form"))
        .await;

    assert!(result.response.starts_with('\u{2705}'));
    assert_eq!(provider.call_count(), 3);
}

const DAG_GOAL: &str = "Build a production scalable microservice with security audit, \
                        database migrations, comprehensive tests, and CI/CD";

const DAG_PLAN: &str = r#"{"tasks":[
    {"id":"schema","title":"Design schema","description":"Design the database schema","domain":"database","dependencies":[],"complexity":3,"priority":80},
    {"id":"service","title":"Implement service","description":"Implement the microservice","domain":"backend","dependencies":["schema"],"complexity":4},
    {"id":"audit","title":"Security audit","description":"Audit the service","domain":"security","dependencies":["service"],"complexity":3},
    {"id":"tests","title":"Write tests","description":"Cover the service with tests","domain":"testing","dependencies":["service"],"complexity":3}
]}"#;

// Scenario 3: a complex goal decomposes into a multi-domain DAG executed
// in multiple tiers, and the summary enumerates per-task checkmarks.
#[tokio::test]
async fn dag_route_executes_tiers() {
    let provider = MockProvider::new()
        .rule("You decompose", DAG_PLAN)
        .with_default("Task complete.");
    let result = orchestrator(provider).run(Goal::new(DAG_GOAL)).await;

    assert_eq!(result.route, Route::Dag);
    assert!(result.success);

    let Some(RouteDetail::Dag(report)) = result.detail else {
        panic!("expected dag detail");
    };
    assert!(report.graph.tasks.len() >= 3);
    assert!(report.tiers_run >= 2);
    let domains: std::collections::BTreeSet<&str> = report
        .graph
        .tasks
        .iter()
        .map(|t| t.domain.as_str())
        .collect();
    assert!(domains.len() >= 2);

    // Summary: one ✅ line per task.
    assert_eq!(result.response.matches('\u{2705}').count(), 4);
    assert!(result.response.contains("schema"));
}

// A decomposer that returns garbage still executes: the fallback plan.
#[tokio::test]
async fn dag_route_survives_decomposer_garbage() {
    let provider = MockProvider::new()
        .rule("You decompose", "I would rather write a poem.")
        .with_default("Task complete.");
    let result = orchestrator(provider).run(Goal::new(DAG_GOAL)).await;

    assert!(result.success);
    let Some(RouteDetail::Dag(report)) = result.detail else {
        panic!("expected dag detail");
    };
    assert_eq!(report.graph.tasks.len(), 3);
    assert_eq!(report.tiers_run, 3);
}

const GOOD_ANSWER: &str = "One-line summary: Debounce a function.\n\n\
    ```ts\nexport function debounce(fn: () => void, ms: number) {\n  \
    let t: ReturnType<typeof setTimeout>;\n  return () => {\n    \
    clearTimeout(t);\n    t = setTimeout(fn, ms);\n  };\n}\n```\n\n\
    Tests:\n```ts\ntest(\"delays invocation\", () => {});\n```\n\n\
    Notes:\n- Trailing edge only.";

// Scenario 4: the quality pipeline generates three candidates on the
// temperature ladder, scores them, and rewrites when the best is weak.
#[tokio::test]
async fn quality_pipeline_with_rewrite() {
    let provider = Arc::new(
        MockProvider::new()
            .rule("judge one code answer", r#"{"score": 40, "reason": "unstructured"}"#)
            .rule("Answer to restructure", GOOD_ANSWER)
            .with_default("here is some code: setTimeout stuff"),
    );
    let result = Orchestrator::new(Arc::clone(&provider) as Arc<dyn ChatProvider>, "/tmp")
        .run(Goal::new(
            "Write a TypeScript function that debounces another function",
        ))
        .await;

    assert_eq!(result.route, Route::Quality);
    assert!(result.success);

    let Some(RouteDetail::Quality(report)) = result.detail else {
        panic!("expected quality detail");
    };
    assert_eq!(report.candidate_count, 3);
    assert!(report.was_rewritten);
    assert_eq!(report.all_scores.len(), 3);

    // The 4-part structure survives into the final text.
    assert!(result.response.contains("One-line summary:"));
    assert_eq!(result.response.matches("```ts").count(), 2);
    assert!(result.response.contains("Tests:"));
    assert!(result.response.contains("Notes:\n- "));

    // Generation calls walked the temperature ladder.
    let temps: Vec<f32> = provider
        .calls()
        .iter()
        .filter(|opts| {
            opts.messages
                .iter()
                .any(|m| m.content.contains("You write production-quality"))
        })
        .filter_map(|opts| opts.temperature)
        .collect();
    assert_eq!(temps.len(), 3);
    assert!((temps[0] - 0.05).abs() < 1e-6);
    assert!((temps[1] - 0.07).abs() < 1e-6);
    assert!((temps[2] - 0.09).abs() < 1e-6);
}

#[tokio::test]
async fn quality_pipeline_good_candidate_skips_rewrite() {
    let provider = MockProvider::new()
        .rule("judge one code answer", r#"{"score": 85, "reason": "solid"}"#)
        .with_default(GOOD_ANSWER);
    let result = orchestrator(provider)
        .run(Goal::new(
            "Write a TypeScript function that debounces another function",
        ))
        .await;

    let Some(RouteDetail::Quality(report)) = result.detail else {
        panic!("expected quality detail");
    };
    assert!(!report.was_rewritten);
    assert!(report.final_score >= 70);
}

const SPOTIFY_ARCHITECTURE: &str = r#"{
    "name": "tunestream",
    "description": "A music streaming app",
    "features": ["playlists", "search", "playback"],
    "tech_stack": {"frontend": "react", "styling": "tailwind", "backend": "node",
                   "database": "postgres", "orm": "prisma", "auth": "jwt",
                   "deployment": "docker"},
    "directory_structure": ["src/", "server/"],
    "api_contracts": ["GET /tracks - list tracks", "POST /playlists - create playlist"],
    "data_models": ["Track: id, title, artist", "Playlist: id, name, trackIds"],
    "component_tree": ["App > Library > TrackList"],
    "env_vars": ["DATABASE_URL", "JWT_SECRET"],
    "integrations": ["stripe"]
}"#;

// Scenario 5: the app pipeline runs all eight phases off a normalized
// ArchitectureSpec and deduplicates the files the phases report.
#[tokio::test]
async fn app_pipeline_builds_spotify_clone() {
    let provider = MockProvider::new()
        .rule("You are the architect", SPOTIFY_ARCHITECTURE)
        .rule("Scaffold the project", "Created package.json and wrote src/index.tsx")
        .rule("Implement the backend", "Created server/api.ts and updated package.json")
        .rule("Implement the frontend", "Created src/App.tsx")
        .with_default("Phase complete, nothing written.");
    let result = orchestrator(provider).run(Goal::new("Create a clone of Spotify")).await;

    assert_eq!(result.route, Route::AppPipeline);
    assert!(result.success);

    let Some(RouteDetail::App(report)) = result.detail else {
        panic!("expected app detail");
    };
    assert_eq!(report.phases.len(), 8);
    assert!(!report.architecture.features.is_empty());
    assert!(!report.architecture.api_contracts.is_empty());
    assert!(!report.architecture.data_models.is_empty());

    // package.json reported by two phases lands in the union once.
    assert_eq!(
        report.files_created,
        vec!["package.json", "src/index.tsx", "server/api.ts", "src/App.tsx"],
    );

    // The summary renders the eight-row phase table.
    let rows = result
        .response
        .lines()
        .filter(|l| l.starts_with("| ") && !l.starts_with("| #"))
        .count();
    assert_eq!(rows, 8);
}

// A static app (backend = "none") skips phase 3.
#[tokio::test]
async fn app_pipeline_skips_backend_for_static_app() {
    let provider = MockProvider::new()
        .rule(
            "You are the architect",
            r#"{"name":"landing","description":"static page","tech_stack":{"backend":"none"}}"#,
        )
        .with_default("Phase complete.");
    let result = orchestrator(provider).run(Goal::new("Create a landing page app")).await;

    let Some(RouteDetail::App(report)) = result.detail else {
        panic!("expected app detail");
    };
    let backend = report.phases.iter().find(|p| p.name == "backend").unwrap();
    assert_eq!(backend.status, maestro::pipeline::PhaseStatus::Skipped);
}

// An unparseable architect response aborts the whole pipeline.
#[tokio::test]
async fn app_pipeline_aborts_without_architecture() {
    let provider = MockProvider::new()
        .rule("You are the architect", "I don't do JSON.")
        .with_default("unreachable");
    let result = orchestrator(provider).run(Goal::new("Create a clone of Spotify")).await;

    assert!(!result.success);
    assert!(result.response.contains("[parse]"));
}

// Scenario 6: cancellation lands after tier 1 completes; tier 2 never
// launches and tier-1 results are preserved.
#[tokio::test]
async fn cancellation_between_tiers() {
    const TWO_TIER_PLAN: &str = r#"{"tasks":[
        {"id":"first","title":"First","description":"Tier one work","domain":"coder","dependencies":[]},
        {"id":"second","title":"Second","description":"Tier two work","domain":"testing","dependencies":["first"]},
        {"id":"third","title":"Third","description":"More tier two work","domain":"docs","dependencies":["first"]}
    ]}"#;

    let cancel = CancelToken::new();
    let inner = MockProvider::new()
        .rule("You decompose", TWO_TIER_PLAN)
        .with_default("Task complete.");
    // Call 1 = decomposition, call 2 = the single tier-1 specialist.
    let provider = TripwireProvider::new(inner, cancel.clone(), 2);
    let provider = Arc::new(provider);

    let result = Orchestrator::new(
        Arc::clone(&provider) as Arc<dyn ChatProvider>,
        "/tmp",
    )
    .run(Goal::new(DAG_GOAL).cancel(cancel))
    .await;

    assert!(!result.success);
    assert!(result.response.starts_with("Pipeline cancelled."));

    let Some(RouteDetail::Dag(report)) = result.detail else {
        panic!("expected dag detail");
    };
    assert!(report.cancelled);
    // Tier 1 ran and its result is preserved.
    assert_eq!(report.results.len(), 1);
    assert!(report.results["first"].success);
    assert_eq!(
        report.graph.get("first").unwrap().status,
        TaskStatus::Completed,
    );
    // Tier 2 never launched a driver: only 2 model calls happened.
    assert_eq!(provider.calls(), 2);
    assert_eq!(
        report.graph.get("second").unwrap().status,
        TaskStatus::Cancelled,
    );
    assert_eq!(
        report.graph.get("third").unwrap().status,
        TaskStatus::Cancelled,
    );
}

// A goal cancelled before the run starts reports "Operation cancelled."
#[tokio::test]
async fn cancelled_before_start() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let provider = MockProvider::new().with_default("never");
    let result = orchestrator(provider)
        .run(Goal::new("What is TypeScript?").cancel(cancel))
        .await;

    assert!(!result.success);
    assert_eq!(result.response, "Operation cancelled.");
}

// Think mode strips reasoning into thinking events and out of the answer.
#[tokio::test]
async fn think_mode_routes_reasoning_to_events() {
    let provider = MockProvider::new()
        .with_default("<think>types are sets</think>TypeScript adds static types.");
    let (sink, mut rx) = ChannelSink::new();
    let result = Orchestrator::new(Arc::new(provider), "/tmp")
        .events(Arc::new(sink))
        .run(Goal::new("What is TypeScript?").think_mode(true))
        .await;

    assert_eq!(result.response, "TypeScript adds static types.");

    let mut saw_thinking = false;
    let mut saw_done = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::Thinking(text) => {
                assert_eq!(text, "types are sets");
                saw_thinking = true;
            }
            EngineEvent::Done => saw_done = true,
            _ => {}
        }
    }
    assert!(saw_thinking);
    assert!(saw_done);
}
