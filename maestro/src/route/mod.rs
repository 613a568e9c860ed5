//! Route selection — classifying a goal into an execution path.
//!
//! Checks run in a fixed order: app-creation detection, complexity
//! scoring against the DAG threshold, the code-generation heuristic
//! (which takes the quality pipeline instead of the plain assistant), and
//! the simple-question heuristic. Anything left is the standard
//! plan→code→review path.

use std::sync::LazyLock;

use regex::Regex;

/// The execution path chosen for a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Single-agent assistant pass, no tools expected.
    Simple,
    /// Planner → coder → reviewer.
    Standard,
    /// Decompose into a DAG of specialists and execute in tiers.
    Dag,
    /// The fixed eight-phase app-creation pipeline.
    AppPipeline,
    /// Multi-candidate code generation with scoring and rewrite.
    Quality,
}

impl Route {
    /// Short label for status events and summaries.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Standard => "standard",
            Self::Dag => "dag",
            Self::AppPipeline => "app_pipeline",
            Self::Quality => "quality",
        }
    }
}

/// Route selector configuration.
#[derive(Debug, Clone, Copy)]
pub struct RouteConfig {
    /// Complexity score at or above which the DAG path is taken.
    pub complexity_threshold: u32,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 50,
        }
    }
}

static APP_CREATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(create|build|make|develop|scaffold)\b.{0,60}\b(app|application|clone|saas|platform|dashboard|website|marketplace)\b",
    )
    .expect("app-creation regex")
});

static NAMED_CLONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(spotify|airbnb|netflix|uber|twitter|instagram|youtube|slack|trello|notion|reddit)\b.{0,40}\bclone\b|\bclone\b.{0,40}\b(spotify|airbnb|netflix|uber|twitter|instagram|youtube|slack|trello|notion|reddit)\b",
    )
    .expect("named-clone regex")
});

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s+").expect("numbered-item regex"));

static FILE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[\w/.-]+\.(rs|ts|tsx|js|jsx|py|go|java|rb|css|html|json|yaml|yml|toml|sql|md|sh)\b")
        .expect("file-token regex")
});

static CODE_GEN_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(write|create|implement|generate)\b.{0,80}\b(function|method|class|struct|component|hook|snippet|regex|algorithm|utility|helper)\b")
        .expect("code-gen regex")
});

/// Build verbs that disqualify a goal from the simple path.
const CODING_VERBS: [&str; 18] = [
    "add", "fix", "implement", "refactor", "update", "remove", "delete", "write", "create",
    "build", "install", "deploy", "debug", "optimize", "rename", "migrate", "test", "run",
];

/// Feature nouns for the multi-feature app heuristic.
const FEATURE_KEYWORDS: [&str; 10] = [
    "auth", "login", "payment", "dashboard", "search", "notification", "upload", "chat",
    "profile", "subscription",
];

/// Markers that a goal spans many files.
const MULTI_FILE_MARKERS: [&str; 6] = [
    "across the codebase",
    "full-stack",
    "entire project",
    "all modules",
    "comprehensive",
    "end-to-end",
];

/// Keywords indicating distinct specialist domains.
const DOMAIN_KEYWORDS: [&str; 16] = [
    "security", "audit", "database", "migration", "test", "ci/cd", "deploy", "docker",
    "api", "frontend", "backend", "performance", "auth", "schema", "docs", "monitoring",
];

/// Markers of enterprise-scale asks.
const ENTERPRISE_MARKERS: [&str; 7] = [
    "production", "microservice", "from scratch", "scalable", "enterprise",
    "high availability", "multi-tenant",
];

/// Keywords that tie a request to the existing workspace (disqualifying
/// the quality pipeline, which answers without tools).
const WORKSPACE_MARKERS: [&str; 7] = [
    "the codebase", "this file", "this project", "our ", "existing", "refactor", "in the repo",
];

/// Classifies goals into execution routes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteSelector {
    config: RouteConfig,
}

impl RouteSelector {
    /// Create a selector.
    #[must_use]
    pub const fn new(config: RouteConfig) -> Self {
        Self { config }
    }

    /// Pick the execution path for a goal.
    #[must_use]
    pub fn select(&self, goal: &str) -> Route {
        if is_app_creation(goal) {
            return Route::AppPipeline;
        }
        if complexity_score(goal) >= self.config.complexity_threshold {
            return Route::Dag;
        }
        if is_code_generation(goal) {
            return Route::Quality;
        }
        if is_simple_question(goal) {
            return Route::Simple;
        }
        Route::Standard
    }
}

/// App-creation detection: regex bag, named clones, or a build verb plus
/// three feature keywords.
#[must_use]
pub fn is_app_creation(goal: &str) -> bool {
    if APP_CREATION.is_match(goal) || NAMED_CLONE.is_match(goal) {
        return true;
    }
    let lower = goal.to_lowercase();
    let has_build_verb = ["create", "build", "make", "develop"]
        .iter()
        .any(|v| lower.contains(v));
    let features = FEATURE_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    has_build_verb && features >= 3
}

/// Additive complexity score, clamped to 100.
#[must_use]
pub fn complexity_score(goal: &str) -> u32 {
    let lower = goal.to_lowercase();
    let mut score = 0u32;

    if goal.len() > 500 {
        score += 20;
    } else if goal.len() > 200 {
        score += 10;
    }

    let many_ands = lower.matches(" and ").count() >= 3;
    if many_ands || MULTI_FILE_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 15;
    }

    let domains = DOMAIN_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    score += match domains {
        0 => 0,
        1 => 10,
        2 => 20,
        _ => 30,
    };

    if ENTERPRISE_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 10;
    }

    if NUMBERED_ITEM.find_iter(goal).count() >= 3 {
        score += 15;
    }

    if FILE_TOKEN.find_iter(goal).count() >= 4 {
        score += 10;
    }

    score.min(100)
}

/// Short interrogative goals, or short goals with no coding verb.
#[must_use]
pub fn is_simple_question(goal: &str) -> bool {
    let trimmed = goal.trim();
    let lower = trimmed.to_lowercase();

    if trimmed.len() < 30
        && ["what", "how", "why", "explain", "can you"]
            .iter()
            .any(|p| lower.starts_with(p))
    {
        return true;
    }
    trimmed.len() < 80
        && !CODING_VERBS
            .iter()
            .any(|v| lower.split_whitespace().any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == *v))
}

/// Self-contained code-generation requests — the quality-pipeline trigger.
#[must_use]
pub fn is_code_generation(goal: &str) -> bool {
    let lower = goal.to_lowercase();
    let opener = CODE_GEN_OPENER.is_match(goal) || lower.contains("function that");
    opener && !WORKSPACE_MARKERS.iter().any(|m| lower.contains(m))
}
