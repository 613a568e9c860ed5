//! Quality pipeline — K-candidate generation, hybrid scoring, rewrite.
//!
//! For self-contained code-generation requests the engine does not run a
//! ReAct loop; it samples K candidates on a temperature ladder, scores
//! each with a programmatic checker plus an LLM critic, reranks, and —
//! when even the best falls below the threshold — runs one deterministic
//! rewrite pass that enforces the required output structure.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::client::{ChatOptions, ChatProvider};
use crate::event::{EngineEvent, SharedSink};
use crate::json_repair::parse_relaxed;
use crate::message::Message;
use crate::prompts;

/// Quality pipeline configuration.
#[derive(Debug, Clone, Copy)]
pub struct QualityConfig {
    /// Number of candidates to generate.
    pub candidates: usize,
    /// Base sampling temperature; each candidate adds 0.02, clamped at 0.15.
    pub code_temperature: f32,
    /// Combined score below which the rewrite pass runs.
    pub rewrite_threshold: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            candidates: 3,
            code_temperature: 0.05,
            rewrite_threshold: 70,
        }
    }
}

/// Score breakdown for one candidate.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    /// Programmatic score in `[0..100]`.
    pub programmatic: u32,
    /// Critic score in `[0..100]` (50 when the critic failed).
    pub learned: u32,
    /// `round(0.6 × programmatic + 0.4 × learned)`.
    pub combined: u32,
    /// Names of the checks that fired.
    pub checks: Vec<String>,
    /// The critic's reason, when it produced one.
    pub critic_notes: Option<String>,
}

/// One generated candidate with its scores.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Generation index (drives the temperature ladder).
    pub index: usize,
    /// Candidate text.
    pub text: String,
    /// Combined score.
    pub score: u32,
    /// Full breakdown.
    pub breakdown: ScoreBreakdown,
}

/// Final report from a quality run.
#[derive(Debug, Clone)]
pub struct QualityReport {
    /// The adopted answer.
    pub final_text: String,
    /// Its combined score.
    pub final_score: u32,
    /// How many candidates were generated.
    pub candidate_count: usize,
    /// Whether the rewrite pass ran.
    pub was_rewritten: bool,
    /// Combined scores of all candidates, rerank order.
    pub all_scores: Vec<u32>,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// The generate → score → rerank → rewrite pass.
#[derive(Clone)]
pub struct QualityPipeline {
    provider: Arc<dyn ChatProvider>,
    config: QualityConfig,
}

impl std::fmt::Debug for QualityPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityPipeline")
            .field("candidates", &self.config.candidates)
            .field("rewrite_threshold", &self.config.rewrite_threshold)
            .finish()
    }
}

impl QualityPipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            config: QualityConfig::default(),
        }
    }

    /// Override the configuration.
    #[must_use]
    pub const fn config(mut self, config: QualityConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the full pass for a code-generation goal.
    ///
    /// # Errors
    ///
    /// Returns an error only when every candidate generation failed or the
    /// run was cancelled; a failing critic or rewrite degrades gracefully.
    pub async fn run(
        &self,
        goal: &str,
        cancel: &CancelToken,
        events: &SharedSink,
    ) -> crate::error::Result<QualityReport> {
        let started = Instant::now();
        events.emit(EngineEvent::Status(format!(
            "generating {} candidate(s)",
            self.config.candidates,
        )));

        let mut candidates = Vec::with_capacity(self.config.candidates);
        for index in 0..self.config.candidates {
            cancel.check()?;
            match self.generate_candidate(goal, index, cancel).await {
                Ok(text) => candidates.push((index, text)),
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => warn!(index, error = %err, "Candidate generation failed"),
            }
        }
        if candidates.is_empty() {
            return Err(crate::error::Error::internal(
                "every candidate generation failed",
            ));
        }

        events.emit(EngineEvent::Status("scoring candidates".into()));
        let mut scored = Vec::with_capacity(candidates.len());
        for (index, text) in candidates {
            cancel.check()?;
            let (programmatic, checks) = score_programmatic(&text);
            let (learned, critic_notes) = self.score_learned(goal, &text, cancel).await;
            let combined = combine(programmatic, learned);
            debug!(index, programmatic, learned, combined, "Candidate scored");
            scored.push(Candidate {
                index,
                text,
                score: combined,
                breakdown: ScoreBreakdown {
                    programmatic,
                    learned,
                    combined,
                    checks,
                    critic_notes,
                },
            });
        }

        // Rerank by combined score, stable on generation index.
        scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.index.cmp(&b.index)));
        let all_scores: Vec<u32> = scored.iter().map(|c| c.score).collect();
        let mut best = scored.swap_remove(0);

        let mut was_rewritten = false;
        if best.score < self.config.rewrite_threshold {
            events.emit(EngineEvent::Status(format!(
                "best score {} below {}; rewriting",
                best.score, self.config.rewrite_threshold,
            )));
            match self.rewrite(goal, &best.text, cancel).await {
                Ok(rewritten) => {
                    // Re-score programmatically only; the learned score
                    // carries over from the original candidate.
                    let (programmatic, checks) = score_programmatic(&rewritten);
                    let combined = combine(programmatic, best.breakdown.learned);
                    best = Candidate {
                        index: best.index,
                        text: rewritten,
                        score: combined,
                        breakdown: ScoreBreakdown {
                            programmatic,
                            learned: best.breakdown.learned,
                            combined,
                            checks,
                            critic_notes: best.breakdown.critic_notes.clone(),
                        },
                    };
                    was_rewritten = true;
                }
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => warn!(error = %err, "Rewrite failed; keeping original best"),
            }
        }

        info!(
            score = best.score,
            rewritten = was_rewritten,
            candidates = all_scores.len(),
            "Quality pass finished",
        );
        Ok(QualityReport {
            final_text: best.text,
            final_score: best.score,
            candidate_count: all_scores.len(),
            was_rewritten,
            all_scores,
            duration: started.elapsed(),
        })
    }

    /// Temperature for candidate `index` on the ladder.
    #[must_use]
    pub fn temperature_for(&self, index: usize) -> f32 {
        (self.config.code_temperature + 0.02 * index as f32).min(0.15)
    }

    async fn generate_candidate(
        &self,
        goal: &str,
        index: usize,
        cancel: &CancelToken,
    ) -> crate::error::Result<String> {
        let mut messages = vec![Message::system(prompts::CODE_STYLE_SYSTEM)];
        for (user, assistant) in prompts::code_few_shot() {
            messages.push(Message::user(user));
            messages.push(Message::assistant(assistant));
        }
        messages.push(Message::user(goal.to_owned()));

        let opts = ChatOptions::new(messages)
            .temperature(self.temperature_for(index))
            .cancel(cancel.clone());
        Ok(self.provider.complete(&opts).await?.text)
    }

    /// Critic call; defaults to 50 on any failure.
    async fn score_learned(
        &self,
        goal: &str,
        candidate: &str,
        cancel: &CancelToken,
    ) -> (u32, Option<String>) {
        let opts = ChatOptions::new(vec![
            Message::system(prompts::critic_system()),
            Message::user(format!("Request:\n{goal}\n\nAnswer:\n{candidate}")),
        ])
        .temperature(0.0)
        .cancel(cancel.clone());

        let response = match self.provider.complete(&opts).await {
            Ok(completion) => completion.text,
            Err(err) => {
                warn!(error = %err, "Critic call failed; defaulting to 50");
                return (50, None);
            }
        };

        match parse_relaxed(&response) {
            Ok(value) => {
                let score = value
                    .get("score")
                    .and_then(Value::as_u64)
                    .map_or(50, |s| s.min(100) as u32);
                let reason = value
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                (score, reason)
            }
            Err(err) => {
                warn!(error = %err, "Critic output unparseable; defaulting to 50");
                (50, None)
            }
        }
    }

    async fn rewrite(
        &self,
        goal: &str,
        best: &str,
        cancel: &CancelToken,
    ) -> crate::error::Result<String> {
        let opts = ChatOptions::new(vec![
            Message::system(prompts::REWRITE_SYSTEM),
            Message::user(format!("Original request:\n{goal}\n\nAnswer to restructure:\n{best}")),
        ])
        .temperature(0.0)
        .cancel(cancel.clone());
        Ok(self.provider.complete(&opts).await?.text)
    }
}

/// Combine programmatic and learned scores: `round(0.6p + 0.4l)`.
#[must_use]
pub const fn combine(programmatic: u32, learned: u32) -> u32 {
    (6 * programmatic + 4 * learned + 5) / 10
}

static COT_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(let me think|let's think|first, i'll|first i will|step 1:|okay, so)")
        .expect("cot regex")
});

static FUNCTION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(pub\s+)?(async\s+)?(export\s+)?(function\b|fn\b|def\b|class\b|const\s+\w+\s*=\s*(async\s*)?\()")
        .expect("function-start regex")
});

/// Banned patterns checked inside code blocks: name and matcher.
static BANNED: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("eval", Regex::new(r"\beval\(").expect("banned regex")),
        ("new_function", Regex::new(r"\bnew Function\(").expect("banned regex")),
        (
            "env_equality",
            Regex::new(r"process\.env\.\w+\s*===?\s*").expect("banned regex"),
        ),
        (
            "hardcoded_secret",
            Regex::new(r#"(?i)(api_?key|secret|password|token)\s*[:=]\s*["'][A-Za-z0-9+/_-]{8,}["']"#)
                .expect("banned regex"),
        ),
        ("any_type", Regex::new(r":\s*any\b").expect("banned regex")),
    ]
});

/// Programmatic score: starts at 100, applies the fixed penalty table,
/// clamps to `[0..100]`. Returns the score and the checks that fired.
#[must_use]
pub fn score_programmatic(text: &str) -> (u32, Vec<String>) {
    let mut penalty: u32 = 0;
    let mut checks = Vec::new();
    let mut hit = |name: &str, points: u32, penalty: &mut u32, checks: &mut Vec<String>| {
        *penalty += points;
        checks.push(name.to_owned());
    };

    let has_summary = text.contains("One-line summary:");
    let code_blocks = extract_code_blocks(text);
    let has_code = !code_blocks.is_empty();
    let has_tests = text.contains("Tests:");
    let has_notes = text.contains("Notes:");

    let parts_present = [has_summary, has_code, has_tests, has_notes]
        .iter()
        .filter(|p| **p)
        .count();
    if parts_present < 3 {
        hit("missing_structure", 30, &mut penalty, &mut checks);
    }
    if !has_summary {
        hit("missing_summary", 10, &mut penalty, &mut checks);
    }
    if !has_code {
        hit("missing_code_block", 20, &mut penalty, &mut checks);
    }
    if !has_tests {
        hit("missing_tests", 10, &mut penalty, &mut checks);
    }
    if !has_notes {
        hit("missing_notes", 5, &mut penalty, &mut checks);
    }

    for (name, pattern) in BANNED.iter() {
        if code_blocks.iter().any(|block| pattern.is_match(block)) {
            hit(name, 10, &mut penalty, &mut checks);
        }
    }

    if COT_OPENER.is_match(text) {
        hit("chain_of_thought_opener", 25, &mut penalty, &mut checks);
    }

    if code_blocks.len() > 3 {
        hit("too_many_code_blocks", 10, &mut penalty, &mut checks);
    }

    let longest = code_blocks
        .iter()
        .map(|b| estimate_max_function_lines(b))
        .max()
        .unwrap_or(0);
    if longest > 200 {
        hit("function_over_200_lines", 15, &mut penalty, &mut checks);
    } else if longest > 60 {
        hit("function_over_60_lines", 5, &mut penalty, &mut checks);
    }

    (100u32.saturating_sub(penalty).min(100), checks)
}

/// Extract fenced code block bodies.
#[must_use]
pub fn extract_code_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            match current.take() {
                Some(block) => blocks.push(block),
                None => current = Some(String::new()),
            }
            continue;
        }
        if let Some(block) = current.as_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }
    blocks
}

/// Estimate the longest function in a code block, in lines.
///
/// A function "starts" at a declaration-looking line and "ends" at the
/// next declaration or the end of the block. Crude, but monotone in the
/// sense the scorer needs.
fn estimate_max_function_lines(block: &str) -> usize {
    let lines: Vec<&str> = block.lines().collect();
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| FUNCTION_START.is_match(line))
        .map(|(i, _)| i)
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(k, &start)| {
            let end = starts.get(k + 1).copied().unwrap_or(lines.len());
            end - start
        })
        .max()
        .unwrap_or(0)
}
