//! Token usage tracking for LLM operations.
//!
//! [`Usage`] mirrors the provider's usage object. [`TokenMeter`] is the
//! process-wide additive counter: every completion reports into it, and a
//! single registered observer (typically the editor UI) is notified after
//! each update. It is a best-effort telemetry signal, not a budget
//! enforcement mechanism.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token usage statistics from one LLM operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the input/prompt.
    #[serde(default, alias = "prompt_tokens")]
    pub input_tokens: u64,

    /// Number of tokens in the output/completion.
    #[serde(default, alias = "completion_tokens")]
    pub output_tokens: u64,
}

impl Usage {
    /// Create a new usage record.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Create an empty usage record.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Total tokens consumed.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Rough token estimate for text with no provider-reported usage.
    ///
    /// Four characters per token, rounded up, matching the estimate the
    /// streaming client applies when the terminal usage record is absent.
    #[must_use]
    pub fn estimate(text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Observer invoked after every [`TokenMeter`] update with the new totals.
pub type UsageObserver = Box<dyn Fn(Usage) + Send + Sync>;

/// Process-wide token accounting.
///
/// Updates are monotonically additive; concurrent reporters are safe. The
/// observer slot accepts a single registration for the process lifetime.
#[derive(Debug, Default)]
pub struct TokenMeter {
    input: AtomicU64,
    output: AtomicU64,
}

static OBSERVER: OnceLock<UsageObserver> = OnceLock::new();
static METER: OnceLock<TokenMeter> = OnceLock::new();

impl TokenMeter {
    /// The process-wide meter instance.
    #[must_use]
    pub fn global() -> &'static Self {
        METER.get_or_init(Self::default)
    }

    /// Register the process-wide observer. Later registrations are ignored.
    pub fn observe(observer: impl Fn(Usage) + Send + Sync + 'static) {
        let _ = OBSERVER.set(Box::new(observer));
    }

    /// Add a usage record to the totals and notify the observer.
    pub fn record(&self, usage: Usage) {
        self.input.fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output.fetch_add(usage.output_tokens, Ordering::Relaxed);
        if let Some(observer) = OBSERVER.get() {
            observer(self.snapshot());
        }
    }

    /// Read the current totals.
    #[must_use]
    pub fn snapshot(&self) -> Usage {
        Usage {
            input_tokens: self.input.load(Ordering::Relaxed),
            output_tokens: self.output.load(Ordering::Relaxed),
        }
    }
}
