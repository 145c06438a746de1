//! Token accounting and budget signals.
//!
//! Token counts are a heuristic (about four characters per token), not a
//! tokenizer. The tracker only observes: whether an exhausted budget stops
//! model calls is decided by the pipeline's [`BudgetPolicy`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::lock;

/// Characters per estimated token
const CHARS_PER_TOKEN: u64 = 4;

/// What the pipeline does once the budget is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Keep calling the model, only signal
    Observe,
    /// Return degraded results without calling the model
    Degrade,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self::Observe
    }
}

/// Budget settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Estimated tokens allowed per period; 0 disables budget signals
    /// (default: 1,000,000)
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,

    /// Accounting period in seconds (default: 86400)
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u64,

    /// Optional price for a USD estimate
    #[serde(default)]
    pub cost_per_1k_tokens: Option<f64>,

    #[serde(default)]
    pub policy: BudgetPolicy,
}

fn default_token_budget() -> u64 {
    1_000_000
}
fn default_period_seconds() -> u64 {
    86_400
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            period_seconds: default_period_seconds(),
            cost_per_1k_tokens: None,
            policy: BudgetPolicy::default(),
        }
    }
}

/// Budget threshold crossed by a `record` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetThreshold {
    /// 80% of the budget consumed
    Warning,
    /// 100% of the budget consumed
    Exhausted,
}

impl BudgetThreshold {
    /// Fraction of the budget at which this threshold fires
    pub fn fraction(&self) -> f64 {
        match self {
            Self::Warning => 0.8,
            Self::Exhausted => 1.0,
        }
    }
}

/// Estimate tokens for one call: ceil((prompt + response chars) / 4)
pub fn estimate_tokens(prompt_chars: usize, response_chars: usize) -> u64 {
    (prompt_chars as u64 + response_chars as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Totals for the current period
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostSnapshot {
    pub tokens: u64,
    pub requests: u64,
    pub token_budget: u64,
    pub fraction_consumed: f64,
    /// USD estimate, when a price is configured
    pub estimated_cost_usd: Option<f64>,
    /// Time since the period started
    pub period_elapsed: Duration,
}

#[derive(Debug)]
struct Period {
    started: Instant,
    tokens: u64,
    requests: u64,
    warned: bool,
    exhausted: bool,
}

impl Period {
    fn starting(at: Instant) -> Self {
        Self {
            started: at,
            tokens: 0,
            requests: 0,
            warned: false,
            exhausted: false,
        }
    }
}

/// Per-period token accumulator
#[derive(Debug)]
pub struct CostTracker {
    settings: BudgetSettings,
    period: Mutex<Period>,
    clock: Arc<dyn Clock>,
}

impl CostTracker {
    pub fn new(settings: BudgetSettings, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            settings,
            period: Mutex::new(Period::starting(now)),
            clock,
        }
    }

    pub fn settings(&self) -> &BudgetSettings {
        &self.settings
    }

    /// Add one completed call. Returns the highest threshold newly crossed.
    pub fn record(&self, tokens: u64) -> Option<BudgetThreshold> {
        let mut period = self.current_period();
        period.tokens = period.tokens.saturating_add(tokens);
        period.requests += 1;

        if self.settings.token_budget == 0 {
            return None;
        }
        let fraction = period.tokens as f64 / self.settings.token_budget as f64;

        if fraction >= BudgetThreshold::Exhausted.fraction() && !period.exhausted {
            period.exhausted = true;
            period.warned = true;
            return Some(BudgetThreshold::Exhausted);
        }
        if fraction >= BudgetThreshold::Warning.fraction() && !period.warned {
            period.warned = true;
            return Some(BudgetThreshold::Warning);
        }
        None
    }

    /// Fraction of the budget used this period (0 when budgets are off)
    pub fn fraction_consumed(&self) -> f64 {
        let period = self.current_period();
        self.fraction_of(period.tokens)
    }

    /// Whether this period's budget is used up
    pub fn is_exhausted(&self) -> bool {
        self.settings.token_budget > 0
            && self.current_period().tokens >= self.settings.token_budget
    }

    pub fn snapshot(&self) -> CostSnapshot {
        let now = self.clock.now();
        let period = self.current_period();
        CostSnapshot {
            tokens: period.tokens,
            requests: period.requests,
            token_budget: self.settings.token_budget,
            fraction_consumed: self.fraction_of(period.tokens),
            estimated_cost_usd: self
                .settings
                .cost_per_1k_tokens
                .map(|price| period.tokens as f64 / 1000.0 * price),
            period_elapsed: now.saturating_duration_since(period.started),
        }
    }

    fn fraction_of(&self, tokens: u64) -> f64 {
        if self.settings.token_budget == 0 {
            0.0
        } else {
            tokens as f64 / self.settings.token_budget as f64
        }
    }

    /// Lock the period, rolling it over if it has ended
    fn current_period(&self) -> std::sync::MutexGuard<'_, Period> {
        let now = self.clock.now();
        let length = Duration::from_secs(self.settings.period_seconds);
        let mut period = lock(&self.period);
        if now.saturating_duration_since(period.started) >= length {
            *period = Period::starting(now);
        }
        period
    }
}
