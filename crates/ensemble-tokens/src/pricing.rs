//! Pricing strategies and cost estimation.
//!
//! A [`PricingStrategy`] assigns each agent a rate in currency units per
//! million tokens. Three implementations ship:
//!
//! - [`FixedRate`] — one rate for everything
//! - [`PriceTable`] — per-agent rates with a default
//! - [`UniformBand`] — a uniform random rate inside a fixed band
//!
//! [`UniformBand`] is the default wiring and is a placeholder economic
//! model, not a billing source of truth: it exists so cost columns are
//! populated when no real price table is supplied. Costs are estimates.

use std::collections::HashMap;

use ensemble_core::records::TokenUsage;
use rand::Rng;

/// Rate assignment for one agent's accumulated usage.
///
/// Called once per agent at run finalization, never incrementally.
pub trait PricingStrategy: Send + Sync {
    /// The rate, in currency units per million tokens, for this agent.
    fn rate_per_million(&self, agent_name: &str, usage: &TokenUsage) -> f64;
}

/// One rate for every agent.
#[derive(Clone, Copy, Debug)]
pub struct FixedRate(pub f64);

impl PricingStrategy for FixedRate {
    fn rate_per_million(&self, _agent_name: &str, _usage: &TokenUsage) -> f64 {
        self.0
    }
}

/// Per-agent rates with a fallback default.
#[derive(Clone, Debug)]
pub struct PriceTable {
    rates: HashMap<String, f64>,
    default: f64,
}

impl PriceTable {
    /// Build a table from explicit per-agent rates and a default.
    #[must_use]
    pub fn new(rates: HashMap<String, f64>, default: f64) -> Self {
        Self { rates, default }
    }
}

impl PricingStrategy for PriceTable {
    fn rate_per_million(&self, agent_name: &str, _usage: &TokenUsage) -> f64 {
        self.rates.get(agent_name).copied().unwrap_or(self.default)
    }
}

/// Uniform random rate inside `[min, max]`, rounded to 2 decimals.
///
/// Placeholder model: produces plausible-looking rates when no billing
/// source exists. Each call draws a fresh rate.
#[derive(Clone, Copy, Debug)]
pub struct UniformBand {
    /// Lower bound of the band (inclusive).
    pub min: f64,
    /// Upper bound of the band (inclusive).
    pub max: f64,
}

impl Default for UniformBand {
    fn default() -> Self {
        Self { min: 0.5, max: 10.0 }
    }
}

impl PricingStrategy for UniformBand {
    fn rate_per_million(&self, _agent_name: &str, _usage: &TokenUsage) -> f64 {
        let rate = rand::rng().random_range(self.min..=self.max);
        round_to(rate, 2)
    }
}

/// Estimated spend for a token total at a given rate, rounded to 6
/// decimals: `total / 1_000_000 * rate`.
#[must_use]
pub fn estimate_cost(total_tokens: u64, rate_per_million: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let cost = (total_tokens as f64 / 1_000_000.0) * rate_per_million;
    round_to(cost, 6)
}

/// Format a cost for display, e.g. `$0.000135`.
#[must_use]
pub fn format_cost(cost: f64) -> String {
    format!("${cost:.6}")
}

/// Format a token count with thousands separators, e.g. `12,450`.
#[must_use]
pub fn format_tokens(tokens: u64) -> String {
    let digits = tokens.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
