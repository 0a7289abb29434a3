//! # ensemble-tokens
//!
//! Token accounting and cost estimation for ensemble runs.
//!
//! 1. **Extraction** — pull a [`TokenUsage`] triple out of the
//!    loosely-shaped payloads collaborators report (nested or flat
//!    objects, snake_case or camelCase keys, missing fields).
//! 2. **Accumulation** — field-wise saturating sums live on
//!    [`TokenUsage`] in `ensemble-core`.
//! 3. **Cost estimation** — a pluggable [`PricingStrategy`] assigns a
//!    per-agent rate; [`estimate_cost`] turns totals into spend.
//!
//! [`TokenUsage`]: ensemble_core::TokenUsage

#![deny(unsafe_code)]

pub mod extraction;
pub mod pricing;

pub use extraction::{engine_usage_from_value, usage_from_value};
pub use pricing::{
    estimate_cost, format_cost, format_tokens, FixedRate, PriceTable, PricingStrategy,
    UniformBand,
};
