//! Human-readable run completion summaries.
//!
//! Rendered once at finalization and logged as a single block: status,
//! final output, engine totals, then per-agent cost and per-task token
//! tables from the aggregated telemetry.

use std::fmt::Write as _;

use tracing::info;

use ensemble_core::records::{RunRecord, RunStatus, TokenUsage};
use ensemble_tokens::{format_cost, format_tokens};

/// Log the completion summary for a finished run.
pub fn log_run_summary(record: &RunRecord) {
    info!(
        run_id = %record.run_id,
        status = %record.status(),
        "\n{}",
        render_summary(record)
    );
}

/// Render the summary text.
#[must_use]
pub fn render_summary(record: &RunRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "FINAL SUMMARY FOR RUN: {}", record.run_id);
    let _ = writeln!(out, "Task Description: {}", record.task_description);
    let _ = writeln!(out, "Status: {}", record.status());
    if let Some(error) = &record.error {
        let _ = writeln!(out, "Error Message: {error}");
    }
    let _ = writeln!(
        out,
        "Final Output: {}",
        record.final_output.as_deref().unwrap_or("N/A")
    );

    if let Some(metrics) = &record.usage_metrics {
        let _ = writeln!(
            out,
            "Engine Totals: {} tokens over {} requests",
            format_tokens(metrics.usage.total_tokens),
            metrics.successful_requests
        );
    }

    if record.agent_usage.is_empty() {
        let _ = writeln!(out, "Agent Usage: not available");
    } else {
        let _ = writeln!(out, "Agent Usage:");
        let mut totals = TokenUsage::default();
        let mut total_cost = 0.0;
        for (name, usage) in &record.agent_usage {
            totals.add(&usage.usage);
            total_cost += usage.estimated_cost.unwrap_or(0.0);
            let _ = writeln!(
                out,
                "  {name:<30} prompt={:<10} completion={:<10} total={:<10} rate={} cost={}",
                format_tokens(usage.usage.prompt_tokens),
                format_tokens(usage.usage.completion_tokens),
                format_tokens(usage.usage.total_tokens),
                usage
                    .rate_per_million
                    .map_or_else(|| "N/A".to_owned(), |r| format!("${r:.2}/M")),
                usage
                    .estimated_cost
                    .map_or_else(|| "N/A".to_owned(), format_cost),
            );
        }
        let _ = writeln!(
            out,
            "  TOTAL: {} tokens, estimated {}",
            format_tokens(totals.total_tokens),
            format_cost(total_cost)
        );
    }

    if record.task_flow.is_empty() {
        let _ = writeln!(out, "Task Flow: not available");
    } else {
        let _ = writeln!(out, "Task Flow:");
        for task in &record.task_flow {
            let usage = task.token_usage.unwrap_or_default();
            let _ = writeln!(
                out,
                "  [{}] {} — total={}",
                task.agent_name,
                excerpt(&task.task_description, 60),
                format_tokens(usage.total_tokens)
            );
        }
    }

    out
}

fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_owned()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}..")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_core::records::{AgentUsage, EngineUsage, TaskRecord};

    fn record_with_telemetry() -> RunRecord {
        let mut record = RunRecord::new("run-1", "write a story");
        record.final_output = Some("Once upon a time".into());
        record.usage_metrics = Some(EngineUsage {
            usage: TokenUsage::new(30, 5, 35),
            successful_requests: 2,
        });
        let _ = record.agent_usage.insert(
            "Plot Generator".into(),
            AgentUsage {
                usage: TokenUsage::new(30, 5, 35),
                rate_per_million: Some(2.0),
                estimated_cost: Some(0.00007),
            },
        );
        record.task_flow.push(TaskRecord {
            task_description: "Draft the plot".into(),
            agent_name: "Plot Generator".into(),
            input_context_summary: "none".into(),
            output: Some("a plot".into()),
            token_usage: Some(TokenUsage::new(30, 5, 35)),
        });
        record
    }

    #[test]
    fn summary_contains_core_facts() {
        let text = render_summary(&record_with_telemetry());
        assert!(text.contains("run-1"));
        assert!(text.contains("write a story"));
        assert!(text.contains("Status: success"));
        assert!(text.contains("Once upon a time"));
        assert!(text.contains("Plot Generator"));
        assert!(text.contains("$2.00/M"));
        assert!(text.contains("$0.000070"));
    }

    #[test]
    fn failed_run_shows_error() {
        let mut record = RunRecord::new("run-2", "t");
        record.error = Some("rate limited".into());
        let text = render_summary(&record);
        assert!(text.contains("Status: error"));
        assert!(text.contains("Error Message: rate limited"));
        assert!(text.contains("Final Output: N/A"));
    }

    #[test]
    fn empty_telemetry_marked_unavailable() {
        let record = RunRecord::new("run-3", "t");
        let text = render_summary(&record);
        assert!(text.contains("Agent Usage: not available"));
        assert!(text.contains("Task Flow: not available"));
    }

    #[test]
    fn totals_summed_across_agents() {
        let mut record = record_with_telemetry();
        let _ = record.agent_usage.insert(
            "Editor".into(),
            AgentUsage {
                usage: TokenUsage::new(10, 10, 20),
                rate_per_million: Some(1.0),
                estimated_cost: Some(0.00002),
            },
        );
        let text = render_summary(&record);
        assert!(text.contains("TOTAL: 55 tokens"));
        assert!(text.contains("$0.000090"));
    }

    #[test]
    fn log_does_not_panic() {
        log_run_summary(&record_with_telemetry());
    }
}
