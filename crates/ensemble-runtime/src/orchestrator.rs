//! The per-run state machine and background worker.
//!
//! `Submitted → Planning → Executing → {Succeeded, Failed}`. `Failed` is
//! reachable from every non-terminal state; no stage is retried.
//!
//! [`Orchestrator::submit`] allocates a run id, registers the pending
//! phase, spawns exactly one worker task, and returns immediately — the
//! submission path never blocks on execution. The worker owns the run:
//! it is the only writer of that run's record and always produces exactly
//! one terminal record, whichever stage fails. Partial telemetry gathered
//! before a failure point is always preserved in the record.
//!
//! Collaborators (store, publisher, planner, engine, pricing) are
//! injected at construction and shared by handle; nothing is ambient.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use ensemble_core::errors::RunError;
use ensemble_core::events::{EventKind, EventPublisher, RunEvent};
use ensemble_core::ids::RunId;
use ensemble_core::records::{AgentSpec, AgentUsage, RunRecord};
use ensemble_llm::hierarchy::Planner;
use ensemble_tokens::pricing::PricingStrategy;
use ensemble_tokens::{engine_usage_from_value, estimate_cost};

use crate::engine::{CrewMember, CrewPlan, EventSink, ExecutionEngine};
use crate::store::RunStore;
use crate::summary;
use crate::telemetry::TelemetryAggregator;

/// Non-terminal lifecycle phase of an in-flight run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Accepted, worker not yet planning.
    Pending,
    /// Waiting on the planning collaborator.
    Planning,
    /// The execution engine is running the crew.
    Executing,
}

/// What one run produced before finalization.
struct RunOutcome {
    hierarchy: Option<Vec<AgentSpec>>,
    final_output: Option<String>,
    engine_usage: Option<Value>,
    error: Option<RunError>,
}

impl RunOutcome {
    fn failed(error: RunError) -> Self {
        Self {
            hierarchy: None,
            final_output: None,
            engine_usage: None,
            error: Some(error),
        }
    }
}

/// Drives runs end-to-end: planning, crew construction, engine execution,
/// and finalization into the run store.
pub struct Orchestrator {
    store: Arc<RunStore>,
    publisher: Arc<dyn EventPublisher>,
    planner: Arc<dyn Planner>,
    engine: Arc<dyn ExecutionEngine>,
    pricing: Arc<dyn PricingStrategy>,
    active: DashMap<String, RunPhase>,
}

impl Orchestrator {
    /// Create an orchestrator with injected collaborators.
    pub fn new(
        store: Arc<RunStore>,
        publisher: Arc<dyn EventPublisher>,
        planner: Arc<dyn Planner>,
        engine: Arc<dyn ExecutionEngine>,
        pricing: Arc<dyn PricingStrategy>,
    ) -> Self {
        Self {
            store,
            publisher,
            planner,
            engine,
            pricing,
            active: DashMap::new(),
        }
    }

    /// The run store this orchestrator finalizes into.
    #[must_use]
    pub fn store(&self) -> &Arc<RunStore> {
        &self.store
    }

    /// Phase of an in-flight run, `None` once terminal (or unknown).
    #[must_use]
    pub fn phase(&self, run_id: &str) -> Option<RunPhase> {
        self.active.get(run_id).map(|p| *p)
    }

    /// Number of in-flight runs.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Accept a run and start its background worker.
    ///
    /// Returns the freshly allocated run id immediately; execution
    /// errors only ever surface through the event stream and the stored
    /// terminal record.
    pub fn submit(self: &Arc<Self>, task_description: String) -> RunId {
        let run_id = RunId::new();
        let _ = self
            .active
            .insert(run_id.to_string(), RunPhase::Pending);
        info!(run_id = %run_id, task = %task_description, "accepted run");

        let this = Arc::clone(self);
        let worker_id = run_id.clone();
        drop(tokio::spawn(async move {
            this.drive(worker_id, task_description).await;
        }));

        run_id
    }

    /// The run worker. Completion contract: writes exactly one terminal
    /// record and publishes exactly one `run_complete`, on every path.
    async fn drive(self: Arc<Self>, run_id: RunId, task_description: String) {
        self.publisher
            .publish(RunEvent::status(run_id.as_str(), "Crew run starting..."));

        let aggregator = Arc::new(TelemetryAggregator::new(
            run_id.clone(),
            Arc::clone(&self.publisher),
        ));

        let outcome = self.execute(&run_id, &task_description, &aggregator).await;
        self.finalize(&run_id, &task_description, &aggregator, outcome);
    }

    /// Planning and execution stages. Every failure routes to a
    /// [`RunOutcome`] with the error set; nothing propagates.
    async fn execute(
        &self,
        run_id: &RunId,
        task_description: &str,
        aggregator: &Arc<TelemetryAggregator>,
    ) -> RunOutcome {
        // ── Planning ────────────────────────────────────────────────
        let _ = self
            .active
            .insert(run_id.to_string(), RunPhase::Planning);
        self.publisher.publish(RunEvent::status(
            run_id.as_str(),
            "Generating agent hierarchy...",
        ));

        let entries = match self.planner.generate_hierarchy(task_description).await {
            Ok(entries) => entries,
            Err(e) => {
                let error = if e.is_credential() {
                    RunError::Configuration(e.to_string())
                } else {
                    RunError::Planning(e.to_string())
                };
                return RunOutcome::failed(error);
            }
        };

        self.publisher.publish(RunEvent::new(
            EventKind::HierarchyGenerated,
            run_id.as_str(),
            Some(json!({ "hierarchy": entries })),
        ));

        // ── Crew construction ───────────────────────────────────────
        self.publisher.publish(RunEvent::status(
            run_id.as_str(),
            format!("Creating {} agents and tasks...", entries.len()),
        ));

        let mut members: Vec<CrewMember> = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            match AgentSpec::from_value(i, entry) {
                Ok(spec) => {
                    let member = CrewMember::from_spec(spec, task_description);
                    self.publisher.publish(RunEvent::new(
                        EventKind::AgentCreated,
                        run_id.as_str(),
                        Some(json!({
                            "agent_name": member.role,
                            "task_description": member.task_description,
                        })),
                    ));
                    members.push(member);
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "skipping malformed agent spec");
                    self.publisher.publish(RunEvent::warning(
                        run_id.as_str(),
                        format!("{e}. Skipping this agent/task."),
                    ));
                }
            }
        }

        if members.is_empty() {
            return RunOutcome::failed(RunError::NoAgents);
        }

        // ── Execution ───────────────────────────────────────────────
        self.publisher.publish(RunEvent::status(
            run_id.as_str(),
            format!(
                "Assembling and kicking off the crew with {} agents and {} tasks...",
                members.len(),
                members.len()
            ),
        ));

        let hierarchy: Vec<AgentSpec> = members.iter().map(|m| m.spec.clone()).collect();
        let plan = CrewPlan::sequential(members);
        let _ = self
            .active
            .insert(run_id.to_string(), RunPhase::Executing);

        let sink: Arc<dyn EventSink> = aggregator.clone() as Arc<dyn EventSink>;
        match self.engine.execute(&plan, sink).await {
            Ok(outcome) => {
                self.publisher.publish(RunEvent::status(
                    run_id.as_str(),
                    "Crew execution finished.",
                ));
                RunOutcome {
                    hierarchy: Some(hierarchy),
                    final_output: Some(outcome.output.into_text()),
                    engine_usage: outcome.usage,
                    error: None,
                }
            }
            Err(failure) => {
                error!(run_id = %run_id, error = %failure, "execution engine failed");
                RunOutcome {
                    hierarchy: Some(hierarchy),
                    final_output: None,
                    engine_usage: failure.usage.clone(),
                    error: Some(RunError::Execution(failure.message)),
                }
            }
        }
    }

    /// Merge telemetry, assign costs, write the terminal record exactly
    /// once, and publish the terminal event.
    fn finalize(
        &self,
        run_id: &RunId,
        task_description: &str,
        aggregator: &TelemetryAggregator,
        outcome: RunOutcome,
    ) {
        let agent_usage = aggregator
            .agent_usage()
            .into_iter()
            .map(|(name, usage)| {
                let rate = self.pricing.rate_per_million(&name, &usage);
                let cost = estimate_cost(usage.total_tokens, rate);
                (
                    name,
                    AgentUsage {
                        usage,
                        rate_per_million: Some(rate),
                        estimated_cost: Some(cost),
                    },
                )
            })
            .collect();

        let error = outcome.error.as_ref().map(ToString::to_string);
        if let Some(message) = &error {
            self.publisher
                .publish(RunEvent::error(run_id.as_str(), message.clone()));
        }

        let record = RunRecord {
            run_id: run_id.to_string(),
            task_description: task_description.to_owned(),
            agent_hierarchy: outcome.hierarchy,
            final_output: outcome.final_output,
            task_flow: aggregator.task_flow(),
            usage_metrics: outcome
                .engine_usage
                .as_ref()
                .map(engine_usage_from_value),
            agent_usage,
            error,
        };

        summary::log_run_summary(&record);

        // Store before publishing: a subscriber joining between the two
        // gets the replay from the store instead of missing both.
        if let Err(e) = self.store.insert(record.clone()) {
            warn!(run_id = %run_id, error = %e, "keeping existing terminal record");
        }
        let _ = self.active.remove(run_id.as_str());

        self.publisher.publish(RunEvent::run_complete(&record));
        info!(run_id = %run_id, status = %record.status(), "run finished");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
