//! # Session Runner
//!
//! Orchestrates one benchmark session: start it, run the agent over every
//! task, submit, and fold the per-task summaries into session-level metrics.

use serde::Serialize;
use tracing::{error, info};

use crate::agent::{report_task_failure, Agent, TaskSummary};
use crate::config::AgoraConfig;
use crate::llm::DecisionModel;
use crate::platform::{PlatformApi, StartSessionRequest};
use crate::InternalResult;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub tasks: usize,
    pub steps: usize,
    pub json_valid_first_try_rate: f64,
    pub retry_rate: f64,
    pub repair_rate: f64,
    pub tool_fallback_rate: f64,
    pub schema_fallback_rate: f64,
    pub avg_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub prompt_tokens_total: u64,
    pub completion_tokens_total: u64,
}

impl SessionMetrics {
    /// Step-weighted aggregation of task summaries; latency percentiles are
    /// taken over per-task averages.
    pub fn aggregate(summaries: &[TaskSummary]) -> Self {
        let mut metrics = SessionMetrics {
            tasks: summaries.len(),
            ..Default::default()
        };
        if summaries.is_empty() {
            return metrics;
        }

        let weighted = |select: fn(&TaskSummary) -> f64| -> f64 {
            summaries
                .iter()
                .map(|s| select(s) * s.steps as f64)
                .sum::<f64>()
        };
        let steps_total: usize = summaries.iter().map(|s| s.steps).sum();
        metrics.steps = steps_total;
        metrics.prompt_tokens_total = summaries.iter().map(|s| s.prompt_tokens_total).sum();
        metrics.completion_tokens_total =
            summaries.iter().map(|s| s.completion_tokens_total).sum();

        if steps_total > 0 {
            let total = steps_total as f64;
            metrics.json_valid_first_try_rate = weighted(|s| s.json_valid_first_try_rate) / total;
            metrics.retry_rate = weighted(|s| s.retry_rate) / total;
            metrics.repair_rate = weighted(|s| s.repair_rate) / total;
            metrics.tool_fallback_rate = weighted(|s| s.tool_fallback_rate) / total;
            metrics.schema_fallback_rate = weighted(|s| s.schema_fallback_rate) / total;
        }

        let mut latencies: Vec<u64> = summaries.iter().map(|s| s.avg_latency_ms).collect();
        latencies.sort_unstable();
        metrics.avg_latency_ms = latencies.iter().sum::<u64>() / latencies.len() as u64;
        let p95_index = if latencies.len() > 1 {
            ((latencies.len() - 1) as f64 * 0.95) as usize
        } else {
            0
        };
        metrics.p95_latency_ms = latencies[p95_index];

        metrics
    }
}

pub struct SessionRunner<'a> {
    llm: &'a dyn DecisionModel,
    platform: &'a dyn PlatformApi,
    config: &'a AgoraConfig,
}

impl<'a> SessionRunner<'a> {
    pub fn new(
        llm: &'a dyn DecisionModel,
        platform: &'a dyn PlatformApi,
        config: &'a AgoraConfig,
    ) -> Self {
        Self {
            llm,
            platform,
            config,
        }
    }

    pub async fn run(&self) -> InternalResult<SessionMetrics> {
        let session_config = &self.config.session;
        info!(benchmark = %session_config.benchmark, "starting session");
        let session = self
            .platform
            .start_session(&StartSessionRequest {
                benchmark: session_config.benchmark.clone(),
                workspace: session_config.workspace.clone(),
                name: session_config.name.clone(),
                architecture: session_config.architecture.clone(),
                flags: session_config.flags.clone(),
            })
            .await?;
        info!(session_id = %session.session_id, "session started");

        let status = self.platform.session_status(&session.session_id).await?;
        info!(total_tasks = status.tasks.len(), "retrieved tasks");

        let agent = Agent::new(self.llm, self.platform, self.config);
        let mut summaries: Vec<TaskSummary> = Vec::new();

        for task in &status.tasks {
            info!(task_id = %task.task_id, spec_id = %task.spec_id, text = %task.task_text, "=== task ===");

            if let Err(start_error) = self.platform.start_task(&task.task_id).await {
                error!(task_id = %task.task_id, %start_error, "could not start task, skipping");
                continue;
            }

            match agent.run_task(task).await {
                Ok(summary) => summaries.push(summary),
                Err(agent_error) => report_task_failure(task, &agent_error),
            }

            match self.platform.complete_task(&task.task_id).await {
                Ok(outcome) => {
                    if let Some(eval) = outcome.eval {
                        info!(score = eval.score, logs = %eval.logs, "task scored");
                    }
                }
                Err(complete_error) => {
                    error!(task_id = %task.task_id, %complete_error, "could not complete task");
                }
            }
        }

        self.platform.submit_session(&session.session_id).await?;
        info!("session submitted");

        let metrics = SessionMetrics::aggregate(&summaries);
        match serde_json::to_string(&metrics) {
            Ok(rendered) => info!("SESSION_METRICS: {}", rendered),
            Err(e) => error!(%e, "failed to render session metrics"),
        }
        Ok(metrics)
    }
}
