//! # Reasoning Loop
//!
//! Runs one task: query the model for a structured decision, execute the
//! chosen tool, feed the uniform result envelope back into the conversation,
//! and repeat within a bounded number of steps. The loop is the sole owner of
//! the task's [`ExecutionContext`]; the sandbox only ever sees it by
//! reference for the duration of a single call.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::AgoraConfig;
use crate::llm::{ChatMessage, DecisionModel, QueryMeta, ToolInvocation};
use crate::platform::{PlatformApi, StepLog, TaskInfo};
use crate::sandbox::{ComputeMode, ExecutionContext, FailureKind, Sandbox};
use crate::schema::{CompletionCode, ToolCall, ToolResultEnvelope};
use crate::store::{
    normalize_basket_view, CouponVerifier, PaginationGuard, ProductPage, ProductQuery,
    DEFAULT_MAX_PAGE_LIMIT,
};
use crate::structured::parse_structured;
use crate::{Error, InternalResult};

const SYSTEM_PROMPT: &str = "\
You are a purchasing agent solving tasks on the STORE benchmark.

- Read the task description carefully and follow it EXACTLY.
- Inspect the catalog with list_products before adding anything to the basket.
- Use view_basket to confirm the basket state before checkout.
- Use compute for every precise transformation or calculation (string \
reversal, splitting, totals). Submit exactly ONE expression per call; each \
successful result persists as last_result for the next call.
- When a task requires proving a property (a length, a format), call compute \
with mode \"validation\" and keep the output terse.
- Probe coupons with apply_coupon and keep the best one; remove_coupon undoes \
the active coupon.
- Finish purchases with checkout_basket.
- Once the task is solved, pick report_completion.";

/// Per-task roll-up of the loop's behavior, aggregated into session metrics.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub spec_id: String,
    pub steps: usize,
    pub completed: bool,
    pub prompt_tokens_total: u64,
    pub completion_tokens_total: u64,
    pub json_valid_first_try_rate: f64,
    pub retry_rate: f64,
    pub repair_rate: f64,
    pub tool_fallback_rate: f64,
    pub schema_fallback_rate: f64,
    pub avg_latency_ms: u64,
}

impl TaskSummary {
    fn from_metas(task: &TaskInfo, completed: bool, metas: &[QueryMeta]) -> Self {
        let steps = metas.len();
        let rate = |predicate: fn(&QueryMeta) -> bool| {
            if steps == 0 {
                0.0
            } else {
                metas.iter().filter(|m| predicate(m)).count() as f64 / steps as f64
            }
        };
        let avg_latency_ms = if steps == 0 {
            0
        } else {
            metas.iter().map(|m| m.latency_ms).sum::<u64>() / steps as u64
        };
        Self {
            task_id: task.task_id.clone(),
            spec_id: task.spec_id.clone(),
            steps,
            completed,
            prompt_tokens_total: metas.iter().map(|m| m.prompt_tokens as u64).sum(),
            completion_tokens_total: metas.iter().map(|m| m.completion_tokens as u64).sum(),
            json_valid_first_try_rate: rate(|m| m.json_valid_first_try),
            retry_rate: rate(|m| m.parse_attempts.retry > 0),
            repair_rate: rate(|m| m.parse_attempts.repair > 0),
            tool_fallback_rate: rate(|m| m.parse_attempts.tool_fallback > 0),
            schema_fallback_rate: rate(|m| m.schema_fallback),
            avg_latency_ms,
        }
    }
}

pub struct Agent<'a> {
    llm: &'a dyn DecisionModel,
    platform: &'a dyn PlatformApi,
    config: &'a AgoraConfig,
    sandbox: Sandbox,
}

impl<'a> Agent<'a> {
    pub fn new(
        llm: &'a dyn DecisionModel,
        platform: &'a dyn PlatformApi,
        config: &'a AgoraConfig,
    ) -> Self {
        Self {
            llm,
            platform,
            config,
            sandbox: Sandbox::new(config.sandbox.clone()),
        }
    }

    #[tracing::instrument(
        level = "info",
        skip(self, task),
        fields(task_id = %task.task_id, trace_id = %uuid::Uuid::new_v4())
    )]
    pub async fn run_task(&self, task: &TaskInfo) -> InternalResult<TaskSummary> {
        let mut context = ExecutionContext::new();
        let guard = PaginationGuard::default();
        let mut coupons = CouponVerifier::new();
        let mut metas: Vec<QueryMeta> = Vec::new();
        let mut completed = false;

        let mut messages = vec![
            ChatMessage::System {
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage::User {
                content: format!(
                    "Task ID: {}\nTask Description: {}",
                    task.task_id, task.task_text
                ),
            },
        ];

        info!("starting agent");

        for step in 0..self.config.agent.max_steps {
            info!(step = step + 1, "--- step ---");
            let (decision, meta) = self.llm.decide(&messages).await.map_err(Error::Llm)?;

            let completion_json = serde_json::to_string(&decision)
                .map_err(|e| Error::internal(format!("failed to serialize decision: {}", e)))?;
            if let Err(log_error) = self
                .platform
                .log_step(&StepLog {
                    task_id: task.task_id.clone(),
                    model: self.llm.model_name().to_string(),
                    duration_ms: meta.latency_ms,
                    completion: completion_json,
                    prompt_tokens: meta.prompt_tokens,
                    completion_tokens: meta.completion_tokens,
                    logged_at: chrono::Utc::now(),
                })
                .await
            {
                warn!(%log_error, "failed to report step telemetry");
            }
            metas.push(meta);

            if let ToolCall::ReportCompletion { code, .. } = &decision.function {
                completed = *code == CompletionCode::Completed;
                info!(?code, "agent reported completion");
                break;
            }

            info!(thinking = %decision.current_state);
            info!(action = decision.function.name());

            let call_id = format!("step_{}", step);
            let arguments = serde_json::to_string(&decision.function)
                .map_err(|e| Error::internal(format!("failed to serialize tool call: {}", e)))?;
            let envelope = self
                .dispatch(task, &decision.function, &mut context, &guard, &mut coupons)
                .await;
            if !envelope.ok {
                warn!(tool = envelope.tool.as_str(), error = ?envelope.error, "tool failed");
            } else {
                debug!(tool = envelope.tool.as_str(), "tool succeeded");
            }

            messages.push(ChatMessage::Assistant {
                content: format!("Thought: {}", decision.current_state),
                tool_call: Some(ToolInvocation {
                    call_id: call_id.clone(),
                    name: decision.function.name().to_string(),
                    arguments,
                }),
            });
            messages.push(ChatMessage::ToolResult {
                call_id,
                content: envelope.to_json(),
            });
        }

        info!(completed, "task finished");
        Ok(TaskSummary::from_metas(task, completed, &metas))
    }

    /// Executes one tool call, converting every failure into the uniform
    /// envelope. Nothing escapes as an error: the conversation must continue.
    async fn dispatch(
        &self,
        task: &TaskInfo,
        call: &ToolCall,
        context: &mut ExecutionContext,
        guard: &PaginationGuard,
        coupons: &mut CouponVerifier,
    ) -> ToolResultEnvelope {
        let tool = call.name();
        match call {
            ToolCall::ReportCompletion { .. } => {
                ToolResultEnvelope::failure(tool, "report_completion is handled by the loop")
            }
            ToolCall::Compute {
                code,
                description,
                mode,
                intent,
            } => {
                debug!(description = %description, intent = ?intent, mode = %mode, "running sandboxed compute");
                self.run_compute(code, *mode, context)
            }
            ToolCall::ParseStructured {
                data,
                format,
                delimiter,
                column_names,
                required_fields,
            } => {
                let response = parse_structured(
                    data,
                    *format,
                    delimiter.as_deref(),
                    column_names.as_deref(),
                    required_fields.as_deref(),
                );
                match serde_json::to_value(&response) {
                    Ok(value) => ToolResultEnvelope::success(tool, value),
                    Err(e) => ToolResultEnvelope::failure(tool, e.to_string()),
                }
            }
            ToolCall::ListProducts {
                offset,
                limit,
                query,
            } => {
                let request = ProductQuery {
                    offset: *offset,
                    limit: limit.unwrap_or(DEFAULT_MAX_PAGE_LIMIT),
                    query: query.clone(),
                };
                let platform = self.platform;
                let task_id = task.task_id.as_str();
                let result = guard
                    .paginate(request, |page_request| async move {
                        let call = ToolCall::ListProducts {
                            offset: page_request.offset,
                            limit: Some(page_request.limit),
                            query: page_request.query.clone(),
                        };
                        let payload = platform
                            .dispatch(task_id, &call)
                            .await
                            .map_err(|e| e.to_string())?;
                        serde_json::from_value::<ProductPage>(payload).map_err(|e| e.to_string())
                    })
                    .await;
                match result {
                    Ok(page) => match serde_json::to_value(&page) {
                        Ok(value) => ToolResultEnvelope::success(tool, value),
                        Err(e) => ToolResultEnvelope::failure(tool, e.to_string()),
                    },
                    Err(e) => ToolResultEnvelope::failure(tool, e),
                }
            }
            ToolCall::ViewBasket {} => match self.platform.dispatch(&task.task_id, call).await {
                Ok(payload) => ToolResultEnvelope::success(tool, normalize_basket_view(payload)),
                Err(e) => ToolResultEnvelope::failure(tool, e.to_string()),
            },
            ToolCall::ApplyCoupon { code } => {
                match self.platform.dispatch(&task.task_id, call).await {
                    Ok(payload) => {
                        let basket = normalize_basket_view(payload);
                        let (improved, message) = coupons.evaluate(code, &basket);
                        ToolResultEnvelope::success(
                            tool,
                            serde_json::json!({
                                "basket": basket,
                                "coupon_check": message,
                                "improved": improved,
                            }),
                        )
                    }
                    Err(e) => ToolResultEnvelope::failure(tool, e.to_string()),
                }
            }
            ToolCall::AddProductToBasket { .. }
            | ToolCall::RemoveItemFromBasket { .. }
            | ToolCall::RemoveCoupon {}
            | ToolCall::CheckoutBasket {} => {
                match self.platform.dispatch(&task.task_id, call).await {
                    Ok(payload) => ToolResultEnvelope::success(tool, payload),
                    Err(e) => ToolResultEnvelope::failure(tool, e.to_string()),
                }
            }
        }
    }

    fn run_compute(
        &self,
        code: &str,
        mode: ComputeMode,
        context: &mut ExecutionContext,
    ) -> ToolResultEnvelope {
        let evaluation = self.sandbox.evaluate(code, context, mode);
        match &evaluation {
            crate::sandbox::Evaluation::Success { value } => {
                ToolResultEnvelope::success("compute", serde_json::json!(value))
            }
            crate::sandbox::Evaluation::Failure { kind, message } => {
                let hint = compute_hint(*kind, message);
                let error_text = evaluation
                    .error_text()
                    .unwrap_or_else(|| message.clone());
                ToolResultEnvelope::failure("compute", format!("{} (hint: {})", error_text, hint))
            }
        }
    }
}

/// The corrective hint attached to sandbox failures, specialised for the
/// cold-start `last_result` case.
fn compute_hint(kind: FailureKind, message: &str) -> &'static str {
    if kind == FailureKind::NameError && message.contains("last_result") {
        return "no prior result available yet; run a computation first";
    }
    kind.hint()
}

/// Logs a task-level failure without aborting the surrounding session.
pub fn report_task_failure(task: &TaskInfo, error: &Error) {
    error!(task_id = %task.task_id, %error, "agent failed");
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::llm::{LlmError, LlmResult, ParseAttempts, RecoveredBy};
    use crate::platform::{
        PlatformResult, SessionInfo, SessionStatus, StartSessionRequest, TaskOutcome,
    };
    use crate::schema::NextStep;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn meta() -> QueryMeta {
        QueryMeta {
            model: "test-model".to_string(),
            latency_ms: 10,
            prompt_tokens: 100,
            completion_tokens: 20,
            json_valid_first_try: true,
            recovered_by: RecoveredBy::Initial,
            parse_attempts: ParseAttempts {
                initial: 1,
                ..Default::default()
            },
            json_extracted: false,
            schema_fallback: false,
        }
    }

    fn step(function: ToolCall) -> NextStep {
        NextStep {
            current_state: "working".to_string(),
            plan: vec!["do the thing".to_string()],
            task_completed: false,
            function,
        }
    }

    /// Replays a scripted sequence of decisions.
    struct ScriptedModel {
        script: Mutex<Vec<NextStep>>,
    }

    impl ScriptedModel {
        fn new(mut steps: Vec<NextStep>) -> Self {
            steps.reverse();
            Self {
                script: Mutex::new(steps),
            }
        }
    }

    #[async_trait]
    impl DecisionModel for ScriptedModel {
        async fn decide(&self, _messages: &[ChatMessage]) -> LlmResult<(NextStep, QueryMeta)> {
            let next = self
                .script
                .lock()
                .expect("script lock")
                .pop()
                .ok_or_else(|| LlmError::Parse("script exhausted".to_string()))?;
            Ok((next, meta()))
        }

        fn model_name(&self) -> &str {
            "test-model"
        }
    }

    /// Records dispatches and serves canned store payloads.
    #[derive(Default)]
    struct FakePlatform {
        dispatched: Mutex<Vec<String>>,
        logged_steps: Mutex<usize>,
    }

    #[async_trait]
    impl PlatformApi for FakePlatform {
        async fn start_session(
            &self,
            _request: &StartSessionRequest,
        ) -> PlatformResult<SessionInfo> {
            Ok(SessionInfo {
                session_id: "s1".to_string(),
            })
        }

        async fn session_status(&self, _session_id: &str) -> PlatformResult<SessionStatus> {
            Ok(SessionStatus { tasks: vec![] })
        }

        async fn submit_session(&self, _session_id: &str) -> PlatformResult<()> {
            Ok(())
        }

        async fn start_task(&self, _task_id: &str) -> PlatformResult<()> {
            Ok(())
        }

        async fn complete_task(&self, _task_id: &str) -> PlatformResult<TaskOutcome> {
            Ok(TaskOutcome { eval: None })
        }

        async fn log_step(&self, _entry: &StepLog) -> PlatformResult<()> {
            *self.logged_steps.lock().expect("log lock") += 1;
            Ok(())
        }

        async fn dispatch(
            &self,
            _task_id: &str,
            call: &ToolCall,
        ) -> PlatformResult<serde_json::Value> {
            self.dispatched
                .lock()
                .expect("dispatch lock")
                .push(call.name().to_string());
            match call {
                ToolCall::ViewBasket {} => Ok(serde_json::json!({"items": null, "total": "0"})),
                ToolCall::ListProducts { .. } => Ok(serde_json::json!({
                    "products": [{"id": "p1", "name": "apple"}],
                    "next_offset": -1,
                })),
                _ => Ok(serde_json::json!({"ok": true})),
            }
        }
    }

    fn task() -> TaskInfo {
        TaskInfo {
            task_id: "t1".to_string(),
            spec_id: "store_v1".to_string(),
            task_text: "Return secret backwards".to_string(),
        }
    }

    fn config() -> AgoraConfig {
        AgoraConfig::default()
    }

    #[tokio::test]
    async fn test_compute_then_completion() {
        let model = ScriptedModel::new(vec![
            step(ToolCall::Compute {
                code: "'NcS9euQa'[::-1]".to_string(),
                description: "reverse the secret".to_string(),
                mode: ComputeMode::Analytics,
                intent: None,
            }),
            step(ToolCall::ReportCompletion {
                completed_steps: vec!["reversed".to_string()],
                code: CompletionCode::Completed,
            }),
        ]);
        let platform = FakePlatform::default();
        let config = config();
        let agent = Agent::new(&model, &platform, &config);

        let summary = agent.run_task(&task()).await.unwrap();
        assert_eq!(summary.steps, 2);
        assert!(summary.completed);
        assert_eq!(*platform.logged_steps.lock().unwrap(), 2);
        // Compute runs locally, nothing was dispatched to the platform
        assert!(platform.dispatched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sandbox_failure_feeds_hint_back() {
        let model = ScriptedModel::new(vec![
            step(ToolCall::Compute {
                code: "last_result + '!'".to_string(),
                description: "use previous result".to_string(),
                mode: ComputeMode::Analytics,
                intent: None,
            }),
            step(ToolCall::ReportCompletion {
                completed_steps: vec![],
                code: CompletionCode::Failed,
            }),
        ]);
        let platform = FakePlatform::default();
        let config = config();
        let agent = Agent::new(&model, &platform, &config);

        let summary = agent.run_task(&task()).await.unwrap();
        assert!(!summary.completed);
        assert_eq!(summary.steps, 2);
    }

    #[tokio::test]
    async fn test_store_tools_are_dispatched_and_normalized() {
        let model = ScriptedModel::new(vec![
            step(ToolCall::ListProducts {
                offset: 0,
                limit: None,
                query: None,
            }),
            step(ToolCall::ViewBasket {}),
            step(ToolCall::ReportCompletion {
                completed_steps: vec![],
                code: CompletionCode::Completed,
            }),
        ]);
        let platform = FakePlatform::default();
        let config = config();
        let agent = Agent::new(&model, &platform, &config);

        let summary = agent.run_task(&task()).await.unwrap();
        assert_eq!(summary.steps, 3);
        assert_eq!(
            *platform.dispatched.lock().unwrap(),
            vec!["list_products".to_string(), "view_basket".to_string()]
        );
    }

    #[tokio::test]
    async fn test_loop_stops_at_max_steps() {
        let compute = |i: usize| {
            step(ToolCall::Compute {
                code: format!("{} + 1", i),
                description: "count".to_string(),
                mode: ComputeMode::Analytics,
                intent: None,
            })
        };
        let model = ScriptedModel::new((0..20).map(compute).collect());
        let platform = FakePlatform::default();
        let config = config();
        let agent = Agent::new(&model, &platform, &config);

        let summary = agent.run_task(&task()).await.unwrap();
        assert_eq!(summary.steps, config.agent.max_steps);
        assert!(!summary.completed);
    }

    #[test]
    fn test_compute_hint_special_cases_last_result() {
        assert_eq!(
            compute_hint(FailureKind::NameError, "name 'last_result' is not defined"),
            "no prior result available yet; run a computation first"
        );
        assert_eq!(
            compute_hint(FailureKind::NameError, "name 'x' is not defined"),
            FailureKind::NameError.hint()
        );
    }

    #[test]
    fn test_summary_rates() {
        let mut retry_meta = meta();
        retry_meta.json_valid_first_try = false;
        retry_meta.parse_attempts.retry = 1;
        let metas = vec![meta(), retry_meta];
        let summary = TaskSummary::from_metas(&task(), true, &metas);
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.json_valid_first_try_rate, 0.5);
        assert_eq!(summary.retry_rate, 0.5);
        assert_eq!(summary.prompt_tokens_total, 200);
        assert_eq!(summary.avg_latency_ms, 10);
    }
}
