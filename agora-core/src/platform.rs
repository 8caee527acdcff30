//! # Challenge-Platform Client
//!
//! Session and task lifecycle against the benchmark platform, plus dispatch
//! of store tool calls. The [`PlatformApi`] trait is the seam the agent loop
//! depends on, so tests drive the loop with scripted fakes instead of HTTP.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::PlatformConfig;
use crate::schema::ToolCall;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Clone, Serialize)]
pub struct StartSessionRequest {
    pub benchmark: String,
    pub workspace: String,
    pub name: String,
    pub architecture: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatus {
    #[serde(default)]
    pub tasks: Vec<TaskInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: String,
    pub spec_id: String,
    pub task_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskOutcome {
    #[serde(default)]
    pub eval: Option<TaskEval>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskEval {
    pub score: f64,
    #[serde(default)]
    pub logs: String,
}

/// Per-step LLM telemetry reported back to the platform.
#[derive(Debug, Clone, Serialize)]
pub struct StepLog {
    pub task_id: String,
    pub model: String,
    pub duration_ms: u64,
    pub completion: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub logged_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn start_session(&self, request: &StartSessionRequest) -> PlatformResult<SessionInfo>;

    async fn session_status(&self, session_id: &str) -> PlatformResult<SessionStatus>;

    async fn submit_session(&self, session_id: &str) -> PlatformResult<()>;

    async fn start_task(&self, task_id: &str) -> PlatformResult<()>;

    async fn complete_task(&self, task_id: &str) -> PlatformResult<TaskOutcome>;

    async fn log_step(&self, entry: &StepLog) -> PlatformResult<()>;

    /// Executes a store tool against the task's environment, returning the
    /// tool-specific payload.
    async fn dispatch(&self, task_id: &str, call: &ToolCall) -> PlatformResult<serde_json::Value>;
}

pub struct PlatformClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig, api_key: SecretString) -> PlatformResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn handle<T: DeserializeOwned>(&self, response: reqwest::Response) -> PlatformResult<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn handle_empty(&self, response: reqwest::Response) -> PlatformResult<()> {
        let status = response.status();
        if status.is_success() || status == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn start_session(&self, request: &StartSessionRequest) -> PlatformResult<SessionInfo> {
        let response = self
            .client
            .post(self.url("sessions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await?;
        self.handle(response).await
    }

    async fn session_status(&self, session_id: &str) -> PlatformResult<SessionStatus> {
        let response = self
            .client
            .get(self.url(&format!("sessions/{}", session_id)))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        self.handle(response).await
    }

    async fn submit_session(&self, session_id: &str) -> PlatformResult<()> {
        let response = self
            .client
            .post(self.url(&format!("sessions/{}/submit", session_id)))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        self.handle_empty(response).await
    }

    async fn start_task(&self, task_id: &str) -> PlatformResult<()> {
        let response = self
            .client
            .post(self.url(&format!("tasks/{}/start", task_id)))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        self.handle_empty(response).await
    }

    async fn complete_task(&self, task_id: &str) -> PlatformResult<TaskOutcome> {
        let response = self
            .client
            .post(self.url(&format!("tasks/{}/complete", task_id)))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        self.handle(response).await
    }

    async fn log_step(&self, entry: &StepLog) -> PlatformResult<()> {
        let response = self
            .client
            .post(self.url(&format!("tasks/{}/llm", entry.task_id)))
            .bearer_auth(self.api_key.expose_secret())
            .json(entry)
            .send()
            .await?;
        self.handle_empty(response).await
    }

    async fn dispatch(&self, task_id: &str, call: &ToolCall) -> PlatformResult<serde_json::Value> {
        debug!(tool = call.name(), task_id, "dispatching store tool");
        let response = self
            .client
            .post(self.url(&format!("tasks/{}/tools", task_id)))
            .bearer_auth(self.api_key.expose_secret())
            .json(call)
            .send()
            .await?;
        self.handle(response).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::PlatformConfig;

    #[test]
    fn test_url_building_strips_trailing_slash() {
        let mut config = PlatformConfig::default();
        config.base_url = "https://example.test/api/v1/".to_string();
        let client = PlatformClient::new(&config, SecretString::from("key")).unwrap();
        assert_eq!(
            client.url("sessions/abc"),
            "https://example.test/api/v1/sessions/abc"
        );
    }

    #[test]
    fn test_task_models_deserialize() {
        let status: SessionStatus = serde_json::from_str(
            r#"{"tasks": [{"task_id": "t1", "spec_id": "store_v1", "task_text": "Buy milk"}]}"#,
        )
        .unwrap();
        assert_eq!(status.tasks.len(), 1);
        assert_eq!(status.tasks[0].task_id, "t1");

        let outcome: TaskOutcome =
            serde_json::from_str(r#"{"eval": {"score": 0.5, "logs": "ok"}}"#).unwrap();
        assert_eq!(outcome.eval.unwrap().score, 0.5);

        let outcome: TaskOutcome = serde_json::from_str("{}").unwrap();
        assert!(outcome.eval.is_none());
    }
}
