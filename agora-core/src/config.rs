use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::sandbox::ComputeMode;
use crate::{Error, InternalResult};

/// Root configuration (config.json).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgoraConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub platform: PlatformConfig,
}

impl AgoraConfig {
    pub fn from_file(path: impl AsRef<Path>) -> InternalResult<Self> {
        from_file(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_benchmark")]
    pub benchmark: String,

    #[serde(default = "default_workspace")]
    pub workspace: String,

    #[serde(default = "default_session_name")]
    pub name: String,

    #[serde(default = "default_architecture")]
    pub architecture: String,

    #[serde(default = "default_flags")]
    pub flags: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            benchmark: default_benchmark(),
            workspace: default_workspace(),
            name: default_session_name(),
            architecture: default_architecture(),
            flags: default_flags(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Reasoning steps allowed per task before the loop gives up.
    #[serde(default = "default_max_agent_steps")]
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_agent_steps(),
        }
    }
}

/// Limits of the deterministic-compute sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Output ceiling for analytics-mode computations.
    #[serde(default = "default_analytics_max_output_len")]
    pub analytics_max_output_len: usize,

    /// Tighter ceiling for validation-mode proofs.
    #[serde(default = "default_validation_max_output_len")]
    pub validation_max_output_len: usize,

    /// Wall-clock budget for a single evaluation.
    #[serde(default = "default_time_budget", with = "duration_ms")]
    pub time_budget: Duration,

    /// Step budget bounding AST-node evaluations and comprehension turns.
    #[serde(default = "default_max_eval_steps")]
    pub max_eval_steps: u64,

    /// Admit the single top-level binding and assertion forms.
    #[serde(default = "default_true")]
    pub allow_binding: bool,
}

impl SandboxConfig {
    pub fn max_output_len(&self, mode: ComputeMode) -> usize {
        match mode {
            ComputeMode::Analytics => self.analytics_max_output_len,
            ComputeMode::Validation => self.validation_max_output_len,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            analytics_max_output_len: default_analytics_max_output_len(),
            validation_max_output_len: default_validation_max_output_len(),
            time_budget: default_time_budget(),
            max_eval_steps: default_max_eval_steps(),
            allow_binding: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    // Sliding-window request quotas; unset windows are unlimited.
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    #[serde(default)]
    pub requests_per_hour: Option<u32>,

    #[serde(default)]
    pub requests_per_day: Option<u32>,

    /// Minimum delay between consecutive requests.
    #[serde(default, with = "duration_opt_ms")]
    pub request_delay: Option<Duration>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_llm_base_url(),
            temperature: 0.0,
            max_tokens: None,
            requests_per_minute: None,
            requests_per_hour: None,
            requests_per_day: None,
            request_delay: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Secret material (secret.json). Keys never appear in Debug output or logs.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretConfig {
    pub platform_api_key: SecretString,
    pub llm_api_key: SecretString,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            platform_api_key: SecretString::from(""),
            llm_api_key: SecretString::from(""),
        }
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(&path).map_err(|e| {
        Error::Internal(format!(
            "Failed to open config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_benchmark() -> String {
    "store".to_string()
}
fn default_workspace() -> String {
    "my".to_string()
}
fn default_session_name() -> String {
    "agora-store".to_string()
}
fn default_architecture() -> String {
    "Schema-guided reasoning over store tools".to_string()
}
fn default_flags() -> Vec<String> {
    vec!["compete_accuracy".to_string()]
}
fn default_max_agent_steps() -> usize {
    10
}
fn default_analytics_max_output_len() -> usize {
    1024
}
fn default_validation_max_output_len() -> usize {
    256
}
fn default_time_budget() -> Duration {
    Duration::from_millis(200)
}
fn default_max_eval_steps() -> u64 {
    100_000
}
fn default_true() -> bool {
    true
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_platform_base_url() -> String {
    "https://erc.timetoact-group.at/api/v1".to_string()
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub mod duration_opt_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // test serialization/deserialization
    #[test]
    fn test_config_serde_round_trip() {
        let config = AgoraConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AgoraConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(format!("{:?}", config), format!("{:?}", deserialized));
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: AgoraConfig = from_str("{}").unwrap();
        assert_eq!(config.agent.max_steps, 10);
        assert_eq!(config.sandbox.analytics_max_output_len, 1024);
        assert_eq!(config.sandbox.validation_max_output_len, 256);
        assert_eq!(config.sandbox.time_budget, Duration::from_millis(200));
        assert!(config.sandbox.allow_binding);
    }

    #[test]
    fn test_validation_ceiling_is_tighter() {
        let config = SandboxConfig::default();
        assert!(
            config.max_output_len(ComputeMode::Validation)
                < config.max_output_len(ComputeMode::Analytics)
        );
    }

    #[test]
    fn test_secret_config_redacts_debug() {
        let secrets: SecretConfig =
            from_str(r#"{"platform_api_key": "pk-123", "llm_api_key": "sk-456"}"#).unwrap();
        let debug = format!("{:?}", secrets);
        assert!(!debug.contains("pk-123"));
        assert!(!debug.contains("sk-456"));
    }
}
