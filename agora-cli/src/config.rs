//! CLI-side credential resolution.
//!
//! Supported sources, in order of precedence:
//! - CLI arguments (by clap)
//! - Environment variables (by clap and dotenv)
//! - Secret file (secret.json)

use std::{io, path::Path};

use agora_core::config::SecretConfig;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Loads secrets from the secret file (when present) and applies CLI/env
/// overrides. Both keys must end up non-empty.
pub fn resolve_secrets(
    secret_path: &Path,
    platform_api_key: Option<String>,
    llm_api_key: Option<String>,
) -> ConfigResult<SecretConfig> {
    let mut secrets = if secret_path.exists() {
        let raw = std::fs::read_to_string(secret_path)?;
        serde_json::from_str::<SecretConfig>(&raw)?
    } else {
        SecretConfig::default()
    };

    if let Some(key) = platform_api_key.filter(|k| !k.is_empty()) {
        secrets.platform_api_key = SecretString::from(key);
    }
    if let Some(key) = llm_api_key.filter(|k| !k.is_empty()) {
        secrets.llm_api_key = SecretString::from(key);
    }

    if secrets.platform_api_key.expose_secret().is_empty() {
        return Err(ConfigError::MissingCredential("platform_api_key"));
    }
    if secrets.llm_api_key.expose_secret().is_empty() {
        return Err(ConfigError::MissingCredential("llm_api_key"));
    }
    Ok(secrets)
}

pub fn partial_show_secret(s: &SecretString) -> String {
    // show last 4 characters
    let chars = s.expose_secret().chars();
    if chars.clone().count() <= 4 {
        "**************************".to_string()
    } else {
        let last_4 = chars.rev().take(4).collect::<String>();
        format!(
            "**********************{}",
            last_4.chars().rev().collect::<String>()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_resolve_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"platform_api_key": "pk-file", "llm_api_key": "sk-file"}}"#
        )
        .unwrap();

        let secrets = resolve_secrets(file.path(), None, None).unwrap();
        assert_eq!(secrets.platform_api_key.expose_secret(), "pk-file");
        assert_eq!(secrets.llm_api_key.expose_secret(), "sk-file");
    }

    #[test]
    fn test_overrides_beat_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"platform_api_key": "pk-file", "llm_api_key": "sk-file"}}"#
        )
        .unwrap();

        let secrets =
            resolve_secrets(file.path(), Some("pk-arg".to_string()), None).unwrap();
        assert_eq!(secrets.platform_api_key.expose_secret(), "pk-arg");
        assert_eq!(secrets.llm_api_key.expose_secret(), "sk-file");
    }

    #[test]
    fn test_missing_credentials_error() {
        let missing = Path::new("does-not-exist.json");
        let result = resolve_secrets(missing, Some("pk".to_string()), None);
        assert!(matches!(
            result,
            Err(ConfigError::MissingCredential("llm_api_key"))
        ));
    }

    #[test]
    fn test_partial_show_secret() {
        let secret = SecretString::from("sk-abcdef1234");
        let shown = partial_show_secret(&secret);
        assert!(shown.ends_with("1234"));
        assert!(!shown.contains("abcdef"));

        let short = SecretString::from("abc");
        assert!(!partial_show_secret(&short).contains("abc"));
    }
}
