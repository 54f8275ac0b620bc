mod engine;
mod llm;
mod prompts;
mod server;
mod session;
mod speech;
mod vector;

pub use engine::*;
pub use llm::*;
pub use prompts::*;
pub use server::*;
pub use session::*;
pub use speech::*;
pub use vector::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate structural constraints. Secrets are checked separately by
    /// [`Config::check_secrets`] because they live in the environment, not
    /// in the file.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let error = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message,
        };
        let warn = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message,
        };

        if self.server.port == 0 {
            issues.push(error("server.port", "port must be greater than 0".into()));
        }
        if self.server.host.is_empty() {
            issues.push(error("server.host", "host must not be empty".into()));
        }
        if self.server.request_deadline_secs == 0 {
            issues.push(error(
                "server.request_deadline_secs",
                "request deadline must be greater than 0".into(),
            ));
        }

        for (field, url) in [
            ("llm.base_url", &self.llm.base_url),
            ("vector.base_url", &self.vector.base_url),
        ] {
            if url.is_empty() {
                issues.push(error(field, "base_url must not be empty".into()));
            } else if !url.starts_with("http://") && !url.starts_with("https://") {
                issues.push(error(
                    field,
                    format!("base_url must start with http:// or https:// (got \"{url}\")"),
                ));
            }
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            issues.push(error(
                "llm.temperature",
                format!("temperature must lie in [0, 2] (got {})", self.llm.temperature),
            ));
        }
        if self.llm.max_inflight == 0 {
            issues.push(error(
                "llm.max_inflight",
                "at least one in-flight completion must be allowed".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            issues.push(error("llm.timeout_secs", "timeout must be greater than 0".into()));
        }

        if self.vector.top_k == 0 {
            issues.push(error("vector.top_k", "top_k must be greater than 0".into()));
        }
        if self.vector.top_k > 50 {
            issues.push(warn(
                "vector.top_k",
                format!("top_k of {} is unusually large", self.vector.top_k),
            ));
        }

        if self.engine.min_core_idea_chars == 0 {
            issues.push(warn(
                "engine.min_core_idea_chars",
                "a zero minimum accepts empty seed ideas".into(),
            ));
        }
        if !(0.0..=5.0).contains(&self.engine.depth_threshold) {
            issues.push(error(
                "engine.depth_threshold",
                format!(
                    "depth threshold must lie in [0, 5] (got {})",
                    self.engine.depth_threshold
                ),
            ));
        }

        if self.session.ttl_secs == 0 {
            issues.push(error("session.ttl_secs", "ttl must be greater than 0".into()));
        }
        if self.session.retention_secs < self.session.ttl_secs {
            issues.push(warn(
                "session.retention_secs",
                "retention shorter than the ttl purges sessions while still exportable".into(),
            ));
        }

        issues
    }

    /// Check that the required secrets are present in the environment.
    /// Only presence is reported; values are never echoed.
    pub fn check_secrets(&self) -> Vec<ConfigIssue> {
        self.check_secrets_with(|var| std::env::var(var).ok())
    }

    /// Injectable variant for tests.
    pub fn check_secrets_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut require = |field: &str, var: &str| {
            match lookup(var) {
                Some(v) if !v.is_empty() => {}
                _ => issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: format!("required secret env var {var} is not set"),
                }),
            }
        };

        require("llm.api_key_env", &self.llm.api_key_env);
        require("vector.api_key_env", &self.vector.api_key_env);
        if self.speech.required {
            require("speech.api_key_env", &self.speech.api_key_env);
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_clean() {
        let config = Config::default();
        let errors: Vec<_> = config
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.session.ttl_secs, 86_400);
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.llm.max_inflight, 32);
        assert_eq!(config.vector.top_k, 5);
        assert_eq!(config.engine.hook_retries, 2);
        assert_eq!(config.engine.min_core_idea_chars, 10);
        assert!((config.engine.depth_threshold - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_toml_overrides_one_section() {
        let config: Config = toml::from_str(
            r#"
            [llm]
            temperature = 0.2
            max_retries = 5
            "#,
        )
        .unwrap();
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.llm.max_retries, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn bad_urls_are_rejected() {
        let mut config = Config::default();
        config.llm.base_url = "ftp://nope".into();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "llm.base_url" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn out_of_range_depth_threshold_is_an_error() {
        let mut config = Config::default();
        config.engine.depth_threshold = 7.5;
        assert!(config
            .validate()
            .iter()
            .any(|i| i.field == "engine.depth_threshold"));
    }

    #[test]
    fn missing_secrets_are_reported_without_values() {
        let config = Config::default();
        let issues = config.check_secrets_with(|var| {
            (var == "LOOM_LLM_API_KEY").then(|| "sk-test".to_string())
        });
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "vector.api_key_env");
        assert!(!issues[0].message.contains("sk-test"));
    }

    #[test]
    fn optional_speech_secret_only_required_when_flagged() {
        let mut config = Config::default();
        let all_present = |var: &str| {
            matches!(var, "LOOM_LLM_API_KEY" | "LOOM_VECTOR_API_KEY").then(|| "x".to_string())
        };
        assert!(config.check_secrets_with(all_present).is_empty());

        config.speech.required = true;
        let issues = config.check_secrets_with(all_present);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "speech.api_key_env");
    }
}
