//! Service configuration loaded from TOML
//!
//! One file drives the whole process: where to listen, how to reach the
//! classification model, where uploads are staged, which category escalates,
//! and where the personnel roster lives.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub uploads: UploadSection,
    #[serde(default)]
    pub routing: RoutingSection,
    pub roster: RosterSection,
}

/// Listener and identity settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// Service identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Classification model backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierSection {
    /// Adapter name, currently only "http"
    pub provider: String,
    /// Inference endpoint receiving raw image bytes
    pub url: String,
    /// Upper bound for a single classification, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra attempts on 5xx or network failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    /// Environment variable holding a bearer token for the model server
    pub api_key_env: Option<String>,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> usize {
    2
}

/// Upper bound on `classifier.retry_attempts`
pub const MAX_RETRY_ATTEMPTS: usize = 10;

/// Transient upload staging
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadSection {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Image formats the classifier accepts (names as reported by the `image` crate)
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_bytes: default_max_bytes(),
            allowed_formats: default_allowed_formats(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_formats() -> Vec<String> {
    vec!["jpeg".to_string(), "png".to_string()]
}

/// View selection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingSection {
    /// Category routed to the escalation view
    #[serde(default = "default_escalation_category")]
    pub escalation_category: String,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            escalation_category: default_escalation_category(),
        }
    }
}

fn default_escalation_category() -> String {
    "violence".to_string()
}

/// Location of the personnel roster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterSection {
    pub path: PathBuf,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid service ID format: {0}")]
    InvalidServiceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ServiceConfig = toml::from_str(&content)?;

        // Relative roster paths are taken relative to the config file
        if config.roster.path.is_relative() {
            if let Some(parent) = path.parent() {
                config.roster.path = parent.join(&config.roster.path);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_service_id(&self.service.id)?;

        if self.routing.escalation_category.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "routing.escalation_category must not be empty".to_string(),
            ));
        }

        if self.uploads.max_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "uploads.max_bytes must be greater than zero".to_string(),
            ));
        }

        if self.uploads.allowed_formats.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "uploads.allowed_formats must list at least one format".to_string(),
            ));
        }

        if self.classifier.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::InvalidConfig(format!(
                "classifier.retry_attempts must be at most {MAX_RETRY_ATTEMPTS}, got {}",
                self.classifier.retry_attempts
            )));
        }

        match self.classifier.provider.as_str() {
            "http" => {
                url::Url::parse(&self.classifier.url).map_err(|e| {
                    ConfigError::InvalidConfig(format!(
                        "classifier.url '{}' is not a valid URL: {e}",
                        self.classifier.url
                    ))
                })?;
            }
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "Unsupported classifier provider: {other}"
                )));
            }
        }

        Ok(())
    }

    /// Socket address the HTTP server binds to
    pub fn bind_address(&self) -> Result<std::net::SocketAddr, ConfigError> {
        format!("{}:{}", self.service.host, self.service.port)
            .parse()
            .map_err(|e| {
                ConfigError::InvalidConfig(format!(
                    "Invalid listen address {}:{}: {e}",
                    self.service.host, self.service.port
                ))
            })
    }

    /// Bearer token for the model server, if one is configured
    pub fn get_classifier_api_key(&self) -> Result<Option<String>, ConfigError> {
        match &self.classifier.api_key_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[service]
id = "railwatch-test"

[classifier]
provider = "http"
url = "http://localhost:9000/classify"

[roster]
path = "roster.toml"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn validate_service_id(service_id: &str) -> Result<(), ConfigError> {
    let valid_chars = service_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if service_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidServiceId(format!(
            "Service ID '{service_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[service]
id = "railwatch"
host = "127.0.0.1"
port = 9090

[classifier]
provider = "http"
url = "http://model:9000/classify"
timeout_ms = 2500
retry_attempts = 4
api_key_env = "MODEL_TOKEN"

[uploads]
dir = "/tmp/railwatch"
max_bytes = 2048
allowed_formats = ["jpeg", "png", "webp"]

[routing]
escalation_category = "fight"

[roster]
path = "/etc/railwatch/roster.toml"
"#;

        let config: ServiceConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.service.id, "railwatch");
        assert_eq!(config.service.port, 9090);
        assert_eq!(config.classifier.timeout_ms, 2500);
        assert_eq!(config.classifier.retry_attempts, 4);
        assert_eq!(config.uploads.max_bytes, 2048);
        assert_eq!(config.uploads.allowed_formats.len(), 3);
        assert_eq!(config.routing.escalation_category, "fight");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = ServiceConfig::test_config();

        assert_eq!(config.service.host, "0.0.0.0");
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.classifier.timeout_ms, 5000);
        assert_eq!(config.classifier.retry_attempts, 2);
        assert_eq!(config.uploads.dir, PathBuf::from("uploads"));
        assert_eq!(config.uploads.allowed_formats, vec!["jpeg", "png"]);
        assert_eq!(config.routing.escalation_category, "violence");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_service_id() {
        assert!(validate_service_id("rail@watch").is_err());
        assert!(validate_service_id("").is_err());
        assert!(validate_service_id("rail-watch_1.0").is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = ServiceConfig::test_config();
        config.classifier.provider = "onnx".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported classifier provider"));
    }

    #[test]
    fn test_bad_classifier_url_rejected() {
        let mut config = ServiceConfig::test_config();
        config.classifier.url = "not a url".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_blank_escalation_category_rejected() {
        let mut config = ServiceConfig::test_config();
        config.routing.escalation_category = "  ".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_attempts_capped() {
        let mut config = ServiceConfig::test_config();
        config.classifier.retry_attempts = MAX_RETRY_ATTEMPTS;
        assert!(config.validate().is_ok());

        config.classifier.retry_attempts = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(msg)) if msg.contains("retry_attempts")
        ));
    }

    #[test]
    fn test_zero_upload_limit_rejected() {
        let mut config = ServiceConfig::test_config();
        config.uploads.max_bytes = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_address() {
        let mut config = ServiceConfig::test_config();
        config.service.host = "127.0.0.1".to_string();
        config.service.port = 3000;

        let addr = config.bind_address().unwrap();
        assert_eq!(addr.port(), 3000);

        config.service.host = "not-an-ip".to_string();
        assert!(config.bind_address().is_err());
    }

    #[test]
    fn test_missing_api_key_env() {
        let mut config = ServiceConfig::test_config();
        assert_eq!(config.get_classifier_api_key().unwrap(), None);

        config.classifier.api_key_env = Some("RAILWATCH_TEST_UNSET_TOKEN".to_string());
        assert!(matches!(
            config.get_classifier_api_key(),
            Err(ConfigError::EnvVarNotFound(_))
        ));
    }
}
