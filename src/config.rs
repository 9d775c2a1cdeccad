//! Receiver configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `CLUBHOUSE_WEBHOOK_`
//! (e.g. `CLUBHOUSE_WEBHOOK_SECRET`, `CLUBHOUSE_WEBHOOK_PORT`).

use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "CLUBHOUSE_WEBHOOK";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration could not be built or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// No webhook secret was configured.
    #[error(
        "no webhook secret configured (set {}_SECRET or `secret` in the config file)",
        ENV_PREFIX
    )]
    MissingSecret,
}

/// Webhook receiver configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// Shared secret configured on the Clubhouse outgoing webhook
    pub secret: Option<String>,
    /// Largest request body accepted, in bytes
    pub max_body_bytes: usize,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            secret: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl WebhookConfig {
    /// Create a new WebhookConfig with the given port
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Set the webhook secret
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set the maximum accepted body size
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Load configuration from an optional TOML file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is given but does not exist, or if any
    /// source fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Values stay strings until deserialized so a secret such as `007` is
    /// kept verbatim.
    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("max_body_bytes", defaults.max_body_bytes as u64)?;

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.display().to_string()));
            }
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(env)
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// The configured secret.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if no secret is set or it is empty.
    pub fn secret(&self) -> Result<&str, ConfigError> {
        self.secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret)
    }

    /// Get the full bind address (ip:port)
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file() -> NamedTempFile {
        tempfile::Builder::new().suffix(".toml").tempfile().unwrap()
    }

    /// Environment source backed by `vars` instead of the process environment.
    fn env(vars: &[(&str, &str)]) -> Environment {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(vars))
    }

    #[test]
    fn test_webhook_config_default() {
        let config = WebhookConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert!(config.secret.is_none());
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn test_webhook_config_builder() {
        let config = WebhookConfig::new(9000)
            .with_bind_address("0.0.0.0")
            .with_secret("the_cake_is_a_lie")
            .with_max_body_bytes(512);

        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.secret().unwrap(), "the_cake_is_a_lie");
        assert_eq!(config.max_body_bytes, 512);
        assert_eq!(config.socket_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_secret_required() {
        assert!(matches!(
            WebhookConfig::default().secret(),
            Err(ConfigError::MissingSecret)
        ));
        assert!(matches!(
            WebhookConfig::default().with_secret("").secret(),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = WebhookConfig::default().with_secret("hunter2");
        let debug = format!("{config:?}");

        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
            bind_address = "0.0.0.0"
            port = 8080
            secret = "from-file"
            "#
        )
        .unwrap();

        let config = WebhookConfig::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.secret().unwrap(), "from-file");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = toml_file();
        writeln!(file, "port = 8080\nsecret = \"from-file\"").unwrap();

        let vars = env(&[
            ("CLUBHOUSE_WEBHOOK_SECRET", "from-env"),
            ("CLUBHOUSE_WEBHOOK_PORT", "9090"),
            ("CLUBHOUSE_WEBHOOK_MAX_BODY_BYTES", "2048"),
            ("UNRELATED_SECRET", "ignored"),
        ]);
        let config = WebhookConfig::load_with_env(Some(file.path()), vars).unwrap();

        assert_eq!(config.secret().unwrap(), "from-env");
        assert_eq!(config.port, 9090);
        assert_eq!(config.max_body_bytes, 2048);
        assert_eq!(config.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_env_secret_is_kept_verbatim() {
        for secret in ["007", "1e3", "TRUE", "12345678901234567890123"] {
            let vars = env(&[("CLUBHOUSE_WEBHOOK_SECRET", secret)]);
            let config = WebhookConfig::load_with_env(None, vars).unwrap();

            assert_eq!(config.secret().unwrap(), secret);
        }
    }

    #[test]
    fn test_env_invalid_port() {
        let vars = env(&[("CLUBHOUSE_WEBHOOK_PORT", "not-a-port")]);
        let result = WebhookConfig::load_with_env(None, vars);

        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = WebhookConfig::load(Some(Path::new("/nonexistent/clubhouse.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = toml_file();
        writeln!(file, "port = \"not a number\"").unwrap();

        let result = WebhookConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
