use chrono::TimeDelta;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Turns kept per session regardless of `context.max_turns`.
pub const MAX_TURNS_PER_SESSION: usize = 10;

/// Upper bound for `query.max_lookback_days`.
pub const LOOKBACK_CEILING_DAYS: u64 = 36_500;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("SIEMQ")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("SIEMQ")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects durations that cannot be represented or exceed their limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.context.validate()?;
        self.query.validate()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("context.session_ttl_secs", default_session_ttl_secs() as i64)?
            .set_default("context.max_sessions", default_max_sessions() as i64)?
            .set_default("context.max_turns", default_max_turns() as i64)?
            .set_default("context.relevance_window", default_relevance_window() as i64)?
            .set_default("context.sweep_interval_secs", default_sweep_interval_secs() as i64)?
            .set_default("query.default_size", default_size() as i64)?
            .set_default("query.max_size", default_max_size() as i64)?
            .set_default("query.default_lookback_hours", default_lookback_hours())?
            .set_default("query.execution_timeout_secs", default_execution_timeout_secs() as i64)?
            .set_default("query.max_question_len", default_max_question_len() as i64)?
            .set_default("query.max_lookback_days", default_max_lookback_days() as i64)?
            .set_default("backend.kind", "memory")?
            .set_default("backend.index", default_index())
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Session context configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Number of recent turns the merger may inherit from
    #[serde(default = "default_relevance_window")]
    pub relevance_window: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
            max_turns: default_max_turns(),
            relevance_window: default_relevance_window(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }

    pub fn with_ttl_secs(mut self, secs: u64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    /// Turns kept per session, within `1..=MAX_TURNS_PER_SESSION`.
    pub fn turn_limit(&self) -> usize {
        self.max_turns.clamp(1, MAX_TURNS_PER_SESSION)
    }

    /// Idle time after which a session expires. Saturates instead of overflowing.
    pub fn session_ttl(&self) -> TimeDelta {
        ttl_delta(self.session_ttl_secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if ttl_delta(self.session_ttl_secs).is_none() {
            return Err(ConfigError::Message(format!(
                "context.session_ttl_secs is out of range: {}",
                self.session_ttl_secs
            )));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn ttl_delta(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

fn default_session_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_max_sessions() -> usize {
    1000
}

fn default_max_turns() -> usize {
    10
}

fn default_relevance_window() -> usize {
    3
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Query translation and execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_size")]
    pub default_size: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_lookback_hours")]
    pub default_lookback_hours: i64,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default = "default_max_question_len")]
    pub max_question_len: usize,
    /// Furthest back any query may reach, "all time" excepted
    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: u64,
}

impl QueryConfig {
    pub fn new() -> Self {
        Self {
            default_size: default_size(),
            max_size: default_max_size(),
            default_lookback_hours: default_lookback_hours(),
            execution_timeout_secs: default_execution_timeout_secs(),
            max_question_len: default_max_question_len(),
            max_lookback_days: default_max_lookback_days(),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.execution_timeout_secs = secs;
        self
    }

    pub fn with_sizes(mut self, default_size: usize, max_size: usize) -> Self {
        self.default_size = default_size;
        self.max_size = max_size;
        self
    }

    pub fn with_max_lookback_days(mut self, days: u64) -> Self {
        self.max_lookback_days = days;
        self
    }

    /// Window used when a question names no time range, never beyond `max_lookback`.
    pub fn default_lookback(&self) -> TimeDelta {
        let max = self.max_lookback();
        TimeDelta::try_hours(self.default_lookback_hours.max(1))
            .map_or(max, |lookback| lookback.min(max))
    }

    pub fn max_lookback(&self) -> TimeDelta {
        let days = self.max_lookback_days.clamp(1, LOOKBACK_CEILING_DAYS) as i64;
        TimeDelta::try_days(days).unwrap_or(TimeDelta::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lookback_days == 0 || self.max_lookback_days > LOOKBACK_CEILING_DAYS {
            return Err(ConfigError::Message(format!(
                "query.max_lookback_days must be between 1 and {}, got {}",
                LOOKBACK_CEILING_DAYS, self.max_lookback_days
            )));
        }
        match TimeDelta::try_hours(self.default_lookback_hours) {
            Some(lookback) if lookback <= self.max_lookback() => Ok(()),
            _ => Err(ConfigError::Message(format!(
                "query.default_lookback_hours exceeds query.max_lookback_days: {}",
                self.default_lookback_hours
            ))),
        }
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_size() -> usize {
    20
}

fn default_max_size() -> usize {
    100
}

fn default_lookback_hours() -> i64 {
    24
}

fn default_execution_timeout_secs() -> u64 {
    30
}

fn default_max_question_len() -> usize {
    1000
}

fn default_max_lookback_days() -> u64 {
    365
}

/// Which search backend answers queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Elasticsearch,
}

/// Search backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// JSON file of events for the in-memory backend
    #[serde(default)]
    pub events_file: Option<String>,
}

impl BackendConfig {
    pub fn elasticsearch(url: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::Elasticsearch,
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            url: None,
            index: default_index(),
            username: None,
            password: None,
            events_file: None,
        }
    }
}

fn default_index() -> String {
    "wazuh-alerts-*".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.context.session_ttl_secs, 1800);
        assert_eq!(config.context.max_sessions, 1000);
        assert_eq!(config.context.max_turns, 10);
        assert_eq!(config.context.relevance_window, 3);
        assert_eq!(config.query.default_size, 20);
        assert_eq!(config.query.max_size, 100);
        assert_eq!(config.query.execution_timeout(), Duration::from_secs(30));
        assert_eq!(config.query.max_lookback(), TimeDelta::days(365));
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.kind, BackendKind::Memory);
    }

    #[test]
    fn test_builders() {
        let context = ContextConfig::new().with_ttl_secs(60).with_max_sessions(5);
        assert_eq!(context.session_ttl(), TimeDelta::seconds(60));
        assert_eq!(context.max_sessions, 5);

        let backend = BackendConfig::elasticsearch("http://localhost:9200")
            .with_credentials("admin".to_string(), "secret".to_string());
        assert_eq!(backend.kind, BackendKind::Elasticsearch);
        assert_eq!(backend.index, "wazuh-alerts-*");
        assert_eq!(backend.username.as_deref(), Some("admin"));
    }

    #[test]
    fn test_load_from_env_uses_defaults() {
        let config = AppConfig::load_from_env("SIEMQ_TEST_UNSET").unwrap();
        assert_eq!(config.query.default_lookback_hours, 24);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.query.max_lookback_days, 365);
    }

    #[test]
    fn test_turn_limit_is_clamped() {
        assert_eq!(ContextConfig::new().with_max_turns(1000).turn_limit(), MAX_TURNS_PER_SESSION);
        assert_eq!(ContextConfig::new().with_max_turns(0).turn_limit(), 1);
        assert_eq!(ContextConfig::new().with_max_turns(4).turn_limit(), 4);
    }

    #[test]
    fn test_oversized_ttl_is_rejected_not_panicking() {
        let context = ContextConfig::new().with_ttl_secs(u64::MAX);
        assert_eq!(context.session_ttl(), TimeDelta::MAX);
        assert!(context.validate().is_err());

        let context = ContextConfig::new().with_ttl_secs(i64::MAX as u64);
        assert!(context.validate().is_err());
    }

    #[test]
    fn test_lookback_limits() {
        let query = QueryConfig {
            default_lookback_hours: i64::MAX,
            ..QueryConfig::new()
        };
        assert_eq!(query.default_lookback(), TimeDelta::days(365));
        assert!(query.validate().is_err());

        let query = QueryConfig::new().with_max_lookback_days(7);
        assert_eq!(query.max_lookback(), TimeDelta::days(7));
        assert_eq!(query.default_lookback(), TimeDelta::hours(24));

        let query = QueryConfig {
            default_lookback_hours: 24 * 30,
            ..QueryConfig::new().with_max_lookback_days(7)
        };
        assert_eq!(query.default_lookback(), TimeDelta::days(7));
        assert!(query.validate().is_err());

        assert!(QueryConfig::new().with_max_lookback_days(0).validate().is_err());
        assert!(QueryConfig::new()
            .with_max_lookback_days(LOOKBACK_CEILING_DAYS + 1)
            .validate()
            .is_err());
    }
}
