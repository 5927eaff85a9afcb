use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete run configuration. Supplied once at startup and never mutated
/// while workers are running.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RunConfig {
    pub target: TargetConfig,
    pub workers: WorkerConfig,
    pub probe: ProbeConfig,
    pub timeouts: TimeoutConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub base_port: u16,
    /// Number of consecutive ports, starting at `base_port`, that workers cycle over.
    pub server_count: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 8888,
            server_count: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub count: usize,
    pub connections_per_worker: usize,
    pub rounds: u32,
    pub round_interval_secs: u64,
    /// Pause between successive connects inside one worker. Zero disables it.
    pub connect_stagger_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 1,
            connections_per_worker: 1000,
            rounds: 30,
            round_interval_secs: 60,
            connect_stagger_ms: 0,
        }
    }
}

impl WorkerConfig {
    pub fn round_interval(&self) -> Duration {
        Duration::from_secs(self.round_interval_secs)
    }

    pub fn connect_stagger(&self) -> Option<Duration> {
        (self.connect_stagger_ms > 0).then(|| Duration::from_millis(self.connect_stagger_ms))
    }
}

/// Largest response a probe may wait for, in either response mode.
pub const MAX_RESPONSE_LEN: usize = 64 * 1024;

/// How the response to a probe is delimited on the wire.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ResponseMode {
    /// Read exactly `len` bytes.
    Fixed { len: usize },
    /// Read up to and including the next `\n`.
    Line,
}

impl Default for ResponseMode {
    fn default() -> Self {
        ResponseMode::Fixed { len: 5 }
    }
}

/// What a worker does when a probe fails mid-round.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Swallow the error and keep the connection in rotation.
    Ignore,
    /// Count the failure, close the connection and skip it in later rounds.
    #[default]
    Record,
    /// Abort the whole worker on the first failure.
    FailFast,
}

impl std::str::FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(FailurePolicy::Ignore),
            "record" => Ok(FailurePolicy::Record),
            "fail-fast" => Ok(FailurePolicy::FailFast),
            other => Err(ConfigError::Invalid(format!(
                "unknown failure policy '{}' (expected ignore, record or fail-fast)",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProbeConfig {
    pub message: String,
    pub response: ResponseMode,
    pub failure_policy: FailurePolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            message: "ping\n".to_string(),
            response: ResponseMode::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Socket timeouts. `None` blocks indefinitely.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: Option<u64>,
    pub io_ms: Option<u64>,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Option<Duration> {
        self.connect_ms.map(Duration::from_millis)
    }

    pub fn io(&self) -> Option<Duration> {
        self.io_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9464,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { json: true }
    }
}

impl RunConfig {
    /// Reads and validates a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a YAML configuration file without validating it, for callers
    /// that layer further overrides on top before calling `validate`.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::parse(&data)
    }

    /// Parses and validates a YAML document. Missing sections take their defaults.
    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML document without validating it.
    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.server_count == 0 {
            return Err(ConfigError::Invalid(
                "target.server_count must be at least 1".into(),
            ));
        }
        let last_port =
            u32::from(self.target.base_port).saturating_add(self.target.server_count - 1);
        if last_port > u32::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "port range {}..={} exceeds 65535",
                self.target.base_port, last_port
            )));
        }
        if self.target.host.is_empty() {
            return Err(ConfigError::Invalid("target.host must not be empty".into()));
        }
        if self.workers.count == 0 {
            return Err(ConfigError::Invalid("workers.count must be at least 1".into()));
        }
        if self.probe.message.is_empty() {
            return Err(ConfigError::Invalid("probe.message must not be empty".into()));
        }
        if let ResponseMode::Fixed { len } = self.probe.response {
            if len == 0 || len > MAX_RESPONSE_LEN {
                return Err(ConfigError::Invalid(format!(
                    "probe.response.len must be between 1 and {}",
                    MAX_RESPONSE_LEN
                )));
            }
        }
        Ok(())
    }
}
