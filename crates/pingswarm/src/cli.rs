//! Command-line surface of the `pingswarm` binary.
//!
//! The four positionals mirror the classic invocation
//! `pingswarm <server_num> <child_num> <server_ip> <start_port>`; they may be
//! omitted when `--config` supplies the target section. Flags override
//! whatever the config file says.

use clap::{Parser, ValueEnum};
use pingswarm_common::{ConfigError, FailurePolicy, RunConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Json,
    Text,
}

#[derive(Debug, Parser)]
#[command(
    name = "pingswarm",
    version,
    about = "Hold many TCP connections open and ping them in timed rounds"
)]
pub struct Args {
    /// Number of target servers, on consecutive ports starting at START_PORT
    #[arg(required_unless_present = "config")]
    pub server_num: Option<u32>,

    /// Number of independent workers
    #[arg(required_unless_present = "config")]
    pub child_num: Option<usize>,

    /// Target host
    #[arg(required_unless_present = "config")]
    pub server_ip: Option<String>,

    /// First target port
    #[arg(required_unless_present = "config")]
    pub start_port: Option<u16>,

    /// YAML run configuration
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Connections held by each worker
    #[arg(long)]
    pub connections: Option<usize>,

    /// Probe rounds per worker
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Sleep before each round, in seconds
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Pause between successive connects within a worker, in milliseconds
    #[arg(long)]
    pub connect_stagger_ms: Option<u64>,

    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    #[arg(long)]
    pub io_timeout_ms: Option<u64>,

    /// ignore, record or fail-fast
    #[arg(long)]
    pub failure_policy: Option<FailurePolicy>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,

    /// Exit with status 2 if any worker failed
    #[arg(long)]
    pub strict: bool,
}

impl Args {
    /// Layers defaults, the optional config file and the flags, then validates
    /// the merged result once.
    pub fn to_config(&self) -> Result<RunConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::read(path)?,
            None => RunConfig::default(),
        };

        if let Some(n) = self.server_num {
            config.target.server_count = n;
        }
        if let Some(n) = self.child_num {
            config.workers.count = n;
        }
        if let Some(host) = &self.server_ip {
            config.target.host = host.clone();
        }
        if let Some(port) = self.start_port {
            config.target.base_port = port;
        }
        if let Some(n) = self.connections {
            config.workers.connections_per_worker = n;
        }
        if let Some(n) = self.rounds {
            config.workers.rounds = n;
        }
        if let Some(secs) = self.interval_secs {
            config.workers.round_interval_secs = secs;
        }
        if let Some(ms) = self.connect_stagger_ms {
            config.workers.connect_stagger_ms = ms;
        }
        if self.connect_timeout_ms.is_some() {
            config.timeouts.connect_ms = self.connect_timeout_ms;
        }
        if self.io_timeout_ms.is_some() {
            config.timeouts.io_ms = self.io_timeout_ms;
        }
        if let Some(policy) = self.failure_policy {
            config.probe.failure_policy = policy;
        }
        if let Some(port) = self.metrics_port {
            config.metrics.enabled = true;
            config.metrics.port = port;
        }
        if let Some(format) = self.log_format {
            config.logging.json = format == LogFormatArg::Json;
        }

        config.validate()?;
        Ok(config)
    }
}
