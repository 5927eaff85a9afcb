//! Worker pools: a fixed batch of connections to one endpoint driven through
//! a fixed number of timed probe rounds.
//!
//! A pool moves through `Initializing -> Running -> Completed`, or ends in
//! `Failed` (connect failure, or a probe failure under `fail-fast`) or
//! `Cancelled`. Every handle it opened is closed before `run` returns, on all
//! of those paths.
//!
//! Work inside a pool is strictly sequential: connects happen one after the
//! other, rounds never overlap, and the probes of a round follow the order in
//! which the connections were opened.

use crate::engine::connection::{ConnectError, ConnectionHandle, Probe, ProbeError, SocketOptions};
use crate::engine::endpoint::Endpoint;
use crate::metrics;
use pingswarm_common::{FailurePolicy, RunConfig};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Opaque worker identity, used only in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PoolState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PoolState::Completed | PoolState::Failed | PoolState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoolState::Initializing => "initializing",
            PoolState::Running => "running",
            PoolState::Completed => "completed",
            PoolState::Failed => "failed",
            PoolState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("probe on connection #{slot} failed: {source}")]
    Probe {
        slot: usize,
        #[source]
        source: ProbeError,
    },
    #[error("cancelled")]
    Cancelled,
}

/// Parameters shared by every pool of a run.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub connections: usize,
    pub rounds: u32,
    pub round_interval: Duration,
    pub connect_stagger: Option<Duration>,
    pub socket: SocketOptions,
    pub probe: Probe,
    pub failure_policy: FailurePolicy,
}

impl PoolSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            connections: config.workers.connections_per_worker,
            rounds: config.workers.rounds,
            round_interval: config.workers.round_interval(),
            connect_stagger: config.workers.connect_stagger(),
            socket: SocketOptions::from(&config.timeouts),
            probe: Probe::from_config(&config.probe),
            failure_policy: config.probe.failure_policy,
        }
    }
}

/// Outcome of one pool, returned once it reaches a terminal state.
#[derive(Debug, Clone)]
pub struct PoolReport {
    pub worker: WorkerId,
    pub endpoint: Endpoint,
    pub state: PoolState,
    pub connections_opened: usize,
    pub rounds_run: u32,
    pub probes_ok: u64,
    pub probes_failed: u64,
    /// Probes not attempted because their connection had already failed.
    pub probes_skipped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error: Option<String>,
}

pub struct WorkerPool {
    id: WorkerId,
    endpoint: Endpoint,
    settings: Arc<PoolSettings>,
    state: PoolState,
    // `None` marks a slot whose connection failed under `FailurePolicy::Record`.
    slots: Vec<Option<ConnectionHandle>>,
    rounds_run: u32,
    probes_ok: u64,
    probes_failed: u64,
    probes_skipped: u64,
    bytes_sent: u64,
    bytes_received: u64,
}

impl WorkerPool {
    pub fn new(id: WorkerId, endpoint: Endpoint, settings: Arc<PoolSettings>) -> Self {
        let capacity = settings.connections;
        Self {
            id,
            endpoint,
            settings,
            state: PoolState::Initializing,
            slots: Vec::with_capacity(capacity),
            rounds_run: 0,
            probes_ok: 0,
            probes_failed: 0,
            probes_skipped: 0,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Drives the pool to a terminal state and reports how it went.
    pub async fn run(mut self, token: CancellationToken) -> PoolReport {
        let outcome = self.drive(&token).await;
        self.close_all().await;

        let error = match outcome {
            Ok(()) => {
                self.state = PoolState::Completed;
                info!(worker = %self.id, endpoint = %self.endpoint, rounds = self.rounds_run,
                    probes_ok = self.probes_ok, probes_failed = self.probes_failed, "Worker completed");
                None
            }
            Err(PoolError::Cancelled) => {
                self.state = PoolState::Cancelled;
                info!(worker = %self.id, rounds = self.rounds_run, "Worker cancelled");
                None
            }
            Err(e) => {
                self.state = PoolState::Failed;
                warn!(worker = %self.id, endpoint = %self.endpoint, error = %e, "Worker failed");
                Some(e.to_string())
            }
        };
        metrics::POOL_OUTCOMES
            .with_label_values(&[self.state.as_str()])
            .inc();

        PoolReport {
            worker: self.id,
            endpoint: self.endpoint,
            state: self.state,
            connections_opened: self.slots.len(),
            rounds_run: self.rounds_run,
            probes_ok: self.probes_ok,
            probes_failed: self.probes_failed,
            probes_skipped: self.probes_skipped,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            error,
        }
    }

    async fn drive(&mut self, token: &CancellationToken) -> Result<(), PoolError> {
        tokio::select! {
            res = self.initialize() => res?,
            _ = token.cancelled() => return Err(PoolError::Cancelled),
        }

        self.state = PoolState::Running;
        let interval = self.settings.round_interval;

        for round in 1..=self.settings.rounds {
            info!(worker = %self.id, round = round, "Worker in round");

            tokio::select! {
                _ = sleep(interval) => {}
                _ = token.cancelled() => return Err(PoolError::Cancelled),
            }
            tokio::select! {
                res = self.probe_pass(round) => res?,
                _ = token.cancelled() => return Err(PoolError::Cancelled),
            }

            self.rounds_run = round;
            metrics::ROUNDS.inc();
        }
        Ok(())
    }

    /// Opens every connection in order. The first failure aborts the pool;
    /// connections opened so far are released by `close_all`.
    async fn initialize(&mut self) -> Result<(), PoolError> {
        let settings = Arc::clone(&self.settings);
        debug!(worker = %self.id, endpoint = %self.endpoint, connections = settings.connections,
            "Opening connections");

        for i in 0..settings.connections {
            if i > 0 {
                if let Some(stagger) = settings.connect_stagger {
                    sleep(stagger).await;
                }
            }
            match ConnectionHandle::open(self.endpoint.clone(), settings.socket).await {
                Ok(handle) => self.slots.push(Some(handle)),
                Err(e) => {
                    metrics::CONNECT_FAILURES.inc();
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Probes every slot once, in slot order.
    async fn probe_pass(&mut self, round: u32) -> Result<(), PoolError> {
        let settings = Arc::clone(&self.settings);
        let probe = &settings.probe;

        for (slot, entry) in self.slots.iter_mut().enumerate() {
            let Some(handle) = entry.as_mut() else {
                self.probes_skipped += 1;
                metrics::PROBES.with_label_values(&["skipped"]).inc();
                continue;
            };

            match handle.probe(probe).await {
                Ok(_) => {
                    self.probes_ok += 1;
                    metrics::PROBES.with_label_values(&["ok"]).inc();
                }
                Err(e) => {
                    self.probes_failed += 1;
                    metrics::PROBES.with_label_values(&["failed"]).inc();

                    match settings.failure_policy {
                        FailurePolicy::Ignore => {
                            debug!(worker = %self.id, round = round, slot = slot, error = %e,
                                "Probe failed, ignoring");
                        }
                        FailurePolicy::Record => {
                            warn!(worker = %self.id, round = round, slot = slot, error = %e,
                                "Probe failed, dropping connection");
                            // Closed in place so a cancelled close still leaves
                            // the handle for `close_all` to account for.
                            handle.close().await;
                            self.bytes_sent += handle.bytes_sent();
                            self.bytes_received += handle.bytes_received();
                            *entry = None;
                        }
                        FailurePolicy::FailFast => {
                            return Err(PoolError::Probe { slot, source: e });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn close_all(&mut self) {
        for handle in self.slots.iter_mut().flatten() {
            handle.close().await;
            self.bytes_sent += handle.bytes_sent();
            self.bytes_received += handle.bytes_received();
        }
    }
}
