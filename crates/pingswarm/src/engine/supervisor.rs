use crate::engine::endpoint::{Endpoint, EndpointAllocator};
use crate::engine::pool::{PoolReport, PoolSettings, PoolState, WorkerId, WorkerPool};
use pingswarm_common::RunConfig;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// One report per worker, ordered by worker id. A worker whose task
    /// panicked is counted in `failed` but has no report.
    pub reports: Vec<PoolReport>,
}

impl RunResult {
    pub fn total_probes_ok(&self) -> u64 {
        self.reports.iter().map(|r| r.probes_ok).sum()
    }

    pub fn total_probes_failed(&self) -> u64 {
        self.reports.iter().map(|r| r.probes_failed).sum()
    }

    fn record(&mut self, report: PoolReport) {
        debug_assert!(report.state.is_terminal());
        match report.state {
            PoolState::Completed => self.completed += 1,
            PoolState::Cancelled => self.cancelled += 1,
            _ => self.failed += 1,
        }
        self.reports.push(report);
    }
}

/// Fans the run out into independent worker pools and waits for all of them.
///
/// Pools share nothing but their read-only settings. A failing pool never
/// stops or delays its siblings.
pub struct Supervisor {
    workers: usize,
    allocator: EndpointAllocator,
    settings: Arc<PoolSettings>,
}

impl Supervisor {
    pub fn new(config: &RunConfig) -> Self {
        Self::with_settings(
            config.workers.count,
            EndpointAllocator::from_config(&config.target),
            PoolSettings::from_config(config),
        )
    }

    pub fn with_settings(workers: usize, allocator: EndpointAllocator, settings: PoolSettings) -> Self {
        Self {
            workers,
            allocator,
            settings: Arc::new(settings),
        }
    }

    /// Endpoints in worker order, one per worker.
    pub fn plan(&self) -> Vec<Endpoint> {
        let mut allocator = self.allocator.clone();
        (0..self.workers).map(|_| allocator.next()).collect()
    }

    /// Runs one pool per planned endpoint until every pool is terminal.
    pub async fn run(&self, token: CancellationToken) -> RunResult {
        self.run_endpoints(self.plan(), token).await
    }

    /// Runs one pool per given endpoint. Worker `i` is bound to `endpoints[i]`.
    pub async fn run_endpoints(&self, endpoints: Vec<Endpoint>, token: CancellationToken) -> RunResult {
        let mut tasks = JoinSet::new();

        for (i, endpoint) in endpoints.into_iter().enumerate() {
            let pool = WorkerPool::new(WorkerId(i), endpoint.clone(), Arc::clone(&self.settings));
            info!(worker = %pool.id(), endpoint = %endpoint, "Spawning worker");
            tasks.spawn(pool.run(token.child_token()));
        }

        let mut result = RunResult::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => result.record(report),
                Err(e) => {
                    error!(error = %e, "Worker task aborted");
                    result.failed += 1;
                }
            }
        }
        result.reports.sort_by_key(|r| r.worker);

        info!(
            completed = result.completed,
            failed = result.failed,
            cancelled = result.cancelled,
            "All workers finished"
        );
        result
    }
}
