pub mod cli;
pub mod engine;
pub mod logging;
pub mod metrics;

pub use engine::connection::{ConnectError, ConnectionHandle, Probe, ProbeError, ACTIVE_CONNECTIONS};
pub use engine::endpoint::{Endpoint, EndpointAllocator};
pub use engine::pool::{PoolReport, PoolSettings, PoolState, WorkerId, WorkerPool};
pub use engine::supervisor::{RunResult, Supervisor};
