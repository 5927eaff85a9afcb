use crate::engine::connection::ACTIVE_CONNECTIONS;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::atomic::Ordering;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CONNECTION_GAUGE: IntGauge = IntGauge::new(
        "pingswarm_active_connections",
        "Number of currently open probe connections"
    )
    .expect("metric can be created");
    /// Probes by outcome (`ok`, `failed`, `skipped`)
    pub static ref PROBES: IntCounterVec = IntCounterVec::new(
        Opts::new("pingswarm_probes_total", "Total number of probes by outcome"),
        &["outcome"]
    )
    .expect("metric can be created");
    pub static ref ROUNDS: IntCounter = IntCounter::new(
        "pingswarm_rounds_total",
        "Total number of probe rounds finished across all workers"
    )
    .expect("metric can be created");
    pub static ref CONNECT_FAILURES: IntCounter = IntCounter::new(
        "pingswarm_connect_failures_total",
        "Total number of connections that could not be established"
    )
    .expect("metric can be created");
    /// Workers by terminal state (`completed`, `failed`, `cancelled`)
    pub static ref POOL_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("pingswarm_workers_total", "Total number of workers by terminal state"),
        &["state"]
    )
    .expect("metric can be created");
}

pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(CONNECTION_GAUGE.clone()));
    let _ = REGISTRY.register(Box::new(PROBES.clone()));
    let _ = REGISTRY.register(Box::new(ROUNDS.clone()));
    let _ = REGISTRY.register(Box::new(CONNECT_FAILURES.clone()));
    let _ = REGISTRY.register(Box::new(POOL_OUTCOMES.clone()));
}

fn update_metrics() {
    let count = ACTIVE_CONNECTIONS.load(Ordering::SeqCst) as i64;
    CONNECTION_GAUGE.set(count);
}

/// Renders every registered metric in the Prometheus text format.
pub fn render_metrics() -> Result<String, prometheus::Error> {
    update_metrics();

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
