mod common;

use common::{endpoint_of, refused_endpoint, settings, spawn_echo};
use pingswarm::{Endpoint, EndpointAllocator, PoolState, Supervisor, WorkerId};
use pingswarm_common::RunConfig;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[test]
fn plan_cycles_ports_across_workers() {
    let supervisor = Supervisor::with_settings(
        4,
        EndpointAllocator::new("10.1.1.1", 9000, 2),
        settings(1, 1, Duration::ZERO),
    );
    let ports: Vec<u16> = supervisor.plan().iter().map(|e| e.port).collect();
    assert_eq!(ports, vec![9000, 9001, 9000, 9001]);
}

#[test]
fn plan_is_repeatable() {
    let supervisor = Supervisor::with_settings(
        3,
        EndpointAllocator::new("h", 100, 5),
        settings(1, 1, Duration::ZERO),
    );
    assert_eq!(supervisor.plan(), supervisor.plan());
}

#[tokio::test]
async fn one_failing_worker_does_not_stop_the_others() {
    let (addr, server) = spawn_echo().await;
    let good = endpoint_of(addr);
    let bad = refused_endpoint().await;
    let endpoints: Vec<Endpoint> = (0..5)
        .map(|i| if i == 3 { bad.clone() } else { good.clone() })
        .collect();

    let supervisor = Supervisor::with_settings(
        5,
        EndpointAllocator::new("127.0.0.1", addr.port(), 1),
        settings(2, 2, Duration::from_millis(10)),
    );
    let result = supervisor
        .run_endpoints(endpoints, CancellationToken::new())
        .await;

    assert_eq!(result.completed, 4);
    assert_eq!(result.failed, 1);
    assert_eq!(result.cancelled, 0);
    assert_eq!(result.reports.len(), 5);
    for (i, report) in result.reports.iter().enumerate() {
        assert_eq!(report.worker, WorkerId(i));
        if i == 3 {
            assert_eq!(report.state, PoolState::Failed);
            assert_eq!(report.probes_ok, 0);
        } else {
            assert_eq!(report.state, PoolState::Completed);
            assert_eq!(report.probes_ok, 4);
        }
    }
    assert_eq!(result.total_probes_ok(), 16);
    assert_eq!(result.total_probes_failed(), 0);
    server.cancel();
}

#[tokio::test]
async fn run_from_config_binds_workers_to_planned_endpoints() {
    let (addr, server) = spawn_echo().await;
    let mut config = RunConfig::default();
    config.target.host = "127.0.0.1".to_string();
    config.target.base_port = addr.port();
    config.target.server_count = 1;
    config.workers.count = 3;
    config.workers.connections_per_worker = 2;
    config.workers.rounds = 1;
    config.workers.round_interval_secs = 0;

    let result = Supervisor::new(&config).run(CancellationToken::new()).await;

    assert_eq!(result.completed, 3);
    assert_eq!(result.failed, 0);
    assert!(result
        .reports
        .iter()
        .all(|r| r.endpoint.port == addr.port() && r.probes_ok == 2));
    server.cancel();
}

#[tokio::test]
async fn cancelling_the_run_cancels_every_worker() {
    let (addr, server) = spawn_echo().await;
    let supervisor = Supervisor::with_settings(
        3,
        EndpointAllocator::new("127.0.0.1", addr.port(), 1),
        settings(1, 10, Duration::from_secs(60)),
    );
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let result = supervisor.run(token).await;

    assert_eq!(result.cancelled, 3);
    assert_eq!(result.completed + result.failed, 0);
    server.cancel();
}
