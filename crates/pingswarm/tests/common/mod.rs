#![allow(dead_code)]

use pingswarm::engine::echo;
use pingswarm::engine::pool::PoolSettings;
use pingswarm::{Endpoint, Probe};
use pingswarm_common::FailurePolicy;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Starts a line-echo server on an ephemeral loopback port.
pub async fn spawn_echo() -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    let server_token = token.clone();
    tokio::spawn(async move {
        let _ = echo::serve(listener, server_token).await;
    });
    (addr, token)
}

/// A loopback endpoint nothing is listening on.
pub async fn refused_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port)
}

pub fn endpoint_of(addr: SocketAddr) -> Endpoint {
    Endpoint::new(addr.ip().to_string(), addr.port())
}

pub fn settings(connections: usize, rounds: u32, interval: Duration) -> PoolSettings {
    PoolSettings {
        connections,
        rounds,
        round_interval: interval,
        connect_stagger: None,
        socket: Default::default(),
        probe: Probe::default(),
        failure_policy: FailurePolicy::Record,
    }
}
