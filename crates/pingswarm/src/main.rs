use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use pingswarm::cli::Args;
use pingswarm::logging::{init_logging, LogFormat};
use pingswarm::{metrics, Supervisor};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

async fn metrics_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    match req.uri().path() {
        "/health" => Ok(Response::new(Body::from("OK"))),
        "/metrics" => match metrics::render_metrics() {
            Ok(text) => Ok(Response::new(Body::from(text))),
            Err(e) => {
                let mut failed = Response::new(Body::from(format!("# Error encoding metrics: {}", e)));
                *failed.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                Ok(failed)
            }
        },
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

async fn run_metrics_server(port: u16, token: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(metrics_handler)) });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Could not bind metrics server");
            return;
        }
    };

    info!(port = port, "Metrics server online");

    if let Err(e) = server
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
    {
        error!(error = %e, "Metrics server failed");
    }
}

fn parse_args() -> Args {
    use clap::Parser;

    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Usage errors exit 1; --help and --version exit 0.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = parse_args();
    let config = match args.to_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("pingswarm: {}", e);
            eprintln!("usage: pingswarm <server_num> <child_num> <server_ip> <start_port> [OPTIONS]");
            return ExitCode::from(1);
        }
    };

    init_logging(if config.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    info!(
        target_host = %config.target.host,
        base_port = config.target.base_port,
        servers = config.target.server_count,
        workers = config.workers.count,
        connections_per_worker = config.workers.connections_per_worker,
        rounds = config.workers.rounds,
        interval_secs = config.workers.round_interval_secs,
        "Pingswarm starting"
    );

    let master_token = CancellationToken::new();

    let metrics_token = master_token.clone();
    if config.metrics.enabled {
        metrics::register_metrics();
        let port = config.metrics.port;
        tokio::spawn(async move {
            run_metrics_server(port, metrics_token).await;
        });
    }

    let signal_token = master_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let supervisor = Supervisor::new(&config);
    let result = supervisor.run(master_token.child_token()).await;

    for report in &result.reports {
        debug!(
            worker = %report.worker,
            endpoint = %report.endpoint,
            state = report.state.as_str(),
            rounds = report.rounds_run,
            probes_ok = report.probes_ok,
            probes_failed = report.probes_failed,
            probes_skipped = report.probes_skipped,
            bytes_sent = report.bytes_sent,
            bytes_received = report.bytes_received,
            error = report.error.as_deref().unwrap_or(""),
            "Worker report"
        );
    }
    info!(
        completed = result.completed,
        failed = result.failed,
        cancelled = result.cancelled,
        probes_ok = result.total_probes_ok(),
        probes_failed = result.total_probes_failed(),
        "Run finished"
    );

    master_token.cancel();

    if args.strict && result.failed > 0 {
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
