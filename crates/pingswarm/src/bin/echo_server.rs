use clap::Parser;
use pingswarm::engine::echo;
use pingswarm::logging::{init_logging, LogFormat};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Line-echo target for pingswarm runs.
#[derive(Debug, Parser)]
#[command(name = "pingswarm-echo", version)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    listen: String,

    /// First port to listen on
    #[arg(long, default_value_t = 8888)]
    port: u16,

    /// Listen on this many consecutive ports, one server per port
    #[arg(long, default_value_t = 1)]
    ports: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(LogFormat::Text);

    let token = CancellationToken::new();
    let mut servers = Vec::with_capacity(usize::from(args.ports));

    for offset in 0..args.ports.max(1) {
        let port = args
            .port
            .checked_add(offset)
            .ok_or("port range exceeds 65535")?;
        let listener = TcpListener::bind((args.listen.as_str(), port)).await?;
        let server_token = token.clone();
        servers.push(tokio::spawn(async move {
            if let Err(e) = echo::serve(listener, server_token).await {
                error!(port = port, error = %e, "Echo server failed");
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    token.cancel();

    for server in servers {
        let _ = server.await;
    }
    Ok(())
}
