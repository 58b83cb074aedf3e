use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flagstream::registry::OverflowPolicy;
use flagstream::{FlagServer, ServerConfig};

#[derive(Parser)]
#[command(name = "flagstream")]
#[command(about = "Live feature flag streaming server")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "FLAGSTREAM_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Maximum concurrent event streams (0 = unlimited)
    #[arg(long, env = "FLAGSTREAM_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Events buffered per subscription before the overflow policy applies
    #[arg(long, env = "FLAGSTREAM_QUEUE_CAPACITY", default_value_t = 256)]
    queue_capacity: usize,

    /// What to do with a full subscription queue: drop-oldest or close
    #[arg(long, env = "FLAGSTREAM_OVERFLOW_POLICY", default_value = "drop-oldest")]
    overflow_policy: OverflowPolicy,

    /// Seconds one frame write may take before the stream is dropped
    #[arg(long, env = "FLAGSTREAM_WRITE_TIMEOUT_SECS", default_value_t = 10)]
    write_timeout_secs: u64,

    /// Seconds between keep-alive comments on idle streams
    #[arg(long, env = "FLAGSTREAM_KEEP_ALIVE_SECS", default_value_t = 15)]
    keep_alive_secs: u64,

    /// Allowed CORS origins, comma separated (empty = any)
    #[arg(long, env = "FLAGSTREAM_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> flagstream::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flagstream=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = ServerConfig::with_addr(cli.bind)
        .max_connections(cli.max_connections)
        .queue_capacity(cli.queue_capacity)
        .overflow_policy(cli.overflow_policy)
        .write_timeout(Duration::from_secs(cli.write_timeout_secs))
        .keep_alive_interval(Duration::from_secs(cli.keep_alive_secs))
        .cors_origins(cli.cors_origins);

    let server = FlagServer::new(config);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}
