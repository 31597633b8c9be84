use bayou_client::{rpc, session::ClientSession};
use bayou_core::config::{DEFAULT_BASE_PORT, DEFAULT_CLIENT_BASE_PORT, DEFAULT_MAX_REPLICAS};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// A client agent: bound to one replica at a time, tracking a
/// per-key session vector for read-your-writes (spec.md §4.5).
#[derive(Parser, Debug)]
#[command(name = "bayou-client", about = "Bayou client agent")]
struct Cli {
    /// This client's numeric id.
    client_id: u32,

    /// The replica this client agent starts out bound to.
    bound_replica_id: u32,

    /// Host shared by replicas and client agents.
    #[arg(long, env = "BAYOU_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Replicas listen on `base_port + replica_id`.
    #[arg(long, env = "BAYOU_BASE_PORT", default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    /// This client agent listens on `client_base_port + client_id`.
    #[arg(long, env = "BAYOU_CLIENT_BASE_PORT", default_value_t = DEFAULT_CLIENT_BASE_PORT)]
    client_base_port: u16,

    /// Upper bound on replica ids (version vector length).
    #[arg(long, env = "BAYOU_MAX_REPLICAS", default_value_t = DEFAULT_MAX_REPLICAS)]
    max_replicas: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let session = Arc::new(ClientSession::new(
        cli.client_id,
        cli.bound_replica_id,
        cli.max_replicas,
        cli.host.clone(),
        cli.base_port,
    ));

    let port = cli.client_base_port + cli.client_id as u16;
    let addr = format!("{}:{}", cli.host, port);
    info!(client_id = cli.client_id, bound_replica_id = cli.bound_replica_id, %addr, "client agent listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, rpc::router(session)).await?;

    Ok(())
}
