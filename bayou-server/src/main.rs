use bayou_core::config::{DEFAULT_BASE_PORT, DEFAULT_MAX_REPLICAS};
use bayou_core::replica::Replica;
use bayou_core::rpc_client::RpcClient;
use bayou_server::{anti_entropy, join, rpc, state::ServerState};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// A single Bayou replica. Replica id 0 is always the bootstrap primary,
/// matching `original_source/server/main.go`'s `newServer`.
#[derive(Parser, Debug)]
#[command(name = "bayou-server", about = "Bayou replicated key-value store replica")]
struct Cli {
    /// This replica's numeric id. Id 0 bootstraps the cluster as primary.
    replica_id: u32,

    /// Listen host.
    #[arg(long, env = "BAYOU_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Replicas listen on `base_port + replica_id`.
    #[arg(long, env = "BAYOU_BASE_PORT", default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    /// Upper bound on replica ids (version vector length).
    #[arg(long, env = "BAYOU_MAX_REPLICAS", default_value_t = DEFAULT_MAX_REPLICAS)]
    max_replicas: u32,

    /// Bound on how long `Stabilize` will block before giving up.
    #[arg(long, env = "BAYOU_STABILIZE_TIMEOUT_SECS", default_value_t = 30)]
    stabilize_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let replica = if cli.replica_id == 0 {
        Arc::new(Replica::new_bootstrap(cli.max_replicas))
    } else {
        Arc::new(Replica::new(cli.replica_id, cli.max_replicas))
    };

    let state = Arc::new(ServerState {
        replica: replica.clone(),
        rpc: RpcClient::new(),
        host: cli.host.clone(),
        base_port: cli.base_port,
        stabilize_timeout: std::time::Duration::from_secs(cli.stabilize_timeout_secs),
    });

    let port = cli.base_port + cli.replica_id as u16;
    let addr = format!("{}:{}", cli.host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(replica_id = cli.replica_id, %addr, "replica listening");

    // The socket must be live before any peer can be told about this
    // replica (via Sjoin) and come dialing back, or the push-back Sync
    // the anti-entropy loop relies on for convergence can hit a
    // connection refusal instead of queuing in the accept backlog.
    tokio::spawn(anti_entropy::run(state.clone()));
    tokio::spawn(join::join_cluster(state.clone(), cli.max_replicas));

    axum::serve(listener, rpc::router(state)).await?;

    Ok(())
}
