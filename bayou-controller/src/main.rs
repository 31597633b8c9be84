//! The interactive controller (spec.md §6): reads commands from stdin,
//! spawns replica/client-agent child processes next to its own binary,
//! and drives them over the same JSON-over-HTTP RPC surface the
//! processes expose to each other.

use bayou_core::config::{
    client_url, replica_url, DEFAULT_BASE_PORT, DEFAULT_CLIENT_BASE_PORT, DEFAULT_MAX_REPLICAS,
};
use bayou_core::rpc_client::RpcClient;
use bayou_core::wire::{
    ClientOpResponse, Empty, IdRequest, KeyRequest, PrintLogResponse, PutRequest, SretResponse,
};
use clap::Parser;
use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bayou-controller", about = "Interactive Bayou cluster controller")]
struct Cli {
    #[arg(long, env = "BAYOU_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "BAYOU_BASE_PORT", default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    #[arg(long, env = "BAYOU_CLIENT_BASE_PORT", default_value_t = DEFAULT_CLIENT_BASE_PORT)]
    client_base_port: u16,

    #[arg(long, env = "BAYOU_MAX_REPLICAS", default_value_t = DEFAULT_MAX_REPLICAS)]
    max_replicas: u32,

    /// Directory holding the `bayou-server`/`bayou-client` binaries.
    /// Defaults to the controller's own directory, mirroring the
    /// original source's `./srv` and `./cli` sibling-binary layout.
    #[arg(long)]
    bin_dir: Option<PathBuf>,
}

struct Controller {
    host: String,
    base_port: u16,
    client_base_port: u16,
    max_replicas: u32,
    bin_dir: PathBuf,
    rpc: RpcClient,
    server_ids: HashSet<u32>,
    client_ids: HashSet<u32>,
    children: Vec<Child>,
}

impl Controller {
    fn replica_url(&self, id: u32) -> String {
        replica_url(&self.host, self.base_port, id)
    }

    fn client_url(&self, id: u32) -> String {
        client_url(&self.host, self.client_base_port, id)
    }

    fn spawn(&mut self, bin: &str, args: &[String]) {
        let path = self.bin_dir.join(bin);
        match Command::new(&path).args(args).spawn() {
            Ok(child) => self.children.push(child),
            Err(err) => error!(%err, bin, "failed to start process"),
        }
    }

    async fn join_server(&mut self, id: u32) {
        self.server_ids.insert(id);
        self.spawn(
            "bayou-server",
            &[
                id.to_string(),
                "--host".to_string(),
                self.host.clone(),
                "--base-port".to_string(),
                self.base_port.to_string(),
                "--max-replicas".to_string(),
                self.max_replicas.to_string(),
            ],
        );
    }

    async fn retire_server(&mut self, id: u32) {
        self.server_ids.remove(&id);
        let url = self.replica_url(id);
        if let Err(err) = self.rpc.call::<IdRequest, Empty>(&url, "Retire", &IdRequest { id }).await {
            error!(%err, id, "retireServer failed");
        }
    }

    async fn join_client(&mut self, client_id: u32, bound_replica_id: u32) {
        self.client_ids.insert(client_id);
        self.spawn(
            "bayou-client",
            &[
                client_id.to_string(),
                bound_replica_id.to_string(),
                "--host".to_string(),
                self.host.clone(),
                "--base-port".to_string(),
                self.base_port.to_string(),
                "--client-base-port".to_string(),
                self.client_base_port.to_string(),
                "--max-replicas".to_string(),
                self.max_replicas.to_string(),
            ],
        );
    }

    async fn break_connection(&mut self, a: u32, b: u32) {
        self.send_break_or_restore("Break", a, b).await;
        self.send_break_or_restore("Break", b, a).await;
    }

    async fn restore_connection(&mut self, a: u32, b: u32) {
        self.send_break_or_restore("Restore", a, b).await;
        self.send_break_or_restore("Restore", b, a).await;
    }

    /// Sends `method` to whichever process owns id `at` (server or
    /// client agent), telling it to break/restore its link to `peer`.
    async fn send_break_or_restore(&self, method: &str, at: u32, peer: u32) {
        let url = if self.client_ids.contains(&at) {
            self.client_url(at)
        } else {
            self.replica_url(at)
        };
        if let Err(err) = self
            .rpc
            .call::<IdRequest, Empty>(&url, method, &IdRequest { id: peer })
            .await
        {
            error!(%err, at, peer, method, "connection command failed");
        }
    }

    async fn pause_all(&self) {
        for &id in &self.server_ids {
            let url = self.replica_url(id);
            if let Err(err) = self.rpc.call::<Empty, Empty>(&url, "Pause", &Empty {}).await {
                error!(%err, id, "pause failed");
            }
        }
    }

    async fn start_all(&self) {
        for &id in &self.server_ids {
            let url = self.replica_url(id);
            if let Err(err) = self.rpc.call::<Empty, Empty>(&url, "Start", &Empty {}).await {
                error!(%err, id, "start failed");
            }
        }
    }

    async fn stabilize_all(&self) {
        for &id in &self.server_ids {
            let url = self.replica_url(id);
            if let Err(err) = self.rpc.call::<Empty, Empty>(&url, "Stabilize", &Empty {}).await {
                warn!(%err, id, "stabilize did not complete within the timeout");
            }
        }
    }

    async fn print_log(&self, id: u32) {
        let url = self.replica_url(id);
        match self
            .rpc
            .call::<Empty, PrintLogResponse>(&url, "PrintLog", &Empty {})
            .await
        {
            Ok(response) => print!("{}", response.text),
            Err(err) => error!(%err, id, "printLog failed"),
        }
    }

    /// `put <id> <k> <v>`: if `id` names a client agent, forward through
    /// its session (so the session vector is updated); otherwise treat
    /// `id` as a replica id and append the write directly via `Sput`.
    async fn put(&self, id: u32, key: String, value: String) {
        if self.client_ids.contains(&id) {
            let url = self.client_url(id);
            if let Err(err) = self
                .rpc
                .call::<PutRequest, ClientOpResponse>(&url, "Put", &PutRequest { key, value })
                .await
            {
                error!(%err, id, "put via client agent failed");
            }
        } else {
            let url = self.replica_url(id);
            if let Err(err) = self
                .rpc
                .call::<PutRequest, SretResponse>(&url, "Sput", &PutRequest { key, value })
                .await
            {
                error!(%err, id, "put via replica failed");
            }
        }
    }

    async fn get(&self, id: u32, key: String) {
        let result = if self.client_ids.contains(&id) {
            let url = self.client_url(id);
            self.rpc
                .call::<KeyRequest, ClientOpResponse>(&url, "Get", &KeyRequest { key: key.clone() })
                .await
                .map(|r| r.result)
        } else {
            let url = self.replica_url(id);
            self.rpc
                .call::<KeyRequest, SretResponse>(&url, "Sget", &KeyRequest { key: key.clone() })
                .await
                .map(|r| if r.value.is_empty() { "ERR_KEY".to_string() } else { r.value })
        };
        match result {
            Ok(value) => println!("{key}:{value}"),
            Err(err) => error!(%err, id, "get failed"),
        }
    }

    async fn delete(&self, id: u32, key: String) {
        if self.client_ids.contains(&id) {
            let url = self.client_url(id);
            if let Err(err) = self
                .rpc
                .call::<KeyRequest, ClientOpResponse>(&url, "Delete", &KeyRequest { key })
                .await
            {
                error!(%err, id, "delete via client agent failed");
            }
        } else {
            let url = self.replica_url(id);
            if let Err(err) = self
                .rpc
                .call::<KeyRequest, SretResponse>(&url, "Sdelete", &KeyRequest { key })
                .await
            {
                error!(%err, id, "delete via replica failed");
            }
        }
    }
}

fn parse_id(token: Option<&str>) -> Option<u32> {
    token.and_then(|s| s.parse().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let bin_dir = cli.bin_dir.clone().unwrap_or_else(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let mut controller = Controller {
        host: cli.host,
        base_port: cli.base_port,
        client_base_port: cli.client_base_port,
        max_replicas: cli.max_replicas,
        bin_dir,
        rpc: RpcClient::new(),
        server_ids: HashSet::new(),
        client_ids: HashSet::new(),
        children: Vec::new(),
    };

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let cmd: Vec<&str> = line.split(' ').collect();

        match cmd.first().copied() {
            Some("joinServer") => {
                if let Some(id) = parse_id(cmd.get(1).copied()) {
                    controller.join_server(id).await;
                }
            }
            Some("retireServer") => {
                if let Some(id) = parse_id(cmd.get(1).copied()) {
                    controller.retire_server(id).await;
                }
            }
            Some("joinClient") => {
                if let (Some(cid), Some(sid)) =
                    (parse_id(cmd.get(1).copied()), parse_id(cmd.get(2).copied()))
                {
                    controller.join_client(cid, sid).await;
                }
            }
            Some("breakConnection") => {
                if let (Some(a), Some(b)) =
                    (parse_id(cmd.get(1).copied()), parse_id(cmd.get(2).copied()))
                {
                    controller.break_connection(a, b).await;
                }
            }
            Some("restoreConnection") => {
                if let (Some(a), Some(b)) =
                    (parse_id(cmd.get(1).copied()), parse_id(cmd.get(2).copied()))
                {
                    controller.restore_connection(a, b).await;
                }
            }
            Some("pause") => controller.pause_all().await,
            Some("start") => controller.start_all().await,
            Some("stabilize") => controller.stabilize_all().await,
            Some("printLog") => {
                if let Some(id) = parse_id(cmd.get(1).copied()) {
                    controller.print_log(id).await;
                }
            }
            Some("put") => {
                if let (Some(id), Some(k), Some(v)) = (
                    parse_id(cmd.get(1).copied()),
                    cmd.get(2),
                    cmd.get(3),
                ) {
                    controller.put(id, k.to_string(), v.to_string()).await;
                }
            }
            Some("get") => {
                if let (Some(id), Some(k)) = (parse_id(cmd.get(1).copied()), cmd.get(2)) {
                    controller.get(id, k.to_string()).await;
                }
            }
            Some("delete") => {
                if let (Some(id), Some(k)) = (parse_id(cmd.get(1).copied()), cmd.get(2)) {
                    controller.delete(id, k.to_string()).await;
                }
            }
            Some(other) if !other.is_empty() => {
                info!(command = other, "ignoring malformed or unknown command");
            }
            _ => {}
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    for mut child in controller.children {
        let _ = child.kill();
    }

    Ok(())
}
