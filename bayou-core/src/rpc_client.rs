//! Thin JSON-over-HTTP RPC helper shared by the anti-entropy loop, the
//! retire handoff, the client agent, and the controller. Grounded on the
//! teacher's `reqwest`-free RPC style generalized to the HTTP transport
//! this rewrite uses in place of Go's `net/rpc`.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcClient {
    pub fn new() -> Self {
        RpcClient {
            http: reqwest::Client::new(),
        }
    }

    /// POST `body` as JSON to `base_url/rpc/<method>` and decode the JSON
    /// response. Transport failures (dial/connect/timeout) are the only
    /// case a caller should treat as "peer unreachable this round."
    pub async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        base_url: &str,
        method: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{base_url}/rpc/{method}");
        trace!(%url, method, "dialing peer");
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| Error::Transport {
                url: url.clone(),
                source,
            })?;
        let resp = resp.error_for_status().map_err(|source| Error::Transport {
            url: url.clone(),
            source,
        })?;
        resp.json::<Resp>()
            .await
            .map_err(|source| Error::Malformed { url, source })
    }
}
