//! Blockchain facade (SPEC_FULL.md §4.1b): pooled JSON-RPC client per chain
//! plus an optional WebSocket log-subscription client.
//!
//! Grounded in the teacher's `scrapers::chainlink_feed::ChainlinkFeed`, the
//! one place it talks to an EVM RPC directly, generalized here to arbitrary
//! chains/topics rather than one hardcoded Chainlink aggregator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ChainEndpoint;

/// A single Ethereum-style log entry, already hex-decoded where cheap to do
/// so. Adapters map `topics`/`data` into canonical `Bet`s.
#[derive(Debug, Clone)]
pub struct ChainLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
}

/// One chain's pooled JSON-RPC client. `reqwest::Client` internally pools
/// connections, so one `ChainClient` per chain is enough concurrency.
pub struct ChainClient {
    pub name: &'static str,
    http: reqwest::Client,
    rpc_url: String,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl ChainClient {
    pub fn new(name: &'static str, endpoint: &ChainEndpoint, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build chain RPC client")?;
        Ok(ChainClient {
            name,
            http,
            rpc_url: endpoint.rpc_url.clone(),
            request_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{} RPC request {method} failed", self.name))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("{} RPC response for {method} was not JSON", self.name))?;

        if !status.is_success() {
            bail!("{} RPC {method} returned HTTP {status}", self.name);
        }
        if let Some(error) = payload.get("error") {
            bail!("{} RPC {method} error: {error}", self.name);
        }
        payload
            .get("result")
            .cloned()
            .with_context(|| format!("{} RPC {method} response missing 'result'", self.name))
    }

    /// `initialize()`'s chain-id probe (spec.md §4.1 "verify connectivity").
    pub async fn chain_id(&self) -> Result<u64> {
        let result = self.rpc_call("eth_chainId", json!([])).await?;
        parse_hex_u64(&result)
    }

    pub async fn get_block_number(&self) -> Result<u64> {
        let result = self.rpc_call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&result)
    }

    /// `eth_getLogs` over `[from, to]` inclusive, optionally filtered by
    /// topics. Chunking/backoff around wide ranges lives in
    /// `adapters::resilience`, not here.
    pub async fn get_logs(
        &self,
        address: &str,
        from_block: u64,
        to_block: u64,
        topics: &[&str],
    ) -> Result<Vec<ChainLog>> {
        let filter = json!({
            "address": address,
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
            "topics": topics,
        });
        let result = self.rpc_call("eth_getLogs", json!([filter])).await?;
        let entries = result
            .as_array()
            .context("eth_getLogs result was not an array")?;

        let mut logs = Vec::with_capacity(entries.len());
        for entry in entries {
            logs.push(ChainLog {
                address: entry
                    .get("address")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_lowercase(),
                topics: entry
                    .get("topics")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                data: entry
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                block_number: entry
                    .get("blockNumber")
                    .and_then(Value::as_str)
                    .and_then(|s| parse_hex_u64(&json!(s)).ok())
                    .unwrap_or(0),
                transaction_hash: entry
                    .get("transactionHash")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                log_index: entry
                    .get("logIndex")
                    .and_then(Value::as_str)
                    .and_then(|s| parse_hex_u64(&json!(s)).ok())
                    .unwrap_or(0),
            });
        }
        debug!(chain = self.name, from_block, to_block, found = logs.len(), "get_logs chunk");
        Ok(logs)
    }
}

fn parse_hex_u64(value: &Value) -> Result<u64> {
    let s = value.as_str().context("expected hex string result")?;
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(trimmed, 16).with_context(|| format!("invalid hex value '{s}'"))
}

/// Every chain the engine is configured to talk to (spec.md §6 "RPC URLs
/// (BSC mainnet/testnet, Polygon)").
pub struct ChainRegistry {
    clients: std::collections::HashMap<&'static str, ChainClient>,
}

impl ChainRegistry {
    pub fn new(
        chains: &std::collections::HashMap<&'static str, ChainEndpoint>,
        request_timeout: Duration,
    ) -> Result<ChainRegistry> {
        let mut clients = std::collections::HashMap::new();
        for (name, endpoint) in chains {
            clients.insert(*name, ChainClient::new(name, endpoint, request_timeout)?);
        }
        Ok(ChainRegistry { clients })
    }

    pub fn get(&self, chain: &str) -> Option<&ChainClient> {
        self.clients.get(chain)
    }

    /// Probe every configured chain at startup; a chain that fails to
    /// respond is logged and skipped, never a hard boot failure (adapters
    /// will surface `Unavailable` per-request instead).
    pub async fn probe_all(&self) {
        for (name, client) in &self.clients {
            match client.chain_id().await {
                Ok(id) => debug!(chain = %name, chain_id = id, "chain RPC reachable"),
                Err(err) => warn!(chain = %name, error = %err, "chain RPC unreachable at startup"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_block_number() {
        assert_eq!(parse_hex_u64(&json!("0x2a")).unwrap(), 42);
        assert_eq!(parse_hex_u64(&json!("0x0")).unwrap(), 0);
    }
}
