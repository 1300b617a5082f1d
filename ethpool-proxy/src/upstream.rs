//! Fetching work from Ethereum nodes.
//!
//! The refresh loop polls every configured node with `eth_getWork` and
//! `eth_getBlockByNumber("pending")`, keeps a health score per node, and
//! publishes a new [`BlockTemplate`] whenever the first healthy node reports
//! a new header. When every node is sick the template cell is marked sick and
//! miners get "work not ready" until one recovers.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::template::{BlockTemplate, PendingBlock, TemplateCell, TemplateSource};
use crate::tracing::prelude::*;

/// Consecutive failures before a node is considered sick.
pub const SICK_RATE: u32 = 3;

/// Consecutive successes before a sick node is trusted again.
pub const HEALTHY_RATE: u32 = 5;

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcReplyError>,
}

#[derive(Debug, Deserialize)]
struct RpcReplyError {
    code: i64,
    message: String,
}

/// JSON-RPC client for one node.
#[derive(Debug, Clone)]
pub struct RpcClient {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl RpcClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": method,
            "params": params,
        });
        let reply: RpcReply = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = reply.error {
            return Err(Error::Upstream(format!(
                "{} {}: {} ({})",
                self.name, method, err.message, err.code
            )));
        }
        match reply.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// `eth_getWork`: `[header, seed, target]`, optionally followed by the
    /// block number.
    pub async fn get_work(&self) -> Result<Vec<String>> {
        self.call("eth_getWork", json!([]))
            .await?
            .ok_or_else(|| Error::Upstream(format!("{}: empty getWork reply", self.name)))
    }

    /// Summary of the node's pending block.
    pub async fn get_pending_block(&self) -> Result<Option<PendingBlock>> {
        self.call("eth_getBlockByNumber", json!(["pending", false])).await
    }

    /// Fetch everything needed for a template.
    pub async fn fetch_template(&self) -> Result<BlockTemplate> {
        let work = self.get_work().await?;
        let pending = self.get_pending_block().await?;
        template_from_work(work, pending)
    }
}

/// Build a template from a `getWork` reply and the pending block.
pub fn template_from_work(work: Vec<String>, pending: Option<PendingBlock>) -> Result<BlockTemplate> {
    let mut fields = work.into_iter();
    let (Some(header), Some(seed), Some(target)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(Error::Upstream("getWork reply has fewer than 3 fields".into()));
    };
    let height_hex = fields
        .next()
        .or_else(|| pending.as_ref().map(|p| p.number.clone()))
        .unwrap_or_default();
    let height = parse_hex_u64(&height_hex).unwrap_or(0);
    Ok(BlockTemplate {
        header,
        seed,
        target,
        height,
        pending_block: pending,
    })
}

fn parse_hex_u64(value: &str) -> Option<u64> {
    u64::from_str_radix(value.strip_prefix("0x").unwrap_or(value), 16).ok()
}

/// Consecutive success/failure tracking for one node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Health {
    sick: bool,
    failures: u32,
    successes: u32,
}

impl Health {
    pub fn is_sick(&self) -> bool {
        self.sick
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        if self.sick {
            self.successes += 1;
            if self.successes >= HEALTHY_RATE {
                self.sick = false;
                self.successes = 0;
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.successes = 0;
        self.failures += 1;
        if self.failures >= SICK_RATE {
            self.sick = true;
        }
    }
}

struct Upstream {
    client: RpcClient,
    health: Health,
}

/// Poll the nodes until cancelled, publishing templates into `cell`.
pub async fn refresh_loop(
    clients: Vec<RpcClient>,
    cell: Arc<TemplateCell>,
    interval: Duration,
    running: CancellationToken,
) {
    trace!("Task started.");
    let mut upstreams: Vec<Upstream> = clients
        .into_iter()
        .map(|client| Upstream {
            client,
            health: Health::default(),
        })
        .collect();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = running.cancelled() => break,
            _ = ticker.tick() => refresh(&mut upstreams, &cell).await,
        }
    }
    trace!("Task stopped.");
}

async fn refresh(upstreams: &mut [Upstream], cell: &TemplateCell) {
    let mut published = false;
    for upstream in upstreams.iter_mut() {
        let was_sick = upstream.health.is_sick();
        match upstream.client.fetch_template().await {
            Ok(template) => {
                upstream.health.record_success();
                if !upstream.health.is_sick() && !published {
                    publish_if_new(cell, template, upstream.client.name());
                    published = true;
                }
            }
            Err(e) => {
                upstream.health.record_failure();
                warn!(upstream = upstream.client.name(), error = %e, "Failed to fetch work");
            }
        }
        match (was_sick, upstream.health.is_sick()) {
            (false, true) => warn!(upstream = upstream.client.name(), "Upstream is sick"),
            (true, false) => info!(upstream = upstream.client.name(), "Upstream is healthy again"),
            _ => {}
        }
    }
    let all_sick = upstreams.iter().all(|u| u.health.is_sick());
    if all_sick != cell.is_sick() {
        cell.set_sick(all_sick);
    }
}

fn publish_if_new(cell: &TemplateCell, template: BlockTemplate, upstream: &str) {
    let changed = cell
        .current_template()
        .map_or(true, |current| *current != template);
    if !changed {
        return;
    }
    let header_changed = cell
        .current_template()
        .map_or(true, |current| current.header != template.header);
    if header_changed {
        info!(
            height = template.height,
            header = %template.header,
            upstream,
            "New block to mine"
        );
    }
    cell.publish(template);
}
