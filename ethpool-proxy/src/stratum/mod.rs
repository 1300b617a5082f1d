//! Stratum TCP transport.
//!
//! Accepts miner connections, frames newline-delimited JSON-RPC, and feeds
//! each request to the [`ProxyServer`]. Every connection runs in its own
//! task that owns the [`Session`]; jobs pushed by the dispatcher travel
//! through a bounded channel and are written between replies.
//!
//! Connections are dropped when the client goes quiet for longer than the
//! configured timeout, sends a line over [`MAX_REQUEST_SIZE`] bytes or
//! anything that isn't JSON, or when the dispatcher asks for it (invalid
//! share over budget, blacklisted login).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::StratumConfig;
use crate::error::Result;
use crate::proxy::{ProxyServer, Request, Response};
use crate::session::Session;
use crate::tracing::prelude::*;

/// Longest request line accepted from a miner, in bytes.
pub const MAX_REQUEST_SIZE: usize = 1024;

/// Jobs that may queue up for one connection before pushes start failing.
const JOB_QUEUE_DEPTH: usize = 8;

/// Stratum listener.
pub struct Server {
    proxy: Arc<ProxyServer>,
    config: StratumConfig,
    connections: Arc<AtomicUsize>,
}

impl Server {
    pub fn new(proxy: Arc<ProxyServer>, config: StratumConfig) -> Self {
        Self {
            proxy,
            config,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        info!(addr = %listener.local_addr()?, "Stratum listening");
        Ok(listener)
    }

    /// Number of open connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Accept connections until cancelled, then wait for open connections to
    /// finish.
    pub async fn run(self, listener: TcpListener, running: CancellationToken) -> Result<()> {
        let tracker = TaskTracker::new();
        loop {
            let (stream, addr) = tokio::select! {
                _ = running.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        continue;
                    }
                },
            };
            if !self.admit(&addr) {
                continue;
            }

            let proxy = self.proxy.clone();
            let connections = self.connections.clone();
            let timeout = self.config.timeout();
            let running = running.clone();
            connections.fetch_add(1, Ordering::Relaxed);
            tracker.spawn(async move {
                let ip = addr.ip().to_string();
                if let Err(e) = handle_connection(&proxy, stream, ip, timeout, running).await {
                    debug!(%addr, error = %e, "Connection error");
                }
                connections.fetch_sub(1, Ordering::Relaxed);
            });
        }
        tracker.close();
        tracker.wait().await;
        Ok(())
    }

    fn admit(&self, addr: &SocketAddr) -> bool {
        let ip = addr.ip().to_string();
        let policy = self.proxy.policy();
        if policy.is_banned(&ip) {
            debug!(ip = %ip, "Rejecting banned IP");
            return false;
        }
        if self.connections() >= self.config.max_connections {
            warn!(ip = %ip, max = self.config.max_connections, "Too many connections");
            return false;
        }
        // Spends a token, so it runs last.
        if !policy.apply_limit_policy(&ip) {
            warn!(ip = %ip, "Rejecting IP over connection limit");
            return false;
        }
        true
    }
}

/// Serve one miner connection until it closes.
pub async fn handle_connection(
    proxy: &ProxyServer,
    stream: TcpStream,
    ip: String,
    timeout: Duration,
    running: CancellationToken,
) -> Result<()> {
    let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_REQUEST_SIZE));
    let (mut sink, mut lines) = framed.split();
    let (job_tx, mut job_rx) = mpsc::channel(JOB_QUEUE_DEPTH);
    let mut session = Session::new(ip, job_tx);
    trace!(session = %session.id(), ip = session.ip(), "Connection opened");

    let result = async {
        loop {
            tokio::select! {
                _ = running.cancelled() => break,
                Some(job) = job_rx.recv() => {
                    let push = Response::push(json!(job));
                    sink.send(serde_json::to_string(&push)?).await?;
                }
                line = tokio::time::timeout(timeout, lines.next()) => {
                    let line = match line {
                        Err(_) => {
                            debug!(ip = session.ip(), "Connection timed out");
                            break;
                        }
                        Ok(None) => break,
                        Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
                            proxy.policy().apply_malformed_policy(session.ip());
                            warn!(ip = session.ip(), "Request too large");
                            break;
                        }
                        Ok(Some(Err(e))) => return Err(e.into()),
                        Ok(Some(Ok(line))) => line,
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let request: Request = match serde_json::from_str(&line) {
                        Ok(request) => request,
                        Err(e) => {
                            proxy.policy().apply_malformed_policy(session.ip());
                            error!(ip = session.ip(), error = %e, "Malformed stratum request");
                            break;
                        }
                    };
                    let reply = proxy.dispatch(&mut session, &request);
                    sink.send(serde_json::to_string(&reply.response)?).await?;
                    if reply.close {
                        break;
                    }
                }
            }
        }
        Ok::<(), crate::error::Error>(())
    }
    .await;

    proxy.disconnect(&session);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitsConfig, PolicyConfig, ProxyConfig};
    use crate::policy::{MemoryPolicy, Policy};
    use crate::share::ShareLedger;
    use crate::template::TemplateCell;

    fn server(max_connections: usize) -> (Server, Arc<MemoryPolicy>) {
        let policy = Arc::new(MemoryPolicy::new(PolicyConfig {
            limits: LimitsConfig {
                enabled: true,
                limit: 2,
                grace_secs: 0,
                limit_jump: 1,
            },
            ..Default::default()
        }));
        let proxy = ProxyServer::new(
            ProxyConfig::default(),
            policy.clone(),
            Arc::new(ShareLedger::new()),
            Arc::new(TemplateCell::new()),
        );
        let config = StratumConfig {
            max_connections,
            ..StratumConfig::default()
        };
        (Server::new(Arc::new(proxy), config), policy)
    }

    fn addr() -> SocketAddr {
        "192.0.2.10:40000".parse().unwrap()
    }

    #[test]
    fn test_full_server_does_not_spend_tokens() {
        let (server, policy) = server(0);
        for _ in 0..3 {
            assert!(!server.admit(&addr()));
        }
        assert!(policy.apply_limit_policy("192.0.2.10"));
    }

    #[test]
    fn test_admit_spends_tokens_until_limit() {
        let (server, _policy) = server(8);
        assert!(server.admit(&addr()));
        assert!(server.admit(&addr()));
        assert!(!server.admit(&addr()));
    }

    #[test]
    fn test_banned_ip_is_not_admitted() {
        let (server, policy) = server(8);
        for _ in 0..6 {
            policy.apply_malformed_policy("192.0.2.10");
        }
        assert!(!server.admit(&addr()));
    }
}
