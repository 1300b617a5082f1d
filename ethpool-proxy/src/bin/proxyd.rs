use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use ethpool_proxy::api::{self, AppState};
use ethpool_proxy::config::Config;
use ethpool_proxy::policy::{self, MemoryPolicy};
use ethpool_proxy::proxy::ProxyServer;
use ethpool_proxy::share::ShareLedger;
use ethpool_proxy::stratum;
use ethpool_proxy::template::TemplateCell;
use ethpool_proxy::tracing::{self, prelude::*};
use ethpool_proxy::upstream::{self, RpcClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let path = env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = Config::load_from(&path)
        .with_context(|| format!("loading configuration from {}", path))?;
    info!(config = %path, difficulty = config.proxy.difficulty, "Loaded configuration.");

    let clients = config
        .upstream
        .iter()
        .map(RpcClient::new)
        .collect::<Result<Vec<_>, _>>()
        .context("building upstream clients")?;

    let policy = Arc::new(MemoryPolicy::new(config.policy.clone()));
    let templates = Arc::new(TemplateCell::new());
    let proxy = Arc::new(ProxyServer::new(
        config.proxy.clone(),
        policy.clone(),
        Arc::new(ShareLedger::new()),
        templates.clone(),
    ));

    let running = CancellationToken::new();
    let tracker = TaskTracker::new();

    tracker.spawn(upstream::refresh_loop(
        clients,
        templates.clone(),
        config.proxy.block_refresh_interval(),
        running.clone(),
    ));

    tracker.spawn({
        let running = running.clone();
        async move {
            let mut ticker = tokio::time::interval(policy::RESET_INTERVAL);
            loop {
                tokio::select! {
                    _ = running.cancelled() => break,
                    _ = ticker.tick() => {
                        policy.reset_expired();
                    }
                }
            }
        }
    });

    if config.proxy.stratum.enabled {
        let server = stratum::Server::new(proxy.clone(), config.proxy.stratum.clone());
        let listener = server.bind().await.context("binding stratum listener")?;
        let running = running.clone();
        tracker.spawn(async move {
            if let Err(e) = server.run(listener, running).await {
                error!(error = %e, "Stratum server failed");
            }
        });
    }

    if config.api.enabled {
        let state = AppState::new(proxy.registry().clone(), templates.clone());
        let listen = config.api.listen.clone();
        let running = running.clone();
        tracker.spawn(async move {
            if let Err(e) = api::serve(&listen, state, running).await {
                error!(error = %e, "API server failed");
            }
        });
    }

    tracker.close();
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }

    trace!("Shutting down.");
    running.cancel();

    tracker.wait().await;
    info!("Exiting.");
    Ok(())
}
