use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::server::{build_router, AppState};
use crate::servicenow::{NowApi, ServiceNowClient};

const SESSION_GC_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Port for the HTTP backend
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,
}

pub async fn cmd_serve(args: ServeArgs, config: AppConfig) -> Result<()> {
    let instance_url = config.instance_url()?;
    let client = ServiceNowClient::new(&instance_url, config.request_timeout())
        .context("failed to build ServiceNow client")?;
    let api: Arc<dyn NowApi> = Arc::new(client);
    let state = AppState::from_config(&config, api)?;
    state.mark_live();

    spawn_cleanup(
        state.clone(),
        Duration::from_secs(config.rate_limits.idle_prune_secs),
    );

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let router = build_router(state.clone());
    state.mark_ready();
    info!(%addr, instance = %instance_url, "snowdash backend listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state))
    .await
    .context("server error")?;
    info!("snowdash backend stopped");
    Ok(())
}

/// Resolves on ctrl-c, after `/readyz` starts answering 503.
async fn shutdown_signal(state: AppState) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c; graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
    state.mark_unready("shutting down");
    info!("shutdown requested; draining connections");
}

/// Drops idle rate-limit buckets and expired sessions in the background.
fn spawn_cleanup(state: AppState, idle: Duration) {
    if idle.is_zero() {
        info!("Rate limiter bucket GC disabled (idle_prune_secs=0)");
    } else {
        info!(idle_secs = idle.as_secs(), "Rate limiter GC enabled");
        let rate_limiter = Arc::clone(&state.rate_limiter);
        tokio::spawn(async move {
            let mut ticker = interval(idle);
            loop {
                ticker.tick().await;
                let removed = rate_limiter.prune_idle(idle);
                if removed > 0 {
                    debug!(removed, "Pruned stale rate limit buckets");
                }
            }
        });
    }

    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        let mut ticker = interval(SESSION_GC_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = sessions.prune_expired().await;
            if removed > 0 {
                debug!(removed, "Pruned expired sessions");
            }
        }
    });
}
