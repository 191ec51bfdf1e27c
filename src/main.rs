// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process entry point: configuration, wiring, startup and shutdown.
//!
//! Startup order matters: the HTTP listener binds before the initial full
//! sync launches so `/health` answers while the first reconciliation is
//! still running. The scheduler and the MQTT subscriber start last.
//! Shutdown is signal-driven: the HTTP server drains, then the background
//! tasks stop; an in-flight reconcile runs to completion.

use anyhow::{Context as _, Result};
use netbox_pdns::config::Config;
use netbox_pdns::context::{AppContext, SyncEngine};
use netbox_pdns::netbox::NetboxClient;
use netbox_pdns::pdns::PdnsClient;
use netbox_pdns::reconciler::ZoneReconciler;
use netbox_pdns::state::AppState;
use netbox_pdns::{api, mqtt, scheduler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Port the webhook/status HTTP server listens on
const HTTP_PORT: u16 = 8000;

/// Number of worker threads for the Tokio runtime
const TOKIO_WORKER_THREADS: usize = 4;

/// Timeout applied to every outbound NetBox/PowerDNS call
const OUTBOUND_CALL_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("netbox-pdns")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with the configured level as the default filter.
///
/// `RUST_LOG` overrides the configured level; `RUST_LOG_FORMAT=json`
/// switches to JSON output.
fn initialize_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.tracing_level()));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .compact()
                .init();
        }
    }
}

/// Run the initial full sync, recording progress in the shared state.
async fn run_initial_sync(ctx: Arc<AppContext>) {
    ctx.state.mark_initial_sync_started();
    info!("starting initial synchronization in background");

    match ctx.engine.sync_all("startup").await {
        Ok(report) => {
            ctx.state.mark_initial_sync_completed();
            info!(
                zones = report.zones,
                created = report.created,
                updated = report.updated,
                pruned = report.pruned,
                failed = report.failed.len(),
                "initial synchronization completed"
            );
        }
        Err(e) => {
            ctx.state.record_initial_sync_error(e.to_string());
            error!(error = %e, "initial synchronization failed");
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}

async fn async_main() -> Result<()> {
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("configuration error: {e}");
            return Err(e.into());
        }
    };

    initialize_logging(&config);
    info!(
        netbox = %config.nb_url,
        powerdns = %config.pdns_url,
        nameserver_id = config.nb_ns_id,
        "starting NetBox PowerDNS connector"
    );

    let schedule =
        scheduler::parse_crontab(&config.sync_crontab).context("invalid sync crontab")?;

    let http_client = reqwest::Client::builder()
        .timeout(OUTBOUND_CALL_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let source = Arc::new(NetboxClient::new(
        http_client.clone(),
        config.nb_url.clone(),
        config.nb_token.clone(),
    ));
    let replica = Arc::new(PdnsClient::new(
        http_client,
        config.pdns_url.clone(),
        config.pdns_token.clone(),
        config.pdns_server_id.clone(),
    ));
    let reconciler = ZoneReconciler::new(
        source,
        replica,
        config.nb_ns_id,
        config.managed_types.clone(),
    );

    let state = Arc::new(AppState::new());
    let ctx = Arc::new(AppContext::new(
        config.clone(),
        state.clone(),
        SyncEngine::new(reconciler),
    ));

    // Bind before launching the initial sync so /health answers immediately
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], HTTP_PORT));
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(%bind_addr, "HTTP server listening");

    let app = api::router(ctx.clone());
    let initial_sync = tokio::spawn(run_initial_sync(ctx.clone()));
    let scheduler_handle = scheduler::spawn(schedule, ctx.clone());
    let mqtt_handles = if config.mqtt.enabled {
        Some(mqtt::spawn(ctx.clone()))
    } else {
        info!("MQTT subscriber disabled");
        None
    };

    // Shutdown order: stop the bus subscriber, stop the scheduler, then let
    // the HTTP server drain in-flight requests
    let shutdown_state = state.clone();
    let shutdown = async move {
        shutdown_signal().await;
        if let Some((event_loop, worker)) = mqtt_handles {
            // Stop taking broker messages; the worker drains queued events
            event_loop.abort();
            let _ = worker.await;
        }
        scheduler_handle.abort();
        shutdown_state.set_scheduler_running(false);
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("HTTP server error")?;

    // An in-flight initial sync runs to completion (or its own timeouts)
    let _ = initial_sync.await;

    info!("graceful shutdown completed");
    Ok(())
}
