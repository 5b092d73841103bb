mod cli;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use access_policy::FsProjectStore;
use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use ows_proxy::{Gateway, TrustedHeaderAuth};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref listen) = cli.listen {
        cfg.network.listen_addr = listen.clone();
    }
    if let Some(ref renderer) = cli.renderer {
        cfg.renderer.url = renderer.clone();
    }
    if let Some(ref root) = cli.projects_root {
        cfg.projects.root = root.clone();
    }

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let gateway_config = cfg.gateway_config().context("invalid configuration")?;
    let listen_addr: SocketAddr = cfg
        .network
        .listen_addr
        .parse()
        .context("invalid listen address")?;

    info!(
        config_file = %cli.config.display(),
        listen = %listen_addr,
        renderer = %gateway_config.renderer_url,
        projects_root = %cfg.projects.root.display(),
        "ows-gate starting"
    );

    // 4. Start audit logger.
    let (audit, audit_handle) = AuditSink::start(&cfg.logging.audit_log_path)
        .await
        .context("failed to start audit logger")?;

    audit
        .log(AuditEntry::new(
            AuditEventType::ServerStarted,
            AuditSource::new("ows-gate"),
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_file": cli.config.display().to_string(),
                "listen": listen_addr.to_string(),
            }),
        ))
        .await;

    // 5. Build the gateway.
    let store = FsProjectStore::new(&cfg.projects.root);
    if !store.root().is_dir() {
        warn!(
            projects_root = %store.root().display(),
            "projects root does not exist; every project will be reported missing"
        );
    }
    let auth = TrustedHeaderAuth::new(gateway_config.identity_header.clone());
    let gateway = Gateway::new(gateway_config, Arc::new(store), Arc::new(auth), audit.clone())
        .context("failed to initialize gateway")?;

    // 6. Serve until ctrl-c or SIGTERM.
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    let result = gateway.serve(listener, shutdown_signal()).await;

    // 7. Log shutdown and let the audit writer drain.
    info!("ows-gate shutting down");

    audit
        .log(AuditEntry::new(
            AuditEventType::ServerStopped,
            AuditSource::new("ows-gate"),
            serde_json::json!({
                "result": format!("{:?}", result),
            }),
        ))
        .await;
    drop(audit);
    if let Err(err) = audit_handle.await {
        warn!(%err, "audit writer task failed");
    }

    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        info!("received SIGINT (ctrl-c)");
                    }
                    _ = sigterm.recv() => {
                        info!("received SIGTERM");
                    }
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT (ctrl-c)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT (ctrl-c)");
    }
}
