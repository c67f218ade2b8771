//! Serve command: wire the gateway together and run the listener

use crate::cli::ServeArgs;
use anyhow::{Context, Result};
use s3vault::http::{serve, ServerSettings};
use s3vault::version::VersionInfo;
use s3vault::build_gateway;
use s3vault_forward::BackendClient;
use s3vault_keys::KeyGateway;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub async fn run(args: ServeArgs) -> Result<()> {
    let config = args.into_config()?;
    let version = VersionInfo::from_build(&config.build);

    info!(
        version = %version.version,
        commit = %version.commit,
        mode = %config.mode,
        listen = %config.server.listen,
        s3_endpoint = %config.backend.endpoint,
        vault = %config.vault.address,
        "starting s3vault"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let backend = Arc::new(
        BackendClient::new(&config.backend).context("failed to initialize S3 backend client")?,
    );
    let keys = KeyGateway::connect(&config.vault, shutdown_rx.clone())
        .await
        .context("failed to initialize Vault client")?;

    let gateway = Arc::new(build_gateway(
        backend.clone(),
        keys.transit.clone(),
        config.mode,
        version.clone(),
    ));

    let listener = TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;

    tokio::spawn(async move {
        let signal = wait_for_shutdown().await;
        info!(signal, "shutting down");
        let _ = shutdown_tx.send(true);
    });

    let settings = ServerSettings::new(&config.server, &version.version);
    serve(listener, gateway, settings, shutdown_rx)
        .await
        .context("server failed")?;

    backend.close();
    if let Some(watcher) = keys.watcher {
        let _ = watcher.await;
    }
    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return "SIGINT";
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl-C"
}
