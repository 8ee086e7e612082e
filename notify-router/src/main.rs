use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use notify_router::config::RouterConfig;
use notify_router::logging::{self, LoggingHandle};
use notify_router::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    let env_file = dotenvy::dotenv().ok();

    let config = RouterConfig::from_env_or_default();
    let logging = logging::init_logging(&config.logging)?;

    config.validate().context("invalid configuration")?;
    info!(
        mock_mode = config.mock_mode,
        window_secs = config.admission.window_secs,
        "notify-router starting"
    );

    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(cancel.clone());
    if let Some(env_file) = env_file {
        tokio::spawn(reload_filter_on_hangup(logging.clone(), env_file, cancel.clone()));
    }
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let container = ServiceContainer::new(config, cancel.clone())
        .await
        .context("failed to initialize stores")?;

    if let Err(e) = container.run().await {
        error!(error = %e, "Pipeline failed");
        return Err(e.into());
    }

    info!(stats = ?container.stats(), "notify-router stopped");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM (Ctrl+C elsewhere).
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = token.cancelled() => return,
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
            },
            _ = token.cancelled() => return,
        }
    }

    token.cancel();
}

/// Re-apply `RUST_LOG` from the dotenv file on every SIGHUP.
#[cfg(unix)]
async fn reload_filter_on_hangup(logging: Arc<LoggingHandle>, env_file: PathBuf, token: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(sighup) => sighup,
        Err(e) => {
            error!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            received = sighup.recv() => {
                if received.is_none() {
                    return;
                }
                info!(path = %env_file.display(), "Received SIGHUP, reloading log filter");
                if let Err(e) = logging.reload_from_env_file(&env_file) {
                    error!(error = %e, "Failed to reload log filter");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn reload_filter_on_hangup(_logging: Arc<LoggingHandle>, _env_file: PathBuf, _token: CancellationToken) {}
