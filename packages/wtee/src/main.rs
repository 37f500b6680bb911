use anyhow::Result;
use clap::Parser;

use wtee::Args;

#[cfg(unix)]
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    server::run(args).await
}

#[cfg(not(unix))]
fn main() -> Result<()> {
    let _ = Args::parse();
    anyhow::bail!("wtee needs a unix platform to poll stdin")
}

#[cfg(unix)]
mod server {
    use anyhow::{Context, Result, anyhow};
    use std::sync::Arc;
    use tracing::{debug, error, info, warn};
    use tracing_subscriber::prelude::*;

    use wtee::stdin::StdinSource;
    use wtee::{AppState, Args, BridgeActor, BridgeMetrics, Settings, create_router};

    pub async fn run(args: Args) -> Result<()> {
        // Stdout carries the tee, so logs go to stderr.
        let default_directive = if args.debug {
            "wtee=debug,tower_http=debug"
        } else {
            "wtee=info"
        };
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .init();

        let settings = Settings::resolve(&args)?;
        debug!(?settings, "Config");
        if let Some(encoding) = &args.output_encoding {
            debug!(
                "Output encoding '{}' ignored, input bytes are written unchanged",
                encoding
            );
        }

        let source = StdinSource::new().context("Failed to put stdin in non-blocking mode")?;
        let metrics = Arc::new(BridgeMetrics::new());
        let (bridge, mut bridge_task) = BridgeActor::spawn(
            source,
            std::io::stdout(),
            settings.bridge_config(),
            metrics,
        );

        let settings = Arc::new(settings);
        let app = create_router(AppState {
            bridge,
            settings: settings.clone(),
        });

        let listener =
            tokio::net::TcpListener::bind((settings.bind.host.as_str(), settings.bind.port))
                .await
                .with_context(|| format!("Failed to bind {}", settings.bind))?;
        let addr = listener.local_addr()?;
        info!("Listening on {}", addr);
        info!("Web UI: http://{}{}", addr, settings.relative_root);

        let server = async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        };

        let result = tokio::select! {
            served = server => served.context("Server error"),
            joined = &mut bridge_task => match joined {
                Ok(Ok(())) => Err(anyhow!("bridge stopped unexpectedly")),
                Ok(Err(e)) => {
                    if e.is_broken_pipe() {
                        warn!("Downstream reader closed stdout");
                    } else {
                        error!("Bridge failed: {}", e);
                    }
                    Err(anyhow::Error::new(e).context("Bridge failed"))
                }
                Err(e) => Err(anyhow::Error::new(e).context("Bridge task panicked")),
            },
        };

        // Dropping the actor drops the stdin source, which restores its flags.
        if !bridge_task.is_finished() {
            bridge_task.abort();
            let _ = bridge_task.await;
        }

        info!("Shutdown complete");
        result
    }

    async fn shutdown_signal() {
        use tokio::signal::unix::{SignalKind, signal};

        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        let terminate = async {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        info!("Received shutdown signal, cleaning up...");
    }
}
