//! Serve command - the long-running scheduler loop

use clap::Args;
use gatekeep_core::Config;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use super::build_scheduler;

/// Run the review scheduler until interrupted
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Sweep old merged items before starting
    #[arg(long)]
    pub cleanup: bool,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let mut scheduler = build_scheduler(config).await?;

        if self.cleanup {
            let removed = scheduler.cleanup().await?;
            tracing::info!(removed, "Swept merged items");
        }

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.cancel();
        });

        println!(
            "Reviewing every {:?}, up to {} item(s) per cycle. Ctrl+C to stop.",
            config.scheduler.poll_interval, config.scheduler.batch_size
        );

        scheduler.run(cancel).await?;

        let metrics = scheduler.metrics();
        println!(
            "Stopped after {} cycle(s), {} item(s) processed.",
            metrics.cycles, metrics.items_processed
        );
        if verbose {
            println!("{}", serde_json::to_string_pretty(metrics)?);
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current item");
}
