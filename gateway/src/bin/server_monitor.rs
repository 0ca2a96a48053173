//! Headless support process launched by the gateway for `NO_HOST` endpoints.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inference_gateway::monitor::{self, MonitorConfig};

#[derive(Debug, Parser)]
#[command(name = "server-monitor", version, about = "Reports host metrics to the gateway")]
struct Args {
    /// JSON endpoint configuration written by the gateway.
    #[arg(long, default_value = "{}")]
    config_endpoint: String,

    /// Host id shared by the gateway's children.
    #[arg(long, default_value = "")]
    host_id: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_json(&args.config_endpoint)?;
    tracing::info!("Using --config-endpoint {} (host id '{}')", args.config_endpoint, args.host_id);

    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        stop.cancel();
    });

    monitor::run(config, token).await;
    Ok(())
}
