use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inference_gateway::state_history::Transition;
use inference_gateway::{lifecycle, routes, AppState, Config, GatewayArgs, GatewayPhase};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = GatewayArgs::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?.with_args(&args);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting inference gateway v{} ({} endpoints configured)",
        config.app_version,
        config.endpoints.len()
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let state = AppState::new(config);
    tracing::info!("Host id {}", state.host_id);
    state.set_phase(GatewayPhase::StartingCoreEndpoints);

    let paths = lifecycle::start_business_servers(&state).await?;
    let app = routes::app(state.clone(), &paths);

    lifecycle::start_support_processes(&state).await;

    if let Err(e) = state.history.record(Transition::Startup) {
        tracing::error!("Failed to persist startup: {}", e);
    }

    tokio::spawn(lifecycle::watch_signals(state.clone()));

    state.set_phase(GatewayPhase::Serving);
    tracing::info!("Gateway serving {} proxied paths: {:?}", paths.len(), paths);

    axum::serve(listener, app)
        .with_graceful_shutdown(state.shutdown.clone().cancelled_owned())
        .await?;

    state.set_phase(GatewayPhase::Terminated);
    tracing::info!("Gateway stopped");

    Ok(())
}
