use anyhow::{Context, Result};
use fleetcast::api::{create_app, PaymentsAppState, WsAppState};
use fleetcast::auth::{IdentityProvider, StaticTokenProvider};
use fleetcast::broadcast::BroadcastRegistry;
use fleetcast::chat::ChatRelay;
use fleetcast::payment::{PaymentPublisher, RandomDecider};
use fleetcast::tracking::{MotionModel, Route, TickScheduler};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetcast=info".into()),
        )
        .init();

    info!("Fleetcast starting...");

    let config = fleetcast::config::load_from_env().context("Failed to load configuration")?;

    let identity = Arc::new(StaticTokenProvider::from_tokens(&config.auth.tokens));
    if identity.is_empty() {
        warn!("No access tokens configured; all connections will be anonymous");
    }
    info!(
        tokens = identity.len(),
        require_auth = config.auth.require_auth,
        "Identity provider initialized"
    );
    let identity: Arc<dyn IdentityProvider> = identity;

    let registry = Arc::new(BroadcastRegistry::new(
        config.broadcast.connection_queue_capacity,
    ));
    let chat = ChatRelay::new(Arc::clone(&registry));
    let payments = PaymentPublisher::new(
        Arc::clone(&registry),
        Arc::new(RandomDecider::new(config.payment.approval_rate)),
        config.payment.settlement_delay(),
    );

    // Start the vehicle simulation
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let model = MotionModel::new(Route::delivery_loop(), config.tracking.clone());
    let scheduler = TickScheduler::new(
        model,
        Arc::clone(&registry),
        config.tracking.tick_interval(),
    );
    let scheduler_handle = scheduler.spawn(shutdown_rx.clone());

    let ws_state = Arc::new(WsAppState {
        registry: Arc::clone(&registry),
        chat,
        payments: payments.clone(),
        identity: Arc::clone(&identity),
        require_auth: config.auth.require_auth,
    });
    let payments_state = PaymentsAppState { payments, identity };
    let app = create_app(
        ws_state,
        payments_state,
        config.server.cors_allowed_origin.as_deref(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "HTTP server listening");

    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    // In-flight payment workflows are detached and are not waited for
    let _ = shutdown_tx.send(true);
    scheduler_handle.await.context("Tick scheduler panicked")?;
    server_handle.await.context("HTTP server task panicked")?;

    info!("Fleetcast stopped");
    Ok(())
}
