// HTTP and WebSocket APIs

pub mod payments;
pub mod websocket;

pub use payments::{create_payments_router, PaymentsAppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use axum::http::HeaderValue;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Full application router: websocket gateway plus payment endpoints
pub fn create_app(
    ws_state: Arc<WsAppState>,
    payments_state: PaymentsAppState,
    cors_allowed_origin: Option<&str>,
) -> Router {
    let app = create_ws_router(ws_state).merge(create_payments_router(payments_state));

    match cors_allowed_origin {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(origin) => app.layer(
                CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Invalid CORS origin, CORS disabled");
                app
            }
        },
        None => app,
    }
}
