use crate::auth::IdentityProvider;
use crate::broadcast::BroadcastRegistry;
use crate::chat::ChatRelay;
use crate::payment::PaymentPublisher;
use crate::subscription::Session;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Query parameters for WebSocket upgrade
///
/// Browsers cannot set headers on a WebSocket handshake, so the token travels
/// in the query string (`access_token`, or `token`).
#[derive(Deserialize)]
struct WsQuery {
    access_token: Option<String>,
    token: Option<String>,
}

impl WsQuery {
    fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .or(self.token.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Shared application state for WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub registry: Arc<BroadcastRegistry>,
    pub chat: ChatRelay,
    pub payments: PaymentPublisher,
    pub identity: Arc<dyn IdentityProvider>,
    pub require_auth: bool,
}

impl WsAppState {
    fn resolve_subject(&self, query: &WsQuery) -> Option<String> {
        query.token().and_then(|t| self.identity.resolve(t))
    }
}

/// Auth middleware: rejects unknown tokens when require_auth=true.
///
/// Runs as a tower layer BEFORE WebSocket upgrade extraction so 401 can be
/// returned cleanly without requiring a valid upgrade request in tests.
async fn ws_auth(
    State(state): State<Arc<WsAppState>>,
    Query(params): Query<WsQuery>,
    req: Request,
    next: Next,
) -> Response {
    if state.require_auth && state.resolve_subject(&params).is_none() {
        warn!("WebSocket upgrade rejected: missing or unknown token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(req).await
}

/// GET /api/ws - WebSocket upgrade handler (auth handled by ws_auth middleware)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<WsAppState>>,
) -> Response {
    let subject = state.resolve_subject(&params);
    info!(
        authenticated = subject.is_some(),
        "WebSocket upgrade request received"
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, subject))
}

/// Create WebSocket router with auth middleware applied
pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), ws_auth))
        .with_state(state)
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<WsAppState>, subject: Option<String>) {
    // Register with the broadcast registry (position feed starts immediately)
    let (connection, events_rx) = state.registry.register(subject);

    let session = Session::new(
        connection,
        Arc::clone(&state.registry),
        state.chat.clone(),
        state.payments.clone(),
    );

    // Handle connection lifecycle
    session.handle(socket, events_rx).await;
}
