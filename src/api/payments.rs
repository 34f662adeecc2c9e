use crate::auth::{authenticate_request, IdentityProvider};
use crate::payment::{PaymentPublisher, PaymentRequest};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state for payment endpoints
#[derive(Clone)]
pub struct PaymentsAppState {
    pub payments: PaymentPublisher,
    pub identity: Arc<dyn IdentityProvider>,
}

/// 202 body: the payment was accepted, its outcome arrives over the websocket
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentAccepted {
    order_id: String,
    status: String,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct HealthResponse {
    service: String,
    status: String,
    timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create payment router
pub fn create_payments_router(state: PaymentsAppState) -> Router {
    Router::new()
        .route("/api/payments/pay", post(initiate_payment))
        .route("/api/payments/health", get(health))
        .with_state(Arc::new(state))
}

/// POST /api/payments/pay - Start a payment and acknowledge immediately
async fn initiate_payment(
    State(state): State<Arc<PaymentsAppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<PaymentAccepted>), AppError> {
    let subject = authenticate_request(&headers, state.identity.as_ref()).map_err(|e| {
        warn!(error = %e, "Payment request without a valid identity");
        AppError::Unauthorized(e.to_string())
    })?;

    let request: PaymentRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    request.validate().map_err(AppError::ValidationError)?;

    info!(
        order_id = %request.order_id,
        user_id = %subject,
        amount = request.amount,
        "Payment initiated via HTTP"
    );

    let order_id = request.order_id.clone();

    // Outcome is reported only through PaymentStatusUpdate events
    state.payments.spawn_detached(request, subject);

    Ok((
        StatusCode::ACCEPTED,
        Json(PaymentAccepted {
            order_id,
            status: "Processing initiated".to_string(),
            message: "Your payment was received and is being processed. You will receive real-time updates.".to_string(),
            timestamp: Utc::now(),
        }),
    ))
}

/// GET /api/payments/health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "payments".to_string(),
        status: "Healthy".to_string(),
        timestamp: Utc::now(),
    })
}

/// Application error types
enum AppError {
    ValidationError(String),
    Unauthorized(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
        };
        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}
