// Payment status notifications over private subscriber groups

mod publisher;

pub use publisher::{PaymentDecider, PaymentPublisher, RandomDecider};

use crate::broadcast::{BroadcastError, GroupKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};


/// Event name for every payment phase
pub const PAYMENT_STATUS_EVENT: &str = "PaymentStatusUpdate";

/// Event name for the caller-only subscription acknowledgement
pub const SUBSCRIPTION_CONFIRMED_EVENT: &str = "SubscriptionConfirmed";

/// Purpose component of payment group keys
pub const PAYMENT_STATUS_PURPOSE: &str = "payment-status";

/// Private group for one subject's view of one order: `payment-status-{subject}-{order}`
pub fn payment_group(subject_id: &str, order_id: &str) -> GroupKey {
    GroupKey::private(PAYMENT_STATUS_PURPOSE, subject_id, order_id)
}

/// Payment accepted from the HTTP API
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub order_id: String,
    pub amount: f64,
}

impl PaymentRequest {
    /// Request-level validation: non-empty order id, positive amount
    pub fn validate(&self) -> Result<(), String> {
        if self.order_id.trim().is_empty() {
            return Err("orderId is required".to_string());
        }
        if !self.amount.is_finite() || self.amount < 0.01 {
            return Err("amount must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Phase of a payment workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Processing,
    Approved,
    Rejected,
    Error,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Processing)
    }
}

/// Settlement decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved,
    Rejected,
}

/// Payload of `PaymentStatusUpdate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusUpdate {
    pub order_id: String,
    pub status: PaymentStatus,
    pub message: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl PaymentStatusUpdate {
    fn new(request: &PaymentRequest, status: PaymentStatus, message: String) -> Self {
        Self {
            order_id: request.order_id.clone(),
            status,
            message,
            amount: request.amount,
            timestamp: Utc::now(),
        }
    }

    pub fn processing(request: &PaymentRequest) -> Self {
        Self::new(
            request,
            PaymentStatus::Processing,
            "Your payment is being processed by the gateway...".to_string(),
        )
    }

    pub fn approved(request: &PaymentRequest) -> Self {
        Self::new(
            request,
            PaymentStatus::Approved,
            format!("Payment approved! Amount: {:.2}", request.amount),
        )
    }

    pub fn rejected(request: &PaymentRequest) -> Self {
        Self::new(
            request,
            PaymentStatus::Rejected,
            "Payment declined. Please contact your card issuer.".to_string(),
        )
    }

    pub fn error(request: &PaymentRequest) -> Self {
        Self::new(
            request,
            PaymentStatus::Error,
            "An error occurred while processing your payment. Please try again.".to_string(),
        )
    }
}

/// Payload of `SubscriptionConfirmed`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionConfirmed {
    pub order_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Subscribe/unsubscribe errors
#[derive(Debug, PartialEq, Clone)]
pub enum SubscriptionError {
    EmptyOrderId,
    /// Private groups need an authenticated subject
    Unauthenticated,
    Broadcast(BroadcastError),
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionError::EmptyOrderId => write!(f, "Order id cannot be empty"),
            SubscriptionError::Unauthenticated => {
                write!(f, "Payment subscriptions require an authenticated user")
            }
            SubscriptionError::Broadcast(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SubscriptionError {}

impl From<BroadcastError> for SubscriptionError {
    fn from(e: BroadcastError) -> Self {
        SubscriptionError::Broadcast(e)
    }
}
