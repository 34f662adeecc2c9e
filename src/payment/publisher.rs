use crate::broadcast::{BroadcastRegistry, Connection, GroupKey};
use crate::config::PaymentConfig;
use crate::payment::{
    payment_group, PaymentOutcome, PaymentRequest, PaymentStatus, PaymentStatusUpdate,
    SubscriptionConfirmed, SubscriptionError, PAYMENT_STATUS_EVENT, SUBSCRIPTION_CONFIRMED_EVENT,
};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Settles a payment once the simulated gateway latency has elapsed
pub trait PaymentDecider: Send + Sync {
    fn decide(&self, request: &PaymentRequest) -> Result<PaymentOutcome>;
}

impl<F> PaymentDecider for F
where
    F: Fn(&PaymentRequest) -> Result<PaymentOutcome> + Send + Sync,
{
    fn decide(&self, request: &PaymentRequest) -> Result<PaymentOutcome> {
        self(request)
    }
}

/// Approves a fixed fraction of payments at random
pub struct RandomDecider {
    approval_rate: f64,
}

impl RandomDecider {
    /// Rates outside [0, 1] are clamped; NaN falls back to the configured default
    pub fn new(approval_rate: f64) -> Self {
        let approval_rate = if approval_rate.is_nan() {
            let fallback = PaymentConfig::default().approval_rate;
            warn!(fallback = fallback, "Approval rate is NaN, using default");
            fallback
        } else {
            approval_rate.clamp(0.0, 1.0)
        };
        Self { approval_rate }
    }

    pub fn approval_rate(&self) -> f64 {
        self.approval_rate
    }
}

impl PaymentDecider for RandomDecider {
    fn decide(&self, _request: &PaymentRequest) -> Result<PaymentOutcome> {
        if rand::thread_rng().gen_bool(self.approval_rate) {
            Ok(PaymentOutcome::Approved)
        } else {
            Ok(PaymentOutcome::Rejected)
        }
    }
}

/// Runs payment workflows and reports each phase to the payer's private group
#[derive(Clone)]
pub struct PaymentPublisher {
    registry: Arc<BroadcastRegistry>,
    decider: Arc<dyn PaymentDecider>,
    settlement_delay: Duration,
}

impl PaymentPublisher {
    pub fn new(
        registry: Arc<BroadcastRegistry>,
        decider: Arc<dyn PaymentDecider>,
        settlement_delay: Duration,
    ) -> Self {
        Self {
            registry,
            decider,
            settlement_delay,
        }
    }

    /// Join the caller to `payment-status-{subject}-{order_id}` and confirm to the caller only
    pub fn subscribe(
        &self,
        connection: &Connection,
        order_id: &str,
    ) -> Result<GroupKey, SubscriptionError> {
        let group = self.private_group(connection, order_id)?;
        self.registry.join(connection.id, &group);

        info!(
            connection_id = %connection.id,
            order_id = %order_id,
            group = %group,
            "Subscribed to payment status"
        );

        let confirmation = SubscriptionConfirmed {
            order_id: order_id.to_string(),
            message: "You are subscribed to updates for this payment".to_string(),
            timestamp: Utc::now(),
        };
        self.registry
            .send_to(connection.id, SUBSCRIPTION_CONFIRMED_EVENT, &confirmation)?;

        Ok(group)
    }

    /// Leave the caller's private group for `order_id`. Returns true if it was subscribed.
    pub fn unsubscribe(
        &self,
        connection: &Connection,
        order_id: &str,
    ) -> Result<bool, SubscriptionError> {
        let group = self.private_group(connection, order_id)?;
        let removed = self.registry.leave(connection.id, &group);

        info!(
            connection_id = %connection.id,
            order_id = %order_id,
            removed = removed,
            "Unsubscribed from payment status"
        );
        Ok(removed)
    }

    /// Start a workflow on its own task and return immediately.
    ///
    /// Fire-and-forget: the task is never joined and is not cancelled on
    /// shutdown. Its only output is the events it publishes.
    pub fn spawn_detached(&self, request: PaymentRequest, subject_id: String) {
        let publisher = self.clone();
        tokio::spawn(async move {
            publisher.process(request, &subject_id).await;
        });
    }

    /// Run one workflow to completion.
    ///
    /// Publishes `Processing`, waits out the settlement delay, then publishes
    /// exactly one terminal status. Returns the terminal status, or `None`
    /// when nothing was published because the subject id is empty.
    pub async fn process(&self, request: PaymentRequest, subject_id: &str) -> Option<PaymentStatus> {
        if subject_id.trim().is_empty() {
            error!(order_id = %request.order_id, "Payment without subject id, nothing published");
            return None;
        }

        let group = payment_group(subject_id, &request.order_id);
        info!(
            order_id = %request.order_id,
            user_id = %subject_id,
            amount = request.amount,
            group = %group,
            "Payment processing started"
        );

        // Phases run on their own task so a panicking decider still ends in a terminal status
        let publisher = self.clone();
        let phases_request = request.clone();
        let phases_group = group.clone();
        let phases = tokio::spawn(async move {
            publisher.run_phases(&phases_request, &phases_group).await
        });
        let result = match phases.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("Payment workflow task aborted: {}", e)),
        };

        match result {
            Ok(status) => Some(status),
            Err(e) => {
                error!(
                    order_id = %request.order_id,
                    user_id = %subject_id,
                    error = %e,
                    "Payment workflow failed"
                );

                let update = PaymentStatusUpdate::error(&request);
                if let Err(e) = self.registry.publish(&group, PAYMENT_STATUS_EVENT, &update) {
                    error!(
                        order_id = %request.order_id,
                        error = %e,
                        "Failed to publish payment error status"
                    );
                }
                Some(PaymentStatus::Error)
            }
        }
    }

    async fn run_phases(&self, request: &PaymentRequest, group: &GroupKey) -> Result<PaymentStatus> {
        self.registry
            .publish(group, PAYMENT_STATUS_EVENT, &PaymentStatusUpdate::processing(request))
            .context("Failed to publish processing status")?;
        info!(group = %group, "Status 'Processing' sent");

        tokio::time::sleep(self.settlement_delay).await;

        let outcome = self
            .decider
            .decide(request)
            .context("Settlement decision failed")?;

        let update = match outcome {
            PaymentOutcome::Approved => {
                info!(order_id = %request.order_id, amount = request.amount, "Payment approved");
                PaymentStatusUpdate::approved(request)
            }
            PaymentOutcome::Rejected => {
                warn!(order_id = %request.order_id, amount = request.amount, "Payment rejected");
                PaymentStatusUpdate::rejected(request)
            }
        };

        self.registry
            .publish(group, PAYMENT_STATUS_EVENT, &update)
            .context("Failed to publish final status")?;
        info!(group = %group, status = ?update.status, "Final payment status sent");

        Ok(update.status)
    }

    fn private_group(
        &self,
        connection: &Connection,
        order_id: &str,
    ) -> Result<GroupKey, SubscriptionError> {
        if order_id.trim().is_empty() {
            warn!(connection_id = %connection.id, "Payment subscription with empty order id");
            return Err(SubscriptionError::EmptyOrderId);
        }

        let subject = match connection.subject.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => {
                warn!(connection_id = %connection.id, "Payment subscription without authenticated user");
                return Err(SubscriptionError::Unauthenticated);
            }
        };

        Ok(payment_group(subject, order_id))
    }
}
