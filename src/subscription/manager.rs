use crate::broadcast::{BroadcastRegistry, Connection, OutboundEvent};
use crate::chat::ChatRelay;
use crate::payment::PaymentPublisher;
use crate::subscription::protocol::{ClientMessage, ErrorMessage};
use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Drives a single WebSocket session: inbound operations in, queued events out
pub struct Session {
    connection: Connection,
    registry: Arc<BroadcastRegistry>,
    chat: ChatRelay,
    payments: PaymentPublisher,
}

impl Session {
    pub fn new(
        connection: Connection,
        registry: Arc<BroadcastRegistry>,
        chat: ChatRelay,
        payments: PaymentPublisher,
    ) -> Self {
        Self {
            connection,
            registry,
            chat,
            payments,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Handle WebSocket connection lifecycle
    ///
    /// Always unregisters the connection on exit, which also removes it from every group.
    pub async fn handle(
        self,
        mut socket: WebSocket,
        mut events_rx: mpsc::Receiver<Arc<OutboundEvent>>,
    ) {
        info!(
            connection_id = %self.connection.id,
            user = %self.connection.display_name(),
            "WebSocket connection established"
        );

        let reason = loop {
            tokio::select! {
                // Handle incoming client messages
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(rejection) = self.handle_client_message(&text) {
                                if let Err(e) = send_json(&mut socket, &rejection).await {
                                    error!(error = %e, "Failed to send error frame");
                                    break "send failed";
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            break "client closed";
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break "send failed";
                            }
                        }
                        Some(Ok(_)) => {
                            // Ignore binary, pong messages
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break "transport error";
                        }
                    }
                }

                // Forward events queued by the registry
                event = events_rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = send_json(&mut socket, event.as_ref()).await {
                                error!(error = %e, event = %event.event, "Failed to send event");
                                break "send failed";
                            }
                        }
                        None => {
                            error!("Outbound queue closed");
                            break "queue closed";
                        }
                    }
                }
            }
        };

        self.registry.unregister(self.connection.id, reason);
        info!(connection_id = %self.connection.id, reason = %reason, "WebSocket connection closed");
    }

    /// Decode and run one client operation
    ///
    /// Validation failures come back as an error frame for the caller; they never close the session.
    pub fn handle_client_message(&self, text: &str) -> Result<(), ErrorMessage> {
        let msg: ClientMessage = serde_json::from_str(text).map_err(|e| {
            warn!(connection_id = %self.connection.id, error = %e, "Undecodable client message");
            ErrorMessage::new("unknown", format!("Invalid message: {}", e))
        })?;

        let operation = msg.operation();
        let result = match msg {
            ClientMessage::JoinRoom { room } => self
                .chat
                .join_room(&self.connection, &room)
                .map_err(|e| e.to_string()),
            ClientMessage::LeaveRoom { room } => self
                .chat
                .leave_room(&self.connection, &room)
                .map_err(|e| e.to_string()),
            ClientMessage::SendMessage { room, message } => self
                .chat
                .send_message(&self.connection, &room, &message)
                .map_err(|e| e.to_string()),
            ClientMessage::SubscribeToPaymentStatus { order_id } => self
                .payments
                .subscribe(&self.connection, &order_id)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            ClientMessage::UnsubscribeFromPaymentStatus { order_id } => self
                .payments
                .unsubscribe(&self.connection, &order_id)
                .map(|_| ())
                .map_err(|e| e.to_string()),
        };

        result.map_err(|e| ErrorMessage::new(operation, e))
    }
}

async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string(value)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
