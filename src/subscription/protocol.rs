use serde::{Deserialize, Serialize};

/// Client → Server operations
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    JoinRoom {
        room: String,
    },
    LeaveRoom {
        room: String,
    },
    SendMessage {
        room: String,
        message: String,
    },
    SubscribeToPaymentStatus {
        #[serde(rename = "orderId")]
        order_id: String,
    },
    UnsubscribeFromPaymentStatus {
        #[serde(rename = "orderId")]
        order_id: String,
    },
}

impl ClientMessage {
    /// Operation name, echoed back in error frames
    pub fn operation(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom { .. } => "JoinRoom",
            ClientMessage::LeaveRoom { .. } => "LeaveRoom",
            ClientMessage::SendMessage { .. } => "SendMessage",
            ClientMessage::SubscribeToPaymentStatus { .. } => "SubscribeToPaymentStatus",
            ClientMessage::UnsubscribeFromPaymentStatus { .. } => "UnsubscribeFromPaymentStatus",
        }
    }
}

/// Server → Client: rejected operation
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub operation: String,
    pub error: String,
}

impl ErrorMessage {
    pub fn new(operation: &str, error: String) -> Self {
        Self {
            msg_type: "error".to_string(),
            operation: operation.to_string(),
            error,
        }
    }
}
