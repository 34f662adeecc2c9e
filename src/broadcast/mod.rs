// Broadcast channel registry: connections, named groups, fan-out

mod registry;

pub use registry::BroadcastRegistry;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Label used for connections without an authenticated subject
pub const ANONYMOUS_USER: &str = "Anonymous";

/// Opaque per-session connection token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to one live session, as seen by the operations layered on the registry
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    /// Verified subject id from the identity provider, if any
    pub subject: Option<String>,
}

impl Connection {
    /// Acting user name: the subject id, or "Anonymous" for unauthenticated sessions
    pub fn display_name(&self) -> &str {
        self.subject.as_deref().unwrap_or(ANONYMOUS_USER)
    }
}

/// Key of a subscriber group
///
/// Rooms are keyed by a user-chosen name. Private groups are keyed by
/// (purpose, subject, resource) so two subjects never share one, even when
/// their rendered names happen to match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Room(String),
    Private {
        purpose: String,
        subject: String,
        resource: String,
    },
}

impl GroupKey {
    pub fn room(name: &str) -> Self {
        GroupKey::Room(name.to_string())
    }

    pub fn private(purpose: &str, subject: &str, resource: &str) -> Self {
        GroupKey::Private {
            purpose: purpose.to_string(),
            subject: subject.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Room(name) => write!(f, "{}", name),
            GroupKey::Private {
                purpose,
                subject,
                resource,
            } => write!(f, "{}-{}-{}", purpose, subject, resource),
        }
    }
}

/// Server → Client: a named event with its payload
///
/// Wire form: `{"type": "<event>", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    #[serde(rename = "type")]
    pub event: String,
    pub data: Value,
}

/// Outcome of a single publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the event was queued for
    pub delivered: usize,
    /// Connections that were closed or backed up (logged, not retried)
    pub failed: usize,
}

/// Broadcast errors
#[derive(Debug, PartialEq, Clone)]
pub enum BroadcastError {
    /// Payload could not be converted to JSON
    Serialization(String),
}

impl std::fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastError::Serialization(msg) => write!(f, "Failed to serialize payload: {}", msg),
        }
    }
}

impl std::error::Error for BroadcastError {}
