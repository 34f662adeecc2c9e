use crate::broadcast::{
    BroadcastError, Connection, ConnectionId, DeliveryReport, GroupKey, OutboundEvent,
};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outbound queue handle for one registered connection
struct ConnectionEntry {
    subject: Option<String>,
    tx: mpsc::Sender<Arc<OutboundEvent>>,
}

/// Registry of live connections and the groups they belong to
///
/// All membership changes go through `join`/`leave`/`unregister`; callers
/// never see the underlying sets. Groups appear on first join and are
/// removed as soon as their last member leaves.
pub struct BroadcastRegistry {
    /// connection_id -> outbound queue
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// group -> member connection ids
    groups: DashMap<GroupKey, HashSet<ConnectionId>>,
    /// Reverse index: connection_id -> groups (for disconnect cleanup)
    memberships: DashMap<ConnectionId, HashSet<GroupKey>>,
    /// Per-connection outbound queue bound
    queue_capacity: usize,
}

impl BroadcastRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            groups: DashMap::new(),
            memberships: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new session and return its handle plus the receiving end of its queue
    pub fn register(
        &self,
        subject: Option<String>,
    ) -> (Connection, mpsc::Receiver<Arc<OutboundEvent>>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let connection = Connection {
            id: ConnectionId::new(),
            subject,
        };

        self.connections.insert(
            connection.id,
            ConnectionEntry {
                subject: connection.subject.clone(),
                tx,
            },
        );

        info!(
            connection_id = %connection.id,
            user = %connection.display_name(),
            "Connection registered"
        );

        (connection, rx)
    }

    /// Drop a session and remove it from every group it joined
    pub fn unregister(&self, connection_id: ConnectionId, reason: &str) {
        let entry = self.connections.remove(&connection_id).map(|(_, e)| e);

        let groups = self
            .memberships
            .remove(&connection_id)
            .map(|(_, g)| g)
            .unwrap_or_default();
        for group in &groups {
            self.remove_member(group, connection_id);
        }

        if let Some(entry) = entry {
            info!(
                connection_id = %connection_id,
                user = %entry.subject.as_deref().unwrap_or(crate::broadcast::ANONYMOUS_USER),
                groups_left = groups.len(),
                reason = %reason,
                "Connection unregistered"
            );
        }
    }

    /// Add a connection to a group. Returns true if it was not already a member.
    ///
    /// Joining twice is a no-op. Unknown connections are ignored.
    pub fn join(&self, connection_id: ConnectionId, group: &GroupKey) -> bool {
        if !self.connections.contains_key(&connection_id) {
            warn!(connection_id = %connection_id, group = %group, "Join from unknown connection ignored");
            return false;
        }

        let added = self
            .groups
            .entry(group.clone())
            .or_default()
            .insert(connection_id);
        self.memberships
            .entry(connection_id)
            .or_default()
            .insert(group.clone());

        // `unregister` removes the connection before clearing memberships, so a
        // join racing it either is seen by that cleanup or sees the removal here
        if !self.connections.contains_key(&connection_id) {
            self.remove_member(group, connection_id);
            self.memberships.remove(&connection_id);
            warn!(connection_id = %connection_id, group = %group, "Connection unregistered during join, rolled back");
            return false;
        }

        debug!(connection_id = %connection_id, group = %group, added = added, "Joined group");
        added
    }

    /// Remove a connection from a group. Returns true if it was a member.
    ///
    /// A single leave removes membership no matter how often the connection joined.
    pub fn leave(&self, connection_id: ConnectionId, group: &GroupKey) -> bool {
        let removed = self.remove_member(group, connection_id);

        if let Some(mut groups) = self.memberships.get_mut(&connection_id) {
            groups.remove(group);
        }
        self.memberships
            .remove_if(&connection_id, |_, groups| groups.is_empty());

        debug!(connection_id = %connection_id, group = %group, removed = removed, "Left group");
        removed
    }

    /// Deliver an event to every current member of a group
    pub fn publish<T: Serialize>(
        &self,
        group: &GroupKey,
        event: &str,
        payload: &T,
    ) -> Result<DeliveryReport, BroadcastError> {
        let message = Self::encode(event, payload)?;

        // Snapshot membership; the shard lock is released before delivery
        let members: Vec<ConnectionId> = match self.groups.get(group) {
            Some(members) => members.iter().copied().collect(),
            None => Vec::new(),
        };

        let report = self.deliver(members.into_iter(), &message);
        debug!(
            group = %group,
            event = %event,
            delivered = report.delivered,
            failed = report.failed,
            "Published to group"
        );
        Ok(report)
    }

    /// Deliver an event to every registered connection, regardless of group membership
    pub fn publish_all<T: Serialize>(
        &self,
        event: &str,
        payload: &T,
    ) -> Result<DeliveryReport, BroadcastError> {
        let message = Self::encode(event, payload)?;
        let targets: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        Ok(self.deliver(targets.into_iter(), &message))
    }

    /// Deliver an event to a single connection
    pub fn send_to<T: Serialize>(
        &self,
        connection_id: ConnectionId,
        event: &str,
        payload: &T,
    ) -> Result<DeliveryReport, BroadcastError> {
        let message = Self::encode(event, payload)?;
        Ok(self.deliver(std::iter::once(connection_id), &message))
    }

    /// Check group membership
    pub fn is_member(&self, connection_id: ConnectionId, group: &GroupKey) -> bool {
        self.groups
            .get(group)
            .map(|members| members.contains(&connection_id))
            .unwrap_or(false)
    }

    /// Number of members in a group (0 for groups that do not exist)
    pub fn member_count(&self, group: &GroupKey) -> usize {
        self.groups.get(group).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of non-empty groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn encode<T: Serialize>(event: &str, payload: &T) -> Result<Arc<OutboundEvent>, BroadcastError> {
        let data = serde_json::to_value(payload)
            .map_err(|e| BroadcastError::Serialization(e.to_string()))?;
        Ok(Arc::new(OutboundEvent {
            event: event.to_string(),
            data,
        }))
    }

    /// Queue the message for each target; failures are per connection and never abort the loop
    fn deliver(
        &self,
        targets: impl Iterator<Item = ConnectionId>,
        message: &Arc<OutboundEvent>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for connection_id in targets {
            let Some(entry) = self.connections.get(&connection_id) else {
                // Unregistered between snapshot and delivery
                continue;
            };

            match entry.tx.try_send(Arc::clone(message)) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %connection_id,
                        event = %message.event,
                        "Outbound queue full, dropping event"
                    );
                    report.failed += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(
                        connection_id = %connection_id,
                        event = %message.event,
                        "Connection closed, dropping event"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Remove one member; drops the group once it is empty
    fn remove_member(&self, group: &GroupKey, connection_id: ConnectionId) -> bool {
        let removed = match self.groups.get_mut(group) {
            Some(mut members) => members.remove(&connection_id),
            None => false,
        };
        // Re-checked under the shard lock, so a concurrent join keeps the group alive
        self.groups.remove_if(group, |_, members| members.is_empty());
        removed
    }
}

impl Default for BroadcastRegistry {
    fn default() -> Self {
        Self::new(crate::config::BroadcastConfig::default().connection_queue_capacity)
    }
}
