use super::*;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::error::TryRecvError;

fn registry() -> BroadcastRegistry {
    BroadcastRegistry::new(16)
}

#[test]
fn test_join_is_idempotent_and_single_leave_removes() {
    let registry = registry();
    let (conn, _rx) = registry.register(Some("alice".to_string()));
    let room = GroupKey::room("lobby");

    assert!(registry.join(conn.id, &room));
    assert!(!registry.join(conn.id, &room)); // Second join is a no-op
    assert_eq!(registry.member_count(&room), 1);

    // Leave is absolute: one leave removes membership regardless of join count
    assert!(registry.leave(conn.id, &room));
    assert!(!registry.is_member(conn.id, &room));
}

#[test]
fn test_leave_when_not_member_is_noop() {
    let registry = registry();
    let (conn, _rx) = registry.register(None);

    assert!(!registry.leave(conn.id, &GroupKey::room("nowhere")));
    assert_eq!(registry.group_count(), 0);
}

#[test]
fn test_empty_group_is_reaped() {
    let registry = registry();
    let (a, _rx_a) = registry.register(None);
    let (b, _rx_b) = registry.register(None);
    let room = GroupKey::room("garage");

    registry.join(a.id, &room);
    registry.join(b.id, &room);
    assert_eq!(registry.group_count(), 1);

    registry.leave(a.id, &room);
    assert_eq!(registry.group_count(), 1);

    registry.leave(b.id, &room);
    assert_eq!(registry.group_count(), 0);
}

#[test]
fn test_join_from_unknown_connection_ignored() {
    let registry = registry();
    let ghost = ConnectionId::new();

    assert!(!registry.join(ghost, &GroupKey::room("lobby")));
    assert_eq!(registry.group_count(), 0);
}

#[test]
fn test_publish_reaches_only_members() {
    let registry = registry();
    let (member, mut member_rx) = registry.register(Some("alice".to_string()));
    let (outsider, mut outsider_rx) = registry.register(Some("bob".to_string()));
    let room = GroupKey::room("lobby");

    registry.join(member.id, &room);
    registry.join(outsider.id, &GroupKey::room("other"));

    let report = registry
        .publish(&room, "ReceiveMessage", &json!({"message": "hi"}))
        .unwrap();
    assert_eq!(report, DeliveryReport { delivered: 1, failed: 0 });

    let event = member_rx.try_recv().unwrap();
    assert_eq!(event.event, "ReceiveMessage");
    assert_eq!(event.data["message"], "hi");

    assert!(matches!(outsider_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_connection_without_groups_never_gets_group_events() {
    let registry = registry();
    let (member, _member_rx) = registry.register(None);
    let (_loner, mut loner_rx) = registry.register(None);
    let room = GroupKey::room("lobby");
    registry.join(member.id, &room);

    registry.publish(&room, "UserJoined", &json!({})).unwrap();
    registry
        .publish(&GroupKey::private("payment-status", "u1", "A1"), "PaymentStatusUpdate", &json!({}))
        .unwrap();

    assert!(matches!(loner_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_publish_delivers_once_per_connection() {
    let registry = registry();
    let (conn, mut rx) = registry.register(None);
    let room = GroupKey::room("lobby");
    registry.join(conn.id, &room);
    registry.join(conn.id, &room);

    registry.publish(&room, "ReceiveMessage", &json!({})).unwrap();

    assert!(rx.try_recv().is_ok());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_publish_to_missing_group_delivers_nothing() {
    let registry = registry();
    let _conn = registry.register(None);

    let report = registry
        .publish(&GroupKey::room("empty"), "ReceiveMessage", &json!({}))
        .unwrap();
    assert_eq!(report, DeliveryReport::default());
}

#[test]
fn test_publish_all_ignores_membership() {
    let registry = registry();
    let (a, mut rx_a) = registry.register(None);
    let (_b, mut rx_b) = registry.register(None);
    registry.join(a.id, &GroupKey::room("lobby"));

    let report = registry.publish_all("position", &json!({"x": 1.0})).unwrap();
    assert_eq!(report.delivered, 2);

    assert_eq!(rx_a.try_recv().unwrap().event, "position");
    assert_eq!(rx_b.try_recv().unwrap().event, "position");
}

#[test]
fn test_dead_connection_does_not_abort_delivery() {
    let registry = registry();
    let (dead, dead_rx) = registry.register(None);
    let (live, mut live_rx) = registry.register(None);
    let room = GroupKey::room("lobby");
    registry.join(dead.id, &room);
    registry.join(live.id, &room);

    // Receiver dropped without unregistering (transport died mid-session)
    drop(dead_rx);

    let report = registry.publish(&room, "ReceiveMessage", &json!({})).unwrap();
    assert_eq!(report, DeliveryReport { delivered: 1, failed: 1 });
    assert!(live_rx.try_recv().is_ok());
}

#[test]
fn test_full_queue_counts_as_failure() {
    let registry = BroadcastRegistry::new(1);
    let (_conn, mut rx) = registry.register(None);

    assert_eq!(registry.publish_all("position", &1).unwrap().delivered, 1);
    assert_eq!(registry.publish_all("position", &2).unwrap().failed, 1);

    // The first event is still queued
    assert_eq!(rx.try_recv().unwrap().data, json!(1));
}

#[test]
fn test_send_to_targets_single_connection() {
    let registry = registry();
    let (a, mut rx_a) = registry.register(None);
    let (_b, mut rx_b) = registry.register(None);

    registry
        .send_to(a.id, "SubscriptionConfirmed", &json!({"orderId": "A1"}))
        .unwrap();

    assert_eq!(rx_a.try_recv().unwrap().data["orderId"], "A1");
    assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_unregister_removes_all_memberships() {
    let registry = registry();
    let (conn, _rx) = registry.register(Some("alice".to_string()));
    let (other, _other_rx) = registry.register(None);
    let lobby = GroupKey::room("lobby");
    let private = GroupKey::private("payment-status", "alice", "A1");

    registry.join(conn.id, &lobby);
    registry.join(conn.id, &private);
    registry.join(other.id, &lobby);

    registry.unregister(conn.id, "client closed");

    assert_eq!(registry.connection_count(), 1);
    assert!(!registry.is_member(conn.id, &lobby));
    assert_eq!(registry.member_count(&lobby), 1);
    // Private group had a single member and is reaped
    assert_eq!(registry.member_count(&private), 0);
    assert_eq!(registry.group_count(), 1);
}

#[test]
fn test_private_keys_never_collide() {
    let u1 = GroupKey::private("payment-status", "u1", "A1");
    let u2 = GroupKey::private("payment-status", "u2", "A1");
    assert_ne!(u1, u2);
    assert_eq!(u1.to_string(), "payment-status-u1-A1");
    assert_eq!(u2.to_string(), "payment-status-u2-A1");

    // Same rendered name, different structure: still distinct groups
    let tricky_a = GroupKey::private("payment-status", "u1-x", "A1");
    let tricky_b = GroupKey::private("payment-status", "u1", "x-A1");
    assert_eq!(tricky_a.to_string(), tricky_b.to_string());
    assert_ne!(tricky_a, tricky_b);

    // A room cannot impersonate a private group
    assert_ne!(GroupKey::room("payment-status-u1-A1"), u1);
}

#[test]
fn test_outbound_event_wire_format() {
    let event = OutboundEvent {
        event: "position".to_string(),
        data: json!({"x": 50.0}),
    };
    let wire = serde_json::to_value(&event).unwrap();
    assert_eq!(wire, json!({"type": "position", "data": {"x": 50.0}}));
}

#[test]
fn test_display_name_falls_back_to_anonymous() {
    let anon = Connection {
        id: ConnectionId::new(),
        subject: None,
    };
    let alice = Connection {
        id: ConnectionId::new(),
        subject: Some("alice".to_string()),
    };
    assert_eq!(anon.display_name(), "Anonymous");
    assert_eq!(alice.display_name(), "alice");
}

#[test]
fn test_concurrent_joins_are_not_lost() {
    let registry = Arc::new(BroadcastRegistry::new(4));
    let room = GroupKey::room("crowded");
    let mut handles = vec![];
    let mut receivers = vec![];

    for _ in 0..8 {
        let (conn, rx) = registry.register(None);
        receivers.push(rx);
        let registry = Arc::clone(&registry);
        let room = room.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                registry.join(conn.id, &room);
                registry.leave(conn.id, &room);
            }
            registry.join(conn.id, &room);
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.member_count(&room), 8);
    let report = registry.publish(&room, "UserJoined", &json!({})).unwrap();
    assert_eq!(report.delivered, 8);
}

#[test]
fn test_join_racing_unregister_leaves_no_orphans() {
    let registry = Arc::new(BroadcastRegistry::new(4));

    for round in 0..200 {
        let (conn, _rx) = registry.register(None);
        let room = GroupKey::room(&format!("race-{}", round % 4));

        let joiner = {
            let registry = Arc::clone(&registry);
            let room = room.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    registry.join(conn.id, &room);
                }
            })
        };
        let closer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.unregister(conn.id, "test"))
        };

        joiner.join().unwrap();
        closer.join().unwrap();

        assert!(!registry.is_member(conn.id, &room));
    }

    assert_eq!(registry.connection_count(), 0);
    assert_eq!(registry.group_count(), 0);
}
