//! Integration tests for the session flow
//!
//! Tests for:
//! - Status dedup across the node boundary
//! - Registry change events driven through the node
//! - Preferred-peer persistence across node instances
//! - Clipboard gating following session status

use std::net::Ipv4Addr;

use tempfile::TempDir;

use beamlink_core::node::NodeConfig;
use beamlink_core::peer::PreferredPeerStore;
use beamlink_core::{LinkEvent, LinkNode, LinkStatus, PreferredPeer};
use beamlink_discovery::PeerCandidate;
use beamlink_integration_tests::test_client;
use beamlink_sync::{ClipboardPayload, RawClipboardFrame};

fn node_in(dir: &TempDir) -> LinkNode {
    LinkNode::new(NodeConfig {
        device_name: "integration-node".into(),
        listen_ip: Some(Ipv4Addr::LOCALHOST),
        download_dir: dir.path().join("downloads"),
        preferred_peer_path: dir.path().join("preferred.json"),
        ..NodeConfig::default()
    })
}

fn drain_statuses(rx: &mut tokio::sync::broadcast::Receiver<LinkEvent>) -> Vec<LinkStatus> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let LinkEvent::StatusChanged(s) = event {
            seen.push(s);
        }
    }
    seen
}

#[tokio::test]
async fn status_updates_deduplicate_through_the_node() {
    let dir = TempDir::new().unwrap();
    let node = node_in(&dir);
    let mut rx = node.subscribe();

    for code in [1u8, 1, 3, 3, 3, 7, 7, 1] {
        node.apply_status(LinkStatus::from_code(code).unwrap());
    }

    let seen = drain_statuses(&mut rx);
    assert_eq!(
        seen,
        vec![
            LinkStatus::WaitConnecting,
            LinkStatus::CheckingAuthorization,
            LinkStatus::Connected,
            LinkStatus::WaitConnecting,
        ]
    );
}

#[tokio::test]
async fn registry_events_fire_once_per_real_change() {
    let dir = TempDir::new().unwrap();
    let node = node_in(&dir);
    let mut rx = node.subscribe();

    // Scenario from the contract: one client attaches, then detaches.
    node.apply_client_update(test_client("A", 5), true);
    node.apply_client_update(test_client("A", 5), false);

    let mut sizes = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let LinkEvent::ClientListChanged(list) = event {
            sizes.push(list.len());
        }
    }
    assert_eq!(sizes, vec![1, 0]);
    assert!(node.clients().is_empty());
}

#[tokio::test]
async fn identical_snapshots_cross_node_without_churn() {
    let dir = TempDir::new().unwrap();
    let node = node_in(&dir);
    let mut rx = node.subscribe();

    let snapshot = vec![test_client("A", 5), test_client("B", 6)];
    node.apply_client_snapshot(snapshot.clone());
    node.apply_client_snapshot(snapshot);

    let mut changes = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, LinkEvent::ClientListChanged(_)) {
            changes += 1;
        }
    }
    assert_eq!(changes, 1);
}

#[tokio::test]
async fn preferred_peer_survives_a_node_restart() {
    let dir = TempDir::new().unwrap();

    // A previous run confirmed "den-pc" and persisted it.
    let candidate = PeerCandidate {
        instance_name: "den-pc".into(),
        ip: Ipv4Addr::new(10, 0, 0, 5),
        port: 40_123,
        monitor_name: "Den Display".into(),
        version: "1".into(),
        timestamp_ms: 1,
    };
    let store = PreferredPeerStore::new(dir.path().join("preferred.json"));
    store.save(&PreferredPeer::from_candidate(&candidate)).unwrap();

    // A fresh node over the same state dir sees the preference.
    let node = node_in(&dir);
    let preferred = node.preferred_peer().unwrap();
    assert_eq!(preferred.instance_name, "den-pc");
    assert_eq!(preferred.ip, Ipv4Addr::new(10, 0, 0, 5));

    // Confirming an unknown instance is an error, not a crash.
    assert!(node.confirm_peer("nobody").is_err());

    // Forced research drops the preference for good.
    node.force_research(true).unwrap();
    assert!(node.preferred_peer().is_none());
}

#[tokio::test]
async fn clipboard_follows_session_status() {
    let dir = TempDir::new().unwrap();
    let node = node_in(&dir);
    let mut rx = node.subscribe();

    assert!(node.push_clipboard(ClipboardPayload::text("early")).is_err());

    node.apply_status(LinkStatus::ConnectedNoClients);
    node.push_clipboard(ClipboardPayload::text("hello")).unwrap();

    // Inbound regional-encoded text decodes and re-broadcasts.
    let frame = RawClipboardFrame {
        text: Some(vec![0xD6, 0xD0, 0xCE, 0xC4]),
        ..RawClipboardFrame::default()
    };
    let decoded = node.accept_clipboard_frame(&frame).unwrap();
    assert_eq!(decoded.text.as_deref(), Some("中文"));

    let mut received = 0;
    while let Ok(event) = rx.try_recv() {
        if let LinkEvent::ClipboardReceived(payload) = event {
            assert_eq!(payload.text.as_deref(), Some("中文"));
            received += 1;
        }
    }
    assert_eq!(received, 1);

    node.apply_status(LinkStatus::ConnectedFailed);
    assert!(node.push_clipboard(ClipboardPayload::text("late")).is_err());
}
