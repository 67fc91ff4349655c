use super::*;
use crate::config::{DiscoveryConfig, SessionConfig};
use crate::discovery::{DiscoveryMessage, QueryKind, Reply, ReplyBody};
use crate::dispatch::MODULE_NAME;
use crate::wire::{Ip6Header, CONTROL_NEXT_HEADER, IP6_HEADER_SIZE, SWITCH_HEADER_SIZE};
use std::net::Ipv6Addr;

fn quiet_config() -> Config {
    let mut config = Config::new();
    config.node.discovery = DiscoveryConfig {
        query_timeout_ms: 100,
        round_timeout_secs: 0,
        probes_per_tick: 0,
        ..Default::default()
    };
    config
}

fn make_node() -> (Node, NodeEndpoints) {
    Node::new(quiet_config()).unwrap()
}

fn ip_packet(src: Ipv6Addr, dst: Ipv6Addr, payload: &[u8]) -> Vec<u8> {
    let header = Ip6Header::new(src, dst, 17, payload.len()).unwrap();
    let mut packet = header.encode().to_vec();
    packet.extend_from_slice(payload);
    packet
}

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn test_node_creation() {
    let (node, endpoints) = make_node();

    assert_eq!(node.state(), NodeState::Created);
    assert!(node.registry().is_registered(MODULE_NAME));
    assert_eq!(node.registry().router_interface(), Some(MODULE_NAME));
    assert_eq!(node.dispatcher().address(), node.address());
    assert!(node.dispatcher().sessions().is_empty());
    assert!(endpoints.snodes.borrow().is_empty());
}

#[test]
fn test_node_with_configured_identity() {
    let identity = Identity::generate();
    let mut config = quiet_config();
    config.node.identity.nsec = Some(hex::encode(identity.secret_key().secret_bytes()));

    let (node, _endpoints) = Node::new(config).unwrap();
    assert_eq!(node.address(), identity.address());
}

#[test]
fn test_node_rejects_bad_config() {
    let mut config = quiet_config();
    config.node.tick_interval_ms = 0;
    assert!(matches!(Node::new(config), Err(NodeError::InvalidConfig(_))));

    let mut config = quiet_config();
    config.node.buffers.event_channel = 0;
    assert!(matches!(Node::new(config), Err(NodeError::InvalidConfig(_))));

    let mut config = quiet_config();
    config.node.identity.nsec = Some("not-a-key".into());
    assert!(matches!(Node::new(config), Err(NodeError::Config(_))));
}

#[test]
fn test_tunnel_traffic_between_nodes() {
    let (mut a, mut a_ends) = make_node();
    let (mut b, mut b_ends) = make_node();
    let a_addr = *a.address();
    let b_addr = *b.address();

    assert!(a.handle_event(
        NodeEvent::AddRoute {
            peer: b_addr,
            label: SwitchLabel::new(0x13),
        },
        0,
    ));

    let packet = ip_packet(a_addr.ipv6(), b_addr.ipv6(), b"over the mesh");
    a.handle_event(
        NodeEvent::Inbound {
            message: Message::new(&packet),
            source: InterfaceKind::Tunnel,
        },
        0,
    );
    let frame = a_ends.switch.try_recv().unwrap();
    assert_eq!(frame.peer(), Some(&b_addr));

    b.handle_event(
        NodeEvent::Inbound {
            message: Message::new(frame.bytes()),
            source: InterfaceKind::Switch,
        },
        1,
    );
    let delivered = b_ends.tunnel.try_recv().unwrap();
    assert_eq!(delivered.bytes(), &packet[..]);
    assert_eq!(delivered.peer(), Some(&a_addr));

    assert_eq!(a.dispatcher().stats().to_switch, 1);
    assert_eq!(b.dispatcher().stats().to_tunnel, 1);
    assert!(b.dispatcher().sessions().contains(&a_addr));
}

#[test]
fn test_send_control_and_inject() {
    let (mut a, mut a_ends) = make_node();
    let (b, _b_ends) = make_node();
    let b_addr = *b.address();

    a.handle_event(
        NodeEvent::AddRoute {
            peer: b_addr,
            label: SwitchLabel::new(0x21),
        },
        0,
    );
    a.handle_event(
        NodeEvent::SendControl {
            peer: b_addr,
            payload: b"routing update".to_vec(),
        },
        0,
    );
    assert!(a_ends.switch.try_recv().is_ok());

    // Inject a pre-authenticated message from b into a.
    let packet = ip_packet(b_addr.ipv6(), a.address().ipv6(), b"injected");
    let mut msg = Message::new(&packet);
    msg.push(&crate::wire::SwitchHeader::new(SwitchLabel::new(0x21)).encode());
    a.handle_event(
        NodeEvent::Inject {
            message: msg,
            peer: b_addr,
        },
        0,
    );
    let delivered = a_ends.tunnel.try_recv().unwrap();
    assert_eq!(delivered.bytes(), &packet[..]);
}

#[test]
fn test_switch_ping_between_nodes() {
    let (mut a, mut a_ends) = make_node();
    let (mut b, mut b_ends) = make_node();

    a.handle_event(
        NodeEvent::SwitchPing {
            label: SwitchLabel::new(0x31),
            payload: b"are you there".to_vec(),
        },
        0,
    );
    let frame = a_ends.switch.try_recv().unwrap();
    assert!(a.dispatcher().sessions().is_empty());

    b.handle_event(
        NodeEvent::Inbound {
            message: Message::new(frame.bytes()),
            source: InterfaceKind::Switch,
        },
        0,
    );
    let ping = b_ends.pinger.try_recv().unwrap();
    assert_eq!(ping.bytes(), frame.bytes());
    assert!(ping.bytes().ends_with(b"are you there"));
    assert!(b.dispatcher().sessions().is_empty());
}

#[test]
fn test_control_to_self_loops_to_control_plane() {
    let (mut node, mut ends) = make_node();
    let me = *node.address();

    node.handle_event(
        NodeEvent::SendControl {
            peer: me,
            payload: b"hello me".to_vec(),
        },
        0,
    );
    let msg = ends.control.try_recv().unwrap();
    let ip6 = Ip6Header::parse(&msg.bytes()[SWITCH_HEADER_SIZE..]).unwrap();
    assert_eq!(ip6.next_header, CONTROL_NEXT_HEADER);
    assert_eq!(
        &msg.bytes()[SWITCH_HEADER_SIZE + IP6_HEADER_SIZE..],
        b"hello me"
    );
}

#[test]
fn test_tick_expires_idle_sessions() {
    let mut config = quiet_config();
    config.node.session = SessionConfig {
        idle_timeout_secs: 1,
        ..Default::default()
    };
    let (mut node, _ends) = Node::new(config).unwrap();
    let peer = *Identity::generate().address();

    node.handle_event(
        NodeEvent::AddRoute {
            peer,
            label: SwitchLabel::new(5),
        },
        0,
    );
    node.handle_event(
        NodeEvent::SendControl {
            peer,
            payload: vec![1, 2, 3],
        },
        0,
    );
    assert_eq!(node.dispatcher().sessions().len(), 1);

    node.tick(999);
    assert_eq!(node.dispatcher().sessions().len(), 1);
    node.tick(1000);
    assert!(node.dispatcher().sessions().is_empty());
}

#[test]
fn test_tick_drives_discovery() {
    let peer = addr("192.0.2.1:7000");
    let snode = addr("198.51.100.7:7000");
    let mut config = quiet_config();
    config.node.discovery.peers = vec![peer];
    let (mut node, mut ends) = Node::new(config).unwrap();

    node.tick(0);
    let (to, data) = ends.queries.try_recv().unwrap();
    assert_eq!(to, peer);
    let DiscoveryMessage::Query(query) = DiscoveryMessage::decode(&data).unwrap() else {
        panic!("expected a query");
    };
    assert_eq!(query.kind, QueryKind::FindSupernode);

    let reply = DiscoveryMessage::Reply(Reply {
        txid: query.txid,
        body: ReplyBody::Supernodes(vec![snode]),
    });
    node.handle_event(
        NodeEvent::DiscoveryReply {
            from: peer,
            data: reply.encode(),
        },
        10,
    );

    assert!(ends.snodes.has_changed().unwrap());
    assert_eq!(ends.snodes.borrow_and_update().to_vec(), vec![snode]);
}

#[test]
fn test_discovery_disabled() {
    let mut config = quiet_config();
    config.node.discovery.enabled = false;
    config.node.discovery.peers = vec![addr("192.0.2.1:7000")];
    let (mut node, mut ends) = Node::new(config).unwrap();

    node.tick(0);
    node.tick(1000);
    assert!(ends.queries.try_recv().is_err());
    assert_eq!(node.hunter().round_number(), 0);
}

#[test]
fn test_snode_and_peer_events() {
    let (mut node, ends) = make_node();
    let s = addr("198.51.100.1:7000");
    let p = addr("192.0.2.1:7000");

    node.handle_event(NodeEvent::AddSnode(s), 0);
    node.handle_event(NodeEvent::AddSnode(s), 0);
    node.handle_event(NodeEvent::AddPeer(p), 0);
    assert_eq!(ends.snodes.borrow().to_vec(), vec![s]);
    assert_eq!(node.hunter().list_peers().to_vec(), vec![p]);

    node.handle_event(NodeEvent::RemoveSnode(s), 0);
    node.handle_event(NodeEvent::RemovePeer(p), 0);
    assert!(ends.snodes.borrow().is_empty());
    assert!(node.hunter().list_peers().is_empty());

    assert!(!node.handle_event(NodeEvent::Shutdown, 0));
}

#[test]
fn test_malformed_events_keep_node_alive() {
    let (mut node, _ends) = make_node();

    assert!(node.handle_event(
        NodeEvent::Inbound {
            message: Message::new(&[0u8; 4]),
            source: InterfaceKind::Switch,
        },
        0,
    ));
    assert!(node.handle_event(
        NodeEvent::DiscoveryReply {
            from: addr("192.0.2.1:1"),
            data: vec![0xff],
        },
        0,
    ));
    assert_eq!(node.dispatcher().stats().dropped_format, 1);
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let (mut node, endpoints) = make_node();
    let s = addr("198.51.100.1:7000");

    let handle = tokio::spawn(async move {
        let result = node.run().await;
        (node, result)
    });

    endpoints.events.send(NodeEvent::AddSnode(s)).await.unwrap();
    endpoints.events.send(NodeEvent::Shutdown).await.unwrap();

    let (mut node, result) = handle.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(node.state(), NodeState::Stopped);
    assert_eq!(node.hunter().list_snodes().to_vec(), vec![s]);

    // The event receiver is consumed by the first run.
    assert!(matches!(node.run().await, Err(NodeError::AlreadyRunning)));
}

#[tokio::test]
async fn test_run_stops_when_senders_dropped() {
    let (mut node, endpoints) = make_node();
    drop(endpoints.events);

    node.run().await.unwrap();
    assert_eq!(node.state(), NodeState::Stopped);
}
