//! Benchmarks for the channel and dispatch hot path.
//!
//! Run with: cargo bench --bench dispatch

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshcore::channel::{NonceLog, SealedChannel, SealedChannelFactory, SecureChannel};
use meshcore::config::SessionConfig;
use meshcore::interface::{interface_channel, MessageRx};
use meshcore::session::SessionHandle;
use meshcore::{
    Dispatcher, Identity, InterfaceKind, Ip6Header, Message, ModuleRegistry, RouteTable,
    SwitchLabel, Wiring,
};

const SIZES: [usize; 3] = [64, 512, 1280];

/// Two channels that have completed the hello exchange.
fn established_pair() -> (SealedChannel, SealedChannel) {
    let a = Identity::generate();
    let b = Identity::generate();
    let mut ab = SealedChannel::new(
        &a.secret_key(),
        a.address(),
        b.address(),
        SessionHandle::new(1),
        NonceLog::new(),
    )
    .unwrap();
    let mut ba = SealedChannel::new(
        &b.secret_key(),
        b.address(),
        a.address(),
        SessionHandle::new(2),
        NonceLog::new(),
    )
    .unwrap();

    ba.decrypt(&ab.encrypt(b"hello").unwrap()).unwrap();
    ab.decrypt(&ba.encrypt(b"hello").unwrap()).unwrap();
    ba.decrypt(&ab.encrypt(b"data").unwrap()).unwrap();
    (ab, ba)
}

struct BenchNode {
    identity: Identity,
    dispatcher: Dispatcher,
    switch_rx: MessageRx,
    _tunnel_rx: MessageRx,
    _control_rx: MessageRx,
    _pinger_rx: MessageRx,
}

fn bench_node() -> BenchNode {
    let identity = Identity::generate();
    let (switch, switch_rx) = interface_channel(InterfaceKind::Switch, 1024);
    let (tunnel, tunnel_rx) = interface_channel(InterfaceKind::Tunnel, 1024);
    let (control, control_rx) = interface_channel(InterfaceKind::ControlPlane, 1024);
    let (pinger, pinger_rx) = interface_channel(InterfaceKind::SwitchPinger, 1024);
    let wiring = Wiring {
        switch: Box::new(switch),
        tunnel: Box::new(tunnel),
        control: Box::new(control),
        pinger: Box::new(pinger),
        router: Box::new(RouteTable::new()),
        channels: Box::new(SealedChannelFactory::new(&identity)),
    };
    let mut registry = ModuleRegistry::new();
    let dispatcher =
        Dispatcher::register(&identity, &SessionConfig::default(), wiring, &mut registry).unwrap();
    BenchNode {
        identity,
        dispatcher,
        switch_rx,
        _tunnel_rx: tunnel_rx,
        _control_rx: control_rx,
        _pinger_rx: pinger_rx,
    }
}

fn ip_packet(src: &Identity, dst: &Identity, size: usize) -> Vec<u8> {
    let payload = vec![0xab; size];
    let header = Ip6Header::new(src.address().ipv6(), dst.address().ipv6(), 17, size).unwrap();
    let mut packet = header.encode().to_vec();
    packet.extend_from_slice(&payload);
    packet
}

// ===== Channel Benchmarks =====

fn bench_channel(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");

    for size in SIZES {
        let payload = vec![0x5a; size];

        group.bench_with_input(BenchmarkId::new("encrypt", size), &payload, |b, payload| {
            let (mut ab, _) = established_pair();
            b.iter(|| ab.encrypt(black_box(payload)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("roundtrip", size), &payload, |b, payload| {
            let (mut ab, mut ba) = established_pair();
            b.iter(|| {
                let frame = ab.encrypt(black_box(payload)).unwrap();
                ba.decrypt(&frame).unwrap()
            })
        });
    }

    group.finish();
}

// ===== Dispatch Benchmarks =====

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for size in SIZES {
        group.bench_with_input(BenchmarkId::new("tunnel_to_switch", size), &size, |b, &size| {
            let mut a = bench_node();
            let peer = Identity::generate();
            a.dispatcher
                .router_mut()
                .learn(*peer.address(), SwitchLabel::new(0x13));
            let packet = ip_packet(&a.identity, &peer, size);

            b.iter(|| {
                a.dispatcher
                    .handle_inbound(Message::new(black_box(&packet)), InterfaceKind::Tunnel, 0)
                    .unwrap();
                a.switch_rx.try_recv().unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_channel, bench_dispatch);
criterion_main!(benches);
