//! Forwarding and routing tests over the simulated radio.
//!
//! Topologies are built by cutting bus links, e.g. `A -- R -- B` with
//! the direct A/B path severed so traffic must transit the router.

use super::*;
use crate::address::Address;
use crate::device::tests::{make_addr, run_network, Ghost, Recorder};
use crate::device::MeshDevice;
use crate::frame::{Frame, FrameType};
use crate::link::sim::{SimBus, SimDriver};
use crate::link::SendStatus;
use crate::MeshConfig;

fn make_leaf(bus: &SimBus, addr: Address) -> MeshDevice<SimDriver> {
    let mut device = MeshDevice::new(bus.attach(addr), MeshConfig::default());
    device.begin().unwrap();
    device
}

fn make_router(bus: &SimBus, addr: Address) -> MeshRouter<SimDriver> {
    let mut router = MeshRouter::router(bus.attach(addr), MeshConfig::default());
    router.begin().unwrap();
    router
}

// ============================================================================
// Forwarding
// ============================================================================

#[test]
fn test_one_hop_confirmed_delivery_through_router() {
    let bus = SimBus::new();
    let a_addr = make_addr(0xaa);
    let r_addr = make_addr(0x01);
    let b_addr = make_addr(0xbb);

    let mut a = make_leaf(&bus, a_addr);
    let mut r = make_router(&bus, r_addr);
    let mut b = make_leaf(&bus, b_addr);
    bus.cut_link(a_addr, b_addr);

    let a_rec = Recorder::new();
    a_rec.watch(&mut a);
    let b_rec = Recorder::new();
    b_rec.watch(&mut b);
    let r_rec = Recorder::new();
    r_rec.watch(&mut r);

    a.send_confirmed_message(&[0xde, 0xad], b_addr).unwrap();
    run_network(&bus, &mut [&mut a, &mut r, &mut b], 1000, 800);

    // delivered across the router, acked back across the router
    let messages = b_rec.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, FrameType::Confirmed);
    assert_eq!(messages[0].1, a_addr);
    assert_eq!(a_rec.statuses(), vec![SendStatus::Success]);

    // the transit frame was never the router's to deliver
    assert!(r_rec.messages().is_empty());
}

#[test]
fn test_forwarded_frame_ttl_decrements() {
    let bus = SimBus::new();
    let r_addr = make_addr(0x01);
    let src = make_addr(0x0a);
    let dst = make_addr(0x0b);

    let mut ghost = Ghost::attach(&bus, make_addr(0x99));
    let mut r = make_router(&bus, r_addr);

    let frame = Frame::new(0, FrameType::Unconfirmed, 7, 3, src, dst, vec![1]).unwrap();
    ghost.transmit(&frame);
    run_network(&bus, &mut [&mut ghost, &mut r], 1000, 300);

    let forwarded: Vec<Frame> = ghost
        .frames()
        .into_iter()
        .filter(|f| f.src_addr == src)
        .collect();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].hop_count, 2);
    assert_eq!(forwarded[0].id, 7);
    assert_eq!(forwarded[0].payload, vec![1]);
}

#[test]
fn test_ttl_exhausted_frame_not_forwarded() {
    let bus = SimBus::new();
    let mut ghost = Ghost::attach(&bus, make_addr(0x99));
    let mut r = make_router(&bus, make_addr(0x01));

    let frame = Frame::new(
        0,
        FrameType::Unconfirmed,
        7,
        1, // one hop left: spent on reaching the router
        make_addr(0x0a),
        make_addr(0x0b),
        vec![1],
    )
    .unwrap();
    ghost.transmit(&frame);
    run_network(&bus, &mut [&mut ghost, &mut r], 1000, 300);

    assert!(ghost.frames().is_empty());
}

#[test]
fn test_ttl_one_frame_still_delivered_to_router_itself() {
    let bus = SimBus::new();
    let r_addr = make_addr(0x01);
    let mut ghost = Ghost::attach(&bus, make_addr(0x99));
    let mut r = make_router(&bus, r_addr);
    let r_rec = Recorder::new();
    r_rec.watch(&mut r);

    let frame =
        Frame::new(0, FrameType::Unconfirmed, 7, 1, make_addr(0x0a), r_addr, vec![5]).unwrap();
    ghost.transmit(&frame);
    run_network(&bus, &mut [&mut ghost, &mut r], 1000, 300);

    let messages = r_rec.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].2, vec![5]);
}

#[test]
fn test_duplicate_frame_forwarded_once() {
    let bus = SimBus::new();
    let mut ghost = Ghost::attach(&bus, make_addr(0x99));
    let mut r = make_router(&bus, make_addr(0x01));

    let frame = Frame::new(
        0,
        FrameType::Unconfirmed,
        7,
        3,
        make_addr(0x0a),
        make_addr(0x0b),
        vec![1],
    )
    .unwrap();

    ghost.transmit(&frame);
    let now = run_network(&bus, &mut [&mut ghost, &mut r], 1000, 300);
    ghost.transmit(&frame);
    run_network(&bus, &mut [&mut ghost, &mut r], now, 300);

    let forwarded: Vec<Frame> = ghost
        .frames()
        .into_iter()
        .filter(|f| f.src_addr == make_addr(0x0a))
        .collect();
    assert_eq!(forwarded.len(), 1);
}

#[test]
fn test_ttl_exhaustion_blocks_end_to_end_delivery() {
    let bus = SimBus::new();
    let a_addr = make_addr(0xaa);
    let r_addr = make_addr(0x01);
    let b_addr = make_addr(0xbb);

    // sender configured with a budget of one hop
    let mut config = MeshConfig::default();
    config.initial_hop_count = 1;
    let mut a = MeshDevice::new(bus.attach(a_addr), config);
    a.begin().unwrap();
    let mut r = make_router(&bus, r_addr);
    let mut b = make_leaf(&bus, b_addr);
    bus.cut_link(a_addr, b_addr);

    let b_rec = Recorder::new();
    b_rec.watch(&mut b);

    a.send_message(&[1], b_addr).unwrap();
    run_network(&bus, &mut [&mut a, &mut r, &mut b], 1000, 500);

    assert!(b_rec.messages().is_empty());
}

// ============================================================================
// Route learning
// ============================================================================

#[test]
fn test_routes_learned_from_observed_traffic() {
    let bus = SimBus::new();
    let r_addr = make_addr(0x01);
    let neighbor = make_addr(0x99);
    let far_src = make_addr(0x0a);

    let mut ghost = Ghost::attach(&bus, neighbor);
    let mut r = make_router(&bus, r_addr);

    // direct frame from the neighbor itself: distance 1
    let direct =
        Frame::new(0, FrameType::Unconfirmed, 1, 3, neighbor, r_addr, vec![]).unwrap();
    ghost.transmit(&direct);
    let now = run_network(&bus, &mut [&mut ghost, &mut r], 1000, 100);

    // frame originated two hops away, already forwarded once
    let relayed =
        Frame::new(0, FrameType::Unconfirmed, 2, 2, far_src, r_addr, vec![]).unwrap();
    ghost.transmit(&relayed);
    run_network(&bus, &mut [&mut ghost, &mut r], now, 100);

    let table = r.routing().table();
    let entry = table.get(&neighbor).unwrap();
    assert_eq!(entry.link, neighbor);
    assert_eq!(entry.hops, 1);

    let entry = table.get(&far_src).unwrap();
    assert_eq!(entry.link, neighbor); // reached through the immediate sender
    assert_eq!(entry.hops, 2);
}

#[test]
fn test_learned_route_used_for_unicast_forwarding() {
    let bus = SimBus::new();
    let r_addr = make_addr(0x01);
    let b_addr = make_addr(0xbb);

    let mut ghost = Ghost::attach(&bus, make_addr(0x99));
    let mut r = make_router(&bus, r_addr);
    let mut b = make_leaf(&bus, b_addr);

    // teach the router where b is
    b.send_message(&[0], r_addr).unwrap();
    let now = run_network(&bus, &mut [&mut ghost, &mut r, &mut b], 1000, 300);
    assert!(r.routing().table().get(&b_addr).is_some());

    // a foreign frame for b now goes out unicast: the ghost, not being
    // the addressee, no longer overhears the forward
    ghost.received.clear();
    let frame = Frame::new(
        0,
        FrameType::Unconfirmed,
        9,
        3,
        make_addr(0x0a),
        b_addr,
        vec![3],
    )
    .unwrap();
    ghost.transmit(&frame);
    let b_rec = Recorder::new();
    b_rec.watch(&mut b);
    run_network(&bus, &mut [&mut ghost, &mut r, &mut b], now, 400);

    assert_eq!(b_rec.messages().len(), 1);
    let overheard: Vec<Frame> = ghost
        .frames()
        .into_iter()
        .filter(|f| f.src_addr == make_addr(0x0a))
        .collect();
    assert!(overheard.is_empty());
}

#[test]
fn test_routing_table_ages_out() {
    let bus = SimBus::new();
    let r_addr = make_addr(0x01);
    let neighbor = make_addr(0x99);

    let mut ghost = Ghost::attach(&bus, neighbor);
    let mut r = make_router(&bus, r_addr);

    let frame = Frame::new(0, FrameType::Unconfirmed, 1, 3, neighbor, r_addr, vec![]).unwrap();
    ghost.transmit(&frame);
    let now = run_network(&bus, &mut [&mut ghost, &mut r], 1000, 300);
    assert_eq!(r.routing().table().len(), 1);

    // outlive the 10 s route TTL with no refreshing traffic
    run_network(&bus, &mut [&mut ghost, &mut r], now, 11_000);
    assert!(r.routing().table().is_empty());
}

#[test]
fn test_router_does_not_learn_its_own_frames() {
    let bus = SimBus::new();
    let r_addr = make_addr(0x01);
    let mut ghost = Ghost::attach(&bus, make_addr(0x99));
    let mut r = make_router(&bus, r_addr);

    // an echo of the router's own transmission (e.g. a rebroadcast)
    let echo = Frame::new(0, FrameType::Unconfirmed, 1, 2, r_addr, make_addr(0x0b), vec![])
        .unwrap();
    ghost.transmit(&echo);
    run_network(&bus, &mut [&mut ghost, &mut r], 1000, 200);

    assert!(r.routing().table().get(&r_addr).is_none());
}
