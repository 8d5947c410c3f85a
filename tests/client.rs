//! Event-loop behavior over a scripted transport: keep-alive,
//! retransmission, acknowledgement handling, and shutdown.

mod common;

use common::{connected_client, connected_client_with, connected_client_with_store, SpyStore};
use photon::protocol::packets;
use photon::{AckKind, ConnectionSettings, Error, Progress, Qos};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn step_reports_idle_and_work() {
    let (mut client, wire, _clock) = connected_client(&[]);
    assert_eq!(client.step().unwrap(), Progress::Idle);

    wire.feed(&[0xD0, 0x00]); // PINGRESP
    assert_eq!(client.step().unwrap(), Progress::DidWork);
    assert_eq!(client.step().unwrap(), Progress::Idle);
}

#[test]
fn message_ids_increase_strictly() {
    let (mut client, wire, _clock) = connected_client(&[]);
    for expected_id in 1u16..=3 {
        client.publish("t", b"p", Qos::AtLeastOnce, false).unwrap();
        let expected =
            packets::publish("t", b"p", Qos::AtLeastOnce, false, false, Some(expected_id))
                .unwrap();
        assert_eq!(wire.sent(), expected);
    }
}

#[test]
fn stale_publish_is_retransmitted_with_dup_and_same_id() {
    // Keep-alive stays out of the way so only the sweep writes frames.
    let settings = ConnectionSettings::new().keep_alive(60);
    let (mut client, wire, clock) = connected_client_with(&[], false, settings);
    client.publish("t", b"p", Qos::AtLeastOnce, false).unwrap();
    wire.sent();

    // Under the resend timeout nothing happens.
    clock.advance(Duration::from_secs(5));
    client.step().unwrap();
    assert!(wire.sent().is_empty());

    clock.advance(Duration::from_secs(6));
    client.step().unwrap();
    let expected = packets::publish("t", b"p", Qos::AtLeastOnce, false, true, Some(1)).unwrap();
    assert_eq!(wire.sent(), expected);

    // The sweep runs at most once per wall-second.
    client.step().unwrap();
    assert!(wire.sent().is_empty());

    // Still unacknowledged: retransmitted again later, same id.
    clock.advance(Duration::from_secs(11));
    client.step().unwrap();
    assert_eq!(wire.sent(), expected);
}

#[test]
fn stale_unsubscribe_is_retransmitted_with_dup() {
    let settings = ConnectionSettings::new().keep_alive(60);
    let (mut client, wire, clock) = connected_client_with(&[], false, settings);
    client.unsubscribe("a/b").unwrap();
    wire.sent();

    clock.advance(Duration::from_secs(11));
    client.step().unwrap();
    let expected = packets::unsubscribe(1, "a/b", true).unwrap();
    assert_eq!(wire.sent(), expected);
}

#[test]
fn keep_alive_ping_fires_after_an_idle_window() {
    let (mut client, wire, clock) = connected_client(&[]);
    clock.advance(Duration::from_secs(9));
    client.step().unwrap();
    assert!(wire.sent().is_empty());

    clock.advance(Duration::from_secs(2));
    client.step().unwrap();
    assert_eq!(wire.sent(), [0xC0, 0x00]);

    // PINGRESP refreshes the window.
    wire.feed(&[0xD0, 0x00]);
    client.step().unwrap();
    wire.sent();
    clock.advance(Duration::from_secs(5));
    client.step().unwrap();
    assert!(wire.sent().is_empty());
}

#[test]
fn any_inbound_traffic_suppresses_the_keep_alive_ping() {
    let (mut client, wire, clock) = connected_client(&[]);
    clock.advance(Duration::from_secs(9));
    // A publish (any packet) counts as liveness.
    wire.feed(&[0x30, 0x04, 0x00, 0x01, 0x74, 0x21]);
    client.step().unwrap();
    wire.sent();

    clock.advance(Duration::from_secs(9));
    client.step().unwrap();
    assert!(wire.sent().is_empty(), "18s of wall time, but never 10s idle");
}

#[test]
fn broker_pingreq_gets_a_pingresp() {
    let (mut client, wire, _clock) = connected_client(&[0xC0, 0x00]);
    client.step().unwrap();
    assert_eq!(wire.sent(), [0xD0, 0x00]);
}

#[test]
fn stray_connack_mid_session_is_a_protocol_error() {
    let (mut client, _wire, _clock) = connected_client(&[0x20, 0x02, 0x00, 0x00]);
    let err = client.step().unwrap_err();
    assert!(matches!(err, Error::UnexpectedAck(AckKind::Connect)));
}

#[test]
fn inbound_qos1_publish_is_acknowledged_then_dispatched() {
    let (mut client, wire, _clock) = connected_client(&[]);
    let calls = Rc::new(RefCell::new(0u32));
    let seen = Rc::clone(&calls);
    client
        .subscribe("t", move |_: &str, _: &[u8]| *seen.borrow_mut() += 1, Qos::AtLeastOnce)
        .unwrap();
    wire.sent();

    let inbound = packets::publish("t", b"m", Qos::AtLeastOnce, false, false, Some(7)).unwrap();
    wire.feed(&inbound);
    client.step().unwrap();

    assert_eq!(wire.sent(), [0x40, 0x02, 0x00, 0x07]);
    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn wildcard_subscription_receives_matching_topics_only() {
    let (mut client, wire, _clock) = connected_client(&[]);
    let topics = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = Rc::clone(&topics);
    client
        .subscribe(
            "sensors/+/temp",
            move |topic: &str, _: &[u8]| sink.borrow_mut().push(topic.to_string()),
            Qos::AtMostOnce,
        )
        .unwrap();
    wire.sent();

    for topic in ["sensors/a/temp", "sensors/a/hum", "sensors/b/temp", "other"] {
        let frame = packets::publish(topic, b"1", Qos::AtMostOnce, false, false, None).unwrap();
        wire.feed(&frame);
        client.step().unwrap();
    }
    assert_eq!(*topics.borrow(), ["sensors/a/temp", "sensors/b/temp"]);
}

#[test]
fn suback_records_the_grant() {
    let (mut client, wire, _clock) = connected_client(&[]);
    client
        .subscribe("t", |_: &str, _: &[u8]| {}, Qos::AtLeastOnce)
        .unwrap();
    wire.sent();

    // Grant qos 1 for the single filter under message id 1.
    wire.feed(&[0x90, 0x03, 0x00, 0x01, 0x01]);
    client.step().unwrap();
}

#[test]
fn suback_grant_count_mismatch_is_a_protocol_error() {
    let (mut client, wire, _clock) = connected_client(&[]);
    client
        .subscribe("t", |_: &str, _: &[u8]| {}, Qos::AtLeastOnce)
        .unwrap();
    wire.sent();

    // Two grants for a one-filter subscribe.
    wire.feed(&[0x90, 0x04, 0x00, 0x01, 0x01, 0x00]);
    let err = client.step().unwrap_err();
    assert!(matches!(err, Error::UnexpectedAck(AckKind::Subscribe)));
}

#[test]
fn suback_for_an_unknown_message_id_is_a_protocol_error() {
    let (mut client, wire, _clock) = connected_client(&[]);
    wire.feed(&[0x90, 0x03, 0x00, 0x09, 0x00]);
    let err = client.step().unwrap_err();
    assert!(matches!(err, Error::UnexpectedAck(AckKind::Subscribe)));
}

#[test]
fn unsuback_clears_the_pending_unsubscribe_once() {
    let store = SpyStore::new();
    let (_, removed_unsubscribes) = store.handles();
    let (mut client, wire, _clock) = connected_client_with_store(&[], store);

    client.unsubscribe("a/b").unwrap();
    wire.sent();

    wire.feed(&[0xB0, 0x02, 0x00, 0x01]);
    client.step().unwrap();
    assert_eq!(*removed_unsubscribes.borrow(), [1]);

    wire.feed(&[0xB0, 0x02, 0x00, 0x01]);
    let err = client.step().unwrap_err();
    // The source tags stray UNSUBACKs with the publish context.
    assert!(matches!(err, Error::UnexpectedAck(AckKind::Publish)));
}

#[test]
fn close_sends_disconnect_and_releases_the_socket() {
    let (mut client, wire, _clock) = connected_client(&[]);
    client.close().unwrap();
    assert_eq!(wire.sent(), [0xE0, 0x00]);
    assert!(wire.write_shutdown.get());
    assert!(!client.is_connected());
    assert!(matches!(
        client.publish("t", b"p", Qos::AtMostOnce, false),
        Err(Error::TxData(_))
    ));
}

#[test]
fn peer_close_terminates_the_loop() {
    let (mut client, _wire, _clock) =
        connected_client_with(&[], true, ConnectionSettings::default());
    let err = client.run(true).unwrap_err();
    assert!(matches!(err, Error::RxData(_)));
}

#[test]
fn run_surfaces_dispatch_errors() {
    let (mut client, wire, _clock) = connected_client(&[]);
    // A PUBACK nothing is waiting for kills the loop.
    wire.feed(&[0x40, 0x02, 0x00, 0x09]);
    let err = client.run(true).unwrap_err();
    assert!(matches!(err, Error::UnexpectedAck(AckKind::Publish)));
}

#[test]
fn truncated_frame_is_an_rx_error() {
    // PUBLISH promising 7 body bytes, stream dies after 3.
    let (mut client, _wire, _clock) = connected_client_with(
        &[0x30, 0x07, 0x00, 0x03, 0x74],
        true,
        ConnectionSettings::default(),
    );
    let err = client.step().unwrap_err();
    assert!(matches!(err, Error::RxData(_)));
}
