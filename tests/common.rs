//! Common test harness: a scripted byte stream standing in for the
//! broker socket, a manually advanced clock, and a session store that
//! records what the client does to it.

// Not all test files use all helpers; silence dead_code warnings for
// unused exports.
#![allow(dead_code)]

use photon::net::transport::Stream;
use photon::session::{PendingPublish, PendingUnsubscribe, Subscription};
use photon::{Client, Clock, ConnectionSettings, InMemorySessionStore, SessionStore};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// The accepted CONNACK every handshake script starts with.
pub const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

/// A byte stream driven from a script: reads pop from the inbound
/// queue, writes accumulate in a shared buffer. An empty queue reads as
/// "no data yet" (would-block) unless `eof_when_drained` is set, in
/// which case it reads as the peer closing the connection.
pub struct ScriptedStream {
    inbound: Rc<RefCell<VecDeque<u8>>>,
    outbound: Rc<RefCell<Vec<u8>>>,
    eof_when_drained: bool,
    write_shutdown: Rc<Cell<bool>>,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.borrow_mut();
        if inbound.is_empty() {
            if self.eof_when_drained {
                return Ok(0);
            }
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let mut n = 0;
        while n < buf.len() {
            match inbound.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for ScriptedStream {
    fn set_nonblocking(&mut self, _nonblocking: bool) -> io::Result<()> {
        Ok(())
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.write_shutdown.set(true);
        Ok(())
    }
}

/// Shared handles into a [`ScriptedStream`] after it has been moved
/// into the client.
pub struct Wire {
    pub inbound: Rc<RefCell<VecDeque<u8>>>,
    outbound: Rc<RefCell<Vec<u8>>>,
    pub write_shutdown: Rc<Cell<bool>>,
}

impl Wire {
    /// Queue bytes for the client to read.
    pub fn feed(&self, bytes: &[u8]) {
        self.inbound.borrow_mut().extend(bytes.iter().copied());
    }

    /// Take and clear everything the client has written so far.
    pub fn sent(&self) -> Vec<u8> {
        std::mem::take(&mut *self.outbound.borrow_mut())
    }
}

pub fn scripted_stream(script: &[u8], eof_when_drained: bool) -> (ScriptedStream, Wire) {
    let inbound = Rc::new(RefCell::new(script.iter().copied().collect::<VecDeque<u8>>()));
    let outbound = Rc::new(RefCell::new(Vec::new()));
    let write_shutdown = Rc::new(Cell::new(false));
    let stream = ScriptedStream {
        inbound: Rc::clone(&inbound),
        outbound: Rc::clone(&outbound),
        eof_when_drained,
        write_shutdown: Rc::clone(&write_shutdown),
    };
    let wire = Wire {
        inbound,
        outbound,
        write_shutdown,
    };
    (stream, wire)
}

/// Manually advanced clock; `sleep` advances it so a driven loop makes
/// time progress deterministically.
#[derive(Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn start() -> ManualClock {
        ManualClock {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Session store that delegates to the in-memory default while
/// recording removals, so tests can assert acknowledgement effects
/// after the store has been moved into the client.
#[derive(Default)]
pub struct SpyStore {
    inner: InMemorySessionStore,
    pub removed_publishes: Rc<RefCell<Vec<u16>>>,
    pub removed_unsubscribes: Rc<RefCell<Vec<u16>>>,
}

impl SpyStore {
    pub fn new() -> SpyStore {
        SpyStore::default()
    }

    pub fn handles(&self) -> (Rc<RefCell<Vec<u16>>>, Rc<RefCell<Vec<u16>>>) {
        (
            Rc::clone(&self.removed_publishes),
            Rc::clone(&self.removed_unsubscribes),
        )
    }
}

impl SessionStore for SpyStore {
    fn add_pending_publish(&mut self, record: PendingPublish) {
        self.inner.add_pending_publish(record);
    }

    fn remove_pending_publish(&mut self, message_id: u16) -> bool {
        let removed = self.inner.remove_pending_publish(message_id);
        if removed {
            self.removed_publishes.borrow_mut().push(message_id);
        }
        removed
    }

    fn pending_publishes_last_sent_before(
        &mut self,
        cutoff: Instant,
    ) -> Vec<&mut PendingPublish> {
        self.inner.pending_publishes_last_sent_before(cutoff)
    }

    fn add_pending_unsubscribe(&mut self, record: PendingUnsubscribe) {
        self.inner.add_pending_unsubscribe(record);
    }

    fn remove_pending_unsubscribe(&mut self, message_id: u16) -> bool {
        let removed = self.inner.remove_pending_unsubscribe(message_id);
        if removed {
            self.removed_unsubscribes.borrow_mut().push(message_id);
        }
        removed
    }

    fn pending_unsubscribes_last_sent_before(
        &mut self,
        cutoff: Instant,
    ) -> Vec<&mut PendingUnsubscribe> {
        self.inner.pending_unsubscribes_last_sent_before(cutoff)
    }

    fn add_subscription(&mut self, subscription: Subscription) {
        self.inner.add_subscription(subscription);
    }

    fn subscriptions_matching(&mut self, topic: &str) -> Vec<&mut Subscription> {
        self.inner.subscriptions_matching(topic)
    }

    fn subscriptions_with_message_id(&mut self, message_id: u16) -> Vec<&mut Subscription> {
        self.inner.subscriptions_with_message_id(message_id)
    }

    fn has_inflight(&self, message_id: u16) -> bool {
        self.inner.has_inflight(message_id)
    }
}

/// A client connected over a scripted stream: handshake already done,
/// the CONNECT frame drained from the outbound capture.
pub fn connected_client(script_after_connack: &[u8]) -> (Client, Wire, ManualClock) {
    connected_client_with(script_after_connack, false, ConnectionSettings::default())
}

pub fn connected_client_with(
    script_after_connack: &[u8],
    eof_when_drained: bool,
    settings: ConnectionSettings,
) -> (Client, Wire, ManualClock) {
    connected_client_full(
        script_after_connack,
        eof_when_drained,
        settings,
        InMemorySessionStore::new(),
    )
}

/// Same, with a caller-supplied session store (keep any inspection
/// handles before the store moves into the client).
pub fn connected_client_with_store(
    script_after_connack: &[u8],
    store: impl SessionStore + 'static,
) -> (Client, Wire, ManualClock) {
    connected_client_full(
        script_after_connack,
        false,
        ConnectionSettings::default(),
        store,
    )
}

fn connected_client_full(
    script_after_connack: &[u8],
    eof_when_drained: bool,
    settings: ConnectionSettings,
    store: impl SessionStore + 'static,
) -> (Client, Wire, ManualClock) {
    let mut script = CONNACK_OK.to_vec();
    script.extend_from_slice(script_after_connack);
    let (stream, wire) = scripted_stream(&script, eof_when_drained);
    let clock = ManualClock::start();

    let mut client = Client::new("scripted", 1883)
        .with_client_id("test-client")
        .with_logger(photon::NoopLogger)
        .with_store(store)
        .with_clock(clock.clone());
    client
        .handshake(Box::new(stream), settings, false)
        .expect("scripted handshake");
    wire.sent(); // discard the CONNECT frame
    (client, wire, clock)
}
