//! The MQTT client: connection handshake, the publish/subscribe
//! operation surface, and the single-threaded cooperative event loop
//! that owns the socket.

use crate::core::config::ConnectionSettings;
use crate::core::log::{Logger, TracingLogger};
use crate::core::time::{Clock, SystemClock};
use crate::error::{AckKind, Error, Result};
use crate::net::transport::{open_stream, Stream, Transport};
use crate::net::BrokerAddr;
use crate::protocol::{codec, packets, PacketType, Qos};
use crate::session::{
    InMemorySessionStore, MessageHandler, PendingPublish, PendingUnsubscribe, SessionStore,
    Subscription,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

const IDLE_SLEEP: Duration = Duration::from_millis(100);
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a single event-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// A packet was read and dispatched.
    DidWork,
    /// No traffic was available.
    Idle,
}

/// An MQTT 3.1 client over a single blocking socket.
///
/// All progress is cooperative: packets are read, dispatched, and
/// acknowledged on whatever thread drives [`Client::run`] or
/// [`Client::step`]. The client is not thread-safe; the operation
/// surface and the loop must be called from one thread or synchronized
/// externally.
pub struct Client {
    addr: BrokerAddr,
    client_id: String,
    ca_file: Option<PathBuf>,
    transport: Transport,
    store: Box<dyn SessionStore>,
    logger: Box<dyn Logger>,
    clock: Box<dyn Clock>,
    settings: ConnectionSettings,
    next_message_id: u16,
    /// Stamped on connect and on every inbound packet; despite the
    /// name, its job is keep-alive scheduling: PINGREQ fires only after
    /// a fully idle window.
    last_ping_at: Option<Instant>,
    last_sweep_at: Option<Instant>,
}

impl Client {
    /// Plaintext client for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Client {
        Client::with_addr(BrokerAddr {
            host: host.into(),
            port,
            tls: false,
        })
    }

    /// Client for a `tcp://` or `tls://` broker url.
    pub fn from_url(url: &str) -> Result<Client> {
        Ok(Client::with_addr(BrokerAddr::parse(url)?))
    }

    fn with_addr(addr: BrokerAddr) -> Client {
        let client_id = generated_client_id();
        Client {
            addr,
            client_id,
            ca_file: None,
            transport: Transport::disconnected(),
            store: Box::new(InMemorySessionStore::new()),
            logger: Box::new(TracingLogger),
            clock: Box::new(SystemClock),
            settings: ConnectionSettings::default(),
            next_message_id: 1,
            last_ping_at: None,
            last_sweep_at: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Client {
        self.client_id = client_id.into();
        self
    }

    /// Trust the CAs in the given PEM bundle and speak TLS to the
    /// broker.
    pub fn with_ca_file(mut self, ca_file: impl Into<PathBuf>) -> Client {
        self.ca_file = Some(ca_file.into());
        self.addr.tls = true;
        self
    }

    pub fn with_store(mut self, store: impl SessionStore + 'static) -> Client {
        self.store = Box::new(store);
        self
    }

    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Client {
        self.logger = Box::new(logger);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Client {
        self.clock = Box::new(clock);
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Open the socket and perform the CONNECT/CONNACK handshake.
    ///
    /// Failure at any point releases the socket and leaves session
    /// state untouched.
    pub fn connect(&mut self, settings: ConnectionSettings, clean_session: bool) -> Result<()> {
        if self.transport.is_open() {
            return Err(Error::ConnectionFailed("already connected".into()));
        }
        let stream = open_stream(&self.addr, self.ca_file.as_deref(), &settings)?;
        self.handshake(stream, settings, clean_session)
    }

    /// Perform the handshake over an already-open stream. This is the
    /// seam [`Client::connect`] goes through; embedders and tests can
    /// supply their own transport here.
    pub fn handshake(
        &mut self,
        stream: Box<dyn Stream>,
        settings: ConnectionSettings,
        clean_session: bool,
    ) -> Result<()> {
        self.transport.attach(stream);
        match self.exchange_connect(&settings, clean_session) {
            Ok(()) => {
                self.settings = settings;
                self.last_ping_at = Some(self.clock.now());
                self.logger.info(
                    "connected",
                    &[
                        ("host", &self.addr.host),
                        ("port", &self.addr.port),
                        ("client_id", &self.client_id),
                    ],
                );
                Ok(())
            }
            Err(e) => {
                self.transport.detach();
                Err(e)
            }
        }
    }

    fn exchange_connect(
        &mut self,
        settings: &ConnectionSettings,
        clean_session: bool,
    ) -> Result<()> {
        let frame = packets::connect(settings, &self.client_id, clean_session)?;
        self.transport
            .write_all(&frame)
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;

        let ack = self
            .transport
            .read(4, true)
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
        if ack.len() != 4 {
            return Err(Error::ConnectionFailed(
                "stream closed before CONNACK".into(),
            ));
        }
        if ack[0] >> 4 != 2 {
            return Err(Error::ConnectionFailed(format!(
                "expected CONNACK, got packet type {}",
                ack[0] >> 4
            )));
        }
        if ack[3] != 0x00 {
            return Err(Error::ConnectionFailed(format!(
                "broker refused connection with code {}",
                ack[3]
            )));
        }
        Ok(())
    }

    /// Publish a message. A qos 1 publish registers a pending record
    /// (retransmitted until its PUBACK) before the first transmission;
    /// the acknowledgement itself is handled by the event loop.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retain: bool) -> Result<()> {
        if !self.transport.is_open() {
            return Err(Error::TxData("socket closed".into()));
        }
        if qos == Qos::ExactlyOnce {
            return Err(Error::TxData("qos 2 publishes are not supported".into()));
        }

        let message_id = if qos == Qos::AtLeastOnce {
            let id = self.allocate_message_id()?;
            self.store.add_pending_publish(PendingPublish {
                message_id: id,
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
                retain,
                last_sent_at: self.clock.now(),
                sending_attempts: 1,
            });
            Some(id)
        } else {
            None
        };

        let frame = packets::publish(topic, payload, qos, retain, false, message_id)?;
        self.transport.write_all(&frame)?;
        self.logger.debug(
            "published",
            &[
                ("topic", &topic),
                ("bytes", &payload.len()),
                ("qos", &qos.bits()),
            ],
        );
        Ok(())
    }

    /// Subscribe to a topic filter. The subscription (and its handler)
    /// is registered immediately; the SUBACK grant recorded by the
    /// event loop fills in `acknowledged_qos`.
    pub fn subscribe(
        &mut self,
        topic_filter: &str,
        handler: impl MessageHandler + 'static,
        qos: Qos,
    ) -> Result<()> {
        if !self.transport.is_open() {
            return Err(Error::TxData("socket closed".into()));
        }
        let message_id = self.allocate_message_id()?;
        self.store.add_subscription(Subscription {
            topic_filter: topic_filter.to_string(),
            qos,
            handler: Box::new(handler),
            message_id,
            acknowledged_qos: None,
        });

        let frame = packets::subscribe(message_id, topic_filter, qos)?;
        self.transport.write_all(&frame)?;
        self.logger
            .info("subscribed", &[("filter", &topic_filter), ("qos", &qos.bits())]);
        Ok(())
    }

    /// Ask the broker to drop a filter. Retransmitted until the
    /// matching UNSUBACK arrives.
    pub fn unsubscribe(&mut self, topic_filter: &str) -> Result<()> {
        if !self.transport.is_open() {
            return Err(Error::TxData("socket closed".into()));
        }
        let message_id = self.allocate_message_id()?;
        self.store.add_pending_unsubscribe(PendingUnsubscribe {
            message_id,
            topic_filter: topic_filter.to_string(),
            last_sent_at: self.clock.now(),
            sending_attempts: 1,
        });

        let frame = packets::unsubscribe(message_id, topic_filter, false)?;
        self.transport.write_all(&frame)?;
        self.logger
            .info("unsubscribe requested", &[("filter", &topic_filter)]);
        Ok(())
    }

    pub fn ping(&mut self) -> Result<()> {
        self.transport.write_all(&packets::pingreq())?;
        self.logger.debug("pingreq sent", &[]);
        Ok(())
    }

    /// Send DISCONNECT and shut down the writable half of the stream.
    pub fn disconnect(&mut self) -> Result<()> {
        self.transport.write_all(&packets::disconnect())?;
        self.transport.shutdown_write()
    }

    /// Orderly shutdown: DISCONNECT, writable-half shutdown, socket
    /// release. The socket is released even when the farewell fails.
    pub fn close(&mut self) -> Result<()> {
        let farewell = self.disconnect();
        self.transport.detach();
        self.last_ping_at = None;
        self.logger.info("closed", &[]);
        farewell
    }

    /// Drive the loop until an error surfaces. `allow_sleep` enables a
    /// 100 ms sleep on idle iterations; disable it when embedding the
    /// client in an outer poll loop.
    pub fn run(&mut self, allow_sleep: bool) -> Result<()> {
        loop {
            if self.step()? == Progress::Idle && allow_sleep {
                self.clock.sleep(IDLE_SLEEP);
            }
        }
    }

    /// One cooperative iteration: read and dispatch at most one packet,
    /// then service the keep-alive and retransmit timers.
    pub fn step(&mut self) -> Result<Progress> {
        let first = self.transport.read(1, false)?;
        let progress = match first.first() {
            Some(&first_byte) => {
                self.dispatch_packet(first_byte)?;
                self.last_ping_at = Some(self.clock.now());
                Progress::DidWork
            }
            None => Progress::Idle,
        };

        self.check_keep_alive()?;
        self.sweep_retransmits()?;
        Ok(progress)
    }

    fn dispatch_packet(&mut self, first_byte: u8) -> Result<()> {
        let remaining = self.read_remaining_length()?;
        let body = self.transport.read(remaining, true)?;
        if body.len() != remaining {
            return Err(Error::RxData("stream closed mid-frame".into()));
        }

        let nibble = first_byte >> 4;
        let packet_type = PacketType::from_nibble(nibble)
            .ok_or_else(|| Error::RxData(format!("unsupported packet type {nibble}")))?;
        match packet_type {
            PacketType::ConnAck => {
                self.logger.error("stray CONNACK mid-session", &[]);
                Err(Error::UnexpectedAck(AckKind::Connect))
            }
            PacketType::Publish => self.handle_publish(first_byte & 0x0F, &body),
            PacketType::PubAck => {
                let message_id = packets::parse_message_id(&body)?;
                if !self.store.remove_pending_publish(message_id) {
                    self.logger
                        .error("puback for unknown message", &[("message_id", &message_id)]);
                    return Err(Error::UnexpectedAck(AckKind::Publish));
                }
                self.logger
                    .debug("publish acknowledged", &[("message_id", &message_id)]);
                Ok(())
            }
            PacketType::SubAck => self.handle_suback(&body),
            PacketType::UnsubAck => {
                let message_id = packets::parse_message_id(&body)?;
                if !self.store.remove_pending_unsubscribe(message_id) {
                    self.logger
                        .error("unsuback for unknown message", &[("message_id", &message_id)]);
                    return Err(Error::UnexpectedAck(AckKind::Publish));
                }
                self.logger
                    .debug("unsubscribe acknowledged", &[("message_id", &message_id)]);
                Ok(())
            }
            PacketType::PingReq => self.transport.write_all(&packets::pingresp()),
            PacketType::PingResp => {
                self.last_ping_at = Some(self.clock.now());
                self.logger.debug("pingresp received", &[]);
                Ok(())
            }
        }
    }

    fn handle_publish(&mut self, flags: u8, body: &[u8]) -> Result<()> {
        let publish = packets::parse_publish(flags, body)?;

        // At-least-once inbound deliveries are acknowledged before the
        // handlers run; the parser only yields a message id above qos 0.
        if let Some(message_id) = publish.message_id {
            self.transport.write_all(&packets::puback(message_id))?;
        }

        let mut delivered = 0usize;
        for subscription in self.store.subscriptions_matching(&publish.topic) {
            subscription.handler.handle(&publish.topic, &publish.payload);
            delivered += 1;
        }
        self.logger.debug(
            "publish dispatched",
            &[
                ("topic", &publish.topic),
                ("bytes", &publish.payload.len()),
                ("handlers", &delivered),
            ],
        );
        Ok(())
    }

    fn handle_suback(&mut self, body: &[u8]) -> Result<()> {
        let (message_id, grants) = packets::parse_suback(body)?;
        let subscriptions = self.store.subscriptions_with_message_id(message_id);
        if subscriptions.len() != grants.len() {
            self.logger.error(
                "suback grant count mismatch",
                &[
                    ("message_id", &message_id),
                    ("granted", &grants.len()),
                    ("requested", &subscriptions.len()),
                ],
            );
            return Err(Error::UnexpectedAck(AckKind::Subscribe));
        }
        for (subscription, &grant) in subscriptions.into_iter().zip(grants) {
            subscription.acknowledged_qos = Qos::from_bits(grant & 0x03);
        }
        self.logger
            .debug("subscription acknowledged", &[("message_id", &message_id)]);
        Ok(())
    }

    fn read_remaining_length(&mut self) -> Result<usize> {
        let mut multiplier = 1usize;
        let mut value = 0usize;
        loop {
            let byte = self.transport.read(1, true)?;
            let byte = *byte
                .first()
                .ok_or_else(|| Error::RxData("stream closed while decoding length".into()))?;
            value += (byte as usize & 0x7F) * multiplier;
            if value > codec::MAX_REMAINING_LENGTH {
                return Err(Error::RxData("remaining length out of range".into()));
            }
            if byte & 0x80 == 0 {
                break;
            }
            multiplier *= 128;
            if multiplier > 128 * 128 * 128 {
                return Err(Error::RxData("remaining length longer than four bytes".into()));
            }
        }
        Ok(value)
    }

    fn check_keep_alive(&mut self) -> Result<()> {
        let Some(last) = self.last_ping_at else {
            return Ok(());
        };
        let idle = self.clock.now().saturating_duration_since(last);
        if idle.as_secs() > u64::from(self.settings.keep_alive_seconds) {
            self.ping()?;
        }
        Ok(())
    }

    /// Retransmit pending publishes and unsubscribes whose last
    /// transmission is older than the resend timeout, DUP bit set. Runs
    /// at most once per wall-second.
    fn sweep_retransmits(&mut self) -> Result<()> {
        let now = self.clock.now();
        if let Some(last) = self.last_sweep_at {
            if now.saturating_duration_since(last) < SWEEP_INTERVAL {
                return Ok(());
            }
        }
        self.last_sweep_at = Some(now);

        let Some(cutoff) = now.checked_sub(Duration::from_secs(self.settings.resend_timeout_seconds))
        else {
            return Ok(());
        };

        for record in self.store.pending_publishes_last_sent_before(cutoff) {
            let frame = packets::publish(
                &record.topic,
                &record.payload,
                record.qos,
                record.retain,
                true,
                Some(record.message_id),
            )?;
            self.transport.write_all(&frame)?;
            record.last_sent_at = now;
            record.sending_attempts += 1;
            self.logger.notice(
                "publish retransmitted",
                &[
                    ("message_id", &record.message_id),
                    ("attempts", &record.sending_attempts),
                ],
            );
        }

        for record in self.store.pending_unsubscribes_last_sent_before(cutoff) {
            let frame = packets::unsubscribe(record.message_id, &record.topic_filter, true)?;
            self.transport.write_all(&frame)?;
            record.last_sent_at = now;
            record.sending_attempts += 1;
            self.logger.notice(
                "unsubscribe retransmitted",
                &[
                    ("message_id", &record.message_id),
                    ("attempts", &record.sending_attempts),
                ],
            );
        }

        Ok(())
    }

    /// Allocate the next message id: strictly increasing, wrapping at
    /// 65535, skipping ids that still identify a pending record.
    fn allocate_message_id(&mut self) -> Result<u16> {
        for _ in 0..=u16::MAX as u32 {
            let id = self.next_message_id;
            self.next_message_id = if id == u16::MAX { 1 } else { id + 1 };
            if !self.store.has_inflight(id) {
                return Ok(id);
            }
        }
        Err(Error::TxData("no free message identifiers".into()))
    }
}

fn generated_client_id() -> String {
    // 3.1 brokers may reject ids above 23 bytes; "photon-" plus half a
    // uuid stays inside that.
    let uuid = Uuid::new_v4().simple().to_string();
    format!("photon-{}", &uuid[..16])
}
