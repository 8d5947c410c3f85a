#![deny(unused, dead_code)]
#![deny(clippy::all)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]

//! Photon - single-threaded MQTT 3.1 client.
//!
//! A long-lived connection manager that speaks the MQTT wire protocol
//! to a broker over TCP or TLS, publishes application messages,
//! delivers matching inbound publishes to subscription handlers, and
//! keeps the session alive with pings. Everything happens inside one
//! cooperative event loop sharing a single socket; there are no
//! background threads and no async runtime.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Connection settings and last-will configuration
//! - `core::log` - Logger capability (tracing-backed by default)
//! - `core::time` - Clock capability for keep-alive and retransmits
//!
//! ## Networking
//! - `net` - Broker address parsing (`tcp://`, `tls://`)
//! - `net::tls` - CA-bundle trust-store construction
//! - `net::transport` - Exact-length and best-effort reads, full writes
//!
//! ## Protocol
//! - `protocol::codec` - Remaining Length varint, strings, cursors
//! - `protocol::packets` - Frame builders and inbound body parsers
//!
//! ## Session
//! - `session` - Pending publishes/unsubscribes, subscriptions
//! - `session::store` - Pluggable session storage
//! - `session::topics` - `+`/`#` wildcard filter matching
//!
//! ## Client
//! - `client` - Handshake, operation surface, and the event loop
//!
//! # Example
//!
//! ```no_run
//! use photon::{Client, ConnectionSettings, Qos};
//!
//! # fn main() -> photon::Result<()> {
//! let mut client = Client::new("broker.local", 1883);
//! client.connect(ConnectionSettings::new().keep_alive(30), true)?;
//! client.subscribe(
//!     "sensors/+/temperature",
//!     |topic: &str, payload: &[u8]| {
//!         println!("{topic}: {}", String::from_utf8_lossy(payload));
//!     },
//!     Qos::AtLeastOnce,
//! )?;
//! client.publish("sensors/gw/online", b"1", Qos::AtLeastOnce, false)?;
//! client.run(true) // returns only on error
//! # }
//! ```

pub mod client;
pub mod core;
pub mod error;
pub mod net;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use self::core::config::{ConnectionSettings, LastWill};
pub use self::core::log::{Logger, NoopLogger, TracingLogger};
pub use self::core::time::{Clock, SystemClock};
pub use client::{Client, Progress};
pub use error::{AckKind, Error, Result};
pub use net::BrokerAddr;
pub use protocol::Qos;
pub use session::{
    InMemorySessionStore, MessageHandler, PendingPublish, PendingUnsubscribe, SessionStore,
    Subscription,
};
