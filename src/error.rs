use thiserror::Error;

/// Which acknowledgement path produced a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Connect,
    Publish,
    Subscribe,
}

impl std::fmt::Display for AckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AckKind::Connect => "connect",
            AckKind::Publish => "publish",
            AckKind::Subscribe => "subscribe",
        };
        write!(f, "{name}")
    }
}

/// Errors surfaced by the client.
///
/// Connection-phase failures abort `connect` without touching session
/// state; transport and acknowledgement errors terminate the event loop
/// and surface to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not be opened, the broker refused the
    /// CONNACK, or the handshake died on the wire.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An outgoing write failed, came up short, or hit a closed socket.
    #[error("transmit failed: {0}")]
    TxData(String),

    /// A read failed or the stream closed while decoding a packet.
    #[error("receive failed: {0}")]
    RxData(String),

    /// The broker acknowledged something we never asked about: a stray
    /// CONNACK mid-session, a PUBACK or UNSUBACK for an unknown message
    /// id, or a SUBACK whose grant count disagrees with the request.
    #[error("unexpected {0} acknowledgement")]
    UnexpectedAck(AckKind),
}

pub type Result<T> = std::result::Result<T, Error>;
