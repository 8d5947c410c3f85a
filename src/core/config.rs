use crate::protocol::Qos;
use serde::{Deserialize, Serialize};

fn default_keep_alive() -> u16 {
    10
}

fn default_socket_timeout() -> u64 {
    5
}

fn default_resend_timeout() -> u64 {
    10
}

fn default_block_socket() -> bool {
    true
}

/// A message the broker publishes on the client's behalf when it detects
/// an ungraceful disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastWill {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
}

/// Connection-level options advertised during the handshake and consumed
/// by the event loop's timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Maximum idle interval before a PINGREQ must be sent; advertised in
    /// CONNECT so the broker applies the same window.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u16,
    /// Read timeout applied to the underlying socket.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_seconds: u64,
    /// Age beyond which unacknowledged publishes and unsubscribes are
    /// retransmitted with the DUP flag.
    #[serde(default = "default_resend_timeout")]
    pub resend_timeout_seconds: u64,
    /// Whether the socket is configured blocking for full-frame reads.
    #[serde(default = "default_block_socket")]
    pub block_socket: bool,
    #[serde(default)]
    pub last_will: Option<LastWill>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<Vec<u8>>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            keep_alive_seconds: default_keep_alive(),
            socket_timeout_seconds: default_socket_timeout(),
            resend_timeout_seconds: default_resend_timeout(),
            block_socket: default_block_socket(),
            last_will: None,
            username: None,
            password: None,
        }
    }
}

impl ConnectionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive_seconds = seconds;
        self
    }

    pub fn socket_timeout(mut self, seconds: u64) -> Self {
        self.socket_timeout_seconds = seconds;
        self
    }

    pub fn resend_timeout(mut self, seconds: u64) -> Self {
        self.resend_timeout_seconds = seconds;
        self
    }

    pub fn blocking(mut self, block_socket: bool) -> Self {
        self.block_socket = block_socket;
        self
    }

    pub fn last_will(mut self, will: LastWill) -> Self {
        self.last_will = Some(will);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }
}
