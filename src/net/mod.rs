//! Networking: broker address parsing, TLS trust-store construction,
//! and the byte transport the codec sits on.

pub mod tls;
pub mod transport;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 1883;

/// A broker endpoint: `tcp://host:port` or `tls://host:port`. A bare
/// `host` or `host:port` defaults to plaintext on port 1883.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddr {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddr {
    pub fn parse(url: &str) -> Result<BrokerAddr> {
        let (tls, rest) = if let Some(rest) = url.strip_prefix("tcp://") {
            (false, rest)
        } else if let Some(rest) = url.strip_prefix("tls://") {
            (true, rest)
        } else if url.contains("://") {
            return Err(Error::ConnectionFailed(format!(
                "unsupported scheme in broker url {url}"
            )));
        } else {
            (false, url)
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::ConnectionFailed(format!("invalid port in broker url {url}"))
                })?;
                (host, port)
            }
            None => (rest, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(Error::ConnectionFailed(format!(
                "missing host in broker url {url}"
            )));
        }

        Ok(BrokerAddr {
            host: host.to_string(),
            port,
            tls,
        })
    }
}
