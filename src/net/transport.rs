//! Byte transport over a connected stream. Knows nothing about MQTT
//! framing: it offers full writes, exact-length blocking reads, and a
//! best-effort single read the event loop uses to poll for traffic.

use crate::core::config::ConnectionSettings;
use crate::error::{Error, Result};
use crate::net::tls::client_config_from_ca_file;
use crate::net::BrokerAddr;
use rustls::{ClientConnection, ServerName, StreamOwned};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// The byte stream the transport drives. Implemented for plain TCP and
/// TLS sockets; tests substitute scripted streams.
pub trait Stream: Read + Write {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;
    fn shutdown_write(&mut self) -> io::Result<()>;
}

impl Stream for TcpStream {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl Stream for StreamOwned<ClientConnection, TcpStream> {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.sock.set_nonblocking(nonblocking)
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.conn.send_close_notify();
        let _ = self.conn.write_tls(&mut self.sock);
        self.sock.shutdown(Shutdown::Write)
    }
}

/// Open a broker socket per the settings: TCP connect, read timeout from
/// `socket_timeout_seconds`, optional TLS with CA-file verification.
pub fn open_stream(
    addr: &BrokerAddr,
    ca_file: Option<&Path>,
    settings: &ConnectionSettings,
) -> Result<Box<dyn Stream>> {
    let sock = TcpStream::connect((addr.host.as_str(), addr.port)).map_err(|e| {
        Error::ConnectionFailed(format!("connect {}:{}: {e}", addr.host, addr.port))
    })?;
    if settings.block_socket {
        let timeout = Duration::from_secs(settings.socket_timeout_seconds);
        sock.set_read_timeout(Some(timeout))
            .map_err(|e| Error::ConnectionFailed(format!("set read timeout: {e}")))?;
    } else {
        sock.set_nonblocking(true)
            .map_err(|e| Error::ConnectionFailed(format!("set nonblocking: {e}")))?;
    }

    if !addr.tls {
        return Ok(Box::new(sock));
    }

    let ca_file = ca_file.ok_or_else(|| {
        Error::ConnectionFailed("tls broker url requires a ca bundle".into())
    })?;
    let config = client_config_from_ca_file(ca_file)?;
    let server_name = ServerName::try_from(addr.host.as_str())
        .map_err(|_| Error::ConnectionFailed(format!("invalid server name {}", addr.host)))?;
    let conn = ClientConnection::new(Arc::new(config), server_name)
        .map_err(|e| Error::ConnectionFailed(format!("tls client setup: {e}")))?;
    Ok(Box::new(StreamOwned::new(conn, sock)))
}

/// Owns the stream for the lifetime of a session. While detached, every
/// operation fails with the corresponding transport error and nothing
/// else is touched.
pub struct Transport {
    stream: Option<Box<dyn Stream>>,
}

impl Transport {
    pub fn disconnected() -> Self {
        Self { stream: None }
    }

    pub fn attach(&mut self, stream: Box<dyn Stream>) {
        self.stream = Some(stream);
    }

    /// Drop the stream, closing the socket.
    pub fn detach(&mut self) {
        self.stream = None;
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Write the whole buffer or fail; short writes are errors.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::TxData("socket closed".into()))?;
        stream
            .write_all(bytes)
            .and_then(|_| stream.flush())
            .map_err(|e| Error::TxData(e.to_string()))
    }

    /// Read up to `limit` bytes.
    ///
    /// Non-blocking: a single best-effort read; an empty result means no
    /// data was available. Blocking: accumulate exactly `limit` bytes,
    /// stopping early only at end-of-stream (callers check the length).
    /// End-of-stream on a best-effort read is an error: the peer closed
    /// the connection.
    pub fn read(&mut self, limit: usize, blocking: bool) -> Result<Vec<u8>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::RxData("socket closed".into()))?;
        let mut buf = vec![0u8; limit];

        if !blocking {
            let _ = stream.set_nonblocking(true);
            let outcome = stream.read(&mut buf);
            let _ = stream.set_nonblocking(false);
            return match outcome {
                Ok(0) => Err(Error::RxData("stream closed by peer".into())),
                Ok(n) => {
                    buf.truncate(n);
                    Ok(buf)
                }
                Err(e) if would_block(&e) => Ok(Vec::new()),
                Err(e) => Err(Error::RxData(e.to_string())),
            };
        }

        let mut filled = 0usize;
        while filled < limit {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::RxData(e.to_string())),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Shut down the writable half, leaving reads alone.
    pub fn shutdown_write(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::TxData("socket closed".into()))?;
        stream
            .shutdown_write()
            .map_err(|e| Error::TxData(e.to_string()))
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
