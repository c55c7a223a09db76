/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::Config;
use super::TransportError;

/// Byte pipe to the server.
pub trait Transport {
    fn connect(&mut self, config: &Config) -> Result<(), TransportError>;

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads available bytes.
    ///
    /// Returns `Ok(None)` when the peer closed the connection and
    /// `Ok(Some(0))` when nothing arrived in time.
    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<usize>, TransportError>;

    /// Upgrades the connection in place.
    fn start_tls(&mut self, domain: &str) -> Result<(), TransportError>;

    fn is_secure(&self) -> bool;

    fn close(&mut self);
}

enum Connection {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
}

/// Blocking TCP transport with optional STARTTLS.
pub struct TcpTransport {
    connection: Option<Connection>,
    read_timeout: Duration,
}

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport {
            connection: None,
            read_timeout: Duration::from_millis(500),
        }
    }

    /// How long `receive` blocks before reporting no data.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

// The resolver needs a port, but host strings may carry one already,
// possibly after an IPv6 address in brackets.
fn has_port(host: &str) -> bool {
    match (host.rfind(':'), host.rfind(']')) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(colon), Some(bracket)) => colon > bracket,
    }
}

#[cfg(feature = "tls")]
fn tls_config() -> Arc<rustls::ClientConfig> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

impl Transport for TcpTransport {
    fn connect(&mut self, config: &Config) -> Result<(), TransportError> {
        let host = config.host();
        let mut addresses = if has_port(host) {
            host.to_socket_addrs()
        } else {
            (host, config.port).to_socket_addrs()
        }?;
        debug!(host, "connecting");
        let address = addresses.next().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("cannot resolve {host}"),
            ))
        })?;
        let stream = TcpStream::connect_timeout(&address, config.connection_timeout())?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;
        self.connection = Some(Connection::Plain(stream));
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self.connection.as_mut() {
            Some(Connection::Plain(stream)) => stream.write_all(bytes)?,
            #[cfg(feature = "tls")]
            Some(Connection::Tls(stream)) => {
                stream.write_all(bytes)?;
                stream.flush()?;
            }
            None => return Err(TransportError::NotConnected),
        }
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<usize>, TransportError> {
        let result = match self.connection.as_mut() {
            Some(Connection::Plain(stream)) => stream.read(buffer),
            #[cfg(feature = "tls")]
            Some(Connection::Tls(stream)) => stream.read(buffer),
            None => return Err(TransportError::NotConnected),
        };
        match result {
            Ok(0) => Ok(None),
            Ok(count) => Ok(Some(count)),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(Some(0))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[cfg(feature = "tls")]
    fn start_tls(&mut self, domain: &str) -> Result<(), TransportError> {
        let stream = match self.connection.take() {
            Some(Connection::Plain(stream)) => stream,
            Some(tls) => {
                self.connection = Some(tls);
                return Err(TransportError::Tls("already secured".into()));
            }
            None => return Err(TransportError::NotConnected),
        };
        let server_name = rustls::pki_types::ServerName::try_from(domain.to_string())
            .map_err(|err| TransportError::Tls(err.to_string()))?;
        let client = rustls::ClientConnection::new(tls_config(), server_name)
            .map_err(|err| TransportError::Tls(err.to_string()))?;
        self.connection = Some(Connection::Tls(Box::new(rustls::StreamOwned::new(
            client, stream,
        ))));
        debug!(domain, "TLS started");
        Ok(())
    }

    #[cfg(not(feature = "tls"))]
    fn start_tls(&mut self, _domain: &str) -> Result<(), TransportError> {
        Err(TransportError::TlsNotSupported)
    }

    fn is_secure(&self) -> bool {
        match self.connection {
            #[cfg(feature = "tls")]
            Some(Connection::Tls(_)) => true,
            _ => false,
        }
    }

    fn close(&mut self) {
        match self.connection.take() {
            Some(Connection::Plain(stream)) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(feature = "tls")]
            Some(Connection::Tls(mut stream)) => {
                stream.conn.send_close_notify();
                let _ = stream.flush();
                let _ = stream.sock.shutdown(std::net::Shutdown::Both);
            }
            None => {}
        }
    }
}

#[derive(Debug, Default)]
struct Pipe {
    connected: bool,
    secure: bool,
    closed_by_peer: bool,
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<u8>,
}

/// In-memory transport for driving a client without a network.
///
/// Clones share the same pipe, so one handle can feed server data and read
/// what the client wrote while another is owned by the client.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    pipe: Arc<Mutex<Pipe>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues server data for the next `receive`.
    pub fn push_inbound(&self, text: &str) {
        self.pipe.lock().inbound.push_back(text.as_bytes().to_vec());
    }

    /// Everything written since the last call.
    pub fn take_sent(&self) -> String {
        let sent = std::mem::take(&mut self.pipe.lock().sent);
        String::from_utf8_lossy(&sent).into_owned()
    }

    /// Simulates the server closing the connection.
    pub fn close_by_peer(&self) {
        self.pipe.lock().closed_by_peer = true;
    }

    pub fn is_connected(&self) -> bool {
        self.pipe.lock().connected
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, _config: &Config) -> Result<(), TransportError> {
        let mut pipe = self.pipe.lock();
        pipe.connected = true;
        pipe.secure = false;
        pipe.closed_by_peer = false;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut pipe = self.pipe.lock();
        if !pipe.connected || pipe.closed_by_peer {
            return Err(TransportError::NotConnected);
        }
        pipe.sent.extend_from_slice(bytes);
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<usize>, TransportError> {
        let mut pipe = self.pipe.lock();
        if !pipe.connected {
            return Err(TransportError::NotConnected);
        }
        let Some(mut chunk) = pipe.inbound.pop_front() else {
            return Ok(if pipe.closed_by_peer { None } else { Some(0) });
        };
        let count = chunk.len().min(buffer.len());
        buffer[..count].copy_from_slice(&chunk[..count]);
        if count < chunk.len() {
            pipe.inbound.push_front(chunk.split_off(count));
        }
        Ok(Some(count))
    }

    fn start_tls(&mut self, _domain: &str) -> Result<(), TransportError> {
        let mut pipe = self.pipe.lock();
        if !pipe.connected {
            return Err(TransportError::NotConnected);
        }
        pipe.secure = true;
        Ok(())
    }

    fn is_secure(&self) -> bool {
        self.pipe.lock().secure
    }

    fn close(&mut self) {
        let mut pipe = self.pipe.lock();
        pipe.connected = false;
        pipe.secure = false;
    }
}
