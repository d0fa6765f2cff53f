//! TCP transport to the beamline device server.
//!
//! Provides the framed command/response exchange over one socket:
//! - commands are written as a single line terminated by `\n`
//! - a response is complete once a `\n` has been received
//! - send and receive are each bounded by the configured timeout
//!
//! A timeout or socket failure in the middle of an exchange leaves the stream out of
//! step with the server: a late reply may still arrive. The stream is then marked
//! unusable and every later exchange fails until `connect()` opens a fresh socket.
//!
//! The socket is owned by the transport. Dropping the transport closes it, so a
//! connection opened for a scan is released on every exit path, including early
//! returns through `?`.

use super::{Command, ConnectionState, Transport};
use crate::config::ConnectionSettings;
use crate::error::{DaqError, DaqResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Default device server port (EPICS channel access convention).
pub const DEFAULT_PORT: u16 = 5064;

/// Default send/receive timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Byte stream the transport can frame commands over.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

type Framed = BufReader<Box<dyn ByteStream>>;

/// Transport over a single TCP connection.
pub struct TcpTransport {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<Framed>,
    /// Why the open stream can no longer be trusted, if it can't.
    broken: Option<String>,
}

impl TcpTransport {
    /// Create a disconnected transport for `host:port` with the default timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            stream: None,
            broken: None,
        }
    }

    /// Create a disconnected transport from the `[connection]` settings.
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self::new(settings.host.clone(), settings.port).with_timeout(settings.timeout())
    }

    /// Set the connect/send/receive timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wrap an already open byte stream. The transport starts out connected and
    /// `connect()` is a no-op for it while the stream stays usable.
    pub fn from_stream<S: ByteStream + 'static>(stream: S, timeout: Duration) -> Self {
        Self {
            host: "stream".to_string(),
            port: 0,
            timeout,
            stream: Some(BufReader::new(Box::new(stream))),
            broken: None,
        }
    }

    /// Whether the open stream was abandoned after a failed exchange.
    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    async fn round_trip(
        stream: &mut Framed,
        command: &Command,
        limit: Duration,
    ) -> DaqResult<String> {
        let line = format!("{}\n", command.encode());

        let sent = timeout(limit, async {
            let writer = stream.get_mut();
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| DaqError::OperationTimedOut(limit))?;
        sent.map_err(|e| DaqError::ConnectionFailure(format!("Socket error: {e}")))?;

        let mut buf = Vec::with_capacity(64);
        let read = timeout(limit, stream.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| DaqError::OperationTimedOut(limit))?
            .map_err(|e| DaqError::ConnectionFailure(format!("Socket error: {e}")))?;

        if read == 0 || buf.last() != Some(&b'\n') {
            return Err(DaqError::ConnectionFailure(
                "connection closed by peer".to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&buf).trim().to_string())
    }

    /// Configured host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connect/send/receive timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .field("broken", &self.broken)
            .finish()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    #[instrument(skip(self), fields(host = %self.host, port = self.port), err)]
    async fn connect(&mut self) -> DaqResult<()> {
        if self.stream.is_some() && self.broken.is_none() {
            return Ok(());
        }
        self.disconnect();

        let endpoint = format!("{}:{}", self.host, self.port);
        let stream = match timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(DaqError::ConnectionFailure(format!(
                    "Failed to connect to {endpoint}: {e}"
                )))
            }
            Err(_) => {
                return Err(DaqError::ConnectionFailure(format!(
                    "Failed to connect to {endpoint}: no answer within {:?}",
                    self.timeout
                )))
            }
        };

        // Commands are tiny and strictly request/response.
        stream.set_nodelay(true).map_err(|e| {
            DaqError::ConnectionFailure(format!("Failed to configure socket for {endpoint}: {e}"))
        })?;

        self.stream = Some(BufReader::new(Box::new(stream)));
        info!("Connected to device server at {}", endpoint);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.broken = None;
        if self.stream.take().is_some() {
            info!(host = %self.host, port = self.port, "Disconnected from device server");
        }
    }

    fn state(&self) -> ConnectionState {
        if self.stream.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn exchange(&mut self, command: &Command) -> DaqResult<String> {
        let limit = self.timeout;
        let stream = self.stream.as_mut().ok_or(DaqError::NotConnected)?;
        if let Some(reason) = &self.broken {
            return Err(DaqError::ConnectionFailure(format!(
                "connection unusable after {reason}, reconnect first"
            )));
        }

        debug!(verb = command.verb(), command = %command, "-> device");
        match Self::round_trip(stream, command, limit).await {
            Ok(response) => {
                debug!(response = %response, "<- device");
                Ok(response)
            }
            Err(e) => {
                if matches!(
                    e,
                    DaqError::OperationTimedOut(_) | DaqError::ConnectionFailure(_)
                ) {
                    warn!(
                        verb = command.verb(),
                        error = %e,
                        "Abandoning connection to device server"
                    );
                    self.broken = Some(format!("{} failed: {e}", command.verb()));
                }
                Err(e)
            }
        }
    }
}
