//! Device-server transport.
//!
//! A [`Transport`] owns one connection to the device server and turns the primitive
//! verbs (GET/PUT/MOVE/STATUS/LIST/MONITOR/STOP) into framed command/response
//! exchanges. Implementations only provide the lifecycle and a raw [`Transport::exchange`];
//! response parsing and error mapping live in the provided verb methods so that the TCP
//! transport and the simulated one behave identically.
//!
//! Exactly one command is in flight per connection. The verbs take `&mut self`, and the
//! device layer shares a transport through [`SharedTransport`], holding the lock for a
//! whole exchange.

use crate::error::{DaqError, DaqResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod mock;
pub mod protocol;
pub mod tcp;

pub use mock::MockTransport;
pub use protocol::{Command, Reply};
pub use tcp::TcpTransport;

/// Transport shared between the devices of one scan.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Wrap a transport for sharing between devices.
pub fn shared<T: Transport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket is open.
    Disconnected,
    /// A socket is open.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Command/response channel to the device server.
///
/// Implementors supply the lifecycle and a single framed [`exchange`](Transport::exchange);
/// every protocol verb is built on top of it.
#[async_trait]
pub trait Transport: Send {
    /// Open the connection. Calling this while connected is a no-op.
    async fn connect(&mut self) -> DaqResult<()>;

    /// Close the connection if open. Never fails.
    fn disconnect(&mut self);

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Send one command line and return the raw response line (terminator stripped).
    ///
    /// Implementations fail with `NotConnected`, `ConnectionFailure` or
    /// `OperationTimedOut`; they do not interpret the response.
    async fn exchange(&mut self, command: &Command) -> DaqResult<String>;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Exchange a command and unwrap the `OK` payload.
    async fn request(&mut self, command: Command) -> DaqResult<String> {
        if !self.is_connected() {
            return Err(DaqError::NotConnected);
        }
        let line = self.exchange(&command).await?;
        Reply::parse(&line)?.into_payload(&command)
    }

    /// Read a process variable.
    async fn get(&mut self, pv: &str) -> DaqResult<f64> {
        let payload = self.request(Command::Get { pv: pv.to_string() }).await?;
        protocol::parse_value(&payload)
    }

    /// Write a process variable.
    async fn put(&mut self, pv: &str, value: f64) -> DaqResult<()> {
        self.request(Command::Put {
            pv: pv.to_string(),
            value,
        })
        .await
        .map(|_| ())
    }

    /// Start a motor move. Returns as soon as the server accepted the command; it does
    /// not wait for the motion to finish.
    async fn move_motor(&mut self, motor: &str, position: f64) -> DaqResult<()> {
        self.request(Command::Move {
            motor: motor.to_string(),
            position,
        })
        .await
        .map(|_| ())
    }

    /// Motor status string, trimmed and upper-cased (`IDLE`, `MOVING`, ...).
    async fn status(&mut self, motor: &str) -> DaqResult<String> {
        let payload = self
            .request(Command::Status {
                motor: motor.to_string(),
            })
            .await?;
        Ok(payload.trim().to_uppercase())
    }

    /// List process variables, optionally filtered by a server-side glob.
    async fn list_pvs(&mut self, pattern: Option<&str>) -> DaqResult<Vec<String>> {
        let payload = self
            .request(Command::List {
                pattern: pattern.map(str::to_string),
            })
            .await?;
        Ok(protocol::parse_list(&payload))
    }

    /// Ask the server to start monitoring a PV. No values are delivered back over
    /// this connection; the call only checks that the server accepted the request.
    async fn monitor_start(&mut self, pv: &str, interval_ms: u32) -> DaqResult<()> {
        self.request(Command::Monitor {
            pv: pv.to_string(),
            interval_ms,
        })
        .await
        .map(|_| ())
    }

    /// Stop monitoring.
    async fn monitor_stop(&mut self) -> DaqResult<()> {
        self.request(Command::Stop).await.map(|_| ())
    }

    /// Liveness check, the server answers `OK:PONG`.
    async fn ping(&mut self) -> DaqResult<()> {
        self.request(Command::Ping).await.map(|_| ())
    }

    /// End the session politely, then drop the connection.
    async fn quit(&mut self) -> DaqResult<()> {
        let result = self.request(Command::Quit).await.map(|_| ());
        self.disconnect();
        result
    }
}
