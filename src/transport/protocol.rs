//! Line protocol spoken by the beamline device server.
//!
//! Protocol Overview:
//! - Format: ASCII, one command per line, `\n` terminated
//! - Commands: `VERB` or `VERB:<args>` (e.g. `GET:BL02:RING:CURRENT`)
//! - Responses: `OK:<payload>` or `ERR:<code>`
//!
//! Process-variable names contain colons themselves, so arguments are never split
//! back apart on this side; only the response is parsed, and only on its first colon.

use crate::error::{DaqError, DaqResult};
use std::fmt;

/// Commands understood by the device server.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `GET:<pv>`
    Get {
        /// Process variable to read.
        pv: String,
    },
    /// `PUT:<pv>:<value>`
    Put {
        /// Process variable to write.
        pv: String,
        /// New value.
        value: f64,
    },
    /// `MOVE:<motor>:<position>`
    Move {
        /// Motor setpoint identifier.
        motor: String,
        /// Target position.
        position: f64,
    },
    /// `STATUS:<motor>`
    Status {
        /// Motor setpoint identifier.
        motor: String,
    },
    /// `LIST` or `LIST:<pattern>`
    List {
        /// Optional `*` wildcard filter.
        pattern: Option<String>,
    },
    /// `MONITOR:<pv>:<interval_ms>`
    Monitor {
        /// Process variable to watch.
        pv: String,
        /// Update interval in milliseconds.
        interval_ms: u32,
    },
    /// `STOP`
    Stop,
    /// `PING`
    Ping,
    /// `QUIT`
    Quit,
}

impl Command {
    /// Render the command line, without the terminating newline.
    pub fn encode(&self) -> String {
        match self {
            Command::Get { pv } => format!("GET:{pv}"),
            Command::Put { pv, value } => format!("PUT:{pv}:{value}"),
            Command::Move { motor, position } => format!("MOVE:{motor}:{position}"),
            Command::Status { motor } => format!("STATUS:{motor}"),
            Command::List { pattern: Some(p) } if !p.is_empty() => format!("LIST:{p}"),
            Command::List { .. } => "LIST".to_string(),
            Command::Monitor { pv, interval_ms } => format!("MONITOR:{pv}:{interval_ms}"),
            Command::Stop => "STOP".to_string(),
            Command::Ping => "PING".to_string(),
            Command::Quit => "QUIT".to_string(),
        }
    }

    /// Short verb name, used in log fields and error messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Put { .. } => "PUT",
            Command::Move { .. } => "MOVE",
            Command::Status { .. } => "STATUS",
            Command::List { .. } => "LIST",
            Command::Monitor { .. } => "MONITOR",
            Command::Stop => "STOP",
            Command::Ping => "PING",
            Command::Quit => "QUIT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A well-formed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK:<payload>`; payload is trimmed and may be empty.
    Ok(String),
    /// `ERR:<code>`
    Err(String),
}

impl Reply {
    /// Parse one response line (terminator already stripped or not, both work).
    ///
    /// The line is split on its first colon. The left side must be exactly `OK` or
    /// `ERR` after trimming; an empty line fails with code `EMPTY`, anything else with
    /// code `INVALID`. A bare `OK` is accepted with an empty payload.
    pub fn parse(line: &str) -> DaqResult<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(DaqError::protocol("EMPTY", "Empty response from server"));
        }

        let (status, data) = match line.split_once(':') {
            Some((status, data)) => (status.trim(), data.trim()),
            None => (line, ""),
        };

        match status {
            "OK" => Ok(Reply::Ok(data.to_string())),
            "ERR" => Ok(Reply::Err(data.to_string())),
            _ => Err(DaqError::protocol(
                "INVALID",
                format!("Invalid response format: {line}"),
            )),
        }
    }

    /// Unwrap the `OK` payload, turning `ERR:<code>` into a protocol failure that names
    /// the command which provoked it.
    pub fn into_payload(self, command: &Command) -> DaqResult<String> {
        match self {
            Reply::Ok(payload) => Ok(payload),
            Reply::Err(code) => {
                let message = format!("{} failed: {}", command.encode(), code);
                Err(DaqError::ProtocolFailure { code, message })
            }
        }
    }
}

/// Parse a numeric `OK` payload. `nan` and `inf` are not readings.
pub fn parse_value(payload: &str) -> DaqResult<f64> {
    payload
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| DaqError::MalformedValue(payload.to_string()))
}

/// Split a `LIST` payload into identifiers, dropping blanks.
pub fn parse_list(payload: &str) -> Vec<String> {
    payload
        .split(',')
        .map(str::trim)
        .filter(|pv| !pv.is_empty())
        .map(str::to_string)
        .collect()
}
