//! Custom error types for the beamline DAQ client.
//!
//! This module defines the primary error type, `DaqError`, used by every layer of the
//! crate. Using the `thiserror` crate, it provides a centralized and consistent way to
//! report what went wrong, from socket-level trouble to scan-configuration mistakes.
//!
//! ## Error Hierarchy
//!
//! `DaqError` consolidates the failure modes of the three layers:
//!
//! - **Transport**: `NotConnected`, `ConnectionFailure`, `ProtocolFailure`,
//!   `OperationTimedOut` and `MalformedValue` come out of a single command/response
//!   exchange with the device server.
//! - **Devices**: `MotionTimedOut` is raised when a motor never reports `IDLE`,
//!   `InvalidIdentifier` when a device is built from a badly formed process-variable name.
//! - **Scans**: `InvalidConfiguration` is raised while constructing a scan configuration
//!   (never during a run), `UnsupportedConfiguration` when a scan definition names a scan
//!   type this crate does not know, `InvalidRecord` when a scan record fails its
//!   consistency check.
//! - **Settings**: `Config` wraps `figment` errors from loading TOML files and the
//!   environment.
//!
//! Nothing in the crate recovers from these locally. A failure aborts the current
//! operation and is handed to the caller unchanged.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type DaqResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the beamline DAQ client.
#[derive(Error, Debug)]
pub enum DaqError {
    /// A transport verb was called without an open connection.
    #[error("Not connected to device server")]
    NotConnected,

    /// Socket-level failure: connect refused, peer hung up, write/read error.
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// The server answered `ERR:<code>`, or the response did not follow the grammar.
    #[error("Protocol error [{code}]: {message}")]
    ProtocolFailure {
        /// Server error code (`UNKNOWN_PV`, `INVALID_VALUE`, ...) or a local framing
        /// code (`INVALID`, `EMPTY`).
        code: String,
        /// Human readable context.
        message: String,
    },

    /// Send or receive did not complete within the configured timeout.
    #[error("Operation timed out after {0:?}")]
    OperationTimedOut(Duration),

    /// An `OK` payload that should have been a number was not.
    #[error("Invalid float value in response: {0:?}")]
    MalformedValue(String),

    /// A motor never reported `IDLE`.
    #[error("Motor {motor} did not reach IDLE state within {timeout:?}")]
    MotionTimedOut {
        /// Setpoint identifier of the motor.
        motor: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// A device identifier is empty or lacks a namespace.
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Scan parameters violate a constraint.
    #[error("Invalid scan configuration: {0}")]
    InvalidConfiguration(String),

    /// A scan definition names a scan type this crate cannot run.
    #[error("Unsupported scan configuration: {0}")]
    UnsupportedConfiguration(String),

    /// A record failed its consistency checks.
    #[error("Invalid scan record: {0}")]
    InvalidRecord(String),

    /// Settings or scan files could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),
}

impl DaqError {
    /// Build a protocol failure from a server code and some context.
    pub fn protocol(code: impl Into<String>, message: impl Into<String>) -> Self {
        DaqError::ProtocolFailure {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The code of a [`DaqError::ProtocolFailure`], `None` for every other variant.
    pub fn protocol_code(&self) -> Option<&str> {
        match self {
            DaqError::ProtocolFailure { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True for failures that come out of the command/response exchange itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DaqError::NotConnected
                | DaqError::ConnectionFailure(_)
                | DaqError::ProtocolFailure { .. }
                | DaqError::OperationTimedOut(_)
                | DaqError::MalformedValue(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_code_is_exposed() {
        let err = DaqError::protocol("UNKNOWN_PV", "Failed to get PV BL02:NOPE");
        assert_eq!(err.protocol_code(), Some("UNKNOWN_PV"));
        assert!(err.to_string().contains("UNKNOWN_PV"));
        assert!(err.is_transport());
    }

    #[test]
    fn non_protocol_errors_have_no_code() {
        let err = DaqError::MotionTimedOut {
            motor: "BL02:SAMPLE:X".into(),
            timeout: Duration::from_secs(60),
        };
        assert_eq!(err.protocol_code(), None);
        assert!(!err.is_transport());
        assert!(err.to_string().contains("BL02:SAMPLE:X"));
    }

    #[test]
    fn configuration_errors_are_not_transport_errors() {
        assert!(!DaqError::InvalidConfiguration("steps must be > 0".into()).is_transport());
        assert!(!DaqError::UnsupportedConfiguration("spiral".into()).is_transport());
        assert!(DaqError::NotConnected.is_transport());
    }
}
