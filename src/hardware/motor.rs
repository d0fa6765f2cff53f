//! Motorized axis.
//!
//! A motor is addressed by its setpoint identifier (e.g. `BL02:SAMPLE:X`). The measured
//! position lives under the readback identifier, the setpoint with `.RBV` appended.
//!
//! The device server never pushes motion completion; [`Motor::wait_for_idle`] polls
//! `STATUS` until the motor reports `IDLE` or the timeout elapses.

use crate::error::{DaqError, DaqResult};
use crate::transport::SharedTransport;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

/// Suffix appended to a setpoint identifier to form its readback identifier.
pub const READBACK_SUFFIX: &str = ".RBV";

/// Separator that every process-variable name must contain.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Default bound on a single motion.
pub const DEFAULT_MOTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default spacing between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Check that `pv` is a usable motor identifier: non-empty and namespaced.
pub fn validate_identifier(pv: &str) -> DaqResult<()> {
    if pv.trim().is_empty() || !pv.contains(NAMESPACE_SEPARATOR) {
        return Err(DaqError::InvalidIdentifier(pv.to_string()));
    }
    Ok(())
}

/// Observed motion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    /// Motion complete.
    Idle,
    /// Still travelling, or an unrecognised status.
    Moving,
}

impl MotorState {
    /// Only a literal `IDLE` counts as idle; anything else is treated as still moving.
    pub fn from_status(status: &str) -> Self {
        if status == "IDLE" {
            MotorState::Idle
        } else {
            MotorState::Moving
        }
    }
}

impl fmt::Display for MotorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorState::Idle => write!(f, "IDLE"),
            MotorState::Moving => write!(f, "MOVING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    Polling,
    Idle,
    TimedOut,
}

/// Positioner addressed by its setpoint identifier, read back through `<pv>.RBV`.
pub struct Motor {
    pv: String,
    readback_pv: String,
    transport: SharedTransport,
    poll_interval: Duration,
}

impl Motor {
    /// Fails with [`DaqError::InvalidIdentifier`] if `pv` is empty or not namespaced.
    pub fn new(pv: impl Into<String>, transport: SharedTransport) -> DaqResult<Self> {
        let pv = pv.into();
        validate_identifier(&pv)?;
        let readback_pv = format!("{pv}{READBACK_SUFFIX}");
        Ok(Self {
            pv,
            readback_pv,
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Poll spacing used by [`Motor::move_to`] when it waits.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Setpoint identifier.
    pub fn pv(&self) -> &str {
        &self.pv
    }

    /// Readback identifier, `<pv>.RBV`.
    pub fn readback_pv(&self) -> &str {
        &self.readback_pv
    }

    /// Spacing of `STATUS` polls used by `move_to`.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Command a move; with `wait`, block until the motor reports idle.
    #[instrument(skip(self), fields(motor = %self.pv), err)]
    pub async fn move_to(&self, position: f64, wait: bool, timeout: Duration) -> DaqResult<()> {
        self.transport
            .lock()
            .await
            .move_motor(&self.pv, position)
            .await?;
        if wait {
            self.wait_for_idle(timeout, self.poll_interval).await?;
        }
        Ok(())
    }

    /// Measured position from the readback identifier.
    pub async fn position(&self) -> DaqResult<f64> {
        self.transport.lock().await.get(&self.readback_pv).await
    }

    /// Query the motion state.
    pub async fn status(&self) -> DaqResult<MotorState> {
        let status = self.transport.lock().await.status(&self.pv).await?;
        let state = MotorState::from_status(&status);
        if state == MotorState::Moving && status != "MOVING" {
            warn!(motor = %self.pv, status = %status, "Unrecognised motor status, treating as MOVING");
        }
        Ok(state)
    }

    /// Poll status every `poll_interval` until `IDLE`.
    ///
    /// Fails with [`DaqError::MotionTimedOut`] once `timeout` has elapsed without an
    /// idle report. Status is always queried at least once, so a zero timeout still
    /// succeeds for a motor that is already idle.
    #[instrument(skip(self), fields(motor = %self.pv), err)]
    pub async fn wait_for_idle(&self, timeout: Duration, poll_interval: Duration) -> DaqResult<()> {
        let started = Instant::now();
        let mut polls = 0usize;
        let mut phase = Wait::Polling;

        loop {
            phase = match phase {
                Wait::Polling => {
                    polls += 1;
                    if self.status().await? == MotorState::Idle {
                        Wait::Idle
                    } else if started.elapsed() >= timeout {
                        Wait::TimedOut
                    } else {
                        sleep(poll_interval).await;
                        Wait::Polling
                    }
                }
                Wait::Idle => {
                    debug!(polls, elapsed = ?started.elapsed(), "Motor idle");
                    return Ok(());
                }
                Wait::TimedOut => {
                    return Err(DaqError::MotionTimedOut {
                        motor: self.pv.clone(),
                        timeout,
                    });
                }
            };
        }
    }
}

impl fmt::Debug for Motor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Motor")
            .field("pv", &self.pv)
            .field("readback_pv", &self.readback_pv)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
