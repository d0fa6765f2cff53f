//! Beam shutter.

use crate::error::DaqResult;
use crate::transport::SharedTransport;
use std::fmt;
use tracing::info;

/// Status PV of the hutch shutter.
pub const DEFAULT_STATUS_PV: &str = "BL02:SHUTTER:STATUS";

/// Command PV of the hutch shutter.
pub const DEFAULT_COMMAND_PV: &str = "BL02:SHUTTER:CMD";

/// Status readings above this value mean "open".
const OPEN_THRESHOLD: f64 = 0.5;

/// Beam shutter driven through a command PV and observed through a status PV.
pub struct Shutter {
    status_pv: String,
    command_pv: String,
    transport: SharedTransport,
}

impl Shutter {
    /// Shutter with explicit status and command PVs.
    pub fn new(
        status_pv: impl Into<String>,
        command_pv: impl Into<String>,
        transport: SharedTransport,
    ) -> Self {
        Self {
            status_pv: status_pv.into(),
            command_pv: command_pv.into(),
            transport,
        }
    }

    /// Shutter on the default status and command PVs.
    pub fn with_defaults(transport: SharedTransport) -> Self {
        Self::new(DEFAULT_STATUS_PV, DEFAULT_COMMAND_PV, transport)
    }

    /// Status PV.
    pub fn status_pv(&self) -> &str {
        &self.status_pv
    }

    /// Command PV.
    pub fn command_pv(&self) -> &str {
        &self.command_pv
    }

    /// Command the shutter open.
    pub async fn open(&self) -> DaqResult<()> {
        self.transport.lock().await.put(&self.command_pv, 1.0).await?;
        info!(shutter = %self.command_pv, "Shutter open requested");
        Ok(())
    }

    /// Command the shutter closed.
    pub async fn close(&self) -> DaqResult<()> {
        self.transport.lock().await.put(&self.command_pv, 0.0).await?;
        info!(shutter = %self.command_pv, "Shutter close requested");
        Ok(())
    }

    /// Whether the status PV reads above the open threshold.
    pub async fn is_open(&self) -> DaqResult<bool> {
        let status = self.transport.lock().await.get(&self.status_pv).await?;
        Ok(status > OPEN_THRESHOLD)
    }
}

impl fmt::Debug for Shutter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutter")
            .field("status_pv", &self.status_pv)
            .field("command_pv", &self.command_pv)
            .finish()
    }
}
