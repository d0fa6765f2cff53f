//! Scan engine lifecycle.

use serde::Serialize;

/// Phase of the current (or last) run.
///
/// ```text
/// NotStarted ──> Moving ──> Dwelling ──> Sampling ──> Done
///                  ▲                        │
///                  └──────── next point ────┘
///
/// any phase ──error──> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// No run has been started on this engine.
    NotStarted,
    /// Motors are travelling to the next point.
    Moving,
    /// Motors are idle, waiting the dwell time.
    Dwelling,
    /// Detectors are being read.
    Sampling,
    /// The last run finished and produced a record.
    Done,
    /// The last run aborted.
    Failed,
}

impl EngineState {
    /// True while a run is in progress.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            EngineState::Moving | EngineState::Dwelling | EngineState::Sampling
        )
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::NotStarted => write!(f, "not started"),
            EngineState::Moving => write!(f, "moving"),
            EngineState::Dwelling => write!(f, "dwelling"),
            EngineState::Sampling => write!(f, "sampling"),
            EngineState::Done => write!(f, "done"),
            EngineState::Failed => write!(f, "failed"),
        }
    }
}
