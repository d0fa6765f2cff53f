//! Scan definitions and execution.
//!
//! - [`plan`]: validated scan configurations and the points they visit
//! - [`run_engine`]: the [`ScanEngine`] that moves, dwells and samples
//! - [`record`]: the [`ScanRecord`] produced by a successful run
//! - [`state`]: engine lifecycle

pub mod plan;
pub mod record;
pub mod run_engine;
pub mod state;

pub use plan::{
    evenly_spaced, Acquisition, AxisRange, EnergyRegion, LinearScan, MeshScan, ScanConfig,
    XafsScan,
};
pub use record::{Channel, Metadata, ScanRecord};
pub use run_engine::ScanEngine;
pub use state::EngineState;
