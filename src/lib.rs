//! # Beamline DAQ
//!
//! Client library for a beamline device server: it reads and writes process variables,
//! drives motors, samples detectors and runs step scans that produce a [`ScanRecord`].
//!
//! ## Crate Structure
//!
//! Data flows upward through the layers:
//!
//! - **`transport`**: the line protocol (`GET`, `PUT`, `MOVE`, `STATUS`, `LIST`,
//!   `MONITOR`, `STOP`) over one TCP connection, plus a simulated server for tests.
//! - **`hardware`**: `Motor`, `Detector` and `Shutter` wrappers over the transport verbs,
//!   including motion-completion polling.
//! - **`experiment`**: scan configurations (linear, mesh, multi-region XAFS), the
//!   `ScanEngine` that executes them and the resulting `ScanRecord`.
//! - **`config`**: layered settings and TOML scan definitions.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: the crate-wide `DaqError`.
//!
//! ## Example
//!
//! ```no_run
//! use beamline_daq::experiment::{Acquisition, AxisRange, LinearScan, ScanEngine};
//! use beamline_daq::transport::{shared, TcpTransport, Transport};
//!
//! # #[tokio::main]
//! # async fn main() -> beamline_daq::DaqResult<()> {
//! let mut tcp = TcpTransport::new("localhost", 5064);
//! tcp.connect().await?;
//!
//! let scan = LinearScan::new(
//!     AxisRange::new("BL02:SAMPLE:X", -1000.0, 1000.0, 5)?,
//!     Acquisition::new(["BL02:DET:I0"], 0.1)?,
//! );
//! let mut engine = ScanEngine::new(shared(tcp));
//! let record = engine.run(&scan.into()).await?;
//! println!("{} samples", record.len());
//! # Ok(())
//! # }
//! ```
//!
//! [`ScanRecord`]: experiment::ScanRecord

pub mod config;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;
pub mod transport;

pub use error::{DaqError, DaqResult};
