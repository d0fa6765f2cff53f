//! Beamline devices.
//!
//! Thin semantic wrappers over the transport verbs:
//!
//! - [`Motor`]: setpoint/readback pair with motion-completion polling
//! - [`Detector`]: single readout, optionally sampled repeatedly
//! - [`Shutter`]: command/status pair
//!
//! Devices hold a [`SharedTransport`](crate::transport::SharedTransport) and lock it
//! for each command, so several devices can drive the same connection one exchange
//! at a time.

pub mod detector;
pub mod motor;
pub mod shutter;

pub use detector::Detector;
pub use motor::{Motor, MotorState};
pub use shutter::Shutter;
