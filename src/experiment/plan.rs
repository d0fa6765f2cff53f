//! Scan configurations and point generation.
//!
//! A [`ScanConfig`] is one of three validated variants:
//!
//! - [`LinearScan`]: one motor stepped evenly from `start` to `stop`
//! - [`MeshScan`]: two motors, each stepped evenly, visited row-major by the engine
//! - [`XafsScan`]: an energy motor stepped through regions defined relative to an
//!   absorption edge, each region with its own step size
//!
//! Every constructor checks its invariants and fails with
//! [`DaqError::InvalidConfiguration`]; a value of these types is always runnable.
//! Fields are private so a validated configuration cannot be altered afterwards.

use crate::error::{DaqError, DaqResult};
use crate::hardware::motor::validate_identifier;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

/// Dwell time used when a scan definition does not set one, in seconds.
pub const DEFAULT_DWELL_TIME: f64 = 0.1;

/// Energy motor driven by XAFS scans unless configured otherwise.
pub const DEFAULT_ENERGY_PV: &str = "BL02:MONO:ENERGY";

/// Upper bound on the points a single scan may visit.
pub const MAX_POINTS: usize = 1_000_000;

/// `n` evenly spaced values from `start` to `stop`, both endpoints included.
///
/// The last value is exactly `stop`. `n == 1` yields `[start]`, `n == 0` nothing.
pub fn evenly_spaced(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            values[n - 1] = stop;
            values
        }
    }
}

fn invalid(message: impl Into<String>) -> DaqError {
    DaqError::InvalidConfiguration(message.into())
}

fn require_finite(name: &str, value: f64) -> DaqResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite, got {value}")))
    }
}

fn require_motor(motor: &str) -> DaqResult<()> {
    validate_identifier(motor).map_err(|e| invalid(e.to_string()))
}

/// Detectors sampled at every point and the settling time before sampling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acquisition {
    detectors: Vec<String>,
    dwell_time: f64,
}

impl Acquisition {
    /// Detectors are read in the listed order. `dwell_time` is in seconds.
    pub fn new<I, S>(detectors: I, dwell_time: f64) -> DaqResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let detectors: Vec<String> = detectors.into_iter().map(Into::into).collect();
        if detectors.is_empty() {
            return Err(invalid("at least one detector is required"));
        }
        let mut seen = HashSet::new();
        for detector in &detectors {
            if detector.trim().is_empty() {
                return Err(invalid("detector identifiers must not be empty"));
            }
            if !seen.insert(detector.as_str()) {
                return Err(invalid(format!("detector {detector} listed twice")));
            }
        }
        require_finite("dwell_time", dwell_time)?;
        if dwell_time <= 0.0 {
            return Err(invalid(format!("dwell_time must be > 0, got {dwell_time}")));
        }
        Ok(Self {
            detectors,
            dwell_time,
        })
    }

    /// Detector identifiers in sampling order.
    pub fn detectors(&self) -> &[String] {
        &self.detectors
    }

    /// Dwell time in seconds.
    pub fn dwell_time(&self) -> f64 {
        self.dwell_time
    }

    /// Dwell time as a [`Duration`].
    pub fn dwell(&self) -> Duration {
        Duration::from_secs_f64(self.dwell_time)
    }
}

/// One motor stepped evenly over a closed interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisRange {
    motor: String,
    start: f64,
    stop: f64,
    steps: usize,
}

impl AxisRange {
    /// `stop` must exceed `start` and `steps` must be at least one.
    pub fn new(motor: impl Into<String>, start: f64, stop: f64, steps: usize) -> DaqResult<Self> {
        let motor = motor.into();
        require_motor(&motor)?;
        require_finite("start", start)?;
        require_finite("stop", stop)?;
        if stop <= start {
            return Err(invalid(format!(
                "{motor}: stop ({stop}) must be greater than start ({start})"
            )));
        }
        if steps == 0 || steps > MAX_POINTS {
            return Err(invalid(format!(
                "{motor}: steps must be between 1 and {MAX_POINTS}, got {steps}"
            )));
        }
        Ok(Self {
            motor,
            start,
            stop,
            steps,
        })
    }

    /// Motor identifier.
    pub fn motor(&self) -> &str {
        &self.motor
    }

    /// First position.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Last position.
    pub fn stop(&self) -> f64 {
        self.stop
    }

    /// Point count, endpoints included.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Target positions, endpoints included.
    pub fn positions(&self) -> Vec<f64> {
        evenly_spaced(self.start, self.stop, self.steps)
    }
}

/// Single-motor scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearScan {
    axis: AxisRange,
    acquisition: Acquisition,
}

impl LinearScan {
    /// Pair an axis with what to sample along it.
    pub fn new(axis: AxisRange, acquisition: Acquisition) -> Self {
        Self { axis, acquisition }
    }

    /// The scanned axis.
    pub fn axis(&self) -> &AxisRange {
        &self.axis
    }

    /// Detectors and dwell time.
    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    /// Target positions.
    pub fn positions(&self) -> Vec<f64> {
        self.axis.positions()
    }

    /// Point count.
    pub fn num_points(&self) -> usize {
        self.axis.steps
    }
}

/// Two-motor grid scan. `outer` advances slowest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshScan {
    outer: AxisRange,
    inner: AxisRange,
    acquisition: Acquisition,
}

impl MeshScan {
    /// Fails if both axes drive the same motor or the grid is too large.
    pub fn new(outer: AxisRange, inner: AxisRange, acquisition: Acquisition) -> DaqResult<Self> {
        if outer.motor == inner.motor {
            return Err(invalid(format!(
                "mesh axes must use distinct motors, both are {}",
                outer.motor
            )));
        }
        match outer.steps.checked_mul(inner.steps) {
            Some(points) if points <= MAX_POINTS => {}
            _ => {
                return Err(invalid(format!(
                    "mesh of {} x {} points exceeds {MAX_POINTS}",
                    outer.steps, inner.steps
                )))
            }
        }
        Ok(Self {
            outer,
            inner,
            acquisition,
        })
    }

    /// Slow axis.
    pub fn outer(&self) -> &AxisRange {
        &self.outer
    }

    /// Fast axis.
    pub fn inner(&self) -> &AxisRange {
        &self.inner
    }

    /// Detectors and dwell time.
    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    /// `(outer, inner)` pairs in row-major order: every inner position is visited
    /// before the outer motor advances.
    pub fn grid(&self) -> Vec<(f64, f64)> {
        let inner = self.inner.positions();
        self.outer
            .positions()
            .into_iter()
            .flat_map(|o| inner.iter().map(move |&i| (o, i)))
            .collect()
    }

    /// Point count, outer steps times inner steps.
    pub fn num_points(&self) -> usize {
        self.outer.steps * self.inner.steps
    }
}

/// Energy interval relative to the edge, sampled every `step` eV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyRegion {
    start: f64,
    stop: f64,
    step: f64,
}

impl EnergyRegion {
    /// Offsets are relative to the edge; `step` must be positive.
    pub fn new(start: f64, stop: f64, step: f64) -> DaqResult<Self> {
        require_finite("region start", start)?;
        require_finite("region stop", stop)?;
        require_finite("region step", step)?;
        if step <= 0.0 {
            return Err(invalid(format!("region step must be > 0, got {step}")));
        }
        if stop <= start {
            return Err(invalid(format!(
                "region stop ({stop}) must be greater than start ({start})"
            )));
        }
        let intervals = ((stop - start) / step).floor();
        if !intervals.is_finite() || intervals >= MAX_POINTS as f64 {
            return Err(invalid(format!(
                "region {start}..{stop} with step {step} exceeds {MAX_POINTS} points"
            )));
        }
        Ok(Self { start, stop, step })
    }

    /// First offset.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Last offset.
    pub fn stop(&self) -> f64 {
        self.stop
    }

    /// Step in eV.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Number of energies in this region, `floor((stop - start) / step) + 1`.
    pub fn point_count(&self) -> usize {
        ((self.stop - self.start) / self.step).floor() as usize + 1
    }

    /// Absolute energies of this region around `edge`.
    pub fn energies(&self, edge: f64) -> Vec<f64> {
        evenly_spaced(edge + self.start, edge + self.stop, self.point_count())
    }
}

/// Multi-region energy scan around an absorption edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XafsScan {
    energy_pv: String,
    edge: f64,
    regions: Vec<EnergyRegion>,
    acquisition: Acquisition,
}

impl XafsScan {
    /// Regions must be listed in ascending order and must not overlap; touching
    /// boundaries are allowed.
    pub fn new(
        energy_pv: impl Into<String>,
        edge: f64,
        regions: Vec<EnergyRegion>,
        acquisition: Acquisition,
    ) -> DaqResult<Self> {
        let energy_pv = energy_pv.into();
        require_motor(&energy_pv)?;
        require_finite("edge", edge)?;
        if edge <= 0.0 {
            return Err(invalid(format!("edge energy must be > 0, got {edge}")));
        }
        if regions.is_empty() {
            return Err(invalid("at least one energy region is required"));
        }
        for pair in regions.windows(2) {
            if pair[1].start < pair[0].stop {
                return Err(invalid(format!(
                    "energy regions overlap: region starting at {} begins before {}",
                    pair[1].start, pair[0].stop
                )));
            }
        }
        let total = regions
            .iter()
            .try_fold(0usize, |acc, region| acc.checked_add(region.point_count()));
        if !matches!(total, Some(points) if points <= MAX_POINTS) {
            return Err(invalid(format!("energy regions exceed {MAX_POINTS} points")));
        }
        Ok(Self {
            energy_pv,
            edge,
            regions,
            acquisition,
        })
    }

    /// Energy motor identifier.
    pub fn energy_pv(&self) -> &str {
        &self.energy_pv
    }

    /// Edge energy in eV.
    pub fn edge(&self) -> f64 {
        self.edge
    }

    /// Regions in scan order.
    pub fn regions(&self) -> &[EnergyRegion] {
        &self.regions
    }

    /// Detectors and dwell time.
    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    /// Concatenated region energies. A region starting where the previous one
    /// stopped repeats that energy.
    pub fn energies(&self) -> Vec<f64> {
        self.regions
            .iter()
            .flat_map(|region| region.energies(self.edge))
            .collect()
    }

    /// Total energies across all regions.
    pub fn num_points(&self) -> usize {
        self.regions.iter().map(EnergyRegion::point_count).sum()
    }
}

/// A validated scan, dispatched on by [`crate::experiment::ScanEngine::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scan_type", rename_all = "lowercase")]
pub enum ScanConfig {
    /// One motor over an evenly spaced range.
    Linear(LinearScan),
    /// Two motors over a row-major grid.
    Mesh(MeshScan),
    /// Energy motor through edge-relative regions.
    Xafs(XafsScan),
}

impl ScanConfig {
    /// Discriminant as used in scan definitions and record metadata.
    pub fn scan_type(&self) -> &'static str {
        match self {
            ScanConfig::Linear(_) => "linear",
            ScanConfig::Mesh(_) => "mesh",
            ScanConfig::Xafs(_) => "xafs",
        }
    }

    /// Detectors and dwell time of any variant.
    pub fn acquisition(&self) -> &Acquisition {
        match self {
            ScanConfig::Linear(scan) => scan.acquisition(),
            ScanConfig::Mesh(scan) => scan.acquisition(),
            ScanConfig::Xafs(scan) => scan.acquisition(),
        }
    }

    /// Motors moved by this scan, outer first.
    pub fn movers(&self) -> Vec<&str> {
        match self {
            ScanConfig::Linear(scan) => vec![scan.axis.motor()],
            ScanConfig::Mesh(scan) => vec![scan.outer.motor(), scan.inner.motor()],
            ScanConfig::Xafs(scan) => vec![scan.energy_pv()],
        }
    }

    /// Detectors in sampling order.
    pub fn detectors(&self) -> &[String] {
        self.acquisition().detectors()
    }

    /// Points the scan will visit.
    pub fn num_points(&self) -> usize {
        match self {
            ScanConfig::Linear(scan) => scan.num_points(),
            ScanConfig::Mesh(scan) => scan.num_points(),
            ScanConfig::Xafs(scan) => scan.num_points(),
        }
    }
}

impl From<LinearScan> for ScanConfig {
    fn from(scan: LinearScan) -> Self {
        ScanConfig::Linear(scan)
    }
}

impl From<MeshScan> for ScanConfig {
    fn from(scan: MeshScan) -> Self {
        ScanConfig::Mesh(scan)
    }
}

impl From<XafsScan> for ScanConfig {
    fn from(scan: XafsScan) -> Self {
        ScanConfig::Xafs(scan)
    }
}
