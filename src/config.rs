//! Settings and scan definitions using Figment
//!
//! Settings are layered from:
//! 1. Built-in defaults
//! 2. `config/beamline.toml` (or a file given on the command line)
//! 3. Environment variables prefixed with `BEAMLINE_DAQ_`, nested keys separated by `__`
//!    (e.g. `BEAMLINE_DAQ_CONNECTION__PORT=6064`)
//!
//! Scan definitions are separate TOML documents tagged with `scan_type` and are turned
//! into a validated [`ScanConfig`].
//!
//! # Example
//! ```no_run
//! use beamline_daq::config::{load_scan, Settings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load()?;
//! settings.validate()?;
//! let scan = load_scan("scans/cu_kedge.toml")?;
//! println!("{} points at {}:{}", scan.num_points(), settings.connection.host, settings.connection.port);
//! # Ok(())
//! # }
//! ```

use crate::error::{DaqError, DaqResult};
use crate::experiment::plan::{
    Acquisition, AxisRange, EnergyRegion, LinearScan, MeshScan, ScanConfig, XafsScan,
    DEFAULT_DWELL_TIME, DEFAULT_ENERGY_PV,
};
use crate::transport::tcp::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings file read when none is given explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "config/beamline.toml";

/// Prefix of environment variables overriding settings.
pub const ENV_PREFIX: &str = "BEAMLINE_DAQ_";

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Device server connection
    pub connection: ConnectionSettings,
    /// Motion completion polling
    pub motion: MotionSettings,
    /// Log output
    pub logging: LoggingSettings,
}

/// Device server address and I/O timeout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Device server host name or address.
    pub host: String,
    /// Device server TCP port.
    pub port: u16,
    /// Connect, send and receive timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ConnectionSettings {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Bounds for waiting on motors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Give up on a move after this many seconds
    pub timeout_secs: u64,
    /// Spacing of `STATUS` polls in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            poll_interval_ms: 100,
        }
    }
}

impl MotionSettings {
    /// Motion timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Poll spacing as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    /// pretty, compact or json
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> DaqResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment. A missing file leaves the
    /// defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> DaqResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// The provider stack, for callers that want to merge in more sources.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate settings after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        if self.connection.host.trim().is_empty() {
            return Err("connection.host must not be empty".to_string());
        }
        if self.connection.port == 0 {
            return Err("connection.port must not be 0".to_string());
        }
        if self.connection.timeout_ms == 0 {
            return Err("connection.timeout_ms must be > 0".to_string());
        }
        if self.motion.timeout_secs == 0 {
            return Err("motion.timeout_secs must be > 0".to_string());
        }
        if self.motion.poll_interval_ms == 0 {
            return Err("motion.poll_interval_ms must be > 0".to_string());
        }

        Ok(())
    }
}

/// One motor range inside a mesh definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisDefinition {
    /// Motor identifier.
    pub motor: String,
    /// First position.
    pub start: f64,
    /// Last position.
    pub stop: f64,
    /// Number of points, endpoints included.
    pub steps: usize,
}

/// One energy region, offsets relative to the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDefinition {
    /// Offset of the first energy from the edge, in eV.
    pub start: f64,
    /// Offset of the last energy from the edge, in eV.
    pub stop: f64,
    /// Energy step in eV.
    pub step: f64,
}

/// Scan definition as written in a TOML file.
///
/// ```toml
/// scan_type = "linear"
/// detectors = ["BL02:DET:I0"]
/// dwell_time = 0.5
/// motor = "BL02:SAMPLE:X"
/// start = -1000.0
/// stop = 1000.0
/// steps = 5
/// ```
///
/// Which of the optional fields are required depends on `scan_type`:
/// `linear` needs `motor`/`start`/`stop`/`steps`, `mesh` needs `motor1` and `motor2`
/// tables, `xafs` needs `edge` and at least one `[[regions]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDefinition {
    /// `linear`, `mesh` or `xafs`.
    pub scan_type: String,
    /// Detectors read at every point, in order.
    #[serde(default)]
    pub detectors: Vec<String>,
    /// Settle time before sampling, in seconds.
    #[serde(default = "default_dwell_time")]
    pub dwell_time: f64,

    /// Linear scan motor.
    #[serde(default)]
    pub motor: Option<String>,
    /// Linear scan start position.
    #[serde(default)]
    pub start: Option<f64>,
    /// Linear scan stop position.
    #[serde(default)]
    pub stop: Option<f64>,
    /// Linear scan point count.
    #[serde(default)]
    pub steps: Option<usize>,

    /// Outer (slow) mesh axis.
    #[serde(default)]
    pub motor1: Option<AxisDefinition>,
    /// Inner (fast) mesh axis.
    #[serde(default)]
    pub motor2: Option<AxisDefinition>,

    /// Absorption edge energy in eV.
    #[serde(default)]
    pub edge: Option<f64>,
    /// Energy motor for XAFS scans.
    #[serde(default = "default_energy_pv")]
    pub energy_pv: String,
    /// XAFS regions in ascending order.
    #[serde(default)]
    pub regions: Vec<RegionDefinition>,
}

fn default_dwell_time() -> f64 {
    DEFAULT_DWELL_TIME
}

fn default_energy_pv() -> String {
    DEFAULT_ENERGY_PV.to_string()
}

fn required<T>(value: Option<T>, scan_type: &str, field: &str) -> DaqResult<T> {
    value.ok_or_else(|| {
        DaqError::InvalidConfiguration(format!("{scan_type} scan requires `{field}`"))
    })
}

impl ScanDefinition {
    /// Parse a definition from TOML text.
    pub fn from_toml_str(toml: &str) -> DaqResult<Self> {
        Ok(Figment::from(Toml::string(toml)).extract()?)
    }

    /// Read a definition file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> DaqResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DaqError::InvalidConfiguration(format!(
                "scan definition {} not found",
                path.display()
            )));
        }
        Ok(Figment::from(Toml::file(path)).extract()?)
    }
}

impl TryFrom<ScanDefinition> for ScanConfig {
    type Error = DaqError;

    fn try_from(def: ScanDefinition) -> DaqResult<Self> {
        let scan_type = def.scan_type.trim().to_lowercase();
        match scan_type.as_str() {
            "linear" => {
                let axis = AxisRange::new(
                    required(def.motor, "linear", "motor")?,
                    required(def.start, "linear", "start")?,
                    required(def.stop, "linear", "stop")?,
                    required(def.steps, "linear", "steps")?,
                )?;
                let acquisition = Acquisition::new(def.detectors, def.dwell_time)?;
                Ok(LinearScan::new(axis, acquisition).into())
            }
            "mesh" => {
                let axis = |def: Option<AxisDefinition>, field: &str| -> DaqResult<AxisRange> {
                    let a = required(def, "mesh", field)?;
                    AxisRange::new(a.motor, a.start, a.stop, a.steps)
                };
                let outer = axis(def.motor1, "motor1")?;
                let inner = axis(def.motor2, "motor2")?;
                let acquisition = Acquisition::new(def.detectors, def.dwell_time)?;
                Ok(MeshScan::new(outer, inner, acquisition)?.into())
            }
            "xafs" => {
                let edge = required(def.edge, "xafs", "edge")?;
                let regions = def
                    .regions
                    .iter()
                    .map(|r| EnergyRegion::new(r.start, r.stop, r.step))
                    .collect::<DaqResult<Vec<_>>>()?;
                let acquisition = Acquisition::new(def.detectors, def.dwell_time)?;
                Ok(XafsScan::new(def.energy_pv, edge, regions, acquisition)?.into())
            }
            other => Err(DaqError::UnsupportedConfiguration(format!(
                "unknown scan_type '{other}'"
            ))),
        }
    }
}

/// Load and validate a scan definition file.
pub fn load_scan<P: AsRef<Path>>(path: P) -> DaqResult<ScanConfig> {
    ScanConfig::try_from(ScanDefinition::from_file(path)?)
}
