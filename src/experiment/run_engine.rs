//! Scan engine.
//!
//! Drives motors and detectors through the points of a [`ScanConfig`] and assembles a
//! [`ScanRecord`]. Every point follows the same procedure:
//!
//! 1. **Moving**: each motor is moved to its target and awaited until idle
//! 2. **Dwelling**: sleep for the configured dwell time
//! 3. **Sampling**: take one timestamp, then read every detector in listed order
//!
//! Runs are fail-fast. The first transport or device error aborts the run, the error
//! is returned unchanged, and nothing sampled so far is returned.

use super::plan::{Acquisition, LinearScan, MeshScan, ScanConfig, XafsScan};
use super::record::{Channel, Metadata, ScanRecord};
use super::state::EngineState;
use crate::config::MotionSettings;
use crate::error::DaqResult;
use crate::hardware::motor::{DEFAULT_MOTION_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::hardware::{Detector, Motor};
use crate::transport::SharedTransport;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Everything the per-point loop needs, independent of the scan variant.
struct RunPlan<'a> {
    scan_type: &'static str,
    motors: Vec<&'a str>,
    /// One target per motor for every point, in visiting order.
    points: Vec<Vec<f64>>,
    acquisition: &'a Acquisition,
    metadata: Metadata,
}

/// Sequential scan executor bound to one transport.
pub struct ScanEngine {
    transport: SharedTransport,
    motion_timeout: Duration,
    poll_interval: Duration,
    state: EngineState,
}

impl ScanEngine {
    /// Engine with a 60 s motion timeout and 100 ms status polling.
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            transport,
            motion_timeout: DEFAULT_MOTION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: EngineState::NotStarted,
        }
    }

    /// Engine using the motion timeout and poll interval from settings.
    pub fn from_settings(transport: SharedTransport, motion: &MotionSettings) -> Self {
        Self::new(transport)
            .with_motion_timeout(motion.timeout())
            .with_poll_interval(motion.poll_interval())
    }

    /// Override the per-move timeout.
    pub fn with_motion_timeout(mut self, timeout: Duration) -> Self {
        self.motion_timeout = timeout;
        self
    }

    /// Override the `STATUS` poll spacing.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Per-move timeout.
    pub fn motion_timeout(&self) -> Duration {
        self.motion_timeout
    }

    /// Run whichever scan `config` describes.
    pub async fn run(&mut self, config: &ScanConfig) -> DaqResult<ScanRecord> {
        match config {
            ScanConfig::Linear(scan) => self.run_linear(scan).await,
            ScanConfig::Mesh(scan) => self.run_mesh(scan).await,
            ScanConfig::Xafs(scan) => self.run_xafs(scan).await,
        }
    }

    /// Step one motor through its positions.
    pub async fn run_linear(&mut self, scan: &LinearScan) -> DaqResult<ScanRecord> {
        let axis = scan.axis();
        let mut metadata = Metadata::new();
        metadata.insert("motor".into(), json!(axis.motor()));
        metadata.insert("start".into(), json!(axis.start()));
        metadata.insert("stop".into(), json!(axis.stop()));
        metadata.insert("steps".into(), json!(axis.steps()));

        self.execute(RunPlan {
            scan_type: "linear",
            motors: vec![axis.motor()],
            points: scan.positions().into_iter().map(|p| vec![p]).collect(),
            acquisition: scan.acquisition(),
            metadata,
        })
        .await
    }

    /// Row-major grid: the inner motor sweeps its full range for every outer position.
    pub async fn run_mesh(&mut self, scan: &MeshScan) -> DaqResult<ScanRecord> {
        let (outer, inner) = (scan.outer(), scan.inner());
        let mut metadata = Metadata::new();
        for (key, axis) in [("motor1", outer), ("motor2", inner)] {
            metadata.insert(
                key.into(),
                json!({
                    "motor": axis.motor(),
                    "start": axis.start(),
                    "stop": axis.stop(),
                    "steps": axis.steps(),
                }),
            );
        }

        self.execute(RunPlan {
            scan_type: "mesh",
            motors: vec![outer.motor(), inner.motor()],
            points: scan.grid().into_iter().map(|(o, i)| vec![o, i]).collect(),
            acquisition: scan.acquisition(),
            metadata,
        })
        .await
    }

    /// Step the energy motor through every region.
    pub async fn run_xafs(&mut self, scan: &XafsScan) -> DaqResult<ScanRecord> {
        let mut metadata = Metadata::new();
        metadata.insert("energy_pv".into(), json!(scan.energy_pv()));
        metadata.insert("edge".into(), json!(scan.edge()));
        metadata.insert(
            "regions".into(),
            json!(scan
                .regions()
                .iter()
                .map(|r| [r.start(), r.stop(), r.step()])
                .collect::<Vec<_>>()),
        );

        self.execute(RunPlan {
            scan_type: "xafs",
            motors: vec![scan.energy_pv()],
            points: scan.energies().into_iter().map(|e| vec![e]).collect(),
            acquisition: scan.acquisition(),
            metadata,
        })
        .await
    }

    #[instrument(
        skip_all,
        fields(scan_type = plan.scan_type, points = plan.points.len()),
        err
    )]
    async fn execute(&mut self, mut plan: RunPlan<'_>) -> DaqResult<ScanRecord> {
        let run_uid = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        plan.metadata.insert("scan_type".into(), json!(plan.scan_type));
        plan.metadata.insert("detectors".into(), json!(plan.acquisition.detectors()));
        plan.metadata.insert("dwell_time".into(), json!(plan.acquisition.dwell_time()));
        plan.metadata.insert("num_points".into(), json!(plan.points.len()));
        plan.metadata.insert("run_uid".into(), json!(run_uid));
        plan.metadata.insert("started_at".into(), json!(started_at.to_rfc3339()));

        info!(run_uid = %run_uid, motors = ?plan.motors, "Starting scan");

        let result = self
            .sample_points(&plan, started_at)
            .await
            .and_then(|(motors, detectors, timestamps)| {
                let record =
                    ScanRecord::from_parts(motors, detectors, timestamps, plan.metadata.clone());
                record.validate()?;
                Ok(record)
            });

        match result {
            Ok(record) => {
                self.state = EngineState::Done;
                info!(run_uid = %run_uid, samples = record.len(), "Scan complete");
                Ok(record)
            }
            Err(e) => {
                self.state = EngineState::Failed;
                error!(run_uid = %run_uid, error = %e, "Scan aborted");
                Err(e)
            }
        }
    }

    async fn sample_points(
        &mut self,
        plan: &RunPlan<'_>,
        started_at: DateTime<Utc>,
    ) -> DaqResult<(Vec<Channel>, Vec<Channel>, Vec<f64>)> {
        let motors = plan
            .motors
            .iter()
            .map(|pv| {
                Motor::new(*pv, self.transport.clone())
                    .map(|m| m.with_poll_interval(self.poll_interval))
            })
            .collect::<DaqResult<Vec<_>>>()?;
        let detectors: Vec<Detector> = plan
            .acquisition
            .detectors()
            .iter()
            .map(|pv| Detector::new(pv.as_str(), self.transport.clone()))
            .collect();

        let total = plan.points.len();
        let mut motor_values = vec![Vec::with_capacity(total); motors.len()];
        let mut detector_values = vec![Vec::with_capacity(total); detectors.len()];
        let mut timestamps = Vec::with_capacity(total);

        let epoch_secs =
            started_at.timestamp() as f64 + f64::from(started_at.timestamp_subsec_nanos()) * 1e-9;
        let clock = Instant::now();
        let dwell = plan.acquisition.dwell();

        for (index, targets) in plan.points.iter().enumerate() {
            self.state = EngineState::Moving;
            for (motor, &target) in motors.iter().zip(targets) {
                motor.move_to(target, true, self.motion_timeout).await?;
            }

            self.state = EngineState::Dwelling;
            sleep(dwell).await;

            self.state = EngineState::Sampling;
            timestamps.push(epoch_secs + clock.elapsed().as_secs_f64());
            for (values, detector) in detector_values.iter_mut().zip(&detectors) {
                values.push(detector.read().await?);
            }
            for (values, &target) in motor_values.iter_mut().zip(targets) {
                values.push(target);
            }
            debug!(point = index + 1, total, "Point sampled");
        }

        Ok((
            channels(plan.motors.iter().copied(), motor_values),
            channels(plan.acquisition.detectors().iter(), detector_values),
            timestamps,
        ))
    }
}

fn channels<I, S>(names: I, values: Vec<Vec<f64>>) -> Vec<Channel>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .zip(values)
        .map(|(name, values)| Channel::new(name, values))
        .collect()
}
