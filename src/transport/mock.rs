//! Simulated device server for testing
//!
//! `MockTransport` implements [`Transport`] without a socket. It answers every command
//! with a response line produced by a small in-memory beamline model, so the verb
//! parsing and error mapping in [`Transport`] run exactly as they do over TCP. It
//! provides:
//! - a process-variable table with optional reading sequences per PV
//! - motors whose `.RBV` readback follows `MOVE` and whose status can be scripted
//! - error and raw-line injection keyed on the encoded command
//! - a call log for test verification

use super::{Command, ConnectionState, Transport};
use crate::error::{DaqError, DaqResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// One injected response, consumed by the first matching command after `skip` others.
#[derive(Debug, Clone)]
struct Injection {
    command: String,
    skip: usize,
    line: String,
}

#[derive(Debug, Default, Clone)]
struct SimMotor {
    position: f64,
    status_script: VecDeque<String>,
    moving_polls_per_move: usize,
}

/// In-memory stand-in for the device server.
///
/// # Example
///
/// ```
/// use beamline_daq::transport::{MockTransport, Transport};
///
/// # tokio_test::block_on(async {
/// let mut transport = MockTransport::new().with_pv("BL02:RING:CURRENT", 350.5);
/// transport.connect().await.unwrap();
/// assert_eq!(transport.get("BL02:RING:CURRENT").await.unwrap(), 350.5);
/// # })
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: bool,
    pvs: BTreeMap<String, f64>,
    readings: HashMap<String, VecDeque<f64>>,
    motors: BTreeMap<String, SimMotor>,
    injections: Vec<Injection>,
    monitoring: Option<(String, u32)>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    /// Create a disconnected simulator with an empty PV table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a simulator that starts out connected.
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    /// Add (or overwrite) a process variable.
    pub fn with_pv(mut self, pv: &str, value: f64) -> Self {
        self.pvs.insert(pv.to_string(), value);
        self
    }

    /// Queue successive readings for a PV. Each `GET` consumes one; once the queue is
    /// empty the PV keeps its last value.
    pub fn with_readings(mut self, pv: &str, values: impl IntoIterator<Item = f64>) -> Self {
        let queue: VecDeque<f64> = values.into_iter().collect();
        if let Some(first) = queue.front() {
            self.pvs.entry(pv.to_string()).or_insert(*first);
        }
        self.readings.insert(pv.to_string(), queue);
        self
    }

    /// Add a motor at `position`. Its readback PV is `<pv>.RBV`.
    pub fn with_motor(mut self, pv: &str, position: f64) -> Self {
        self.motors.insert(
            pv.to_string(),
            SimMotor {
                position,
                ..SimMotor::default()
            },
        );
        self
    }

    /// Every `MOVE` of this motor is followed by `polls` `MOVING` status answers
    /// before it reports `IDLE`.
    pub fn with_motion_polls(mut self, motor: &str, polls: usize) -> Self {
        self.motors
            .entry(motor.to_string())
            .or_default()
            .moving_polls_per_move = polls;
        self
    }

    /// Script the next status answers of a motor verbatim (e.g. `MOVING`, `HOMING`).
    pub fn with_status_script<I, S>(mut self, motor: &str, script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let motor = self.motors.entry(motor.to_string()).or_default();
        motor.status_script.extend(script.into_iter().map(Into::into));
        self
    }

    /// Answer the `(skip + 1)`-th occurrence of `command` (encoded form, e.g.
    /// `GET:BL02:DET:I0`) with `ERR:<code>`.
    pub fn fail_on(self, command: &str, skip: usize, code: &str) -> Self {
        self.respond_on(command, skip, &format!("ERR:{code}"))
    }

    /// Answer the `(skip + 1)`-th occurrence of `command` with an arbitrary raw line.
    pub fn respond_on(mut self, command: &str, skip: usize, line: &str) -> Self {
        self.injections.push(Injection {
            command: command.to_string(),
            skip,
            line: line.to_string(),
        });
        self
    }

    /// Handle to the log of encoded commands, usable after the transport has been
    /// moved into a [`super::SharedTransport`].
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_log)
    }

    /// Current simulated position of a motor.
    pub fn motor_position(&self, motor: &str) -> Option<f64> {
        self.motors.get(motor).map(|m| m.position)
    }

    /// PV currently being monitored, if any.
    pub fn monitoring(&self) -> Option<(&str, u32)> {
        self.monitoring
            .as_ref()
            .map(|(pv, interval)| (pv.as_str(), *interval))
    }

    fn take_injection(&mut self, encoded: &str) -> Option<String> {
        let mut hit = None;
        for (idx, injection) in self.injections.iter_mut().enumerate() {
            if injection.command != encoded {
                continue;
            }
            if injection.skip == 0 {
                hit = Some(idx);
                break;
            }
            injection.skip -= 1;
        }
        hit.map(|idx| self.injections.remove(idx).line)
    }

    fn read_pv(&mut self, pv: &str) -> Option<f64> {
        if let Some(base) = pv.strip_suffix(".RBV") {
            if let Some(motor) = self.motors.get(base) {
                return Some(motor.position);
            }
        }
        if let Some(motor) = self.motors.get(pv) {
            return Some(motor.position);
        }
        if let Some(queue) = self.readings.get_mut(pv) {
            if let Some(value) = queue.pop_front() {
                self.pvs.insert(pv.to_string(), value);
                return Some(value);
            }
        }
        self.pvs.get(pv).copied()
    }

    fn respond(&mut self, command: &Command) -> String {
        match command {
            Command::Get { pv } => match self.read_pv(pv) {
                Some(value) => format!("OK:{value}"),
                None => "ERR:UNKNOWN_PV".to_string(),
            },
            Command::Put { pv, value } => {
                if !value.is_finite() {
                    return "ERR:INVALID_VALUE".to_string();
                }
                match self.pvs.get_mut(pv) {
                    Some(slot) => {
                        *slot = *value;
                        "OK:PUT".to_string()
                    }
                    None => "ERR:UNKNOWN_PV".to_string(),
                }
            }
            Command::Move { motor, position } => {
                if !position.is_finite() {
                    return "ERR:INVALID_VALUE".to_string();
                }
                match self.motors.get_mut(motor) {
                    Some(sim) => {
                        sim.position = *position;
                        let polls = sim.moving_polls_per_move;
                        sim.status_script
                            .extend(std::iter::repeat("MOVING".to_string()).take(polls));
                        "OK:MOVING".to_string()
                    }
                    None => "ERR:UNKNOWN_PV".to_string(),
                }
            }
            Command::Status { motor } => match self.motors.get_mut(motor) {
                Some(sim) => {
                    let status = sim
                        .status_script
                        .pop_front()
                        .unwrap_or_else(|| "IDLE".to_string());
                    format!("OK:{status}")
                }
                None => "ERR:UNKNOWN_PV".to_string(),
            },
            Command::List { pattern } => {
                let names: Vec<String> = self
                    .pvs
                    .keys()
                    .chain(self.motors.keys())
                    .filter(|name| {
                        pattern
                            .as_deref()
                            .map_or(true, |p| glob_match(p, name))
                    })
                    .cloned()
                    .collect();
                format!("OK:{}", names.join(","))
            }
            Command::Monitor { pv, interval_ms } => {
                if self.read_pv(pv).is_none() {
                    return "ERR:UNKNOWN_PV".to_string();
                }
                self.monitoring = Some((pv.clone(), *interval_ms));
                "OK:MONITORING".to_string()
            }
            Command::Stop => {
                self.monitoring = None;
                "OK:STOPPED".to_string()
            }
            Command::Ping => "OK:PONG".to_string(),
            Command::Quit => "OK:BYE".to_string(),
        }
    }
}

/// Glob matching with `*` wildcards only, as the device server implements it.
fn glob_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let (first, rest) = parts.split_first().map_or(("", &[][..]), |(f, r)| (*f, r));
    let Some(mut remainder) = name.strip_prefix(first) else {
        return false;
    };
    let (last, middle) = rest.split_last().map_or(("", &[][..]), |(l, m)| (*l, m));

    for part in middle {
        match remainder.find(part) {
            Some(pos) => remainder = &remainder[pos + part.len()..],
            None => return false,
        }
    }
    remainder.len() >= last.len() && remainder.ends_with(last)
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> DaqResult<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn exchange(&mut self, command: &Command) -> DaqResult<String> {
        if !self.connected {
            return Err(DaqError::NotConnected);
        }
        let encoded = command.encode();
        self.call_log.lock().push(encoded.clone());

        if let Some(line) = self.take_injection(&encoded) {
            return Ok(line);
        }
        Ok(self.respond(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_and_put_round_trip_through_table() {
        let mut mock = MockTransport::connected().with_pv("BL02:SHUTTER:CMD", 0.0);

        mock.put("BL02:SHUTTER:CMD", 1.0).await.unwrap();
        assert_eq!(mock.get("BL02:SHUTTER:CMD").await.unwrap(), 1.0);
        assert_eq!(
            mock.call_log().lock().as_slice(),
            &["PUT:BL02:SHUTTER:CMD:1", "GET:BL02:SHUTTER:CMD"]
        );
    }

    #[tokio::test]
    async fn unknown_pv_is_rejected_by_server() {
        let mut mock = MockTransport::connected();
        let err = mock.get("BL02:NOPE").await.unwrap_err();
        assert_eq!(err.protocol_code(), Some("UNKNOWN_PV"));
    }

    #[tokio::test]
    async fn move_updates_readback_and_scripts_motion() {
        let mut mock = MockTransport::connected()
            .with_motor("BL02:SAMPLE:X", 0.0)
            .with_motion_polls("BL02:SAMPLE:X", 2);

        assert_eq!(mock.motor_position("BL02:SAMPLE:X"), Some(0.0));
        mock.move_motor("BL02:SAMPLE:X", 12.5).await.unwrap();
        assert_eq!(mock.motor_position("BL02:SAMPLE:X"), Some(12.5));
        assert_eq!(mock.motor_position("BL02:SAMPLE:Y"), None);
        assert_eq!(mock.get("BL02:SAMPLE:X.RBV").await.unwrap(), 12.5);
        assert_eq!(mock.status("BL02:SAMPLE:X").await.unwrap(), "MOVING");
        assert_eq!(mock.status("BL02:SAMPLE:X").await.unwrap(), "MOVING");
        assert_eq!(mock.status("BL02:SAMPLE:X").await.unwrap(), "IDLE");
    }

    #[tokio::test]
    async fn injections_fire_on_the_requested_occurrence() {
        let mut mock = MockTransport::connected()
            .with_pv("BL02:DET:I0", 1.0)
            .fail_on("GET:BL02:DET:I0", 1, "INTERNAL")
            .respond_on("PING", 0, "GARBAGE");

        assert!(mock.get("BL02:DET:I0").await.is_ok());
        let err = mock.get("BL02:DET:I0").await.unwrap_err();
        assert_eq!(err.protocol_code(), Some("INTERNAL"));
        assert!(mock.get("BL02:DET:I0").await.is_ok());

        let err = mock.ping().await.unwrap_err();
        assert_eq!(err.protocol_code(), Some("INVALID"));
        assert!(mock.ping().await.is_ok());
    }

    #[tokio::test]
    async fn reading_sequences_are_consumed_in_order() {
        let mut mock = MockTransport::connected().with_readings("BL02:DET:I0", [1.0, 2.0, 3.0]);
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(mock.get("BL02:DET:I0").await.unwrap());
        }
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 3.0]);
    }

    #[tokio::test]
    async fn list_filters_with_wildcards() {
        let mut mock = MockTransport::connected()
            .with_pv("BL02:DET:I0", 1.0)
            .with_pv("BL02:DET:IT", 1.0)
            .with_pv("BL02:RING:CURRENT", 350.0)
            .with_motor("BL02:SAMPLE:X", 0.0);

        assert_eq!(
            mock.list_pvs(Some("BL02:DET:*")).await.unwrap(),
            vec!["BL02:DET:I0".to_string(), "BL02:DET:IT".to_string()]
        );
        assert_eq!(mock.list_pvs(None).await.unwrap().len(), 4);
        assert!(mock.list_pvs(Some("BL09:*")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn monitor_is_tracked_but_streams_nothing() {
        let mut mock = MockTransport::connected().with_pv("BL02:DET:I0", 1.0);
        mock.monitor_start("BL02:DET:I0", 100).await.unwrap();
        assert_eq!(mock.monitoring(), Some(("BL02:DET:I0", 100)));
        mock.monitor_stop().await.unwrap();
        assert_eq!(mock.monitoring(), None);
    }

    #[tokio::test]
    async fn disconnected_mock_refuses_commands() {
        let mut mock = MockTransport::new().with_pv("BL02:DET:I0", 1.0);
        assert!(matches!(mock.get("BL02:DET:I0").await, Err(DaqError::NotConnected)));
        mock.connect().await.unwrap();
        assert!(mock.get("BL02:DET:I0").await.is_ok());
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("BL02:DET:*", "BL02:DET:I0"));
        assert!(glob_match("*:I0", "BL02:DET:I0"));
        assert!(glob_match("BL02:*:I0", "BL02:DET:I0"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("BL02:DET:I0", "BL02:DET:I0"));
        assert!(!glob_match("BL02:DET:I0", "BL02:DET:IT"));
        assert!(!glob_match("BL02:*:X", "BL02:DET:I0"));
        assert!(!glob_match("A*A", "A"));
    }
}
