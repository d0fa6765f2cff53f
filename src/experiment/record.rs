//! Scan record: the result of one successful run.
//!
//! Channels are kept in the order the scan lists them (motors outer first, detectors
//! in sampling order). Every channel holds one value per timestamp.

use crate::error::{DaqError, DaqResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Free-form run metadata.
pub type Metadata = BTreeMap<String, Value>;

/// Named sequence of values, one per sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    /// Motor or detector identifier.
    pub name: String,
    /// One value per sample, in acquisition order.
    pub values: Vec<f64>,
}

impl Channel {
    /// Channel named `name` holding `values`.
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Result of a completed scan: one channel per motor and per detector, sharing a timestamp axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    motors: Vec<Channel>,
    detectors: Vec<Channel>,
    /// Seconds since the Unix epoch.
    timestamps: Vec<f64>,
    metadata: Metadata,
}

impl ScanRecord {
    /// Assemble a record without checking it; see [`ScanRecord::validate`].
    pub fn from_parts(
        motors: Vec<Channel>,
        detectors: Vec<Channel>,
        timestamps: Vec<f64>,
        metadata: Metadata,
    ) -> Self {
        Self {
            motors,
            detectors,
            timestamps,
            metadata,
        }
    }

    /// Motor channels, in the order the scan moves them.
    pub fn motors(&self) -> &[Channel] {
        &self.motors
    }

    /// Detector channels, in configuration order.
    pub fn detectors(&self) -> &[Channel] {
        &self.detectors
    }

    /// Positions of one motor, if it took part in the scan.
    pub fn motor(&self, name: &str) -> Option<&[f64]> {
        find(&self.motors, name)
    }

    /// Readings of one detector, if it was sampled.
    pub fn detector(&self, name: &str) -> Option<&[f64]> {
        find(&self.detectors, name)
    }

    /// Sample times in seconds since the Unix epoch.
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Run metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Metadata is the only part of a record callers may change.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when no point was sampled.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Consistency check.
    ///
    /// A valid record has at least one timestamp, only finite values, non-decreasing
    /// timestamps, and every channel as long as the timestamp sequence.
    pub fn validate(&self) -> DaqResult<()> {
        if self.timestamps.is_empty() {
            return Err(DaqError::InvalidRecord("timestamps must not be empty".into()));
        }
        if self.timestamps.iter().any(|t| !t.is_finite()) {
            return Err(DaqError::InvalidRecord("timestamps must be finite".into()));
        }
        if self.timestamps.windows(2).any(|w| w[1] < w[0]) {
            return Err(DaqError::InvalidRecord(
                "timestamps must be non-decreasing".into(),
            ));
        }

        let expected = self.timestamps.len();
        for (kind, channel) in self
            .motors
            .iter()
            .map(|c| ("motor", c))
            .chain(self.detectors.iter().map(|c| ("detector", c)))
        {
            if channel.values.len() != expected {
                return Err(DaqError::InvalidRecord(format!(
                    "{kind} {} has {} values, expected {expected}",
                    channel.name,
                    channel.values.len()
                )));
            }
            if channel.values.iter().any(|v| !v.is_finite()) {
                return Err(DaqError::InvalidRecord(format!(
                    "{kind} {} contains non-finite values",
                    channel.name
                )));
            }
        }
        Ok(())
    }
}

fn find<'a>(channels: &'a [Channel], name: &str) -> Option<&'a [f64]> {
    channels
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.values.as_slice())
}
