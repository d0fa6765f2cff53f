//! Detector channel.

use crate::error::DaqResult;
use crate::transport::SharedTransport;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::instrument;

/// A readout addressed by one process variable.
pub struct Detector {
    pv: String,
    transport: SharedTransport,
}

impl Detector {
    /// Detector reading `pv`.
    pub fn new(pv: impl Into<String>, transport: SharedTransport) -> Self {
        Self {
            pv: pv.into(),
            transport,
        }
    }

    /// Readout identifier.
    pub fn pv(&self) -> &str {
        &self.pv
    }

    /// One reading.
    pub async fn read(&self) -> DaqResult<f64> {
        self.transport.lock().await.get(&self.pv).await
    }

    /// Take `n` readings in acquisition order, sleeping `dwell` between them.
    ///
    /// The first failed read aborts the whole call; no partial readings are returned.
    #[instrument(skip(self), fields(detector = %self.pv), err)]
    pub async fn read_multiple(&self, n: usize, dwell: Duration) -> DaqResult<Vec<f64>> {
        let mut readings = Vec::with_capacity(n);
        for i in 0..n {
            if i > 0 {
                sleep(dwell).await;
            }
            readings.push(self.read().await?);
        }
        Ok(readings)
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector").field("pv", &self.pv).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{shared, MockTransport};
    use tokio::time::Instant;

    const I0: &str = "BL02:DET:I0";

    #[tokio::test]
    async fn single_read() {
        let detector = Detector::new(I0, shared(MockTransport::connected().with_pv(I0, 1.5e6)));
        assert_eq!(detector.read().await.unwrap(), 1.5e6);
    }

    #[tokio::test(start_paused = true)]
    async fn readings_keep_acquisition_order_and_dwell_between() {
        let mock = MockTransport::connected().with_readings(I0, [3.0, 1.0, 2.0]);
        let detector = Detector::new(I0, shared(mock));

        let started = Instant::now();
        let readings = detector
            .read_multiple(3, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(readings, vec![3.0, 1.0, 2.0]);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(400) && elapsed < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_read_aborts_the_batch() {
        let mock = MockTransport::connected()
            .with_pv(I0, 1.0)
            .fail_on("GET:BL02:DET:I0", 2, "READ_ERROR");
        let log = mock.call_log();
        let detector = Detector::new(I0, shared(mock));

        let err = detector
            .read_multiple(5, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.protocol_code(), Some("READ_ERROR"));
        assert_eq!(log.lock().len(), 3);
    }

    #[tokio::test]
    async fn zero_readings_is_empty() {
        let detector = Detector::new(I0, shared(MockTransport::connected()));
        assert!(detector
            .read_multiple(0, Duration::from_secs(1))
            .await
            .unwrap()
            .is_empty());
    }
}
