//! Captured-traffic buffer and the navigation wait.
//!
//! The browser's response-delivery task appends bodies while the
//! orchestrator polls the length, so the buffer lives behind a shared lock.
//! Clearing happens only at domain start, before a new navigation, when no
//! appends for the previous domain can still be in flight.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

/// Interval between length checks while waiting for traffic.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Append-only collection of response bodies observed during a domain visit.
///
/// Cloning yields another handle to the same buffer; the CDP event task
/// holds one clone, the orchestrator another.
#[derive(Debug, Clone, Default)]
pub struct TrafficRecorder {
    inner: Arc<Mutex<Vec<String>>>,
}

impl TrafficRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one response body. Called from the delivery task.
    pub fn record(&self, body: String) {
        self.inner.lock().expect("traffic buffer poisoned").push(body);
    }

    /// Number of bodies captured so far.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("traffic buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out everything captured so far.
    pub fn bodies(&self) -> Vec<String> {
        self.inner.lock().expect("traffic buffer poisoned").clone()
    }

    /// Drop all captured bodies. Must only be called at domain start so a
    /// late append for the previous domain cannot leak into the next one.
    pub fn reset(&self) {
        self.inner.lock().expect("traffic buffer poisoned").clear();
    }
}

/// Block until the recorder holds at least `min_count` bodies or `timeout`
/// elapses.
///
/// Traffic volume is a heuristic proxy for "the page finished loading its
/// trackers", not a hard contract: on timeout the shortfall is logged and
/// the pipeline proceeds with whatever was captured.
pub async fn wait_for_threshold(
    recorder: &TrafficRecorder,
    min_count: usize,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let captured = recorder.len();
        if captured >= min_count {
            debug!(captured, threshold = min_count, "traffic threshold reached");
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                captured,
                threshold = min_count,
                "timed out waiting for network traffic, proceeding with partial capture"
            );
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_reset() {
        let recorder = TrafficRecorder::new();
        recorder.record("a".into());
        recorder.record("b".into());
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.bodies(), vec!["a".to_string(), "b".to_string()]);

        recorder.reset();
        assert!(recorder.is_empty());
    }

    #[test]
    fn clones_share_the_buffer() {
        let recorder = TrafficRecorder::new();
        let handle = recorder.clone();
        handle.record("from the delivery task".into());
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn concurrent_appends_are_all_observed() {
        let recorder = TrafficRecorder::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let r = recorder.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        r.record(format!("{i}-{j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("append thread");
        }
        assert_eq!(recorder.len(), 400);
    }

    #[tokio::test]
    async fn wait_returns_true_once_threshold_met() {
        let recorder = TrafficRecorder::new();
        let handle = recorder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            for _ in 0..3 {
                handle.record("body".into());
            }
        });

        let met = wait_for_threshold(&recorder, 3, Duration::from_secs(5)).await;
        assert!(met);
        assert_eq!(recorder.len(), 3);
    }

    #[tokio::test]
    async fn wait_degrades_on_timeout() {
        let recorder = TrafficRecorder::new();
        recorder.record("only one".into());

        let met = wait_for_threshold(&recorder, 100, Duration::from_millis(50)).await;
        assert!(!met);
        // Partial capture survives the timeout.
        assert_eq!(recorder.len(), 1);
    }
}
