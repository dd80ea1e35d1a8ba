//! Motion stability detection.
//!
//! Turns the raw motion stream into a boolean "device is held still" signal.
//! Each sample is compared with its immediate predecessor only:
//!
//! ```text
//! delta = |x - x_prev| + |y - y_prev| + |z - z_prev|
//! ```
//!
//! A sub-threshold delta starts a hold timer (if none is running). Once the
//! hold has run for `hold_ms` without interruption the device is stable. A
//! single delta at or above the threshold cancels the hold and drops stability
//! immediately, so the hold restarts from zero on the next quiet sample.
//!
//! The detector is clock-driven: it never sleeps. The hold timer is a deadline
//! checked on every sample and on [`MotionStabilityDetector::poll`], which lets
//! an event loop wake exactly at [`MotionStabilityDetector::hold_deadline`].
//!
//! Design note: O(1) per sample, one stored predecessor, no buffers.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::MotionSample;

/// Configuration for stability detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Delta below which a sample counts as still. Typical: 0.045.
    pub threshold: f32,
    /// Continuous still time before the device is declared stable (ms).
    pub hold_ms: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.045,
            hold_ms: 1500, // 7-8 samples at 200ms
        }
    }
}

/// Edge emitted when the stability signal flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityTransition {
    /// The hold elapsed; the device is now still.
    BecameStable,
    /// Movement exceeded the threshold.
    BecameUnstable,
}

/// Snapshot of the detector state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityState {
    /// Last accepted sample, `None` until primed.
    pub last_sample: Option<MotionSample>,
    /// Whether the device is currently still.
    pub is_stable: bool,
    /// Start of the running hold, `None` when no hold is running.
    pub stable_since: Option<u64>,
}

/// Stability detector with hold-time hysteresis.
pub struct MotionStabilityDetector {
    config: StabilityConfig,

    last_sample: Option<MotionSample>,
    is_stable: bool,
    stable_since: Option<u64>,

    // Statistics
    accepted_samples: u64,
    rejected_samples: u64,
}

impl MotionStabilityDetector {
    /// Create a new detector with the given configuration.
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            last_sample: None,
            is_stable: false,
            stable_since: None,
            accepted_samples: 0,
            rejected_samples: 0,
        }
    }

    /// Process one motion sample.
    ///
    /// Returns the stability edge caused by this sample, if any. Malformed or
    /// out-of-order samples are dropped and counted; they never touch state.
    pub fn process_sample(&mut self, sample: &MotionSample) -> Option<StabilityTransition> {
        if let Err(err) = sample.validate() {
            warn!(%err, "dropping motion sample");
            self.rejected_samples += 1;
            return None;
        }

        let Some(prev) = self.last_sample.replace(*sample) else {
            // First sample after (re)subscription only primes the predecessor.
            self.accepted_samples += 1;
            return None;
        };

        if sample.timestamp_ms < prev.timestamp_ms {
            warn!(
                timestamp_ms = sample.timestamp_ms,
                previous_ms = prev.timestamp_ms,
                "dropping out-of-order motion sample"
            );
            self.last_sample = Some(prev);
            self.rejected_samples += 1;
            return None;
        }
        self.accepted_samples += 1;

        let delta = sample.delta(&prev);
        if delta < self.config.threshold {
            if self.stable_since.is_none() {
                debug!(timestamp_ms = sample.timestamp_ms, delta, "stability hold started");
                self.stable_since = Some(sample.timestamp_ms);
            }
            self.poll(sample.timestamp_ms)
        } else {
            self.stable_since = None;
            if self.is_stable {
                debug!(timestamp_ms = sample.timestamp_ms, delta, "device moved");
                self.is_stable = false;
                Some(StabilityTransition::BecameUnstable)
            } else {
                None
            }
        }
    }

    /// Let the hold timer elapse at `now_ms` without a new sample.
    pub fn poll(&mut self, now_ms: u64) -> Option<StabilityTransition> {
        match self.hold_deadline() {
            Some(deadline) if now_ms >= deadline => {
                self.is_stable = true;
                debug!(now_ms, "device stable");
                Some(StabilityTransition::BecameStable)
            }
            _ => None,
        }
    }

    /// When the running hold will elapse, `None` if no hold is pending.
    pub fn hold_deadline(&self) -> Option<u64> {
        if self.is_stable {
            return None;
        }
        self.stable_since
            .map(|since| since.saturating_add(self.config.hold_ms))
    }

    /// Whether the device is currently still.
    pub fn is_stable(&self) -> bool {
        self.is_stable
    }

    /// Current state snapshot.
    pub fn state(&self) -> StabilityState {
        StabilityState {
            last_sample: self.last_sample,
            is_stable: self.is_stable,
            stable_since: self.stable_since,
        }
    }

    /// Drop stability and the running hold, keeping the predecessor.
    ///
    /// Used after a capture settles: the next auto-capture needs a fresh hold.
    pub fn clear_stability(&mut self) {
        self.is_stable = false;
        self.stable_since = None;
    }

    /// Reset the detector state, including the predecessor sample.
    pub fn reset(&mut self) {
        self.last_sample = None;
        self.clear_stability();
    }

    /// Sample statistics (accepted, rejected).
    pub fn statistics(&self) -> (u64, u64) {
        (self.accepted_samples, self.rejected_samples)
    }

    /// Active configuration.
    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }
}

impl Default for MotionStabilityDetector {
    fn default() -> Self {
        Self::new(StabilityConfig::default())
    }
}
