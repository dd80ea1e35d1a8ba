//! Error types for the capture wizard.
//!
//! Nothing in this crate is fatal to the host application. Runtime failures
//! (permission refusal, camera rejection, missing motion sensor) are recorded as
//! wizard state; the variants below are returned from operations the caller
//! invoked at the wrong moment or with bad input.

use thiserror::Error;

use crate::types::{CaptureSlotKey, WizardStep};

/// Errors returned by wizard operations.
#[derive(Debug, Error)]
pub enum WizardError {
    /// A slot key outside `front`, `back`, `selfie` was supplied.
    #[error("unknown capture slot: {key}")]
    UnknownSlot {
        /// The rejected key.
        key: String,
    },

    /// An artifact reference failed validation.
    #[error("invalid artifact: {reason}")]
    InvalidArtifact {
        /// Why the artifact was rejected.
        reason: String,
    },

    /// A motion sample was malformed and has been ignored.
    #[error("invalid motion sample at {timestamp_ms}ms: {reason}")]
    InvalidSample {
        /// Timestamp carried by the rejected sample.
        timestamp_ms: u64,
        /// Why the sample was rejected.
        reason: String,
    },

    /// `continue` was requested while the current step is incomplete.
    #[error("cannot continue from {step}: step is incomplete")]
    ContinueRejected {
        /// The step the wizard is on.
        step: WizardStep,
    },

    /// Navigation is locked while the host submits the payload.
    #[error("wizard is busy submitting")]
    Busy,

    /// The operation requires a visible wizard.
    #[error("wizard is not visible")]
    NotVisible,

    /// Camera access has been refused.
    #[error("camera permission denied")]
    PermissionDenied,

    /// The motion source cannot be subscribed.
    #[error("motion sensor unavailable: {reason}")]
    SensorUnavailable {
        /// Reason reported by the sensor collaborator.
        reason: String,
    },

    /// A capture could not be started for the slot.
    #[error("capture unavailable for {slot}: {reason}")]
    CaptureUnavailable {
        /// The slot the capture was requested for.
        slot: CaptureSlotKey,
        /// Why no capture was started.
        reason: String,
    },

    /// The current step does not take a photo.
    #[error("step {step} does not capture")]
    NotCapturing {
        /// The step the wizard is on.
        step: WizardStep,
    },

    /// The wizard event loop has stopped.
    #[error("wizard runtime stopped")]
    RuntimeStopped,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl WizardError {
    /// Creates a new unknown slot error.
    #[must_use]
    pub fn unknown_slot(key: impl Into<String>) -> Self {
        Self::UnknownSlot { key: key.into() }
    }

    /// Creates a new invalid artifact error.
    #[must_use]
    pub fn invalid_artifact(reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            reason: reason.into(),
        }
    }

    /// Creates a new invalid sample error.
    #[must_use]
    pub fn invalid_sample(timestamp_ms: u64, reason: impl Into<String>) -> Self {
        Self::InvalidSample {
            timestamp_ms,
            reason: reason.into(),
        }
    }

    /// Creates a new sensor unavailable error.
    #[must_use]
    pub fn sensor_unavailable(reason: impl Into<String>) -> Self {
        Self::SensorUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a new capture unavailable error.
    #[must_use]
    pub fn capture_unavailable(slot: CaptureSlotKey, reason: impl Into<String>) -> Self {
        Self::CaptureUnavailable {
            slot,
            reason: reason.into(),
        }
    }

    /// Creates a new invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

/// Failure reported by the camera collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The camera rejected the capture.
    #[error("camera rejected capture: {0}")]
    Rejected(String),

    /// The camera returned no image reference.
    #[error("camera returned no image")]
    EmptyResult,

    /// The camera is not ready (not mounted or already closed).
    #[error("camera not ready")]
    NotReady,
}
