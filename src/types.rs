//! Core data types for the capture wizard.
//!
//! This module defines the fundamental values exchanged between the wizard
//! components and its collaborators (camera, motion sensor, uploader).
//!
//! Design principle: Types should make intent obvious. If a concept exists,
//! it gets a type. Sensor payloads and image references never cross a
//! boundary as untyped tuples or bare strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WizardError;

/// A single raw motion-sensor reading.
///
/// This is the minimal input contract of the stability detector: a three-axis
/// vector and a monotonic timestamp. Units are whatever the sensor reports
/// (typically g); only deltas between consecutive samples are used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Monotonic timestamp in milliseconds. Required for temporal ordering.
    pub timestamp_ms: u64,
    /// X axis reading.
    pub x: f32,
    /// Y axis reading.
    pub y: f32,
    /// Z axis reading.
    pub z: f32,
}

impl MotionSample {
    /// Creates a new motion sample.
    pub fn new(timestamp_ms: u64, x: f32, y: f32, z: f32) -> Self {
        Self {
            timestamp_ms,
            x,
            y,
            z,
        }
    }

    /// Checks that every axis carries a finite value.
    pub fn validate(&self) -> Result<(), WizardError> {
        if self.x.is_finite() && self.y.is_finite() && self.z.is_finite() {
            Ok(())
        } else {
            Err(WizardError::invalid_sample(
                self.timestamp_ms,
                "non-finite axis value",
            ))
        }
    }

    /// Sum of absolute per-axis differences against the previous sample.
    pub fn delta(&self, prev: &MotionSample) -> f32 {
        (self.x - prev.x).abs() + (self.y - prev.y).abs() + (self.z - prev.z).abs()
    }
}

/// One of the three artifacts required before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSlotKey {
    /// Front side of the identity document.
    Front,
    /// Back side of the identity document.
    Back,
    /// Face photo of the holder.
    Selfie,
}

impl CaptureSlotKey {
    /// All slots in capture order.
    pub const ALL: [CaptureSlotKey; 3] = [
        CaptureSlotKey::Front,
        CaptureSlotKey::Back,
        CaptureSlotKey::Selfie,
    ];

    /// Position of the slot in [`CaptureSlotKey::ALL`].
    pub fn index(self) -> usize {
        match self {
            CaptureSlotKey::Front => 0,
            CaptureSlotKey::Back => 1,
            CaptureSlotKey::Selfie => 2,
        }
    }

    /// The capturing step that fills this slot.
    pub fn step(self) -> WizardStep {
        match self {
            CaptureSlotKey::Front => WizardStep::Front,
            CaptureSlotKey::Back => WizardStep::Back,
            CaptureSlotKey::Selfie => WizardStep::Selfie,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureSlotKey::Front => "front",
            CaptureSlotKey::Back => "back",
            CaptureSlotKey::Selfie => "selfie",
        }
    }
}

impl fmt::Display for CaptureSlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureSlotKey {
    type Err = WizardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(CaptureSlotKey::Front),
            "back" => Ok(CaptureSlotKey::Back),
            "selfie" => Ok(CaptureSlotKey::Selfie),
            other => Err(WizardError::unknown_slot(other)),
        }
    }
}

/// Opaque reference to one captured image (a local file URI).
///
/// The wizard never opens the image; it only moves the reference between the
/// camera and the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureArtifact(String);

impl CaptureArtifact {
    /// Wraps an image reference. Blank references are rejected.
    pub fn new(uri: impl Into<String>) -> Result<Self, WizardError> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(WizardError::invalid_artifact("empty image reference"));
        }
        Ok(Self(uri))
    }

    /// The underlying reference.
    pub fn uri(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaptureArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wizard step. The first three fill a slot; `Review` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    /// Photograph the document front.
    Front,
    /// Photograph the document back.
    Back,
    /// Photograph the holder's face.
    Selfie,
    /// Confirm or retake before submission.
    Review,
}

impl WizardStep {
    /// Steps in wizard order.
    pub const ALL: [WizardStep; 4] = [
        WizardStep::Front,
        WizardStep::Back,
        WizardStep::Selfie,
        WizardStep::Review,
    ];

    /// Index of the last step.
    pub const LAST_INDEX: usize = Self::ALL.len() - 1;

    /// Position of this step in [`WizardStep::ALL`].
    pub fn index(self) -> usize {
        match self {
            WizardStep::Front => 0,
            WizardStep::Back => 1,
            WizardStep::Selfie => 2,
            WizardStep::Review => 3,
        }
    }

    /// Step at `index`, clamped to the last step.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::LAST_INDEX)]
    }

    /// Slot filled by this step, `None` for review.
    pub fn slot(self) -> Option<CaptureSlotKey> {
        match self {
            WizardStep::Front => Some(CaptureSlotKey::Front),
            WizardStep::Back => Some(CaptureSlotKey::Back),
            WizardStep::Selfie => Some(CaptureSlotKey::Selfie),
            WizardStep::Review => None,
        }
    }

    /// True for the three photo steps.
    pub fn is_capturing(self) -> bool {
        self.slot().is_some()
    }

    /// Short heading shown for the step.
    pub fn title(self) -> &'static str {
        match self {
            WizardStep::Front => "Scan the front",
            WizardStep::Back => "Scan the back",
            WizardStep::Selfie => "Verification selfie",
            WizardStep::Review => "Final check",
        }
    }

    /// One-line instruction shown under the title.
    pub fn instruction(self) -> &'static str {
        match self {
            WizardStep::Front => "Frame the front of your identity document inside the guide.",
            WizardStep::Back => "Turn the document over and let the device detect it automatically.",
            WizardStep::Selfie => "Look at the camera and center your face in the circle.",
            WizardStep::Review => "Confirm your documents before sending.",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::Front => "front",
            WizardStep::Back => "back",
            WizardStep::Selfie => "selfie",
            WizardStep::Review => "review",
        };
        f.write_str(name)
    }
}

/// Camera orientation required by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// User-facing camera.
    Front,
    /// Rear camera.
    Back,
}

/// Camera access state reported by the permission collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// Access has not been requested yet.
    #[default]
    Undetermined,
    /// Access granted.
    Granted,
    /// Access refused.
    Denied,
}

impl PermissionStatus {
    /// True once access has been granted.
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

/// Options handed to the camera for every capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Compression quality in [0.0, 1.0].
    pub quality: f32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self { quality: 0.85 }
    }
}

/// The three artifacts handed to the uploader on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePayload {
    /// Document front.
    pub front: CaptureArtifact,
    /// Document back.
    pub back: CaptureArtifact,
    /// Selfie.
    pub selfie: CaptureArtifact,
}

/// Artifacts supplied when the wizard is opened to resume a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialCaptures {
    /// Previously captured document front.
    pub front: Option<CaptureArtifact>,
    /// Previously captured document back.
    pub back: Option<CaptureArtifact>,
    /// Previously captured selfie.
    pub selfie: Option<CaptureArtifact>,
}

impl InitialCaptures {
    /// Sets the initial value for one slot.
    #[must_use]
    pub fn with(mut self, slot: CaptureSlotKey, artifact: CaptureArtifact) -> Self {
        match slot {
            CaptureSlotKey::Front => self.front = Some(artifact),
            CaptureSlotKey::Back => self.back = Some(artifact),
            CaptureSlotKey::Selfie => self.selfie = Some(artifact),
        }
        self
    }

    /// Initial value for `slot`, if any.
    pub fn get(&self, slot: CaptureSlotKey) -> Option<&CaptureArtifact> {
        match slot {
            CaptureSlotKey::Front => self.front.as_ref(),
            CaptureSlotKey::Back => self.back.as_ref(),
            CaptureSlotKey::Selfie => self.selfie.as_ref(),
        }
    }
}
