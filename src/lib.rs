//! Guided Identity Capture Wizard
//!
//! A four-step capture flow (document front, document back, selfie, review)
//! that takes photos automatically once the device has been held still.
//!
//! # Design Philosophy
//!
//! - **Deterministic core**: stability detection, countdown and navigation are
//!   synchronous state machines driven by explicit timestamps. They can be
//!   tested without a clock.
//! - **One capture at a time**: an in-flight ticket guards the camera; a
//!   countdown reaching zero while a capture is pending is dropped.
//! - **No stale timers**: every hold and countdown is owned by the session and
//!   cleared on navigation, hide, close and completion.
//! - **Thin async shell**: [`runtime::WizardRuntime`] wires the core to camera,
//!   permission and motion collaborators with tokio.
//!
//! # Example
//!
//! ```
//! use capture_wizard::{
//!     CaptureArtifact, InitialCaptures, MotionSample, PermissionStatus, WizardConfig,
//!     WizardObserver, WizardOrchestrator, CapturePayload,
//! };
//!
//! struct Log;
//! impl WizardObserver for Log {
//!     fn on_complete(&mut self, _payload: CapturePayload) {}
//!     fn on_close(&mut self) {}
//! }
//!
//! let mut wizard = WizardOrchestrator::new(
//!     WizardConfig::default(),
//!     InitialCaptures::default(),
//!     Box::new(Log),
//! );
//! wizard.set_permission(PermissionStatus::Granted);
//! wizard.show();
//!
//! // Hold the device still until the countdown fires.
//! let mut request = None;
//! let mut t = 0;
//! while request.is_none() {
//!     request = wizard.on_motion_sample(&MotionSample::new(t, 0.0, 0.0, 1.0));
//!     t += 200;
//! }
//! let ticket = request.unwrap().ticket;
//! wizard.complete_capture(ticket.id(), Ok(CaptureArtifact::new("file:///front.jpg").unwrap()));
//! assert!(wizard.can_continue());
//! ```

pub mod auto_capture;
pub mod config;
pub mod error;
pub mod facing;
pub mod runtime;
pub mod sequencer;
pub mod stability;
pub mod store;
pub mod types;
pub mod wizard;


// Re-export commonly used types
pub use auto_capture::{
    AutoCaptureConfig, AutoCaptureController, CaptureGate, CaptureRequest, CaptureTicket,
    CaptureTrigger, CountdownEvent, Settlement,
};
pub use config::WizardConfig;
pub use error::{CaptureError, WizardError};
pub use facing::facing_for;
pub use runtime::{
    Camera, MotionSource, PermissionProvider, WizardCommand, WizardHandle, WizardRuntime,
};
pub use sequencer::{AdvanceOutcome, BackOutcome, CaptureStepSequencer};
pub use stability::{MotionStabilityDetector, StabilityConfig, StabilityState, StabilityTransition};
pub use store::CaptureArtifactStore;
pub use types::{
    CameraFacing, CaptureArtifact, CaptureOptions, CapturePayload, CaptureSlotKey,
    InitialCaptures, MotionSample, PermissionStatus, WizardStep,
};
pub use wizard::{CaptureHint, WizardObserver, WizardOrchestrator, WizardOutcome, WizardSnapshot};
