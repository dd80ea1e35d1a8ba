//! Wizard orchestration.
//!
//! This module composes the stability detector, auto-capture controller,
//! artifact store and step sequencer into the externally visible wizard.
//!
//! # Architecture
//!
//! The orchestrator is a synchronous, clock-driven core. It never sleeps and
//! never calls the camera itself; instead:
//! 1. **Motion**: the caller feeds samples with [`WizardOrchestrator::on_motion_sample`]
//! 2. **Timers**: the caller wakes at [`WizardOrchestrator::next_deadline`] and calls
//!    [`WizardOrchestrator::poll`]
//! 3. **Capture**: both may return a [`CaptureRequest`]; the caller runs the camera and
//!    reports back through [`WizardOrchestrator::complete_capture`]
//! 4. **Navigation**: continue / back / retake / close come from the user
//!
//! All timer state lives in the session and the controller and is cleared by a
//! single teardown on hide, close or completion. The `runtime` module wraps
//! this core in an async event loop.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auto_capture::{
    AutoCaptureController, CaptureGate, CaptureRequest, CountdownEvent, Settlement,
};
use crate::config::WizardConfig;
use crate::error::{CaptureError, WizardError};
use crate::facing::facing_for;
use crate::sequencer::{AdvanceOutcome, BackOutcome, CaptureStepSequencer};
use crate::stability::{MotionStabilityDetector, StabilityState, StabilityTransition};
use crate::store::CaptureArtifactStore;
use crate::types::{
    CameraFacing, CaptureArtifact, CapturePayload, CaptureSlotKey, InitialCaptures, MotionSample,
    PermissionStatus, WizardStep,
};

/// Receiver of the two externally observable wizard actions.
pub trait WizardObserver: Send {
    /// Review was confirmed with all three artifacts.
    fn on_complete(&mut self, payload: CapturePayload);

    /// The user abandoned the wizard.
    fn on_close(&mut self);
}

/// Terminal outcome of a wizard session, as delivered over channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome {
    /// All artifacts confirmed.
    Completed(CapturePayload),
    /// Abandoned without payload.
    Closed,
}

/// On-screen guidance while a capturing step waits for its photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureHint {
    /// Device is moving: align the subject in the frame.
    AlignSubject,
    /// Device is still: hold it there.
    HoldStill,
}

/// Everything a host needs to render the wizard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardSnapshot {
    /// Whether a session is active.
    pub visible: bool,
    /// Step being viewed.
    pub step: WizardStep,
    /// One-based step position.
    pub position: usize,
    /// Number of steps.
    pub total: usize,
    /// Step heading.
    pub title: &'static str,
    /// Step instruction.
    pub instruction: &'static str,
    /// Camera to show, `None` at review.
    pub facing: Option<CameraFacing>,
    /// Document front, if captured.
    pub front: Option<CaptureArtifact>,
    /// Document back, if captured.
    pub back: Option<CaptureArtifact>,
    /// Selfie, if captured.
    pub selfie: Option<CaptureArtifact>,
    /// Whether continue is enabled.
    pub can_continue: bool,
    /// Motion stability signal.
    pub is_stable: bool,
    /// Countdown value, `Some(0)` once fired while the device stays still.
    pub countdown: Option<u32>,
    /// Countdown text for the badge.
    pub countdown_label: Option<String>,
    /// Guidance for an empty capturing step.
    pub hint: Option<CaptureHint>,
    /// Whether the camera is busy.
    pub capturing: bool,
    /// Camera access state.
    pub permission: PermissionStatus,
    /// Whether motion samples can be received.
    pub sensor_available: bool,
    /// Whether the host is submitting the payload.
    pub submitting: bool,
    /// Last camera failure, if the step has not succeeded since.
    pub last_capture_failure: Option<String>,
}

/// State owned for one visible lifetime of the wizard.
struct WizardSession {
    generation: u64,
    store: CaptureArtifactStore,
    sequencer: CaptureStepSequencer,
    detector: MotionStabilityDetector,
}

/// The capture wizard.
pub struct WizardOrchestrator {
    config: WizardConfig,
    initial: InitialCaptures,
    observer: Box<dyn WizardObserver>,

    // Survives sessions so a capture started before a hide still holds the guard.
    controller: AutoCaptureController,
    session: Option<WizardSession>,
    generation: u64,

    permission: PermissionStatus,
    sensor_available: bool,
    submitting: bool,
}

impl WizardOrchestrator {
    /// Creates a hidden wizard.
    pub fn new(
        config: WizardConfig,
        initial: InitialCaptures,
        observer: Box<dyn WizardObserver>,
    ) -> Self {
        Self {
            controller: AutoCaptureController::new(config.auto_capture.clone()),
            config,
            initial,
            observer,
            session: None,
            generation: 0,
            permission: PermissionStatus::Undetermined,
            sensor_available: true,
            submitting: false,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Make the wizard visible, starting a fresh session.
    ///
    /// Artifacts are seeded from the initial values and the step is reset to
    /// the first one. Showing an already visible wizard restarts it.
    pub fn show(&mut self) {
        self.teardown();
        self.generation += 1;
        self.session = Some(WizardSession {
            generation: self.generation,
            store: CaptureArtifactStore::seeded(&self.initial),
            sequencer: CaptureStepSequencer::new(),
            detector: MotionStabilityDetector::new(self.config.stability.clone()),
        });
        info!(
            generation = self.generation,
            prefilled = self.store().map_or(0, CaptureArtifactStore::filled_count),
            "wizard shown"
        );
    }

    /// Hide the wizard, cancelling every timer and dropping the session.
    pub fn hide(&mut self) {
        if self.session.is_some() {
            info!(generation = self.generation, "wizard hidden");
        }
        self.teardown();
    }

    /// User-initiated abandon. Ignored while hidden.
    pub fn close(&mut self) {
        if self.session.is_none() {
            debug!("close ignored: wizard hidden");
            return;
        }
        info!("wizard closed by user");
        self.observer.on_close();
        self.teardown();
    }

    /// Whether a session is active.
    pub fn is_visible(&self) -> bool {
        self.session.is_some()
    }

    /// Replace the values used to seed the next session.
    pub fn set_initial_captures(&mut self, initial: InitialCaptures) {
        self.initial = initial;
    }

    // =========================================================================
    // SIGNALS
    // =========================================================================

    /// Record the camera permission state.
    pub fn set_permission(&mut self, status: PermissionStatus) {
        if status == self.permission {
            return;
        }
        match status {
            PermissionStatus::Denied => warn!("camera permission denied; auto-capture disabled"),
            PermissionStatus::Granted => info!("camera permission granted"),
            PermissionStatus::Undetermined => {}
        }
        self.permission = status;
        self.refresh_gate();
    }

    /// Record whether the motion source could be subscribed.
    pub fn set_sensor_available(&mut self, available: bool) {
        if !available && self.sensor_available {
            warn!("motion sensor unavailable; auto-capture will not engage");
        }
        self.sensor_available = available;
    }

    /// Lock or unlock navigation while the host submits the payload.
    pub fn set_submitting(&mut self, submitting: bool) {
        self.submitting = submitting;
    }

    /// Whether motion samples are wanted right now.
    ///
    /// True only while visible on a capturing step with an empty slot and camera
    /// access. The caller should hold its sensor subscription exactly while this
    /// holds, so each resubscription starts with an unprimed detector.
    pub fn wants_motion(&self) -> bool {
        self.gate().is_open()
    }

    /// Feed one motion sample. May start a capture.
    pub fn on_motion_sample(&mut self, sample: &MotionSample) -> Option<CaptureRequest> {
        if !self.wants_motion() {
            debug!(timestamp_ms = sample.timestamp_ms, "ignoring motion sample: gate closed");
            return None;
        }
        let session = self.session.as_mut()?;
        if let Some(edge) = session.detector.process_sample(sample) {
            log_edge(edge, session.sequencer.current());
        }
        self.drive(sample.timestamp_ms)
    }

    /// Let timers elapse at `now_ms`. May start a capture.
    pub fn poll(&mut self, now_ms: u64) -> Option<CaptureRequest> {
        self.drive(now_ms)
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        let hold = if self.wants_motion() {
            self.session.as_ref().and_then(|s| s.detector.hold_deadline())
        } else {
            None
        };
        match (hold, self.controller.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Report the outcome of a capture previously requested.
    pub fn complete_capture(
        &mut self,
        ticket_id: u64,
        result: Result<CaptureArtifact, CaptureError>,
    ) -> Settlement {
        let settlement = self.controller.settle(ticket_id, result);
        let Some(session) = self.session.as_mut() else {
            return settlement;
        };

        match &settlement {
            Settlement::Captured { slot, artifact } => {
                session.store.set(*slot, artifact.clone());
                // The slot is filled: motion stops until a retake.
                session.detector.reset();
            }
            Settlement::Failed { .. } => {
                // A new stability hold is needed before the next attempt.
                session.detector.clear_stability();
            }
            Settlement::Discarded | Settlement::Unknown => {}
        }
        settlement
    }

    // =========================================================================
    // NAVIGATION
    // =========================================================================

    /// The user pressed continue.
    ///
    /// # Errors
    ///
    /// Returns `NotVisible`, `Busy` while submitting, or `ContinueRejected`
    /// when the current step is incomplete.
    pub fn continue_step(&mut self) -> Result<AdvanceOutcome, WizardError> {
        if self.submitting {
            return Err(WizardError::Busy);
        }
        let session = self.session.as_mut().ok_or(WizardError::NotVisible)?;
        let outcome = session.sequencer.advance(&session.store)?;

        match &outcome {
            AdvanceOutcome::Advanced(_) => self.leave_step(),
            AdvanceOutcome::Complete(payload) => {
                info!(generation = session.generation, "wizard complete");
                self.observer.on_complete(payload.clone());
                self.teardown();
            }
        }
        Ok(outcome)
    }

    /// The user pressed back.
    ///
    /// # Errors
    ///
    /// Returns `NotVisible`, or `Busy` while submitting.
    pub fn go_back(&mut self) -> Result<BackOutcome, WizardError> {
        if self.submitting {
            return Err(WizardError::Busy);
        }
        let session = self.session.as_mut().ok_or(WizardError::NotVisible)?;
        let outcome = session.sequencer.go_back();

        match outcome {
            BackOutcome::Moved(_) => self.leave_step(),
            BackOutcome::Close => self.close(),
        }
        Ok(outcome)
    }

    /// Clear `slot` so it can be captured again.
    ///
    /// # Errors
    ///
    /// Returns `NotVisible` if no session is active.
    pub fn retake(&mut self, slot: CaptureSlotKey) -> Result<(), WizardError> {
        let session = self.session.as_mut().ok_or(WizardError::NotVisible)?;
        if session.sequencer.retake(&mut session.store, slot) {
            session.detector.reset();
            self.controller.cancel();
        }
        Ok(())
    }

    /// Capture the current step now, without waiting for stability.
    ///
    /// # Errors
    ///
    /// Returns `NotVisible`, `NotCapturing` at review, `PermissionDenied`
    /// without camera access, or `CaptureUnavailable` if the slot is filled or
    /// another capture is in flight.
    pub fn request_manual_capture(&mut self) -> Result<CaptureRequest, WizardError> {
        let session = self.session.as_mut().ok_or(WizardError::NotVisible)?;
        let step = session.sequencer.current();
        let (Some(slot), Some(facing)) = (step.slot(), facing_for(step)) else {
            return Err(WizardError::NotCapturing { step });
        };
        if !self.permission.is_granted() {
            return Err(WizardError::PermissionDenied);
        }
        if session.store.is_filled(slot) {
            return Err(WizardError::capture_unavailable(
                slot,
                "slot already filled; retake first",
            ));
        }
        let request = self.controller.begin_manual(slot, facing)?;
        session.detector.clear_stability();
        Ok(request)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Step being viewed, `None` while hidden.
    pub fn current_step(&self) -> Option<WizardStep> {
        self.session.as_ref().map(|s| s.sequencer.current())
    }

    /// Artifact store of the active session.
    pub fn store(&self) -> Option<&CaptureArtifactStore> {
        self.session.as_ref().map(|s| &s.store)
    }

    /// Stability detector state of the active session.
    pub fn stability(&self) -> Option<StabilityState> {
        self.session.as_ref().map(|s| s.detector.state())
    }

    /// Whether continue is currently allowed.
    pub fn can_continue(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.sequencer.can_continue(&s.store))
    }

    /// Countdown value, if one is running.
    pub fn countdown(&self) -> Option<u32> {
        self.controller.countdown()
    }

    /// Whether a capture is in flight.
    pub fn is_capturing(&self) -> bool {
        self.controller.is_capturing()
    }

    /// Camera permission state.
    pub fn permission(&self) -> PermissionStatus {
        self.permission
    }

    /// Capture statistics (started, dropped triggers).
    pub fn capture_statistics(&self) -> (u64, u64) {
        self.controller.statistics()
    }

    /// Active configuration.
    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    /// Render-ready view of the wizard.
    pub fn snapshot(&self) -> WizardSnapshot {
        let step = self.current_step().unwrap_or(WizardStep::Front);
        let (position, total) = self
            .session
            .as_ref()
            .map_or((1, WizardStep::ALL.len()), |s| s.sequencer.progress());
        let store = self.store();
        let artifact = |slot| store.and_then(|s| s.get(slot)).cloned();
        let is_stable = self.session.as_ref().is_some_and(|s| s.detector.is_stable());
        let countdown = self.controller.countdown().filter(|_| self.is_visible());

        let slot_empty = step
            .slot()
            .is_some_and(|slot| store.is_some_and(|s| !s.is_filled(slot)));
        let hint = (self.is_visible() && slot_empty).then_some(if is_stable {
            CaptureHint::HoldStill
        } else {
            CaptureHint::AlignSubject
        });

        WizardSnapshot {
            visible: self.is_visible(),
            step,
            position,
            total,
            title: step.title(),
            instruction: step.instruction(),
            facing: facing_for(step),
            front: artifact(CaptureSlotKey::Front),
            back: artifact(CaptureSlotKey::Back),
            selfie: artifact(CaptureSlotKey::Selfie),
            can_continue: self.can_continue(),
            is_stable,
            countdown,
            countdown_label: countdown.map(countdown_label),
            hint,
            capturing: self.controller.is_capturing(),
            permission: self.permission,
            sensor_available: self.sensor_available,
            submitting: self.submitting,
            last_capture_failure: self.controller.last_failure().map(ToString::to_string),
        }
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn gate(&self) -> CaptureGate {
        let Some(session) = self.session.as_ref() else {
            return CaptureGate::Closed;
        };
        let step = session.sequencer.current();
        match (step.slot(), facing_for(step)) {
            (Some(slot), Some(facing))
                if !session.store.is_filled(slot) && self.permission.is_granted() =>
            {
                CaptureGate::Open { slot, facing }
            }
            _ => CaptureGate::Closed,
        }
    }

    fn drive(&mut self, now_ms: u64) -> Option<CaptureRequest> {
        let gate = self.gate();
        let session = self.session.as_mut()?;

        if gate.is_open() {
            if let Some(edge) = session.detector.poll(now_ms) {
                log_edge(edge, session.sequencer.current());
            }
        }
        self.controller
            .reconcile(gate, session.detector.is_stable(), now_ms);

        match self.controller.tick(now_ms)? {
            CountdownEvent::Ticked(_) => None,
            CountdownEvent::Fire(request) => Some(request),
            CountdownEvent::Dropped => {
                session.detector.clear_stability();
                None
            }
        }
    }

    /// Cancel everything tied to the step being left.
    fn leave_step(&mut self) {
        self.controller.cancel();
        if let Some(session) = self.session.as_mut() {
            session.detector.reset();
        }
    }

    /// Stop motion-driven state when the gate has closed.
    fn refresh_gate(&mut self) {
        if self.gate().is_open() {
            return;
        }
        self.controller.reconcile(CaptureGate::Closed, false, 0);
        if let Some(session) = self.session.as_mut() {
            session.detector.reset();
        }
    }

    fn teardown(&mut self) {
        self.controller.teardown();
        self.session = None;
    }
}

fn log_edge(edge: StabilityTransition, step: WizardStep) {
    match edge {
        StabilityTransition::BecameStable => debug!(%step, "device stable"),
        StabilityTransition::BecameUnstable => debug!(%step, "device unstable"),
    }
}

fn countdown_label(remaining: u32) -> String {
    if remaining == 0 {
        "capturing".to_string()
    } else {
        remaining.to_string()
    }
}
