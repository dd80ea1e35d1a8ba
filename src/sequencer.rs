//! Capture step sequencing.
//!
//! The wizard walks a fixed, linear path:
//!
//! ```text
//! Front -> Back -> Selfie -> Review
//! ```
//!
//! Forward moves require the current step to be complete (its slot filled, or
//! every slot filled at review). Backward moves are always allowed and never
//! discard a capture; going back from the first step asks the host to close the
//! wizard. Review is terminal: confirming it yields the payload instead of
//! advancing.

use tracing::info;

use crate::error::WizardError;
use crate::store::CaptureArtifactStore;
use crate::types::{CapturePayload, CaptureSlotKey, WizardStep};

/// Result of a successful `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Moved to the next step.
    Advanced(WizardStep),
    /// Review was confirmed; hand the payload to the uploader.
    Complete(CapturePayload),
}

/// Result of `go_back`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackOutcome {
    /// Moved to the previous step.
    Moved(WizardStep),
    /// Already on the first step; the wizard should close.
    Close,
}

/// Linear step state machine over [`WizardStep::ALL`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStepSequencer {
    index: usize,
}

impl CaptureStepSequencer {
    /// Create a sequencer positioned on the first step.
    pub fn new() -> Self {
        Self::default()
    }

    /// The step being viewed.
    pub fn current(&self) -> WizardStep {
        WizardStep::from_index(self.index)
    }

    /// Index of the step being viewed, always within `[0, LAST_INDEX]`.
    pub fn index(&self) -> usize {
        self.index
    }

    /// One-based position and total step count.
    pub fn progress(&self) -> (usize, usize) {
        (self.index + 1, WizardStep::ALL.len())
    }

    /// Whether the current step allows moving on.
    pub fn can_continue(&self, store: &CaptureArtifactStore) -> bool {
        match self.current().slot() {
            Some(slot) => store.is_filled(slot),
            None => store.all_filled(),
        }
    }

    /// Move forward, or complete at review.
    ///
    /// # Errors
    ///
    /// Returns `WizardError::ContinueRejected` if the current step is incomplete.
    pub fn advance(&mut self, store: &CaptureArtifactStore) -> Result<AdvanceOutcome, WizardError> {
        let step = self.current();
        if !self.can_continue(store) {
            return Err(WizardError::ContinueRejected { step });
        }

        if step == WizardStep::Review {
            let payload = store
                .to_payload()
                .ok_or(WizardError::ContinueRejected { step })?;
            info!("review confirmed");
            return Ok(AdvanceOutcome::Complete(payload));
        }

        self.index = (self.index + 1).min(WizardStep::LAST_INDEX);
        info!(from = %step, to = %self.current(), "step advanced");
        Ok(AdvanceOutcome::Advanced(self.current()))
    }

    /// Move backward, or request close from the first step.
    pub fn go_back(&mut self) -> BackOutcome {
        if self.index == 0 {
            return BackOutcome::Close;
        }
        let from = self.current();
        self.index -= 1;
        info!(from = %from, to = %self.current(), "step went back");
        BackOutcome::Moved(self.current())
    }

    /// Clear `slot` regardless of the current step.
    ///
    /// Returns true when the cleared slot belongs to the step being viewed,
    /// in which case the caller must reset stability and countdown state.
    pub fn retake(&self, store: &mut CaptureArtifactStore, slot: CaptureSlotKey) -> bool {
        if store.clear(slot).is_some() {
            info!(%slot, "artifact cleared for retake");
        }
        self.current().slot() == Some(slot)
    }

    /// Return to the first step.
    pub fn reset(&mut self) {
        self.index = 0;
    }
}
