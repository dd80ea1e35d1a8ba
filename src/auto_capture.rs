//! Auto-capture countdown and in-flight capture guard.
//!
//! Watches the stability signal together with a capture gate (capturing step,
//! empty slot, camera granted). While both hold, a short visible countdown runs
//! and, when it reaches zero, exactly one capture request is issued.
//!
//! ```text
//!            stable & gate open            remaining == 0 & Idle
//!   (none) ---------------------> 2 -> 1 -> 0 ----------------------> Capturing
//!      ^            unstable / gate closed |                              |
//!      +-----------------------------------+------------------------------+
//!                                                      settled
//! ```
//!
//! Design: the in-flight guard is a two-state machine (`Idle`/`Capturing`). A
//! countdown that reaches zero while a capture is still in flight is dropped,
//! never queued. Every request carries a [`CaptureTicket`] whose cancellation
//! token is tripped on navigation, retake or hide; a settlement for a cancelled
//! ticket releases the guard but its image is discarded.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CaptureError, WizardError};
use crate::types::{CameraFacing, CaptureArtifact, CaptureSlotKey};

/// Configuration for the auto-capture countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCaptureConfig {
    /// Value the countdown starts from. Typical: 2.
    pub countdown_start: u32,
    /// Time between countdown steps (ms). Typical: 500.
    pub tick_interval_ms: u64,
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            countdown_start: 2,
            tick_interval_ms: 500,
        }
    }
}

/// Whether a capture may currently be auto-triggered, and for what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureGate {
    /// Capturing step with an empty slot and camera access.
    Open {
        /// Slot the capture would fill.
        slot: CaptureSlotKey,
        /// Camera required by the step.
        facing: CameraFacing,
    },
    /// Review step, filled slot, hidden wizard or no camera access.
    Closed,
}

impl CaptureGate {
    /// True when auto-capture may run.
    pub fn is_open(&self) -> bool {
        matches!(self, CaptureGate::Open { .. })
    }
}

/// How a capture was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTrigger {
    /// Countdown reached zero.
    Auto,
    /// Explicit user action.
    Manual,
}

/// Handle identifying one capture attempt.
#[derive(Debug, Clone)]
pub struct CaptureTicket {
    id: u64,
    slot: CaptureSlotKey,
    facing: CameraFacing,
    token: CancellationToken,
}

impl CaptureTicket {
    /// Monotonic attempt id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Slot this capture fills.
    pub fn slot(&self) -> CaptureSlotKey {
        self.slot
    }

    /// Camera to use.
    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    /// Token tripped when the result is no longer wanted.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the result will be discarded.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Instruction to invoke the camera once.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Ticket to hand back on settlement.
    pub ticket: CaptureTicket,
    /// What started the capture.
    pub trigger: CaptureTrigger,
}

/// Countdown progress reported by [`AutoCaptureController::tick`].
#[derive(Debug, Clone)]
pub enum CountdownEvent {
    /// The countdown decreased and is still running.
    Ticked(u32),
    /// The countdown reached zero and a capture must be started.
    Fire(CaptureRequest),
    /// The countdown reached zero while another capture was in flight.
    Dropped,
}

/// How a capture settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The image should be stored in `slot`.
    Captured {
        /// Target slot.
        slot: CaptureSlotKey,
        /// The captured image.
        artifact: CaptureArtifact,
    },
    /// The camera failed; the slot stays empty.
    Failed {
        /// Target slot.
        slot: CaptureSlotKey,
        /// Camera error.
        error: CaptureError,
    },
    /// The ticket had been cancelled; the result is ignored.
    Discarded,
    /// The ticket does not match the capture in flight.
    Unknown,
}

#[derive(Debug, Clone)]
enum InFlight {
    Idle,
    Capturing(CaptureTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countdown {
    remaining: u32,
    next_tick_ms: u64,
    slot: CaptureSlotKey,
    facing: CameraFacing,
}

/// Countdown driver and single-slot capture guard.
pub struct AutoCaptureController {
    config: AutoCaptureConfig,
    countdown: Option<Countdown>,
    in_flight: InFlight,
    next_ticket_id: u64,
    last_failure: Option<CaptureError>,

    // Statistics
    captures_started: u64,
    triggers_dropped: u64,
}

impl AutoCaptureController {
    /// Create a new controller with the given configuration.
    pub fn new(config: AutoCaptureConfig) -> Self {
        Self {
            config,
            countdown: None,
            in_flight: InFlight::Idle,
            next_ticket_id: 1,
            last_failure: None,
            captures_started: 0,
            triggers_dropped: 0,
        }
    }

    /// Bring the countdown in line with the gate and stability signal.
    ///
    /// Starts a countdown when the device is stable under an open gate, and
    /// clears the countdown, fired or not, as soon as either condition is lost.
    pub fn reconcile(&mut self, gate: CaptureGate, is_stable: bool, now_ms: u64) {
        let CaptureGate::Open { slot, facing } = gate else {
            self.clear_countdown();
            return;
        };

        if let Some(countdown) = self.countdown {
            if countdown.slot != slot || !is_stable {
                self.clear_countdown();
            }
        }

        if is_stable && self.countdown.is_none() {
            debug!(%slot, start = self.config.countdown_start, "countdown started");
            self.countdown = Some(Countdown {
                remaining: self.config.countdown_start,
                next_tick_ms: now_ms.saturating_add(self.config.tick_interval_ms),
                slot,
                facing,
            });
        }
    }

    /// Advance the countdown to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> Option<CountdownEvent> {
        let countdown = self.countdown.as_mut()?;
        if countdown.remaining == 0 || now_ms < countdown.next_tick_ms {
            return None;
        }

        while countdown.remaining > 0 && now_ms >= countdown.next_tick_ms {
            countdown.remaining -= 1;
            countdown.next_tick_ms = countdown
                .next_tick_ms
                .saturating_add(self.config.tick_interval_ms);
        }
        if countdown.remaining > 0 {
            debug!(remaining = countdown.remaining, "countdown tick");
            return Some(CountdownEvent::Ticked(countdown.remaining));
        }

        let (slot, facing) = (countdown.slot, countdown.facing);
        if self.is_capturing() {
            debug!(%slot, "countdown reached zero while a capture is in flight; trigger dropped");
            self.countdown = None;
            self.triggers_dropped += 1;
            return Some(CountdownEvent::Dropped);
        }

        // Zero marks the fired countdown until it settles or stability is lost.
        let ticket = self.begin(slot, facing);
        info!(%slot, ticket = ticket.id, "auto-capture fired");
        Some(CountdownEvent::Fire(CaptureRequest {
            ticket,
            trigger: CaptureTrigger::Auto,
        }))
    }

    /// Start a user-triggered capture through the same in-flight guard.
    ///
    /// # Errors
    ///
    /// Returns `WizardError::CaptureUnavailable` if a capture is already in flight.
    pub fn begin_manual(
        &mut self,
        slot: CaptureSlotKey,
        facing: CameraFacing,
    ) -> Result<CaptureRequest, WizardError> {
        if self.is_capturing() {
            return Err(WizardError::capture_unavailable(
                slot,
                "a capture is already in flight",
            ));
        }
        self.countdown = None;
        let ticket = self.begin(slot, facing);
        info!(%slot, ticket = ticket.id, "manual capture started");
        Ok(CaptureRequest {
            ticket,
            trigger: CaptureTrigger::Manual,
        })
    }

    /// Record the outcome of the capture identified by `ticket_id`.
    pub fn settle(
        &mut self,
        ticket_id: u64,
        result: Result<CaptureArtifact, CaptureError>,
    ) -> Settlement {
        let ticket = match &self.in_flight {
            InFlight::Capturing(ticket) if ticket.id == ticket_id => ticket.clone(),
            _ => {
                warn!(ticket = ticket_id, "ignoring settlement for unknown capture");
                return Settlement::Unknown;
            }
        };

        self.in_flight = InFlight::Idle;
        self.countdown = None;

        if ticket.is_cancelled() {
            debug!(ticket = ticket_id, slot = %ticket.slot, "discarding cancelled capture");
            return Settlement::Discarded;
        }

        match result {
            Ok(artifact) => {
                info!(ticket = ticket_id, slot = %ticket.slot, "capture succeeded");
                self.last_failure = None;
                Settlement::Captured {
                    slot: ticket.slot,
                    artifact,
                }
            }
            Err(error) => {
                warn!(ticket = ticket_id, slot = %ticket.slot, %error, "capture failed");
                self.last_failure = Some(error.clone());
                Settlement::Failed {
                    slot: ticket.slot,
                    error,
                }
            }
        }
    }

    /// Cancel the countdown and the capture in flight, if any.
    ///
    /// The in-flight guard stays engaged until the capture settles.
    pub fn cancel(&mut self) {
        self.clear_countdown();
        if let InFlight::Capturing(ticket) = &self.in_flight {
            if !ticket.is_cancelled() {
                debug!(ticket = ticket.id, slot = %ticket.slot, "capture cancelled");
                ticket.token.cancel();
            }
        }
    }

    /// Drop all countdown state and forget the last failure.
    pub fn teardown(&mut self) {
        self.cancel();
        self.last_failure = None;
    }

    /// Remaining countdown value; `Some(0)` after firing until the capture
    /// settles or stability is lost.
    pub fn countdown(&self) -> Option<u32> {
        self.countdown.map(|c| c.remaining)
    }

    /// When the next countdown step is due.
    pub fn next_deadline(&self) -> Option<u64> {
        self.countdown
            .filter(|c| c.remaining > 0)
            .map(|c| c.next_tick_ms)
    }

    /// Whether a capture is in flight.
    pub fn is_capturing(&self) -> bool {
        matches!(self.in_flight, InFlight::Capturing(_))
    }

    /// Ticket of the capture in flight.
    pub fn in_flight(&self) -> Option<&CaptureTicket> {
        match &self.in_flight {
            InFlight::Capturing(ticket) => Some(ticket),
            InFlight::Idle => None,
        }
    }

    /// Most recent camera failure since the last success or teardown.
    pub fn last_failure(&self) -> Option<&CaptureError> {
        self.last_failure.as_ref()
    }

    /// Capture statistics (started, dropped triggers).
    pub fn statistics(&self) -> (u64, u64) {
        (self.captures_started, self.triggers_dropped)
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn clear_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            debug!(slot = %countdown.slot, remaining = countdown.remaining, "countdown cleared");
        }
    }

    fn begin(&mut self, slot: CaptureSlotKey, facing: CameraFacing) -> CaptureTicket {
        let ticket = CaptureTicket {
            id: self.next_ticket_id,
            slot,
            facing,
            token: CancellationToken::new(),
        };
        self.next_ticket_id += 1;
        self.captures_started += 1;
        self.in_flight = InFlight::Capturing(ticket.clone());
        ticket
    }
}

impl Default for AutoCaptureController {
    fn default() -> Self {
        Self::new(AutoCaptureConfig::default())
    }
}
