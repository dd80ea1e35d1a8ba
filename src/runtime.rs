//! Async event loop around the wizard core.
//!
//! One cooperative loop owns the [`WizardOrchestrator`] and multiplexes four
//! sources with `tokio::select!`:
//! - host commands (show, continue, retake, ...)
//! - motion samples from the [`MotionSource`] subscription
//! - the earliest timer deadline (stability hold or countdown step)
//! - the single pending camera call
//! - the single pending permission prompt
//!
//! The camera call and the permission prompt never block the loop: each runs
//! as its own pending future polled by the same `select!`. While a capture is
//! pending the loop keeps consuming samples and timers; the in-flight guard
//! inside the core drops any new trigger. The motion subscription is held
//! exactly while the core wants motion and dropped otherwise (hide, filled
//! slot, review).
//!
//! Samples are re-stamped on the loop clock on arrival so the hold timer and
//! the countdown share one timeline.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::auto_capture::CaptureRequest;
use crate::config::WizardConfig;
use crate::error::{CaptureError, WizardError};
use crate::types::{
    CameraFacing, CaptureArtifact, CaptureOptions, CapturePayload, CaptureSlotKey,
    InitialCaptures, MotionSample, PermissionStatus,
};
use crate::wizard::{WizardObserver, WizardOrchestrator, WizardOutcome, WizardSnapshot};

/// Camera collaborator.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Take one photo with the given camera.
    async fn capture(
        &self,
        facing: CameraFacing,
        options: CaptureOptions,
    ) -> Result<CaptureArtifact, CaptureError>;
}

/// Camera permission collaborator.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Ask for camera access, prompting the user if needed.
    async fn request_camera_access(&self) -> PermissionStatus;
}

/// Motion sensor collaborator.
pub trait MotionSource: Send + Sync {
    /// Start delivering samples every `interval_ms`. Dropping the receiver
    /// unsubscribes.
    ///
    /// # Errors
    ///
    /// Returns `WizardError::SensorUnavailable` if the sensor cannot be used.
    fn subscribe(&self, interval_ms: u64) -> Result<mpsc::Receiver<MotionSample>, WizardError>;
}

/// Host command for the running wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardCommand {
    /// Show the wizard (fresh session).
    Show,
    /// Hide the wizard.
    Hide,
    /// Continue, or confirm at review.
    Continue,
    /// Go back, or close from the first step.
    GoBack,
    /// Abandon the wizard.
    Close,
    /// Clear one slot.
    Retake(CaptureSlotKey),
    /// Capture the current step now.
    ManualCapture,
    /// Ask for camera access again.
    RetryPermission,
    /// Lock or unlock navigation while submitting.
    SetSubmitting(bool),
    /// Stop the event loop.
    Shutdown,
}

impl WizardObserver for mpsc::UnboundedSender<WizardOutcome> {
    fn on_complete(&mut self, payload: CapturePayload) {
        if self.send(WizardOutcome::Completed(payload)).is_err() {
            warn!("completion dropped: outcome receiver closed");
        }
    }

    fn on_close(&mut self) {
        if self.send(WizardOutcome::Closed).is_err() {
            debug!("close dropped: outcome receiver closed");
        }
    }
}

/// Cloneable handle for driving a running wizard.
#[derive(Clone)]
pub struct WizardHandle {
    commands: mpsc::Sender<WizardCommand>,
    snapshots: watch::Receiver<WizardSnapshot>,
}

impl WizardHandle {
    /// Send a command to the event loop.
    ///
    /// # Errors
    ///
    /// Returns `WizardError::RuntimeStopped` if the loop has exited.
    pub async fn send(&self, command: WizardCommand) -> Result<(), WizardError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WizardError::RuntimeStopped)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> WizardSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<WizardSnapshot> {
        self.snapshots.clone()
    }
}

type PendingCapture =
    Pin<Box<dyn Future<Output = (u64, Result<CaptureArtifact, CaptureError>)> + Send>>;
type PendingPermission = Pin<Box<dyn Future<Output = PermissionStatus> + Send>>;

/// The wizard event loop.
pub struct WizardRuntime<C, P, M> {
    orchestrator: WizardOrchestrator,
    camera: Arc<C>,
    permissions: Arc<P>,
    motion: M,

    commands: mpsc::Receiver<WizardCommand>,
    snapshots: watch::Sender<WizardSnapshot>,

    origin: Instant,
    sensor_failed: bool,
}

impl<C, P, M> WizardRuntime<C, P, M>
where
    C: Camera + 'static,
    P: PermissionProvider + 'static,
    M: MotionSource,
{
    /// Build a runtime, its host handle and the outcome receiver the uploader
    /// listens on.
    pub fn new(
        config: WizardConfig,
        initial: InitialCaptures,
        camera: C,
        permissions: P,
        motion: M,
    ) -> (Self, WizardHandle, mpsc::UnboundedReceiver<WizardOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let orchestrator = WizardOrchestrator::new(config, initial, Box::new(outcome_tx));

        let (command_tx, command_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(orchestrator.snapshot());

        let runtime = Self {
            orchestrator,
            camera: Arc::new(camera),
            permissions: Arc::new(permissions),
            motion,
            commands: command_rx,
            snapshots: snapshot_tx,
            origin: Instant::now(),
            sensor_failed: false,
        };
        let handle = WizardHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (runtime, handle, outcome_rx)
    }

    /// Run until `Shutdown` or until every handle is dropped.
    pub async fn run(mut self) {
        let mut motion_rx: Option<mpsc::Receiver<MotionSample>> = None;
        let mut capture: Option<PendingCapture> = None;
        let mut prompt: Option<PendingPermission> = None;

        loop {
            self.sync_subscription(&mut motion_rx);
            self.snapshots.send_replace(self.orchestrator.snapshot());
            let deadline = self
                .orchestrator
                .next_deadline()
                .map(|ms| self.origin + Duration::from_millis(ms));

            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(WizardCommand::Shutdown) => break,
                        Some(command) => {
                            if let Some(request) = self.handle_command(command, &mut prompt) {
                                self.start_capture(request, &mut capture);
                            }
                        }
                    }
                }
                sample = next_sample(&mut motion_rx) => {
                    match sample {
                        Some(sample) => {
                            let sample = MotionSample { timestamp_ms: self.now_ms(), ..sample };
                            if let Some(request) = self.orchestrator.on_motion_sample(&sample) {
                                self.start_capture(request, &mut capture);
                            }
                        }
                        None => {
                            warn!("motion source closed");
                            motion_rx = None;
                            self.sensor_failed = true;
                            self.orchestrator.set_sensor_available(false);
                        }
                    }
                }
                () = sleep_until_deadline(deadline) => {
                    if let Some(request) = self.orchestrator.poll(self.now_ms()) {
                        self.start_capture(request, &mut capture);
                    }
                }
                (ticket_id, result) = settle(&mut capture) => {
                    capture = None;
                    let settlement = self.orchestrator.complete_capture(ticket_id, result);
                    debug!(ticket = ticket_id, ?settlement, "capture settled");
                }
                status = answer(&mut prompt) => {
                    prompt = None;
                    debug!(?status, "permission prompt answered");
                    self.orchestrator.set_permission(status);
                }
            }
        }

        self.orchestrator.hide();
        self.snapshots.send_replace(self.orchestrator.snapshot());
        info!("wizard runtime stopped");
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn handle_command(
        &mut self,
        command: WizardCommand,
        prompt: &mut Option<PendingPermission>,
    ) -> Option<CaptureRequest> {
        debug!(?command, "wizard command");
        let result = match command {
            WizardCommand::Show => {
                self.orchestrator.show();
                self.sensor_failed = false;
                self.orchestrator.set_sensor_available(true);
                if !self.orchestrator.permission().is_granted() {
                    self.request_permission(prompt);
                }
                Ok(())
            }
            WizardCommand::Hide => {
                self.orchestrator.hide();
                Ok(())
            }
            WizardCommand::Continue => self.orchestrator.continue_step().map(|_| ()),
            WizardCommand::GoBack => self.orchestrator.go_back().map(|_| ()),
            WizardCommand::Close => {
                self.orchestrator.close();
                Ok(())
            }
            WizardCommand::Retake(slot) => self.orchestrator.retake(slot),
            WizardCommand::ManualCapture => {
                return match self.orchestrator.request_manual_capture() {
                    Ok(request) => Some(request),
                    Err(err) => {
                        debug!(%err, "manual capture refused");
                        None
                    }
                };
            }
            WizardCommand::RetryPermission => {
                self.request_permission(prompt);
                Ok(())
            }
            WizardCommand::SetSubmitting(submitting) => {
                self.orchestrator.set_submitting(submitting);
                Ok(())
            }
            WizardCommand::Shutdown => Ok(()),
        };
        if let Err(err) = result {
            debug!(%err, "command refused");
        }
        None
    }

    fn request_permission(&self, prompt: &mut Option<PendingPermission>) {
        if prompt.is_some() {
            debug!("permission prompt already pending");
            return;
        }
        let permissions = Arc::clone(&self.permissions);
        *prompt = Some(Box::pin(async move {
            permissions.request_camera_access().await
        }));
    }

    fn sync_subscription(&mut self, motion_rx: &mut Option<mpsc::Receiver<MotionSample>>) {
        let wanted = self.orchestrator.wants_motion() && !self.sensor_failed;
        match (wanted, motion_rx.is_some()) {
            (true, false) => {
                let interval_ms = self.orchestrator.config().sample_interval_ms;
                match self.motion.subscribe(interval_ms) {
                    Ok(rx) => {
                        debug!(interval_ms, "motion subscribed");
                        *motion_rx = Some(rx);
                    }
                    Err(err) => {
                        warn!(%err, "motion subscription failed");
                        self.sensor_failed = true;
                        self.orchestrator.set_sensor_available(false);
                    }
                }
            }
            (false, true) => {
                debug!("motion unsubscribed");
                *motion_rx = None;
            }
            _ => {}
        }
    }

    fn start_capture(&self, request: CaptureRequest, capture: &mut Option<PendingCapture>) {
        if capture.is_some() {
            // The core guard makes this unreachable; keep the running call.
            warn!(ticket = request.ticket.id(), "capture already pending; request ignored");
            return;
        }
        let camera = Arc::clone(&self.camera);
        let options = self.orchestrator.config().capture;
        let ticket = request.ticket;
        *capture = Some(Box::pin(async move {
            let result = camera.capture(ticket.facing(), options).await;
            (ticket.id(), result)
        }));
    }
}

async fn answer(prompt: &mut Option<PendingPermission>) -> PermissionStatus {
    match prompt {
        Some(fut) => fut.as_mut().await,
        None => pending().await,
    }
}

async fn next_sample(rx: &mut Option<mpsc::Receiver<MotionSample>>) -> Option<MotionSample> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn settle(
    capture: &mut Option<PendingCapture>,
) -> (u64, Result<CaptureArtifact, CaptureError>) {
    match capture {
        Some(fut) => fut.as_mut().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::types::WizardStep;

    /// Camera that returns numbered images after a short delay.
    #[derive(Default)]
    struct ScriptedCamera {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl Camera for Arc<ScriptedCamera> {
        async fn capture(
            &self,
            facing: CameraFacing,
            _options: CaptureOptions,
        ) -> Result<CaptureArtifact, CaptureError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail_first && n == 0 {
                return Err(CaptureError::Rejected("sensor busy".to_string()));
            }
            CaptureArtifact::new(format!("file:///{facing:?}-{n}.jpg"))
                .map_err(|_| CaptureError::EmptyResult)
        }
    }

    struct FixedPermission(PermissionStatus);

    #[async_trait]
    impl PermissionProvider for FixedPermission {
        async fn request_camera_access(&self) -> PermissionStatus {
            self.0
        }
    }

    /// Grants at once on the first request, then keeps later prompts open
    /// for ten seconds before granting.
    #[derive(Default)]
    struct SlowRetryPermission {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PermissionProvider for Arc<SlowRetryPermission> {
        async fn request_camera_access(&self) -> PermissionStatus {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            PermissionStatus::Granted
        }
    }

    /// Motion source producing a perfectly still device.
    #[derive(Default)]
    struct StillMotion {
        subscriptions: Arc<Mutex<usize>>,
    }

    impl MotionSource for StillMotion {
        fn subscribe(&self, interval_ms: u64) -> Result<mpsc::Receiver<MotionSample>, WizardError> {
            *self.subscriptions.lock().unwrap() += 1;
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                let mut t = 0;
                loop {
                    if tx.send(MotionSample::new(t, 0.0, 0.0, 1.0)).await.is_err() {
                        break;
                    }
                    t += interval_ms;
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            });
            Ok(rx)
        }
    }

    struct NoMotion;

    impl MotionSource for NoMotion {
        fn subscribe(&self, _interval_ms: u64) -> Result<mpsc::Receiver<MotionSample>, WizardError> {
            Err(WizardError::sensor_unavailable("no accelerometer"))
        }
    }

    async fn wait_for(handle: &WizardHandle, predicate: impl Fn(&WizardSnapshot) -> bool) {
        let mut rx = handle.subscribe();
        tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for snapshot")
            .expect("runtime stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_session_completes() {
        let camera = Arc::new(ScriptedCamera::default());
        let (runtime, handle, mut outcomes) = WizardRuntime::new(
            WizardConfig::default(),
            InitialCaptures::default(),
            Arc::clone(&camera),
            FixedPermission(PermissionStatus::Granted),
            StillMotion::default(),
        );
        let task = tokio::spawn(runtime.run());

        handle.send(WizardCommand::Show).await.unwrap();
        for step in [WizardStep::Front, WizardStep::Back, WizardStep::Selfie] {
            wait_for(&handle, |s| s.step == step && s.can_continue).await;
            handle.send(WizardCommand::Continue).await.unwrap();
        }
        wait_for(&handle, |s| s.step == WizardStep::Review && s.can_continue).await;
        handle.send(WizardCommand::Continue).await.unwrap();

        match outcomes.recv().await {
            Some(WizardOutcome::Completed(payload)) => {
                assert_eq!(payload.front.uri(), "file:///Back-0.jpg");
                assert_eq!(payload.back.uri(), "file:///Back-1.jpg");
                assert_eq!(payload.selfie.uri(), "file:///Front-2.jpg");
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(camera.calls.load(Ordering::SeqCst), 3);

        handle.send(WizardCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_is_not_retried_immediately() {
        let camera = Arc::new(ScriptedCamera {
            fail_first: true,
            ..Default::default()
        });
        let (runtime, handle, _outcomes) = WizardRuntime::new(
            WizardConfig::default(),
            InitialCaptures::default(),
            Arc::clone(&camera),
            FixedPermission(PermissionStatus::Granted),
            StillMotion::default(),
        );
        let task = tokio::spawn(runtime.run());

        handle.send(WizardCommand::Show).await.unwrap();
        wait_for(&handle, |s| s.last_capture_failure.is_some()).await;
        assert_eq!(camera.calls.load(Ordering::SeqCst), 1);
        assert!(!handle.snapshot().can_continue);

        // A fresh hold and countdown later the second attempt succeeds.
        wait_for(&handle, |s| s.can_continue).await;
        assert_eq!(camera.calls.load(Ordering::SeqCst), 2);

        handle.send(WizardCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_unavailable_keeps_manual_path() {
        let camera = Arc::new(ScriptedCamera::default());
        let (runtime, handle, _outcomes) = WizardRuntime::new(
            WizardConfig::default(),
            InitialCaptures::default(),
            Arc::clone(&camera),
            FixedPermission(PermissionStatus::Granted),
            NoMotion,
        );
        let task = tokio::spawn(runtime.run());

        handle.send(WizardCommand::Show).await.unwrap();
        wait_for(&handle, |s| !s.sensor_available).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(camera.calls.load(Ordering::SeqCst), 0);

        handle.send(WizardCommand::ManualCapture).await.unwrap();
        wait_for(&handle, |s| s.can_continue).await;
        assert_eq!(camera.calls.load(Ordering::SeqCst), 1);

        handle.send(WizardCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_blocks_capture() {
        let camera = Arc::new(ScriptedCamera::default());
        let motion = StillMotion::default();
        let subscriptions = Arc::clone(&motion.subscriptions);
        let (runtime, handle, _outcomes) = WizardRuntime::new(
            WizardConfig::default(),
            InitialCaptures::default(),
            Arc::clone(&camera),
            FixedPermission(PermissionStatus::Denied),
            motion,
        );
        let task = tokio::spawn(runtime.run());

        handle.send(WizardCommand::Show).await.unwrap();
        wait_for(&handle, |s| s.permission == PermissionStatus::Denied).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = handle.snapshot();
        assert!(!snapshot.can_continue);
        assert_eq!(snapshot.countdown, None);
        assert_eq!(*subscriptions.lock().unwrap(), 0);
        assert_eq!(camera.calls.load(Ordering::SeqCst), 0);

        handle.send(WizardCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_permission_prompt_does_not_stall_countdown() {
        let camera = Arc::new(ScriptedCamera::default());
        let permissions = Arc::new(SlowRetryPermission::default());
        let (runtime, handle, _outcomes) = WizardRuntime::new(
            WizardConfig::default(),
            InitialCaptures::default(),
            Arc::clone(&camera),
            Arc::clone(&permissions),
            StillMotion::default(),
        );
        let task = tokio::spawn(runtime.run());

        handle.send(WizardCommand::Show).await.unwrap();
        wait_for(&handle, |s| s.countdown == Some(2)).await;

        // A second retry while the first prompt is open does not stack prompts.
        handle.send(WizardCommand::RetryPermission).await.unwrap();
        handle.send(WizardCommand::RetryPermission).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(camera.calls.load(Ordering::SeqCst), 1);
        assert!(handle.snapshot().can_continue);
        assert_eq!(permissions.calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.snapshot().permission.is_granted());
        assert_eq!(permissions.calls.load(Ordering::SeqCst), 2);

        handle.send(WizardCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hide_unsubscribes_and_close_reports() {
        let camera = Arc::new(ScriptedCamera::default());
        let motion = StillMotion::default();
        let subscriptions = Arc::clone(&motion.subscriptions);
        let (runtime, handle, mut outcomes) = WizardRuntime::new(
            WizardConfig::default(),
            InitialCaptures::default(),
            Arc::clone(&camera),
            FixedPermission(PermissionStatus::Granted),
            motion,
        );
        let task = tokio::spawn(runtime.run());

        handle.send(WizardCommand::Show).await.unwrap();
        wait_for(&handle, |s| s.visible && s.permission.is_granted()).await;
        handle.send(WizardCommand::Hide).await.unwrap();
        wait_for(&handle, |s| !s.visible).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(camera.calls.load(Ordering::SeqCst), 0);

        handle.send(WizardCommand::Show).await.unwrap();
        wait_for(&handle, |s| s.visible).await;
        handle.send(WizardCommand::GoBack).await.unwrap();
        assert_eq!(outcomes.recv().await, Some(WizardOutcome::Closed));
        assert_eq!(*subscriptions.lock().unwrap(), 2);

        handle.send(WizardCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }
}
