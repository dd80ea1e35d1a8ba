//! capture-wizard - simulated capture session
//!
//! Drives the wizard end to end against a simulated camera, permission prompt
//! and accelerometer, then prints the confirmed payload as JSON.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use capture_wizard::{
    Camera, CameraFacing, CaptureArtifact, CaptureError, CaptureOptions, InitialCaptures,
    MotionSample, MotionSource, PermissionProvider, PermissionStatus, WizardCommand,
    WizardConfig, WizardError, WizardHandle, WizardOutcome, WizardRuntime, WizardSnapshot,
    WizardStep,
};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// capture-wizard - run a simulated identity capture session
#[derive(Parser, Debug)]
#[command(name = "capture-wizard")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shake the device for this long after each subscription (ms)
    #[arg(long, default_value = "0")]
    shaky_ms: u64,

    /// Simulated camera latency (ms)
    #[arg(long, default_value = "150")]
    camera_latency_ms: u64,

    /// Refuse camera access
    #[arg(long)]
    deny_permission: bool,

    /// Give up after this many seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct SimulatedCamera {
    latency: Duration,
    shots: AtomicU64,
}

#[async_trait]
impl Camera for SimulatedCamera {
    async fn capture(
        &self,
        facing: CameraFacing,
        options: CaptureOptions,
    ) -> Result<CaptureArtifact, CaptureError> {
        let shot = self.shots.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        let lens = match facing {
            CameraFacing::Front => "front",
            CameraFacing::Back => "rear",
        };
        info!(shot, lens, quality = options.quality, "shutter");
        CaptureArtifact::new(format!("file:///tmp/capture-{shot}-{lens}.jpg"))
            .map_err(|_| CaptureError::EmptyResult)
    }
}

struct SimulatedPrompt {
    grant: bool,
}

#[async_trait]
impl PermissionProvider for SimulatedPrompt {
    async fn request_camera_access(&self) -> PermissionStatus {
        if self.grant {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }
}

/// Accelerometer resting on its back, optionally shaken for a while first.
struct SimulatedAccelerometer {
    shaky_ms: u64,
}

impl MotionSource for SimulatedAccelerometer {
    fn subscribe(&self, interval_ms: u64) -> Result<mpsc::Receiver<MotionSample>, WizardError> {
        let (tx, rx) = mpsc::channel(16);
        let shaky_ms = self.shaky_ms;
        tokio::spawn(async move {
            let mut elapsed = 0u64;
            let mut flip = 1.0f32;
            loop {
                let jitter = if elapsed < shaky_ms { 0.3 * flip } else { 0.0 };
                flip = -flip;
                let sample = MotionSample::new(elapsed, jitter, 0.01, 1.0 + jitter / 2.0);
                if tx.send(sample).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                elapsed += interval_ms;
            }
        });
        Ok(rx)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match &cli.config {
        Some(path) => WizardConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => WizardConfig::default(),
    };

    if cli.print_config {
        print!("{}", config.to_toml().context("failed to render config")?);
        return Ok(());
    }

    let camera = SimulatedCamera {
        latency: Duration::from_millis(cli.camera_latency_ms),
        shots: AtomicU64::new(0),
    };
    let prompt = SimulatedPrompt {
        grant: !cli.deny_permission,
    };
    let accelerometer = SimulatedAccelerometer {
        shaky_ms: cli.shaky_ms,
    };

    let (runtime, handle, mut outcomes) =
        WizardRuntime::new(config, InitialCaptures::default(), camera, prompt, accelerometer);
    let task = tokio::spawn(runtime.run());

    let session = tokio::time::timeout(
        Duration::from_secs(cli.timeout_secs),
        drive_session(&handle, &mut outcomes),
    )
    .await;

    handle.send(WizardCommand::Shutdown).await.ok();
    task.await.context("wizard runtime panicked")?;

    let payload = match session {
        Ok(result) => result?,
        Err(_) => bail!("session did not finish within {}s", cli.timeout_secs),
    };
    let json = serde_json::to_string_pretty(&payload).context("failed to encode payload")?;
    println!("{json}");
    Ok(())
}

/// Walk every step, continuing as soon as each one is complete.
async fn drive_session(
    handle: &WizardHandle,
    outcomes: &mut mpsc::UnboundedReceiver<WizardOutcome>,
) -> Result<capture_wizard::CapturePayload> {
    handle.send(WizardCommand::Show).await?;

    for step in WizardStep::ALL {
        let snapshot = wait_until(handle, |s| {
            s.permission == PermissionStatus::Denied || (s.step == step && s.can_continue)
        })
        .await?;
        if snapshot.permission == PermissionStatus::Denied {
            handle.send(WizardCommand::Close).await?;
            bail!("camera permission denied");
        }
        info!(step = %step, "{}", snapshot.title);
        handle.send(WizardCommand::Continue).await?;
    }

    match outcomes.recv().await {
        Some(WizardOutcome::Completed(payload)) => Ok(payload),
        Some(WizardOutcome::Closed) => bail!("wizard closed without payload"),
        None => bail!("wizard runtime stopped"),
    }
}

async fn wait_until(
    handle: &WizardHandle,
    predicate: impl Fn(&WizardSnapshot) -> bool,
) -> Result<WizardSnapshot> {
    let mut rx = handle.subscribe();
    let snapshot = rx
        .wait_for(|s| predicate(s))
        .await
        .context("wizard runtime stopped")?;
    Ok(snapshot.clone())
}
