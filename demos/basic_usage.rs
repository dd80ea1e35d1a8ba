/// Basic usage example: drive the wizard core with a scripted sample stream
use capture_wizard::{
    CaptureArtifact, CapturePayload, InitialCaptures, MotionSample, PermissionStatus,
    WizardConfig, WizardObserver, WizardOrchestrator, WizardSnapshot,
};

struct PrintUploader;

impl WizardObserver for PrintUploader {
    fn on_complete(&mut self, payload: CapturePayload) {
        println!("\nUploading:");
        println!("  front:  {}", payload.front);
        println!("  back:   {}", payload.back);
        println!("  selfie: {}", payload.selfie);
    }

    fn on_close(&mut self) {
        println!("\nWizard closed without upload");
    }
}

fn main() {
    println!("=== Capture Wizard: Basic Example ===\n");

    let mut wizard = WizardOrchestrator::new(
        WizardConfig::default(),
        InitialCaptures::default(),
        Box::new(PrintUploader),
    );
    wizard.set_permission(PermissionStatus::Granted);
    wizard.show();

    let mut t = 0u64;
    let mut shot = 0;
    while wizard.current_step().is_some_and(|step| step.is_capturing()) {
        print_snapshot(&wizard.snapshot());

        // Lift the phone into position (moving), then hold still.
        for i in 0..6u64 {
            let wobble = if i % 2 == 0 { 0.25 } else { -0.25 };
            wizard.on_motion_sample(&MotionSample::new(t, wobble, 0.1, 0.95));
            t += 200;
        }

        let request = loop {
            let fired = wizard
                .on_motion_sample(&MotionSample::new(t, 0.01, 0.0, 1.0))
                .or_else(|| wizard.poll(t + 100));
            if let Some(request) = fired {
                break request;
            }
            if let Some(countdown) = wizard.countdown() {
                println!("  {t:>6}ms countdown {countdown}");
            }
            t += 200;
        };

        shot += 1;
        let uri = format!("file:///tmp/shot-{shot}.jpg");
        println!(
            "  {t:>6}ms capture #{} with {:?} camera -> {uri}",
            request.ticket.id(),
            request.ticket.facing()
        );
        if let Ok(artifact) = CaptureArtifact::new(uri) {
            wizard.complete_capture(request.ticket.id(), Ok(artifact));
        }

        if let Err(err) = wizard.continue_step() {
            println!("  continue refused: {err}");
            break;
        }
    }

    print_snapshot(&wizard.snapshot());
    if let Err(err) = wizard.continue_step() {
        println!("Confirm refused: {err}");
    }
}

fn print_snapshot(snapshot: &WizardSnapshot) {
    println!(
        "[{}/{}] {}: {}",
        snapshot.position, snapshot.total, snapshot.title, snapshot.instruction
    );
}
