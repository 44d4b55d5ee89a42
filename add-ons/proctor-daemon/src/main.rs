//! Proctor Daemon (scripted exam session)
//!
//! Replays a JSON-lines script against a simulated host, running the full
//! proctoring stack: page signals go through the detectors, violations come
//! out of the sink, and the policy evaluator decides warn / flag / terminate.
//!
//! Usage: `proctor-daemon [script.jsonl]` (reads stdin without a path).
//!
//! Each line is either a page signal (`{"type":"copy"}`,
//! `{"type":"key_down","key":"c","ctrl":true}`, ...) or a directive
//! (`{"do":"wait","ms":2500}`, `{"do":"devtools","open":true}`, ...).

mod sim;

use proctor_core::{
    ChannelSink, FacePresenceOracle, FrameData, HostBindings, HostEventBus, HostSignal, PolicyDecision,
    PolicyEvaluator, ProctorConfig, ProctorFileConfig, ProctoringController, ProctoringSettings, StaticPageContext,
    ViolationEvent,
};
use serde::Deserialize;
use sim::SimHost;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Script directives that drive the simulated host rather than the page.
#[derive(Debug, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
enum Directive {
    Wait { ms: u64 },
    Devtools { open: bool },
    Face { present: bool },
    Audio { detected: bool },
    Fullscreen { on: bool },
    Screenshot,
    Snapshot,
    Stop,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptLine {
    Signal(HostSignal),
    Directive(Directive),
}

/// What the script loop should do after a line.
enum Flow {
    Continue,
    Finish,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[proctor-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (settings, runtime) = load_config()?;
    let deny_camera = std::env::var("PROCTOR_SIM_DENY_CAMERA")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);

    let host = SimHost::new(deny_camera);
    let bus = HostEventBus::new();
    let bindings = HostBindings {
        events: bus.clone(),
        media: host.clone(),
        viewport: host.clone(),
        fullscreen: host.clone(),
        page: Arc::new(StaticPageContext {
            user_agent: "proctor-daemon/0.1 (simulated)".into(),
            url: "sim://exam/attempt".into(),
        }),
    };
    let (sink, mut violations) = ChannelSink::new();
    let oracle: Arc<dyn FacePresenceOracle> = host.clone();
    let mut controller = ProctoringController::new(runtime, bindings, Arc::new(sink))?
        .with_face_oracle(oracle)
        .with_screenshot_sink(Arc::new(|frame: FrameData| {
            tracing::info!(bytes = frame.data_url.len(), "[proctor-daemon] periodic screenshot");
        }));
    let mut policy = PolicyEvaluator::new(&settings);

    let camera = controller.start(&settings).await;
    tracing::info!(
        camera,
        session_id = ?controller.session_id(),
        "[proctor-daemon] session started"
    );

    let reader: Box<dyn AsyncBufRead + Unpin> = match std::env::args().nth(1) {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; ending session");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let step: ScriptLine = match serde_json::from_str(line) {
            Ok(step) => step,
            Err(e) => {
                tracing::warn!(error = %e, line, "[proctor-daemon] skipping unreadable line");
                continue;
            }
        };
        let flow = run_step(step, &controller, &host, &bus).await;

        if drain_violations(&mut violations, &mut policy, &mut controller) || matches!(flow, Flow::Finish) {
            break;
        }
    }

    controller.stop();
    drain_violations(&mut violations, &mut policy, &mut controller);
    println!("{}", serde_json::to_string(&controller.snapshot())?);
    println!("{}", serde_json::to_string(&controller.summary())?);
    controller.cleanup();
    Ok(())
}

fn load_config() -> Result<(ProctoringSettings, ProctorConfig), Box<dyn std::error::Error>> {
    match std::env::var("PROCTOR_CONFIG") {
        Ok(path) => {
            let file = ProctorFileConfig::load_from_path(Path::new(&path))?;
            tracing::info!(path = %path, "[proctor-daemon] loaded config file");
            Ok((file.settings, file.runtime))
        }
        Err(_) => Ok((ProctoringSettings::from_env(), ProctorConfig::default())),
    }
}

async fn run_step(step: ScriptLine, controller: &ProctoringController, host: &SimHost, bus: &HostEventBus) -> Flow {
    match step {
        ScriptLine::Signal(signal) => {
            let event = bus.emit(signal);
            if event.default_action.is_prevented() {
                tracing::debug!("[proctor-daemon] default action suppressed");
            }
        }
        ScriptLine::Directive(directive) => match directive {
            Directive::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            Directive::Devtools { open } => host.devtools_open.store(open, Ordering::SeqCst),
            Directive::Face { present } => host.face_absent.store(!present, Ordering::SeqCst),
            Directive::Audio { detected } => controller.update_audio_detection(detected),
            Directive::Fullscreen { on: true } => {
                controller.enable_fullscreen();
            }
            Directive::Fullscreen { on: false } => {
                controller.disable_fullscreen();
            }
            Directive::Screenshot => match controller.take_screenshot() {
                Some(frame) => tracing::info!(bytes = frame.data_url.len(), "[proctor-daemon] screenshot taken"),
                None => tracing::info!("[proctor-daemon] no camera, no screenshot"),
            },
            Directive::Snapshot => match serde_json::to_string(&controller.snapshot()) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "[proctor-daemon] snapshot not serializable"),
            },
            Directive::Stop => return Flow::Finish,
        },
    }
    Flow::Continue
}

/// Print pending violations and apply policy. Returns `true` once the
/// policy terminates the exam.
fn drain_violations(
    rx: &mut UnboundedReceiver<ViolationEvent>,
    policy: &mut PolicyEvaluator,
    controller: &mut ProctoringController,
) -> bool {
    while let Ok(violation) = rx.try_recv() {
        if let Ok(json) = serde_json::to_string(&violation) {
            println!("{}", json);
        }
        let decision = policy.evaluate(&violation);
        if let Ok(json) = serde_json::to_string(&decision) {
            println!("{}", json);
        }
        match decision {
            PolicyDecision::Warning { .. } => {}
            PolicyDecision::Flag { .. } => controller.set_suspicious_activity(true),
            PolicyDecision::Terminate { reason } => {
                tracing::warn!(reason = %reason, "[proctor-daemon] exam terminated by policy");
                controller.cleanup();
                return true;
            }
        }
    }
    policy.is_terminated()
}
