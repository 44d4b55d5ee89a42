//! Proctoring session controller.
//!
//! Owns one session's state, camera stream, detector registrations and
//! fullscreen request. Lifecycle: [`ProctoringController::start`] →
//! [`ProctoringController::stop`] (timers + media) →
//! [`ProctoringController::cleanup`] (everything). Dropping the controller
//! runs cleanup.

use crate::capability::{CapabilityProbe, FrameData, MediaDevices};
use crate::classifier::{lock_state, ViolationRecorder, ViolationSink};
use crate::config::{ProctorConfig, ProctoringSettings};
use crate::detectors::{
    standard_detectors, AlwaysPresentOracle, DetectorContext, DetectorHandle, FacePresenceOracle, ScreenshotSink,
    SignalDetector,
};
use crate::error::ProctorResult;
use crate::fullscreen::FullscreenControl;
use crate::host::{FullscreenApi, HostEventBus, PageContext, ViewportProbe};
use crate::session::{ProctoringSessionState, SessionSnapshot, ViolationSummary};
use crate::violation::ViolationEvent;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Host surfaces the controller binds to.
#[derive(Clone)]
pub struct HostBindings {
    pub events: HostEventBus,
    pub media: Arc<dyn MediaDevices>,
    pub viewport: Arc<dyn ViewportProbe>,
    pub fullscreen: Arc<dyn FullscreenApi>,
    pub page: Arc<dyn PageContext>,
}

pub struct ProctoringController {
    config: ProctorConfig,
    bus: HostEventBus,
    viewport: Arc<dyn ViewportProbe>,
    state: Arc<Mutex<ProctoringSessionState>>,
    recorder: Arc<ViolationRecorder>,
    probe: Arc<CapabilityProbe>,
    fullscreen: FullscreenControl,
    oracle: Arc<dyn FacePresenceOracle>,
    screenshots: Option<Arc<dyn ScreenshotSink>>,
    detectors: Vec<Box<dyn SignalDetector>>,
    armed: Vec<(&'static str, DetectorHandle)>,
    active: bool,
}

impl ProctoringController {
    /// Build a controller over the given host. Fails when `config` is out of range.
    pub fn new(config: ProctorConfig, host: HostBindings, sink: Arc<dyn ViolationSink>) -> ProctorResult<Self> {
        config.validate()?;
        let state = Arc::new(Mutex::new(ProctoringSessionState::new()));
        let recorder = Arc::new(ViolationRecorder::new(Arc::clone(&state), sink, host.page));
        let probe = Arc::new(CapabilityProbe::new(host.media, Arc::clone(&recorder), &config));
        Ok(Self {
            config,
            bus: host.events,
            viewport: host.viewport,
            state,
            recorder,
            probe,
            fullscreen: FullscreenControl::new(host.fullscreen),
            oracle: Arc::new(AlwaysPresentOracle),
            screenshots: None,
            detectors: standard_detectors(),
            armed: Vec::new(),
            active: false,
        })
    }

    pub fn with_face_oracle(mut self, oracle: Arc<dyn FacePresenceOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_screenshot_sink(mut self, sink: Arc<dyn ScreenshotSink>) -> Self {
        self.screenshots = Some(sink);
        self
    }

    /// Replace the detector set armed by `start`.
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn SignalDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    /// Begin a session. Any previous session is torn down first.
    ///
    /// Returns whether camera/microphone acquisition succeeded (`true` when the
    /// settings request no media). Detectors are armed either way.
    pub async fn start(&mut self, settings: &ProctoringSettings) -> bool {
        self.cleanup();
        let session_id = Uuid::new_v4();
        {
            let mut state = lock_state(&self.state);
            state.reset();
            state.session_id = Some(session_id);
        }

        if !settings.enabled {
            info!("[PROCTOR] proctoring disabled for this exam, nothing armed");
            return false;
        }
        info!(%session_id, "[PROCTOR] starting session");

        let acquired = if settings.wants_media() {
            self.probe.initialize().await
        } else {
            true
        };
        if !acquired {
            warn!("[PROCTOR] continuing without camera, integrity not guaranteed");
        }

        self.arm_detectors(settings);
        self.active = true;
        acquired
    }

    fn arm_detectors(&mut self, settings: &ProctoringSettings) {
        let ctx = DetectorContext {
            recorder: Arc::clone(&self.recorder),
            bus: self.bus.clone(),
            probe: Arc::clone(&self.probe),
            viewport: Arc::clone(&self.viewport),
            oracle: Arc::clone(&self.oracle),
            screenshots: self.screenshots.clone(),
            config: self.config.clone(),
            settings: settings.clone(),
        };
        for detector in &self.detectors {
            match detector.arm(&ctx) {
                Ok(Some(handle)) => {
                    debug!("[PROCTOR] {} armed", detector.name());
                    self.armed.push((detector.name(), handle));
                }
                Ok(None) => {}
                Err(e) => warn!("[PROCTOR] {} detector not armed: {}", detector.name(), e),
            }
        }
        info!("[PROCTOR] {} detectors armed", self.armed.len());
    }

    /// Cancel polling timers and release media. Page listeners stay armed
    /// until [`cleanup`](Self::cleanup).
    pub fn stop(&mut self) {
        self.armed.retain_mut(|(_, handle)| {
            if handle.is_poller() {
                handle.release();
                false
            } else {
                true
            }
        });
        self.release_media();
        self.active = false;
        info!("[PROCTOR] session stopped");
    }

    /// Full teardown. Safe to call repeatedly and before any `start`.
    pub fn cleanup(&mut self) {
        if self.armed.is_empty() && !self.probe.is_active() && !self.active {
            self.fullscreen.exit_if_active();
            debug!("[PROCTOR] cleanup: nothing held");
            return;
        }
        for (_, mut handle) in self.armed.drain(..) {
            handle.release();
        }
        self.release_media();
        self.fullscreen.exit_if_active();
        self.active = false;
        info!("[PROCTOR] session cleaned up");
    }

    fn release_media(&self) {
        self.probe.release();
        let mut state = lock_state(&self.state);
        state.camera_active = false;
        state.microphone_active = false;
    }

    pub fn enable_fullscreen(&self) -> bool {
        self.fullscreen.enable()
    }

    pub fn disable_fullscreen(&self) -> bool {
        self.fullscreen.disable()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.is_active()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Names of the currently armed detectors, in arming order.
    pub fn armed_detectors(&self) -> Vec<&'static str> {
        self.armed.iter().map(|(name, _)| *name).collect()
    }

    pub fn get_tab_switch_count(&self) -> u32 {
        lock_state(&self.state).tab_switch_count()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        lock_state(&self.state).session_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        lock_state(&self.state).snapshot(self.active)
    }

    /// Copy of the log in record order.
    pub fn violations(&self) -> Vec<ViolationEvent> {
        lock_state(&self.state).violations().to_vec()
    }

    pub fn summary(&self) -> Vec<ViolationSummary> {
        lock_state(&self.state).summary()
    }

    pub fn set_suspicious_activity(&self, suspicious: bool) {
        lock_state(&self.state).suspicious_activity = suspicious;
    }

    pub fn update_audio_detection(&self, detected: bool) {
        lock_state(&self.state).audio_detected = detected;
    }

    /// One still from the camera, or `None` without an active stream.
    pub fn take_screenshot(&self) -> Option<FrameData> {
        self.probe.capture_frame()
    }

    /// Zero counters and clear the log. The stream and registrations are
    /// untouched, so the camera flags and session id carry over.
    pub fn reset(&self) {
        self.recorder.quiesce(|| {
            let mut state = lock_state(&self.state);
            let (session_id, camera, microphone) = (state.session_id, state.camera_active, state.microphone_active);
            state.reset();
            state.session_id = session_id;
            state.camera_active = camera;
            state.microphone_active = microphone;
        });
        debug!("[PROCTOR] session state reset");
    }

    /// The bus the host dispatches page events into.
    pub fn events(&self) -> &HostEventBus {
        &self.bus
    }
}

impl Drop for ProctoringController {
    fn drop(&mut self) {
        self.cleanup();
    }
}
