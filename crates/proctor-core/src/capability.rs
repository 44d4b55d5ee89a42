//! Capability probe: camera + microphone acquisition and still-frame capture.
//!
//! Audio and video are always requested together in one call; an exam needs
//! both or neither. The probe keeps at most one stream and releases it on
//! every exit path, including drop.

use crate::classifier::{lock_state, Detail, ViolationRecorder};
use crate::config::ProctorConfig;
use crate::error::{ProctorError, ProctorResult};
use crate::violation::ViolationKind;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Combined media request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Request a camera track.
    pub video: bool,
    /// Request a microphone track.
    pub audio: bool,
    /// Ideal frame width in pixels.
    pub width: u32,
    /// Ideal frame height in pixels.
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// A live capture stream handed out by the host.
pub trait MediaStream: Send {
    fn track_kinds(&self) -> Vec<TrackKind>;

    /// Draw the current video frame at `width`x`height` and append its JPEG
    /// encoding to `buf`.
    fn draw_frame(&mut self, width: u32, height: u32, quality: f32, buf: &mut Vec<u8>) -> ProctorResult<()>;

    /// Stop every track. Called once per stream.
    fn stop_tracks(&mut self);
}

/// Host media device access (`getUserMedia`-equivalent). The only suspending
/// operation in the monitor: it waits on the candidate's permission decision.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: MediaConstraints) -> ProctorResult<Box<dyn MediaStream>>;
}

/// One captured still, serialized for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameData {
    pub width: u32,
    pub height: u32,
    /// `data:image/jpeg;base64,...`
    pub data_url: String,
}

impl FrameData {
    const PREFIX: &'static str = "data:image/jpeg;base64,";

    fn from_jpeg(width: u32, height: u32, jpeg: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
        Self {
            width,
            height,
            data_url: format!("{}{}", Self::PREFIX, encoded),
        }
    }

    /// Decoded JPEG bytes.
    pub fn jpeg_bytes(&self) -> ProctorResult<Vec<u8>> {
        let payload = self
            .data_url
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| ProctorError::Capture("not a JPEG data URL".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| ProctorError::Capture(e.to_string()))
    }
}

/// Owns the camera/microphone stream for one controller.
pub struct CapabilityProbe {
    devices: Arc<dyn MediaDevices>,
    recorder: Arc<ViolationRecorder>,
    width: u32,
    height: u32,
    jpeg_quality: f32,
    stream: Mutex<Option<Box<dyn MediaStream>>>,
    raster: Mutex<Vec<u8>>,
    /// Bumped by every release; an acquisition that straddles a release is discarded.
    epoch: AtomicU64,
}

impl CapabilityProbe {
    pub fn new(devices: Arc<dyn MediaDevices>, recorder: Arc<ViolationRecorder>, config: &ProctorConfig) -> Self {
        let (width, height) = (config.capture_width, config.capture_height);
        Self {
            devices,
            recorder,
            width,
            height,
            jpeg_quality: config.jpeg_quality,
            stream: Mutex::new(None),
            raster: Mutex::new(Vec::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            video: true,
            audio: true,
            width: self.width,
            height: self.height,
        }
    }

    /// Acquire camera and microphone. On failure records a critical
    /// `camera_init_failed` violation and returns `false`; the session goes on
    /// without a camera.
    pub async fn initialize(&self) -> bool {
        // Never hold two streams.
        self.release();
        let epoch = self.epoch.load(Ordering::SeqCst);

        info!("[PROCTOR] requesting camera + microphone ({}x{})", self.width, self.height);
        match self.devices.get_user_media(self.constraints()).await {
            Ok(mut stream) => {
                let mut slot = self.lock_stream();
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    warn!("[PROCTOR] session released during media request, stopping late stream");
                    stream.stop_tracks();
                    return false;
                }
                let kinds = stream.track_kinds();
                *slot = Some(stream);
                drop(slot);

                let mut state = lock_state(self.recorder.state());
                state.camera_active = kinds.contains(&TrackKind::Video);
                state.microphone_active = kinds.contains(&TrackKind::Audio);
                info!(
                    camera = state.camera_active,
                    microphone = state.microphone_active,
                    "[PROCTOR] media acquired"
                );
                true
            }
            Err(e) => {
                warn!("[PROCTOR] failed to initialize camera: {}", e);
                self.recorder.record_with(ViolationKind::CameraInitFailed, |state| {
                    state.camera_active = false;
                    state.microphone_active = false;
                    Detail::new("Failed to initialize camera access").with("error", e.to_string())
                });
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock_stream().is_some()
    }

    /// Current frame, or `None` without a stream. Draw failures are logged and
    /// also yield `None`.
    pub fn capture_frame(&self) -> Option<FrameData> {
        match self.try_capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("[PROCTOR] frame capture failed: {}", e);
                None
            }
        }
    }

    pub fn try_capture_frame(&self) -> ProctorResult<Option<FrameData>> {
        let mut slot = self.lock_stream();
        let Some(stream) = slot.as_mut() else {
            return Ok(None);
        };
        let mut raster = self.raster.lock().unwrap_or_else(|p| p.into_inner());
        raster.clear();
        stream.draw_frame(self.width, self.height, self.jpeg_quality, &mut raster)?;
        if raster.is_empty() {
            return Err(ProctorError::Capture("empty frame".to_string()));
        }
        Ok(Some(FrameData::from_jpeg(self.width, self.height, &raster)))
    }

    /// Stop all tracks and drop the stream. Returns whether anything was held.
    pub fn release(&self) -> bool {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let taken = self.lock_stream().take();
        match taken {
            Some(mut stream) => {
                stream.stop_tracks();
                let mut state = lock_state(self.recorder.state());
                state.camera_active = false;
                state.microphone_active = false;
                info!("[PROCTOR] media tracks stopped");
                true
            }
            None => false,
        }
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<Box<dyn MediaStream>>> {
        self.stream.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for CapabilityProbe {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::NullSink;
    use crate::host::StaticPageContext;
    use crate::session::ProctoringSessionState;
    use std::sync::atomic::AtomicUsize;

    struct FakeStream {
        live: Arc<AtomicUsize>,
        fail_draw: bool,
    }

    impl MediaStream for FakeStream {
        fn track_kinds(&self) -> Vec<TrackKind> {
            vec![TrackKind::Video, TrackKind::Audio]
        }

        fn draw_frame(&mut self, _w: u32, _h: u32, _q: f32, buf: &mut Vec<u8>) -> ProctorResult<()> {
            if self.fail_draw {
                return Err(ProctorError::Capture("video not ready".into()));
            }
            buf.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
            Ok(())
        }

        fn stop_tracks(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeDevices {
        live: Arc<AtomicUsize>,
        deny: bool,
        fail_draw: bool,
    }

    #[async_trait]
    impl MediaDevices for FakeDevices {
        async fn get_user_media(&self, c: MediaConstraints) -> ProctorResult<Box<dyn MediaStream>> {
            assert!(c.audio && c.video);
            if self.deny {
                return Err(ProctorError::PermissionDenied("NotAllowedError".into()));
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                live: Arc::clone(&self.live),
                fail_draw: self.fail_draw,
            }))
        }
    }

    fn probe(deny: bool, fail_draw: bool) -> (CapabilityProbe, Arc<AtomicUsize>, Arc<Mutex<ProctoringSessionState>>) {
        let live = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(Mutex::new(ProctoringSessionState::new()));
        let page = Arc::new(StaticPageContext {
            user_agent: "ua".into(),
            url: "https://exam.local".into(),
        });
        let recorder = Arc::new(ViolationRecorder::new(Arc::clone(&state), Arc::new(NullSink), page));
        let devices = Arc::new(FakeDevices {
            live: Arc::clone(&live),
            deny,
            fail_draw,
        });
        (
            CapabilityProbe::new(devices, recorder, &ProctorConfig::default()),
            live,
            state,
        )
    }

    #[tokio::test]
    async fn test_initialize_sets_flags_and_captures() {
        let (probe, live, state) = probe(false, false);
        assert!(probe.capture_frame().is_none());

        assert!(probe.initialize().await);
        assert_eq!(live.load(Ordering::SeqCst), 1);
        {
            let s = lock_state(&state);
            assert!(s.camera_active && s.microphone_active);
        }

        let frame = probe.capture_frame().unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
        assert!(frame.data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(frame.jpeg_bytes().unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn test_denial_records_one_critical_violation() {
        let (probe, live, state) = probe(true, false);
        assert!(!probe.initialize().await);
        assert_eq!(live.load(Ordering::SeqCst), 0);

        let s = lock_state(&state);
        assert!(!s.camera_active);
        assert_eq!(s.violation_count(), 1);
        let v = &s.violations()[0];
        assert_eq!(v.kind, ViolationKind::CameraInitFailed);
        assert_eq!(v.severity, crate::violation::Severity::Critical);
    }

    #[tokio::test]
    async fn test_reinitialize_never_holds_two_streams() {
        let (probe, live, _state) = probe(false, false);
        assert!(probe.initialize().await);
        assert!(probe.initialize().await);
        assert_eq!(live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (probe, live, state) = probe(false, false);
        probe.initialize().await;
        assert!(probe.release());
        assert!(!probe.release());
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(!lock_state(&state).camera_active);
        assert!(probe.capture_frame().is_none());
    }

    #[tokio::test]
    async fn test_draw_failure_is_no_frame() {
        let (probe, _live, state) = probe(false, true);
        probe.initialize().await;
        assert!(probe.capture_frame().is_none());
        assert!(probe.try_capture_frame().is_err());
        assert_eq!(lock_state(&state).violation_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_stream() {
        let (probe, live, _state) = probe(false, false);
        probe.initialize().await;
        drop(probe);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_huge_capture_size_builds_without_presizing() {
        let (live, state) = (Arc::new(AtomicUsize::new(0)), Arc::new(Mutex::new(ProctoringSessionState::new())));
        let page = Arc::new(StaticPageContext {
            user_agent: "ua".into(),
            url: "https://exam.local".into(),
        });
        let recorder = Arc::new(ViolationRecorder::new(Arc::clone(&state), Arc::new(NullSink), page));
        let devices = Arc::new(FakeDevices {
            live: Arc::clone(&live),
            deny: false,
            fail_draw: false,
        });
        let config = ProctorConfig {
            capture_width: u32::MAX,
            capture_height: u32::MAX,
            ..ProctorConfig::default()
        };
        let probe = CapabilityProbe::new(devices, recorder, &config);
        assert_eq!(probe.constraints().width, u32::MAX);
        assert!(probe.initialize().await);
        let frame = probe.capture_frame().expect("frame from live stream");
        assert_eq!(frame.jpeg_bytes().expect("decodable"), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }
}
