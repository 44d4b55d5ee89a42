//! Simulated host: camera, window geometry, fullscreen and a face switch,
//! all driven by script directives.

use async_trait::async_trait;
use proctor_core::{
    FacePresenceOracle, FrameData, FullscreenApi, MediaConstraints, MediaDevices, MediaStream, ProctorError,
    ProctorResult, TrackKind, ViewportProbe, WindowDimensions,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Smallest well-formed JPEG marker pair; enough for the pipeline.
const FAKE_JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 800;
const DOCKED_DEVTOOLS_PX: u32 = 320;

#[derive(Default)]
pub struct SimHost {
    pub deny_camera: AtomicBool,
    pub devtools_open: AtomicBool,
    pub face_absent: AtomicBool,
    pub fullscreen: AtomicBool,
}

impl SimHost {
    pub fn new(deny_camera: bool) -> Arc<Self> {
        let host = Self::default();
        host.deny_camera.store(deny_camera, Ordering::SeqCst);
        Arc::new(host)
    }
}

struct SimStream;

impl MediaStream for SimStream {
    fn track_kinds(&self) -> Vec<TrackKind> {
        vec![TrackKind::Video, TrackKind::Audio]
    }

    fn draw_frame(&mut self, _width: u32, _height: u32, _quality: f32, buf: &mut Vec<u8>) -> ProctorResult<()> {
        buf.extend_from_slice(&FAKE_JPEG);
        Ok(())
    }

    fn stop_tracks(&mut self) {
        debug!("[sim] camera tracks stopped");
    }
}

#[async_trait]
impl MediaDevices for SimHost {
    async fn get_user_media(&self, constraints: MediaConstraints) -> ProctorResult<Box<dyn MediaStream>> {
        if self.deny_camera.load(Ordering::SeqCst) {
            return Err(ProctorError::PermissionDenied("candidate denied camera access".into()));
        }
        debug!("[sim] granting {}x{} stream", constraints.width, constraints.height);
        Ok(Box::new(SimStream))
    }
}

impl ViewportProbe for SimHost {
    fn dimensions(&self) -> ProctorResult<WindowDimensions> {
        let mut dims = WindowDimensions::undocked(WINDOW_WIDTH, WINDOW_HEIGHT);
        if self.devtools_open.load(Ordering::SeqCst) {
            dims.inner_height -= DOCKED_DEVTOOLS_PX;
        }
        Ok(dims)
    }
}

impl FullscreenApi for SimHost {
    fn request_fullscreen(&self) -> ProctorResult<()> {
        self.fullscreen.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn exit_fullscreen(&self) -> ProctorResult<()> {
        self.fullscreen.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::SeqCst)
    }
}

impl FacePresenceOracle for SimHost {
    fn is_face_present(&self, _frame: &FrameData) -> bool {
        !self.face_absent.load(Ordering::SeqCst)
    }
}
