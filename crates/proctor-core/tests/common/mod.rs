//! Simulated host for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use proctor_core::{
    FullscreenApi, HostBindings, HostEventBus, MediaConstraints, MediaDevices, MediaStream, PageContext,
    ProctorConfig, ProctorError, ProctorResult, ProctoringController, StaticPageContext, TrackKind,
    ViewportProbe, ViolationSink, WindowDimensions,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub struct FakeStream {
    live: Arc<AtomicUsize>,
}

impl MediaStream for FakeStream {
    fn track_kinds(&self) -> Vec<TrackKind> {
        vec![TrackKind::Video, TrackKind::Audio]
    }

    fn draw_frame(&mut self, _w: u32, _h: u32, _q: f32, buf: &mut Vec<u8>) -> ProctorResult<()> {
        buf.extend_from_slice(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]);
        Ok(())
    }

    fn stop_tracks(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Camera that grants or denies; counts streams still running.
#[derive(Default)]
pub struct FakeMedia {
    pub deny: AtomicBool,
    pub live_streams: Arc<AtomicUsize>,
    pub requests: AtomicUsize,
}

#[async_trait]
impl MediaDevices for FakeMedia {
    async fn get_user_media(&self, _constraints: MediaConstraints) -> ProctorResult<Box<dyn MediaStream>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(ProctorError::PermissionDenied("NotAllowedError: Permission denied".into()));
        }
        self.live_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            live: Arc::clone(&self.live_streams),
        }))
    }
}

pub struct FakeViewport(pub Mutex<WindowDimensions>);

impl FakeViewport {
    pub fn set_gap(&self, gap: u32) {
        let mut dims = self.0.lock().unwrap();
        dims.inner_height = dims.outer_height - gap;
    }
}

impl ViewportProbe for FakeViewport {
    fn dimensions(&self) -> ProctorResult<WindowDimensions> {
        Ok(*self.0.lock().unwrap())
    }
}

#[derive(Default)]
pub struct FakeFullscreen {
    pub on: AtomicBool,
}

impl FullscreenApi for FakeFullscreen {
    fn request_fullscreen(&self) -> ProctorResult<()> {
        self.on.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn exit_fullscreen(&self) -> ProctorResult<()> {
        self.on.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

pub struct Host {
    pub bus: HostEventBus,
    pub media: Arc<FakeMedia>,
    pub viewport: Arc<FakeViewport>,
    pub fullscreen: Arc<FakeFullscreen>,
}

impl Host {
    pub fn new() -> Self {
        Self::with_bus(HostEventBus::new())
    }

    pub fn with_bus(bus: HostEventBus) -> Self {
        Self {
            bus,
            media: Arc::new(FakeMedia::default()),
            viewport: Arc::new(FakeViewport(Mutex::new(WindowDimensions::undocked(1280, 800)))),
            fullscreen: Arc::new(FakeFullscreen::default()),
        }
    }

    pub fn bindings(&self) -> HostBindings {
        let page: Arc<dyn PageContext> = Arc::new(StaticPageContext {
            user_agent: "Mozilla/5.0 (Test)".into(),
            url: "https://exam.local/attempt/42".into(),
        });
        HostBindings {
            events: self.bus.clone(),
            media: self.media.clone(),
            viewport: self.viewport.clone(),
            fullscreen: self.fullscreen.clone(),
            page,
        }
    }

    pub fn controller(&self, sink: Arc<dyn ViolationSink>) -> ProctoringController {
        ProctoringController::new(ProctorConfig::default(), self.bindings(), sink)
            .expect("default config is valid")
    }
}
