//! Signal detectors.
//!
//! Each detector is armed once per session and yields a [`DetectorHandle`]:
//! either a page-event listener registration or a poll timer. Detectors never
//! build violations themselves; everything goes through the recorder.
//!
//! - **Page listeners** (`page`): visibility, focus, context menu, clipboard
//! - **Keyboard** (`keyboard`): prohibited shortcut table
//! - **Dev-tools** (`devtools`): window-geometry heuristic, edge-triggered
//! - **Face presence** (`face`): pluggable oracle on captured frames
//! - **Screenshots** (`screenshot`): periodic still hand-off, no violations

pub mod devtools;
pub mod face;
pub mod keyboard;
pub mod page;
pub mod screenshot;

use crate::capability::CapabilityProbe;
use crate::classifier::{Detail, ViolationRecorder};
use crate::config::{ProctorConfig, ProctoringSettings};
use crate::error::{ProctorError, ProctorResult};
use crate::host::{HostEvent, HostEventBus, ListenerHandle, Listener, ViewportProbe};
use crate::violation::{ViolationEvent, ViolationKind};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

pub use devtools::{DevtoolsDetector, DevtoolsHeuristic};
pub use face::{AlwaysPresentOracle, FaceDetector, FacePresenceOracle};
pub use keyboard::{combo_string, is_prohibited, KeyboardDetector, ProhibitedCombo, PROHIBITED_COMBOS};
pub use page::{ContextMenuDetector, CopyDetector, FocusDetector, PasteDetector, VisibilityDetector};
pub use screenshot::{ScreenshotDetector, ScreenshotSink};

/// Everything a detector may touch while arming.
pub struct DetectorContext {
    pub recorder: Arc<ViolationRecorder>,
    pub bus: HostEventBus,
    pub probe: Arc<CapabilityProbe>,
    pub viewport: Arc<dyn ViewportProbe>,
    pub oracle: Arc<dyn FacePresenceOracle>,
    pub screenshots: Option<Arc<dyn ScreenshotSink>>,
    pub config: ProctorConfig,
    pub settings: ProctoringSettings,
}

/// An independent signal source.
pub trait SignalDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register with the host. `Ok(None)` means the detector does not apply to
    /// this session (e.g. face checks without a camera).
    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>>;
}

/// Live registration of an armed detector.
pub enum DetectorHandle {
    Listener(ListenerHandle),
    Poller(PollTimer),
}

impl DetectorHandle {
    pub fn is_poller(&self) -> bool {
        matches!(self, DetectorHandle::Poller(_))
    }

    pub fn release(&mut self) {
        match self {
            DetectorHandle::Listener(handle) => handle.release(),
            DetectorHandle::Poller(timer) => timer.cancel(),
        }
    }
}

/// The full detector set, in arming order.
pub fn standard_detectors() -> Vec<Box<dyn SignalDetector>> {
    vec![
        Box::new(VisibilityDetector),
        Box::new(FocusDetector),
        Box::new(ContextMenuDetector),
        Box::new(KeyboardDetector),
        Box::new(CopyDetector),
        Box::new(PasteDetector),
        Box::new(DevtoolsDetector),
        Box::new(FaceDetector),
        Box::new(ScreenshotDetector),
    ]
}

/// Cancel the host's default behavior, then record. Every suppressible
/// detector goes through here so the order cannot be forgotten.
pub(crate) fn suppress_and_record(
    event: &HostEvent,
    recorder: &ViolationRecorder,
    kind: ViolationKind,
    detail: Detail,
) -> ViolationEvent {
    event.default_action.prevent();
    recorder.record_with(kind, move |_| detail)
}

/// Wrap a listener body so nothing unwinds into the host's event loop.
pub(crate) fn guarded_listener<F>(name: &'static str, body: F) -> Listener
where
    F: Fn(&HostEvent) + Send + Sync + 'static,
{
    Arc::new(move |event: &HostEvent| {
        if panic::catch_unwind(AssertUnwindSafe(|| body(event))).is_err() {
            error!("[PROCTOR] {} listener panicked", name);
        }
    })
}

/// Fixed-cadence timer for polling detectors.
///
/// The first tick fires one period after arming. Cancelling clears the live
/// flag under the recorder gate, so once `cancel` returns no tick of this timer
/// can append to the log.
pub struct PollTimer {
    name: &'static str,
    live: Arc<AtomicBool>,
    recorder: Arc<ViolationRecorder>,
    task: Option<JoinHandle<()>>,
}

impl PollTimer {
    pub(crate) fn spawn<F>(
        name: &'static str,
        period: Duration,
        recorder: Arc<ViolationRecorder>,
        mut tick: F,
    ) -> ProctorResult<Self>
    where
        F: FnMut(&AtomicBool) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ProctorError::Unsupported(format!("{} timer needs a tokio runtime: {}", name, e)))?;
        let live = Arc::new(AtomicBool::new(true));
        let task_live = Arc::clone(&live);

        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !task_live.load(Ordering::SeqCst) {
                    break;
                }
                if panic::catch_unwind(AssertUnwindSafe(|| tick(&task_live))).is_err() {
                    error!("[PROCTOR] {} tick panicked", name);
                }
            }
        });
        debug!("[PROCTOR] {} timer armed ({:?})", name, period);

        Ok(Self {
            name,
            live,
            recorder,
            task: Some(task),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the timer. A second call is a no-op.
    pub fn cancel(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let live = &self.live;
        self.recorder.quiesce(|| live.store(false, Ordering::SeqCst));
        task.abort();
        debug!("[PROCTOR] {} timer cancelled", self.name);
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for detector tests.

    use super::*;
    use crate::capability::{MediaConstraints, MediaDevices, MediaStream};
    use crate::classifier::NullSink;
    use crate::host::{StaticPageContext, WindowDimensions};
    use crate::session::ProctoringSessionState;
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub struct NoMedia;

    #[async_trait]
    impl MediaDevices for NoMedia {
        async fn get_user_media(&self, _c: MediaConstraints) -> ProctorResult<Box<dyn MediaStream>> {
            Err(ProctorError::DeviceUnavailable("no camera".into()))
        }
    }

    pub struct FixedViewport(pub Mutex<WindowDimensions>);

    impl ViewportProbe for FixedViewport {
        fn dimensions(&self) -> ProctorResult<WindowDimensions> {
            Ok(*self.0.lock().unwrap())
        }
    }

    pub fn context() -> (DetectorContext, Arc<Mutex<ProctoringSessionState>>) {
        let state = Arc::new(Mutex::new(ProctoringSessionState::new()));
        let page = Arc::new(StaticPageContext {
            user_agent: "ua".into(),
            url: "https://exam.local".into(),
        });
        let recorder = Arc::new(ViolationRecorder::new(Arc::clone(&state), Arc::new(NullSink), page));
        let config = ProctorConfig::default();
        let probe = Arc::new(CapabilityProbe::new(Arc::new(NoMedia), Arc::clone(&recorder), &config));
        let ctx = DetectorContext {
            recorder,
            bus: HostEventBus::new(),
            probe,
            viewport: Arc::new(FixedViewport(Mutex::new(WindowDimensions::undocked(1280, 800)))),
            oracle: Arc::new(AlwaysPresentOracle),
            screenshots: None,
            config,
            settings: ProctoringSettings::default(),
        };
        (ctx, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::lock_state;
    use crate::host::HostSignal;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_suppression_happens_before_record() {
        let (ctx, state) = testing::context();
        let event = HostEvent::new(HostSignal::Copy);
        let v = suppress_and_record(
            &event,
            &ctx.recorder,
            ViolationKind::CopyAttempt,
            Detail::new("Attempted to copy content"),
        );
        assert!(event.default_action.is_prevented());
        assert_eq!(lock_state(&state).violations(), &[v]);
    }

    #[test]
    fn test_guarded_listener_swallows_panics() {
        let listener = guarded_listener("boom", |_e| panic!("listener failure"));
        listener(&HostEvent::new(HostSignal::Blur));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_each_period_until_cancelled() {
        let (ctx, _state) = testing::context();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&ticks);
        let mut timer = PollTimer::spawn("test", Duration::from_secs(1), Arc::clone(&ctx.recorder), move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        timer.cancel();
        timer.cancel();
        assert!(!timer.is_live());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_timer_without_runtime_is_unsupported() {
        let (ctx, _state) = testing::context();
        let err = PollTimer::spawn("orphan", Duration::from_secs(1), ctx.recorder, |_| {})
            .err()
            .unwrap();
        assert!(matches!(err, ProctorError::Unsupported(_)));
    }

    #[test]
    fn test_standard_set_has_unique_names() {
        let names: Vec<&str> = standard_detectors().iter().map(|d| d.name()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names.len(), sorted.len());
        assert_eq!(names.len(), 9);
    }
}
