//! Periodic screenshots for after-the-fact review. Produces no violations.

use super::{DetectorContext, DetectorHandle, PollTimer, SignalDetector};
use crate::capability::FrameData;
use crate::error::ProctorResult;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Receiver of periodic captures (upload queue, disk writer, ...).
pub trait ScreenshotSink: Send + Sync {
    fn on_screenshot(&self, frame: FrameData);
}

impl<F> ScreenshotSink for F
where
    F: Fn(FrameData) + Send + Sync,
{
    fn on_screenshot(&self, frame: FrameData) {
        self(frame)
    }
}

pub struct ScreenshotDetector;

impl SignalDetector for ScreenshotDetector {
    fn name(&self) -> &'static str {
        "screenshot"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        let Some(sink) = ctx.screenshots.as_ref().map(Arc::clone) else {
            return Ok(None);
        };
        if !ctx.settings.enable_screenshot_capture || !ctx.probe.is_active() {
            debug!("[PROCTOR] periodic screenshots not armed");
            return Ok(None);
        }

        let probe = Arc::clone(&ctx.probe);
        let timer = PollTimer::spawn(
            self.name(),
            ctx.settings.screenshot_period(),
            Arc::clone(&ctx.recorder),
            move |live| {
                if !live.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(frame) = probe.capture_frame() {
                    sink.on_screenshot(frame);
                }
            },
        )?;
        Ok(Some(DetectorHandle::Poller(timer)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;

    #[test]
    fn test_needs_sink_and_camera() {
        let (mut ctx, _state) = testing::context();
        assert!(ScreenshotDetector.arm(&ctx).unwrap().is_none());
        ctx.screenshots = Some(Arc::new(|_f: FrameData| {}));
        assert!(ScreenshotDetector.arm(&ctx).unwrap().is_none());
    }
}
