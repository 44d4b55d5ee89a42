//! Face presence on the camera feed.
//!
//! Every check captures a still and asks a [`FacePresenceOracle`]. A check
//! with no frame (camera gone, video not ready) is skipped rather than counted
//! as an absence.

use super::{DetectorContext, DetectorHandle, PollTimer, SignalDetector};
use crate::capability::FrameData;
use crate::classifier::Detail;
use crate::error::ProctorResult;
use crate::violation::ViolationKind;
use std::sync::Arc;
use tracing::debug;

/// Decides whether a face is visible in a frame.
pub trait FacePresenceOracle: Send + Sync {
    fn is_face_present(&self, frame: &FrameData) -> bool;
}

impl<F> FacePresenceOracle for F
where
    F: Fn(&FrameData) -> bool + Send + Sync,
{
    fn is_face_present(&self, frame: &FrameData) -> bool {
        self(frame)
    }
}

/// Placeholder oracle that always reports a face. Swap in a real model.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPresentOracle;

impl FacePresenceOracle for AlwaysPresentOracle {
    fn is_face_present(&self, _frame: &FrameData) -> bool {
        true
    }
}

pub struct FaceDetector;

impl SignalDetector for FaceDetector {
    fn name(&self) -> &'static str {
        "face"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        if !ctx.settings.enable_face_detection {
            debug!("[PROCTOR] face detection disabled");
            return Ok(None);
        }
        if !ctx.probe.is_active() {
            debug!("[PROCTOR] no camera stream, face detection not armed");
            return Ok(None);
        }

        let probe = Arc::clone(&ctx.probe);
        let oracle = Arc::clone(&ctx.oracle);
        let recorder = Arc::clone(&ctx.recorder);
        let timer = PollTimer::spawn(
            self.name(),
            ctx.config.face_check_interval(),
            Arc::clone(&ctx.recorder),
            move |live| {
                let Some(frame) = probe.capture_frame() else {
                    return;
                };
                if oracle.is_face_present(&frame) {
                    recorder.update_if_live(live, |state| state.face_detected = true);
                } else {
                    recorder.record_if_live(live, ViolationKind::NoFaceDetected, |state| {
                        state.face_detected = false;
                        Detail::new("No face detected in camera feed")
                    });
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
    fn test_not_armed_without_camera() {
        let (ctx, _state) = testing::context();
        assert!(FaceDetector.arm(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_closures_are_oracles() {
        let frame = FrameData {
            width: 1,
            height: 1,
            data_url: String::new(),
        };
        let never = |_f: &FrameData| false;
        assert!(!never.is_face_present(&frame));
        assert!(AlwaysPresentOracle.is_face_present(&frame));
    }
}
