//! Dev-tools heuristic: a docked inspector shrinks the inner viewport.
//!
//! Edge-triggered. One violation per closed-to-open transition; the flag
//! clears when the gap closes, so reopening counts again. Undocked dev-tools
//! are not detected.

use super::{DetectorContext, DetectorHandle, PollTimer, SignalDetector};
use crate::classifier::Detail;
use crate::error::ProctorResult;
use crate::host::WindowDimensions;
use crate::violation::ViolationKind;
use std::sync::Arc;
use tracing::debug;

/// Open/closed tracking across polls.
#[derive(Debug, Clone, Copy)]
pub struct DevtoolsHeuristic {
    threshold: u32,
    open: bool,
}

impl DevtoolsHeuristic {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, open: false }
    }

    pub fn looks_open(&self, dims: &WindowDimensions) -> bool {
        dims.outer_width.saturating_sub(dims.inner_width) > self.threshold
            || dims.outer_height.saturating_sub(dims.inner_height) > self.threshold
    }

    /// Feed one poll. Returns `true` on the closed-to-open edge only.
    pub fn observe(&mut self, dims: &WindowDimensions) -> bool {
        let now_open = self.looks_open(dims);
        let opened = now_open && !self.open;
        self.open = now_open;
        opened
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

pub struct DevtoolsDetector;

impl SignalDetector for DevtoolsDetector {
    fn name(&self) -> &'static str {
        "devtools"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        let viewport = Arc::clone(&ctx.viewport);
        let recorder = Arc::clone(&ctx.recorder);
        let mut heuristic = DevtoolsHeuristic::new(ctx.config.devtools_threshold_px);

        let timer = PollTimer::spawn(
            self.name(),
            ctx.config.devtools_poll_interval(),
            Arc::clone(&ctx.recorder),
            move |live| {
                let dims = match viewport.dimensions() {
                    Ok(dims) => dims,
                    Err(e) => {
                        debug!("[PROCTOR] viewport unavailable: {}", e);
                        return;
                    }
                };
                if heuristic.observe(&dims) {
                    recorder.record_if_live(live, ViolationKind::DevtoolsOpened, |_| {
                        Detail::new("Developer tools were opened")
                            .with("outer_width", dims.outer_width)
                            .with("inner_width", dims.inner_width)
                            .with("outer_height", dims.outer_height)
                            .with("inner_height", dims.inner_height)
                    });
                }
            },
        )?;
        Ok(Some(DetectorHandle::Poller(timer)))
    }
}
