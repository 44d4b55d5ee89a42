//! Best-effort fullscreen control. Failures are logged and swallowed; they
//! never become violations.

use crate::host::FullscreenApi;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct FullscreenControl {
    api: Arc<dyn FullscreenApi>,
    requested: AtomicBool,
}

impl FullscreenControl {
    pub fn new(api: Arc<dyn FullscreenApi>) -> Self {
        Self {
            api,
            requested: AtomicBool::new(false),
        }
    }

    /// Returns whether the host accepted the request.
    pub fn enable(&self) -> bool {
        match self.api.request_fullscreen() {
            Ok(()) => {
                self.requested.store(true, Ordering::SeqCst);
                true
            }
            Err(e) => {
                debug!("[PROCTOR] fullscreen request refused: {}", e);
                false
            }
        }
    }

    pub fn disable(&self) -> bool {
        self.requested.store(false, Ordering::SeqCst);
        if !self.api.is_fullscreen() {
            return false;
        }
        match self.api.exit_fullscreen() {
            Ok(()) => true,
            Err(e) => {
                debug!("[PROCTOR] fullscreen exit failed: {}", e);
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.api.is_fullscreen()
    }

    /// Exit if we asked for fullscreen or the host reports it. Used by cleanup.
    pub fn exit_if_active(&self) {
        if self.requested.load(Ordering::SeqCst) || self.api.is_fullscreen() {
            self.disable();
        }
    }
}
