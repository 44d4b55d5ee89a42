//! Violation classifier and log.
//!
//! [`ViolationRecorder::record`] is the single entry point through which every
//! detector reports. It resolves severity from the fixed table, captures page
//! metadata, appends to the session log and hands the event to the sink.
//!
//! Records are serialized through a gate: the append and the sink delivery of
//! one event complete before the next record starts, so sink order equals log
//! order. The sink runs outside the state lock and may read controller state,
//! but must not record from inside its callback.

use crate::host::PageContext;
use crate::session::ProctoringSessionState;
use crate::violation::{Severity, ViolationEvent, ViolationKind, ViolationMetadata};
use chrono::Utc;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Receiver of classified violations, supplied by the exam flow.
///
/// Delivery is synchronous from inside detector callbacks; return quickly.
/// Calling back into `stop`/`cleanup` or recording from inside the callback
/// deadlocks on the record gate. Hand off to a channel ([`ChannelSink`]) when
/// the consumer needs to act on the controller.
pub trait ViolationSink: Send + Sync {
    fn on_violation(&self, violation: ViolationEvent);
}

impl<F> ViolationSink for F
where
    F: Fn(ViolationEvent) + Send + Sync,
{
    fn on_violation(&self, violation: ViolationEvent) {
        self(violation)
    }
}

/// Sink that forwards into a tokio channel, for consumers running their own task.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub mpsc::UnboundedSender<ViolationEvent>);

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViolationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl ViolationSink for ChannelSink {
    fn on_violation(&self, violation: ViolationEvent) {
        if let Err(e) = self.0.send(violation) {
            debug!("[PROCTOR] violation channel closed, dropping {}", e.0.kind);
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ViolationSink for NullSink {
    fn on_violation(&self, _violation: ViolationEvent) {}
}

/// Description plus detector-specific metadata for one record.
#[derive(Debug, Clone, Default)]
pub(crate) struct Detail {
    pub description: String,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Detail {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

pub(crate) fn lock_state(
    state: &Mutex<ProctoringSessionState>,
) -> MutexGuard<'_, ProctoringSessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Classifies raw signals into [`ViolationEvent`]s and appends them to the log.
pub struct ViolationRecorder {
    state: Arc<Mutex<ProctoringSessionState>>,
    sink: Arc<dyn ViolationSink>,
    page: Arc<dyn PageContext>,
    gate: Mutex<()>,
}

impl ViolationRecorder {
    pub fn new(
        state: Arc<Mutex<ProctoringSessionState>>,
        sink: Arc<dyn ViolationSink>,
        page: Arc<dyn PageContext>,
    ) -> Self {
        Self {
            state,
            sink,
            page,
            gate: Mutex::new(()),
        }
    }

    /// Classify, append and deliver one violation.
    pub fn record(&self, kind: impl Into<ViolationKind>, description: impl Into<String>) -> ViolationEvent {
        let detail = Detail::new(description);
        let _gate = self.enter_gate();
        self.commit_locked(kind.into(), move |_| detail)
    }

    /// Record with a state mutation folded into the same critical section.
    /// The closure returns the description, so it may embed updated counters.
    pub(crate) fn record_with<F>(&self, kind: ViolationKind, mutate: F) -> ViolationEvent
    where
        F: FnOnce(&mut ProctoringSessionState) -> Detail,
    {
        let _gate = self.enter_gate();
        self.commit_locked(kind, mutate)
    }

    /// Record only while `live` is still set. Used by poll timers, whose
    /// cancellation clears `live` under the same gate.
    pub(crate) fn record_if_live<F>(
        &self,
        live: &AtomicBool,
        kind: ViolationKind,
        mutate: F,
    ) -> Option<ViolationEvent>
    where
        F: FnOnce(&mut ProctoringSessionState) -> Detail,
    {
        let _gate = self.enter_gate();
        if !live.load(Ordering::SeqCst) {
            debug!("[PROCTOR] dropping {} from a cancelled timer", kind);
            return None;
        }
        Some(self.commit_locked(kind, mutate))
    }

    /// Mutate state without recording, under the gate.
    pub(crate) fn update_if_live<R>(
        &self,
        live: &AtomicBool,
        f: impl FnOnce(&mut ProctoringSessionState) -> R,
    ) -> Option<R> {
        let _gate = self.enter_gate();
        if !live.load(Ordering::SeqCst) {
            return None;
        }
        let mut state = lock_state(&self.state);
        Some(f(&mut state))
    }

    /// Run `f` while no record is in progress.
    pub(crate) fn quiesce<R>(&self, f: impl FnOnce() -> R) -> R {
        let _gate = self.enter_gate();
        f()
    }

    pub fn state(&self) -> &Arc<Mutex<ProctoringSessionState>> {
        &self.state
    }

    fn enter_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Caller holds the gate.
    fn commit_locked<F>(&self, kind: ViolationKind, mutate: F) -> ViolationEvent
    where
        F: FnOnce(&mut ProctoringSessionState) -> Detail,
    {
        // Fresh on every call: the page may have navigated since the last record.
        let user_agent = self.page.user_agent();
        let url = self.page.current_url();
        let now = Utc::now();

        let event = {
            let mut state = lock_state(&self.state);
            let detail = mutate(&mut state);
            let metadata = ViolationMetadata {
                user_agent,
                url,
                timestamp_ms: now.timestamp_millis(),
                session_id: state.session_id,
                extra: detail.extra,
            };
            let event = ViolationEvent::classified(kind, detail.description, now, metadata);
            state.append(event.clone());
            event
        };

        match event.severity {
            Severity::High | Severity::Critical => warn!(
                kind = %event.kind,
                severity = %event.severity,
                "[PROCTOR] violation: {}",
                event.description
            ),
            Severity::Low | Severity::Medium => info!(
                kind = %event.kind,
                severity = %event.severity,
                "[PROCTOR] violation: {}",
                event.description
            ),
        }

        let delivered = event.clone();
        if panic::catch_unwind(AssertUnwindSafe(|| self.sink.on_violation(delivered))).is_err() {
            error!("[PROCTOR] violation sink panicked on {}", event.kind);
        }
        event
    }
}
