//! Page-event detectors: visibility, focus, context menu and clipboard.

use super::{guarded_listener, suppress_and_record, DetectorContext, DetectorHandle, SignalDetector};
use crate::classifier::Detail;
use crate::error::ProctorResult;
use crate::host::{EventTopic, HostEvent, HostSignal};
use crate::violation::ViolationKind;
use std::sync::Arc;

fn listen<F>(ctx: &DetectorContext, name: &'static str, topic: EventTopic, body: F) -> ProctorResult<Option<DetectorHandle>>
where
    F: Fn(&HostEvent) + Send + Sync + 'static,
{
    let handle = ctx.bus.subscribe(topic, guarded_listener(name, body))?;
    Ok(Some(DetectorHandle::Listener(handle)))
}

/// Page hidden: count a tab switch. Becoming visible again is ignored.
pub struct VisibilityDetector;

impl SignalDetector for VisibilityDetector {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        let recorder = Arc::clone(&ctx.recorder);
        listen(ctx, self.name(), EventTopic::VisibilityChange, move |event| {
            if let HostSignal::VisibilityChange { hidden: true } = event.signal {
                recorder.record_with(ViolationKind::TabSwitch, |state| {
                    let count = state.increment_tab_switches();
                    Detail::new(format!("Tab switched away from exam (Count: {})", count))
                        .with("tab_switch_count", count)
                });
            }
        })
    }
}

pub struct FocusDetector;

impl SignalDetector for FocusDetector {
    fn name(&self) -> &'static str {
        "focus"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        let recorder = Arc::clone(&ctx.recorder);
        listen(ctx, self.name(), EventTopic::Blur, move |_event| {
            recorder.record(ViolationKind::WindowFocusLost, "Window lost focus");
        })
    }
}

pub struct ContextMenuDetector;

impl SignalDetector for ContextMenuDetector {
    fn name(&self) -> &'static str {
        "context_menu"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        let recorder = Arc::clone(&ctx.recorder);
        listen(ctx, self.name(), EventTopic::ContextMenu, move |event| {
            suppress_and_record(
                event,
                &recorder,
                ViolationKind::RightClickAttempt,
                Detail::new("Attempted to open context menu"),
            );
        })
    }
}

pub struct CopyDetector;

impl SignalDetector for CopyDetector {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        let recorder = Arc::clone(&ctx.recorder);
        listen(ctx, self.name(), EventTopic::Copy, move |event| {
            suppress_and_record(
                event,
                &recorder,
                ViolationKind::CopyAttempt,
                Detail::new("Attempted to copy content"),
            );
        })
    }
}

pub struct PasteDetector;

impl SignalDetector for PasteDetector {
    fn name(&self) -> &'static str {
        "paste"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        let recorder = Arc::clone(&ctx.recorder);
        listen(ctx, self.name(), EventTopic::Paste, move |event| {
            suppress_and_record(
                event,
                &recorder,
                ViolationKind::PasteAttempt,
                Detail::new("Attempted to paste content"),
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::classifier::lock_state;
    use crate::violation::Severity;

    #[test]
    fn test_hidden_page_counts_tab_switches() {
        let (ctx, state) = testing::context();
        let _h = VisibilityDetector.arm(&ctx).unwrap().unwrap();

        ctx.bus.emit(HostSignal::VisibilityChange { hidden: true });
        ctx.bus.emit(HostSignal::VisibilityChange { hidden: false });
        ctx.bus.emit(HostSignal::VisibilityChange { hidden: true });

        let s = lock_state(&state);
        assert_eq!(s.tab_switch_count(), 2);
        assert_eq!(s.violation_count(), 2);
        assert_eq!(s.violations()[1].description, "Tab switched away from exam (Count: 2)");
        assert_eq!(s.violations()[1].metadata.extra["tab_switch_count"], 2);
        assert_eq!(s.violations()[1].severity, Severity::High);
    }

    #[test]
    fn test_blur_records_without_suppressing() {
        let (ctx, state) = testing::context();
        let _h = FocusDetector.arm(&ctx).unwrap();
        let event = ctx.bus.emit(HostSignal::Blur);
        assert!(!event.default_action.is_prevented());
        assert_eq!(lock_state(&state).violations()[0].kind, ViolationKind::WindowFocusLost);
    }

    #[test]
    fn test_suppressible_events_prevent_default() {
        let (ctx, state) = testing::context();
        let _a = ContextMenuDetector.arm(&ctx).unwrap();
        let _b = CopyDetector.arm(&ctx).unwrap();
        let _c = PasteDetector.arm(&ctx).unwrap();

        for signal in [HostSignal::ContextMenu, HostSignal::Copy, HostSignal::Paste] {
            assert!(ctx.bus.emit(signal).default_action.is_prevented());
        }
        let kinds: Vec<ViolationKind> = lock_state(&state).violations().iter().map(|v| v.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::RightClickAttempt,
                ViolationKind::CopyAttempt,
                ViolationKind::PasteAttempt
            ]
        );
    }

    #[test]
    fn test_released_listener_stops_recording() {
        let (ctx, state) = testing::context();
        let mut handle = CopyDetector.arm(&ctx).unwrap().unwrap();
        handle.release();
        let event = ctx.bus.emit(HostSignal::Copy);
        assert!(!event.default_action.is_prevented());
        assert_eq!(lock_state(&state).violation_count(), 0);
    }
}
