//! Prohibited keyboard shortcuts.
//!
//! A stroke matches a combo when the key is equal and every modifier the combo
//! requires is held. Extra modifiers do not prevent a match, so Ctrl+Shift+C
//! still counts as a copy shortcut.

use super::{guarded_listener, suppress_and_record, DetectorContext, DetectorHandle, SignalDetector};
use crate::classifier::Detail;
use crate::error::ProctorResult;
use crate::host::{EventTopic, HostSignal, KeyStroke};
use crate::violation::ViolationKind;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProhibitedCombo {
    pub key: &'static str,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

const fn combo(key: &'static str, ctrl: bool, shift: bool, alt: bool) -> ProhibitedCombo {
    ProhibitedCombo { key, ctrl, shift, alt }
}

/// Dev-tools, reload, clipboard, select-all, save and window switching.
pub const PROHIBITED_COMBOS: [ProhibitedCombo; 19] = [
    combo("F12", false, false, false),
    combo("F5", false, false, false),
    combo("r", true, false, false),
    combo("R", true, false, false),
    combo("i", true, true, false),
    combo("I", true, true, false),
    combo("j", true, true, false),
    combo("J", true, true, false),
    combo("c", true, false, false),
    combo("C", true, false, false),
    combo("v", true, false, false),
    combo("V", true, false, false),
    combo("x", true, false, false),
    combo("X", true, false, false),
    combo("a", true, false, false),
    combo("A", true, false, false),
    combo("s", true, false, false),
    combo("S", true, false, false),
    combo("Tab", false, false, true),
];

impl ProhibitedCombo {
    pub fn matches(&self, stroke: &KeyStroke) -> bool {
        stroke.key == self.key
            && (!self.ctrl || stroke.ctrl)
            && (!self.shift || stroke.shift)
            && (!self.alt || stroke.alt)
    }
}

pub fn is_prohibited(stroke: &KeyStroke) -> bool {
    PROHIBITED_COMBOS.iter().any(|c| c.matches(stroke))
}

/// Human-readable combo: held modifiers in Ctrl, Alt, Shift order, then the key.
pub fn combo_string(stroke: &KeyStroke) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(4);
    if stroke.ctrl {
        parts.push("Ctrl");
    }
    if stroke.alt {
        parts.push("Alt");
    }
    if stroke.shift {
        parts.push("Shift");
    }
    parts.push(&stroke.key);
    parts.join("+")
}

pub struct KeyboardDetector;

impl SignalDetector for KeyboardDetector {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn arm(&self, ctx: &DetectorContext) -> ProctorResult<Option<DetectorHandle>> {
        let recorder = Arc::clone(&ctx.recorder);
        let listener = guarded_listener(self.name(), move |event| {
            let HostSignal::KeyDown(stroke) = &event.signal else {
                return;
            };
            if !is_prohibited(stroke) {
                return;
            }
            let combo = combo_string(stroke);
            suppress_and_record(
                event,
                &recorder,
                ViolationKind::ProhibitedShortcut,
                Detail::new(format!("Attempted prohibited shortcut: {}", combo)).with("combo", combo),
            );
        });
        let handle = ctx.bus.subscribe(EventTopic::KeyDown, listener)?;
        Ok(Some(DetectorHandle::Listener(handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::classifier::lock_state;

    #[test]
    fn test_table_matches_expected_strokes() {
        assert!(is_prohibited(&KeyStroke::plain("F12")));
        assert!(is_prohibited(&KeyStroke::plain("F5")));
        assert!(is_prohibited(&KeyStroke::ctrl("c")));
        assert!(is_prohibited(&KeyStroke::ctrl("V")));
        assert!(is_prohibited(&KeyStroke::ctrl_shift("I")));
        assert!(is_prohibited(&KeyStroke::alt("Tab")));
        // Extra modifiers still match.
        assert!(is_prohibited(&KeyStroke::ctrl_shift("c")));

        assert!(!is_prohibited(&KeyStroke::plain("c")));
        assert!(!is_prohibited(&KeyStroke::ctrl("i")));
        assert!(!is_prohibited(&KeyStroke::plain("Tab")));
        assert!(!is_prohibited(&KeyStroke::ctrl("z")));
    }

    #[test]
    fn test_combo_string_orders_modifiers() {
        assert_eq!(combo_string(&KeyStroke::ctrl_shift("I")), "Ctrl+Shift+I");
        assert_eq!(combo_string(&KeyStroke::alt("Tab")), "Alt+Tab");
        assert_eq!(combo_string(&KeyStroke::plain("F12")), "F12");
        let all = KeyStroke {
            alt: true,
            ..KeyStroke::ctrl_shift("x")
        };
        assert_eq!(combo_string(&all), "Ctrl+Alt+Shift+x");
    }

    #[test]
    fn test_prohibited_key_is_suppressed_and_recorded() {
        let (ctx, state) = testing::context();
        let _h = KeyboardDetector.arm(&ctx).unwrap();

        let event = ctx.bus.emit(HostSignal::KeyDown(KeyStroke::ctrl("c")));
        assert!(event.default_action.is_prevented());
        let allowed = ctx.bus.emit(HostSignal::KeyDown(KeyStroke::plain("a")));
        assert!(!allowed.default_action.is_prevented());

        let s = lock_state(&state);
        assert_eq!(s.violation_count(), 1);
        assert_eq!(s.violations()[0].description, "Attempted prohibited shortcut: Ctrl+c");
        assert_eq!(s.violations()[0].metadata.extra["combo"], "Ctrl+c");
    }
}
