//! Per-session proctoring state owned by the controller.

use crate::violation::{ViolationEvent, ViolationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Mutable state of one proctored exam attempt.
///
/// Only the controller (through the recorder) mutates this. Every mutation is a
/// single lock scope, so a counter bump and its log append are never split.
#[derive(Debug, Clone, Default)]
pub struct ProctoringSessionState {
    /// Set by `start`, cleared by `cleanup`.
    pub session_id: Option<Uuid>,
    /// A camera track is held.
    pub camera_active: bool,
    /// A microphone track is held.
    pub microphone_active: bool,
    tab_switch_count: u32,
    violations: Vec<ViolationEvent>,
    /// Raised by the exam flow when policy flags the attempt.
    pub suspicious_activity: bool,
    /// Result of the latest face-presence check.
    pub face_detected: bool,
    /// Last value reported through `update_audio_detection`.
    pub audio_detected: bool,
}

impl ProctoringSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter and clear the log. Handles are not touched here.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.tab_switch_count
    }

    /// Bump the tab-switch counter and return the new value.
    pub(crate) fn increment_tab_switches(&mut self) -> u32 {
        self.tab_switch_count = self.tab_switch_count.saturating_add(1);
        self.tab_switch_count
    }

    pub(crate) fn append(&mut self, event: ViolationEvent) {
        self.violations.push(event);
    }

    /// Violations in record order.
    pub fn violations(&self) -> &[ViolationEvent] {
        &self.violations
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn latest(&self) -> Option<&ViolationEvent> {
        self.violations.last()
    }

    /// Per-kind counts with their share of the total, ordered by kind name.
    pub fn summary(&self) -> Vec<ViolationSummary> {
        let mut counts: BTreeMap<String, (ViolationKind, usize)> = BTreeMap::new();
        for v in &self.violations {
            counts
                .entry(v.kind.as_str().to_string())
                .or_insert_with(|| (v.kind.clone(), 0))
                .1 += 1;
        }
        let total = self.violations.len();
        counts
            .into_values()
            .map(|(kind, count)| ViolationSummary {
                kind,
                count,
                percentage: if total == 0 {
                    0.0
                } else {
                    count as f64 * 100.0 / total as f64
                },
            })
            .collect()
    }

    pub fn snapshot(&self, active: bool) -> SessionSnapshot {
        SessionSnapshot {
            active,
            camera_active: self.camera_active,
            microphone_active: self.microphone_active,
            face_detected: self.face_detected,
            tab_switch_count: self.tab_switch_count,
            violation_count: self.violations.len(),
            latest_warning: self.latest().map(|v| v.description.clone()),
            suspicious_activity: self.suspicious_activity,
        }
    }
}

/// Aggregate view for the exam UI. Raw errors never reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub active: bool,
    pub camera_active: bool,
    pub microphone_active: bool,
    pub face_detected: bool,
    pub tab_switch_count: u32,
    pub violation_count: usize,
    pub latest_warning: Option<String>,
    pub suspicious_activity: bool,
}

/// Count of one violation kind within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationSummary {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub count: usize,
    pub percentage: f64,
}
