//! Violation vocabulary: kinds, the fixed severity table, and the event shape
//! handed to the sink. `ViolationEvent` is the whole coupling surface towards
//! the policy side, so it stays plain serde data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Kind of integrity violation.
///
/// Serialized as its snake_case wire name. Names outside the known set are kept
/// verbatim in `Other` and classified with the fallback severity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViolationKind {
    TabSwitch,
    WindowFocusLost,
    RightClickAttempt,
    ProhibitedShortcut,
    CopyAttempt,
    PasteAttempt,
    DevtoolsOpened,
    NoFaceDetected,
    CameraInitFailed,
    Other(String),
}

impl ViolationKind {
    /// Every kind with a dedicated severity entry.
    pub const KNOWN: [ViolationKind; 9] = [
        ViolationKind::TabSwitch,
        ViolationKind::WindowFocusLost,
        ViolationKind::RightClickAttempt,
        ViolationKind::ProhibitedShortcut,
        ViolationKind::CopyAttempt,
        ViolationKind::PasteAttempt,
        ViolationKind::DevtoolsOpened,
        ViolationKind::NoFaceDetected,
        ViolationKind::CameraInitFailed,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ViolationKind::TabSwitch => "tab_switch",
            ViolationKind::WindowFocusLost => "window_focus_lost",
            ViolationKind::RightClickAttempt => "right_click_attempt",
            ViolationKind::ProhibitedShortcut => "prohibited_shortcut",
            ViolationKind::CopyAttempt => "copy_attempt",
            ViolationKind::PasteAttempt => "paste_attempt",
            ViolationKind::DevtoolsOpened => "devtools_opened",
            ViolationKind::NoFaceDetected => "no_face_detected",
            ViolationKind::CameraInitFailed => "camera_init_failed",
            ViolationKind::Other(name) => name,
        }
    }

    /// Severity from the fixed table.
    pub fn severity(&self) -> Severity {
        severity_for(self.as_str())
    }
}

impl From<&str> for ViolationKind {
    fn from(name: &str) -> Self {
        ViolationKind::KNOWN
            .iter()
            .find(|k| k.as_str() == name)
            .cloned()
            .unwrap_or_else(|| ViolationKind::Other(name.to_string()))
    }
}

impl From<String> for ViolationKind {
    fn from(name: String) -> Self {
        ViolationKind::from(name.as_str())
    }
}

impl From<ViolationKind> for String {
    fn from(kind: ViolationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four-level ranking consumed by the policy side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used when violations are counted by severity.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Severity assigned to kinds missing from [`SEVERITY_TABLE`].
pub const FALLBACK_SEVERITY: Severity = Severity::Medium;

/// The one severity table. Nothing else assigns severities.
pub const SEVERITY_TABLE: [(&str, Severity); 9] = [
    ("tab_switch", Severity::High),
    ("window_focus_lost", Severity::Medium),
    ("right_click_attempt", Severity::Low),
    ("prohibited_shortcut", Severity::Medium),
    ("copy_attempt", Severity::High),
    ("paste_attempt", Severity::High),
    ("devtools_opened", Severity::Critical),
    ("no_face_detected", Severity::High),
    ("camera_init_failed", Severity::Critical),
];

/// Resolve a kind name through [`SEVERITY_TABLE`].
pub fn severity_for(kind: &str) -> Severity {
    SEVERITY_TABLE
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, severity)| *severity)
        .unwrap_or(FALLBACK_SEVERITY)
}

/// Attributes captured alongside a violation. Opaque to the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationMetadata {
    pub user_agent: String,
    pub url: String,
    /// Unix epoch milliseconds at record time.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Detector-specific attributes (counters, key combos, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A classified violation, as appended to the log and delivered to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "severityLevel")]
    pub severity: Severity,
    pub metadata: ViolationMetadata,
}

impl ViolationEvent {
    /// Only the classifier builds events; severity always comes from the table.
    pub(crate) fn classified(
        kind: ViolationKind,
        description: String,
        timestamp: DateTime<Utc>,
        metadata: ViolationMetadata,
    ) -> Self {
        let severity = kind.severity();
        Self {
            kind,
            description,
            timestamp,
            severity,
            metadata,
        }
    }
}
