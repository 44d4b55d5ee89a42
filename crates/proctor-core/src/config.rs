//! Proctoring configuration.
//!
//! Two layers: `ProctoringSettings` is the per-exam settings block owned by the
//! surrounding exam flow (read at `start()`, never persisted here), and
//! `ProctorConfig` holds the runtime tunables of the monitor itself (poll
//! cadences, dev-tools threshold, capture resolution).

use crate::error::{ProctorError, ProctorResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

fn default_true() -> bool {
    true
}

fn default_tab_switch_limit() -> u32 {
    3
}

fn default_warnings_before_termination() -> u32 {
    3
}

fn default_screenshot_interval() -> u64 {
    300
}

/// Exam proctoring settings, as stored on the test definition.
///
/// Wire names are camelCase so the exam's settings JSON deserializes as-is.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | PROCTOR_ENABLED | true | Master switch for the monitor. |
/// | PROCTOR_STRICT_MODE | false | Policy: every violation counts toward termination. |
/// | PROCTOR_ENABLE_CAMERA | true | Request camera at start. |
/// | PROCTOR_ENABLE_MICROPHONE | true | Request microphone at start (bundled with camera). |
/// | PROCTOR_TAB_SWITCH_LIMIT | 3 | Policy: tab switches tolerated before termination. |
/// | PROCTOR_ENABLE_FACE_DETECTION | true | Run the 2s face-presence check. |
/// | PROCTOR_ENABLE_SCREENSHOT_CAPTURE | true | Periodic still capture. |
/// | PROCTOR_SCREENSHOT_INTERVAL | 300 | Seconds between periodic stills. |
/// | PROCTOR_AUTO_TERMINATE | false | Policy: terminate instead of warn once limits are hit. |
/// | PROCTOR_WARNINGS_BEFORE_TERMINATION | 3 | Policy: warnings issued before termination. |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProctoringSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default = "default_true")]
    pub enable_camera: bool,
    #[serde(default = "default_true")]
    pub enable_microphone: bool,
    #[serde(default)]
    pub enable_screen_share: bool,
    #[serde(default = "default_tab_switch_limit")]
    pub tab_switch_limit: u32,
    #[serde(default)]
    pub allow_tab_switch: bool,
    #[serde(default = "default_true")]
    pub enable_face_detection: bool,
    #[serde(default = "default_true")]
    pub enable_audio_detection: bool,
    #[serde(default = "default_true")]
    pub enable_screenshot_capture: bool,
    /// Seconds between periodic screenshots.
    #[serde(default = "default_screenshot_interval")]
    pub screenshot_interval: u64,
    #[serde(default)]
    pub auto_terminate_on_violation: bool,
    #[serde(default = "default_warnings_before_termination")]
    pub warnings_before_termination: u32,
}

impl Default for ProctoringSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_mode: false,
            enable_camera: true,
            enable_microphone: true,
            enable_screen_share: false,
            tab_switch_limit: default_tab_switch_limit(),
            allow_tab_switch: false,
            enable_face_detection: true,
            enable_audio_detection: true,
            enable_screenshot_capture: true,
            screenshot_interval: default_screenshot_interval(),
            auto_terminate_on_violation: false,
            warnings_before_termination: default_warnings_before_termination(),
        }
    }
}

impl ProctoringSettings {
    /// Load settings from environment. Unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_bool("PROCTOR_ENABLED", defaults.enabled),
            strict_mode: env_bool("PROCTOR_STRICT_MODE", defaults.strict_mode),
            enable_camera: env_bool("PROCTOR_ENABLE_CAMERA", defaults.enable_camera),
            enable_microphone: env_bool("PROCTOR_ENABLE_MICROPHONE", defaults.enable_microphone),
            enable_screen_share: env_bool("PROCTOR_ENABLE_SCREEN_SHARE", defaults.enable_screen_share),
            tab_switch_limit: env_u32("PROCTOR_TAB_SWITCH_LIMIT", defaults.tab_switch_limit),
            allow_tab_switch: env_bool("PROCTOR_ALLOW_TAB_SWITCH", defaults.allow_tab_switch),
            enable_face_detection: env_bool(
                "PROCTOR_ENABLE_FACE_DETECTION",
                defaults.enable_face_detection,
            ),
            enable_audio_detection: env_bool(
                "PROCTOR_ENABLE_AUDIO_DETECTION",
                defaults.enable_audio_detection,
            ),
            enable_screenshot_capture: env_bool(
                "PROCTOR_ENABLE_SCREENSHOT_CAPTURE",
                defaults.enable_screenshot_capture,
            ),
            screenshot_interval: env_u64("PROCTOR_SCREENSHOT_INTERVAL", defaults.screenshot_interval),
            auto_terminate_on_violation: env_bool(
                "PROCTOR_AUTO_TERMINATE",
                defaults.auto_terminate_on_violation,
            ),
            warnings_before_termination: env_u32(
                "PROCTOR_WARNINGS_BEFORE_TERMINATION",
                defaults.warnings_before_termination,
            ),
        }
    }

    /// Camera and microphone are acquired as one bundle; either flag requests both.
    pub fn wants_media(&self) -> bool {
        self.enabled && (self.enable_camera || self.enable_microphone)
    }

    /// Screenshot cadence. Never shorter than one second.
    pub fn screenshot_period(&self) -> Duration {
        Duration::from_secs(self.screenshot_interval.max(1))
    }
}

fn default_devtools_poll_ms() -> u64 {
    1_000
}

fn default_face_check_ms() -> u64 {
    2_000
}

fn default_devtools_threshold_px() -> u32 {
    160
}

fn default_capture_width() -> u32 {
    640
}

fn default_capture_height() -> u32 {
    480
}

/// Largest accepted capture edge in pixels.
pub const MAX_CAPTURE_DIMENSION: u32 = 4096;

fn default_jpeg_quality() -> f32 {
    0.8
}

/// Runtime tunables of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctorConfig {
    /// Dev-tools heuristic poll cadence in milliseconds.
    #[serde(default = "default_devtools_poll_ms")]
    pub devtools_poll_ms: u64,
    /// Face-presence check cadence in milliseconds.
    #[serde(default = "default_face_check_ms")]
    pub face_check_ms: u64,
    /// Outer-minus-inner window size (px) above which dev-tools count as open.
    #[serde(default = "default_devtools_threshold_px")]
    pub devtools_threshold_px: u32,
    /// Requested camera frame width in pixels (1 to [`MAX_CAPTURE_DIMENSION`]).
    #[serde(default = "default_capture_width")]
    pub capture_width: u32,
    /// Requested camera frame height in pixels (1 to [`MAX_CAPTURE_DIMENSION`]).
    #[serde(default = "default_capture_height")]
    pub capture_height: u32,
    /// Encoder quality hint passed to the host (0.0-1.0).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            devtools_poll_ms: default_devtools_poll_ms(),
            face_check_ms: default_face_check_ms(),
            devtools_threshold_px: default_devtools_threshold_px(),
            capture_width: default_capture_width(),
            capture_height: default_capture_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl ProctorConfig {
    pub fn devtools_poll_interval(&self) -> Duration {
        Duration::from_millis(self.devtools_poll_ms.max(1))
    }

    pub fn face_check_interval(&self) -> Duration {
        Duration::from_millis(self.face_check_ms.max(1))
    }

    /// Reject values the capture path cannot use.
    pub fn validate(&self) -> ProctorResult<()> {
        let edges = 1..=MAX_CAPTURE_DIMENSION;
        if !edges.contains(&self.capture_width) || !edges.contains(&self.capture_height) {
            return Err(ProctorError::Config(format!(
                "capture size must be within 1-{} per edge, got {}x{}",
                MAX_CAPTURE_DIMENSION, self.capture_width, self.capture_height
            )));
        }
        if !(0.0..=1.0).contains(&self.jpeg_quality) {
            return Err(ProctorError::Config(format!(
                "jpeg_quality must be within 0.0-1.0, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// On-disk layout: `[settings]` (camelCase keys) and `[runtime]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProctorFileConfig {
    #[serde(default)]
    pub settings: ProctoringSettings,
    #[serde(default)]
    pub runtime: ProctorConfig,
}

impl ProctorFileConfig {
    /// Load from a TOML file. A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> ProctorResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: ProctorFileConfig = toml::from_str(&content)?;
        config.runtime.validate()?;
        Ok(config)
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            if v.is_empty() {
                default
            } else {
                v.eq_ignore_ascii_case("true") || v == "1"
            }
        }
        Err(_) => default,
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_settings_defaults_match_exam_defaults() {
        let s = ProctoringSettings::default();
        assert_eq!(s.tab_switch_limit, 3);
        assert_eq!(s.warnings_before_termination, 3);
        assert_eq!(s.screenshot_interval, 300);
        assert!(!s.auto_terminate_on_violation);
        assert!(s.wants_media());
    }

    #[test]
    fn test_settings_deserialize_from_exam_json() {
        let json = r#"{
            "enabled": true,
            "strictMode": true,
            "enableCamera": false,
            "enableMicrophone": false,
            "tabSwitchLimit": 5,
            "autoTerminateOnViolation": true,
            "warningsBeforeTermination": 2
        }"#;
        let s: ProctoringSettings = serde_json::from_str(json).unwrap();
        assert!(s.strict_mode);
        assert_eq!(s.tab_switch_limit, 5);
        assert_eq!(s.warnings_before_termination, 2);
        assert!(!s.wants_media());
        // missing keys fall back
        assert!(s.enable_face_detection);
        assert_eq!(s.screenshot_interval, 300);
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let s = ProctoringSettings {
            screenshot_interval: 0,
            ..Default::default()
        };
        assert_eq!(s.screenshot_period(), Duration::from_secs(1));

        let c = ProctorConfig {
            face_check_ms: 0,
            ..Default::default()
        };
        assert_eq!(c.face_check_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_runtime_defaults() {
        let c = ProctorConfig::default();
        assert_eq!(c.devtools_poll_interval(), Duration::from_secs(1));
        assert_eq!(c.face_check_interval(), Duration::from_secs(2));
        assert_eq!(c.devtools_threshold_px, 160);
        assert_eq!((c.capture_width, c.capture_height), (640, 480));
    }

    #[test]
    fn test_file_config_loads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[settings]\ntabSwitchLimit = 1\nstrictMode = true\n\n[runtime]\nface_check_ms = 500\n"
        )
        .unwrap();

        let cfg = ProctorFileConfig::load_from_path(file.path()).unwrap();
        assert_eq!(cfg.settings.tab_switch_limit, 1);
        assert!(cfg.settings.strict_mode);
        assert_eq!(cfg.runtime.face_check_ms, 500);
        assert_eq!(cfg.runtime.devtools_poll_ms, 1_000);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProctorFileConfig::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, ProctorFileConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[settings\nbroken").unwrap();
        let err = ProctorFileConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::ProctorError::Toml(_)));
    }

    #[test]
    fn test_out_of_range_quality_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\njpeg_quality = 1.5\n").unwrap();
        let err = ProctorFileConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::ProctorError::Config(_)));
        assert!(ProctorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_oversized_capture_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\ncapture_width = 70000\ncapture_height = 70000\n").unwrap();
        let err = ProctorFileConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::ProctorError::Config(_)));

        let edge = ProctorConfig {
            capture_width: MAX_CAPTURE_DIMENSION,
            capture_height: MAX_CAPTURE_DIMENSION,
            ..ProctorConfig::default()
        };
        assert!(edge.validate().is_ok());
        let zero = ProctorConfig {
            capture_height: 0,
            ..ProctorConfig::default()
        };
        assert!(zero.validate().is_err());
    }
}
