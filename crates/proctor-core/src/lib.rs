//! # Proctor Core - Exam Integrity Monitor
//!
//! Supervises an active test-taking session: independent signal detectors
//! report integrity violations through one classifier, which stamps severity
//! and page metadata, appends to the session log and hands each event to the
//! exam flow's sink. Escalation (warn, flag, terminate) happens on the other
//! side of that sink, in [`policy`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Proctoring Controller                       │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//! │  │ Page events  │  │ Poll timers  │  │  Capability  │        │
//! │  │ (event bus)  │  │ devtools/face│  │ probe (cam)  │        │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘        │
//! │         └─────────────────┼─────────────────┘                │
//! │                           ↓                                  │
//! │                 ┌──────────────────┐                         │
//! │                 │ Violation record │→ session log            │
//! │                 └────────┬─────────┘                         │
//! └──────────────────────────┼───────────────────────────────────┘
//!                            ↓ sink
//!                    Policy evaluator / exam UI
//! ```

pub mod capability;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod detectors;
pub mod error;
pub mod fullscreen;
pub mod host;
pub mod policy;
pub mod session;
pub mod violation;

pub use capability::{CapabilityProbe, FrameData, MediaConstraints, MediaDevices, MediaStream, TrackKind};
pub use classifier::{ChannelSink, NullSink, ViolationRecorder, ViolationSink};
pub use config::{ProctorConfig, ProctorFileConfig, ProctoringSettings};
pub use controller::{HostBindings, ProctoringController};
pub use detectors::{
    AlwaysPresentOracle, DetectorContext, DetectorHandle, FacePresenceOracle, ScreenshotSink, SignalDetector,
};
pub use error::{ProctorError, ProctorResult};
pub use fullscreen::FullscreenControl;
pub use host::{
    DefaultAction, EventTopic, FullscreenApi, HostEvent, HostEventBus, HostSignal, KeyStroke, ListenerHandle,
    NoFullscreen, PageContext, StaticPageContext, ViewportProbe, WindowDimensions,
};
pub use policy::{AutoAction, PolicyDecision, PolicyEvaluator};
pub use session::{ProctoringSessionState, SessionSnapshot, ViolationSummary};
pub use violation::{Severity, ViolationEvent, ViolationKind, ViolationMetadata};
