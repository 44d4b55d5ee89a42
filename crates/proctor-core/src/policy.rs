//! Policy evaluator: turns the violation stream into warn / flag / terminate.
//!
//! This sits on the exam-flow side of the sink boundary. The controller never
//! consults it; the owner feeds each delivered [`ViolationEvent`] in and acts
//! on the returned [`PolicyDecision`].

use crate::config::ProctoringSettings;
use crate::violation::{Severity, ViolationEvent, ViolationKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Automatic follow-up for a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoAction {
    Warning,
    Flag,
    Terminate,
}

/// Outcome of evaluating one violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PolicyDecision {
    /// Show the candidate a warning and carry on.
    Warning { message: String },
    /// Mark the attempt as suspicious for later review.
    Flag { reason: String },
    /// End the exam attempt.
    Terminate { reason: String },
}

impl PolicyDecision {
    pub fn action(&self) -> AutoAction {
        match self {
            Self::Warning { .. } => AutoAction::Warning,
            Self::Flag { .. } => AutoAction::Flag,
            Self::Terminate { .. } => AutoAction::Terminate,
        }
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate { .. })
    }
}

/// Threshold policy over one session's violations.
///
/// Each violation adds one point, or its severity weight (1-4) in strict mode.
/// Reaching `warnings_before_termination` points, or `tab_switch_limit` tab
/// switches when tab switching is not allowed, escalates: terminate when
/// auto-termination is on, flag otherwise. Terminate latches.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    settings: ProctoringSettings,
    score: u32,
    tab_switches: u32,
    terminated: bool,
}

impl PolicyEvaluator {
    pub fn new(settings: &ProctoringSettings) -> Self {
        Self {
            settings: settings.clone(),
            score: 0,
            tab_switches: 0,
            terminated: false,
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn tab_switches(&self) -> u32 {
        self.tab_switches
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Start over for a new attempt.
    pub fn reset(&mut self) {
        self.score = 0;
        self.tab_switches = 0;
        self.terminated = false;
    }

    pub fn evaluate(&mut self, violation: &ViolationEvent) -> PolicyDecision {
        if self.terminated {
            return PolicyDecision::Terminate {
                reason: "exam already terminated".to_string(),
            };
        }

        let is_tab_switch = violation.kind == ViolationKind::TabSwitch;
        if is_tab_switch {
            self.tab_switches = self.tab_switches.saturating_add(1);
        }
        // Tolerated tab switches are surfaced but never scored.
        if !(is_tab_switch && self.settings.allow_tab_switch) {
            let points = if self.settings.strict_mode {
                violation.severity.weight()
            } else {
                1
            };
            self.score = self.score.saturating_add(points);
        }

        let reason = if is_tab_switch
            && !self.settings.allow_tab_switch
            && self.tab_switches >= self.settings.tab_switch_limit.max(1)
        {
            Some(format!(
                "tab switch limit reached ({}/{})",
                self.tab_switches, self.settings.tab_switch_limit
            ))
        } else if self.score >= self.settings.warnings_before_termination.max(1) {
            Some(format!(
                "violation threshold reached ({}/{})",
                self.score, self.settings.warnings_before_termination
            ))
        } else if self.settings.strict_mode && violation.severity == Severity::Critical {
            Some(format!("critical violation in strict mode: {}", violation.kind))
        } else {
            None
        };

        match reason {
            Some(reason) if self.settings.auto_terminate_on_violation => {
                warn!("[PROCTOR] policy: terminate ({})", reason);
                self.terminated = true;
                PolicyDecision::Terminate { reason }
            }
            Some(reason) => {
                info!("[PROCTOR] policy: flag ({})", reason);
                PolicyDecision::Flag { reason }
            }
            None => PolicyDecision::Warning {
                message: violation.description.clone(),
            },
        }
    }
}
