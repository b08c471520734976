//! Lifecycle phase identity and run-summary bookkeeping.
//!
//! [`container_lifecycle`](crate::container_lifecycle) executes the actual
//! commands; this module defines the phase taxonomy it executes against and
//! the [`RunSummary`] accumulated while it runs, consumed by the CLI to
//! render the per-phase report described in the external interface contract.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One stage of the devcontainer lifecycle, in the order a container passes
/// through them.
///
/// `Initialize` runs on the host before the container exists and is not part
/// of [`spec_order`](LifecyclePhase::spec_order), which only covers the
/// phases reported in a run summary. `Dotfiles` is not a devcontainer.json
/// hook but crib's own post-creation step, and is reported alongside the
/// others so users can see whether it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Initialize,
    OnCreate,
    UpdateContent,
    PostCreate,
    Dotfiles,
    PostStart,
    PostAttach,
}

impl LifecyclePhase {
    /// Stable lowerCamelCase name, matching devcontainer.json hook names
    /// (`dotfiles` has no devcontainer.json equivalent).
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Initialize => "initialize",
            LifecyclePhase::OnCreate => "onCreate",
            LifecyclePhase::UpdateContent => "updateContent",
            LifecyclePhase::PostCreate => "postCreate",
            LifecyclePhase::Dotfiles => "dotfiles",
            LifecyclePhase::PostStart => "postStart",
            LifecyclePhase::PostAttach => "postAttach",
        }
    }

    /// Phases in the order reported to users, excluding `Initialize` (which
    /// runs on the host before a container exists and is not skip/resume
    /// tracked the same way).
    pub fn spec_order() -> &'static [LifecyclePhase] {
        &[
            LifecyclePhase::OnCreate,
            LifecyclePhase::UpdateContent,
            LifecyclePhase::PostCreate,
            LifecyclePhase::Dotfiles,
            LifecyclePhase::PostStart,
            LifecyclePhase::PostAttach,
        ]
    }

    /// Runtime hooks (`postStart`/`postAttach`) run on every `Up`, including
    /// resumed ones, rather than only once at creation time like the other
    /// phases.
    pub fn is_runtime_hook(&self) -> bool {
        matches!(self, LifecyclePhase::PostStart | LifecyclePhase::PostAttach)
    }
}

/// Outcome of one phase's execution, for reporting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseStatus {
    Executed,
    Skipped,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Executed => "executed",
            PhaseStatus::Skipped => "skipped",
            PhaseStatus::Failed => "failed",
        }
    }
}

/// Recorded outcome of one phase, with enough context to render a summary
/// line and to decide whether the phase counts as "resumed".
#[derive(Debug, Clone, PartialEq)]
pub struct LifecyclePhaseState {
    pub phase: LifecyclePhase,
    pub status: PhaseStatus,
    pub marker_path: PathBuf,
    pub reason: Option<String>,
}

impl LifecyclePhaseState {
    pub fn new_executed(phase: LifecyclePhase, marker_path: PathBuf) -> Self {
        Self {
            phase,
            status: PhaseStatus::Executed,
            marker_path,
            reason: None,
        }
    }

    pub fn new_skipped(
        phase: LifecyclePhase,
        marker_path: PathBuf,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            status: PhaseStatus::Skipped,
            marker_path,
            reason: Some(reason.into()),
        }
    }

    pub fn new_failed(
        phase: LifecyclePhase,
        marker_path: PathBuf,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            status: PhaseStatus::Failed,
            marker_path,
            reason: Some(reason.into()),
        }
    }
}

/// Whether the CLI should render results as JSON or as a human-readable report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Text,
}

/// Accumulates phase outcomes across one `Up` invocation.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_mode: OutputMode,
    pub phases: Vec<LifecyclePhaseState>,
    pub resume_required: bool,
}

impl RunSummary {
    pub fn new(output_mode: OutputMode) -> Self {
        Self {
            output_mode,
            phases: Vec::new(),
            resume_required: false,
        }
    }

    pub fn add_phase(&mut self, state: LifecyclePhaseState) {
        if state.status == PhaseStatus::Failed {
            self.resume_required = true;
        }
        self.phases.push(state);
    }
}
