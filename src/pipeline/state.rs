// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Orchestrator states

use serde::Serialize;

/// State of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Resetting,
    RunningStage { index: usize, name: String },
    Decomposing { index: usize, name: String },
    RunningParallelStage { index: usize, name: String },
    Reconstructing { index: usize, name: String },
    Checking { index: usize, name: String },
    Done,
    Failed { stage: Option<String> },
}

impl PipelineState {
    /// `Done` and `Failed` admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    /// Stage the state refers to, if any
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::RunningStage { name, .. }
            | Self::Decomposing { name, .. }
            | Self::RunningParallelStage { name, .. }
            | Self::Reconstructing { name, .. }
            | Self::Checking { name, .. } => Some(name),
            Self::Failed { stage } => stage.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Resetting => write!(f, "resetting"),
            Self::RunningStage { index, name } => write!(f, "running stage {} ({})", index, name),
            Self::Decomposing { name, .. } => write!(f, "decomposing for {}", name),
            Self::RunningParallelStage { name, .. } => write!(f, "running {} in parallel", name),
            Self::Reconstructing { name, .. } => write!(f, "reconstructing after {}", name),
            Self::Checking { name, .. } => write!(f, "checking ({})", name),
            Self::Done => write!(f, "done"),
            Self::Failed { stage: Some(stage) } => write!(f, "failed at {}", stage),
            Self::Failed { stage: None } => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed { stage: None }.is_terminal());
        assert!(!PipelineState::Checking {
            index: 4,
            name: "check".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_stage_name() {
        let state = PipelineState::Decomposing {
            index: 1,
            name: "castellate".into(),
        };
        assert_eq!(state.stage_name(), Some("castellate"));
        assert_eq!(state.to_string(), "decomposing for castellate");
        assert_eq!(PipelineState::Idle.stage_name(), None);
    }
}
