// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Error recovery suggestions
//!
//! Turns a failed run into concrete next steps for the operator.

use super::MeshflowError;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Pick a suggestion for an error, if one applies
    pub fn for_error(error: &MeshflowError) -> Option<Self> {
        match error {
            MeshflowError::StageFailure {
                stage, log_path, ..
            } => Some(Self::inspect_stage_log(stage, &log_path.display().to_string())),
            MeshflowError::PartitionFailure {
                stage,
                partitions,
                log_path,
                ..
            } => Some(Self::inspect_partitions(
                stage,
                partitions,
                &log_path.display().to_string(),
            )),
            MeshflowError::Reconstruction { log_path, .. } => {
                Some(Self::loosen_merge_tolerance(&log_path.display().to_string()))
            }
            MeshflowError::ToolNotFound { tool, .. } => Some(Self::install_tool(tool)),
            MeshflowError::PipelineNotFound { .. } => Some(Self::create_pipeline()),
            _ => None,
        }
    }

    /// Suggest reading the failed stage's log
    pub fn inspect_stage_log(stage: &str, log_path: &str) -> Self {
        Self {
            action: format!("Diagnose stage '{}'", stage),
            steps: vec![
                format!("The full output of '{}' was kept in {}", stage, log_path),
                "Logs of the stages before it are archived next to it".into(),
                "Re-running resets the mesh directory, so no partial output is reused".into(),
            ],
            commands: vec![format!("tail -n 50 {}", log_path), "meshflow run".into()],
        }
    }

    /// Suggest checking individual partitions after a distributed failure
    pub fn inspect_partitions(stage: &str, partitions: &[usize], log_path: &str) -> Self {
        let dirs: Vec<String> = partitions.iter().map(|p| format!("processor{}", p)).collect();

        let mut commands = vec![format!("tail -n 50 {}", log_path)];
        commands.extend(dirs.iter().map(|d| format!("ls -la {}", d)));

        Self {
            action: format!("Inspect failing partitions of '{}'", stage),
            steps: vec![
                format!("Partition(s) {} returned a nonzero exit code", dirs.join(", ")),
                format!(
                    "Output of every partition was merged into {}, one '==> processorN <==' section each",
                    log_path
                ),
                "The other partitions ran to completion and were not rolled back".into(),
            ],
            commands,
        }
    }

    /// Suggest retrying reconstruction with a looser tolerance
    pub fn loosen_merge_tolerance(log_path: &str) -> Self {
        Self {
            action: "Retry reconstruction".into(),
            steps: vec![
                format!("Reconstruction output is in {}", log_path),
                "Increase parallel.merge_tolerance if faces failed to merge".into(),
                "Partition directories are still in place for inspection".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest installing a missing tool
    pub fn install_tool(tool: &str) -> Self {
        Self {
            action: format!("Make '{}' available", tool),
            steps: vec![format!("'{}' must be on PATH before the pipeline starts", tool)],
            commands: vec![
                "# For OpenFOAM tools:".into(),
                "source $FOAM_INST_DIR/OpenFOAM-*/etc/bashrc".into(),
                String::new(),
                format!("which {}", tool),
            ],
        }
    }

    /// Suggest creating a pipeline file
    pub fn create_pipeline() -> Self {
        Self {
            action: "Create a pipeline configuration".into(),
            steps: vec![
                "No .meshflow.yaml found in the case directory".into(),
                "Initialize one from a template or write it manually".into(),
            ],
            commands: vec![
                "# Serial snappyHexMesh pipeline:".into(),
                "meshflow init".into(),
                String::new(),
                "# Parallel variant:".into(),
                "meshflow init --parallel".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
