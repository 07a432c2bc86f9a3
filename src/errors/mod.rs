// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Error types
//!
//! Every failure carries enough context (stage name, log location, offending
//! path) for a human to diagnose the run without re-executing it.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for meshflow operations
pub type MeshflowResult<T> = Result<T, MeshflowError>;

/// Main error type for meshflow
#[derive(Error, Debug, Diagnostic)]
pub enum MeshflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Tool Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Tool '{tool}' not found")]
    #[diagnostic(code(meshflow::tool_not_found), help("{suggestion}"))]
    ToolNotFound { tool: String, suggestion: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(meshflow::pipeline_not_found),
        help("Create a pipeline with 'meshflow init' or write .meshflow.yaml manually")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(meshflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Unknown decomposition strategy '{strategy}'")]
    #[diagnostic(
        code(meshflow::unknown_strategy),
        help("Declare '{strategy}' under parallel.strategies in the pipeline file")
    )]
    UnknownStrategy { strategy: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage '{stage}' failed with exit code {exit_code} (log: {log_path})")]
    #[diagnostic(
        code(meshflow::stage_failed),
        help("Inspect the log, fix the case, then re-run 'meshflow run' (the workspace is reset first)")
    )]
    StageFailure {
        stage: String,
        exit_code: i32,
        log_path: PathBuf,
    },

    #[error("Stage '{stage}' failed on partition(s) {partitions:?} with exit code(s) {exit_codes:?} (log: {log_path})")]
    #[diagnostic(
        code(meshflow::partition_failed),
        help("Sibling partitions ran to completion; their output is collected in the stage log")
    )]
    PartitionFailure {
        stage: String,
        partitions: Vec<usize>,
        exit_codes: Vec<i32>,
        log_path: PathBuf,
    },

    #[error("Decomposition for stage '{stage}' with strategy '{strategy}' failed with exit code {exit_code} (log: {log_path})")]
    #[diagnostic(
        code(meshflow::decomposition_failed),
        help("The strategy file was active in the slot while the tool ran; check it for errors")
    )]
    DecompositionFailed {
        stage: String,
        strategy: String,
        exit_code: i32,
        log_path: PathBuf,
    },

    #[error("Decomposition for stage '{stage}' produced {found} partition(s), expected {expected} (log: {log_path})")]
    #[diagnostic(
        code(meshflow::partition_count_mismatch),
        help("Check that the strategy's numberOfSubdomains matches the pipeline's partition count")
    )]
    PartitionCountMismatch {
        stage: String,
        expected: usize,
        found: usize,
        log_path: PathBuf,
    },

    #[error("Reconstruction for stage '{stage}' failed with exit code {exit_code} (log: {log_path})")]
    #[diagnostic(
        code(meshflow::reconstruction_failed),
        help("Partition directories were kept for inspection; try a looser merge tolerance")
    )]
    Reconstruction {
        stage: String,
        exit_code: i32,
        log_path: PathBuf,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Workspace Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Workspace operation '{operation}' failed on '{path}': {error}")]
    #[diagnostic(code(meshflow::workspace_error))]
    Workspace {
        operation: String,
        path: PathBuf,
        error: String,
    },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(meshflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(meshflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(meshflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(meshflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(meshflow::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(meshflow::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for MeshflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for MeshflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for MeshflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for MeshflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for MeshflowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl MeshflowError {
    /// Create a tool not found error with an installation hint
    pub fn tool_not_found(tool: &str) -> Self {
        let suggestion = match tool {
            "mpirun" | "mpiexec" => {
                "Load an MPI module (e.g. 'module load openmpi') so mpirun is on PATH".to_string()
            }
            "blockMesh" | "snappyHexMesh" | "decomposePar" | "reconstructParMesh"
            | "surfaceFeatureExtract" | "extrudeMesh" | "createPatch" | "checkMesh" => format!(
                "'{}' ships with OpenFOAM; source the OpenFOAM bashrc before running",
                tool
            ),
            _ => format!("Install {} and ensure it's in your PATH", tool),
        };

        Self::ToolNotFound {
            tool: tool.to_string(),
            suggestion,
        }
    }

    /// Wrap a filesystem failure with the operation and path it concerned
    pub fn workspace(operation: &str, path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::Workspace {
            operation: operation.to_string(),
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// Name of the stage this error is attributed to, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageFailure { stage, .. }
            | Self::PartitionFailure { stage, .. }
            | Self::DecompositionFailed { stage, .. }
            | Self::PartitionCountMismatch { stage, .. }
            | Self::Reconstruction { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Log file holding the diagnostics for this error, if any
    pub fn log_path(&self) -> Option<&PathBuf> {
        match self {
            Self::StageFailure { log_path, .. }
            | Self::PartitionFailure { log_path, .. }
            | Self::DecompositionFailed { log_path, .. }
            | Self::PartitionCountMismatch { log_path, .. }
            | Self::Reconstruction { log_path, .. } => Some(log_path),
            _ => None,
        }
    }

    /// Point the error at the log's archived location
    pub fn relocate_log(mut self, archived: Option<PathBuf>) -> Self {
        if let Some(archived) = archived {
            match &mut self {
                Self::StageFailure { log_path, .. }
                | Self::PartitionFailure { log_path, .. }
                | Self::DecompositionFailed { log_path, .. }
                | Self::PartitionCountMismatch { log_path, .. }
                | Self::Reconstruction { log_path, .. } => *log_path = archived,
                _ => {}
            }
        }
        self
    }
}
