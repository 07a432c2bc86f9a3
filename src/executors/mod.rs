// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Stage executors
//!
//! This module provides the executor trait used to run one external command
//! to completion, the process-backed implementation, a timing wrapper, and the
//! decomposition controller that drives the parallel segment.

mod decomposition;
mod process;
mod timed;

pub use decomposition::{DecompositionController, PartitionHandle, ToolDecomposition};
pub use process::ProcessExecutor;
pub use timed::TimedExecutor;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::MeshflowError;
use crate::pipeline::Stage;

/// Exit code reported when the program could not be launched at all
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// A fully resolved external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Stage the command belongs to (used for attribution only)
    pub stage: String,
    /// Program name or path
    pub program: String,
    /// Argument list
    pub args: Vec<String>,
    /// Directory the process runs in
    pub working_dir: PathBuf,
    /// Extra environment variables
    pub env: HashMap<String, String>,
}

impl Invocation {
    /// Create an invocation with no extra environment
    pub fn new(stage: &str, program: &str, args: Vec<String>, working_dir: &Path) -> Self {
        Self {
            stage: stage.to_string(),
            program: program.to_string(),
            args,
            working_dir: working_dir.to_path_buf(),
            env: HashMap::new(),
        }
    }

    /// Build the invocation for a stage, merging global and stage environments
    pub fn for_stage(
        stage: &Stage,
        working_dir: &Path,
        global_env: &HashMap<String, String>,
    ) -> Self {
        // Stage overrides global
        let mut env = global_env.clone();
        env.extend(stage.env.clone());

        Self {
            stage: stage.name.clone(),
            program: stage.command.clone(),
            args: stage.args.clone(),
            working_dir: working_dir.to_path_buf(),
            env,
        }
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: &str, value: impl ToString) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Command line as it would be typed in a shell
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of running one external command
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,

    /// Log file holding the combined output
    pub log_path: PathBuf,

    /// Wall-clock duration, when measured
    pub duration: Option<Duration>,
}

impl ExecutionResult {
    /// Create a result without timing information
    pub fn new(exit_code: i32, log_path: PathBuf) -> Self {
        Self {
            exit_code,
            log_path,
            duration: None,
        }
    }

    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for stage executors
///
/// Implementations block the calling flow until the process exits and never
/// interpret the exit code; the orchestrator owns the success policy.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run a command, streaming its combined output to `log_path`
    ///
    /// A log file must exist at `log_path` afterwards, even when the command
    /// fails or cannot be launched.
    async fn run(
        &self,
        invocation: &Invocation,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError>;

    /// Check if a program can be found
    fn check_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_stage_merges_env() {
        let mut stage = Stage::new("castellate", "snappyHexMesh", &["-overwrite"]);
        stage.env.insert("FOAM_SIGFPE".into(), "0".into());

        let mut global = HashMap::new();
        global.insert("FOAM_SIGFPE".into(), "1".into());
        global.insert("WM_PROJECT".into(), "OpenFOAM".into());

        let invocation = Invocation::for_stage(&stage, Path::new("/case"), &global);
        assert_eq!(invocation.env["FOAM_SIGFPE"], "0");
        assert_eq!(invocation.env["WM_PROJECT"], "OpenFOAM");
        assert_eq!(invocation.command_line(), "snappyHexMesh -overwrite");
        assert_eq!(invocation.working_dir, PathBuf::from("/case"));
    }

    #[test]
    fn test_execution_result_success() {
        assert!(ExecutionResult::new(0, PathBuf::from("log")).success());
        assert!(!ExecutionResult::new(3, PathBuf::from("log")).success());
    }
}
