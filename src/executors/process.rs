// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Process executor
//!
//! Spawns an external program and streams its stdout and stderr into a single
//! log file.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{ExecutionResult, Invocation, StageExecutor, LAUNCH_FAILURE_EXIT_CODE};
use crate::errors::MeshflowError;

/// Executor backed by real OS processes
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Create a new process executor
    pub fn new() -> Self {
        Self
    }

    fn open_log(log_path: &Path) -> Result<(File, File), MeshflowError> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MeshflowError::workspace("create log directory", parent, e))?;
        }

        let stdout = File::create(log_path)
            .map_err(|e| MeshflowError::workspace("create log", log_path, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| MeshflowError::workspace("create log", log_path, e))?;

        Ok((stdout, stderr))
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for ProcessExecutor {
    async fn run(
        &self,
        invocation: &Invocation,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError> {
        let (stdout, stderr) = Self::open_log(log_path)?;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.current_dir(&invocation.working_dir);
        cmd.envs(&invocation.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(stdout));
        cmd.stderr(Stdio::from(stderr));

        tracing::debug!(
            stage = %invocation.stage,
            command = %invocation.command_line(),
            log = %log_path.display(),
            "spawning"
        );

        let exit_code = match cmd.status().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                // Keep the reason next to the (empty) output
                let mut log = OpenOptions::new()
                    .append(true)
                    .open(log_path)
                    .map_err(|e| MeshflowError::workspace("write log", log_path, e))?;
                writeln!(log, "meshflow: failed to launch '{}': {}", invocation.program, e)
                    .map_err(|e| MeshflowError::workspace("write log", log_path, e))?;

                tracing::warn!(
                    stage = %invocation.stage,
                    program = %invocation.program,
                    error = %e,
                    "failed to launch"
                );
                LAUNCH_FAILURE_EXIT_CODE
            }
        };

        Ok(ExecutionResult::new(exit_code, log_path.to_path_buf()))
    }
}
