// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Decomposition controller
//!
//! Splits the case into partitions, runs a command across all partitions, and
//! merges the partition outputs back into a single mesh. The external tools
//! do the work; this module builds their command lines and interprets their
//! exit codes.

use async_trait::async_trait;
use futures::future::join_all;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ExecutionResult, Invocation, StageExecutor};
use crate::errors::MeshflowError;
use crate::pipeline::{Launcher, ParallelConfig, TimeSelector};

/// Environment variable carrying the partition index (independent launcher)
pub const PARTITION_ENV: &str = "MESHFLOW_PARTITION";

/// Environment variable carrying the partition count (independent launcher)
pub const PARTITION_COUNT_ENV: &str = "MESHFLOW_PARTITIONS";

/// Environment variable carrying the partition's own directory (independent launcher)
pub const PARTITION_DIR_ENV: &str = "MESHFLOW_PARTITION_DIR";

/// One decomposed sub-domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
    pub index: usize,
    pub path: PathBuf,
}

/// Trait for the decompose / distribute / reconstruct cycle
#[async_trait]
pub trait DecompositionController: Send + Sync {
    /// Split the domain into `partition_count` partitions
    ///
    /// The strategy must already be active in the strategy slot.
    async fn decompose(
        &self,
        stage: &str,
        strategy: &str,
        partition_count: usize,
        log_path: &Path,
    ) -> Result<Vec<PartitionHandle>, MeshflowError>;

    /// Run `invocation` on every partition and wait for all of them
    ///
    /// Fails with `PartitionFailure` if any partition exits nonzero; siblings
    /// are never terminated early.
    async fn run_distributed(
        &self,
        invocation: &Invocation,
        partition_count: usize,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError>;

    /// Merge partition outputs selected by `selector` into the case root
    ///
    /// Partition directories are left in place.
    async fn reconstruct(
        &self,
        stage: &str,
        merge_tolerance: f64,
        selector: &TimeSelector,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError>;
}

/// Controller driving the configured decomposition/reconstruction tools
pub struct ToolDecomposition {
    executor: Arc<dyn StageExecutor>,
    working_dir: PathBuf,
    config: ParallelConfig,
}

impl ToolDecomposition {
    /// Create a controller running tools through `executor` in `working_dir`
    pub fn new(executor: Arc<dyn StageExecutor>, working_dir: &Path, config: ParallelConfig) -> Self {
        Self {
            executor,
            working_dir: working_dir.to_path_buf(),
            config,
        }
    }

    /// Partition directories currently present in the case, sorted by index
    pub fn partitions(&self) -> Result<Vec<PartitionHandle>, MeshflowError> {
        let mut partitions = Vec::new();

        let entries = std::fs::read_dir(&self.working_dir)
            .map_err(|e| MeshflowError::workspace("list partitions", &self.working_dir, e))?;

        for entry in entries {
            let entry =
                entry.map_err(|e| MeshflowError::workspace("list partitions", &self.working_dir, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let index = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("processor"))
                .and_then(|digits| digits.parse::<usize>().ok());

            if let Some(index) = index {
                partitions.push(PartitionHandle { index, path });
            }
        }

        partitions.sort_by_key(|p| p.index);
        Ok(partitions)
    }

    /// Arguments for the reconstruction tool
    fn reconstruct_args(&self, merge_tolerance: f64, selector: &TimeSelector) -> Vec<String> {
        let mut args = self.config.reconstruct.args.clone();
        args.push("-mergeTol".to_string());
        args.push(format!("{:e}", merge_tolerance));
        args.extend(selector.to_args());
        args
    }

    /// Single launcher invocation covering every partition
    async fn run_mpi(
        &self,
        program: &str,
        flags: &[String],
        invocation: &Invocation,
        partition_count: usize,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError> {
        let mut args = flags.to_vec();
        args.push("-np".to_string());
        args.push(partition_count.to_string());
        args.push(invocation.program.clone());
        args.extend(invocation.args.iter().cloned());
        args.push("-parallel".to_string());

        let launched = Invocation {
            program: program.to_string(),
            args,
            ..invocation.clone()
        };

        let result = self.executor.run(&launched, log_path).await?;
        if result.success() {
            return Ok(result);
        }

        // The launcher only reports an aggregate status
        Err(MeshflowError::PartitionFailure {
            stage: invocation.stage.clone(),
            partitions: (0..partition_count).collect(),
            exit_codes: vec![result.exit_code; partition_count],
            log_path: log_path.to_path_buf(),
        })
    }

    /// One process per partition, joined at a barrier
    async fn run_independent(
        &self,
        invocation: &Invocation,
        partition_count: usize,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError> {
        let partition_logs: Vec<PathBuf> = (0..partition_count)
            .map(|i| partition_log_path(log_path, i))
            .collect();

        let runs = partition_logs.iter().enumerate().map(|(i, log)| {
            let partition_dir = self.working_dir.join(format!("processor{}", i));
            let per_partition = invocation
                .clone()
                .with_env(PARTITION_ENV, i)
                .with_env(PARTITION_COUNT_ENV, partition_count)
                .with_env(PARTITION_DIR_ENV, partition_dir.display());
            let executor = Arc::clone(&self.executor);
            async move { executor.run(&per_partition, log).await }
        });

        // Barrier: every partition reports before anything is decided
        let results = join_all(runs).await;

        let mut failed = Vec::new();
        let mut exit_codes = Vec::new();
        let mut first_error = None;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(r) if r.success() => {}
                Ok(r) => {
                    failed.push(i);
                    exit_codes.push(r.exit_code);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        merge_partition_logs(&partition_logs, log_path)?;

        if let Some(e) = first_error {
            return Err(e);
        }

        if !failed.is_empty() {
            return Err(MeshflowError::PartitionFailure {
                stage: invocation.stage.clone(),
                partitions: failed,
                exit_codes,
                log_path: log_path.to_path_buf(),
            });
        }

        Ok(ExecutionResult::new(0, log_path.to_path_buf()))
    }
}

#[async_trait]
impl DecompositionController for ToolDecomposition {
    async fn decompose(
        &self,
        stage: &str,
        strategy: &str,
        partition_count: usize,
        log_path: &Path,
    ) -> Result<Vec<PartitionHandle>, MeshflowError> {
        let invocation = Invocation::new(
            stage,
            &self.config.decompose.command,
            self.config.decompose.args.clone(),
            &self.working_dir,
        );

        tracing::info!(stage, strategy, partitions = partition_count, "decomposing");

        let result = self.executor.run(&invocation, log_path).await?;
        if !result.success() {
            return Err(MeshflowError::DecompositionFailed {
                stage: stage.to_string(),
                strategy: strategy.to_string(),
                exit_code: result.exit_code,
                log_path: result.log_path,
            });
        }

        let partitions = self.partitions()?;
        if partitions.len() != partition_count {
            return Err(MeshflowError::PartitionCountMismatch {
                stage: stage.to_string(),
                expected: partition_count,
                found: partitions.len(),
                log_path: result.log_path,
            });
        }

        Ok(partitions)
    }

    async fn run_distributed(
        &self,
        invocation: &Invocation,
        partition_count: usize,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError> {
        tracing::info!(
            stage = %invocation.stage,
            partitions = partition_count,
            "running distributed"
        );

        match &self.config.launcher {
            Launcher::Mpi { program, flags } => {
                self.run_mpi(program, flags, invocation, partition_count, log_path)
                    .await
            }
            Launcher::Independent => {
                self.run_independent(invocation, partition_count, log_path)
                    .await
            }
        }
    }

    async fn reconstruct(
        &self,
        stage: &str,
        merge_tolerance: f64,
        selector: &TimeSelector,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError> {
        let invocation = Invocation::new(
            stage,
            &self.config.reconstruct.command,
            self.reconstruct_args(merge_tolerance, selector),
            &self.working_dir,
        );

        tracing::info!(stage, merge_tolerance, "reconstructing");

        let result = self.executor.run(&invocation, log_path).await?;
        if !result.success() {
            return Err(MeshflowError::Reconstruction {
                stage: stage.to_string(),
                exit_code: result.exit_code,
                log_path: result.log_path,
            });
        }

        Ok(result)
    }
}

/// Log path used by partition `index` before logs are merged
fn partition_log_path(log_path: &Path, index: usize) -> PathBuf {
    let mut name = log_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".processor{}", index));
    log_path.with_file_name(name)
}

/// Concatenate per-partition logs into one artifact, removing the parts
fn merge_partition_logs(parts: &[PathBuf], log_path: &Path) -> Result<(), MeshflowError> {
    let mut merged = std::fs::File::create(log_path)
        .map_err(|e| MeshflowError::workspace("create log", log_path, e))?;

    for (i, part) in parts.iter().enumerate() {
        // A partition whose executor errored out may have left nothing behind
        let content = match std::fs::read(part) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(MeshflowError::workspace("read log", part, e)),
        };

        writeln!(merged, "==> processor{} <==", i)
            .and_then(|_| merged.write_all(&content))
            .map_err(|e| MeshflowError::workspace("write log", log_path, e))?;

        std::fs::remove_file(part).map_err(|e| MeshflowError::workspace("remove", part, e))?;
    }

    Ok(())
}
