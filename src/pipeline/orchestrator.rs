// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Pipeline orchestrator
//!
//! Sequences stages strictly in order, drives the parallel segment through the
//! decomposition controller, archives every stage log, and owns the failure
//! policy: the first failing stage ends the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::errors::{MeshflowError, MeshflowResult};
use crate::executors::{
    DecompositionController, ExecutionResult, Invocation, ProcessExecutor, StageExecutor,
    TimedExecutor, ToolDecomposition,
};
use crate::pipeline::{ExecutionPlan, Pipeline, PipelineMode, PipelineState, Stage, StepKind};
use crate::utils::create_spinner;
use crate::workspace::WorkspaceManager;

/// Lines of a failed stage's log echoed in verbose mode
const LOG_TAIL_LINES: usize = 20;

/// Pipeline run options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Print per-stage progress lines and spinners
    pub progress: bool,
    /// Echo the tail of a failed stage's log
    pub verbose: bool,
}

/// One executed step of a run
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub stage: String,
    pub kind: StepKind,
    pub exit_code: Option<i32>,
    pub duration_secs: Option<f64>,
    /// Archived log, if the step produced one
    pub log: Option<PathBuf>,
}

/// Outcome of a pipeline run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub pipeline: String,
    pub mode: PipelineMode,
    pub partitions: usize,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Terminal state
    pub state: PipelineState,
    pub steps: Vec<StepRecord>,
    /// Archived logs in the order they were finalized
    pub logs: Vec<PathBuf>,
    /// Rendered failure, if any
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<MeshflowError>,
}

impl RunReport {
    /// Whether every stage succeeded
    pub fn success(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// Take the failure out of the report
    pub fn take_failure(&mut self) -> Option<MeshflowError> {
        self.failure.take()
    }
}

/// Pipeline orchestrator
pub struct PipelineOrchestrator {
    pipeline: Pipeline,
    workspace: WorkspaceManager,
    executor: Arc<dyn StageExecutor>,
    decomposition: Box<dyn DecompositionController>,
    state: PipelineState,
    history: Vec<PipelineState>,
    steps: Vec<StepRecord>,
    archived: Vec<PathBuf>,
}

impl PipelineOrchestrator {
    /// Create an orchestrator for the case rooted at `root`
    pub fn new(
        pipeline: Pipeline,
        root: &Path,
        executor: Arc<dyn StageExecutor>,
        decomposition: Box<dyn DecompositionController>,
    ) -> Self {
        let workspace = WorkspaceManager::new(
            root,
            pipeline.workspace.clone(),
            pipeline.parallel.strategies.clone(),
        );

        Self {
            pipeline,
            workspace,
            executor,
            decomposition,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            steps: Vec::new(),
            archived: Vec::new(),
        }
    }

    /// Orchestrator running real processes through the configured tools
    pub fn with_defaults(pipeline: Pipeline, root: &Path) -> Self {
        let executor: Arc<dyn StageExecutor> = Arc::new(TimedExecutor::new(ProcessExecutor::new()));
        let decomposition =
            ToolDecomposition::new(Arc::clone(&executor), root, pipeline.parallel.clone());
        Self::new(pipeline, root, executor, Box::new(decomposition))
    }

    /// Current state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Every state entered since the last reset, starting with `Idle`
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Logs archived so far
    pub fn archived_logs(&self) -> &[PathBuf] {
        &self.archived
    }

    /// Pipeline being run
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Workspace manager for the case
    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace
    }

    /// Steps a run would perform
    pub fn plan(&self) -> ExecutionPlan {
        ExecutionPlan::from_pipeline(&self.pipeline)
    }

    /// Programs the run needs that cannot be found
    pub fn check_tools(&self) -> Vec<String> {
        let mut programs: Vec<&str> = self.pipeline.stages.iter().map(|s| s.command.as_str()).collect();

        if self.pipeline.stages.iter().any(|s| self.pipeline.runs_distributed(s)) {
            let parallel = &self.pipeline.parallel;
            programs.push(&parallel.decompose.command);
            programs.push(&parallel.reconstruct.command);
            if let crate::pipeline::Launcher::Mpi { program, .. } = &parallel.launcher {
                programs.push(program);
            }
        }

        let mut missing = Vec::new();
        for program in programs {
            if !self.executor.check_available(program) && !missing.iter().any(|m| m == program) {
                missing.push(program.to_string());
            }
        }
        missing
    }

    /// Reset the workspace and prepare a fresh log area
    ///
    /// Allowed from `Idle` and from either terminal state; clears the history
    /// of the previous run.
    pub fn reset(&mut self) -> MeshflowResult<()> {
        self.state = PipelineState::Idle;
        self.history = vec![PipelineState::Idle];
        self.steps.clear();
        self.archived.clear();

        self.transition(PipelineState::Resetting);

        let preserve = self.workspace.layout().preserve.clone();
        self.workspace.reset(&preserve)?;

        let log_dir = self.workspace.layout().log_dir.clone();
        self.workspace.prepare_log_area(&log_dir)?;

        if let Some(first) = self.pipeline.stages.first() {
            let name = first.name.clone();
            self.transition(PipelineState::RunningStage { index: 0, name });
        }
        Ok(())
    }

    /// Run the whole pipeline from a fresh reset
    ///
    /// Never panics on stage failure; the report carries the terminal state
    /// and the error that caused it.
    pub async fn run(&mut self, options: &ExecutionOptions) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();

        tracing::info!(
            pipeline = %self.pipeline.name,
            mode = %self.pipeline.mode,
            partitions = self.pipeline.partitions,
            "starting run"
        );

        let mut outcome = self.execute(options).await;

        // The default strategy is left active whatever happened
        if self.pipeline.is_parallel() {
            let default = self.pipeline.parallel.default_strategy.clone();
            if let Err(e) = self.workspace.swap_strategy(&default) {
                if outcome.is_ok() {
                    outcome = Err(e);
                } else {
                    tracing::error!(error = %e, strategy = %default, "failed to restore default strategy");
                }
            }
        }

        let failure = match outcome {
            Ok(()) => {
                self.transition(PipelineState::Done);
                None
            }
            Err(e) => {
                let stage = e
                    .stage()
                    .map(str::to_string)
                    .or_else(|| self.state.stage_name().map(str::to_string));
                tracing::warn!(stage = ?stage, error = %e, "run failed");
                self.transition(PipelineState::Failed { stage });
                Some(e)
            }
        };

        let duration = start.elapsed();
        if options.progress {
            println!();
            if failure.is_none() {
                println!(
                    "{}",
                    format!("Pipeline completed successfully in {:.2}s", duration.as_secs_f64()).green()
                );
            } else {
                println!(
                    "{}",
                    format!("Pipeline failed after {:.2}s", duration.as_secs_f64()).red()
                );
            }
        }

        RunReport {
            pipeline: self.pipeline.name.clone(),
            mode: self.pipeline.mode,
            partitions: self.pipeline.partitions,
            started_at,
            duration_secs: duration.as_secs_f64(),
            state: self.state.clone(),
            steps: self.steps.clone(),
            logs: self.archived.clone(),
            error: failure.as_ref().map(|e| e.to_string()),
            failure,
        }
    }

    async fn execute(&mut self, options: &ExecutionOptions) -> MeshflowResult<()> {
        self.reset()?;

        for index in 0..self.pipeline.stages.len() {
            let stage = self.pipeline.stages[index].clone();
            self.run_stage(index, &stage, options).await?;
        }
        Ok(())
    }

    async fn run_stage(
        &mut self,
        index: usize,
        stage: &Stage,
        options: &ExecutionOptions,
    ) -> MeshflowResult<()> {
        self.transition(PipelineState::RunningStage {
            index,
            name: stage.name.clone(),
        });

        for action in &stage.pre {
            self.workspace.apply(action)?;
        }

        let spinner = options
            .progress
            .then(|| create_spinner(&format!("{}...", stage.name)));
        let started = Instant::now();

        let outcome = if self.pipeline.runs_distributed(stage) {
            self.run_parallel_segment(index, stage).await
        } else {
            if stage.quality_check {
                self.transition(PipelineState::Checking {
                    index,
                    name: stage.name.clone(),
                });
            }
            self.run_single(stage).await
        };

        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        if options.progress {
            match &outcome {
                Ok(()) => println!(
                    "  {} {} ({:.2}s)",
                    "✓".green(),
                    stage.name.bold(),
                    started.elapsed().as_secs_f64()
                ),
                Err(e) => {
                    println!("  {} {} failed", "✗".red(), stage.name.bold());
                    if options.verbose {
                        if let Some(tail) = e.log_path().and_then(|p| log_tail(p, LOG_TAIL_LINES)) {
                            eprintln!("{}", tail.dimmed());
                        }
                    }
                }
            }
        }

        outcome?;

        for action in &stage.post {
            self.workspace.apply(action)?;
        }
        Ok(())
    }

    /// Run a stage as one process
    async fn run_single(&mut self, stage: &Stage) -> MeshflowResult<()> {
        let root = self.workspace.root().to_path_buf();
        let artifact = root.join(stage.artifact_name());
        let invocation = Invocation::for_stage(stage, &root, &self.pipeline.env);
        let kind = if stage.quality_check {
            StepKind::Check
        } else {
            StepKind::Run
        };

        let result = self.executor.run(&invocation, &artifact).await;
        // Archived before the exit code is looked at, so failures keep their log
        let archived = self.archive(&artifact, &stage.archive_name())?;
        let result = result.map_err(|e| e.relocate_log(archived.clone()))?;
        self.record(stage, kind, Some(&result), archived.clone());

        if !result.success() {
            return Err(MeshflowError::StageFailure {
                stage: stage.name.clone(),
                exit_code: result.exit_code,
                log_path: archived.unwrap_or(artifact),
            });
        }
        Ok(())
    }

    /// Decompose, run across partitions, reconstruct
    async fn run_parallel_segment(&mut self, index: usize, stage: &Stage) -> MeshflowResult<()> {
        let guard = if self.pipeline.parallel.stash_initial_conditions {
            Some(self.workspace.stash_initial_conditions()?)
        } else {
            None
        };

        let outcome = self.parallel_steps(index, stage).await;

        let restored = match guard {
            Some(guard) => guard.restore(),
            None => Ok(()),
        };
        match (outcome, restored) {
            (Err(e), Err(restore_error)) => {
                tracing::error!(error = %restore_error, "failed to restore initial conditions");
                Err(e)
            }
            (outcome, restored) => outcome.and(restored),
        }
    }

    async fn parallel_steps(&mut self, index: usize, stage: &Stage) -> MeshflowResult<()> {
        let parallel = self.pipeline.parallel.clone();
        let partitions = self.pipeline.partitions;
        let root = self.workspace.root().to_path_buf();
        let artifact = root.join(stage.artifact_name());
        let archive_name = stage.archive_name();
        let name = stage.name.clone();

        // Decompose
        self.transition(PipelineState::Decomposing {
            index,
            name: name.clone(),
        });
        self.workspace.swap_strategy(&parallel.decompose_strategy)?;

        let log = with_suffix(&artifact, "decompose");
        let started = Instant::now();
        let decomposed = self
            .decomposition
            .decompose(&name, &parallel.decompose_strategy, partitions, &log)
            .await;
        let archived = self.archive(&log, &format!("{}.decompose", archive_name))?;
        let handles = decomposed.map_err(|e| e.relocate_log(archived.clone()))?;
        let mut result = ExecutionResult::new(0, log);
        result.duration = Some(started.elapsed());
        self.record(stage, StepKind::Decompose, Some(&result), archived);
        tracing::debug!(stage = %name, partitions = handles.len(), "domain decomposed");

        // Distributed run
        self.workspace.swap_strategy(&parallel.distributed_strategy)?;
        self.transition(PipelineState::RunningParallelStage {
            index,
            name: name.clone(),
        });

        let invocation = Invocation::for_stage(stage, &root, &self.pipeline.env);
        let distributed = self
            .decomposition
            .run_distributed(&invocation, partitions, &artifact)
            .await;
        let archived = self.archive(&artifact, &archive_name)?;
        let result = distributed.map_err(|e| e.relocate_log(archived.clone()))?;
        self.record(stage, StepKind::Distributed, Some(&result), archived);

        // Reconstruct
        self.transition(PipelineState::Reconstructing {
            index,
            name: name.clone(),
        });

        let log = with_suffix(&artifact, "reconstruct");
        let reconstructed = self
            .decomposition
            .reconstruct(&name, parallel.merge_tolerance, &parallel.selector, &log)
            .await;
        let archived = self.archive(&log, &format!("{}.reconstruct", archive_name))?;
        let result = reconstructed.map_err(|e| e.relocate_log(archived.clone()))?;
        self.record(stage, StepKind::Reconstruct, Some(&result), archived);

        Ok(())
    }

    fn archive(&mut self, artifact: &Path, name: &str) -> MeshflowResult<Option<PathBuf>> {
        let archived = self.workspace.archive(artifact, name)?;
        if let Some(path) = &archived {
            self.archived.push(path.clone());
        }
        Ok(archived)
    }

    fn record(
        &mut self,
        stage: &Stage,
        kind: StepKind,
        result: Option<&ExecutionResult>,
        log: Option<PathBuf>,
    ) {
        self.steps.push(StepRecord {
            stage: stage.name.clone(),
            kind,
            exit_code: result.map(|r| r.exit_code),
            duration_secs: result.and_then(|r| r.duration).map(|d: Duration| d.as_secs_f64()),
            log,
        });
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state == next {
            return;
        }

        tracing::debug!(from = %self.state, to = %next, "transition");
        self.history.push(next.clone());
        self.state = next;
    }
}

/// `log.castellate` → `log.castellate.<suffix>`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}", suffix));
    path.with_file_name(name)
}

/// Last `lines` lines of a log file
fn log_tail(path: &Path, lines: usize) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Some(all[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::PartitionHandle;
    use crate::pipeline::TimeSelector;
    use crate::workspace::tests::{listing, touch};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Executor that records start/end events and returns scripted exit codes
    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
        exit_codes: HashMap<String, i32>,
        missing: HashSet<String>,
    }

    impl Recording {
        fn failing(stage: &str, code: i32) -> Self {
            let mut exit_codes = HashMap::new();
            exit_codes.insert(stage.to_string(), code);
            Self {
                exit_codes,
                ..Self::default()
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn started(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| e.strip_prefix("start ").map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl StageExecutor for Recording {
        async fn run(
            &self,
            invocation: &Invocation,
            log_path: &Path,
        ) -> Result<ExecutionResult, MeshflowError> {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {}", invocation.stage));
            tokio::task::yield_now().await;
            std::fs::write(log_path, format!("{}\n", invocation.command_line())).unwrap();
            self.events
                .lock()
                .unwrap()
                .push(format!("end {}", invocation.stage));

            let code = self.exit_codes.get(&invocation.stage).copied().unwrap_or(0);
            Ok(ExecutionResult::new(code, log_path.to_path_buf()))
        }

        fn check_available(&self, program: &str) -> bool {
            !self.missing.contains(program)
        }
    }

    /// Controller that fakes partitions and records what it saw
    struct MockDecomposition {
        root: PathBuf,
        calls: Arc<Mutex<Vec<String>>>,
        failing_partition: Option<usize>,
    }

    impl MockDecomposition {
        fn new(root: &Path) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let mock = Self {
                root: root.to_path_buf(),
                calls: Arc::clone(&calls),
                failing_partition: None,
            };
            (mock, calls)
        }

        fn slot(&self) -> String {
            std::fs::read_to_string(self.root.join("system/decomposeParDict")).unwrap_or_default()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl DecompositionController for MockDecomposition {
        async fn decompose(
            &self,
            _stage: &str,
            strategy: &str,
            partition_count: usize,
            log_path: &Path,
        ) -> Result<Vec<PartitionHandle>, MeshflowError> {
            self.push(format!("decompose {} {} [{}]", strategy, partition_count, self.slot()));
            std::fs::write(log_path, "decomposed").unwrap();

            Ok((0..partition_count)
                .map(|index| {
                    let path = self.root.join(format!("processor{}", index));
                    std::fs::create_dir_all(&path).unwrap();
                    PartitionHandle { index, path }
                })
                .collect())
        }

        async fn run_distributed(
            &self,
            invocation: &Invocation,
            partition_count: usize,
            log_path: &Path,
        ) -> Result<ExecutionResult, MeshflowError> {
            let initial = listing(&self.root.join("0"));
            self.push(format!(
                "distributed {} {} [{}] ic={}",
                invocation.program,
                partition_count,
                self.slot(),
                initial.len()
            ));
            std::fs::write(log_path, "castellated").unwrap();
            // Tool output written into the placeholder must not survive
            std::fs::write(self.root.join("0/cellLevel"), "levels").unwrap();

            if let Some(failed) = self.failing_partition {
                return Err(MeshflowError::PartitionFailure {
                    stage: invocation.stage.clone(),
                    partitions: vec![failed],
                    exit_codes: vec![1],
                    log_path: log_path.to_path_buf(),
                });
            }
            Ok(ExecutionResult::new(0, log_path.to_path_buf()))
        }

        async fn reconstruct(
            &self,
            _stage: &str,
            merge_tolerance: f64,
            selector: &TimeSelector,
            log_path: &Path,
        ) -> Result<ExecutionResult, MeshflowError> {
            self.push(format!("reconstruct {:e} {:?}", merge_tolerance, selector));
            std::fs::write(log_path, "reconstructed").unwrap();
            Ok(ExecutionResult::new(0, log_path.to_path_buf()))
        }
    }

    const STAGES: &str = r#"
stages:
  - name: base-mesh
    command: blockMesh
  - name: castellate
    command: snappyHexMesh
    args: ["-overwrite"]
    parallel: true
  - name: extrude
    command: extrudeMesh
  - name: patch
    command: createPatch
    args: ["-overwrite"]
  - name: check
    command: checkMesh
    quality_check: true
"#;

    fn serial_pipeline() -> Pipeline {
        Pipeline::from_yaml(&format!("name: serial\n{}", STAGES)).unwrap()
    }

    fn parallel_pipeline() -> Pipeline {
        let yaml = format!(
            "name: parallel\nmode: parallel\npartitions: 4\nparallel:\n  stash_initial_conditions: true\n{}",
            STAGES
        );
        Pipeline::from_yaml(&yaml).unwrap()
    }

    fn case(root: &Path) {
        touch(root, "constant/polyMesh/blockMeshDict", "blocks");
        touch(root, "constant/polyMesh/points", "stale points");
        touch(root, "log.blockMesh", "previous run");
        for strategy in ["hierarchical", "ptscotch", "simple"] {
            touch(
                root,
                &format!("system/decomposeParDict.{}", strategy),
                &format!("method {};", strategy),
            );
        }
        touch(root, "0/U", "velocity");
        touch(root, "0/p", "pressure");
    }

    fn serial(root: &Path, executor: Arc<Recording>) -> PipelineOrchestrator {
        let (controller, _) = MockDecomposition::new(root);
        PipelineOrchestrator::new(serial_pipeline(), root, executor, Box::new(controller))
    }

    #[tokio::test]
    async fn test_serial_success_archives_every_stage() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        case(root);
        let executor = Arc::new(Recording::default());
        let mut orchestrator = serial(root, executor.clone());

        let report = orchestrator.run(&ExecutionOptions::default()).await;

        assert!(report.success());
        assert_eq!(orchestrator.state(), &PipelineState::Done);
        assert_eq!(
            listing(&root.join("logs")),
            vec!["base-mesh", "castellate", "check", "extrude", "patch"]
        );
        assert_eq!(report.logs.len(), 5);
        assert_eq!(orchestrator.archived_logs(), report.logs.as_slice());
        assert_eq!(report.steps.len(), 5);
        assert!(report.error.is_none());
        assert!(!root.join("constant/polyMesh/points").exists());
        assert!(root.join("constant/polyMesh/blockMeshDict").exists());
        assert!(orchestrator.history().contains(&PipelineState::Checking {
            index: 4,
            name: "check".into()
        }));
    }

    #[tokio::test]
    async fn test_stages_run_strictly_in_order() {
        let temp_dir = TempDir::new().unwrap();
        case(temp_dir.path());
        let executor = Arc::new(Recording::default());
        let mut orchestrator = serial(temp_dir.path(), executor.clone());

        orchestrator.run(&ExecutionOptions::default()).await;

        let expected: Vec<String> = ["base-mesh", "castellate", "extrude", "patch", "check"]
            .iter()
            .flat_map(|s| [format!("start {}", s), format!("end {}", s)])
            .collect();
        assert_eq!(executor.events(), expected);
    }

    #[tokio::test]
    async fn test_failure_halts_pipeline() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        case(root);
        let executor = Arc::new(Recording::failing("castellate", 1));
        let mut orchestrator = serial(root, executor.clone());

        let mut report = orchestrator.run(&ExecutionOptions::default()).await;

        assert!(!report.success());
        assert_eq!(
            orchestrator.state(),
            &PipelineState::Failed {
                stage: Some("castellate".into())
            }
        );
        assert_eq!(executor.started(), vec!["base-mesh", "castellate"]);
        assert_eq!(listing(&root.join("logs")), vec!["base-mesh", "castellate"]);

        match report.take_failure() {
            Some(MeshflowError::StageFailure {
                stage,
                exit_code,
                log_path,
            }) => {
                assert_eq!(stage, "castellate");
                assert_eq!(exit_code, 1);
                assert_eq!(log_path, root.join("logs/castellate"));
            }
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_quality_check_keeps_earlier_logs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        case(root);
        let executor = Arc::new(Recording::failing("check", 2));
        let mut orchestrator = serial(root, executor);

        let report = orchestrator.run(&ExecutionOptions::default()).await;

        assert_eq!(
            report.state,
            PipelineState::Failed {
                stage: Some("check".into())
            }
        );
        assert_eq!(report.logs.len(), 5);
        assert!(orchestrator.history().contains(&PipelineState::Checking {
            index: 4,
            name: "check".into()
        }));
    }

    #[tokio::test]
    async fn test_parallel_segment() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        case(root);
        let executor = Arc::new(Recording::default());
        let (controller, calls) = MockDecomposition::new(root);
        let mut orchestrator =
            PipelineOrchestrator::new(parallel_pipeline(), root, executor.clone(), Box::new(controller));

        let report = orchestrator.run(&ExecutionOptions::default()).await;

        assert!(report.success(), "{:?}", report.error);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "decompose hierarchical 4 [method hierarchical;]".to_string(),
                "distributed snappyHexMesh 4 [method ptscotch;] ic=0".to_string(),
                "reconstruct 1e-6 LatestTime".to_string(),
            ]
        );
        assert_eq!(executor.started(), vec!["base-mesh", "extrude", "patch", "check"]);

        let slot = std::fs::read_to_string(root.join("system/decomposeParDict")).unwrap();
        assert_eq!(slot, "method simple;");
        assert_eq!(listing(&root.join("0")), vec!["U", "p"]);

        let logs = listing(&root.join("logs"));
        assert!(logs.contains(&"castellate.decompose".to_string()));
        assert!(logs.contains(&"castellate".to_string()));
        assert!(logs.contains(&"castellate.reconstruct".to_string()));

        let segment: Vec<&PipelineState> = orchestrator
            .history()
            .iter()
            .filter(|s| s.stage_name() == Some("castellate"))
            .collect();
        assert!(matches!(segment[0], PipelineState::RunningStage { index: 1, .. }));
        assert!(matches!(segment[1], PipelineState::Decomposing { .. }));
        assert!(matches!(segment[2], PipelineState::RunningParallelStage { .. }));
        assert!(matches!(segment[3], PipelineState::Reconstructing { .. }));
    }

    #[tokio::test]
    async fn test_partition_failure_restores_strategy_and_initial_conditions() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        case(root);
        let executor = Arc::new(Recording::default());
        let (mut controller, calls) = MockDecomposition::new(root);
        controller.failing_partition = Some(2);
        let mut orchestrator =
            PipelineOrchestrator::new(parallel_pipeline(), root, executor.clone(), Box::new(controller));

        let mut report = orchestrator.run(&ExecutionOptions::default()).await;

        assert_eq!(
            report.state,
            PipelineState::Failed {
                stage: Some("castellate".into())
            }
        );
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(executor.started(), vec!["base-mesh"]);

        let slot = std::fs::read_to_string(root.join("system/decomposeParDict")).unwrap();
        assert_eq!(slot, "method simple;");
        assert_eq!(listing(&root.join("0")), vec!["U", "p"]);

        match report.take_failure() {
            Some(MeshflowError::PartitionFailure {
                partitions,
                log_path,
                ..
            }) => {
                assert_eq!(partitions, vec![2]);
                assert_eq!(log_path, root.join("logs/castellate"));
            }
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_before_parallel_segment_restores_default_strategy() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        case(root);
        touch(root, "system/decomposeParDict", "method ptscotch;");
        let executor = Arc::new(Recording::failing("base-mesh", 1));
        let (controller, calls) = MockDecomposition::new(root);
        let mut orchestrator =
            PipelineOrchestrator::new(parallel_pipeline(), root, executor, Box::new(controller));

        let report = orchestrator.run(&ExecutionOptions::default()).await;

        assert!(!report.success());
        assert!(calls.lock().unwrap().is_empty());
        let slot = std::fs::read_to_string(root.join("system/decomposeParDict")).unwrap();
        assert_eq!(slot, "method simple;");
    }

    #[tokio::test]
    async fn test_blocked_log_area_aborts_before_any_stage() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        case(root);
        touch(root, "system/decomposeParDict", "method ptscotch;");
        touch(root, "blocker", "a regular file");
        let mut pipeline = parallel_pipeline();
        pipeline.workspace.log_dir = PathBuf::from("blocker/logs");
        let executor = Arc::new(Recording::default());
        let (controller, calls) = MockDecomposition::new(root);
        let mut orchestrator =
            PipelineOrchestrator::new(pipeline, root, executor.clone(), Box::new(controller));

        let mut report = orchestrator.run(&ExecutionOptions::default()).await;

        assert_eq!(report.state, PipelineState::Failed { stage: None });
        assert!(executor.started().is_empty());
        assert!(calls.lock().unwrap().is_empty());
        assert!(report.logs.is_empty());
        assert!(matches!(
            report.take_failure(),
            Some(MeshflowError::Workspace { .. })
        ));

        let slot = std::fs::read_to_string(root.join("system/decomposeParDict")).unwrap();
        assert_eq!(slot, "method simple;");
    }

    #[tokio::test]
    async fn test_rerun_after_failure_resets() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        case(root);
        let mut orchestrator = serial(root, Arc::new(Recording::failing("extrude", 1)));
        orchestrator.run(&ExecutionOptions::default()).await;
        assert!(orchestrator.state().is_terminal());

        let mut orchestrator = serial(root, Arc::new(Recording::default()));
        let report = orchestrator.run(&ExecutionOptions::default()).await;
        assert!(report.success());
        assert_eq!(listing(&root.join("logs")).len(), 5);
        assert_eq!(orchestrator.history()[0], PipelineState::Idle);
        assert_eq!(orchestrator.history()[1], PipelineState::Resetting);
    }

    #[tokio::test]
    async fn test_reset_enters_first_stage() {
        let temp_dir = TempDir::new().unwrap();
        case(temp_dir.path());
        let mut orchestrator = serial(temp_dir.path(), Arc::new(Recording::default()));

        orchestrator.reset().unwrap();
        assert_eq!(
            orchestrator.state(),
            &PipelineState::RunningStage {
                index: 0,
                name: "base-mesh".into()
            }
        );
        assert!(temp_dir.path().join("logs").is_dir());
        assert!(!temp_dir.path().join("log.blockMesh").exists());
    }

    #[test]
    fn test_check_tools_reports_missing_programs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let executor = Arc::new(Recording {
            missing: ["extrudeMesh", "mpirun"].iter().map(|s| s.to_string()).collect(),
            ..Recording::default()
        });

        let orchestrator = serial(root, executor.clone());
        assert_eq!(orchestrator.check_tools(), vec!["extrudeMesh"]);

        let (controller, _) = MockDecomposition::new(root);
        let orchestrator =
            PipelineOrchestrator::new(parallel_pipeline(), root, executor, Box::new(controller));
        assert_eq!(orchestrator.check_tools(), vec!["extrudeMesh", "mpirun"]);
    }

    #[test]
    fn test_report_serializes_state() {
        let report = RunReport {
            pipeline: "box".into(),
            mode: PipelineMode::Serial,
            partitions: 1,
            started_at: Utc::now(),
            duration_secs: 0.5,
            state: PipelineState::Failed {
                stage: Some("patch".into()),
            },
            steps: vec![],
            logs: vec![],
            error: Some("boom".into()),
            failure: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"]["state"], "failed");
        assert_eq!(json["state"]["stage"], "patch");
        assert_eq!(json["mode"], "serial");
    }
}
