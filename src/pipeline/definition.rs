// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for .meshflow.yaml (or .meshflow.toml) files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::errors::MeshflowError;

/// Pipeline definition from .meshflow.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Serial or parallel execution of parallel-capable stages
    #[serde(default)]
    pub mode: PipelineMode,

    /// Number of partitions (only meaningful in parallel mode)
    #[serde(default = "default_partitions")]
    pub partitions: usize,

    /// Stages in execution order
    pub stages: Vec<Stage>,

    /// Global environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Case directory layout
    #[serde(default)]
    pub workspace: WorkspaceLayout,

    /// Decomposition and distributed-run settings
    #[serde(default)]
    pub parallel: ParallelConfig,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_partitions() -> usize {
    1
}

impl Pipeline {
    /// Load a pipeline file, picking the format from its extension
    pub fn from_file(path: &Path) -> Result<Self, MeshflowError> {
        if !path.exists() {
            return Err(MeshflowError::PipelineNotFound {
                path: path.to_path_buf(),
            });
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| MeshflowError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse pipeline from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, MeshflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Parse pipeline from TOML string
    pub fn from_toml(content: &str) -> Result<Self, MeshflowError> {
        toml::from_str(content).map_err(Into::into)
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Whether parallel-capable stages go through decomposition
    pub fn is_parallel(&self) -> bool {
        self.mode == PipelineMode::Parallel
    }

    /// Whether a stage takes the decompose/distribute/reconstruct path
    pub fn runs_distributed(&self, stage: &Stage) -> bool {
        self.is_parallel() && stage.parallel
    }
}

/// Execution mode of a pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    #[default]
    Serial,
    Parallel,
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

impl std::str::FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "parallel" => Ok(Self::Parallel),
            _ => Err(format!("Unknown pipeline mode: {}", s)),
        }
    }
}

/// A single pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name (must be unique within pipeline)
    pub name: String,

    /// Stage description
    #[serde(default)]
    pub description: Option<String>,

    /// Executable to run
    pub command: String,

    /// Fixed argument list
    #[serde(default)]
    pub args: Vec<String>,

    /// Archived log name (defaults to the stage name)
    #[serde(default)]
    pub log: Option<String>,

    /// Suffix appended to the archived log name, e.g. "castellated"
    #[serde(default)]
    pub log_suffix: Option<String>,

    /// Run through decomposition/reconstruction in parallel mode
    #[serde(default)]
    pub parallel: bool,

    /// Terminal mesh-quality check
    #[serde(default)]
    pub quality_check: bool,

    /// Actions applied before the command runs
    #[serde(default)]
    pub pre: Vec<StageAction>,

    /// Actions applied after the command succeeds
    #[serde(default)]
    pub post: Vec<StageAction>,

    /// Environment variables for this stage
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Stage {
    /// Create a stage running `command` with `args`
    pub fn new(name: &str, command: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            log: None,
            log_suffix: None,
            parallel: false,
            quality_check: false,
            pre: vec![],
            post: vec![],
            env: HashMap::new(),
        }
    }

    /// Log file the running command writes to, relative to the case root
    pub fn artifact_name(&self) -> String {
        format!("log.{}", self.name)
    }

    /// Name of the finalized log inside the run's log directory
    pub fn archive_name(&self) -> String {
        let base = self.log.as_deref().unwrap_or(&self.name);
        match &self.log_suffix {
            Some(suffix) if !suffix.is_empty() => format!("{}.{}", base, suffix),
            _ => base.to_string(),
        }
    }

    /// Command line as it would be typed in a shell
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Workspace side effect attached to a stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StageAction {
    /// Copy a named strategy into the active strategy slot
    SwapStrategy { strategy: String },
    /// Delete files or directories matching glob patterns
    Remove { paths: Vec<String> },
    /// Rename a file or directory inside the case
    Move { from: PathBuf, to: PathBuf },
}

impl std::fmt::Display for StageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SwapStrategy { strategy } => write!(f, "swap strategy → {}", strategy),
            Self::Remove { paths } => write!(f, "remove {}", paths.join(" ")),
            Self::Move { from, to } => write!(f, "move {} → {}", from.display(), to.display()),
        }
    }
}

/// Case directory layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceLayout {
    /// Directory holding the mesh being built
    pub mesh_dir: PathBuf,

    /// Files inside `mesh_dir` that survive a reset
    pub preserve: Vec<String>,

    /// Derived artifacts removed on reset (globs relative to the case root)
    pub stale: Vec<String>,

    /// Directory receiving finalized stage logs
    pub log_dir: PathBuf,

    /// Active decomposition strategy file read by the external tools
    pub strategy_slot: PathBuf,

    /// Initial-conditions directory
    pub initial_conditions: PathBuf,
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self {
            mesh_dir: PathBuf::from("constant/polyMesh"),
            preserve: vec!["blockMeshDict".to_string()],
            stale: vec![
                "constant/triSurface/*.eMesh".to_string(),
                "constant/extendedFeatureEdgeMesh".to_string(),
                "log.*".to_string(),
                "processor*".to_string(),
            ],
            log_dir: PathBuf::from("logs"),
            strategy_slot: PathBuf::from("system/decomposeParDict"),
            initial_conditions: PathBuf::from("0"),
        }
    }
}

/// Decomposition and distributed-run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Strategy name → strategy file (relative to the case root)
    pub strategies: BTreeMap<String, PathBuf>,

    /// Strategy active while the domain is decomposed
    pub decompose_strategy: String,

    /// Strategy active while the distributed stage runs
    pub distributed_strategy: String,

    /// Strategy left in place for downstream consumers
    pub default_strategy: String,

    /// Geometric merge tolerance for reconstruction
    pub merge_tolerance: f64,

    /// Which result set reconstruction merges
    pub selector: TimeSelector,

    /// Present an empty initial-conditions directory during the parallel segment
    pub stash_initial_conditions: bool,

    /// How the distributed stage is launched
    pub launcher: Launcher,

    /// Decomposition tool
    pub decompose: ToolCommand,

    /// Reconstruction tool
    pub reconstruct: ToolCommand,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        let strategies = ["hierarchical", "ptscotch", "simple"]
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    PathBuf::from(format!("system/decomposeParDict.{}", name)),
                )
            })
            .collect();

        Self {
            strategies,
            decompose_strategy: "hierarchical".to_string(),
            distributed_strategy: "ptscotch".to_string(),
            default_strategy: "simple".to_string(),
            merge_tolerance: 1e-6,
            selector: TimeSelector::default(),
            stash_initial_conditions: false,
            launcher: Launcher::default(),
            decompose: ToolCommand::new("decomposePar", &[]),
            reconstruct: ToolCommand::new("reconstructParMesh", &[]),
        }
    }
}

impl ParallelConfig {
    /// Every strategy the parallel segment touches
    pub fn referenced_strategies(&self) -> [&str; 3] {
        [
            self.decompose_strategy.as_str(),
            self.distributed_strategy.as_str(),
            self.default_strategy.as_str(),
        ]
    }
}

/// An external tool invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Result-set selector passed to the reconstruction tool
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeSelector {
    /// Most recent result set
    #[default]
    LatestTime,
    /// Every result set
    All,
    /// A specific time directory
    Time { value: String },
}

impl TimeSelector {
    /// Command-line flags for this selector
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::LatestTime => vec!["-latestTime".to_string()],
            Self::All => vec![],
            Self::Time { value } => vec!["-time".to_string(), value.clone()],
        }
    }
}

/// Launch facility for distributed stages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Launcher {
    /// One `mpirun -np N` invocation covering every partition
    Mpi {
        #[serde(default = "default_mpi_program")]
        program: String,
        #[serde(default)]
        flags: Vec<String>,
    },
    /// One process per partition, joined at a barrier
    Independent,
}

fn default_mpi_program() -> String {
    "mpirun".to_string()
}

impl Default for Launcher {
    fn default() -> Self {
        Self::Mpi {
            program: default_mpi_program(),
            flags: vec![],
        }
    }
}
