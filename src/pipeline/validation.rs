// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Pipeline validation
//!
//! Validates pipeline configuration before execution.

use std::collections::HashSet;
use std::path::Path;

use crate::errors::MeshflowError;
use crate::pipeline::{Pipeline, Stage, StageAction};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline configuration
    pub fn validate(pipeline: &Pipeline) -> Result<ValidationResult, MeshflowError> {
        let mut result = ValidationResult::new();

        // Check for empty stages
        if pipeline.stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        // Check for duplicate stage names
        let mut seen_names = HashSet::new();
        for stage in &pipeline.stages {
            if !seen_names.insert(&stage.name) {
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
        }

        // Two stages archiving to the same name would overwrite each other
        let mut seen_logs = HashSet::new();
        for stage in &pipeline.stages {
            let archive = crate::workspace::normalize_log_name(&stage.archive_name());
            if !seen_logs.insert(archive.clone()) {
                result.add_error(&format!(
                    "Stage '{}': Log name '{}' is already used by an earlier stage",
                    stage.name, archive
                ));
            }
        }

        // A quality check only makes sense once the mesh is complete
        if let Some(position) = pipeline.stages.iter().position(|s| s.quality_check) {
            if position + 1 != pipeline.stages.len() {
                result.add_error(&format!(
                    "Stage '{}': Quality check must be the last stage",
                    pipeline.stages[position].name
                ));
            }
        }

        Self::validate_parallel(pipeline, &mut result);

        // Validate each stage
        for stage in &pipeline.stages {
            Self::validate_stage(stage, pipeline, &mut result);
        }

        Ok(result)
    }

    /// Validate mode, partition count and strategy references
    fn validate_parallel(pipeline: &Pipeline, result: &mut ValidationResult) {
        let parallel = &pipeline.parallel;

        if pipeline.partitions == 0 {
            result.add_error("Partition count must be at least 1");
        }

        if !pipeline.is_parallel() {
            if pipeline.partitions > 1 {
                result.add_warning(&format!(
                    "Pipeline runs in serial mode; partitions = {} is ignored",
                    pipeline.partitions
                ));
            }
            return;
        }

        if !pipeline.stages.iter().any(|s| s.parallel) {
            result.add_warning(
                "Pipeline runs in parallel mode but no stage is marked parallel",
            );
        }

        if pipeline.partitions == 1 {
            result.add_warning(
                "Parallel mode with a single partition still decomposes and reconstructs",
            );
        }

        for strategy in parallel.referenced_strategies() {
            if !parallel.strategies.contains_key(strategy) {
                result.add_error(&format!(
                    "Strategy '{}' is used but not declared under parallel.strategies",
                    strategy
                ));
            }
        }

        if !(parallel.merge_tolerance > 0.0 && parallel.merge_tolerance.is_finite()) {
            result.add_error(&format!(
                "Merge tolerance must be a positive number, got {}",
                parallel.merge_tolerance
            ));
        }
    }

    /// Validate a single stage
    fn validate_stage(stage: &Stage, pipeline: &Pipeline, result: &mut ValidationResult) {
        if stage.name.trim().is_empty() {
            result.add_error("Stage with an empty name");
        }

        // The name becomes the file name of the stage's running log
        if stage.name.contains(['/', '\\']) || stage.name.contains("..") {
            result.add_error(&format!(
                "Stage '{}': Name must not contain path separators or '..'",
                stage.name
            ));
        }

        if stage.command.trim().is_empty() {
            result.add_error(&format!("Stage '{}': Command is empty", stage.name));
        }

        if stage.parallel && stage.quality_check {
            result.add_error(&format!(
                "Stage '{}': A quality check cannot run in parallel",
                stage.name
            ));
        }

        for action in stage.pre.iter().chain(&stage.post) {
            match action {
                StageAction::SwapStrategy { strategy } => {
                    if !pipeline.parallel.strategies.contains_key(strategy) {
                        result.add_error(&format!(
                            "Stage '{}': Unknown strategy '{}' in swap_strategy action",
                            stage.name, strategy
                        ));
                    }
                }
                StageAction::Remove { paths } => {
                    if paths.is_empty() {
                        result.add_warning(&format!(
                            "Stage '{}': remove action without paths does nothing",
                            stage.name
                        ));
                    }
                    for pattern in paths {
                        if let Err(e) = glob::Pattern::new(pattern) {
                            result.add_error(&format!(
                                "Stage '{}': Invalid pattern '{}': {}",
                                stage.name, pattern, e
                            ));
                        }
                    }
                }
                StageAction::Move { .. } => {}
            }
        }
    }

    /// Check that required files exist (runtime validation)
    pub fn validate_files(pipeline: &Pipeline, base_path: &Path) -> Result<Vec<String>, MeshflowError> {
        let mut missing = Vec::new();

        let mut strategies: Vec<&str> = Vec::new();
        if pipeline.is_parallel() {
            strategies.extend(pipeline.parallel.referenced_strategies());
        }
        for stage in &pipeline.stages {
            for action in stage.pre.iter().chain(&stage.post) {
                if let StageAction::SwapStrategy { strategy } = action {
                    strategies.push(strategy);
                }
            }
        }
        strategies.sort_unstable();
        strategies.dedup();

        for strategy in strategies {
            if let Some(file) = pipeline.parallel.strategies.get(strategy) {
                if !base_path.join(file).exists() {
                    missing.push(format!(
                        "Strategy '{}': File not found: {}",
                        strategy,
                        file.display()
                    ));
                }
            }
        }

        Ok(missing)
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> Pipeline {
        Pipeline::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let result = PipelineValidator::validate(&parse("name: empty\nstages: []")).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no stages"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let pipeline = parse(
            r#"
name: dup
stages:
  - name: mesh
    command: blockMesh
  - name: mesh
    command: snappyHexMesh
"#,
        );

        let result = PipelineValidator::validate(&pipeline).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn test_validate_colliding_log_names() {
        let pipeline = parse(
            r#"
name: logs
stages:
  - name: castellate
    command: snappyHexMesh
    log: snappyHexMesh
  - name: snap
    command: snappyHexMesh
    log: snappyHexMesh
"#,
        );

        let result = PipelineValidator::validate(&pipeline).unwrap();
        assert!(result.errors.iter().any(|e| e.contains("already used")));
    }

    #[test]
    fn test_stage_name_cannot_be_a_path() {
        let pipeline = parse(
            r#"
name: paths
stages:
  - name: a/b
    command: blockMesh
  - name: ..
    command: checkMesh
  - name: base-mesh.v2
    command: blockMesh
"#,
        );

        let result = PipelineValidator::validate(&pipeline).unwrap();
        let rejected: Vec<&String> = result
            .errors
            .iter()
            .filter(|e| e.contains("path separators"))
            .collect();
        assert_eq!(rejected.len(), 2);
        assert!(rejected[0].contains("'a/b'"));
        assert!(rejected[1].contains("'..'"));
    }

    #[test]
    fn test_quality_check_must_be_last() {
        let pipeline = parse(
            r#"
name: order
stages:
  - name: check
    command: checkMesh
    quality_check: true
  - name: extrude
    command: extrudeMesh
"#,
        );

        let result = PipelineValidator::validate(&pipeline).unwrap();
        assert!(result.errors.iter().any(|e| e.contains("last stage")));
    }

    #[test]
    fn test_parallel_checks() {
        let pipeline = parse(
            r#"
name: parallel
mode: parallel
partitions: 1
stages:
  - name: base-mesh
    command: blockMesh
parallel:
  default_strategy: metis
  merge_tolerance: 0
"#,
        );

        let result = PipelineValidator::validate(&pipeline).unwrap();
        assert!(result.errors.iter().any(|e| e.contains("'metis'")));
        assert!(result.errors.iter().any(|e| e.contains("Merge tolerance")));
        assert!(result.warnings.iter().any(|w| w.contains("no stage is marked parallel")));
        assert!(result.warnings.iter().any(|w| w.contains("single partition")));
    }

    #[test]
    fn test_serial_partitions_warning() {
        let pipeline = parse(
            r#"
name: serial
partitions: 8
stages:
  - name: base-mesh
    command: blockMesh
"#,
        );

        let result = PipelineValidator::validate(&pipeline).unwrap();
        assert!(result.is_valid());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_unknown_strategy_in_action() {
        let pipeline = parse(
            r#"
name: actions
stages:
  - name: base-mesh
    command: blockMesh
    post:
      - action: swap_strategy
        strategy: scotch
"#,
        );

        let result = PipelineValidator::validate(&pipeline).unwrap();
        assert!(result.errors.iter().any(|e| e.contains("'scotch'")));
    }

    #[test]
    fn test_validate_files_reports_missing_strategies() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("system")).unwrap();
        std::fs::write(
            temp_dir.path().join("system/decomposeParDict.simple"),
            "method simple;",
        )
        .unwrap();

        let pipeline = parse(
            r#"
name: files
mode: parallel
partitions: 2
stages:
  - name: castellate
    command: snappyHexMesh
    parallel: true
"#,
        );

        let missing = PipelineValidator::validate_files(&pipeline, temp_dir.path()).unwrap();
        assert_eq!(missing.len(), 2);
        assert!(missing.iter().any(|m| m.contains("hierarchical")));
        assert!(missing.iter().any(|m| m.contains("ptscotch")));
    }
}
