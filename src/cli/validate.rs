// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Validate command - check a pipeline against the case it will run in
//!
//! Reports what a run would touch: the archived log of every stage, the
//! strategy files behind the strategy slot and the expanded parallel segment.

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::errors::{MeshflowError, RecoverySuggestion};
use crate::pipeline::{ExecutionPlan, Pipeline, PipelineValidator, StageAction};
use crate::workspace::normalize_log_name;

/// Run the validate command
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    let pipeline = match Pipeline::from_file(&pipeline_path) {
        Ok(p) => p,
        Err(e) => {
            if let Some(suggestion) = RecoverySuggestion::for_error(&e) {
                eprintln!("{}", suggestion);
            }
            return Err(e.into());
        }
    };

    let root = std::env::current_dir()
        .map_err(|e| MeshflowError::workspace("read current directory", ".", e))?;
    let validation = PipelineValidator::validate(&pipeline)?;
    let missing_files = PipelineValidator::validate_files(&pipeline, &root)?;

    println!(
        "{} {} ({}, {})",
        "Pipeline".bold(),
        pipeline.name,
        pipeline_path.display(),
        pipeline.mode
    );
    if verbose {
        if let Some(description) = &pipeline.description {
            println!("  {}", description.dimmed());
        }
    }

    print_stages(&pipeline);

    if pipeline.is_parallel() {
        print_strategies(&pipeline, &root);
        print_parallel_segments(&pipeline);
    }

    if verbose {
        print_layout(&pipeline);
    }

    let problems = validation.errors.len() + missing_files.len();
    if problems > 0 || validation.has_warnings() {
        println!();
        for error in validation.errors.iter().chain(&missing_files) {
            println!("  {} {}", "✗".red(), error);
        }
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    println!();
    if problems > 0 {
        return Err(MeshflowError::InvalidPipeline {
            reason: format!("{} problem{} found", problems, plural(problems)),
            help: Some("Fix the entries marked ✗ and validate again".into()),
        }
        .into());
    }

    let warnings = validation.warnings.len();
    if warnings > 0 {
        println!(
            "{}",
            format!("Pipeline is valid, with {} warning{}", warnings, plural(warnings))
                .yellow()
                .bold()
        );
    } else {
        println!("{}", "Pipeline is valid".green().bold());
    }
    Ok(())
}

/// One line per stage: command, archived log and how it runs
fn print_stages(pipeline: &Pipeline) {
    let log_dir = &pipeline.workspace.log_dir;

    println!();
    println!("{}:", "Stages".bold());
    for (index, stage) in pipeline.stages.iter().enumerate() {
        let log = log_dir.join(normalize_log_name(&stage.archive_name()));
        let tag = if pipeline.runs_distributed(stage) {
            format!(" [decomposed × {}]", pipeline.partitions)
        } else if stage.quality_check {
            " [quality check]".to_string()
        } else {
            String::new()
        };

        println!(
            "  {}. {:<16} {}{}",
            index + 1,
            stage.name,
            stage.command_line(),
            tag.cyan()
        );
        println!("     {} {}", "log →".dimmed(), log.display());
    }
}

/// Declared strategies, what each is used for, and whether its file exists
fn print_strategies(pipeline: &Pipeline, root: &Path) {
    println!();
    println!(
        "{} (slot: {}):",
        "Strategies".bold(),
        pipeline.workspace.strategy_slot.display()
    );

    for (name, file) in &pipeline.parallel.strategies {
        let roles = strategy_roles(pipeline, name);
        let present = root.join(file).is_file();
        let mark = match (present, roles.is_empty()) {
            (true, _) => "✓".green(),
            (false, true) => "-".dimmed(),
            (false, false) => "✗".red(),
        };
        let roles = if roles.is_empty() {
            "unused".to_string()
        } else {
            roles.join(", ")
        };

        println!(
            "  {} {:<14} {} {}",
            mark,
            name,
            file.display(),
            format!("({})", roles).dimmed()
        );
    }
}

/// Expanded decompose/distribute/reconstruct steps of each distributed stage
fn print_parallel_segments(pipeline: &Pipeline) {
    let plan = ExecutionPlan::from_pipeline(pipeline);

    for (index, stage) in pipeline.stages.iter().enumerate() {
        if !pipeline.runs_distributed(stage) {
            continue;
        }

        println!();
        println!("{} '{}':", "Parallel segment of".bold(), stage.name);
        if pipeline.parallel.stash_initial_conditions {
            println!(
                "  {} {} is replaced by an empty directory until reconstruction ends",
                "·".dimmed(),
                pipeline.workspace.initial_conditions.display()
            );
        }
        for step in plan.steps.iter().filter(|s| s.stage_index == index) {
            println!(
                "  {} {:<12} {}",
                "·".dimmed(),
                step.kind.to_string(),
                step.detail
            );
        }
        println!(
            "  {} {:<12} swap strategy → {}",
            "·".dimmed(),
            "after run",
            pipeline.parallel.default_strategy
        );
    }
}

fn print_layout(pipeline: &Pipeline) {
    let layout = &pipeline.workspace;

    println!();
    println!("{}:", "Case layout".bold());
    println!(
        "  mesh directory   {} (keeps {})",
        layout.mesh_dir.display(),
        layout.preserve.join(", ")
    );
    println!("  removed on reset {}", layout.stale.join(" "));
    println!("  log directory    {}", layout.log_dir.display());
    println!("  initial values   {}", layout.initial_conditions.display());
}

/// What the run uses a strategy for
fn strategy_roles(pipeline: &Pipeline, name: &str) -> Vec<&'static str> {
    let parallel = &pipeline.parallel;
    let mut roles = Vec::new();

    if parallel.decompose_strategy == name {
        roles.push("decompose");
    }
    if parallel.distributed_strategy == name {
        roles.push("distributed run");
    }
    if parallel.default_strategy == name {
        roles.push("default");
    }

    let in_action = pipeline
        .stages
        .iter()
        .flat_map(|s| s.pre.iter().chain(&s.post))
        .any(|a| matches!(a, StageAction::SwapStrategy { strategy } if strategy == name));
    if in_action {
        roles.push("stage action");
    }

    roles
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_roles() {
        let pipeline = Pipeline::from_yaml(
            r#"
name: roles
mode: parallel
partitions: 2
parallel:
  strategies:
    hierarchical: system/decomposeParDict.hierarchical
    ptscotch: system/decomposeParDict.ptscotch
    simple: system/decomposeParDict.simple
    manual: system/decomposeParDict.manual
  decompose_strategy: hierarchical
  distributed_strategy: ptscotch
  default_strategy: hierarchical
stages:
  - name: castellate
    command: snappyHexMesh
    parallel: true
    post:
      - action: swap_strategy
        strategy: simple
"#,
        )
        .unwrap();

        assert_eq!(
            strategy_roles(&pipeline, "hierarchical"),
            vec!["decompose", "default"]
        );
        assert_eq!(strategy_roles(&pipeline, "ptscotch"), vec!["distributed run"]);
        assert_eq!(strategy_roles(&pipeline, "simple"), vec!["stage action"]);
        assert!(strategy_roles(&pipeline, "manual").is_empty());
    }
}
