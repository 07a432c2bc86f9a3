// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Execution plan
//!
//! Expands a pipeline into the flat list of steps a run will perform,
//! including the decompose/distribute/reconstruct segment of parallel stages.

use colored::Colorize;
use serde::Serialize;

use crate::pipeline::{Launcher, Pipeline, StageAction};

/// Kind of work a plan step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Action,
    Run,
    Decompose,
    Distributed,
    Reconstruct,
    Check,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Action => write!(f, "action"),
            Self::Run => write!(f, "run"),
            Self::Decompose => write!(f, "decompose"),
            Self::Distributed => write!(f, "distributed"),
            Self::Reconstruct => write!(f, "reconstruct"),
            Self::Check => write!(f, "check"),
        }
    }
}

/// One step of the plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    /// Index of the owning stage
    pub stage_index: usize,
    /// Name of the owning stage
    pub stage: String,
    pub kind: StepKind,
    /// Command line or action description
    pub detail: String,
}

/// Flattened execution plan of a pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Build the plan for `pipeline`
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let mut steps = Vec::new();
        let parallel = &pipeline.parallel;

        for (index, stage) in pipeline.stages.iter().enumerate() {
            let mut push = |kind: StepKind, detail: String| {
                steps.push(PlanStep {
                    stage_index: index,
                    stage: stage.name.clone(),
                    kind,
                    detail,
                });
            };

            for action in &stage.pre {
                push(StepKind::Action, action.to_string());
            }

            if pipeline.runs_distributed(stage) {
                push(
                    StepKind::Action,
                    StageAction::SwapStrategy {
                        strategy: parallel.decompose_strategy.clone(),
                    }
                    .to_string(),
                );
                push(
                    StepKind::Decompose,
                    command_line(&parallel.decompose.command, &parallel.decompose.args),
                );
                push(
                    StepKind::Action,
                    StageAction::SwapStrategy {
                        strategy: parallel.distributed_strategy.clone(),
                    }
                    .to_string(),
                );

                let distributed = match &parallel.launcher {
                    Launcher::Mpi { program, flags } => {
                        let mut args = flags.clone();
                        args.push("-np".into());
                        args.push(pipeline.partitions.to_string());
                        args.push(stage.command_line());
                        args.push("-parallel".into());
                        command_line(program, &args)
                    }
                    Launcher::Independent => {
                        format!("{} (× {} partitions)", stage.command_line(), pipeline.partitions)
                    }
                };
                push(StepKind::Distributed, distributed);

                let mut args = parallel.reconstruct.args.clone();
                args.push("-mergeTol".into());
                args.push(format!("{:e}", parallel.merge_tolerance));
                args.extend(parallel.selector.to_args());
                push(
                    StepKind::Reconstruct,
                    command_line(&parallel.reconstruct.command, &args),
                );
            } else if stage.quality_check {
                push(StepKind::Check, stage.command_line());
            } else {
                push(StepKind::Run, stage.command_line());
            }

            for action in &stage.post {
                push(StepKind::Action, action.to_string());
            }
        }

        Self { steps }
    }

    /// Render the plan the way `meshflow plan` prints it
    pub fn to_text(&self, pipeline: &Pipeline) -> String {
        let mut out = String::new();

        out.push_str(&format!("{}: {}\n", "Pipeline".bold(), pipeline.name));
        out.push_str(&format!("{}\n", "═".repeat(50)));
        out.push_str(&format!(
            "Mode: {}{}\n",
            pipeline.mode,
            if pipeline.is_parallel() {
                format!(" ({} partitions)", pipeline.partitions)
            } else {
                String::new()
            }
        ));
        out.push_str(&format!(
            "Execution plan ({} stage{}):\n\n",
            pipeline.stages.len(),
            if pipeline.stages.len() == 1 { "" } else { "s" }
        ));

        let mut current = None;
        for step in &self.steps {
            if current != Some(step.stage_index) {
                current = Some(step.stage_index);
                out.push_str(&format!("  {}. {}\n", step.stage_index + 1, step.stage.bold()));
            }
            out.push_str(&format!(
                "       {} {}\n",
                format!("[{}]", step.kind).dimmed(),
                step.detail
            ));
        }

        out
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
