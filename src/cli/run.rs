// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Run command - reset the case and execute the pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::OutputFormat;
use crate::errors::{MeshflowError, RecoverySuggestion};
use crate::pipeline::{
    ExecutionOptions, Pipeline, PipelineMode, PipelineOrchestrator, PipelineValidator,
};

/// Run the pipeline
pub async fn run(
    pipeline_path: PathBuf,
    dry_run: bool,
    partitions: Option<usize>,
    mode: Option<PipelineMode>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    // Load pipeline
    let mut pipeline = match Pipeline::from_file(&pipeline_path) {
        Ok(p) => p,
        Err(e) => {
            if let Some(suggestion) = RecoverySuggestion::for_error(&e) {
                eprintln!("{}", suggestion);
            }
            return Err(e.into());
        }
    };

    if let Some(mode) = mode {
        pipeline.mode = mode;
    }
    if let Some(partitions) = partitions {
        pipeline.partitions = partitions;
    }

    // Validate pipeline
    let validation = PipelineValidator::validate(&pipeline)?;

    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(MeshflowError::InvalidPipeline {
            reason: format!(
                "{} problem{} found",
                validation.errors.len(),
                if validation.errors.len() == 1 { "" } else { "s" }
            ),
            help: Some(format!(
                "Run 'meshflow validate {}' for details",
                pipeline_path.display()
            )),
        }
        .into());
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let working_dir = std::env::current_dir().map_err(|e| {
        miette::miette!("Failed to get current directory: {}", e)
    })?;

    let missing_files = PipelineValidator::validate_files(&pipeline, &working_dir)?;
    if !missing_files.is_empty() {
        eprintln!("{}", "Missing files:".red().bold());
        for missing in &missing_files {
            eprintln!("  {} {}", "✗".red(), missing);
        }
        return Err(miette::miette!("Pipeline references files that do not exist"));
    }

    let mut orchestrator = PipelineOrchestrator::with_defaults(pipeline, &working_dir);

    if dry_run {
        let plan = orchestrator.plan();
        match format {
            OutputFormat::Text => {
                print!("{}", plan.to_text(orchestrator.pipeline()));
                println!();
                println!("{}", "Dry run - nothing was executed".dimmed());
            }
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&plan).map_err(MeshflowError::from)?;
                println!("{}", json);
            }
        }
        return Ok(());
    }

    // Check required tools are available
    let missing_tools = orchestrator.check_tools();
    if let Some(first) = missing_tools.first() {
        eprintln!("{}", "Missing required tools:".red().bold());
        for tool in &missing_tools {
            eprintln!("  {} {}", "✗".red(), tool);
        }
        let err = MeshflowError::tool_not_found(first);
        if let Some(suggestion) = RecoverySuggestion::for_error(&err) {
            eprintln!();
            eprintln!("{}", suggestion);
        }
        return Err(err.into());
    }

    let text = format == OutputFormat::Text;
    if text {
        let pipeline = orchestrator.pipeline();
        println!("{}: {}", "Running pipeline".bold(), pipeline.name);
        if pipeline.is_parallel() {
            println!("Mode: parallel ({} partitions)", pipeline.partitions);
        }
        println!();
    }

    let options = ExecutionOptions {
        progress: text,
        verbose,
    };
    let mut report = orchestrator.run(&options).await;

    match format {
        OutputFormat::Text => {
            if !report.logs.is_empty() {
                println!();
                println!("{}:", "Logs".bold());
                for log in &report.logs {
                    let shown = log.strip_prefix(&working_dir).unwrap_or(log);
                    println!("  - {}", shown.display());
                }
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).map_err(MeshflowError::from)?;
            println!("{}", json);
        }
    }

    if let Some(failure) = report.take_failure() {
        if text {
            let failed_stage = failure
                .stage()
                .and_then(|name| orchestrator.pipeline().get_stage(name));
            if let Some(stage) = failed_stage {
                eprintln!();
                eprintln!("{} {}", "Failed command:".bold(), stage.command_line());
            }
            if let Some(suggestion) = RecoverySuggestion::for_error(&failure) {
                eprintln!();
                eprintln!("{}", suggestion);
            }
        }
        return Err(failure.into());
    }

    Ok(())
}
