// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for meshflow.

pub mod clean;
pub mod init;
pub mod plan;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::PipelineMode;

/// Mesh-generation pipeline orchestrator
///
/// Run mesh-generation tools as an ordered pipeline of stages.
#[derive(Parser, Debug)]
#[clap(
    name = "meshflow",
    version,
    about = "Mesh-generation stage pipeline orchestrator",
    long_about = None,
    after_help = "Examples:\n\
        meshflow init                     Create a serial snappyHexMesh pipeline\n\
        meshflow init --parallel          Create the decomposed variant\n\
        meshflow run                      Reset the case and run every stage\n\
        meshflow run --partitions 8       Override the partition count\n\
        meshflow clean --no-logs          Remove run outputs but keep logs\n\n\
        See 'meshflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a pipeline file for the current case
    Init {
        /// Pipeline name (defaults to current directory name)
        name: Option<String>,

        /// Generate the decomposed (parallel) variant
        #[clap(long)]
        parallel: bool,

        /// Overwrite an existing pipeline file
        #[clap(short, long)]
        force: bool,
    },

    /// Reset the case and run the pipeline
    Run {
        /// Pipeline file
        #[clap(short, long, default_value = ".meshflow.yaml")]
        pipeline: PathBuf,

        /// Dry run (show what would be done)
        #[clap(long)]
        dry_run: bool,

        /// Override the partition count
        #[clap(short = 'n', long)]
        partitions: Option<usize>,

        /// Override the execution mode (serial, parallel)
        #[clap(short, long)]
        mode: Option<PipelineMode>,

        /// Output format (text, json)
        #[clap(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = ".meshflow.yaml")]
        pipeline: PathBuf,
    },

    /// Show the execution plan
    Plan {
        /// Pipeline file
        #[clap(default_value = ".meshflow.yaml")]
        pipeline: PathBuf,

        /// Output format (text, json)
        #[clap(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove outputs of previous runs from the case
    Clean {
        /// Keep partition directories
        #[clap(long)]
        no_processors: bool,

        /// Keep solution time directories
        #[clap(long)]
        no_solutions: bool,

        /// Keep log files
        #[clap(long)]
        no_logs: bool,

        /// Keep post-processing data
        #[clap(long)]
        no_post_processing: bool,

        /// Keep rendered images
        #[clap(long)]
        no_images: bool,
    },
}

/// Output format for run and plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}
