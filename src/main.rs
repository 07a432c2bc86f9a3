// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! meshflow - Mesh-Generation Stage Pipeline Orchestrator
//!
//! Run mesh-generation tools as an ordered pipeline of stages.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshflow::cli::{Cli, Commands};
use meshflow::workspace::CleanOptions;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Init {
            name,
            parallel,
            force,
        } => meshflow::cli::init::run(name, parallel, force, cli.verbose).await,
        Commands::Run {
            pipeline,
            dry_run,
            partitions,
            mode,
            format,
        } => {
            meshflow::cli::run::run(pipeline, dry_run, partitions, mode, format, cli.verbose)
                .await
        }
        Commands::Validate { pipeline } => {
            meshflow::cli::validate::run(pipeline, cli.verbose).await
        }
        Commands::Plan { pipeline, format } => {
            meshflow::cli::plan::run(pipeline, format, cli.verbose).await
        }
        Commands::Clean {
            no_processors,
            no_solutions,
            no_logs,
            no_post_processing,
            no_images,
        } => {
            let options = CleanOptions {
                processors: !no_processors,
                solutions: !no_solutions,
                logs: !no_logs,
                post_processing: !no_post_processing,
                images: !no_images,
            };
            meshflow::cli::clean::run(options, cli.verbose).await
        }
    }
}
