// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Plan command - show the steps a run would perform

use miette::Result;
use std::path::PathBuf;

use super::OutputFormat;
use crate::errors::MeshflowError;
use crate::pipeline::{ExecutionPlan, Pipeline};

/// Run the plan command
pub async fn run(pipeline_path: PathBuf, format: OutputFormat, verbose: bool) -> Result<()> {
    let pipeline = Pipeline::from_file(&pipeline_path)?;
    let plan = ExecutionPlan::from_pipeline(&pipeline);

    match format {
        OutputFormat::Text => {
            print!("{}", plan.to_text(&pipeline));

            if verbose {
                if let Some(description) = &pipeline.description {
                    println!();
                    println!("{}", description);
                }
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&plan).map_err(MeshflowError::from)?;
            println!("{}", json);
        }
    }

    Ok(())
}
