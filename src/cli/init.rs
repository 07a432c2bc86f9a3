// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Init command - create a pipeline file for a case

use colored::Colorize;
use miette::Result;
use std::path::Path;

use crate::utils::{print_success, print_warning};

/// Default pipeline file name
pub const PIPELINE_FILE: &str = ".meshflow.yaml";

/// Run the init command
pub async fn run(name: Option<String>, parallel: bool, force: bool, verbose: bool) -> Result<()> {
    let case_name = name.unwrap_or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.file_name().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| "case".to_string())
    });

    println!("{}", "Initializing meshflow pipeline...".bold());
    println!();

    if Path::new(PIPELINE_FILE).exists() {
        if !force {
            return Err(miette::miette!(
                "{} already exists. Use --force to overwrite.",
                PIPELINE_FILE
            ));
        }
        print_warning(&format!("Overwriting existing {}", PIPELINE_FILE));
    }

    let pipeline_content = if parallel {
        generate_parallel_template(&case_name)
    } else {
        generate_serial_template(&case_name)
    };

    std::fs::write(PIPELINE_FILE, &pipeline_content).map_err(|e| {
        miette::miette!("Failed to write {}: {}", PIPELINE_FILE, e)
    })?;

    print_success(&format!("Created {}", PIPELINE_FILE));

    println!();
    println!("{}", "Pipeline initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to match your case", PIPELINE_FILE.cyan());
    if parallel {
        println!(
            "  2. Provide {} for each strategy",
            "system/decomposeParDict.<strategy>".cyan()
        );
        println!("  3. Run {} to build the mesh", "meshflow run".cyan());
    } else {
        println!("  2. Run {} to build the mesh", "meshflow run".cyan());
    }
    println!();

    if verbose {
        println!("{}", "Generated pipeline:".dimmed());
        println!("{}", "─".repeat(50).dimmed());
        println!("{}", pipeline_content.dimmed());
    }

    Ok(())
}

const STAGES: &str = r#"stages:
  - name: "base-mesh"
    description: "Background hex mesh"
    command: blockMesh

  - name: "features"
    description: "Extract feature edges from the surface geometry"
    command: surfaceFeatureExtract

  - name: "castellate"
    description: "Castellate, snap and add layers"
    command: snappyHexMesh
    args: ["-overwrite"]
    parallel: true

  - name: "extrude"
    command: extrudeMesh

  - name: "patch"
    command: createPatch
    args: ["-overwrite"]

  - name: "check"
    description: "Mesh quality check"
    command: checkMesh
    quality_check: true
"#;

fn generate_serial_template(name: &str) -> String {
    format!(
        r#"# meshflow pipeline - serial
version: "1"
name: "{name}"

{STAGES}"#
    )
}

fn generate_parallel_template(name: &str) -> String {
    format!(
        r#"# meshflow pipeline - decomposed castellation
version: "1"
name: "{name}"
mode: parallel
partitions: 4

parallel:
  strategies:
    hierarchical: system/decomposeParDict.hierarchical
    ptscotch: system/decomposeParDict.ptscotch
    simple: system/decomposeParDict.simple
  decompose_strategy: hierarchical
  distributed_strategy: ptscotch
  default_strategy: simple
  merge_tolerance: 1.0e-6
  selector:
    type: latest_time
  stash_initial_conditions: true
  launcher:
    type: mpi
    program: mpirun

{STAGES}"#
    )
}
