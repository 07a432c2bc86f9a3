// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Clean command - remove outputs of previous runs

use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;

use crate::pipeline::WorkspaceLayout;
use crate::utils::print_success;
use crate::workspace::{CleanOptions, WorkspaceManager};

/// Run the clean command
pub async fn run(options: CleanOptions, verbose: bool) -> Result<()> {
    let cwd = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;

    let manager = WorkspaceManager::new(&cwd, WorkspaceLayout::default(), BTreeMap::new());
    let removed = manager.clean(&options)?;

    if removed.is_empty() {
        println!("{}", "Nothing to clean".dimmed());
        return Ok(());
    }

    if verbose {
        for path in &removed {
            let shown = path.strip_prefix(&cwd).unwrap_or(path);
            print_success(&format!("Removed {}", shown.display()));
        }
        println!();
    }

    println!(
        "{}",
        format!(
            "Removed {} item{}",
            removed.len(),
            if removed.len() == 1 { "" } else { "s" }
        )
        .green()
    );
    Ok(())
}
