// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Case cleaning
//!
//! Removes the outputs of previous runs: partitions, solution time
//! directories, logs, post-processing data and rendered images.

use std::path::PathBuf;

use super::{remove_path, WorkspaceManager};
use crate::errors::{MeshflowError, MeshflowResult};

/// Which categories of run output to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanOptions {
    pub processors: bool,
    pub solutions: bool,
    pub logs: bool,
    pub post_processing: bool,
    pub images: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            processors: true,
            solutions: true,
            logs: true,
            post_processing: true,
            images: true,
        }
    }
}

impl WorkspaceManager {
    /// Remove run outputs selected by `options`; returns the removed paths
    pub fn clean(&self, options: &CleanOptions) -> MeshflowResult<Vec<PathBuf>> {
        let mut targets = Vec::new();

        if options.processors {
            targets.extend(self.glob("processor*")?);
        }
        if options.solutions {
            targets.extend(self.time_directories()?);
        }
        if options.logs {
            targets.extend(self.glob("*log*")?);
        }
        if options.post_processing {
            targets.extend(self.glob("postProcessing")?);
        }
        if options.images {
            targets.extend(self.glob("images")?);
        }

        let mut removed = Vec::new();
        for target in targets {
            if remove_path(&target)? {
                tracing::debug!(path = %target.display(), "removed");
                removed.push(target);
            }
        }

        Ok(removed)
    }

    /// Solution directories named after a nonzero time value
    fn time_directories(&self) -> MeshflowResult<Vec<PathBuf>> {
        let root = self.root();
        let entries =
            std::fs::read_dir(root).map_err(|e| MeshflowError::workspace("list", root, e))?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MeshflowError::workspace("list", root, e))?;
            let path = entry.path();
            let is_time = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<f64>().ok())
                .is_some_and(|t| t.is_finite() && t > 0.0);

            if is_time && path.is_dir() {
                dirs.push(path);
            }
        }

        dirs.sort();
        Ok(dirs)
    }
}
