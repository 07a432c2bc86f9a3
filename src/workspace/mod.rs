// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Workspace state manager
//!
//! The only component allowed to touch the case directory between stages:
//! resetting mesh state, preparing the log area, archiving logs, swapping the
//! active decomposition strategy, and stashing initial conditions.

mod clean;
mod guard;

pub use clean::CleanOptions;
pub use guard::InitialConditionsGuard;

use regex::Regex;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::errors::{MeshflowError, MeshflowResult};
use crate::pipeline::{StageAction, WorkspaceLayout};

/// Suffix given to the initial-conditions directory while it is stashed
pub const STASH_SUFFIX: &str = "meshflow-stash";

/// Manager for one case directory
#[derive(Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    layout: WorkspaceLayout,
    strategies: BTreeMap<String, PathBuf>,
    active_strategy: Option<String>,
    log_area: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager for the case rooted at `root`
    pub fn new(root: &Path, layout: WorkspaceLayout, strategies: BTreeMap<String, PathBuf>) -> Self {
        let log_area = root.join(&layout.log_dir);
        Self {
            root: root.to_path_buf(),
            layout,
            strategies,
            active_strategy: None,
            log_area,
        }
    }

    /// Case root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Case directory layout
    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Directory receiving archived logs
    pub fn log_area(&self) -> &Path {
        &self.log_area
    }

    /// Strategy most recently copied into the strategy slot
    pub fn active_strategy(&self) -> Option<&str> {
        self.active_strategy.as_deref()
    }

    /// Delete mesh state and stale derived artifacts
    ///
    /// Every file under the mesh directory is removed except those named in
    /// `preserve`. Missing files are not an error; anything else is.
    /// Returns the removed paths.
    pub fn reset(&self, preserve: &[String]) -> MeshflowResult<Vec<PathBuf>> {
        let mut removed = Vec::new();

        let mesh_dir = self.root.join(&self.layout.mesh_dir);
        let mesh_files = format!("{}/**/*", glob::Pattern::escape(&mesh_dir.to_string_lossy()));
        for path in self.matches(&mesh_files)? {
            if path.is_dir() {
                continue;
            }

            let keep = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| preserve.iter().any(|p| p == name));
            if keep {
                continue;
            }

            if remove_path(&path)? {
                removed.push(path);
            }
        }

        for pattern in &self.layout.stale {
            for path in self.glob(pattern)? {
                if remove_path(&path)? {
                    removed.push(path);
                }
            }
        }

        tracing::info!(
            root = %self.root.display(),
            removed = removed.len(),
            "workspace reset"
        );
        Ok(removed)
    }

    /// Create a fresh, empty log directory, removing any previous one
    pub fn prepare_log_area(&mut self, name: &Path) -> MeshflowResult<PathBuf> {
        let dir = self.root.join(name);
        remove_path(&dir)?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| MeshflowError::workspace("create log area", &dir, e))?;

        tracing::debug!(dir = %dir.display(), "log area ready");
        self.log_area = dir.clone();
        Ok(dir)
    }

    /// Move a produced log into the log area under a normalized name
    ///
    /// Returns `None` (with a warning) when the stage produced no log.
    pub fn archive(&self, artifact: &Path, destination_name: &str) -> MeshflowResult<Option<PathBuf>> {
        if !artifact.exists() {
            tracing::warn!(
                artifact = %artifact.display(),
                "log artifact missing, nothing to archive"
            );
            return Ok(None);
        }

        std::fs::create_dir_all(&self.log_area)
            .map_err(|e| MeshflowError::workspace("create log area", &self.log_area, e))?;

        let destination = self.log_area.join(normalize_log_name(destination_name));
        move_path(artifact, &destination)?;

        tracing::debug!(
            from = %artifact.display(),
            to = %destination.display(),
            "log archived"
        );
        Ok(Some(destination))
    }

    /// Copy a named strategy into the active strategy slot
    pub fn swap_strategy(&mut self, strategy: &str) -> MeshflowResult<()> {
        let source = self
            .strategies
            .get(strategy)
            .map(|p| self.root.join(p))
            .ok_or_else(|| MeshflowError::UnknownStrategy {
                strategy: strategy.to_string(),
            })?;
        let slot = self.root.join(&self.layout.strategy_slot);

        if let Some(parent) = slot.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MeshflowError::workspace("swap strategy", parent, e))?;
        }
        std::fs::copy(&source, &slot)
            .map_err(|e| MeshflowError::workspace("swap strategy", &source, e))?;

        tracing::debug!(
            from = ?self.active_strategy,
            to = strategy,
            "strategy swapped"
        );
        self.active_strategy = Some(strategy.to_string());
        Ok(())
    }

    /// Rename the initial-conditions directory aside and leave an empty one
    ///
    /// The returned guard restores the original directory when released or
    /// dropped, whichever comes first.
    pub fn stash_initial_conditions(&self) -> MeshflowResult<InitialConditionsGuard> {
        let original = self.root.join(&self.layout.initial_conditions);
        let mut stash_name = original
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        stash_name.push(format!(".{}", STASH_SUFFIX));
        let stash = original.with_file_name(stash_name);

        InitialConditionsGuard::acquire(original, stash)
    }

    /// Apply a stage pre/post action
    pub fn apply(&mut self, action: &StageAction) -> MeshflowResult<()> {
        tracing::debug!(%action, "applying action");

        match action {
            StageAction::SwapStrategy { strategy } => self.swap_strategy(strategy),
            StageAction::Remove { paths } => {
                for pattern in paths {
                    for path in self.glob(pattern)? {
                        remove_path(&path)?;
                    }
                }
                Ok(())
            }
            StageAction::Move { from, to } => {
                let from = self.root.join(from);
                if !from.exists() {
                    tracing::warn!(path = %from.display(), "nothing to move");
                    return Ok(());
                }
                let to = self.root.join(to);
                if let Some(parent) = to.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| MeshflowError::workspace("move", parent, e))?;
                }
                move_path(&from, &to)
            }
        }
    }

    /// Expand a glob relative to the case root
    fn glob(&self, pattern: &str) -> MeshflowResult<Vec<PathBuf>> {
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            pattern
        );
        self.matches(&full)
    }

    fn matches(&self, full_pattern: &str) -> MeshflowResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in glob::glob(full_pattern)? {
            let path = entry.map_err(|e| {
                MeshflowError::workspace("list", e.path().to_path_buf(), e.error())
            })?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Reduce a stage-derived name to `[A-Za-z0-9._-]`
pub fn normalize_log_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

    let normalized = invalid.replace_all(name.trim(), "-");
    let normalized = normalized.trim_matches('-');
    if normalized.is_empty() {
        "stage".to_string()
    } else {
        normalized.to_string()
    }
}

/// Remove a file or directory tree; returns whether anything was removed
pub(crate) fn remove_path(path: &Path) -> MeshflowResult<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(MeshflowError::workspace("remove", path, e)),
    };

    let removed = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MeshflowError::workspace("remove", path, e)),
    }
}

/// Rename, replacing an existing destination file
fn move_path(from: &Path, to: &Path) -> MeshflowResult<()> {
    if to.is_dir() {
        remove_path(to)?;
    }
    std::fs::rename(from, to).map_err(|e| MeshflowError::workspace("move", from, e))
}
