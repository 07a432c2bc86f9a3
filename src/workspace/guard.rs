// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Scoped initial-conditions stash

use std::path::{Path, PathBuf};

use super::remove_path;
use crate::errors::{MeshflowError, MeshflowResult};

/// Holds the real initial-conditions directory aside while an empty
/// placeholder takes its place
///
/// Restoration happens exactly once: through [`restore`](Self::restore), or on
/// drop if the guard goes out of scope first (error paths, panics, cancelled
/// futures).
#[derive(Debug)]
pub struct InitialConditionsGuard {
    original: PathBuf,
    stash: PathBuf,
    had_original: bool,
    released: bool,
}

impl InitialConditionsGuard {
    pub(super) fn acquire(original: PathBuf, stash: PathBuf) -> MeshflowResult<Self> {
        if stash.exists() {
            return Err(MeshflowError::workspace(
                "stash initial conditions",
                &stash,
                "a stash from a previous run is still present; move it back by hand",
            ));
        }

        let had_original = original.exists();
        if had_original {
            std::fs::rename(&original, &stash)
                .map_err(|e| MeshflowError::workspace("stash initial conditions", &original, e))?;
        }

        let guard = Self {
            original,
            stash,
            had_original,
            released: false,
        };

        // From here on, drop puts the original back
        std::fs::create_dir_all(&guard.original).map_err(|e| {
            MeshflowError::workspace("create placeholder", &guard.original, e)
        })?;

        tracing::debug!(
            original = %guard.original.display(),
            stash = %guard.stash.display(),
            "initial conditions stashed"
        );
        Ok(guard)
    }

    /// Directory presented to the tools while stashed
    pub fn placeholder(&self) -> &Path {
        &self.original
    }

    /// Put the original directory back
    pub fn restore(mut self) -> MeshflowResult<()> {
        self.release()
    }

    fn release(&mut self) -> MeshflowResult<()> {
        if self.released {
            return Ok(());
        }

        // Whatever the tools wrote into the placeholder is discarded. The stash
        // is moved back even if that fails, and `released` is only set once
        // the original is in place again, so drop retries.
        let cleared = remove_path(&self.original);
        if self.had_original {
            std::fs::rename(&self.stash, &self.original).map_err(|e| {
                MeshflowError::workspace("restore initial conditions", &self.stash, e)
            })?;
            self.released = true;
            if let Err(e) = cleared {
                tracing::warn!(error = %e, "placeholder not cleared before restore");
            }
        } else {
            cleared?;
            self.released = true;
        }

        tracing::debug!(original = %self.original.display(), "initial conditions restored");
        Ok(())
    }
}

impl Drop for InitialConditionsGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::error!(error = %e, "failed to restore initial conditions");
        }
    }
}
