// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! # meshflow - Mesh-Generation Stage Pipeline Orchestrator
//!
//! `meshflow` runs external meshing tools as an ordered pipeline of stages,
//! managing the case directory between them.
//!
//! ## Features
//!
//! - **Ordered stages** - each stage starts only after its predecessor succeeded
//! - **Parallel segment** - decompose, run across partitions, reconstruct
//! - **Workspace hygiene** - reset mesh state, archive one log per stage
//! - **Guaranteed cleanup** - default strategy and initial conditions restored on every exit path
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a pipeline for the current case
//! meshflow init
//!
//! # Show what a run would do
//! meshflow plan
//!
//! # Run it
//! meshflow run
//! ```

pub mod cli;
pub mod errors;
pub mod executors;
pub mod pipeline;
pub mod utils;
pub mod workspace;

// Re-export commonly used types
pub use errors::{MeshflowError, MeshflowResult};
pub use pipeline::{Pipeline, PipelineOrchestrator, PipelineState, Stage};
pub use workspace::WorkspaceManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
