// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Pipeline definitions and orchestration
//!
//! This module defines the pipeline schema (stages, actions, workspace layout,
//! parallel settings), its validation, the execution plan, and the
//! orchestrator state machine that runs it.

mod definition;
mod orchestrator;
mod plan;
mod state;
mod validation;

pub use definition::*;
pub use orchestrator::{ExecutionOptions, PipelineOrchestrator, RunReport, StepRecord};
pub use plan::{ExecutionPlan, PlanStep, StepKind};
pub use state::PipelineState;
pub use validation::{PipelineValidator, ValidationResult};
