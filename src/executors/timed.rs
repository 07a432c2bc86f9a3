// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 meshflow contributors

//! Timing wrapper for executors

use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;

use super::{ExecutionResult, Invocation, StageExecutor};
use crate::errors::MeshflowError;

/// Records the wall-clock duration of every run of the wrapped executor
pub struct TimedExecutor<E> {
    inner: E,
}

impl<E: StageExecutor> TimedExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: StageExecutor> StageExecutor for TimedExecutor<E> {
    async fn run(
        &self,
        invocation: &Invocation,
        log_path: &Path,
    ) -> Result<ExecutionResult, MeshflowError> {
        let start = Instant::now();
        let mut result = self.inner.run(invocation, log_path).await?;
        let elapsed = start.elapsed();

        tracing::info!(
            stage = %invocation.stage,
            program = %invocation.program,
            exit_code = result.exit_code,
            seconds = elapsed.as_secs_f64(),
            "finished"
        );

        result.duration = Some(elapsed);
        Ok(result)
    }

    fn check_available(&self, program: &str) -> bool {
        self.inner.check_available(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixed(i32);

    #[async_trait]
    impl StageExecutor for Fixed {
        async fn run(
            &self,
            _invocation: &Invocation,
            log_path: &Path,
        ) -> Result<ExecutionResult, MeshflowError> {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(ExecutionResult::new(self.0, log_path.to_path_buf()))
        }

        fn check_available(&self, _program: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_records_duration_without_changing_result() {
        let executor = TimedExecutor::new(Fixed(2));
        let invocation = Invocation::new("check", "checkMesh", vec![], Path::new("."));

        let result = executor
            .run(&invocation, Path::new("log.check"))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 2);
        assert_eq!(result.log_path, PathBuf::from("log.check"));
        assert!(result.duration.unwrap() >= std::time::Duration::from_millis(5));
        assert!(!executor.check_available("checkMesh"));
    }
}
