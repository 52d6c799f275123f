//! Concurrent stage execution.
//!
//! Fans out one tokio task per bound callback, cancels the shared scope on the
//! first failure, joins every task and aggregates all failures.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::context::StageScope;
use crate::errors::{ContainerError, ContainerResult, StageErrors, StageFailure};
use crate::metrics::{StageMetrics, TaskMetrics};
use crate::registry::{BoundTask, Coordinate};

struct TaskReport {
    index: usize,
    coordinate: Coordinate,
    duration_ms: u128,
    result: Result<(), Arc<StageFailure>>,
}

enum TaskOutcome {
    Finished(TaskReport),
    Panicked(Box<dyn Any + Send + 'static>),
}

/// Stage executor.
///
/// Stateless: everything a run needs is passed to [`StageExecutor::execute`].
pub(crate) struct StageExecutor;

impl StageExecutor {
    /// Run every bound task of `stage` concurrently.
    ///
    /// Waits for all tasks, even after a failure. Returns the per-task timings
    /// on success, or every failure wrapped in
    /// [`ContainerError::StageExecutionFailed`].
    ///
    /// # Panics
    ///
    /// Must be called within a tokio runtime. A panic in a callback cancels the
    /// scope and is resumed on the caller once all tasks have finished.
    pub(crate) async fn execute(
        stage: &str,
        tasks: Vec<BoundTask>,
        cancel: &CancellationToken,
    ) -> ContainerResult<StageMetrics> {
        let stage: Arc<str> = Arc::from(stage);
        let scope = StageScope::new(Arc::clone(&stage), cancel);
        let stage_start = Instant::now();

        tracing::debug!(stage = %stage, tasks = tasks.len(), "Executing stage");

        let mut set = JoinSet::new();
        for (index, task) in tasks.into_iter().enumerate() {
            set.spawn(run_task(index, task, scope.clone()));
        }

        let mut reports = Vec::with_capacity(set.len());
        let mut panic_payload = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(TaskOutcome::Finished(report)) => reports.push(report),
                Ok(TaskOutcome::Panicked(payload)) => {
                    panic_payload.get_or_insert(payload);
                }
                Err(join_err) if join_err.is_panic() => {
                    scope.abort();
                    panic_payload.get_or_insert(join_err.into_panic());
                }
                Err(join_err) => {
                    tracing::warn!(stage = %stage, error = %join_err, "Stage task did not complete");
                }
            }
        }

        scope.close();

        if let Some(payload) = panic_payload {
            tracing::error!(stage = %stage, "Stage callback panicked, resuming panic");
            std::panic::resume_unwind(payload);
        }

        reports.sort_by_key(|report| report.index);

        let mut failures = Vec::new();
        let mut task_metrics = Vec::with_capacity(reports.len());
        for report in reports {
            match report.result {
                Ok(()) => task_metrics.push(TaskMetrics {
                    coordinate: report.coordinate,
                    duration_ms: report.duration_ms,
                }),
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            tracing::debug!(stage = %stage, failures = failures.len(), "Stage failed");
            return Err(ContainerError::StageExecutionFailed(StageErrors::new(
                stage,
                scope.cause(),
                failures,
            )));
        }

        let metrics = StageMetrics {
            stage: stage.to_string(),
            duration_ms: stage_start.elapsed().as_millis(),
            tasks: task_metrics,
        };
        tracing::info!(
            stage = %stage,
            tasks = metrics.tasks.len(),
            duration_ms = metrics.duration_ms,
            "Stage completed"
        );

        Ok(metrics)
    }
}

async fn run_task(index: usize, task: BoundTask, scope: StageScope) -> TaskOutcome {
    let BoundTask {
        coordinate,
        task,
        value,
    } = task;

    let ctx = scope.context(coordinate.clone());
    let task_start = Instant::now();

    let result = match AssertUnwindSafe(task.run(ctx, value)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            scope.abort();
            return TaskOutcome::Panicked(payload);
        }
    };

    let result = result.map_err(|source| {
        let failure = Arc::new(StageFailure::new(
            Arc::clone(scope.stage()),
            coordinate.clone(),
            source,
        ));
        if scope.fail(Arc::clone(&failure)) {
            tracing::warn!(
                stage = %scope.stage(),
                coordinate = %coordinate,
                error = %failure.inner(),
                "Stage task failed, cancelling siblings"
            );
        } else {
            tracing::debug!(
                stage = %scope.stage(),
                coordinate = %coordinate,
                error = %failure.inner(),
                "Stage task failed after cancellation"
            );
        }
        failure
    });

    TaskOutcome::Finished(TaskReport {
        index,
        coordinate,
        duration_ms: task_start.elapsed().as_millis(),
        result,
    })
}
