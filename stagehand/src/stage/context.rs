//! Shared cancellation scope for one stage run.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::errors::{BoxError, ContainerError, StageFailure};
use crate::registry::Coordinate;

/// Handle given to every stage callback.
///
/// All callbacks of one stage run share the same cancellation scope. When a
/// sibling fails, the scope is cancelled and [`StageContext::cause`] returns
/// that sibling's failure. Cancellation is cooperative: a callback that never
/// checks the context runs to completion.
///
/// # Example
///
/// ```ignore
/// Setup::<Arc<Worker>>::new()
///     .init(|_| Arc::new(Worker::default()))
///     .stage("run", |ctx, worker| async move {
///         tokio::select! {
///             result = worker.serve() => result,
///             _ = ctx.cancelled() => Err(ctx.cancellation_error()),
///         }
///     });
/// ```
#[derive(Clone)]
pub struct StageContext {
    scope: StageScope,
    coordinate: Coordinate,
}

impl StageContext {
    /// Name of the running stage.
    pub fn stage(&self) -> &str {
        &self.scope.stage
    }

    /// Component whose callback holds this context.
    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.token.is_cancelled()
    }

    /// Resolves once the scope is cancelled.
    pub async fn cancelled(&self) {
        self.scope.token.cancelled().await;
    }

    /// Token of the shared scope, for handing to nested work.
    pub fn token(&self) -> &CancellationToken {
        &self.scope.token
    }

    /// First failure recorded in this run, if any.
    pub fn cause(&self) -> Option<Arc<StageFailure>> {
        self.scope.cause()
    }

    /// Error to return after observing cancellation.
    ///
    /// This is the recorded cause when a sibling failed, or
    /// [`ContainerError::Cancelled`] when the caller cancelled the run.
    pub fn cancellation_error(&self) -> BoxError {
        match self.cause() {
            Some(cause) => Box::new(cause),
            None => Box::new(ContainerError::Cancelled {
                stage: self.stage().to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("stage", &self.scope.stage)
            .field("coordinate", &self.coordinate)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancellation token plus write-once cause, shared by all tasks of a run.
#[derive(Clone)]
pub(crate) struct StageScope {
    stage: Arc<str>,
    token: CancellationToken,
    cause: Arc<OnceLock<Arc<StageFailure>>>,
}

impl StageScope {
    /// Create a scope nested under the caller's token.
    pub(crate) fn new(stage: Arc<str>, parent: &CancellationToken) -> Self {
        Self {
            stage,
            token: parent.child_token(),
            cause: Arc::new(OnceLock::new()),
        }
    }

    pub(crate) fn stage(&self) -> &Arc<str> {
        &self.stage
    }

    pub(crate) fn context(&self, coordinate: Coordinate) -> StageContext {
        StageContext {
            scope: self.clone(),
            coordinate,
        }
    }

    /// Record `failure` as the cause (first write wins) and cancel the scope.
    ///
    /// Returns `true` if this call set the cause.
    pub(crate) fn fail(&self, failure: Arc<StageFailure>) -> bool {
        let first = self.cause.set(failure).is_ok();
        self.token.cancel();
        first
    }

    /// Cancel without recording a cause.
    pub(crate) fn abort(&self) {
        self.token.cancel();
    }

    pub(crate) fn cause(&self) -> Option<Arc<StageFailure>> {
        self.cause.get().cloned()
    }

    /// Release the scope once every task has been joined.
    pub(crate) fn close(&self) {
        self.token.cancel();
    }
}
