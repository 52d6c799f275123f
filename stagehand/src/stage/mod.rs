//! Stage execution engine.
//!
//! A stage is a named extension point. Components bind callbacks to stage
//! names at registration; once the container is ready, executing a stage runs
//! every callback bound to that name concurrently.
//!
//! ## Architecture
//!
//! ```text
//! exec_stage(token, "start")
//!   └─ StageScope (child token + first-failure cause)
//!        ├─ task (A, callback) ─┐
//!        ├─ task (B, callback) ─┼─ join all → StageMetrics | StageErrors
//!        └─ task (C, callback) ─┘
//! ```
//!
//! - The first failing task records its error as the scope's cause and
//!   cancels the scope.
//! - Siblings observe cancellation through [`StageContext`].
//! - Every task is joined; every failure is reported.

mod context;
mod executor;
mod task;

pub use context::StageContext;
pub use task::{StageCallback, StageFuture};

pub(crate) use executor::StageExecutor;
pub(crate) use task::{StageTask, TypedStage};
