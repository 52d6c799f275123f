//! Component lifecycle container.
//!
//! Components are registered under a coordinate (type plus optional name),
//! constructed once in registration order, looked up by type, and driven
//! through named stages whose callbacks run concurrently.
//!
//! ## Example
//!
//! ```ignore
//! use stagehand::{CancellationToken, Container, Setup};
//! use std::sync::Arc;
//!
//! let container = Container::new();
//! container.register(Setup::<Arc<Store>>::new().init(|_| Arc::new(Store::default())))?;
//! container.register(
//!     Setup::<Arc<Server>>::new()
//!         .try_init(|c| Ok(Arc::new(Server::new(c.get::<Arc<Store>>()?))))
//!         .stage("start", |ctx, server| async move { server.serve(ctx).await })
//!         .stage("stop", |_ctx, server| async move { server.shutdown().await }),
//! )?;
//!
//! container.init()?;
//! let cancel = CancellationToken::new();
//! container.exec_stage(&cancel, "start").await?;
//! container.exec_stage(&cancel, "stop").await?;
//! ```

pub mod config;
pub mod container;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod stage;

pub use config::ContainerOptions;
pub use container::{Component, Constructor, Container, Phase, Setup};
pub use errors::{BoxError, ContainerError, ContainerResult, ErrorKind, StageErrors, StageFailure};
pub use logging::init_logging;
pub use metrics::{ComponentMetrics, InitMetrics, StageMetrics, TaskMetrics};
pub use registry::{Coordinate, TypeTag};
pub use stage::{StageCallback, StageContext, StageFuture};

pub use tokio_util::sync::CancellationToken;
