//! The component container.
//!
//! A [`Container`] moves through three phases:
//!
//! ```text
//! Open            register(Setup<T>)...
//!   │ init()
//!   ▼
//! Initializing    constructors run in registration order
//!   │ all ok
//!   ▼
//! Ready           get / must_get / exec_stage
//! ```
//!
//! All state sits behind one lock. Constructors and stage callbacks run with
//! the lock released, so they are free to call back into the container.

mod init;
mod lifecycle;
mod resolve;
mod setup;

pub use lifecycle::Phase;
pub use setup::{Constructor, Setup};

use std::panic::Location;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ContainerOptions;
use crate::errors::ContainerResult;
use crate::metrics::{InitMetrics, StageMetrics};
use crate::registry::Coordinate;
use crate::stage::StageExecutor;
use lifecycle::ContainerState;

/// Bound for values stored in a container.
///
/// Lookups hand out clones, so a component that should be shared by
/// reference is registered as `Arc<T>`.
pub trait Component: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Component for T {}

/// Registry of lazily constructed components with staged lifecycle hooks.
///
/// # Example
///
/// ```ignore
/// let container = Container::new();
/// container.register(Setup::<Arc<Db>>::new().try_init(|_| Ok(Arc::new(Db::open()?))))?;
/// container.register(
///     Setup::<Arc<Server>>::new()
///         .init(|c| Arc::new(Server::new(c.must_get::<Arc<Db>>())))
///         .stage("start", |ctx, server| async move { server.serve(ctx).await }),
/// )?;
///
/// container.init()?;
/// container.exec_stage(&CancellationToken::new(), "start").await?;
/// ```
pub struct Container {
    pub(crate) state: Mutex<ContainerState>,
    pub(crate) options: ContainerOptions,
}

impl Container {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ContainerState::new()),
            options: ContainerOptions::default(),
        }
    }

    /// Create a container with explicit options.
    ///
    /// # Errors
    ///
    /// Returns error if the options fail validation.
    pub fn with_options(options: ContainerOptions) -> ContainerResult<Self> {
        options.sanitize()?;
        Ok(Self {
            state: Mutex::new(ContainerState::new()),
            options,
        })
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a component.
    ///
    /// The setup is validated before anything is recorded; a rejected setup
    /// leaves the container unchanged.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` once `init` has been called
    /// - `DuplicateNameOption`, `MissingConstructor`, `ConstructorAlreadySet`,
    ///   `DuplicateStageBinding`, `MissingStageCallback` for a malformed setup
    /// - `DuplicateComponent` if the coordinate is taken
    #[track_caller]
    pub fn register<T: Component>(&self, setup: Setup<T>) -> ContainerResult<()> {
        setup::register(self, setup, Location::caller())
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Run every constructor once, in registration order.
    ///
    /// Stops at the first failing constructor. A failed init is final: the
    /// container stays in [`Phase::Initializing`] and cannot be initialized
    /// again.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` if called more than once
    /// - any container error raised by a constructor (`NotFound`,
    ///   `DisorderedDependency`, ...)
    /// - `ConstructorFailed` wrapping any other constructor error
    ///
    /// # Panics
    ///
    /// A constructor panic that does not carry a container error is logged
    /// and resumed.
    pub fn init(&self) -> ContainerResult<InitMetrics> {
        init::init(self)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Get the unnamed component of type `T`.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before `init`
    /// - `NotFound` if no such component is registered. When the same name is
    ///   registered under `Arc<T>` (or `T` for an `Arc<T>` request), the error
    ///   names it as a hint.
    /// - `DisorderedDependency` if called from a constructor before the
    ///   component has been constructed
    #[track_caller]
    pub fn get<T: Component>(&self) -> ContainerResult<T> {
        resolve::resolve(self, Coordinate::of::<T>(""), Location::caller())
    }

    /// Get the component of type `T` registered under `name`.
    #[track_caller]
    pub fn get_named<T: Component>(&self, name: &str) -> ContainerResult<T> {
        resolve::resolve(self, Coordinate::of::<T>(name), Location::caller())
    }

    /// Like [`Container::get`], but panics with the [`ContainerError`] as
    /// payload.
    ///
    /// Inside a constructor the panic is caught by `init` and returned as the
    /// init error.
    ///
    /// [`ContainerError`]: crate::errors::ContainerError
    #[track_caller]
    pub fn must_get<T: Component>(&self) -> T {
        match resolve::resolve(self, Coordinate::of::<T>(""), Location::caller()) {
            Ok(component) => component,
            Err(err) => std::panic::panic_any(err),
        }
    }

    #[track_caller]
    pub fn must_get_named<T: Component>(&self, name: &str) -> T {
        match resolve::resolve(self, Coordinate::of::<T>(name), Location::caller()) {
            Ok(component) => component,
            Err(err) => std::panic::panic_any(err),
        }
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Run every callback bound to `stage` concurrently.
    ///
    /// Callbacks get a [`StageContext`] whose scope is a child of `cancel`.
    /// The first failure cancels the scope; the call returns after every
    /// callback has finished. A stage with no bindings succeeds immediately.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` unless the container is ready
    /// - `StageExecutionFailed` carrying every callback failure
    ///
    /// # Panics
    ///
    /// Must be called within a tokio runtime. A callback panic is resumed
    /// once all callbacks have finished.
    ///
    /// [`StageContext`]: crate::stage::StageContext
    pub async fn exec_stage(
        &self,
        cancel: &CancellationToken,
        stage: &str,
    ) -> ContainerResult<StageMetrics> {
        let tasks = {
            let state = self.state.lock();
            state.check_exec_stage()?;
            state.registry.bound_tasks(stage)
        };

        StageExecutor::execute(stage, tasks, cancel).await
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.state.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a component of type `T` is registered under `name`.
    pub fn contains<T: Component>(&self, name: &str) -> bool {
        self.state
            .lock()
            .registry
            .contains(&Coordinate::of::<T>(name))
    }

    /// Registered coordinates in registration order.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.state.lock().registry.order().to_vec()
    }

    /// Names of all stages with at least one binding, sorted.
    pub fn stages(&self) -> Vec<String> {
        self.state.lock().registry.stage_names()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Container")
            .field("label", &self.options.label)
            .field("phase", &state.phase)
            .field("components", &state.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::AssertUnwindSafe;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::FutureExt;
    use parking_lot::Mutex;
    use thiserror::Error;

    use super::*;
    use crate::errors::{BoxError, ContainerError, ErrorKind, StageFailure};
    use crate::stage::{StageContext, StageFuture};

    #[derive(Debug, Error)]
    #[error("a failed")]
    struct AError;

    #[derive(Debug, Error)]
    #[error("b failed")]
    struct BError;

    #[derive(Debug, Clone)]
    struct Svc {
        id: &'static str,
    }

    type Seen = Arc<Mutex<Vec<&'static str>>>;

    fn record(seen: Seen) -> impl Fn(StageContext, Svc) -> StageFuture + Send + Sync + 'static {
        move |ctx: StageContext, svc: Svc| {
            let seen = Arc::clone(&seen);
            async move {
                if ctx.coordinate().name() != svc.id {
                    let msg = format!("{} got {}", ctx.coordinate(), svc.id);
                    return Err::<(), BoxError>(msg.into());
                }
                seen.lock().push(svc.id);
                Ok(())
            }
            .boxed()
        }
    }

    fn register_svc(
        container: &Container,
        id: &'static str,
        setup: impl FnOnce(Setup<Svc>) -> Setup<Svc>,
    ) {
        container
            .register(setup(Setup::<Svc>::new().name(id).init(move |_| Svc { id })))
            .unwrap();
    }

    /// Wait for the scope to be cancelled, then report the cause.
    async fn wait_for_cancel(ctx: StageContext) -> Result<(), BoxError> {
        ctx.cancelled().await;
        Err(ctx.cancellation_error())
    }

    #[test]
    fn test_with_options_rejects_blank_label() {
        let err = Container::with_options(ContainerOptions {
            label: "  ".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_introspection() {
        let container = Container::new();
        assert!(container.is_empty());
        assert_eq!(container.phase(), Phase::Open);

        register_svc(&container, "a", |s| s.stage("start", |_ctx, _svc| async { Ok::<(), BoxError>(()) }));
        register_svc(&container, "b", |s| s);

        assert_eq!(container.len(), 2);
        assert_eq!(
            container.coordinates(),
            vec![Coordinate::of::<Svc>("a"), Coordinate::of::<Svc>("b")]
        );
        assert_eq!(container.stages(), vec!["start".to_string()]);
        assert!(format!("{:?}", container).contains("phase: Open"));
    }

    #[tokio::test]
    async fn test_exec_stage_before_init() {
        let container = Container::new();
        let err = container
            .exec_stage(&CancellationToken::new(), "start")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
    }

    #[tokio::test]
    async fn test_exec_stage_without_bindings() {
        let container = Container::new();
        register_svc(&container, "a", |s| s);
        container.init().unwrap();

        let metrics = container
            .exec_stage(&CancellationToken::new(), "start")
            .await
            .unwrap();
        assert!(metrics.tasks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_exec_stage_runs_every_binding() {
        let seen: Seen = Arc::default();
        let container = Container::new();
        for id in ["a", "b", "c"] {
            let callback = record(Arc::clone(&seen));
            register_svc(&container, id, move |s| s.stage("start", callback));
        }
        container.init().unwrap();

        let metrics = container
            .exec_stage(&CancellationToken::new(), "start")
            .await
            .unwrap();

        let mut ids = seen.lock().clone();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(metrics.stage, "start");
        let order: Vec<&str> = metrics.tasks.iter().map(|t| t.coordinate.name()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(metrics.task_duration_ms(&Coordinate::of::<Svc>("b")).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_exec_stage_only_runs_named_stage() {
        let seen: Seen = Arc::default();
        let container = Container::new();
        let start = record(Arc::clone(&seen));
        register_svc(&container, "a", move |s| {
            s.stage("start", start)
                .stage("stop", |_ctx, _svc| async { Err::<(), BoxError>(AError.into()) })
        });
        container.init().unwrap();

        container
            .exec_stage(&CancellationToken::new(), "start")
            .await
            .unwrap();
        assert_eq!(*seen.lock(), vec!["a"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_failure_cancels_siblings() {
        let container = Container::new();
        register_svc(&container, "a", |s| {
            s.stage("start", |_ctx, _svc| async { Err::<(), BoxError>(AError.into()) })
        });
        for id in ["b", "c"] {
            register_svc(&container, id, |s| {
                s.stage("start", |ctx, _svc| wait_for_cancel(ctx))
            });
        }
        container.init().unwrap();

        let err = container
            .exec_stage(&CancellationToken::new(), "start")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StageExecutionFailed);
        let errors = err.stage_errors().unwrap();
        assert_eq!(errors.stage(), "start");
        assert_eq!(errors.len(), 3);

        // Every failure carries the original error in its chain.
        assert_eq!(errors.find::<AError>().count(), 3);

        let cause = errors.cause().unwrap();
        assert_eq!(cause.coordinate(), &Coordinate::of::<Svc>("a"));
        assert!(Arc::ptr_eq(cause, &errors.failures()[0]));
        for returned in errors.find::<Arc<StageFailure>>() {
            assert!(Arc::ptr_eq(returned, cause));
        }
        assert_eq!(errors.find::<Arc<StageFailure>>().count(), 2);

        let coords: Vec<&str> = errors.failures().iter().map(|f| f.coordinate().name()).collect();
        assert_eq!(coords, vec!["a", "b", "c"]);
        assert!(err.to_string().contains("a failed"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_all_independent_failures_reported() {
        let container = Container::new();
        register_svc(&container, "a", |s| {
            s.stage("stop", |_ctx, _svc| async { Err::<(), BoxError>(AError.into()) })
        });
        register_svc(&container, "b", |s| {
            s.stage("stop", |_ctx, _svc| async { Err::<(), BoxError>(BError.into()) })
        });
        register_svc(&container, "c", |s| {
            s.stage("stop", |_ctx, _svc| async { Ok::<(), BoxError>(()) })
        });
        container.init().unwrap();

        let err = container
            .exec_stage(&CancellationToken::new(), "stop")
            .await
            .unwrap_err();

        let errors = err.stage_errors().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains::<AError>());
        assert!(errors.contains::<BError>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_caller_cancellation() {
        let container = Container::new();
        register_svc(&container, "a", |s| {
            s.stage("start", |ctx, _svc| wait_for_cancel(ctx))
        });
        container.init().unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = container.exec_stage(&cancel, "start").await.unwrap_err();

        let errors = err.stage_errors().unwrap();
        assert!(errors.cause().is_some());
        let cancelled = errors.find::<ContainerError>().next().unwrap();
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stage_scope_does_not_cancel_caller() {
        let container = Container::new();
        register_svc(&container, "a", |s| {
            s.stage("start", |_ctx, _svc| async { Err::<(), BoxError>(AError.into()) })
        });
        container.init().unwrap();

        let cancel = CancellationToken::new();
        container.exec_stage(&cancel, "start").await.unwrap_err();
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stage_panic_is_resumed() {
        let container = Container::new();
        register_svc(&container, "a", |s| {
            s.stage("start", |_ctx, _svc| async {
                if true {
                    panic!("stage boom");
                }
                Ok::<(), BoxError>(())
            })
        });
        register_svc(&container, "b", |s| {
            s.stage("start", |ctx, _svc| async move {
                ctx.cancelled().await;
                Ok::<(), BoxError>(())
            })
        });
        container.init().unwrap();

        let payload = AssertUnwindSafe(container.exec_stage(&CancellationToken::new(), "start"))
            .catch_unwind()
            .await
            .unwrap_err();

        let msg = payload.downcast_ref::<&str>().copied().unwrap_or_default();
        assert_eq!(msg, "stage boom");
    }

    #[tokio::test]
    async fn test_stage_callback_can_use_container() {
        let container = Arc::new(Container::new());
        container
            .register(Setup::<u32>::new().name("port").init(|_| 8080))
            .unwrap();
        let weak = Arc::downgrade(&container);
        let seen = Arc::new(Mutex::new(None));
        {
            let seen = Arc::clone(&seen);
            container
                .register(Setup::<Svc>::new().init(|_| Svc { id: "web" }).stage(
                    "start",
                    move |_ctx, _svc| {
                        let weak = weak.clone();
                        let seen = Arc::clone(&seen);
                        async move {
                            let container = weak.upgrade().ok_or("container dropped")?;
                            *seen.lock() = Some(container.get_named::<u32>("port")?);
                            Ok::<(), BoxError>(())
                        }
                    },
                ))
                .unwrap();
        }
        container.init().unwrap();

        container
            .exec_stage(&CancellationToken::new(), "start")
            .await
            .unwrap();
        assert_eq!(*seen.lock(), Some(8080));
    }
}
