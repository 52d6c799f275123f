//! Component registration.
//!
//! A [`Setup`] collects the options of one registration in call order. The
//! options are validated when the setup is handed to
//! [`Container::register`], so a malformed registration never touches the
//! registry.

use std::any::type_name;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use super::{Component, Container};
use crate::errors::{BoxError, ContainerError, ContainerResult};
use crate::registry::{Coordinate, ErasedConstructor, Value};
use crate::stage::{StageCallback, StageContext, StageTask, TypedStage};

/// Deferred constructor for a component of type `T`.
///
/// Runs once, during [`Container::init`], with the container so it can
/// resolve components registered before it.
pub struct Constructor<T> {
    build: Box<dyn FnOnce(&Container) -> Result<T, BoxError> + Send + 'static>,
}

impl<T: Component> Constructor<T> {
    pub fn new<F>(build: F) -> Self
    where
        F: FnOnce(&Container) -> T + Send + 'static,
    {
        Self {
            build: Box::new(move |container: &Container| Ok(build(container))),
        }
    }

    pub fn fallible<F>(build: F) -> Self
    where
        F: FnOnce(&Container) -> Result<T, BoxError> + Send + 'static,
    {
        Self {
            build: Box::new(build),
        }
    }

    fn erase(self) -> ErasedConstructor {
        let build = self.build;
        Box::new(move |container: &Container| {
            build(container).map(|component| Arc::new(component) as Value)
        })
    }
}

enum SetupOpt<T> {
    Name(String),
    Constructor(Option<Constructor<T>>),
    Stage(String, Option<StageCallback<T>>),
}

/// Registration of one component of type `T`.
///
/// # Example
///
/// ```ignore
/// container.register(
///     Setup::<Arc<Server>>::new()
///         .name("public")
///         .try_init(|c| Ok(Arc::new(Server::bind(c.get::<Config>()?)?)))
///         .stage("start", |ctx, server| async move { server.run(ctx).await }),
/// )?;
/// ```
pub struct Setup<T> {
    opts: Vec<SetupOpt<T>>,
}

impl<T: Component> Default for Setup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> Setup<T> {
    pub fn new() -> Self {
        Self { opts: Vec::new() }
    }

    /// Name the component. An empty name is the unnamed coordinate.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.opts.push(SetupOpt::Name(name.into()));
        self
    }

    pub fn init<F>(self, build: F) -> Self
    where
        F: FnOnce(&Container) -> T + Send + 'static,
    {
        self.constructor(Some(Constructor::new(build)))
    }

    pub fn try_init<F>(self, build: F) -> Self
    where
        F: FnOnce(&Container) -> Result<T, BoxError> + Send + 'static,
    {
        self.constructor(Some(Constructor::fallible(build)))
    }

    /// Set the constructor slot directly. `None` is rejected at registration.
    pub fn constructor(mut self, constructor: Option<Constructor<T>>) -> Self {
        self.opts.push(SetupOpt::Constructor(constructor));
        self
    }

    /// Bind `callback` to the stage `stage`.
    pub fn stage<F, Fut>(self, stage: impl Into<String>, callback: F) -> Self
    where
        F: Fn(StageContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.stage_callback(stage, Some(StageCallback::new(callback)))
    }

    /// Bind a stage callback slot directly. `None` is rejected at registration.
    pub fn stage_callback(
        mut self,
        stage: impl Into<String>,
        callback: Option<StageCallback<T>>,
    ) -> Self {
        self.opts.push(SetupOpt::Stage(stage.into(), callback));
        self
    }

    /// Check the options in call order; the first problem wins.
    fn validate(self, location: &'static Location<'static>) -> ContainerResult<ValidatedSetup<T>> {
        let type_name = type_name::<T>();
        let mut name = None;
        let mut constructor = None;
        let mut stages: Vec<(String, StageCallback<T>)> = Vec::new();

        for opt in self.opts {
            match opt {
                SetupOpt::Name(value) => {
                    if name.is_some() {
                        return Err(ContainerError::DuplicateNameOption {
                            type_name,
                            location,
                        });
                    }
                    name = Some(value);
                }
                SetupOpt::Constructor(None) => {
                    return Err(ContainerError::MissingConstructor {
                        type_name,
                        location,
                    });
                }
                SetupOpt::Constructor(Some(value)) => {
                    if constructor.is_some() {
                        return Err(ContainerError::ConstructorAlreadySet {
                            type_name,
                            location,
                        });
                    }
                    constructor = Some(value);
                }
                SetupOpt::Stage(stage, callback) => {
                    if stages.iter().any(|(bound, _)| *bound == stage) {
                        return Err(ContainerError::DuplicateStageBinding {
                            stage,
                            type_name,
                            location,
                        });
                    }
                    let Some(callback) = callback else {
                        return Err(ContainerError::MissingStageCallback {
                            stage,
                            type_name,
                            location,
                        });
                    };
                    stages.push((stage, callback));
                }
            }
        }

        let constructor = constructor.ok_or(ContainerError::MissingConstructor {
            type_name,
            location,
        })?;

        Ok(ValidatedSetup {
            name: name.unwrap_or_default(),
            constructor,
            stages,
        })
    }
}

struct ValidatedSetup<T> {
    name: String,
    constructor: Constructor<T>,
    stages: Vec<(String, StageCallback<T>)>,
}

/// Validate `setup` and add it to the registry in one critical section.
pub(super) fn register<T: Component>(
    container: &Container,
    setup: Setup<T>,
    location: &'static Location<'static>,
) -> ContainerResult<()> {
    let mut state = container.state.lock();
    state.check_register()?;

    let ValidatedSetup {
        name,
        constructor,
        stages,
    } = setup.validate(location)?;

    let coordinate = Coordinate::of::<T>(name);
    if state.registry.contains(&coordinate) {
        return Err(ContainerError::DuplicateComponent {
            coordinate,
            location,
        });
    }

    let stages: Vec<(String, Arc<dyn StageTask>)> = stages
        .into_iter()
        .map(|(stage, callback)| {
            let task: Arc<dyn StageTask> = Arc::new(TypedStage::new(callback));
            (stage, task)
        })
        .collect();

    tracing::debug!(
        container = %container.options.label,
        coordinate = %coordinate,
        stages = stages.len(),
        "Registering component"
    );

    state
        .registry
        .insert(coordinate, constructor.erase(), stages);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Db;

    fn noop_stage() -> StageCallback<Db> {
        StageCallback::new(|_ctx, _db| async { Ok::<(), BoxError>(()) })
    }

    fn register_err(setup: Setup<Db>) -> ContainerError {
        Container::new().register(setup).unwrap_err()
    }

    #[test]
    fn test_register_ok() {
        let container = Container::new();
        container.register(Setup::<Db>::new().init(|_| Db)).unwrap();
        container
            .register(Setup::<Db>::new().name("A").init(|_| Db))
            .unwrap();

        assert_eq!(container.len(), 2);
        assert!(container.contains::<Db>(""));
        assert!(container.contains::<Db>("A"));
    }

    #[test]
    fn test_missing_constructor() {
        let err = register_err(Setup::new());
        assert_eq!(err.kind(), ErrorKind::MissingConstructor);
        assert!(err.to_string().contains("setup.rs"));

        let err = register_err(Setup::new().constructor(None));
        assert_eq!(err.kind(), ErrorKind::MissingConstructor);
    }

    #[test]
    fn test_constructor_already_set() {
        let err = register_err(Setup::new().init(|_| Db).init(|_| Db));
        assert_eq!(err.kind(), ErrorKind::ConstructorAlreadySet);

        let err = register_err(Setup::new().init(|_| Db).try_init(|_| Ok(Db)));
        assert_eq!(err.kind(), ErrorKind::ConstructorAlreadySet);

        let err = register_err(Setup::new().try_init(|_| Ok(Db)).init(|_| Db));
        assert_eq!(err.kind(), ErrorKind::ConstructorAlreadySet);
    }

    #[test]
    fn test_null_constructor_checked_before_duplicate() {
        let err = register_err(Setup::new().init(|_| Db).constructor(None));
        assert_eq!(err.kind(), ErrorKind::MissingConstructor);
    }

    #[test]
    fn test_duplicate_name_option() {
        for (first, second) in [("A", "B"), ("", "A"), ("A", ""), ("", ""), ("A", "A")] {
            let err = register_err(Setup::new().name(first).name(second).init(|_| Db));
            assert_eq!(err.kind(), ErrorKind::DuplicateNameOption, "{first:?}/{second:?}");
        }
    }

    #[test]
    fn test_duplicate_component() {
        let container = Container::new();
        container
            .register(Setup::<Db>::new().name("A").init(|_| Db))
            .unwrap();

        let err = container
            .register(Setup::<Db>::new().name("A").init(|_| Db))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateComponent);
        assert!(err.to_string().contains("(stagehand::container::setup::tests::Db, A)"));
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_duplicate_stage_binding() {
        let err = register_err(
            Setup::new()
                .init(|_| Db)
                .stage_callback("stage", Some(noop_stage()))
                .stage_callback("stage", Some(noop_stage())),
        );
        assert_eq!(err.kind(), ErrorKind::DuplicateStageBinding);
    }

    #[test]
    fn test_missing_stage_callback() {
        let err = register_err(Setup::new().init(|_| Db).stage_callback("stage", None));
        assert_eq!(err.kind(), ErrorKind::MissingStageCallback);
        assert!(err.to_string().contains("`stage`"));
    }

    #[test]
    fn test_failed_register_leaves_registry_untouched() {
        let container = Container::new();
        let _ = container.register(
            Setup::<Db>::new()
                .init(|_| Db)
                .stage_callback("start", Some(noop_stage()))
                .stage_callback("stop", None),
        );

        assert!(container.is_empty());
        assert!(container.stages().is_empty());
    }

    #[test]
    fn test_register_after_init() {
        let container = Container::new();
        container.init().unwrap();

        let err = container.register(Setup::<Db>::new().init(|_| Db)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInitialized);
    }

    #[test]
    fn test_stage_bindings_recorded() {
        let container = Container::new();
        container
            .register(
                Setup::<Db>::new()
                    .init(|_| Db)
                    .stage_callback("start", Some(noop_stage()))
                    .stage_callback("stop", Some(noop_stage())),
            )
            .unwrap();

        assert_eq!(container.stages(), vec!["start".to_string(), "stop".to_string()]);
    }
}
