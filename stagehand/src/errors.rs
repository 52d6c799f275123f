//! Error types for container lifecycle operations.
//!
//! Every failure the container can report is a [`ContainerError`]. Callers that
//! only care about the category use [`ContainerError::kind`]; callers that need
//! to dig into a user error use the standard `source()` chain.

use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use thiserror::Error;

use crate::container::Phase;
use crate::registry::Coordinate;

/// Error currency for user constructors and stage callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Category of a [`ContainerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyInitialized,
    NotInitialized,
    DuplicateComponent,
    DuplicateNameOption,
    ConstructorAlreadySet,
    MissingConstructor,
    DuplicateStageBinding,
    MissingStageCallback,
    NotFound,
    DisorderedDependency,
    StageExecutionFailed,
    /// A constructor returned an error that is not a container error.
    ConstructorFailed,
    /// A stage scope was cancelled by the caller without any task failing.
    Cancelled,
    /// Invalid container options.
    Config,
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container already initialized (phase: {phase})")]
    AlreadyInitialized { phase: Phase },

    #[error("container not initialized (phase: {phase})")]
    NotInitialized { phase: Phase },

    #[error("component {coordinate} already set (at {location})")]
    DuplicateComponent {
        coordinate: Coordinate,
        location: &'static Location<'static>,
    },

    #[error("name set more than once for type ({type_name}) (at {location})")]
    DuplicateNameOption {
        type_name: &'static str,
        location: &'static Location<'static>,
    },

    #[error("init function already set for type ({type_name}) (at {location})")]
    ConstructorAlreadySet {
        type_name: &'static str,
        location: &'static Location<'static>,
    },

    #[error("init function not set for type ({type_name}) (at {location})")]
    MissingConstructor {
        type_name: &'static str,
        location: &'static Location<'static>,
    },

    #[error("stage `{stage}` already set for type ({type_name}) (at {location})")]
    DuplicateStageBinding {
        stage: String,
        type_name: &'static str,
        location: &'static Location<'static>,
    },

    #[error("stage `{stage}` has no callback for type ({type_name}) (at {location})")]
    MissingStageCallback {
        stage: String,
        type_name: &'static str,
        location: &'static Location<'static>,
    },

    #[error("component {coordinate} not found{} (at {location})", hint_suffix(.hint))]
    NotFound {
        coordinate: Coordinate,
        hint: Option<Coordinate>,
        location: &'static Location<'static>,
    },

    #[error("component {coordinate} must be set before parent component (at {location})")]
    DisorderedDependency {
        coordinate: Coordinate,
        location: &'static Location<'static>,
    },

    #[error("constructor for {coordinate} failed: {source}")]
    ConstructorFailed {
        coordinate: Coordinate,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    StageExecutionFailed(StageErrors),

    #[error("stage `{stage}` cancelled")]
    Cancelled { stage: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn hint_suffix(hint: &Option<Coordinate>) -> String {
    match hint {
        Some(found) => format!(": found component {}", found),
        None => String::new(),
    }
}

impl ContainerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInitialized { .. } => ErrorKind::AlreadyInitialized,
            Self::NotInitialized { .. } => ErrorKind::NotInitialized,
            Self::DuplicateComponent { .. } => ErrorKind::DuplicateComponent,
            Self::DuplicateNameOption { .. } => ErrorKind::DuplicateNameOption,
            Self::ConstructorAlreadySet { .. } => ErrorKind::ConstructorAlreadySet,
            Self::MissingConstructor { .. } => ErrorKind::MissingConstructor,
            Self::DuplicateStageBinding { .. } => ErrorKind::DuplicateStageBinding,
            Self::MissingStageCallback { .. } => ErrorKind::MissingStageCallback,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DisorderedDependency { .. } => ErrorKind::DisorderedDependency,
            Self::ConstructorFailed { .. } => ErrorKind::ConstructorFailed,
            Self::StageExecutionFailed(_) => ErrorKind::StageExecutionFailed,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Aggregated stage failures, if this is a stage execution error.
    pub fn stage_errors(&self) -> Option<&StageErrors> {
        match self {
            Self::StageExecutionFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Failure of a single stage callback.
///
/// Tagged with the stage name and the coordinate whose callback failed. The
/// first failure of a stage run is also the cancellation cause handed to the
/// sibling tasks, which is why it travels as `Arc<StageFailure>`.
#[derive(Debug, Error)]
#[error("stage execution failed: {stage}: {coordinate}: {source}")]
pub struct StageFailure {
    stage: Arc<str>,
    coordinate: Coordinate,
    #[source]
    source: BoxError,
}

impl StageFailure {
    pub(crate) fn new(stage: Arc<str>, coordinate: Coordinate, source: BoxError) -> Self {
        Self {
            stage,
            coordinate,
            source,
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StageExecutionFailed
    }

    /// The error returned by the callback.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// Every failure of one stage run.
///
/// Failures are kept in binding order; [`StageErrors::cause`] is the one that
/// triggered cancellation.
#[derive(Debug)]
pub struct StageErrors {
    stage: Arc<str>,
    cause: Option<Arc<StageFailure>>,
    failures: Vec<Arc<StageFailure>>,
}

impl StageErrors {
    pub(crate) fn new(
        stage: Arc<str>,
        cause: Option<Arc<StageFailure>>,
        failures: Vec<Arc<StageFailure>>,
    ) -> Self {
        Self {
            stage,
            cause,
            failures,
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// First failure recorded for the run.
    pub fn cause(&self) -> Option<&Arc<StageFailure>> {
        self.cause.as_ref()
    }

    pub fn failures(&self) -> &[Arc<StageFailure>] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Find an `E` in each failure's source chain.
    ///
    /// Yields at most one match per failure. Siblings that returned the
    /// cancellation cause carry the triggering error in their chain too, so
    /// searching for the original error matches all of them.
    pub fn find<E>(&self) -> impl Iterator<Item = &E> + '_
    where
        E: StdError + 'static,
    {
        self.failures.iter().filter_map(|failure| {
            let mut current: Option<&(dyn StdError + 'static)> = Some(failure.as_ref());
            while let Some(err) = current {
                if let Some(found) = err.downcast_ref::<E>() {
                    return Some(found);
                }
                current = err.source();
            }
            None
        })
    }

    pub fn contains<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.find::<E>().next().is_some()
    }
}

impl fmt::Display for StageErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage `{}` failed with {} error(s)",
            self.stage,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl StdError for StageErrors {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}
