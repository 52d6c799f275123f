//! Component initialization.
//!
//! Constructors run one at a time, in registration order, on the caller's
//! thread. The container lock is never held while a constructor runs, so a
//! constructor may resolve components registered before it.

use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use super::Container;
use crate::errors::{BoxError, ContainerError, ContainerResult};
use crate::metrics::{ComponentMetrics, InitMetrics};
use crate::registry::Coordinate;

pub(super) fn init(container: &Container) -> ContainerResult<InitMetrics> {
    let total_start = Instant::now();
    let label = container.options.label.as_str();

    let order: Vec<Coordinate> = {
        let mut state = container.state.lock();
        state.enter_init()?;
        state.registry.order().to_vec()
    };

    tracing::debug!(container = %label, components = order.len(), "Initializing container");

    let mut components = Vec::with_capacity(order.len());
    for coordinate in order {
        let Some(constructor) = container.state.lock().registry.take_constructor(&coordinate)
        else {
            continue;
        };

        tracing::trace!(container = %label, coordinate = %coordinate, "Constructing component");
        let start = Instant::now();

        let value = match panic::catch_unwind(AssertUnwindSafe(|| constructor(container))) {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                let err = classify(coordinate, err);
                tracing::debug!(container = %label, error = %err, "Initialization aborted");
                return Err(err);
            }
            Err(payload) => match payload.downcast::<ContainerError>() {
                Ok(err) => {
                    tracing::debug!(container = %label, error = %err, "Initialization aborted");
                    return Err(*err);
                }
                Err(payload) => {
                    let backtrace = if container.options.capture_backtraces {
                        Backtrace::force_capture()
                    } else {
                        Backtrace::capture()
                    };
                    tracing::error!(
                        container = %label,
                        coordinate = %coordinate,
                        panic = %panic_message(payload.as_ref()),
                        backtrace = %backtrace,
                        "Constructor panicked"
                    );
                    panic::resume_unwind(payload);
                }
            },
        };

        container.state.lock().registry.complete(&coordinate, value);
        components.push(ComponentMetrics {
            coordinate,
            duration_ms: start.elapsed().as_millis(),
        });
    }

    container.state.lock().exit_init();

    let metrics = InitMetrics {
        total_duration_ms: total_start.elapsed().as_millis(),
        components,
    };
    metrics.log_components(label);

    Ok(metrics)
}

/// Container errors pass through unchanged; anything else is user failure
/// and gets tagged with the coordinate being constructed.
fn classify(coordinate: Coordinate, err: BoxError) -> ContainerError {
    match err.downcast::<ContainerError>() {
        Ok(err) => *err,
        Err(source) => ContainerError::ConstructorFailed { coordinate, source },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
