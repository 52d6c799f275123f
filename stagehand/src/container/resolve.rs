//! Typed component lookup.

use std::panic::Location;
use std::sync::Arc;

use super::{Component, Container};
use crate::errors::{ContainerError, ContainerResult};
use crate::registry::{Coordinate, Slot};

/// Look up the ready value at `coordinate` and clone it out as `T`.
///
/// The lock is released before the value is downcast and cloned, so a
/// `Clone` impl may itself use the container.
pub(super) fn resolve<T: Component>(
    container: &Container,
    coordinate: Coordinate,
    location: &'static Location<'static>,
) -> ContainerResult<T> {
    let value = {
        let state = container.state.lock();
        state.check_resolve()?;

        match state.registry.slot(&coordinate) {
            None => {
                let hint = state.registry.near_miss(&coordinate).cloned();
                tracing::trace!(
                    coordinate = %coordinate,
                    hint = ?hint.as_ref().map(ToString::to_string),
                    "Component not found"
                );
                return Err(ContainerError::NotFound {
                    coordinate,
                    hint,
                    location,
                });
            }
            Some(Slot::Pending(_)) | Some(Slot::Constructing) => {
                return Err(ContainerError::DisorderedDependency {
                    coordinate,
                    location,
                });
            }
            Some(Slot::Ready(value)) => Arc::clone(value),
        }
    };

    match value.downcast_ref::<T>() {
        Some(component) => Ok(component.clone()),
        // Values are stored under their own type's coordinate.
        None => Err(ContainerError::NotFound {
            coordinate,
            hint: None,
            location,
        }),
    }
}
