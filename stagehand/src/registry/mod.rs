//! Component registry.
//!
//! Holds one slot per [`Coordinate`], the registration order, and the stage
//! binding table. The registry has no locking of its own: the container keeps
//! it behind its single state lock and only calls into it while holding that
//! lock.

mod coordinate;

pub use coordinate::{Coordinate, TypeTag};

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::container::Container;
use crate::errors::BoxError;
use crate::stage::StageTask;

/// Type-erased component value.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

/// Type-erased constructor, consumed exactly once during init.
pub(crate) type ErasedConstructor =
    Box<dyn FnOnce(&Container) -> Result<Value, BoxError> + Send + 'static>;

/// State of one component.
pub(crate) enum Slot {
    /// Registered, constructor not run yet.
    Pending(ErasedConstructor),
    /// Constructor taken out and currently running.
    Constructing,
    Ready(Value),
}

/// A stage callback bound to one component.
pub(crate) struct StageBinding {
    pub(crate) coordinate: Coordinate,
    pub(crate) task: Arc<dyn StageTask>,
}

/// A binding resolved against its ready value, ready to be spawned.
pub(crate) struct BoundTask {
    pub(crate) coordinate: Coordinate,
    pub(crate) task: Arc<dyn StageTask>,
    pub(crate) value: Value,
}

#[derive(Default)]
pub(crate) struct Registry {
    slots: HashMap<Coordinate, Slot>,
    order: Vec<Coordinate>,
    stages: HashMap<String, Vec<StageBinding>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn contains(&self, coordinate: &Coordinate) -> bool {
        self.slots.contains_key(coordinate)
    }

    pub(crate) fn slot(&self, coordinate: &Coordinate) -> Option<&Slot> {
        self.slots.get(coordinate)
    }

    /// Coordinates in registration order.
    pub(crate) fn order(&self) -> &[Coordinate] {
        &self.order
    }

    pub(crate) fn stage_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stages.keys().cloned().collect();
        names.sort();
        names
    }

    /// Add a pending component with its stage bindings.
    ///
    /// The caller has already rejected duplicates; the coordinate is appended
    /// to the registration order.
    pub(crate) fn insert(
        &mut self,
        coordinate: Coordinate,
        constructor: ErasedConstructor,
        stages: Vec<(String, Arc<dyn StageTask>)>,
    ) {
        debug_assert!(!self.slots.contains_key(&coordinate));

        for (stage, task) in stages {
            self.stages.entry(stage).or_default().push(StageBinding {
                coordinate: coordinate.clone(),
                task,
            });
        }

        self.slots
            .insert(coordinate.clone(), Slot::Pending(constructor));
        self.order.push(coordinate);
    }

    /// Move a pending slot to `Constructing` and hand out its constructor.
    ///
    /// Returns `None` if the slot is missing or not pending.
    pub(crate) fn take_constructor(&mut self, coordinate: &Coordinate) -> Option<ErasedConstructor> {
        let slot = self.slots.get_mut(coordinate)?;
        match std::mem::replace(slot, Slot::Constructing) {
            Slot::Pending(constructor) => Some(constructor),
            other => {
                *slot = other;
                None
            }
        }
    }

    pub(crate) fn complete(&mut self, coordinate: &Coordinate, value: Value) {
        if let Some(slot) = self.slots.get_mut(coordinate) {
            *slot = Slot::Ready(value);
        }
    }

    /// Registered coordinate with the same name and the `Arc` counterpart type.
    pub(crate) fn near_miss(&self, wanted: &Coordinate) -> Option<&Coordinate> {
        self.order
            .iter()
            .find(|candidate| candidate.is_near_miss_of(wanted))
    }

    /// Bindings of `stage` paired with their ready values, in binding order.
    pub(crate) fn bound_tasks(&self, stage: &str) -> Vec<BoundTask> {
        let Some(bindings) = self.stages.get(stage) else {
            return Vec::new();
        };

        bindings
            .iter()
            .filter_map(|binding| match self.slots.get(&binding.coordinate) {
                Some(Slot::Ready(value)) => Some(BoundTask {
                    coordinate: binding.coordinate.clone(),
                    task: Arc::clone(&binding.task),
                    value: Arc::clone(value),
                }),
                _ => {
                    tracing::trace!(
                        stage = %stage,
                        coordinate = %binding.coordinate,
                        "Skipping binding without ready value"
                    );
                    None
                }
            })
            .collect()
    }
}
