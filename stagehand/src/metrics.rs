//! Timing collected while initializing components and executing stages.

use crate::registry::Coordinate;

#[derive(Debug, Clone)]
pub struct ComponentMetrics {
    pub coordinate: Coordinate,
    pub duration_ms: u128,
}

/// Construction timings, in registration order.
#[derive(Debug, Clone, Default)]
pub struct InitMetrics {
    pub total_duration_ms: u128,
    pub components: Vec<ComponentMetrics>,
}

impl InitMetrics {
    pub fn component_duration_ms(&self, coordinate: &Coordinate) -> Option<u128> {
        self.components
            .iter()
            .find(|component| &component.coordinate == coordinate)
            .map(|component| component.duration_ms)
    }

    /// Log the construction breakdown.
    pub(crate) fn log_components(&self, label: &str) {
        for component in &self.components {
            tracing::debug!(
                container = %label,
                coordinate = %component.coordinate,
                duration_ms = component.duration_ms,
                "Component constructed"
            );
        }
        tracing::info!(
            container = %label,
            components = self.components.len(),
            total_duration_ms = self.total_duration_ms,
            "Container initialized"
        );
    }
}

#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub coordinate: Coordinate,
    pub duration_ms: u128,
}

/// Timings of one successful stage run. Tasks are in binding order.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub stage: String,
    pub duration_ms: u128,
    pub tasks: Vec<TaskMetrics>,
}

impl StageMetrics {
    pub fn task_duration_ms(&self, coordinate: &Coordinate) -> Option<u128> {
        self.tasks
            .iter()
            .find(|task| &task.coordinate == coordinate)
            .map(|task| task.duration_ms)
    }
}
