//! Container lifecycle state machine.
//!
//! ```text
//! Open ──init()──→ Initializing ──all constructors ok──→ Ready
//! ```
//!
//! Transitions are monotonic. A failed init leaves the container in
//! `Initializing` for good.

use std::fmt;

use crate::errors::{ContainerError, ContainerResult};
use crate::registry::Registry;

/// Lifecycle phase of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Accepting registrations.
    Open,
    /// Constructors are running (or one of them failed).
    Initializing,
    /// Every component is constructed.
    Ready,
}

impl Phase {
    /// Registration and stage binding are only allowed while open.
    pub fn can_register(&self) -> bool {
        matches!(self, Phase::Open)
    }

    /// Lookups work during init (for constructors) and after it.
    pub fn can_resolve(&self) -> bool {
        matches!(self, Phase::Initializing | Phase::Ready)
    }

    pub fn can_exec_stage(&self) -> bool {
        matches!(self, Phase::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Open => "open",
            Phase::Initializing => "initializing",
            Phase::Ready => "ready",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything guarded by the container lock.
pub(crate) struct ContainerState {
    pub(crate) phase: Phase,
    pub(crate) registry: Registry,
}

impl ContainerState {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Open,
            registry: Registry::new(),
        }
    }

    pub(crate) fn check_register(&self) -> ContainerResult<()> {
        if !self.phase.can_register() {
            return Err(ContainerError::AlreadyInitialized { phase: self.phase });
        }
        Ok(())
    }

    pub(crate) fn check_resolve(&self) -> ContainerResult<()> {
        if !self.phase.can_resolve() {
            return Err(ContainerError::NotInitialized { phase: self.phase });
        }
        Ok(())
    }

    pub(crate) fn check_exec_stage(&self) -> ContainerResult<()> {
        if !self.phase.can_exec_stage() {
            return Err(ContainerError::NotInitialized { phase: self.phase });
        }
        Ok(())
    }

    /// `Open → Initializing`.
    pub(crate) fn enter_init(&mut self) -> ContainerResult<()> {
        if self.phase != Phase::Open {
            return Err(ContainerError::AlreadyInitialized { phase: self.phase });
        }
        self.transition(Phase::Initializing);
        Ok(())
    }

    /// `Initializing → Ready`.
    pub(crate) fn exit_init(&mut self) {
        debug_assert_eq!(self.phase, Phase::Initializing);
        self.transition(Phase::Ready);
    }

    fn transition(&mut self, to: Phase) {
        tracing::trace!(from = %self.phase, to = %to, "Container phase transition");
        self.phase = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_phase_predicates() {
        assert!(Phase::Open.can_register());
        assert!(!Phase::Open.can_resolve());
        assert!(!Phase::Open.can_exec_stage());

        assert!(!Phase::Initializing.can_register());
        assert!(Phase::Initializing.can_resolve());
        assert!(!Phase::Initializing.can_exec_stage());

        assert!(!Phase::Ready.can_register());
        assert!(Phase::Ready.can_resolve());
        assert!(Phase::Ready.can_exec_stage());
    }

    #[test]
    fn test_enter_init_only_once() {
        let mut state = ContainerState::new();
        state.enter_init().unwrap();
        assert_eq!(state.phase, Phase::Initializing);

        let err = state.enter_init().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInitialized);

        state.exit_init();
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.enter_init().unwrap_err().kind(), ErrorKind::AlreadyInitialized);
    }

    #[test]
    fn test_checks_follow_phase() {
        let mut state = ContainerState::new();
        assert!(state.check_register().is_ok());
        assert_eq!(state.check_resolve().unwrap_err().kind(), ErrorKind::NotInitialized);

        state.enter_init().unwrap();
        assert!(state.check_resolve().is_ok());
        assert_eq!(state.check_exec_stage().unwrap_err().kind(), ErrorKind::NotInitialized);
        assert_eq!(state.check_register().unwrap_err().kind(), ErrorKind::AlreadyInitialized);

        state.exit_init();
        assert!(state.check_exec_stage().is_ok());
    }
}
