//! Sidecar lifecycle state machine: starting → running → draining →
//! stopped, plus an atomically-reloadable config cell so `reload_config`
//! never has to coordinate with in-flight request handlers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

use crate::config::SidecarConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Starting,
            1 => LifecycleState::Running,
            2 => LifecycleState::Draining,
            _ => LifecycleState::Stopped,
        }
    }
}

pub struct SidecarState {
    lifecycle: AtomicU8,
    config: RwLock<SidecarConfig>,
}

impl SidecarState {
    pub fn new(config: SidecarConfig) -> Self {
        Self {
            lifecycle: AtomicU8::new(LifecycleState::Starting as u8),
            config: RwLock::new(config),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn mark_running(&self) {
        self.lifecycle.store(LifecycleState::Running as u8, Ordering::Release);
    }

    pub fn begin_draining(&self) {
        self.lifecycle.store(LifecycleState::Draining as u8, Ordering::Release);
    }

    pub fn mark_stopped(&self) {
        self.lifecycle.store(LifecycleState::Stopped as u8, Ordering::Release);
    }

    pub fn accepts_events(&self) -> bool {
        matches!(self.lifecycle(), LifecycleState::Running)
    }

    pub fn config(&self) -> SidecarConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    pub fn reload_config(&self, new_config: SidecarConfig) {
        *self.config.write().expect("config lock poisoned") = new_config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let state = SidecarState::new(SidecarConfig::default());
        assert_eq!(state.lifecycle(), LifecycleState::Starting);
        assert!(!state.accepts_events());

        state.mark_running();
        assert!(state.accepts_events());

        state.begin_draining();
        assert!(!state.accepts_events());

        state.mark_stopped();
        assert_eq!(state.lifecycle(), LifecycleState::Stopped);
    }

    #[test]
    fn test_reload_config_is_visible_immediately() {
        let state = SidecarState::new(SidecarConfig::default());
        let mut updated = state.config();
        updated.worker_count = 9;
        state.reload_config(updated);
        assert_eq!(state.config().worker_count, 9);
    }
}
