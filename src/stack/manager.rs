use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

use super::advanced::{AdvancedBackend, AdvancedCapability};
use super::prefs::PrefsStore;
use super::{Decision, DecisionBackend, DecisionTier};
use crate::error::StackError;
use crate::pipeline::types::ActionKind;

#[derive(Debug, Clone, PartialEq)]
pub struct StackStatus {
    pub advanced_enabled: bool,
    pub initialized: bool,
    pub memory_usage_mb: f64,
}

/// Chooses between the always-available lightweight backend and the heavy
/// advanced one, with verified enable, rollback on failure, and a persisted
/// preference. Externally the stack is never observable half-enabled: the
/// advanced slot holds either a fully verified backend or nothing.
pub struct StackManager {
    lightweight: Box<dyn DecisionBackend>,
    capability: Box<dyn AdvancedCapability>,
    advanced: Mutex<Option<AdvancedBackend>>,
    prefs_store: PrefsStore,
    reclaim_hints: AtomicU64,
}

impl StackManager {
    pub fn new(
        lightweight: Box<dyn DecisionBackend>,
        capability: Box<dyn AdvancedCapability>,
        prefs_store: PrefsStore,
    ) -> Self {
        let manager = Self {
            lightweight,
            capability,
            advanced: Mutex::new(None),
            prefs_store,
            reclaim_hints: AtomicU64::new(0),
        };
        // Restore the persisted preference; a failed restore leaves the
        // stack lightweight and rewrites the preference to match.
        if manager.prefs_store.load().advanced_enabled {
            if let Err(e) = manager.toggle_advanced(true) {
                warn!("could not restore advanced stack: {e}");
            }
        }
        manager
    }

    pub fn toggle_advanced(&self, enable: bool) -> Result<(), StackError> {
        let mut advanced = self.advanced.lock().unwrap_or_else(|e| e.into_inner());
        if enable == advanced.is_some() {
            return Ok(());
        }

        if enable {
            match AdvancedBackend::bring_up(self.capability.as_ref()) {
                Ok(backend) => {
                    *advanced = Some(backend);
                    self.persist(true);
                    info!("advanced stack enabled");
                    Ok(())
                }
                Err(e) => {
                    // Rolled back: nothing was stored, nothing half-alive.
                    self.persist(false);
                    warn!("advanced stack enable failed, staying lightweight: {e}");
                    Err(e)
                }
            }
        } else {
            if let Some(backend) = advanced.take() {
                backend.tear_down();
            }
            self.request_reclaim_hint();
            self.persist(false);
            info!("advanced stack disabled");
            Ok(())
        }
    }

    pub fn status(&self) -> StackStatus {
        let advanced = self.advanced.lock().unwrap_or_else(|e| e.into_inner());
        let initialized = advanced
            .as_ref()
            .map(DecisionBackend::is_initialized)
            .unwrap_or(false);
        let memory = self.lightweight.memory_usage_mb()
            + advanced
                .as_ref()
                .map(DecisionBackend::memory_usage_mb)
                .unwrap_or(0.0);
        StackStatus {
            advanced_enabled: advanced.is_some(),
            initialized,
            memory_usage_mb: memory,
        }
    }

    /// Three-tier routing: verified advanced, then lightweight, then a
    /// fixed low-confidence default. Never propagates a backend error.
    pub fn decide(&self, state: &[f32]) -> Decision {
        {
            let advanced = self.advanced.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(backend) = advanced.as_ref() {
                if backend.is_initialized() {
                    match backend.decide(state) {
                        Ok(decision) => return decision,
                        Err(e) => warn!("advanced decide failed, degrading: {e}"),
                    }
                }
            }
        }
        match self.lightweight.decide(state) {
            Ok(decision) => decision,
            Err(e) => {
                warn!("lightweight decide failed, using rule default: {e}");
                Decision {
                    kind: ActionKind::Tap,
                    target: None,
                    confidence: 0.2,
                    tier: DecisionTier::RuleDefault,
                }
            }
        }
    }

    pub fn predict(&self, state: &[f32], steps_ahead: usize) -> Vec<f32> {
        {
            let advanced = self.advanced.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(backend) = advanced.as_ref() {
                if backend.is_initialized() {
                    match backend.predict(state, steps_ahead) {
                        Ok(predicted) => return predicted,
                        Err(e) => warn!("advanced predict failed, degrading: {e}"),
                    }
                }
            }
        }
        match self.lightweight.predict(state, steps_ahead) {
            Ok(predicted) => predicted,
            Err(e) => {
                // Momentum extrapolation: carry the state forward unchanged.
                warn!("lightweight predict failed, using momentum default: {e}");
                state.to_vec()
            }
        }
    }

    pub fn reclaim_hints(&self) -> u64 {
        self.reclaim_hints.load(Ordering::Relaxed)
    }

    fn request_reclaim_hint(&self) {
        self.reclaim_hints.fetch_add(1, Ordering::Relaxed);
        info!("memory reclaim hint requested");
    }

    fn persist(&self, advanced_enabled: bool) {
        let mut prefs = self.prefs_store.load();
        prefs.advanced_enabled = advanced_enabled;
        if let Err(e) = self.prefs_store.save(&prefs) {
            warn!("failed to persist stack preference: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::advanced::{AdvancedComponent, BuiltinAdvancedCapability, SimulatedComponent};
    use crate::stack::lightweight::LightweightBackend;

    struct BrokenCapability;

    impl AdvancedCapability for BrokenCapability {
        fn available(&self) -> bool {
            true
        }

        fn build(&self) -> Result<Vec<Box<dyn AdvancedComponent>>, StackError> {
            Ok(vec![
                Box::new(SimulatedComponent::new("planner", 96.0)),
                Box::new(SimulatedComponent::broken("world_model")),
            ])
        }
    }

    struct FailingBackend;

    impl DecisionBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn decide(&self, _state: &[f32]) -> Result<Decision, StackError> {
            Err(StackError::Unavailable)
        }

        fn predict(&self, _state: &[f32], _steps: usize) -> Result<Vec<f32>, StackError> {
            Err(StackError::Unavailable)
        }

        fn memory_usage_mb(&self) -> f64 {
            0.0
        }
    }

    fn manager_in(dir: &tempfile::TempDir, capability: Box<dyn AdvancedCapability>) -> StackManager {
        StackManager::new(
            Box::new(LightweightBackend::new()),
            capability,
            PrefsStore::new(dir.path().join("prefs.json")),
        )
    }

    #[test]
    fn toggle_is_a_no_op_when_already_there() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let manager = manager_in(&dir, Box::new(BuiltinAdvancedCapability));
        assert!(manager.toggle_advanced(false).is_ok());
        manager.toggle_advanced(true).expect("enable failed");
        assert!(manager.toggle_advanced(true).is_ok());
        assert!(manager.status().advanced_enabled);
    }

    #[test]
    fn failed_enable_rolls_back_completely() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let manager = manager_in(&dir, Box::new(BrokenCapability));
        assert!(manager.toggle_advanced(true).is_err());
        let status = manager.status();
        assert!(!status.advanced_enabled);
        assert!(!status.initialized);
    }

    #[test]
    fn status_is_consistent_at_rest() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let manager = manager_in(&dir, Box::new(BuiltinAdvancedCapability));
        let before = manager.status();
        assert_eq!(before.advanced_enabled, before.initialized);
        manager.toggle_advanced(true).expect("enable failed");
        let after = manager.status();
        assert_eq!(after.advanced_enabled, after.initialized);
        assert!(after.memory_usage_mb > before.memory_usage_mb);
    }

    #[test]
    fn preference_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        {
            let manager = manager_in(&dir, Box::new(BuiltinAdvancedCapability));
            manager.toggle_advanced(true).expect("enable failed");
        }
        let restarted = manager_in(&dir, Box::new(BuiltinAdvancedCapability));
        assert!(restarted.status().advanced_enabled);
    }

    #[test]
    fn disable_requests_a_reclaim_hint() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let manager = manager_in(&dir, Box::new(BuiltinAdvancedCapability));
        manager.toggle_advanced(true).expect("enable failed");
        manager.toggle_advanced(false).expect("disable failed");
        assert_eq!(manager.reclaim_hints(), 1);
        assert!(!manager.status().advanced_enabled);
    }

    #[test]
    fn decide_uses_advanced_tier_when_enabled() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let manager = manager_in(&dir, Box::new(BuiltinAdvancedCapability));
        let state = [3.0, 0.9, 0.1, 0.4];
        assert_eq!(manager.decide(&state).tier, DecisionTier::Lightweight);
        manager.toggle_advanced(true).expect("enable failed");
        assert_eq!(manager.decide(&state).tier, DecisionTier::Advanced);
    }

    #[test]
    fn broken_lightweight_falls_back_to_rule_default() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let manager = StackManager::new(
            Box::new(FailingBackend),
            Box::new(BrokenCapability),
            PrefsStore::new(dir.path().join("prefs.json")),
        );
        let decision = manager.decide(&[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(decision.tier, DecisionTier::RuleDefault);
        assert_eq!(decision.kind, ActionKind::Tap);
        let predicted = manager.predict(&[1.0, 0.5], 3);
        assert_eq!(predicted, vec![1.0, 0.5]);
    }
}
