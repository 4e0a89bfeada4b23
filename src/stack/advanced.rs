use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::{Decision, DecisionBackend, DecisionTier};
use crate::error::StackError;
use crate::pipeline::types::ActionKind;

/// One building block of the advanced backend. Every component must report
/// initialized before the stack toggle is accepted.
pub trait AdvancedComponent: Send + Sync {
    fn name(&self) -> &'static str;
    fn initialize(&self) -> bool;
    fn is_initialized(&self) -> bool;
    fn release(&self);
    fn memory_usage_mb(&self) -> f64;
}

/// Build-time capability hook for the optional advanced stack. Resolved by
/// configuration at composition, never by runtime class probing.
pub trait AdvancedCapability: Send + Sync {
    fn available(&self) -> bool;
    fn build(&self) -> Result<Vec<Box<dyn AdvancedComponent>>, StackError>;
}

/// In-process stand-ins for the heavy planner/world-model components. They
/// carry real init/release state so toggle verification is meaningful.
pub struct SimulatedComponent {
    name: &'static str,
    size_mb: f64,
    healthy: bool,
    initialized: AtomicBool,
}

impl SimulatedComponent {
    pub fn new(name: &'static str, size_mb: f64) -> Self {
        Self {
            name,
            size_mb,
            healthy: true,
            initialized: AtomicBool::new(false),
        }
    }

    /// A component that will fail its own initialization check.
    pub fn broken(name: &'static str) -> Self {
        Self {
            name,
            size_mb: 0.0,
            healthy: false,
            initialized: AtomicBool::new(false),
        }
    }
}

impl AdvancedComponent for SimulatedComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&self) -> bool {
        if self.healthy {
            self.initialized.store(true, Ordering::Release);
            debug!("advanced component '{}' initialized", self.name);
        }
        self.healthy
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.initialized.store(false, Ordering::Release);
        debug!("advanced component '{}' released", self.name);
    }

    fn memory_usage_mb(&self) -> f64 {
        if self.is_initialized() {
            self.size_mb
        } else {
            0.0
        }
    }
}

/// Default capability used by the composition root.
pub struct BuiltinAdvancedCapability;

impl AdvancedCapability for BuiltinAdvancedCapability {
    fn available(&self) -> bool {
        true
    }

    fn build(&self) -> Result<Vec<Box<dyn AdvancedComponent>>, StackError> {
        Ok(vec![
            Box::new(SimulatedComponent::new("planner", 96.0)),
            Box::new(SimulatedComponent::new("world_model", 128.0)),
            Box::new(SimulatedComponent::new("decision_ensemble", 48.0)),
        ])
    }
}

/// The assembled advanced backend: verified components plus the routing
/// logic that beats the lightweight heuristics on rich states.
pub struct AdvancedBackend {
    components: Vec<Box<dyn AdvancedComponent>>,
}

impl AdvancedBackend {
    /// Builds and verifies every component. Any failure releases what was
    /// already brought up and reports which component refused.
    pub fn bring_up(capability: &dyn AdvancedCapability) -> Result<Self, StackError> {
        if !capability.available() {
            return Err(StackError::Unavailable);
        }
        let components = capability.build()?;
        for component in &components {
            if !component.initialize() || !component.is_initialized() {
                let failed = component.name();
                for brought_up in &components {
                    brought_up.release();
                }
                return Err(StackError::ComponentInit(failed));
            }
        }
        info!("advanced stack up: {} components", components.len());
        Ok(Self { components })
    }

    pub fn tear_down(&self) {
        for component in &self.components {
            component.release();
        }
        info!("advanced stack released");
    }
}

impl DecisionBackend for AdvancedBackend {
    fn name(&self) -> &'static str {
        "advanced"
    }

    fn is_initialized(&self) -> bool {
        self.components.iter().all(|c| c.is_initialized())
    }

    fn decide(&self, state: &[f32]) -> Result<Decision, StackError> {
        let threat = state.get(1).copied().unwrap_or(0.0);
        let opportunity = state.get(2).copied().unwrap_or(0.0);
        let health = state.get(3).copied().unwrap_or(1.0);

        // Planner-style scoring: weigh expected gain against risk instead
        // of fixed thresholds.
        let risk = threat * (1.5 - health);
        let gain = opportunity * (0.5 + health);
        let (kind, confidence) = if risk > 1.0 {
            (ActionKind::Back, 0.95)
        } else if risk > gain {
            (ActionKind::Swipe, (0.6 + risk / 4.0).min(0.95))
        } else if gain > 0.3 {
            (ActionKind::Tap, (0.6 + gain / 4.0).min(0.95))
        } else {
            (ActionKind::LongPress, 0.55)
        };
        Ok(Decision {
            kind,
            target: None,
            confidence,
            tier: DecisionTier::Advanced,
        })
    }

    fn predict(&self, state: &[f32], steps_ahead: usize) -> Result<Vec<f32>, StackError> {
        // World-model rollout: threat builds while opportunity is left on
        // the table, both bounded to the unit interval.
        let mut predicted = state.to_vec();
        for _ in 0..steps_ahead {
            if let Some(threat) = predicted.get_mut(1) {
                *threat = (*threat * 1.05 + 0.01).min(1.0);
            }
            if let Some(opportunity) = predicted.get_mut(2) {
                *opportunity = (*opportunity * 0.95).max(0.0);
            }
        }
        Ok(predicted)
    }

    fn memory_usage_mb(&self) -> f64 {
        self.components.iter().map(|c| c.memory_usage_mb()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn bring_up_verifies_every_component() {
        let backend =
            AdvancedBackend::bring_up(&BuiltinAdvancedCapability).expect("bring-up failed");
        assert!(backend.is_initialized());
        assert!(backend.memory_usage_mb() > 200.0);
    }

    #[test]
    fn one_broken_component_fails_the_whole_bring_up() {
        let result = AdvancedBackend::bring_up(&BrokenCapability);
        assert!(matches!(result, Err(StackError::ComponentInit("world_model"))));
    }

    #[test]
    fn tear_down_releases_memory() {
        let backend =
            AdvancedBackend::bring_up(&BuiltinAdvancedCapability).expect("bring-up failed");
        backend.tear_down();
        assert!(!backend.is_initialized());
        assert_eq!(backend.memory_usage_mb(), 0.0);
    }
}
